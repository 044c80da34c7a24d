//! Lock-free sample FIFO with blocking ends
//!
//! Bridges a device callback running on the audio thread to the fixed-block
//! blocking reads and writes the streaming loops perform. The callback side
//! (`push`, `pop_into`) never takes a lock; the worker side (`pop_exact`,
//! `push_blocking`) parks on a condvar between polls.
//!
//! One producer and one consumer per FIFO.

use crossbeam::queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::AudioError;

/// Upper bound on one park, so a wakeup missed by the lock-free side only
/// costs latency
const PARK_SLICE: Duration = Duration::from_millis(5);

/// Bounded queue of interleaved int16 samples
pub struct SampleFifo {
    queue: ArrayQueue<i16>,
    closed: AtomicBool,
    park: Mutex<()>,
    readable: Condvar,
    writable: Condvar,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl SampleFifo {
    /// Create a FIFO holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            closed: AtomicBool::new(false),
            park: Mutex::new(()),
            readable: Condvar::new(),
            writable: Condvar::new(),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Push without blocking or locking.
    ///
    /// Samples that do not fit are dropped and counted as overflow. Returns
    /// the number of samples queued.
    pub fn push(&self, samples: &[i16]) -> usize {
        let mut accepted = 0;
        for &sample in samples {
            if self.queue.push(sample).is_err() {
                break;
            }
            accepted += 1;
        }

        if accepted < samples.len() {
            self.overflow_count.fetch_add(samples.len() - accepted, Ordering::Relaxed);
        }
        if accepted > 0 {
            self.readable.notify_one();
        }
        accepted
    }

    /// Push everything, waiting for room as needed
    pub fn push_blocking(&self, samples: &[i16]) -> Result<(), AudioError> {
        let mut pending = samples.iter().copied().peekable();

        while let Some(&sample) = pending.peek() {
            if self.is_closed() {
                return Err(AudioError::Closed);
            }

            if self.queue.push(sample).is_ok() {
                pending.next();
                continue;
            }

            self.readable.notify_one();
            let mut guard = self.park.lock();
            if self.queue.is_full() && !self.is_closed() {
                self.writable.wait_for(&mut guard, PARK_SLICE);
            }
        }

        self.readable.notify_one();
        Ok(())
    }

    /// Wait up to `timeout` for exactly `count` samples.
    ///
    /// Returns `None` on timeout, or once the FIFO is closed and drained
    /// below `count`.
    pub fn pop_exact(&self, count: usize, timeout: Duration) -> Option<Vec<i16>> {
        let deadline = Instant::now() + timeout;

        while self.queue.len() < count {
            if self.is_closed() {
                return None;
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            let mut guard = self.park.lock();
            if self.queue.len() < count {
                self.readable.wait_for(&mut guard, PARK_SLICE.min(deadline - now));
            }
        }

        let out: Vec<i16> = std::iter::from_fn(|| self.queue.pop()).take(count).collect();
        self.writable.notify_one();
        Some(out)
    }

    /// Fill `out` with whatever is queued, padding with silence.
    ///
    /// Lock-free. Returns the number of real samples written; a short fill
    /// counts as an underrun.
    pub fn pop_into(&self, out: &mut [i16]) -> usize {
        let mut available = 0;
        for slot in out.iter_mut() {
            match self.queue.pop() {
                Some(sample) => {
                    *slot = sample;
                    available += 1;
                }
                None => break,
            }
        }

        out[available..].fill(0);
        if available < out.len() {
            self.underrun_count.fetch_add(1, Ordering::Relaxed);
        }
        if available > 0 {
            self.writable.notify_one();
        }
        available
    }

    /// Wake every waiter and refuse further blocking pushes
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _guard = self.park.lock();
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Samples dropped because the FIFO was full
    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Callbacks that found too few samples
    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }

    pub fn reset_stats(&self) {
        self.overflow_count.store(0, Ordering::Relaxed);
        self.underrun_count.store(0, Ordering::Relaxed);
    }

    /// Fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity() as f32
    }
}

/// Thread-safe handle to a FIFO
pub type SharedFifo = Arc<SampleFifo>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_push_and_pop_exact() {
        let fifo = SampleFifo::new(8);
        assert_eq!(fifo.push(&[1, 2, 3]), 3);
        assert!(fifo.pop_exact(4, Duration::from_millis(10)).is_none());

        fifo.push(&[4]);
        assert_eq!(fifo.pop_exact(4, Duration::from_millis(10)), Some(vec![1, 2, 3, 4]));
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_overflow_drops_excess() {
        let fifo = SampleFifo::new(4);
        assert_eq!(fifo.push(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(fifo.overflow_count(), 2);
        assert_eq!(fifo.fill_level(), 1.0);

        fifo.reset_stats();
        assert_eq!(fifo.overflow_count(), 0);
    }

    #[test]
    fn test_pop_into_pads_silence() {
        let fifo = SampleFifo::new(8);
        fifo.push(&[7, 8]);

        let mut out = [9i16; 4];
        assert_eq!(fifo.pop_into(&mut out), 2);
        assert_eq!(out, [7, 8, 0, 0]);
        assert_eq!(fifo.underrun_count(), 1);
    }

    #[test]
    fn test_blocking_push_waits_for_consumer() {
        let fifo = Arc::new(SampleFifo::new(4));
        let producer = {
            let fifo = fifo.clone();
            thread::spawn(move || fifo.push_blocking(&[1, 2, 3, 4, 5, 6, 7, 8]))
        };

        let first = fifo.pop_exact(4, Duration::from_secs(5)).unwrap();
        let second = fifo.pop_exact(4, Duration::from_secs(5)).unwrap();
        assert_eq!(first, vec![1, 2, 3, 4]);
        assert_eq!(second, vec![5, 6, 7, 8]);
        assert!(producer.join().unwrap().is_ok());
    }

    #[test]
    fn test_callback_side_streams_through_small_fifo() {
        let fifo = Arc::new(SampleFifo::new(16));
        let producer = {
            let fifo = fifo.clone();
            thread::spawn(move || {
                let mut sent = 0i16;
                while sent < 256 {
                    let block: Vec<i16> = (sent..(sent + 8).min(256)).collect();
                    sent += fifo.push(&block) as i16;
                    thread::yield_now();
                }
            })
        };

        let mut received = Vec::new();
        while received.len() < 256 {
            received.extend(fifo.pop_exact(8, Duration::from_secs(5)).unwrap());
        }
        producer.join().unwrap();
        assert_eq!(received, (0..256).collect::<Vec<i16>>());
    }

    #[test]
    fn test_close_releases_waiters() {
        let fifo = Arc::new(SampleFifo::new(2));
        fifo.push(&[1, 2]);

        let producer = {
            let fifo = fifo.clone();
            thread::spawn(move || fifo.push_blocking(&[3]))
        };

        thread::sleep(Duration::from_millis(20));
        fifo.close();
        assert!(matches!(producer.join().unwrap(), Err(AudioError::Closed)));
        assert!(fifo.is_closed());
        assert!(fifo.pop_exact(3, Duration::from_secs(5)).is_none());
    }
}
