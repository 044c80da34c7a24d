//! FIR lowpass design and "same" convolution

use std::f64::consts::PI;

/// 4-term Blackman-Harris coefficients
const BLACKMAN_HARRIS: [f64; 4] = [0.35875, 0.48829, 0.14128, 0.01168];

/// Symmetric Blackman-Harris window of `len` points
pub fn blackman_harris(len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = (len - 1) as f64;
            let [a0, a1, a2, a3] = BLACKMAN_HARRIS;
            (0..len)
                .map(|n| {
                    let x = 2.0 * PI * n as f64 / denom;
                    a0 - a1 * x.cos() + a2 * (2.0 * x).cos() - a3 * (3.0 * x).cos()
                })
                .collect()
        }
    }
}

/// Normalized sinc, `sin(πx) / (πx)`
fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let px = PI * x;
        px.sin() / px
    }
}

/// Windowed-sinc lowpass taps with unity gain at DC.
///
/// `cutoff` and `sample_rate` are in Hz; the cutoff is taken relative to the
/// Nyquist frequency.
pub fn lowpass_taps(num_taps: usize, cutoff: f64, sample_rate: f64) -> Vec<f64> {
    if num_taps == 0 {
        return Vec::new();
    }

    let nyquist = sample_rate / 2.0;
    let band = cutoff / nyquist;
    let alpha = 0.5 * (num_taps - 1) as f64;

    let mut taps: Vec<f64> = blackman_harris(num_taps)
        .into_iter()
        .enumerate()
        .map(|(i, w)| {
            let m = i as f64 - alpha;
            band * sinc(band * m) * w
        })
        .collect();

    let gain: f64 = taps.iter().sum();
    if gain != 0.0 {
        for tap in &mut taps {
            *tap /= gain;
        }
    }

    taps
}

/// Convolution returning the central `max(len)` samples of the full result
pub fn convolve_same(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let (long, short) = if signal.len() >= kernel.len() {
        (signal, kernel)
    } else {
        (kernel, signal)
    };

    if short.is_empty() {
        return Vec::new();
    }

    let offset = (short.len() - 1) / 2;

    (0..long.len())
        .map(|k| {
            let p = k + offset;
            let first = p.saturating_sub(long.len() - 1);
            let last = p.min(short.len() - 1);
            (first..=last).map(|i| long[p - i] * short[i]).sum()
        })
        .collect()
}
