//! TCP sessions for the station and its listeners

pub mod client;
pub mod server;
pub mod session;

pub use client::{ClientSession, Interrupter};
pub use server::ServerSession;
pub use session::{LogEntry, LogObserver, Session, SessionLog};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancellation flag shared by accept loops and workers
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask everything holding a clone to stop
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
