//! Cooperative interruption

use crate::error::{AutoMLError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag, cloned into whatever raises it (e.g. a Ctrl-C handler)
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted)` once triggered
    pub fn check(&self) -> Result<()> {
        if self.is_triggered() {
            Err(AutoMLError::Interrupted)
        } else {
            Ok(())
        }
    }
}
