//! Shared-bus arbitration
//!
//! A single physical SPI bus is shared between the transient configuration
//! role and whatever steady-state device uses the bus afterwards. All of
//! them go through one [`BusArbiter`]: the loader holds the token for an
//! entire configuration session, application code holds it per transaction.
//!
//! The arbiter is an explicitly owned object that callers receive by
//! reference (typically inside an `Arc`), not ambient global state.

use crate::error::LoadError;
use std::sync::{Mutex, MutexGuard};

/// Mutual-exclusion guard over one physical SPI bus.
///
/// At most one [`BusToken`] exists at any instant. `acquire` blocks without
/// bound; fairness is whatever the platform mutex provides (FIFO is not
/// guaranteed).
#[derive(Debug, Default)]
pub struct BusArbiter {
    lock: Mutex<()>,
}

/// Exclusive ownership of the bus. Dropping the token releases the bus.
#[derive(Debug)]
pub struct BusToken<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl BusArbiter {
    /// Create an arbiter for one physical bus
    pub fn new() -> Self {
        BusArbiter {
            lock: Mutex::new(()),
        }
    }

    /// Take exclusive ownership of the bus, blocking until it is free
    pub fn acquire(&self) -> Result<BusToken<'_>, LoadError> {
        let guard = self.lock.lock().map_err(|_| LoadError::BusAcquireFailed)?;
        Ok(BusToken { _guard: guard })
    }

    /// Take the bus only if it is currently free
    pub fn try_acquire(&self) -> Option<BusToken<'_>> {
        self.lock.try_lock().ok().map(|guard| BusToken { _guard: guard })
    }
}
