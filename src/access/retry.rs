use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Retry behavior for batches whose affected-row count comes back wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first one. Zero means fail fast.
    pub max_retries: u32,
    /// Base of the linear backoff in milliseconds.
    pub retry_delay_unit_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay_unit_ms: 1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay_unit_ms: u64) -> Self {
        Self {
            max_retries,
            retry_delay_unit_ms,
        }
    }

    /// Pause before retry number `retry` (1-based).
    ///
    /// Attempt `i` waits `unit * (i - 1)`: no pause before the first
    /// attempt, one unit before the second, two before the third.
    pub fn delay_before(&self, retry: u32) -> Duration {
        Duration::from_millis(self.retry_delay_unit_ms.saturating_mul(u64::from(retry)))
    }
}

/// The pause between retries was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sleep interrupted")
    }
}

impl std::error::Error for Interrupted {}

/// Blocks the calling thread between retry attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted>;
}

#[derive(Default)]
struct InterruptState {
    flag: Mutex<bool>,
    wake: Condvar,
}

/// Handle that interrupts sleeps of the [`ThreadSleeper`] it was paired with.
#[derive(Clone, Default)]
pub struct Interrupter {
    state: Arc<InterruptState>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wakes the pending sleep, or the next one if none is pending.
    pub fn interrupt(&self) {
        match self.state.flag.lock() {
            Ok(mut flag) => *flag = true,
            Err(poisoned) => *poisoned.into_inner() = true,
        }
        self.state.wake.notify_all();
    }
}

impl fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupter").finish_non_exhaustive()
    }
}

/// Sleeps on the current thread, optionally interruptible.
#[derive(Debug, Clone, Default)]
pub struct ThreadSleeper {
    interrupter: Option<Interrupter>,
}

impl ThreadSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interruptible(interrupter: Interrupter) -> Self {
        Self {
            interrupter: Some(interrupter),
        }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        let Some(interrupter) = &self.interrupter else {
            std::thread::sleep(duration);
            return Ok(());
        };

        let state = &interrupter.state;
        let flag = state.flag.lock().map_err(|_| Interrupted)?;
        let (mut flag, _) = state
            .wake
            .wait_timeout_while(flag, duration, |interrupted| !*interrupted)
            .map_err(|_| Interrupted)?;
        if *flag {
            *flag = false;
            return Err(Interrupted);
        }
        Ok(())
    }
}
