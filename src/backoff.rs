//! Reconnect pacing for callers polling a device.
//!
//! Nothing in the decode path retries on its own. Callers wrap [`retry`] around
//! `validate` or `refresh` when they want to ride out transient link failures.

use fugit::MicrosDurationU64;
use log::warn;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Delay generator: `delay`, then doubling up to `max` when `exponential` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: MicrosDurationU64,
    max: MicrosDurationU64,
    exponential: bool,
    current: MicrosDurationU64,
}

impl Backoff {
    pub fn new(delay: MicrosDurationU64, max: MicrosDurationU64, exponential: bool) -> Self {
        Self {
            initial: delay,
            max,
            exponential,
            current: delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.reconnect_delay(),
            config.reconnect_delay_max(),
            config.exponential,
        )
    }

    /// The delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> MicrosDurationU64 {
        let delay = self.current;
        if self.exponential {
            let doubled = MicrosDurationU64::from_ticks(self.current.ticks().saturating_mul(2));
            self.current = if doubled > self.max { self.max } else { doubled };
        }
        delay
    }

    /// Start over from the initial delay, after a success.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Run `op` up to `attempts` times.
///
/// Transient errors are retried after sleeping the next backoff delay, fatal errors are
/// returned at once. On success the backoff is reset.
pub fn retry<T>(
    backoff: &mut Backoff,
    attempts: u32,
    op: impl FnMut() -> Result<T>,
    sleep: impl FnMut(MicrosDurationU64),
) -> Result<T> {
    retry_when(backoff, attempts, op, sleep, Error::is_transient)
}

/// Like [`retry`], retrying every error `retryable` accepts.
///
/// Pass [`Error::is_reconnectable`] when `op` opens a new connection each time.
pub fn retry_when<T>(
    backoff: &mut Backoff,
    attempts: u32,
    mut op: impl FnMut() -> Result<T>,
    mut sleep: impl FnMut(MicrosDurationU64),
    retryable: impl Fn(&Error) -> bool,
) -> Result<T> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => {
                backoff.reset();
                return Ok(value);
            }
            Err(err) if retryable(&err) && attempt < attempts => {
                let delay = backoff.next_delay();
                warn!(
                    "Attempt {}/{} failed: {}; retrying in {} ms",
                    attempt,
                    attempts,
                    err,
                    delay.to_millis()
                );
                sleep(delay);
            }
            Err(err) => return Err(err),
        }
    }
}
