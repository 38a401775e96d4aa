//! Cooldown tracking for funded addresses.
//!
//! Every address gets a record holding the time of its last successful
//! transfer and an async lock. A request holds the lock from the cooldown
//! check until the transfer has been recorded, so two concurrent requests for
//! the same address can never both be funded inside one window.

use crate::error::{FaucetError, FaucetResult};
use alloy::primitives::Address;
use chrono::{Duration, Utc};
use dashmap::DashMap;
#[cfg(test)]
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

/// Source of the current time in milliseconds since the Unix epoch
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_ms(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta: Duration) {
        self.now_ms
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Cooldown record of one address
#[derive(Debug, Default)]
struct CooldownEntry {
    gate: Arc<Mutex<()>>,
    last_sent_ms: Option<i64>,
}

/// Tracks when each address was last funded
#[derive(Debug)]
pub struct CooldownTracker {
    entries: DashMap<Address, CooldownEntry>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl CooldownTracker {
    /// Create a tracker using the wall clock
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            window,
            clock,
        }
    }

    /// Wait for exclusive access to the cooldown record of `address`.
    ///
    /// The returned permit must be held across the transfer so that the
    /// check and the record update form one critical section.
    pub async fn acquire(&self, address: Address) -> CooldownPermit<'_> {
        // The map guard must be dropped before awaiting the lock.
        let gate = self.entries.entry(address).or_default().gate.clone();
        let guard = gate.lock_owned().await;

        CooldownPermit {
            tracker: self,
            address,
            now_ms: self.clock.now_ms(),
            _guard: guard,
        }
    }

    /// Time of the last successful transfer to `address`
    pub fn last_sent(&self, address: &Address) -> Option<i64> {
        self.entries.get(address).and_then(|entry| entry.last_sent_ms)
    }

    /// Number of addresses with a recorded transfer
    pub fn funded_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.last_sent_ms.is_some())
            .count()
    }

    /// Drop records whose window has elapsed and which no request is using
    pub fn cleanup(&self) {
        let now = self.clock.now_ms();
        let window_ms = self.window.num_milliseconds();
        let before = self.entries.len();

        // The shard write lock is held during `retain`, so a strong count of
        // one means no request can be holding or about to take the gate.
        self.entries.retain(|_, entry| {
            let in_use = Arc::strong_count(&entry.gate) > 1;
            let active = entry
                .last_sent_ms
                .map(|sent| now - sent < window_ms)
                .unwrap_or(false);
            in_use || active
        });

        info!(
            "Cooldown cleanup completed: {} records removed, {} remaining",
            before - self.entries.len(),
            self.entries.len()
        );
    }
}

/// Exclusive access to one address's cooldown record
#[derive(Debug)]
pub struct CooldownPermit<'a> {
    tracker: &'a CooldownTracker,
    address: Address,
    now_ms: i64,
    _guard: OwnedMutexGuard<()>,
}

impl CooldownPermit<'_> {
    /// Fail with `CooldownActive` if the address was funded within the window
    pub fn check(&self) -> FaucetResult<()> {
        let Some(last_sent) = self.tracker.last_sent(&self.address) else {
            return Ok(());
        };

        let elapsed = self.now_ms - last_sent;
        if elapsed < self.tracker.window.num_milliseconds() {
            debug!(
                "Address {} is cooling down ({} ms since last transfer)",
                self.address, elapsed
            );
            return Err(FaucetError::CooldownActive {
                window_hours: self.tracker.window.num_hours() as u64,
            });
        }

        Ok(())
    }

    /// Record a successful transfer at the time the permit was taken
    pub fn record(self) {
        if let Some(mut entry) = self.tracker.entries.get_mut(&self.address) {
            let sent = entry.last_sent_ms.map_or(self.now_ms, |prev| prev.max(self.now_ms));
            entry.last_sent_ms = Some(sent);
        }
    }
}
