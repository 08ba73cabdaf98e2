use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// Source of "now" for the end of the history lookup window and for closure stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant, for reproducible passes.
pub struct FrozenClock {
    at: DateTime<Utc>,
}

impl FrozenClock {
    /// Out-of-range millis pin the clock to the epoch.
    pub fn at_millis(millis: i64) -> Self {
        Self {
            at: Utc.timestamp_millis_opt(millis).single().unwrap_or_default(),
        }
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }
}

#[derive(Clone)]
pub struct ReconcileContext {
    clock: Arc<dyn Clock>,
}

impl ReconcileContext {
    pub fn new_system() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }

    pub fn new_simulated(at_millis: i64) -> Self {
        Self {
            clock: Arc::new(FrozenClock::at_millis(at_millis)),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
