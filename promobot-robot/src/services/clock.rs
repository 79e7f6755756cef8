//! Wall-clock source
//!
//! Group eligibility and daily counters use local time; everything stored is
//! UTC. Tests substitute a fixed clock.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    /// Local wall-clock time
    fn now_local(&self) -> NaiveDateTime;

    fn now_utc(&self) -> DateTime<Utc>;
}

/// System clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_local(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests
#[derive(Debug)]
pub struct FixedClock {
    local: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(local: NaiveDateTime) -> Self {
        Self { local: Mutex::new(local) }
    }

    pub fn set(&self, local: NaiveDateTime) {
        if let Ok(mut guard) = self.local.lock() {
            *guard = local;
        }
    }
}

impl Clock for FixedClock {
    fn now_local(&self) -> NaiveDateTime {
        match self.local.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.now_local().and_utc()
    }
}
