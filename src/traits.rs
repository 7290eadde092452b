//! Abstractions for time access to enable testing.
//!
//! Serving-time calendar features depend on the current wall clock; the
//! `Clock` trait lets tests pin that clock to a fixed instant.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, Utc};

/// Trait for abstracting time access.
///
/// This allows injecting mock clocks during testing to create
/// deterministic, reproducible tests for time-dependent logic.
pub trait Clock: Send + Sync {
    /// Get the current time in UTC.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Get the current time in the local timezone.
    fn now_local(&self) -> DateTime<Local>;
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Mock clock for testing with controllable time.
#[derive(Debug, Clone)]
pub struct MockClock {
    utc_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a new mock clock set to the given UTC time.
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            utc_time: Arc::new(Mutex::new(time)),
        }
    }

    /// Set the mock clock to a new time.
    pub fn set_time(&self, time: DateTime<Utc>) {
        *self.utc_time.lock().unwrap() = time;
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut time = self.utc_time.lock().unwrap();
        *time = *time + duration;
    }
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.utc_time.lock().unwrap()
    }

    fn now_local(&self) -> DateTime<Local> {
        self.now_utc().with_timezone(&Local)
    }
}
