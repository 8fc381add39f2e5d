use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// A server wall-clock instant
pub type Timestamp = DateTime<Utc>;

/// Something that can tell the current server time.
///
/// The server clock is authoritative for every playback command,
/// so all components ask this instead of trusting client supplied times.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The real system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used in tests.
#[derive(Debug)]
pub struct ManualTime {
    now: Mutex<Timestamp>,
}

impl ManualTime {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward by a number of seconds
    pub fn advance(&self, seconds: f64) {
        let millis = (seconds * 1000.).round() as i64;
        *self.now.lock() += Duration::milliseconds(millis);
    }

    /// Sets the clock to an exact instant, which may be in the past
    pub fn set(&self, instant: Timestamp) {
        *self.now.lock() = instant;
    }
}

impl Default for ManualTime {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

/// Returns the seconds elapsed from `from` to `to`, which is negative if `to` is earlier.
pub fn seconds_between(from: Timestamp, to: Timestamp) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.
}
