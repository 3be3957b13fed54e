use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, NaiveDateTime, Timelike, Utc};

/// Source of "now" for the poll, the `today` filter and activity stamps.
pub trait Clock: Send + Sync {
    /// Local wall-clock time.
    fn local_now(&self) -> NaiveDateTime;

    /// Epoch milliseconds for log entries and comments.
    fn epoch_millis(&self) -> i64;

    /// 0 = Sunday .. 6 = Saturday.
    fn weekday_index(&self) -> u8 {
        self.local_now().weekday().num_days_from_sunday() as u8
    }

    fn hhmm(&self) -> String {
        let now = self.local_now();
        format!("{:02}:{:02}", now.hour(), now.minute())
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn local_now(&self) -> NaiveDateTime {
        (**self).local_now()
    }

    fn epoch_millis(&self) -> i64 {
        (**self).epoch_millis()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn epoch_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Settable clock for tests. The stored instant is read both as local wall
/// time and as epoch millis (i.e. local time is UTC).
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self {
            millis: AtomicI64::new(at.and_utc().timestamp_millis()),
        }
    }

    /// Parse "YYYY-MM-DD HH:MM:SS".
    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        let at = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")?;
        Ok(Self::new(at))
    }

    pub fn set(&self, at: NaiveDateTime) {
        self.millis
            .store(at.and_utc().timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.millis.fetch_add(secs * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn local_now(&self) -> NaiveDateTime {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .map(|t| t.naive_utc())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH.naive_utc())
    }

    fn epoch_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}
