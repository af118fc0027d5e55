use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;

/// Minutes since the Unix epoch, naive local wall clock, the only instant type.
pub type Minutes = i64;

/// Minutes in one day.
pub const DAY_MINUTES: u32 = 1440;

/// Parse `"HH:MM"` or `"HH:MM:SS"` into minutes since midnight. Seconds are
/// accepted and ignored.
pub fn parse_time_of_day(s: &str) -> Option<u32> {
    let mut parts = s.split(':');
    let h: u32 = parts.next()?.parse().ok()?;
    let m: u32 = parts.next()?.parse().ok()?;
    if let Some(sec) = parts.next() {
        let _: u32 = sec.parse().ok()?;
    }
    if parts.next().is_some() || h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Render minutes since midnight as `"HH:MM"`.
pub fn render_time_of_day(tod: u32) -> String {
    format!("{:02}:{:02}", tod / 60, tod % 60)
}

/// Parse `"YYYY-MM-DD"`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

pub fn render_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Weekday slot index: 0 = Sunday .. 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> usize {
    date.weekday().num_days_from_sunday() as usize
}

/// Combine a date with a time-of-day into an absolute instant.
pub fn combine(date: NaiveDate, tod: u32) -> Minutes {
    let days = date.signed_duration_since(NaiveDate::default()).num_days();
    days * DAY_MINUTES as Minutes + tod as Minutes
}

pub fn add_minutes(t: Minutes, delta: i64) -> Minutes {
    t + delta
}

/// Signed distance from `a` to `b`.
pub fn minutes_between(a: Minutes, b: Minutes) -> i64 {
    b - a
}

/// Minutes since midnight of the instant's day.
pub fn minute_of_day(t: Minutes) -> u32 {
    t.rem_euclid(DAY_MINUTES as Minutes) as u32
}

/// Largest grid-aligned instant `<= t`. Grid boundaries are anchored at the
/// epoch (`t % grid == 0`), not at opening time.
pub fn floor_to_grid(t: Minutes, grid: u32) -> Minutes {
    debug_assert!(grid > 0, "grid must be positive");
    t - t.rem_euclid(grid as Minutes)
}

/// Smallest grid-aligned instant `>= t`; an aligned instant stays put.
pub fn ceil_to_grid(t: Minutes, grid: u32) -> Minutes {
    let floored = floor_to_grid(t, grid);
    if floored == t { t } else { floored + grid as Minutes }
}

// ── Clock ─────────────────────────────────────────────────────────

/// Injected time source. Everything that needs "now" goes through this, so
/// tests can pin the clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Minutes;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Minutes {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        (secs / 60) as Minutes
    }
}

pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// Settable clock for deterministic tests.
#[cfg(test)]
pub struct FixedClock(std::sync::atomic::AtomicI64);

#[cfg(test)]
impl FixedClock {
    pub fn at(t: Minutes) -> Arc<Self> {
        Arc::new(Self(std::sync::atomic::AtomicI64::new(t)))
    }

    pub fn set(&self, t: Minutes) {
        self.0.store(t, std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> Minutes {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }
}
