use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::time::{Minutes, combine, render_time_of_day};

/// Half-open interval `[start, end)` in absolute minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Minutes,
    pub end: Minutes,
}

impl Span {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> i64 {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Minutes) -> bool {
        self.start <= t && t < self.end
    }
}

/// Sort key for waitlist entries: one minute past any real time-of-day, so a
/// date's waitlist sorts after its placed bookings (the classic `25:00`).
pub const WAITLIST_SORT_TOD: u32 = 25 * 60;

/// What a booking occupies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingKind {
    /// Placed at a fixed start time-of-day; occupies `[start, start+duration)`.
    Regular { start: u32, completed: bool },
    /// Waiting for a slot to open up; occupies nothing.
    Waitlist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub date: NaiveDate,
    pub kind: BookingKind,
    /// Total service duration in minutes.
    pub duration: u32,
    /// Total price in whole currency units.
    pub price: u32,
    /// Client identifier (an email address).
    pub client: String,
}

impl Booking {
    pub fn is_regular(&self) -> bool {
        matches!(self.kind, BookingKind::Regular { .. })
    }

    pub fn start(&self) -> Option<u32> {
        match self.kind {
            BookingKind::Regular { start, .. } => Some(start),
            BookingKind::Waitlist => None,
        }
    }

    pub fn completed(&self) -> bool {
        matches!(self.kind, BookingKind::Regular { completed: true, .. })
    }

    /// Time-of-day used for intra-date ordering; waitlist entries sort last.
    pub fn sort_tod(&self) -> u32 {
        self.start().unwrap_or(WAITLIST_SORT_TOD)
    }

    /// Occupied interval in absolute minutes; `None` for waitlist entries.
    pub fn span(&self) -> Option<Span> {
        self.start().map(|start| {
            let s = combine(self.date, start);
            Span::new(s, s + self.duration as Minutes)
        })
    }

    /// External rendering of the start time; waitlist entries keep the
    /// sentinel the clients already understand.
    pub fn render_start(&self) -> String {
        match self.start() {
            Some(tod) => render_time_of_day(tod),
            None => render_time_of_day(WAITLIST_SORT_TOD),
        }
    }
}

/// One weekday's opening hours. `grid == 0` means closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    /// Opening time, minutes since midnight.
    pub open: u32,
    /// Closing time, minutes since midnight.
    pub close: u32,
    /// Slot granularity in minutes.
    pub grid: u32,
}

impl DaySchedule {
    pub fn is_closed(&self) -> bool {
        self.grid == 0
    }
}

/// Opening hours for all seven weekdays, indexed 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekSchedule([DaySchedule; 7]);

impl WeekSchedule {
    pub fn day(&self, weekday: usize) -> DaySchedule {
        self.0[weekday]
    }

    pub fn set_day(&mut self, weekday: usize, day: DaySchedule) {
        self.0[weekday] = day;
    }

    pub fn days(&self) -> impl Iterator<Item = (usize, DaySchedule)> {
        self.0.iter().copied().enumerate()
    }
}

#[derive(Debug, Clone)]
pub struct BusinessState {
    pub id: Ulid,
    pub name: String,
    /// Owner contact (an email address); receives cancellation and
    /// schedule-full notices.
    pub owner: String,
    pub week: WeekSchedule,
    /// All bookings, sorted by `(date, sort_tod)`.
    pub bookings: Vec<Booking>,
}

impl BusinessState {
    pub fn new(id: Ulid, name: String, owner: String) -> Self {
        Self {
            id,
            name,
            owner,
            week: WeekSchedule::default(),
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining `(date, sort_tod)` order.
    pub fn insert_booking(&mut self, booking: Booking) {
        let key = (booking.date, booking.sort_tod());
        let pos = self
            .bookings
            .binary_search_by_key(&key, |b| (b.date, b.sort_tod()))
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        if let Some(pos) = self.bookings.iter().position(|b| b.id == id) {
            Some(self.bookings.remove(pos))
        } else {
            None
        }
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// All bookings of one date as a sorted slice (regulars first, then the
    /// date's waitlist).
    pub fn bookings_on(&self, date: NaiveDate) -> &[Booking] {
        let lo = self.bookings.partition_point(|b| b.date < date);
        let hi = self.bookings.partition_point(|b| b.date <= date);
        &self.bookings[lo..hi]
    }

    /// Occupied intervals of one date, ascending by start.
    pub fn occupied_on(&self, date: NaiveDate) -> Vec<Span> {
        self.bookings_on(date)
            .iter()
            .filter_map(|b| b.span())
            .collect()
    }

    pub fn waitlist_on(&self, date: NaiveDate) -> impl Iterator<Item = &Booking> {
        self.bookings_on(date).iter().filter(|b| !b.is_regular())
    }
}

/// The event types: flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BusinessCreated {
        id: Ulid,
        name: String,
        owner: String,
    },
    BusinessDeleted {
        id: Ulid,
    },
    ScheduleSet {
        business_id: Ulid,
        weekday: u8,
        open: u32,
        close: u32,
        grid: u32,
    },
    BookingAdded {
        id: Ulid,
        business_id: Ulid,
        date: NaiveDate,
        /// `None` places the booking on the waitlist.
        start: Option<u32>,
        duration: u32,
        price: u32,
        client: String,
    },
    BookingCancelled {
        id: Ulid,
        business_id: Ulid,
    },
    BookingCompleted {
        id: Ulid,
        business_id: Ulid,
    },
    OfferAccepted {
        id: Ulid,
        business_id: Ulid,
        start: u32,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessInfo {
    pub id: Ulid,
    pub name: String,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleInfo {
    pub business_id: Ulid,
    pub weekday: u8,
    pub open: u32,
    pub close: u32,
    pub grid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentInfo {
    pub id: Ulid,
    pub business_id: Ulid,
    pub date: NaiveDate,
    pub start: Option<u32>,
    pub duration: u32,
    pub price: u32,
    pub client: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitlistInfo {
    pub id: Ulid,
    pub business_id: Ulid,
    pub date: NaiveDate,
    pub duration: u32,
    pub price: u32,
    pub client: String,
}

/// One bookable gap produced by the free-slot scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSlot {
    pub start: Minutes,
    pub duration: u32,
}

/// Best slot of one business for a closest-slot search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosestSlot {
    pub business_id: Ulid,
    pub start: Minutes,
    pub duration: u32,
}
