use chrono::{Datelike, NaiveDate};

use crate::model::*;
use crate::time::DAY_MINUTES;

use super::EngineError;

pub(crate) fn validate_date(date: NaiveDate) -> Result<(), EngineError> {
    use crate::limits::*;
    if date.year() < MIN_VALID_YEAR || date.year() > MAX_VALID_YEAR {
        return Err(EngineError::Validation("date out of range"));
    }
    Ok(())
}

pub(crate) fn validate_booking(
    date: NaiveDate,
    start: Option<u32>,
    duration: u32,
    client: &str,
) -> Result<(), EngineError> {
    use crate::limits::*;
    validate_date(date)?;
    if duration == 0 {
        return Err(EngineError::Validation("duration must be positive"));
    }
    if duration > MAX_DURATION_MINUTES {
        return Err(EngineError::LimitExceeded("duration too long"));
    }
    if let Some(tod) = start
        && tod >= DAY_MINUTES {
            return Err(EngineError::Validation("start time out of range"));
        }
    if client.is_empty() {
        return Err(EngineError::Validation("missing client identifier"));
    }
    if client.len() > MAX_CLIENT_LEN {
        return Err(EngineError::LimitExceeded("client identifier too long"));
    }
    Ok(())
}

pub(crate) fn validate_schedule(
    weekday: u8,
    open: u32,
    close: u32,
    grid: u32,
) -> Result<(), EngineError> {
    if weekday > 6 {
        return Err(EngineError::Validation("weekday out of range"));
    }
    if grid == 0 {
        // Closed day; times are ignored.
        return Ok(());
    }
    if grid > DAY_MINUTES {
        return Err(EngineError::Validation("grid coarser than a day"));
    }
    if close > DAY_MINUTES || open >= close {
        return Err(EngineError::Validation("opening hours out of order"));
    }
    Ok(())
}

/// Reject a placement that overlaps any placed booking of the same date.
/// Same-start duplicates are the degenerate case, so the uniqueness race
/// between two concurrent inserts of one slot resolves here too.
pub(crate) fn check_slot_free(
    bs: &BusinessState,
    date: NaiveDate,
    span: &Span,
) -> Result<(), EngineError> {
    for booking in bs.bookings_on(date) {
        if let Some(existing) = booking.span()
            && existing.overlaps(span) {
                return Err(EngineError::SlotTaken(booking.id));
            }
    }
    Ok(())
}
