use chrono::NaiveDate;

use crate::model::{DaySchedule, FreeSlot, Span};
use crate::time::{Minutes, ceil_to_grid, combine, floor_to_grid};

// ── Free-slot scan ────────────────────────────────────────────────

/// Candidate slots within this many minutes of the desired start qualify
/// for closest-slot matching.
const CLOSEST_WINDOW_MINUTES: i64 = 60;

/// Free slots of one business date.
///
/// Walks the booking grid from opening time (or, when opening already lies in
/// the past, from `now` rounded up to the next grid boundary) and emits one
/// slot per gap: the whole stretch up to the next booking, or the whole
/// remainder of the day. Grid steps inside an emitted gap or inside a booking
/// produce nothing.
///
/// `occupied` must be ascending by start and free of overlaps, the order the
/// store keeps bookings in.
pub fn free_slots(
    day: &DaySchedule,
    date: NaiveDate,
    occupied: &[Span],
    now: Minutes,
) -> Vec<FreeSlot> {
    if day.is_closed() {
        return Vec::new();
    }
    let grid = day.grid;
    let open = combine(date, day.open);
    let close = combine(date, day.close);

    let mut cursor = if now > open { ceil_to_grid(now, grid) } else { open };
    let mut slots = Vec::new();
    let mut idx = 0;

    while cursor < close {
        // Bookings entirely behind the cursor are spent.
        while idx < occupied.len() && occupied[idx].end <= cursor {
            idx += 1;
        }
        let Some(next) = occupied.get(idx) else {
            // Nothing ahead: the rest of the day is one slot.
            slots.push(FreeSlot {
                start: cursor,
                duration: (close - cursor) as u32,
            });
            break;
        };
        if next.contains_instant(cursor) {
            // Inside a booking: resume at its end floored to the grid, or one
            // step further when the floored end is still inside.
            let floored = floor_to_grid(next.end, grid);
            cursor = if floored < next.end {
                floored + grid as Minutes
            } else {
                floored
            };
        } else {
            // Gap: one slot covering the whole stretch to the next booking,
            // then skip the grid steps it covers.
            let gap = (next.start - cursor) as u32;
            slots.push(FreeSlot {
                start: cursor,
                duration: gap,
            });
            cursor += (gap.div_ceil(grid) * grid) as Minutes;
        }
    }
    slots
}

// ── Closest-slot search ───────────────────────────────────────────

/// Best slot for a desired start: long enough for the required duration,
/// within the match window, minimal distance. Ties go to the earlier slot.
pub fn closest_slot(
    slots: &[FreeSlot],
    required_duration: u32,
    desired: Minutes,
) -> Option<FreeSlot> {
    let mut best: Option<(i64, FreeSlot)> = None;
    for slot in slots {
        if slot.duration < required_duration {
            continue;
        }
        let diff = (slot.start - desired).abs();
        if diff > CLOSEST_WINDOW_MINUTES {
            continue;
        }
        // Strict < keeps the earliest slot on ties (slots arrive ascending).
        if best.is_none_or(|(b, _)| diff < b) {
            best = Some((diff, *slot));
        }
    }
    best.map(|(_, slot)| slot)
}
