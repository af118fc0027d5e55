use std::sync::Arc;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::time::{combine, weekday_index, Minutes};

use super::availability::{closest_slot, free_slots};
use super::conflict::validate_date;
use super::{Engine, EngineError, SharedBusinessState};

fn to_info(business_id: Ulid, b: &Booking) -> AppointmentInfo {
    AppointmentInfo {
        id: b.id,
        business_id,
        date: b.date,
        start: b.start(),
        duration: b.duration,
        price: b.price,
        client: b.client.clone(),
        completed: b.completed(),
    }
}

impl Engine {
    /// Free slots of one business on one date. Unknown businesses and closed
    /// days both read as "nothing free", never as errors.
    pub async fn compute_free_slots(
        &self,
        business_id: Ulid,
        date: NaiveDate,
        min_duration: Option<u32>,
    ) -> Result<Vec<FreeSlot>, EngineError> {
        validate_date(date)?;
        let bs = match self.get_business(&business_id) {
            Some(bs) => bs,
            None => return Ok(vec![]),
        };
        let guard = bs.read().await;
        let day = guard.week.day(weekday_index(date));
        let mut slots = free_slots(&day, date, &guard.occupied_on(date), self.clock.now());

        if let Some(min) = min_duration {
            slots.retain(|s| s.duration >= min);
        }

        Ok(slots)
    }

    /// Nearest adequate slot per business around a desired start. Businesses
    /// with nothing close enough contribute no row.
    pub async fn compute_closest_slots(
        &self,
        business_ids: &[Ulid],
        date: NaiveDate,
        near: u32,
        duration: u32,
    ) -> Result<Vec<ClosestSlot>, EngineError> {
        validate_date(date)?;
        if business_ids.len() > MAX_IN_CLAUSE_IDS {
            return Err(EngineError::LimitExceeded("too many business IDs"));
        }
        let desired = combine(date, near);
        let now = self.clock.now();

        let mut out = Vec::new();
        for business_id in business_ids {
            let bs = match self.get_business(business_id) {
                Some(bs) => bs,
                None => continue,
            };
            let guard = bs.read().await;
            let day = guard.week.day(weekday_index(date));
            let slots = free_slots(&day, date, &guard.occupied_on(date), now);
            if let Some(found) = closest_slot(&slots, duration, desired) {
                out.push(ClosestSlot {
                    business_id: *business_id,
                    start: found.start,
                    duration: found.duration,
                });
            }
        }
        Ok(out)
    }

    pub async fn list_businesses(&self) -> Vec<BusinessInfo> {
        let businesses: Vec<SharedBusinessState> =
            self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(businesses.len());
        for bs in businesses {
            let guard = bs.read().await;
            out.push(BusinessInfo {
                id: guard.id,
                name: guard.name.clone(),
                owner: guard.owner.clone(),
            });
        }
        // DashMap iteration order is arbitrary; ULIDs sort by creation.
        out.sort_by_key(|b| b.id);
        out
    }

    /// The seven weekday rows of one business, Sunday first.
    pub async fn get_schedules(&self, business_id: Ulid) -> Result<Vec<ScheduleInfo>, EngineError> {
        let bs = match self.get_business(&business_id) {
            Some(bs) => bs,
            None => return Ok(vec![]),
        };
        let guard = bs.read().await;
        Ok(guard
            .week
            .days()
            .map(|(weekday, day)| ScheduleInfo {
                business_id,
                weekday: weekday as u8,
                open: day.open,
                close: day.close,
                grid: day.grid,
            })
            .collect())
    }

    /// Placed appointments of one business, optionally narrowed to one date.
    /// Listing is also where overdue appointments pick up their completed
    /// flag.
    pub async fn appointments_for_business(
        self: &Arc<Self>,
        business_id: Ulid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<AppointmentInfo>, EngineError> {
        if let Some(d) = date {
            validate_date(d)?;
        }
        let bs = match self.get_business(&business_id) {
            Some(bs) => bs,
            None => return Ok(vec![]),
        };
        let guard = bs.read().await;
        let rows: Vec<AppointmentInfo> = guard
            .bookings
            .iter()
            .filter(|b| b.is_regular() && date.is_none_or(|d| b.date == d))
            .map(|b| to_info(business_id, b))
            .collect();
        drop(guard);
        Ok(self.sweep_completed(rows))
    }

    /// Every appointment one client holds, across all businesses.
    pub async fn appointments_for_client(self: &Arc<Self>, client: &str) -> Vec<AppointmentInfo> {
        let businesses: Vec<SharedBusinessState> =
            self.state.iter().map(|e| e.value().clone()).collect();
        let mut rows = Vec::new();
        for bs in businesses {
            let guard = bs.read().await;
            rows.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.is_regular() && b.client == client)
                    .map(|b| to_info(guard.id, b)),
            );
        }
        rows.sort_by_key(|r| (r.date, r.start));
        self.sweep_completed(rows)
    }

    /// Waiting list of one business, optionally narrowed to one date.
    pub async fn get_waitlist(
        &self,
        business_id: Ulid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<WaitlistInfo>, EngineError> {
        if let Some(d) = date {
            validate_date(d)?;
        }
        let bs = match self.get_business(&business_id) {
            Some(bs) => bs,
            None => return Ok(vec![]),
        };
        let guard = bs.read().await;
        Ok(guard
            .bookings
            .iter()
            .filter(|b| !b.is_regular() && date.is_none_or(|d| b.date == d))
            .map(|b| WaitlistInfo {
                id: b.id,
                business_id,
                date: b.date,
                duration: b.duration,
                price: b.price,
                client: b.client.clone(),
            })
            .collect())
    }

    /// Point lookup across businesses; the dispatcher re-checks bookings this
    /// way right before a reminder fires.
    pub async fn find_booking(&self, id: Ulid) -> Option<AppointmentInfo> {
        let business_id = self.business_for_booking(&id)?;
        let bs = self.get_business(&business_id)?;
        let guard = bs.read().await;
        guard.booking(id).map(|b| to_info(business_id, b))
    }

    /// Flag every appointment whose end lies behind the clock and kick off
    /// persistence of each flag. Readers see the completed state in the rows
    /// they were handed; the log catches up in the background.
    fn sweep_completed(self: &Arc<Self>, mut rows: Vec<AppointmentInfo>) -> Vec<AppointmentInfo> {
        let now = self.clock.now();
        for row in &mut rows {
            let Some(start) = row.start else { continue };
            if row.completed {
                continue;
            }
            if combine(row.date, start) + row.duration as Minutes <= now {
                row.completed = true;
                let engine = self.clone();
                let id = row.id;
                tokio::spawn(async move {
                    if let Err(e) = engine.mark_completed(id).await {
                        tracing::debug!("completion sweep for {id} failed: {e}");
                    }
                });
            }
        }
        rows
    }
}
