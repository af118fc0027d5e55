use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::dispatch::{Intent, REMINDER_LEAD_MINUTES};
use crate::limits::*;
use crate::model::*;
use crate::time::{combine, render_date, render_time_of_day, weekday_index, Minutes, DAY_MINUTES};

use super::availability::free_slots;
use super::conflict::{check_slot_free, validate_booking, validate_schedule};
use super::{Engine, EngineError, SharedBusinessState, WalCommand};

impl Engine {
    pub async fn create_business(
        &self,
        id: Ulid,
        name: String,
        owner: String,
    ) -> Result<(), EngineError> {
        if self.state.len() >= MAX_BUSINESSES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many businesses"));
        }
        if name.is_empty() {
            return Err(EngineError::Validation("missing business name"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("business name too long"));
        }
        if owner.is_empty() {
            return Err(EngineError::Validation("missing owner contact"));
        }
        if owner.len() > MAX_CLIENT_LEN {
            return Err(EngineError::LimitExceeded("owner contact too long"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.names.contains_key(&name) {
            return Err(EngineError::NameTaken(name));
        }

        let event = Event::BusinessCreated {
            id,
            name: name.clone(),
            owner: owner.clone(),
        };
        self.wal_append(&event).await?;
        let bs = BusinessState::new(id, name.clone(), owner);
        self.names.insert(name, id);
        self.state.insert(id, Arc::new(RwLock::new(bs)));
        self.notify.send(id, &event);
        Ok(())
    }

    /// Delete a business together with its schedule and every booking on it.
    pub async fn delete_business(&self, id: Ulid) -> Result<(), EngineError> {
        let bs = self.get_business(&id).ok_or(EngineError::NotFound(id))?;
        let guard = bs.read().await;
        let name = guard.name.clone();
        let booking_ids: Vec<Ulid> = guard.bookings.iter().map(|b| b.id).collect();
        drop(guard);

        let event = Event::BusinessDeleted { id };
        self.wal_append(&event).await?;
        self.state.remove(&id);
        self.names.remove(&name);
        for booking_id in booking_ids {
            self.booking_to_business.remove(&booking_id);
        }
        // Announce the deletion, then close the channel.
        self.notify.send(id, &event);
        self.notify.remove(id);
        Ok(())
    }

    /// Replace one weekday's opening hours. `grid == 0` closes the day.
    pub async fn set_schedule(
        &self,
        business_id: Ulid,
        weekday: u8,
        open: u32,
        close: u32,
        grid: u32,
    ) -> Result<(), EngineError> {
        validate_schedule(weekday, open, close, grid)?;
        let bs = self
            .get_business(&business_id)
            .ok_or(EngineError::NotFound(business_id))?;
        let mut guard = bs.write().await;
        let event = Event::ScheduleSet {
            business_id,
            weekday,
            open,
            close,
            grid,
        };
        self.persist_and_apply(business_id, &mut guard, &event).await
    }

    /// Place a booking. `start == None` joins the date's waiting list, which
    /// occupies nothing and never conflicts.
    pub async fn book_appointment(
        &self,
        id: Ulid,
        business_id: Ulid,
        date: NaiveDate,
        start: Option<u32>,
        duration: u32,
        price: u32,
        client: String,
    ) -> Result<(), EngineError> {
        validate_booking(date, start, duration, &client)?;
        if self.booking_to_business.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let bs = self
            .get_business(&business_id)
            .ok_or(EngineError::NotFound(business_id))?;
        let mut guard = bs.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_BUSINESS {
            return Err(EngineError::LimitExceeded("too many bookings on business"));
        }
        if let Some(tod) = start {
            let s = combine(date, tod);
            let span = Span::new(s, s + duration as Minutes);
            check_slot_free(&guard, date, &span)?;
        }

        let event = Event::BookingAdded {
            id,
            business_id,
            date,
            start,
            duration,
            price,
            client: client.clone(),
        };
        self.persist_and_apply(business_id, &mut guard, &event).await?;

        match start {
            Some(tod) => {
                self.emit(Intent::SendEmail {
                    to: client,
                    subject: format!("Appointment confirmed at {}", guard.name),
                    body: format!(
                        "Your {duration} minute appointment on {} at {} is confirmed.",
                        render_date(date),
                        render_time_of_day(tod),
                    ),
                });
                self.emit(Intent::ScheduleReminder {
                    booking_id: id,
                    fire_at: combine(date, tod) - REMINDER_LEAD_MINUTES,
                });
                self.notify_if_full(&guard, date);
            }
            None => {
                self.emit(Intent::SendEmail {
                    to: client,
                    subject: format!("Waiting list of {}", guard.name),
                    body: format!(
                        "You joined the waiting list of {} for {}.",
                        guard.name,
                        render_date(date),
                    ),
                });
            }
        }
        Ok(())
    }

    /// Owner heads-up once a date has no bookable slot left.
    fn notify_if_full(&self, bs: &BusinessState, date: NaiveDate) {
        let day = bs.week.day(weekday_index(date));
        if day.is_closed() {
            return;
        }
        let slots = free_slots(&day, date, &bs.occupied_on(date), self.clock.now());
        if slots.is_empty() {
            self.emit(Intent::SendEmail {
                to: bs.owner.clone(),
                subject: format!("Schedule full at {}", bs.name),
                body: format!("{} is fully booked on {}.", bs.name, render_date(date)),
            });
        }
    }

    /// Cancel a booking. Cancelling a placed appointment offers the vacated
    /// start to every waitlist entry of that date that fits inside it, and
    /// tells the owner.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (business_id, mut guard) = self.resolve_booking_write(&id).await?;
        let cancelled = guard
            .booking(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        let event = Event::BookingCancelled { id, business_id };
        self.persist_and_apply(business_id, &mut guard, &event).await?;

        if let BookingKind::Regular { start, .. } = cancelled.kind {
            for entry in guard.waitlist_on(cancelled.date) {
                if entry.duration <= cancelled.duration {
                    self.emit(Intent::SendOffer {
                        booking_id: entry.id,
                        business_id,
                        client: entry.client.clone(),
                        date: cancelled.date,
                        start,
                    });
                }
            }
            self.emit(Intent::SendEmail {
                to: guard.owner.clone(),
                subject: format!("Cancellation at {}", guard.name),
                body: format!(
                    "{} cancelled the {} {} appointment.",
                    cancelled.client,
                    render_date(cancelled.date),
                    render_time_of_day(start),
                ),
            });
        }
        Ok(business_id)
    }

    /// Move a waitlist entry into a concrete slot, normally the one a
    /// cancellation just vacated. The slot is re-checked under the business
    /// lock, so of several invitees the first acceptance wins.
    pub async fn accept_offer(&self, id: Ulid, start: u32) -> Result<(), EngineError> {
        if start >= DAY_MINUTES {
            return Err(EngineError::Validation("start time out of range"));
        }
        let (business_id, mut guard) = self.resolve_booking_write(&id).await?;
        let booking = guard
            .booking(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;
        if booking.is_regular() {
            return Err(EngineError::Validation("not a waitlist entry"));
        }
        let s = combine(booking.date, start);
        if s < self.clock.now() {
            return Err(EngineError::Validation("offered time already passed"));
        }
        let span = Span::new(s, s + booking.duration as Minutes);
        check_slot_free(&guard, booking.date, &span)?;

        let event = Event::OfferAccepted {
            id,
            business_id,
            start,
        };
        self.persist_and_apply(business_id, &mut guard, &event).await?;

        self.emit(Intent::SendEmail {
            to: booking.client,
            subject: format!("Appointment confirmed at {}", guard.name),
            body: format!(
                "Your {} minute appointment on {} at {} is confirmed.",
                booking.duration,
                render_date(booking.date),
                render_time_of_day(start),
            ),
        });
        self.emit(Intent::ScheduleReminder {
            booking_id: id,
            fire_at: s - REMINDER_LEAD_MINUTES,
        });
        self.notify_if_full(&guard, booking.date);
        Ok(())
    }

    /// Flag a placed appointment as done. Safe to repeat; the flag only moves
    /// one way.
    pub async fn mark_completed(&self, id: Ulid) -> Result<(), EngineError> {
        let (business_id, mut guard) = self.resolve_booking_write(&id).await?;
        match guard.booking(id) {
            None => return Err(EngineError::NotFound(id)),
            Some(b) if !b.is_regular() || b.completed() => return Ok(()),
            Some(_) => {}
        }
        let event = Event::BookingCompleted { id, business_id };
        self.persist_and_apply(business_id, &mut guard, &event).await
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let businesses: Vec<SharedBusinessState> =
            self.state.iter().map(|e| e.value().clone()).collect();

        let mut events = Vec::new();
        for bs_arc in businesses {
            let bs = bs_arc.read().await;
            events.push(Event::BusinessCreated {
                id: bs.id,
                name: bs.name.clone(),
                owner: bs.owner.clone(),
            });
            for (weekday, day) in bs.week.days() {
                // Closed is the default; replay restores it by omission.
                if day.is_closed() {
                    continue;
                }
                events.push(Event::ScheduleSet {
                    business_id: bs.id,
                    weekday: weekday as u8,
                    open: day.open,
                    close: day.close,
                    grid: day.grid,
                });
            }
            for booking in &bs.bookings {
                events.push(Event::BookingAdded {
                    id: booking.id,
                    business_id: bs.id,
                    date: booking.date,
                    start: booking.start(),
                    duration: booking.duration,
                    price: booking.price,
                    client: booking.client.clone(),
                });
                if booking.completed() {
                    events.push(Event::BookingCompleted {
                        id: booking.id,
                        business_id: bs.id,
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
