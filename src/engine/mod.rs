mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{closest_slot, free_slots};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::dispatch::{Intent, REMINDER_LEAD_MINUTES};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::time::{Clock, combine};
use crate::wal::Wal;

pub type SharedBusinessState = Arc<RwLock<BusinessState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            commit_batch(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                if !batch.is_empty() {
                    commit_batch(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

/// Flush one batch to disk, record metrics, answer every waiter.
fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &[(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

pub struct Engine {
    pub state: DashMap<Ulid, SharedBusinessState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub clock: Arc<dyn Clock>,
    /// Reverse lookup: booking id → business id.
    pub(super) booking_to_business: DashMap<Ulid, Ulid>,
    /// Business name → id, kept unique.
    pub(super) names: DashMap<String, Ulid>,
    pub(super) intents: mpsc::UnboundedSender<Intent>,
}

/// Apply an event directly to a BusinessState (no locking; caller holds the lock).
fn apply_to_business(bs: &mut BusinessState, event: &Event, booking_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::ScheduleSet {
            weekday,
            open,
            close,
            grid,
            ..
        } => {
            bs.week.set_day(
                *weekday as usize,
                DaySchedule {
                    open: *open,
                    close: *close,
                    grid: *grid,
                },
            );
        }
        Event::BookingAdded {
            id,
            business_id,
            date,
            start,
            duration,
            price,
            client,
        } => {
            let kind = match start {
                Some(tod) => BookingKind::Regular {
                    start: *tod,
                    completed: false,
                },
                None => BookingKind::Waitlist,
            };
            bs.insert_booking(Booking {
                id: *id,
                date: *date,
                kind,
                duration: *duration,
                price: *price,
                client: client.clone(),
            });
            booking_map.insert(*id, *business_id);
        }
        Event::BookingCancelled { id, .. } => {
            bs.remove_booking(*id);
            booking_map.remove(id);
        }
        Event::BookingCompleted { id, .. } => {
            if let Some(booking) = bs.booking_mut(*id)
                && let BookingKind::Regular { completed, .. } = &mut booking.kind
            {
                *completed = true;
            }
        }
        Event::OfferAccepted { id, start, .. } => {
            // Remove and re-insert so the booking lands at its new sort
            // position among the date's regulars.
            if let Some(mut booking) = bs.remove_booking(*id) {
                booking.kind = BookingKind::Regular {
                    start: *start,
                    completed: false,
                };
                bs.insert_booking(booking);
            }
        }
        // Created/Deleted are handled at the DashMap level, not here
        Event::BusinessCreated { .. } | Event::BusinessDeleted { .. } => {}
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        clock: Arc<dyn Clock>,
        intents: mpsc::UnboundedSender<Intent>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            clock,
            booking_to_business: DashMap::new(),
            names: DashMap::new(),
            intents,
        };

        // Replay events: we're the sole owner of these Arcs, so try_read/try_write
        // always succeed instantly (no contention). Never use blocking_read/blocking_write
        // here because this may run inside an async context (e.g. lazy tenant creation).
        for event in &events {
            match event {
                Event::BusinessCreated { id, name, owner } => {
                    let bs = BusinessState::new(*id, name.clone(), owner.clone());
                    engine.names.insert(name.clone(), *id);
                    engine.state.insert(*id, Arc::new(RwLock::new(bs)));
                }
                Event::BusinessDeleted { id } => {
                    if let Some((_, bs_arc)) = engine.state.remove(id) {
                        let bs = bs_arc.try_read().expect("replay: uncontended read");
                        engine.names.remove(&bs.name);
                        for booking in &bs.bookings {
                            engine.booking_to_business.remove(&booking.id);
                        }
                    }
                }
                other => {
                    if let Some(business_id) = event_business_id(other)
                        && let Some(entry) = engine.state.get(&business_id)
                    {
                        let bs_arc = entry.clone();
                        let mut guard = bs_arc.try_write().expect("replay: uncontended write");
                        apply_to_business(&mut guard, other, &engine.booking_to_business);
                    }
                }
            }
        }

        engine.schedule_startup_reminders();
        Ok(engine)
    }

    /// Re-arm one-shot reminders for appointments that are still ahead of us.
    /// Pending reminders do not survive a restart any other way.
    fn schedule_startup_reminders(&self) {
        let now = self.clock.now();
        let mut scheduled = 0u32;
        for entry in self.state.iter() {
            let bs = entry.value().try_read().expect("replay: uncontended read");
            for booking in &bs.bookings {
                if let BookingKind::Regular {
                    start,
                    completed: false,
                } = booking.kind
                {
                    let start_abs = combine(booking.date, start);
                    if start_abs > now {
                        self.emit(Intent::ScheduleReminder {
                            booking_id: booking.id,
                            fire_at: start_abs - REMINDER_LEAD_MINUTES,
                        });
                        scheduled += 1;
                    }
                }
            }
        }
        if scheduled > 0 {
            tracing::info!("re-armed {scheduled} appointment reminders after replay");
        }
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_business(&self, id: &Ulid) -> Option<SharedBusinessState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn business_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_business.get(booking_id).map(|e| *e.value())
    }

    /// Hand a notification intent to the dispatcher. Delivery is best-effort;
    /// a missing dispatcher only costs the side effect, never the mutation.
    pub(super) fn emit(&self, intent: Intent) {
        if self.intents.send(intent).is_err() {
            tracing::warn!("intent dispatcher gone; notification dropped");
        }
    }

    /// WAL-append + apply + notify in one call. Eliminates the repeated 3-line pattern.
    pub(super) async fn persist_and_apply(
        &self,
        business_id: Ulid,
        bs: &mut BusinessState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_business(bs, event, &self.booking_to_business);
        self.notify.send(business_id, event);
        Ok(())
    }

    /// Lookup booking → business, get business, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<BusinessState>), EngineError> {
        let business_id = self
            .business_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let bs = self
            .get_business(&business_id)
            .ok_or(EngineError::NotFound(business_id))?;
        let guard = bs.write_owned().await;
        Ok((business_id, guard))
    }
}

/// Extract the business_id from an event (for non-Create/Delete events).
fn event_business_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ScheduleSet { business_id, .. }
        | Event::BookingAdded { business_id, .. }
        | Event::BookingCancelled { business_id, .. }
        | Event::BookingCompleted { business_id, .. }
        | Event::OfferAccepted { business_id, .. } => Some(*business_id),
        Event::BusinessCreated { .. } | Event::BusinessDeleted { .. } => None,
    }
}
