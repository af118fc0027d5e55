use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use tracing::warn;
use ulid::Ulid;

use crate::engine::Engine;
use crate::mailer::Mailer;
use crate::time::{render_date, render_time_of_day, Minutes};

/// Reminders go out this many minutes ahead of the appointment.
pub const REMINDER_LEAD_MINUTES: Minutes = 15;

/// A side effect decided by the engine and executed by the dispatcher.
/// Mutations never block on delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SendEmail {
        to: String,
        subject: String,
        body: String,
    },
    /// Invite a waitlist entry into a slot a cancellation vacated.
    SendOffer {
        booking_id: Ulid,
        business_id: Ulid,
        client: String,
        date: NaiveDate,
        start: u32,
    },
    /// One-shot appointment reminder, re-checked when it fires.
    ScheduleReminder { booking_id: Ulid, fire_at: Minutes },
}

pub fn intent_channel() -> (mpsc::UnboundedSender<Intent>, mpsc::UnboundedReceiver<Intent>) {
    mpsc::unbounded_channel()
}

/// Drain one tenant's intent queue. Failures are logged and dropped; a
/// booking never rolls back because a notification could not leave.
pub async fn run_dispatcher(
    mut rx: mpsc::UnboundedReceiver<Intent>,
    engine: Arc<Engine>,
    mailer: Arc<dyn Mailer>,
) {
    while let Some(intent) = rx.recv().await {
        match intent {
            Intent::SendEmail { to, subject, body } => {
                deliver(&*mailer, &to, &subject, &body).await;
            }
            Intent::SendOffer {
                booking_id,
                business_id,
                client,
                date,
                start,
            } => {
                let payload = serde_json::json!({
                    "appointment": booking_id.to_string(),
                    "business": business_id.to_string(),
                    "date": render_date(date),
                    "start": render_time_of_day(start),
                });
                deliver(&*mailer, &client, "A slot opened up", &payload.to_string()).await;
                metrics::counter!(crate::observability::OFFERS_SENT_TOTAL).increment(1);
                tracing::debug!(
                    "offered {} {} to {client}",
                    render_date(date),
                    render_time_of_day(start)
                );
            }
            Intent::ScheduleReminder {
                booking_id,
                fire_at,
            } => {
                tokio::spawn(fire_reminder(
                    engine.clone(),
                    mailer.clone(),
                    booking_id,
                    fire_at,
                ));
            }
        }
    }
}

/// Sleep until the reminder is due, then re-check that the booking still
/// stands. Cancelled, completed, or re-waitlisted bookings fire nothing;
/// overdue reminders fire immediately.
async fn fire_reminder(
    engine: Arc<Engine>,
    mailer: Arc<dyn Mailer>,
    booking_id: Ulid,
    fire_at: Minutes,
) {
    let wait = fire_at - engine.clock.now();
    if wait > 0 {
        tokio::time::sleep(Duration::from_secs(wait as u64 * 60)).await;
    }
    let Some(appt) = engine.find_booking(booking_id).await else {
        tracing::debug!("reminder skip {booking_id}: booking gone");
        return;
    };
    let Some(start) = appt.start else {
        return;
    };
    if appt.completed {
        return;
    }
    let body = format!(
        "Reminder: your appointment on {} at {}.",
        render_date(appt.date),
        render_time_of_day(start),
    );
    deliver(&*mailer, &appt.client, "Appointment reminder", &body).await;
    metrics::counter!(crate::observability::REMINDERS_SENT_TOTAL).increment(1);
}

/// Best-effort send; a failed delivery costs a warning and a counter tick.
async fn deliver(mailer: &dyn Mailer, to: &str, subject: &str, body: &str) {
    if let Err(e) = mailer.send(to, subject, body).await {
        metrics::counter!(crate::observability::EMAILS_FAILED_TOTAL).increment(1);
        warn!("notification to {to} failed: {e}");
    }
}
