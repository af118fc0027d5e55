use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "bookd_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "bookd_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "bookd_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "bookd_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "bookd_connections_rejected_total";

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "bookd_tenants_active";

/// Counter: startup/auth failures.
pub const AUTH_FAILURES_TOTAL: &str = "bookd_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "bookd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "bookd_wal_flush_batch_size";

// ── Notification delivery ───────────────────────────────────────

/// Counter: waitlist offers dispatched after a cancellation.
pub const OFFERS_SENT_TOTAL: &str = "bookd_offers_sent_total";

/// Counter: appointment reminders delivered.
pub const REMINDERS_SENT_TOTAL: &str = "bookd_reminders_sent_total";

/// Counter: outbound messages the mailer failed to deliver.
pub const EMAILS_FAILED_TOTAL: &str = "bookd_emails_failed_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertBusiness { .. } => "insert_business",
        Command::DeleteBusiness { .. } => "delete_business",
        Command::UpsertSchedule { .. } => "upsert_schedule",
        Command::InsertAppointment { .. } => "insert_appointment",
        Command::InsertWaitlist { .. } => "insert_waitlist",
        Command::DeleteAppointment { .. } => "delete_appointment",
        Command::DeleteWaitlist { .. } => "delete_waitlist",
        Command::AcceptOffer { .. } => "accept_offer",
        Command::SelectBusinesses => "select_businesses",
        Command::SelectSchedules { .. } => "select_schedules",
        Command::SelectAppointments { .. } => "select_appointments",
        Command::SelectWaitlist { .. } => "select_waitlist",
        Command::SelectFreeSlots { .. } => "select_free_slots",
        Command::SelectClosestSlots { .. } => "select_closest_slots",
        Command::Listen { .. } => "listen",
    }
}
