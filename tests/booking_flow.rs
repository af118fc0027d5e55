use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use bookd::mailer::LogMailer;
use bookd::tenant::TenantManager;
use bookd::time::system_clock;
use bookd::wire;

// All booking dates lie far in the future so the completion sweep (which runs
// against the wall clock) never touches them. 2030-06-04 is a Tuesday
// (weekday 2), 2030-06-01 a Saturday (weekday 6).
const TUESDAY: &str = "2030-06-04";
const SATURDAY: &str = "2030-06-01";

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<TenantManager>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("bookd_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(
        dir,
        1000,
        system_clock(),
        Arc::new(LogMailer),
    ));

    let tm2 = tm.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm2.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, "bookd".to_string(), None).await;
            });
        }
    });

    (addr, tm)
}

async fn connect_db(addr: SocketAddr, dbname: &str) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(dbname)
        .user("bookd")
        .password("bookd");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn connect(addr: SocketAddr) -> tokio_postgres::Client {
    connect_db(addr, "test").await
}

fn data_rows(messages: Vec<SimpleQueryMessage>) -> Vec<SimpleQueryRow> {
    messages
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

/// Create a business and open the given weekdays 09:00-17:00 on a 30-minute
/// grid. Business names are unique per tenant, so each call needs its own.
async fn seed_business(client: &tokio_postgres::Client, name: &str, weekdays: &[u8]) -> Ulid {
    let biz = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO businesses (id, name, owner) VALUES ('{biz}', '{name}', 'Marta')"
        ))
        .await
        .unwrap();
    for wd in weekdays {
        client
            .batch_execute(&format!(
                "INSERT INTO schedules (business_id, weekday, open_time, close_time, grid) \
                 VALUES ('{biz}', {wd}, '09:00', '17:00', 30)"
            ))
            .await
            .unwrap();
    }
    biz
}

async fn book(
    client: &tokio_postgres::Client,
    biz: Ulid,
    date: &str,
    start: &str,
    duration: u32,
    who: &str,
) -> Ulid {
    let id = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO appointments (id, business_id, date, start, duration, price, client) \
             VALUES ('{id}', '{biz}', '{date}', '{start}', {duration}, 45, '{who}')"
        ))
        .await
        .unwrap();
    id
}

// ── Businesses and schedules ─────────────────────────────────

#[tokio::test]
async fn create_business_and_list() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let biz = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO businesses (id, name, owner) VALUES ('{biz}', 'Cut & Go', 'Rita')"
        ))
        .await
        .unwrap();

    let rows = data_rows(
        client
            .simple_query("SELECT * FROM businesses")
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(0), Some(biz.to_string().as_str()));
    assert_eq!(rows[0].get(1), Some("Cut & Go"));
    assert_eq!(rows[0].get(2), Some("Rita"));
}

#[tokio::test]
async fn delete_business_removes_it() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let biz = seed_business(&client, "Fade Away", &[2]).await;
    client
        .batch_execute(&format!("DELETE FROM businesses WHERE id = '{biz}'"))
        .await
        .unwrap();

    let rows = data_rows(
        client
            .simple_query("SELECT * FROM businesses")
            .await
            .unwrap(),
    );
    assert!(rows.is_empty());
}

#[tokio::test]
async fn schedule_listing_has_seven_weekday_rows() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let biz = seed_business(&client, "Shear Genius", &[2]).await;
    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM schedules WHERE business_id = '{biz}'"
            ))
            .await
            .unwrap(),
    );

    // Sunday first; only Tuesday was opened, the rest read as closed.
    assert_eq!(rows.len(), 7);
    assert_eq!(rows[2].get(1), Some("2"));
    assert_eq!(rows[2].get(2), Some("09:00"));
    assert_eq!(rows[2].get(3), Some("17:00"));
    assert_eq!(rows[2].get(4), Some("30"));
    assert_eq!(rows[0].get(4), Some("0"));
}

// ── Free slots ───────────────────────────────────────────────

#[tokio::test]
async fn booking_splits_free_slots() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    let biz = seed_business(&client, "Combing Attractions", &[2]).await;

    let q = format!("SELECT * FROM free_slots WHERE business_id = '{biz}' AND date = '{TUESDAY}'");
    let rows = data_rows(client.simple_query(&q).await.unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(2), Some("09:00"));
    assert_eq!(rows[0].get(3), Some("480"));

    book(&client, biz, TUESDAY, "10:00", 60, "Ana").await;

    let rows = data_rows(client.simple_query(&q).await.unwrap());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get(2), Some("09:00"));
    assert_eq!(rows[0].get(3), Some("60"));
    assert_eq!(rows[1].get(2), Some("11:00"));
    assert_eq!(rows[1].get(3), Some("360"));
}

#[tokio::test]
async fn min_duration_filters_short_gaps() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    let biz = seed_business(&client, "The Mane Event", &[2]).await;

    book(&client, biz, TUESDAY, "10:00", 60, "Ana").await;

    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM free_slots WHERE business_id = '{biz}' \
                 AND date = '{TUESDAY}' AND min_duration = 120"
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(2), Some("11:00"));
}

#[tokio::test]
async fn closed_day_has_no_slots() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    let biz = seed_business(&client, "Clip Joint", &[2]).await;

    // Saturday is closed: an empty listing, not an error.
    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM free_slots WHERE business_id = '{biz}' AND date = '{SATURDAY}'"
            ))
            .await
            .unwrap(),
    );
    assert!(rows.is_empty());
}

// ── Booking conflicts and errors ─────────────────────────────

#[tokio::test]
async fn overlapping_booking_rejected() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    let biz = seed_business(&client, "Lather Up", &[2]).await;

    book(&client, biz, TUESDAY, "10:00", 60, "Ana").await;

    let other = Ulid::new();
    let err = client
        .batch_execute(&format!(
            "INSERT INTO appointments (id, business_id, date, start, duration, price, client) \
             VALUES ('{other}', '{biz}', '{TUESDAY}', '10:30', 30, 45, 'Bela')"
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::UNIQUE_VIOLATION));
}

#[tokio::test]
async fn zero_duration_booking_rejected() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    let biz = seed_business(&client, "Buzzed", &[2]).await;

    let id = Ulid::new();
    let err = client
        .batch_execute(&format!(
            "INSERT INTO appointments (id, business_id, date, start, duration, price, client) \
             VALUES ('{id}', '{biz}', '{TUESDAY}', '10:00', 0, 45, 'Ana')"
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::RAISE_EXCEPTION));
}

#[tokio::test]
async fn cancel_restores_the_slot() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    let biz = seed_business(&client, "Scissor Sisters", &[2]).await;

    let appt = book(&client, biz, TUESDAY, "10:00", 60, "Ana").await;
    client
        .batch_execute(&format!("DELETE FROM appointments WHERE id = '{appt}'"))
        .await
        .unwrap();

    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM free_slots WHERE business_id = '{biz}' AND date = '{TUESDAY}'"
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(3), Some("480"));
}

#[tokio::test]
async fn cancel_unknown_booking_is_not_found() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let id = Ulid::new();
    let err = client
        .batch_execute(&format!("DELETE FROM appointments WHERE id = '{id}'"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::NO_DATA_FOUND));
}

// ── Waitlist ─────────────────────────────────────────────────

#[tokio::test]
async fn waitlist_entry_can_take_over_a_cancelled_slot() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    let biz = seed_business(&client, "Curl Up and Dye", &[2]).await;

    let appt = book(&client, biz, TUESDAY, "10:00", 30, "Ana").await;

    let wl = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO waitlist (id, business_id, date, duration, price, client) \
             VALUES ('{wl}', '{biz}', '{TUESDAY}', 30, 25, 'Wanda')"
        ))
        .await
        .unwrap();

    // The waiting list holds the entry; appointment listings do not.
    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM waitlist WHERE business_id = '{biz}'"
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(5), Some("Wanda"));

    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM appointments WHERE business_id = '{biz}'"
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(0), Some(appt.to_string().as_str()));

    // Cancel, then accept the vacated start for the waitlist entry.
    client
        .batch_execute(&format!("DELETE FROM appointments WHERE id = '{appt}'"))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "UPDATE appointments SET start = '10:00' WHERE id = '{wl}'"
        ))
        .await
        .unwrap();

    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM appointments WHERE business_id = '{biz}'"
            ))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(0), Some(wl.to_string().as_str()));
    assert_eq!(rows[0].get(3), Some("10:00"));
    assert_eq!(rows[0].get(4), Some("30"));
    assert_eq!(rows[0].get(7), Some("f"));

    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM waitlist WHERE business_id = '{biz}'"
            ))
            .await
            .unwrap(),
    );
    assert!(rows.is_empty());
}

#[tokio::test]
async fn accept_on_regular_appointment_rejected() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    let biz = seed_business(&client, "Barber Streisand", &[2]).await;

    let appt = book(&client, biz, TUESDAY, "10:00", 30, "Ana").await;
    let err = client
        .batch_execute(&format!(
            "UPDATE appointments SET start = '11:00' WHERE id = '{appt}'"
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::RAISE_EXCEPTION));
}

// ── Closest slots ────────────────────────────────────────────

#[tokio::test]
async fn closest_slot_picks_nearest_gap() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let near_biz = seed_business(&client, "North Chair", &[2]).await;
    let far_biz = seed_business(&client, "South Chair", &[2]).await;
    // 09:00-10:00 booked: the nearest gap of near_biz starts exactly at 10:00.
    book(&client, near_biz, TUESDAY, "09:00", 60, "Ana").await;

    // A third business opens 14:00-17:00, too far from 10:00 to qualify.
    let late_biz = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO businesses (id, name, owner) VALUES ('{late_biz}', 'Night Chair', 'Omar')"
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "INSERT INTO schedules (business_id, weekday, open_time, close_time, grid) \
             VALUES ('{late_biz}', 2, '14:00', '17:00', 30)"
        ))
        .await
        .unwrap();

    let rows = data_rows(
        client
            .simple_query(&format!(
                "SELECT * FROM closest_slots \
                 WHERE business_id IN ('{near_biz}', '{far_biz}', '{late_biz}') \
                 AND date = '{TUESDAY}' AND near = '10:00' AND duration = 30"
            ))
            .await
            .unwrap(),
    );

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get(0), Some(near_biz.to_string().as_str()));
    assert_eq!(rows[0].get(2), Some("10:00"));
    assert_eq!(rows[1].get(0), Some(far_biz.to_string().as_str()));
    assert_eq!(rows[1].get(2), Some("09:00"));
}

// ── Client listings ──────────────────────────────────────────

#[tokio::test]
async fn appointments_by_client_span_businesses() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let north = seed_business(&client, "North Side", &[2]).await;
    let south = seed_business(&client, "South Side", &[2]).await;
    book(&client, north, TUESDAY, "10:00", 30, "Carla").await;
    book(&client, south, TUESDAY, "09:00", 30, "Carla").await;

    let rows = data_rows(
        client
            .simple_query("SELECT * FROM appointments WHERE client = 'Carla'")
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 2);
    // Ordered by date then start.
    assert_eq!(rows[0].get(3), Some("09:00"));
    assert_eq!(rows[0].get(1), Some(south.to_string().as_str()));
    assert_eq!(rows[1].get(3), Some("10:00"));

    let rows = data_rows(
        client
            .simple_query("SELECT * FROM appointments WHERE client = 'Dave'")
            .await
            .unwrap(),
    );
    assert!(rows.is_empty());
}

// ── SQL surface errors ───────────────────────────────────────

#[tokio::test]
async fn unknown_table_is_a_syntax_error() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let err = client
        .simple_query("SELECT * FROM haircuts")
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::SYNTAX_ERROR));
}

#[tokio::test]
async fn free_slots_require_a_date() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    let biz = Ulid::new();

    let err = client
        .simple_query(&format!(
            "SELECT * FROM free_slots WHERE business_id = '{biz}'"
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(&SqlState::SYNTAX_ERROR));
}

#[tokio::test]
async fn listen_checks_channel_shape() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;

    let biz = Ulid::new();
    client
        .batch_execute(&format!("LISTEN business_{biz}"))
        .await
        .unwrap();

    let err = client.batch_execute("LISTEN kitchen").await.unwrap_err();
    assert_eq!(
        err.code(),
        Some(&SqlState::SYNTAX_ERROR_OR_ACCESS_RULE_VIOLATION)
    );
}

// ── Tenancy and auth ─────────────────────────────────────────

#[tokio::test]
async fn tenants_are_isolated() {
    let (addr, _tm) = start_test_server().await;
    let alpha = connect_db(addr, "alpha").await;
    let beta = connect_db(addr, "beta").await;

    seed_business(&alpha, "Alpha Cuts", &[2]).await;

    let rows = data_rows(beta.simple_query("SELECT * FROM businesses").await.unwrap());
    assert!(rows.is_empty());

    let rows = data_rows(
        alpha
            .simple_query("SELECT * FROM businesses")
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn bad_password_rejected() {
    let (addr, _tm) = start_test_server().await;

    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("test")
        .user("bookd")
        .password("wrong");

    assert!(config.connect(NoTls).await.is_err());
}
