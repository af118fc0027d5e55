use chrono::NaiveDate;
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::time::{parse_date, parse_time_of_day};

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertBusiness {
        id: Ulid,
        name: String,
        owner: String,
    },
    DeleteBusiness {
        id: Ulid,
    },
    UpsertSchedule {
        business_id: Ulid,
        weekday: u8,
        open: u32,
        close: u32,
        grid: u32,
    },
    InsertAppointment {
        id: Ulid,
        business_id: Ulid,
        date: NaiveDate,
        start: u32,
        duration: u32,
        price: u32,
        client: String,
    },
    InsertWaitlist {
        id: Ulid,
        business_id: Ulid,
        date: NaiveDate,
        duration: u32,
        price: u32,
        client: String,
    },
    DeleteAppointment {
        id: Ulid,
    },
    DeleteWaitlist {
        id: Ulid,
    },
    AcceptOffer {
        id: Ulid,
        start: u32,
    },
    SelectBusinesses,
    SelectSchedules {
        business_id: Ulid,
    },
    SelectAppointments {
        business_id: Option<Ulid>,
        client: Option<String>,
        date: Option<NaiveDate>,
    },
    SelectWaitlist {
        business_id: Ulid,
        date: Option<NaiveDate>,
    },
    SelectFreeSlots {
        business_id: Ulid,
        date: NaiveDate,
        min_duration: Option<u32>,
    },
    SelectClosestSlots {
        business_ids: Vec<Ulid>,
        date: NaiveDate,
        near: u32,
        duration: u32,
    },
    Listen {
        channel: String,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    if trimmed.to_uppercase().starts_with("LISTEN ") {
        let channel = trimmed[7..].trim().trim_matches(';').to_string();
        return Ok(Command::Listen { channel });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Update { table, assignments, selection, .. } => {
            parse_update(table, assignments, selection)
        }
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "businesses" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("businesses", 3, values.len()));
            }
            Ok(Command::InsertBusiness {
                id: parse_ulid_expr(&values[0])?,
                name: parse_string_expr(&values[1])?,
                owner: parse_string_expr(&values[2])?,
            })
        }
        "schedules" => {
            if values.len() < 5 {
                return Err(SqlError::WrongArity("schedules", 5, values.len()));
            }
            Ok(Command::UpsertSchedule {
                business_id: parse_ulid_expr(&values[0])?,
                weekday: parse_weekday_expr(&values[1])?,
                open: parse_time_expr(&values[2])?,
                close: parse_time_expr(&values[3])?,
                grid: parse_u32(&values[4])?,
            })
        }
        "appointments" => {
            if values.len() < 7 {
                return Err(SqlError::WrongArity("appointments", 7, values.len()));
            }
            Ok(Command::InsertAppointment {
                id: parse_ulid_expr(&values[0])?,
                business_id: parse_ulid_expr(&values[1])?,
                date: parse_date_expr(&values[2])?,
                start: parse_time_expr(&values[3])?,
                duration: parse_u32(&values[4])?,
                price: parse_u32(&values[5])?,
                client: parse_string_expr(&values[6])?,
            })
        }
        "waitlist" => {
            if values.len() < 6 {
                return Err(SqlError::WrongArity("waitlist", 6, values.len()));
            }
            Ok(Command::InsertWaitlist {
                id: parse_ulid_expr(&values[0])?,
                business_id: parse_ulid_expr(&values[1])?,
                date: parse_date_expr(&values[2])?,
                duration: parse_u32(&values[3])?,
                price: parse_u32(&values[4])?,
                client: parse_string_expr(&values[5])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "businesses" => Ok(Command::DeleteBusiness { id }),
        "appointments" => Ok(Command::DeleteAppointment { id }),
        "waitlist" => Ok(Command::DeleteWaitlist { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let name = table_factor_name(&table.relation)?;
    if name != "appointments" {
        return Err(SqlError::UnknownTable(name));
    }

    let mut start = None;
    for assignment in assignments {
        let col = assignment_column_name(&assignment.target)
            .ok_or_else(|| SqlError::Parse("unsupported assignment target".into()))?;
        if col == "start" {
            start = Some(parse_time_expr(&assignment.value)?);
        } else {
            return Err(SqlError::Unsupported(format!("UPDATE of column {col}")));
        }
    }

    Ok(Command::AcceptOffer {
        id: extract_where_id(selection)?,
        start: start.ok_or_else(|| SqlError::Parse("UPDATE must set start".into()))?,
    })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        collect_filters(selection, &mut filters)?;
    }

    match table.as_str() {
        "businesses" => Ok(Command::SelectBusinesses),
        "schedules" => Ok(Command::SelectSchedules {
            business_id: filters
                .first_business()
                .ok_or(SqlError::MissingFilter("business_id"))?,
        }),
        "appointments" => {
            let business_id = filters.first_business();
            if business_id.is_none() && filters.client.is_none() {
                return Err(SqlError::MissingFilter("business_id or client"));
            }
            Ok(Command::SelectAppointments {
                business_id,
                client: filters.client,
                date: filters.date,
            })
        }
        "waitlist" => Ok(Command::SelectWaitlist {
            business_id: filters
                .first_business()
                .ok_or(SqlError::MissingFilter("business_id"))?,
            date: filters.date,
        }),
        "free_slots" => Ok(Command::SelectFreeSlots {
            business_id: filters
                .first_business()
                .ok_or(SqlError::MissingFilter("business_id"))?,
            date: filters.date.ok_or(SqlError::MissingFilter("date"))?,
            min_duration: filters.min_duration,
        }),
        "closest_slots" => {
            if filters.business_ids.is_empty() {
                return Err(SqlError::MissingFilter("business_id"));
            }
            Ok(Command::SelectClosestSlots {
                business_ids: filters.business_ids,
                date: filters.date.ok_or(SqlError::MissingFilter("date"))?,
                near: filters.near.ok_or(SqlError::MissingFilter("near"))?,
                duration: filters.duration.ok_or(SqlError::MissingFilter("duration"))?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// Accumulated WHERE clauses. Each table picks the columns it understands;
// unknown columns are ignored, missing required ones surface as MissingFilter.
#[derive(Default)]
struct Filters {
    business_ids: Vec<Ulid>,
    client: Option<String>,
    date: Option<NaiveDate>,
    near: Option<u32>,
    duration: Option<u32>,
    min_duration: Option<u32>,
}

impl Filters {
    fn first_business(&self) -> Option<Ulid> {
        self.business_ids.first().copied()
    }
}

fn collect_filters(expr: &Expr, out: &mut Filters) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_filters(left, out)?;
                collect_filters(right, out)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("business_id") => out.business_ids.push(parse_ulid_expr(right)?),
                Some("client") => out.client = Some(parse_string_expr(right)?),
                Some("date") => out.date = Some(parse_date_expr(right)?),
                Some("near") => out.near = Some(parse_time_expr(right)?),
                Some("duration") => out.duration = Some(parse_u32(right)?),
                Some("min_duration") => out.min_duration = Some(parse_u32(right)?),
                _ => {}
            },
            _ => {}
        },
        Expr::InList { expr, list, negated: false } => {
            if expr_column_name(expr).as_deref() == Some("business_id") {
                for item in list {
                    out.business_ids.push(parse_ulid_expr(item)?);
                }
            }
        }
        _ => {}
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn assignment_column_name(target: &ast::AssignmentTarget) -> Option<String> {
    match target {
        ast::AssignmentTarget::ColumnName(name) => object_name_last(name),
        _ => None,
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid_expr(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string_expr(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_date_expr(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string_expr(expr)?;
    parse_date(&s).ok_or_else(|| SqlError::Parse(format!("bad date: {s}")))
}

/// Accepts `'HH:MM'` (a seconds suffix is tolerated) or a bare
/// minutes-since-midnight number.
fn parse_time_expr(expr: &Expr) -> Result<u32, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => {
                parse_time_of_day(s).ok_or_else(|| SqlError::Parse(format!("bad time: {s}")))
            }
            Value::Number(_, _) => parse_u32(expr),
            _ => Err(SqlError::Parse(format!("expected time, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

/// Weekday as 0-6 (Sunday first) or an English day name.
fn parse_weekday_expr(expr: &Expr) -> Result<u8, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => {
                let n: u8 = s
                    .parse()
                    .map_err(|e| SqlError::Parse(format!("bad weekday: {e}")))?;
                if n > 6 {
                    return Err(SqlError::Parse(format!("weekday {n} out of range")));
                }
                Ok(n)
            }
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "sun" | "sunday" => Ok(0),
                "mon" | "monday" => Ok(1),
                "tue" | "tuesday" => Ok(2),
                "wed" | "wednesday" => Ok(3),
                "thu" | "thursday" => Ok(4),
                "fri" | "friday" => Ok(5),
                "sat" | "saturday" => Ok(6),
                _ => Err(SqlError::Parse(format!("bad weekday: {s}"))),
            },
            _ => Err(SqlError::Parse(format!("expected weekday, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const BIZ: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const OTHER: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    #[test]
    fn parse_insert_business() {
        let sql = format!("INSERT INTO businesses (id, name, owner) VALUES ('{BIZ}', 'Shear Lock', 'owner@example.com')");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertBusiness { id, name, owner } => {
                assert_eq!(id.to_string(), BIZ);
                assert_eq!(name, "Shear Lock");
                assert_eq!(owner, "owner@example.com");
            }
            _ => panic!("expected InsertBusiness, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_business_wrong_arity() {
        let sql = format!("INSERT INTO businesses (id, name) VALUES ('{BIZ}', 'Shear Lock')");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::WrongArity("businesses", 3, 2))
        ));
    }

    #[test]
    fn parse_delete_business() {
        let sql = format!("DELETE FROM businesses WHERE id = '{BIZ}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::DeleteBusiness { id } => assert_eq!(id.to_string(), BIZ),
            _ => panic!("expected DeleteBusiness, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_schedule() {
        let sql = format!("INSERT INTO schedules (business_id, weekday, open_time, close_time, grid) VALUES ('{BIZ}', 2, '09:00', '17:00', 30)");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::UpsertSchedule { business_id, weekday, open, close, grid } => {
                assert_eq!(business_id.to_string(), BIZ);
                assert_eq!(weekday, 2);
                assert_eq!(open, 540);
                assert_eq!(close, 1020);
                assert_eq!(grid, 30);
            }
            _ => panic!("expected UpsertSchedule, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_schedule_named_weekday() {
        let sql = format!("INSERT INTO schedules (business_id, weekday, open_time, close_time, grid) VALUES ('{BIZ}', 'tuesday', '09:00:00', '17:00:00', 30)");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::UpsertSchedule { weekday, open, .. } => {
                assert_eq!(weekday, 2);
                assert_eq!(open, 540);
            }
            _ => panic!("expected UpsertSchedule, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_appointment() {
        let sql = format!("INSERT INTO appointments (id, business_id, date, start, duration, price, client) VALUES ('{OTHER}', '{BIZ}', '2026-09-01', '09:00', 30, 25, 'kim@example.com')");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertAppointment { id, business_id, date, start, duration, price, client } => {
                assert_eq!(id.to_string(), OTHER);
                assert_eq!(business_id.to_string(), BIZ);
                assert_eq!(date.to_string(), "2026-09-01");
                assert_eq!(start, 540);
                assert_eq!(duration, 30);
                assert_eq!(price, 25);
                assert_eq!(client, "kim@example.com");
            }
            _ => panic!("expected InsertAppointment, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_appointment_numeric_start() {
        let sql = format!("INSERT INTO appointments (id, business_id, date, start, duration, price, client) VALUES ('{OTHER}', '{BIZ}', '2026-09-01', 540, 30, 25, 'kim@example.com')");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertAppointment { start, .. } => assert_eq!(start, 540),
            _ => panic!("expected InsertAppointment, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_appointment_bad_time() {
        let sql = format!("INSERT INTO appointments (id, business_id, date, start, duration, price, client) VALUES ('{OTHER}', '{BIZ}', '2026-09-01', '9 am', 30, 25, 'kim@example.com')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_insert_waitlist() {
        let sql = format!("INSERT INTO waitlist (id, business_id, date, duration, price, client) VALUES ('{OTHER}', '{BIZ}', '2026-09-01', 45, 30, 'sam@example.com')");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertWaitlist { id, business_id, date, duration, price, client } => {
                assert_eq!(id.to_string(), OTHER);
                assert_eq!(business_id.to_string(), BIZ);
                assert_eq!(date.to_string(), "2026-09-01");
                assert_eq!(duration, 45);
                assert_eq!(price, 30);
                assert_eq!(client, "sam@example.com");
            }
            _ => panic!("expected InsertWaitlist, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_delete_appointment() {
        let sql = format!("DELETE FROM appointments WHERE id = '{OTHER}'");
        assert!(matches!(
            parse_sql(&sql).unwrap(),
            Command::DeleteAppointment { .. }
        ));
    }

    #[test]
    fn parse_delete_waitlist() {
        let sql = format!("DELETE FROM waitlist WHERE id = '{OTHER}'");
        assert!(matches!(
            parse_sql(&sql).unwrap(),
            Command::DeleteWaitlist { .. }
        ));
    }

    #[test]
    fn parse_accept_offer() {
        let sql = format!("UPDATE appointments SET start = '10:00' WHERE id = '{OTHER}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::AcceptOffer { id, start } => {
                assert_eq!(id.to_string(), OTHER);
                assert_eq!(start, 600);
            }
            _ => panic!("expected AcceptOffer, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_rejects_other_columns() {
        let sql = format!("UPDATE appointments SET price = 50 WHERE id = '{OTHER}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_select_businesses() {
        let cmd = parse_sql("SELECT * FROM businesses").unwrap();
        assert!(matches!(cmd, Command::SelectBusinesses));
    }

    #[test]
    fn parse_select_schedules() {
        let sql = format!("SELECT * FROM schedules WHERE business_id = '{BIZ}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectSchedules { business_id } => assert_eq!(business_id.to_string(), BIZ),
            _ => panic!("expected SelectSchedules, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_schedules_requires_business() {
        assert!(matches!(
            parse_sql("SELECT * FROM schedules"),
            Err(SqlError::MissingFilter("business_id"))
        ));
    }

    #[test]
    fn parse_select_appointments_by_business() {
        let sql = format!(
            "SELECT * FROM appointments WHERE business_id = '{BIZ}' AND date = '2026-09-01'"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectAppointments { business_id, client, date } => {
                assert_eq!(business_id.unwrap().to_string(), BIZ);
                assert_eq!(client, None);
                assert_eq!(date.unwrap().to_string(), "2026-09-01");
            }
            _ => panic!("expected SelectAppointments, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_appointments_by_client() {
        let sql = "SELECT * FROM appointments WHERE client = 'kim@example.com'";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::SelectAppointments { business_id, client, date } => {
                assert_eq!(business_id, None);
                assert_eq!(client.as_deref(), Some("kim@example.com"));
                assert_eq!(date, None);
            }
            _ => panic!("expected SelectAppointments, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_appointments_needs_a_filter() {
        assert!(matches!(
            parse_sql("SELECT * FROM appointments"),
            Err(SqlError::MissingFilter(_))
        ));
    }

    #[test]
    fn parse_select_waitlist() {
        let sql = format!("SELECT * FROM waitlist WHERE business_id = '{BIZ}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectWaitlist { business_id, date } => {
                assert_eq!(business_id.to_string(), BIZ);
                assert_eq!(date, None);
            }
            _ => panic!("expected SelectWaitlist, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_free_slots() {
        let sql = format!(
            "SELECT * FROM free_slots WHERE business_id = '{BIZ}' AND date = '2026-09-01'"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectFreeSlots { business_id, date, min_duration } => {
                assert_eq!(business_id.to_string(), BIZ);
                assert_eq!(date.to_string(), "2026-09-01");
                assert_eq!(min_duration, None);
            }
            _ => panic!("expected SelectFreeSlots, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_free_slots_min_duration() {
        let sql = format!("SELECT * FROM free_slots WHERE business_id = '{BIZ}' AND date = '2026-09-01' AND min_duration = 45");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectFreeSlots { min_duration, .. } => {
                assert_eq!(min_duration, Some(45));
            }
            _ => panic!("expected SelectFreeSlots, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_closest_slots() {
        let sql = format!("SELECT * FROM closest_slots WHERE business_id IN ('{BIZ}', '{OTHER}') AND date = '2026-09-01' AND near = '10:30' AND duration = 60");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectClosestSlots { business_ids, date, near, duration } => {
                assert_eq!(business_ids.len(), 2);
                assert_eq!(business_ids[0].to_string(), BIZ);
                assert_eq!(business_ids[1].to_string(), OTHER);
                assert_eq!(date.to_string(), "2026-09-01");
                assert_eq!(near, 630);
                assert_eq!(duration, 60);
            }
            _ => panic!("expected SelectClosestSlots, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_closest_slots_single_id() {
        let sql = format!("SELECT * FROM closest_slots WHERE business_id = '{BIZ}' AND date = '2026-09-01' AND near = '10:30' AND duration = 60");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectClosestSlots { business_ids, .. } => {
                assert_eq!(business_ids.len(), 1);
            }
            _ => panic!("expected SelectClosestSlots, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_closest_requires_near() {
        let sql = format!("SELECT * FROM closest_slots WHERE business_id = '{BIZ}' AND date = '2026-09-01' AND duration = 60");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::MissingFilter("near"))
        ));
    }

    #[test]
    fn parse_listen() {
        let sql = format!("LISTEN business_{BIZ}");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::Listen { channel } => {
                assert_eq!(channel, format!("business_{BIZ}"));
            }
            _ => panic!("expected Listen, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO foobar (id) VALUES ('{BIZ}')");
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
