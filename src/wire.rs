use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use ulid::Ulid;

use crate::auth::BookdAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command};
use crate::tenant::TenantManager;
use crate::time::{minute_of_day, render_date, render_time_of_day};

pub struct BookdHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<BookdQueryParser>,
}

impl BookdHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(BookdQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    async fn execute_command(
        &self,
        engine: &Arc<Engine>,
        cmd: Command,
    ) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.dispatch_command(engine, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn dispatch_command(
        &self,
        engine: &Arc<Engine>,
        cmd: Command,
    ) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertBusiness { id, name, owner } => {
                engine
                    .create_business(id, name, owner)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::DeleteBusiness { id } => {
                engine.delete_business(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::UpsertSchedule {
                business_id,
                weekday,
                open,
                close,
                grid,
            } => {
                engine
                    .set_schedule(business_id, weekday, open, close, grid)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::InsertAppointment {
                id,
                business_id,
                date,
                start,
                duration,
                price,
                client,
            } => {
                engine
                    .book_appointment(id, business_id, date, Some(start), duration, price, client)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::InsertWaitlist {
                id,
                business_id,
                date,
                duration,
                price,
                client,
            } => {
                engine
                    .book_appointment(id, business_id, date, None, duration, price, client)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::DeleteAppointment { id } | Command::DeleteWaitlist { id } => {
                engine.cancel_booking(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::AcceptOffer { id, start } => {
                engine.accept_offer(id, start).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::SelectBusinesses => {
                let businesses = engine.list_businesses().await;
                let schema = Arc::new(businesses_schema());
                let rows: Vec<PgWireResult<_>> = businesses
                    .into_iter()
                    .map(|b| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&b.id.to_string())?;
                        encoder.encode_field(&b.name)?;
                        encoder.encode_field(&b.owner)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectSchedules { business_id } => {
                let schedules = engine.get_schedules(business_id).await.map_err(engine_err)?;
                let schema = Arc::new(schedules_schema());
                let bid = business_id.to_string();
                let rows: Vec<PgWireResult<_>> = schedules
                    .into_iter()
                    .map(|s| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&bid)?;
                        encoder.encode_field(&(s.weekday as i16))?;
                        encoder.encode_field(&render_time_of_day(s.open))?;
                        encoder.encode_field(&render_time_of_day(s.close))?;
                        encoder.encode_field(&(s.grid as i32))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectAppointments {
                business_id,
                client,
                date,
            } => {
                let appointments = if let Some(business_id) = business_id {
                    engine
                        .appointments_for_business(business_id, date)
                        .await
                        .map_err(engine_err)?
                } else if let Some(client) = client {
                    let mut rows = engine.appointments_for_client(&client).await;
                    if let Some(d) = date {
                        rows.retain(|r| r.date == d);
                    }
                    rows
                } else {
                    Vec::new()
                };
                let schema = Arc::new(appointments_schema());
                let rows: Vec<PgWireResult<_>> = appointments
                    .into_iter()
                    .map(|a| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&a.id.to_string())?;
                        encoder.encode_field(&a.business_id.to_string())?;
                        encoder.encode_field(&render_date(a.date))?;
                        encoder.encode_field(&render_start(a.start))?;
                        encoder.encode_field(&(a.duration as i32))?;
                        encoder.encode_field(&(a.price as i32))?;
                        encoder.encode_field(&a.client)?;
                        encoder.encode_field(&a.completed)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectWaitlist { business_id, date } => {
                let entries = engine
                    .get_waitlist(business_id, date)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(waitlist_schema());
                let rows: Vec<PgWireResult<_>> = entries
                    .into_iter()
                    .map(|w| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&w.id.to_string())?;
                        encoder.encode_field(&w.business_id.to_string())?;
                        encoder.encode_field(&render_date(w.date))?;
                        encoder.encode_field(&(w.duration as i32))?;
                        encoder.encode_field(&(w.price as i32))?;
                        encoder.encode_field(&w.client)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectFreeSlots {
                business_id,
                date,
                min_duration,
            } => {
                let slots = engine
                    .compute_free_slots(business_id, date, min_duration)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(slots_schema());
                let bid = business_id.to_string();
                let date_str = render_date(date);
                let rows: Vec<PgWireResult<_>> = slots
                    .into_iter()
                    .map(|slot| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&bid)?;
                        encoder.encode_field(&date_str)?;
                        encoder.encode_field(&render_time_of_day(minute_of_day(slot.start)))?;
                        encoder.encode_field(&(slot.duration as i32))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectClosestSlots {
                business_ids,
                date,
                near,
                duration,
            } => {
                let found = engine
                    .compute_closest_slots(&business_ids, date, near, duration)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(slots_schema());
                let date_str = render_date(date);
                let rows: Vec<PgWireResult<_>> = found
                    .into_iter()
                    .map(|c| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&c.business_id.to_string())?;
                        encoder.encode_field(&date_str)?;
                        encoder.encode_field(&render_time_of_day(minute_of_day(c.start)))?;
                        encoder.encode_field(&(c.duration as i32))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::Listen { channel } => {
                let business_id_str = channel.strip_prefix("business_").ok_or_else(|| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42000".into(),
                        format!("invalid channel: {channel} (expected business_{{id}})"),
                    )))
                })?;
                let _business_id = Ulid::from_string(business_id_str).map_err(|e| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42000".into(),
                        format!("bad ULID in channel: {e}"),
                    )))
                })?;
                Ok(vec![Response::Execution(Tag::new("LISTEN"))])
            }
        }
    }
}

/// Regular appointments always carry a start; the sentinel only shows if a
/// waitlist row ever leaks into an appointment listing.
fn render_start(start: Option<u32>) -> String {
    render_time_of_day(start.unwrap_or(WAITLIST_SORT_TOD))
}

fn businesses_schema() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("id".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("name".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("owner".into(), None, None, Type::VARCHAR, FieldFormat::Text),
    ]
}

fn schedules_schema() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new(
            "business_id".into(),
            None,
            None,
            Type::VARCHAR,
            FieldFormat::Text,
        ),
        FieldInfo::new("weekday".into(), None, None, Type::INT2, FieldFormat::Text),
        FieldInfo::new(
            "open_time".into(),
            None,
            None,
            Type::VARCHAR,
            FieldFormat::Text,
        ),
        FieldInfo::new(
            "close_time".into(),
            None,
            None,
            Type::VARCHAR,
            FieldFormat::Text,
        ),
        FieldInfo::new("grid".into(), None, None, Type::INT4, FieldFormat::Text),
    ]
}

fn appointments_schema() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("id".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new(
            "business_id".into(),
            None,
            None,
            Type::VARCHAR,
            FieldFormat::Text,
        ),
        FieldInfo::new("date".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("start".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("duration".into(), None, None, Type::INT4, FieldFormat::Text),
        FieldInfo::new("price".into(), None, None, Type::INT4, FieldFormat::Text),
        FieldInfo::new("client".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("completed".into(), None, None, Type::BOOL, FieldFormat::Text),
    ]
}

fn waitlist_schema() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("id".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new(
            "business_id".into(),
            None,
            None,
            Type::VARCHAR,
            FieldFormat::Text,
        ),
        FieldInfo::new("date".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("duration".into(), None, None, Type::INT4, FieldFormat::Text),
        FieldInfo::new("price".into(), None, None, Type::INT4, FieldFormat::Text),
        FieldInfo::new("client".into(), None, None, Type::VARCHAR, FieldFormat::Text),
    ]
}

fn slots_schema() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new(
            "business_id".into(),
            None,
            None,
            Type::VARCHAR,
            FieldFormat::Text,
        ),
        FieldInfo::new("date".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("start".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("duration".into(), None, None, Type::INT4, FieldFormat::Text),
    ]
}

/// Result schema for a statement, judged by the table it reads. Mutations
/// return no rows.
fn result_schema_for(sql_upper: &str) -> Vec<FieldInfo> {
    if !sql_upper.contains("SELECT") {
        return vec![];
    }
    if sql_upper.contains("FREE_SLOTS") || sql_upper.contains("CLOSEST_SLOTS") {
        slots_schema()
    } else if sql_upper.contains("APPOINTMENTS") {
        appointments_schema()
    } else if sql_upper.contains("WAITLIST") {
        waitlist_schema()
    } else if sql_upper.contains("SCHEDULES") {
        schedules_schema()
    } else if sql_upper.contains("BUSINESSES") {
        businesses_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for BookdHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.execute_command(&engine, cmd).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct BookdQueryParser;

#[async_trait]
impl QueryParser for BookdQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema_for(&stmt.to_uppercase()))
    }
}

#[async_trait]
impl ExtendedQueryHandler for BookdHandler {
    type Statement = String;
    type QueryParser = BookdQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.execute_command(&engine, cmd).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema_for(&target.statement.to_uppercase()),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema_for(
            &target.statement.statement.to_uppercase(),
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start {
                if let Ok(n) = sql[start..i].parse::<usize>() {
                    if n > max {
                        max = n;
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct BookdFactory {
    handler: Arc<BookdHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<BookdAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl BookdFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = BookdAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(BookdHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for BookdFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client socket to completion.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = BookdFactory::new(tenant_manager, password);
    let result = pgwire::tokio::process_socket(socket, tls, factory).await;
    if result.is_err() {
        metrics::counter!(observability::AUTH_FAILURES_TOTAL).increment(1);
    }
    result
}

fn engine_err(e: EngineError) -> PgWireError {
    let code = match &e {
        EngineError::SlotTaken(_) | EngineError::AlreadyExists(_) | EngineError::NameTaken(_) => {
            "23505"
        }
        EngineError::NotFound(_) => "P0002",
        _ => "P0001",
    };
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
