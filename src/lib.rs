//! Multi-tenant appointment booking engine speaking the Postgres wire protocol.

pub mod auth;
pub mod compactor;
pub mod dispatch;
pub mod engine;
pub mod limits;
pub mod mailer;
pub mod model;
pub mod notify;
pub mod observability;
pub mod sql;
pub mod tenant;
pub mod time;
pub mod tls;
pub mod wal;
pub mod wire;
