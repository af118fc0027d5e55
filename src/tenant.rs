use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::compactor;
use crate::dispatch::{self, intent_channel};
use crate::engine::Engine;
use crate::limits::*;
use crate::mailer::Mailer;
use crate::notify::NotifyHub;
use crate::time::Clock;

/// Manages per-tenant engines. Each tenant gets its own Engine + WAL +
/// notification dispatcher + compactor. Tenant = database name from the
/// pgwire connection.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    clock: Arc<dyn Clock>,
    mailer: Arc<dyn Mailer>,
}

impl TenantManager {
    pub fn new(
        data_dir: PathBuf,
        compact_threshold: u64,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            clock,
            mailer,
        }
    }

    /// Get or lazily create an engine for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Sanitize tenant name to prevent path traversal
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let (intent_tx, intent_rx) = intent_channel();
        let engine = Arc::new(Engine::new(
            wal_path,
            notify,
            self.clock.clone(),
            intent_tx,
        )?);

        // Spawn dispatcher + compactor for this tenant
        let dispatcher_engine = engine.clone();
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            dispatch::run_dispatcher(intent_rx, dispatcher_engine, mailer).await;
        });
        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold).await;
        });

        self.engines.insert(tenant.to_string(), engine.clone());
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}
