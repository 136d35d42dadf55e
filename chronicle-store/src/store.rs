use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    blocking::BlockingSession,
    error::{ChronicleError, Result},
    event_store::EventStore,
    lifetime::PgLifetime,
    options::StoreOptions,
    session::Session,
};

/// Entry point: a pool plus configuration, handing out sessions and the
/// shared [`EventStore`].
#[derive(Clone)]
pub struct DocumentStore {
    pool: PgPool,
    options: Arc<StoreOptions>,
    events: EventStore,
}

impl DocumentStore {
    pub fn new(pool: &PgPool, options: StoreOptions) -> Self {
        let options = Arc::new(options);

        Self {
            pool: pool.clone(),
            events: EventStore::new(options.clone()),
            options,
        }
    }

    pub async fn connect(url: &str, options: StoreOptions) -> Result<Self> {
        let pool = PgPool::connect(url)
            .await
            .map_err(|source| ChronicleError::Driver {
                statement: None,
                source,
            })?;

        Ok(Self::new(&pool, options))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn options(&self) -> &Arc<StoreOptions> {
        &self.options
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    /// Session for the default tenant.
    pub fn open_session(&self) -> Session<PgLifetime> {
        self.open_session_for(self.options.default_tenant_id.to_owned())
    }

    pub fn open_session_for(&self, tenant_id: impl Into<String>) -> Session<PgLifetime> {
        let lifetime = PgLifetime::new(&self.pool, self.options.lifetime_mode)
            .command_timeout(self.options.command_timeout);

        Session::from_options(lifetime, tenant_id, &self.options)
    }

    pub fn open_blocking_session_for(
        &self,
        tenant_id: impl Into<String>,
    ) -> Result<BlockingSession<PgLifetime>> {
        BlockingSession::new(self.open_session_for(tenant_id))
    }
}
