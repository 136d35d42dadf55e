//! Store configuration and its defaults.

use std::{sync::Arc, time::Duration};

use crate::{
    event::{Casing, EventRegistry, JsonSerializer, Registration, Serializer},
    exceptions::{ExceptionTransforms, TransformRule},
    logger::{NullLogger, SessionLogger},
    retry::{NoRetry, RetryPolicy},
    Event,
};

/// Schema holding the event table when none is configured.
pub const DEFAULT_SCHEMA_NAME: &str = "public";

/// Prefix of every table the store owns, so events live in `chr_events`.
pub const DEFAULT_TABLE_PREFIX: &str = "chr";

/// Tenant used by sessions opened without one.
pub const DEFAULT_TENANT_ID: &str = "*DEFAULT*";

/// Environment variable read by [`StoreOptions::connection_string_from_env`].
pub const CONNECTION_STRING_ENV: &str = "CHRONICLE_DATABASE_URL";

/// How stream identifiers are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamIdentity {
    #[default]
    AsUuid,
    AsString,
}

/// When a session's connection and transaction are opened and released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LifetimeMode {
    /// One connection and transaction for the whole session.
    #[default]
    Transactional,
    /// Connection borrowed per command, no implicit transaction.
    AutoClosing,
}

/// Everything a [`crate::DocumentStore`] needs to open sessions and talk to
/// the event table.
#[derive(Clone)]
pub struct StoreOptions {
    pub database_schema_name: String,
    pub table_prefix: String,
    pub stream_identity: StreamIdentity,
    pub default_tenant_id: String,
    pub lifetime_mode: LifetimeMode,
    pub command_timeout: Option<Duration>,
    pub retry_policy: Arc<dyn RetryPolicy>,
    pub logger: Arc<dyn SessionLogger>,
    registry: Arc<EventRegistry>,
    transforms: Arc<ExceptionTransforms>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptionsBuilder::new().build()
    }
}

impl StoreOptions {
    pub fn builder() -> StoreOptionsBuilder {
        StoreOptionsBuilder::new()
    }

    pub fn table(&self, name: impl AsRef<str>) -> String {
        format!(
            "{}.{}_{}",
            self.database_schema_name,
            self.table_prefix,
            name.as_ref()
        )
    }

    pub fn events_table(&self) -> String {
        self.table("events")
    }

    /// Unique constraint over `(tenant_id, stream_id, version)`.
    pub fn version_constraint(&self) -> String {
        version_constraint(&self.table_prefix)
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    pub fn transforms(&self) -> &Arc<ExceptionTransforms> {
        &self.transforms
    }

    /// Reads [`CONNECTION_STRING_ENV`], ignoring an empty value.
    pub fn connection_string_from_env() -> Option<String> {
        std::env::var(CONNECTION_STRING_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

fn version_constraint(prefix: &str) -> String {
    format!("pk_{prefix}_events_stream_and_version")
}

pub struct StoreOptionsBuilder {
    database_schema_name: String,
    table_prefix: String,
    stream_identity: StreamIdentity,
    default_tenant_id: String,
    lifetime_mode: LifetimeMode,
    command_timeout: Option<Duration>,
    retry_policy: Arc<dyn RetryPolicy>,
    logger: Arc<dyn SessionLogger>,
    serializer: Arc<dyn Serializer>,
    registrations: Vec<Registration>,
    rules: Vec<TransformRule>,
}

impl Default for StoreOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreOptionsBuilder {
    pub fn new() -> Self {
        Self {
            database_schema_name: DEFAULT_SCHEMA_NAME.to_owned(),
            table_prefix: DEFAULT_TABLE_PREFIX.to_owned(),
            stream_identity: StreamIdentity::default(),
            default_tenant_id: DEFAULT_TENANT_ID.to_owned(),
            lifetime_mode: LifetimeMode::default(),
            command_timeout: None,
            retry_policy: Arc::new(NoRetry),
            logger: Arc::new(NullLogger),
            serializer: Arc::new(JsonSerializer::default()),
            registrations: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn schema_name(mut self, name: impl Into<String>) -> Self {
        self.database_schema_name = name.into();
        self
    }

    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    pub fn stream_identity(mut self, identity: StreamIdentity) -> Self {
        self.stream_identity = identity;
        self
    }

    pub fn default_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.default_tenant_id = tenant_id.into();
        self
    }

    pub fn lifetime_mode(mut self, mode: LifetimeMode) -> Self {
        self.lifetime_mode = mode;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn retry_policy<R: RetryPolicy + 'static>(mut self, policy: R) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn SessionLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Shorthand for a [`JsonSerializer`] with the given casing.
    pub fn casing(mut self, casing: Casing) -> Self {
        self.serializer = Arc::new(JsonSerializer::new(casing));
        self
    }

    pub fn serializer<S: Serializer + 'static>(mut self, serializer: S) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    /// Makes `E` decodable when reading events back.
    pub fn register<E: Event>(mut self) -> Self {
        self.registrations.push(Registration::of::<E>());
        self
    }

    /// Adds a failure rule evaluated before the built in ones.
    pub fn transform_rule(mut self, rule: TransformRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn build(self) -> StoreOptions {
        let mut transforms =
            ExceptionTransforms::with_defaults(version_constraint(&self.table_prefix));

        for rule in self.rules.into_iter().rev() {
            transforms.push_front(rule);
        }

        let mut registry = EventRegistry::new(self.serializer);

        for registration in self.registrations {
            registry.add(registration);
        }

        StoreOptions {
            database_schema_name: self.database_schema_name,
            table_prefix: self.table_prefix,
            stream_identity: self.stream_identity,
            default_tenant_id: self.default_tenant_id,
            lifetime_mode: self.lifetime_mode,
            command_timeout: self.command_timeout,
            retry_policy: self.retry_policy,
            logger: self.logger,
            registry: Arc::new(registry),
            transforms: Arc::new(transforms),
        }
    }
}
