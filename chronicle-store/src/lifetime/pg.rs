use std::{future::Future, io, time::Duration};

use async_trait::async_trait;
use chronicle_query::{Command, Row, Value};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{
    pool::PoolConnection,
    postgres::{PgArguments, PgRow},
    query::Query,
    Column, PgConnection, PgPool, Postgres, Row as _, Transaction, TypeInfo,
};
use uuid::Uuid;

use crate::{lifetime::ConnectionLifetime, options::LifetimeMode};

enum State {
    Idle,
    Open(PoolConnection<Postgres>),
    Transaction(Transaction<'static, Postgres>),
    Disposed,
}

/// [`ConnectionLifetime`] backed by a [`PgPool`].
///
/// In [`LifetimeMode::Transactional`] the first command opens a transaction
/// that stays open until `commit`, `rollback` or `dispose`. In
/// [`LifetimeMode::AutoClosing`] the connection goes back to the pool after
/// every command unless a transaction was started explicitly.
pub struct PgLifetime {
    pool: PgPool,
    mode: LifetimeMode,
    command_timeout: Option<Duration>,
    state: State,
    explicit_transaction: bool,
}

impl PgLifetime {
    pub fn new(pool: &PgPool, mode: LifetimeMode) -> Self {
        Self {
            pool: pool.clone(),
            mode,
            command_timeout: None,
            state: State::Idle,
            explicit_transaction: false,
        }
    }

    pub fn command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn mode(&self) -> LifetimeMode {
        self.mode
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self.state, State::Transaction(_))
    }

    fn connection(&mut self) -> Result<&mut PgConnection, sqlx::Error> {
        match &mut self.state {
            State::Open(conn) => Ok(&mut **conn),
            State::Transaction(tx) => Ok(&mut **tx),
            State::Idle => Err(sqlx::Error::Protocol(
                "connection lifetime is not connected".to_owned(),
            )),
            State::Disposed => Err(disposed()),
        }
    }

    async fn start_transaction(&mut self) -> Result<(), sqlx::Error> {
        match self.state {
            State::Transaction(_) => return Ok(()),
            State::Disposed => return Err(disposed()),
            State::Idle | State::Open(_) => {}
        }

        // A pooled connection cannot be promoted in place; hand it back first.
        self.state = State::Idle;
        self.state = State::Transaction(self.pool.begin().await?);

        Ok(())
    }

    fn release(&mut self) {
        if self.mode == LifetimeMode::AutoClosing && matches!(self.state, State::Open(_)) {
            self.state = State::Idle;
        }
    }
}

#[async_trait]
impl ConnectionLifetime for PgLifetime {
    async fn ensure_connected(&mut self) -> Result<(), sqlx::Error> {
        match self.state {
            State::Idle => {
                self.state = State::Open(self.pool.acquire().await?);
                Ok(())
            }
            State::Disposed => Err(disposed()),
            State::Open(_) | State::Transaction(_) => Ok(()),
        }
    }

    async fn begin_transaction(&mut self) -> Result<(), sqlx::Error> {
        self.start_transaction().await?;
        self.explicit_transaction = true;

        Ok(())
    }

    async fn apply(&mut self, command: &Command) -> Result<(), sqlx::Error> {
        tracing::trace!(sql = %command.text, mode = ?self.mode, "attaching connection");

        match self.mode {
            LifetimeMode::Transactional => self.start_transaction().await,
            LifetimeMode::AutoClosing => self.ensure_connected().await,
        }
    }

    async fn execute(&mut self, command: &Command) -> Result<u64, sqlx::Error> {
        let timeout = self.command_timeout;
        let conn = self.connection()?;
        let result = with_timeout(timeout, bind(command).execute(conn)).await;

        self.release();

        Ok(result?.rows_affected())
    }

    async fn fetch(&mut self, command: &Command) -> Result<Vec<Row>, sqlx::Error> {
        let timeout = self.command_timeout;
        let conn = self.connection()?;
        let result = with_timeout(timeout, bind(command).fetch_all(conn)).await;

        self.release();

        result?.iter().map(decode_row).collect()
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        self.explicit_transaction = false;

        match std::mem::replace(&mut self.state, State::Idle) {
            State::Transaction(tx) => tx.commit().await,
            State::Disposed => {
                self.state = State::Disposed;
                Err(disposed())
            }
            state => {
                self.state = state;
                self.release();
                Ok(())
            }
        }
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        self.explicit_transaction = false;

        match std::mem::replace(&mut self.state, State::Idle) {
            State::Transaction(tx) => tx.rollback().await,
            State::Disposed => {
                self.state = State::Disposed;
                Err(disposed())
            }
            state => {
                self.state = state;
                self.release();
                Ok(())
            }
        }
    }

    async fn dispose(&mut self) {
        if let State::Transaction(tx) = std::mem::replace(&mut self.state, State::Disposed) {
            if let Err(e) = tx.rollback().await {
                tracing::warn!(error = %e, "rollback on dispose failed");
            }
        }
    }

    fn is_disposed(&self) -> bool {
        matches!(self.state, State::Disposed)
    }
}

fn disposed() -> sqlx::Error {
    sqlx::Error::Protocol("connection lifetime is disposed".to_owned())
}

async fn with_timeout<F, T>(timeout: Option<Duration>, fut: F) -> Result<T, sqlx::Error>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let Some(limit) = timeout else {
        return fut.await;
    };

    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(sqlx::Error::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("command timed out after {limit:?}"),
        ))),
    }
}

fn bind(command: &Command) -> Query<'_, Postgres, PgArguments> {
    command
        .parameters
        .iter()
        .fold(sqlx::query(&command.text), |query, parameter| {
            match &parameter.value {
                Value::Null => query.bind(None::<String>),
                Value::Bool(v) => query.bind(*v),
                Value::Int(v) => query.bind(*v),
                Value::Float(v) => query.bind(*v),
                Value::Text(v) => query.bind(v.as_str()),
                Value::Uuid(v) => query.bind(*v),
                Value::Timestamp(v) => query.bind(*v),
                Value::Json(v) => query.bind(v.clone()),
                Value::TextArray(v) => query.bind(v.clone()),
            }
        })
}

fn decode_row(row: &PgRow) -> Result<Row, sqlx::Error> {
    let mut decoded = Row::new();

    for column in row.columns() {
        let index = column.ordinal();
        let value: Value = match column.type_info().name() {
            "BOOL" => row.try_get::<Option<bool>, _>(index)?.into(),
            "INT2" => row.try_get::<Option<i16>, _>(index)?.map(i64::from).into(),
            "INT4" => row.try_get::<Option<i32>, _>(index)?.map(i64::from).into(),
            "INT8" => row.try_get::<Option<i64>, _>(index)?.into(),
            "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(f64::from).into(),
            "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.into(),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                row.try_get::<Option<String>, _>(index)?.into()
            }
            "UUID" => row.try_get::<Option<Uuid>, _>(index)?.into(),
            "TIMESTAMPTZ" => row.try_get::<Option<DateTime<Utc>>, _>(index)?.into(),
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(index)?
                .map(|v| v.and_utc())
                .into(),
            "JSON" | "JSONB" => row.try_get::<Option<serde_json::Value>, _>(index)?.into(),
            "TEXT[]" | "VARCHAR[]" => row.try_get::<Option<Vec<String>>, _>(index)?.into(),
            other => {
                return Err(sqlx::Error::ColumnDecode {
                    index: column.name().to_owned(),
                    source: format!("unsupported column type `{other}`").into(),
                })
            }
        };

        decoded.push(column.name(), value);
    }

    Ok(decoded)
}
