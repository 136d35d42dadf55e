use std::sync::Arc;

use async_trait::async_trait;
use chronicle_query::{compile, compile_batch, Batch, Command, Row, Statement, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::{ChronicleError, Result},
    exceptions::{ExceptionTransforms, FailureContext},
    handler::{QueryHandler, Rows, Selector},
    lifetime::{ConnectionLifetime, PgLifetime},
    logger::{ChangeSet, NullLogger, SessionLogger, StatementRef},
    options::StoreOptions,
    retry::{NoRetry, RetryPolicy},
};

/// Runs commands for one tenant over a [`ConnectionLifetime`].
///
/// Every execution goes through the same steps: count the request, notify
/// the logger, attach the connection and run under the retry policy, then
/// either log success or classify the error, log it and dispose the lifetime.
/// A failed or cancelled session is closed; later calls return
/// [`ChronicleError::SessionClosed`].
pub struct Session<L: ConnectionLifetime = PgLifetime> {
    id: Uuid,
    lifetime: L,
    tenant_id: String,
    request_count: u64,
    logger: Arc<dyn SessionLogger>,
    retry: Arc<dyn RetryPolicy>,
    transforms: Arc<ExceptionTransforms>,
    cancel: CancellationToken,
}

impl<L: ConnectionLifetime> Session<L> {
    pub fn new(lifetime: L, tenant_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lifetime,
            tenant_id: tenant_id.into(),
            request_count: 0,
            logger: Arc::new(NullLogger),
            retry: Arc::new(NoRetry),
            transforms: Arc::new(ExceptionTransforms::with_defaults(
                StoreOptions::default().version_constraint(),
            )),
            cancel: CancellationToken::new(),
        }
    }

    /// A session wired with the logger, retry policy and failure rules of
    /// `options`. An empty tenant id falls back to the default tenant.
    pub fn from_options(lifetime: L, tenant_id: impl Into<String>, options: &StoreOptions) -> Self {
        let tenant_id = tenant_id.into();
        let tenant_id = if tenant_id.is_empty() {
            options.default_tenant_id.to_owned()
        } else {
            tenant_id
        };

        Self::new(lifetime, tenant_id)
            .with_logger(options.logger.clone())
            .with_retry_policy(options.retry_policy.clone())
            .with_transforms(options.transforms().clone())
    }

    pub fn with_logger(mut self, logger: Arc<dyn SessionLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_retry_policy(mut self, retry: Arc<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_transforms(mut self, transforms: Arc<ExceptionTransforms>) -> Self {
        self.transforms = transforms;
        self
    }

    /// Cancels the session when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Executions attempted so far, including failed and cancelled ones.
    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn logger(&self) -> &Arc<dyn SessionLogger> {
        &self.logger
    }

    pub fn set_logger(&mut self, logger: Arc<dyn SessionLogger>) {
        self.logger = logger;
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn lifetime(&self) -> &L {
        &self.lifetime
    }

    pub fn is_closed(&self) -> bool {
        self.lifetime.is_disposed()
    }

    /// Compiles a statement for this session's tenant.
    pub fn compile<S: Statement + ?Sized>(&self, statement: &S) -> Command {
        compile(statement, &self.tenant_id)
    }

    pub fn compile_batch<'a, S, I>(&self, statements: I) -> Batch
    where
        S: Statement + ?Sized + 'a,
        I: IntoIterator<Item = &'a S>,
    {
        compile_batch(statements, &self.tenant_id)
    }

    /// Runs a command and returns the number of affected rows.
    pub async fn execute(&mut self, command: &Command) -> Result<u64> {
        self.run(Execute(command)).await
    }

    pub async fn execute_reader(&mut self, command: &Command) -> Result<Rows> {
        Ok(Rows::new(self.run(Fetch(command)).await?))
    }

    pub async fn execute_batch(&mut self, batch: &Batch) -> Result<u64> {
        self.run(ExecuteBatch(batch)).await
    }

    /// One [`Rows`] per sub-command, in batch order.
    pub async fn execute_batch_reader(&mut self, batch: &Batch) -> Result<Vec<Rows>> {
        let results = self.run(FetchBatch(batch)).await?;

        Ok(results.into_iter().map(Rows::new).collect())
    }

    pub async fn execute_handler<H: QueryHandler>(&mut self, handler: &H) -> Result<H::Output> {
        let command = self.compile(handler);
        let rows = self.execute_reader(&command).await?;

        handler.handle(rows)
    }

    /// Sends every handler's statement in one batch and hands each handler its
    /// own result set.
    pub async fn execute_handler_batch<H: QueryHandler>(
        &mut self,
        handlers: &[H],
    ) -> Result<Vec<H::Output>> {
        let batch = self.compile_batch(handlers.iter());
        let results = self.execute_batch_reader(&batch).await?;

        handlers
            .iter()
            .zip(results)
            .map(|(handler, rows)| handler.handle(rows))
            .collect()
    }

    /// The first row mapped by `selector`, `None` when there are no rows.
    pub async fn load_one<T, S: Selector<T>>(
        &mut self,
        command: &Command,
        selector: &S,
    ) -> Result<Option<T>> {
        let mut rows = self.execute_reader(command).await?;

        rows.next().map(|row| selector.resolve(&row)).transpose()
    }

    pub async fn load_many<T, S: Selector<T>>(
        &mut self,
        command: &Command,
        selector: &S,
    ) -> Result<Vec<T>> {
        self.execute_reader(command)
            .await?
            .map(|row| selector.resolve(&row))
            .collect()
    }

    /// Writes the first column of the first row to `sink`.
    ///
    /// Returns `false`, writing nothing, when there are no rows.
    pub async fn stream_one<W>(&mut self, command: &Command, sink: &mut W) -> Result<bool>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut rows = self.execute_reader(command).await?;

        let Some(row) = rows.next() else {
            return Ok(false);
        };

        sink.write_all(&first_column(&row)?).await?;
        sink.flush().await?;

        Ok(true)
    }

    /// Writes the first column of every row to `sink` as a JSON array and
    /// returns how many rows were written.
    pub async fn stream_many<W>(&mut self, command: &Command, sink: &mut W) -> Result<usize>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let rows = self.execute_reader(command).await?;
        let mut count = 0;

        sink.write_all(b"[").await?;

        for row in rows {
            if count > 0 {
                sink.write_all(b",").await?;
            }

            sink.write_all(&first_column(&row)?).await?;
            count += 1;
        }

        sink.write_all(b"]").await?;
        sink.flush().await?;

        Ok(count)
    }

    pub async fn ensure_connected(&mut self) -> Result<()> {
        if self.lifetime.is_disposed() {
            return Err(ChronicleError::SessionClosed);
        }

        let result = self.lifetime.ensure_connected().await;

        self.settle(result).await
    }

    pub async fn begin_transaction(&mut self) -> Result<()> {
        if self.lifetime.is_disposed() {
            return Err(ChronicleError::SessionClosed);
        }

        let result = self.lifetime.begin_transaction().await;

        self.settle(result).await
    }

    pub async fn commit(&mut self) -> Result<()> {
        if self.lifetime.is_disposed() {
            return Err(ChronicleError::SessionClosed);
        }

        let result = self.lifetime.commit().await;

        self.settle(result).await
    }

    pub async fn rollback(&mut self) -> Result<()> {
        if self.lifetime.is_disposed() {
            return Err(ChronicleError::SessionClosed);
        }

        let result = self.lifetime.rollback().await;

        self.settle(result).await
    }

    /// Releases the connection. Further calls fail with
    /// [`ChronicleError::SessionClosed`].
    pub async fn dispose(&mut self) {
        self.lifetime.dispose().await;
    }

    pub(crate) fn record_saved_changes(&self, changes: &ChangeSet) {
        self.logger.record_saved_changes(self.id, changes);
    }

    async fn settle(&mut self, result: std::result::Result<(), sqlx::Error>) -> Result<()> {
        let Err(error) = result else {
            return Ok(());
        };

        self.lifetime.dispose().await;

        Err(self.transforms.transform(
            error,
            FailureContext {
                statement: None,
                tenant_id: &self.tenant_id,
            },
        ))
    }

    async fn run<O: Operation>(&mut self, operation: O) -> Result<O::Output> {
        self.request_count += 1;

        if self.lifetime.is_disposed() {
            return Err(ChronicleError::SessionClosed);
        }

        let cancel = self.cancel.clone();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = attempt(
                &mut self.lifetime,
                self.retry.as_ref(),
                self.logger.as_ref(),
                &operation,
            ) => Some(result),
        };

        let statement = operation.statement();

        let error = match result {
            Some(Ok(output)) => {
                self.logger.log_success(statement);

                return Ok(output);
            }
            Some(Err(error)) => self.transforms.transform(
                error,
                FailureContext {
                    statement: Some(statement),
                    tenant_id: &self.tenant_id,
                },
            ),
            None => {
                tracing::debug!(session = %self.id, sql = %statement.text(), "execution cancelled");

                ChronicleError::Cancelled
            }
        };

        self.logger.log_failure(statement, &error);
        self.lifetime.dispose().await;

        Err(error)
    }
}

async fn attempt<L, O>(
    lifetime: &mut L,
    retry: &dyn RetryPolicy,
    logger: &dyn SessionLogger,
    operation: &O,
) -> std::result::Result<O::Output, sqlx::Error>
where
    L: ConnectionLifetime,
    O: Operation,
{
    logger.on_before_execute(operation.statement());

    let mut backoff = retry.backoff();

    loop {
        let result = match apply(lifetime, operation.statement()).await {
            Ok(()) => operation.attempt(lifetime).await,
            Err(error) => Err(error),
        };

        match result {
            Ok(output) => return Ok(output),
            Err(error) if retry.is_transient(&error) => {
                let Some(delay) = backoff.next_backoff() else {
                    return Err(error);
                };

                tracing::debug!(error = %error, delay = ?delay, "retrying transient failure");
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

async fn apply<L: ConnectionLifetime>(
    lifetime: &mut L,
    statement: StatementRef<'_>,
) -> std::result::Result<(), sqlx::Error> {
    match statement {
        StatementRef::Command(command) => lifetime.apply(command).await,
        StatementRef::Batch(batch) => lifetime.apply_batch(batch).await,
    }
}

fn first_column(row: &Row) -> Result<Vec<u8>> {
    let bytes = match row.value_at(0) {
        None | Some(Value::Null) => b"null".to_vec(),
        Some(Value::Text(text)) => text.as_bytes().to_vec(),
        Some(Value::Json(json)) => serde_json::to_vec(json)?,
        Some(Value::TextArray(values)) => serde_json::to_vec(values)?,
        Some(Value::Timestamp(value)) => serde_json::to_vec(value)?,
        Some(Value::Bool(value)) => value.to_string().into_bytes(),
        Some(Value::Int(value)) => value.to_string().into_bytes(),
        Some(Value::Float(value)) => value.to_string().into_bytes(),
        Some(Value::Uuid(value)) => value.to_string().into_bytes(),
    };

    Ok(bytes)
}

/// One kind of execution, run through the single path in [`Session::run`].
#[async_trait]
trait Operation: Send + Sync {
    type Output: Send;

    fn statement(&self) -> StatementRef<'_>;

    async fn attempt<L: ConnectionLifetime>(
        &self,
        lifetime: &mut L,
    ) -> std::result::Result<Self::Output, sqlx::Error>;
}

struct Execute<'a>(&'a Command);

struct Fetch<'a>(&'a Command);

struct ExecuteBatch<'a>(&'a Batch);

struct FetchBatch<'a>(&'a Batch);

#[async_trait]
impl Operation for Execute<'_> {
    type Output = u64;

    fn statement(&self) -> StatementRef<'_> {
        StatementRef::Command(self.0)
    }

    async fn attempt<L: ConnectionLifetime>(
        &self,
        lifetime: &mut L,
    ) -> std::result::Result<u64, sqlx::Error> {
        lifetime.execute(self.0).await
    }
}

#[async_trait]
impl Operation for Fetch<'_> {
    type Output = Vec<Row>;

    fn statement(&self) -> StatementRef<'_> {
        StatementRef::Command(self.0)
    }

    async fn attempt<L: ConnectionLifetime>(
        &self,
        lifetime: &mut L,
    ) -> std::result::Result<Vec<Row>, sqlx::Error> {
        lifetime.fetch(self.0).await
    }
}

#[async_trait]
impl Operation for ExecuteBatch<'_> {
    type Output = u64;

    fn statement(&self) -> StatementRef<'_> {
        StatementRef::Batch(self.0)
    }

    async fn attempt<L: ConnectionLifetime>(
        &self,
        lifetime: &mut L,
    ) -> std::result::Result<u64, sqlx::Error> {
        lifetime.execute_batch(self.0).await
    }
}

#[async_trait]
impl Operation for FetchBatch<'_> {
    type Output = Vec<Vec<Row>>;

    fn statement(&self) -> StatementRef<'_> {
        StatementRef::Batch(self.0)
    }

    async fn attempt<L: ConnectionLifetime>(
        &self,
        lifetime: &mut L,
    ) -> std::result::Result<Vec<Vec<Row>>, sqlx::Error> {
        lifetime.fetch_batch(self.0).await
    }
}
