use async_trait::async_trait;
use chronicle_query::{Batch, Command, Row};

mod pg;

pub use pg::*;

/// Owns the physical connection (and transaction) behind a session.
///
/// Failures are raw driver errors; the session classifies them. `apply` is
/// called before every attempt so an implementation can attach the
/// connection and transaction to what is about to run.
#[async_trait]
pub trait ConnectionLifetime: Send {
    async fn ensure_connected(&mut self) -> Result<(), sqlx::Error>;

    async fn begin_transaction(&mut self) -> Result<(), sqlx::Error>;

    async fn apply(&mut self, command: &Command) -> Result<(), sqlx::Error>;

    async fn apply_batch(&mut self, batch: &Batch) -> Result<(), sqlx::Error> {
        match batch.commands.first() {
            Some(command) => self.apply(command).await,
            None => self.ensure_connected().await,
        }
    }

    /// Runs a command, returning the number of affected rows.
    async fn execute(&mut self, command: &Command) -> Result<u64, sqlx::Error>;

    async fn fetch(&mut self, command: &Command) -> Result<Vec<Row>, sqlx::Error>;

    /// Runs each sub-command in order on the same connection.
    async fn execute_batch(&mut self, batch: &Batch) -> Result<u64, sqlx::Error> {
        let mut affected = 0;

        for command in batch.commands.iter() {
            affected += self.execute(command).await?;
        }

        Ok(affected)
    }

    /// One result set per sub-command, in order.
    async fn fetch_batch(&mut self, batch: &Batch) -> Result<Vec<Vec<Row>>, sqlx::Error> {
        let mut results = Vec::with_capacity(batch.len());

        for command in batch.commands.iter() {
            results.push(self.fetch(command).await?);
        }

        Ok(results)
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error>;

    async fn rollback(&mut self) -> Result<(), sqlx::Error>;

    /// Releases the connection, rolling back any open transaction. Never fails.
    async fn dispose(&mut self);

    fn is_disposed(&self) -> bool;
}
