use chronicle_query::{Batch, Command};
use futures_util::future::LocalBoxFuture;
use tokio::runtime::{Builder, Runtime};

use crate::{
    error::Result,
    handler::{QueryHandler, Rows, Selector},
    lifetime::{ConnectionLifetime, PgLifetime},
    session::Session,
};

/// Synchronous face of a [`Session`]: each call blocks the current thread on
/// a private current-thread runtime.
///
/// Must not be used from inside an async context. A session over a
/// [`PgLifetime`] needs its pool to be driven by a runtime that keeps
/// running, such as a multi-thread runtime owned by the application.
pub struct BlockingSession<L: ConnectionLifetime = PgLifetime> {
    runtime: Runtime,
    session: Session<L>,
}

impl<L: ConnectionLifetime> BlockingSession<L> {
    pub fn new(session: Session<L>) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;

        Ok(Self { runtime, session })
    }

    pub fn session(&self) -> &Session<L> {
        &self.session
    }

    pub fn into_inner(self) -> Session<L> {
        self.session
    }

    pub fn request_count(&self) -> u64 {
        self.session.request_count()
    }

    pub fn execute(&mut self, command: &Command) -> Result<u64> {
        self.runtime.block_on(self.session.execute(command))
    }

    pub fn execute_reader(&mut self, command: &Command) -> Result<Rows> {
        self.runtime.block_on(self.session.execute_reader(command))
    }

    pub fn execute_batch(&mut self, batch: &Batch) -> Result<u64> {
        self.runtime.block_on(self.session.execute_batch(batch))
    }

    pub fn execute_batch_reader(&mut self, batch: &Batch) -> Result<Vec<Rows>> {
        self.runtime.block_on(self.session.execute_batch_reader(batch))
    }

    pub fn execute_handler<H: QueryHandler>(&mut self, handler: &H) -> Result<H::Output> {
        self.runtime.block_on(self.session.execute_handler(handler))
    }

    pub fn load_one<T, S: Selector<T>>(
        &mut self,
        command: &Command,
        selector: &S,
    ) -> Result<Option<T>> {
        self.runtime.block_on(self.session.load_one(command, selector))
    }

    pub fn load_many<T, S: Selector<T>>(
        &mut self,
        command: &Command,
        selector: &S,
    ) -> Result<Vec<T>> {
        self.runtime.block_on(self.session.load_many(command, selector))
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        self.runtime.block_on(self.session.begin_transaction())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.runtime.block_on(self.session.commit())
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.runtime.block_on(self.session.rollback())
    }

    pub fn dispose(&mut self) {
        self.runtime.block_on(self.session.dispose())
    }

    /// Runs any async session code to completion, e.g. event store calls.
    pub fn run<T, F>(&mut self, f: F) -> T
    where
        F: for<'s> FnOnce(&'s mut Session<L>) -> LocalBoxFuture<'s, T>,
    {
        let Self { runtime, session } = self;

        runtime.block_on(f(session))
    }
}
