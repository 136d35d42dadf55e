//! Append-only event storage on PostgreSQL with a resilient command
//! execution core.
//!
//! A [`DocumentStore`] hands out [`Session`]s. Every command a session runs
//! goes through one path: request counting, connection attachment, retry,
//! logging hooks and classification of driver failures into
//! [`ChronicleError`]s. The [`EventStore`] appends events to streams and
//! queries them back by metadata, always scoped to the session's tenant.
#![forbid(unsafe_code)]

mod blocking;
mod error;
mod event;
mod event_store;
mod exceptions;
mod handler;
mod lifetime;
mod logger;
mod options;
mod retry;
mod session;
mod store;

pub use blocking::*;
pub use error::*;
pub use event::*;
pub use event_store::*;
pub use exceptions::*;
pub use handler::*;
pub use lifetime::*;
pub use logger::*;
pub use options::*;
pub use retry::*;
pub use session::*;
pub use store::*;

pub use chronicle_query::{
    compile, compile_batch, Batch, Command, CommandBuilder, Cursor, CursorOrder, CursorType,
    Edge, PageInfo, QueryArgs, QueryResult, Row, Statement, Value,
};
