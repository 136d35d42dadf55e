//! Command compilation for the chronicle event store.
//!
//! Statements describe what to run; the [`CommandBuilder`] turns them into a
//! [`Command`] (text with `$n` placeholders plus ordered parameters) or a
//! [`Batch`] of independently numbered commands. Compiling never touches the
//! database.
//!
//! ```rust
//! use chronicle_query::{compile, CommandBuilder, Statement, Value, TENANT_ID_ARG};
//!
//! struct CountStreams;
//!
//! impl Statement for CountStreams {
//!     fn configure(&self, builder: &mut CommandBuilder) {
//!         builder
//!             .append("SELECT count(DISTINCT stream_id) FROM chr_events WHERE tenant_id = ")
//!             .append_tenant_parameter();
//!     }
//! }
//!
//! let command = compile(&CountStreams, "tenant-a");
//!
//! assert_eq!(
//!     command.text,
//!     "SELECT count(DISTINCT stream_id) FROM chr_events WHERE tenant_id = $1"
//! );
//! assert_eq!(
//!     command.parameter(TENANT_ID_ARG).map(|p| &p.value),
//!     Some(&Value::from("tenant-a"))
//! );
//! ```
#![forbid(unsafe_code)]

mod builder;
mod command;
mod cursor;
mod error;
mod query;
mod row;
mod value;

pub use builder::{compile, compile_batch, CommandBuilder, Statement};
pub use command::{Batch, Command, Parameter, TENANT_ID_ARG};
pub use cursor::{utc_field, Cursor, CursorFields, CursorOrder, CursorType};
pub use error::QueryError;
pub use query::{push_page, Edge, PageInfo, QueryArgs, QueryResult};
pub use row::Row;
pub use value::{FromValue, Value};
