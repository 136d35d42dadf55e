use chronicle_query::{CommandBuilder, Row, Statement};
use chrono::{DateTime, Utc};

use crate::{
    error::{ChronicleError, ConflictReason, Result},
    event::{Envelope, EventHeader, StreamHandle, StreamId, WriteEvent},
    event_store::{EventField, EventStore, SortOrder},
    lifetime::ConnectionLifetime,
    logger::ChangeSet,
    session::Session,
};

impl EventStore {
    /// Appends events after whatever the stream already holds.
    ///
    /// Versions are assigned from the stream's current version. A concurrent
    /// writer that claimed the same versions first makes this fail with a
    /// stream version write conflict.
    pub async fn append<L: ConnectionLifetime>(
        &self,
        session: &mut Session<L>,
        stream_id: impl Into<StreamId>,
        events: Vec<WriteEvent>,
    ) -> Result<StreamHandle> {
        self.append_events(session, stream_id.into(), None, events)
            .await
    }

    /// Appends only if the stream is currently at `expected_version`.
    pub async fn append_expected<L: ConnectionLifetime>(
        &self,
        session: &mut Session<L>,
        stream_id: impl Into<StreamId>,
        expected_version: i64,
        events: Vec<WriteEvent>,
    ) -> Result<StreamHandle> {
        self.append_events(session, stream_id.into(), Some(expected_version), events)
            .await
    }

    /// Appends to a stream that must not exist yet.
    pub async fn start_stream<L: ConnectionLifetime>(
        &self,
        session: &mut Session<L>,
        stream_id: impl Into<StreamId>,
        events: Vec<WriteEvent>,
    ) -> Result<StreamHandle> {
        self.append_events(session, stream_id.into(), Some(0), events)
            .await
    }

    /// Current version of a stream for the session's tenant, 0 when empty.
    pub async fn stream_version<L: ConnectionLifetime>(
        &self,
        session: &mut Session<L>,
        stream_id: impl Into<StreamId>,
    ) -> Result<i64> {
        let stream_id = stream_id.into();
        self.check_identity(&stream_id)?;

        self.current_version(session, &stream_id).await
    }

    /// Every event of one stream in version order.
    pub async fn fetch_stream<L: ConnectionLifetime>(
        &self,
        session: &mut Session<L>,
        stream_id: impl Into<StreamId>,
    ) -> Result<Vec<Envelope>> {
        self.query_all_raw_events()
            .stream_id_eq(stream_id)
            .order_by(EventField::Version, SortOrder::Asc)
            .fetch_all(session)
            .await
    }

    async fn current_version<L: ConnectionLifetime>(
        &self,
        session: &mut Session<L>,
        stream_id: &StreamId,
    ) -> Result<i64> {
        let command = session.compile(&StreamVersion {
            table: self.table(),
            stream_id,
        });
        let version = session
            .load_one(&command, &|row: &Row| -> Result<i64> { Ok(row.get("version")?) })
            .await?;

        Ok(version.unwrap_or_default())
    }

    async fn append_events<L: ConnectionLifetime>(
        &self,
        session: &mut Session<L>,
        stream_id: StreamId,
        expected_version: Option<i64>,
        events: Vec<WriteEvent>,
    ) -> Result<StreamHandle> {
        self.check_identity(&stream_id)?;

        if events.is_empty() {
            return Err(ChronicleError::EmptyAppend(stream_id.to_string()));
        }

        let current = self.current_version(session, &stream_id).await?;

        if let Some(expected) = expected_version {
            if expected != current {
                return Err(ChronicleError::WriteConflict {
                    reason: ConflictReason::UnexpectedVersion {
                        stream: stream_id.to_string(),
                        expected,
                        actual: current,
                    },
                    statement: None,
                    source: None,
                });
            }
        }

        let command = session.compile(&InsertEvents {
            table: self.table(),
            stream_id: &stream_id,
            first_version: current + 1,
            events: &events,
        });

        let mut headers = session
            .load_many(&command, &|row: &Row| -> Result<(i64, i64, DateTime<Utc>)> {
                Ok((row.get("seq_id")?, row.get("version")?, row.get("timestamp")?))
            })
            .await?;

        headers.sort_by_key(|(_, version, _)| *version);

        let handle = StreamHandle {
            id: stream_id,
            tenant_id: session.tenant_id().to_owned(),
            version: current + events.len() as i64,
            events: headers
                .into_iter()
                .zip(events.iter())
                .map(|((sequence, version, timestamp), event)| EventHeader {
                    sequence,
                    version,
                    timestamp,
                    type_name: event.type_name.to_owned(),
                })
                .collect(),
        };

        tracing::debug!(
            stream = %handle.id,
            tenant = %handle.tenant_id,
            version = handle.version,
            "appended events"
        );

        session.record_saved_changes(&ChangeSet {
            tenant_id: handle.tenant_id.to_owned(),
            streams: vec![handle.clone()],
        });

        Ok(handle)
    }
}

struct StreamVersion<'a> {
    table: String,
    stream_id: &'a StreamId,
}

impl Statement for StreamVersion<'_> {
    fn configure(&self, builder: &mut CommandBuilder) {
        builder
            .append(format!(
                "SELECT COALESCE(MAX(version), 0) AS version FROM {} WHERE stream_id = ",
                self.table
            ))
            .append_parameter(self.stream_id.to_value())
            .append(" AND tenant_id = ")
            .append_tenant_parameter();
    }
}

struct InsertEvents<'a> {
    table: String,
    stream_id: &'a StreamId,
    first_version: i64,
    events: &'a [WriteEvent],
}

/// One statement whatever the number of events: they travel as a single
/// JSON array parameter expanded by the server, which keeps the append atomic
/// and clear of the bind parameter limit.
impl Statement for InsertEvents<'_> {
    fn configure(&self, builder: &mut CommandBuilder) {
        let rows = self
            .events
            .iter()
            .map(|event| {
                serde_json::json!({
                    "type_name": event.type_name,
                    "qualified_type_name": event.qualified_type_name,
                    "data": event.data,
                })
            })
            .collect::<Vec<_>>();

        builder
            .append(format!(
                "INSERT INTO {} (stream_id, version, type_name, qualified_type_name, tenant_id, data) SELECT ",
                self.table
            ))
            .append_parameter(self.stream_id.to_value())
            .append(", ")
            .append_parameter(self.first_version)
            .append(" + e.ordinality - 1, e.value ->> 'type_name', e.value ->> 'qualified_type_name', ")
            .append_tenant_parameter()
            .append(", e.value -> 'data' FROM jsonb_array_elements(")
            .append_parameter(serde_json::Value::Array(rows))
            .append(") WITH ORDINALITY AS e(value, ordinality) RETURNING seq_id, version, timestamp");
    }
}
