use std::marker::PhantomData;

use chronicle_query::{
    compile, push_page, Command, CommandBuilder, CursorOrder, QueryArgs, QueryResult, Row,
    Statement,
};
use chrono::{DateTime, Utc};

use crate::{
    error::Result,
    event::{Envelope, Event, StreamId},
    event_store::{EventStore, EVENT_COLUMNS},
    lifetime::ConnectionLifetime,
    session::Session,
};

/// Metadata columns a query can filter and order on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventField {
    Sequence,
    StreamId,
    Version,
    Timestamp,
    EventTypeName,
    QualifiedTypeName,
}

impl EventField {
    pub fn column(&self) -> &'static str {
        match self {
            EventField::Sequence => "seq_id",
            EventField::StreamId => "stream_id",
            EventField::Version => "version",
            EventField::Timestamp => "timestamp",
            EventField::EventTypeName => "type_name",
            EventField::QualifiedTypeName => "qualified_type_name",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    fn operator(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::NotEq => "<>",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
        }
    }
}

/// A predicate over event metadata. Payloads are never filtered on.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFilter {
    Sequence(Comparison, i64),
    Version(Comparison, i64),
    Timestamp(Comparison, DateTime<Utc>),
    StreamId(StreamId),
    EventTypeName(String),
    EventTypeNames(Vec<String>),
    QualifiedTypeName(String),
}

impl MetadataFilter {
    pub fn field(&self) -> EventField {
        match self {
            MetadataFilter::Sequence(..) => EventField::Sequence,
            MetadataFilter::Version(..) => EventField::Version,
            MetadataFilter::Timestamp(..) => EventField::Timestamp,
            MetadataFilter::StreamId(_) => EventField::StreamId,
            MetadataFilter::EventTypeName(_) | MetadataFilter::EventTypeNames(_) => {
                EventField::EventTypeName
            }
            MetadataFilter::QualifiedTypeName(_) => EventField::QualifiedTypeName,
        }
    }

    fn push(&self, builder: &mut CommandBuilder) {
        let column = self.field().column();

        match self {
            MetadataFilter::Sequence(comparison, value)
            | MetadataFilter::Version(comparison, value) => {
                builder
                    .append(format!("{column} {} ", comparison.operator()))
                    .append_parameter(*value);
            }
            MetadataFilter::Timestamp(comparison, value) => {
                builder
                    .append(format!("{column} {} ", comparison.operator()))
                    .append_parameter(*value);
            }
            MetadataFilter::StreamId(id) => {
                builder
                    .append(format!("{column} = "))
                    .append_parameter(id.to_value());
            }
            MetadataFilter::EventTypeName(name) | MetadataFilter::QualifiedTypeName(name) => {
                builder
                    .append(format!("{column} = "))
                    .append_parameter(name.as_str());
            }
            MetadataFilter::EventTypeNames(names) => {
                builder
                    .append(format!("{column} = ANY("))
                    .append_parameter(names.clone())
                    .append(")");
            }
        }
    }
}

/// Lazy query over every stored event of the session's tenant.
///
/// Nothing runs until one of the async terminal methods is called, and each
/// call runs the query again. Until the event table exists every terminal
/// returns an empty result.
#[derive(Clone)]
pub struct RawEventQuery {
    store: EventStore,
    filters: Vec<MetadataFilter>,
    order: Vec<(EventField, SortOrder)>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl RawEventQuery {
    pub(crate) fn new(store: EventStore) -> Self {
        Self {
            store,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn filter(mut self, filter: MetadataFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(&self) -> &[MetadataFilter] {
        &self.filters
    }

    pub fn sequence_gt(self, value: i64) -> Self {
        self.filter(MetadataFilter::Sequence(Comparison::Gt, value))
    }

    pub fn sequence_ge(self, value: i64) -> Self {
        self.filter(MetadataFilter::Sequence(Comparison::Ge, value))
    }

    pub fn sequence_lt(self, value: i64) -> Self {
        self.filter(MetadataFilter::Sequence(Comparison::Lt, value))
    }

    pub fn sequence_le(self, value: i64) -> Self {
        self.filter(MetadataFilter::Sequence(Comparison::Le, value))
    }

    pub fn version_eq(self, value: i64) -> Self {
        self.filter(MetadataFilter::Version(Comparison::Eq, value))
    }

    pub fn version_gt(self, value: i64) -> Self {
        self.filter(MetadataFilter::Version(Comparison::Gt, value))
    }

    pub fn version_lt(self, value: i64) -> Self {
        self.filter(MetadataFilter::Version(Comparison::Lt, value))
    }

    pub fn timestamp_gt(self, value: DateTime<Utc>) -> Self {
        self.filter(MetadataFilter::Timestamp(Comparison::Gt, value))
    }

    pub fn timestamp_ge(self, value: DateTime<Utc>) -> Self {
        self.filter(MetadataFilter::Timestamp(Comparison::Ge, value))
    }

    pub fn timestamp_lt(self, value: DateTime<Utc>) -> Self {
        self.filter(MetadataFilter::Timestamp(Comparison::Lt, value))
    }

    pub fn timestamp_le(self, value: DateTime<Utc>) -> Self {
        self.filter(MetadataFilter::Timestamp(Comparison::Le, value))
    }

    pub fn stream_id_eq(self, id: impl Into<StreamId>) -> Self {
        self.filter(MetadataFilter::StreamId(id.into()))
    }

    pub fn event_type_name_eq(self, name: impl Into<String>) -> Self {
        self.filter(MetadataFilter::EventTypeName(name.into()))
    }

    pub fn event_type_names_in<I, N>(self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.filter(MetadataFilter::EventTypeNames(
            names.into_iter().map(Into::into).collect(),
        ))
    }

    /// Events stored as `E`, by their stored type name.
    pub fn event_type<E: Event>(self) -> Self {
        let name = self.store.registry().type_name::<E>();

        self.event_type_name_eq(name)
    }

    /// Matches the fully qualified type name column, for rows written with
    /// legacy naming.
    pub fn qualified_type_name_eq(self, name: impl Into<String>) -> Self {
        self.filter(MetadataFilter::QualifiedTypeName(name.into()))
    }

    pub fn order_by(mut self, field: EventField, order: SortOrder) -> Self {
        self.order.push((field, order));
        self
    }

    pub fn take(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The command [`RawEventQuery::fetch_all`] would run for `tenant_id`.
    pub fn to_command(&self, tenant_id: &str) -> Command {
        compile(&self.select(Shape::Rows), tenant_id)
    }

    pub async fn fetch_all<L: ConnectionLifetime>(
        &self,
        session: &mut Session<L>,
    ) -> Result<Vec<Envelope>> {
        if !self.prepare(session).await? {
            return Ok(Vec::new());
        }

        let command = session.compile(&self.select(Shape::Rows));

        session
            .load_many(&command, &self.store.envelope_selector())
            .await
    }

    pub async fn first<L: ConnectionLifetime>(
        &self,
        session: &mut Session<L>,
    ) -> Result<Option<Envelope>> {
        let events = self.clone().take(1).fetch_all(session).await?;

        Ok(events.into_iter().next())
    }

    pub async fn count<L: ConnectionLifetime>(&self, session: &mut Session<L>) -> Result<i64> {
        if !self.prepare(session).await? {
            return Ok(0);
        }

        let command = session.compile(&self.select(Shape::Count));
        let count = session
            .load_one(&command, &|row: &Row| -> Result<i64> { Ok(row.get("count")?) })
            .await?;

        Ok(count.unwrap_or_default())
    }

    pub async fn any<L: ConnectionLifetime>(&self, session: &mut Session<L>) -> Result<bool> {
        if !self.prepare(session).await? {
            return Ok(false);
        }

        let command = session.compile(&self.select(Shape::Exists));
        let found = session
            .load_one(&command, &|row: &Row| -> Result<bool> { Ok(row.get("found")?) })
            .await?;

        Ok(found.unwrap_or_default())
    }

    /// One page in sequence order. Ordering, `take` and `skip` are ignored.
    pub async fn page<L: ConnectionLifetime>(
        &self,
        session: &mut Session<L>,
        args: QueryArgs,
    ) -> Result<QueryResult<Envelope>> {
        if !self.prepare(session).await? {
            return Ok(QueryResult::default());
        }

        let mut builder = CommandBuilder::new();
        self.push_where(&mut builder, EVENT_COLUMNS);
        push_page::<Envelope>(&mut builder, &args, &CursorOrder::Asc, true)?;

        let mut command = builder.build();
        command.set_tenant_id(session.tenant_id());

        let rows = session
            .load_many(&command, &self.store.envelope_selector())
            .await?;

        Ok(QueryResult::from_rows(rows, &args))
    }

    async fn prepare<L: ConnectionLifetime>(&self, session: &mut Session<L>) -> Result<bool> {
        for filter in self.filters.iter() {
            if let MetadataFilter::StreamId(id) = filter {
                self.store.check_identity(id)?;
            }
        }

        self.store.ensure_warmed(session).await
    }

    fn select(&self, shape: Shape) -> SelectEvents<'_> {
        SelectEvents { query: self, shape }
    }

    fn push_where(&self, builder: &mut CommandBuilder, columns: &str) {
        builder
            .append(format!(
                "SELECT {columns} FROM {} WHERE tenant_id = ",
                self.store.table()
            ))
            .append_tenant_parameter();

        for filter in self.filters.iter() {
            builder.append(" AND ");
            filter.push(builder);
        }
    }

    fn push_order_and_limit(&self, builder: &mut CommandBuilder) {
        let order = if self.order.is_empty() {
            "seq_id ASC".to_owned()
        } else {
            self.order
                .iter()
                .map(|(field, order)| format!("{} {}", field.column(), order.keyword()))
                .collect::<Vec<_>>()
                .join(", ")
        };

        builder.append(format!(" ORDER BY {order}"));

        if let Some(limit) = self.limit {
            builder.append(format!(" LIMIT {limit}"));
        }

        if let Some(offset) = self.offset {
            builder.append(format!(" OFFSET {offset}"));
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    Rows,
    Count,
    Exists,
}

struct SelectEvents<'a> {
    query: &'a RawEventQuery,
    shape: Shape,
}

impl Statement for SelectEvents<'_> {
    fn configure(&self, builder: &mut CommandBuilder) {
        let query = self.query;
        let bounded = query.limit.is_some() || query.offset.is_some();

        match self.shape {
            Shape::Rows => {
                query.push_where(builder, EVENT_COLUMNS);
                query.push_order_and_limit(builder);
            }
            Shape::Count if bounded => {
                builder.append("SELECT count(*) AS count FROM (");
                query.push_where(builder, "seq_id");
                query.push_order_and_limit(builder);
                builder.append(") AS events");
            }
            Shape::Count => {
                query.push_where(builder, "count(*) AS count");
            }
            Shape::Exists => {
                builder.append("SELECT EXISTS (");
                query.push_where(builder, "seq_id");
                query.push_order_and_limit(builder);
                builder.append(") AS found");
            }
        }
    }
}

/// Typed view over the events stored as `E`.
pub struct RawEventsByType<E> {
    query: RawEventQuery,
    _event: PhantomData<fn() -> E>,
}

impl<E> Clone for RawEventsByType<E> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            _event: PhantomData,
        }
    }
}

impl<E: Event> RawEventsByType<E> {
    pub(crate) fn new(store: EventStore) -> Self {
        Self {
            query: RawEventQuery::new(store).event_type::<E>(),
            _event: PhantomData,
        }
    }

    pub fn filter(mut self, filter: MetadataFilter) -> Self {
        self.query = self.query.filter(filter);
        self
    }

    pub fn order_by(mut self, field: EventField, order: SortOrder) -> Self {
        self.query = self.query.order_by(field, order);
        self
    }

    pub fn take(mut self, limit: u32) -> Self {
        self.query = self.query.take(limit);
        self
    }

    pub fn skip(mut self, offset: u32) -> Self {
        self.query = self.query.skip(offset);
        self
    }

    /// The underlying metadata query.
    pub fn raw(&self) -> &RawEventQuery {
        &self.query
    }

    pub fn to_command(&self, tenant_id: &str) -> Command {
        self.query.to_command(tenant_id)
    }

    pub async fn fetch_all<L: ConnectionLifetime>(
        &self,
        session: &mut Session<L>,
    ) -> Result<Vec<E>> {
        let registry = self.query.store.registry();

        self.query
            .fetch_all(session)
            .await?
            .iter()
            .map(|envelope| registry.decode_as::<E>(&envelope.data))
            .collect()
    }

    /// Matching events with their metadata.
    pub async fn envelopes<L: ConnectionLifetime>(
        &self,
        session: &mut Session<L>,
    ) -> Result<Vec<Envelope>> {
        self.query.fetch_all(session).await
    }

    pub async fn first<L: ConnectionLifetime>(
        &self,
        session: &mut Session<L>,
    ) -> Result<Option<E>> {
        let events = self.clone().take(1).fetch_all(session).await?;

        Ok(events.into_iter().next())
    }

    pub async fn count<L: ConnectionLifetime>(&self, session: &mut Session<L>) -> Result<i64> {
        self.query.count(session).await
    }

    pub async fn any<L: ConnectionLifetime>(&self, session: &mut Session<L>) -> Result<bool> {
        self.query.any(session).await
    }
}

impl EventStore {
    /// Events stored as `E`, decoded into `E`.
    pub fn query_raw_events_by_type<E: Event>(&self) -> RawEventsByType<E> {
        RawEventsByType::new(self.clone())
    }

    /// Every event regardless of type, with metadata.
    pub fn query_all_raw_events(&self) -> RawEventQuery {
        RawEventQuery::new(self.clone())
    }
}
