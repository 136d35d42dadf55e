use chrono::{DateTime, Utc};
use chronicle_query::{
    push_page, utc_field, CommandBuilder, Cursor, CursorFields, CursorOrder, CursorType,
    QueryArgs, QueryError, QueryResult, Value,
};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub struct Todo {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Cursor for Todo {
    fn keys() -> Vec<&'static str> {
        vec!["created_at", "text", "id"]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.created_at.into(),
            self.text.to_owned().into(),
            self.id.into(),
        ]
    }

    fn serialize(&self) -> Vec<String> {
        vec![
            utc_field(self.created_at),
            self.text.to_owned(),
            self.id.to_string(),
        ]
    }

    fn deserialize(fields: &mut CursorFields) -> Result<Self, QueryError> {
        Ok(Todo {
            created_at: fields.next_utc("created_at")?,
            text: fields.next("text")?,
            id: fields.next("id")?,
        })
    }
}

fn todo(text: &str) -> Todo {
    Todo {
        id: Uuid::new_v4(),
        text: text.to_owned(),
        created_at: DateTime::from_timestamp_micros(Utc::now().timestamp_micros()).unwrap(),
    }
}

fn filter(order: CursorOrder, backward: bool, existing: usize) -> String {
    let mut builder = CommandBuilder::new();
    for index in 0..existing {
        builder.add_parameter(index as i64);
    }

    todo("x").push_filter(&mut builder, &order, backward);
    builder.build().text
}

#[test]
fn filter_follows_walk_direction() {
    assert_eq!(
        filter(CursorOrder::Asc, false, 0),
        "(created_at, text, id) > ($1, $2, $3)"
    );
    assert_eq!(
        filter(CursorOrder::Asc, true, 0),
        "(created_at, text, id) < ($1, $2, $3)"
    );
    assert_eq!(
        filter(CursorOrder::Desc, false, 0),
        "(created_at, text, id) < ($1, $2, $3)"
    );
    assert_eq!(
        filter(CursorOrder::Desc, true, 2),
        "(created_at, text, id) > ($3, $4, $5)"
    );
}

#[test]
fn order_follows_direction() {
    assert_eq!(
        Todo::order_clause(&CursorOrder::Asc, false),
        "created_at ASC, text ASC, id ASC"
    );
    assert_eq!(
        Todo::order_clause(&CursorOrder::Asc, true),
        "created_at DESC, text DESC, id DESC"
    );
}

#[test]
fn malformed_cursors_are_rejected() {
    assert!(matches!(
        Todo::from_cursor(&CursorType("not base64!".to_owned())),
        Err(QueryError::Base64(_))
    ));
    assert!(matches!(
        Todo::from_cursor(&CursorType::encode(["123"])),
        Err(QueryError::MissingField(field)) if field == "text"
    ));
    assert!(matches!(
        Todo::from_cursor(&CursorType::encode(["123", "a", "not-a-uuid"])),
        Err(QueryError::Invalid { field, .. }) if field == "id"
    ));
}

#[test]
fn cursor_round_trip() {
    let todo = todo("buy milk");
    let cursor = todo.to_cursor();

    assert_eq!(Todo::from_cursor(&cursor).unwrap(), todo);
}

#[test]
fn page_without_cursor_only_orders_and_limits() {
    let mut builder = CommandBuilder::new();
    builder.append("SELECT * FROM todos");

    push_page::<Todo>(
        &mut builder,
        &QueryArgs::forward(10, None),
        &CursorOrder::Asc,
        false,
    )
    .unwrap();

    let command = builder.build();

    assert_eq!(
        command.text,
        "SELECT * FROM todos ORDER BY created_at ASC, text ASC, id ASC LIMIT 11"
    );
    assert!(command.parameters.is_empty());
}

#[test]
fn page_after_cursor_binds_keys_after_existing_parameters() {
    let after = todo("walk dog");
    let mut builder = CommandBuilder::new();
    builder
        .append("SELECT * FROM todos WHERE text <> ")
        .append_parameter("x");

    push_page::<Todo>(
        &mut builder,
        &QueryArgs::forward(2, Some(after.to_cursor())),
        &CursorOrder::Asc,
        true,
    )
    .unwrap();

    let command = builder.build();

    assert_eq!(
        command.text,
        "SELECT * FROM todos WHERE text <> $1 AND ((created_at, text, id) > ($2, $3, $4)) ORDER BY created_at ASC, text ASC, id ASC LIMIT 3"
    );
    assert_eq!(command.parameters.len(), 4);
    assert_eq!(command.parameters[1].value, Value::Timestamp(after.created_at));
    assert_eq!(command.parameters[3].value, Value::Uuid(after.id));
}

#[test]
fn page_filter_opens_a_where_clause_after_a_subquery() {
    let after = todo("walk dog");
    let mut builder = CommandBuilder::new();
    builder.append("SELECT * FROM (SELECT * FROM todos WHERE done) AS t");

    push_page::<Todo>(
        &mut builder,
        &QueryArgs::backward(1, Some(after.to_cursor())),
        &CursorOrder::Asc,
        false,
    )
    .unwrap();

    assert_eq!(
        builder.sql(),
        "SELECT * FROM (SELECT * FROM todos WHERE done) AS t WHERE ((created_at, text, id) < ($1, $2, $3)) ORDER BY created_at DESC, text DESC, id DESC LIMIT 2"
    );
}

#[test]
fn result_drops_the_lookahead_row() {
    let rows = vec![todo("a"), todo("b"), todo("c")];
    let result = QueryResult::from_rows(rows.clone(), &QueryArgs::forward(2, None));

    assert_eq!(result.edges.len(), 2);
    assert!(result.page_info.has_next_page);
    assert_eq!(result.page_info.end_cursor, Some(rows[1].to_cursor()));

    let result = QueryResult::from_rows(rows, &QueryArgs::forward(5, None));

    assert_eq!(result.edges.len(), 3);
    assert!(!result.page_info.has_next_page);
}

#[test]
fn backward_result_is_reversed() {
    let rows = vec![todo("c"), todo("b"), todo("a")];
    let result = QueryResult::from_rows(rows, &QueryArgs::backward(2, None));

    assert_eq!(result.edges[0].node.text, "b");
    assert_eq!(result.edges[1].node.text, "c");
    assert!(result.page_info.has_previous_page);
}
