use std::time::Duration;

use chronicle_store::{
    ChronicleError, Command, ConflictReason, DocumentStore, EventField, QueryArgs, Row, SortOrder,
};
use uuid::Uuid;

use crate::common::{departed, joined, MembersDeparted, MembersJoined, QuestStarted};

pub async fn test_append_and_read(store: &DocumentStore) -> anyhow::Result<()> {
    let events = store.events();
    let stream = Uuid::new_v4();
    let mut session = store.open_session_for("append");

    let handle = events
        .start_stream(
            &mut session,
            stream,
            vec![
                events.event(&QuestStarted {
                    name: "Destroy the Ring".to_owned(),
                })?,
                events.event(&joined(1, &["Frodo", "Sam"]))?,
            ],
        )
        .await?;
    session.commit().await?;

    assert_eq!(handle.version, 2);
    assert!(handle.events[0].sequence < handle.events[1].sequence);

    let mut session = store.open_session_for("append");
    let handle = events
        .append_expected(
            &mut session,
            stream,
            2,
            vec![
                events.event(&joined(3, &["Merry", "Pippin"]))?,
                events.event(&departed(9, &["Boromir"]))?,
            ],
        )
        .await?;
    session.commit().await?;

    assert_eq!(handle.version, 4);

    let mut session = store.open_session_for("append");
    assert_eq!(events.stream_version(&mut session, stream).await?, 4);

    let all = events.fetch_stream(&mut session, stream).await?;
    assert_eq!(
        all.iter().map(|e| e.version).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert_eq!(all[0].tenant_id, "append");
    assert!(all[0].is::<QuestStarted>());
    assert_eq!(
        all[1].downcast_ref::<MembersJoined>(),
        Some(&joined(1, &["Frodo", "Sam"]))
    );

    let joins = events
        .query_raw_events_by_type::<MembersJoined>()
        .filter(chronicle_store::MetadataFilter::StreamId(stream.into()))
        .order_by(EventField::Version, SortOrder::Desc)
        .fetch_all(&mut session)
        .await?;
    assert_eq!(joins, vec![joined(3, &["Merry", "Pippin"]), joined(1, &["Frodo", "Sam"])]);

    let departures = events
        .query_raw_events_by_type::<MembersDeparted>()
        .filter(chronicle_store::MetadataFilter::StreamId(stream.into()));
    assert_eq!(departures.count(&mut session).await?, 1);
    assert!(departures.any(&mut session).await?);

    let page = events
        .query_all_raw_events()
        .stream_id_eq(stream)
        .page(&mut session, QueryArgs::forward(3, None))
        .await?;
    assert_eq!(page.edges.len(), 3);
    assert!(page.page_info.has_next_page);

    let rest = events
        .query_all_raw_events()
        .stream_id_eq(stream)
        .page(&mut session, QueryArgs::forward(3, page.page_info.end_cursor))
        .await?;
    assert_eq!(rest.edges.len(), 1);
    assert_eq!(rest.edges[0].node.version, 4);
    assert!(!rest.page_info.has_next_page);

    session.commit().await?;

    Ok(())
}

pub async fn test_auto_closing(store: &DocumentStore) -> anyhow::Result<()> {
    let events = store.events();
    let stream = Uuid::new_v4();
    let mut session = store.open_session_for("auto");

    events
        .append(&mut session, stream, vec![events.event(&joined(1, &["Thom"]))?])
        .await?;

    assert!(!session.lifetime().in_transaction());

    let mut other = store.open_session_for("auto");
    assert_eq!(events.stream_version(&mut other, stream).await?, 1);

    Ok(())
}

pub async fn test_wrong_version(store: &DocumentStore) -> anyhow::Result<()> {
    let events = store.events();
    let stream = Uuid::new_v4();
    let mut session = store.open_session_for("wrong_version");

    events
        .start_stream(&mut session, stream, vec![events.event(&joined(1, &["Moiraine"]))?])
        .await?;
    session.commit().await?;

    let mut session = store.open_session_for("wrong_version");
    let err = events
        .append_expected(
            &mut session,
            stream,
            0,
            vec![events.event(&joined(2, &["Lan"]))?],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ChronicleError::WriteConflict {
            reason: ConflictReason::UnexpectedVersion {
                expected: 0,
                actual: 1,
                ..
            },
            ..
        }
    ));

    Ok(())
}

pub async fn test_concurrency(store: &DocumentStore) -> anyhow::Result<()> {
    let events = store.events();
    let stream = Uuid::new_v4();
    let first_event = events.event(&joined(1, &["Rand"]))?;
    let second_event = events.event(&joined(1, &["Mat"]))?;

    let first = async {
        let mut session = store.open_session_for("concurrency");
        let handle = events
            .append(&mut session, stream, vec![first_event])
            .await?;
        tokio::time::sleep(Duration::from_millis(300)).await;
        session.commit().await?;

        Ok::<_, ChronicleError>(handle)
    };

    let second = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut session = store.open_session_for("concurrency");
        let handle = events
            .append(&mut session, stream, vec![second_event])
            .await?;
        session.commit().await?;

        Ok::<_, ChronicleError>(handle)
    };

    let (first, second) = tokio::join!(first, second);

    assert_eq!(first?.version, 1);
    assert!(matches!(
        second,
        Err(ChronicleError::WriteConflict {
            reason: ConflictReason::StreamVersion,
            ..
        })
    ));

    let mut session = store.open_session_for("concurrency");
    assert_eq!(events.stream_version(&mut session, stream).await?, 1);

    Ok(())
}

pub async fn test_tenant_isolation(store: &DocumentStore) -> anyhow::Result<()> {
    let events = store.events();
    let stream = Uuid::new_v4();

    for tenant in ["green", "blue"] {
        let mut session = store.open_session_for(tenant);
        events
            .start_stream(&mut session, stream, vec![events.event(&joined(1, &[tenant]))?])
            .await?;
        session.commit().await?;
    }

    let mut session = store.open_session_for("green");
    let green = events
        .query_raw_events_by_type::<MembersJoined>()
        .filter(chronicle_store::MetadataFilter::StreamId(stream.into()))
        .fetch_all(&mut session)
        .await?;

    assert_eq!(green, vec![joined(1, &["green"])]);
    assert_eq!(events.stream_version(&mut session, stream).await?, 1);

    Ok(())
}

pub async fn test_string_streams(store: &DocumentStore) -> anyhow::Result<()> {
    let events = store.events();
    let stream = format!("quest-{}", Uuid::new_v4());
    let mut session = store.open_session_for("strings");

    events
        .append(
            &mut session,
            stream.as_str(),
            vec![
                events.event(&joined(1, &["Perrin"]))?,
                events.event(&joined(2, &["Faile"]))?,
            ],
        )
        .await?;
    session.commit().await?;

    let mut session = store.open_session_for("strings");
    let stored = events.fetch_stream(&mut session, stream.as_str()).await?;

    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].stream_id.to_string(), stream);

    let err = events
        .stream_version(&mut session, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ChronicleError::StreamIdentityMismatch(..)));

    Ok(())
}

pub async fn test_missing_table(store: &DocumentStore) -> anyhow::Result<()> {
    let events = store.events();
    let mut session = store.open_session();

    assert!(events.query_all_raw_events().fetch_all(&mut session).await?.is_empty());
    assert_eq!(events.query_all_raw_events().count(&mut session).await?, 0);
    assert!(!events.query_all_raw_events().any(&mut session).await?);
    assert!(!events.is_warmed());

    Ok(())
}

pub async fn test_command_failures(store: &DocumentStore) -> anyhow::Result<()> {
    let mut session = store.open_session_for("failures");

    let rows = session
        .load_many(&Command::new("SELECT 1::bigint AS one"), &|row: &Row| {
            Ok::<i64, ChronicleError>(row.get("one")?)
        })
        .await?;
    assert_eq!(rows, vec![1]);

    let err = session
        .execute(&Command::new("SELECT * FROM public.no_such_table"))
        .await
        .unwrap_err();

    match err {
        ChronicleError::CommandExecution {
            ref command,
            ref tenant_id,
            ..
        } => {
            assert_eq!(command, "SELECT * FROM public.no_such_table");
            assert_eq!(tenant_id, "failures");
        }
        ref other => panic!("unexpected error {other:?}"),
    }

    assert!(session.is_closed());
    assert!(matches!(
        session.execute(&Command::new("SELECT 1")).await,
        Err(ChronicleError::SessionClosed)
    ));

    Ok(())
}
