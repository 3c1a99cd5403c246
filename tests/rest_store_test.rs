mod common;

use common::test_config;
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use watchpoint::models::{ContentIdentity, UserId};
use watchpoint::services::{ColumnCapability, ProgressSync, SaveOutcome};
use watchpoint::store::{
    DEFAULT_TABLE, Filter, OrderBy, RemoteStore, RestStore, Row, StoreError, columns,
};

const TABLE_PATH: &str = "/rest/v1/watch_progress";
const MISSING_DURATION: &str = concat!(
    "Could not find the 'duration_seconds' column ",
    "of 'watch_progress' in the schema cache"
);

fn store(server: &Server, token: Option<&str>) -> RestStore {
    RestStore::new(
        server.url(),
        "anon-key",
        token.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_principal_from_access_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/auth/v1/user")
        .match_header("authorization", "Bearer user-token")
        .match_header("apikey", "anon-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"id": "u1", "email": "viewer@example.com"}).to_string())
        .create_async()
        .await;

    let principal = store(&server, Some("user-token"))
        .current_principal()
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(principal, Some(UserId::new("u1")));
}

#[tokio::test]
async fn test_rejected_or_missing_token_is_signed_out() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/auth/v1/user")
        .with_status(401)
        .with_body(json!({"message": "JWT expired"}).to_string())
        .create_async()
        .await;

    assert_eq!(
        store(&server, Some("stale")).current_principal().await.unwrap(),
        None
    );
    mock.assert_async().await;

    // No token: no request at all
    assert_eq!(store(&server, None).current_principal().await.unwrap(), None);
}

#[tokio::test]
async fn test_query_encodes_filters_order_and_limit() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", TABLE_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("select".into(), "*".into()),
            Matcher::UrlEncoded("user_id".into(), "eq.u1".into()),
            Matcher::UrlEncoded("content_id".into(), "eq.m1".into()),
            Matcher::UrlEncoded("unit_id".into(), "is.null".into()),
            Matcher::UrlEncoded("order".into(), "updated_at.desc".into()),
            Matcher::UrlEncoded("limit".into(), "1".into()),
        ]))
        .match_header("authorization", "Bearer user-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([{
                "user_id": "u1",
                "content_id": "m1",
                "unit_id": null,
                "position_seconds": 700
            }])
            .to_string(),
        )
        .create_async()
        .await;

    let rows = store(&server, Some("user-token"))
        .query(
            DEFAULT_TABLE,
            &[
                Filter::eq(columns::USER_ID, "u1"),
                Filter::eq(columns::CONTENT_ID, "m1"),
                Filter::is_null(columns::UNIT_ID),
            ],
            Some(OrderBy::desc(columns::UPDATED_AT)),
            Some(1),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["position_seconds"], json!(700));
}

#[tokio::test]
async fn test_upsert_merges_on_conflict_columns() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", TABLE_PATH)
        .match_query(Matcher::UrlEncoded(
            "on_conflict".into(),
            "user_id,content_id,unit_id".into(),
        ))
        .match_header("prefer", "resolution=merge-duplicates,return=minimal")
        .match_body(Matcher::PartialJson(json!({
            "content_id": "show",
            "unit_id": "e1",
            "position_seconds": 42
        })))
        .with_status(201)
        .create_async()
        .await;

    store(&server, Some("user-token"))
        .upsert(
            DEFAULT_TABLE,
            row(json!({
                "user_id": "u1",
                "content_id": "show",
                "unit_id": "e1",
                "position_seconds": 42
            })),
            &[columns::USER_ID, columns::CONTENT_ID, columns::UNIT_ID],
        )
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_update_counts_returned_rows() {
    let mut server = Server::new_async().await;
    server
        .mock("PATCH", TABLE_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("content_id".into(), "eq.m1".into()),
            Matcher::UrlEncoded("unit_id".into(), "is.null".into()),
        ]))
        .match_header("prefer", "return=representation")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!([{"content_id": "m1"}]).to_string())
        .create_async()
        .await;
    server
        .mock("PATCH", TABLE_PATH)
        .match_query(Matcher::UrlEncoded("content_id".into(), "eq.m2".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let store = store(&server, Some("user-token"));
    let update = row(json!({"position_seconds": 10}));

    let hit = store
        .update(
            DEFAULT_TABLE,
            update.clone(),
            &[
                Filter::eq(columns::CONTENT_ID, "m1"),
                Filter::is_null(columns::UNIT_ID),
            ],
        )
        .await
        .unwrap();
    let miss = store
        .update(
            DEFAULT_TABLE,
            update,
            &[Filter::eq(columns::CONTENT_ID, "m2")],
        )
        .await
        .unwrap();

    assert_eq!(hit, 1);
    assert_eq!(miss, 0);
}

#[tokio::test]
async fn test_error_bodies_are_classified() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", TABLE_PATH)
        .match_query(Matcher::Missing)
        .match_body(Matcher::PartialJson(json!({"content_id": "m1"})))
        .with_status(409)
        .with_body(
            json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint"
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("POST", TABLE_PATH)
        .match_query(Matcher::Missing)
        .match_body(Matcher::PartialJson(json!({"content_id": "m2"})))
        .with_status(400)
        .with_body(
            json!({
                "code": "PGRST204",
                "message": MISSING_DURATION
            })
            .to_string(),
        )
        .create_async()
        .await;

    let store = store(&server, Some("user-token"));

    let err = store
        .insert(DEFAULT_TABLE, row(json!({"content_id": "m1"})))
        .await
        .unwrap_err();
    assert!(err.is_unique_violation(), "got {:?}", err);

    let err = store
        .insert(DEFAULT_TABLE, row(json!({"content_id": "m2"})))
        .await
        .unwrap_err();
    assert_eq!(err.missing_column(), Some("duration_seconds"));
}

#[tokio::test]
async fn test_unreachable_server_is_a_transport_error() {
    let store = RestStore::new(
        "http://127.0.0.1:9",
        "anon-key",
        Some("user-token".to_string()),
        Duration::from_secs(1),
    )
    .unwrap();

    let err = store
        .query(DEFAULT_TABLE, &[], None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Transport(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_sync_over_rest_drops_missing_duration_column() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/auth/v1/user")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"id": "u1"}).to_string())
        .create_async()
        .await;
    let rejected = server
        .mock("POST", TABLE_PATH)
        .match_query(Matcher::Any)
        .match_body(Matcher::Regex("duration_seconds".to_string()))
        .with_status(400)
        .with_body(
            json!({
                "code": "PGRST204",
                "message": MISSING_DURATION
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("POST", TABLE_PATH)
        .match_query(Matcher::UrlEncoded(
            "on_conflict".into(),
            "user_id,content_id,unit_id".into(),
        ))
        .match_body(Matcher::PartialJson(json!({
            "user_id": "u1",
            "content_id": "show",
            "unit_id": "e1"
        })))
        .with_status(201)
        .expect(3)
        .create_async()
        .await;

    let sync = ProgressSync::new(
        Arc::new(store(&server, Some("user-token"))),
        &test_config().progress,
        DEFAULT_TABLE,
    );
    let episode = ContentIdentity::episode("show", "e1");

    assert_eq!(
        sync.save(&episode, 120.0, 1500.0).await.unwrap(),
        SaveOutcome::Written
    );
    assert_eq!(sync.duration_capability(), ColumnCapability::Absent);
    assert_eq!(
        sync.save(&episode, 130.0, 1500.0).await.unwrap(),
        SaveOutcome::Written
    );

    // A later engine over the same schema starts out knowing the column is gone
    let remounted = ProgressSync::new(
        Arc::new(store(&server, Some("user-token"))),
        &test_config().progress,
        DEFAULT_TABLE,
    );
    assert_eq!(remounted.duration_capability(), ColumnCapability::Absent);
    assert_eq!(
        remounted.save(&episode, 140.0, 1500.0).await.unwrap(),
        SaveOutcome::Written
    );

    rejected.assert_async().await;
    accepted.assert_async().await;
}
