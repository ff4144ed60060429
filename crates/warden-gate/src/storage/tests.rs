//! Storage layer tests for the Warden gate.

use super::db::GateDatabase;
use super::models::ApprovalToken;
use super::store::{ConsumeResult, TokenStore};
use warden_core::db::unix_timestamp;

async fn test_db() -> GateDatabase {
    GateDatabase::open_in_memory().await.unwrap()
}

fn record(token: &str, expires_at: i64) -> ApprovalToken {
    ApprovalToken {
        token: token.to_string(),
        instance_id: "i-1".to_string(),
        finding_id: "f-1".to_string(),
        finding_title: "Port probe".to_string(),
        created_at: unix_timestamp(),
        expires_at,
        used: false,
    }
}

#[tokio::test]
async fn insert_and_get_token() {
    let db = test_db().await;
    let rec = record("tok-a", unix_timestamp() + 3600);
    db.insert_token(&rec).await.unwrap();

    let found = db.get_token("tok-a").await.unwrap().unwrap();
    assert_eq!(found, rec);
    assert!(!found.used);
}

#[tokio::test]
async fn missing_token_is_none() {
    let db = test_db().await;
    assert!(db.get_token("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_token_is_rejected() {
    let db = test_db().await;
    let rec = record("tok-dup", unix_timestamp() + 60);
    db.insert_token(&rec).await.unwrap();
    assert!(db.insert_token(&rec).await.is_err());
}

#[tokio::test]
async fn consume_succeeds_exactly_once() {
    let db = test_db().await;
    db.insert_token(&record("tok-once", unix_timestamp() + 60))
        .await
        .unwrap();

    assert!(db.consume_token("tok-once").await.unwrap());
    assert!(!db.consume_token("tok-once").await.unwrap());
    assert!(db.get_token("tok-once").await.unwrap().unwrap().used);
}

#[tokio::test]
async fn consume_of_unknown_token_fails_condition() {
    let db = test_db().await;
    assert!(!db.consume_token("ghost").await.unwrap());
}

#[tokio::test]
async fn token_store_trait_delegates() {
    let db = test_db().await;
    let store: &dyn TokenStore = &db;
    store.put(&record("tok-trait", unix_timestamp() + 60)).await.unwrap();

    assert!(store.get("tok-trait").await.unwrap().is_some());
    assert_eq!(
        store.conditional_set_used("tok-trait").await.unwrap(),
        ConsumeResult::Consumed
    );
    assert_eq!(
        store.conditional_set_used("tok-trait").await.unwrap(),
        ConsumeResult::ConditionFailed
    );
}

#[tokio::test]
async fn concurrent_consumers_have_one_winner() {
    let db = test_db().await;
    db.insert_token(&record("tok-race", unix_timestamp() + 60))
        .await
        .unwrap();

    let (a, b) = tokio::join!(db.consume_token("tok-race"), db.consume_token("tok-race"));
    let wins = [a.unwrap(), b.unwrap()].iter().filter(|w| **w).count();
    assert_eq!(wins, 1);
}

#[tokio::test]
async fn purge_removes_only_old_records() {
    let db = test_db().await;
    let now = unix_timestamp();
    db.insert_token(&record("old", now - 10_000)).await.unwrap();
    db.insert_token(&record("fresh", now + 3600)).await.unwrap();

    let removed = db.purge_expired(now - 100).await.unwrap();
    assert_eq!(removed, 1);
    assert!(db.get_token("old").await.unwrap().is_none());
    assert!(db.get_token("fresh").await.unwrap().is_some());
}

#[tokio::test]
async fn file_database_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.db");
    {
        let db = GateDatabase::open(&path).await.unwrap();
        db.insert_token(&record("persisted", unix_timestamp() + 60))
            .await
            .unwrap();
    }
    let db = GateDatabase::open(&path).await.unwrap();
    assert!(db.get_token("persisted").await.unwrap().is_some());
}

#[test]
fn record_helpers() {
    let rec = record("0123456789abcdef", 100);
    assert!(!rec.is_expired_at(99));
    assert!(rec.is_expired_at(100));
    assert!(rec.is_bound_to("i-1", "f-1"));
    assert!(!rec.is_bound_to("i-2", "f-1"));
    assert_eq!(rec.log_prefix(), "01234567");
}
