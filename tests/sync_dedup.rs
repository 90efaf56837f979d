use chrono::Utc;

use mailbot::storage::{jobs, Database};
use mailbot::sync::persist_fetched;
use mailbot::types::{now_ts, Account, FetchOutcome, Provider, RawMessage, User};

fn test_user() -> User {
    User {
        id: "user-1".into(),
        name: "Mette".into(),
        company_name: None,
        created_at: now_ts(),
    }
}

fn test_account(cursor: Option<&str>) -> Account {
    Account {
        id: "acc-1".into(),
        user_id: "user-1".into(),
        provider: Provider::Gmail,
        email_address: "mette@example.com".into(),
        encrypted_access_token: None,
        encrypted_refresh_token: None,
        token_expires_at: None,
        sync_cursor: cursor.map(str::to_string),
        is_active: true,
        created_at: now_ts(),
    }
}

fn raw_message(provider_id: &str) -> RawMessage {
    RawMessage {
        provider_id: provider_id.into(),
        thread_id: Some(format!("thread-{provider_id}")),
        from_address: "customer@example.org".into(),
        from_name: Some("Customer".into()),
        to_address: "mette@example.com".into(),
        subject: Some("Hello".into()),
        body_text: Some("Hi there".into()),
        body_html: None,
        received_at: Some(Utc::now()),
    }
}

async fn seeded_db(account: &Account) -> Database {
    let db = Database::open_in_memory().await.expect("open db");
    jobs::ensure_jobs_table(db.pool()).await.expect("jobs table");
    db.save_user(&test_user()).await.expect("save user");
    db.save_account(account).await.expect("save account");
    db
}

#[tokio::test]
async fn duplicate_provider_ids_persist_exactly_once() {
    let account = test_account(Some("H1"));
    let db = seeded_db(&account).await;

    // First sync persists m1.
    let first = FetchOutcome {
        messages: vec![raw_message("m1")],
        cursor: Some("H1".into()),
    };
    let inserted = persist_fetched(&db, &account, first).await.expect("persist");
    assert_eq!(inserted.len(), 1);

    // Second fetch returns m1 again plus m2; only m2 is new and the cursor
    // advances past H1.
    let second = FetchOutcome {
        messages: vec![raw_message("m1"), raw_message("m2")],
        cursor: Some("H2".into()),
    };
    let inserted = persist_fetched(&db, &account, second).await.expect("persist");
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0].provider_id, "m2");

    assert_eq!(
        db.count_messages_by_provider_id("acc-1", "m1")
            .await
            .expect("count"),
        1
    );

    let stored = db.get_account("acc-1").await.expect("get").expect("account");
    assert_eq!(stored.sync_cursor.as_deref(), Some("H2"));
}

#[tokio::test]
async fn replaying_the_same_fetch_is_a_noop() {
    let account = test_account(None);
    let db = seeded_db(&account).await;

    let outcome = FetchOutcome {
        messages: vec![raw_message("m1"), raw_message("m2"), raw_message("m3")],
        cursor: Some("H5".into()),
    };
    let inserted = persist_fetched(&db, &account, outcome.clone())
        .await
        .expect("persist");
    assert_eq!(inserted.len(), 3);

    let inserted = persist_fetched(&db, &account, outcome).await.expect("persist");
    assert!(inserted.is_empty());

    let messages = db.list_messages("acc-1", 50).await.expect("list");
    assert_eq!(messages.len(), 3);
}

#[tokio::test]
async fn duplicates_within_one_batch_collapse() {
    let account = test_account(None);
    let db = seeded_db(&account).await;

    let outcome = FetchOutcome {
        messages: vec![raw_message("m1"), raw_message("m1")],
        cursor: Some("H2".into()),
    };
    let inserted = persist_fetched(&db, &account, outcome).await.expect("persist");
    assert_eq!(inserted.len(), 1);
}

#[tokio::test]
async fn new_messages_default_to_unprocessed_and_unread() {
    let account = test_account(None);
    let db = seeded_db(&account).await;

    let outcome = FetchOutcome {
        messages: vec![raw_message("m1")],
        cursor: Some("H1".into()),
    };
    persist_fetched(&db, &account, outcome).await.expect("persist");

    let messages = db.list_messages("acc-1", 10).await.expect("list");
    assert_eq!(messages.len(), 1);
    let msg = &messages[0];
    assert!(!msg.is_read);
    assert!(!msg.is_replied);
    assert!(!msg.processed);
    assert!(msg.category.is_none());
}
