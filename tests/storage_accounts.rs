use mailbot::storage::Database;
use mailbot::types::{now_ts, Account, Category, Provider, Template, User};

async fn seeded_db() -> Database {
    let db = Database::open_in_memory().await.expect("open db");
    db.save_user(&User {
        id: "user-1".into(),
        name: "Mette".into(),
        company_name: None,
        created_at: now_ts(),
    })
    .await
    .expect("save user");
    db
}

fn account(id: &str, provider: Provider) -> Account {
    Account {
        id: id.into(),
        user_id: "user-1".into(),
        provider,
        email_address: format!("{id}@example.com"),
        encrypted_access_token: None,
        encrypted_refresh_token: None,
        token_expires_at: None,
        sync_cursor: None,
        is_active: true,
        created_at: now_ts(),
    }
}

fn template(id: &str, category: Category, usage_count: i64) -> Template {
    Template {
        id: id.into(),
        user_id: "user-1".into(),
        name: format!("template {id}"),
        category,
        body: "Thanks for reaching out.".into(),
        usage_count,
        created_at: now_ts(),
    }
}

#[tokio::test]
async fn disconnected_accounts_are_deactivated_not_deleted() {
    let db = seeded_db().await;
    db.save_account(&account("acc-1", Provider::Gmail))
        .await
        .expect("save");
    db.save_account(&account("acc-2", Provider::Outlook))
        .await
        .expect("save");

    db.deactivate_account("acc-1").await.expect("deactivate");

    let active = db.list_active_accounts().await.expect("list");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "acc-2");

    // The row itself survives for a later re-authorization.
    let stored = db.get_account("acc-1").await.expect("get").expect("row");
    assert!(!stored.is_active);
}

#[tokio::test]
async fn reauthorization_upserts_the_same_account_row() {
    let db = seeded_db().await;
    let mut acc = account("acc-1", Provider::Gmail);
    db.save_account(&acc).await.expect("save");

    acc.encrypted_access_token = Some("aa:bb".into());
    acc.is_active = true;
    db.save_account(&acc).await.expect("re-save");

    let active = db.list_active_accounts().await.expect("list");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].encrypted_access_token.as_deref(), Some("aa:bb"));
}

#[tokio::test]
async fn templates_prefer_the_classified_category_by_usage() {
    let db = seeded_db().await;
    db.save_template(&template("t1", Category::Complaint, 2))
        .await
        .expect("save");
    db.save_template(&template("t2", Category::Complaint, 9))
        .await
        .expect("save");
    db.save_template(&template("t3", Category::Order, 50))
        .await
        .expect("save");
    db.save_template(&template("t4", Category::Complaint, 5))
        .await
        .expect("save");
    db.save_template(&template("t5", Category::Complaint, 1))
        .await
        .expect("save");

    let picked = db
        .list_templates("user-1", Some(Category::Complaint), 3)
        .await
        .expect("list");

    let ids: Vec<&str> = picked.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t2", "t4", "t1"]);

    // Without a classified category, the most-used templates win overall.
    let unfiltered = db.list_templates("user-1", None, 2).await.expect("list");
    let ids: Vec<&str> = unfiltered.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t3", "t2"]);
}
