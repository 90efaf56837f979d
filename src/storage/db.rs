use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dirs::home_dir;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::warn;

use crate::types::{
    Account, Category, Classification, FeedbackRecord, KnowledgeEntry, MessageRecord, Provider,
    Suggestion, SuggestionStatus, Template, Urgency, User,
};

const DB_FILE_NAME: &str = "mailbot.db";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl Database {
    pub async fn new_default() -> Result<Self> {
        Self::new_named(DB_FILE_NAME).await
    }

    pub async fn new_named(file_name: &str) -> Result<Self> {
        let base = default_data_dir()?;
        let db_path = base.join(file_name);
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }

        let pool = SqlitePool::connect(&url)
            .await
            .with_context(|| format!("connecting to sqlite at {}", db_path.display()))?;

        let db = Database {
            pool,
            path: Some(db_path),
        };
        db.migrate().await?;
        Ok(db)
    }

    /// In-memory database for tests. A single connection keeps every query
    /// on the same `:memory:` instance.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("connecting to in-memory sqlite")?;

        let db = Database { pool, path: None };
        db.migrate().await?;
        Ok(db)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query("PRAGMA foreign_keys = ON;")
            .execute(&self.pool)
            .await
            .context("enabling foreign keys")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                company_name TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                email_address TEXT NOT NULL,
                encrypted_access_token TEXT,
                encrypted_refresh_token TEXT,
                token_expires_at TEXT,
                sync_cursor TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id);

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                provider_id TEXT NOT NULL,
                thread_id TEXT,
                from_address TEXT NOT NULL,
                from_name TEXT,
                to_address TEXT NOT NULL,
                subject TEXT,
                body_text TEXT,
                body_html TEXT,
                received_at TEXT,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_replied INTEGER NOT NULL DEFAULT 0,
                category TEXT,
                urgency TEXT,
                topic TEXT,
                confidence REAL,
                processed INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                UNIQUE(account_id, provider_id),
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_messages_account ON messages(account_id);
            CREATE INDEX IF NOT EXISTS idx_messages_received ON messages(account_id, received_at DESC);

            CREATE TABLE IF NOT EXISTS suggestions (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL,
                suggested_text TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                edited_text TEXT,
                sent_at TEXT,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_suggestions_message ON suggestions(message_id);

            CREATE TABLE IF NOT EXISTS feedback_log (
                id TEXT PRIMARY KEY,
                suggestion_id TEXT NOT NULL,
                original_text TEXT NOT NULL,
                edited_text TEXT NOT NULL,
                edit_distance INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (suggestion_id) REFERENCES suggestions(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS templates (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                body TEXT NOT NULL,
                usage_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_templates_user ON templates(user_id);

            CREATE TABLE IF NOT EXISTS knowledge_entries (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_knowledge_user ON knowledge_entries(user_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("running migrations")?;

        Ok(())
    }

    // ---- users ----

    pub async fn save_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, company_name, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                company_name = excluded.company_name;
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.company_name)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .context("upserting user")?;
        Ok(())
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, company_name, created_at FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("loading user")?;

        Ok(row.map(|row| User {
            id: row.get(0),
            name: row.get(1),
            company_name: row.get(2),
            created_at: row.get(3),
        }))
    }

    // ---- accounts ----

    pub async fn save_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, user_id, provider, email_address,
                encrypted_access_token, encrypted_refresh_token, token_expires_at,
                sync_cursor, is_active, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                provider = excluded.provider,
                email_address = excluded.email_address,
                encrypted_access_token = excluded.encrypted_access_token,
                encrypted_refresh_token = excluded.encrypted_refresh_token,
                token_expires_at = excluded.token_expires_at,
                sync_cursor = excluded.sync_cursor,
                is_active = excluded.is_active;
            "#,
        )
        .bind(&account.id)
        .bind(&account.user_id)
        .bind(account.provider.as_str())
        .bind(&account.email_address)
        .bind(&account.encrypted_access_token)
        .bind(&account.encrypted_refresh_token)
        .bind(account.token_expires_at.map(|dt| dt.to_rfc3339()))
        .bind(&account.sync_cursor)
        .bind(if account.is_active { 1 } else { 0 })
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .context("upserting account")?;
        Ok(())
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, provider, email_address, encrypted_access_token,
                   encrypted_refresh_token, token_expires_at, sync_cursor, is_active, created_at
            FROM accounts
            WHERE id = ?1;
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading account")?;

        row.map(account_from_row).transpose()
    }

    pub async fn list_active_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, provider, email_address, encrypted_access_token,
                   encrypted_refresh_token, token_expires_at, sync_cursor, is_active, created_at
            FROM accounts
            WHERE is_active = 1
            ORDER BY created_at ASC;
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("loading active accounts")?;

        let mut out = Vec::new();
        for row in rows {
            match account_from_row(row) {
                Ok(account) => out.push(account),
                // A row with an unknown provider tag is a configuration
                // defect; skip it rather than poison the whole sync run.
                Err(e) => warn!(error = %e, "Skipping unloadable account row"),
            }
        }
        Ok(out)
    }

    pub async fn update_account_tokens(
        &self,
        account_id: &str,
        encrypted_access_token: &str,
        encrypted_refresh_token: &str,
        token_expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET encrypted_access_token = ?1,
                encrypted_refresh_token = ?2,
                token_expires_at = ?3
            WHERE id = ?4;
            "#,
        )
        .bind(encrypted_access_token)
        .bind(encrypted_refresh_token)
        .bind(token_expires_at.to_rfc3339())
        .bind(account_id)
        .execute(&self.pool)
        .await
        .context("updating account tokens")?;
        Ok(())
    }

    pub async fn deactivate_account(&self, account_id: &str) -> Result<()> {
        sqlx::query("UPDATE accounts SET is_active = 0 WHERE id = ?1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .context("deactivating account")?;
        Ok(())
    }

    // ---- messages ----

    /// Batched existence check over `(account_id, provider_id)` — the dedup
    /// boundary for sync. One query regardless of batch size.
    pub async fn load_existing_provider_ids(
        &self,
        account_id: &str,
        provider_ids: &[String],
    ) -> Result<HashSet<String>> {
        if provider_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT provider_id FROM messages WHERE account_id = ");
        qb.push_bind(account_id);
        qb.push(" AND provider_id IN (");
        {
            let mut separated = qb.separated(", ");
            for id in provider_ids {
                separated.push_bind(id);
            }
        }
        qb.push(")");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("loading existing provider ids")?;

        let mut out = HashSet::new();
        for row in rows {
            out.insert(row.get::<String, _>(0));
        }
        Ok(out)
    }

    /// Insert new messages and advance the account's sync cursor in one
    /// transaction, so a partially failed sync never moves the cursor past
    /// unpersisted messages.
    pub async fn insert_messages_with_cursor(
        &self,
        account_id: &str,
        messages: &[MessageRecord],
        cursor: Option<&str>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("beginning sync tx")?;

        for message in messages {
            sqlx::query(
                r#"
                INSERT INTO messages (
                    id, account_id, provider_id, thread_id, from_address, from_name,
                    to_address, subject, body_text, body_html, received_at,
                    is_read, is_replied, category, urgency, topic, confidence,
                    processed, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19);
                "#,
            )
            .bind(&message.id)
            .bind(&message.account_id)
            .bind(&message.provider_id)
            .bind(&message.thread_id)
            .bind(&message.from_address)
            .bind(&message.from_name)
            .bind(&message.to_address)
            .bind(&message.subject)
            .bind(&message.body_text)
            .bind(&message.body_html)
            .bind(message.received_at.map(|dt| dt.to_rfc3339()))
            .bind(if message.is_read { 1 } else { 0 })
            .bind(if message.is_replied { 1 } else { 0 })
            .bind(message.category.map(|c| c.as_str()))
            .bind(message.urgency.map(|u| u.as_str()))
            .bind(&message.topic)
            .bind(message.confidence)
            .bind(if message.processed { 1 } else { 0 })
            .bind(message.created_at)
            .execute(&mut *tx)
            .await
            .context("inserting message")?;
        }

        if let Some(cursor) = cursor {
            sqlx::query("UPDATE accounts SET sync_cursor = ?1 WHERE id = ?2")
                .bind(cursor)
                .bind(account_id)
                .execute(&mut *tx)
                .await
                .context("advancing sync cursor")?;
        }

        tx.commit().await.context("committing sync tx")?;
        Ok(())
    }

    pub async fn get_message(&self, message_id: &str) -> Result<Option<MessageRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, provider_id, thread_id, from_address, from_name,
                   to_address, subject, body_text, body_html, received_at,
                   is_read, is_replied, category, urgency, topic, confidence,
                   processed, created_at
            FROM messages
            WHERE id = ?1;
            "#,
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading message")?;

        Ok(row.map(message_from_row))
    }

    pub async fn count_messages_by_provider_id(
        &self,
        account_id: &str,
        provider_id: &str,
    ) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM messages WHERE account_id = ?1 AND provider_id = ?2",
        )
        .bind(account_id)
        .bind(provider_id)
        .fetch_one(&self.pool)
        .await
        .context("counting messages by provider id")?;
        Ok(row.get::<i64, _>(0))
    }

    pub async fn list_messages(&self, account_id: &str, limit: usize) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, provider_id, thread_id, from_address, from_name,
                   to_address, subject, body_text, body_html, received_at,
                   is_read, is_replied, category, urgency, topic, confidence,
                   processed, created_at
            FROM messages
            WHERE account_id = ?1
            ORDER BY received_at DESC NULLS LAST
            LIMIT ?2;
            "#,
        )
        .bind(account_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("listing messages")?;

        Ok(rows.into_iter().map(message_from_row).collect())
    }

    pub async fn update_message_classification(
        &self,
        message_id: &str,
        classification: &Classification,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE messages
            SET category = ?1, urgency = ?2, topic = ?3, confidence = ?4
            WHERE id = ?5;
            "#,
        )
        .bind(classification.category.as_str())
        .bind(classification.urgency.as_str())
        .bind(&classification.topic)
        .bind(classification.confidence)
        .bind(message_id)
        .execute(&self.pool)
        .await
        .context("updating message classification")?;
        Ok(())
    }

    pub async fn mark_message_processed(&self, message_id: &str) -> Result<()> {
        sqlx::query("UPDATE messages SET processed = 1 WHERE id = ?1")
            .bind(message_id)
            .execute(&self.pool)
            .await
            .context("marking message processed")?;
        Ok(())
    }

    pub async fn mark_message_replied(&self, message_id: &str) -> Result<()> {
        sqlx::query("UPDATE messages SET is_replied = 1, is_read = 1 WHERE id = ?1")
            .bind(message_id)
            .execute(&self.pool)
            .await
            .context("marking message replied")?;
        Ok(())
    }

    // ---- suggestions ----

    pub async fn insert_suggestion(&self, suggestion: &Suggestion) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO suggestions (id, message_id, suggested_text, status, edited_text, sent_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);
            "#,
        )
        .bind(&suggestion.id)
        .bind(&suggestion.message_id)
        .bind(&suggestion.suggested_text)
        .bind(suggestion.status.as_str())
        .bind(&suggestion.edited_text)
        .bind(suggestion.sent_at.map(|dt| dt.to_rfc3339()))
        .bind(suggestion.created_at)
        .execute(&self.pool)
        .await
        .context("inserting suggestion")?;
        Ok(())
    }

    pub async fn get_suggestion(&self, suggestion_id: &str) -> Result<Option<Suggestion>> {
        let row = sqlx::query(
            r#"
            SELECT id, message_id, suggested_text, status, edited_text, sent_at, created_at
            FROM suggestions
            WHERE id = ?1;
            "#,
        )
        .bind(suggestion_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading suggestion")?;

        row.map(suggestion_from_row).transpose()
    }

    pub async fn update_suggestion_review(
        &self,
        suggestion_id: &str,
        status: SuggestionStatus,
        edited_text: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE suggestions SET status = ?1, edited_text = ?2 WHERE id = ?3")
            .bind(status.as_str())
            .bind(edited_text)
            .bind(suggestion_id)
            .execute(&self.pool)
            .await
            .context("updating suggestion review state")?;
        Ok(())
    }

    pub async fn mark_suggestion_sent(
        &self,
        suggestion_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE suggestions SET sent_at = ?1 WHERE id = ?2")
            .bind(sent_at.to_rfc3339())
            .bind(suggestion_id)
            .execute(&self.pool)
            .await
            .context("marking suggestion sent")?;
        Ok(())
    }

    // ---- feedback ----

    pub async fn insert_feedback(&self, record: &FeedbackRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feedback_log (id, suggestion_id, original_text, edited_text, edit_distance, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6);
            "#,
        )
        .bind(&record.id)
        .bind(&record.suggestion_id)
        .bind(&record.original_text)
        .bind(&record.edited_text)
        .bind(record.edit_distance)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("inserting feedback record")?;
        Ok(())
    }

    pub async fn count_feedback_for_suggestion(&self, suggestion_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM feedback_log WHERE suggestion_id = ?1")
            .bind(suggestion_id)
            .fetch_one(&self.pool)
            .await
            .context("counting feedback records")?;
        Ok(row.get::<i64, _>(0))
    }

    // ---- templates / knowledge ----

    pub async fn save_template(&self, template: &Template) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO templates (id, user_id, name, category, body, usage_count, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                body = excluded.body,
                usage_count = excluded.usage_count;
            "#,
        )
        .bind(&template.id)
        .bind(&template.user_id)
        .bind(&template.name)
        .bind(template.category.as_str())
        .bind(&template.body)
        .bind(template.usage_count)
        .bind(template.created_at)
        .execute(&self.pool)
        .await
        .context("upserting template")?;
        Ok(())
    }

    /// Templates for the reply prompt: scoped to the owner, filtered to the
    /// classified category when one is known, most-used first.
    pub async fn list_templates(
        &self,
        user_id: &str,
        category: Option<Category>,
        limit: usize,
    ) -> Result<Vec<Template>> {
        let rows = match category {
            Some(category) => {
                sqlx::query(
                    r#"
                    SELECT id, user_id, name, category, body, usage_count, created_at
                    FROM templates
                    WHERE user_id = ?1 AND category = ?2
                    ORDER BY usage_count DESC
                    LIMIT ?3;
                    "#,
                )
                .bind(user_id)
                .bind(category.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, user_id, name, category, body, usage_count, created_at
                    FROM templates
                    WHERE user_id = ?1
                    ORDER BY usage_count DESC
                    LIMIT ?2;
                    "#,
                )
                .bind(user_id)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("listing templates")?;

        Ok(rows
            .into_iter()
            .map(|row| Template {
                id: row.get(0),
                user_id: row.get(1),
                name: row.get(2),
                category: Category::parse_lenient(&row.get::<String, _>(3)),
                body: row.get(4),
                usage_count: row.get(5),
                created_at: row.get(6),
            })
            .collect())
    }

    pub async fn save_knowledge_entry(&self, entry: &KnowledgeEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO knowledge_entries (id, user_id, title, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content;
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.title)
        .bind(&entry.content)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .context("upserting knowledge entry")?;
        Ok(())
    }
}

fn account_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Account> {
    let provider_raw: String = row.get(2);
    let provider: Provider = provider_raw
        .parse()
        .map_err(|e: crate::errors::AppError| anyhow::anyhow!("{e}"))?;

    Ok(Account {
        id: row.get(0),
        user_id: row.get(1),
        provider,
        email_address: row.get(3),
        encrypted_access_token: row.get(4),
        encrypted_refresh_token: row.get(5),
        token_expires_at: parse_dt(row.get::<Option<String>, _>(6)),
        sync_cursor: row.get(7),
        is_active: row.get::<i64, _>(8) == 1,
        created_at: row.get(9),
    })
}

fn message_from_row(row: sqlx::sqlite::SqliteRow) -> MessageRecord {
    MessageRecord {
        id: row.get(0),
        account_id: row.get(1),
        provider_id: row.get(2),
        thread_id: row.get(3),
        from_address: row.get(4),
        from_name: row.get(5),
        to_address: row.get(6),
        subject: row.get(7),
        body_text: row.get(8),
        body_html: row.get(9),
        received_at: parse_dt(row.get::<Option<String>, _>(10)),
        is_read: row.get::<i64, _>(11) == 1,
        is_replied: row.get::<i64, _>(12) == 1,
        category: row
            .get::<Option<String>, _>(13)
            .map(|s| Category::parse_lenient(&s)),
        urgency: row
            .get::<Option<String>, _>(14)
            .map(|s| Urgency::parse_lenient(&s)),
        topic: row.get(15),
        confidence: row.get(16),
        processed: row.get::<i64, _>(17) == 1,
        created_at: row.get(18),
    }
}

fn suggestion_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Suggestion> {
    let status_raw: String = row.get(3);
    let status: SuggestionStatus = status_raw
        .parse()
        .map_err(|e: crate::errors::AppError| anyhow::anyhow!("{e}"))?;

    Ok(Suggestion {
        id: row.get(0),
        message_id: row.get(1),
        suggested_text: row.get(2),
        status,
        edited_text: row.get(4),
        sent_at: parse_dt(row.get::<Option<String>, _>(5)),
        created_at: row.get(6),
    })
}

fn parse_dt(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

pub(crate) fn default_data_dir() -> Result<PathBuf> {
    if let Ok(custom) = env::var("MAILBOT_DATA_DIR") {
        let path = PathBuf::from(custom);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("creating MAILBOT_DATA_DIR at {}", path.display()))?;
        return Ok(path);
    }

    if let Some(home) = home_dir() {
        let path = home.join("mailbot");
        if std::fs::create_dir_all(&path).is_ok() {
            return Ok(path);
        } else {
            warn!(
                "Unable to create {}/mailbot; falling back to workspace-local storage",
                home.display()
            );
        }
    }

    let cwd = env::current_dir().context("determining current directory")?;
    let path = cwd.join("mailbot-data");
    std::fs::create_dir_all(&path)
        .with_context(|| format!("creating fallback data directory {}", path.display()))?;
    Ok(path)
}
