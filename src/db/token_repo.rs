//! Repository functions for rows in the `tokens` table.
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use super::Token;

/// Full row, including the lookup hash and sealed upstream secret.
#[derive(Debug, Clone)]
pub struct TokenRow {
    pub id: i64,
    pub key_hash: String,
    pub name: String,
    pub is_admin: bool,
    pub is_master: bool,
    pub secret_ciphertext: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<TokenRow> for Token {
    fn from(row: TokenRow) -> Self {
        Token {
            id: row.id,
            name: row.name,
            is_admin: row.is_admin,
            is_master: row.is_master,
            created_at: row.created_at,
        }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        id,
        key_hash,
        name,
        is_admin,
        is_master,
        secret_ciphertext,
        created_at
    FROM tokens
"#;

fn from_row(row: &SqliteRow) -> sqlx::Result<TokenRow> {
    Ok(TokenRow {
        id: row.try_get("id")?,
        key_hash: row.try_get("key_hash")?,
        name: row.try_get("name")?,
        is_admin: row.try_get::<i64, _>("is_admin")? != 0,
        is_master: row.try_get::<i64, _>("is_master")? != 0,
        secret_ciphertext: row.try_get("secret_ciphertext")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

/// Indexed equality lookup on the keyed hash.
pub async fn find_by_hash<'e, E>(db: E, key_hash: &str) -> sqlx::Result<Option<TokenRow>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE key_hash = ?"))
        .bind(key_hash)
        .fetch_optional(db)
        .await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn find_by_id<'e, E>(db: E, id: i64) -> sqlx::Result<Option<TokenRow>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn find_master<'e, E>(db: E) -> sqlx::Result<Option<TokenRow>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE is_master = 1"))
        .fetch_optional(db)
        .await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn list<'e, E>(db: E) -> sqlx::Result<Vec<TokenRow>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY id"))
        .fetch_all(db)
        .await?;
    rows.iter().map(from_row).collect()
}

/// Insert a regular or admin token and return its id.
pub async fn insert<'e, E>(db: E, key_hash: &str, name: &str, is_admin: bool) -> sqlx::Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let res = sqlx::query(
        r#"
        INSERT INTO tokens (key_hash, name, is_admin, is_master, secret_ciphertext, created_at)
        VALUES (?, ?, ?, 0, NULL, ?)
        "#,
    )
    .bind(key_hash)
    .bind(name)
    .bind(if is_admin { 1 } else { 0 })
    .bind(Utc::now())
    .execute(db)
    .await?;

    Ok(res.last_insert_rowid())
}

/// Insert the master row unless any uniqueness constraint already holds one.
///
/// Returns whether a row was written.
pub async fn insert_master_if_absent<'e, E>(
    db: E,
    key_hash: &str,
    name: &str,
    secret_ciphertext: &str,
) -> sqlx::Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let res = sqlx::query(
        r#"
        INSERT INTO tokens (key_hash, name, is_admin, is_master, secret_ciphertext, created_at)
        VALUES (?, ?, 0, 1, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(key_hash)
    .bind(name)
    .bind(secret_ciphertext)
    .bind(Utc::now())
    .execute(db)
    .await?;

    Ok(res.rows_affected() == 1)
}

pub async fn delete<'e, E>(db: E, id: i64) -> sqlx::Result<u64>
where
    E: SqliteExecutor<'e>,
{
    let res = sqlx::query("DELETE FROM tokens WHERE id = ? AND is_master = 0")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected())
}

/// Whether any non-master admin token exists.
pub async fn admin_exists<'e, E>(db: E) -> sqlx::Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let cnt: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM tokens WHERE is_admin = 1 AND is_master = 0")
            .fetch_one(db)
            .await?;
    Ok(cnt.0 > 0)
}
