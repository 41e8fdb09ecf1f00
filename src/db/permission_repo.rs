//! Repository functions for rows in the `permissions` table.
//!
//! `record_types` and `allowed_actions` are stored as JSON arrays of strings.
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use crate::permissions::{NewPermission, Permission};

fn decode_list(row: &SqliteRow, column: &str) -> sqlx::Result<Vec<String>> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn encode_list(values: &[String]) -> sqlx::Result<String> {
    serde_json::to_string(values).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn from_row(row: &SqliteRow) -> sqlx::Result<Permission> {
    Ok(Permission {
        id: row.try_get("id")?,
        token_id: row.try_get("token_id")?,
        zone_id: row.try_get("zone_id")?,
        record_types: decode_list(row, "record_types")?,
        allowed_actions: decode_list(row, "allowed_actions")?,
    })
}

pub async fn insert<'e, E>(db: E, token_id: i64, perm: &NewPermission) -> sqlx::Result<Permission>
where
    E: SqliteExecutor<'e>,
{
    let record_types = encode_list(&perm.record_types)?;
    let allowed_actions = encode_list(&perm.allowed_actions)?;

    let res = sqlx::query(
        r#"
        INSERT INTO permissions (token_id, zone_id, record_types, allowed_actions, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(token_id)
    .bind(perm.zone_id)
    .bind(&record_types)
    .bind(&allowed_actions)
    .bind(Utc::now())
    .execute(db)
    .await?;

    Ok(Permission {
        id: res.last_insert_rowid(),
        token_id,
        zone_id: perm.zone_id,
        record_types: perm.record_types.clone(),
        allowed_actions: perm.allowed_actions.clone(),
    })
}

pub async fn list_for_token<'e, E>(db: E, token_id: i64) -> sqlx::Result<Vec<Permission>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        SELECT id, token_id, zone_id, record_types, allowed_actions
        FROM permissions
        WHERE token_id = ?
        ORDER BY id
        "#,
    )
    .bind(token_id)
    .fetch_all(db)
    .await?;

    rows.iter().map(from_row).collect()
}

pub async fn delete<'e, E>(db: E, id: i64) -> sqlx::Result<u64>
where
    E: SqliteExecutor<'e>,
{
    let res = sqlx::query("DELETE FROM permissions WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected())
}
