use sqlx::{FromRow, MySqlPool};
use time::OffsetDateTime;

use crate::media::MediaType;

#[derive(Debug, Clone, FromRow)]
pub struct List {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct ListItem {
    pub id: i64,
    pub list_id: i64,
    pub media_id: i64,
    pub media_type: String,
    pub added_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct Favorite {
    pub media_id: i64,
    pub media_type: String,
    pub created_at: OffsetDateTime,
}

pub async fn list_by_user(db: &MySqlPool, user_id: i64) -> anyhow::Result<Vec<List>> {
    let rows = sqlx::query_as::<_, List>(
        r#"
        SELECT id, user_id, name, description, image, created_at
        FROM lists
        WHERE user_id = ?
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn find(db: &MySqlPool, list_id: i64) -> anyhow::Result<Option<List>> {
    let row = sqlx::query_as::<_, List>(
        r#"
        SELECT id, user_id, name, description, image, created_at
        FROM lists
        WHERE id = ?
        "#,
    )
    .bind(list_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// The list, but only when `user_id` owns it.
pub async fn find_owned(db: &MySqlPool, list_id: i64, user_id: i64) -> anyhow::Result<Option<List>> {
    Ok(find(db, list_id).await?.filter(|l| l.user_id == user_id))
}

pub async fn items(db: &MySqlPool, list_id: i64) -> anyhow::Result<Vec<ListItem>> {
    let rows = sqlx::query_as::<_, ListItem>(
        r#"
        SELECT id, list_id, media_id, media_type, added_at
        FROM list_items
        WHERE list_id = ?
        ORDER BY added_at ASC, id ASC
        "#,
    )
    .bind(list_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn create(
    db: &MySqlPool,
    user_id: i64,
    name: &str,
    description: Option<&str>,
    image: Option<&str>,
) -> anyhow::Result<List> {
    let id = sqlx::query(
        r#"
        INSERT INTO lists (user_id, name, description, image)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(description)
    .bind(image)
    .execute(db)
    .await?
    .last_insert_id();

    find(db, id as i64)
        .await?
        .ok_or_else(|| anyhow::anyhow!("list {} vanished after insert", id))
}

/// Deletes an owned list; its items go with it. Returns false when nothing matched.
pub async fn delete_owned(db: &MySqlPool, list_id: i64, user_id: i64) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM lists WHERE id = ? AND user_id = ?")
        .bind(list_id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn add_item(
    db: &MySqlPool,
    list_id: i64,
    media_id: i64,
    media_type: MediaType,
) -> Result<ListItem, sqlx::Error> {
    let id = sqlx::query(
        r#"
        INSERT INTO list_items (list_id, media_id, media_type)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(list_id)
    .bind(media_id)
    .bind(media_type.as_str())
    .execute(db)
    .await?
    .last_insert_id();

    sqlx::query_as::<_, ListItem>(
        "SELECT id, list_id, media_id, media_type, added_at FROM list_items WHERE id = ?",
    )
    .bind(id as i64)
    .fetch_one(db)
    .await
}

pub async fn remove_item(db: &MySqlPool, list_id: i64, item_id: i64) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM list_items WHERE id = ? AND list_id = ?")
        .bind(item_id)
        .bind(list_id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn image_urls_for_user(db: &MySqlPool, user_id: i64) -> anyhow::Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT image FROM lists WHERE user_id = ? AND image IS NOT NULL")
            .bind(user_id)
            .fetch_all(db)
            .await?;
    Ok(rows.into_iter().map(|(url,)| url).collect())
}

// ---- favorites ----

pub async fn favorites(db: &MySqlPool, user_id: i64) -> anyhow::Result<Vec<Favorite>> {
    let rows = sqlx::query_as::<_, Favorite>(
        r#"
        SELECT media_id, media_type, created_at
        FROM favorites
        WHERE user_id = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Idempotent: favoriting twice keeps the first timestamp.
pub async fn add_favorite(
    db: &MySqlPool,
    user_id: i64,
    media_id: i64,
    media_type: MediaType,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT IGNORE INTO favorites (user_id, media_id, media_type)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(media_id)
    .bind(media_type.as_str())
    .execute(db)
    .await?;
    Ok(())
}

pub async fn remove_favorite(
    db: &MySqlPool,
    user_id: i64,
    media_id: i64,
    media_type: MediaType,
) -> anyhow::Result<bool> {
    let res = sqlx::query(
        "DELETE FROM favorites WHERE user_id = ? AND media_id = ? AND media_type = ?",
    )
    .bind(user_id)
    .bind(media_id)
    .bind(media_type.as_str())
    .execute(db)
    .await?;
    Ok(res.rows_affected() > 0)
}
