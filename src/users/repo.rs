use sqlx::{FromRow, MySqlPool};
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub password_hash: String, // Argon2 hash, never serialized
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub language: String,
    pub created_at: OffsetDateTime,
}

/// How an identifier string resolves to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier<'a> {
    Id(i64),
    Username(&'a str),
}

/// Non-empty all-digit strings are ids; everything else is a username.
pub fn parse_identifier(raw: &str) -> Identifier<'_> {
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(id) = raw.parse::<i64>() {
            return Identifier::Id(id);
        }
    }
    Identifier::Username(raw)
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub display_name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub language: &'a str,
}

/// Fields of a profile update; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    /// Set when the request sent a blank bio; wins over `bio`.
    pub clear_bio: bool,
    pub language: Option<String>,
    pub email: Option<String>,
}

/// Escapes `LIKE` wildcards so user input only matches literally.
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl User {
    pub async fn find_by_id(db: &MySqlPool, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, display_name, email, password_hash, bio, avatar, language, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_username(db: &MySqlPool, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, display_name, email, password_hash, bio, avatar, language, created_at
            FROM users
            WHERE username = ?
            LIMIT 1
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Resolves an id-or-username identifier. A miss is `Ok(None)`.
    pub async fn find_by_identifier(db: &MySqlPool, raw: &str) -> anyhow::Result<Option<User>> {
        match parse_identifier(raw) {
            Identifier::Id(id) => Self::find_by_id(db, id).await,
            Identifier::Username(name) => Self::find_by_username(db, name).await,
        }
    }

    /// Login accepts either a username or an email.
    pub async fn find_by_login(db: &MySqlPool, login: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, display_name, email, password_hash, bio, avatar, language, created_at
            FROM users
            WHERE username = ? OR email = ?
            LIMIT 1
            "#,
        )
        .bind(login)
        .bind(login.to_lowercase())
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn exists_with(db: &MySqlPool, username: &str, email: &str) -> anyhow::Result<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ? OR email = ?")
                .bind(username)
                .bind(email)
                .fetch_one(db)
                .await?;
        Ok(count > 0)
    }

    pub async fn create(db: &MySqlPool, new: NewUser<'_>) -> Result<User, sqlx::Error> {
        let id = sqlx::query(
            r#"
            INSERT INTO users (username, display_name, email, password_hash, language)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.username)
        .bind(new.display_name)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.language)
        .execute(db)
        .await?
        .last_insert_id();

        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, display_name, email, password_hash, bio, avatar, language, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id as i64)
        .fetch_one(db)
        .await
    }

    /// Applies the non-empty fields of `changes` in one statement.
    pub async fn update_profile(
        db: &MySqlPool,
        id: i64,
        changes: &ProfileChanges,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET display_name = COALESCE(?, display_name),
                bio = IF(?, NULL, COALESCE(?, bio)),
                language = COALESCE(?, language),
                email = COALESCE(?, email)
            WHERE id = ?
            "#,
        )
        .bind(changes.display_name.as_deref())
        .bind(changes.clear_bio)
        .bind(changes.bio.as_deref())
        .bind(changes.language.as_deref())
        .bind(changes.email.as_deref())
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn set_avatar(db: &MySqlPool, id: i64, avatar: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET avatar = ? WHERE id = ?")
            .bind(avatar)
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Removes the user; lists, list items and favorites go with it.
    pub async fn delete(db: &MySqlPool, id: i64) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn search(db: &MySqlPool, query: &str, limit: i64) -> anyhow::Result<Vec<User>> {
        let pattern = format!("%{}%", escape_like(query));
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, display_name, email, password_hash, bio, avatar, language, created_at
            FROM users
            WHERE username LIKE ? OR display_name LIKE ?
            ORDER BY username
            LIMIT ?
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(db)
        .await?;
        Ok(users)
    }
}
