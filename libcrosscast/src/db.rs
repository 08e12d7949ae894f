//! Database operations for Crosscast

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

use crate::error::Result;
use crate::types::{Post, PostRecord, Upload};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if expanded_path != ":memory:" {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(crate::error::DbError::IoError)?;
            }
        }

        // Use forward slashes for SQLite URL (works on both Windows and Unix)
        // and mode=rwc so the database file is created when absent.
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(crate::error::DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ========================================================================
    // Posts
    // ========================================================================

    /// Persist a post. Only the RSS/document target stores posts; the other
    /// targets keep nothing locally beyond their post record.
    pub async fn create_post(&self, post: &Post) -> Result<()> {
        let images = serde_json::to_string(&post.images)
            .map_err(|e| crate::error::PlatformError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, content, link, language, images, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.content)
        .bind(&post.link)
        .bind(&post.language)
        .bind(images)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Get a post by ID
    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, content, link, language, images, created_at
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(row_to_post))
    }

    /// Most recent posts, newest first. Feeds the RSS channel.
    pub async fn list_posts(&self, limit: usize) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, content, link, language, images, created_at
            FROM posts
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.into_iter().map(row_to_post).collect())
    }

    // ========================================================================
    // Post records
    // ========================================================================

    pub async fn create_post_record(&self, record: &PostRecord) -> Result<()> {
        let success = if record.success { 1 } else { 0 };

        sqlx::query(
            r#"
            INSERT INTO post_records (post_id, platform, remote_id, remote_url, posted_at, success, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.post_id)
        .bind(&record.platform)
        .bind(&record.remote_id)
        .bind(&record.remote_url)
        .bind(record.posted_at)
        .bind(success)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post_records(&self, post_id: &str) -> Result<Vec<PostRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, platform, remote_id, remote_url, posted_at, success, error_message
            FROM post_records
            WHERE post_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows
            .into_iter()
            .map(|r| PostRecord {
                id: r.get("id"),
                post_id: r.get("post_id"),
                platform: r.get("platform"),
                remote_id: r.get("remote_id"),
                remote_url: r.get("remote_url"),
                posted_at: r.get("posted_at"),
                success: r.get::<i64, _>("success") != 0,
                error_message: r.get("error_message"),
            })
            .collect())
    }

    // ========================================================================
    // Uploads
    // ========================================================================

    pub async fn create_upload(&self, upload: &Upload) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO uploads (id, content_hash, mime_type, width, height, alt_text, byte_size, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&upload.id)
        .bind(&upload.content_hash)
        .bind(upload.mime_type.as_str())
        .bind(upload.width as i64)
        .bind(upload.height as i64)
        .bind(&upload.alt_text)
        .bind(upload.byte_size as i64)
        .bind(upload.created_at)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_upload(&self, upload_id: &str) -> Result<Option<Upload>> {
        let row = sqlx::query(
            r#"
            SELECT id, content_hash, mime_type, width, height, alt_text, byte_size, created_at
            FROM uploads WHERE id = ?
            "#,
        )
        .bind(upload_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.and_then(|r| {
            let mime =
                crate::types::ImageMimeType::from_mime_str(&r.get::<String, _>("mime_type"))?;
            Some(Upload {
                id: r.get("id"),
                content_hash: r.get("content_hash"),
                mime_type: mime,
                width: r.get::<i64, _>("width") as u32,
                height: r.get::<i64, _>("height") as u32,
                alt_text: r.get("alt_text"),
                byte_size: r.get::<i64, _>("byte_size") as u64,
                created_at: r.get("created_at"),
            })
        }))
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// Upsert a JSON blob under (kind, search_key). OAuth token blobs use
    /// kind "oauth-token" with the platform name as key, so each platform
    /// keeps exactly one row.
    pub async fn put_document(&self, kind: &str, search_key: &str, content: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO documents (id, kind, search_key, content, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(kind, search_key)
            DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(kind)
        .bind(search_key)
        .bind(content)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_document(&self, kind: &str, search_key: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT content FROM documents WHERE kind = ? AND search_key = ?
            "#,
        )
        .bind(kind)
        .bind(search_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(|r| r.get("content")))
    }

    pub async fn delete_document(&self, kind: &str, search_key: &str) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM documents WHERE kind = ? AND search_key = ?
            "#,
        )
        .bind(kind)
        .bind(search_key)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }
}

fn row_to_post(r: sqlx::sqlite::SqliteRow) -> Post {
    let images: Vec<String> =
        serde_json::from_str(&r.get::<String, _>("images")).unwrap_or_default();
    Post {
        id: r.get("id"),
        content: r.get("content"),
        link: r.get("link"),
        language: r.get("language"),
        images,
        created_at: r.get("created_at"),
    }
}
