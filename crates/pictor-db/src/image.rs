use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pictor_core::models::{Image, ImageFormat};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row};
use uuid::Uuid;

use crate::error::{RepositoryError, RepositoryResult};

/// Durable store of image records.
#[async_trait]
pub trait ImageRepository: Send + Sync {
    /// Insert or replace the record with `image.id`.
    ///
    /// A replaced record keeps its original `created_at`. Returns the record
    /// as stored.
    async fn save(&self, image: &Image) -> RepositoryResult<Image>;

    /// Replace the stored fields of an existing record; never inserts.
    ///
    /// `owner_id` and `created_at` are left as stored. Returns `None` when no
    /// record has `image.id`.
    async fn update(&self, image: &Image) -> RepositoryResult<Option<Image>>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Image>>;

    /// All images of `owner_id`, newest first.
    async fn find_by_owner(&self, owner_id: Uuid) -> RepositoryResult<Vec<Image>>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> RepositoryResult<bool>;
}

/// Row shape of the `images` table.
#[derive(Debug, Clone)]
pub(crate) struct ImageRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub original_file_name: String,
    pub stored_file_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
    pub format: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ImageRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            original_file_name: row.try_get("original_file_name")?,
            stored_file_name: row.try_get("stored_file_name")?,
            mime_type: row.try_get("mime_type")?,
            size_bytes: row.try_get("size_bytes")?,
            width: row.try_get("width")?,
            height: row.try_get("height")?,
            format: row.try_get("format")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<ImageRow> for Image {
    type Error = RepositoryError;

    fn try_from(row: ImageRow) -> Result<Self, Self::Error> {
        let corrupt =
            |what: &str| RepositoryError::CorruptRow(format!("image {}: {}", row.id, what));

        let format: ImageFormat = row
            .format
            .parse()
            .map_err(|_| corrupt(&format!("unknown format '{}'", row.format)))?;
        let size = u64::try_from(row.size_bytes).map_err(|_| corrupt("negative size"))?;
        let width = u32::try_from(row.width).map_err(|_| corrupt("negative width"))?;
        let height = u32::try_from(row.height).map_err(|_| corrupt("negative height"))?;

        Ok(Image {
            id: row.id,
            owner_id: row.owner_id,
            original_file_name: row.original_file_name,
            stored_file_name: row.stored_file_name,
            mime_type: row.mime_type,
            size,
            width,
            height,
            format,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const IMAGE_COLUMNS: &str = "id, owner_id, original_file_name, stored_file_name, mime_type, \
     size_bytes, width, height, format, created_at, updated_at";

#[derive(Clone)]
pub struct PgImageRepository {
    pool: PgPool,
}

impl PgImageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImageRepository for PgImageRepository {
    #[tracing::instrument(skip(self, image), fields(db.table = "images", db.operation = "upsert", image_id = %image.id))]
    async fn save(&self, image: &Image) -> RepositoryResult<Image> {
        let size = i64::try_from(image.size)
            .map_err(|_| RepositoryError::CorruptRow(format!("image {} too large", image.id)))?;

        let query = format!(
            r#"
            INSERT INTO images (
                id, owner_id, original_file_name, stored_file_name, mime_type,
                size_bytes, width, height, format, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                original_file_name = EXCLUDED.original_file_name,
                stored_file_name = EXCLUDED.stored_file_name,
                mime_type = EXCLUDED.mime_type,
                size_bytes = EXCLUDED.size_bytes,
                width = EXCLUDED.width,
                height = EXCLUDED.height,
                format = EXCLUDED.format,
                updated_at = EXCLUDED.updated_at
            RETURNING {}
            "#,
            IMAGE_COLUMNS
        );

        let row: ImageRow = sqlx::query_as::<Postgres, ImageRow>(&query)
            .bind(image.id)
            .bind(image.owner_id)
            .bind(&image.original_file_name)
            .bind(&image.stored_file_name)
            .bind(&image.mime_type)
            .bind(size)
            .bind(image.width as i32)
            .bind(image.height as i32)
            .bind(image.format.as_str())
            .bind(image.created_at)
            .bind(image.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, image_id = %image.id, "Failed to save image");
                RepositoryError::from(e)
            })?;

        row.try_into()
    }

    #[tracing::instrument(skip(self, image), fields(db.table = "images", db.operation = "update", image_id = %image.id))]
    async fn update(&self, image: &Image) -> RepositoryResult<Option<Image>> {
        let size = i64::try_from(image.size)
            .map_err(|_| RepositoryError::CorruptRow(format!("image {} too large", image.id)))?;

        let query = format!(
            r#"
            UPDATE images SET
                original_file_name = $2,
                stored_file_name = $3,
                mime_type = $4,
                size_bytes = $5,
                width = $6,
                height = $7,
                format = $8,
                updated_at = $9
            WHERE id = $1
            RETURNING {}
            "#,
            IMAGE_COLUMNS
        );

        let row: Option<ImageRow> = sqlx::query_as::<Postgres, ImageRow>(&query)
            .bind(image.id)
            .bind(&image.original_file_name)
            .bind(&image.stored_file_name)
            .bind(&image.mime_type)
            .bind(size)
            .bind(image.width as i32)
            .bind(image.height as i32)
            .bind(image.format.as_str())
            .bind(image.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, image_id = %image.id, "Failed to update image");
                RepositoryError::from(e)
            })?;

        row.map(Image::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "images", db.operation = "select"))]
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Image>> {
        let query = format!("SELECT {} FROM images WHERE id = $1", IMAGE_COLUMNS);
        let row: Option<ImageRow> = sqlx::query_as::<Postgres, ImageRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Image::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "images", db.operation = "select"))]
    async fn find_by_owner(&self, owner_id: Uuid) -> RepositoryResult<Vec<Image>> {
        let query = format!(
            "SELECT {} FROM images WHERE owner_id = $1 ORDER BY created_at DESC, id DESC",
            IMAGE_COLUMNS
        );
        let rows: Vec<ImageRow> = sqlx::query_as::<Postgres, ImageRow>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Image::try_from).collect()
    }

    #[tracing::instrument(skip(self), fields(db.table = "images", db.operation = "delete"))]
    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
