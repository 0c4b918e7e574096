//! Product image storage. Images live as blobs next to their product and are
//! removed with it.

use sqlx::sqlite::SqlitePool;
use std::collections::HashMap;

#[derive(Clone)]
pub struct ProductImageStore {
    pool: SqlitePool,
}

/// A stored product image with its data.
#[derive(Debug, Clone)]
pub struct ProductImage {
    pub uuid: String,
    pub product_id: i64,
    pub content_type: String,
    pub file_name: Option<String>,
    pub data: Vec<u8>,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct ProductImageRow {
    uuid: String,
    product_id: i64,
    content_type: String,
    file_name: Option<String>,
    data: Vec<u8>,
    created_at: String,
}

impl From<ProductImageRow> for ProductImage {
    fn from(row: ProductImageRow) -> Self {
        Self {
            uuid: row.uuid,
            product_id: row.product_id,
            content_type: row.content_type,
            file_name: row.file_name,
            data: row.data,
            created_at: row.created_at,
        }
    }
}

impl ProductImageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store an image for a product. Returns the image UUID.
    pub async fn create(
        &self,
        product_id: i64,
        content_type: &str,
        file_name: Option<&str>,
        data: &[u8],
    ) -> Result<String, sqlx::Error> {
        let uuid = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO product_images (uuid, product_id, content_type, file_name, data)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&uuid)
        .bind(product_id)
        .bind(content_type)
        .bind(file_name)
        .bind(data)
        .execute(&self.pool)
        .await?;

        Ok(uuid)
    }

    /// Get an image by UUID. Only returns it if it belongs to the given product.
    pub async fn get(
        &self,
        uuid: &str,
        product_id: i64,
    ) -> Result<Option<ProductImage>, sqlx::Error> {
        let row: Option<ProductImageRow> = sqlx::query_as(
            "SELECT uuid, product_id, content_type, file_name, data, created_at
             FROM product_images WHERE uuid = ? AND product_id = ?",
        )
        .bind(uuid)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ProductImage::from))
    }

    /// Image UUIDs of one product, in upload order.
    pub async fn list_uuids(&self, product_id: i64) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT uuid FROM product_images WHERE product_id = ? ORDER BY id")
                .bind(product_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(uuid,)| uuid).collect())
    }

    /// Image UUIDs of every product, keyed by product ID.
    pub async fn uuids_by_product(&self) -> Result<HashMap<i64, Vec<String>>, sqlx::Error> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT product_id, uuid FROM product_images ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        let mut map: HashMap<i64, Vec<String>> = HashMap::new();
        for (product_id, uuid) in rows {
            map.entry(product_id).or_default().push(uuid);
        }
        Ok(map)
    }

    /// Delete an image of a product.
    pub async fn delete(&self, uuid: &str, product_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM product_images WHERE uuid = ? AND product_id = ?")
            .bind(uuid)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
