//! Catalog product storage.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use sqlx::sqlite::SqlitePool;
use std::fmt;

#[derive(Clone)]
pub struct ProductStore {
    pool: SqlitePool,
}

/// Furniture category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Sofa,
    Bed,
    DiningTable,
    DressingTable,
    Cabinet,
    Closet,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Sofa,
        Category::Bed,
        Category::DiningTable,
        Category::DressingTable,
        Category::Cabinet,
        Category::Closet,
    ];

    /// Name used both on the wire and in the `category` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sofa => "sofa",
            Category::Bed => "bed",
            Category::DiningTable => "dining table",
            Category::DressingTable => "dressing table",
            Category::Cabinet => "cabinet",
            Category::Closet => "closet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.as_str() == s)
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Category::parse(&name)
            .ok_or_else(|| D::Error::custom(format!("unknown category \"{}\"", name)))
    }
}

/// Non-negative price in cents. Rendered as a decimal string ("1299.90").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Price(pub i64);

impl Price {
    /// Parse "12", "12.5" or "12.50". At most two fractional digits, no sign.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (whole, frac) = match text.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (text, ""),
        };

        if whole.is_empty() || frac.len() > 2 {
            return None;
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        if text.ends_with('.') {
            return None;
        }

        let whole: i64 = whole.parse().ok()?;
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().ok()? * 10,
            _ => frac.parse().ok()?,
        };

        whole.checked_mul(100)?.checked_add(frac).map(Price)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Clients send either "1299.90" or 1299.9
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text,
            Raw::Number(number) => number.to_string(),
        };

        Price::parse(&text).ok_or_else(|| {
            D::Error::custom("price must be a non-negative amount with at most two decimals")
        })
    }
}

/// A catalog product.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: i64,
    pub uuid: String,
    pub title: String,
    pub price: Price,
    pub description: String,
    pub category: Category,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    uuid: String,
    title: String,
    price_cents: i64,
    description: String,
    category: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ProductRow> for Product {
    type Error = sqlx::Error;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let category = Category::parse(&row.category).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown product category: {}", row.category).into())
        })?;
        Ok(Self {
            id: row.id,
            uuid: row.uuid,
            title: row.title,
            price: Price(row.price_cents),
            description: row.description,
            category,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Fields for a new product.
pub struct NewProduct<'a> {
    pub title: &'a str,
    pub price: Price,
    pub description: &'a str,
    pub category: Category,
}

/// Partial product update. `None` keeps the stored value.
#[derive(Default)]
pub struct ProductChanges<'a> {
    pub title: Option<&'a str>,
    pub price: Option<Price>,
    pub description: Option<&'a str>,
    pub category: Option<Category>,
}

impl ProductStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a product and return it.
    pub async fn create(&self, product: &NewProduct<'_>) -> Result<Product, sqlx::Error> {
        let uuid = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO products (uuid, title, price_cents, description, category)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&uuid)
        .bind(product.title)
        .bind(product.price.cents())
        .bind(product.description)
        .bind(product.category.as_str())
        .execute(&self.pool)
        .await?;

        self.get_by_uuid(&uuid)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Get a product by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Product>, sqlx::Error> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, uuid, title, price_cents, description, category, created_at, updated_at
             FROM products WHERE uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Product::try_from).transpose()
    }

    /// List all products, oldest first.
    pub async fn list(&self) -> Result<Vec<Product>, sqlx::Error> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT id, uuid, title, price_cents, description, category, created_at, updated_at
             FROM products ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Product::try_from).collect()
    }

    /// Apply a partial update. Returns the updated product, or None if it does not exist.
    pub async fn update(
        &self,
        uuid: &str,
        changes: &ProductChanges<'_>,
    ) -> Result<Option<Product>, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE products SET
                title = COALESCE(?, title),
                price_cents = COALESCE(?, price_cents),
                description = COALESCE(?, description),
                category = COALESCE(?, category),
                updated_at = datetime('now')
             WHERE uuid = ?",
        )
        .bind(changes.title)
        .bind(changes.price.map(|p| p.cents()))
        .bind(changes.description)
        .bind(changes.category.map(|c| c.as_str()))
        .bind(uuid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_uuid(uuid).await
    }

    /// Delete a product (its images cascade). Returns the deleted product.
    pub async fn delete(&self, uuid: &str) -> Result<Option<Product>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, uuid, title, price_cents, description, category, created_at, updated_at
             FROM products WHERE uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Product::try_from(row).map(Some)
    }
}
