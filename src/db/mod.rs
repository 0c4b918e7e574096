mod images;
mod products;
mod session;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use images::{ProductImage, ProductImageStore};
pub use products::{Category, NewProduct, Price, Product, ProductChanges, ProductStore};
pub use session::SessionStore;
pub use user::{NewUser, User, UserRole, UserStore};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Users table; refresh_token mirrors the single live session
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    user_name TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'user',
                    refresh_token TEXT,
                    refresh_expires_at INTEGER,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_users_uuid ON users(uuid)",
                "CREATE INDEX idx_users_refresh_token ON users(refresh_token)",
                "CREATE INDEX idx_users_refresh_expires_at ON users(refresh_expires_at)",
                // Products table
                "CREATE TABLE products (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    title TEXT NOT NULL,
                    price_cents INTEGER NOT NULL,
                    description TEXT NOT NULL,
                    category TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_products_uuid ON products(uuid)",
                // Product images table
                "CREATE TABLE product_images (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
                    content_type TEXT NOT NULL,
                    file_name TEXT,
                    data BLOB NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_product_images_uuid ON product_images(uuid)",
                "CREATE INDEX idx_product_images_product_id ON product_images(product_id)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the session (refresh token) store.
    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.pool.clone())
    }

    /// Get the products store.
    pub fn products(&self) -> ProductStore {
        ProductStore::new(self.pool.clone())
    }

    /// Get the product images store.
    pub fn product_images(&self) -> ProductImageStore {
        ProductImageStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_user(db: &Database, uuid: &str, name: &str, email: &str) -> i64 {
        db.users()
            .create(&NewUser {
                uuid,
                user_name: name,
                email,
                password_hash: "hash",
                role: UserRole::User,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = create_user(&db, "uuid-123", "alice", "alice@example.com").await;

        let user = db.users().get_by_user_name("alice").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.uuid, "uuid-123");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role, UserRole::User);
        assert!(user.refresh_token.is_none());

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.user_name, "alice");

        let user = db.users().get_by_uuid("uuid-123").await.unwrap().unwrap();
        assert_eq!(user.id, id);

        let user = db
            .users()
            .get_by_email("ALICE@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, id);
    }

    #[tokio::test]
    async fn test_lookup_by_name_or_email() {
        let db = Database::open(":memory:").await.unwrap();
        let id = create_user(&db, "uuid-1", "alice", "alice@example.com").await;

        let users = db.users();
        assert_eq!(
            users
                .get_by_user_name_or_email("alice")
                .await
                .unwrap()
                .unwrap()
                .id,
            id
        );
        assert_eq!(
            users
                .get_by_user_name_or_email("alice@example.com")
                .await
                .unwrap()
                .unwrap()
                .id,
            id
        );
        assert!(
            users
                .get_by_user_name_or_email("bob")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_duplicate_user_name_or_email_fails() {
        let db = Database::open(":memory:").await.unwrap();

        create_user(&db, "uuid-1", "alice", "alice@example.com").await;

        let same_name = db
            .users()
            .create(&NewUser {
                uuid: "uuid-2",
                user_name: "Alice",
                email: "other@example.com",
                password_hash: "hash",
                role: UserRole::User,
            })
            .await;
        assert!(same_name.is_err());

        let same_email = db
            .users()
            .create(&NewUser {
                uuid: "uuid-3",
                user_name: "bob",
                email: "alice@example.com",
                password_hash: "hash",
                role: UserRole::User,
            })
            .await;
        assert!(same_email.is_err());

        assert!(
            db.users()
                .exists_with_name_or_email("ALICE", "x@example.com")
                .await
                .unwrap()
        );
        assert!(
            !db.users()
                .exists_with_name_or_email("carol", "carol@example.com")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_attach_overwrites_previous_session() {
        let db = Database::open(":memory:").await.unwrap();
        let id = create_user(&db, "uuid-1", "alice", "alice@example.com").await;
        let sessions = db.sessions();

        assert!(sessions.attach_refresh_token(id, "first", 100).await.unwrap());
        assert!(sessions.attach_refresh_token(id, "second", 200).await.unwrap());

        assert!(sessions.find_by_refresh_token("first").await.unwrap().is_none());
        let user = sessions.find_by_refresh_token("second").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.refresh_token.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_clear_refresh_token() {
        let db = Database::open(":memory:").await.unwrap();
        let id = create_user(&db, "uuid-1", "alice", "alice@example.com").await;
        let sessions = db.sessions();

        sessions.attach_refresh_token(id, "token", 100).await.unwrap();
        assert!(sessions.clear_refresh_token(id).await.unwrap());
        assert!(!sessions.clear_refresh_token(id).await.unwrap());
        assert!(sessions.find_by_refresh_token("token").await.unwrap().is_none());

        sessions.attach_refresh_token(id, "token-2", 100).await.unwrap();
        assert!(sessions.clear_refresh_token_value("token-2").await.unwrap());
        assert!(!sessions.clear_refresh_token_value("token-2").await.unwrap());
        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert!(user.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_clear_expired_sessions() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = create_user(&db, "uuid-1", "alice", "alice@example.com").await;
        let bob = create_user(&db, "uuid-2", "bob", "bob@example.com").await;
        let sessions = db.sessions();

        sessions.attach_refresh_token(alice, "old", 1_000).await.unwrap();
        sessions.attach_refresh_token(bob, "new", 5_000).await.unwrap();

        assert_eq!(sessions.clear_expired(2_000).await.unwrap(), 1);
        assert!(sessions.find_by_refresh_token("old").await.unwrap().is_none());
        assert!(sessions.find_by_refresh_token("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_product_crud() {
        let db = Database::open(":memory:").await.unwrap();
        let products = db.products();

        let created = products
            .create(&NewProduct {
                title: "Oak bed",
                price: Price(49900),
                description: "Solid oak",
                category: Category::Bed,
            })
            .await
            .unwrap();
        assert_eq!(created.title, "Oak bed");
        assert_eq!(created.category, Category::Bed);

        let updated = products
            .update(
                &created.uuid,
                &ProductChanges {
                    price: Some(Price(45000)),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.price, Price(45000));
        assert_eq!(updated.title, "Oak bed");

        assert_eq!(products.list().await.unwrap().len(), 1);

        let deleted = products.delete(&created.uuid).await.unwrap().unwrap();
        assert_eq!(deleted.uuid, created.uuid);
        assert!(products.get_by_uuid(&created.uuid).await.unwrap().is_none());
        assert!(products.delete(&created.uuid).await.unwrap().is_none());
        assert!(
            products
                .update(&created.uuid, &ProductChanges::default())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_images_removed_with_product() {
        let db = Database::open(":memory:").await.unwrap();
        let product = db
            .products()
            .create(&NewProduct {
                title: "Sofa",
                price: Price(100),
                description: "Soft",
                category: Category::Sofa,
            })
            .await
            .unwrap();

        let images = db.product_images();
        let uuid = images
            .create(product.id, "image/png", Some("sofa.png"), &[1, 2, 3])
            .await
            .unwrap();

        let image = images.get(&uuid, product.id).await.unwrap().unwrap();
        assert_eq!(image.data, vec![1, 2, 3]);
        assert_eq!(image.content_type, "image/png");
        assert_eq!(images.list_uuids(product.id).await.unwrap(), vec![uuid.clone()]);
        assert_eq!(
            images.uuids_by_product().await.unwrap().get(&product.id),
            Some(&vec![uuid.clone()])
        );

        db.products().delete(&product.uuid).await.unwrap();
        let remaining: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM product_images")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(remaining.0, 0);
    }
}
