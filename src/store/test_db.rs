//! Throwaway Postgres databases for store tests.
//!
//! One container is started per test binary and shared; every [`TestDb`] gets
//! its own freshly migrated database inside it, so tests never see each
//! other's rows. Needs a reachable Docker daemon.

use once_cell::sync::Lazy;
use sqlx::{Connection, PgConnection, PgPool};
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres as PostgresImage;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::PgStore;

const USER: &str = "storefront_test";
const PASSWORD: &str = "storefront_test_password";

static POSTGRES_CONTAINER: Lazy<OnceCell<ContainerAsync<PostgresImage>>> = Lazy::new(OnceCell::new);

async fn init_postgres_container() -> ContainerAsync<PostgresImage> {
    PostgresImage::default()
        .with_user(USER)
        .with_password(PASSWORD)
        .with_db_name("storefront_test")
        .with_env_var("POSTGRES_INITDB_ARGS", "--auth-host=trust")
        .start()
        .await
        .expect("Failed to start PostgreSQL container")
}

pub(crate) struct TestDb {
    pub pool: PgPool,
    pub store: PgStore,
}

impl TestDb {
    pub async fn new() -> Self {
        let container = POSTGRES_CONTAINER.get_or_init(init_postgres_container).await;
        let port = container.get_host_port_ipv4(5432).await.expect("Failed to get container port");
        let host = std::env::var("TESTCONTAINERS_HOST_OVERRIDE").unwrap_or_else(|_| "localhost".to_string());

        // Generated names are lowercase hex behind a fixed prefix, safe to quote.
        let name = format!("storefront_{}", Uuid::new_v4().simple());
        let admin_url = format!("postgresql://{USER}:{PASSWORD}@{host}:{port}/postgres");
        let mut conn = PgConnection::connect(&admin_url).await.expect("Failed to connect to postgres database");
        sqlx::query(&format!("CREATE DATABASE \"{name}\""))
            .execute(&mut conn)
            .await
            .expect("Failed to create test database");
        conn.close().await.expect("Failed to close admin connection");

        let pool = PgPool::connect(&format!("postgresql://{USER}:{PASSWORD}@{host}:{port}/{name}"))
            .await
            .expect("Failed to create pool for database");
        let store = PgStore::new(pool.clone());
        store.migrate().await.expect("Failed to run migrations on database");
        Self { pool, store }
    }
}
