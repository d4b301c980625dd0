//! Shared PostgreSQL container for integration tests.
//!
//! One container is started per test binary; every test gets its own database.

use std::sync::OnceLock;

use postgres::{Client, NoTls};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

const PG_USER: &str = "postgres";
const PG_PASSWORD: &str = "postgres";
const PG_DB: &str = "postgres";

struct SharedContainer {
    port: u16,
    // Keeps the runtime (and the container it manages) alive for the test run
    _runtime: tokio::runtime::Runtime,
}

static CONTAINER: OnceLock<SharedContainer> = OnceLock::new();

fn container_port() -> u16 {
    CONTAINER
        .get_or_init(|| {
            let runtime = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
            let port = runtime.block_on(async {
                let container = Postgres::default()
                    .start()
                    .await
                    .expect("failed to start postgres container");
                let port = container
                    .get_host_port_ipv4(5432)
                    .await
                    .expect("failed to get postgres port");
                // Leaked so the container outlives this block
                std::mem::forget(container);
                port
            });
            SharedContainer {
                port,
                _runtime: runtime,
            }
        })
        .port
}

fn url_for(db: &str) -> String {
    format!(
        "postgres://{}:{}@127.0.0.1:{}/{}",
        PG_USER,
        PG_PASSWORD,
        container_port(),
        db
    )
}

/// Create a uniquely named, empty database and return its connection URL.
pub fn fresh_postgres_url() -> String {
    let mut admin = Client::connect(&url_for(PG_DB), NoTls).expect("failed to connect as admin");
    let db_name = format!("test_{}", Uuid::new_v4().simple());
    admin
        .batch_execute(&format!("CREATE DATABASE \"{}\"", db_name))
        .expect("failed to create test database");
    url_for(&db_name)
}
