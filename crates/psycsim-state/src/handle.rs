//! SurrealDB connection setup
//!
//! Resolves a connection from the environment in order:
//! 1. Cloud/remote credentials (`SURREALDB_ENDPOINT`, `SURREALDB_USERNAME`, ...)
//! 2. A bare URL (`SURREALDB_URL`)
//! 3. Local persistence under `.psycsim/db`
//!
//! Every path selects the namespace/database and runs `init_schema`.

use crate::error::StateError;
use crate::migrations;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::info;

const DEFAULT_NAMESPACE: &str = "psycsim";
const DEFAULT_DATABASE: &str = "main";
const LOCAL_DB_PATH: &str = ".psycsim/db";

/// Configuration for an authenticated SurrealDB connection
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Namespace (default: "psycsim")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    /// Create a new configuration for a database user
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    /// Load from `SURREALDB_*` environment variables
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace = std::env::var("SURREALDB_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let database =
            std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// Connect to `mem://` and initialize the schema.
pub async fn connect_memory() -> Result<Surreal<Any>> {
    let db = open("mem://").await?;
    select(&db, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await?;
    migrations::init_schema(&db).await?;
    info!("SurrealDB connected (in-memory)");
    Ok(db)
}

/// Connect with explicit credentials and initialize the schema.
pub async fn connect_cloud(config: &CloudConfig) -> Result<Surreal<Any>> {
    let db = open(&config.endpoint).await?;

    if config.is_root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
    }

    select(&db, &config.namespace, &config.database).await?;
    migrations::init_schema(&db).await?;
    info!(endpoint = %config.endpoint, "SurrealDB connected (cloud)");
    Ok(db)
}

/// Resolve a connection from the environment (see module docs).
pub async fn connect_from_env() -> Result<Surreal<Any>> {
    if let Ok(config) = CloudConfig::from_env() {
        return connect_cloud(&config).await;
    }

    let url = match std::env::var("SURREALDB_URL") {
        Ok(url) => url,
        Err(_) => {
            std::fs::create_dir_all(LOCAL_DB_PATH).map_err(|e| {
                StateError::Filesystem(format!(
                    "Failed to create database directory {LOCAL_DB_PATH}: {e}"
                ))
            })?;
            format!("surrealkv://{LOCAL_DB_PATH}")
        }
    };

    let db = open(&url).await?;
    select(&db, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await?;
    migrations::init_schema(&db).await?;
    info!(%url, "SurrealDB connected");
    Ok(db)
}

async fn open(url: &str) -> Result<Surreal<Any>> {
    surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))
}

async fn select(db: &Surreal<Any>, namespace: &str, database: &str) -> Result<()> {
    db.use_ns(namespace)
        .use_db(database)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))
}
