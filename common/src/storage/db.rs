use crate::error::AppError;

use anyhow::Context;

use super::types::{fiscal_document::FiscalDocument, StoredObject};
use serde::Serialize;
use std::{
    ops::Deref,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};
use tracing::{info, warn};

/// Last observed state of the database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
    connected: Arc<AtomicBool>,
}

impl SurrealDbClient {
    /// # Initialize a new database client
    ///
    /// # Arguments
    /// * `address` - Engine address, e.g. `ws://localhost:8000` or `mem://`
    /// * `username` / `password` - Root credentials
    /// * `namespace` / `database` - Selected namespace and database
    ///
    /// # Returns
    /// * `SurrealDbClient` initialized
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        // Embedded engines run without authentication
        if !address.starts_with("mem://") {
            db.signin(Root { username, password }).await?;
        }

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient {
            client: db,
            connected: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Declares the record table and its uniqueness constraints. Idempotent.
    pub async fn ensure_initialized(&self) -> Result<(), AppError> {
        self.build_indexes().await?;
        Ok(())
    }

    /// Defines the record table and its indexes. Each statement is checked on
    /// its own so a failure names the index that could not be created.
    pub async fn build_indexes(&self) -> anyhow::Result<()> {
        let table = FiscalDocument::table_name();
        self.client
            .query(format!("DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;"))
            .await
            .and_then(|response| response.check())
            .with_context(|| format!("defining table {table}"))?;

        let indexes = [
            ("number", "number UNIQUE"),
            ("document_key", "document_key UNIQUE"),
            ("created", "created_at"),
        ];
        for (suffix, fields) in indexes {
            let index_name = format!("idx_{table}_{suffix}");
            self.client
                .query(format!(
                    "DEFINE INDEX IF NOT EXISTS {index_name} ON TABLE {table} FIELDS {fields};"
                ))
                .await
                .and_then(|response| response.check())
                .with_context(|| format!("creating index {index_name} on table {table}"))?;
        }

        Ok(())
    }

    /// Runs a trivial query and records the resulting connection state.
    ///
    /// Transitions are logged once: a warning when the store goes away and an
    /// info event when it comes back.
    pub async fn probe(&self) -> ConnectionState {
        let state = match self.client.query("RETURN true").await {
            Ok(_) => ConnectionState::Connected,
            Err(err) => {
                warn!(error = %err, "database probe failed");
                ConnectionState::Disconnected
            }
        };
        self.record_state(state);
        state
    }

    /// The state recorded by the most recent probe.
    pub fn connection_state(&self) -> ConnectionState {
        if self.connected.load(Ordering::Acquire) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    fn record_state(&self, state: ConnectionState) {
        let now_connected = state == ConnectionState::Connected;
        let was_connected = self.connected.swap(now_connected, Ordering::AcqRel);
        match (was_connected, now_connected) {
            (true, false) => warn!("database connection lost"),
            (false, true) => info!("database connection restored"),
            _ => {}
        }
    }

    pub async fn drop_table<T>(&self) -> Result<Vec<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client.delete(T::table_name()).await
    }

    /// Operation to store a object in SurrealDB, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `item` - The item to be stored
    ///
    /// # Returns
    /// * `Result` - Item or Error
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Operation to retrieve a single object by its ID, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `id` - The ID of the item to retrieve
    ///
    /// # Returns
    /// * `Result<Option<T>, Error>` - The found item or Error
    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// Operation to delete a single object by its ID, requires the struct to implement StoredObject
    ///
    /// # Returns
    /// * `Result<Option<T>, Error>` - The deleted item or Error
    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// True when the error is SurrealDB rejecting a write on a UNIQUE index.
pub fn is_unique_violation(error: &Error) -> bool {
    error.to_string().contains("already contains")
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient {
            client: db,
            connected: Arc::new(AtomicBool::new(true)),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::stored_object;

    use super::*;
    use uuid::Uuid;

    stored_object!(Dummy, "dummy", {
        name: String
    });

    #[tokio::test]
    async fn test_initialization_and_crud() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string(); // ensures isolation per test run
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.ensure_initialized()
            .await
            .expect("Failed to initialize schema");

        let dummy = Dummy {
            id: "abc".to_string(),
            name: "first".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let stored = db.store_item(dummy.clone()).await.expect("Failed to store");
        assert!(stored.is_some());

        let fetched = db
            .get_item::<Dummy>(&dummy.id)
            .await
            .expect("Failed to fetch");
        assert_eq!(fetched, Some(dummy.clone()));

        let deleted = db
            .delete_item::<Dummy>(&dummy.id)
            .await
            .expect("Failed to delete");
        assert_eq!(deleted, Some(dummy));

        let fetch_post = db
            .get_item::<Dummy>("abc")
            .await
            .expect("Failed fetch post delete");
        assert!(fetch_post.is_none());
    }

    #[tokio::test]
    async fn test_ensure_initialized_is_idempotent() {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.ensure_initialized().await.expect("first init");
        db.ensure_initialized().await.expect("second init");
    }

    #[tokio::test]
    async fn test_unique_index_rejects_second_number() {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized().await.expect("init");

        let table = FiscalDocument::table_name();
        db.client
            .query(format!(
                "CREATE {table}:first CONTENT {{ number: '1', document_key: 'a' }}"
            ))
            .await
            .expect("first create")
            .check()
            .expect("first create accepted");

        let err = db
            .client
            .query(format!(
                "CREATE {table}:second CONTENT {{ number: '1', document_key: 'b' }}"
            ))
            .await
            .expect("query dispatched")
            .check()
            .expect_err("duplicate number rejected");

        assert!(is_unique_violation(&err), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_index_failure_names_the_index() {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let table = FiscalDocument::table_name();
        db.client
            .query(format!(
                "CREATE {table}:first CONTENT {{ number: '1', document_key: 'a' }};
                CREATE {table}:second CONTENT {{ number: '1', document_key: 'b' }};"
            ))
            .await
            .expect("seed dispatched")
            .check()
            .expect("duplicates accepted before indexing");

        let err = db
            .ensure_initialized()
            .await
            .expect_err("unique index over duplicate numbers");

        assert!(matches!(err, AppError::Anyhow(_)), "unexpected error: {err}");
        assert!(
            err.to_string().contains("idx_fiscal_document_number"),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn test_probe_reports_connected() {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("test_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb");

        assert_eq!(db.probe().await, ConnectionState::Connected);
        assert_eq!(db.connection_state(), ConnectionState::Connected);
    }
}
