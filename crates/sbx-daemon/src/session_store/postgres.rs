//! Postgres-backed session store

use super::SessionStore;
use async_trait::async_trait;
use sandbox_registry_core::{RegistryError, SessionRecord, SessionStatus};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};

/// Session store over a `sandbox_sessions(id, user_id, status)` table.
#[derive(Clone)]
pub struct PostgresSessionStore {
    client: Arc<Mutex<Client>>,
    select_sql: String,
    update_sql: String,
}

impl std::fmt::Debug for PostgresSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSessionStore")
            .field("select_sql", &self.select_sql)
            .finish_non_exhaustive()
    }
}

impl PostgresSessionStore {
    /// Connect and spawn the connection driver task.
    ///
    /// `table` must already be validated as a plain identifier; it is
    /// interpolated into the statements.
    pub async fn connect(database_url: &str, table: &str) -> Result<Self, RegistryError> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| RegistryError::session_store(format!("connect to postgres: {e}")))?;

        tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::error!("Session store postgres connection error: {}", error);
            }
        });

        let (select_sql, update_sql) = statements(table);
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            select_sql,
            update_sql,
        })
    }
}

fn statements(table: &str) -> (String, String) {
    (
        format!("SELECT id, user_id, status FROM {table} WHERE id = $1"),
        format!("UPDATE {table} SET status = $1 WHERE id = $2"),
    )
}

fn record_from_row(row: &Row) -> Result<SessionRecord, RegistryError> {
    let id: String = row
        .try_get("id")
        .map_err(|e| RegistryError::session_store(format!("column id: {e}")))?;
    let user_id: Option<String> = row
        .try_get("user_id")
        .map_err(|e| RegistryError::session_store(format!("column user_id: {e}")))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| RegistryError::session_store(format!("column status: {e}")))?;
    let status = status
        .parse::<SessionStatus>()
        .map_err(|e| RegistryError::session_store(format!("session {id}: {e}")))?;

    Ok(SessionRecord::new(id, user_id.unwrap_or_default(), status))
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<SessionRecord>, RegistryError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(self.select_sql.as_str(), &[&session_id])
            .await
            .map_err(|e| RegistryError::session_store(format!("find {session_id}: {e}")))?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<(), RegistryError> {
        let client = self.client.lock().await;
        client
            .execute(self.update_sql.as_str(), &[&status.as_str(), &session_id])
            .await
            .map_err(|e| RegistryError::session_store(format!("update {session_id}: {e}")))?;
        Ok(())
    }
}
