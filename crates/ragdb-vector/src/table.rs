//! LanceDB connection and table helpers.
use arrow_array::RecordBatchIterator;
use lancedb::{connect, Connection, Table};
use std::sync::Arc;

use ragdb_core::{RagError, Result};

pub(crate) fn store_err(e: impl std::fmt::Display) -> RagError {
    RagError::store(format!("lancedb: {e}"))
}

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(store_err)
}

pub async fn open_table_if_exists(conn: &Connection, name: &str) -> Result<Option<Table>> {
    let names = conn.table_names().execute().await.map_err(store_err)?;
    if !names.iter().any(|n| n == name) {
        return Ok(None);
    }
    let table = conn.open_table(name).execute().await.map_err(store_err)?;
    Ok(Some(table))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<Table> {
    if let Some(table) = open_table_if_exists(conn, name).await? {
        return Ok(table);
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await.map_err(store_err)
}
