//! SQLite persistence for merged tables.

use crate::error::{DataError, Result};
use chrono::{DateTime, Utc};
use fmp_engine::{KeySpec, MergedTable, Record};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

/// Named merged tables stored in SQLite.
///
/// Each row of a merged table is stored as a JSON object together with its
/// composite key (as a JSON array) and its position, so a reloaded table has the same rows in
/// the same order.
#[derive(Debug)]
pub struct TableStore {
    conn: Connection,
}

/// Summary of one stored table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Table name
    pub name: String,
    /// Key fields, identifier first
    pub key_fields: Vec<String>,
    /// Number of rows
    pub rows: usize,
    /// When the table was saved
    pub cached_at: DateTime<Utc>,
}

impl TableStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS cached_tables (
                table_name TEXT PRIMARY KEY,
                identifier TEXT NOT NULL,
                key_fields TEXT NOT NULL,
                row_count INTEGER NOT NULL,
                cached_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS table_rows (
                table_name TEXT NOT NULL,
                row_key TEXT NOT NULL,
                position INTEGER NOT NULL,
                data TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (table_name, row_key)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_table_rows_position ON table_rows(table_name, position)",
            [],
        )?;

        Ok(())
    }

    /// Save `table` under `name`, replacing any table of that name.
    pub fn save_table(&self, name: &str, table: &MergedTable) -> Result<()> {
        if name.trim().is_empty() {
            return Err(DataError::Cache("table name must not be empty".to_string()));
        }
        let cached_at = Utc::now().to_rfc3339();
        let key = table.key();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM table_rows WHERE table_name = ?1", params![name])?;
        tx.execute(
            "INSERT OR REPLACE INTO cached_tables
             (table_name, identifier, key_fields, row_count, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                name,
                key.identifier(),
                serde_json::to_string(key.fields())?,
                table.len() as i64,
                cached_at
            ],
        )?;
        for (position, (row_key, row)) in table.keys().zip(table.rows()).enumerate() {
            tx.execute(
                "INSERT OR REPLACE INTO table_rows
                 (table_name, row_key, position, data, cached_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    name,
                    serde_json::to_string(&row_key.0)?,
                    position as i64,
                    serde_json::to_string(row)?,
                    cached_at
                ],
            )?;
        }
        tx.commit()?;

        log::debug!("saved {} row(s) to cached table {name}", table.len());
        Ok(())
    }

    /// Rows of a stored table in their saved order; empty if the table does
    /// not exist.
    pub fn load_rows(&self, name: &str) -> Result<Vec<Record>> {
        let mut stmt = self.conn.prepare(
            "SELECT data FROM table_rows WHERE table_name = ?1 ORDER BY position ASC",
        )?;
        let texts = stmt
            .query_map(params![name], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        texts
            .iter()
            .map(|text| serde_json::from_str(text).map_err(DataError::from))
            .collect()
    }

    /// Rebuild a stored table with its original key, or `None` if no table
    /// of that name exists.
    pub fn load_table(&self, name: &str) -> Result<Option<MergedTable>> {
        let Some(info) = self.table_info(name)? else {
            return Ok(None);
        };
        let Some((identifier, rest)) = info.key_fields.split_first() else {
            return Err(DataError::Cache(format!("table {name} has no key fields")));
        };
        let key = KeySpec::new(identifier.as_str(), rest.iter().cloned());
        let table = MergedTable::from_rows(key, self.load_rows(name)?)?;
        Ok(Some(table))
    }

    /// Summary of a stored table.
    pub fn table_info(&self, name: &str) -> Result<Option<TableInfo>> {
        self.conn
            .query_row(
                "SELECT table_name, key_fields, row_count, cached_at
                 FROM cached_tables WHERE table_name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?
            .map(parse_info)
            .transpose()
    }

    /// All stored tables, by name.
    pub fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT table_name, key_fields, row_count, cached_at
             FROM cached_tables ORDER BY table_name ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter().map(parse_info).collect()
    }

    /// Delete a stored table. Returns whether it existed.
    pub fn drop_table(&self, name: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM table_rows WHERE table_name = ?1", params![name])?;
        let removed = tx.execute("DELETE FROM cached_tables WHERE table_name = ?1", params![name])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Whether `name` was saved less than `max_age_days` ago.
    pub fn is_fresh(&self, name: &str, max_age_days: i64) -> Result<bool> {
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days);
        Ok(self
            .table_info(name)?
            .is_some_and(|info| info.cached_at >= cutoff))
    }

    /// Clear all cached data.
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM table_rows", [])?;
        self.conn.execute("DELETE FROM cached_tables", [])?;
        Ok(())
    }
}

fn parse_info((name, key_fields, rows, cached_at): (String, String, i64, String)) -> Result<TableInfo> {
    let cached_at = DateTime::parse_from_rfc3339(&cached_at)
        .map_err(|e| DataError::Parse(format!("Invalid timestamp {cached_at}: {e}")))?
        .with_timezone(&Utc);
    Ok(TableInfo {
        name,
        key_fields: serde_json::from_str(&key_fields)?,
        rows: usize::try_from(rows).unwrap_or_default(),
        cached_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn holders() -> MergedTable {
        let rows = [
            json!({"symbol": "AAPL", "cik": "0001", "date": "2023-09-30", "shares": 100}),
            json!({"symbol": "AAPL", "cik": "0002", "date": "2023-09-30", "shares": 50.5}),
            json!({"symbol": "MSFT", "cik": "0001", "date": "2023-09-30", "shares": null}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();
        MergedTable::from_rows(KeySpec::new("symbol", ["cik", "date"]), rows).unwrap()
    }

    #[test]
    fn test_store_initialization() {
        let store = TableStore::in_memory();
        assert!(store.is_ok());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let store = TableStore::in_memory().unwrap();
        let table = holders();

        store.save_table("holders", &table).unwrap();

        let loaded = store.load_table("holders").unwrap().unwrap();
        assert_eq!(loaded.rows(), table.rows());
        assert_eq!(loaded.key().fields(), table.key().fields());
        assert!(loaded.frame().equals_missing(table.frame()));
    }

    #[test]
    fn test_keys_with_separator_characters_stay_distinct() {
        let store = TableStore::in_memory().unwrap();
        let rows = [
            json!({"symbol": "AAPL", "name": "A|B", "title": "C"}),
            json!({"symbol": "AAPL", "name": "A", "title": "B|C"}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();
        let table = MergedTable::from_rows(KeySpec::new("symbol", ["name", "title"]), rows).unwrap();
        assert_eq!(table.len(), 2);

        store.save_table("executives", &table).unwrap();

        let loaded = store.load_table("executives").unwrap().unwrap();
        assert_eq!(loaded.rows(), table.rows());
        assert!(loaded.lookup(&["AAPL", "A|B", "C"]).is_some());
        assert!(loaded.lookup(&["AAPL", "A", "B|C"]).is_some());
    }

    #[test]
    fn test_save_replaces_table() {
        let store = TableStore::in_memory().unwrap();
        store.save_table("holders", &holders()).unwrap();

        let smaller = MergedTable::from_rows(
            KeySpec::new("symbol", ["cik", "date"]),
            holders().rows()[..1].to_vec(),
        )
        .unwrap();
        store.save_table("holders", &smaller).unwrap();

        assert_eq!(store.load_rows("holders").unwrap().len(), 1);
        assert_eq!(store.table_info("holders").unwrap().unwrap().rows, 1);
    }

    #[test]
    fn test_list_and_drop() {
        let store = TableStore::in_memory().unwrap();
        store.save_table("b", &holders()).unwrap();
        store.save_table("a", &holders()).unwrap();

        let names: Vec<String> = store.list_tables().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["a", "b"]);

        assert!(store.drop_table("a").unwrap());
        assert!(!store.drop_table("a").unwrap());
        assert!(store.load_table("a").unwrap().is_none());
        assert!(store.load_rows("a").unwrap().is_empty());
        assert_eq!(store.list_tables().unwrap().len(), 1);
    }

    #[test]
    fn test_freshness() {
        let store = TableStore::in_memory().unwrap();
        assert!(!store.is_fresh("holders", 1).unwrap());
        store.save_table("holders", &holders()).unwrap();
        assert!(store.is_fresh("holders", 1).unwrap());
    }

    #[test]
    fn test_empty_name_rejected() {
        let store = TableStore::in_memory().unwrap();
        assert!(matches!(
            store.save_table(" ", &holders()),
            Err(DataError::Cache(_))
        ));
    }
}
