//! Caching layer for merged tables.

pub mod sqlite;

pub use sqlite::{TableInfo, TableStore};
