use crate::error::Result;
use crate::utils::constants::{META_TABLE_EXISTS_SQL, SELECT_META_SQL, UNSPECIFIED_META_ID};
use rusqlite::Connection;
use std::collections::HashMap;
use tracing::debug;

/// Flag name to `meta.id`, as registered in the template database.
///
/// Names that are not registered resolve to [`MetaLookup::UNSPECIFIED`].
#[derive(Debug, Clone, Default)]
pub struct MetaLookup {
    ids: HashMap<String, u32>,
}

impl MetaLookup {
    pub const UNSPECIFIED: u32 = UNSPECIFIED_META_ID;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        Self {
            ids: pairs.into_iter().map(|(id, name)| (name.into(), id)).collect(),
        }
    }

    /// Read the `meta (id, name)` table. A database without one yields an
    /// empty lookup.
    pub fn load(conn: &Connection) -> Result<Self> {
        let tables: i64 = conn.query_row(META_TABLE_EXISTS_SQL, [], |row| row.get(0))?;
        if tables == 0 {
            debug!("No meta table, every flag resolves to {}", Self::UNSPECIFIED);
            return Ok(Self::new());
        }

        let mut stmt = conn.prepare(SELECT_META_SQL)?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Self::from_pairs(pairs))
    }

    pub fn resolve(&self, name: &str) -> u32 {
        self.ids.get(name).copied().unwrap_or(Self::UNSPECIFIED)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_and_unknown() {
        let lookup = MetaLookup::from_pairs([(1, "ok"), (2, "calibration"), (7, "nd")]);

        assert_eq!(lookup.resolve("calibration"), 2);
        assert_eq!(lookup.resolve("nd"), 7);
        assert_eq!(lookup.resolve("power failure"), MetaLookup::UNSPECIFIED);
        assert_eq!(MetaLookup::UNSPECIFIED, 0);
    }

    #[test]
    fn test_load_from_database() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE meta (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO meta VALUES (1, 'ok'), (3, 'maintenance');",
        )?;

        let lookup = MetaLookup::load(&conn)?;
        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup.resolve("maintenance"), 3);
        assert_eq!(lookup.resolve("unknown"), 0);
        Ok(())
    }

    #[test]
    fn test_load_without_meta_table() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("CREATE TABLE data (param INTEGER, sta INTEGER);")?;

        let lookup = MetaLookup::load(&conn)?;
        assert!(lookup.is_empty());
        assert_eq!(lookup.resolve("ok"), MetaLookup::UNSPECIFIED);
        Ok(())
    }

    #[test]
    fn test_empty_lookup() {
        let lookup = MetaLookup::new();
        assert!(lookup.is_empty());
        assert_eq!(lookup.resolve("ok"), 0);
    }
}
