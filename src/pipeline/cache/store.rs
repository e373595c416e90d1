use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};

use super::types::BiomarkerPattern;
use super::CacheError;

/// SQLite-backed pattern store. One row per standardized name, the pattern
/// body kept as JSON.
pub struct SqlitePatternStore {
    conn: Connection,
}

impl SqlitePatternStore {
    /// Open the store at `path` and run migrations. A file that is not a
    /// SQLite database fails here.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Load every stored pattern. Rows whose body no longer deserializes are
    /// skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<BiomarkerPattern>, CacheError> {
        let mut stmt = self
            .conn
            .prepare("SELECT standardized_name, body FROM biomarker_patterns ORDER BY standardized_name")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut patterns = Vec::new();
        for row in rows {
            let (name, body) = row?;
            match serde_json::from_str::<BiomarkerPattern>(&body) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => tracing::warn!(
                    pattern = %name,
                    error = %e,
                    "Skipping unreadable stored pattern"
                ),
            }
        }
        Ok(patterns)
    }

    /// Insert or replace one pattern.
    pub fn upsert(&self, pattern: &BiomarkerPattern) -> Result<(), CacheError> {
        let body = serde_json::to_string(pattern)?;
        self.conn.execute(
            "INSERT INTO biomarker_patterns (standardized_name, body, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(standardized_name) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at",
            params![pattern.standardized_name, body, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Write several patterns in one transaction.
    pub fn upsert_many<'a>(
        &mut self,
        patterns: impl IntoIterator<Item = &'a BiomarkerPattern>,
    ) -> Result<usize, CacheError> {
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO biomarker_patterns (standardized_name, body, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(standardized_name) DO UPDATE SET
                    body = excluded.body,
                    updated_at = excluded.updated_at",
            )?;
            let now = Utc::now().to_rfc3339();
            for pattern in patterns {
                let body = serde_json::to_string(pattern)?;
                stmt.execute(params![pattern.standardized_name, body, now])?;
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    pub fn count(&self) -> Result<usize, CacheError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM biomarker_patterns", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}

fn configure_pragmas(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch("PRAGMA journal_mode=DELETE;")?;
    Ok(())
}

/// Run all pending migrations
fn run_migrations(conn: &Connection) -> Result<(), CacheError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        include_str!("../../../resources/migrations/001_biomarker_patterns.sql"),
    )];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running pattern store migration v{version}");
            conn.execute_batch(sql).map_err(|e| CacheError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}
