use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::retry::RetryPolicy;
use super::schema::init_schema;
use super::symbol::SymbolKey;
use super::writer::StoreWriter;
use super::{path_segments, File, Folder, OccurrenceKind, ReferenceKind, Style, Symbol, ROOT_FOLDER_ID};
use crate::config::StoreConfig;
use crate::error::StoreError;

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Connection settings applied to every connection
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub pool_size: u32,
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for StoreOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            pool_size: config.pool_size,
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        }
    }
}

/// Enable foreign keys and WAL, and set the busy timeout
fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!("journal_mode = {}", mode);
    Ok(())
}

/// Database connection manager
#[derive(Clone)]
pub struct IndexDatabase {
    pool: ConnectionPool,
    db_path: PathBuf,
    options: StoreOptions,
}

impl IndexDatabase {
    /// Create or open a database with default options
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::open(db_path, StoreOptions::default())
    }

    /// Create or open a database
    pub fn open(db_path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("Opening database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let busy_timeout = options.busy_timeout;
        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(move |conn| configure_connection(conn, busy_timeout));

        let pool = Pool::builder()
            .max_size(options.pool_size)
            .build(manager)
            .context("Failed to create connection pool")?;

        {
            let conn = pool.get().context("Failed to get connection")?;
            init_schema(&conn).context("Failed to initialize schema")?;
        }

        Ok(Self { pool, db_path, options })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().context("Failed to get connection from pool")
    }

    /// Open a dedicated connection outside the pool and start a writer on it.
    pub fn spawn_writer(&self, policy: RetryPolicy, name: &str) -> Result<StoreWriter, StoreError> {
        let conn = Connection::open(&self.db_path)?;
        configure_connection(&conn, self.options.busy_timeout)?;
        StoreWriter::spawn(conn, policy, name)
    }

    /// Get a folder by id
    pub fn get_folder(&self, id: i64) -> Result<Option<Folder>> {
        let conn = self.get_conn()?;
        let folder = conn
            .query_row(
                "SELECT id, name, parent_id, is_project FROM folders WHERE id = ?1",
                [id],
                row_to_folder,
            )
            .optional()?;
        Ok(folder)
    }

    /// Find a folder by its path below the root
    pub fn find_folder(&self, path: &str) -> Result<Option<Folder>> {
        let conn = self.get_conn()?;
        let mut folder = ROOT_FOLDER_ID;
        for segment in path_segments(path) {
            let next: Option<i64> = conn
                .query_row(
                    "SELECT id FROM folders WHERE parent_id = ?1 AND name = ?2",
                    params![folder, segment],
                    |row| row.get(0),
                )
                .optional()?;
            match next {
                Some(id) => folder = id,
                None => return Ok(None),
            }
        }
        drop(conn);
        self.get_folder(folder)
    }

    /// Direct child folders of a folder, by name
    pub fn child_folders(&self, parent: i64) -> Result<Vec<Folder>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, parent_id, is_project FROM folders WHERE parent_id = ?1 ORDER BY name",
        )?;
        let folders = stmt
            .query_map([parent], row_to_folder)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(folders)
    }

    /// Files directly inside a folder, by name (content omitted)
    pub fn files_in_folder(&self, folder: i64) -> Result<Vec<File>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, folder_id, line_count, length, NULL, indexed_at
             FROM files WHERE folder_id = ?1 ORDER BY name",
        )?;
        let files = stmt
            .query_map([folder], row_to_file)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    /// Get a file by id, including content
    pub fn get_file(&self, id: i64) -> Result<Option<File>> {
        let conn = self.get_conn()?;
        let file = conn
            .query_row(
                "SELECT id, name, folder_id, line_count, length, content, indexed_at
                 FROM files WHERE id = ?1",
                [id],
                row_to_file,
            )
            .optional()?;
        Ok(file)
    }

    /// Find a file by its full path below the root
    pub fn find_file(&self, path: &str) -> Result<Option<File>> {
        let segments = path_segments(path);
        let Some((name, folders)) = segments.split_last() else {
            return Ok(None);
        };
        let Some(folder) = self.find_folder(&folders.join("/"))? else {
            return Ok(None);
        };

        let conn = self.get_conn()?;
        let file = conn
            .query_row(
                "SELECT id, name, folder_id, line_count, length, content, indexed_at
                 FROM files WHERE folder_id = ?1 AND name = ?2",
                params![folder.id, name],
                row_to_file,
            )
            .optional()?;
        Ok(file)
    }

    /// Full path of a file below the root, e.g. `src/test/foo.cs`
    pub fn file_path(&self, file: &File) -> Result<String> {
        let conn = self.get_conn()?;
        let mut segments = vec![file.name.clone()];
        let mut folder = Some(file.folder_id);

        while let Some(id) = folder {
            if id == ROOT_FOLDER_ID {
                break;
            }
            let (name, parent): (String, Option<i64>) = conn.query_row(
                "SELECT name, parent_id FROM folders WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            segments.push(name);
            folder = parent;
        }

        segments.reverse();
        Ok(segments.join("/"))
    }

    /// Get symbol by key
    pub fn get_symbol(&self, key: &SymbolKey) -> Result<Option<Symbol>> {
        let conn = self.get_conn()?;
        let symbol = conn
            .query_row("SELECT id, name, kind FROM symbols WHERE id = ?1", [key], row_to_symbol)
            .optional()?;
        Ok(symbol)
    }

    /// Find symbols whose normalized name matches a LIKE pattern, with `\` as the escape character
    pub fn search_symbols(&self, pattern: &str, limit: usize) -> Result<Vec<Symbol>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, kind FROM symbols WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name LIMIT ?2",
        )?;
        let symbols = stmt
            .query_map(params![pattern, limit as i64], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    /// All rows of one occurrence kind for a symbol, ordered by file and sequence
    pub fn occurrences_of(&self, kind: OccurrenceKind, key: &SymbolKey) -> Result<Vec<StoredOccurrence>> {
        let conn = self.get_conn()?;
        let reference_kind = match kind {
            OccurrenceKind::Reference => "reference_kind",
            _ => "NULL",
        };
        let sql = format!(
            "SELECT file_id, file_seq, {} FROM {} WHERE symbol_id = ?1 ORDER BY file_id, file_seq",
            reference_kind,
            kind.table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([key], |row| {
                let reference_kind: Option<String> = row.get(2)?;
                Ok(StoredOccurrence {
                    file_id: row.get(0)?,
                    file_seq: row.get(1)?,
                    reference_kind: reference_kind.and_then(|k| ReferenceKind::from_str(&k).ok()),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Sequence ids of one occurrence kind recorded in a file, ascending
    pub fn file_sequence_ids(&self, kind: OccurrenceKind, file: i64) -> Result<Vec<u32>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT file_seq FROM {} WHERE file_id = ?1 ORDER BY file_seq", kind.table());
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map([file], |row| row.get(0))?
            .collect::<std::result::Result<Vec<u32>, _>>()?;
        Ok(ids)
    }

    /// All style definitions
    pub fn styles(&self) -> Result<Vec<Style>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, color, background_color, font_weight FROM styles ORDER BY name",
        )?;
        let styles = stmt
            .query_map([], |row| {
                Ok(Style {
                    name: row.get(0)?,
                    color: row.get(1)?,
                    background_color: row.get(2)?,
                    font_weight: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(styles)
    }

    /// Get index statistics
    pub fn get_stats(&self) -> Result<IndexStats> {
        let conn = self.get_conn()?;
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(IndexStats {
            total_folders: count("SELECT COUNT(*) FROM folders WHERE id != 1")?,
            total_projects: count("SELECT COUNT(*) FROM folders WHERE is_project = 1")?,
            total_files: count("SELECT COUNT(*) FROM files")?,
            total_symbols: count("SELECT COUNT(*) FROM symbols")?,
            total_declarations: count("SELECT COUNT(*) FROM declarations")?,
            total_references: count("SELECT COUNT(*) FROM symbol_references")?,
            total_implementations: count("SELECT COUNT(*) FROM implementations")?,
            total_styles: count("SELECT COUNT(*) FROM styles")?,
        })
    }

    /// Symbol counts grouped by kind, most common first
    pub fn symbols_by_kind(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT kind, COUNT(*) as count FROM symbols GROUP BY kind ORDER BY count DESC, kind",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let kind: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((kind, count as usize))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// A persisted occurrence row without its symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOccurrence {
    pub file_id: i64,
    pub file_seq: u32,
    pub reference_kind: Option<ReferenceKind>,
}

/// Index statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_folders: usize,
    pub total_projects: usize,
    pub total_files: usize,
    pub total_symbols: usize,
    pub total_declarations: usize,
    pub total_references: usize,
    pub total_implementations: usize,
    pub total_styles: usize,
}

fn row_to_folder(row: &Row) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: row.get(0)?,
        name: row.get(1)?,
        parent_id: row.get(2)?,
        is_project: row.get(3)?,
    })
}

fn row_to_file(row: &Row) -> rusqlite::Result<File> {
    Ok(File {
        id: row.get(0)?,
        name: row.get(1)?,
        folder_id: row.get(2)?,
        line_count: row.get(3)?,
        length: row.get::<_, i64>(4)? as u64,
        content: row.get(5)?,
        indexed_at: row.get(6)?,
    })
}

fn row_to_symbol(row: &Row) -> rusqlite::Result<Symbol> {
    Ok(Symbol {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
    })
}
