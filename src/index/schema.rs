use rusqlite::{params, Connection, Result};
use tracing::{debug, info};

use super::{ROOT_FOLDER_ID, ROOT_FOLDER_NAME};

/// SQLite schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    info!("Initializing sourceindex schema v{}", SCHEMA_VERSION);

    // Create schema version table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    debug!("Current schema version: {}", current_version);

    if current_version < SCHEMA_VERSION {
        info!("Upgrading schema from v{} to v{}", current_version, SCHEMA_VERSION);
        apply_migrations(conn, current_version)?;
    }

    Ok(())
}

/// Apply migrations from current version to latest
fn apply_migrations(conn: &Connection, from_version: i32) -> Result<()> {
    for version in (from_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration v{}", version);
        match version {
            1 => create_v1_schema(conn)?,
            _ => unreachable!("Unknown schema version: {}", version),
        }

        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    }

    Ok(())
}

/// Create v1 schema (initial schema)
fn create_v1_schema(conn: &Connection) -> Result<()> {
    info!("Creating v1 schema tables");

    // Folder tree. Deleting a folder removes everything below it.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS folders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            parent_id INTEGER REFERENCES folders(id) ON DELETE CASCADE,
            is_project INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_parent_name
         ON folders(parent_id, name)",
        [],
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO folders (id, name, parent_id, is_project)
         VALUES (?1, ?2, NULL, 0)",
        params![ROOT_FOLDER_ID, ROOT_FOLDER_NAME],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            folder_id INTEGER NOT NULL REFERENCES folders(id) ON DELETE CASCADE,
            line_count INTEGER NOT NULL,
            length INTEGER NOT NULL,
            content TEXT,
            indexed_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_files_folder_name
         ON files(folder_id, name)",
        [],
    )?;

    // Symbols are keyed by a 20-byte hash of the normalized name
    conn.execute(
        "CREATE TABLE IF NOT EXISTS symbols (
            id BLOB PRIMARY KEY CHECK (length(id) = 20),
            name TEXT NOT NULL,
            kind TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_symbols_name
         ON symbols(name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS declarations (
            symbol_id BLOB NOT NULL REFERENCES symbols(id),
            file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            file_seq INTEGER NOT NULL,
            PRIMARY KEY (symbol_id, file_id, file_seq)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_declarations_file
         ON declarations(file_id, symbol_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS symbol_references (
            symbol_id BLOB NOT NULL REFERENCES symbols(id),
            file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            file_seq INTEGER NOT NULL,
            reference_kind TEXT NOT NULL DEFAULT 'usage',
            PRIMARY KEY (symbol_id, file_id, file_seq)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_references_file
         ON symbol_references(file_id, symbol_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS implementations (
            symbol_id BLOB NOT NULL REFERENCES symbols(id),
            file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            file_seq INTEGER NOT NULL,
            PRIMARY KEY (symbol_id, file_id, file_seq)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_implementations_file
         ON implementations(file_id, symbol_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS styles (
            name TEXT PRIMARY KEY,
            color TEXT,
            background_color TEXT,
            font_weight TEXT
        )",
        [],
    )?;

    info!("v1 schema created successfully");

    Ok(())
}

/// Drop all tables (for testing/rebuilding)
pub fn drop_schema(conn: &Connection) -> Result<()> {
    info!("Dropping all schema tables");

    conn.execute("DROP TABLE IF EXISTS schema_version", [])?;
    conn.execute("DROP TABLE IF EXISTS styles", [])?;
    conn.execute("DROP TABLE IF EXISTS implementations", [])?;
    conn.execute("DROP TABLE IF EXISTS symbol_references", [])?;
    conn.execute("DROP TABLE IF EXISTS declarations", [])?;
    conn.execute("DROP TABLE IF EXISTS symbols", [])?;
    conn.execute("DROP TABLE IF EXISTS files", [])?;
    conn.execute("DROP TABLE IF EXISTS folders", [])?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        for table in [
            "folders",
            "files",
            "symbols",
            "declarations",
            "symbol_references",
            "implementations",
            "styles",
            "schema_version",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[test]
    fn test_root_folder_exists() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let (name, parent): (String, Option<i64>) = conn
            .query_row(
                "SELECT name, parent_id FROM folders WHERE id = ?1",
                [ROOT_FOLDER_ID],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();

        assert_eq!(name, "<root>");
        assert_eq!(parent, None);
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let version: i32 = conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_sibling_names_are_unique() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute("INSERT INTO folders (name, parent_id) VALUES ('src', 1)", [])
            .unwrap();
        let duplicate = conn.execute("INSERT INTO folders (name, parent_id) VALUES ('src', 1)", []);
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_drop_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        drop_schema(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(count, 0);
    }

    #[test]
    fn test_idempotent_init() {
        let conn = Connection::open_in_memory().unwrap();

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();

        assert_eq!(version, 1);
    }
}
