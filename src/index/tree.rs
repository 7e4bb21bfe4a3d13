// Folder and file tree builder

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::ROOT_FOLDER_ID;
use crate::error::StoreError;

/// Walk `segments` down from `parent`, creating any missing folder.
/// Returns the id of the last folder.
pub fn resolve_folder_path(conn: &Connection, parent: i64, segments: &[&str]) -> Result<i64, StoreError> {
    let mut folder = parent;
    for segment in segments {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM folders WHERE parent_id = ?1 AND name = ?2",
                params![folder, segment],
                |row| row.get(0),
            )
            .optional()?;

        folder = match existing {
            Some(id) => id,
            None => {
                conn.execute(
                    "INSERT INTO folders (name, parent_id, is_project) VALUES (?1, ?2, 0)",
                    params![segment, folder],
                )?;
                let id = conn.last_insert_rowid();
                debug!("Created folder {} ({}) under {}", segment, id, parent);
                id
            }
        };
    }

    Ok(folder)
}

/// Resolve the folder for a project path, mark it as a project and drop
/// everything previously indexed beneath it.
pub fn begin_project_folder(conn: &Connection, segments: &[&str]) -> Result<i64, StoreError> {
    let folder = resolve_folder_path(conn, ROOT_FOLDER_ID, segments)?;

    conn.execute("UPDATE folders SET is_project = 1 WHERE id = ?1", [folder])?;
    let files = conn.execute("DELETE FROM files WHERE folder_id = ?1", [folder])?;
    let folders = conn.execute("DELETE FROM folders WHERE parent_id = ?1", [folder])?;

    debug!(
        "Reset project folder {}: removed {} file(s) and {} folder subtree(s)",
        folder, files, folders
    );

    Ok(folder)
}

/// Replace any file called `name` under `folder` with a fresh, empty row.
pub fn begin_file(conn: &Connection, folder: i64, name: &str, line_count: u32, length: u64) -> Result<i64, StoreError> {
    conn.execute(
        "DELETE FROM files WHERE folder_id = ?1 AND name = ?2",
        params![folder, name],
    )?;
    conn.execute(
        "INSERT INTO files (name, folder_id, line_count, length) VALUES (?1, ?2, ?3, ?4)",
        params![name, folder, line_count, length as i64],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Store the finalized content of a file.
pub fn set_file_content(conn: &Connection, file: i64, content: &str) -> Result<(), StoreError> {
    let updated = conn.execute(
        "UPDATE files SET content = ?1, indexed_at = ?2 WHERE id = ?3",
        params![content, Utc::now().to_rfc3339(), file],
    )?;
    if updated == 0 {
        return Err(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
    }

    Ok(())
}
