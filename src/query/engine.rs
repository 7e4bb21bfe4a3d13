// Query execution engine

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;

use crate::index::db::{IndexDatabase, IndexStats};
use crate::index::symbol::SymbolKey;
use crate::index::{File, Folder, OccurrenceKind, ReferenceKind, Style, Symbol, ROOT_FOLDER_ID};

/// One place a symbol occurs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccurrenceResult {
    pub symbol: String,
    pub kind: OccurrenceKind,
    pub file_path: String,
    pub file_id: i64,
    pub anchor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_kind: Option<ReferenceKind>,
}

/// Contents of one folder
#[derive(Debug, Clone, Serialize)]
pub struct FolderListing {
    pub folder: Folder,
    pub folders: Vec<Folder>,
    pub files: Vec<File>,
}

/// Query engine
pub struct QueryEngine {
    db: IndexDatabase,
}

impl QueryEngine {
    pub fn new(db: IndexDatabase) -> Self {
        Self { db }
    }

    /// Search symbols by normalized name. A pattern containing `%` is used as
    /// a LIKE pattern; anything else matches literally anywhere in the name.
    pub fn search_symbols(&self, pattern: &str, limit: usize) -> Result<Vec<Symbol>> {
        let pattern = if pattern.contains('%') {
            pattern.to_string()
        } else {
            format!("%{}%", escape_like(pattern))
        };
        self.db.search_symbols(&pattern, limit)
    }

    /// Find all declarations of a symbol
    pub fn find_declarations(&self, symbol_name: &str) -> Result<Vec<OccurrenceResult>> {
        self.find_occurrences(OccurrenceKind::Declaration, symbol_name)
    }

    /// Find all references to a symbol
    pub fn find_references(&self, symbol_name: &str) -> Result<Vec<OccurrenceResult>> {
        self.find_occurrences(OccurrenceKind::Reference, symbol_name)
    }

    /// Find all implementations of a symbol
    pub fn find_implementations(&self, symbol_name: &str) -> Result<Vec<OccurrenceResult>> {
        self.find_occurrences(OccurrenceKind::Implementation, symbol_name)
    }

    /// Occurrences of one kind for a normalized symbol name, e.g. `csharp:T:Foo`
    pub fn find_occurrences(&self, kind: OccurrenceKind, symbol_name: &str) -> Result<Vec<OccurrenceResult>> {
        let key = SymbolKey::for_name(symbol_name);
        let rows = self.db.occurrences_of(kind, &key)?;

        let mut paths: HashMap<i64, String> = HashMap::new();
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let file_path = match paths.get(&row.file_id) {
                Some(path) => path.clone(),
                None => {
                    let Some(file) = self.db.get_file(row.file_id)? else {
                        continue;
                    };
                    let path = self.db.file_path(&file)?;
                    paths.insert(row.file_id, path.clone());
                    path
                }
            };

            results.push(OccurrenceResult {
                symbol: symbol_name.to_string(),
                kind,
                file_path,
                file_id: row.file_id,
                anchor: kind.anchor(row.file_seq),
                reference_kind: row.reference_kind,
            });
        }

        Ok(results)
    }

    /// A file with its stored content
    pub fn file_content(&self, path: &str) -> Result<Option<File>> {
        self.db.find_file(path)
    }

    /// Folders and files directly under a folder; an empty path is the root
    pub fn list_folder(&self, path: &str) -> Result<Option<FolderListing>> {
        let folder = if path.trim_matches(['/', '\\']).is_empty() {
            self.db.get_folder(ROOT_FOLDER_ID)?
        } else {
            self.db.find_folder(path)?
        };
        let Some(folder) = folder else {
            return Ok(None);
        };

        Ok(Some(FolderListing {
            folders: self.db.child_folders(folder.id)?,
            files: self.db.files_in_folder(folder.id)?,
            folder,
        }))
    }

    /// All style definitions
    pub fn styles(&self) -> Result<Vec<Style>> {
        self.db.styles()
    }

    /// Index statistics
    pub fn stats(&self) -> Result<IndexStats> {
        self.db.get_stats()
    }

    /// Symbol counts by kind
    pub fn symbols_by_kind(&self) -> Result<Vec<(String, usize)>> {
        self.db.symbols_by_kind()
    }
}

/// Escape LIKE metacharacters for use with `ESCAPE '\'`
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
