// Index storage: schema, connection management, symbol identity, folder tree and writes

pub mod db;
pub mod retry;
pub mod schema;
pub mod style;
pub mod symbol;
pub mod tree;
pub mod writer;

use serde::{Deserialize, Serialize};

use self::symbol::SymbolKey;

/// Id of the distinguished root folder created with the schema
pub const ROOT_FOLDER_ID: i64 = 1;

/// Name of the root folder
pub const ROOT_FOLDER_NAME: &str = "<root>";

/// A node in the folder tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub is_project: bool,
}

/// A source file and its assembled markup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: i64,
    pub name: String,
    pub folder_id: i64,
    pub line_count: u32,
    pub length: u64,
    pub content: Option<String>,
    pub indexed_at: Option<String>,
}

/// A language-qualified symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolKey,
    pub name: String,
    pub kind: String,
}

/// Display attributes of a classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    pub name: String,
    pub color: Option<String>,
    pub background_color: Option<String>,
    pub font_weight: Option<String>,
}

/// The three ways a token can point at a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceKind {
    Declaration,
    Reference,
    Implementation,
}

impl OccurrenceKind {
    pub const ALL: [OccurrenceKind; 3] = [
        OccurrenceKind::Declaration,
        OccurrenceKind::Reference,
        OccurrenceKind::Implementation,
    ];

    /// Table holding rows of this kind
    pub fn table(&self) -> &'static str {
        match self {
            OccurrenceKind::Declaration => "declarations",
            OccurrenceKind::Reference => "symbol_references",
            OccurrenceKind::Implementation => "implementations",
        }
    }

    /// Prefix of the anchor ids embedded in file content
    pub fn anchor_prefix(&self) -> &'static str {
        match self {
            OccurrenceKind::Declaration => "d",
            OccurrenceKind::Reference => "r",
            OccurrenceKind::Implementation => "i",
        }
    }

    /// Anchor id for the `seq`th occurrence of this kind in a file
    pub fn anchor(&self, seq: u32) -> String {
        format!("{}-{}", self.anchor_prefix(), seq)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OccurrenceKind::Declaration => "declaration",
            OccurrenceKind::Reference => "reference",
            OccurrenceKind::Implementation => "implementation",
        }
    }

    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "declaration" | "declarations" => Ok(OccurrenceKind::Declaration),
            "reference" | "references" => Ok(OccurrenceKind::Reference),
            "implementation" | "implementations" => Ok(OccurrenceKind::Implementation),
            _ => anyhow::bail!("Unknown occurrence kind: {}", s),
        }
    }
}

/// How a reference uses its symbol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    #[default]
    Usage,
    Implementation,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Usage => "usage",
            ReferenceKind::Implementation => "implementation",
        }
    }

    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "usage" => Ok(ReferenceKind::Usage),
            "implementation" => Ok(ReferenceKind::Implementation),
            _ => anyhow::bail!("Unknown reference kind: {}", s),
        }
    }
}

/// A declaration, reference or implementation row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub kind: OccurrenceKind,
    pub symbol_id: SymbolKey,
    pub file_id: i64,
    pub file_seq: u32,
    pub reference_kind: Option<ReferenceKind>,
}

/// Split a path on runs of `/` or `\`, dropping empty segments.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty()).collect()
}

/// Normalize slashes in a path to single forward slashes.
pub fn normalize_path(path: &str) -> String {
    path_segments(path).join("/")
}
