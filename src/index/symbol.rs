//! Content-addressed symbol identity.
//!
//! A symbol's key is a 20-byte BLAKE3 digest of its normalized name, where the
//! normalized name is the raw analyzer name prefixed with the owning language.
//! The key is only an identifier; it is assumed collision-free, and a stored
//! symbol whose key matches but whose name differs is reported as
//! [`StoreError::SymbolCollision`] instead of being merged.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use super::{Occurrence, OccurrenceKind};
use crate::error::StoreError;

/// Width of a symbol key in bytes
pub const SYMBOL_KEY_LEN: usize = 20;

/// Fixed-width symbol identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolKey([u8; SYMBOL_KEY_LEN]);

impl SymbolKey {
    /// Hash a normalized symbol name into its key
    pub fn for_name(normalized_name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(normalized_name.as_bytes());
        let mut bytes = [0u8; SYMBOL_KEY_LEN];
        hasher.finalize_xof().fill(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SYMBOL_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SYMBOL_KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != SYMBOL_KEY_LEN * 2 || !s.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; SYMBOL_KEY_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolKey({})", self.to_hex())
    }
}

impl Serialize for SymbolKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SymbolKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SymbolKey::from_hex(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid symbol key: {}", s)))
    }
}

impl ToSql for SymbolKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(&self.0[..]))
    }
}

impl FromSql for SymbolKey {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let blob = value.as_blob()?;
        let bytes: [u8; SYMBOL_KEY_LEN] = blob.try_into().map_err(|_| FromSqlError::InvalidBlobSize {
            expected_size: SYMBOL_KEY_LEN,
            blob_size: blob.len(),
        })?;
        Ok(Self(bytes))
    }
}

/// Prefix a raw symbol name with its language so identical names from
/// different languages never share a key.
pub fn normalize_symbol_name(language: &str, raw_name: &str) -> String {
    format!("{}:{}", language, raw_name)
}

/// Prefix a raw symbol kind with its language.
pub fn normalize_symbol_kind(language: &str, raw_kind: &str) -> String {
    format!("{}:{}", language, raw_kind)
}

/// Create the symbol if absent, or update its kind if it changed.
///
/// Safe to call any number of times for the same symbol. Fails with
/// [`StoreError::SymbolCollision`] if the key is already taken by another name.
pub fn upsert_symbol(conn: &Connection, key: &SymbolKey, name: &str, kind: &str) -> Result<(), StoreError> {
    let stored: Option<(String, String)> = conn
        .query_row("SELECT name, kind FROM symbols WHERE id = ?1", [key], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .optional()?;

    match stored {
        None => {
            debug!("Creating symbol {} ({})", name, key);
            conn.execute(
                "INSERT INTO symbols (id, name, kind) VALUES (?1, ?2, ?3)",
                params![key, name, kind],
            )?;
        }
        Some((stored_name, _)) if stored_name != name => {
            return Err(StoreError::SymbolCollision {
                key: *key,
                stored: stored_name,
                incoming: name.to_string(),
            });
        }
        Some((_, stored_kind)) if stored_kind != kind => {
            debug!("Updating kind of {} from {} to {}", name, stored_kind, kind);
            conn.execute("UPDATE symbols SET kind = ?1 WHERE id = ?2", params![kind, key])?;
        }
        Some(_) => {}
    }

    Ok(())
}

/// Record a declaration, reference or implementation row.
pub fn insert_occurrence(conn: &Connection, occurrence: &Occurrence) -> Result<(), StoreError> {
    match occurrence.kind {
        OccurrenceKind::Reference => {
            let reference_kind = occurrence.reference_kind.unwrap_or_default();
            conn.execute(
                "INSERT INTO symbol_references (symbol_id, file_id, file_seq, reference_kind)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    occurrence.symbol_id,
                    occurrence.file_id,
                    occurrence.file_seq,
                    reference_kind.as_str()
                ],
            )?;
        }
        kind => {
            let sql = format!(
                "INSERT INTO {} (symbol_id, file_id, file_seq) VALUES (?1, ?2, ?3)",
                kind.table()
            );
            conn.execute(&sql, params![occurrence.symbol_id, occurrence.file_id, occurrence.file_seq])?;
        }
    }

    debug!(
        "Recorded {} {} of {} in file {}",
        occurrence.kind.as_str(),
        occurrence.file_seq,
        occurrence.symbol_id,
        occurrence.file_id
    );
    Ok(())
}
