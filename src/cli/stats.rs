use anyhow::Result;
use std::path::Path;

use sourceindex::config::Config;
use sourceindex::query::QueryEngine;

use super::open_database;

pub fn show_stats(config: &Config, kinds: bool) -> Result<()> {
    let db = open_database(config)?;
    let db_path = db.path().to_path_buf();
    let engine = QueryEngine::new(db);

    println!("sourceindex statistics v{}", env!("CARGO_PKG_VERSION"));
    println!("Database: {}", db_path.display());

    let stats = engine.stats()?;

    println!("\n📊 Index Statistics:");
    println!("  Projects: {}", stats.total_projects);
    println!("  Folders: {}", stats.total_folders);
    println!("  Files: {}", stats.total_files);
    println!("  Symbols: {}", stats.total_symbols);
    println!("  Declarations: {}", stats.total_declarations);
    println!("  References: {}", stats.total_references);
    println!("  Implementations: {}", stats.total_implementations);
    println!("  Styles: {}", stats.total_styles);

    let db_size = get_db_size(&db_path)?;
    println!("  Index size: {:.2} MB", db_size);

    if kinds {
        let symbols_by_kind = engine.symbols_by_kind()?;
        if !symbols_by_kind.is_empty() {
            println!("\n📈 Symbols by kind:");
            for (kind, count) in symbols_by_kind {
                println!("    {}: {}", kind, count);
            }
        }
    }

    Ok(())
}

fn get_db_size(db_path: &Path) -> Result<f64> {
    let metadata = std::fs::metadata(db_path)?;
    let size_bytes = metadata.len() as f64;
    Ok(size_bytes / (1024.0 * 1024.0))
}
