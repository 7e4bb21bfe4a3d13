use anyhow::Result;

use sourceindex::config::Config;
use sourceindex::query::QueryEngine;

use super::open_database;

/// Print a stored file's content, or list a folder
pub fn show_path(config: &Config, path: &str) -> Result<()> {
    let engine = QueryEngine::new(open_database(config)?);

    if let Some(file) = engine.file_content(path)? {
        match file.content {
            Some(content) => println!("{}", content),
            None => eprintln!("File '{}' has not been finalized", path),
        }
        return Ok(());
    }

    let Some(listing) = engine.list_folder(path)? else {
        eprintln!("Nothing indexed at '{}'", path);
        std::process::exit(1);
    };

    let marker = if listing.folder.is_project { " (project)" } else { "" };
    println!("{}{}", listing.folder.name, marker);
    for folder in &listing.folders {
        let marker = if folder.is_project { " (project)" } else { "" };
        println!("  {}/{}", folder.name, marker);
    }
    for file in &listing.files {
        println!(
            "  {}  {} lines, {} bytes{}",
            file.name,
            file.line_count,
            file.length,
            file.indexed_at
                .as_deref()
                .map(|at| format!(", indexed {}", at))
                .unwrap_or_default()
        );
    }

    Ok(())
}
