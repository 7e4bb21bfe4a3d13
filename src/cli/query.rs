use anyhow::Result;

use sourceindex::config::Config;
use sourceindex::index::OccurrenceKind;
use sourceindex::query::QueryEngine;

use super::open_database;

pub fn query_index(config: &Config, query_type: &str, target: &str, format: &str, limit: usize) -> Result<()> {
    if !matches!(format, "text" | "json") {
        eprintln!("Unknown format: {}", format);
        std::process::exit(1);
    }

    let engine = QueryEngine::new(open_database(config)?);

    if query_type == "search" {
        let symbols = engine.search_symbols(target, limit)?;
        if format == "json" {
            println!("{}", serde_json::to_string_pretty(&symbols)?);
        } else if symbols.is_empty() {
            println!("No symbols match '{}'", target);
        } else {
            println!("Found {} symbols:", symbols.len());
            for symbol in symbols {
                println!("  {} ({}) {}", symbol.name, symbol.kind, symbol.id);
            }
        }
        return Ok(());
    }

    let kind = match OccurrenceKind::from_str(query_type) {
        Ok(kind) => kind,
        Err(_) => {
            eprintln!("Unknown query type: {}", query_type);
            eprintln!("Expected one of: declarations, references, implementations, search");
            std::process::exit(1);
        }
    };

    let results = engine.find_occurrences(kind, target)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("No {}s found for '{}'", kind.as_str(), target);
    } else {
        println!("Found {} {}s of {}:", results.len(), kind.as_str(), target);
        for result in results {
            match result.reference_kind {
                Some(reference_kind) => println!(
                    "  {}#{} ({})",
                    result.file_path,
                    result.anchor,
                    reference_kind.as_str()
                ),
                None => println!("  {}#{}", result.file_path, result.anchor),
            }
        }
    }

    Ok(())
}
