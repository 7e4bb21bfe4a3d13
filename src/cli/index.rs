use anyhow::Result;
use tracing::info;

use sourceindex::analyzer::{configured_analyzers, run_analyzer, LanguageAnalyzer};
use sourceindex::config::Config;

use super::open_database;

/// Run the analyzer configured for `language`. Returns its exit code.
pub async fn run_index(config: &Config, language: &str, args: Vec<String>) -> Result<i32> {
    let analyzers = configured_analyzers(config);
    let Some(analyzer) = analyzers.iter().find(|a| a.name().eq_ignore_ascii_case(language)) else {
        anyhow::bail!(
            "No analyzer configured for '{}'. Run 'sourceindex languages' to list configured analyzers.",
            language
        );
    };

    let db = open_database(config)?;

    println!("sourceindex v{}", env!("CARGO_PKG_VERSION"));
    println!("Language: {}", analyzer.name());
    println!("Analyzer: {}", analyzer.describe_options());
    println!("Database: {}", db.path().display());

    let before = db.get_stats()?;
    let status = run_analyzer(db.clone(), config, analyzer, &args).await?;
    let after = db.get_stats()?;

    info!("Analyzer finished: {}", status);
    println!("\nAnalyzer exited with {}", status);
    println!("  Files: {} -> {}", before.total_files, after.total_files);
    println!("  Symbols: {} -> {}", before.total_symbols, after.total_symbols);
    println!(
        "  Declarations: {} -> {}",
        before.total_declarations, after.total_declarations
    );

    Ok(status.code().unwrap_or(1))
}
