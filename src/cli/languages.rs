use sourceindex::analyzer::{configured_analyzers, LanguageAnalyzer};
use sourceindex::config::Config;

pub fn list_languages(config: &Config) {
    let analyzers = configured_analyzers(config);

    if analyzers.is_empty() {
        println!("No language analyzers configured.");
        println!("Add one to sourceindex.toml:");
        println!("\n  [analyzers.csharp]");
        println!("  command = \"csharp-analyzer\"");
        return;
    }

    println!("Configured language analyzers:");
    for analyzer in &analyzers {
        println!("  {:<12} {}", analyzer.name(), analyzer.describe_options());
    }
}
