//! Parse command - translate a query into daemon syntax.

use ultrasearch_core::parser::strip_query_commands;
use ultrasearch_core::{Config, QueryParser};

/// Run the parse command.
pub fn run(config: Config, query: &str) -> anyhow::Result<()> {
    let parser = QueryParser::new(config.daemon.text_fields.iter().cloned());
    let parsed = parser.parse(query);

    println!("Query:     {}", parsed);
    println!("Excerpts:  {}", strip_query_commands(&parsed));

    if config.daemon.text_fields.is_empty() {
        eprintln!();
        eprintln!("No text fields configured; field restrictions are kept as plain terms.");
    }

    Ok(())
}
