//! Classes command - show the entity-type to class id mapping.

use crate::app::App;
use std::path::PathBuf;
use ultrasearch_core::Config;

/// Run the classes command.
pub fn run(config: Config, conf: Option<PathBuf>) -> anyhow::Result<()> {
    let class_map = App::strict_class_map(&config, conf)?;

    if class_map.is_empty() {
        println!("No sources declared.");
        return Ok(());
    }

    println!("Class ids");
    println!("=========");
    for (name, id) in class_map.iter() {
        println!("  {:>4}  {}", id, name);
    }

    println!();
    println!(
        "Document ids are encoded as primary_key * {} + class_id",
        class_map.len()
    );

    Ok(())
}
