//! Init command implementation.

use super::CommandResult;
use crate::config::WisdomConfig;
use crate::startup::prepare_filesystem;
use wisdom_core::Library;

/// Prepares directories, creates the library and applies migrations.
pub fn run(config: &WisdomConfig) -> CommandResult {
    prepare_filesystem(config)?;
    let library = Library::open_with_config(&config.db_path, config.store_config())?;
    let state = library.migration_state()?;

    println!("Initialized library at {}", config.db_path.display());
    println!("  Content root:   {}", config.content_root.display());
    println!("  Schema version: {}", state.current_version());
    for migration in &state.applied {
        println!("    v{}: {}", migration.version, migration.name);
    }
    println!("  Log head:       {}", library.head()?);
    Ok(())
}
