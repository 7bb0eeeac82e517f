//! Verify command implementation.

use super::{open_library, CommandResult};
use crate::config::WisdomConfig;

/// Audits the change log against the live tables.
pub fn run(config: &WisdomConfig) -> CommandResult {
    let library = open_library(config)?;
    println!("Verifying library at {}", config.db_path.display());

    let report = library.audit()?;
    println!("  Events checked: {}", report.events_checked);

    if report.is_consistent() {
        println!("✓ Change log is consistent");
        Ok(())
    } else {
        for violation in &report.violations {
            println!("  ✗ {}", violation);
        }
        println!("✗ {} violation(s) found", report.violations.len());
        Err("verification failed".into())
    }
}
