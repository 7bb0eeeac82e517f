//! Status command implementation.

use super::CommandResult;
use crate::config::WisdomConfig;
use serde::Serialize;
use wisdom_core::{Check, Diagnostics, Library, LibraryStats};

/// Readiness report.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Overall status.
    pub status: String,
    /// Individual checks.
    pub diagnostics: Diagnostics,
    /// Row counts, when the library could be opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<LibraryStats>,
}

/// Reports whether the library is ready to serve traffic.
pub fn run(config: &WisdomConfig, format: &str) -> CommandResult {
    let store = config.store_config().create_if_missing(false);
    let (mut diagnostics, stats) = match Library::open_with_config(&config.db_path, store) {
        Ok(library) => (library.diagnostics(), library.stats().ok()),
        Err(e) => {
            let mut diagnostics = Diagnostics::default();
            diagnostics.push(Check::error("database", e.to_string()));
            (diagnostics, None)
        }
    };
    diagnostics.push(content_root_check(config));

    let report = StatusReport {
        status: diagnostics.status().to_string(),
        diagnostics,
        stats,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }

    if report.diagnostics.is_ok() {
        Ok(())
    } else {
        Err(format!("library is not ready ({})", report.status).into())
    }
}

fn content_root_check(config: &WisdomConfig) -> Check {
    let root = &config.content_root;
    if root.is_dir() {
        Check::ok("content_root", root.display().to_string())
    } else if root.exists() {
        Check::error("content_root", format!("not a directory: {}", root.display()))
    } else {
        Check::degraded("content_root", format!("missing: {}", root.display()))
    }
}

fn print_text(report: &StatusReport) {
    println!("Status: {}", report.status);
    for check in &report.diagnostics.checks {
        println!("  {:14} {:9} {}", check.name, check.status.as_str(), check.message);
    }
    if let Some(stats) = &report.stats {
        println!();
        println!("  Documents:  {}", stats.documents);
        println!("  Backlinks:  {}", stats.backlinks);
        println!("  Tombstones: {}", stats.tombstones);
        println!("  Events:     {} (head {})", stats.events, stats.head);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wisdom_core::HealthStatus;

    #[test]
    fn content_root_states() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WisdomConfig {
            data_dir: dir.path().to_path_buf(),
            db_path: dir.path().join("wisdom.db"),
            content_root: dir.path().to_path_buf(),
            pull_batch: 100,
            adapters: Vec::new(),
        };
        assert_eq!(content_root_check(&config).status, HealthStatus::Ok);

        config.content_root = dir.path().join("absent");
        assert_eq!(content_root_check(&config).status, HealthStatus::Degraded);

        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        config.content_root = file;
        assert_eq!(content_root_check(&config).status, HealthStatus::Error);
    }
}
