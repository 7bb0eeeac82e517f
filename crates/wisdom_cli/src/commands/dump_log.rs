//! Dump-log command implementation.

use super::{format_millis, open_library, CommandResult};
use crate::config::WisdomConfig;
use wisdom_core::SyncEvent;

/// Prints change-log events after `cursor`.
pub fn run(config: &WisdomConfig, cursor: i64, limit: Option<u32>, format: &str) -> CommandResult {
    if cursor < 0 {
        return Err("cursor must not be negative".into());
    }
    let library = open_library(config)?;

    let events = match limit {
        Some(limit) => library.events_since(cursor, limit)?,
        None => all_events(&library, cursor)?,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&events)?),
        _ => print_text(&events),
    }
    Ok(())
}

fn all_events(library: &wisdom_core::Library, mut cursor: i64) -> CommandResult<Vec<SyncEvent>> {
    let mut events = Vec::new();
    loop {
        let (page, has_more) = library.events_page(cursor, 500)?;
        if let Some(last) = page.last() {
            cursor = last.seq;
        }
        events.extend(page);
        if !has_more {
            return Ok(events);
        }
    }
}

fn print_text(events: &[SyncEvent]) {
    println!("Change log ({} events)", events.len());
    println!("==========");
    for event in events {
        println!(
            "[{:>8}] {:8} {:6} {} at {}",
            event.seq,
            event.entity_type.as_str(),
            event.operation.as_str(),
            event.entity_id,
            format_millis(event.created_at)
        );
    }
}
