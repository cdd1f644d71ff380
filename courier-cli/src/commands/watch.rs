//! Live watch over the sync service.

use std::collections::HashMap;

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use console::style;
use tracing::{info, warn};

use courier_core::config::AppConfig;
use courier_core::error::CourierResult;
use courier_models::Message;
use courier_sync::{global, ConnectionState, ConnectionStatus, SyncService, ThreadDirectory};

use crate::OutputFormat;

pub async fn run(config: &AppConfig, backlog: usize, format: OutputFormat) -> CourierResult<()> {
    let threads = ThreadDirectory::new();
    let fetcher = super::create_fetcher(config)?.with_hook(threads.clone());
    let chat_id = fetcher.chat_id().to_string();

    let service = SyncService::new(fetcher, &config.sync);
    if global::install(service.clone()).is_err() {
        warn!("a sync service was already installed; watching a private one");
    }

    if format == OutputFormat::Text {
        println!("{}", style(format!("Watching chat {chat_id}")).bold().underlined());
        println!("  {}", style("Press Ctrl-C to stop.").dim());
        println!();
    }

    let connection_sub = service.subscribe_to_connection(move |state| print_state(state, format));

    let mut seen: HashMap<String, Message> = HashMap::new();
    let mut first = true;
    let messages_sub = service.subscribe_to_messages(move |messages| {
        let fresh = diff_messages(&mut seen, messages);
        // The replayed snapshot only shows the tail.
        let skip = if first { fresh.len().saturating_sub(backlog) } else { 0 };
        first = false;
        for (message, edited) in fresh.into_iter().skip(skip) {
            print_message(&message, edited, format);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("interrupted, stopping sync");

    messages_sub.unsubscribe();
    connection_sub.unsubscribe();
    service.stop();

    match format {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "event": "stopped",
                "state": service.connection_state(),
                "messages": service.messages(None).len(),
                "threads": threads.threads(),
            });
            println!("{}", serde_json::to_string(&summary).unwrap_or_default());
        }
        OutputFormat::Text => {
            println!();
            println!("{}", style("Session").bold().underlined());
            println!("{}", service.diagnostics());
            if !threads.is_empty() {
                println!();
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .apply_modifier(UTF8_ROUND_CORNERS)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(vec!["Thread", "Messages", "Last Activity"]);
                for thread in threads.threads() {
                    table.add_row(vec![
                        thread.thread_id,
                        thread.message_count.to_string(),
                        thread.last_activity.format("%Y-%m-%d %H:%M:%S").to_string(),
                    ]);
                }
                println!("{table}");
            }
        }
    }

    Ok(())
}

/// Messages that are new or changed since the last snapshot, in order.
/// The flag marks edits of a message already shown.
fn diff_messages(seen: &mut HashMap<String, Message>, snapshot: &[Message]) -> Vec<(Message, bool)> {
    let mut fresh = Vec::new();
    for message in snapshot {
        match seen.get(&message.id) {
            Some(previous) if previous.same_content(message) => {}
            Some(_) => fresh.push((message.clone(), true)),
            None => fresh.push((message.clone(), false)),
        }
    }
    for (message, _) in &fresh {
        seen.insert(message.id.clone(), message.clone());
    }
    fresh
}

fn print_state(state: &ConnectionState, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let event = serde_json::json!({ "event": "connection", "state": state });
            println!("{}", serde_json::to_string(&event).unwrap_or_default());
        }
        OutputFormat::Text => {
            let label = state.status.to_string();
            let label = match state.status {
                ConnectionStatus::Connected => style(label).green(),
                ConnectionStatus::Error => style(label).red(),
                ConnectionStatus::Disconnected => style(label).dim(),
                ConnectionStatus::Connecting | ConnectionStatus::Syncing => style(label).yellow(),
            };
            match &state.error {
                Some(error) => println!(
                    "  {} {} ({}, attempt {})",
                    style("●").bold(),
                    label,
                    error,
                    state.reconnect_attempts
                ),
                None => println!("  {} {}", style("●").bold(), label),
            }
        }
    }
}

fn print_message(message: &Message, edited: bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let kind = if edited { "edited" } else { "message" };
            let event = serde_json::json!({
                "event": kind,
                "message": message,
            });
            println!("{}", serde_json::to_string(&event).unwrap_or_default());
        }
        OutputFormat::Text => super::print_message_line(message, edited),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: &str, secs: i64, text: &str) -> Message {
        Message::new(id, Utc.timestamp_opt(secs, 0).unwrap(), text)
    }

    #[test]
    fn test_diff_reports_new_and_edited_once() {
        let mut seen = HashMap::new();
        let first = diff_messages(&mut seen, &[msg("a", 1, "hi")]);
        assert_eq!(first.len(), 1);
        assert!(!first[0].1);

        let second = diff_messages(&mut seen, &[msg("a", 1, "hi!"), msg("b", 2, "yo")]);
        let flags: Vec<_> = second.iter().map(|(m, e)| (m.id.as_str(), *e)).collect();
        assert_eq!(flags, vec![("a", true), ("b", false)]);

        assert!(diff_messages(&mut seen, &[msg("a", 1, "hi!"), msg("b", 2, "yo")]).is_empty());
    }
}
