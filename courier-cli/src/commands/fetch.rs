//! One-shot page fetch.

use console::style;

use courier_core::config::AppConfig;
use courier_core::error::CourierResult;
use courier_models::Cursor;

use crate::OutputFormat;

pub async fn run(
    config: &AppConfig,
    after: Option<String>,
    limit: Option<u32>,
    format: OutputFormat,
) -> CourierResult<()> {
    let fetcher = super::create_fetcher(config)?;
    let cursor = after.map(Cursor::new);
    let limit = limit.unwrap_or(config.backend.page_size).max(1);

    let page = fetcher
        .client()
        .fetch_messages(fetcher.chat_id(), cursor.as_ref(), limit)
        .await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&page).unwrap_or_default());
        }
        OutputFormat::Text => {
            if page.is_empty() {
                println!("No messages.");
            } else {
                println!("{}", super::messages_table(&page.messages));
                println!("  {} messages", page.messages.len());
            }
            match &page.cursor {
                Some(next) => println!("  {} {}", style("next cursor:").dim(), next),
                None => println!("  {}", style("no cursor").dim()),
            }
        }
    }

    Ok(())
}
