//! Upstream sync trigger.

use console::style;

use courier_core::config::AppConfig;
use courier_core::error::CourierResult;

use crate::OutputFormat;

pub async fn run(config: &AppConfig, format: OutputFormat) -> CourierResult<()> {
    let fetcher = super::create_fetcher(config)?;
    let triggered = fetcher.client().trigger_sync(fetcher.chat_id()).await?;

    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({ "chatId": fetcher.chat_id(), "triggered": triggered });
            println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        }
        OutputFormat::Text => {
            if triggered {
                println!("  {} upstream sync started", style("✓").green());
            } else {
                println!("  {} backend did not start a sync", style("✗").red());
            }
        }
    }
    Ok(())
}
