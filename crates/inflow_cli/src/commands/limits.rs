//! The `limits` command: query and display the current API budget for a
//! scope.

use std::sync::Arc;

use clap::ValueEnum;
use console::style;
use serde_json::json;
use uuid::Uuid;

use inflow::api::GraphClient;
use inflow::api::HttpGraphClient;
use inflow::limits::RateLimitConfig;

use crate::config::Config;

/// A budget-only query; costs nothing against the limit.
const LIMITS_QUERY: &str = "query { rateLimit { limit cost remaining resetAt used } }";

/// Output format for rate limit display.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as formatted text (default)
    #[default]
    Text,
    /// Display as JSON
    Json,
}

pub(crate) async fn handle_limits(
    scope: Uuid,
    output: OutputFormat,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.scope(scope).is_none() {
        return Err(format!("scope {scope} has no token configured").into());
    }

    let client = HttpGraphClient::new(&config.api.endpoint, Arc::new(config.credentials()))?;
    let envelope = client.execute(scope, LIMITS_QUERY, json!({})).await?;
    let block = envelope
        .rate_limit()
        .ok_or("upstream response did not include a rateLimit block")?;

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({
                "scope": scope,
                "limit": block.limit,
                "remaining": block.remaining,
                "used": block.used,
                "reset_at": block.reset_at,
            }))?);
        }
        OutputFormat::Text => {
            let thresholds = RateLimitConfig::default();
            let state = if block.remaining < thresholds.critical_threshold {
                style("critical").red()
            } else if block.remaining < thresholds.low_threshold {
                style("low").yellow()
            } else {
                style("healthy").green()
            };
            println!("scope     {scope}");
            println!("budget    {} / {} remaining ({state})", block.remaining, block.limit);
            println!("used      {}", block.used);
            println!("resets    {}", block.reset_at);
        }
    }
    Ok(())
}
