//! Status command - show the resolved configuration without connecting.

use console::style;

use rt_core::config::{endpoint_url, redact_endpoint, AppConfig, ConfigHandle};
use rt_core::error::RtResult;
use rt_core::platform::Platform;

use crate::OutputFormat;

/// Run the status command.
pub async fn run(config: ConfigHandle, format: OutputFormat) -> RtResult<()> {
    let cfg = config.read().await;
    let config_path = AppConfig::default_config_path().ok();

    let endpoint = if cfg.is_server_configured() {
        let token = cfg.server.token.as_deref().unwrap_or_default();
        endpoint_url(&cfg.server.address, token)
            .map(|url| redact_endpoint(&url))
            .map_err(|e| e.to_string())
    } else {
        Err("no server address configured".to_string())
    };
    let has_token = cfg.server.token.as_deref().is_some_and(|t| !t.is_empty());
    let rt = &cfg.realtime;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "platform": Platform::current().name(),
                "config_path": config_path.as_ref().map(|p| p.display().to_string()),
                "server_address": cfg.server.address,
                "endpoint": endpoint.as_ref().ok(),
                "endpoint_error": endpoint.as_ref().err(),
                "token_configured": has_token,
                "heartbeat_interval_ms": rt.heartbeat_interval_ms,
                "pong_timeout_ms": rt.pong_timeout_ms,
                "reconnect_base_delay_ms": rt.reconnect_base_delay_ms,
                "reconnect_max_delay_ms": rt.reconnect_max_delay_ms,
                "reconnect_jitter": rt.reconnect_jitter,
                "max_reconnect_attempts": rt.max_reconnect_attempts,
            });
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
        OutputFormat::Text => {
            println!("{}", style("Realtime Status").bold().underlined());
            println!();
            println!("  Platform:    {}", Platform::current());
            if let Some(path) = &config_path {
                println!("  Config:      {}", path.display());
            }
            match &endpoint {
                Ok(url) => println!("  Endpoint:    {}", style(url).cyan()),
                Err(e) => println!("  Endpoint:    {}", style(e).red()),
            }
            println!(
                "  Token:       {}",
                if has_token {
                    style("configured").green()
                } else {
                    style("missing").yellow()
                }
            );
            println!("  Heartbeat:   every {} ms", rt.heartbeat_interval_ms);
            println!(
                "  Watchdog:    {}",
                if rt.pong_timeout_ms > 0 {
                    format!("{} ms", rt.pong_timeout_ms)
                } else {
                    "off".to_string()
                }
            );
            println!(
                "  Backoff:     {} ms doubling to {} ms, {} attempts",
                rt.reconnect_base_delay_ms,
                rt.reconnect_max_delay_ms,
                if rt.max_reconnect_attempts == 0 {
                    "unlimited".to_string()
                } else {
                    rt.max_reconnect_attempts.to_string()
                }
            );
        }
    }

    Ok(())
}
