//! Send command - deliver a single frame and exit.

use std::time::Duration;

use console::style;
use tracing::warn;

use rt_core::config::ConfigHandle;
use rt_core::error::{RtError, RtResult};
use rt_socket::ConnectionState;

use crate::OutputFormat;

pub struct SendArgs {
    pub event_type: String,
    pub data: String,
    pub wait_ms: u64,
    pub address: Option<String>,
    pub token: Option<String>,
}

/// Run the send command.
pub async fn run(config: ConfigHandle, args: SendArgs, format: OutputFormat) -> RtResult<()> {
    let data: serde_json::Value = serde_json::from_str(&args.data)?;
    let token = super::resolve_credentials(&config, args.address, args.token).await?;

    let manager = super::create_manager(&config).await;
    manager.connect(token);
    let opened = manager
        .wait_for_state(ConnectionState::Open, Duration::from_millis(args.wait_ms))
        .await;

    let sent = opened.is_ok() && manager.send(&args.event_type, &data);

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "type": args.event_type, "sent": sent })
        ),
        OutputFormat::Text if sent => {
            println!("  {} Sent {}", style("OK").green().bold(), args.event_type)
        }
        OutputFormat::Text => println!(
            "  {} Could not send {} (connection {})",
            style("FAIL").red().bold(),
            args.event_type,
            manager.state()
        ),
    }

    manager.disconnect();
    if let Err(e) = manager
        .wait_for_state(ConnectionState::Closed, Duration::from_secs(5))
        .await
    {
        warn!("connection did not close cleanly: {e}");
    }

    match opened {
        Err(e) => Err(e),
        Ok(()) if !sent => Err(RtError::NotConnected),
        Ok(()) => Ok(()),
    }
}
