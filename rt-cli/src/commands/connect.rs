//! Connect command - stream events from the realtime endpoint.

use std::time::Duration;

use console::style;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use rt_core::config::{endpoint_url, redact_endpoint, AppConfig, ConfigHandle};
use rt_core::error::RtResult;
use rt_socket::{ConnectionState, SocketEventType};

use crate::OutputFormat;

const CLOSE_WAIT: Duration = Duration::from_secs(5);

/// Run the connect command.
pub async fn run(
    config: ConfigHandle,
    address: Option<String>,
    token: Option<String>,
    save_config: bool,
    format: OutputFormat,
) -> RtResult<()> {
    let token = super::resolve_credentials(&config, address, token).await?;

    if save_config {
        let path = AppConfig::default_config_path()?;
        config.save_to(&path).await?;
        println!("  {} Config saved to {}", style("OK").green(), path.display());
    }

    let address = config.read().await.server.address.clone();
    println!(
        "{} Connecting to {}...",
        style("[1/2]").bold().dim(),
        redact_endpoint(&endpoint_url(&address, &token)?)
    );

    let manager = super::create_manager(&config).await;
    let mut rx = manager.dispatcher().subscribe();
    let mut state_rx = manager.state_receiver();
    manager.connect(token);

    println!(
        "{} Listening for events... (Ctrl+C to stop)",
        style("[2/2]").bold().dim(),
    );
    println!();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        println!("  {}", super::format_event(&ev, format));
                        if ev.event_type == SocketEventType::Kick {
                            println!(
                                "  {} Kicked by server; not reconnecting.",
                                style("WARN").yellow()
                            );
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        println!(
                            "  {} Missed {n} events (slow consumer)",
                            style("WARN").yellow()
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                if let OutputFormat::Text = format {
                    println!("  {} {}", style("state").dim(), style(state).cyan());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n  Disconnecting...");
                manager.disconnect();
                break;
            }
        }
    }

    if let Err(e) = manager.wait_for_state(ConnectionState::Closed, CLOSE_WAIT).await {
        warn!("connection did not close cleanly: {e}");
    }
    Ok(())
}
