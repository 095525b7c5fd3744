//! Listen command - hold the event socket open and print what arrives.

use console::style;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use pl_core::config::ConfigHandle;
use pl_core::error::{PlError, PlResult};
use pl_socket::{EventName, LifecycleEvent, SocketEvent, SocketManager};

use crate::OutputFormat;

/// Longest raw payload echoed on one line in text mode.
const MAX_PAYLOAD_CHARS: usize = 120;

/// Run the listen command.
pub async fn run(
    config: ConfigHandle,
    extra_events: Vec<String>,
    no_catalogue: bool,
    format: OutputFormat,
) -> PlResult<()> {
    super::ensure_client_secret(&config).await?;

    let mut cfg = config.snapshot().await;
    cfg.subscriptions.extra_events.extend(extra_events);
    if no_catalogue {
        cfg.subscriptions.subscribe_catalogue = false;
    }

    let manager = SocketManager::from_config(&cfg)?;
    let mut events = manager.events();
    let mut lifecycle = manager.lifecycle();
    let declared = manager.subscribed_events().await.len();

    if format == OutputFormat::Text {
        println!(
            "{} Authenticating with {}...",
            style("[1/2]").bold().dim(),
            cfg.server.auth_url
        );
    }

    match manager.connect().await {
        Ok(()) => {
            if format == OutputFormat::Text {
                println!(
                    "{} Connected to {}.",
                    style("[2/2]").bold().dim(),
                    manager.endpoint()
                );
                println!(
                    "  {} Listening for {declared} event(s). Press Ctrl+C to stop.",
                    style("OK").green().bold()
                );
            }
        }
        Err(e) => {
            // The session keeps retrying in the background.
            if format == OutputFormat::Text {
                println!(
                    "  {} {e}; retrying in the background. Press Ctrl+C to stop.",
                    style("WARN").yellow().bold()
                );
            }
        }
    }

    let outcome = loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => print_event(&event, format),
                Err(RecvError::Lagged(n)) => warn!("output fell behind, skipped {n} event(s)"),
                Err(RecvError::Closed) => break Ok(()),
            },
            change = lifecycle.recv() => match change {
                Ok(LifecycleEvent::ReconnectFailed { attempts }) => {
                    print_lifecycle(&LifecycleEvent::ReconnectFailed { attempts }, format);
                    break Err(PlError::ReconnectExhausted { attempts });
                }
                Ok(change) => print_lifecycle(&change, format),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, disconnecting");
                break Ok(());
            }
        }
    };

    manager.disconnect().await;
    if format == OutputFormat::Text {
        println!("Disconnected.");
    }
    outcome
}

fn print_event(event: &SocketEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let line = serde_json::json!({
                "type": "event",
                "event": event.event.as_str(),
                "data": event.data,
                "received_at": event.received_at.to_rfc3339(),
            });
            println!("{line}");
        }
        OutputFormat::Text => {
            println!(
                "{} {} {}",
                style(event.received_at.format("%H:%M:%S")).dim(),
                style(event.event.as_str()).cyan().bold(),
                describe_event(event)
            );
        }
    }
}

fn print_lifecycle(change: &LifecycleEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let mut line = serde_json::json!({ "type": "lifecycle", "kind": change.label() });
            match change {
                LifecycleEvent::Disconnected { code, reason } => {
                    line["code"] = serde_json::json!(code);
                    line["reason"] = serde_json::json!(reason);
                }
                LifecycleEvent::Error { message, recoverable } => {
                    line["message"] = serde_json::json!(message);
                    line["recoverable"] = serde_json::json!(recoverable);
                }
                LifecycleEvent::Reconnecting { attempt, delay } => {
                    line["attempt"] = serde_json::json!(attempt);
                    line["delay_ms"] = serde_json::json!(delay.as_millis() as u64);
                }
                LifecycleEvent::ReconnectFailed { attempts } => {
                    line["attempts"] = serde_json::json!(attempts);
                }
                LifecycleEvent::Connected => {}
            }
            println!("{line}");
        }
        OutputFormat::Text => {
            let label = format!("[{}]", change.label());
            match change {
                LifecycleEvent::Connected => {
                    println!("{} socket open", style(&label).green().bold());
                }
                LifecycleEvent::Disconnected { code, reason } => {
                    let code = code.map(|c| c.to_string()).unwrap_or_else(|| "-".into());
                    println!("{} code {code} {reason}", style(&label).yellow().bold());
                }
                LifecycleEvent::Error { message, .. } => {
                    println!("{} {message}", style(&label).red().bold());
                }
                LifecycleEvent::Reconnecting { attempt, delay } => {
                    println!(
                        "{} attempt {attempt} in {}s",
                        style(&label).yellow().bold(),
                        delay.as_secs()
                    );
                }
                LifecycleEvent::ReconnectFailed { attempts } => {
                    println!(
                        "{} gave up after {attempts} attempt(s)",
                        style(&label).red().bold()
                    );
                }
            }
        }
    }
}

/// One-line summary of an event payload.
fn describe_event(event: &SocketEvent) -> String {
    let typed = match event.event {
        EventName::ChannelFollow => event.as_follow().map(|f| format!("{} followed", f.username)),
        EventName::ChannelUnfollow => {
            event.as_follow().map(|f| format!("{} unfollowed", f.username))
        }
        EventName::ChatMessage => event
            .as_chat_message()
            .map(|m| format!("<{}> {}", m.username, m.content)),
        EventName::Raid => event
            .as_raid()
            .map(|r| format!("raid from {} with {} viewer(s)", r.from_channel, r.viewers)),
        EventName::LivestreamViewerCount => event
            .as_viewer_count()
            .map(|v| format!("{} viewer(s)", v.viewers)),
        _ => None,
    };
    typed.unwrap_or_else(|| super::truncate(&event.data.to_string(), MAX_PAYLOAD_CHARS))
}
