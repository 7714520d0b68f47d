use pm_client::{Exchange, ExchangeOutcome};
use pm_state::AppState;
use std::fmt::Write;

pub fn platforms(state: &AppState) -> String {
    let mut out = String::new();
    let Some(platforms) = state.platforms().platforms() else {
        return "Loading platforms...\n".to_string();
    };
    if platforms.is_empty() {
        return "No platforms found.\n".to_string();
    }
    for platform in platforms {
        let _ = writeln!(out, "{} ({})", platform.name(), platform.uuid());
        match platform.agents {
            None => out.push_str("  Loading agents...\n"),
            Some([]) => out.push_str("  No agents installed.\n"),
            Some(agents) => {
                for agent in agents {
                    let state = agent.display_state();
                    let _ = write!(out, "  {:<24} {:<38} {}", agent.name(), agent.uuid(), state);
                    match state.available_action() {
                        Some(action) => {
                            let _ = writeln!(out, " [{action}]");
                        }
                        None => out.push('\n'),
                    }
                }
            }
        }
    }
    out
}

pub fn exchange(exchange: &Exchange) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} {}",
        exchange.initiated_at.format("%H:%M:%S%.3f"),
        exchange.method,
        exchange.id
    );
    let _ = writeln!(out, "{}", pretty(&exchange.request));
    let status = match &exchange.outcome {
        ExchangeOutcome::Pending => "pending".to_string(),
        ExchangeOutcome::Result(value) => pretty(value),
        ExchangeOutcome::RpcError(error) => format!("rpc error: {error}"),
        ExchangeOutcome::TransportError(error) => format!("transport error: {error}"),
        ExchangeOutcome::ProtocolError(message) => format!("protocol error: {message}"),
    };
    match exchange.latency_ms() {
        Some(latency) => {
            let _ = writeln!(out, "=> ({latency} ms) {status}");
        }
        None => {
            let _ = writeln!(out, "=> {status}");
        }
    }
    out
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
