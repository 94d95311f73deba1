//! `waypoint chat` - Interactive or single-message booking conversation.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use waypoint_config::AppConfig;
use waypoint_core::{ControlPayload, EventBody, ProtocolEvent, StateStore};
use waypoint_store::InMemoryStateStore;
use waypoint_workflow::Orchestrator;

pub async fn run(
    message: Option<String>,
    thread: String,
    ephemeral: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store: Arc<dyn StateStore> = if ephemeral {
        Arc::new(InMemoryStateStore::new())
    } else {
        waypoint_store::open(&config.store).await?
    };
    let store_name = store.name().to_string();
    let orchestrator = Orchestrator::from_config(config, store)?;

    if let Some(msg) = message {
        // Single message mode
        turn(&orchestrator, &thread, &msg).await?;
        return Ok(());
    }

    println!();
    println!("  Waypoint - interactive booking");
    println!();
    println!("  Thread:  {thread}");
    println!("  Store:   {store_name}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  /state shows the booking, /usage the turn report, 'exit' quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "exit" | "quit" => break,
            "/state" => print_state(&orchestrator, &thread).await?,
            "/usage" => print_usage(&orchestrator)?,
            text => {
                if let Err(e) = turn(&orchestrator, &thread, text).await {
                    eprintln!("  [Error] {e}");
                }
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

async fn turn(
    orchestrator: &Orchestrator,
    thread: &str,
    message: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut rx = orchestrator.stream_turn(thread, message).await?;
    let mut renderer = Renderer::default();
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        write!(stdout, "{}", renderer.render(&event))?;
        stdout.flush()?;
    }
    write!(stdout, "{}", renderer.finish())?;
    Ok(())
}

async fn print_state(
    orchestrator: &Orchestrator,
    thread: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(state) = orchestrator.thread_state(thread).await? else {
        println!("  (no conversation yet)");
        return Ok(());
    };
    let slots = serde_json::to_string_pretty(&state.slots)?;
    let booking = serde_json::to_string_pretty(&state.booking)?;
    println!("  Slots:   {slots}");
    println!("  Booking: {booking}");
    println!("  Events:  {}", state.event_cursor);
    Ok(())
}

fn print_usage(orchestrator: &Orchestrator) -> Result<(), Box<dyn std::error::Error>> {
    let Some(telemetry) = &orchestrator.services().telemetry else {
        println!("  Telemetry is disabled.");
        return Ok(());
    };
    let snapshot = telemetry.snapshot();
    println!("  Turns traced: {}", snapshot.trace_count);
    for (outcome, count) in &snapshot.outcomes {
        println!("    {outcome:<12} {count}");
    }
    for (node, stats) in &snapshot.nodes {
        println!(
            "    {node:<16} runs {:>3}  failures {:>2}  avg {:.1} ms",
            stats.runs,
            stats.failures,
            stats.avg_ms()
        );
    }
    Ok(())
}

/// Turns protocol events into terminal text. Streamed message pieces are
/// written inline; everything else gets its own line.
#[derive(Default)]
pub(crate) struct Renderer {
    streaming: bool,
}

impl Renderer {
    pub(crate) fn render(&mut self, event: &ProtocolEvent) -> String {
        let mut out = String::new();
        if let EventBody::Message(m) = &event.body {
            if m.is_stream {
                if !self.streaming {
                    out.push_str("  Waypoint > ");
                    self.streaming = true;
                }
                out.push_str(&m.content);
                return out;
            }
        }

        out.push_str(&self.finish());
        match &event.body {
            EventBody::Message(m) => {
                for line in m.content.lines() {
                    out.push_str(&format!("  Waypoint > {line}\n"));
                }
            }
            EventBody::Control(c) => out.push_str(&render_control(c)),
            EventBody::Status(s) => out.push_str(&format!("  … {}\n", s.content)),
            EventBody::Error(e) => out.push_str(&format!("  [Error] {}\n", e.message)),
        }
        out
    }

    /// Closes a streamed message that is still open.
    pub(crate) fn finish(&mut self) -> String {
        if std::mem::take(&mut self.streaming) {
            "\n".into()
        } else {
            String::new()
        }
    }
}

fn render_control(control: &ControlPayload) -> String {
    let kind = serde_json::to_value(control.kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let mut out = format!("  [{kind}]\n");
    for option in &control.options {
        let line = match (option.get("token"), option.get("title")) {
            (Some(token), Some(title)) => {
                let price = option.get("price").or_else(|| option.get("price_estimate"));
                format!(
                    "    {}  {}  ¥{}",
                    token.as_str().unwrap_or_default(),
                    title.as_str().unwrap_or_default(),
                    price.map(|p| p.to_string()).unwrap_or_else(|| "-".into())
                )
            }
            _ => format!("    {option}"),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}
