use std::borrow::Cow::{self, Borrowed, Owned};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tokio::sync::mpsc;

use super::capabilities::template_registry;
use super::setup::{completion_service, load_config};
use cade_application::{DispatchEngine, DispatchResponse, TurnRequest};
use cade_execution::DispatchEvent;
use cade_infrastructure::InMemorySessionStore;

const COMMANDS: &[&str] = &["/metrics", "/state", "/reroute", "/use"];

/// Rustyline helper completing and highlighting slash commands.
#[derive(Clone)]
struct ChatHelper {
    commands: Vec<String>,
}

impl ChatHelper {
    fn new() -> Self {
        Self {
            commands: COMMANDS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Helper for ChatHelper {}

impl Completer for ChatHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        if !line.starts_with('/') {
            return Ok((0, vec![]));
        }
        let candidates = self
            .commands
            .iter()
            .filter(|cmd| cmd.starts_with(line))
            .map(|cmd| Pair {
                display: cmd.clone(),
                replacement: cmd.clone(),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Highlighter for ChatHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for ChatHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];
        if line.starts_with('/') && !line.contains(' ') {
            self.commands
                .iter()
                .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
                .map(|cmd| cmd[line.len()..].to_string())
        } else {
            None
        }
    }
}

impl Validator for ChatHelper {}

fn print_response(response: &DispatchResponse) {
    for line in response.response.lines() {
        println!("{}", line.bright_blue());
    }

    let summary = match &response.pattern {
        Some(pattern) => format!(
            "{} [{}] | effectiveness {:.2} | {}ms",
            pattern.kind,
            pattern.tools.join(", "),
            response.effectiveness,
            response.total_time_ms
        ),
        None => format!("cached | {}ms", response.total_time_ms),
    };
    println!("{}", summary.bright_black());
    if !response.predicted_next.is_empty() {
        println!(
            "{}",
            format!("next: {}", response.predicted_next.join(", ")).bright_black()
        );
    }
    println!();
}

fn print_event(event: &DispatchEvent) {
    let fields = if event.fields.is_empty() {
        String::new()
    } else {
        serde_json::to_string(&event.fields).unwrap_or_default()
    };
    println!(
        "{}",
        format!("  [{} {}] {} {}", event.level, event.target, event.message, fields).bright_black()
    );
}

/// Runs the interactive dispatch loop.
pub async fn run(
    explicit: Option<&Path>,
    session: Option<String>,
    events: Option<mpsc::UnboundedReceiver<DispatchEvent>>,
) -> Result<()> {
    let (_, config) = load_config(explicit)?;
    let completion = completion_service(&config);
    let engine = DispatchEngine::new(
        config,
        completion,
        Arc::new(template_registry()),
        Arc::new(InMemorySessionStore::new()),
    );

    let event_printer = events.map(|mut rx| {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                print_event(&event);
            }
        })
    });

    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut requested: Option<String> = None;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ChatHelper::new()));

    println!("{}", "=== CADE chat ===".bright_magenta().bold());
    println!("{}", format!("session {session_id}").bright_black());
    println!(
        "{}",
        "Commands: /use <capability>, /reroute <message>, /state, /metrics, quit".bright_black()
    );
    println!();

    loop {
        match rl.readline(">> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed == "quit" || trimmed == "exit" {
                    println!("{}", "Goodbye!".bright_green());
                    break;
                }
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                let request = if trimmed == "/metrics" {
                    let metrics = engine.metrics().await;
                    println!("{}", serde_json::to_string_pretty(&metrics)?.yellow());
                    continue;
                } else if trimmed == "/state" {
                    match engine.session_context(&session_id).await {
                        Some(ctx) => println!("{}", serde_json::to_string_pretty(&ctx)?.yellow()),
                        None => println!("{}", "No turns yet.".yellow()),
                    }
                    continue;
                } else if let Some(rest) = trimmed.strip_prefix("/use") {
                    let name = rest.trim();
                    requested = (!name.is_empty()).then(|| name.to_string());
                    match &requested {
                        Some(name) => println!("{}", format!("Requesting {name}").yellow()),
                        None => println!("{}", "Capability request cleared".yellow()),
                    }
                    continue;
                } else if let Some(rest) = trimmed.strip_prefix("/reroute") {
                    let message = rest.trim();
                    if message.is_empty() {
                        println!("{}", "Usage: /reroute <message>".yellow());
                        continue;
                    }
                    TurnRequest::new(session_id.as_str(), message).rerouted()
                } else {
                    TurnRequest::new(session_id.as_str(), trimmed)
                };

                let request = match &requested {
                    Some(name) => request.with_requested_capability(name.as_str()),
                    None => request,
                };
                println!("{}", format!("> {trimmed}").green());
                let response = engine.handle_turn(request).await;
                print_response(&response);
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'quit' to exit.".yellow());
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {err:?}").red());
                break;
            }
        }
    }

    if let Some(printer) = event_printer {
        printer.abort();
    }
    Ok(())
}
