//! REPL – the interactive chat shell.
//!
//! Plain lines go to the agent as user chat.  Slash-commands:
//!   /help         – show this list
//!   /status       – dispatcher and decision-lock state
//!   /context      – the ordered context the next cycle would see
//!   /save         – save agent state now
//!   /quit | /exit – save and exit

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use synapse_runtime::DispatchState;
use synapse_types::{Activity, ActivityKind};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::agent::Agent;

/// What the shell should do with one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Help,
    Status,
    Context,
    Save,
    Quit,
    Unknown(&'a str),
    Say(&'a str),
    Empty,
}

pub fn parse(line: &str) -> Command<'_> {
    let line = line.trim();
    match line {
        "" => Command::Empty,
        "/help" => Command::Help,
        "/status" => Command::Status,
        "/context" => Command::Context,
        "/save" => Command::Save,
        "/quit" | "/exit" => Command::Quit,
        other if other.starts_with('/') => Command::Unknown(other),
        text => Command::Say(text),
    }
}

/// Run the shell until `/quit`, end of input, Ctrl-C or `shutdown`.
pub fn run(agent: &Agent, shutdown: &Arc<AtomicBool>) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {}", "Terminal error".red(), e);
            return;
        }
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let line = match editor.readline("synapse> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };
        if !line.trim().is_empty() {
            editor.add_history_entry(line.as_str()).ok();
        }

        match parse(&line) {
            Command::Empty => {}
            Command::Help => cmd_help(),
            Command::Status => cmd_status(agent),
            Command::Context => cmd_context(agent),
            Command::Save => cmd_save(agent),
            Command::Quit => break,
            Command::Unknown(other) => println!(
                "{} '{}'. Type {} for available commands.",
                "Unknown command:".red(),
                other.yellow(),
                "/help".bold()
            ),
            Command::Say(text) => {
                if let Err(e) = agent.say(text) {
                    println!("{}: {}", "Message not delivered".red(), e);
                }
            }
        }
    }
}

/// Print chat replies and notable activity as they arrive.
pub fn spawn_printer(
    mut replies: mpsc::UnboundedReceiver<String>,
    mut activity: broadcast::Receiver<Activity>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                reply = replies.recv() => match reply {
                    Some(text) => println!("\n{} {}", "robot>".bold().green(), text),
                    None => break,
                },
                record = activity.recv() => match record {
                    Ok(record) => print_activity(&record.kind),
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    })
}

fn print_activity(kind: &ActivityKind) {
    match kind {
        ActivityKind::Thought(thought) => println!("  {}", format!("({thought})").dimmed()),
        ActivityKind::ActionSuppressed { capability } => println!(
            "  {}",
            format!("`{capability}` withheld: chosen too many times in a row").yellow()
        ),
        ActivityKind::CycleFailed { reason, .. } => {
            println!("  {}", format!("decision failed: {reason}").red())
        }
        ActivityKind::SummaryApplied {
            events_before,
            events_after,
        } => println!(
            "  {}",
            format!("history compressed: {events_before} → {events_after} events").dimmed()
        ),
        _ => {}
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Synapse Commands".bold().underline());
    println!("  {}        – dispatcher and lock state", "/status".bold().cyan());
    println!("  {}       – show the current ordered context", "/context".bold().cyan());
    println!("  {}          – save agent state now", "/save".bold().cyan());
    println!("  {}  – save and exit", "/quit  /exit".bold().cyan());
    println!("  Anything else is sent to the agent as a chat message.");
    println!();
}

fn cmd_status(agent: &Agent) {
    let status = agent.status();
    let lock = agent.cycle().lock().state();
    let state = match status.state {
        DispatchState::Idle => "idle".green(),
        DispatchState::Busy => "busy".yellow(),
    };
    println!("{}", format!("Agent `{}`", agent.name()).bold().underline());
    println!("  Dispatcher   : {} ({} in flight)", state, status.in_flight);
    println!(
        "  Cycles       : {} completed, {} failed, {} triggers rejected",
        status.cycles_completed, status.cycles_failed, status.triggers_rejected
    );
    println!(
        "  Decision lock: {} running, {}/{} waiting",
        if lock.active { "1" } else { "0" },
        lock.waiting,
        lock.max_waiters
    );
    println!("  History      : {} events", agent.cycle().registry().total_events());
    println!(
        "  Persistence  : {}",
        if agent.has_persistence() { "on".green() } else { "off".dimmed() }
    );
}

fn cmd_context(agent: &Agent) {
    match agent.context().and_then(|c| c.to_json_pretty()) {
        Ok(json) => println!("{json}"),
        Err(e) => println!("{}: {}", "Context unavailable".red(), e),
    }
}

fn cmd_save(agent: &Agent) {
    match agent.save() {
        Ok(true) => println!("{}", "✓ Agent state saved.".green()),
        Ok(false) => println!(
            "{}",
            "Persistence is off; set `state_db` in ~/.synapse/config.toml.".yellow()
        ),
        Err(e) => println!("{}: {}", "Error saving state".red(), e),
    }
}
