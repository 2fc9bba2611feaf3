//! `synapse-cli` – Synapse Command Line Interface
//!
//! The `synapse` binary runs one agent in the terminal.  It:
//!
//! 1. Loads `~/.synapse/config.toml`, writing the defaults on first run.
//! 2. Wires the chat, navigation, arm and scheduler modules to the decision
//!    cycle and starts the trigger dispatcher.
//! 3. Restores the agent's saved state when `state_db` is configured.
//! 4. Drops the user into a chat shell with slash-commands
//!    (`/help`, `/status`, `/context`, `/save`, `/quit`).
//! 5. On exit or **Ctrl-C**, stops the dispatcher and saves state.

mod agent;
mod config;
mod repl;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use tracing::warn;

use crate::agent::Agent;

fn main() -> ExitCode {
    // Before the Tokio runtime exists; the OTLP exporter is synchronous.
    let _telemetry = synapse_runtime::init_tracing("synapse");

    print_banner();

    let path = config::config_path();
    let cfg = match config::load_or_init(&path) {
        Ok((cfg, created)) => {
            let verb = if created { "Default config written to" } else { "Config loaded from" };
            println!("  {} {}", verb, path.display().to_string().bold());
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use /quit to exit cleanly");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start the async runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let entered = runtime.enter();
    let (agent, replies) = match Agent::start(&cfg) {
        Ok(started) => started,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start the agent".red(), e);
            return ExitCode::FAILURE;
        }
    };
    println!(
        "  Agent {} thinking with {} at {}",
        agent.name().bold(),
        cfg.decision_model.bold(),
        cfg.llm_base_url.dimmed()
    );
    println!("\n  Type {} for a list of commands.\n", "/help".bold().cyan());

    let printer = repl::spawn_printer(replies, agent.bus().subscribe());
    repl::run(&agent, &shutdown);
    printer.abort();
    drop(entered);

    match runtime.block_on(agent.shutdown()) {
        Ok(true) => println!("{}", "  ✓ Agent state saved.".green()),
        Ok(false) => {}
        Err(e) => {
            eprintln!("{}: {}", "Error saving state".red(), e);
            return ExitCode::FAILURE;
        }
    }
    println!("{}", "Goodbye.".green());
    ExitCode::SUCCESS
}

fn print_banner() {
    println!();
    println!("{}", r#"   _____                              "#.bold().cyan());
    println!("{}", r#"  / ___/__  ______  ____ _____  ________"#.bold().cyan());
    println!("{}", r#"  \__ \/ / / / __ \/ __ `/ __ \/ ___/ _ \"#.bold().cyan());
    println!("{}", r#" ___/ / /_/ / / / / /_/ / /_/ (__  )  __/"#.bold().cyan());
    println!("{}", r#"/____/\__, /_/ /_/\__,_/ .___/____/\___/ "#.bold().cyan());
    println!("{}", r#"     /____/           /_/                "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Synapse".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Reactive decision loop for multi-capability agents");
    println!();
}
