// Defensive programming lints - prevent panics and unsafe patterns
#![deny(clippy::indexing_slicing)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::fallible_impl_from)]
#![warn(clippy::wildcard_enum_match_arm)]
#![warn(clippy::fn_params_excessive_bools)]
// Idiomatic Rust lints
#![warn(clippy::needless_return)]
#![warn(clippy::let_and_return)]
#![warn(clippy::must_use_candidate)]
#![warn(clippy::redundant_closure_for_method_calls)]
#![warn(clippy::map_unwrap_or)]
#![warn(clippy::explicit_iter_loop)]

mod agents;
mod app;
mod config;
mod services;
mod storage;

use std::io::{self, BufRead, Write};

use color_eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use agents::AgentManager;
use app::chat::ChatEngine;
use services::routing::RoutingOptions;
use storage::SessionStore;

fn main() -> Result<()> {
    // Setup error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    // Load config
    let config = config::Config::load()?;

    // Check for command-line arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        return handle_cli_args(&args, &config);
    }

    let mut engine = build_engine(&config)?;
    info!("starting interactive chat");
    run_repl(&mut engine)
}

fn build_engine(config: &config::Config) -> Result<ChatEngine> {
    let manager = AgentManager::new(config)?;
    let store = SessionStore::open_default()?;
    let options = RoutingOptions {
        notebook_id: if config.context.notebook.trim().is_empty() {
            None
        } else {
            Some(config.context.notebook.clone())
        },
        ..RoutingOptions::default()
    };
    let avoidance = if config.context.avoidance.trim().is_empty() {
        None
    } else {
        Some(config.context.avoidance.clone())
    };
    ChatEngine::new(manager, store, options, avoidance)
}

fn handle_cli_args(args: &[String], config: &config::Config) -> Result<()> {
    let cmd = args
        .get(1)
        .ok_or_else(|| color_eyre::eyre::eyre!("No command provided"))?;
    let program_name = args.first().map_or("workos", String::as_str);

    match cmd.as_str() {
        "--help" | "-h" => print_help(program_name),
        "--version" | "-v" => println!("workos v0.1.0"),
        "context" => {
            // Assemble and print the context block for a message without
            // calling the LLM
            let message = args
                .get(2..)
                .map(|rest| rest.join(" "))
                .unwrap_or_default();
            if message.trim().is_empty() {
                return Err(color_eyre::eyre::eyre!(
                    "Usage: {} context <message>",
                    program_name
                ));
            }
            let engine = build_engine(config)?;
            let block = engine.build_context(&message);
            println!("{}", block.text);
            println!();
            println!("{:#?}", block.routing);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Run with --help for available commands.");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn print_help(program_name: &str) {
    println!("workos - Work-OS chat assistant");
    println!();
    println!("Usage: {} [command]", program_name);
    println!();
    println!("Commands:");
    println!("  context <message>  - Print the assembled context block and routing metadata");
    println!("  --help             - Show this help");
    println!("  --version          - Show version");
    println!();
    println!("Run without arguments to start interactive chat.");
    println!();
    println!("Chat commands:");
    println!("  /notebook <id>  - Pin routing to one notebook");
    println!("  /auto           - Return to automatic routing");
    println!("  /avoid <text>   - Set the avoidance summary ('/avoid' clears it)");
    println!("  /quit           - Exit");
}

fn run_repl(engine: &mut ChatEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    println!("workos chat - {} turns of history loaded. /quit to exit.", engine.history_len());

    loop {
        print!("you> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if let Some(command) = input.strip_prefix('/') {
            if handle_chat_command(engine, command)? {
                break;
            }
            continue;
        }

        match engine.send_message(input) {
            Ok(reply) => {
                println!("assistant> {}", reply.content);
                println!(
                    "  [routing: {} -> {}]",
                    reply.routing.mode.label(),
                    reply.routing.selected_notebook_ids.join(", ")
                );
                if reply.decomposed {
                    println!("  [answered via decompose_task]");
                }
            }
            Err(error) => {
                eprintln!("Error: {}", error);
            }
        }
    }
    Ok(())
}

/// Handles a `/command` line; returns true when the REPL should exit
fn handle_chat_command(engine: &mut ChatEngine, command: &str) -> Result<bool> {
    let mut parts = command.splitn(2, ' ');
    let name = parts.next().unwrap_or_default();
    let argument = parts.next().unwrap_or_default().trim();

    match name {
        "quit" | "exit" => return Ok(true),
        "notebook" => {
            if argument.is_empty() {
                match engine.pinned_notebook() {
                    Some(pinned) => println!("Pinned to '{}'. Use /auto to unpin.", pinned),
                    None => println!("No notebook pinned. Usage: /notebook <id>"),
                }
            } else {
                engine.pin_notebook(argument);
                println!("Routing pinned to '{}'", argument);
            }
        }
        "auto" => {
            engine.clear_pin();
            println!("Automatic routing restored");
        }
        "avoid" => {
            engine.set_avoidance(argument);
            if argument.is_empty() {
                println!("Avoidance context cleared");
            } else {
                println!("Avoidance context set");
            }
        }
        other => {
            println!("Unknown command: /{}", other);
        }
    }
    Ok(false)
}
