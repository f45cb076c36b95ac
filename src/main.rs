//! Argus - continuous query engine over streaming tuples
//!
//! This is the main entry point for the Argus command-line interface: a
//! line-oriented loop that registers standing queries and feeds tuples into
//! the engine, printing complete solutions as JSON.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use argus::core::now_millis;
use argus::engine::{Engine, EngineConfig};
use argus::parsing::PatternParser;

#[derive(Parser, Debug)]
#[command(name = "argus")]
#[command(about = "Continuous query engine over streaming tuples", long_about = None)]
struct Args {
    /// Run the background expiration sweepers.
    #[arg(long, default_value_t = true)]
    background_sweep: bool,

    /// Upper bound, in milliseconds, on sweeper sleep between checks.
    #[arg(long, default_value_t = 1000)]
    sweep_interval_ms: u64,

    /// Maximum number of registered queries (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    max_queries: usize,
}

const HELP: &str = "\
commands:
  register <id> <ttl-seconds> <pattern>   register a standing query
  ingest <ttl-seconds> <value> ...        ingest one tuple
  retract <value-or-_> ...                retract tuples (_ = wildcard)
  unregister <id>                         remove a standing query
  evict                                   evict everything expired right now
  help                                    show this help
  quit                                    exit

pattern syntax: `?x <knows> ?y ; ?y <knows> ?z` (variables `?name`,
constants bare or `<bracketed>`, tuple patterns separated by `;`)";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = EngineConfig {
        background_sweep: args.background_sweep,
        max_sweep_interval: Duration::from_millis(args.sweep_interval_ms.max(1)),
        max_queries: (args.max_queries > 0).then_some(args.max_queries),
    };
    let engine: Arc<Engine<String, String>> = Arc::new(Engine::with_config(config));
    let parser = PatternParser::new()?;

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })?;

    println!("Argus continuous query engine. Type 'help' for commands.");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    while running.load(Ordering::SeqCst) {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "register" => {
                let Some((id, rest)) = rest.split_once(char::is_whitespace) else {
                    eprintln!("usage: register <id> <ttl-seconds> <pattern>");
                    continue;
                };
                let Some((ttl, pattern_text)) = rest.trim().split_once(char::is_whitespace) else {
                    eprintln!("usage: register <id> <ttl-seconds> <pattern>");
                    continue;
                };
                let Ok(ttl) = ttl.parse::<u64>() else {
                    eprintln!("invalid ttl: {}", ttl);
                    continue;
                };
                let pattern = match parser.parse(pattern_text) {
                    Ok(pattern) => pattern,
                    Err(e) => {
                        eprintln!("{}", e);
                        continue;
                    }
                };
                let query_id = id.to_string();
                let result = engine.register(id, pattern, ttl, move |bindings, expires_at| {
                    match serde_json::to_string(&bindings) {
                        Ok(json) => println!("[{}] {} (expires {})", query_id, json, expires_at),
                        Err(e) => eprintln!("[{}] failed to serialize bindings: {}", query_id, e),
                    }
                });
                match result {
                    Ok(()) => println!("registered '{}'", id),
                    Err(e) => eprintln!("{}", e),
                }
            }
            "unregister" => match engine.unregister(rest) {
                Ok(()) => println!("unregistered '{}'", rest),
                Err(e) => eprintln!("{}", e),
            },
            "ingest" => {
                let mut parts = rest.split_whitespace();
                let Some(ttl) = parts.next().and_then(|t| t.parse::<u64>().ok()) else {
                    eprintln!("usage: ingest <ttl-seconds> <value> ...");
                    continue;
                };
                let tuple: Vec<String> = parts.map(str::to_string).collect();
                if tuple.is_empty() {
                    eprintln!("usage: ingest <ttl-seconds> <value> ...");
                    continue;
                }
                let matched = engine.ingest(&tuple, ttl);
                println!("{}", if matched { "matched" } else { "no pattern matched" });
            }
            "retract" => {
                let pattern: Vec<Option<String>> = rest
                    .split_whitespace()
                    .map(|v| if v == "_" { None } else { Some(v.to_string()) })
                    .collect();
                if pattern.is_empty() {
                    eprintln!("usage: retract <value-or-_> ...");
                    continue;
                }
                let removed = engine.retract(&pattern);
                println!("{}", if removed { "retracted" } else { "nothing matched" });
            }
            "evict" => {
                let evicted = engine.evict_expired(now_millis());
                println!("evicted {} items", evicted);
            }
            "help" => println!("{}", HELP),
            "quit" | "exit" => break,
            other => eprintln!("unknown command: {} (try 'help')", other),
        }
    }

    println!("shutting down");
    Ok(())
}
