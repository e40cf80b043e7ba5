//! FlashKV - interactive front-end for the engine core.
//!
//! Reads one inline command per line from standard input, runs it on the
//! event loop thread and prints the reply the way `redis-cli` does.

use clap::Parser;
use flashkv_core::commands::Command;
use flashkv_core::config::EngineConfig;
use flashkv_core::event_loop::EventLoop;
use flashkv_core::storage::EvictionPolicy;
use flashkv_core::Engine;
use std::cell::RefCell;
use std::fmt::Write as _;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use tracing::{info, trace, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Memory ceiling in bytes (0 = unlimited)
    #[arg(long)]
    maxmemory: Option<usize>,

    /// Eviction policy (noeviction, allkeys-lru, volatile-ttl, ...)
    #[arg(long)]
    maxmemory_policy: Option<EvictionPolicy>,

    /// Housekeeping cron frequency per second
    #[arg(long)]
    hz: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Do not print the banner
    #[arg(short, long)]
    quiet: bool,
}

fn print_banner(config: &EngineConfig) {
    let limit = match config.memory.max_bytes {
        0 => "unlimited".to_string(),
        n => format!("{} bytes", n),
    };
    eprintln!(
        r#"
FlashKV core v{} - single-threaded key-value engine
──────────────────────────────────────────────────────────────
maxmemory: {} ({})
hz: {}

Type commands, one per line. Ctrl+D or QUIT to exit.
"#,
        flashkv_core::VERSION,
        limit,
        config.memory.policy,
        config.hz,
    );
}

fn load_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(max_bytes) = args.maxmemory {
        config.memory.max_bytes = max_bytes;
    }
    if let Some(policy) = args.maxmemory_policy {
        config.memory.policy = policy;
    }
    if let Some(hz) = args.hz {
        config.hz = hz;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Runs one input line, appending the printed reply to `out`.
fn handle_line(engine: &mut Engine, line: &str, out: &mut String) -> anyhow::Result<()> {
    let command = match Command::parse_inline(line) {
        Ok(command) => command,
        Err(e) => {
            writeln!(out, "(error) ERR {}", e)?;
            return Ok(());
        }
    };
    match engine.execute(&command) {
        Ok(reply) => writeln!(out, "{}", reply)?,
        Err(e) => writeln!(out, "(error) {}", e)?,
    }
    Ok(())
}

fn flush_replies(replies: &RefCell<String>) {
    let mut pending = replies.borrow_mut();
    if pending.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    if let Err(e) = stdout
        .write_all(pending.as_bytes())
        .and_then(|()| stdout.flush())
    {
        warn!(error = %e, "Failed to write replies");
    }
    pending.clear();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    // stdout carries replies, logs go to stderr
    let log_level = if args.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("flashkv_core={}", log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if !args.quiet {
        print_banner(&config);
    }

    let mut engine = Engine::new(config);
    engine.on_write(|db, command| {
        trace!(db, command = %command, "Keyspace changed");
    });

    let mut event_loop = EventLoop::new()?;
    engine.attach(&mut event_loop);

    // Replies are buffered during a tick and written out before sleeping
    let replies = Rc::new(RefCell::new(String::new()));

    let lines = {
        let replies = Rc::clone(&replies);
        event_loop.mailbox(
            move |el: &mut EventLoop<Engine>, engine: &mut Engine, line: Option<String>| {
                let Some(line) = line else {
                    info!("Input closed");
                    el.stop();
                    return Ok(());
                };
                let line = line.trim();
                if line.is_empty() {
                    return Ok(());
                }
                if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
                    el.stop();
                    return Ok(());
                }
                handle_line(engine, line, &mut replies.borrow_mut())
            },
        )?
    };

    {
        let replies = Rc::clone(&replies);
        event_loop.set_before_sleep(move |_: &mut Engine| flush_replies(&replies));
    }

    let shutdown = event_loop.mailbox(|el: &mut EventLoop<Engine>, _: &mut Engine, ()| {
        info!("Received shutdown signal, stopping...");
        el.stop();
        Ok(())
    })?;
    ctrlc::set_handler(move || {
        let _ = shutdown.send(());
    })?;

    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if lines.send(Some(line)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read input");
                        break;
                    }
                }
            }
            let _ = lines.send(None);
        })?;

    event_loop.run(&mut engine)?;
    flush_replies(&replies);

    let stats = engine.store().stats();
    info!(
        keys = stats.keys,
        used_memory = stats.used_memory,
        evicted_keys = stats.evicted_keys,
        expired_keys = stats.expired_keys,
        "Shutdown complete"
    );
    Ok(())
}
