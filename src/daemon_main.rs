//! # LifeClaw Daemon
//!
//! Opens one life-cycle environment and drives it from a line feed on
//! stdin, the way a directory connector would:
//!
//! ```text
//! add <dn>\t<attr>      stage an add
//! del <dn>\t<attr>      stage a delete
//! reset                 mark everything for deletion
//! prepare               probe the transaction
//! commit                commit the transaction
//! rollback              roll the transaction back
//! stats                 print an environment snapshot as JSON
//! dump                  print every object and state, regions included
//! quit                  close the environment and exit
//! ```
//!
//! Usage:
//!   lifeclaw-daemon 'x=cat' 'y=./notify.sh'     # one handler per program

use std::io::BufRead;

use anyhow::Result;
use clap::Parser;
use lifeclaw_core::value::encode_value;
use lifeclaw_core::LifeClawConfig;
use lifeclaw_engine::LcBackend;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "lifeclaw-daemon",
    version,
    about = "⏳ LifeClaw — directory-driven life-cycle scheduler"
)]
struct Cli {
    /// Handler declarations, one per program name: name=command
    #[arg(required = true)]
    handlers: Vec<String>,

    /// Config file (defaults to ~/.lifeclaw/config.toml)
    #[arg(long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => LifeClawConfig::load_from(std::path::Path::new(path))?,
        None => LifeClawConfig::load()?,
    };

    let filter = if cli.verbose {
        "lifeclaw=debug,lifeclaw_engine=debug,lifeclaw_core=debug".to_string()
    } else {
        config.log.filter.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut args = vec!["lifecycle".to_string()];
    args.extend(cli.handlers.iter().cloned());
    let backend = LcBackend::open_with(&args, 2, config.scheduler.clone())?;

    println!("⏳ LifeClaw v{}", env!("CARGO_PKG_VERSION"));
    println!("   🔌 Handlers: {}", cli.handlers.join(", "));
    println!("   📥 Feed:     stdin (add/del/reset/prepare/commit/rollback/stats/dump/quit)");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        match run_command(&backend, line) {
            Feed::Continue => {}
            Feed::Quit => break,
        }
    }

    drop(backend);
    println!("👋 Environment closed");
    Ok(())
}

enum Feed {
    Continue,
    Quit,
}

fn run_command(backend: &LcBackend, line: &str) -> Feed {
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((v, r)) => (v, r.trim_start()),
        None => (line, ""),
    };
    match verb {
        "add" | "del" => match staged_pair(rest) {
            Some((dn, attr)) => {
                let ok = if verb == "add" {
                    backend.add(&[dn.as_slice(), attr.as_slice()])
                } else {
                    backend.del(&[dn.as_slice(), attr.as_slice()])
                };
                println!("{verb} → {}", u8::from(ok));
            }
            None => tracing::warn!("usage: {verb} <dn>\\t<attr>"),
        },
        "reset" => println!("reset → {}", u8::from(backend.reset())),
        "prepare" => println!("prepare → {}", u8::from(backend.prepare())),
        "commit" => println!("commit → {}", u8::from(backend.commit())),
        "rollback" => {
            backend.rollback();
            println!("rollback → done");
        }
        "stats" => match serde_json::to_string_pretty(&backend.stats()) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!("stats serialization failed: {e}"),
        },
        "dump" => print!("{}", backend.dump()),
        "quit" => return Feed::Quit,
        other => tracing::warn!("unknown feed command {other:?}"),
    }
    Feed::Continue
}

/// Split `dn\tattr` and wrap both sides as length-prefixed values.
fn staged_pair(rest: &str) -> Option<(Vec<u8>, Vec<u8>)> {
    let (dn, attr) = rest.split_once('\t')?;
    let dn = encode_value(dn.as_bytes()).ok()?;
    let attr = encode_value(attr.as_bytes()).ok()?;
    Some((dn, attr))
}
