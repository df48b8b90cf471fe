//! resilience-sim: drive the resilience layer against a synthetic remote API
//!
//! Usage:
//!   resilience-sim simulate [--requests N] [--distinct D] [--throttle-every K] [--config <path>]
//!   resilience-sim config                          Print the effective configuration as YAML
//!   resilience-sim help                            Show this help message

use anyhow::Context;
use api_resilience::{CacheCategory, Error, Guard, RemoteError, ResilienceConfig};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "simulate" => cmd_simulate(&args[2..]).await,
        "config" => cmd_config(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("resilience-sim {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"resilience-sim: exercise the limiter, backoff and caches

USAGE:
    resilience-sim <COMMAND> [OPTIONS]

COMMANDS:
    simulate [OPTIONS]          Issue synthetic requests through a Guard and print stats
        --requests <N>          Total logical requests (default 120)
        --distinct <D>          Distinct request fingerprints (default 40)
        --throttle-every <K>    Remote returns HTTP 429 on every K-th call, 0 = never (default 7)
        --config <path>         YAML/JSON configuration file
    config [--config <path>]    Print the effective configuration as YAML
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    API_RESILIENCE_CONFIG       Configuration file used when --config is absent
    RUST_LOG                    Log filter (default "info")"#
    );
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn numeric_flag(args: &[String], name: &str, default: u64) -> anyhow::Result<u64> {
    match flag(args, name) {
        Some(v) => v
            .parse()
            .with_context(|| format!("{name} expects a non-negative integer, got {v:?}")),
        None => Ok(default),
    }
}

async fn load_config(args: &[String]) -> anyhow::Result<ResilienceConfig> {
    let cfg = match flag(args, "--config") {
        Some(path) => ResilienceConfig::load(path)
            .await
            .with_context(|| format!("loading configuration from {path}"))?,
        None => ResilienceConfig::from_env().await?,
    };
    Ok(cfg)
}

async fn cmd_config(args: &[String]) -> anyhow::Result<()> {
    let cfg = load_config(args).await?;
    print!("{}", serde_yaml::to_string(&cfg)?);
    Ok(())
}

async fn cmd_simulate(args: &[String]) -> anyhow::Result<()> {
    let requests = numeric_flag(args, "--requests", 120)?;
    let distinct = numeric_flag(args, "--distinct", 40)?.max(1);
    let throttle_every = numeric_flag(args, "--throttle-every", 7)?;
    let cfg = load_config(args).await?;
    let guard = Guard::new(&cfg)?;

    let remote_calls = Arc::new(AtomicU64::new(0));
    let start = Instant::now();
    let mut handles = Vec::with_capacity(requests as usize);
    for i in 0..requests {
        let guard = guard.clone();
        let remote_calls = Arc::clone(&remote_calls);
        handles.push(tokio::spawn(async move {
            let query = format!("topic-{}", i % distinct);
            let key = guard.fingerprint("search", &json!({ "query": query, "limit": 25 }));
            guard
                .fetch(CacheCategory::Queries, &key, || {
                    let remote_calls = Arc::clone(&remote_calls);
                    let query = query.clone();
                    async move {
                        let n = remote_calls.fetch_add(1, Ordering::SeqCst) + 1;
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        if throttle_every > 0 && n % throttle_every == 0 {
                            return Err(Error::Remote(RemoteError::new(429, "Too Many Requests")));
                        }
                        Ok(json!({ "query": query, "results": [format!("{query}-1"), format!("{query}-2")] }))
                    }
                })
                .await
        }));
    }

    let mut ok = 0u64;
    let mut failed = 0u64;
    for handle in handles {
        match handle.await? {
            Ok(_) => ok += 1,
            Err(e) => {
                failed += 1;
                tracing::warn!(error = %e, "request failed");
            }
        }
    }

    let report = json!({
        "requests": requests,
        "succeeded": ok,
        "failed": failed,
        "remoteCalls": remote_calls.load(Ordering::SeqCst),
        "elapsedMs": start.elapsed().as_millis() as u64,
        "stats": guard.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
