//! `motorbench-cli` – headless control panel for the motor test bench.
//!
//! This binary wires the core together and drops the user into an
//! interactive shell:
//!
//! 1. Loads `~/.motorbench/config.toml` (written with defaults on first run).
//! 2. Builds the telemetry client over the in-process [`SimBus`] and, unless
//!    `sim = false`, spawns the simulated device rig for ids 1–4 so the
//!    bench is immediately alive. A networked transport implements the same
//!    bus traits and slots in here.
//! 3. Intercepts **Ctrl-C** to publish the global emergency stop before
//!    exiting.
//!
//! [`SimBus`]: motorbench_client::sim::SimBus

mod config;
mod repl;
mod sim_rig;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use motorbench_client::sim::SimBus;
use motorbench_client::DeviceTelemetryClient;
use motorbench_session::{BenchConfig, TestBench};
use motorbench_types::DeviceId;

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (default "info"); MOTORBENCH_LOG_FORMAT=json
    // switches to newline-delimited JSON for log aggregators. User-facing
    // output below still uses println! for shell UX.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("MOTORBENCH_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  First run – defaults written to {}",
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Config write failed".yellow(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    // ── Runtime and core wiring ───────────────────────────────────────────
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Runtime start failed".red(), e);
            std::process::exit(1);
        }
    };
    // Poll tasks and the sim rig spawn from the synchronous shell below.
    let _runtime_guard = runtime.enter();

    let bus = SimBus::new();
    let client = Arc::new(DeviceTelemetryClient::new(bus.handle()));
    let bench = Arc::new(TestBench::new(
        client.clone(),
        BenchConfig {
            poll_period: std::time::Duration::from_millis(cfg.poll_period_ms),
            ..Default::default()
        },
    ));

    match client.connect(&cfg.connect_options()) {
        Ok(()) => println!("  {}", "Bus client connected.".green()),
        Err(e) => println!(
            "{}: {} (the shell still works; try {}).",
            "Connect failed".yellow(),
            e,
            "/connect".bold()
        ),
    }

    let _rig = if cfg.sim {
        let ids: Vec<DeviceId> = (1u8..=4).filter_map(DeviceId::new).collect();
        let rig = sim_rig::spawn(bus.clone(), ids);
        println!("  Simulated controllers on device ids {}.", "1–4".bold());
        Some(rig)
    } else {
        None
    };

    // ── Ctrl-C: emergency-stop the bench, then exit ───────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let client = client.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("{}", "⚠  Ctrl-C received – engaging emergency stop …".yellow().bold());
            match client.set_emergency_stop(true) {
                Ok(()) => println!("{}", "  ✓ Emergency stop published.".green()),
                Err(e) => println!("{}: {}", "  Emergency stop write dropped".red(), e),
            }
            shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler; emergency stop on Ctrl-C will not be available");
        }
    }

    println!("  Type {} for commands.", "/help".bold());
    println!();

    repl::run(bench, Arc::new(repl::LatestSnapshots::default()), shutdown);
}

fn print_banner() {
    println!();
    println!("{}", "  Motor Test Bench".bold());
    println!("{}", "  telemetry/command client over the key/value bus".dimmed());
    println!();
}
