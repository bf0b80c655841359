//! REPL – interactive shell for driving the bench without a GUI.
//!
//! Supported slash-commands:
//!   /help               – show this list
//!   /status             – connection state, session count, capacity
//!   /connect            – (re)connect the bus client from config
//!   /disconnect         – tear down the bus client
//!   /create <type> <id> [encoder] – open a session (first free id ≥ <id>)
//!   /close <id>         – close the session on <id>
//!   /list               – live sessions with latch state
//!   /read <id>          – latest polled snapshot for <id>
//!   /speed <id> <pct>   – send desired speed, percent in [-100, 100]
//!   /position <id> <rot> – send reset position, rotations
//!   /stop <id>          – latch the stop command
//!   /reset <id>         – latch the reset command
//!   /estop [on|off]     – global emergency stop (default on)
//!   /quit | /exit       – leave the shell

use colored::Colorize;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use motorbench_session::{SessionRequest, SnapshotSink, TestBench};
use motorbench_types::{DeviceId, MotorSnapshot};

/// Sink that keeps the most recent snapshot per device for `/read`.
#[derive(Default)]
pub struct LatestSnapshots {
    inner: Mutex<HashMap<DeviceId, MotorSnapshot>>,
}

impl LatestSnapshots {
    pub fn get(&self, id: DeviceId) -> Option<MotorSnapshot> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .copied()
    }
}

impl SnapshotSink for LatestSnapshots {
    fn on_snapshot(&self, device_id: DeviceId, snapshot: MotorSnapshot) {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(device_id, snapshot);
    }
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(bench: Arc<TestBench>, latest: Arc<LatestSnapshots>, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "bench>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else { continue };
        let args: Vec<&str> = parts.collect();

        match cmd {
            "/help" => cmd_help(),
            "/status" => cmd_status(&bench),
            "/connect" => cmd_connect(&bench),
            "/disconnect" => cmd_disconnect(&bench),
            "/create" => cmd_create(&bench, &latest, &args),
            "/close" => cmd_close(&bench, &args),
            "/list" => cmd_list(&bench),
            "/read" => cmd_read(&bench, &latest, &args),
            "/speed" => cmd_session_input(&bench, &args, "speed"),
            "/position" => cmd_session_input(&bench, &args, "position"),
            "/stop" => cmd_latch(&bench, &args, "stop"),
            "/reset" => cmd_latch(&bench, &args, "reset"),
            "/estop" => cmd_estop(&bench, &args),
            "/quit" | "/exit" => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Motor Bench Commands".bold().underline());
    println!("  {} – connection state and session capacity", "/status".bold().cyan());
    println!("  {} – (re)connect the bus client from config", "/connect".bold().cyan());
    println!("  {} – tear down the bus client", "/disconnect".bold().cyan());
    println!("  {} – open a session", "/create <type> <id> [encoder]".bold().cyan());
    println!("  {} – close the session on <id>", "/close <id>".bold().cyan());
    println!("  {} – live sessions with latch state", "/list".bold().cyan());
    println!("  {} – latest polled snapshot", "/read <id>".bold().cyan());
    println!("  {} – desired speed, percent", "/speed <id> <pct>".bold().cyan());
    println!("  {} – reset position, rotations", "/position <id> <rot>".bold().cyan());
    println!("  {} – latch stop / reset", "/stop <id>   /reset <id>".bold().cyan());
    println!("  {} – global emergency stop", "/estop [on|off]".bold().cyan());
    println!("  {} – leave the shell", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_status(bench: &TestBench) {
    let connected = bench.client().is_connected();
    let state = if connected {
        "connected".green()
    } else {
        "disconnected".red()
    };
    println!(
        "  bus {}, {} of {} session slots free",
        state,
        bench.capacity_remaining(),
        bench.capacity_remaining() + bench.active_sessions(),
    );
}

fn cmd_connect(bench: &TestBench) {
    let options = match crate::config::load() {
        Ok(Some(cfg)) => cfg.connect_options(),
        Ok(None) => Default::default(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return;
        }
    };
    match bench.client().connect(&options) {
        Ok(()) => println!("  {}", "Bus client connected.".green()),
        Err(e) => println!("{}: {}", "Connect failed".red(), e),
    }
}

fn cmd_disconnect(bench: &TestBench) {
    match bench.client().disconnect() {
        Ok(()) => println!("  {}", "Bus client disconnected.".yellow()),
        Err(e) => println!("{}: {}", "Disconnect failed".red(), e),
    }
}

fn cmd_create(bench: &TestBench, latest: &Arc<LatestSnapshots>, args: &[&str]) {
    let (Some(motor_type), Some(id)) = (args.first(), args.get(1).and_then(|s| parse_id(s)))
    else {
        println!("  usage: /create <type> <id> [encoder]");
        return;
    };
    let request = SessionRequest {
        motor_type: motor_type.to_string(),
        requested_device_id: id,
        encoder_attached: args.get(2).is_some_and(|s| *s == "encoder"),
    };
    match bench.create_session(request, latest.clone()) {
        Ok(session) => println!(
            "  Session open on device {} ({}).",
            session.device_id().to_string().bold(),
            session.motor_type()
        ),
        Err(e) => println!("{}: {}", "Rejected".red(), e),
    }
}

fn cmd_close(bench: &TestBench, args: &[&str]) {
    let Some(session) = lookup(bench, args) else {
        return;
    };
    bench.close_session(&session);
    println!("  Session on device {} closed.", session.device_id());
}

fn cmd_list(bench: &TestBench) {
    let sessions = bench.sessions();
    if sessions.is_empty() {
        println!("  No live sessions.");
        return;
    }
    for session in sessions {
        let mut latches = Vec::new();
        if session.stop_latched() {
            latches.push("stop");
        }
        if session.reset_latched() {
            latches.push("reset");
        }
        let latches = if latches.is_empty() {
            "-".to_string()
        } else {
            latches.join(",")
        };
        println!(
            "  {}  {}  encoder={}  latched: {}",
            session.device_id().to_string().bold(),
            session.motor_type(),
            session.encoder_attached(),
            latches.yellow(),
        );
    }
}

fn cmd_read(bench: &TestBench, latest: &Arc<LatestSnapshots>, args: &[&str]) {
    let Some(session) = lookup(bench, args) else {
        return;
    };
    match latest.get(session.device_id()) {
        Some(s) => println!(
            "  busVoltage={:.2}V current={:.2}A temp={:.1}C velocity={:.0}rpm setSpeed={:.2} position={:.3}rot",
            s.bus_voltage, s.output_current, s.temperature, s.velocity, s.set_speed, s.position
        ),
        None => println!("  No snapshot delivered yet."),
    }
}

fn cmd_session_input(bench: &TestBench, args: &[&str], kind: &str) {
    let Some(session) = lookup(bench, args) else {
        return;
    };
    let Some(value) = args.get(1) else {
        println!("  usage: /{kind} <id> <value>");
        return;
    };
    // The session layer owns parsing, clamping, and latch clearing; the raw
    // text goes through untouched.
    match kind {
        "speed" => session.send_speed_input(value),
        _ => session.send_position_input(value),
    }
}

fn cmd_latch(bench: &TestBench, args: &[&str], kind: &str) {
    let Some(session) = lookup(bench, args) else {
        return;
    };
    match kind {
        "stop" => session.press_stop(),
        _ => session.press_reset(),
    }
    println!("  {} latched on device {}.", kind, session.device_id());
}

fn cmd_estop(bench: &TestBench, args: &[&str]) {
    let engaged = !matches!(args.first(), Some(&"off"));
    match bench.client().set_emergency_stop(engaged) {
        Ok(()) if engaged => println!("  {}", "EMERGENCY STOP engaged.".red().bold()),
        Ok(()) => println!("  {}", "Emergency stop released.".green()),
        Err(e) => println!("{}: {}", "Emergency stop write dropped".red(), e),
    }
}

fn lookup(
    bench: &TestBench,
    args: &[&str],
) -> Option<Arc<motorbench_session::MotorSession>> {
    let id = args.first().and_then(|s| parse_id(s))?;
    let session = bench.session(id);
    if session.is_none() {
        println!("  No session on device {id}.");
    }
    session
}

fn parse_id(raw: &str) -> Option<DeviceId> {
    raw.parse::<u8>().ok().and_then(DeviceId::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_rejects_zero_and_garbage() {
        assert_eq!(parse_id("3"), DeviceId::new(3));
        assert_eq!(parse_id("0"), None);
        assert_eq!(parse_id("motor"), None);
        assert_eq!(parse_id("-1"), None);
    }

    #[test]
    fn latest_snapshots_keeps_per_device_values() {
        let latest = LatestSnapshots::default();
        let id = DeviceId::new(2).unwrap();
        assert!(latest.get(id).is_none());

        let snap = MotorSnapshot {
            velocity: 1200.0,
            ..Default::default()
        };
        latest.on_snapshot(id, snap);
        assert_eq!(latest.get(id), Some(snap));
    }
}
