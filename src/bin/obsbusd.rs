use obsbus::asyncop::{HardwareOp, OpError, POLL_DONE};
use obsbus::config::ObsConfig;
use obsbus::coordinator::MasterCoordinator;
use obsbus::device::ShutterDevice;
use obsbus::protocol::{
    format_reply, format_state_line, format_value_line, parse_command_line, CommandLine,
    ErrorKind, Reply, WireError,
};
use obsbus::scriptor::{run_generator, Scriptor};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::time;
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATH: &str = "/etc/obsbus/obsbus.toml";
const PUSH_BROADCAST_BUFFER_SIZE: usize = 256;
/// Longest the idle loop sleeps even with nothing scheduled.
const MAX_IDLE_SLEEP_S: u64 = 60;

/// Simulated shutter drive: a fixed-duration motion against the wall clock.
struct TimedMotion {
    duration: Duration,
    deadline: Option<Instant>,
}

impl TimedMotion {
    fn new(duration_s: u64) -> Self {
        Self { duration: Duration::from_secs(duration_s), deadline: None }
    }
}

impl HardwareOp for TimedMotion {
    fn start(&mut self) -> Result<(), OpError> {
        self.deadline = Some(Instant::now() + self.duration);
        Ok(())
    }

    fn check(&mut self) -> i64 {
        match self.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    POLL_DONE
                } else {
                    remaining.as_secs() as i64
                }
            }
            None => POLL_DONE,
        }
    }

    fn finish(&mut self) -> Result<bool, OpError> {
        self.deadline = None;
        Ok(false)
    }
}

struct Fleet {
    coordinator: MasterCoordinator,
    scriptor: Scriptor,
}

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = ObsConfig::load(Path::new(&config_path))?;

    println!("obsbusd - observatory fleet coordinator");
    println!("=======================================");

    let mut coordinator = MasterCoordinator::new(
        config.observer(),
        config.observatory.night_horizon,
        config.observatory.day_horizon,
        config.margins(),
    );
    coordinator.attach(Box::new(ShutterDevice::new(
        "DOME",
        Box::new(TimedMotion::new(30)),
        Box::new(TimedMotion::new(30)),
    )));

    let fleet = Arc::new(Mutex::new(Fleet {
        coordinator,
        scriptor: Scriptor::new(config.scriptor.generator.clone()),
    }));

    // One channel carries every push line (state and value) to all peers
    let (push_tx, _) = broadcast::channel::<String>(PUSH_BROADCAST_BUFFER_SIZE);

    let tcp_fleet = Arc::clone(&fleet);
    let tcp_push_tx = push_tx.clone();
    let listen_port = config.listen_port;
    let tcp_server = tokio::spawn(async move {
        if let Err(e) = run_listener(listen_port, tcp_fleet, tcp_push_tx).await {
            error!("listener error: {}", e);
        }
    });

    // Idle loop: wake at the next phase transition or the soonest running
    // operation, whichever comes first
    loop {
        let sleep_s = {
            let mut fleet_guard = fleet.lock().await;
            let tick = match fleet_guard.coordinator.evaluate(now_unix()) {
                Ok(tick) => tick,
                Err(e) => {
                    error!("macro-state evaluation failed: {}", e);
                    break;
                }
            };
            if tick.changed {
                info!("master state word {:#04x}", tick.state.encode());
                let _ = push_tx.send(format_state_line(tick.state.encode()));
            }
            for (name, err) in &tick.device_errors {
                warn!("{}: {}", name, err);
            }

            let until_event = (tick.next_wake_unix as f64 - now_unix()).max(1.0) as u64;
            let device_wake = fleet_guard.coordinator.idle_devices();
            device_wake
                .map_or(until_event, |d| d.max(1).min(until_event))
                .min(MAX_IDLE_SLEEP_S)
        };

        time::sleep(Duration::from_secs(sleep_s)).await;
    }

    tcp_server.abort();
    println!("obsbusd stopped");
    Ok(())
}

async fn run_listener(
    port: u16,
    fleet: Arc<Mutex<Fleet>>,
    push_tx: broadcast::Sender<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("listening on port {}", port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("peer connected: {}", addr);
                let peer_fleet = Arc::clone(&fleet);
                let peer_push_tx = push_tx.clone();
                let peer_push_rx = push_tx.subscribe();

                tokio::spawn(async move {
                    if let Err(e) =
                        handle_peer(stream, peer_fleet, peer_push_tx, peer_push_rx).await
                    {
                        warn!("peer {} error: {}", addr, e);
                    }
                    info!("peer {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("accept failed: {}", e);
            }
        }
    }
}

async fn handle_peer(
    stream: TcpStream,
    fleet: Arc<Mutex<Fleet>>,
    push_tx: broadcast::Sender<String>,
    mut push_rx: broadcast::Receiver<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let writer = Arc::new(Mutex::new(writer));

    // Push-streaming task: forwards state and value lines as they happen
    let push_writer = Arc::clone(&writer);
    let push_task = tokio::spawn(async move {
        while let Ok(line) = push_rx.recv().await {
            let mut writer_guard = push_writer.lock().await;
            if writer_guard.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if writer_guard.write_all(b"\n").await.is_err() {
                break;
            }
        }
    });

    let mut line = String::new();
    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let reply = match parse_command_line(trimmed) {
                    // The generator is an external process; run it off the
                    // loop so one slow script never stalls the other peers
                    Ok(command) if command.verb == "script" => {
                        handle_script(&fleet, &command, &push_tx).await
                    }
                    Ok(command) => {
                        let mut fleet_guard = fleet.lock().await;
                        dispatch(&mut fleet_guard, &command, &push_tx)
                    }
                    Err(e) => Reply::Err(WireError::new(ErrorKind::Command, e.to_string())),
                };
                let rendered = format_reply(&reply);
                {
                    let mut writer_guard = writer.lock().await;
                    writer_guard.write_all(rendered.as_bytes()).await?;
                    writer_guard.write_all(b"\n").await?;
                }
            }
            Err(e) => {
                error!("read error: {}", e);
                break;
            }
        }
    }

    push_task.abort();
    Ok(())
}

/// `script <device>`: ask the generator for the device's script.
///
/// The generator is a child process that may take a while; holding the
/// fleet lock across it would stall every other peer on the
/// current-thread runtime. Snapshot what the invocation needs under a
/// short lock, run it on a blocking worker, then re-lock to record and
/// push the result.
async fn handle_script(
    fleet: &Arc<Mutex<Fleet>>,
    command: &CommandLine,
    push_tx: &broadcast::Sender<String>,
) -> Reply {
    if let Err(e) = command.require_args(1) {
        return Reply::Err(e);
    }
    let device = command.args[0].clone();

    let (word, generator) = {
        let fleet_guard = fleet.lock().await;
        (
            fleet_guard.coordinator.state().map_or(0, |s| s.encode()),
            fleet_guard.scriptor.generator().to_path_buf(),
        )
    };

    let worker_device = device.clone();
    let outcome =
        tokio::task::spawn_blocking(move || run_generator(&generator, word, &worker_device)).await;

    match outcome {
        Ok(Ok(script)) => {
            let mut fleet_guard = fleet.lock().await;
            fleet_guard.scriptor.record(&device, script.clone());
            let _ = push_tx.send(format_value_line(&format!("SC_{device}"), &script));
            Reply::Ok(Some(script))
        }
        Ok(Err(e)) => Reply::Err(WireError::new(ErrorKind::Hw, e.to_string())),
        Err(e) => Reply::Err(WireError::new(ErrorKind::System, e.to_string())),
    }
}

fn dispatch(fleet: &mut Fleet, command: &CommandLine, push_tx: &broadcast::Sender<String>) -> Reply {
    match command.verb.as_str() {
        "state" => {
            let word = fleet.coordinator.state().map_or(0, |s| s.encode());
            Reply::Ok(Some(word.to_string()))
        }
        "status" => match serde_json::to_string(&fleet.coordinator.snapshot()) {
            Ok(json) => Reply::Ok(Some(json)),
            Err(e) => Reply::Err(WireError::new(ErrorKind::System, e.to_string())),
        },
        "standby" => {
            if let Err(e) = command.require_args(1) {
                return Reply::Err(e);
            }
            match command.args[0].as_str() {
                "on" => fleet.coordinator.set_standby(true),
                "off" => fleet.coordinator.set_standby(false),
                other => {
                    return Reply::Err(WireError::new(
                        ErrorKind::ParamsVal,
                        format!("invalid value: {other}"),
                    ))
                }
            }
            // Apply the switch now instead of waiting for the next wake
            match fleet.coordinator.evaluate(now_unix()) {
                Ok(tick) => {
                    if tick.changed {
                        let _ = push_tx.send(format_state_line(tick.state.encode()));
                    }
                    Reply::Ok(None)
                }
                Err(e) => Reply::Err(WireError::new(ErrorKind::System, e.to_string())),
            }
        }
        "open" | "close" | "info" => match fleet.coordinator.device_command("DOME", command) {
            Some(reply) => reply,
            None => Reply::Err(WireError::new(ErrorKind::System, "no dome attached")),
        },
        "ready" => Reply::Ok(None),
        verb => Reply::Err(WireError::new(ErrorKind::Command, format!("unknown command {verb}"))),
    }
}
