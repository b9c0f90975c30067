use clap::Parser;
use device_dashboard_sync::binding::Thresholds;
use device_dashboard_sync::config::{self, Config, DeviceConfig};
use device_dashboard_sync::dashboard::{Dashboard, DeviceKind};
use device_dashboard_sync::instance_lock::{InstanceLock, InstanceLockError};
use device_dashboard_sync::remote::{
    MqttHub, RemoteDevice, SimulatedDevice, spawn_sensor_simulation,
};
use device_dashboard_sync::sync::{SyncEngine, TokioClock};
use device_dashboard_sync::ui::{self, UiDispatchQueue, UiQueue};
use log::{error, info, warn};
use parking_lot::Mutex;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;

/// Simulated sensors report this often
const SENSOR_PERIOD: Duration = Duration::from_secs(5);

/// Round trip of a simulated device
const SIMULATED_LATENCY: Duration = Duration::from_millis(80);

#[derive(Parser)]
#[command(name = "device-dashboard")]
#[command(about = "Headless dashboard kept in sync with zigbee2mqtt devices")]
struct Cli {
    /// Use in-process simulated devices instead of the MQTT broker
    #[arg(long, env = "DASHBOARD_SIMULATE")]
    simulate: bool,

    /// Minimum spacing of commands sent for one control, in milliseconds
    #[arg(long)]
    coalesce_ms: Option<u64>,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    // Load .env file before the runtime spawns its worker threads
    config::load_dotenv();
    init_logger();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cli));
}

async fn run(cli: Cli) {
    let _lock = match InstanceLock::acquire() {
        Ok(lock) => lock,
        Err(InstanceLockError::AlreadyRunning) => {
            error!("Another device dashboard is already running");
            std::process::exit(1);
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let mut config = Config::from_env();
    if let Some(ms) = cli.coalesce_ms {
        config.sync.coalesce_interval_ms = ms;
    }
    info!("Starting device dashboard");
    info!("  Mode: {}", if cli.simulate { "simulated" } else { "MQTT" });
    info!("  Coalesce interval: {:?}", config.sync.coalesce_interval());
    info!("  Devices: {}", config.devices.len());

    let (queue, ui_loop) = ui::channel();
    let engine = SyncEngine::new(
        Arc::new(TokioClock::new()),
        Arc::new(queue.clone()),
        &config.sync,
    );
    let mut dashboard = Dashboard::new(engine, Thresholds::from(&config.sync));

    let mut background: Vec<JoinHandle<()>> = Vec::new();
    let remotes = if cli.simulate {
        simulated_remotes(&config.devices, &mut background)
    } else {
        let (hub, router) = MqttHub::start(&config.mqtt, config.sync.snapshot_timeout());
        background.push(router);
        let mut remotes: Vec<(DeviceConfig, Arc<dyn RemoteDevice>)> = Vec::new();
        for device in &config.devices {
            let remote: Arc<dyn RemoteDevice> = hub.device(&device.name).await;
            remotes.push((device.clone(), remote));
        }
        remotes
    };
    dashboard.bind_all(remotes).await;
    let dashboard = Arc::new(Mutex::new(dashboard));

    let input_dashboard = dashboard.clone();
    if let Err(e) = std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || read_commands(queue, input_dashboard))
    {
        warn!("Console input unavailable: {}", e);
    }

    info!("Device dashboard is running");
    info!("  - Type `<device> <on|off|0-100|enable>` to operate a device");
    info!("  - Press Ctrl+C to exit");

    tokio::select! {
        _ = ui_loop.run() => {}
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        },
    }

    dashboard.lock().teardown();
    for task in background {
        task.abort();
    }
    info!("Device dashboard stopped");
}

fn simulated_remotes(
    devices: &[DeviceConfig],
    background: &mut Vec<JoinHandle<()>>,
) -> Vec<(DeviceConfig, Arc<dyn RemoteDevice>)> {
    devices
        .iter()
        .map(|device| {
            let remote = Arc::new(
                SimulatedDevice::new(&device.name, device.kind.simulated_state())
                    .with_echo()
                    .with_latency(SIMULATED_LATENCY),
            );
            if device.kind == DeviceKind::Temperature {
                background.push(spawn_sensor_simulation(remote.clone(), SENSOR_PERIOD));
            }
            (device.clone(), remote as Arc<dyn RemoteDevice>)
        })
        .collect()
}

/// Forward `<device> <value>` lines from stdin to the dashboard on the UI
/// context.
fn read_commands(queue: UiQueue, dashboard: Arc<Mutex<Dashboard>>) {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((device, value)) = line.rsplit_once(char::is_whitespace) else {
            warn!("Expected `<device> <value>`, got `{}`", line);
            continue;
        };
        let device = device.trim().to_string();
        let value = value.to_string();
        let dashboard = dashboard.clone();
        queue.schedule(Box::new(move || {
            if let Err(e) = dashboard.lock().apply_input(&device, &value) {
                warn!("{}", e);
            }
        }));
    }
}
