//! RPS element simulator
//!
//! Drives a RAW engine through a scenario of station associations and
//! configuration commands, then simulates beacon transmissions and prints
//! the RPS element carried by each beacon.

use s1g_raw::{
    daemon::{ConfigManager, DispatcherBuilder, EngineConfig, IeObserver},
    CommandFlags, CommandTlv, RawCommand, RawError, Result, RpsIe, WLAN_EID_S1G_RPS,
};
use clap::{parser::ValueSource, Arg, Command};
use serde::Deserialize;
use std::{path::Path, process, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default number of simulated beacons
const DEFAULT_BEACONS: &str = "12";

/// Default number of associated stations
const DEFAULT_STATIONS: &str = "10";

/// How long to wait for a scheduled pass
const PASS_TIMEOUT: Duration = Duration::from_secs(5);

/// A scenario file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Scenario {
    /// Stations to associate; when empty, AIDs 1..=--stations are used
    stations: Vec<u16>,
    commands: Vec<CommandSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommandSpec {
    id: u16,
    enable: bool,
    delete: bool,
    update: bool,
    slot: Option<SlotSpec>,
    group: Option<[u16; 2]>,
    start_time_us: Option<u32>,
    praw: Option<PrawSpec>,
    spread: Option<SpreadSpec>,
}

#[derive(Debug, Deserialize)]
struct SlotSpec {
    duration_us: u32,
    num_slots: u8,
    #[serde(default)]
    cross_slot_boundary: bool,
}

#[derive(Debug, Deserialize)]
struct PrawSpec {
    periodicity: u8,
    validity: u8,
    start_offset: u8,
    #[serde(default)]
    refresh: bool,
}

#[derive(Debug, Deserialize)]
struct SpreadSpec {
    max_spread: u16,
    nominal: u16,
}

impl CommandSpec {
    fn to_command(&self) -> RawCommand {
        let mut flags = CommandFlags::empty();
        if self.enable {
            flags = flags | CommandFlags::ENABLE;
        }
        if self.delete {
            flags = flags | CommandFlags::DELETE;
        }
        if self.update {
            flags = flags | CommandFlags::UPDATE;
        }

        let mut cmd = RawCommand::new(self.id, flags);
        if let Some(slot) = &self.slot {
            cmd = cmd.with_tlv(CommandTlv::SlotDef {
                raw_duration_us: slot.duration_us,
                num_slots: slot.num_slots,
                cross_slot_boundary: slot.cross_slot_boundary,
            });
        }
        if let Some([start_aid, end_aid]) = self.group {
            cmd = cmd.with_tlv(CommandTlv::Group { start_aid, end_aid });
        }
        if let Some(start_time_us) = self.start_time_us {
            cmd = cmd.with_tlv(CommandTlv::StartTime { start_time_us });
        }
        if let Some(praw) = &self.praw {
            cmd = cmd.with_tlv(CommandTlv::Praw {
                periodicity: praw.periodicity,
                validity: praw.validity,
                start_offset: praw.start_offset,
                refresh_on_expiry: praw.refresh,
            });
        }
        if let Some(spread) = &self.spread {
            cmd = cmd.with_tlv(CommandTlv::BeaconSpread {
                max_spread: spread.max_spread,
                nominal_stations_per_beacon: spread.nominal,
            });
        }
        cmd
    }
}

impl Scenario {
    /// Scenario used when no file is given: one RAW over AIDs 1-100 spread
    /// three stations per beacon.
    fn builtin() -> Self {
        Self {
            stations: Vec::new(),
            commands: vec![CommandSpec {
                id: 1,
                enable: true,
                update: true,
                slot: Some(SlotSpec {
                    duration_us: 4000,
                    num_slots: 2,
                    cross_slot_boundary: false,
                }),
                group: Some([1, 100]),
                spread: Some(SpreadSpec {
                    max_spread: 0,
                    nominal: 3,
                }),
                ..CommandSpec::default()
            }],
        }
    }

    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RawError::Config(format!("Failed to read scenario: {}", e)))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| RawError::Config(format!("Failed to parse JSON scenario: {}", e))),
            _ => toml::from_str(&content)
                .map_err(|e| RawError::Config(format!("Failed to parse TOML scenario: {}", e))),
        }
    }
}

/// Forwards every regenerated payload to the simulation loop
struct PassObserver {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait::async_trait]
impl IeObserver for PassObserver {
    async fn on_rps_ie(&self, payload: &[u8]) -> Result<()> {
        self.tx
            .send(payload.to_vec())
            .map_err(|_| RawError::InternalInconsistency("Simulation loop has gone away".to_string()))
    }

    async fn on_pass_failed(&self, error: &RawError) {
        warn!("Regeneration failed: {}", error);
        let _ = self.tx.send(Vec::new());
    }

    fn name(&self) -> &str {
        "rps-sim"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("rps-sim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Simulates RAW scheduling and prints the RPS element of each beacon")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Engine configuration file (JSON, TOML or YAML)"),
        )
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("Scenario file (TOML or JSON)"),
        )
        .arg(
            Arg::new("stations")
                .short('n')
                .long("stations")
                .value_name("COUNT")
                .value_parser(clap::value_parser!(u16))
                .default_value(DEFAULT_STATIONS)
                .help("Stations to associate when the scenario lists none"),
        )
        .arg(
            Arg::new("beacons")
                .short('b')
                .long("beacons")
                .value_name("COUNT")
                .value_parser(clap::value_parser!(u32))
                .default_value(DEFAULT_BEACONS)
                .help("Number of beacons to simulate"),
        )
        .arg(
            Arg::new("dtim")
                .long("dtim")
                .value_name("BEACONS")
                .value_parser(clap::value_parser!(u8))
                .help("Override the DTIM period"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error); overrides the config file")
                .default_value(DEFAULT_LOG_LEVEL),
        )
        .get_matches();

    // The configuration is read first so its log level can apply
    let config_path = matches.get_one::<String>("config").map(Path::new);
    let loaded = match config_path {
        Some(path) => load_configuration(path)?,
        None => None,
    };

    let cli_level = match matches.value_source("log-level") {
        Some(ValueSource::CommandLine) => matches.get_one::<String>("log-level").map(String::as_str),
        _ => None,
    };
    init_logging(&effective_log_level(cli_level, loaded.as_ref()))?;

    let mut config = match (config_path, loaded) {
        (Some(path), Some(config)) => {
            info!("Loaded configuration from: {}", path.display());
            config
        }
        (Some(path), None) => {
            warn!("Configuration file not found: {}, using defaults", path.display());
            EngineConfig::default()
        }
        (None, _) => EngineConfig::default(),
    };
    if let Some(dtim) = matches.get_one::<u8>("dtim") {
        config.raw.dtim_period = *dtim;
    }

    let scenario = match matches.get_one::<String>("scenario") {
        Some(path) => Scenario::load(Path::new(path))?,
        None => Scenario::builtin(),
    };
    let stations = matches.get_one::<u16>("stations").copied().unwrap_or(10);
    let beacons = matches.get_one::<u32>("beacons").copied().unwrap_or(12);

    match run_simulation(config, scenario, stations, beacons).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Simulation failed: {}", e);
            process::exit(1);
        }
    }
}

/// Initialize logging system
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| RawError::Config(format!("Invalid log level '{}': {}", level, e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Load engine configuration from file, `None` if the file does not exist
fn load_configuration(config_path: &Path) -> Result<Option<EngineConfig>> {
    if !config_path.exists() {
        return Ok(None);
    }
    Ok(Some(ConfigManager::load_from_file(config_path)?.get_config().clone()))
}

/// An explicit `--log-level` wins over the configuration file, which wins
/// over the default.
fn effective_log_level(cli_level: Option<&str>, config: Option<&EngineConfig>) -> String {
    cli_level
        .map(str::to_string)
        .or_else(|| config.map(|c| c.general.log_level.clone()))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

async fn wait_for_pass(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Result<Vec<u8>> {
    match tokio::time::timeout(PASS_TIMEOUT, rx.recv()).await {
        Ok(Some(payload)) => Ok(payload),
        Ok(None) => Err(RawError::InternalInconsistency("RAW worker stopped".to_string())),
        Err(_) => Err(RawError::InternalInconsistency("Timed out waiting for RAW update".to_string())),
    }
}

/// Hex dump of an element payload
fn hex(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_beacon(beacon: u32, payload: &[u8]) {
    if payload.is_empty() {
        println!("beacon {:3}: no RPS element", beacon);
        return;
    }
    println!("beacon {:3}: EID {} len {}: {}", beacon, WLAN_EID_S1G_RPS, payload.len(), hex(payload));
    match RpsIe::parse(payload) {
        Ok(ie) => {
            for assignment in &ie.assignments {
                let (start, end) = assignment.group.unwrap_or((0, 0));
                println!(
                    "            AID {}-{}, {} slot(s) of {} us{}",
                    start,
                    end,
                    assignment.slot.count,
                    assignment.slot.duration_us,
                    if assignment.periodic.is_some() { ", periodic" } else { "" },
                );
            }
        }
        Err(e) => warn!("Failed to decode RPS element: {}", e),
    }
}

/// Wait for the pass a trigger scheduled, if any
async fn settle(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>, scheduled: bool) -> Result<()> {
    if scheduled {
        wait_for_pass(rx).await?;
    }
    Ok(())
}

/// Run a scenario against a fresh engine
async fn run_simulation(config: EngineConfig, scenario: Scenario, stations: u16, beacons: u32) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatcher = DispatcherBuilder::new()
        .with_config(config)
        .with_observer(Arc::new(PassObserver { tx }))
        .build()
        .await?;

    // Initial pass
    wait_for_pass(&mut rx).await?;

    let aids: Vec<u16> = if scenario.stations.is_empty() {
        (1..=stations).collect()
    } else {
        scenario.stations.clone()
    };
    for aid in aids {
        let scheduled = dispatcher.station_associated(aid).await?;
        settle(&mut rx, scheduled).await?;
    }

    for spec in &scenario.commands {
        let cmd = spec.to_command();
        if let Err(e) = dispatcher.process_command(&cmd).await {
            warn!("Command for RAW {} rejected: {}", cmd.id, e);
        }
        wait_for_pass(&mut rx).await?;
    }

    for beacon in 0..beacons {
        print_beacon(beacon, &dispatcher.rps_ie().await);
        let scheduled = dispatcher.beacon_sent().await;
        settle(&mut rx, scheduled).await?;
    }

    let stats = dispatcher.stats().await;
    info!(
        "Simulation done: {} passes, {} beacons processed, {} dropped assignments",
        stats.regenerations, stats.beacons_processed, stats.dropped_assignments
    );
    if let Ok(json) = serde_json::to_string(&stats) {
        println!("{}", json);
    }

    dispatcher.shutdown().await
}
