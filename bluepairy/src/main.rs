/*!
 * BLUEPAIRY
 * Find, pair and connect a Bluetooth device by name
 * Onyx Digital Intelligence Development LLC
 */

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use regex::Regex;
use tracing::{error, info, warn};

mod dbus_transport;
mod report;

use bluepairy_core::config::DEFAULT_CONFIG_PATH;
use bluepairy_core::{
    Agent, Config, Criteria, ExpectedProfiles, FixedPin, Outcome, PinPolicy, SerialDerivedPin,
    Session, Workflow, HID_PROFILE,
};
use dbus_transport::DbusTransport;

#[derive(Parser)]
#[command(name = "bluepairy")]
#[command(about = "Discover, pair, trust and connect a Bluetooth device via BlueZ")]
#[command(version)]
struct Cli {
    /// Regular expression the device name has to match
    #[arg(value_name = "NAME_REGEX", required_unless_present = "friendly_name")]
    name: Option<String>,

    /// Same as NAME_REGEX
    #[arg(short = 'n', long, value_name = "NAME_REGEX", conflicts_with = "name")]
    friendly_name: Option<String>,

    /// Profile UUID the device has to offer (repeatable, short forms allowed)
    #[arg(short = 'u', long = "profile-uuid", value_name = "UUID")]
    profiles: Vec<String>,

    /// Require the HID profile
    #[arg(long)]
    hid: bool,

    /// Answer PIN requests with this PIN instead of deriving one
    #[arg(long)]
    pin: Option<String>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Give up after this many seconds without a usable device
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn name_pattern(&self) -> Option<&str> {
        self.name.as_deref().or(self.friendly_name.as_deref())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("bluepairy={0},bluepairy_core={0}", log_level))
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    match run(cli).await {
        Ok(outcome) => {
            report::outcome(&outcome, json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            report::failure(&e, json);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Outcome> {
    let name = cli.name_pattern().unwrap_or_default().to_string();
    if name.is_empty() {
        bail!("an empty device name pattern would match everything");
    }
    let pattern =
        Regex::new(&name).with_context(|| format!("invalid device name pattern {:?}", name))?;

    if cli.profiles.iter().any(String::is_empty) {
        bail!("empty profile UUID given");
    }
    let mut profiles = ExpectedProfiles::parse(&cli.profiles)?;
    if cli.hid {
        profiles.insert(HID_PROFILE)?;
    }
    if !cli.json {
        report::required_profiles(&profiles);
    }

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(secs) = cli.timeout {
        config.timeouts.overall_secs = secs;
        config.validate().context("invalid --timeout")?;
    }
    info!("searching for a device named like {:?}", name);

    let criteria = Criteria::new(pattern, profiles);
    let pin = cli.pin;
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();

    let mut task = tokio::task::spawn_blocking(move || {
        let policy: Box<dyn PinPolicy> = match pin {
            Some(pin) => Box::new(FixedPin(pin)),
            None => Box::new(SerialDerivedPin),
        };
        let transport = DbusTransport::system(config.agent.path.clone())?;
        let agent = Agent::new(config.agent.path.clone(), policy);
        let mut session = Session::new(transport, agent, &config.timeouts).with_interrupt(flag);
        Workflow::new(&mut session, &criteria, &config).run()
    });

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, stopping");
            interrupted.store(true, Ordering::SeqCst);
            task.await
        }
    };

    Ok(joined.context("pairing task failed")??)
}
