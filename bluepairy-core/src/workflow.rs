/*!
 * Pairing Workflow
 * Power adapters, discover, pair, trust and connect the wanted device
 */

use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bus::{Payload, Request, Transport};
use crate::config::Config;
use crate::criteria::Criteria;
use crate::error::{BluezError, Error, Result};
use crate::model::{Adapter, Handle};
use crate::registry::Registry;
use crate::session::Session;

/// What a device looked like when the workflow finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub path: String,
    pub name: String,
    pub address: String,
    /// Address of the adapter the device is reachable through.
    pub adapter: Option<String>,
}

impl DeviceSummary {
    fn of(registry: &Registry, device: &Handle) -> Self {
        match registry.resolve_device(device) {
            Some(d) => Self {
                path: d.path().to_string(),
                name: d.name.clone(),
                address: d.address.clone(),
                adapter: registry.adapter_of(d).map(|a| a.address.clone()),
            },
            None => Self {
                path: device.path.clone(),
                name: String::new(),
                address: String::new(),
                adapter: None,
            },
        }
    }
}

impl fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)?;
        if let Some(adapter) = &self.adapter {
            write!(f, " via {}", adapter)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    /// Exactly one usable device; its expected profiles are connected.
    Ready {
        device: DeviceSummary,
        connected_profiles: Vec<String>,
    },
    /// Several usable devices at once. No profile was connected.
    Ambiguous { devices: Vec<DeviceSummary> },
}

enum Step {
    PowerUp,
    Scan,
    Pair(Vec<Handle>),
    Discover,
    ConnectProfiles(Handle),
    Report(Vec<Handle>),
}

pub struct Workflow<'a, T> {
    session: &'a mut Session<T>,
    criteria: &'a Criteria,
    config: &'a Config,
    /// Paired devices already reported as lacking a profile.
    reported_incomplete: BTreeSet<String>,
}

fn describe(registry: &Registry, device: &Handle) -> String {
    DeviceSummary::of(registry, device).to_string()
}

fn adapter_label(adapter: &Adapter) -> String {
    if adapter.address.is_empty() {
        adapter.path().to_string()
    } else {
        adapter.address.clone()
    }
}

/// BlueZ answers `InProgress` when discovery is already running for us.
fn is_in_progress(error: &BluezError) -> bool {
    matches!(error, BluezError::Other { name, .. } if name.ends_with(".InProgress"))
}

impl<'a, T: Transport> Workflow<'a, T> {
    pub fn new(session: &'a mut Session<T>, criteria: &'a Criteria, config: &'a Config) -> Self {
        Self {
            session,
            criteria,
            config,
            reported_incomplete: BTreeSet::new(),
        }
    }

    /// Drive the whole state machine until a usable device is found or the
    /// run fails.
    pub fn run(mut self) -> Result<Outcome> {
        let deadline = Instant::now() + self.config.timeouts.overall();

        self.session.load_objects()?;
        self.session.register_agent(&self.config.agent.capability)?;

        if self.session.registry().adapters().next().is_none() {
            return Err(Error::NoAdapters);
        }

        let mut step = Step::PowerUp;
        loop {
            step = match step {
                Step::PowerUp => {
                    self.power_up()?;
                    Step::Scan
                }
                Step::Scan => self.scan(deadline)?,
                Step::Pair(candidates) => {
                    self.pair_all(&candidates, deadline)?;
                    self.session.pump()?;
                    Step::Scan
                }
                Step::Discover => {
                    self.discover()?;
                    self.session.pump()?;
                    Step::Scan
                }
                Step::ConnectProfiles(device) => return self.connect_profiles(&device, deadline),
                Step::Report(devices) => {
                    let devices: Vec<_> = devices
                        .iter()
                        .map(|d| DeviceSummary::of(self.session.registry(), d))
                        .collect();
                    for device in &devices {
                        info!("usable device {}", device);
                    }
                    warn!("{} usable devices match, not connecting any", devices.len());
                    return Ok(Outcome::Ambiguous { devices });
                }
            };
        }
    }

    /// Issue a call and wait for its outcome until `deadline`.
    fn call(&mut self, request: Request, deadline: Instant) -> Result<Payload> {
        let pending = self.session.issue(request)?;
        pending.block(self.session, deadline)?;
        pending.resolve(self.session)
    }

    fn power_up(&mut self) -> Result<()> {
        let unpowered: Vec<(Handle, String)> = self
            .session
            .registry()
            .adapters()
            .filter(|a| !a.powered)
            .map(|a| (a.handle(), adapter_label(a)))
            .collect();

        for (adapter, label) in unpowered {
            info!("powering up controller {}", label);
            let deadline = Instant::now() + self.config.timeouts.power_on();
            let pending = self.session.issue(Request::set_powered(&adapter.path, true))?;

            if pending.wait(self.session, deadline)? {
                match pending.resolve(self.session) {
                    Ok(_) => {}
                    Err(Error::Bluez(e)) => {
                        warn!("failed to power up controller {}: {}", label, e);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            } else {
                pending.abandon(self.session);
            }

            self.session.pump_until(deadline, |registry| {
                registry
                    .resolve_adapter(&adapter)
                    .map_or(true, |a| a.powered)
            })?;
            match self.session.registry().resolve_adapter(&adapter) {
                Some(a) if a.powered => info!("controller {} powered", label),
                Some(_) => warn!(
                    "controller {} not powered within {:?}, skipping it",
                    label,
                    self.config.timeouts.power_on()
                ),
                None => warn!("controller {} went away", label),
            }
        }

        if self.session.registry().adapters().any(|a| a.powered) {
            Ok(())
        } else {
            Err(Error::PowerUp)
        }
    }

    fn scan(&mut self, deadline: Instant) -> Result<Step> {
        let registry = self.session.registry();

        for device in self.criteria.incomplete(registry) {
            if !self.reported_incomplete.insert(device.path().to_string()) {
                continue;
            }
            for uuid in self.criteria.profiles().missing_from(&device.uuids) {
                warn!("device {} does not offer {}", device.name, uuid);
            }
        }

        let mut usable = self.criteria.usable(registry);
        match usable.len() {
            0 => {}
            1 => return Ok(Step::ConnectProfiles(usable.remove(0))),
            _ => return Ok(Step::Report(usable)),
        }

        if Instant::now() >= deadline {
            return Err(Error::Timeout(self.config.timeouts.overall()));
        }

        let pairable = self.criteria.pairable(registry);
        if pairable.is_empty() {
            Ok(Step::Discover)
        } else {
            Ok(Step::Pair(pairable))
        }
    }

    fn pair_all(&mut self, candidates: &[Handle], deadline: Instant) -> Result<()> {
        for device in candidates {
            if Instant::now() >= deadline {
                break;
            }
            match self.session.registry().resolve_device(device) {
                Some(d) if !d.paired => {}
                _ => continue,
            }
            let label = describe(self.session.registry(), device);
            info!("trying to pair with {}", label);

            let call_deadline = (Instant::now() + self.config.timeouts.call()).min(deadline);
            match self.call(Request::Pair { device: device.path.clone() }, call_deadline) {
                Ok(_) => {
                    info!("paired with {}", label);
                    self.trust(device, &label, deadline)?;
                }
                Err(Error::Bluez(BluezError::AlreadyExists(_))) => {
                    info!("{} is already paired", label);
                    self.trust(device, &label, deadline)?;
                }
                Err(Error::Bluez(e)) => {
                    warn!("pairing with {} failed: {}", label, e);
                    self.forget(device)?;
                }
                Err(e @ Error::CallTimeout { .. }) => warn!("pairing with {}: {}", label, e),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn trust(&mut self, device: &Handle, label: &str, deadline: Instant) -> Result<()> {
        match self.session.registry().resolve_device(device) {
            Some(d) if !d.trusted => {}
            _ => return Ok(()),
        }

        let deadline = (Instant::now() + self.config.timeouts.trust()).min(deadline);
        let pending = self.session.issue(Request::set_trusted(&device.path, true))?;
        self.session.pump_until(deadline, |registry| {
            registry.resolve_device(device).map_or(true, |d| d.trusted)
        })?;

        if pending.is_ready(self.session) {
            if let Err(e) = pending.resolve(self.session) {
                warn!("failed to trust {}: {}", label, e);
            }
        } else {
            pending.abandon(self.session);
        }

        match self.session.registry().resolve_device(device) {
            Some(d) if d.trusted => info!("{} is trusted", label),
            Some(_) => warn!("{} did not become trusted", label),
            None => warn!("{} went away", label),
        }
        Ok(())
    }

    /// Drop a device that failed to pair so discovery can bring it back fresh.
    fn forget(&mut self, device: &Handle) -> Result<()> {
        let adapter = match self
            .session
            .registry()
            .resolve_device(device)
            .and_then(|d| d.adapter.clone())
        {
            Some(adapter) => adapter,
            None => return Ok(()),
        };

        debug!("forgetting {}", device.path);
        let request = Request::RemoveDevice {
            adapter,
            device: device.path.clone(),
        };
        let deadline = Instant::now() + self.config.timeouts.call();
        match self.call(request, deadline) {
            Ok(_) => Ok(()),
            Err(e @ (Error::Bluez(_) | Error::CallTimeout { .. })) => {
                warn!("failed to forget {}: {}", device.path, e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn discover(&mut self) -> Result<()> {
        let registry = self.session.registry();
        let powered: Vec<(Handle, String)> = registry
            .adapters()
            .filter(|a| a.powered)
            .map(|a| (a.handle(), adapter_label(a)))
            .collect();

        if powered.is_empty() {
            warn!("no powered controller left to discover with");
            return Err(Error::Discovery);
        }
        if registry.adapters().any(|a| a.powered && a.discovering) {
            return Ok(());
        }

        let deadline = Instant::now() + self.config.timeouts.discovery();
        let mut started = 0;
        for (adapter, label) in &powered {
            info!("starting discovery on {}", label);
            let request = Request::StartDiscovery {
                adapter: adapter.path.clone(),
            };
            match self.call(request, deadline) {
                Ok(_) => started += 1,
                Err(Error::Bluez(e)) if is_in_progress(&e) => started += 1,
                Err(e @ (Error::Bluez(_) | Error::CallTimeout { .. })) => {
                    warn!("failed to start discovery on {}: {}", label, e)
                }
                Err(e) => return Err(e),
            }
        }
        if started == 0 {
            return Err(Error::Discovery);
        }

        let discovering = self.session.pump_until(deadline, |registry| {
            powered.iter().all(|(adapter, _)| {
                registry
                    .resolve_adapter(adapter)
                    .map_or(true, |a| a.discovering)
            })
        })?;
        if discovering {
            info!("discovering");
        } else {
            warn!("not every controller reported discovering");
        }
        Ok(())
    }

    fn connect_profiles(&mut self, device: &Handle, deadline: Instant) -> Result<Outcome> {
        let summary = DeviceSummary::of(self.session.registry(), device);
        info!("apparently usable pairing with {} found", summary);

        let criteria = self.criteria;
        let mut connected = Vec::new();
        for uuid in criteria.profiles().iter() {
            info!("connecting profile {}", uuid);
            let request = Request::ConnectProfile {
                device: device.path.clone(),
                uuid: uuid.to_string(),
            };
            let call_deadline = (Instant::now() + self.config.timeouts.call()).min(deadline);
            match self.call(request, call_deadline) {
                Ok(_) => {}
                Err(Error::Bluez(BluezError::AlreadyConnected(_))) => {
                    debug!("profile {} already connected", uuid)
                }
                Err(Error::Bluez(source)) => {
                    return Err(Error::ProfileConnection {
                        device: summary.to_string(),
                        uuid: uuid.to_string(),
                        source,
                    })
                }
                Err(e) => return Err(e),
            }
            connected.push(uuid.to_string());
        }

        Ok(Outcome::Ready {
            device: summary,
            connected_profiles: connected,
        })
    }
}
