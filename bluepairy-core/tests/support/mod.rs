//! In-memory stand-in for the BlueZ daemon on the other end of the bus.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::thread;
use std::time::Duration;

use bluepairy_core::bus::{
    AgentAnswer, AgentCall, AgentRequest, Event, ObjectSnapshot, Payload, Reply, Request, Serial,
    Transport, ADAPTER_INTERFACE, DEVICE_INTERFACE,
};
use bluepairy_core::config::{Config, Timeouts};
use bluepairy_core::value::{PropertyList, Value};
use bluepairy_core::{Agent, BluezError, Result, SerialDerivedPin, Session};

pub const AGENT_PATH: &str = "/bluepairy/agent";
pub const HCI0: &str = "/org/bluez/hci0";
pub const HCI1: &str = "/org/bluez/hci1";

#[derive(Debug, Clone)]
pub struct FakeAdapter {
    pub path: String,
    pub address: String,
    pub powered: bool,
    pub discovering: bool,
    /// Accepts `Powered = true` but never reports it.
    pub refuses_power: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairBehavior {
    Succeed,
    /// Ask the agent for a PIN before completing.
    AskPin,
    /// Answer with the named BlueZ error.
    Fail(&'static str),
    /// Report the device paired, then answer `AlreadyExists`.
    AlreadyPaired,
    /// Never answer.
    Hang,
}

#[derive(Debug, Clone)]
pub struct FakeDevice {
    pub path: String,
    pub adapter: String,
    pub name: String,
    pub address: String,
    pub paired: bool,
    pub trusted: bool,
    pub uuids: Vec<String>,
    pub pair: PairBehavior,
    /// Disappears instead of becoming trusted.
    pub vanishes_on_trust: bool,
}

impl FakeAdapter {
    pub fn new(path: &str, powered: bool) -> Self {
        Self {
            path: path.to_string(),
            address: "00:1A:7D:DA:71:13".to_string(),
            powered,
            discovering: false,
            refuses_power: false,
        }
    }

    fn properties(&self) -> PropertyList {
        vec![
            ("Address".into(), Value::Str(self.address.clone())),
            ("Powered".into(), Value::Bool(self.powered)),
            ("Discovering".into(), Value::Bool(self.discovering)),
        ]
    }
}

impl FakeDevice {
    pub fn new(address: &str, name: &str, uuids: &[&str]) -> Self {
        Self {
            path: format!("{}/dev_{}", HCI0, address.replace(':', "_")),
            adapter: HCI0.to_string(),
            name: name.to_string(),
            address: address.to_string(),
            paired: false,
            trusted: false,
            uuids: uuids.iter().map(|u| u.to_string()).collect(),
            pair: PairBehavior::Succeed,
            vanishes_on_trust: false,
        }
    }

    pub fn paired(mut self) -> Self {
        self.paired = true;
        self
    }

    pub fn pairing(mut self, behavior: PairBehavior) -> Self {
        self.pair = behavior;
        self
    }

    fn properties(&self) -> PropertyList {
        vec![
            ("Address".into(), Value::Str(self.address.clone())),
            ("Name".into(), Value::Str(self.name.clone())),
            ("Paired".into(), Value::Bool(self.paired)),
            ("Trusted".into(), Value::Bool(self.trusted)),
            ("Connected".into(), Value::Bool(false)),
            ("UUIDs".into(), Value::StrArray(self.uuids.clone())),
            ("Adapter".into(), Value::ObjectPath(self.adapter.clone())),
            ("RSSI".into(), Value::Unsupported("n".into())),
        ]
    }

    fn snapshot(&self) -> ObjectSnapshot {
        ObjectSnapshot {
            path: self.path.clone(),
            interfaces: vec![(DEVICE_INTERFACE.to_string(), self.properties())],
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeBluez {
    serial: Serial,
    inbox: VecDeque<Event>,
    pub adapters: BTreeMap<String, FakeAdapter>,
    pub devices: BTreeMap<String, FakeDevice>,
    /// Devices that only show up once discovery runs.
    pub hidden: Vec<FakeDevice>,
    /// Error name ConnectProfile answers with.
    pub connect_error: Option<&'static str>,
    /// Error name StartDiscovery answers with. `InProgress` still discovers.
    pub discovery_error: Option<&'static str>,
    pub malformed_snapshot: bool,
    /// Never reply to anything.
    pub mute: bool,
    /// Pair call waiting for the agent's PIN: (serial, device path).
    awaiting_pin: Option<(Serial, String)>,
    pub sent: Vec<Request>,
    pub answers: Vec<(AgentCall, AgentAnswer)>,
}

impl FakeBluez {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(mut self, adapter: FakeAdapter) -> Self {
        self.adapters.insert(adapter.path.clone(), adapter);
        self
    }

    pub fn with_device(mut self, device: FakeDevice) -> Self {
        self.devices.insert(device.path.clone(), device);
        self
    }

    pub fn with_hidden(mut self, device: FakeDevice) -> Self {
        self.hidden.push(device);
        self
    }

    pub fn push(&mut self, event: Event) {
        self.inbox.push_back(event);
    }

    pub fn sent_member(&self, member: &str) -> usize {
        self.sent.iter().filter(|r| r.member() == member).count()
    }

    fn ok(&mut self, serial: Serial) {
        self.reply(serial, Reply::Return(Payload::Empty));
    }

    fn fail(&mut self, serial: Serial, name: &str) {
        self.reply(serial, Reply::Error(BluezError::from_name(name, "fake failure")));
    }

    fn reply(&mut self, serial: Serial, reply: Reply) {
        if !self.mute {
            self.inbox.push_back(Event::Reply { serial, reply });
        }
    }

    fn changed(&mut self, path: &str, interface: &str, name: &str, value: Value) {
        self.inbox.push_back(Event::PropertiesChanged {
            path: path.to_string(),
            interface: interface.to_string(),
            changed: vec![(name.to_string(), value)],
        });
    }

    fn removed(&mut self, path: &str) {
        self.devices.remove(path);
        self.inbox.push_back(Event::InterfacesRemoved {
            path: path.to_string(),
            interfaces: vec![DEVICE_INTERFACE.to_string()],
        });
    }

    fn complete_pair(&mut self, serial: Serial, path: &str) {
        if let Some(device) = self.devices.get_mut(path) {
            device.paired = true;
        }
        self.changed(path, DEVICE_INTERFACE, "Paired", Value::Bool(true));
        self.ok(serial);
    }

    fn snapshot(&self) -> Vec<ObjectSnapshot> {
        let adapters = self.adapters.values().map(|a| ObjectSnapshot {
            path: a.path.clone(),
            interfaces: vec![(ADAPTER_INTERFACE.to_string(), a.properties())],
        });
        adapters
            .chain(self.devices.values().map(FakeDevice::snapshot))
            .collect()
    }
}

impl Transport for FakeBluez {
    fn send(&mut self, request: Request) -> Result<Serial> {
        self.serial += 1;
        let serial = self.serial;
        self.sent.push(request.clone());

        match request {
            Request::GetManagedObjects => {
                let reply = if self.malformed_snapshot {
                    Reply::Malformed("expected a{oa{sa{sv}}}".into())
                } else {
                    Reply::Return(Payload::ManagedObjects(self.snapshot()))
                };
                self.reply(serial, reply);
            }
            Request::RegisterAgent { .. } => self.ok(serial),
            Request::SetProperty { path, name, value, .. } => {
                let Value::Bool(on) = value else {
                    self.fail(serial, "org.bluez.Error.InvalidArguments");
                    return Ok(serial);
                };
                match name.as_str() {
                    "Powered" => {
                        let refuses = match self.adapters.get_mut(&path) {
                            Some(adapter) if !adapter.refuses_power => {
                                adapter.powered = on;
                                false
                            }
                            _ => true,
                        };
                        if !refuses {
                            self.changed(&path, ADAPTER_INTERFACE, "Powered", Value::Bool(on));
                        }
                        self.ok(serial);
                    }
                    "Trusted" => {
                        let vanishes = self
                            .devices
                            .get(&path)
                            .map_or(false, |d| d.vanishes_on_trust);
                        if vanishes {
                            self.removed(&path);
                            self.fail(serial, "org.freedesktop.DBus.Error.UnknownObject");
                        } else {
                            if let Some(device) = self.devices.get_mut(&path) {
                                device.trusted = on;
                            }
                            self.changed(&path, DEVICE_INTERFACE, "Trusted", Value::Bool(on));
                            self.ok(serial);
                        }
                    }
                    _ => self.fail(serial, "org.freedesktop.DBus.Error.PropertyReadOnly"),
                }
            }
            Request::StartDiscovery { adapter } => {
                if let Some(name) = self.discovery_error {
                    if !name.ends_with(".InProgress") {
                        self.fail(serial, name);
                        return Ok(serial);
                    }
                }
                if let Some(a) = self.adapters.get_mut(&adapter) {
                    a.discovering = true;
                }
                self.changed(&adapter, ADAPTER_INTERFACE, "Discovering", Value::Bool(true));
                match self.discovery_error {
                    Some(name) => self.fail(serial, name),
                    None => self.ok(serial),
                }
                for device in std::mem::take(&mut self.hidden) {
                    self.inbox.push_back(Event::InterfacesAdded(device.snapshot()));
                    self.devices.insert(device.path.clone(), device);
                }
            }
            Request::RemoveDevice { device, .. } => {
                self.removed(&device);
                self.ok(serial);
            }
            Request::Pair { device } => {
                let behavior = self.devices.get(&device).map(|d| d.pair.clone());
                match behavior {
                    Some(PairBehavior::Succeed) => self.complete_pair(serial, &device),
                    Some(PairBehavior::AskPin) => {
                        self.inbox.push_back(Event::AgentCall(AgentCall {
                            token: serial,
                            path: AGENT_PATH.to_string(),
                            request: AgentRequest::RequestPinCode {
                                device: device.clone(),
                            },
                        }));
                        self.awaiting_pin = Some((serial, device));
                    }
                    Some(PairBehavior::Fail(name)) => self.fail(serial, name),
                    Some(PairBehavior::AlreadyPaired) => {
                        if let Some(d) = self.devices.get_mut(&device) {
                            d.paired = true;
                        }
                        self.changed(&device, DEVICE_INTERFACE, "Paired", Value::Bool(true));
                        self.fail(serial, "org.bluez.Error.AlreadyExists");
                    }
                    Some(PairBehavior::Hang) => {}
                    None => self.fail(serial, "org.freedesktop.DBus.Error.UnknownObject"),
                }
            }
            Request::ConnectProfile { .. } => match self.connect_error {
                Some(name) => self.fail(serial, name),
                None => self.ok(serial),
            },
        }
        Ok(serial)
    }

    fn answer(&mut self, call: &AgentCall, answer: AgentAnswer) -> Result<()> {
        self.answers.push((call.clone(), answer));
        if let Some((serial, device)) = self.awaiting_pin.take() {
            self.complete_pair(serial, &device);
        }
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<Event>> {
        if self.inbox.is_empty() {
            thread::sleep(timeout.min(Duration::from_millis(1)));
        }
        Ok(self.inbox.drain(..).collect())
    }
}

pub fn fast_config() -> Config {
    Config {
        timeouts: Timeouts {
            power_on_ms: 100,
            trust_ms: 100,
            discovery_ms: 100,
            call_secs: 2,
            overall_secs: 1,
            pump_ms: 5,
        },
        ..Config::default()
    }
}

pub fn session(bluez: FakeBluez, config: &Config) -> Session<FakeBluez> {
    let agent = Agent::new(config.agent.path.clone(), Box::new(SerialDerivedPin));
    Session::new(bluez, agent, &config.timeouts)
}
