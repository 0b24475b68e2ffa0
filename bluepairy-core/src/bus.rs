/*!
 * Bus transport seam
 * What the pairing logic sends to and receives from the BlueZ daemon
 */

use std::fmt;
use std::time::Duration;

use crate::error::{BluezError, Result};
use crate::value::{PropertyList, Value};

// BlueZ D-Bus names
pub const BLUEZ_SERVICE: &str = "org.bluez";
pub const BLUEZ_ROOT_PATH: &str = "/org/bluez";
pub const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";
pub const DEVICE_INTERFACE: &str = "org.bluez.Device1";
pub const AGENT_INTERFACE: &str = "org.bluez.Agent1";
pub const AGENT_MANAGER_INTERFACE: &str = "org.bluez.AgentManager1";
pub const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

pub mod method {
    pub const GET_MANAGED_OBJECTS: &str = "GetManagedObjects";
    pub const REGISTER_AGENT: &str = "RegisterAgent";
    pub const SET: &str = "Set";
    pub const START_DISCOVERY: &str = "StartDiscovery";
    pub const REMOVE_DEVICE: &str = "RemoveDevice";
    pub const PAIR: &str = "Pair";
    pub const CONNECT_PROFILE: &str = "ConnectProfile";
    pub const REQUEST_PIN_CODE: &str = "RequestPinCode";
    pub const REQUEST_CONFIRMATION: &str = "RequestConfirmation";
}

pub mod signal {
    pub const PROPERTIES_CHANGED: &str = "PropertiesChanged";
    pub const INTERFACES_ADDED: &str = "InterfacesAdded";
    pub const INTERFACES_REMOVED: &str = "InterfacesRemoved";
}

pub mod property {
    pub const ADAPTER: &str = "Adapter";
    pub const ADDRESS: &str = "Address";
    pub const CONNECTED: &str = "Connected";
    pub const DISCOVERING: &str = "Discovering";
    pub const NAME: &str = "Name";
    pub const PAIRED: &str = "Paired";
    pub const POWERED: &str = "Powered";
    pub const TRUSTED: &str = "Trusted";
    pub const UUIDS: &str = "UUIDs";
}

/// Serial number the transport assigns to an outgoing call.
pub type Serial = u32;

/// Outgoing method calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    GetManagedObjects,
    RegisterAgent { agent: String, capability: String },
    SetProperty { path: String, interface: String, name: String, value: Value },
    StartDiscovery { adapter: String },
    RemoveDevice { adapter: String, device: String },
    Pair { device: String },
    ConnectProfile { device: String, uuid: String },
}

impl Request {
    pub fn set_powered(adapter: &str, powered: bool) -> Self {
        Request::SetProperty {
            path: adapter.to_string(),
            interface: ADAPTER_INTERFACE.to_string(),
            name: property::POWERED.to_string(),
            value: Value::Bool(powered),
        }
    }

    pub fn set_trusted(device: &str, trusted: bool) -> Self {
        Request::SetProperty {
            path: device.to_string(),
            interface: DEVICE_INTERFACE.to_string(),
            name: property::TRUSTED.to_string(),
            value: Value::Bool(trusted),
        }
    }

    /// Method name as it goes on the wire.
    pub fn member(&self) -> &'static str {
        match self {
            Request::GetManagedObjects => method::GET_MANAGED_OBJECTS,
            Request::RegisterAgent { .. } => method::REGISTER_AGENT,
            Request::SetProperty { .. } => method::SET,
            Request::StartDiscovery { .. } => method::START_DISCOVERY,
            Request::RemoveDevice { .. } => method::REMOVE_DEVICE,
            Request::Pair { .. } => method::PAIR,
            Request::ConnectProfile { .. } => method::CONNECT_PROFILE,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::GetManagedObjects => write!(f, "GetManagedObjects"),
            Request::RegisterAgent { agent, .. } => write!(f, "RegisterAgent({})", agent),
            Request::SetProperty { path, name, value, .. } => {
                write!(f, "Set({} {}={})", path, name, value)
            }
            Request::StartDiscovery { adapter } => write!(f, "StartDiscovery({})", adapter),
            Request::RemoveDevice { device, .. } => write!(f, "RemoveDevice({})", device),
            Request::Pair { device } => write!(f, "Pair({})", device),
            Request::ConnectProfile { device, uuid } => {
                write!(f, "ConnectProfile({}, {})", device, uuid)
            }
        }
    }
}

/// All interfaces and properties of one object, as found in a
/// `GetManagedObjects` reply or an `InterfacesAdded` signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSnapshot {
    pub path: String,
    pub interfaces: Vec<(String, PropertyList)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Empty,
    ManagedObjects(Vec<ObjectSnapshot>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Return(Payload),
    Error(BluezError),
    /// A return whose body did not have the expected structure.
    Malformed(String),
}

/// Agent method calls the daemon makes on this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentRequest {
    RequestPinCode { device: String },
    RequestConfirmation { device: String, passkey: u32 },
    Other { member: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCall {
    /// Transport-specific token used to route the answer back.
    pub token: u32,
    /// Object path the call was addressed to.
    pub path: String,
    pub request: AgentRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentAnswer {
    PinCode(String),
    Acknowledge,
}

/// Incoming traffic, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Reply { serial: Serial, reply: Reply },
    PropertiesChanged { path: String, interface: String, changed: PropertyList },
    InterfacesAdded(ObjectSnapshot),
    InterfacesRemoved { path: String, interfaces: Vec<String> },
    AgentCall(AgentCall),
}

/// A connection to the system bus, reduced to what the pairing logic needs.
pub trait Transport {
    /// Send one method call and return its serial.
    fn send(&mut self, request: Request) -> Result<Serial>;

    /// Answer an agent call previously returned by [`Transport::receive`].
    fn answer(&mut self, call: &AgentCall, answer: AgentAnswer) -> Result<()>;

    /// Wait at most `timeout` for traffic and return everything decoded.
    fn receive(&mut self, timeout: Duration) -> Result<Vec<Event>>;
}
