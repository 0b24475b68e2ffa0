/*!
 * Property Decoder
 * Turns BlueZ property dictionaries into typed field updates
 */

use std::collections::BTreeSet;

use tracing::trace;

use crate::bus::property;
use crate::model::{Adapter, Device};
use crate::value::Value;

/// Fields of an adapter present in one property payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterChanges {
    pub address: Option<String>,
    pub name: Option<String>,
    pub powered: Option<bool>,
    pub discovering: Option<bool>,
}

/// Fields of a device present in one property payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceChanges {
    pub address: Option<String>,
    pub name: Option<String>,
    pub paired: Option<bool>,
    pub trusted: Option<bool>,
    pub connected: Option<bool>,
    pub uuids: Option<BTreeSet<String>>,
    /// `Some(None)` clears the adapter association.
    pub adapter: Option<Option<String>>,
}

fn mismatch(name: &str, value: &Value) {
    trace!("ignoring {} value for property {}", value.kind(), name);
}

impl AdapterChanges {
    pub fn decode(properties: &[(String, Value)]) -> Self {
        let mut changes = Self::default();
        for (name, value) in properties {
            match (name.as_str(), value) {
                (property::ADDRESS, Value::Str(s)) => changes.address = Some(s.clone()),
                (property::NAME, Value::Str(s)) => changes.name = Some(s.clone()),
                (property::POWERED, Value::Bool(b)) => changes.powered = Some(*b),
                (property::DISCOVERING, Value::Bool(b)) => changes.discovering = Some(*b),
                (
                    property::ADDRESS | property::NAME | property::POWERED | property::DISCOVERING,
                    v,
                ) => mismatch(name, v),
                _ => {}
            }
        }
        changes
    }

    pub fn apply(&self, adapter: &mut Adapter) {
        if let Some(address) = &self.address {
            adapter.address.clone_from(address);
        }
        if let Some(name) = &self.name {
            adapter.name.clone_from(name);
        }
        if let Some(powered) = self.powered {
            adapter.powered = powered;
        }
        if let Some(discovering) = self.discovering {
            adapter.discovering = discovering;
        }
    }
}

impl DeviceChanges {
    pub fn decode(properties: &[(String, Value)]) -> Self {
        let mut changes = Self::default();
        for (name, value) in properties {
            match (name.as_str(), value) {
                (property::ADDRESS, Value::Str(s)) => changes.address = Some(s.clone()),
                (property::NAME, Value::Str(s)) => changes.name = Some(s.clone()),
                (property::PAIRED, Value::Bool(b)) => changes.paired = Some(*b),
                (property::TRUSTED, Value::Bool(b)) => changes.trusted = Some(*b),
                (property::CONNECTED, Value::Bool(b)) => changes.connected = Some(*b),
                (property::UUIDS, Value::StrArray(items)) => {
                    changes.uuids = Some(items.iter().map(|u| u.to_ascii_lowercase()).collect())
                }
                (property::ADAPTER, Value::ObjectPath(p)) => {
                    changes.adapter = Some(if p.is_empty() { None } else { Some(p.clone()) })
                }
                (
                    property::ADDRESS
                    | property::NAME
                    | property::PAIRED
                    | property::TRUSTED
                    | property::CONNECTED
                    | property::UUIDS
                    | property::ADAPTER,
                    v,
                ) => mismatch(name, v),
                _ => {}
            }
        }
        changes
    }

    /// Apply to a device. The caller makes sure a referenced adapter is
    /// registered.
    pub fn apply(&self, device: &mut Device) {
        if let Some(address) = &self.address {
            device.address.clone_from(address);
        }
        if let Some(name) = &self.name {
            device.name.clone_from(name);
        }
        if let Some(paired) = self.paired {
            device.paired = paired;
        }
        if let Some(trusted) = self.trusted {
            device.trusted = trusted;
        }
        if let Some(connected) = self.connected {
            device.connected = connected;
        }
        if let Some(uuids) = &self.uuids {
            device.uuids.clone_from(uuids);
        }
        if let Some(adapter) = &self.adapter {
            device.adapter.clone_from(adapter);
        }
    }
}
