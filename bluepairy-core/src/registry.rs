/*!
 * Object Registry
 * Authoritative local view of the adapters and devices BlueZ manages
 */

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::bus::{ObjectSnapshot, ADAPTER_INTERFACE, DEVICE_INTERFACE};
use crate::model::{Adapter, Device, Handle, RecordId};
use crate::properties::{AdapterChanges, DeviceChanges};
use crate::value::Value;

#[derive(Debug, Default)]
pub struct Registry {
    adapters: BTreeMap<String, Adapter>,
    devices: BTreeMap<String, Device>,
    next_id: RecordId,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_adapter(&mut self, path: &str) -> &mut Adapter {
        let next_id = &mut self.next_id;
        self.adapters.entry(path.to_string()).or_insert_with(|| {
            *next_id += 1;
            debug!("new adapter {}", path);
            Adapter::new(path, *next_id)
        })
    }

    pub fn get_or_create_device(&mut self, path: &str) -> &mut Device {
        let next_id = &mut self.next_id;
        self.devices.entry(path.to_string()).or_insert_with(|| {
            *next_id += 1;
            debug!("new device {}", path);
            Device::new(path, *next_id)
        })
    }

    pub fn adapter(&self, path: &str) -> Option<&Adapter> {
        self.adapters.get(path)
    }

    pub fn device(&self, path: &str) -> Option<&Device> {
        self.devices.get(path)
    }

    /// Adapters in object path order.
    pub fn adapters(&self) -> impl Iterator<Item = &Adapter> {
        self.adapters.values()
    }

    /// Devices in object path order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// The adapter a device belongs to, if it is still registered.
    pub fn adapter_of(&self, device: &Device) -> Option<&Adapter> {
        device.adapter.as_deref().and_then(|path| self.adapters.get(path))
    }

    /// Resolve a handle to the adapter it names, if that record is still live.
    pub fn resolve_adapter(&self, handle: &Handle) -> Option<&Adapter> {
        self.adapters
            .get(&handle.path)
            .filter(|adapter| adapter.id() == handle.id)
    }

    /// Resolve a handle to the device it names, if that record is still live.
    pub fn resolve_device(&self, handle: &Handle) -> Option<&Device> {
        self.devices
            .get(&handle.path)
            .filter(|device| device.id() == handle.id)
    }

    /// Whether a handle still names a registered record. Only the key and
    /// the generation are compared.
    pub fn is_live(&self, handle: &Handle) -> bool {
        self.resolve_adapter(handle).is_some() || self.resolve_device(handle).is_some()
    }

    pub fn remove_adapter(&mut self, path: &str) -> bool {
        match self.adapters.remove(path) {
            Some(_) => {
                debug!("adapter {} removed", path);
                true
            }
            None => {
                warn!("asked to remove unknown adapter {}", path);
                false
            }
        }
    }

    pub fn remove_device(&mut self, path: &str) -> bool {
        match self.devices.remove(path) {
            Some(_) => {
                debug!("device {} removed", path);
                true
            }
            None => {
                warn!("asked to remove unknown device {}", path);
                false
            }
        }
    }

    /// Evict the record for `path` of the kind named by `interface`.
    /// Interfaces other than adapter and device are ignored.
    pub fn remove(&mut self, path: &str, interface: &str) -> bool {
        match interface {
            ADAPTER_INTERFACE => self.remove_adapter(path),
            DEVICE_INTERFACE => self.remove_device(path),
            _ => false,
        }
    }

    pub fn update_adapter(&mut self, path: &str, properties: &[(String, Value)]) {
        let changes = AdapterChanges::decode(properties);
        changes.apply(self.get_or_create_adapter(path));
    }

    pub fn update_device(&mut self, path: &str, properties: &[(String, Value)]) {
        let changes = DeviceChanges::decode(properties);
        if let Some(Some(adapter)) = &changes.adapter {
            self.get_or_create_adapter(adapter);
        }
        changes.apply(self.get_or_create_device(path));
    }

    /// Create or update records from a snapshot entry. Unknown interfaces
    /// on the object are skipped.
    pub fn apply_snapshot(&mut self, object: &ObjectSnapshot) {
        for (interface, properties) in &object.interfaces {
            match interface.as_str() {
                ADAPTER_INTERFACE => self.update_adapter(&object.path, properties),
                DEVICE_INTERFACE => self.update_device(&object.path, properties),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HCI0: &str = "/org/bluez/hci0";
    const DEV: &str = "/org/bluez/hci0/dev_00_11_22_33_44_55";

    #[test]
    fn get_or_create_returns_the_same_record() {
        let mut registry = Registry::new();
        registry.get_or_create_adapter(HCI0).powered = true;

        let adapter = registry.get_or_create_adapter(HCI0);
        assert!(adapter.powered);
        assert_eq!(registry.adapters().count(), 1);
    }

    #[test]
    fn handle_dies_with_its_record() {
        let mut registry = Registry::new();
        let handle = registry.get_or_create_device(DEV).handle();
        assert!(registry.is_live(&handle));

        assert!(registry.remove(DEV, DEVICE_INTERFACE));
        assert!(!registry.is_live(&handle));

        // Same path, new record: the old handle must stay dead.
        let fresh = registry.get_or_create_device(DEV).handle();
        assert!(!registry.is_live(&handle));
        assert!(registry.is_live(&fresh));
    }

    #[test]
    fn removing_unknown_object_is_not_an_error() {
        let mut registry = Registry::new();
        assert!(!registry.remove(DEV, DEVICE_INTERFACE));
        assert!(!registry.remove(HCI0, "org.bluez.Media1"));
    }

    #[test]
    fn device_adapter_reference_creates_adapter() {
        let mut registry = Registry::new();
        registry.update_device(
            DEV,
            &[("Adapter".to_string(), Value::ObjectPath(HCI0.to_string()))],
        );

        let device = registry.device(DEV).unwrap();
        assert_eq!(registry.adapter_of(device).map(Adapter::path), Some(HCI0));
    }

    #[test]
    fn adapter_removal_is_observable_from_device() {
        let mut registry = Registry::new();
        registry.update_device(
            DEV,
            &[("Adapter".to_string(), Value::ObjectPath(HCI0.to_string()))],
        );
        registry.remove(HCI0, ADAPTER_INTERFACE);

        let device = registry.device(DEV).unwrap();
        assert!(registry.adapter_of(device).is_none());
    }

    #[test]
    fn snapshot_skips_foreign_interfaces() {
        let mut registry = Registry::new();
        registry.apply_snapshot(&ObjectSnapshot {
            path: HCI0.to_string(),
            interfaces: vec![
                ("org.freedesktop.DBus.Introspectable".to_string(), vec![]),
                (
                    ADAPTER_INTERFACE.to_string(),
                    vec![("Powered".to_string(), Value::Bool(true))],
                ),
            ],
        });

        assert!(registry.adapter(HCI0).unwrap().powered);
        assert_eq!(registry.devices().count(), 0);
    }
}
