/*!
 * Candidate matching
 * Decides which devices are usable as-is and which still need pairing
 */

use regex::Regex;

use crate::model::{Device, Handle};
use crate::profiles::ExpectedProfiles;
use crate::registry::Registry;

#[derive(Debug, Clone)]
pub struct Criteria {
    pattern: Regex,
    profiles: ExpectedProfiles,
}

impl Criteria {
    pub fn new(pattern: Regex, profiles: ExpectedProfiles) -> Self {
        Self { pattern, profiles }
    }

    pub fn profiles(&self) -> &ExpectedProfiles {
        &self.profiles
    }

    /// Unanchored search; an empty match does not count.
    pub fn name_matches(&self, name: &str) -> bool {
        self.pattern.find_iter(name).any(|m| !m.as_str().is_empty())
    }

    fn wanted(&self, device: &Device) -> bool {
        self.name_matches(&device.name) && self.profiles.is_satisfied_by(&device.uuids)
    }

    /// Paired, on a powered adapter, matching name and profiles.
    pub fn is_usable(&self, registry: &Registry, device: &Device) -> bool {
        device.paired
            && registry.adapter_of(device).is_some_and(|adapter| adapter.powered)
            && self.wanted(device)
    }

    /// Like usable, but not paired yet.
    pub fn is_pairable(&self, registry: &Registry, device: &Device) -> bool {
        !device.paired
            && registry.adapter_of(device).is_some_and(|adapter| adapter.powered)
            && self.wanted(device)
    }

    pub fn usable(&self, registry: &Registry) -> Vec<Handle> {
        registry
            .devices()
            .filter(|device| self.is_usable(registry, device))
            .map(Device::handle)
            .collect()
    }

    /// Paired devices whose name matches but which lack an expected profile.
    pub fn incomplete<'r>(&self, registry: &'r Registry) -> Vec<&'r Device> {
        registry
            .devices()
            .filter(|device| {
                device.paired
                    && self.name_matches(&device.name)
                    && !self.profiles.is_satisfied_by(&device.uuids)
            })
            .collect()
    }

    pub fn pairable(&self, registry: &Registry) -> Vec<Handle> {
        registry
            .devices()
            .filter(|device| self.is_pairable(registry, device))
            .map(Device::handle)
            .collect()
    }
}
