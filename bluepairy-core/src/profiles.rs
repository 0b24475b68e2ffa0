/*!
 * Expected profile set
 * Canonical Bluetooth profile UUIDs a device has to offer
 */

use std::collections::BTreeSet;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Human Interface Device service class.
pub const HID_PROFILE: &str = "00001124-0000-1000-8000-00805f9b34fb";

/// Serial Port Profile service class.
pub const SERIAL_PORT_PROFILE: &str = "00001101-0000-1000-8000-00805f9b34fb";

/// Trailing fields of the Bluetooth base UUID `xxxxxxxx-0000-1000-8000-00805f9b34fb`.
const BASE_UUID_D2: u16 = 0x0000;
const BASE_UUID_D3: u16 = 0x1000;
const BASE_UUID_D4: [u8; 8] = [0x80, 0x00, 0x00, 0x80, 0x5f, 0x9b, 0x34, 0xfb];

/// Parse a profile UUID into its canonical lowercase hyphenated form.
///
/// Accepts full UUIDs, 16 or 32 bit short forms (`1124`, `0x1124`) and the
/// aliases `hid` and `spp`.
pub fn canonical_uuid(input: &str) -> Result<String> {
    let trimmed = input.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" => return Err(Error::InvalidUuid(input.to_string())),
        "hid" => return Ok(HID_PROFILE.to_string()),
        "spp" => return Ok(SERIAL_PORT_PROFILE.to_string()),
        _ => {}
    }

    let short = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if (short.len() == 4 || short.len() == 8) && short.bytes().all(|b| b.is_ascii_hexdigit()) {
        let value = u32::from_str_radix(short, 16)
            .map_err(|_| Error::InvalidUuid(input.to_string()))?;
        let uuid = Uuid::from_fields(value, BASE_UUID_D2, BASE_UUID_D3, &BASE_UUID_D4);
        return Ok(uuid.hyphenated().to_string());
    }

    Uuid::parse_str(trimmed)
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|_| Error::InvalidUuid(input.to_string()))
}

/// Sorted, deduplicated set of profile UUIDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExpectedProfiles(BTreeSet<String>);

impl ExpectedProfiles {
    pub fn parse<I, S>(inputs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        inputs
            .into_iter()
            .map(|s| canonical_uuid(s.as_ref()))
            .collect::<Result<BTreeSet<_>>>()
            .map(Self)
    }

    pub fn insert(&mut self, uuid: &str) -> Result<bool> {
        Ok(self.0.insert(canonical_uuid(uuid)?))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `offered` contains every expected profile.
    pub fn is_satisfied_by(&self, offered: &BTreeSet<String>) -> bool {
        self.0.is_subset(offered)
    }

    pub fn missing_from<'a>(
        &'a self,
        offered: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.0.difference(offered).map(String::as_str)
    }
}
