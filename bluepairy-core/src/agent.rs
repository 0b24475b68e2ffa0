/*!
 * Pairing agent
 * Answers BlueZ PIN and confirmation requests while pairing
 */

use tracing::{info, warn};

use crate::bus::{AgentAnswer, AgentCall, AgentRequest};
use crate::registry::Registry;

/// PIN returned when a device name carries no usable serial number.
pub const DEFAULT_PIN: &str = "0000";

/// Product names whose PIN is derived from the serial number printed in the
/// device name, e.g. `Active Braille AB4/B1-12345`.
const SERIAL_PIN_PRODUCTS: &[&str] = &[
    "Actilino ALO",
    "Active Braille AB4",
    "Active Star AS4",
    "Active Star AS6",
    "Basic Braille BB4",
    "Basic Braille BB6",
    "Basic Braille BB8",
    "Basic Braille Plus BP4",
    "Basic Braille Plus BP6",
    "Basic Braille Plus BP8",
    "Braille Star 40 BS4",
    "Braillino BL2",
    "Easy Braille EBR",
];

const SERIAL_LENGTH: usize = 5;

/// Chooses the PIN to answer a `RequestPinCode` with.
pub trait PinPolicy {
    fn pin_for(&self, device_name: &str) -> String;
}

impl<F> PinPolicy for F
where
    F: Fn(&str) -> String,
{
    fn pin_for(&self, device_name: &str) -> String {
        self(device_name)
    }
}

/// Derives the PIN from a 5-digit serial number in the device name:
/// digit `i` of the PIN is `(serial[i] + i + 1) mod 10`. Anything else gets
/// [`DEFAULT_PIN`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialDerivedPin;

impl SerialDerivedPin {
    /// Digits following `<product>/<letter><digit>-`.
    fn serial(name: &str) -> Option<&str> {
        let rest = SERIAL_PIN_PRODUCTS
            .iter()
            .find_map(|product| name.strip_prefix(product))?;
        let rest = rest.strip_prefix('/')?;

        let mut chars = rest.chars();
        chars.next().filter(char::is_ascii_alphabetic)?;
        chars.next().filter(char::is_ascii_digit)?;
        let rest = chars.as_str().strip_prefix('-')?;

        let len = rest.bytes().take_while(u8::is_ascii_digit).count();
        Some(&rest[..len])
    }
}

impl PinPolicy for SerialDerivedPin {
    fn pin_for(&self, device_name: &str) -> String {
        match Self::serial(device_name) {
            Some(serial) if serial.len() == SERIAL_LENGTH => serial
                .bytes()
                .enumerate()
                .map(|(i, digit)| {
                    let value = (usize::from(digit - b'0') + i + 1) % 10;
                    char::from(b'0' + value as u8)
                })
                .collect(),
            _ => DEFAULT_PIN.to_string(),
        }
    }
}

/// Always answers with the same PIN.
#[derive(Debug, Clone)]
pub struct FixedPin(pub String);

impl PinPolicy for FixedPin {
    fn pin_for(&self, _device_name: &str) -> String {
        self.0.clone()
    }
}

pub struct Agent {
    path: String,
    policy: Box<dyn PinPolicy>,
}

impl Agent {
    pub fn new(path: impl Into<String>, policy: Box<dyn PinPolicy>) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Work out the answer to an agent call, if it gets one. Calls for
    /// other object paths are not ours and are left alone.
    pub fn handle(&self, registry: &mut Registry, call: &AgentCall) -> Option<AgentAnswer> {
        if call.path != self.path {
            warn!("ignoring method call for {}", call.path);
            return None;
        }

        match &call.request {
            AgentRequest::RequestPinCode { device } => {
                let device = registry.get_or_create_device(device);
                let pin = self.policy.pin_for(&device.name);
                info!("PIN code requested by {} ({})", device.name, device.address);
                Some(AgentAnswer::PinCode(pin))
            }
            AgentRequest::RequestConfirmation { device, passkey } => {
                info!("confirming passkey {:06} for {}", passkey, device);
                Some(AgentAnswer::Acknowledge)
            }
            AgentRequest::Other { member } => {
                warn!("unhandled agent request {}", member);
                None
            }
        }
    }
}
