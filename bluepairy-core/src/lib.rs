/*!
 * BLUEPAIRY core
 * Finds, pairs and connects a Bluetooth device by talking to BlueZ over the bus
 */

pub mod agent;
pub mod bus;
pub mod config;
pub mod criteria;
pub mod error;
pub mod model;
pub mod pending;
pub mod profiles;
pub mod properties;
pub mod registry;
pub mod session;
pub mod value;
pub mod workflow;

pub use agent::{Agent, FixedPin, PinPolicy, SerialDerivedPin};
pub use bus::{Event, Request, Transport};
pub use config::Config;
pub use criteria::Criteria;
pub use error::{BluezError, Error, Result};
pub use profiles::{ExpectedProfiles, HID_PROFILE};
pub use registry::Registry;
pub use session::Session;
pub use workflow::{DeviceSummary, Outcome, Workflow};
