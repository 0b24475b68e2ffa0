//! Final summary on stdout, as text or JSON.

use bluepairy_core::{ExpectedProfiles, Outcome};
use serde_json::json;
use tracing::error;

pub fn required_profiles(profiles: &ExpectedProfiles) {
    if profiles.is_empty() {
        return;
    }
    println!("Bluetooth profile UUIDs required to be offered by the device:");
    for uuid in profiles.iter() {
        println!("  {}", uuid);
    }
}

pub fn outcome(outcome: &Outcome, json: bool) {
    if json {
        match serde_json::to_string_pretty(outcome) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("failed to serialize result: {}", e),
        }
        return;
    }

    match outcome {
        Outcome::Ready {
            device,
            connected_profiles,
        } => {
            println!("Apparently usable pairing with {} found, good luck!", device);
            for uuid in connected_profiles {
                println!("  connected {}", uuid);
            }
        }
        Outcome::Ambiguous { devices } => {
            println!("Found {} usable devices, not connecting any:", devices.len());
            for device in devices {
                println!("  {}", device);
            }
        }
    }
}

pub fn failure(e: &anyhow::Error, json: bool) {
    if json {
        println!(
            "{}",
            json!({ "result": "failure", "error": format!("{:#}", e) })
        );
    } else {
        println!("Failed: {:#}", e);
    }
}
