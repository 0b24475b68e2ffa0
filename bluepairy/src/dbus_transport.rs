/*!
 * BlueZ over the system bus
 * Encodes requests as D-Bus messages and decodes replies, signals and agent calls
 */

use std::collections::HashMap;
use std::time::Duration;

use dbus::arg::{self, ArgType, PropMap, RefArg, Variant};
use dbus::blocking::Connection;
use dbus::message::MessageType;
use dbus::{Message, Path};
use tracing::{debug, trace};

use bluepairy_core::bus::{
    method, signal, AgentAnswer, AgentCall, AgentRequest, Event, ObjectSnapshot, Payload, Reply,
    Request, Serial, Transport, ADAPTER_INTERFACE, AGENT_INTERFACE, AGENT_MANAGER_INTERFACE,
    BLUEZ_ROOT_PATH, BLUEZ_SERVICE, DEVICE_INTERFACE, OBJECT_MANAGER_INTERFACE,
    PROPERTIES_INTERFACE,
};
use bluepairy_core::value::{PropertyList, Value};
use bluepairy_core::{BluezError, Error, Result};

const BLUEZ_SIGNALS: &str = "type='signal',sender='org.bluez'";

/// How the body of a method return has to be decoded.
#[derive(Debug, Clone, Copy)]
enum ReplyKind {
    Empty,
    ManagedObjects,
}

pub struct DbusTransport {
    conn: Connection,
    outstanding: HashMap<Serial, ReplyKind>,
    agent_path: String,
    /// Agent calls waiting for an answer, by serial.
    agent_calls: HashMap<u32, Message>,
}

impl DbusTransport {
    pub fn system(agent_path: impl Into<String>) -> Result<Self> {
        let conn = Connection::new_system()
            .map_err(|e| Error::Transport(format!("cannot connect to the system bus: {}", e)))?;
        conn.add_match_no_cb(BLUEZ_SIGNALS)
            .map_err(|e| Error::Transport(format!("cannot subscribe to BlueZ signals: {}", e)))?;
        debug!("connected to the system bus as {}", conn.unique_name());

        Ok(Self {
            conn,
            outstanding: HashMap::new(),
            agent_path: agent_path.into(),
            agent_calls: HashMap::new(),
        })
    }

    fn decode(&mut self, mut msg: Message) -> Option<Event> {
        match msg.msg_type() {
            MessageType::MethodReturn => {
                let serial = msg.get_reply_serial()?;
                let reply = match self.outstanding.remove(&serial)? {
                    ReplyKind::Empty => Reply::Return(Payload::Empty),
                    ReplyKind::ManagedObjects => decode_managed_objects(&msg),
                };
                Some(Event::Reply { serial, reply })
            }
            MessageType::Error => {
                let serial = msg.get_reply_serial()?;
                self.outstanding.remove(&serial)?;
                let error = match msg.as_result() {
                    Err(e) => BluezError::from_name(
                        e.name().unwrap_or_default(),
                        e.message().unwrap_or_default(),
                    ),
                    Ok(_) => return None,
                };
                Some(Event::Reply {
                    serial,
                    reply: Reply::Error(error),
                })
            }
            MessageType::Signal => decode_signal(&msg),
            MessageType::MethodCall => self.decode_agent_call(msg),
        }
    }

    fn decode_agent_call(&mut self, msg: Message) -> Option<Event> {
        let token = msg.get_serial()?;
        let path = msg.path()?.to_string();
        let member = msg.member()?.to_string();
        let interface = msg.interface().map(|i| i.to_string()).unwrap_or_default();

        let request = match member.as_str() {
            _ if interface != AGENT_INTERFACE => AgentRequest::Other {
                member: member.clone(),
            },
            method::REQUEST_PIN_CODE => {
                let device: Path = msg.read1().ok()?;
                AgentRequest::RequestPinCode {
                    device: device.to_string(),
                }
            }
            method::REQUEST_CONFIRMATION => {
                let (device, passkey): (Path, u32) = msg.read2().ok()?;
                AgentRequest::RequestConfirmation {
                    device: device.to_string(),
                    passkey,
                }
            }
            _ => AgentRequest::Other {
                member: member.clone(),
            },
        };

        let call = AgentCall {
            token,
            path,
            request,
        };
        if needs_answer(&call, &self.agent_path) {
            self.agent_calls.insert(token, msg);
        }
        Some(Event::AgentCall(call))
    }

    fn push(&self, msg: Message, what: &str) -> Result<u32> {
        let serial = self
            .conn
            .channel()
            .send(msg)
            .map_err(|()| Error::Transport(format!("failed to send {}", what)))?;
        self.conn.channel().flush();
        Ok(serial)
    }
}

impl Transport for DbusTransport {
    fn send(&mut self, request: Request) -> Result<Serial> {
        let kind = match request {
            Request::GetManagedObjects => ReplyKind::ManagedObjects,
            _ => ReplyKind::Empty,
        };
        let msg = encode(&request).map_err(Error::Transport)?;
        let serial = self.push(msg, &request.to_string())?;
        self.outstanding.insert(serial, kind);
        Ok(serial)
    }

    fn answer(&mut self, call: &AgentCall, answer: AgentAnswer) -> Result<()> {
        let msg = self
            .agent_calls
            .remove(&call.token)
            .ok_or_else(|| Error::Transport(format!("no agent call {} to answer", call.token)))?;
        let reply = match answer {
            AgentAnswer::PinCode(pin) => msg.method_return().append1(pin),
            AgentAnswer::Acknowledge => msg.method_return(),
        };
        self.push(reply, "agent reply")?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<Event>> {
        self.conn
            .channel()
            .read_write(Some(timeout))
            .map_err(|()| Error::Transport("lost connection to the system bus".into()))?;

        let mut events = Vec::new();
        while let Some(msg) = self.conn.channel().pop_message() {
            trace!("<- {:?}", msg);
            if let Some(event) = self.decode(msg) {
                events.push(event);
            }
        }
        Ok(events)
    }
}

/// Only requests to our own agent object get answered; keep nothing else.
fn needs_answer(call: &AgentCall, agent_path: &str) -> bool {
    call.path == agent_path && !matches!(call.request, AgentRequest::Other { .. })
}

fn method_call(path: &str, interface: &str, member: &str) -> Result<Message, String> {
    let path = Path::new(path.to_string())?;
    Message::new_method_call(BLUEZ_SERVICE, path, interface, member)
}

fn encode(request: &Request) -> Result<Message, String> {
    let member = request.member();
    let msg = match request {
        Request::GetManagedObjects => method_call("/", OBJECT_MANAGER_INTERFACE, member)?,
        Request::RegisterAgent { agent, capability } => {
            method_call(BLUEZ_ROOT_PATH, AGENT_MANAGER_INTERFACE, member)?
                .append2(Path::new(agent.clone())?, capability.as_str())
        }
        Request::SetProperty {
            path,
            interface,
            name,
            value,
        } => {
            let msg = method_call(path, PROPERTIES_INTERFACE, member)?;
            match value {
                Value::Bool(b) => msg.append3(interface.as_str(), name.as_str(), Variant(*b)),
                Value::Str(s) => {
                    msg.append3(interface.as_str(), name.as_str(), Variant(s.as_str()))
                }
                other => return Err(format!("cannot set {} to a {} value", name, other.kind())),
            }
        }
        Request::StartDiscovery { adapter } => {
            method_call(adapter, ADAPTER_INTERFACE, member)?
        }
        Request::RemoveDevice { adapter, device } => {
            method_call(adapter, ADAPTER_INTERFACE, member)?
                .append1(Path::new(device.clone())?)
        }
        Request::Pair { device } => method_call(device, DEVICE_INTERFACE, member)?,
        Request::ConnectProfile { device, uuid } => {
            method_call(device, DEVICE_INTERFACE, member)?.append1(uuid.as_str())
        }
    };
    Ok(msg)
}

fn decode_signal(msg: &Message) -> Option<Event> {
    let path = msg.path()?.to_string();
    let interface = msg.interface()?;
    let member = msg.member()?;

    match (&*interface, &*member) {
        (PROPERTIES_INTERFACE, signal::PROPERTIES_CHANGED) => {
            let (interface, changed): (String, PropMap) = msg.read2().ok()?;
            Some(Event::PropertiesChanged {
                path,
                interface,
                changed: decode_properties(&changed),
            })
        }
        (OBJECT_MANAGER_INTERFACE, signal::INTERFACES_ADDED) => {
            let (object, interfaces): (Path, HashMap<String, PropMap>) = msg.read2().ok()?;
            Some(Event::InterfacesAdded(decode_object(&object, &interfaces)))
        }
        (OBJECT_MANAGER_INTERFACE, signal::INTERFACES_REMOVED) => {
            let (object, interfaces): (Path, Vec<String>) = msg.read2().ok()?;
            Some(Event::InterfacesRemoved {
                path: object.to_string(),
                interfaces,
            })
        }
        _ => None,
    }
}

fn decode_managed_objects(msg: &Message) -> Reply {
    match msg.read1::<HashMap<Path, HashMap<String, PropMap>>>() {
        Ok(objects) => Reply::Return(Payload::ManagedObjects(
            objects
                .iter()
                .map(|(path, interfaces)| decode_object(path, interfaces))
                .collect(),
        )),
        Err(e) => Reply::Malformed(e.to_string()),
    }
}

fn decode_object(path: &Path, interfaces: &HashMap<String, PropMap>) -> ObjectSnapshot {
    ObjectSnapshot {
        path: path.to_string(),
        interfaces: interfaces
            .iter()
            .map(|(name, properties)| (name.clone(), decode_properties(properties)))
            .collect(),
    }
}

fn decode_properties(properties: &PropMap) -> PropertyList {
    properties
        .iter()
        .map(|(name, value)| (name.clone(), decode_value(&*value.0)))
        .collect()
}

fn decode_value(value: &(dyn RefArg + 'static)) -> Value {
    let unsupported = || Value::Unsupported(value.signature().to_string());
    match value.arg_type() {
        ArgType::Boolean => arg::cast::<bool>(value)
            .copied()
            .or_else(|| value.as_u64().map(|v| v != 0))
            .map_or_else(unsupported, Value::Bool),
        ArgType::String => value
            .as_str()
            .map_or_else(unsupported, |s| Value::Str(s.to_string())),
        ArgType::ObjectPath => value
            .as_str()
            .map_or_else(unsupported, |p| Value::ObjectPath(p.to_string())),
        ArgType::Array if &*value.signature() == "as" => value
            .as_iter()
            .and_then(|items| {
                items
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .map_or_else(unsupported, Value::StrArray),
        _ => unsupported(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = "/bluepairy/agent";
    const DEVICE: &str = "/org/bluez/hci0/dev_00_07_80_12_34_56";

    fn call(path: &str, request: AgentRequest) -> AgentCall {
        AgentCall {
            token: 7,
            path: path.to_string(),
            request,
        }
    }

    #[test]
    fn keeps_only_requests_to_our_agent() {
        let pin = || AgentRequest::RequestPinCode {
            device: DEVICE.to_string(),
        };
        assert!(needs_answer(&call(AGENT, pin()), AGENT));
        assert!(needs_answer(
            &call(
                AGENT,
                AgentRequest::RequestConfirmation {
                    device: DEVICE.to_string(),
                    passkey: 123456,
                }
            ),
            AGENT
        ));
        assert!(!needs_answer(&call("/someone/else", pin()), AGENT));
        assert!(!needs_answer(
            &call(
                AGENT,
                AgentRequest::Other {
                    member: "Release".to_string()
                }
            ),
            AGENT
        ));
    }

    #[test]
    fn decodes_property_values_by_kind() {
        let uuids = vec!["0000110e-0000-1000-8000-00805f9b34fb".to_string()];
        assert_eq!(decode_value(&true), Value::Bool(true));
        assert_eq!(decode_value(&"Braille".to_string()), Value::Str("Braille".into()));
        assert_eq!(
            decode_value(&Path::from("/org/bluez/hci0")),
            Value::ObjectPath("/org/bluez/hci0".into())
        );
        assert_eq!(
            decode_value(&uuids),
            Value::StrArray(vec!["0000110e-0000-1000-8000-00805f9b34fb".into()])
        );
        assert!(matches!(decode_value(&-42i16), Value::Unsupported(_)));
    }
}
