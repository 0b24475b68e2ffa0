/*!
 * Bus session
 * Owns the transport and the registry, and pumps bus traffic into both
 */

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::agent::Agent;
use crate::bus::{
    Event, Payload, Reply, Request, Serial, Transport, ADAPTER_INTERFACE, DEVICE_INTERFACE,
};
use crate::config::Timeouts;
use crate::error::{Error, Result};
use crate::pending::PendingCall;
use crate::registry::Registry;

pub struct Session<T> {
    transport: T,
    registry: Registry,
    agent: Agent,
    pump_interval: Duration,
    call_timeout: Duration,
    /// Calls still expecting a reply, with a description for logs.
    awaiting: HashMap<Serial, String>,
    /// Replies that arrived but were not resolved yet.
    replies: HashMap<Serial, Reply>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, agent: Agent, timeouts: &Timeouts) -> Self {
        Self {
            transport,
            registry: Registry::new(),
            agent,
            pump_interval: timeouts.pump(),
            call_timeout: timeouts.call(),
            awaiting: HashMap::new(),
            replies: HashMap::new(),
            interrupt: None,
        }
    }

    /// Make every pump fail with [`Error::Interrupted`] once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Send a method call; the reply is collected by later pumps.
    pub fn issue(&mut self, request: Request) -> Result<PendingCall> {
        let call = request.to_string();
        let serial = self.transport.send(request)?;
        debug!("-> {} (serial {})", call, serial);
        self.awaiting.insert(serial, call.clone());
        Ok(PendingCall::new(serial, call))
    }

    /// One bounded receive-and-dispatch round. Every received event is
    /// applied before this returns.
    pub fn pump(&mut self) -> Result<()> {
        if self
            .interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            return Err(Error::Interrupted);
        }

        for event in self.transport.receive(self.pump_interval)? {
            self.dispatch(event)?;
        }
        Ok(())
    }

    /// Pump until `predicate` holds or `deadline` passes. Returns whether
    /// the predicate was satisfied.
    pub fn pump_until<P>(&mut self, deadline: Instant, mut predicate: P) -> Result<bool>
    where
        P: FnMut(&Registry) -> bool,
    {
        loop {
            if predicate(&self.registry) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            self.pump()?;
        }
    }

    fn dispatch(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Reply { serial, reply } => match self.awaiting.remove(&serial) {
                Some(call) => {
                    trace!("<- reply to {} (serial {})", call, serial);
                    self.replies.insert(serial, reply);
                }
                None => debug!("discarding reply to serial {}", serial),
            },
            Event::PropertiesChanged {
                path,
                interface,
                changed,
            } => match interface.as_str() {
                ADAPTER_INTERFACE if self.registry.adapter(&path).is_some() => {
                    self.registry.update_adapter(&path, &changed)
                }
                DEVICE_INTERFACE if self.registry.device(&path).is_some() => {
                    self.registry.update_device(&path, &changed)
                }
                ADAPTER_INTERFACE | DEVICE_INTERFACE => {
                    debug!("ignoring property change of unknown object {}", path)
                }
                _ => {}
            },
            Event::InterfacesAdded(object) => self.registry.apply_snapshot(&object),
            Event::InterfacesRemoved { path, interfaces } => {
                for interface in &interfaces {
                    self.registry.remove(&path, interface);
                }
            }
            Event::AgentCall(call) => {
                if let Some(answer) = self.agent.handle(&mut self.registry, &call) {
                    if let Err(e) = self.transport.answer(&call, answer) {
                        warn!("failed to answer agent request: {}", e);
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn has_reply(&self, serial: Serial) -> bool {
        self.replies.contains_key(&serial)
    }

    pub(crate) fn take_reply(&mut self, serial: Serial) -> Option<Reply> {
        self.replies.remove(&serial)
    }

    /// Forget a call; a reply arriving later is discarded.
    pub(crate) fn abandon(&mut self, serial: Serial) {
        self.awaiting.remove(&serial);
        self.replies.remove(&serial);
    }

    /// Fill the registry from the daemon's bulk object snapshot.
    pub fn load_objects(&mut self) -> Result<()> {
        let pending = self.issue(Request::GetManagedObjects)?;
        match pending.resolve(self)? {
            Payload::ManagedObjects(objects) => {
                for object in &objects {
                    self.registry.apply_snapshot(object);
                }
                debug!(
                    "snapshot: {} adapter(s), {} device(s)",
                    self.registry.adapters().count(),
                    self.registry.devices().count()
                );
                Ok(())
            }
            Payload::Empty => Err(Error::MalformedReply {
                call: Request::GetManagedObjects.to_string(),
                reason: "empty reply".into(),
            }),
        }
    }

    /// Register our agent endpoint with the daemon's agent manager.
    pub fn register_agent(&mut self, capability: &str) -> Result<()> {
        let request = Request::RegisterAgent {
            agent: self.agent.path().to_string(),
            capability: capability.to_string(),
        };
        self.issue(request)?.resolve(self)?;
        Ok(())
    }
}
