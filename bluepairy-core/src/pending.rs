/*!
 * Pending Call
 * One in-flight method call, resolved by pumping the session
 */

use std::time::Instant;

use crate::bus::{Payload, Reply, Serial, Transport};
use crate::error::{Error, Result};
use crate::session::Session;

#[derive(Debug)]
#[must_use = "a pending call does nothing unless resolved or abandoned"]
pub struct PendingCall {
    serial: Serial,
    call: String,
    issued: Instant,
}

impl PendingCall {
    pub(crate) fn new(serial: Serial, call: String) -> Self {
        Self {
            serial,
            call,
            issued: Instant::now(),
        }
    }

    pub fn serial(&self) -> Serial {
        self.serial
    }

    /// Non-blocking: whether the reply has been received.
    pub fn is_ready<T: Transport>(&self, session: &Session<T>) -> bool {
        session.has_reply(self.serial)
    }

    /// Pump until the reply arrives or `deadline` passes.
    pub fn wait<T: Transport>(&self, session: &mut Session<T>, deadline: Instant) -> Result<bool> {
        loop {
            if self.is_ready(session) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            session.pump()?;
        }
    }

    /// Like [`PendingCall::wait`], but running out of time abandons the call
    /// and fails with [`Error::CallTimeout`].
    pub fn block<T: Transport>(&self, session: &mut Session<T>, deadline: Instant) -> Result<()> {
        if self.wait(session, deadline)? {
            return Ok(());
        }
        session.abandon(self.serial);
        Err(Error::CallTimeout {
            call: self.call.clone(),
            timeout: self.issued.elapsed(),
        })
    }

    /// The reply payload, or the typed error the daemon answered with.
    /// Blocks for at most the session's call timeout if the reply is not
    /// there yet.
    pub fn resolve<T: Transport>(self, session: &mut Session<T>) -> Result<Payload> {
        if !self.is_ready(session) {
            let deadline = self.issued + session.call_timeout();
            self.block(session, deadline)?;
        }
        match session.take_reply(self.serial) {
            Some(Reply::Return(payload)) => Ok(payload),
            Some(Reply::Error(e)) => Err(e.into()),
            Some(Reply::Malformed(reason)) => Err(Error::MalformedReply {
                call: self.call,
                reason,
            }),
            None => Err(Error::Transport(format!("reply to {} went missing", self.call))),
        }
    }

    /// Stop waiting for the reply.
    pub fn abandon<T: Transport>(self, session: &mut Session<T>) {
        session.abandon(self.serial);
    }
}
