//! Subscriber callbacks for session events.
//!
//! Handlers run synchronously on the dispatcher; a panicking handler is
//! logged and swallowed so it can never take the dispatcher down with it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::RwLock;

use log::warn;

use crate::error::Error;
use crate::stanza::{Iq, Message, Presence};

type Subscriber<T> = Box<dyn Fn(&T) + Send + Sync>;

pub(crate) struct Handlers {
    error: RwLock<Vec<Subscriber<Error>>>,
    iq: RwLock<Vec<Subscriber<Iq>>>,
    message: RwLock<Vec<Subscriber<Message>>>,
    presence: RwLock<Vec<Subscriber<Presence>>>,
}

fn emit<T>(subscribers: &RwLock<Vec<Subscriber<T>>>, what: &'static str, value: &T) {
    for subscriber in subscribers.read().unwrap().iter() {
        if catch_unwind(AssertUnwindSafe(|| subscriber(value))).is_err() {
            warn!("a {} handler panicked; continuing", what);
        }
    }
}

impl Handlers {
    pub(crate) fn new() -> Handlers {
        Handlers {
            error: RwLock::new(Vec::new()),
            iq: RwLock::new(Vec::new()),
            message: RwLock::new(Vec::new()),
            presence: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe_error(&self, f: Subscriber<Error>) {
        self.error.write().unwrap().push(f);
    }

    pub(crate) fn subscribe_iq(&self, f: Subscriber<Iq>) {
        self.iq.write().unwrap().push(f);
    }

    pub(crate) fn subscribe_message(&self, f: Subscriber<Message>) {
        self.message.write().unwrap().push(f);
    }

    pub(crate) fn subscribe_presence(&self, f: Subscriber<Presence>) {
        self.presence.write().unwrap().push(f);
    }

    pub(crate) fn emit_error(&self, error: &Error) {
        emit(&self.error, "error", error);
    }

    pub(crate) fn emit_iq(&self, iq: &Iq) {
        emit(&self.iq, "iq", iq);
    }

    pub(crate) fn emit_message(&self, message: &Message) {
        emit(&self.message, "message", message);
    }

    pub(crate) fn emit_presence(&self, presence: &Presence) {
        emit(&self.presence, "presence", presence);
    }
}
