//! vrcosc/src/router.rs
//!
//! Routes decoded messages to the handler registered for their avatar parameter
//! and to every general subscriber.
//!
//! Everything runs synchronously on the caller's thread (the transport's receive
//! loop): a slow handler delays the messages behind it. A panicking handler is
//! contained here and does not stop delivery to the others.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, trace, warn};

use crate::message::OscMessage;
use crate::{OscError, Result};

/// Callback invoked with a received message.
pub type MessageCallback = Arc<dyn Fn(&OscMessage) + Send + Sync>;

/// Handle returned by [`OscRouter::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct OscRouter {
    /// Parameter name (case-sensitive) -> handler.
    methods: DashMap<String, MessageCallback>,
    /// Ordered by id, so iteration follows registration order.
    subscribers: Mutex<BTreeMap<SubscriptionId, MessageCallback>>,
    next_id: AtomicU64,
}

impl OscRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for the avatar parameter `name`, replacing any
    /// handler already registered under that name.
    pub fn add_method<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        validate_parameter_name(name)?;
        if self.methods.insert(name.to_string(), Arc::new(handler)).is_some() {
            debug!("Replaced OSC handler for parameter '{}'", name);
        } else {
            debug!("Registered OSC handler for parameter '{}'", name);
        }
        Ok(())
    }

    /// Like [`add_method`](Self::add_method) but reports failure as `false`
    /// instead of an error, so a bad entry in a bulk registration does not
    /// abort the rest.
    pub fn try_add_method<F>(&self, name: &str, handler: F) -> bool
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        match self.add_method(name, handler) {
            Ok(()) => true,
            Err(e) => {
                warn!("Skipping OSC handler registration: {}", e);
                false
            }
        }
    }

    pub fn remove_method(&self, name: &str) -> bool {
        self.methods.remove(name).is_some()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Subscribes to every received message. Subscribers run in the order they subscribed.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().insert(id, Arc::new(callback));
        id
    }

    /// Subscribes with a bounded queue instead of a callback.
    ///
    /// Delivery never blocks the receive loop: when the queue is full the
    /// message is dropped for this subscriber and a warning is logged.
    pub fn subscribe_channel(&self, buffer: usize) -> (SubscriptionId, mpsc::Receiver<OscMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let id = self.subscribe(move |msg: &OscMessage| match tx.try_send(msg.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!("OSC subscriber queue full, dropping {}", dropped.address());
            }
            Err(TrySendError::Closed(_)) => {
                trace!("OSC subscriber receiver dropped");
            }
        });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.lock().remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Delivers `msg` to its parameter handler (if any) and then to every subscriber.
    ///
    /// Parameter handlers match on [`OscMessage::parameter_name`], so they fire
    /// for built-in parameters (`MessageKind::DefaultParameter`, e.g. `MuteSelf`)
    /// as well as user-defined `AvatarParameter`s.
    pub fn dispatch(&self, msg: &OscMessage) {
        trace!("Dispatching {}", msg);

        if let Some(name) = msg.parameter_name() {
            // Clone out of the map so a handler may (re)register methods.
            let handler = self.methods.get(name).map(|entry| entry.value().clone());
            if let Some(handler) = handler {
                invoke(&handler, msg, "parameter handler");
            }
        }

        let subscribers: Vec<MessageCallback> = self.subscribers.lock().values().cloned().collect();
        for callback in &subscribers {
            invoke(callback, msg, "subscriber");
        }
    }
}

fn invoke(callback: &MessageCallback, msg: &OscMessage, what: &str) {
    if panic::catch_unwind(AssertUnwindSafe(|| callback(msg))).is_err() {
        error!("OSC {} panicked while handling {}", what, msg.address());
    }
}

fn validate_parameter_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(OscError::Registration("parameter name is empty".into()));
    }
    if name.starts_with('/') {
        return Err(OscError::Registration(format!(
            "'{name}' looks like an address; register the bare parameter name"
        )));
    }
    if name.contains('\0') {
        return Err(OscError::Registration("parameter name contains a NUL byte".into()));
    }
    Ok(())
}
