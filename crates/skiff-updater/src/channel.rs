//! One-directional status notification sink.
//!
//! `emit` is fire-and-forget: with no UI surface attached it does nothing.
//! Listeners are invoked in subscription order on the emitter's thread, so
//! events arrive in emission order on a single logical stream. Listeners
//! must not call back into the channel.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::status::{StatusDetail, UpdateReport, UpdateState};

type Callback = Box<dyn Fn(&UpdateReport) + Send + Sync>;

struct Listener {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<Listener>,
}

#[derive(Clone, Default)]
pub struct StatusChannel {
    registry: Arc<Mutex<Registry>>,
}

impl StatusChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, state: UpdateState, detail: Option<StatusDetail>) {
        self.emit_report(&UpdateReport::new(state, detail));
    }

    pub fn emit_report(&self, report: &UpdateReport) {
        let registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for listener in &registry.listeners {
            (listener.callback)(report);
        }
    }

    /// Attach a listener. The returned guard detaches it when dropped;
    /// subscriptions are independent of one another.
    pub fn subscribe(
        &self,
        callback: impl Fn(&UpdateReport) + Send + Sync + 'static,
    ) -> Subscription {
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.push(Listener {
            id,
            callback: Box::new(callback),
        });
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }
}

pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop detaches.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.listeners.retain(|listener| listener.id != self.id);
        }
    }
}
