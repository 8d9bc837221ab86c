//! Priority-ordered listener chains per hook.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::error::Result;

use super::event::{Event, Hook};

/// Callback invoked for one hook.
pub type Listener = Arc<dyn Fn(&mut Event<'_>) -> Result<()> + Send + Sync>;

/// Opaque token identifying exactly one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    hook: Hook,
    id: u64,
}

impl ListenerHandle {
    pub fn hook(&self) -> Hook {
        self.hook
    }
}

struct Registration {
    id: u64,
    priority: i32,
    listener: Listener,
}

/// Synchronous event dispatcher owned by one storage adapter.
///
/// Listeners on a hook run highest priority first; equal priorities run in registration order.
/// The same ordering applies to pre and post hooks, so a plugin that wants its post step to undo
/// its pre step last registers the post listener at the negated priority (see
/// [`ListenerSet`](crate::plugin::ListenerSet)).
#[derive(Default)]
pub struct EventPipeline {
    listeners: HashMap<Hook, Vec<Registration>>,
    next_id: u64,
}

impl EventPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach<F>(&mut self, hook: Hook, priority: i32, listener: F) -> ListenerHandle
    where
        F: Fn(&mut Event<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.attach_listener(hook, priority, Arc::new(listener))
    }

    pub fn attach_listener(
        &mut self,
        hook: Hook,
        priority: i32,
        listener: Listener,
    ) -> ListenerHandle {
        let id = self.next_id;
        self.next_id += 1;

        let chain = self.listeners.entry(hook).or_default();
        // after every registration with priority >= ours keeps ties in registration order
        let position = chain
            .iter()
            .position(|existing| existing.priority < priority)
            .unwrap_or(chain.len());
        chain.insert(
            position,
            Registration {
                id,
                priority,
                listener,
            },
        );

        trace!(hook = %hook, priority, listener_id = id, "listener attached");
        ListenerHandle { hook, id }
    }

    /// Remove one registration. Returns `false` if it was already gone.
    pub fn detach(&mut self, handle: ListenerHandle) -> bool {
        let Some(chain) = self.listeners.get_mut(&handle.hook) else {
            return false;
        };
        let Some(position) = chain.iter().position(|entry| entry.id == handle.id) else {
            return false;
        };
        chain.remove(position);
        if chain.is_empty() {
            self.listeners.remove(&handle.hook);
        }

        trace!(hook = %handle.hook, listener_id = handle.id, "listener detached");
        true
    }

    /// Run every listener of the event's hook against that event.
    ///
    /// Dispatch ends early when a listener fails or stops propagation.
    pub fn trigger(&self, event: &mut Event<'_>) -> Result<()> {
        let hook = event.hook();
        let Some(chain) = self.listeners.get(&hook) else {
            return Ok(());
        };

        for registration in chain {
            if event.is_propagation_stopped() {
                trace!(hook = %hook, "propagation stopped");
                break;
            }
            trace!(
                hook = %hook,
                priority = registration.priority,
                listener_id = registration.id,
                "dispatching listener"
            );
            (registration.listener)(event)?;
        }
        Ok(())
    }

    pub fn listener_count(&self, hook: Hook) -> usize {
        self.listeners.get(&hook).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for EventPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hooks: Vec<(String, usize)> = self
            .listeners
            .iter()
            .map(|(hook, chain)| (hook.to_string(), chain.len()))
            .collect();
        hooks.sort();
        f.debug_struct("EventPipeline")
            .field("listeners", &hooks)
            .finish()
    }
}
