//! Probabilistic garbage collection of expired items after writes.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Result;
use crate::storage::{Event, EventPipeline, Operation};

use super::{ListenerSet, Plugin, parse_options};

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ClearExpiredOptions {
    /// Clear on average once every `clearing_factor` writes. `0` disables clearing.
    pub clearing_factor: u32,
}

pub struct ClearExpiredByFactor {
    options: ClearExpiredOptions,
    listeners: ListenerSet,
}

impl ClearExpiredByFactor {
    pub const NAME: &'static str = "ClearExpiredByFactor";

    pub fn new(options: ClearExpiredOptions) -> Self {
        Self {
            options,
            listeners: ListenerSet::new(),
        }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        Ok(Self::new(parse_options(Self::NAME, options)?))
    }

    pub fn options(&self) -> ClearExpiredOptions {
        self.options
    }

    fn should_clear(&self) -> bool {
        match self.options.clearing_factor {
            0 => false,
            factor => rand::thread_rng().gen_range(1..=factor) == 1,
        }
    }

    fn on_write_post(&self, event: &mut Event<'_>) -> Result<()> {
        if !self.should_clear() {
            return Ok(());
        }
        let hook = event.hook();
        match event.storage().as_clear_expired() {
            Some(storage) => {
                storage.clear_expired()?;
                debug!(hook = %hook, "expired items cleared");
            }
            None => debug!(hook = %hook, "storage cannot clear expired items"),
        }
        Ok(())
    }
}

impl Plugin for ClearExpiredByFactor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn attach(self: Arc<Self>, events: &mut EventPipeline, priority: i32) {
        for operation in [
            Operation::SetItem,
            Operation::SetItems,
            Operation::AddItem,
            Operation::AddItems,
        ] {
            let plugin = Arc::clone(&self);
            self.listeners
                .on_post(events, operation, priority, move |event| {
                    plugin.on_write_post(event)
                });
        }
    }

    fn detach(&self, events: &mut EventPipeline) {
        self.listeners.detach_all(events);
    }
}

impl fmt::Debug for ClearExpiredByFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClearExpiredByFactor")
            .field("options", &self.options)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
