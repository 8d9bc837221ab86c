//! Hook names and event payloads.
//!
//! Every storage operation fires `{operation}.pre` before the backend runs and `{operation}.post`
//! after it. Listeners receive the same [`Event`] instance in turn, so a mutation made by one
//! listener is visible to the next one and to the adapter once dispatch finishes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{CacheError, Result};

use super::backend::Backend;
use super::capabilities::Capabilities;

/// Storage operations that fire hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    GetItem,
    GetItems,
    HasItem,
    HasItems,
    SetItem,
    SetItems,
    AddItem,
    AddItems,
    ReplaceItem,
    ReplaceItems,
    CheckAndSetItem,
    TouchItem,
    TouchItems,
    RemoveItem,
    RemoveItems,
    GetCapabilities,
}

impl Operation {
    pub const ALL: [Operation; 16] = [
        Operation::GetItem,
        Operation::GetItems,
        Operation::HasItem,
        Operation::HasItems,
        Operation::SetItem,
        Operation::SetItems,
        Operation::AddItem,
        Operation::AddItems,
        Operation::ReplaceItem,
        Operation::ReplaceItems,
        Operation::CheckAndSetItem,
        Operation::TouchItem,
        Operation::TouchItems,
        Operation::RemoveItem,
        Operation::RemoveItems,
        Operation::GetCapabilities,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::GetItem => "getItem",
            Operation::GetItems => "getItems",
            Operation::HasItem => "hasItem",
            Operation::HasItems => "hasItems",
            Operation::SetItem => "setItem",
            Operation::SetItems => "setItems",
            Operation::AddItem => "addItem",
            Operation::AddItems => "addItems",
            Operation::ReplaceItem => "replaceItem",
            Operation::ReplaceItems => "replaceItems",
            Operation::CheckAndSetItem => "checkAndSetItem",
            Operation::TouchItem => "touchItem",
            Operation::TouchItems => "touchItems",
            Operation::RemoveItem => "removeItem",
            Operation::RemoveItems => "removeItems",
            Operation::GetCapabilities => "getCapabilities",
        }
    }

    pub fn pre(self) -> Hook {
        Hook {
            operation: self,
            phase: Phase::Pre,
        }
    }

    pub fn post(self) -> Hook {
        Hook {
            operation: self,
            phase: Phase::Post,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Pre,
    Post,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pre => "pre",
            Phase::Post => "post",
        }
    }
}

/// A named interception point: one operation in one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hook {
    pub operation: Operation,
    pub phase: Phase,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.operation.as_str(), self.phase.as_str())
    }
}

impl FromStr for Hook {
    type Err = CacheError;

    fn from_str(name: &str) -> Result<Self> {
        let unknown = || CacheError::invalid_argument(format!("unknown hook `{name}`"));
        let (operation, phase) = name.rsplit_once('.').ok_or_else(unknown)?;
        let operation = Operation::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == operation)
            .ok_or_else(unknown)?;
        match phase {
            "pre" => Ok(operation.pre()),
            "post" => Ok(operation.post()),
            _ => Err(unknown()),
        }
    }
}

/// Arguments of an operation, mutable by pre listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    None,
    Key {
        key: String,
    },
    Keys {
        keys: Vec<String>,
    },
    Item {
        key: String,
        value: Value,
    },
    Items {
        items: BTreeMap<String, Value>,
    },
    CheckAndSet {
        token: Value,
        key: String,
        value: Value,
    },
}

impl Params {
    pub fn key(&self) -> Option<&str> {
        match self {
            Params::Key { key } | Params::Item { key, .. } | Params::CheckAndSet { key, .. } => {
                Some(key)
            }
            Params::None | Params::Keys { .. } | Params::Items { .. } => None,
        }
    }

    pub fn value_mut(&mut self) -> Option<&mut Value> {
        match self {
            Params::Item { value, .. } | Params::CheckAndSet { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn token_mut(&mut self) -> Option<&mut Value> {
        match self {
            Params::CheckAndSet { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn items_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Params::Items { items } => Some(items),
            _ => None,
        }
    }

    pub(crate) fn expect_key(&self, operation: Operation) -> Result<&str> {
        match self {
            Params::Key { key } => Ok(key),
            _ => Err(mismatch(operation, "parameters")),
        }
    }

    pub(crate) fn expect_keys(&self, operation: Operation) -> Result<&[String]> {
        match self {
            Params::Keys { keys } => Ok(keys),
            _ => Err(mismatch(operation, "parameters")),
        }
    }

    pub(crate) fn expect_item(&self, operation: Operation) -> Result<(&str, &Value)> {
        match self {
            Params::Item { key, value } => Ok((key, value)),
            _ => Err(mismatch(operation, "parameters")),
        }
    }

    pub(crate) fn expect_items(&self, operation: Operation) -> Result<&BTreeMap<String, Value>> {
        match self {
            Params::Items { items } => Ok(items),
            _ => Err(mismatch(operation, "parameters")),
        }
    }

    pub(crate) fn expect_check_and_set(
        &self,
        operation: Operation,
    ) -> Result<(&Value, &str, &Value)> {
        match self {
            Params::CheckAndSet { token, key, value } => Ok((token, key, value)),
            _ => Err(mismatch(operation, "parameters")),
        }
    }
}

/// The value an operation hands back to its caller, mutable by post listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Single read; `None` is a miss.
    Item(Option<Value>),
    /// Plural read; only hits are present.
    Items(BTreeMap<String, Value>),
    Flag(bool),
    /// Found keys for `hasItems`, unprocessed keys for plural writes.
    Keys(Vec<String>),
    Capabilities(Capabilities),
}

impl Outcome {
    pub(crate) fn into_item(self, operation: Operation) -> Result<Option<Value>> {
        match self {
            Outcome::Item(item) => Ok(item),
            _ => Err(mismatch(operation, "result")),
        }
    }

    pub(crate) fn into_items(self, operation: Operation) -> Result<BTreeMap<String, Value>> {
        match self {
            Outcome::Items(items) => Ok(items),
            _ => Err(mismatch(operation, "result")),
        }
    }

    pub(crate) fn into_flag(self, operation: Operation) -> Result<bool> {
        match self {
            Outcome::Flag(flag) => Ok(flag),
            _ => Err(mismatch(operation, "result")),
        }
    }

    pub(crate) fn into_keys(self, operation: Operation) -> Result<Vec<String>> {
        match self {
            Outcome::Keys(keys) => Ok(keys),
            _ => Err(mismatch(operation, "result")),
        }
    }

    pub(crate) fn into_capabilities(self, operation: Operation) -> Result<Capabilities> {
        match self {
            Outcome::Capabilities(capabilities) => Ok(capabilities),
            _ => Err(mismatch(operation, "result")),
        }
    }
}

fn mismatch(operation: Operation, slot: &str) -> CacheError {
    CacheError::runtime(format!(
        "a listener left {slot} of the wrong shape for operation `{operation}`"
    ))
}

/// One dispatch of one hook.
///
/// Pre events carry the operation's parameters and no result unless a listener supplies one to
/// short-circuit the backend. Post events carry the parameters as the backend saw them and the
/// result about to be returned.
pub struct Event<'a> {
    hook: Hook,
    params: Params,
    result: Option<Outcome>,
    propagation_stopped: bool,
    storage: &'a mut dyn Backend,
}

impl<'a> Event<'a> {
    pub fn new(hook: Hook, params: Params, storage: &'a mut dyn Backend) -> Self {
        Self {
            hook,
            params,
            result: None,
            propagation_stopped: false,
            storage,
        }
    }

    pub fn hook(&self) -> Hook {
        self.hook
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    pub fn result(&self) -> Option<&Outcome> {
        self.result.as_ref()
    }

    pub fn result_mut(&mut self) -> Option<&mut Outcome> {
        self.result.as_mut()
    }

    pub fn set_result(&mut self, result: Outcome) {
        self.result = Some(result);
    }

    /// Skip the remaining listeners of this dispatch.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    /// The backend the operation runs against.
    pub fn storage(&mut self) -> &mut dyn Backend {
        &mut *self.storage
    }

    /// A result supplied by a pre listener that also stopped propagation.
    pub(crate) fn take_short_circuit(&mut self) -> Option<Outcome> {
        if self.propagation_stopped {
            self.result.take()
        } else {
            None
        }
    }

    pub(crate) fn split(&mut self) -> (&mut dyn Backend, &Params) {
        (&mut *self.storage, &self.params)
    }

    /// Turn a finished pre event into the matching post event.
    pub(crate) fn into_post(self, result: Outcome) -> Event<'a> {
        Event {
            hook: self.hook.operation.post(),
            params: self.params,
            result: Some(result),
            propagation_stopped: false,
            storage: self.storage,
        }
    }

    pub(crate) fn into_result(self) -> Result<Outcome> {
        let hook = self.hook;
        self.result.ok_or_else(|| {
            CacheError::runtime(format!("a listener on `{hook}` removed the operation result"))
        })
    }
}

impl fmt::Debug for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("hook", &self.hook)
            .field("params", &self.params)
            .field("result", &self.result)
            .field("propagation_stopped", &self.propagation_stopped)
            .finish_non_exhaustive()
    }
}
