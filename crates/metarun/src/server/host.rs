//! # Host Environment
//!
//! The roots a chain can start from. The interpreter never reaches into the
//! process on its own; everything comes through a [`Host`].

use std::collections::HashMap;

use crate::server::value::Completion;
use crate::server::value::Throw;
use crate::server::value::Value;

pub trait Host: Send + Sync {
    /// The window owning the requesting client, or `null`.
    fn current_window(&self) -> Completion;

    /// The contents object of the requesting client, or `null`.
    fn current_web_contents(&self) -> Completion;

    /// A named built-in module member, or `undefined`.
    fn builtin(&self, name: &str) -> Completion;

    /// A named global, or `undefined`.
    fn global(&self, name: &str) -> Completion;

    /// Loads a module by name. Unknown modules throw.
    fn load_module(&self, name: &str) -> Completion;

    /// Receiver for calls whose callee was not read off an object.
    fn global_receiver(&self) -> Value {
        Value::Undefined
    }
}

/// A host backed by fixed tables, filled in with the `with_*` methods.
#[derive(Default)]
pub struct StaticHost {
    window: Option<Value>,
    web_contents: Option<Value>,
    builtins: HashMap<String, Value>,
    globals: HashMap<String, Value>,
    modules: HashMap<String, Value>,
    receiver: Value,
}

impl StaticHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(mut self, window: impl Into<Value>) -> Self {
        self.window = Some(window.into());
        self
    }

    pub fn with_web_contents(mut self, contents: impl Into<Value>) -> Self {
        self.web_contents = Some(contents.into());
        self
    }

    pub fn with_builtin(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.builtins.insert(name.to_string(), value.into());
        self
    }

    pub fn with_global(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.globals.insert(name.to_string(), value.into());
        self
    }

    pub fn with_module(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.modules.insert(name.to_string(), value.into());
        self
    }

    pub fn with_global_receiver(mut self, receiver: impl Into<Value>) -> Self {
        self.receiver = receiver.into();
        self
    }
}

impl Host for StaticHost {
    fn current_window(&self) -> Completion {
        Ok(self.window.clone().unwrap_or(Value::Null))
    }

    fn current_web_contents(&self) -> Completion {
        Ok(self.web_contents.clone().unwrap_or(Value::Null))
    }

    fn builtin(&self, name: &str) -> Completion {
        Ok(self.builtins.get(name).cloned().unwrap_or_default())
    }

    fn global(&self, name: &str) -> Completion {
        Ok(self.globals.get(name).cloned().unwrap_or_default())
    }

    fn load_module(&self, name: &str) -> Completion {
        self.modules.get(name).cloned().ok_or_else(|| {
            let thrown = Throw::error("Error", format!("Cannot find module '{}'", name));
            if let Value::Object(error) = &thrown.0 {
                error.define("code", crate::server::value::Property::data("MODULE_NOT_FOUND".into()));
            }
            thrown
        })
    }

    fn global_receiver(&self) -> Value {
        self.receiver.clone()
    }
}
