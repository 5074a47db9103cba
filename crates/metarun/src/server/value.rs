//! # Live values
//!
//! The server-side value space: everything a chain can touch. Primitives are
//! held by value, everything else lives behind an [`ObjectRef`] whose identity
//! is the identity of its allocation.
//!
//! Thrown values are modelled as [`Throw`], so any value can be thrown, not
//! only error objects.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// Error code carried by protocol errors (unknown handles, malformed frames).
pub const RPC_ERROR_CODE: &str = "EBADRPC";
/// Error code carried by values that cannot cross the boundary.
pub const UNSUPPORTED_VALUE_CODE: &str = "EUNSUPPORTED";

/// Arrays are stored densely; lengths at or past this are refused.
pub const MAX_ARRAY_LENGTH: u32 = 1 << 24;

/// Outcome of anything that may throw.
pub type Completion = Result<Value, Throw>;

/// A host-implemented callable: `(this, args) -> result`.
pub type NativeFn = Arc<dyn Fn(&Value, &[Value]) -> Completion + Send + Sync>;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn invalid_length() -> Throw {
    Throw::error("RangeError", "Invalid array length")
}

/// A valid array length: a whole number in `0..MAX_ARRAY_LENGTH`.
fn array_length(n: f64) -> Option<usize> {
    if n < 0.0 || n.fract() != 0.0 || n >= f64::from(MAX_ARRAY_LENGTH) {
        return None;
    }
    usize::try_from(n as u32).ok()
}

fn resize(items: &mut Vec<Value>, len: usize) -> Result<(), Throw> {
    if len > MAX_ARRAY_LENGTH as usize {
        return Err(invalid_length());
    }
    items.try_reserve(len.saturating_sub(items.len())).map_err(|_| invalid_length())?;
    items.resize(len, Value::Undefined);
    Ok(())
}

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Byte block, passed by value.
    Buffer(Vec<u8>),
    /// Epoch milliseconds, passed by value.
    Date(f64),
    Object(ObjectRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Buffer(_) | Value::Date(_) => "object",
            Value::Object(o) if o.is_callable() => "function",
            Value::Object(_) => "object",
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        self.as_object().is_some_and(ObjectRef::is_callable)
    }

    /// Short human-readable rendering, used in error messages.
    pub fn display(&self) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Buffer(b) => format!("<Buffer {} bytes>", b.len()),
            Value::Date(ms) => format!("Date({})", ms),
            Value::Object(o) if o.is_error() => {
                let message = o.get("message").ok().map(|m| m.display()).unwrap_or_default();
                format!("{}: {}", o.error_name(), message)
            }
            Value::Object(o) if o.is_callable() => format!("[Function: {}]", o.function_name()),
            Value::Object(o) => format!("[object {}]", o.class_name()),
        }
    }

    /// Reads `self[name]`, running getters and walking the prototype chain.
    pub fn get_member(&self, name: &str) -> Completion {
        match self {
            Value::Undefined | Value::Null => Err(Throw::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                self.type_name(),
                name
            ))),
            Value::String(s) if name == "length" => Ok(Value::Number(s.encode_utf16().count() as f64)),
            Value::Buffer(b) if name == "length" => Ok(Value::Number(b.len() as f64)),
            Value::Object(o) => o.get(name),
            _ => Ok(Value::Undefined),
        }
    }

    /// Assigns `self[name] = value`.
    pub fn set_member(&self, name: &str, value: Value) -> Result<(), Throw> {
        match self {
            Value::Object(o) => o.set(name, value),
            Value::Undefined | Value::Null => Err(Throw::type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                self.type_name(),
                name
            ))),
            // Assignments to primitives are silently dropped, as in the host language.
            _ => Ok(()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Buffer(a), Value::Buffer(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Number(v) }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::Number(v as f64) }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::String(v.to_string()) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Value::String(v) }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self { Value::Object(v) }
}

/// A thrown value.
#[derive(Clone, Debug)]
pub struct Throw(pub Value);

impl Throw {
    pub fn error(class: &str, message: impl Into<String>) -> Self {
        Throw(Value::Object(ObjectRef::error(class, message)))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::error("TypeError", message)
    }

    /// A protocol error: the chain itself is invalid for this server.
    pub fn rpc(message: impl Into<String>) -> Self {
        let error = ObjectRef::error("Error", message);
        error.define("code", Property::data(RPC_ERROR_CODE.into()));
        error.define("errno", Property::data(Value::Number(-72.0)));
        Throw(Value::Object(error))
    }

    /// A value that cannot be represented on the wire.
    pub fn unsupported(message: impl Into<String>) -> Self {
        let error = ObjectRef::error("TypeError", message);
        error.define("code", Property::data(UNSUPPORTED_VALUE_CODE.into()));
        Throw(Value::Object(error))
    }

    /// The `message` of a thrown error, or the rendering of any other value.
    pub fn message(&self) -> String {
        match &self.0 {
            Value::Object(o) if o.is_error() => o.get("message").map(|m| m.display()).unwrap_or_default(),
            other => other.display(),
        }
    }

    /// The own `code` property of a thrown error, if it is a string.
    pub fn code(&self) -> Option<String> {
        let error = self.0.as_object()?;
        match error.own_property("code")?.slot {
            Slot::Data(Value::String(code)) => Some(code),
            _ => None,
        }
    }
}

impl std::fmt::Display for Throw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Where a property keeps its value.
#[derive(Clone)]
pub enum Slot {
    Data(Value),
    Accessor { get: Option<NativeFn>, set: Option<NativeFn> },
}

#[derive(Clone)]
pub struct Property {
    pub slot: Slot,
    pub enumerable: bool,
    pub writable: bool,
}

impl Property {
    /// Enumerable, writable data slot.
    pub fn data(value: Value) -> Self {
        Self { slot: Slot::Data(value), enumerable: true, writable: true }
    }

    /// Non-enumerable, writable data slot.
    pub fn hidden(value: Value) -> Self {
        Self { slot: Slot::Data(value), enumerable: false, writable: true }
    }

    /// Enumerable, read-only data slot.
    pub fn readonly(value: Value) -> Self {
        Self { slot: Slot::Data(value), enumerable: true, writable: false }
    }

    pub fn accessor(get: Option<NativeFn>, set: Option<NativeFn>) -> Self {
        let writable = set.is_some();
        Self { slot: Slot::Accessor { get, set }, enumerable: true, writable }
    }
}

pub struct FunctionData {
    name: String,
    call: Option<NativeFn>,
    construct: Option<NativeFn>,
}

enum PromiseState {
    Pending(Vec<(Value, Value)>),
    Fulfilled(Value),
    Rejected(Value),
}

/// A pending asynchronous result. Reactions run synchronously on settlement.
pub struct PromiseCell {
    state: Mutex<PromiseState>,
    handled: AtomicBool,
}

impl PromiseCell {
    fn new() -> Self {
        Self { state: Mutex::new(PromiseState::Pending(Vec::new())), handled: AtomicBool::new(false) }
    }

    pub fn resolve(&self, value: Value) {
        self.settle(value, true);
    }

    pub fn reject(&self, reason: Value) {
        self.settle(reason, false);
    }

    fn settle(&self, value: Value, fulfilled: bool) {
        let reactions = {
            let mut state = lock(&self.state);
            let PromiseState::Pending(reactions) = &mut *state else { return };
            let reactions = std::mem::take(reactions);
            *state = if fulfilled {
                PromiseState::Fulfilled(value.clone())
            } else {
                PromiseState::Rejected(value.clone())
            };
            reactions
        };
        for (on_fulfilled, on_rejected) in reactions {
            react(if fulfilled { &on_fulfilled } else { &on_rejected }, &value);
        }
    }

    /// Registers reactions. Either may be a non-callable, which is ignored.
    pub fn then(&self, on_fulfilled: Value, on_rejected: Value) {
        if on_rejected.is_callable() {
            self.mark_handled();
        }
        let settled = {
            let mut state = lock(&self.state);
            match &mut *state {
                PromiseState::Pending(reactions) => {
                    reactions.push((on_fulfilled.clone(), on_rejected.clone()));
                    None
                }
                PromiseState::Fulfilled(v) => Some((on_fulfilled, v.clone())),
                PromiseState::Rejected(v) => Some((on_rejected, v.clone())),
            }
        };
        if let Some((callback, value)) = settled {
            react(&callback, &value);
        }
    }

    /// Equivalent of attaching a no-op rejection handler.
    pub fn mark_handled(&self) {
        self.handled.store(true, Ordering::Release);
    }

    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::Acquire)
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*lock(&self.state), PromiseState::Pending(_))
    }

    /// The settled value: `Some(Ok)` when fulfilled, `Some(Err)` when rejected.
    pub fn settled(&self) -> Option<Result<Value, Value>> {
        match &*lock(&self.state) {
            PromiseState::Pending(_) => None,
            PromiseState::Fulfilled(v) => Some(Ok(v.clone())),
            PromiseState::Rejected(v) => Some(Err(v.clone())),
        }
    }

    /// A rejection nobody listens to, which a host would report.
    pub fn is_unhandled_rejection(&self) -> bool {
        matches!(&*lock(&self.state), PromiseState::Rejected(_)) && !self.is_handled()
    }
}

fn react(callback: &Value, value: &Value) {
    let Value::Object(f) = callback else { return };
    if !f.is_callable() {
        return;
    }
    if let Err(thrown) = f.call(&Value::Undefined, std::slice::from_ref(value)) {
        tracing::debug!(error = %thrown, "promise reaction threw");
    }
}

enum ObjectKind {
    Plain,
    Array(RwLock<Vec<Value>>),
    Function(FunctionData),
    Error,
    Promise(PromiseCell),
}

struct ObjectCell {
    class: String,
    kind: ObjectKind,
    props: RwLock<Vec<(String, Property)>>,
    proto: Option<ObjectRef>,
    simple: bool,
}

/// A reference to a live object. Clones share identity.
#[derive(Clone)]
pub struct ObjectRef(Arc<ObjectCell>);

impl std::fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectRef({}@{:#x})", self.0.class, self.addr())
    }
}

impl ObjectRef {
    fn from_parts(class: &str, kind: ObjectKind, proto: Option<ObjectRef>, simple: bool) -> Self {
        ObjectRef(Arc::new(ObjectCell {
            class: class.to_string(),
            kind,
            props: RwLock::new(Vec::new()),
            proto,
            simple,
        }))
    }

    /// An ordinary object whose constructor is named `class`.
    pub fn new(class: &str) -> Self {
        Self::from_parts(class, ObjectKind::Plain, None, false)
    }

    /// An ordinary object inheriting from `proto`.
    pub fn inheriting(class: &str, proto: &ObjectRef) -> Self {
        Self::from_parts(class, ObjectKind::Plain, Some(proto.clone()), false)
    }

    /// A plain-data record, flagged as eligible for by-value transmission.
    pub fn record() -> Self {
        Self::from_parts("Object", ObjectKind::Plain, None, true)
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::from_parts("Array", ObjectKind::Array(RwLock::new(items)), None, false)
    }

    /// A callable without construct behavior.
    pub fn function(name: &str, call: impl Fn(&Value, &[Value]) -> Completion + Send + Sync + 'static) -> Self {
        Self::native(name, Some(Arc::new(call)), None)
    }

    /// A constructor that cannot be called without `new`.
    pub fn class(name: &str, construct: impl Fn(&Value, &[Value]) -> Completion + Send + Sync + 'static) -> Self {
        Self::native(name, None, Some(Arc::new(construct)))
    }

    pub fn native(name: &str, call: Option<NativeFn>, construct: Option<NativeFn>) -> Self {
        let data = FunctionData { name: name.to_string(), call, construct };
        Self::from_parts("Function", ObjectKind::Function(data), None, false)
    }

    /// An error whose constructor is named `class` (`Error`, `TypeError`, ...).
    pub fn error(class: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let error = Self::from_parts(class, ObjectKind::Error, None, false);
        error.define("stack", Property::hidden(format!("{}: {}\n    at <remote>", class, message).into()));
        error.define("message", Property::hidden(message.into()));
        error
    }

    /// A pending promise.
    pub fn promise() -> Self {
        Self::from_parts("Promise", ObjectKind::Promise(PromiseCell::new()), None, false)
    }

    pub fn class_name(&self) -> &str {
        &self.0.class
    }

    pub fn proto(&self) -> Option<&ObjectRef> {
        self.0.proto.as_ref()
    }

    pub fn is_simple(&self) -> bool {
        self.0.simple
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity while any clone is alive.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn is_array(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Array(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Error)
    }

    pub fn is_function(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Function(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(&self.0.kind, ObjectKind::Function(f) if f.call.is_some() || f.construct.is_some())
    }

    pub fn is_constructor(&self) -> bool {
        matches!(&self.0.kind, ObjectKind::Function(f) if f.construct.is_some())
    }

    pub fn as_promise(&self) -> Option<&PromiseCell> {
        match &self.0.kind {
            ObjectKind::Promise(p) => Some(p),
            _ => None,
        }
    }

    /// Snapshot of an array's items.
    pub fn array_items(&self) -> Option<Vec<Value>> {
        match &self.0.kind {
            ObjectKind::Array(items) => Some(read(items).clone()),
            _ => None,
        }
    }

    pub fn function_name(&self) -> &str {
        match &self.0.kind {
            ObjectKind::Function(f) => &f.name,
            _ => "",
        }
    }

    /// `name` of an error: an own or inherited `name` string, else the class.
    pub fn error_name(&self) -> String {
        match self.get("name") {
            Ok(Value::String(name)) => name,
            _ => self.0.class.clone(),
        }
    }

    /// Defines or replaces an own property.
    pub fn define(&self, name: &str, property: Property) {
        let mut props = write(&self.0.props);
        match props.iter_mut().find(|(k, _)| k == name) {
            Some((_, slot)) => *slot = property,
            None => props.push((name.to_string(), property)),
        }
    }

    pub fn with_property(self, name: &str, property: Property) -> Self {
        self.define(name, property);
        self
    }

    /// Adds an enumerable, writable data member.
    pub fn with_value(self, name: &str, value: impl Into<Value>) -> Self {
        self.with_property(name, Property::data(value.into()))
    }

    /// Adds a non-enumerable method.
    pub fn with_method(
        self,
        name: &str,
        call: impl Fn(&Value, &[Value]) -> Completion + Send + Sync + 'static,
    ) -> Self {
        let method = ObjectRef::function(name, call);
        self.with_property(name, Property::hidden(method.into()))
    }

    pub fn with_getter(self, name: &str, get: impl Fn(&Value, &[Value]) -> Completion + Send + Sync + 'static) -> Self {
        self.with_property(name, Property::accessor(Some(Arc::new(get)), None))
    }

    pub fn own_property(&self, name: &str) -> Option<Property> {
        read(&self.0.props).iter().find(|(k, _)| k == name).map(|(_, p)| p.clone())
    }

    /// Snapshot of own properties in definition order.
    pub fn own_properties(&self) -> Vec<(String, Property)> {
        read(&self.0.props).clone()
    }

    fn array_get(&self, name: &str) -> Option<Value> {
        let ObjectKind::Array(items) = &self.0.kind else { return None };
        let items = read(items);
        if name == "length" {
            return Some(Value::Number(items.len() as f64));
        }
        let index = name.parse::<u32>().ok().filter(|i| *i != u32::MAX)?;
        Some(items.get(index as usize).cloned().unwrap_or_default())
    }

    fn array_set(&self, name: &str, value: &Value) -> Option<Result<(), Throw>> {
        let ObjectKind::Array(items) = &self.0.kind else { return None };
        if name == "length" {
            let Some(len) = value.as_number().and_then(array_length) else {
                return Some(Err(invalid_length()));
            };
            return Some(resize(&mut write(items), len));
        }
        let index = name.parse::<u32>().ok()?;
        // 2^32 - 1 is an ordinary property name, not an index.
        if index == u32::MAX {
            return None;
        }
        let index = usize::try_from(index).ok()?;
        let mut items = write(items);
        if index >= items.len() {
            if let Err(thrown) = resize(&mut items, index + 1) {
                return Some(Err(thrown));
            }
        }
        items[index] = value.clone();
        Some(Ok(()))
    }

    /// Reads `self[name]` with `self` as the getter receiver.
    pub fn get(&self, name: &str) -> Completion {
        let receiver = Value::Object(self.clone());
        let mut current = Some(self.clone());
        while let Some(object) = current {
            if let Some(value) = object.array_get(name) {
                return Ok(value);
            }
            if let Some(property) = object.own_property(name) {
                return match property.slot {
                    Slot::Data(value) => Ok(value),
                    Slot::Accessor { get: Some(get), .. } => get(&receiver, &[]),
                    Slot::Accessor { get: None, .. } => Ok(Value::Undefined),
                };
            }
            current = object.0.proto.clone();
        }
        Ok(Value::Undefined)
    }

    /// Assigns `self[name] = value`, honoring read-only slots and setters
    /// found anywhere on the prototype chain.
    pub fn set(&self, name: &str, value: Value) -> Result<(), Throw> {
        if let Some(done) = self.array_set(name, &value) {
            return done;
        }
        let receiver = Value::Object(self.clone());
        let mut current = Some(self.clone());
        while let Some(object) = current {
            if let Some(property) = object.own_property(name) {
                match property.slot {
                    Slot::Accessor { set: Some(set), .. } => return set(&receiver, &[value]).map(|_| ()),
                    Slot::Accessor { set: None, .. } => {
                        return Err(Throw::type_error(format!(
                            "Cannot set property {} of {} which has only a getter",
                            name,
                            self.0.class
                        )));
                    }
                    Slot::Data(_) if !property.writable => {
                        return Err(Throw::type_error(format!(
                            "Cannot assign to read only property '{}' of object '{}'",
                            name,
                            self.0.class
                        )));
                    }
                    Slot::Data(_) if object.ptr_eq(self) => {
                        self.define(name, Property { slot: Slot::Data(value), ..property });
                        return Ok(());
                    }
                    Slot::Data(_) => break,
                }
            }
            current = object.0.proto.clone();
        }
        self.define(name, Property::data(value));
        Ok(())
    }

    /// Invokes a callable.
    pub fn call(&self, this: &Value, args: &[Value]) -> Completion {
        match &self.0.kind {
            ObjectKind::Function(FunctionData { call: Some(call), .. }) => call(this, args),
            ObjectKind::Function(f) => Err(Throw::type_error(format!(
                "Class constructor {} cannot be invoked without 'new'",
                f.name
            ))),
            _ => Err(Throw::type_error(format!("{} is not a function", Value::Object(self.clone()).display()))),
        }
    }

    /// Invokes a callable as a constructor.
    pub fn construct(&self, args: &[Value]) -> Completion {
        match &self.0.kind {
            ObjectKind::Function(FunctionData { construct: Some(construct), .. }) => {
                construct(&Value::Undefined, args)
            }
            _ => Err(Throw::type_error(format!(
                "{} is not a constructor",
                Value::Object(self.clone()).display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prototype_lookup_and_shadowing() {
        let base = ObjectRef::new("EventEmitter").with_value("kind", "emitter");
        let window = ObjectRef::inheriting("BrowserWindow", &base).with_value("id", 7);

        assert_eq!(window.get("id").unwrap(), Value::Number(7.0));
        assert_eq!(window.get("kind").unwrap(), Value::from("emitter"));
        assert_eq!(window.get("missing").unwrap(), Value::Undefined);

        window.set("kind", "window".into()).unwrap();
        assert_eq!(window.get("kind").unwrap(), Value::from("window"));
        assert_eq!(base.get("kind").unwrap(), Value::from("emitter"));
    }

    #[test]
    fn test_read_only_and_getter_only_slots_refuse_writes() {
        let object = ObjectRef::new("Screen")
            .with_property("width", Property::readonly(Value::Number(800.0)))
            .with_getter("height", |_, _| Ok(Value::Number(600.0)));

        let err = object.set("width", Value::Number(1.0)).unwrap_err();
        assert!(err.message().contains("read only property 'width'"));
        let err = object.set("height", Value::Number(1.0)).unwrap_err();
        assert!(err.message().contains("only a getter"));
        assert_eq!(object.get("height").unwrap(), Value::Number(600.0));
    }

    #[test]
    fn test_getter_sees_its_receiver() {
        let proto = ObjectRef::new("Proto").with_getter("self_id", |this, _| this.get_member("id"));
        let object = ObjectRef::inheriting("Thing", &proto).with_value("id", 3);
        assert_eq!(object.get("self_id").unwrap(), Value::Number(3.0));
    }

    #[test]
    fn test_array_index_and_length() {
        let array = ObjectRef::array(vec![Value::from(1), Value::from(2)]);
        assert_eq!(array.get("length").unwrap(), Value::Number(2.0));
        array.set("3", Value::from("x")).unwrap();
        assert_eq!(array.array_items().unwrap().len(), 4);
        assert_eq!(array.get("2").unwrap(), Value::Undefined);
        array.set("length", Value::from(1)).unwrap();
        assert_eq!(array.array_items().unwrap(), vec![Value::from(1)]);
    }

    #[test]
    fn test_oversized_array_writes_throw_range_error() {
        let array = ObjectRef::array(vec![Value::from(1)]);
        for (name, value) in [
            ("length", Value::from(1e20)),
            ("length", Value::from(-1)),
            ("length", Value::from(1.5)),
            ("length", Value::from(f64::from(MAX_ARRAY_LENGTH))),
            ("4294967294", Value::from("x")),
        ] {
            let err = array.set(name, value).unwrap_err();
            assert_eq!(err.0.as_object().unwrap().error_name(), "RangeError");
            assert_eq!(err.message(), "Invalid array length");
        }
        assert_eq!(array.array_items().unwrap(), vec![Value::from(1)]);

        // Not an index, so it lands as a named property.
        array.set("4294967295", Value::from("named")).unwrap();
        assert_eq!(array.get("4294967295").unwrap(), Value::from("named"));
        assert_eq!(array.get("length").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_call_and_construct_shapes() {
        let f = ObjectRef::function("hide", |_, _| Ok(Value::Undefined));
        let class = ObjectRef::class("Menu", |_, _| Ok(ObjectRef::new("Menu").into()));

        assert!(f.call(&Value::Undefined, &[]).is_ok());
        assert!(f.construct(&[]).unwrap_err().message().contains("is not a constructor"));
        assert!(class.call(&Value::Undefined, &[]).unwrap_err().message().contains("without 'new'"));
        assert!(class.construct(&[]).unwrap().as_object().is_some());
    }

    #[test]
    fn test_reading_from_nullish_throws_type_error() {
        let err = Value::Undefined.get_member("id").unwrap_err();
        assert_eq!(err.message(), "Cannot read properties of undefined (reading 'id')");
        assert_eq!(err.0.as_object().unwrap().error_name(), "TypeError");
    }

    #[test]
    fn test_promise_reactions_and_rejection_tracking() {
        let promise = ObjectRef::promise();
        let cell = promise.as_promise().unwrap();
        let seen = Arc::new(Mutex::new(None));

        let sink = seen.clone();
        let on_fulfilled = ObjectRef::function("onFulfilled", move |_, args| {
            *sink.lock().unwrap() = args.first().cloned();
            Ok(Value::Undefined)
        });
        cell.then(on_fulfilled.into(), Value::Undefined);
        assert!(cell.is_pending());
        cell.resolve(Value::from(42));
        assert_eq!(*seen.lock().unwrap(), Some(Value::from(42)));

        let rejected = ObjectRef::promise();
        let cell = rejected.as_promise().unwrap();
        cell.reject(Value::from("boom"));
        assert!(cell.is_unhandled_rejection());
        cell.mark_handled();
        assert!(!cell.is_unhandled_rejection());
    }

    #[test]
    fn test_rpc_errors_carry_code() {
        let thrown = Throw::rpc("Cannot get property 'x' on missing remote object 9");
        assert_eq!(thrown.code().as_deref(), Some(RPC_ERROR_CODE));
        assert_eq!(thrown.message(), "Cannot get property 'x' on missing remote object 9");
    }
}
