//! # Value Encoder
//!
//! Turns a live value into the [`Meta`] sent back to the client.
//!
//! ## Rules
//!
//! - Primitives go by value. Buffers and dates are copied.
//! - Arrays are encoded element-wise. An array reached again through its own
//!   elements becomes `null` instead of recursing.
//! - Errors travel as their enumerable members plus `name`, `message`, `stack`.
//! - Promises are marked handled and travel as a forwarding `then` function.
//! - Every other object gets a handle and a member/prototype description,
//!   unless the caller asked for optimization and the [`ScalarPolicy`]
//!   accepts the object by value.

use metarpc::MemberDescriptor;
use metarpc::MemberKind;
use metarpc::Meta;
use metarpc::ObjectMeta;
use metarpc::Plain;
use metarpc::Prototype;

use crate::server::Scope;
use crate::server::value::ObjectRef;
use crate::server::value::Slot;
use crate::server::value::Throw;
use crate::server::value::Value;

/// Levels of prototype chain described per object.
pub const MAX_PROTO_DEPTH: usize = 16;

/// Nesting of arrays and errors the encoder follows.
pub const MAX_VALUE_DEPTH: usize = 32;

const MAX_PLAIN_DEPTH: usize = 16;

/// Own properties of callables that never appear in a description.
const FUNCTION_INTRINSICS: [&str; 5] = ["length", "name", "arguments", "caller", "prototype"];

/// Decides which objects returned from a call may be sent by value.
pub trait ScalarPolicy: Send + Sync {
    /// The by-value form of `object`, or `None` to send a handle.
    fn by_value(&self, object: &ObjectRef) -> Option<Plain>;
}

/// Sends an object by value only if it carries the `simple` marker and is
/// made of plain data all the way down.
pub struct SimpleMarker;

impl ScalarPolicy for SimpleMarker {
    fn by_value(&self, object: &ObjectRef) -> Option<Plain> {
        if !object.is_simple() {
            return None;
        }
        plain_of(&Value::Object(object.clone()), &mut Vec::new())
    }
}

/// Never sends objects by value.
pub struct AlwaysHandle;

impl ScalarPolicy for AlwaysHandle {
    fn by_value(&self, _object: &ObjectRef) -> Option<Plain> {
        None
    }
}

/// Converts scalars, arrays and data-only records to [`Plain`].
///
/// Returns `None` for anything that needs a handle, and for cycles.
pub fn plain_of(value: &Value, path: &mut Vec<usize>) -> Option<Plain> {
    let object = match value {
        Value::Undefined => return Some(Plain::Undefined),
        Value::Null => return Some(Plain::Null),
        Value::Bool(b) => return Some(Plain::Bool(*b)),
        Value::Number(n) => return Some(Plain::Number(*n)),
        Value::String(s) => return Some(Plain::String(s.clone())),
        Value::Buffer(_) | Value::Date(_) => return None,
        Value::Object(object) => object,
    };
    if path.len() >= MAX_PLAIN_DEPTH || path.contains(&object.addr()) {
        return None;
    }
    path.push(object.addr());
    let plain = if let Some(items) = object.array_items() {
        items.iter().map(|item| plain_of(item, path)).collect::<Option<Vec<_>>>().map(Plain::List)
    } else if object.is_function() || object.is_error() || object.as_promise().is_some() || object.proto().is_some() {
        None
    } else {
        object
            .own_properties()
            .into_iter()
            .filter(|(_, property)| property.enumerable)
            .map(|(name, property)| match property.slot {
                Slot::Data(value) => plain_of(&value, path).map(|plain| (name, plain)),
                Slot::Accessor { .. } => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Plain::Record)
    };
    path.pop();
    plain
}

/// Describes the own members of `object`.
pub fn describe_members(object: &ObjectRef) -> Vec<MemberDescriptor> {
    let callable = object.is_function();
    object
        .own_properties()
        .into_iter()
        .filter(|(name, _)| !(callable && FUNCTION_INTRINSICS.contains(&name.as_str())))
        .map(|(name, property)| {
            let (kind, writable) = match &property.slot {
                Slot::Data(value) if value.is_callable() => (MemberKind::Method, false),
                Slot::Data(_) => (MemberKind::Accessor, property.writable),
                Slot::Accessor { set, .. } => (MemberKind::Accessor, set.is_some()),
            };
            MemberDescriptor { name, enumerable: property.enumerable, writable, kind }
        })
        .collect()
}

/// Describes at most `remaining` levels of the chain starting at `proto`.
pub fn describe_proto(proto: Option<&ObjectRef>, remaining: usize) -> Option<Box<Prototype>> {
    let proto = proto.filter(|_| remaining > 0)?;
    Some(Box::new(Prototype {
        members: describe_members(proto),
        proto: describe_proto(proto.proto(), remaining - 1),
    }))
}

/// Encodes values for one session.
pub struct ValueEncoder<'s> {
    scope: &'s Scope<'s>,
    path: Vec<usize>,
}

impl<'s> ValueEncoder<'s> {
    pub fn new(scope: &'s Scope<'s>) -> Self {
        Self { scope, path: Vec::new() }
    }

    /// Encodes `value`. `optimize` lets the scalar policy send objects by value.
    pub fn encode(&mut self, value: &Value, optimize: bool) -> Result<Meta, Throw> {
        match value {
            Value::Undefined => Ok(Meta::Value(Plain::Undefined)),
            Value::Null => Ok(Meta::Value(Plain::Null)),
            Value::Bool(b) => Ok(Meta::Value(Plain::Bool(*b))),
            Value::Number(n) => Ok(Meta::Value(Plain::Number(*n))),
            Value::String(s) => Ok(Meta::Value(Plain::String(s.clone()))),
            Value::Buffer(bytes) => Ok(Meta::Buffer(bytes.clone())),
            Value::Date(ms) => Ok(Meta::Date(*ms)),
            Value::Object(object) => self.encode_object(object, optimize),
        }
    }

    fn encode_object(&mut self, object: &ObjectRef, optimize: bool) -> Result<Meta, Throw> {
        if let Some(items) = object.array_items() {
            if self.path.contains(&object.addr()) {
                return Ok(Meta::null());
            }
            self.enter(object)?;
            let encoded = items.iter().map(|item| self.encode(item, optimize)).collect::<Result<Vec<_>, _>>();
            self.path.pop();
            return encoded.map(Meta::Array);
        }

        if object.is_error() {
            if self.path.contains(&object.addr()) {
                return Ok(Meta::null());
            }
            self.enter(object)?;
            let members = self.error_members(object);
            self.path.pop();
            return members.map(|members| Meta::Error { members });
        }

        if let Some(promise) = object.as_promise() {
            promise.mark_handled();
            let target = object.clone();
            let then = ObjectRef::function("then", move |_, args| {
                if let Some(promise) = target.as_promise() {
                    let on_fulfilled = args.first().cloned().unwrap_or_default();
                    let on_rejected = args.get(1).cloned().unwrap_or_default();
                    promise.then(on_fulfilled, on_rejected);
                }
                Ok(Value::Undefined)
            });
            return Ok(Meta::Promise { then: Box::new(Meta::Function(self.object_meta(&then))) });
        }

        if optimize {
            if let Some(plain) = self.scope.policy.by_value(object) {
                return Ok(Meta::Value(plain));
            }
        }

        let meta = self.object_meta(object);
        if object.is_function() {
            Ok(Meta::Function(meta))
        } else {
            Ok(Meta::Object(meta))
        }
    }

    fn enter(&mut self, object: &ObjectRef) -> Result<(), Throw> {
        if self.path.len() >= MAX_VALUE_DEPTH {
            return Err(Throw::rpc(format!(
                "Value nested deeper than {} levels cannot be sent",
                MAX_VALUE_DEPTH
            )));
        }
        self.path.push(object.addr());
        Ok(())
    }

    fn object_meta(&self, object: &ObjectRef) -> ObjectMeta {
        ObjectMeta {
            id: self.scope.registry.allocate(self.scope.session, object),
            name: object.class_name().to_string(),
            members: describe_members(object),
            proto: describe_proto(object.proto(), self.scope.max_proto_depth),
        }
    }

    fn error_members(&mut self, error: &ObjectRef) -> Result<Vec<(String, Meta)>, Throw> {
        let mut members = Vec::new();
        for (name, property) in error.own_properties() {
            if !property.enumerable {
                continue;
            }
            let value = error.get(&name)?;
            members.push((name, self.encode(&value, false)?));
        }
        for name in ["name", "message", "stack"] {
            if members.iter().any(|(k, _)| k == name) {
                continue;
            }
            let value = match name {
                "name" => Value::String(error.error_name()),
                _ => error.get(name)?,
            };
            members.push((name.to_string(), self.encode(&value, false)?));
        }
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use metarpc::SessionId;

    use super::*;
    use crate::server::registry::HandleRegistry;
    use crate::server::registry::SessionRegistry;
    use crate::server::value::Property;

    fn with_scope<T>(f: impl FnOnce(&Scope<'_>, &SessionRegistry) -> T) -> T {
        let registry = SessionRegistry::new();
        let scope = Scope {
            session: SessionId(1),
            registry: &registry,
            policy: &SimpleMarker,
            max_proto_depth: MAX_PROTO_DEPTH,
        };
        f(&scope, &registry)
    }

    #[test]
    fn test_methods_and_accessors_are_told_apart() {
        let proto = ObjectRef::new("WebContents").with_method("send", |_, _| Ok(Value::Undefined));
        let contents = ObjectRef::inheriting("WebContents", &proto)
            .with_value("id", 4)
            .with_property("url", Property::readonly("about:blank".into()))
            .with_getter("zoom", |_, _| Ok(Value::from(1.0)));

        with_scope(|scope, _| {
            let Meta::Object(meta) = ValueEncoder::new(scope).encode(&contents.clone().into(), false).unwrap() else {
                panic!("expected an object descriptor");
            };
            assert_eq!(meta.name, "WebContents");
            let kinds: Vec<_> = meta.members.iter().map(|m| (m.name.as_str(), m.kind, m.writable)).collect();
            assert_eq!(
                kinds,
                vec![
                    ("id", MemberKind::Accessor, true),
                    ("url", MemberKind::Accessor, false),
                    ("zoom", MemberKind::Accessor, false),
                ]
            );
            let proto = meta.proto.unwrap();
            assert_eq!(proto.members[0].name, "send");
            assert_eq!(proto.members[0].kind, MemberKind::Method);
            assert!(proto.proto.is_none());
        });
    }

    #[test]
    fn test_function_intrinsics_are_hidden() {
        let f = ObjectRef::function("hide", |_, _| Ok(Value::Undefined))
            .with_value("length", 0)
            .with_value("name", "hide")
            .with_value("custom", 1);

        with_scope(|scope, _| {
            let Meta::Function(meta) = ValueEncoder::new(scope).encode(&f.into(), false).unwrap() else {
                panic!("expected a function descriptor");
            };
            let names: Vec<_> = meta.members.iter().map(|m| m.name.as_str()).collect();
            assert_eq!(names, vec!["custom"]);
        });
    }

    #[test]
    fn test_same_object_twice_shares_the_handle() {
        let window = ObjectRef::new("BrowserWindow");
        let pair = ObjectRef::array(vec![window.clone().into(), window.into()]);

        with_scope(|scope, registry| {
            let Meta::Array(items) = ValueEncoder::new(scope).encode(&pair.into(), false).unwrap() else {
                panic!("expected an array");
            };
            assert_eq!(items[0].handle(), items[1].handle());
            assert_eq!(registry.live_count(SessionId(1)), 1);
        });
    }

    #[test]
    fn test_self_containing_array_breaks_to_null() {
        let array = ObjectRef::array(vec![Value::from(1)]);
        array.set("1", array.clone().into()).unwrap();

        with_scope(|scope, _| {
            let meta = ValueEncoder::new(scope).encode(&array.into(), false).unwrap();
            assert_eq!(meta, Meta::Array(vec![Meta::Value(Plain::Number(1.0)), Meta::null()]));
        });
    }

    #[test]
    fn test_prototype_chain_is_capped() {
        let mut proto = ObjectRef::new("Level0");
        for level in 1..40 {
            proto = ObjectRef::inheriting(&format!("Level{}", level), &proto);
        }
        let object = ObjectRef::inheriting("Leaf", &proto);

        with_scope(|scope, _| {
            let Meta::Object(meta) = ValueEncoder::new(scope).encode(&object.into(), false).unwrap() else {
                panic!("expected an object descriptor");
            };
            assert_eq!(meta.proto.unwrap().depth(), MAX_PROTO_DEPTH);
        });
    }

    #[test]
    fn test_simple_records_go_by_value_only_when_optimized() {
        let bounds = ObjectRef::record().with_value("x", 1).with_value("y", 2);

        with_scope(|scope, _| {
            let optimized = ValueEncoder::new(scope).encode(&bounds.clone().into(), true).unwrap();
            assert_eq!(
                optimized,
                Meta::Value(Plain::Record(vec![("x".into(), Plain::Number(1.0)), ("y".into(), Plain::Number(2.0))]))
            );
            let plain = ValueEncoder::new(scope).encode(&bounds.into(), false).unwrap();
            assert!(matches!(plain, Meta::Object(_)));
        });
    }

    #[test]
    fn test_unmarked_or_accessor_records_stay_handles() {
        let unmarked = ObjectRef::new("Object").with_value("x", 1);
        let getter = ObjectRef::record().with_getter("x", |_, _| Ok(Value::from(1)));
        assert!(SimpleMarker.by_value(&unmarked).is_none());
        assert!(SimpleMarker.by_value(&getter).is_none());
    }

    #[test]
    fn test_error_members() {
        let error = ObjectRef::error("TypeError", "bad window");
        error.define("code", Property::data("EWIN".into()));

        with_scope(|scope, _| {
            let Meta::Error { members } = ValueEncoder::new(scope).encode(&error.into(), false).unwrap() else {
                panic!("expected an error descriptor");
            };
            let names: Vec<_> = members.iter().map(|(k, _)| k.as_str()).collect();
            assert_eq!(names, vec!["code", "name", "message", "stack"]);
            assert_eq!(members[1].1, Meta::Value(Plain::from("TypeError")));
            assert_eq!(members[2].1, Meta::Value(Plain::from("bad window")));
        });
    }

    #[test]
    fn test_promise_is_marked_handled_and_forwards_then() {
        let promise = ObjectRef::promise();

        with_scope(|scope, registry| {
            let Meta::Promise { then } = ValueEncoder::new(scope).encode(&promise.clone().into(), false).unwrap() else {
                panic!("expected a promise descriptor");
            };
            let cell = promise.as_promise().unwrap();
            assert!(cell.is_handled());

            let then = registry.resolve(SessionId(1), then.handle().unwrap()).unwrap();
            let seen = std::sync::Arc::new(std::sync::Mutex::new(Value::Undefined));
            let sink = seen.clone();
            let on_fulfilled = ObjectRef::function("", move |_, args| {
                *sink.lock().unwrap() = args[0].clone();
                Ok(Value::Undefined)
            });
            then.call(&Value::Undefined, &[on_fulfilled.into()]).unwrap();
            cell.resolve(Value::from("done"));
            assert_eq!(*seen.lock().unwrap(), Value::from("done"));
        });
    }
}
