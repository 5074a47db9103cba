//! # Value Decoder
//!
//! Rebuilds live arguments from the [`ArgMeta`] a client sent.
//!
//! Handles resolve through the session's registry. A live callable has no
//! representation here and is refused; a function with a precomputed return
//! value becomes a callable that yields that value.

use metarpc::ArgMeta;
use metarpc::Plain;

use crate::server::Scope;
use crate::server::value::ObjectRef;
use crate::server::value::Property;
use crate::server::value::Throw;
use crate::server::value::Value;

/// Converts pass-by-value data into fresh live values.
pub fn value_of(plain: &Plain) -> Value {
    match plain {
        Plain::Undefined => Value::Undefined,
        Plain::Null => Value::Null,
        Plain::Bool(b) => Value::Bool(*b),
        Plain::Number(n) => Value::Number(*n),
        Plain::String(s) => Value::String(s.clone()),
        Plain::List(items) => ObjectRef::array(items.iter().map(value_of).collect()).into(),
        Plain::Record(fields) => {
            let record = ObjectRef::record();
            for (name, value) in fields {
                record.define(name, Property::data(value_of(value)));
            }
            record.into()
        }
    }
}

pub fn decode_args(scope: &Scope<'_>, args: &[ArgMeta]) -> Result<Vec<Value>, Throw> {
    args.iter().map(|arg| decode_arg(scope, arg)).collect()
}

pub fn decode_arg(scope: &Scope<'_>, arg: &ArgMeta) -> Result<Value, Throw> {
    match arg {
        ArgMeta::Value(plain) => Ok(value_of(plain)),
        ArgMeta::Array(items) => Ok(ObjectRef::array(decode_args(scope, items)?).into()),
        ArgMeta::Buffer(bytes) => Ok(Value::Buffer(bytes.clone())),
        ArgMeta::Date(ms) => Ok(Value::Date(*ms)),
        ArgMeta::Object { name, members } => {
            let object = if name.is_empty() || name == "Object" { ObjectRef::record() } else { ObjectRef::new(name) };
            for (key, member) in members {
                object.define(key, Property::data(decode_arg(scope, member)?));
            }
            Ok(object.into())
        }
        ArgMeta::RemoteObject(id) => scope
            .registry
            .resolve(scope.session, *id)
            .map(Value::Object)
            .map_err(|e| Throw::rpc(format!("Cannot pass missing remote object {} as an argument ({})", id, e.reason()))),
        ArgMeta::FunctionWithReturnValue(value) => {
            let value = decode_arg(scope, value)?;
            Ok(ObjectRef::function("", move |_, _| Ok(value.clone())).into())
        }
        ArgMeta::Promise { then } => {
            let then = decode_arg(scope, then)?;
            let promise = ObjectRef::promise();
            let on_fulfilled = settle(&promise, true);
            let on_rejected = settle(&promise, false);
            match &then {
                Value::Object(f) if f.is_callable() => {
                    if let Err(thrown) = f.call(&Value::Undefined, &[on_fulfilled.into(), on_rejected.into()]) {
                        if let Some(cell) = promise.as_promise() {
                            cell.reject(thrown.0);
                        }
                    }
                }
                _ => return Err(Throw::type_error("Promise argument has a non-callable 'then'")),
            }
            Ok(promise.into())
        }
        ArgMeta::Function { name } => Err(Throw::unsupported(format!(
            "Cannot pass function '{}' across the boundary; pass a function with a precomputed return value instead",
            name
        ))),
    }
}

fn settle(promise: &ObjectRef, fulfilled: bool) -> ObjectRef {
    let target = promise.clone();
    let name = if fulfilled { "resolve" } else { "reject" };
    ObjectRef::function(name, move |_, args| {
        let value = args.first().cloned().unwrap_or_default();
        if let Some(cell) = target.as_promise() {
            if fulfilled {
                cell.resolve(value);
            } else {
                cell.reject(value);
            }
        }
        Ok(Value::Undefined)
    })
}

#[cfg(test)]
mod tests {
    use metarpc::HandleId;
    use metarpc::SessionId;

    use super::*;
    use crate::server::encode::MAX_PROTO_DEPTH;
    use crate::server::encode::SimpleMarker;
    use crate::server::registry::HandleRegistry;
    use crate::server::registry::SessionRegistry;

    fn scope(registry: &SessionRegistry) -> Scope<'_> {
        Scope { session: SessionId(1), registry, policy: &SimpleMarker, max_proto_depth: MAX_PROTO_DEPTH }
    }

    #[test]
    fn test_remote_object_resolves_to_the_same_object() {
        let registry = SessionRegistry::new();
        let window = ObjectRef::new("BrowserWindow");
        let id = registry.allocate(SessionId(1), &window);

        let value = decode_arg(&scope(&registry), &ArgMeta::RemoteObject(id)).unwrap();
        assert!(value.as_object().unwrap().ptr_eq(&window));
    }

    #[test]
    fn test_unknown_remote_object_is_a_protocol_error() {
        let registry = SessionRegistry::new();
        let err = decode_arg(&scope(&registry), &ArgMeta::RemoteObject(HandleId(404))).unwrap_err();
        assert_eq!(err.code().as_deref(), Some("EBADRPC"));
        assert!(err.message().contains("never issued"));
    }

    #[test]
    fn test_function_with_return_value_yields_it() {
        let registry = SessionRegistry::new();
        let arg = ArgMeta::FunctionWithReturnValue(Box::new(ArgMeta::Value(Plain::from(42))));
        let value = decode_arg(&scope(&registry), &arg).unwrap();
        let f = value.as_object().unwrap();
        assert_eq!(f.call(&Value::Undefined, &[Value::from("ignored")]).unwrap(), Value::from(42));
    }

    #[test]
    fn test_live_callable_is_refused() {
        let registry = SessionRegistry::new();
        let err = decode_arg(&scope(&registry), &ArgMeta::Function { name: "onClick".into() }).unwrap_err();
        assert_eq!(err.code().as_deref(), Some("EUNSUPPORTED"));
        assert!(err.message().contains("'onClick'"));
    }

    #[test]
    fn test_object_members_keep_constructor_name() {
        let registry = SessionRegistry::new();
        let arg = ArgMeta::Object {
            name: "Rectangle".into(),
            members: vec![
                ("width".into(), ArgMeta::Value(Plain::from(800))),
                ("tags".into(), ArgMeta::Array(vec![ArgMeta::Value(Plain::from("a"))])),
            ],
        };
        let value = decode_arg(&scope(&registry), &arg).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.class_name(), "Rectangle");
        assert_eq!(object.get("width").unwrap(), Value::from(800));
        assert_eq!(object.get("tags").unwrap().get_member("length").unwrap(), Value::from(1));
    }

    #[test]
    fn test_promise_argument_follows_remote_then() {
        let registry = SessionRegistry::new();
        // A `then` that settles immediately, as a client-side resolved promise would.
        let then = ObjectRef::function("then", |_, args| {
            let resolve = args[0].as_object().unwrap();
            resolve.call(&Value::Undefined, &[Value::from("ready")])
        });
        let id = registry.allocate(SessionId(1), &then);

        let arg = ArgMeta::Promise { then: Box::new(ArgMeta::RemoteObject(id)) };
        let value = decode_arg(&scope(&registry), &arg).unwrap();
        let settled = value.as_object().unwrap().as_promise().unwrap().settled();
        assert_eq!(settled, Some(Ok(Value::from("ready"))));
    }
}
