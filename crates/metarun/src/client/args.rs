//! # Arguments
//!
//! Local values the client sends with a call or assignment, and their
//! translation into [`ArgMeta`].
//!
//! Local records may reference themselves; the encoder tracks the records on
//! the current path and sends `null` where a record would contain itself.
//! Live local callables have no wire form and are refused before anything is
//! sent.

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use metarpc::ArgMeta;
use metarpc::Plain;
use metarpc::SessionId;

use crate::client::error::Error;
use crate::client::error::Result;
use crate::client::remote::Remote;
use crate::client::remote::RemoteObject;
use crate::client::remote::RemotePromise;

struct Record {
    name: String,
    fields: Vec<(String, Arg)>,
}

/// A mutable local record, shared by clones so it can form cycles.
#[derive(Clone)]
pub struct LocalObject(Arc<RwLock<Record>>);

impl LocalObject {
    /// A record whose constructor is named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        LocalObject(Arc::new(RwLock::new(Record { name: name.into(), fields: Vec::new() })))
    }

    pub fn record() -> Self {
        Self::new("Object")
    }

    pub fn with(self, key: impl Into<String>, value: impl Into<Arg>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Arg>) {
        let key = key.into();
        let value = value.into();
        let mut record = self.0.write().unwrap_or_else(PoisonError::into_inner);
        match record.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => record.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arg> {
        let record = self.0.read().unwrap_or_else(PoisonError::into_inner);
        record.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    fn snapshot(&self) -> (String, Vec<(String, Arg)>) {
        let record = self.0.read().unwrap_or_else(PoisonError::into_inner);
        (record.name.clone(), record.fields.clone())
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

/// A local callable. It can be invoked locally but never sent.
#[derive(Clone)]
pub struct LocalFunction {
    name: String,
    call: Arc<dyn Fn(&[Remote]) -> Arg + Send + Sync>,
}

impl LocalFunction {
    pub fn new(name: impl Into<String>, call: impl Fn(&[Remote]) -> Arg + Send + Sync + 'static) -> Self {
        Self { name: name.into(), call: Arc::new(call) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, args: &[Remote]) -> Arg {
        (self.call)(args)
    }
}

#[derive(Clone)]
pub enum Arg {
    Value(Plain),
    Array(Vec<Arg>),
    Buffer(Vec<u8>),
    /// Epoch milliseconds.
    Date(f64),
    Object(LocalObject),
    Remote(RemoteObject),
    Promise(RemotePromise),
    /// A function that ignores its arguments and returns this value.
    Returning(Box<Arg>),
    Function(LocalFunction),
}

impl Arg {
    pub fn undefined() -> Self {
        Arg::Value(Plain::Undefined)
    }

    pub fn null() -> Self {
        Arg::Value(Plain::Null)
    }

    /// A callable stand-in that always returns `value` on the server.
    pub fn returning(value: impl Into<Arg>) -> Self {
        Arg::Returning(Box::new(value.into()))
    }
}

impl From<Plain> for Arg {
    fn from(v: Plain) -> Self { Arg::Value(v) }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self { Arg::Value(v.into()) }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self { Arg::Value(v.into()) }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self { Arg::Value(v.into()) }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self { Arg::Value(v.into()) }
}

impl From<String> for Arg {
    fn from(v: String) -> Self { Arg::Value(v.into()) }
}

impl From<Vec<u8>> for Arg {
    fn from(v: Vec<u8>) -> Self { Arg::Buffer(v) }
}

impl From<LocalObject> for Arg {
    fn from(v: LocalObject) -> Self { Arg::Object(v) }
}

impl From<LocalFunction> for Arg {
    fn from(v: LocalFunction) -> Self { Arg::Function(v) }
}

impl From<RemoteObject> for Arg {
    fn from(v: RemoteObject) -> Self { Arg::Remote(v) }
}

impl From<&RemoteObject> for Arg {
    fn from(v: &RemoteObject) -> Self { Arg::Remote(v.clone()) }
}

impl From<RemotePromise> for Arg {
    fn from(v: RemotePromise) -> Self { Arg::Promise(v) }
}

/// Sends a materialized result back the way it arrived.
impl From<Remote> for Arg {
    fn from(v: Remote) -> Self {
        match v {
            Remote::Value(plain) => Arg::Value(plain),
            Remote::Array(items) => Arg::Array(items.into_iter().map(Arg::from).collect()),
            Remote::Buffer(bytes) => Arg::Buffer(bytes),
            Remote::Date(ms) => Arg::Date(ms),
            Remote::Object(o) | Remote::Function(o) => Arg::Remote(o),
            Remote::Promise(p) => Arg::Promise(p),
            Remote::Error(e) => {
                let record = LocalObject::new("Error");
                for (key, value) in e.members {
                    record.set(key, value);
                }
                Arg::Object(record)
            }
        }
    }
}

/// Encodes arguments for one session.
pub(crate) struct ArgEncoder {
    session: SessionId,
    path: Vec<usize>,
}

impl ArgEncoder {
    pub(crate) fn new(session: SessionId) -> Self {
        Self { session, path: Vec::new() }
    }

    pub(crate) fn encode_all(&mut self, args: impl IntoIterator<Item = Arg>) -> Result<Vec<ArgMeta>> {
        args.into_iter().map(|arg| self.encode(&arg)).collect()
    }

    pub(crate) fn encode(&mut self, arg: &Arg) -> Result<ArgMeta> {
        match arg {
            Arg::Value(plain) => Ok(ArgMeta::Value(plain.clone())),
            Arg::Array(items) => Ok(ArgMeta::Array(items.iter().map(|item| self.encode(item)).collect::<Result<_>>()?)),
            Arg::Buffer(bytes) => Ok(ArgMeta::Buffer(bytes.clone())),
            Arg::Date(ms) => Ok(ArgMeta::Date(*ms)),
            Arg::Object(object) => {
                let addr = object.addr();
                if self.path.contains(&addr) {
                    return Ok(ArgMeta::null());
                }
                let (name, fields) = object.snapshot();
                self.path.push(addr);
                let members = fields
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), self.encode(value)?)))
                    .collect::<Result<Vec<_>>>();
                self.path.pop();
                Ok(ArgMeta::Object { name, members: members? })
            }
            Arg::Remote(object) => Ok(ArgMeta::RemoteObject(self.own(object)?)),
            Arg::Promise(promise) => {
                let then = self.own(&promise.then)?;
                Ok(ArgMeta::Promise { then: Box::new(ArgMeta::RemoteObject(then)) })
            }
            Arg::Returning(value) => Ok(ArgMeta::FunctionWithReturnValue(Box::new(self.encode(value)?))),
            Arg::Function(f) => Err(Error::UnsupportedValue(format!(
                "function '{}' cannot be sent; use Arg::returning for a fixed result",
                f.name
            ))),
        }
    }

    fn own(&self, object: &RemoteObject) -> Result<metarpc::HandleId> {
        if object.session_id() != self.session {
            return Err(Error::ForeignHandle { id: object.id(), session: object.session_id() });
        }
        Ok(object.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_referencing_record_breaks_to_null() {
        let record = LocalObject::record().with("x", 1);
        record.set("me", record.clone());

        let meta = ArgEncoder::new(SessionId(1)).encode(&record.into()).unwrap();
        assert_eq!(
            meta,
            ArgMeta::Object {
                name: "Object".into(),
                members: vec![("x".into(), ArgMeta::Value(Plain::Number(1.0))), ("me".into(), ArgMeta::null())],
            }
        );
    }

    #[test]
    fn test_shared_record_is_not_a_cycle() {
        let shared = LocalObject::new("Point").with("x", 1);
        let args = vec![Arg::Array(vec![shared.clone().into(), shared.into()])];

        let metas = ArgEncoder::new(SessionId(1)).encode_all(args).unwrap();
        let ArgMeta::Array(items) = &metas[0] else { panic!("expected an array") };
        assert!(items.iter().all(|item| matches!(item, ArgMeta::Object { .. })));
    }

    #[test]
    fn test_mutual_cycle() {
        let a = LocalObject::new("A");
        let b = LocalObject::new("B").with("a", a.clone());
        a.set("b", b);

        let meta = ArgEncoder::new(SessionId(1)).encode(&a.into()).unwrap();
        let ArgMeta::Object { members, .. } = meta else { panic!("expected an object") };
        let ArgMeta::Object { members: inner, .. } = &members[0].1 else { panic!("expected a nested object") };
        assert_eq!(inner[0], ("a".to_string(), ArgMeta::null()));
    }

    #[test]
    fn test_returning_and_refused_callables() {
        let mut encoder = ArgEncoder::new(SessionId(1));
        assert_eq!(
            encoder.encode(&Arg::returning("ok")).unwrap(),
            ArgMeta::FunctionWithReturnValue(Box::new(ArgMeta::Value(Plain::from("ok"))))
        );

        let callback = LocalFunction::new("onClosed", |_| Arg::undefined());
        let err = encoder.encode_all([Arg::from(1), callback.into()]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValue(msg) if msg.contains("'onClosed'")));
    }
}
