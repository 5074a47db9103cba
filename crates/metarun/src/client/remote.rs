//! # Remote Values
//!
//! What a committed chain resolves to on the client.
//!
//! Handle-bearing results become [`RemoteObject`] shells. A shell is shared:
//! while any clone of it is alive, the same handle always materializes to the
//! same shell. Dropping the last clone queues a dereference for the server.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use metarpc::HandleId;
use metarpc::MemberDescriptor;
use metarpc::Plain;
use metarpc::Prototype;
use metarpc::SessionId;

use crate::client::SessionInner;
use crate::client::args::Arg;
use crate::client::chain::Chain;
use crate::client::error::Error;
use crate::client::error::Result;

pub(crate) struct Shell {
    pub(crate) session: Arc<SessionInner>,
    pub(crate) id: HandleId,
    pub(crate) function: bool,
    pub(crate) class: String,
    pub(crate) members: Vec<MemberDescriptor>,
    pub(crate) proto: Option<Box<Prototype>>,
    /// How many times the server has sent this handle to this shell.
    pub(crate) received: AtomicU64,
}

impl Drop for Shell {
    fn drop(&mut self) {
        self.session.forget(self.id, self.received.load(Ordering::Acquire));
    }
}

/// Client-side proxy for a server object or function.
#[derive(Clone)]
pub struct RemoteObject {
    pub(crate) inner: Arc<Shell>,
}

impl std::fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RemoteObject({}#{})", self.inner.class, self.inner.id)
    }
}

impl PartialEq for RemoteObject {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl RemoteObject {
    pub fn id(&self) -> HandleId {
        self.inner.id
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.session.id
    }

    /// Constructor name reported by the server.
    pub fn class_name(&self) -> &str {
        &self.inner.class
    }

    pub fn is_function(&self) -> bool {
        self.inner.function
    }

    /// Own members, in server order.
    pub fn members(&self) -> &[MemberDescriptor] {
        &self.inner.members
    }

    pub fn prototype(&self) -> Option<&Prototype> {
        self.inner.proto.as_deref()
    }

    /// Finds `name` among own members, then up the described prototype chain.
    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        if let Some(member) = self.inner.members.iter().find(|m| m.name == name) {
            return Some(member);
        }
        let mut proto = self.inner.proto.as_deref();
        while let Some(level) = proto {
            if let Some(member) = level.members.iter().find(|m| m.name == name) {
                return Some(member);
            }
            proto = level.proto.as_deref();
        }
        None
    }

    /// An empty chain rooted at this handle.
    pub fn chain(&self) -> Chain {
        Chain::rooted(self.inner.session.clone(), self.inner.id)
    }

    /// Starts a lazy read of `name`.
    pub fn get(&self, name: impl Into<String>) -> Chain {
        self.chain().get(name)
    }

    /// Calls method `name` with `args`.
    pub fn method(&self, name: impl Into<String>, args: impl IntoIterator<Item = Arg>) -> Result<Chain> {
        self.get(name).call(args)
    }

    /// Calls this handle as a function.
    pub fn call(&self, args: impl IntoIterator<Item = Arg>) -> Result<Chain> {
        self.chain().call(args)
    }

    /// Calls this handle as a constructor.
    pub fn construct(&self, args: impl IntoIterator<Item = Arg>) -> Result<Chain> {
        self.chain().construct(args)
    }

    /// Assigns `self[name] = value` in one round trip.
    ///
    /// Members described as read-only are refused without contacting the server.
    pub async fn set(&self, name: impl Into<String>, value: impl Into<Arg>) -> Result<()> {
        let name = name.into();
        if self.member(&name).is_some_and(|m| !m.writable) {
            return Err(Error::NotWritable { id: self.inner.id, name });
        }
        self.chain().set(name, value).await
    }
}

/// A pending server result. `then` forwards to the real promise.
#[derive(Clone, Debug, PartialEq)]
pub struct RemotePromise {
    pub(crate) then: RemoteObject,
}

impl RemotePromise {
    /// The forwarding `then` function.
    pub fn then_fn(&self) -> &RemoteObject {
        &self.then
    }

    /// Registers reactions on the server-side promise.
    pub async fn then(&self, on_fulfilled: impl Into<Arg>, on_rejected: impl Into<Arg>) -> Result<Remote> {
        self.then.call([on_fulfilled.into(), on_rejected.into()])?.commit().await
    }
}

/// A thrown-shaped value that was returned rather than thrown.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteError {
    pub members: Vec<(String, Remote)>,
}

impl RemoteError {
    pub fn member(&self, name: &str) -> Option<&Remote> {
        self.members.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn name(&self) -> Option<&str> {
        self.member("name").and_then(Remote::as_str)
    }

    pub fn message(&self) -> Option<&str> {
        self.member("message").and_then(Remote::as_str)
    }

    pub fn stack(&self) -> Option<&str> {
        self.member("stack").and_then(Remote::as_str)
    }
}

/// The failure of a whole chain.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteException {
    pub name: String,
    pub message: String,
    pub stack: String,
    pub code: Option<String>,
    pub cause: Option<Box<Remote>>,
}

impl RemoteException {
    /// True when the chain was invalid for the server (unknown handles, bad frames).
    pub fn is_protocol_error(&self) -> bool {
        self.code.as_deref() == Some("EBADRPC")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Remote {
    Value(Plain),
    Array(Vec<Remote>),
    Buffer(Vec<u8>),
    Date(f64),
    Object(RemoteObject),
    Function(RemoteObject),
    Promise(RemotePromise),
    Error(RemoteError),
}

impl Remote {
    pub fn as_plain(&self) -> Option<&Plain> {
        match self {
            Remote::Value(plain) => Some(plain),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        self.as_plain().and_then(Plain::as_number)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_plain().and_then(Plain::as_str)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Remote::Value(Plain::Undefined))
    }

    /// The shell behind an object or function result.
    pub fn as_object(&self) -> Option<&RemoteObject> {
        match self {
            Remote::Object(o) | Remote::Function(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<RemoteObject> {
        match self {
            Remote::Object(o) | Remote::Function(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&RemotePromise> {
        match self {
            Remote::Promise(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&RemoteError> {
        match self {
            Remote::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Remote]> {
        match self {
            Remote::Array(items) => Some(items),
            _ => None,
        }
    }
}
