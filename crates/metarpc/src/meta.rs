//! # Descriptors
//!
//! The structurally typed description of a value crossing the boundary.
//!
//! ## Invariants
//!
//! - **Direction**: handle-bearing `object`/`function`, `promise`, `error` and
//!   `exception` only exist in [`Meta`] (server to client). `remote-object`
//!   and `function-with-return-value` only exist in [`ArgMeta`] (client to server).
//! - **Acyclic**: a descriptor is a tree. Encoders substitute `null` at a
//!   cyclic edge before a descriptor is ever built.

/// Opaque reference to a live server-side object, scoped to a session.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical client lifetime scope whose handles are released together.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Pass-by-value data.
///
/// Scalars cover the primitive space of the host. Lists and records only
/// appear when a call result was sent by value instead of as a handle.
#[derive(Clone, Debug, PartialEq)]
pub enum Plain {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Plain>),
    Record(Vec<(String, Plain)>),
}

impl Plain {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Plain::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Plain::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Plain {
    fn from(v: bool) -> Self { Plain::Bool(v) }
}

impl From<f64> for Plain {
    fn from(v: f64) -> Self { Plain::Number(v) }
}

impl From<i32> for Plain {
    fn from(v: i32) -> Self { Plain::Number(v as f64) }
}

impl From<&str> for Plain {
    fn from(v: &str) -> Self { Plain::String(v.to_string()) }
}

impl From<String> for Plain {
    fn from(v: String) -> Self { Plain::String(v) }
}

/// How a member slot should be proxied on the client.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemberKind {
    /// A data slot holding a callable.
    Method,
    /// Anything else; read lazily through a round trip.
    Accessor,
}

impl MemberKind {
    pub fn as_tag(self) -> &'static str {
        match self {
            MemberKind::Method => "method",
            MemberKind::Accessor => "accessor",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "method" => Some(MemberKind::Method),
            "accessor" => Some(MemberKind::Accessor),
            _ => None,
        }
    }
}

/// Describes one property slot without transmitting its value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberDescriptor {
    pub name: String,
    pub enumerable: bool,
    pub writable: bool,
    pub kind: MemberKind,
}

/// One level of a prototype chain. The implicit root is never sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prototype {
    pub members: Vec<MemberDescriptor>,
    pub proto: Option<Box<Prototype>>,
}

impl Prototype {
    /// Number of levels in this chain, this one included.
    pub fn depth(&self) -> usize {
        1 + self.proto.as_ref().map_or(0, |p| p.depth())
    }
}

/// Payload shared by the `object` and `function` tags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    pub id: HandleId,
    /// Constructor name (`""` when unknown).
    pub name: String,
    pub members: Vec<MemberDescriptor>,
    pub proto: Option<Box<Prototype>>,
}

/// Payload of the `exception` tag: the whole operation failed.
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionMeta {
    pub name: String,
    pub message: String,
    pub stack: String,
    /// `EBADRPC` for protocol errors, or the thrown error's own `code`.
    pub code: Option<String>,
    pub cause: Option<Box<Meta>>,
}

/// Server to client descriptor.
#[derive(Clone, Debug, PartialEq)]
pub enum Meta {
    Value(Plain),
    Array(Vec<Meta>),
    Object(ObjectMeta),
    Function(ObjectMeta),
    Buffer(Vec<u8>),
    /// Epoch milliseconds.
    Date(f64),
    /// A pending result. `then` describes a callable forwarding to the real `then`.
    Promise { then: Box<Meta> },
    /// A thrown-shaped value, members include `name`.
    Error { members: Vec<(String, Meta)> },
    Exception(ExceptionMeta),
}

impl Meta {
    pub fn undefined() -> Self {
        Meta::Value(Plain::Undefined)
    }

    pub fn null() -> Self {
        Meta::Value(Plain::Null)
    }

    /// The wire tag of this descriptor.
    pub fn tag(&self) -> &'static str {
        match self {
            Meta::Value(_) => "value",
            Meta::Array(_) => "array",
            Meta::Object(_) => "object",
            Meta::Function(_) => "function",
            Meta::Buffer(_) => "buffer",
            Meta::Date(_) => "date",
            Meta::Promise { .. } => "promise",
            Meta::Error { .. } => "error",
            Meta::Exception(_) => "exception",
        }
    }

    /// The handle carried by an `object` or `function` descriptor.
    pub fn handle(&self) -> Option<HandleId> {
        match self {
            Meta::Object(o) | Meta::Function(o) => Some(o.id),
            _ => None,
        }
    }
}

/// Client to server descriptor (call arguments and assigned values).
#[derive(Clone, Debug, PartialEq)]
pub enum ArgMeta {
    Value(Plain),
    Array(Vec<ArgMeta>),
    Buffer(Vec<u8>),
    Date(f64),
    Promise { then: Box<ArgMeta> },
    /// A plain record built from its members.
    Object { name: String, members: Vec<(String, ArgMeta)> },
    /// A handle previously issued by the server.
    RemoteObject(HandleId),
    /// A callable approximated by its precomputed return value.
    FunctionWithReturnValue(Box<ArgMeta>),
    /// A live callable. Never accepted; present so it can be refused loudly.
    Function { name: String },
}

impl ArgMeta {
    pub fn null() -> Self {
        ArgMeta::Value(Plain::Null)
    }

    /// The wire tag of this descriptor.
    pub fn tag(&self) -> &'static str {
        match self {
            ArgMeta::Value(_) => "value",
            ArgMeta::Array(_) => "array",
            ArgMeta::Buffer(_) => "buffer",
            ArgMeta::Date(_) => "date",
            ArgMeta::Promise { .. } => "promise",
            ArgMeta::Object { .. } => "object",
            ArgMeta::RemoteObject(_) => "remote-object",
            ArgMeta::FunctionWithReturnValue(_) => "function-with-return-value",
            ArgMeta::Function { .. } => "function",
        }
    }
}
