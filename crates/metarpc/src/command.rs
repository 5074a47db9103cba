//! # Commands
//!
//! One step of a chain. Steps run left to right against a single register
//! that starts out `undefined`.

use crate::meta::ArgMeta;
use crate::meta::HandleId;
use crate::meta::SessionId;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    MemberGet { name: String },
    MemberSet { name: String, value: ArgMeta },
    MemberCall { name: String, args: Vec<ArgMeta> },
    MemberConstruct { name: String, args: Vec<ArgMeta> },

    RemoteObjectGet { id: HandleId, name: String },
    RemoteObjectSet { id: HandleId, name: String, value: ArgMeta },
    RemoteObjectCall { id: HandleId, name: String, args: Vec<ArgMeta> },
    RemoteObjectConstruct { id: HandleId, name: String, args: Vec<ArgMeta> },

    /// Calls the register (no id) or a resolved handle.
    FunctionCall { id: Option<HandleId>, args: Vec<ArgMeta> },
    /// Constructs from the register (no id) or a resolved handle.
    ConstructorCall { id: Option<HandleId>, args: Vec<ArgMeta> },

    GetBuiltin { name: String },
    GetGlobal { name: String },
    GetCurrentWindow,
    GetCurrentWebContents,
    Require { name: String },
}

impl Command {
    /// The wire tag of this command.
    pub fn tag(&self) -> &'static str {
        match self {
            Command::MemberGet { .. } => "member_get",
            Command::MemberSet { .. } => "member_set",
            Command::MemberCall { .. } => "member_call",
            Command::MemberConstruct { .. } => "member_construct",
            Command::RemoteObjectGet { .. } => "remote_object_get",
            Command::RemoteObjectSet { .. } => "remote_object_set",
            Command::RemoteObjectCall { .. } => "remote_object_call",
            Command::RemoteObjectConstruct { .. } => "remote_object_construct",
            Command::FunctionCall { .. } => "function_call",
            Command::ConstructorCall { .. } => "constructor_call",
            Command::GetBuiltin { .. } => "get_builtin",
            Command::GetGlobal { .. } => "get_global",
            Command::GetCurrentWindow => "get_current_window",
            Command::GetCurrentWebContents => "get_current_web_contents",
            Command::Require { .. } => "require",
        }
    }

    /// True for the invocation shapes whose result may be sent by value.
    pub fn is_call(&self) -> bool {
        matches!(
            self,
            Command::MemberCall { .. } | Command::RemoteObjectCall { .. } | Command::FunctionCall { .. }
        )
    }
}

/// An ordered list of commands evaluated in one request.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandChain {
    pub session: SessionId,
    pub commands: Vec<Command>,
}

impl CommandChain {
    pub fn new(session: SessionId, commands: Vec<Command>) -> Self {
        Self { session, commands }
    }

    /// Whether the trailing result is eligible for by-value encoding.
    pub fn ends_in_call(&self) -> bool {
        self.commands.last().is_some_and(Command::is_call)
    }
}
