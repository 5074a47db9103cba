//! # Chain Builder
//!
//! Accumulates commands locally until [`Chain::commit`] sends them as a single
//! request. Reads are lazy: `get` only records a step.
//!
//! A call or construct applied right after a read upgrades that read in
//! place, so `get("hide").call([])` becomes one `member_call`. Applied to
//! anything else it becomes a `function_call`/`constructor_call` on the
//! current result.

use std::sync::Arc;

use metarpc::Command;
use metarpc::HandleId;

use crate::client::SessionInner;
use crate::client::args::Arg;
use crate::client::args::ArgEncoder;
use crate::client::error::Error;
use crate::client::error::Result;
use crate::client::remote::Remote;

#[must_use = "a chain does nothing until it is committed"]
pub struct Chain {
    session: Arc<SessionInner>,
    /// Handle the chain starts from, if it starts from one.
    root: Option<HandleId>,
    commands: Vec<Command>,
}

impl Chain {
    pub(crate) fn start(session: Arc<SessionInner>, command: Command) -> Self {
        Self { session, root: None, commands: vec![command] }
    }

    pub(crate) fn rooted(session: Arc<SessionInner>, id: HandleId) -> Self {
        Self { session, root: Some(id), commands: Vec::new() }
    }

    /// The commands recorded so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn get(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let command = match self.root.filter(|_| self.commands.is_empty()) {
            Some(id) => Command::RemoteObjectGet { id, name },
            None => Command::MemberGet { name },
        };
        self.commands.push(command);
        self
    }

    pub fn call(mut self, args: impl IntoIterator<Item = Arg>) -> Result<Self> {
        let args = ArgEncoder::new(self.session.id).encode_all(args)?;
        let command = match self.commands.pop() {
            Some(Command::MemberGet { name }) => Command::MemberCall { name, args },
            Some(Command::RemoteObjectGet { id, name }) => Command::RemoteObjectCall { id, name, args },
            previous => {
                self.commands.extend(previous);
                Command::FunctionCall { id: self.bare_root(), args }
            }
        };
        self.commands.push(command);
        Ok(self)
    }

    pub fn construct(mut self, args: impl IntoIterator<Item = Arg>) -> Result<Self> {
        let args = ArgEncoder::new(self.session.id).encode_all(args)?;
        let command = match self.commands.pop() {
            Some(Command::MemberGet { name }) => Command::MemberConstruct { name, args },
            Some(Command::RemoteObjectGet { id, name }) => Command::RemoteObjectConstruct { id, name, args },
            previous => {
                self.commands.extend(previous);
                Command::ConstructorCall { id: self.bare_root(), args }
            }
        };
        self.commands.push(command);
        Ok(self)
    }

    /// Appends an assignment and commits the chain.
    pub async fn set(mut self, name: impl Into<String>, value: impl Into<Arg>) -> Result<()> {
        let name = name.into();
        let value = ArgEncoder::new(self.session.id).encode(&value.into())?;
        let command = match self.bare_root() {
            Some(id) => Command::RemoteObjectSet { id, name, value },
            None => Command::MemberSet { name, value },
        };
        self.commands.push(command);
        match self.commit().await? {
            Remote::Value(_) => Ok(()),
            _ => Err(Error::UnexpectedReply("assignment produced a handle")),
        }
    }

    /// Sends the chain and materializes its final value.
    ///
    /// An empty chain evaluates to `undefined`.
    pub async fn commit(self) -> Result<Remote> {
        SessionInner::commit(&self.session, self.commands).await
    }

    /// The root handle when no step has been recorded yet.
    fn bare_root(&self) -> Option<HandleId> {
        self.root.filter(|_| self.commands.is_empty())
    }
}
