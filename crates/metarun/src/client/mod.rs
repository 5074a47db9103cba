//! # Client
//!
//! A [`Session`] is the client side of one logical connection: it builds
//! chains, ships them through a [`Transport`], and turns replies into
//! [`Remote`] values.
//!
//! ## Lifetime
//!
//! - Shells report their own drop. Dropped handles are batched and sent as a
//!   single `Dereference` frame ahead of the next commit, or on
//!   [`Session::flush_releases`].
//! - [`Session::release`] retires everything the server holds for the session.

pub mod args;
pub mod chain;
pub mod error;
pub mod remote;

mod materialize;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;

use dashmap::DashMap;
use metarpc::Command;
use metarpc::CommandChain;
use metarpc::Dereference;
use metarpc::HandleId;
use metarpc::Reply;
use metarpc::Request;
use metarpc::SessionId;

use crate::client::chain::Chain;
use crate::client::error::Error;
use crate::client::error::Result;
use crate::client::remote::Remote;
use crate::client::remote::Shell;
use crate::transport::Transport;

pub(crate) struct SessionInner {
    pub(crate) id: SessionId,
    transport: Arc<dyn Transport>,
    /// Live shells by handle. Entries go stale when the shell drops.
    pub(crate) cache: DashMap<HandleId, Weak<Shell>>,
    releases: Mutex<Vec<Dereference>>,
}

impl SessionInner {
    fn releases(&self) -> MutexGuard<'_, Vec<Dereference>> {
        self.releases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called from a shell's drop: unlink it and queue the dereference.
    pub(crate) fn forget(&self, id: HandleId, count: u64) {
        // A newer shell for the same id may already sit in the slot; keep it.
        self.cache.remove_if(&id, |_, shell| shell.strong_count() == 0);
        self.releases().push(Dereference { id, count });
    }

    async fn roundtrip(&self, request: &Request) -> Result<Reply> {
        let payload = request.to_bytes()?;
        let reply = self.transport.call(&payload).await?;
        Ok(Reply::from_bytes(&reply)?)
    }

    async fn flush(&self) -> Result<usize> {
        let handles = std::mem::take(&mut *self.releases());
        if handles.is_empty() {
            return Ok(0);
        }
        let count = handles.len();
        let request = Request::Dereference { session: self.id, handles };
        let outcome = self.roundtrip(&request).await;
        if let Ok(Reply::Ack) = outcome {
            tracing::debug!(session = %self.id, count, "dereferenced handles");
            return Ok(count);
        }
        if let Request::Dereference { handles, .. } = request {
            self.releases().extend(handles);
        }
        tracing::warn!(session = %self.id, count, "dereference not acknowledged; requeued");
        match outcome {
            Err(e) => Err(e),
            Ok(_) => Err(Error::UnexpectedReply("dereference answered with a result")),
        }
    }

    pub(crate) async fn commit(self: &Arc<Self>, commands: Vec<Command>) -> Result<Remote> {
        self.flush().await?;
        tracing::debug!(session = %self.id, steps = commands.len(), "commit");
        let request = Request::Commit(CommandChain::new(self.id, commands));
        match self.roundtrip(&request).await? {
            Reply::Result(meta) => materialize::materialize(self, meta),
            Reply::Ack => Err(Error::UnexpectedReply("commit answered with an ack")),
        }
    }
}

/// The client side of one session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(id: SessionId, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                transport,
                cache: DashMap::new(),
                releases: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// A chain starting at a built-in module member.
    pub fn builtin(&self, name: impl Into<String>) -> Chain {
        Chain::start(self.inner.clone(), Command::GetBuiltin { name: name.into() })
    }

    /// A chain starting at a named global.
    pub fn global(&self, name: impl Into<String>) -> Chain {
        Chain::start(self.inner.clone(), Command::GetGlobal { name: name.into() })
    }

    pub fn current_window(&self) -> Chain {
        Chain::start(self.inner.clone(), Command::GetCurrentWindow)
    }

    pub fn current_web_contents(&self) -> Chain {
        Chain::start(self.inner.clone(), Command::GetCurrentWebContents)
    }

    /// A chain starting at a module loaded on the server.
    pub fn require(&self, name: impl Into<String>) -> Chain {
        Chain::start(self.inner.clone(), Command::Require { name: name.into() })
    }

    /// Commits a hand-built command list.
    pub async fn commit(&self, commands: Vec<Command>) -> Result<Remote> {
        SessionInner::commit(&self.inner, commands).await
    }

    /// Sends queued dereferences now. Returns how many handles were sent.
    pub async fn flush_releases(&self) -> Result<usize> {
        self.inner.flush().await
    }

    /// Retires every handle the server holds for this session.
    ///
    /// Shells still alive afterwards refer to retired handles; using them
    /// fails with a protocol error.
    pub async fn release(&self) -> Result<()> {
        self.inner.releases().clear();
        self.inner.cache.clear();
        match self.inner.roundtrip(&Request::Release { session: self.inner.id }).await? {
            Reply::Ack => {
                tracing::debug!(session = %self.inner.id, "released");
                Ok(())
            }
            Reply::Result(_) => Err(Error::UnexpectedReply("release answered with a result")),
        }
    }

    /// Number of handles with a live shell.
    pub fn cached_handles(&self) -> usize {
        self.inner.cache.iter().filter(|entry| entry.value().strong_count() > 0).count()
    }

    /// Number of dropped handles waiting to be dereferenced.
    pub fn pending_releases(&self) -> usize {
        self.inner.releases().len()
    }
}
