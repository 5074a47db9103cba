//! # Server
//!
//! Owns the handle registry and the host, and answers request frames.
//!
//! ## Philosophy
//!
//! - **One Chain, One Answer**: a commit always yields exactly one descriptor.
//!   Failures become an `exception` descriptor, never a transport error.
//! - **Injected State**: the registry, host and scalar policy are trait objects
//!   supplied through [`ServerBuilder`], so tests can observe and replace them.

pub mod decode;
pub mod encode;
pub mod host;
pub mod interpreter;
pub mod registry;
pub mod value;

use std::sync::Arc;

use metarpc::CommandChain;
use metarpc::ExceptionMeta;
use metarpc::Meta;
use metarpc::Reply;
use metarpc::Request;
use metarpc::SessionId;

use crate::server::encode::MAX_PROTO_DEPTH;
use crate::server::encode::ScalarPolicy;
use crate::server::encode::SimpleMarker;
use crate::server::host::Host;
use crate::server::host::StaticHost;
use crate::server::interpreter::Interpreter;
use crate::server::registry::HandleRegistry;
use crate::server::registry::SessionRegistry;
use crate::server::value::RPC_ERROR_CODE;

/// Everything the encoder, decoder and interpreter need for one session.
pub struct Scope<'a> {
    pub session: SessionId,
    pub registry: &'a dyn HandleRegistry,
    pub policy: &'a dyn ScalarPolicy,
    pub max_proto_depth: usize,
}

pub struct Server {
    registry: Arc<dyn HandleRegistry>,
    host: Arc<dyn Host>,
    policy: Arc<dyn ScalarPolicy>,
    max_proto_depth: usize,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn registry(&self) -> &Arc<dyn HandleRegistry> {
        &self.registry
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Runs one chain for its session.
    pub fn commit(&self, chain: &CommandChain) -> Meta {
        let scope = Scope {
            session: chain.session,
            registry: self.registry.as_ref(),
            policy: self.policy.as_ref(),
            max_proto_depth: self.max_proto_depth,
        };
        tracing::debug!(session = %chain.session, steps = chain.commands.len(), "commit");
        Interpreter::new(&scope, self.host.as_ref()).run(chain)
    }

    pub fn dispatch(&self, request: Request) -> Reply {
        match request {
            Request::Commit(chain) => Reply::Result(self.commit(&chain)),
            Request::Release { session } => {
                let retired = self.registry.retire_session(session);
                tracing::debug!(%session, retired, "release");
                Reply::Ack
            }
            Request::Dereference { session, handles } => {
                for handle in &handles {
                    self.registry.retire_handle(session, handle.id, handle.count);
                }
                tracing::debug!(%session, handles = handles.len(), "dereference");
                Reply::Ack
            }
        }
    }

    /// Answers one encoded request with one encoded reply.
    ///
    /// A request that does not decode is answered with a protocol exception.
    /// Only a reply that itself cannot be encoded surfaces as an error.
    pub fn handle(&self, payload: &[u8]) -> metarpc::Result<Vec<u8>> {
        let reply = match Request::from_bytes(payload) {
            Ok(request) => self.dispatch(request),
            Err(e) => {
                tracing::warn!(error = %e, "malformed request");
                Reply::Result(protocol_exception(format!("Malformed request: {}", e)))
            }
        };
        match reply.to_bytes() {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::warn!(error = %e, "reply could not be encoded");
                Reply::Result(protocol_exception(format!("Result could not be encoded: {}", e))).to_bytes()
            }
        }
    }
}

fn protocol_exception(message: String) -> Meta {
    Meta::Exception(ExceptionMeta {
        name: "Error".into(),
        stack: format!("Error: {}", message),
        message,
        code: Some(RPC_ERROR_CODE.into()),
        cause: None,
    })
}

/// Fluent configuration for a [`Server`]. Every part has a default.
pub struct ServerBuilder {
    registry: Option<Arc<dyn HandleRegistry>>,
    host: Option<Arc<dyn Host>>,
    policy: Option<Arc<dyn ScalarPolicy>>,
    max_proto_depth: usize,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self { registry: None, host: None, policy: None, max_proto_depth: MAX_PROTO_DEPTH }
    }

    pub fn registry(mut self, registry: Arc<dyn HandleRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn host(mut self, host: impl Host + 'static) -> Self {
        self.host = Some(Arc::new(host));
        self
    }

    pub fn scalar_policy(mut self, policy: impl ScalarPolicy + 'static) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Levels of prototype chain described per object.
    pub fn max_proto_depth(mut self, depth: usize) -> Self {
        self.max_proto_depth = depth;
        self
    }

    pub fn build(self) -> Server {
        Server {
            registry: self.registry.unwrap_or_else(|| Arc::new(SessionRegistry::new())),
            host: self.host.unwrap_or_else(|| Arc::new(StaticHost::new())),
            policy: self.policy.unwrap_or_else(|| Arc::new(SimpleMarker)),
            max_proto_depth: self.max_proto_depth,
        }
    }
}
