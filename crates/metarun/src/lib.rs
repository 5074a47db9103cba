//! # MetaRun
//!
//! Both ends of the remote object protocol.
//!
//! ## Architecture
//!
//! - [`server`]: owns live objects, hands out session-scoped handles, and
//!   evaluates command chains against them.
//! - [`client`]: builds chains, ships them, and materializes the replies into
//!   proxies that keep their identity while alive.
//! - [`transport`]: the byte pipe between the two, with an in-process loopback
//!   and a tokio channel implementation.
//!
//! ```ignore
//! let server = Arc::new(Server::builder().host(host).build());
//! let session = Session::new(SessionId(1), Arc::new(LocalTransport::new(server)));
//! let title = session.current_window().get("getTitle").call([])?.commit().await?;
//! ```

pub mod client;
pub mod server;
pub mod transport;


pub use client::Session;
pub use client::args::Arg;
pub use client::args::LocalFunction;
pub use client::args::LocalObject;
pub use client::chain::Chain;
pub use client::error::Error;
pub use client::error::Result;
pub use client::remote::Remote;
pub use client::remote::RemoteError;
pub use client::remote::RemoteException;
pub use client::remote::RemoteObject;
pub use client::remote::RemotePromise;
pub use server::Server;
pub use server::ServerBuilder;
pub use transport::ChannelTransport;
pub use transport::LocalTransport;
pub use transport::Transport;
