//! # MetaRPC
//!
//! The remote object protocol: what crosses the process boundary and how it is laid out on the wire.
//!
//! ## Architecture
//!
//! - [`meta`]: the descriptor model. `Meta` flows server to client, `ArgMeta`
//!   flows client to server, and the type system keeps the two directions apart.
//! - [`command`]: the steps of a command chain.
//! - [`codec`]: descriptor and command translation onto `metapack`.
//! - [`frame`]: the request/reply envelope.

pub mod codec;
pub mod command;
pub mod error;
pub mod frame;
pub mod meta;


pub use command::Command;
pub use command::CommandChain;
pub use error::Error;
pub use error::Result;
pub use frame::Dereference;
pub use frame::Reply;
pub use frame::Request;
pub use meta::ArgMeta;
pub use meta::ExceptionMeta;
pub use meta::HandleId;
pub use meta::MemberDescriptor;
pub use meta::MemberKind;
pub use meta::Meta;
pub use meta::ObjectMeta;
pub use meta::Plain;
pub use meta::Prototype;
pub use meta::SessionId;
