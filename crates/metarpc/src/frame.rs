//! # Protocol Frames
//!
//! The envelope around a chain or a release notice, and around the answer.
//!
//! ## Messages
//! - `Commit`: one command chain, answered by `Result(meta)`.
//! - `Release`: retire every handle of a session, answered by `Ack`.
//! - `Dereference`: the client dropped some shells, answered by `Ack`.
//!
//! ## Invariants
//! - **Panic Safety**: all decoding paths return `Result`.
//! - **Forward Compatibility**: unknown header fields are skipped.

use metapack::Decoder;
use metapack::Encoder;

use crate::codec::decode_command;
use crate::codec::decode_meta;
use crate::codec::encode_command;
use crate::codec::encode_meta;
use crate::command::CommandChain;
use crate::error::Error;
use crate::error::Result;
use crate::meta::HandleId;
use crate::meta::Meta;
use crate::meta::SessionId;

/// A shell the client dropped, and how many times it had received that handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Dereference {
    pub id: HandleId,
    pub count: u64,
}

/// Client to server message.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    Commit(CommandChain),
    Release { session: SessionId },
    Dereference { session: SessionId, handles: Vec<Dereference> },
}

impl Request {
    pub fn session(&self) -> SessionId {
        match self {
            Request::Commit(chain) => chain.session,
            Request::Release { session } | Request::Dereference { session, .. } => *session,
        }
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        match self {
            Request::Commit(chain) => {
                enc.variant_begin("Commit")?;
                enc.map_begin()?;
                enc.entry("session", |e| e.u64(chain.session.0))?;
                enc.variant_begin("chain")?;
                enc.list_begin()?;
                for command in &chain.commands {
                    encode_command(enc, command)?;
                }
                enc.list_end()?;
                enc.variant_end()?;
                enc.map_end()?;
                enc.variant_end()?;
            }
            Request::Release { session } => {
                enc.variant_begin("Release")?;
                enc.map_begin()?;
                enc.entry("session", |e| e.u64(session.0))?;
                enc.map_end()?;
                enc.variant_end()?;
            }
            Request::Dereference { session, handles } => {
                enc.variant_begin("Dereference")?;
                enc.map_begin()?;
                enc.entry("session", |e| e.u64(session.0))?;
                enc.variant_begin("handles")?;
                enc.list_begin()?;
                for handle in handles {
                    enc.list_begin()?;
                    enc.u64(handle.id.0)?;
                    enc.u64(handle.count)?;
                    enc.list_end()?;
                }
                enc.list_end()?;
                enc.variant_end()?;
                enc.map_end()?;
                enc.variant_end()?;
            }
        }
        Ok(())
    }

    pub fn decode(dec: &mut Decoder) -> Result<Self> {
        let (kind, mut body) = dec.variant()?;
        let mut map = body.map()?;
        let mut session = None;
        let mut commands = None;
        let mut handles = None;

        while let Some((key, mut val)) = map.next()? {
            match key {
                "session" => session = Some(SessionId(val.u64()?)),
                "chain" => {
                    let mut iter = val.list()?;
                    let mut chain = Vec::new();
                    while let Some(mut item) = iter.next()? {
                        chain.push(decode_command(&mut item)?);
                    }
                    commands = Some(chain);
                }
                "handles" => {
                    let mut iter = val.list()?;
                    let mut list = Vec::new();
                    while let Some(mut item) = iter.next()? {
                        let mut pair = item.list()?;
                        let (Some(mut id), Some(mut count)) = (pair.next()?, pair.next()?) else {
                            return Err(Error::ProtocolViolation("Dereference entry needs id and count".into()));
                        };
                        list.push(Dereference { id: HandleId(id.u64()?), count: count.u64()? });
                    }
                    handles = Some(list);
                }
                _ => val.skip()?,
            }
        }

        let session = session.ok_or(Error::ProtocolViolation("Missing session".into()))?;
        match kind {
            "Commit" => {
                let commands = commands.ok_or(Error::ProtocolViolation("Missing chain".into()))?;
                Ok(Request::Commit(CommandChain::new(session, commands)))
            }
            "Release" => Ok(Request::Release { session }),
            "Dereference" => Ok(Request::Dereference { session, handles: handles.unwrap_or_default() }),
            _ => Err(Error::UnknownVariant(format!("Top-level frame: {}", kind))),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        self.encode(&mut enc)?;
        Ok(enc.into_bytes()?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let request = Self::decode(&mut dec)?;
        dec.finish()?;
        Ok(request)
    }
}

/// Server to client message.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// The final value of a chain, or an `exception` descriptor.
    Result(Meta),
    Ack,
}

impl Reply {
    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        match self {
            Reply::Result(meta) => {
                enc.variant_begin("Result")?;
                encode_meta(enc, meta)?;
                enc.variant_end()?;
            }
            Reply::Ack => {
                enc.variant_begin("Ack")?;
                enc.undefined()?;
                enc.variant_end()?;
            }
        }
        Ok(())
    }

    pub fn decode(dec: &mut Decoder) -> Result<Self> {
        let (kind, mut body) = dec.variant()?;
        match kind {
            "Result" => Ok(Reply::Result(decode_meta(&mut body)?)),
            "Ack" => {
                body.undefined()?;
                Ok(Reply::Ack)
            }
            _ => Err(Error::UnknownVariant(format!("Top-level frame: {}", kind))),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        self.encode(&mut enc)?;
        Ok(enc.into_bytes()?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let reply = Self::decode(&mut dec)?;
        dec.finish()?;
        Ok(reply)
    }
}
