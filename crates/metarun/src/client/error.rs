use metarpc::HandleId;
use metarpc::SessionId;

use crate::client::remote::RemoteException;
use crate::transport;

#[derive(Debug, Clone)]
pub enum Error {
    /// The bytes did not make it to the server and back.
    Transport(transport::Error),
    /// A frame could not be encoded or decoded.
    Rpc(metarpc::Error),
    /// The server evaluated the chain and it failed.
    Remote(RemoteException),
    /// An argument has no wire representation.
    UnsupportedValue(String),
    /// A shell from another session was passed as an argument.
    ForeignHandle { id: HandleId, session: SessionId },
    /// The member is known to refuse assignment.
    NotWritable { id: HandleId, name: String },
    /// The server answered with a reply of the wrong kind.
    UnexpectedReply(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::Rpc(e) => write!(f, "Protocol error: {}", e),
            Error::Remote(e) => write!(f, "{}: {}", e.name, e.message),
            Error::UnsupportedValue(msg) => write!(f, "Unsupported value: {}", msg),
            Error::ForeignHandle { id, session } => {
                write!(f, "Remote object {} belongs to {}, not to this session", id, session)
            }
            Error::NotWritable { id, name } => {
                write!(f, "Cannot assign to read only property '{}' of remote object {}", name, id)
            }
            Error::UnexpectedReply(kind) => write!(f, "Unexpected reply: {}", kind),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Error::Transport(e)
    }
}

impl From<metarpc::Error> for Error {
    fn from(e: metarpc::Error) -> Self {
        Error::Rpc(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
