//! # Materializer
//!
//! Turns a reply descriptor into a [`Remote`], reusing live shells so that a
//! handle the session already holds comes back as the very same object.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use metarpc::Meta;
use metarpc::ObjectMeta;

use crate::client::SessionInner;
use crate::client::error::Error;
use crate::client::error::Result;
use crate::client::remote::Remote;
use crate::client::remote::RemoteError;
use crate::client::remote::RemoteException;
use crate::client::remote::RemoteObject;
use crate::client::remote::RemotePromise;
use crate::client::remote::Shell;

pub(crate) fn materialize(session: &Arc<SessionInner>, meta: Meta) -> Result<Remote> {
    match meta {
        Meta::Value(plain) => Ok(Remote::Value(plain)),
        Meta::Array(items) => items
            .into_iter()
            .map(|item| materialize(session, item))
            .collect::<Result<Vec<_>>>()
            .map(Remote::Array),
        Meta::Buffer(bytes) => Ok(Remote::Buffer(bytes)),
        Meta::Date(ms) => Ok(Remote::Date(ms)),
        Meta::Object(object) => Ok(Remote::Object(shell(session, object, false))),
        Meta::Function(object) => Ok(Remote::Function(shell(session, object, true))),
        Meta::Promise { then } => match materialize(session, *then)? {
            Remote::Function(then) => Ok(Remote::Promise(RemotePromise { then })),
            _ => Err(Error::UnexpectedReply("promise without a callable then")),
        },
        Meta::Error { members } => members
            .into_iter()
            .map(|(name, value)| Ok((name, materialize(session, value)?)))
            .collect::<Result<Vec<_>>>()
            .map(|members| Remote::Error(RemoteError { members })),
        Meta::Exception(exception) => {
            let cause = match exception.cause {
                Some(cause) => Some(Box::new(materialize(session, *cause)?)),
                None => None,
            };
            Err(Error::Remote(RemoteException {
                name: exception.name,
                message: exception.message,
                stack: exception.stack,
                code: exception.code,
                cause,
            }))
        }
    }
}

/// Returns the live shell for `object.id`, creating it if none is alive.
fn shell(session: &Arc<SessionInner>, object: ObjectMeta, function: bool) -> RemoteObject {
    let mut slot = session.cache.entry(object.id).or_insert_with(Weak::new);
    if let Some(existing) = slot.upgrade() {
        existing.received.fetch_add(1, Ordering::AcqRel);
        return RemoteObject { inner: existing };
    }
    let inner = Arc::new(Shell {
        session: session.clone(),
        id: object.id,
        function,
        class: object.name,
        members: object.members,
        proto: object.proto,
        received: AtomicU64::new(1),
    });
    *slot = Arc::downgrade(&inner);
    RemoteObject { inner }
}
