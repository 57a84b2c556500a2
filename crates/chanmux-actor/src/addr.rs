use std::fmt;

use tokio::sync::mpsc::UnboundedSender;

use crate::error::SendError;

/// Identifier assigned by the [`ActorManager`](crate::ActorManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.0)
    }
}

/// Handle to an actor's mailbox.
pub struct Addr<M> {
    tx: UnboundedSender<M>,
    id: ActorId,
    name: &'static str,
}

impl<M> Addr<M> {
    pub(crate) fn new(tx: UnboundedSender<M>, id: ActorId, name: &'static str) -> Self {
        Self { tx, id, name }
    }

    /// Enqueue a message, handing its ownership to the actor.
    ///
    /// Fails if the actor has returned [`Continuation::Done`](crate::Continuation::Done).
    pub fn send(&self, message: M) -> Result<(), SendError<M>> {
        self.tx.send(message).map_err(|err| SendError {
            actor: self.name,
            message: err.0,
        })
    }

    /// True once the actor has completed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<M> Clone for Addr<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            id: self.id,
            name: self.name,
        }
    }
}

impl<M> fmt::Debug for Addr<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Addr")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
