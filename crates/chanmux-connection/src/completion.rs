//! One-shot completion results for asynchronous operations.
//!
//! An actor finishing an operation holds a [`Completion`]; the caller awaits
//! the matching [`PendingOperation`]. Completing consumes the completion, so a
//! result can be delivered at most once.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;

use crate::error::{MuxError, Result};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Accept,
    Read,
    Write,
    CloseSend,
    KeepAlive,
    Close,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Read => "read",
            Self::Write => "write",
            Self::CloseSend => "close-send",
            Self::KeepAlive => "keep-alive",
            Self::Close => "close",
        }
    }
}

/// Identifies which connection and which kind of operation a result is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationToken {
    pub owner: ConnectionId,
    pub kind: OperationKind,
}

impl OperationToken {
    pub fn new(owner: ConnectionId, kind: OperationKind) -> Self {
        Self { owner, kind }
    }
}

impl fmt::Display for OperationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.kind.as_str(), self.owner)
    }
}

type Delivery<T> = (OperationToken, Result<T>);

/// Create a linked completion/waiter pair for one operation.
pub fn completion<T>(token: OperationToken) -> (Completion<T>, PendingOperation<T>) {
    let (tx, rx) = oneshot::channel();
    (Completion { token, tx }, PendingOperation { rx })
}

/// Producer side: delivers exactly one result.
pub struct Completion<T> {
    token: OperationToken,
    tx: oneshot::Sender<Delivery<T>>,
}

impl<T> Completion<T> {
    pub fn token(&self) -> OperationToken {
        self.token
    }

    /// True once the waiter has gone away; any result would be discarded.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }

    /// Deliver the result, discarding it if nobody is waiting.
    pub fn complete(self, result: Result<T>) {
        let _ = self.try_complete(result);
    }

    /// Deliver the result, handing it back if nobody is waiting.
    pub fn try_complete(self, result: Result<T>) -> std::result::Result<(), Result<T>> {
        self.tx
            .send((self.token, result))
            .map_err(|(_, result)| result)
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Waiter side of an operation.
#[must_use = "an operation's result is only observed by waiting on it"]
pub struct PendingOperation<T> {
    rx: oneshot::Receiver<Delivery<T>>,
}

impl<T> PendingOperation<T> {
    /// Wait for the result of an operation of `kind` issued on `owner`.
    ///
    /// A result tagged for any other operation is a programming error and
    /// fails with [`MuxError::OperationMismatch`]. A completion dropped
    /// without a result means its actor stopped: [`MuxError::ConnectionClosed`].
    pub async fn wait(self, owner: ConnectionId, kind: OperationKind) -> Result<T> {
        let expected = OperationToken::new(owner, kind);
        match self.rx.await {
            Ok((actual, _)) if actual != expected => {
                Err(MuxError::OperationMismatch { expected, actual })
            }
            Ok((_, result)) => result,
            Err(_) => Err(MuxError::ConnectionClosed),
        }
    }
}

impl<T> fmt::Debug for PendingOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation").finish_non_exhaustive()
    }
}
