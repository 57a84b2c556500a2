use std::fmt;

/// A message could not be delivered because its actor has completed.
///
/// Carries the undelivered message back to the sender.
pub struct SendError<M> {
    pub actor: &'static str,
    pub message: M,
}

impl<M> SendError<M> {
    /// Recover the undelivered message.
    pub fn into_message(self) -> M {
        self.message
    }
}

impl<M> fmt::Debug for SendError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendError")
            .field("actor", &self.actor)
            .finish_non_exhaustive()
    }
}

impl<M> fmt::Display for SendError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor `{}` has already completed", self.actor)
    }
}

impl<M> std::error::Error for SendError<M> {}
