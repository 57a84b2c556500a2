/// What an actor wants after handling a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Stay registered and wait for the next message.
    BlockOnReceive,
    /// Stop: the mailbox is closed and the actor deregistered.
    Done,
}

/// A unit of exclusive, message-driven execution.
///
/// The mailbox is typed by [`Actor::Message`], so every message an actor can
/// receive is one it handles.
pub trait Actor: Send + 'static {
    type Message: Send + 'static;

    /// Name used in tracing spans and error messages.
    const NAME: &'static str;

    /// Runs once before the first message is handled.
    fn started(&mut self) -> Continuation {
        Continuation::BlockOnReceive
    }

    /// Handle one message.
    fn handle(&mut self, message: Self::Message) -> Continuation;
}
