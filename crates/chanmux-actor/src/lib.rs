//! Single-consumer mailbox actors.
//!
//! An [`Actor`] owns its state and an unbounded FIFO mailbox. Its handler
//! runs for one message at a time on the tokio worker pool, so the state
//! needs no locks. Handlers are synchronous: anything that waits (socket I/O)
//! is spawned separately and reports back by posting a message.
//!
//! [`ActorManager`] tracks the live actors and offers a join-all for
//! graceful shutdown.

pub mod actor;
pub mod addr;
pub mod error;
pub mod manager;

pub use actor::{Actor, Continuation};
pub use addr::{ActorId, Addr};
pub use error::SendError;
pub use manager::ActorManager;
