use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, debug_span, Instrument};

use crate::actor::{Actor, Continuation};
use crate::addr::{ActorId, Addr};

/// Tracks live actors and schedules them on the tokio runtime.
#[derive(Clone)]
pub struct ActorManager {
    inner: Arc<Inner>,
}

struct Inner {
    live: watch::Sender<usize>,
    next_id: AtomicU64,
}

impl Default for ActorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorManager {
    pub fn new() -> Self {
        let (live, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                live,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register and start an actor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<A: Actor>(&self, actor: A) -> Addr<A::Message> {
        self.spawn_with(|_| actor)
    }

    /// Register and start an actor that needs its own address (for example to
    /// post completions of work it spawns back to itself).
    pub fn spawn_with<A, F>(&self, build: F) -> Addr<A::Message>
    where
        A: Actor,
        F: FnOnce(Addr<A::Message>) -> A,
    {
        let id = ActorId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        let addr = Addr::new(tx, id, A::NAME);
        let actor = build(addr.clone());

        self.inner.live.send_modify(|live| *live += 1);
        let registration = Registration {
            manager: self.clone(),
        };

        let span = debug_span!("actor", name = A::NAME, %id);
        tokio::spawn(run(actor, rx, registration).instrument(span));
        addr
    }

    /// Number of registered actors.
    pub fn live(&self) -> usize {
        *self.inner.live.borrow()
    }

    /// Wait until every registered actor has completed.
    pub async fn wait_for_actors(&self) {
        let mut live = self.inner.live.subscribe();
        // The sender lives in `self.inner`, so this cannot observe a closed channel.
        let _ = live.wait_for(|live| *live == 0).await;
    }
}

impl std::fmt::Debug for ActorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorManager")
            .field("live", &self.live())
            .finish()
    }
}

/// Deregisters the actor when its task ends, including by panic.
struct Registration {
    manager: ActorManager,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.manager
            .inner
            .live
            .send_modify(|live| *live = live.saturating_sub(1));
    }
}

async fn run<A: Actor>(
    mut actor: A,
    mut mailbox: mpsc::UnboundedReceiver<A::Message>,
    registration: Registration,
) {
    debug!("actor started");
    if actor.started() == Continuation::BlockOnReceive {
        while let Some(message) = mailbox.recv().await {
            if actor.handle(message) == Continuation::Done {
                break;
            }
        }
    }
    // Close before deregistering so senders observe completion first.
    drop(mailbox);
    drop(actor);
    debug!("actor completed");
    drop(registration);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    enum CounterMessage {
        Add(u32),
        Get(oneshot::Sender<Vec<u32>>),
        Stop,
    }

    struct Counter {
        seen: Vec<u32>,
    }

    impl Actor for Counter {
        type Message = CounterMessage;

        const NAME: &'static str = "counter";

        fn handle(&mut self, message: CounterMessage) -> Continuation {
            match message {
                CounterMessage::Add(n) => self.seen.push(n),
                CounterMessage::Get(reply) => {
                    let _ = reply.send(self.seen.clone());
                }
                CounterMessage::Stop => return Continuation::Done,
            }
            Continuation::BlockOnReceive
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn messages_are_handled_in_fifo_order() {
        let manager = ActorManager::new();
        let addr = manager.spawn(Counter { seen: Vec::new() });

        for n in 0..1000 {
            addr.send(CounterMessage::Add(n)).unwrap();
        }
        let (tx, rx) = oneshot::channel();
        addr.send(CounterMessage::Get(tx)).unwrap();

        let seen = rx.await.unwrap();
        assert_eq!(seen, (0..1000).collect::<Vec<_>>());
        assert_eq!(addr.name(), "counter");
    }

    #[tokio::test]
    async fn done_deregisters_and_rejects_further_messages() {
        let manager = ActorManager::new();
        let addr = manager.spawn(Counter { seen: Vec::new() });
        assert_eq!(manager.live(), 1);

        addr.send(CounterMessage::Stop).unwrap();
        tokio::time::timeout(Duration::from_secs(5), manager.wait_for_actors())
            .await
            .expect("actor should complete");

        assert_eq!(manager.live(), 0);
        assert!(addr.is_closed());
        let err = addr.send(CounterMessage::Add(1)).unwrap_err();
        assert_eq!(err.actor, "counter");
        assert!(matches!(err.into_message(), CounterMessage::Add(1)));
    }

    #[tokio::test]
    async fn wait_for_actors_joins_all() {
        let manager = ActorManager::new();
        let addrs: Vec<_> = (0..8)
            .map(|_| manager.spawn(Counter { seen: Vec::new() }))
            .collect();
        assert_eq!(manager.live(), 8);

        for addr in &addrs {
            addr.send(CounterMessage::Stop).unwrap();
        }
        tokio::time::timeout(Duration::from_secs(5), manager.wait_for_actors())
            .await
            .expect("all actors should complete");
        assert!(addrs.iter().all(Addr::is_closed));
    }

    #[tokio::test]
    async fn wait_for_actors_returns_immediately_when_empty() {
        let manager = ActorManager::new();
        tokio::time::timeout(Duration::from_millis(100), manager.wait_for_actors())
            .await
            .expect("no actors to wait for");
    }

    struct Starter {
        report: Option<oneshot::Sender<&'static str>>,
        continuation: Continuation,
    }

    impl Actor for Starter {
        type Message = ();

        const NAME: &'static str = "starter";

        fn started(&mut self) -> Continuation {
            if let Some(report) = self.report.take() {
                let _ = report.send("started");
            }
            self.continuation
        }

        fn handle(&mut self, _message: ()) -> Continuation {
            Continuation::BlockOnReceive
        }
    }

    #[tokio::test]
    async fn started_runs_first_and_may_finish_the_actor() {
        let manager = ActorManager::new();
        let (tx, rx) = oneshot::channel();
        let addr = manager.spawn(Starter {
            report: Some(tx),
            continuation: Continuation::Done,
        });

        assert_eq!(rx.await.unwrap(), "started");
        tokio::time::timeout(Duration::from_secs(5), manager.wait_for_actors())
            .await
            .expect("actor should complete from started");
        assert!(addr.send(()).is_err());
    }

    #[tokio::test]
    async fn actor_completes_when_every_address_is_dropped() {
        let manager = ActorManager::new();
        let (tx, rx) = oneshot::channel();
        let addr = manager.spawn(Starter {
            report: Some(tx),
            continuation: Continuation::BlockOnReceive,
        });
        rx.await.unwrap();

        drop(addr);
        tokio::time::timeout(Duration::from_secs(5), manager.wait_for_actors())
            .await
            .expect("orphaned actor should complete");
    }

    enum PingMessage {
        Ping(u32),
    }

    struct SelfPinger {
        me: Addr<PingMessage>,
        done: Option<oneshot::Sender<u32>>,
    }

    impl Actor for SelfPinger {
        type Message = PingMessage;

        const NAME: &'static str = "self-pinger";

        fn started(&mut self) -> Continuation {
            let _ = self.me.send(PingMessage::Ping(0));
            Continuation::BlockOnReceive
        }

        fn handle(&mut self, message: PingMessage) -> Continuation {
            let PingMessage::Ping(n) = message;
            if n == 10 {
                if let Some(done) = self.done.take() {
                    let _ = done.send(n);
                }
                return Continuation::Done;
            }
            let me = self.me.clone();
            tokio::spawn(async move {
                let _ = me.send(PingMessage::Ping(n + 1));
            });
            Continuation::BlockOnReceive
        }
    }

    #[tokio::test]
    async fn spawn_with_hands_the_actor_its_own_address() {
        let manager = ActorManager::new();
        let (tx, rx) = oneshot::channel();
        manager.spawn_with(|me| SelfPinger { me, done: Some(tx) });

        assert_eq!(rx.await.unwrap(), 10);
        tokio::time::timeout(Duration::from_secs(5), manager.wait_for_actors())
            .await
            .expect("self-pinger should complete");
    }
}
