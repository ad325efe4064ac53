//! Single-threaded actor runtime.
//!
//! Each tracker runs as an actor: an owned state machine consuming an
//! ordered mailbox on a dedicated thread. Handlers never run
//! concurrently, events are processed strictly in arrival order, and
//! delayed (timer) events are inserted at their scheduled wake time. At
//! most one timer per key may be outstanding; scheduling a key replaces
//! any queued timer with the same key.
//!
//! Synchronous callers use [`ActorRef::call`], which blocks on a condition
//! variable until the actor fulfills the responder. A runtime check
//! refuses the call from the actor's own thread, which would deadlock.

use std::collections::BinaryHeap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};


/// Identifies a timer purpose within one actor. One outstanding timer per
/// key.
pub type TimerKey = &'static str;

/// An actor's state machine.
pub trait Actor: Send + 'static {
    /// Mailbox event type.
    type Event: Send + 'static;

    /// Handles one event. Runs on the actor thread only.
    fn on_event(&mut self, event: Self::Event);
}

/// Timer scheduling surface handed to actor state machines.
///
/// Both the live [`ActorRef`] and test doubles implement this, so tracker
/// logic can be driven synchronously in tests.
pub trait Timers<E>: Send {
    /// Schedules `event` to be delivered after `delay`, replacing any
    /// queued timer with the same key.
    fn schedule(&mut self, key: TimerKey, delay: Duration, event: E);

    /// Drops any queued timer with this key.
    fn cancel(&mut self, key: TimerKey);
}

enum Control<E> {
    Post(E),
    After {
        key: TimerKey,
        delay: Duration,
        event: E,
    },
    Cancel(TimerKey),
    Shutdown,
}

/// Posting/scheduling handle onto an actor's mailbox. Cheap to clone.
pub struct ActorRef<E> {
    tx: Sender<Control<E>>,
    actor_thread: Arc<OnceLock<ThreadId>>,
}

impl<E> Clone for ActorRef<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            actor_thread: Arc::clone(&self.actor_thread),
        }
    }
}

impl<E: Send + 'static> ActorRef<E> {
    /// Enqueues an event. Silently dropped if the actor has shut down.
    pub fn post(&self, event: E) {
        let _ = self.tx.send(Control::Post(event));
    }

    /// Posts an event carrying a [`Responder`] and blocks until the actor
    /// fulfills it.
    ///
    /// # Panics
    ///
    /// Panics when invoked from the actor's own thread (the wait could
    /// never be fulfilled).
    pub fn call<T, F>(&self, make_event: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(Responder<T>) -> E,
    {
        if self.actor_thread.get() == Some(&thread::current().id()) {
            panic!("ActorRef::call invoked from the actor's own thread");
        }
        let slot = Arc::new(ResponseSlot {
            value: Mutex::new(None),
            ready: Condvar::new(),
        });
        self.post(make_event(Responder {
            slot: Arc::clone(&slot),
        }));
        let mut guard = slot
            .value
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while guard.is_none() {
            guard = slot
                .ready
                .wait(guard)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        guard.take().expect("responder fulfilled")
    }
}

impl<E: Send + 'static> Timers<E> for ActorRef<E> {
    fn schedule(&mut self, key: TimerKey, delay: Duration, event: E) {
        let _ = self.tx.send(Control::After { key, delay, event });
    }

    fn cancel(&mut self, key: TimerKey) {
        let _ = self.tx.send(Control::Cancel(key));
    }
}

struct ResponseSlot<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

/// One-shot completion handle for a blocking [`ActorRef::call`].
pub struct Responder<T> {
    slot: Arc<ResponseSlot<T>>,
}

impl<T> Responder<T> {
    /// Delivers the result and wakes the waiting caller.
    pub fn fulfill(self, value: T) {
        let mut guard = self
            .slot
            .value
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(value);
        self.slot.ready.notify_one();
    }
}

impl<T> std::fmt::Debug for Responder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder").finish_non_exhaustive()
    }
}

/// Running actor: join handle plus its mailbox reference.
pub struct ActorHandle<E> {
    actor_ref: ActorRef<E>,
    join: Option<JoinHandle<()>>,
}

impl<E: Send + 'static> ActorHandle<E> {
    #[must_use]
    pub fn actor_ref(&self) -> ActorRef<E> {
        self.actor_ref.clone()
    }

    /// Requests shutdown and joins the actor thread. Queued events ahead
    /// of the shutdown marker are still processed.
    pub fn shutdown(mut self) {
        let _ = self.actor_ref.tx.send(Control::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

struct TimerEntry<E> {
    deadline: Instant,
    seq: u64,
    key: TimerKey,
    event: E,
}

impl<E> PartialEq for TimerEntry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl<E> Eq for TimerEntry<E> {}
impl<E> PartialOrd for TimerEntry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<E> Ord for TimerEntry<E> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Min-heap by (deadline, seq) through reversal.
        (other.deadline, other.seq).cmp(&(self.deadline, self.seq))
    }
}

/// Spawns an actor on its own thread.
///
/// The state machine is constructed by `build`, which receives the
/// mailbox reference so the state can post and schedule to itself.
pub fn spawn<A, F>(name: &str, build: F) -> ActorHandle<A::Event>
where
    A: Actor,
    F: FnOnce(ActorRef<A::Event>) -> A,
{
    let (tx, rx) = mpsc::channel();
    let actor_thread = Arc::new(OnceLock::new());
    let actor_ref = ActorRef {
        tx,
        actor_thread: Arc::clone(&actor_thread),
    };
    let mut actor = build(actor_ref.clone());
    let join = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _ = actor_thread.set(thread::current().id());
            run_loop(&mut actor, &rx);
        })
        .expect("spawn actor thread");
    ActorHandle {
        actor_ref,
        join: Some(join),
    }
}

fn run_loop<A: Actor>(actor: &mut A, rx: &Receiver<Control<A::Event>>) {
    let mut timers: BinaryHeap<TimerEntry<A::Event>> = BinaryHeap::new();
    let mut seq: u64 = 0;
    loop {
        // Fire every due timer, in (deadline, insertion) order.
        while timers
            .peek()
            .is_some_and(|t| t.deadline <= Instant::now())
        {
            let entry = timers.pop().expect("peeked entry");
            actor.on_event(entry.event);
        }

        let received = match timers.peek() {
            Some(next) => {
                let wait = next.deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(wait) {
                    Ok(control) => Some(control),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => None,
                }
            }
            None => rx.recv().ok(),
        };

        let Some(control) = received else {
            return;
        };
        match control {
            Control::Post(event) => actor.on_event(event),
            Control::After { key, delay, event } => {
                // Replace any queued timer with the same key.
                timers.retain(|t| t.key != key);
                seq += 1;
                timers.push(TimerEntry {
                    deadline: Instant::now() + delay,
                    seq,
                    key,
                    event,
                });
            }
            Control::Cancel(key) => {
                timers.retain(|t| t.key != key);
            }
            Control::Shutdown => return,
        }
    }
}
