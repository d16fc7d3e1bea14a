//! Multicast event buses.
//!
//! A [`Bus`] fans each published event out to every current subscriber.
//! Every subscription owns a FIFO mailbox; a small pool of delivery threads
//! drains the mailboxes, so the publisher never waits on a subscriber and a
//! slow subscriber only delays itself. Events reach one subscriber in the
//! order they were published.
//!
//! A subscriber that returns an error or panics while handling an event
//! stays attached: the failure is logged, its restart counter is bumped and
//! the next event is delivered as usual.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::error::BusError;
use crate::sync::{lock, read, wait_timeout, write};

/// Delivery threads per bus unless configured otherwise.
pub const DEFAULT_DELIVERY_THREADS: usize = 4;

/// How long `complete` waits for queued deliveries.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type subscribers may return.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Receives events from a [`Bus`].
pub trait Subscriber<T>: Send + Sync + 'static {
    fn on_event(&self, event: &T) -> Result<(), SubscriberError>;

    /// Called once when the bus completes.
    fn on_complete(&self) {}
}

impl<T, S> Subscriber<T> for Arc<S>
where
    S: Subscriber<T> + ?Sized,
{
    fn on_event(&self, event: &T) -> Result<(), SubscriberError> {
        (**self).on_event(event)
    }

    fn on_complete(&self) {
        (**self).on_complete()
    }
}

struct FnSubscriber<F>(F);

impl<T, F> Subscriber<T> for FnSubscriber<F>
where
    F: Fn(&T) -> Result<(), SubscriberError> + Send + Sync + 'static,
{
    fn on_event(&self, event: &T) -> Result<(), SubscriberError> {
        (self.0)(event)
    }
}

struct Mailbox<T> {
    queue: VecDeque<Arc<T>>,
    /// A delivery thread owns this mailbox until it finds it empty.
    scheduled: bool,
}

struct Slot<T> {
    id: u64,
    name: String,
    subscriber: Box<dyn Subscriber<T>>,
    mailbox: Mutex<Mailbox<T>>,
    active: AtomicBool,
    delivered: AtomicU64,
    restarts: AtomicU64,
}

impl<T: 'static> Slot<T> {
    fn deliver(&self, bus: &str, event: &T) {
        let fault = match catch_unwind(AssertUnwindSafe(|| self.subscriber.on_event(event))) {
            Ok(Ok(())) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Ok(Err(err)) => err.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };
        let restarts = self.restarts.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            bus,
            subscriber = %self.name,
            restarts,
            error = %fault,
            "subscriber failed, re-attached"
        );
    }
}

struct Shared<T> {
    name: String,
    slots: RwLock<Vec<Arc<Slot<T>>>>,
    next_id: AtomicU64,
    completed: AtomicBool,
    pending: Mutex<usize>,
    drained: Condvar,
}

impl<T: 'static> Shared<T> {
    fn add_pending(&self, count: usize) {
        *lock(&self.pending) += count;
    }

    fn settle(&self, count: usize) {
        let mut pending = lock(&self.pending);
        *pending = pending.saturating_sub(count);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    fn await_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = lock(&self.pending);
        while *pending > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            pending = wait_timeout(&self.drained, pending, deadline - now);
        }
        true
    }

    /// Deliver everything queued for `slot`, then release it.
    fn drain(&self, slot: &Slot<T>) {
        loop {
            let event = {
                let mut mailbox = lock(&slot.mailbox);
                match mailbox.queue.pop_front() {
                    Some(event) => event,
                    None => {
                        mailbox.scheduled = false;
                        return;
                    }
                }
            };
            if slot.active.load(Ordering::Acquire) {
                slot.deliver(&self.name, &event);
            }
            self.settle(1);
        }
    }
}

/// A multicast event bus.
pub struct Bus<T> {
    shared: Arc<Shared<T>>,
    jobs: Mutex<Option<Sender<Arc<Slot<T>>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + Sync + 'static> Bus<T> {
    pub fn new(name: impl Into<String>) -> Result<Self, BusError> {
        Self::with_threads(name, DEFAULT_DELIVERY_THREADS)
    }

    /// A bus drained by `threads` delivery threads (at least one).
    pub fn with_threads(name: impl Into<String>, threads: usize) -> Result<Self, BusError> {
        let name = name.into();
        let shared = Arc::new(Shared {
            name: name.clone(),
            slots: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            completed: AtomicBool::new(false),
            pending: Mutex::new(0),
            drained: Condvar::new(),
        });
        let (jobs, queue) = channel::unbounded::<Arc<Slot<T>>>();

        let mut workers = Vec::with_capacity(threads.max(1));
        for index in 0..threads.max(1) {
            let shared = Arc::clone(&shared);
            let queue: Receiver<Arc<Slot<T>>> = queue.clone();
            let worker = thread::Builder::new()
                .name(format!("{name}-bus-{index}"))
                .spawn(move || {
                    for slot in queue.iter() {
                        shared.drain(&slot);
                    }
                })
                .map_err(|source| BusError::Spawn {
                    bus: name.clone(),
                    source,
                })?;
            workers.push(worker);
        }
        debug!(bus = %name, threads = workers.len(), "bus started");

        Ok(Self {
            shared,
            jobs: Mutex::new(Some(jobs)),
            workers: Mutex::new(workers),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn subscribe<S>(&self, name: impl Into<String>, subscriber: S) -> Result<Subscription<T>, BusError>
    where
        S: Subscriber<T>,
    {
        if self.is_completed() {
            return Err(BusError::Completed(self.shared.name.clone()));
        }
        let slot = Arc::new(Slot {
            id: self.shared.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            subscriber: Box::new(subscriber),
            mailbox: Mutex::new(Mailbox {
                queue: VecDeque::new(),
                scheduled: false,
            }),
            active: AtomicBool::new(true),
            delivered: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
        });
        write(&self.shared.slots).push(Arc::clone(&slot));
        debug!(bus = %self.shared.name, subscriber = %slot.name, "subscribed");
        Ok(Subscription {
            bus: Arc::downgrade(&self.shared),
            slot,
        })
    }

    /// Subscribe a closure.
    pub fn subscribe_fn<F>(&self, name: impl Into<String>, handler: F) -> Result<Subscription<T>, BusError>
    where
        F: Fn(&T) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribe(name, FnSubscriber(handler))
    }

    /// Queue `event` for every current subscriber.
    ///
    /// Returns the number of subscribers it was queued for. Events published
    /// after [`Bus::complete`] are dropped.
    pub fn publish(&self, event: T) -> usize {
        if self.is_completed() {
            trace!(bus = %self.shared.name, "publish after completion ignored");
            return 0;
        }
        let slots: Vec<Arc<Slot<T>>> = read(&self.shared.slots).clone();
        if slots.is_empty() {
            return 0;
        }
        let Some(jobs) = lock(&self.jobs).clone() else {
            return 0;
        };

        let event = Arc::new(event);
        for slot in &slots {
            self.shared.add_pending(1);
            let schedule = {
                let mut mailbox = lock(&slot.mailbox);
                mailbox.queue.push_back(Arc::clone(&event));
                !std::mem::replace(&mut mailbox.scheduled, true)
            };
            if schedule && jobs.send(Arc::clone(slot)).is_err() {
                // Pool already stopped; nobody will drain this mailbox.
                let dropped = {
                    let mut mailbox = lock(&slot.mailbox);
                    mailbox.scheduled = false;
                    std::mem::take(&mut mailbox.queue).len()
                };
                self.shared.settle(dropped);
            }
        }
        slots.len()
    }

    pub fn subscriber_count(&self) -> usize {
        read(&self.shared.slots).len()
    }

    pub fn is_completed(&self) -> bool {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Drain queued deliveries, signal completion to every subscriber and
    /// stop the delivery threads. Idempotent.
    pub fn complete(&self) {
        if self.shared.completed.swap(true, Ordering::AcqRel) {
            return;
        }
        if !self.shared.await_drained(DRAIN_TIMEOUT) {
            warn!(bus = %self.shared.name, "deliveries still pending at completion");
        }

        let slots = std::mem::take(&mut *write(&self.shared.slots));
        for slot in &slots {
            slot.active.store(false, Ordering::Release);
            let completed = catch_unwind(AssertUnwindSafe(|| slot.subscriber.on_complete()));
            if completed.is_err() {
                warn!(bus = %self.shared.name, subscriber = %slot.name, "on_complete panicked");
            }
        }

        drop(lock(&self.jobs).take());
        let current = thread::current().id();
        for worker in lock(&self.workers).drain(..) {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                warn!(bus = %self.shared.name, "delivery thread panicked");
            }
        }
        debug!(bus = %self.shared.name, subscribers = slots.len(), "bus completed");
    }
}

impl<T> Drop for Bus<T> {
    fn drop(&mut self) {
        // Workers exit once the job channel closes.
        lock(&self.jobs).take();
    }
}

impl<T> fmt::Debug for Bus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("name", &self.shared.name)
            .field("subscribers", &read(&self.shared.slots).len())
            .field("completed", &self.shared.completed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Handle to one subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription<T> {
    bus: Weak<Shared<T>>,
    slot: Arc<Slot<T>>,
}

impl<T> Subscription<T> {
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// Events handled without error.
    pub fn delivered(&self) -> u64 {
        self.slot.delivered.load(Ordering::Relaxed)
    }

    /// Times the subscriber failed and was re-attached.
    pub fn restarts(&self) -> u64 {
        self.slot.restarts.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.slot.active.load(Ordering::Acquire)
    }

    /// Stop receiving events. Safe to call repeatedly and after the bus has
    /// completed or been dropped.
    pub fn unsubscribe(&self) {
        if !self.slot.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.bus.upgrade() {
            write(&shared.slots).retain(|slot| slot.id != self.slot.id);
            debug!(bus = %shared.name, subscriber = %self.slot.name, "unsubscribed");
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.slot.name)
            .field("active", &self.is_active())
            .field("delivered", &self.delivered())
            .field("restarts", &self.restarts())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u32>>,
        fail_on: Option<u32>,
        panic_on: Option<u32>,
        completions: AtomicUsize,
    }

    impl Recorder {
        fn seen(&self) -> Vec<u32> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Subscriber<u32> for Recorder {
        fn on_event(&self, event: &u32) -> Result<(), SubscriberError> {
            if self.fail_on == Some(*event) {
                return Err(format!("rejecting {event}").into());
            }
            if self.panic_on == Some(*event) {
                panic!("exploding on {event}");
            }
            self.seen.lock().unwrap().push(*event);
            Ok(())
        }

        fn on_complete(&self) {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn failing_subscriber_is_isolated_and_reattached() {
        let bus = Bus::new("isolation").unwrap();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder {
            fail_on: Some(4),
            panic_on: Some(7),
            ..Recorder::default()
        });
        let third = Arc::new(Recorder::default());

        let _a = bus.subscribe("first", Arc::clone(&first)).unwrap();
        let b = bus.subscribe("second", Arc::clone(&second)).unwrap();
        let _c = bus.subscribe("third", Arc::clone(&third)).unwrap();

        for event in 0..10 {
            assert_eq!(bus.publish(event), 3);
        }
        bus.complete();

        let all: Vec<u32> = (0..10).collect();
        assert_eq!(first.seen(), all);
        assert_eq!(third.seen(), all);
        assert_eq!(second.seen(), vec![0, 1, 2, 3, 5, 6, 8, 9]);
        assert_eq!(b.restarts(), 2);
        assert_eq!(b.delivered(), 8);
    }

    #[test]
    fn slow_subscriber_does_not_block_others() {
        let bus = Bus::new("slow").unwrap();
        let slow_seen = Arc::new(AtomicUsize::new(0));
        let fast = Arc::new(Recorder::default());

        let counter = Arc::clone(&slow_seen);
        let _slow = bus
            .subscribe_fn("slow", move |_: &u32| {
                thread::sleep(Duration::from_millis(100));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        let _fast = bus.subscribe("fast", Arc::clone(&fast)).unwrap();

        let started = Instant::now();
        for event in 0..5 {
            bus.publish(event);
        }
        assert!(started.elapsed() < Duration::from_millis(100));

        assert!(wait_until(Duration::from_millis(300), || fast.seen().len() == 5));
        assert!(slow_seen.load(Ordering::SeqCst) < 5);

        bus.complete();
        assert_eq!(slow_seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn complete_notifies_once_and_ignores_later_publishes() {
        let bus = Bus::with_threads("complete", 1).unwrap();
        let recorder = Arc::new(Recorder::default());
        let subscription = bus.subscribe("recorder", Arc::clone(&recorder)).unwrap();

        bus.publish(1);
        bus.complete();
        bus.complete();

        assert_eq!(recorder.completions.load(Ordering::SeqCst), 1);
        assert_eq!(bus.publish(2), 0);
        assert_eq!(recorder.seen(), vec![1]);
        assert!(!subscription.is_active());
        assert!(matches!(
            bus.subscribe("late", Arc::new(Recorder::default())),
            Err(BusError::Completed(_))
        ));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = Bus::new("unsubscribe").unwrap();
        let recorder = Arc::new(Recorder::default());
        let subscription = bus.subscribe("recorder", Arc::clone(&recorder)).unwrap();
        assert_eq!(bus.subscriber_count(), 1);

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(1), 0);

        bus.complete();
        subscription.unsubscribe();
        assert_eq!(recorder.completions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_after_bus_dropped() {
        let bus = Bus::<u32>::new("dropped").unwrap();
        let subscription = bus.subscribe_fn("noop", |_: &u32| Ok(())).unwrap();
        drop(bus);
        subscription.unsubscribe();
        assert!(!subscription.is_active());
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = Bus::<u32>::new("raii").unwrap();
        {
            let _subscription = bus.subscribe_fn("scoped", |_: &u32| Ok(())).unwrap();
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
        bus.complete();
    }

    #[test]
    fn per_subscriber_order_is_preserved() {
        let bus = Bus::with_threads("order", 4).unwrap();
        let recorders: Vec<Arc<Recorder>> = (0..6).map(|_| Arc::new(Recorder::default())).collect();
        let _subscriptions: Vec<_> = recorders
            .iter()
            .enumerate()
            .map(|(i, r)| bus.subscribe(format!("r{i}"), Arc::clone(r)).unwrap())
            .collect();

        for event in 0..200 {
            bus.publish(event);
        }
        bus.complete();

        let expected: Vec<u32> = (0..200).collect();
        for recorder in &recorders {
            assert_eq!(recorder.seen(), expected);
        }
    }
}
