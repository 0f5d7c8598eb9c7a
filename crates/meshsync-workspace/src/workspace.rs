//! The reactive state container.
//!
//! A [`Workspace`] owns one current snapshot and notifies subscribers of
//! every distinct value in the order values were produced. Handles are cheap
//! clones of one shared store and can be moved across threads.
//!
//! Dispatch is synchronous and queued: an update issued while notifications
//! are being delivered (from an observer, or from another thread) replaces
//! the current value immediately and its notification is appended to the
//! queue drained by the dispatching caller. The queue is the single
//! serialization point ordering all writers of one workspace.

use crate::subscription::Subscription;
use futures::Stream;
use meshsync_state::{apply_patch, diff, Patch, Value};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;

type Observer = Arc<dyn Fn(&Value) + Send + Sync>;

struct Subscriber {
    id: u64,
    /// Version current when the subscriber registered; it only receives
    /// notifications for later versions.
    since: u64,
    /// Highest version delivered so far.
    seen: Arc<AtomicU64>,
    observer: Observer,
}

struct State {
    value: Value,
    version: u64,
    subscribers: Vec<Subscriber>,
    next_id: u64,
    queue: VecDeque<(u64, Value)>,
    dispatching: bool,
    disposed: bool,
    attachments: Vec<Box<dyn Any + Send>>,
}

struct Inner {
    name: String,
    state: Mutex<State>,
}

/// A reactive, shareable state container.
///
/// # Examples
///
/// ```
/// use meshsync_workspace::Workspace;
/// use serde_json::json;
/// use std::sync::{Arc, Mutex};
///
/// let workspace = Workspace::new("counter", json!({"count": 1}));
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let sink = seen.clone();
/// let _sub = workspace.subscribe(move |v| sink.lock().unwrap().push(v.clone()));
/// workspace.update(json!({"count": 2}));
///
/// assert_eq!(*seen.lock().unwrap(), vec![json!({"count": 1}), json!({"count": 2})]);
/// ```
#[derive(Clone)]
pub struct Workspace {
    inner: Arc<Inner>,
}

/// A non-owning workspace handle.
#[derive(Clone)]
pub struct WeakWorkspace {
    inner: Weak<Inner>,
}

impl WeakWorkspace {
    pub fn upgrade(&self) -> Option<Workspace> {
        self.inner.upgrade().map(|inner| Workspace { inner })
    }
}

impl Workspace {
    /// Create a live workspace holding `initial`.
    pub fn new(name: impl Into<String>, initial: Value) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State {
                    value: initial,
                    version: 1,
                    subscribers: Vec::new(),
                    next_id: 0,
                    queue: VecDeque::new(),
                    dispatching: false,
                    disposed: false,
                    attachments: Vec::new(),
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The latest value.
    pub fn current(&self) -> Value {
        self.lock().value.clone()
    }

    /// Monotonic version, bumped on every distinct value.
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// Number of attached observers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn downgrade(&self) -> WeakWorkspace {
        WeakWorkspace {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles point at the same store.
    pub fn ptr_eq(&self, other: &Workspace) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Attach an observer.
    ///
    /// The observer is called with the current value before this returns,
    /// then with every later distinct value. Disposing the returned
    /// [`Subscription`] detaches it.
    pub fn subscribe(&self, observer: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        let observer: Observer = Arc::new(observer);
        let seen = Arc::new(AtomicU64::new(0));

        let (id, since, value) = {
            let mut state = self.lock();
            if state.disposed {
                return Subscription::empty();
            }
            state.next_id += 1;
            let id = state.next_id;
            let since = state.version;
            state.subscribers.push(Subscriber {
                id,
                since,
                seen: seen.clone(),
                observer: observer.clone(),
            });
            (id, since, state.value.clone())
        };

        deliver(&seen, &observer, since, &value);

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                Workspace { inner }.unsubscribe(id);
            }
        })
    }

    /// Attach an observer receiving the patch between successive values.
    ///
    /// Nothing is delivered on subscribe; each later change arrives as the
    /// diff from the previously observed value.
    pub fn subscribe_patches(
        &self,
        observer: impl Fn(&Patch) + Send + Sync + 'static,
    ) -> Subscription {
        let previous: Mutex<Option<Value>> = Mutex::new(None);
        self.subscribe(move |value| {
            let patch = {
                let mut previous = previous.lock().unwrap_or_else(PoisonError::into_inner);
                let patch = previous.as_ref().map(|before| diff(before, value));
                *previous = Some(value.clone());
                patch
            };
            if let Some(patch) = patch.filter(|p| !p.is_empty()) {
                observer(&patch);
            }
        })
    }

    /// Stream of values: the current one first, then every change.
    ///
    /// The stream ends when the workspace is disposed; dropping it detaches
    /// the underlying observer.
    pub fn changes(&self) -> impl Stream<Item = Value> + Send + 'static {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |value| {
            let _ = tx.send(value.clone());
        });
        async_stream::stream! {
            let _subscription = subscription;
            while let Some(value) = rx.recv().await {
                yield value;
            }
        }
    }

    /// Replace the current value.
    ///
    /// Returns `false` (and notifies nobody) when `value` deep-equals the
    /// current value or the workspace is disposed.
    pub fn update(&self, value: Value) -> bool {
        self.commit_with(|_| Some(value))
    }

    /// Atomic read-modify-write against the latest value.
    ///
    /// `f` runs while the workspace is locked and must not call back into
    /// the same workspace.
    pub fn update_with(&self, f: impl FnOnce(&Value) -> Value) -> bool {
        self.commit_with(|current| Some(f(current)))
    }

    /// Like [`update_with`](Self::update_with); returning `None` leaves the
    /// workspace untouched.
    pub fn try_update_with(&self, f: impl FnOnce(&Value) -> Option<Value>) -> bool {
        self.commit_with(f)
    }

    /// Apply a patch to the latest value (leniently).
    pub fn apply_patch(&self, patch: &Patch) -> bool {
        if patch.is_empty() {
            return false;
        }
        self.update_with(|current| apply_patch(current, patch))
    }

    /// Tie a resource's lifetime to this workspace.
    ///
    /// The resource is dropped on [`dispose`](Self::dispose) or when the last
    /// handle goes away. Attaching to a disposed workspace drops it at once.
    pub fn attach<T: Send + 'static>(&self, resource: T) {
        let mut state = self.lock();
        if state.disposed {
            drop(state);
            drop(resource);
            return;
        }
        state.attachments.push(Box::new(resource));
    }

    /// Detach every observer and drop attached resources. Idempotent.
    pub fn dispose(&self) {
        let (subscribers, attachments) = {
            let mut state = self.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.queue.clear();
            (
                std::mem::take(&mut state.subscribers),
                std::mem::take(&mut state.attachments),
            )
        };
        tracing::debug!(workspace = %self.inner.name, "workspace disposed");
        drop(subscribers);
        drop(attachments);
    }

    fn unsubscribe(&self, id: u64) {
        let removed = {
            let mut state = self.lock();
            state
                .subscribers
                .iter()
                .position(|s| s.id == id)
                .map(|index| state.subscribers.remove(index))
        };
        drop(removed);
    }

    fn is_subscribed(&self, id: u64) -> bool {
        self.lock().subscribers.iter().any(|s| s.id == id)
    }

    fn commit_with(&self, f: impl FnOnce(&Value) -> Option<Value>) -> bool {
        let mut state = self.lock();
        if state.disposed {
            drop(state);
            tracing::debug!(workspace = %self.inner.name, "ignoring update on disposed workspace");
            return false;
        }
        let Some(next) = f(&state.value) else {
            return false;
        };
        if next == state.value {
            return false;
        }

        state.version += 1;
        let version = state.version;
        state.value = next.clone();
        state.queue.push_back((version, next));

        if state.dispatching {
            tracing::trace!(workspace = %self.inner.name, version, "notification queued");
            return true;
        }
        state.dispatching = true;
        drop(state);

        self.drain();
        true
    }

    fn drain(&self) {
        let _guard = DispatchGuard { workspace: self };
        loop {
            let (version, value, targets) = {
                let mut state = self.lock();
                let Some((version, value)) = state.queue.pop_front() else {
                    state.dispatching = false;
                    return;
                };
                let targets: Vec<(u64, Arc<AtomicU64>, Observer)> = state
                    .subscribers
                    .iter()
                    .filter(|s| s.since < version)
                    .map(|s| (s.id, s.seen.clone(), s.observer.clone()))
                    .collect();
                (version, value, targets)
            };

            tracing::trace!(
                workspace = %self.inner.name,
                version,
                observers = targets.len(),
                "dispatching"
            );
            for (id, seen, observer) in targets {
                if self.is_subscribed(id) {
                    deliver(&seen, &observer, version, &value);
                }
            }
        }
    }
}

fn deliver(seen: &AtomicU64, observer: &Observer, version: u64, value: &Value) {
    if seen.fetch_max(version, Ordering::AcqRel) < version {
        observer(value);
    }
}

/// Resets the dispatch flag if an observer panics mid-delivery.
struct DispatchGuard<'a> {
    workspace: &'a Workspace,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = self.workspace.lock();
            state.dispatching = false;
            state.queue.clear();
        }
    }
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Workspace")
            .field("name", &self.inner.name)
            .field("version", &state.version)
            .field("subscribers", &state.subscribers.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use meshsync_state::{path, Op};
    use serde_json::json;

    fn recorder(workspace: &Workspace) -> (Arc<Mutex<Vec<Value>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = workspace.subscribe(move |v| sink.lock().unwrap().push(v.clone()));
        (seen, sub)
    }

    #[test]
    fn subscribe_replays_then_follows_updates() {
        let workspace = Workspace::new("w", json!({"count": 1}));
        let (seen, _sub) = recorder(&workspace);

        assert!(workspace.update(json!({"count": 2})));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![json!({"count": 1}), json!({"count": 2})]
        );
        assert_eq!(workspace.current(), json!({"count": 2}));
    }

    #[test]
    fn equal_update_is_noop() {
        let workspace = Workspace::new("w", json!({"a": [1, 2]}));
        let (seen, _sub) = recorder(&workspace);
        let version = workspace.version();

        assert!(!workspace.update(json!({"a": [1, 2]})));

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(workspace.version(), version);
    }

    #[test]
    fn subscribers_notified_in_subscription_order() {
        let workspace = Workspace::new("w", json!(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let subs: Vec<_> = ["first", "second", "third"]
            .into_iter()
            .map(|label| {
                let order = order.clone();
                workspace.subscribe(move |v| {
                    if v == &json!(1) {
                        order.lock().unwrap().push(label);
                    }
                })
            })
            .collect();

        workspace.update(json!(1));

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
        drop(subs);
    }

    #[test]
    fn reentrant_update_is_queued_in_order() {
        let workspace = Workspace::new("w", json!(0));
        let handle = workspace.clone();
        let _bump = workspace.subscribe(move |v| {
            if v == &json!(1) {
                assert!(handle.update(json!(2)));
                assert_eq!(handle.current(), json!(2));
            }
        });
        let (seen, _sub) = recorder(&workspace);

        workspace.update(json!(1));

        assert_eq!(*seen.lock().unwrap(), vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn subscriber_added_mid_dispatch_sees_latest_once() {
        let workspace = Workspace::new("w", json!(0));
        let late: Arc<Mutex<Option<(Arc<Mutex<Vec<Value>>>, Subscription)>>> =
            Arc::new(Mutex::new(None));

        let handle = workspace.clone();
        let slot = late.clone();
        let _sub = workspace.subscribe(move |v| {
            if v == &json!(1) {
                handle.update(json!(2));
                *slot.lock().unwrap() = Some(recorder(&handle));
            }
        });

        workspace.update(json!(1));

        let guard = late.lock().unwrap();
        let (seen, _) = guard.as_ref().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![json!(2)]);
    }

    #[test]
    fn update_with_reads_latest_value() {
        let workspace = Workspace::new("w", json!({"count": 0}));
        for _ in 0..3 {
            workspace.update_with(|v| json!({"count": v["count"].as_i64().unwrap() + 1}));
        }
        assert_eq!(workspace.current(), json!({"count": 3}));
    }

    #[test]
    fn try_update_with_none_leaves_value() {
        let workspace = Workspace::new("w", json!(1));
        assert!(!workspace.try_update_with(|_| None));
        assert_eq!(workspace.current(), json!(1));
    }

    #[test]
    fn concurrent_writers_do_not_lose_updates() {
        let workspace = Workspace::new("w", json!(0));
        let (seen, _sub) = recorder(&workspace);

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let workspace = workspace.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        workspace.update_with(|v| json!(v.as_i64().unwrap() + 1));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(workspace.current(), json!(200));
        let seen: Vec<i64> = seen.lock().unwrap().iter().map(|v| v.as_i64().unwrap()).collect();
        assert_eq!(seen, (0..=200).collect::<Vec<_>>());
    }

    #[test]
    fn apply_patch_updates_value() {
        let workspace = Workspace::new("w", json!({"count": 1}));
        let patch = Patch::new().with_op(Op::replace(path!("count"), json!(2)));

        assert!(workspace.apply_patch(&patch));
        assert!(!workspace.apply_patch(&Patch::new()));
        assert_eq!(workspace.current(), json!({"count": 2}));
    }

    #[test]
    fn subscribe_patches_emits_diffs() {
        let workspace = Workspace::new("w", json!({"count": 1}));
        let patches = Arc::new(Mutex::new(Vec::new()));
        let sink = patches.clone();
        let _sub = workspace.subscribe_patches(move |p| sink.lock().unwrap().push(p.clone()));

        workspace.update(json!({"count": 2}));

        let patches = patches.lock().unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].ops(), &[Op::replace(path!("count"), json!(2))]);
    }

    #[test]
    fn disposed_subscription_stops_delivery() {
        let workspace = Workspace::new("w", json!(0));
        let (seen, sub) = recorder(&workspace);

        sub.dispose();
        sub.dispose();
        workspace.update(json!(1));

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(workspace.subscriber_count(), 0);
    }

    #[test]
    fn dispose_is_idempotent_and_drops_attachments() {
        let workspace = Workspace::new("w", json!(0));
        let (_seen, sub) = recorder(&workspace);
        let marker = Arc::new(());
        workspace.attach(marker.clone());
        assert_eq!(Arc::strong_count(&marker), 2);

        workspace.dispose();
        workspace.dispose();

        assert!(workspace.is_disposed());
        assert_eq!(Arc::strong_count(&marker), 1);
        assert!(!workspace.update(json!(1)));
        assert_eq!(workspace.current(), json!(0));
        sub.dispose();
    }

    #[tokio::test]
    async fn changes_stream_replays_and_ends_on_dispose() {
        let workspace = Workspace::new("w", json!(1));
        let mut changes = Box::pin(workspace.changes());

        workspace.update(json!(2));
        workspace.dispose();

        assert_eq!(changes.next().await, Some(json!(1)));
        assert_eq!(changes.next().await, Some(json!(2)));
        assert_eq!(changes.next().await, None);
    }
}
