use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::channel::oneshot;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt as _;
use tracing::{debug, warn};

use crate::batch_fn::{BatchFn, IntoBatchResult};
use crate::error::LoadError;
use crate::runtime;

/// The eventual value for one key. Cloning it is cheap; every clone resolves
/// to the same result.
pub type LoadFuture<V, E> = Shared<BoxFuture<'static, Result<V, LoadError<E>>>>;

type Values<K, V, E> = Result<Arc<HashMap<K, V>>, LoadError<E>>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One batch window: every key queued before dispatch is fetched by a single
/// call to the batch function.
pub struct Batch<K, V, F>
where
    F: BatchFn<K, V>,
{
    inner: Arc<Inner<K, V, F>>,
}

struct Inner<K, V, F>
where
    F: BatchFn<K, V>,
{
    id: u64,
    name: Option<Arc<str>>,
    batch_fn: Arc<F>,
    state: Mutex<State<K, V, F::Error>>,
    values: Shared<BoxFuture<'static, Values<K, V, F::Error>>>,
    after_dispatch: Shared<BoxFuture<'static, ()>>,
}

struct State<K, V, E> {
    keys: Vec<K>,
    dispatched: bool,
    values_tx: Option<oneshot::Sender<Values<K, V, E>>>,
    after_dispatch_tx: Option<oneshot::Sender<()>>,
}

// Manual implementation is used to omit applying unnecessary Clone bounds.
impl<K, V, F> Clone for Batch<K, V, F>
where
    F: BatchFn<K, V>,
{
    fn clone(&self) -> Self {
        Batch {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, F> Debug for Batch<K, V, F>
where
    F: BatchFn<K, V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("id", &self.inner.id)
            .field("dispatched", &lock(&self.inner.state).dispatched)
            .finish()
    }
}

impl<K, V, F> Batch<K, V, F>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: BatchFn<K, V>,
{
    pub(crate) fn new(batch_fn: Arc<F>, name: Option<Arc<str>>) -> Self {
        let (values_tx, values_rx) = oneshot::channel();
        let (after_dispatch_tx, after_dispatch_rx) = oneshot::channel();
        let values = values_rx
            .map(|received| received.unwrap_or(Err(LoadError::Canceled)))
            .boxed()
            .shared();
        let after_dispatch = after_dispatch_rx.map(|_| ()).boxed().shared();
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(batch = id, loader = name.as_deref(), "opened batch");
        Batch {
            inner: Arc::new(Inner {
                id,
                name,
                batch_fn,
                state: Mutex::new(State {
                    keys: Vec::new(),
                    dispatched: false,
                    values_tx: Some(values_tx),
                    after_dispatch_tx: Some(after_dispatch_tx),
                }),
                values,
                after_dispatch,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_dispatched(&self) -> bool {
        lock(&self.inner.state).dispatched
    }

    /// Number of keys queued so far, duplicates included.
    pub fn len(&self) -> usize {
        lock(&self.inner.state).keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue `key` and get a future for its value.
    pub fn queue(&self, key: K) -> Result<LoadFuture<V, F::Error>, LoadError<F::Error>> {
        self.try_queue(key).map_err(|key| {
            warn!(batch = self.inner.id, ?key, "cannot queue key after batch is dispatched");
            LoadError::AlreadyDispatched
        })
    }

    /// Like [`queue`](Self::queue), but hands the key back when the batch is
    /// closed so the caller can queue it elsewhere.
    pub(crate) fn try_queue(&self, key: K) -> Result<LoadFuture<V, F::Error>, K> {
        {
            let mut state = lock(&self.inner.state);
            if state.dispatched {
                return Err(key);
            }
            state.keys.push(key.clone());
        }

        let values = self.inner.values.clone();
        Ok(async move {
            match values.await {
                Ok(values) => values
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| LoadError::MissingKey(format!("{:?}", key))),
                Err(err) => Err(err),
            }
        }
        .boxed()
        .shared())
    }

    /// Close the batch and start fetching. Fails with
    /// [`LoadError::AlreadyDispatched`] if the batch was closed before; the
    /// batch function is never run twice.
    pub fn dispatch(&self) -> Result<(), LoadError<F::Error>> {
        let (queued, values_tx, after_dispatch_tx) = {
            let mut state = lock(&self.inner.state);
            if state.dispatched {
                return Err(LoadError::AlreadyDispatched);
            }
            state.dispatched = true;
            (
                mem::take(&mut state.keys),
                state.values_tx.take(),
                state.after_dispatch_tx.take(),
            )
        };

        let keys = unique(&queued);
        debug!(
            batch = self.inner.id,
            loader = self.inner.name.as_deref(),
            keys = keys.len(),
            queued = queued.len(),
            "dispatching batch"
        );

        let id = self.inner.id;
        let batch_fn = self.inner.batch_fn.clone();
        runtime::spawn(async move {
            let fetch = batch_fn.load(&keys);
            if let Some(tx) = after_dispatch_tx {
                let _ = tx.send(());
            }
            let values: Result<HashMap<K, V>, LoadError<F::Error>> = match fetch.await {
                Ok(output) => output
                    .into_batch_result()
                    .map_err(LoadError::from)
                    .and_then(|result| result.into_map(&keys)),
                Err(err) => Err(LoadError::BatchFn(err)),
            };
            match &values {
                Ok(values) => debug!(batch = id, resolved = values.len(), "batch resolved"),
                Err(err) => warn!(batch = id, ?err, "batch failed"),
            }
            if let Some(tx) = values_tx {
                let _ = tx.send(values.map(Arc::new));
            }
        });
        Ok(())
    }

    /// Resolves once the batch function has been called, before its result
    /// is known.
    pub fn after_dispatch(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        self.inner.after_dispatch.clone()
    }

    /// Resolves once the batch result is known, whether it succeeded or not.
    pub fn resolved(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        self.inner.values.clone().map(|_| ())
    }
}

/// Distinct keys in order of first appearance.
fn unique<K: Eq + Hash + Clone>(queued: &[K]) -> Vec<K> {
    let mut seen = HashSet::with_capacity(queued.len());
    queued.iter().filter(|key| seen.insert(*key)).cloned().collect()
}

/// Type-erased view of a batch, as tracked by a [`Context`](crate::Context).
pub(crate) trait PendingBatch: Send + Sync {
    fn id(&self) -> u64;
    fn is_dispatched(&self) -> bool;
    /// Dispatch unless already dispatched; true when this call did it.
    fn dispatch_pending(&self) -> bool;
    fn resolved(&self) -> BoxFuture<'static, ()>;
}

impl<K, V, F> PendingBatch for Batch<K, V, F>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: BatchFn<K, V>,
{
    fn id(&self) -> u64 {
        self.inner.id
    }

    fn is_dispatched(&self) -> bool {
        Batch::is_dispatched(self)
    }

    fn dispatch_pending(&self) -> bool {
        self.dispatch().is_ok()
    }

    fn resolved(&self) -> BoxFuture<'static, ()> {
        Batch::resolved(self).boxed()
    }
}
