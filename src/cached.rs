use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{self, BoxFuture};
use futures::FutureExt as _;
use tracing::{debug, trace};

use crate::batch::{lock, Batch, LoadFuture};
use crate::context::Context;
use crate::error::LoadError;
use crate::runtime;
use crate::BatchFn;

const DEFAULT_AUTO_DISPATCH_DELAY: Duration = Duration::from_millis(50);

/// Loader configuration.
pub struct LoaderOptions<K, C = K> {
    key_fn: Arc<dyn Fn(&K) -> C + Send + Sync>,
    auto_dispatch_delay: Duration,
    name: Option<Arc<str>>,
}

impl<K, C> Clone for LoaderOptions<K, C> {
    fn clone(&self) -> Self {
        LoaderOptions {
            key_fn: self.key_fn.clone(),
            auto_dispatch_delay: self.auto_dispatch_delay,
            name: self.name.clone(),
        }
    }
}

impl<K, C> Debug for LoaderOptions<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("auto_dispatch_delay", &self.auto_dispatch_delay)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<K: Clone + 'static> Default for LoaderOptions<K, K> {
    fn default() -> Self {
        LoaderOptions {
            key_fn: Arc::new(K::clone),
            auto_dispatch_delay: DEFAULT_AUTO_DISPATCH_DELAY,
            name: None,
        }
    }
}

impl<K: Clone + 'static> LoaderOptions<K, K> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, C> LoaderOptions<K, C> {
    /// Cache keys by `key_fn(&key)` instead of the key itself. Keys mapping
    /// to the same cache key share one load.
    pub fn with_key_fn<C2, KF>(self, key_fn: KF) -> LoaderOptions<K, C2>
    where
        KF: Fn(&K) -> C2 + Send + Sync + 'static,
    {
        LoaderOptions {
            key_fn: Arc::new(key_fn),
            auto_dispatch_delay: self.auto_dispatch_delay,
            name: self.name,
        }
    }

    /// How long a replacement batch waits before dispatching itself.
    pub fn with_auto_dispatch_delay(mut self, delay: Duration) -> Self {
        self.auto_dispatch_delay = delay;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(Arc::from(name));
        self
    }

    pub fn auto_dispatch_delay(&self) -> Duration {
        self.auto_dispatch_delay
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Caches one [`LoadFuture`] per key and collects uncached keys into batches.
///
/// The first batch a loader opens waits for an explicit dispatch, either
/// [`Loader::dispatch`] or a flush of its [`Context`]. Every later batch also
/// dispatches itself after [`LoaderOptions::with_auto_dispatch_delay`].
pub struct Loader<K, V, F, C = K>
where
    F: BatchFn<K, V>,
{
    inner: Arc<Inner<K, V, F, C>>,
}

struct Inner<K, V, F, C>
where
    F: BatchFn<K, V>,
{
    batch_fn: Arc<F>,
    context: Context,
    options: LoaderOptions<K, C>,
    state: Mutex<State<K, V, F, C>>,
}

struct State<K, V, F, C>
where
    F: BatchFn<K, V>,
{
    cache: HashMap<C, LoadFuture<V, F::Error>>,
    batch: Option<Batch<K, V, F>>,
}

// Manual implementation is used to omit applying unnecessary Clone bounds.
impl<K, V, F, C> Clone for Loader<K, V, F, C>
where
    F: BatchFn<K, V>,
{
    fn clone(&self) -> Self {
        Loader {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, F> Loader<K, V, F, K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: BatchFn<K, V>,
{
    pub fn new(batch_fn: F, context: &Context) -> Self {
        Loader::with_options(batch_fn, context, LoaderOptions::default())
    }
}

impl<K, V, F, C> Loader<K, V, F, C>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: BatchFn<K, V>,
    C: Eq + Hash,
{
    pub fn with_options(batch_fn: F, context: &Context, options: LoaderOptions<K, C>) -> Self {
        Loader {
            inner: Arc::new(Inner {
                batch_fn: Arc::new(batch_fn),
                context: context.clone(),
                options,
                state: Mutex::new(State {
                    cache: HashMap::new(),
                    batch: None,
                }),
            }),
        }
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn options(&self) -> &LoaderOptions<K, C> {
        &self.inner.options
    }

    /// The batch currently collecting keys, if one was opened.
    pub fn batch(&self) -> Option<Batch<K, V, F>> {
        lock(&self.inner.state).batch.clone()
    }

    /// Future for the value of `key`. Keys with the same cache key share a
    /// single future and are fetched once for the lifetime of the loader.
    pub fn load(&self, key: K) -> LoadFuture<V, F::Error> {
        let cache_key = (self.inner.options.key_fn)(&key);
        let mut state = lock(&self.inner.state);
        if let Some(fut) = state.cache.get(&cache_key) {
            trace!(loader = self.inner.options.name(), ?key, "cache hit");
            return fut.clone();
        }
        let fut = self.queue(&mut state, key);
        state.cache.insert(cache_key, fut.clone());
        fut
    }

    /// [`load`](Self::load) for a key that may be absent.
    pub fn try_load(&self, key: Option<K>) -> Result<LoadFuture<V, F::Error>, LoadError<F::Error>> {
        key.map(|key| self.load(key)).ok_or(LoadError::InvalidKey)
    }

    /// Values for `keys`, in order. Fails with the first error among them.
    pub fn load_many<I>(&self, keys: I) -> BoxFuture<'static, Result<Vec<V>, LoadError<F::Error>>>
    where
        I: IntoIterator<Item = K>,
    {
        future::try_join_all(keys.into_iter().map(|key| self.load(key))).boxed()
    }

    /// [`load_many`](Self::load_many) for a key sequence that may be absent.
    pub fn try_load_many(
        &self,
        keys: Option<Vec<K>>,
    ) -> Result<BoxFuture<'static, Result<Vec<V>, LoadError<F::Error>>>, LoadError<F::Error>> {
        keys.map(|keys| self.load_many(keys))
            .ok_or(LoadError::InvalidArgument)
    }

    /// Dispatch the open batch. Returns false when there is nothing to
    /// dispatch.
    pub fn dispatch(&self) -> bool {
        let batch = lock(&self.inner.state).batch.clone();
        match batch {
            Some(batch) => batch.dispatch().is_ok(),
            None => false,
        }
    }

    fn queue(&self, state: &mut State<K, V, F, C>, mut key: K) -> LoadFuture<V, F::Error> {
        loop {
            let open = state.batch.as_ref().filter(|batch| !batch.is_dispatched()).cloned();
            let batch = match open {
                Some(batch) => batch,
                None => {
                    let batch = self.open_batch(state.batch.is_some());
                    state.batch = Some(batch.clone());
                    batch
                }
            };
            // The timer may close the batch between the check above and here.
            match batch.try_queue(key) {
                Ok(fut) => return fut,
                Err(rejected) => key = rejected,
            }
        }
    }

    fn open_batch(&self, replacing: bool) -> Batch<K, V, F> {
        let batch = Batch::new(self.inner.batch_fn.clone(), self.inner.options.name.clone());
        self.inner.context.register(Arc::new(batch.clone()));
        if replacing {
            self.arm_timer(&batch);
        }
        batch
    }

    fn arm_timer(&self, batch: &Batch<K, V, F>) {
        let batch = batch.clone();
        let delay = self.inner.options.auto_dispatch_delay;
        runtime::spawn(async move {
            runtime::sleep(delay).await;
            if batch.dispatch().is_ok() {
                debug!(batch = batch.id(), ?delay, "auto-dispatched batch");
            }
        });
    }
}
