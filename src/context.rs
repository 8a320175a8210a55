use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll, Waker};

use futures::future::{self, Either};
use futures::pin_mut;
use futures::stream::{FuturesUnordered, StreamExt as _};
use tracing::trace;

use crate::batch::{lock, PendingBatch};
use crate::runtime;

const DEFAULT_YIELD_COUNT: usize = 10;

/// Registry of batches that have been opened but not dispatched yet, shared
/// by every loader created with it. One context per logical unit of work
/// (a request, a job) is the intended granularity.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    pending: Mutex<VecDeque<Arc<dyn PendingBatch>>>,
    yield_count: usize,
    // Bumped on every registration; flushes park on it between rounds.
    generation: AtomicU64,
    wakers: Mutex<Vec<Waker>>,
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("pending", &self.pending())
            .field("yield_count", &self.inner.yield_count)
            .finish()
    }
}

impl Context {
    pub fn new() -> Self {
        Context::with_yield_count(DEFAULT_YIELD_COUNT)
    }

    /// `yield_count` is how many times a flush yields to the runtime once
    /// nothing it dispatched is still in flight, giving waiters a chance to
    /// queue follow-up loads before the flush returns. Batches opened while
    /// a flush has fetches in flight are picked up without waiting.
    pub fn with_yield_count(yield_count: usize) -> Self {
        Context {
            inner: Arc::new(Inner {
                pending: Mutex::new(VecDeque::new()),
                yield_count,
                generation: AtomicU64::new(0),
                wakers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn yield_count(&self) -> usize {
        self.inner.yield_count
    }

    /// Number of registered batches that have not been dispatched.
    pub fn pending(&self) -> usize {
        lock(&self.inner.pending)
            .iter()
            .filter(|batch| !batch.is_dispatched())
            .count()
    }

    pub(crate) fn register(&self, batch: Arc<dyn PendingBatch>) {
        {
            let mut pending = lock(&self.inner.pending);
            pending.retain(|batch| !batch.is_dispatched());
            pending.push_front(batch);
        }
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        for waker in mem::take(&mut *lock(&self.inner.wakers)) {
            waker.wake();
        }
    }

    /// Dispatch every registered batch, most recently opened first, and keep
    /// going until no batch is left: batches opened while earlier ones are
    /// fetched (by their waiters or by the batch functions themselves) are
    /// dispatched by the same call.
    pub async fn flush(&self) {
        self.run(true).await
    }

    /// Dispatch whatever is registered without clearing the registry first,
    /// repeating until nothing undispatched remains.
    pub async fn drain(&self) {
        self.run(false).await
    }

    /// Await `fut` while flushing this context, so that every load it issues
    /// (including loads chained on earlier results or issued after unrelated
    /// awaits) is dispatched.
    pub async fn wait<F>(&self, fut: F) -> F::Output
    where
        F: Future,
    {
        let flushing = self.keep_flushing();
        pin_mut!(fut, flushing);
        match future::select(fut, flushing).await {
            Either::Left((output, _)) => output,
            Either::Right((never, _)) => match never {},
        }
    }

    async fn keep_flushing(&self) -> Infallible {
        loop {
            let seen = self.generation();
            self.flush().await;
            self.registered(seen).await;
        }
    }

    async fn run(&self, take: bool) {
        let mut in_flight = FuturesUnordered::new();
        loop {
            let seen = self.generation();
            let batches: Vec<Arc<dyn PendingBatch>> = {
                let mut pending = lock(&self.inner.pending);
                if take {
                    mem::take(&mut *pending).into()
                } else {
                    pending.retain(|batch| !batch.is_dispatched());
                    pending.iter().cloned().collect()
                }
            };
            for batch in &batches {
                if batch.dispatch_pending() {
                    trace!(batch = batch.id(), "flushed batch");
                }
                in_flight.push(batch.resolved());
            }

            if in_flight.is_empty() {
                for _ in 0..self.inner.yield_count {
                    runtime::yield_now().await;
                }
                if self.generation() == seen && self.pending() == 0 {
                    break;
                }
                continue;
            }

            // Wake on whichever comes first: a fetch finishing, or a new
            // batch that the in-flight fetches may be waiting on.
            future::select(in_flight.next(), self.registered(seen)).await;
        }
        if !take {
            lock(&self.inner.pending).retain(|batch| !batch.is_dispatched());
        }
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn registered(&self, seen: u64) -> Registered<'_> {
        Registered {
            inner: &self.inner,
            seen,
        }
    }
}

/// Resolves once a batch is registered after generation `seen`.
struct Registered<'a> {
    inner: &'a Inner,
    seen: u64,
}

impl Future for Registered<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<()> {
        if self.inner.generation.load(Ordering::SeqCst) != self.seen {
            return Poll::Ready(());
        }
        {
            let mut wakers = lock(&self.inner.wakers);
            if !wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                wakers.push(cx.waker().clone());
            }
        }
        // A registration may have landed before the waker was stored.
        if self.inner.generation.load(Ordering::SeqCst) != self.seen {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}
