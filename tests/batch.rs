mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use batch_dataloader::{BatchFn, Context, LoadError, Loader};
use common::batcher::{Batcher, MyError};
use common::block_on;
use futures::channel::oneshot;
use futures::future;
use futures::FutureExt as _;

/// Holds every batch until the gate opens.
#[derive(Clone)]
struct GatedBatcher {
    gate: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
}

#[async_trait]
impl BatchFn<i32, i32> for GatedBatcher {
    type Output = Vec<i32>;
    type Error = MyError;

    async fn load(&self, keys: &[i32]) -> Result<Vec<i32>, MyError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(keys.iter().map(|k| k * 10).collect())
    }
}

#[test]
fn queue_after_dispatch_is_rejected() {
    let context = Context::new();
    let loader = Loader::new(Batcher::default(), &context);

    let v1 = loader.load(1);
    let batch = loader.batch().unwrap();
    assert_eq!(batch.len(), 1);
    assert!(batch.dispatch().is_ok());
    assert_eq!(batch.queue(2).err(), Some(LoadError::AlreadyDispatched));
    assert_eq!(Ok(10), block_on(v1));
}

#[test]
fn second_dispatch_is_rejected() {
    let context = Context::new();
    let batcher = Batcher::default();
    let loader = Loader::new(batcher.clone(), &context);

    let v1 = loader.load(1);
    let batch = loader.batch().unwrap();
    assert_eq!(batch.dispatch(), Ok(()));
    assert_eq!(batch.dispatch(), Err(LoadError::AlreadyDispatched));
    assert_eq!(Ok(10), block_on(v1));
    block_on(context.flush());
    assert_eq!(batcher.history.calls(), vec![vec![1]]);
}

#[test]
fn duplicate_keys_are_fetched_once() {
    let context = Context::new();
    let batcher = Batcher::default();
    let loader = Loader::new(batcher.clone(), &context);

    let v1 = loader.load(3);
    let v2 = loader.load(1);
    let batch = loader.batch().unwrap();
    let v3 = batch.queue(3).unwrap();
    assert_eq!(batch.len(), 3);

    assert_eq!(Ok((30, 10, 30)), block_on(context.wait(future::try_join3(v1, v2, v3))));
    assert_eq!(batcher.history.calls(), vec![vec![3, 1]]);
}

#[test]
fn after_dispatch_fires_before_values() {
    let (open, gate) = oneshot::channel();
    let batcher = GatedBatcher {
        gate: Arc::new(Mutex::new(Some(gate))),
    };
    let context = Context::new();
    let loader = Loader::new(batcher, &context);

    let v1 = loader.load(1);
    let batch = loader.batch().unwrap();
    assert!(loader.dispatch());
    block_on(batch.after_dispatch());
    assert!(batch.resolved().now_or_never().is_none());

    open.send(()).unwrap();
    block_on(batch.resolved());
    assert_eq!(Ok(10), block_on(v1));
}

#[test]
fn dropped_batch_cancels_waiters() {
    let v1 = {
        let context = Context::new();
        let loader = Loader::new(Batcher::default(), &context);
        loader.load(1)
    };
    assert_eq!(Err(LoadError::Canceled), block_on(v1));
}
