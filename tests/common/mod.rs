#![allow(dead_code)]

pub mod batcher;

use std::future::Future;
use std::time::Duration;

use futures::future::{self, Either};

#[cfg(feature = "runtime-async-std")]
pub fn block_on<F: Future>(fut: F) -> F::Output {
    async_std::task::block_on(fut)
}

#[cfg(all(feature = "runtime-tokio", not(feature = "runtime-async-std")))]
pub fn block_on<F: Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}

#[cfg(feature = "runtime-async-std")]
pub async fn sleep(ms: u64) {
    async_std::task::sleep(Duration::from_millis(ms)).await
}

#[cfg(all(feature = "runtime-tokio", not(feature = "runtime-async-std")))]
pub async fn sleep(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await
}

/// `fut`'s output, or `None` if it is still pending after `ms`.
pub async fn timeout<F: Future>(ms: u64, fut: F) -> Option<F::Output> {
    let timer = sleep(ms);
    futures::pin_mut!(fut, timer);
    match future::select(fut, timer).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(_) => None,
    }
}
