use std::future::Future;
use std::time::Duration;

#[cfg(not(any(feature = "runtime-async-std", feature = "runtime-tokio")))]
compile_error!("one of the `runtime-async-std` or `runtime-tokio` features must be enabled");

// runtime-async-std
#[cfg(feature = "runtime-async-std")]
pub use async_std::task::yield_now;

#[cfg(feature = "runtime-async-std")]
pub fn spawn<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    async_std::task::spawn(fut);
}

#[cfg(feature = "runtime-async-std")]
pub async fn sleep(delay: Duration) {
    async_std::task::sleep(delay).await
}

// runtime-tokio
#[cfg(all(feature = "runtime-tokio", not(feature = "runtime-async-std")))]
pub use tokio::task::yield_now;

#[cfg(all(feature = "runtime-tokio", not(feature = "runtime-async-std")))]
pub fn spawn<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(fut);
        }
        // Dropping the task drops its result sender, so waiters see `Canceled`.
        Err(err) => tracing::warn!(%err, "no tokio runtime to spawn on, task dropped"),
    }
}

#[cfg(all(feature = "runtime-tokio", not(feature = "runtime-async-std")))]
pub async fn sleep(delay: Duration) {
    tokio::time::sleep(delay).await
}

#[cfg(all(test, feature = "runtime-tokio", not(feature = "runtime-async-std")))]
mod tests {
    use futures::channel::oneshot;
    use futures::executor::block_on;

    use super::spawn;

    #[test]
    fn spawn_outside_a_runtime_drops_the_task() {
        let (tx, rx) = oneshot::channel::<()>();
        spawn(async move {
            let _ = tx.send(());
        });
        assert!(block_on(rx).is_err());
    }

    #[test]
    fn spawn_inside_a_runtime_runs_the_task() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let (tx, rx) = oneshot::channel::<u8>();
        let received = runtime.block_on(async move {
            spawn(async move {
                let _ = tx.send(7);
            });
            rx.await
        });
        assert_eq!(received, Ok(7));
    }
}
