//! A DataLoader that coalesces individual key lookups into batch windows.
//!
//! Every [`Loader::load`] call returns a shared future for the key's value.
//! Keys requested before the loader's open [`Batch`] is dispatched are fetched
//! together by one call to the [`BatchFn`], and each key is fetched at most once
//! per loader.
//!
//! Batches are dispatched by [`Loader::dispatch`], by flushing the
//! [`Context`] the loader was created with, or (for every batch but a
//! loader's first) by a short timer. [`Context::wait`] drives a future while
//! flushing, which also batches loads chained on earlier results:
//!
//! ```
//! use std::collections::HashMap;
//!
//! use async_trait::async_trait;
//! use batch_dataloader::{BatchFn, Context, Loader};
//!
//! struct Users;
//!
//! #[async_trait]
//! impl BatchFn<u64, String> for Users {
//!     type Output = HashMap<u64, String>;
//!     type Error = String;
//!
//!     async fn load(&self, keys: &[u64]) -> Result<Self::Output, Self::Error> {
//!         Ok(keys.iter().map(|id| (*id, format!("user-{}", id))).collect())
//!     }
//! }
//!
//! let context = Context::new();
//! let users = Loader::new(Users, &context);
//! let names = futures::executor::block_on(context.wait(users.load_many(vec![1, 2, 1])));
//! assert_eq!(names.unwrap(), vec!["user-1", "user-2", "user-1"]);
//! ```

mod batch;
mod batch_fn;
pub mod cached;
mod context;
mod error;
#[cfg(feature = "json")]
mod json;
mod runtime;

pub use batch::{Batch, LoadFuture};
pub use batch_fn::{batch_fn, BatchFn, BatchResult, FnBatcher, IntoBatchResult};
pub use cached::{Loader, LoaderOptions};
pub use context::Context;
pub use error::{LoadError, ShapeMismatch};
