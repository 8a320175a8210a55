use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;

use async_trait::async_trait;

use crate::error::{LoadError, ShapeMismatch};

/// The bulk fetch behind a [`Loader`](crate::Loader). Called once per batch
/// window with the distinct keys queued into it, in order of first request.
#[async_trait]
pub trait BatchFn<K, V>: Send + Sync + 'static {
    /// What the fetch produces; a sequence aligned with `keys` or a mapping.
    type Output: IntoBatchResult<K, V> + Send;
    type Error: Clone + Debug + Send + Sync + 'static;

    async fn load(&self, keys: &[K]) -> Result<Self::Output, Self::Error>;
}

/// Values produced by one batch function call.
#[derive(Debug, Clone)]
pub enum BatchResult<K, V> {
    /// One value per requested key, positionally aligned.
    Values(Vec<V>),
    /// Values keyed by the requested key.
    Map(HashMap<K, V>),
}

/// Conversion from a batch function's output into a [`BatchResult`].
pub trait IntoBatchResult<K, V> {
    fn into_batch_result(self) -> Result<BatchResult<K, V>, ShapeMismatch>;
}

impl<K, V> IntoBatchResult<K, V> for BatchResult<K, V> {
    fn into_batch_result(self) -> Result<BatchResult<K, V>, ShapeMismatch> {
        Ok(self)
    }
}

impl<K, V> IntoBatchResult<K, V> for Vec<V> {
    fn into_batch_result(self) -> Result<BatchResult<K, V>, ShapeMismatch> {
        Ok(BatchResult::Values(self))
    }
}

impl<K, V> IntoBatchResult<K, V> for HashMap<K, V> {
    fn into_batch_result(self) -> Result<BatchResult<K, V>, ShapeMismatch> {
        Ok(BatchResult::Map(self))
    }
}

impl<K, V> From<Vec<V>> for BatchResult<K, V> {
    fn from(values: Vec<V>) -> Self {
        BatchResult::Values(values)
    }
}

impl<K, V> From<HashMap<K, V>> for BatchResult<K, V> {
    fn from(map: HashMap<K, V>) -> Self {
        BatchResult::Map(map)
    }
}

impl<K, V> BatchResult<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Reshape into a key → value map for `keys`, the distinct keys the batch
    /// function was called with.
    pub(crate) fn into_map<E>(self, keys: &[K]) -> Result<HashMap<K, V>, LoadError<E>> {
        match self {
            BatchResult::Values(values) => {
                if values.len() != keys.len() {
                    return Err(LoadError::SizeMismatch {
                        expected: keys.len(),
                        actual: values.len(),
                    });
                }
                Ok(keys.iter().cloned().zip(values).collect())
            }
            BatchResult::Map(map) => Ok(map),
        }
    }
}

/// Adapts an async closure taking the batch keys into a [`BatchFn`].
///
/// ```
/// use batch_dataloader::{batch_fn, Context, Loader};
///
/// let context = Context::new();
/// let loader: Loader<u32, u32, _> = Loader::new(
///     batch_fn(|keys: Vec<u32>| async move {
///         Ok::<_, String>(keys.iter().map(|k| k * 2).collect::<Vec<u32>>())
///     }),
///     &context,
/// );
/// let doubled = futures::executor::block_on(context.wait(loader.load(21)));
/// assert_eq!(doubled, Ok(42));
/// ```
pub fn batch_fn<F>(f: F) -> FnBatcher<F> {
    FnBatcher(f)
}

/// See [`batch_fn`].
#[derive(Clone)]
pub struct FnBatcher<F>(F);

#[async_trait]
impl<K, V, F, Fut, O, E> BatchFn<K, V> for FnBatcher<F>
where
    K: Clone + Send + Sync + 'static,
    V: 'static,
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    O: IntoBatchResult<K, V> + Send + 'static,
    E: Clone + Debug + Send + Sync + 'static,
{
    type Output = O;
    type Error = E;

    async fn load(&self, keys: &[K]) -> Result<O, E> {
        (self.0)(keys.to_vec()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_zip_with_keys() {
        let result: BatchResult<&str, i32> = vec![10, 20, 30].into();
        let map = result.into_map::<()>(&["x", "y", "z"]).unwrap();
        assert_eq!(map["x"], 10);
        assert_eq!(map["y"], 20);
        assert_eq!(map["z"], 30);
    }

    #[test]
    fn values_of_wrong_length() {
        let result: BatchResult<&str, i32> = vec![10, 20].into();
        let err = result.into_map::<()>(&["x", "y", "z"]).unwrap_err();
        assert_eq!(
            err,
            LoadError::SizeMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn map_is_taken_as_is() {
        let map: HashMap<&str, i32> = [("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
        let result = BatchResult::from(map.clone());
        assert_eq!(result.into_map::<()>(&["a", "b"]).unwrap(), map);
    }
}
