use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use batch_dataloader::BatchFn;

#[derive(Clone, Debug, PartialEq)]
pub enum MyError {
    Unknown,
}

impl fmt::Display for MyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown")
    }
}

/// Records the keys of every call.
#[derive(Clone, Default)]
pub struct History {
    calls: Arc<Mutex<Vec<Vec<i32>>>>,
}

impl History {
    pub fn record(&self, keys: &[i32]) {
        self.calls.lock().unwrap().push(keys.to_vec());
    }

    pub fn calls(&self) -> Vec<Vec<i32>> {
        self.calls.lock().unwrap().clone()
    }
}

/// `k -> k * 10`, as a positional sequence.
#[derive(Clone, Default)]
pub struct Batcher {
    pub history: History,
}

#[async_trait]
impl BatchFn<i32, i32> for Batcher {
    type Output = Vec<i32>;
    type Error = MyError;

    async fn load(&self, keys: &[i32]) -> Result<Vec<i32>, MyError> {
        self.history.record(keys);
        Ok(keys.iter().map(|k| k * 10).collect())
    }
}

/// `k -> k * 10`, as a mapping that leaves out odd keys.
#[derive(Clone, Default)]
pub struct EvenBatcher {
    pub history: History,
}

#[async_trait]
impl BatchFn<i32, i32> for EvenBatcher {
    type Output = HashMap<i32, i32>;
    type Error = MyError;

    async fn load(&self, keys: &[i32]) -> Result<HashMap<i32, i32>, MyError> {
        self.history.record(keys);
        Ok(keys
            .iter()
            .filter(|k| *k % 2 == 0)
            .map(|k| (*k, k * 10))
            .collect())
    }
}

/// Always returns one value too few.
#[derive(Clone, Default)]
pub struct ShortBatcher;

#[async_trait]
impl BatchFn<i32, i32> for ShortBatcher {
    type Output = Vec<i32>;
    type Error = MyError;

    async fn load(&self, keys: &[i32]) -> Result<Vec<i32>, MyError> {
        Ok(keys.iter().skip(1).map(|k| k * 10).collect())
    }
}

/// Fails the whole batch.
#[derive(Clone, Default)]
pub struct BadBatcher;

#[async_trait]
impl BatchFn<i32, i32> for BadBatcher {
    type Output = Vec<i32>;
    type Error = MyError;

    async fn load(&self, _keys: &[i32]) -> Result<Vec<i32>, MyError> {
        Err(MyError::Unknown)
    }
}
