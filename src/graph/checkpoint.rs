// SPDX-License-Identifier: MIT

//! Per-thread state persistence between graph runs

use crate::adk::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Saves and loads the latest state of a conversation thread
#[async_trait]
pub trait Checkpointer<S>: Send + Sync
where
    S: Clone + Send + Sync + 'static,
{
    async fn get(&self, thread_id: &str) -> Result<Option<S>>;

    async fn put(&self, thread_id: &str, state: &S) -> Result<()>;
}

/// In-memory checkpointer; threads live as long as the process
pub struct MemorySaver<S> {
    threads: RwLock<HashMap<String, S>>,
}

impl<S> MemorySaver<S> {
    pub fn new() -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
        }
    }

    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

impl<S> Default for MemorySaver<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> Checkpointer<S> for MemorySaver<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn get(&self, thread_id: &str) -> Result<Option<S>> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn put(&self, thread_id: &str, state: &S) -> Result<()> {
        self.threads
            .write()
            .await
            .insert(thread_id.to_string(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let saver = MemorySaver::<Vec<u32>>::new();
        saver.put("a", &vec![1]).await.unwrap();
        saver.put("b", &vec![2, 3]).await.unwrap();
        saver.put("a", &vec![4]).await.unwrap();

        assert_eq!(saver.get("a").await.unwrap(), Some(vec![4]));
        assert_eq!(saver.get("b").await.unwrap(), Some(vec![2, 3]));
        assert_eq!(saver.get("c").await.unwrap(), None);
        assert_eq!(saver.thread_count().await, 2);
    }
}
