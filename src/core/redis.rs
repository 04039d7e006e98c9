use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{cmd, Client, ErrorKind, RedisError};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

impl RedisHandle {
    pub fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    pub async fn disconnect(&self) {
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    /// Appends a payload to the head of a list used as a FIFO queue.
    pub async fn push(&self, key: &str, payload: &str) -> Result<(), RedisError> {
        let mut manager = self.connected().await?;
        cmd("LPUSH").arg(key).arg(payload).query_async::<_, i64>(&mut manager).await?;
        Ok(())
    }

    /// Takes the oldest payload from a list pushed with [`RedisHandle::push`].
    pub async fn pop(&self, key: &str) -> Result<Option<String>, RedisError> {
        let mut manager = self.connected().await?;
        cmd("RPOP").arg(key).query_async::<_, Option<String>>(&mut manager).await
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> Result<(), RedisError> {
        let mut manager = self.connected().await?;
        cmd("PUBLISH").arg(channel).arg(payload).query_async::<_, i64>(&mut manager).await?;
        Ok(())
    }

    async fn connected(&self) -> Result<ConnectionManager, RedisError> {
        let manager = { self.manager.read().await.clone() };
        manager.ok_or_else(|| RedisError::from((ErrorKind::IoError, "Redis is not connected")))
    }
}
