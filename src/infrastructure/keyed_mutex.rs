//! 按键加锁 - 基础设施层
//!
//! 同一个键上的写操作严格串行，不同键之间完全并发。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// 按键异步互斥锁
///
/// 职责：
/// - 为每个字符串键维护一把异步锁
/// - 锁无人持有、无人等待时自动回收
/// - 不认识缓存 / 任务等业务概念
#[derive(Default)]
pub struct KeyedMutex {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// 持有期间独占某个键
pub struct KeyGuard<'a> {
    owner: &'a KeyedMutex,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取某个键的锁，按请求顺序排队（tokio Mutex 为 FIFO）
    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = lock.lock_owned().await;

        KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// 当前登记的键数量
    pub fn active_keys(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn release(&self, key: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // 只剩 map 自己持有引用时才移除，避免有人正在排队
        if let Some(lock) = locks.get(key) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(key);
            }
        }
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // 先释放锁本身，再尝试回收
        self.guard.take();
        self.owner.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let mutex = Arc::new(KeyedMutex::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let mutex = mutex.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let _guard = mutex.lock("q_1").await;
                log.lock().unwrap().push(format!("start-{}", i));
                tokio::time::sleep(Duration::from_millis(5)).await;
                log.lock().unwrap().push(format!("end-{}", i));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let log = log.lock().unwrap();
        // 每个 start 后紧跟同一任务的 end
        for pair in log.chunks(2) {
            let start = pair[0].trim_start_matches("start-");
            let end = pair[1].trim_start_matches("end-");
            assert_eq!(start, end);
        }
        assert_eq!(mutex.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let mutex = KeyedMutex::new();
        let _a = mutex.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(50), mutex.lock("b")).await;
        assert!(b.is_ok());
        assert_eq!(mutex.active_keys(), 2);
    }
}
