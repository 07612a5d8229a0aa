//! 异步适配器
//!
//! 所有适配器本身都是同步阻塞的。在 tokio 运行时中使用时，`BlockingAdapter`
//! 把每次调用放到阻塞线程池上执行，避免占用异步工作线程。

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use crate::core::item::LogItem;
use crate::error::{DbLogError, Result};
use crate::sinks::traits::Adapter;

/// 异步适配器 trait
#[async_trait]
pub trait AsyncAdapter: Send + Sync + Debug {
    /// 写入一条日志
    async fn process(&self, item: LogItem) -> Result<()>;

    /// 开启事务
    async fn begin(&self) -> Result<()>;

    /// 提交事务
    async fn commit(&self) -> Result<()>;

    /// 回滚事务
    async fn rollback(&self) -> Result<()>;

    /// 当前是否处于事务中
    async fn in_transaction(&self) -> Result<bool>;

    /// 关闭适配器
    async fn close(&self) -> Result<bool>;
}

/// 在阻塞线程池上运行同步适配器
#[derive(Debug)]
pub struct BlockingAdapter<A: Adapter + 'static> {
    inner: Arc<Mutex<A>>,
}

impl<A: Adapter + 'static> Clone for BlockingAdapter<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: Adapter + 'static> BlockingAdapter<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            inner: Arc::new(Mutex::new(adapter)),
        }
    }

    /// 共享的内部适配器
    pub fn inner(&self) -> Arc<Mutex<A>> {
        self.inner.clone()
    }

    /// 在阻塞线程上持锁执行一次调用
    ///
    /// 先前的调用在持锁时 panic 会使锁中毒，适配器状态不再可信，此后的调用都返回错误。
    async fn run<T, F>(&self, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut A) -> Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut adapter = inner.lock().map_err(|_| {
                DbLogError::BackgroundTaskError("adapter lock poisoned".to_string())
            })?;
            call(&mut adapter)
        })
        .await
        .map_err(|e| DbLogError::BackgroundTaskError(e.to_string()))?
    }
}

#[async_trait]
impl<A: Adapter + 'static> AsyncAdapter for BlockingAdapter<A> {
    async fn process(&self, item: LogItem) -> Result<()> {
        self.run(move |adapter| adapter.process(&item)).await
    }

    async fn begin(&self) -> Result<()> {
        self.run(|adapter| adapter.begin()).await
    }

    async fn commit(&self) -> Result<()> {
        self.run(|adapter| adapter.commit()).await
    }

    async fn rollback(&self) -> Result<()> {
        self.run(|adapter| adapter.rollback()).await
    }

    async fn in_transaction(&self) -> Result<bool> {
        self.run(|adapter| Ok(adapter.in_transaction())).await
    }

    async fn close(&self) -> Result<bool> {
        self.run(|adapter| adapter.close()).await
    }
}
