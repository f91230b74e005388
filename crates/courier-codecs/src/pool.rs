use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::ArrayQueue;
use tracing::{trace, warn};

/// 池化对象的生命周期钩子。
///
/// # 契约说明（What）
/// - `create`：构造新对象，预填充与池耗尽时都会调用；
/// - `activate`：借出前调用；`passivate`：归还前调用，负责清除上一次使用留下的状态；
/// - `validate`：借出时检查对象是否仍可用，返回 `false` 的对象被丢弃并重新构造。
pub trait ObjectHandler<T>: Send + Sync {
    fn create(&self) -> T;

    fn activate(&self, _object: &mut T) {}

    fn passivate(&self, _object: &mut T) {}

    fn validate(&self, _object: &T) -> bool {
        true
    }
}

/// `ObjectPool` 是一个无锁、永不阻塞的对象池，用于复用编解码上下文。
///
/// # 模块角色（Why）
/// - 每次编码都需要 UTF-8 工作缓冲与调试帧栈，频繁分配会在热路径上产生可观的开销；
///   池化后，稳定负载下的借还只涉及一次队列出入。
///
/// # 核心机制（How）
/// - 空闲对象存放在 `crossbeam_queue::ArrayQueue` 中，容量向上取整为 2 的幂，构造时预先填满；
/// - 池耗尽时不等待，而是就地构造一个临时对象借出；归还时若队列已满则直接丢弃；
/// - [`PoolMetrics`] 以原子计数记录构造、临时借出、回收与丢弃次数，供 [`stats`](Self::stats) 快照。
///
/// # 契约说明（What）
/// - **线程安全**：`T: Send` 时池满足 `Send + Sync`，可被任意线程并发借还；
/// - **后置条件**：[`acquire`](Self::acquire) 总是成功，返回的 [`Pooled`] 在 `Drop` 时自动归还。
///
/// # 设计权衡（Trade-offs）
/// - 突发负载下可能临时构造超过容量的对象，换取借出路径永不阻塞；
/// - 归还溢出以 `warn` 级别记录，持续出现说明容量配置偏小。
pub struct ObjectPool<T, H> {
    idle: ArrayQueue<T>,
    handler: H,
    metrics: PoolMetrics,
}

impl<T, H> ObjectPool<T, H>
where
    H: ObjectHandler<T>,
{
    /// 创建并预填充对象池，`capacity` 为 0 时按 1 处理。
    pub fn new(capacity: usize, handler: H) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let idle = ArrayQueue::new(capacity);
        let metrics = PoolMetrics::default();
        for _ in 0..capacity {
            if idle.push(handler.create()).is_err() {
                break;
            }
            metrics.created.fetch_add(1, Ordering::Relaxed);
        }
        Self {
            idle,
            handler,
            metrics,
        }
    }

    pub fn capacity(&self) -> usize {
        self.idle.capacity()
    }

    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// 借出一个对象。
    ///
    /// # 实现策略
    /// 1. 依次弹出空闲对象，校验失败的直接丢弃；
    /// 2. 队列为空时构造临时对象；
    /// 3. 借出前调用 `activate`。
    pub fn acquire(&self) -> Pooled<'_, T, H> {
        let mut object = loop {
            match self.idle.pop() {
                Some(object) if self.handler.validate(&object) => {
                    self.metrics.recycled.fetch_add(1, Ordering::Relaxed);
                    break object;
                }
                Some(_) => {
                    self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
                }
                None => {
                    self.metrics.created.fetch_add(1, Ordering::Relaxed);
                    self.metrics.intermediate.fetch_add(1, Ordering::Relaxed);
                    trace!(capacity = self.capacity(), "object pool exhausted, creating intermediate object");
                    break self.handler.create();
                }
            }
        };
        self.handler.activate(&mut object);
        Pooled {
            object: Some(object),
            pool: self,
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity(),
            idle: self.idle(),
            created: self.metrics.created.load(Ordering::Relaxed),
            intermediate: self.metrics.intermediate.load(Ordering::Relaxed),
            recycled: self.metrics.recycled.load(Ordering::Relaxed),
            discarded: self.metrics.discarded.load(Ordering::Relaxed),
        }
    }

    fn release(&self, mut object: T) {
        self.handler.passivate(&mut object);
        if self.idle.push(object).is_err() {
            self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
            warn!(capacity = self.capacity(), "object pool is full, dropping returned object");
        }
    }
}

impl<T, H> fmt::Debug for ObjectPool<T, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("capacity", &self.idle.capacity())
            .field("idle", &self.idle.len())
            .finish()
    }
}

/// 借出中的对象，`Drop` 时归还所属的池。
pub struct Pooled<'a, T, H>
where
    H: ObjectHandler<T>,
{
    object: Option<T>,
    pool: &'a ObjectPool<T, H>,
}

impl<T, H> Deref for Pooled<'_, T, H>
where
    H: ObjectHandler<T>,
{
    type Target = T;

    fn deref(&self) -> &T {
        match &self.object {
            Some(object) => object,
            None => unreachable!("pooled object is only taken during drop"),
        }
    }
}

impl<T, H> DerefMut for Pooled<'_, T, H>
where
    H: ObjectHandler<T>,
{
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.object {
            Some(object) => object,
            None => unreachable!("pooled object is only taken during drop"),
        }
    }
}

impl<T, H> Drop for Pooled<'_, T, H>
where
    H: ObjectHandler<T>,
{
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            self.pool.release(object);
        }
    }
}

/// 对象池统计快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub idle: usize,
    /// 累计构造次数，包含预填充与临时对象。
    pub created: usize,
    pub intermediate: usize,
    pub recycled: usize,
    /// 校验失败或归还溢出而丢弃的对象数。
    pub discarded: usize,
}

#[derive(Default)]
struct PoolMetrics {
    created: AtomicUsize,
    intermediate: AtomicUsize,
    recycled: AtomicUsize,
    discarded: AtomicUsize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct Counter {
        reject_next: AtomicBool,
    }

    impl ObjectHandler<Vec<u8>> for Counter {
        fn create(&self) -> Vec<u8> {
            Vec::with_capacity(8)
        }

        fn passivate(&self, object: &mut Vec<u8>) {
            object.clear();
        }

        fn validate(&self, _object: &Vec<u8>) -> bool {
            !self.reject_next.swap(false, Ordering::Relaxed)
        }
    }

    #[test]
    fn capacity_rounds_up_and_prefills() {
        let pool = ObjectPool::new(3, Counter::default());
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.idle(), 4);
        assert_eq!(pool.stats().created, 4);
    }

    #[test]
    fn returned_objects_are_passivated() {
        let pool = ObjectPool::new(1, Counter::default());
        {
            let mut lease = pool.acquire();
            lease.extend_from_slice(b"dirty");
        }
        let lease = pool.acquire();
        assert!(lease.is_empty());
        assert_eq!(pool.stats().recycled, 2);
    }

    #[test]
    fn exhaustion_creates_intermediate_objects_and_overflow_drops_them() {
        let pool = ObjectPool::new(1, Counter::default());
        let first = pool.acquire();
        let second = pool.acquire();
        assert_eq!(pool.stats().intermediate, 1);
        drop(first);
        drop(second);
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.discarded, 1);
    }

    #[test]
    fn invalid_objects_are_replaced() {
        let pool = ObjectPool::new(1, Counter::default());
        pool.handler().reject_next.store(true, Ordering::Relaxed);
        let _lease = pool.acquire();
        let stats = pool.stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.intermediate, 1);
    }
}
