//! 原子与内部可变性的 Loom 适配层。
//!
//! - 常规构建使用标准库原子与 `core::cell::UnsafeCell`；
//! - 启用 `--cfg loom`（或 `spark_loom`）时切换到 `loom` 提供的同名类型，使环形队列可被模型检查穷举交错。
//! - `UnsafeCell` 统一暴露 `with_mut` 闭包接口，与 `loom::cell::UnsafeCell` 保持一致。

#[cfg(not(any(loom, spark_loom)))]
pub(crate) use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(any(loom, spark_loom))]
pub(crate) use loom::sync::atomic::{AtomicU64, Ordering};

#[cfg(any(loom, spark_loom))]
pub(crate) use loom::cell::UnsafeCell;

#[cfg(not(any(loom, spark_loom)))]
#[derive(Debug)]
pub(crate) struct UnsafeCell<T>(core::cell::UnsafeCell<T>);

#[cfg(not(any(loom, spark_loom)))]
impl<T> UnsafeCell<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(core::cell::UnsafeCell::new(value))
    }

    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
        f(self.0.get())
    }
}

/// 自旋等待前驱生产者发布。Loom 下必须让出调度，否则模型无法推进。
#[inline]
pub(crate) fn spin_wait() {
    #[cfg(not(any(loom, spark_loom)))]
    std::hint::spin_loop();
    #[cfg(any(loom, spark_loom))]
    loom::thread::yield_now();
}
