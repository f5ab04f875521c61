//! 与宿主流水线的出口契约。
//!
//! - [`Downstream`]：调度任务把放行的会话缓冲与旁路报文批量交给下游；
//! - [`Upstream`]：旁路队列越过水位时通知上游限速或恢复。
//!
//! 两者都在调度/分类线程上同步调用，实现不得阻塞；`Upstream` 的回调在旁路队列的压力闸内执行，
//! 阻塞会让另一侧的水位观测一同等待。

use std::sync::Arc;

use tracing::info;

use crate::metrics::BufferMetrics;
use crate::queue::{OverflowQueue, OverloadEdge, PressureReading};

/// 下游转发出口。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `forward` 取得整批报文的所有权，按给定顺序发送；
///   - `is_overloaded` 为 `true` 时调度任务本周期不出队旁路报文，返回阻塞结果；
/// - **风险 (Trade-offs)**：放行的会话缓冲不受 `is_overloaded` 约束，放行是控制面的显式指令。
pub trait Downstream<P>: Send + Sync {
    fn forward(&self, batch: Vec<P>);

    fn is_overloaded(&self) -> bool {
        false
    }
}

/// 上游过载信号出口。
pub trait Upstream: Send + Sync {
    fn signal_overload(&self);

    fn clear_overload(&self);
}

impl<P, D> Downstream<P> for Arc<D>
where
    D: Downstream<P> + ?Sized,
{
    fn forward(&self, batch: Vec<P>) {
        (**self).forward(batch)
    }

    fn is_overloaded(&self) -> bool {
        (**self).is_overloaded()
    }
}

impl<U> Upstream for Arc<U>
where
    U: Upstream + ?Sized,
{
    fn signal_overload(&self) {
        (**self).signal_overload()
    }

    fn clear_overload(&self) {
        (**self).clear_overload()
    }
}

/// 不接收过载信号的上游，适用于没有上游阶段的部署。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopUpstream;

impl Upstream for NoopUpstream {
    fn signal_overload(&self) {}

    fn clear_overload(&self) {}
}

/// 观测旁路队列水位，并在同一压力闸内把过载边沿转达给上游；分类线程与调度任务共用。
pub(crate) fn propagate_pressure<T: Send>(
    queue: &OverflowQueue<T>,
    upstream: &dyn Upstream,
    metrics: &BufferMetrics,
) -> PressureReading {
    queue.observe_pressure_with(|reading| {
        deliver_edge(reading, upstream, metrics);
        *reading
    })
}

fn deliver_edge(reading: &PressureReading, upstream: &dyn Upstream, metrics: &BufferMetrics) {
    match reading.edge {
        Some(OverloadEdge::Raised) => {
            metrics.record_overload_raised();
            info!(
                occupancy = reading.occupancy,
                high = reading.watermarks.high,
                "bypass queue above high watermark, signalling upstream"
            );
            upstream.signal_overload();
        }
        Some(OverloadEdge::Cleared) => {
            metrics.record_overload_cleared();
            info!(
                occupancy = reading.occupancy,
                low = reading.watermarks.low,
                "bypass queue drained to low watermark, clearing upstream overload"
            );
            upstream.clear_overload();
        }
        None => {}
    }
}
