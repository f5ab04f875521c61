//! 集成测试共用的下游、上游与上报替身。

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use spark_upf_buffer::{
    BufferConfig, BufferModule, ControlPlaneNotifier, Downstream, NotifierError, Packet,
    SessionReport, Upstream,
};

/// 记录每次转发批次的下游，过载状态可由测试切换。
#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<Packet>>>,
    overloaded: AtomicBool,
}

impl RecordingSink {
    pub fn set_overloaded(&self, overloaded: bool) {
        self.overloaded.store(overloaded, Ordering::Relaxed);
    }

    pub fn take_batches(&self) -> Vec<Vec<Packet>> {
        std::mem::take(&mut *self.batches.lock())
    }
}

impl Downstream<Packet> for RecordingSink {
    fn forward(&self, batch: Vec<Packet>) {
        self.batches.lock().push(batch);
    }

    fn is_overloaded(&self) -> bool {
        self.overloaded.load(Ordering::Relaxed)
    }
}

/// 统计过载边沿的上游。
#[derive(Default)]
pub struct EdgeCounter {
    pub raised: AtomicUsize,
    pub cleared: AtomicUsize,
}

impl EdgeCounter {
    pub fn raised(&self) -> usize {
        self.raised.load(Ordering::Relaxed)
    }

    pub fn cleared(&self) -> usize {
        self.cleared.load(Ordering::Relaxed)
    }
}

impl Upstream for EdgeCounter {
    fn signal_overload(&self) {
        self.raised.fetch_add(1, Ordering::Relaxed);
    }

    fn clear_overload(&self) {
        self.cleared.fetch_add(1, Ordering::Relaxed);
    }
}

/// 发出过载信号前停顿的上游，拉长锁存器翻转与信号送达之间的窗口。
pub struct SlowUpstream {
    delay: Duration,
    entered: AtomicBool,
    overloaded: AtomicBool,
    edges: EdgeCounter,
}

impl SlowUpstream {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            entered: AtomicBool::new(false),
            overloaded: AtomicBool::new(false),
            edges: EdgeCounter::default(),
        }
    }

    /// 是否已有线程进入 `signal_overload`。
    pub fn entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }

    /// 上游最后一次收到的信号是否为过载。
    pub fn is_overloaded(&self) -> bool {
        self.overloaded.load(Ordering::Acquire)
    }

    pub fn edges(&self) -> &EdgeCounter {
        &self.edges
    }
}

impl Upstream for SlowUpstream {
    fn signal_overload(&self) {
        self.entered.store(true, Ordering::Release);
        thread::sleep(self.delay);
        self.overloaded.store(true, Ordering::Release);
        self.edges.signal_overload();
    }

    fn clear_overload(&self) {
        self.overloaded.store(false, Ordering::Release);
        self.edges.clear_overload();
    }
}

/// 记录上报内容的传输替身。
#[derive(Default)]
pub struct RecordingNotifier {
    reports: Mutex<Vec<SessionReport>>,
}

impl RecordingNotifier {
    pub fn reports(&self) -> Vec<SessionReport> {
        self.reports.lock().clone()
    }
}

impl ControlPlaneNotifier for RecordingNotifier {
    fn send(&self, report: &SessionReport) -> Result<(), NotifierError> {
        self.reports.lock().push(*report);
        Ok(())
    }
}

pub struct Harness {
    pub module: BufferModule<Packet>,
    pub sink: Arc<RecordingSink>,
    pub upstream: Arc<EdgeCounter>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(config: BufferConfig) -> Self {
        let sink = Arc::new(RecordingSink::default());
        let upstream = Arc::new(EdgeCounter::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let module = BufferModule::new(config, Arc::clone(&sink), Arc::clone(&upstream))
            .expect("测试配置应合法");
        module.install_notifier(Arc::clone(&notifier));
        Self {
            module,
            sink,
            upstream,
            notifier,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(BufferConfig::default())
    }
}

/// 以负载首字节作为报文编号。
pub fn tags(batch: &[Packet]) -> Vec<u8> {
    batch.iter().map(|packet| packet.payload()[0]).collect()
}
