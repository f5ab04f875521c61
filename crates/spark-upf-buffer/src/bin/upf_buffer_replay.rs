//! 缓冲核心回放工具。
//!
//! # 设计背景（Why）
//! - 在没有宿主流水线的环境下复现缓冲、放行与旁路背压的端到端行为，便于调参与回归观察；
//! - 日志经由 `tracing-subscriber` 输出，过滤级别取自 `RUST_LOG`，缺省为 `info`；
//!   需启用 `replay` feature 构建：`cargo run --features replay --bin upf_buffer_replay`。
//!
//! # 用法（How）
//! ```text
//! upf_buffer_replay [--config buffer.toml] [--commands commands.toml]
//! ```
//! - `--config`：缓冲模块配置，缺省为内置默认值；
//! - `--commands`：以 `[[commands]]` 列出的控制面命令，在内置场景之前依次执行。

use std::env;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Context, bail};
use serde::Deserialize;
use spark_upf_buffer::{
    BufferConfig, BufferModule, Command, Downstream, Packet, SessionId, Upstream,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct Args {
    config: Option<String>,
    commands: Option<String>,
}

#[derive(Deserialize)]
struct CommandScript {
    #[serde(default)]
    commands: Vec<Command>,
}

/// 统计转发量的下游。
#[derive(Default)]
struct CountingSink {
    forwarded: AtomicU64,
}

impl Downstream<Packet> for CountingSink {
    fn forward(&self, batch: Vec<Packet>) {
        self.forwarded
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
    }
}

/// 记录过载状态的上游。
#[derive(Default)]
struct LatchedUpstream {
    overloaded: AtomicBool,
}

impl Upstream for LatchedUpstream {
    fn signal_overload(&self) {
        self.overloaded.store(true, Ordering::Relaxed);
    }

    fn clear_overload(&self) {
        self.overloaded.store(false, Ordering::Relaxed);
    }
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(iter.next().context("--config expects a path")?),
            "--commands" => {
                args.commands = Some(iter.next().context("--commands expects a path")?)
            }
            other => bail!("unknown argument `{other}`"),
        }
    }
    Ok(args)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => BufferConfig::from_path(path)
            .with_context(|| format!("failed to load buffer config from {path}"))?,
        None => BufferConfig::default(),
    };

    let sink = Arc::new(CountingSink::default());
    let upstream = Arc::new(LatchedUpstream::default());
    let module = BufferModule::new(config, Arc::clone(&sink), Arc::clone(&upstream))
        .context("failed to build buffer module")?;

    if let Some(path) = &args.commands {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read command script {path}"))?;
        let script: CommandScript =
            toml::from_str(&text).with_context(|| format!("invalid command script {path}"))?;
        for command in script.commands {
            let response = module.handle_command(command);
            info!(?response, "command applied");
        }
    }

    replay_release(&module, &sink);
    replay_bypass_pressure(&module, &upstream);
    replay_resize(&module)?;

    let stats = module.stats();
    info!(?stats, "replay finished");
    module.shutdown();
    Ok(())
}

/// 单会话缓冲后放行：三包原序转发，仅上报一次。
fn replay_release(module: &BufferModule<Packet>, sink: &CountingSink) {
    let session = SessionId::new(7);
    module.add_session(session);
    module.process_batch((0..3u8).map(|i| Packet::tagged(session, vec![i])));
    module.release_session(session);
    let before = sink.forwarded.load(Ordering::Relaxed);
    let result = module.run_task();
    info!(
        packets = result.packets,
        forwarded = sink.forwarded.load(Ordering::Relaxed) - before,
        "release scenario"
    );
}

/// 无会话报文灌满旁路队列，观察高水位信号与尾部丢弃。
fn replay_bypass_pressure(module: &BufferModule<Packet>, upstream: &LatchedUpstream) {
    let burst = module.queue().capacity() * 2;
    let outcome = module.process_batch((0..burst).map(|i| Packet::untagged(vec![(i % 251) as u8])));
    info!(
        bypassed = outcome.bypassed,
        dropped = outcome.dropped,
        overloaded = upstream.overloaded.load(Ordering::Relaxed),
        "bypass pressure scenario"
    );
    while !module.run_task().block {}
    info!(
        overloaded = upstream.overloaded.load(Ordering::Relaxed),
        "bypass queue drained"
    );
}

/// 在队报文不丢失地扩容。
fn replay_resize(module: &BufferModule<Packet>) -> anyhow::Result<()> {
    let queued = module.queue().capacity() / 2;
    module.process_batch((0..queued).map(|_| Packet::untagged(vec![0u8])));
    let target = module.queue().capacity() * 2;
    let dropped = module
        .resize_queue(target)
        .with_context(|| format!("failed to resize bypass queue to {target}"))?;
    let watermarks = module.queue().watermarks();
    info!(
        capacity = target,
        occupancy = module.queue().occupancy(),
        dropped,
        high = watermarks.high,
        low = watermarks.low,
        "resize scenario"
    );
    Ok(())
}
