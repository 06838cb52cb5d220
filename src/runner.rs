//! 自动运行循环
//!
//! 反复调用 `Program::step()`，每个 tick 之前轮询取消令牌、停机标志与
//! tick 上限。tick 间延迟切片睡眠，延迟期间同样响应取消。

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::env::CancelToken;
use crate::error::RuntimeError;
use crate::program::{EngineState, Program};

/// 运行参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Pause 站每个 token 的挂起时长
    pub pause_unit: Duration,
    /// 最多执行的 tick 数；None 表示不限
    pub tick_limit: Option<u64>,
    /// 相邻两个 tick 之间的延迟
    pub tick_delay: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            pause_unit: Duration::from_millis(1),
            tick_limit: None,
            tick_delay: Duration::ZERO,
        }
    }
}

/// 运行结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Halted { ticks: u64 },
    Cancelled { ticks: u64 },
    TickLimit { ticks: u64 },
}

impl RunOutcome {
    pub fn ticks(&self) -> u64 {
        match *self {
            RunOutcome::Halted { ticks }
            | RunOutcome::Cancelled { ticks }
            | RunOutcome::TickLimit { ticks } => ticks,
        }
    }
}

const DELAY_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: RunConfig,
}

impl Runner {
    pub fn new(config: RunConfig) -> Self {
        Runner { config }
    }

    /// 运行到停机、取消或 tick 上限
    ///
    /// 未开始的程序先执行一次初始化 step（只 reset，不计 tick）。
    ///
    /// Errors:
    ///     RuntimeError: I/O 通道故障；程序已停机
    pub fn run(&self, program: &mut Program) -> Result<RunOutcome, RuntimeError> {
        program.set_pause_unit(self.config.pause_unit);
        let cancel = program.cancel_token();
        let started = Instant::now();

        let outcome = loop {
            let ticks = program.tick_count();
            // 被取消打断的 Pause 也会停机，先判取消
            if cancel.is_cancelled() {
                break RunOutcome::Cancelled { ticks };
            }
            if program.is_halted() {
                break RunOutcome::Halted { ticks };
            }
            if self.config.tick_limit.is_some_and(|limit| ticks >= limit) {
                break RunOutcome::TickLimit { ticks };
            }

            let ticked = program.state() != EngineState::Created;
            program.step()?;
            if ticked && !self.config.tick_delay.is_zero() && !program.is_halted() {
                self.delay(&cancel);
            }
        };

        info!(
            program = %program.name(),
            ?outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        Ok(outcome)
    }

    fn delay(&self, cancel: &CancelToken) {
        let deadline = Instant::now() + self.config.tick_delay;
        loop {
            if cancel.is_cancelled() {
                debug!("tick delay interrupted by cancellation");
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(DELAY_SLICE));
        }
    }
}
