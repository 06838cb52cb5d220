//! 执行引擎
//!
//! 每个 tick 分三个阶段，每个阶段对所有组完成后才进入下一阶段：
//!
//! 1. preTick: `previous` 与 `current` 交换，`current` 清零
//! 2. tick: 每个组以 `previous` 求总量，成员派发到组的全部出边
//! 3. postTick: Halt / Pause 收尾
//!
//! tick 阶段只读 `previous`，因此站点的处理顺序不影响结果。

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::arena::{GroupId, StationArena, StationId};
use super::monitor::Monitor;
use crate::env::{CancelToken, Environment};
use crate::error::RuntimeError;
use crate::expr::Definition;
use crate::grid::{Grid, Position};
use crate::station::{PostTick, StationKind};
use crate::zone::ZoneMap;

/// Pause 睡眠切片上限，两个切片之间检查取消
const PAUSE_SLICE: Duration = Duration::from_millis(10);

/// 引擎生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// 刚编译完成，尚未 reset
    Created,
    /// 计数已清零，尚未 tick
    Ready,
    Ticked,
    /// 终态；只有 `reset()` 能离开
    Halted,
}

/// 站点快照（`Program::stations()` 的元素）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationView {
    pub id: StationId,
    pub position: Position,
    pub kind: StationKind,
    pub current: u64,
    pub group: GroupId,
}

/// 编译产物
///
/// 拓扑在编译后不可变；可变的只有计数缓冲、生命周期状态与运行环境。
pub struct Program {
    name: String,
    grid: Grid,
    zones: ZoneMap,
    arena: StationArena,
    definitions: Vec<Definition>,

    current: Vec<u64>,
    previous: Vec<u64>,
    state: EngineState,
    ticks: u64,

    env: Environment,
    pause_unit: Duration,
    monitor: Monitor,
}

impl Program {
    /// 由编译器调用
    pub(crate) fn new(
        name: impl Into<String>,
        grid: Grid,
        zones: ZoneMap,
        arena: StationArena,
        definitions: Vec<Definition>,
    ) -> Self {
        let stations = arena.len();
        Program {
            name: name.into(),
            grid,
            zones,
            arena,
            definitions,
            current: vec![0; stations],
            previous: vec![0; stations],
            state: EngineState::Created,
            ticks: 0,
            env: Environment::new(),
            pause_unit: Duration::from_millis(1),
            monitor: Monitor::new(stations),
        }
    }

    pub fn with_environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// 替换运行环境（下一次 `reset()` 会重置其通道）
    pub fn set_environment(&mut self, env: Environment) {
        self.env = env;
    }

    /// Pause 每个 token 对应的时长
    pub fn set_pause_unit(&mut self, unit: Duration) {
        self.pause_unit = unit;
    }

    pub fn pause_unit(&self) -> Duration {
        self.pause_unit
    }

    // =========================================================================
    // 生命周期
    // =========================================================================

    /// 清零全部计数、清除停机标志并重置 I/O 通道
    pub fn reset(&mut self) {
        self.current.iter_mut().for_each(|c| *c = 0);
        self.previous.iter_mut().for_each(|c| *c = 0);
        self.env.reset();
        self.ticks = 0;
        self.state = EngineState::Ready;
        self.publish();
        debug!(program = %self.name, "reset");
    }

    /// 推进一个 tick
    ///
    /// 首次调用只执行 `reset()`，不 tick；停机后不做任何事。
    ///
    /// Returns:
    ///     bool: 本次调用是否改变了任何站点的计数
    ///
    /// Errors:
    ///     RuntimeError::Io: I/O 通道故障；程序已停机
    pub fn step(&mut self) -> Result<bool, RuntimeError> {
        match self.state {
            EngineState::Created => {
                let changed = self.current.iter().any(|&c| c != 0);
                self.reset();
                return Ok(changed);
            }
            EngineState::Halted => return Ok(false),
            EngineState::Ready | EngineState::Ticked => {}
        }

        // preTick
        std::mem::swap(&mut self.current, &mut self.previous);
        self.current.iter_mut().for_each(|c| *c = 0);
        self.ticks += 1;
        self.state = EngineState::Ticked;

        // tick
        let mut actions: Vec<(Position, PostTick)> = Vec::new();
        let mut fault: Option<RuntimeError> = None;
        'groups: for group in self.arena.groups() {
            let held = group.total(&self.previous);
            let links = group.link_count();
            for &member in &group.members {
                let station = self.arena.station(member);
                let amount = match station
                    .kind
                    .dispatch(held, links, &self.definitions, &mut self.env)
                {
                    Ok(amount) => amount,
                    Err(source) => {
                        fault = Some(RuntimeError::Io {
                            position: station.position,
                            source,
                        });
                        break 'groups;
                    }
                };
                if amount > 0 {
                    for &target in &group.links {
                        let slot = &mut self.current[target as usize];
                        *slot = slot.saturating_add(amount);
                    }
                }
                match station.kind.post_tick(held) {
                    PostTick::Continue => {}
                    action => actions.push((station.position, action)),
                }
            }
        }

        if let Some(err) = fault {
            error!(program = %self.name, tick = self.ticks, %err, "I/O fault, halting");
            self.env.print(&format!("{}: {err}", self.name));
            self.enter_halt();
            return Err(err);
        }

        // postTick
        for (position, action) in actions {
            if self.state == EngineState::Halted {
                break;
            }
            match action {
                PostTick::Halt => {
                    info!(program = %self.name, tick = self.ticks, %position, "halted");
                    self.enter_halt();
                }
                PostTick::Pause(units) => self.pause(position, units),
                PostTick::Continue => {}
            }
        }

        let changed = self.current != self.previous;
        self.publish();
        Ok(changed)
    }

    /// 挂起 `units` 个时间单位；收到取消时提前返回并停机
    fn pause(&mut self, position: Position, units: u64) {
        let units = u32::try_from(units).unwrap_or(u32::MAX);
        // 溢出时视为无限期，只能被取消打断
        let deadline = Instant::now().checked_add(self.pause_unit.saturating_mul(units));
        loop {
            if self.env.is_cancelled() {
                warn!(program = %self.name, %position, "pause interrupted by cancellation");
                self.enter_halt();
                return;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return;
                    }
                    (deadline - now).min(PAUSE_SLICE)
                }
                None => PAUSE_SLICE,
            };
            std::thread::sleep(slice);
        }
    }

    fn enter_halt(&mut self) {
        self.env.halt();
        self.state = EngineState::Halted;
        self.publish();
    }

    fn publish(&self) {
        self.monitor
            .publish(&self.current, self.state == EngineState::Halted, self.ticks);
    }

    // =========================================================================
    // 调试注入与查询
    // =========================================================================

    /// 向 `position` 处的站点注入 token（写入 `current`）
    ///
    /// Returns:
    ///     Some(StationId): 被注入的站点；None: 该格没有站点
    pub fn inject(&mut self, position: Position, amount: u64) -> Option<StationId> {
        let id = self.arena.station_at(position)?;
        let slot = &mut self.current[id as usize];
        *slot = slot.saturating_add(amount);
        self.publish();
        Some(id)
    }

    /// 全部站点的当前快照（行优先顺序）
    pub fn stations(&self) -> impl Iterator<Item = StationView> + '_ {
        self.arena
            .stations()
            .iter()
            .enumerate()
            .map(move |(i, s)| StationView {
                id: i as StationId,
                position: s.position,
                kind: s.kind,
                current: self.current[i],
                group: s.group,
            })
    }

    pub fn count_at(&self, position: Position) -> Option<u64> {
        self.arena
            .station_at(position)
            .map(|id| self.current[id as usize])
    }

    pub fn count(&self, station: StationId) -> Option<u64> {
        self.current.get(station as usize).copied()
    }

    /// 组的当前总量
    pub fn group_total(&self, group: GroupId) -> Option<u64> {
        self.arena
            .groups()
            .get(group as usize)
            .map(|g| g.total(&self.current))
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state == EngineState::Halted
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn zones(&self) -> &ZoneMap {
        &self.zones
    }

    pub fn arena(&self) -> &StationArena {
        &self.arena
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// 当前环境的取消令牌（克隆后可交给其他线程）
    pub fn cancel_token(&self) -> CancelToken {
        self.env.cancel_token().clone()
    }

    /// 跨线程只读监视句柄
    pub fn monitor(&self) -> Monitor {
        self.monitor.clone()
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("stations", &self.arena.len())
            .field("groups", &self.arena.groups().len())
            .field("state", &self.state)
            .field("ticks", &self.ticks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::env::{BufferOutput, BufferPrinter, Output};
    use std::io;

    fn program(src: &str) -> Program {
        let mut program = compile("test", src, "").unwrap();
        assert!(!program.step().unwrap());
        program
    }

    #[test]
    fn test_first_step_only_resets() {
        let mut program = compile("test", "@-0", "").unwrap();
        assert_eq!(program.state(), EngineState::Created);
        assert!(!program.step().unwrap());
        assert_eq!(program.state(), EngineState::Ready);
        assert_eq!(program.tick_count(), 0);
    }

    #[test]
    fn test_create_feeds_nop() {
        let mut program = program("@-0");
        assert!(program.step().unwrap());
        // @ 与 0 双向相连：@ 发 1 给 0，0 不发
        assert_eq!(program.count_at(Position::new(2, 0)), Some(1));
        assert_eq!(program.count_at(Position::new(0, 0)), Some(0));
        assert_eq!(program.state(), EngineState::Ticked);
    }

    #[test]
    fn test_dot_sends_to_both_sides() {
        let mut program = program("0<.>0");
        assert_eq!(program.inject(Position::new(2, 0), 5), Some(1));
        assert!(program.step().unwrap());
        assert_eq!(program.count_at(Position::new(0, 0)), Some(1));
        assert_eq!(program.count_at(Position::new(4, 0)), Some(1));
        assert_eq!(program.count_at(Position::new(2, 0)), Some(0));
    }

    #[test]
    fn test_inject_unknown_position() {
        let mut program = program("0<.>0");
        assert_eq!(program.inject(Position::new(1, 0), 5), None);
    }

    #[test]
    fn test_group_members_each_dispatch() {
        let mut program = program("@@@-0");
        program.step().unwrap();
        assert_eq!(program.count_at(Position::new(4, 0)), Some(3));
        let group = program.arena().station(0).group;
        assert_eq!(program.group_total(group), Some(0));
    }

    #[test]
    fn test_halt_is_terminal() {
        let printer = BufferPrinter::new();
        let mut program = compile("halting", "@-Q", "")
            .unwrap()
            .with_environment(Environment::new().with_printer(printer.clone()));
        program.step().unwrap();
        program.step().unwrap();
        assert!(!program.is_halted());
        program.step().unwrap();
        assert!(program.is_halted());
        assert!(program.environment().is_halted());
        assert!(!program.step().unwrap());
        assert_eq!(program.tick_count(), 2);

        program.reset();
        assert_eq!(program.state(), EngineState::Ready);
        assert!(!program.environment().is_halted());
    }

    #[test]
    fn test_pause_interrupted_by_cancel() {
        let mut program = compile("pause", "@-`", "").unwrap();
        program.set_pause_unit(Duration::from_secs(60));
        program.step().unwrap();
        program.step().unwrap();

        program.cancel_token().cancel();
        let started = Instant::now();
        program.step().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(program.is_halted());
    }

    struct BrokenOutput;

    impl Output for BrokenOutput {
        fn reset(&mut self) {}

        fn write_byte(&mut self, _byte: u8) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn write_text(&mut self, _text: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_io_fault_halts() {
        let printer = BufferPrinter::new();
        let mut program = compile("faulty", "@-!", "").unwrap().with_environment(
            Environment::new()
                .with_output(BrokenOutput)
                .with_printer(printer.clone()),
        );
        program.step().unwrap();
        program.step().unwrap();
        let err = program.step().unwrap_err();
        match err {
            RuntimeError::Io { position, .. } => assert_eq!(position, Position::new(2, 0)),
        }
        assert!(program.is_halted());
        assert_eq!(printer.messages().len(), 1);
    }

    #[test]
    fn test_byte_out_writes() {
        let out = BufferOutput::new();
        let mut program = compile("out", "@-!", "")
            .unwrap()
            .with_environment(Environment::new().with_output(out.clone()));
        program.step().unwrap();
        // tick 1: ! 收到 1；tick 2: ! 持有 1 并输出字节 1
        program.step().unwrap();
        program.step().unwrap();
        assert_eq!(out.contents(), vec![1]);
    }

    #[test]
    fn test_monitor_matches_engine() {
        let mut program = program("@@@-0");
        let monitor = program.monitor();
        program.step().unwrap();
        let counts: Vec<u64> = program.stations().map(|v| v.current).collect();
        assert_eq!(monitor.counts(), counts);
        assert_eq!(monitor.ticks(), 1);
        assert!(!monitor.is_halted());
    }
}
