//! DroneGrid Rust Backend - 二维网格语言的编译器与执行引擎
//!
//! 源码是一张 ASCII 网格：站点字形持有离散 token（drone），隧道与光圈
//! 在站点之间连线，执行按同步 tick 推进。
//!
//! ```text
//! 源码 ──Grid──> 网格 ──ZoneMap──> 区域 ──topology──> StationArena ──> Program
//!                 └── 透镜 ──Definition──> 合成站 ─────────┘
//! ```

pub mod compiler;
pub mod env;
pub mod error;
pub mod expr;
pub mod grid;
pub mod program;
pub mod runner;
pub mod station;
pub mod topology;
pub mod zone;

#[cfg(feature = "python")]
mod python;

pub use compiler::compile;
pub use env::{
    BufferInput, BufferOutput, BufferPrinter, CancelToken, Environment, Input, NullInput,
    NullOutput, Output, Printer, StderrOutput, StdinInput, StdoutOutput, TracingPrinter,
};
pub use error::{CompileError, CompileErrorKind, CompileResult, RuntimeError, Section};
pub use expr::Definition;
pub use grid::{Direction, Grid, Position};
pub use program::{EngineState, Monitor, Program, StationView};
pub use runner::{RunConfig, RunOutcome, Runner};
pub use station::StationKind;
pub use zone::{Zone, ZoneMap};
