//! 编译产物与执行引擎
//!
//! - `arena`: 站点/绑定组存储
//! - `engine`: Program 与三阶段 tick
//! - `monitor`: 跨线程只读监视

pub mod arena;
pub mod engine;
pub mod monitor;

pub use arena::{BoundGroup, GroupId, Station, StationArena, StationId};
pub use engine::{EngineState, Program, StationView};
pub use monitor::Monitor;
