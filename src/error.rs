//! 错误类型
//!
//! 编译期错误一律 fail-fast：第一个错误即中止编译，并携带源码位置。
//! 运行期只有 I/O 故障一种（致命，程序随即停机）。

use std::fmt;
use std::io;

use thiserror::Error;

use crate::grid::Position;

/// 编译错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// 括号/透镜嵌套错误、未知字形
    Syntax,
    /// 区域边界不完整、嵌套或有歧义
    Zone,
    /// 光圈链无法到达目标
    Topology,
    /// 合成站定义表达式错误
    Definition,
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompileErrorKind::Syntax => "syntax error",
            CompileErrorKind::Zone => "zone error",
            CompileErrorKind::Topology => "topology error",
            CompileErrorKind::Definition => "definition error",
        };
        f.write_str(name)
    }
}

/// 错误所在的源码段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Header,
    Body,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Header => f.write_str("header"),
            Section::Body => f.write_str("body"),
        }
    }
}

/// 编译错误
#[derive(Debug, Clone, Error)]
#[error("{kind} in {section} at {position}: {message}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub section: Section,
    pub position: Position,
    pub message: String,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, position: Position, message: impl Into<String>) -> Self {
        CompileError {
            kind,
            section: Section::Body,
            position,
            message: message.into(),
        }
    }

    pub fn syntax(position: Position, message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Syntax, position, message)
    }

    pub fn zone(position: Position, message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Zone, position, message)
    }

    pub fn topology(position: Position, message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Topology, position, message)
    }

    pub fn definition(position: Position, message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Definition, position, message)
    }

    /// 标记错误来自 header 段
    pub fn in_section(mut self, section: Section) -> Self {
        self.section = section;
        self
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// 运行期错误
///
/// 只有外部 I/O 通道故障；出现即停机，不做恢复。
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("I/O failure at station {position}: {source}")]
    Io {
        position: Position,
        #[source]
        source: io::Error,
    },
}
