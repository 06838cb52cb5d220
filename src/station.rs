//! 站点模型
//!
//! 所有站点种类收敛到一个枚举，派发逻辑集中在一张 match 表里。
//! 除 I/O 类与合成站外，派发是 (held, links) 的纯函数。

use std::fmt;
use std::io;

use crate::env::Environment;
use crate::expr::Definition;

/// 站点种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StationKind {
    Nop,
    Create,
    Dot,
    Duplicate,
    Decrement,
    Split,
    ByteIn,
    ByteOut,
    ByteErr,
    NumIn,
    NumOut,
    Halt,
    Pause,
    /// 用户定义站：`def` 为定义表下标
    Synthetic { def: u32, symbol: char },
}

/// postTick 阶段的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostTick {
    Continue,
    Halt,
    /// 挂起若干时间单位
    Pause(u64),
}

impl StationKind {
    /// 内置站点字形
    pub const BUILTIN_GLYPHS: [char; 13] =
        ['0', '@', '.', 'O', 'o', '%', '?', '!', '&', '_', ';', 'Q', '`'];

    pub fn from_glyph(ch: char) -> Option<Self> {
        let kind = match ch {
            '0' => StationKind::Nop,
            '@' => StationKind::Create,
            '.' => StationKind::Dot,
            'O' => StationKind::Duplicate,
            'o' => StationKind::Decrement,
            '%' => StationKind::Split,
            '?' => StationKind::ByteIn,
            '!' => StationKind::ByteOut,
            '&' => StationKind::ByteErr,
            '_' => StationKind::NumIn,
            ';' => StationKind::NumOut,
            'Q' => StationKind::Halt,
            '`' => StationKind::Pause,
            _ => return None,
        };
        Some(kind)
    }

    pub fn glyph(&self) -> char {
        match self {
            StationKind::Nop => '0',
            StationKind::Create => '@',
            StationKind::Dot => '.',
            StationKind::Duplicate => 'O',
            StationKind::Decrement => 'o',
            StationKind::Split => '%',
            StationKind::ByteIn => '?',
            StationKind::ByteOut => '!',
            StationKind::ByteErr => '&',
            StationKind::NumIn => '_',
            StationKind::NumOut => ';',
            StationKind::Halt => 'Q',
            StationKind::Pause => '`',
            StationKind::Synthetic { symbol, .. } => *symbol,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StationKind::Nop => "nop",
            StationKind::Create => "create",
            StationKind::Dot => "dot",
            StationKind::Duplicate => "duplicate",
            StationKind::Decrement => "decrement",
            StationKind::Split => "split",
            StationKind::ByteIn => "byte-in",
            StationKind::ByteOut => "byte-out",
            StationKind::ByteErr => "byte-err",
            StationKind::NumIn => "num-in",
            StationKind::NumOut => "num-out",
            StationKind::Halt => "halt",
            StationKind::Pause => "pause",
            StationKind::Synthetic { .. } => "synthetic",
        }
    }

    /// tick 阶段：计算派发量
    ///
    /// Args:
    ///     held: 所在组的快照总量
    ///     links: 组的链接数（含重复边）
    ///     defs: 合成站定义表
    ///     env: I/O 通道
    ///
    /// Returns:
    ///     发往每条链接的 token 数
    pub fn dispatch(
        &self,
        held: u64,
        links: usize,
        defs: &[Definition],
        env: &mut Environment,
    ) -> io::Result<u64> {
        let amount = match *self {
            StationKind::Nop | StationKind::Halt | StationKind::Pause => 0,
            StationKind::Create => u64::from(held == 0),
            StationKind::Dot => u64::from(held > 0),
            StationKind::Duplicate => held,
            StationKind::Decrement => held.saturating_sub(1),
            StationKind::Split => {
                if links > 0 {
                    held / links as u64
                } else {
                    0
                }
            }
            StationKind::ByteOut | StationKind::ByteErr | StationKind::NumOut => {
                if held > 0 {
                    let channel = if *self == StationKind::ByteErr {
                        env.error()
                    } else {
                        env.output()
                    };
                    if *self == StationKind::NumOut {
                        channel.write_text(&held.to_string())?;
                    } else {
                        channel.write_byte((held % 256) as u8)?;
                    }
                }
                0
            }
            StationKind::ByteIn => {
                if held > 0 {
                    env.input().read_byte()?.map_or(0, u64::from)
                } else {
                    0
                }
            }
            StationKind::NumIn => env
                .input()
                .read_integer()?
                .map_or(0, |v| u64::try_from(v).unwrap_or(0)),
            StationKind::Synthetic { def, .. } => {
                let n = i64::try_from(held).unwrap_or(i64::MAX);
                let k = i64::try_from(links).unwrap_or(i64::MAX);
                defs.get(def as usize)
                    .map_or(0, |d| u64::try_from(d.calculate(n, k)).unwrap_or(0))
            }
        };
        Ok(amount)
    }

    /// postTick 阶段：Halt / Pause 的收尾动作
    pub fn post_tick(&self, held: u64) -> PostTick {
        match self {
            StationKind::Halt if held > 0 => PostTick::Halt,
            StationKind::Pause if held > 0 => PostTick::Pause(held),
            _ => PostTick::Continue,
        }
    }
}

impl fmt::Display for StationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.name(), self.glyph())
    }
}
