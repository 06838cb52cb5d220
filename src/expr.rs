//! 合成站表达式
//!
//! 定义语法：`symbol '=' expr`，expr 为后缀表达式，操作数 `N`（持有量）、
//! `K`（链接数）、整数字面量，运算符 `+ - * / =`。
//!
//! 表达式节点按后缀顺序存放在一个 Vec 里：子节点总在父节点之前，
//! 因此顺序扫描一遍即可求值，不需要递归。

use std::fmt;

use crate::error::{CompileError, CompileResult};
use crate::grid::Position;
use crate::topology::is_reserved;

pub type ExprId = u32;

/// 二元运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
}

impl BinOp {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(BinOp::Add),
            '-' => Some(BinOp::Sub),
            '*' => Some(BinOp::Mul),
            '/' => Some(BinOp::Div),
            '=' => Some(BinOp::Eq),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
            BinOp::Eq => '=',
        }
    }

    /// 除零得 0；溢出按补码回绕
    #[inline]
    pub fn apply(self, lhs: i64, rhs: i64) -> i64 {
        match self {
            BinOp::Add => lhs.wrapping_add(rhs),
            BinOp::Sub => lhs.wrapping_sub(rhs),
            BinOp::Mul => lhs.wrapping_mul(rhs),
            BinOp::Div if rhs == 0 => 0,
            BinOp::Div => lhs.wrapping_div(rhs),
            BinOp::Eq => i64::from(lhs == rhs),
        }
    }
}

/// 表达式节点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expr {
    /// 持有的 token 数
    N,
    /// 链接数
    K,
    Literal(i64),
    BinaryOp { op: BinOp, lhs: ExprId, rhs: ExprId },
}

/// 合成站定义：符号 + 表达式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    symbol: char,
    nodes: Vec<Expr>,
}

impl Definition {
    /// 解析透镜原文 `s = expr`
    ///
    /// Args:
    ///     text: 透镜内部文本
    ///     at: 文本首字符在网格中的位置（用于报错）
    ///
    /// Errors:
    ///     DefinitionError: 符号非法、缺少 `=`、未知记号、操作数过多/不足
    pub fn parse(text: &str, at: Position) -> CompileResult<Self> {
        let chars: Vec<char> = text.chars().collect();
        let pos_of = |i: usize| Position::new(at.col + i, at.row);

        let mut i = skip_whitespace(&chars, 0);
        let symbol = *chars
            .get(i)
            .ok_or_else(|| CompileError::definition(at, "empty definition"))?;
        if is_reserved(symbol) {
            return Err(CompileError::definition(
                pos_of(i),
                format!("'{symbol}' is a reserved glyph"),
            ));
        }

        i = skip_whitespace(&chars, i + 1);
        if chars.get(i) != Some(&'=') {
            return Err(CompileError::definition(
                pos_of(i.min(chars.len())),
                format!("expected '=' after symbol '{symbol}'"),
            ));
        }

        let nodes = compile_postfix(&chars, i + 1, pos_of)?;
        Ok(Definition { symbol, nodes })
    }

    #[inline]
    pub fn symbol(&self) -> char {
        self.symbol
    }

    /// 根节点（后缀序的最后一个）
    #[inline]
    pub fn root(&self) -> ExprId {
        (self.nodes.len() - 1) as ExprId
    }

    #[inline]
    pub fn node(&self, id: ExprId) -> Option<&Expr> {
        self.nodes.get(id as usize)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 求值（纯函数）
    ///
    /// Args:
    ///     n: 站点（所在组）持有的 token 数
    ///     k: 链接数
    pub fn calculate(&self, n: i64, k: i64) -> i64 {
        let mut values: Vec<i64> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let value = match *node {
                Expr::N => n,
                Expr::K => k,
                Expr::Literal(v) => v,
                Expr::BinaryOp { op, lhs, rhs } => {
                    op.apply(values[lhs as usize], values[rhs as usize])
                }
            };
            values.push(value);
        }
        values.last().copied().unwrap_or(0)
    }
}

/// 规范后缀形式：`a = N K + 10 *`
impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} =", self.symbol)?;
        for node in &self.nodes {
            match node {
                Expr::N => f.write_str(" N")?,
                Expr::K => f.write_str(" K")?,
                Expr::Literal(v) => write!(f, " {v}")?,
                Expr::BinaryOp { op, .. } => write!(f, " {}", op.symbol())?,
            }
        }
        Ok(())
    }
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

/// 操作数栈归约：遇到运算符弹出两个（先入为左，后入为右）
fn compile_postfix(
    chars: &[char],
    start: usize,
    pos_of: impl Fn(usize) -> Position,
) -> CompileResult<Vec<Expr>> {
    let mut nodes: Vec<Expr> = Vec::new();
    let mut stack: Vec<ExprId> = Vec::new();
    let mut i = start;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let node = if c.is_ascii_digit() {
            let begin = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits: String = chars[begin..i].iter().collect();
            let value = digits
                .parse::<i64>()
                .map_err(|_| {
                    CompileError::definition(
                        pos_of(begin),
                        format!("literal {digits} is out of range"),
                    )
                })?;
            Expr::Literal(value)
        } else {
            i += 1;
            match c {
                'N' => Expr::N,
                'K' => Expr::K,
                _ => {
                    let op = BinOp::from_char(c).ok_or_else(|| {
                        CompileError::definition(
                            pos_of(i - 1),
                            format!("unexpected character '{c}'"),
                        )
                    })?;
                    let (Some(rhs), Some(lhs)) = (stack.pop(), stack.pop()) else {
                        return Err(CompileError::definition(pos_of(i - 1), "not enough operands"));
                    };
                    Expr::BinaryOp { op, lhs, rhs }
                }
            }
        };

        stack.push(nodes.len() as ExprId);
        nodes.push(node);
    }

    match stack.len() {
        1 => Ok(nodes),
        0 => Err(CompileError::definition(pos_of(start), "not enough operands")),
        _ => Err(CompileError::definition(pos_of(start), "too many operands")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorKind;

    fn def(text: &str) -> Definition {
        Definition::parse(text, Position::new(0, 0)).unwrap()
    }

    fn err(text: &str) -> CompileError {
        Definition::parse(text, Position::new(10, 2)).unwrap_err()
    }

    #[test]
    fn test_sum_times_ten() {
        let d = def("a = N K + 10 *");
        assert_eq!(d.symbol(), 'a');
        assert_eq!(d.calculate(3, 4), 70);
    }

    #[test]
    fn test_division_by_zero_is_zero() {
        assert_eq!(def("z=8 0 /").calculate(0, 0), 0);
        assert_eq!(def("z=N K /").calculate(9, 0), 0);
        assert_eq!(def("z=N K /").calculate(9, 2), 4);
    }

    #[test]
    fn test_operand_order() {
        // 先入为左
        assert_eq!(def("s = 10 3 -").calculate(0, 0), 7);
        assert_eq!(def("s = 3 10 -").calculate(0, 0), -7);
    }

    #[test]
    fn test_equality() {
        let d = def("e = N K =");
        assert_eq!(d.calculate(2, 2), 1);
        assert_eq!(d.calculate(2, 3), 0);
    }

    #[test]
    fn test_tokens_without_spaces() {
        assert_eq!(def("b=NK+").calculate(1, 2), 3);
        assert_eq!(def("c=12 3*").calculate(0, 0), 36);
    }

    #[test]
    fn test_wrapping_arithmetic() {
        let d = def("w = N N *");
        assert_eq!(d.calculate(i64::MAX, 0), i64::MAX.wrapping_mul(i64::MAX));
    }

    #[test]
    fn test_display_is_canonical_postfix() {
        assert_eq!(def("a=NK+10*").to_string(), "a = N K + 10 *");
    }

    #[test]
    fn test_arena_shape() {
        let d = def("a = N K +");
        assert_eq!(d.len(), 3);
        assert_eq!(d.root(), 2);
        assert_eq!(
            d.node(2),
            Some(&Expr::BinaryOp { op: BinOp::Add, lhs: 0, rhs: 1 })
        );
    }

    #[test]
    fn test_not_enough_operands() {
        let e = err("a = N +");
        assert_eq!(e.kind, CompileErrorKind::Definition);
        assert!(e.message.contains("not enough"));
        assert_eq!(e.position, Position::new(16, 2));

        assert!(err("a =").message.contains("not enough"));
    }

    #[test]
    fn test_too_many_operands() {
        assert!(err("a = N K 1 +").message.contains("too many"));
    }

    #[test]
    fn test_reserved_symbol() {
        assert!(err("@ = 1").message.contains("reserved"));
        assert!(err("- = 1").message.contains("reserved"));
    }

    #[test]
    fn test_missing_equals() {
        let e = err("a 1 2 +");
        assert!(e.message.contains("expected '='"));
        assert_eq!(e.position, Position::new(12, 2));
    }

    #[test]
    fn test_unknown_token() {
        let e = err("a = N x +");
        assert!(e.message.contains("'x'"));
        assert_eq!(e.position, Position::new(16, 2));
    }

    #[test]
    fn test_literal_overflow() {
        assert!(err("a = 99999999999999999999").message.contains("out of range"));
    }
}
