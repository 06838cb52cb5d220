//! 字符网格
//!
//! 把参差不齐的源码行补齐成矩形字符矩阵，并处理两类括号区域：
//! - 气泡 `(...)`：注释，整段在可执行网格中置空
//! - 透镜 `((s=expr))`：合成站定义，原文交给表达式编译器
//!
//! 两者都按行匹配，不跨行。

use std::cmp::Ordering;
use std::fmt;

use crate::error::{CompileError, CompileResult};

pub const BLANK: char = ' ';

/// 网格坐标 (column, row)，从 0 开始
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub col: usize,
    pub row: usize,
}

impl Position {
    pub const fn new(col: usize, row: usize) -> Self {
        Position { col, row }
    }
}

/// 行优先顺序
impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.row, self.col).cmp(&(other.row, other.col))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// 八个罗盘方向（顺时针，从北开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::N,
        Direction::NE,
        Direction::E,
        Direction::SE,
        Direction::S,
        Direction::SW,
        Direction::W,
        Direction::NW,
    ];

    /// (dx, dy)，y 轴向下
    #[inline]
    pub fn delta(self) -> (isize, isize) {
        match self {
            Direction::N => (0, -1),
            Direction::NE => (1, -1),
            Direction::E => (1, 0),
            Direction::SE => (1, 1),
            Direction::S => (0, 1),
            Direction::SW => (-1, 1),
            Direction::W => (-1, 0),
            Direction::NW => (-1, -1),
        }
    }

    #[inline]
    pub fn is_diagonal(self) -> bool {
        let (dx, dy) = self.delta();
        dx != 0 && dy != 0
    }
}

/// 透镜原文及其首个内部字符的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lens {
    pub text: String,
    pub position: Position,
}

/// 矩形字符网格
///
/// `raw` 保留原始字符（诊断用），`cells` 是可执行视图（气泡/透镜已置空）。
#[derive(Debug, Clone)]
pub struct Grid {
    cols: usize,
    rows: usize,
    raw: Vec<char>,
    cells: Vec<char>,
    masked: Vec<bool>,
    lenses: Vec<Lens>,
}

impl Grid {
    /// 从源码构建网格
    ///
    /// Errors:
    ///     SyntaxError: 未闭合或多余的括号、透镜内部出现括号
    pub fn build(source: &str) -> CompileResult<Self> {
        let lines: Vec<Vec<char>> = source
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).chars().collect())
            .collect();
        // 末尾换行不产生额外的空行
        let line_count = match lines.last() {
            Some(last) if last.is_empty() => lines.len() - 1,
            _ => lines.len(),
        };

        let cols = lines[..line_count].iter().map(Vec::len).max().unwrap_or(0);
        let rows = if cols == 0 { 0 } else { line_count };

        let mut raw = Vec::with_capacity(cols * rows);
        for line in &lines[..rows] {
            raw.extend_from_slice(line);
            raw.extend(std::iter::repeat(BLANK).take(cols - line.len()));
        }

        let mut grid = Grid {
            cols,
            rows,
            cells: raw.clone(),
            raw,
            masked: vec![false; cols * rows],
            lenses: Vec::new(),
        };
        for row in 0..rows {
            grid.scan_row(row)?;
        }
        Ok(grid)
    }

    /// 单行扫描：匹配气泡与透镜并置空
    fn scan_row(&mut self, row: usize) -> CompileResult<()> {
        let start = row * self.cols;
        let line: Vec<char> = self.raw[start..start + self.cols].to_vec();
        let mut col = 0;

        while col < self.cols {
            match line[col] {
                '(' if line.get(col + 1) == Some(&'(') => {
                    let end = lens_end(&line, col)
                        .map_err(|msg| CompileError::syntax(Position::new(col, row), msg))?;
                    self.lenses.push(Lens {
                        text: line[col + 2..end - 1].iter().collect(),
                        position: Position::new(col + 2, row),
                    });
                    self.mask(row, col, end);
                    col = end + 1;
                }
                '(' => {
                    let end = bubble_end(&line, col)
                        .ok_or_else(|| {
                            CompileError::syntax(Position::new(col, row), "unclosed bubble")
                        })?;
                    self.mask(row, col, end);
                    col = end + 1;
                }
                ')' => {
                    return Err(CompileError::syntax(Position::new(col, row), "unmatched ')'"));
                }
                _ => col += 1,
            }
        }
        Ok(())
    }

    fn mask(&mut self, row: usize, from: usize, to: usize) {
        for col in from..=to {
            let idx = row * self.cols + col;
            self.cells[idx] = BLANK;
            self.masked[idx] = true;
        }
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// 坐标转线性下标
    #[inline]
    pub fn index(&self, pos: Position) -> usize {
        pos.row * self.cols + pos.col
    }

    #[inline]
    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.col < self.cols && pos.row < self.rows
    }

    /// 可执行字符；越界返回 None
    #[inline]
    pub fn get(&self, pos: Position) -> Option<char> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(self.cells[self.index(pos)])
    }

    /// 原始字符（含注释内容）
    #[inline]
    pub fn raw(&self, pos: Position) -> Option<char> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(self.raw[self.index(pos)])
    }

    #[inline]
    pub fn is_masked(&self, pos: Position) -> bool {
        self.in_bounds(pos) && self.masked[self.index(pos)]
    }

    /// 返回 `pos + (dx, dy)`，仅当结果仍在网格内
    #[inline]
    pub fn offset(&self, pos: Position, dx: isize, dy: isize) -> Option<Position> {
        let col = pos.col.checked_add_signed(dx)?;
        let row = pos.row.checked_add_signed(dy)?;
        let next = Position::new(col, row);
        self.in_bounds(next).then_some(next)
    }

    #[inline]
    pub fn step(&self, pos: Position, dir: Direction) -> Option<Position> {
        let (dx, dy) = dir.delta();
        self.offset(pos, dx, dy)
    }

    /// 是否位于网格最外圈
    #[inline]
    pub fn on_border(&self, pos: Position) -> bool {
        pos.col == 0 || pos.row == 0 || pos.col + 1 == self.cols || pos.row + 1 == self.rows
    }

    /// 行优先遍历所有坐标
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.cols).map(move |col| Position::new(col, row)))
    }

    pub fn lenses(&self) -> &[Lens] {
        &self.lenses
    }
}

/// 透镜 `((...))` 的结束下标（第二个 `)`）
///
/// 内部出现任何括号、或行尾仍未闭合都是错误。
fn lens_end(line: &[char], open: usize) -> Result<usize, &'static str> {
    let mut col = open + 2;
    while col < line.len() {
        match line[col] {
            ')' if line.get(col + 1) == Some(&')') => return Ok(col + 1),
            '(' | ')' => return Err("parenthesis inside lens"),
            _ => col += 1,
        }
    }
    Err("unclosed lens")
}

/// 气泡的结束下标，内部括号按深度配平
fn bubble_end(line: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (col, &ch) in line.iter().enumerate().skip(open) {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(col);
                }
            }
            _ => {}
        }
    }
    None
}
