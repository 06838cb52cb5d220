//! 区域检测
//!
//! 围栏 `{~}`（Exclusion）与堡垒 `[=]`（Metropolis）各跑一遍：
//! 1. 字母表中的字形为墙
//! 2. 两遍扫描标注非墙连通块（4 邻接），前沿相遇时用并查集合并编号
//! 3. 触及网格边界的连通块视为开放空间，不构成区域
//! 4. 校验每个墙字形与区域的相对位置

use tracing::debug;

use crate::error::{CompileError, CompileResult};
use crate::grid::{Grid, Position};

/// 区域分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Zone {
    #[default]
    None,
    Exclusion,
    Metropolis,
}

/// 边界字母表：左角、横边、右角
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alphabet {
    pub left: char,
    pub horizontal: char,
    pub right: char,
    pub zone: Zone,
}

impl Alphabet {
    #[inline]
    pub fn contains(&self, ch: char) -> bool {
        ch == self.left || ch == self.horizontal || ch == self.right
    }
}

pub const FENCE: Alphabet = Alphabet {
    left: '{',
    horizontal: '~',
    right: '}',
    zone: Zone::Exclusion,
};

pub const FORT: Alphabet = Alphabet {
    left: '[',
    horizontal: '=',
    right: ']',
    zone: Zone::Metropolis,
};

/// 是否为任一字母表的墙字形
#[inline]
pub fn is_wall_glyph(ch: char) -> bool {
    FENCE.contains(ch) || FORT.contains(ch)
}

/// 并查集（路径减半；合并时较小编号为根，保持编号递增语义）
#[derive(Debug, Default)]
struct DisjointSet {
    parent: Vec<u32>,
}

impl DisjointSet {
    fn make(&mut self) -> u32 {
        let id = self.parent.len() as u32;
        self.parent.push(id);
        id
    }

    fn find(&mut self, mut id: u32) -> u32 {
        while self.parent[id as usize] != id {
            let grand = self.parent[self.parent[id as usize] as usize];
            self.parent[id as usize] = grand;
            id = grand;
        }
        id
    }

    fn union(&mut self, a: u32, b: u32) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child as usize] = root;
        }
    }

    fn len(&self) -> usize {
        self.parent.len()
    }
}

/// 单个字母表的标注：每格所属的封闭连通块根编号
fn label(grid: &Grid, alphabet: &Alphabet) -> Vec<Option<u32>> {
    let cols = grid.cols();
    let mut ids: Vec<Option<u32>> = vec![None; grid.len()];
    let mut sets = DisjointSet::default();

    for pos in grid.positions() {
        let idx = grid.index(pos);
        if grid.get(pos).is_some_and(|ch| alphabet.contains(ch)) {
            continue;
        }
        let left = if pos.col > 0 { ids[idx - 1] } else { None };
        let up = if pos.row > 0 { ids[idx - cols] } else { None };
        let id = match (left, up) {
            (None, None) => sets.make(),
            (Some(a), None) | (None, Some(a)) => a,
            (Some(a), Some(b)) => {
                sets.union(a, b);
                a.min(b)
            }
        };
        ids[idx] = Some(id);
    }

    let mut open = vec![false; sets.len()];
    for pos in grid.positions() {
        if let Some(id) = ids[grid.index(pos)] {
            if grid.on_border(pos) {
                let root = sets.find(id);
                open[root as usize] = true;
            }
        }
    }

    ids.into_iter()
        .map(|id| {
            id.map(|id| sets.find(id))
                .filter(|root| !open[*root as usize])
        })
        .collect()
}

/// 校验墙字形
///
/// - 左角：左侧无区域，右侧为同字母表的墙或区域
/// - 右角：镜像
/// - 横边：上下恰有一侧是区域
fn validate(grid: &Grid, alphabet: &Alphabet, labels: &[Option<u32>]) -> CompileResult<()> {
    let zone_at = |pos: Option<Position>| pos.is_some_and(|p| labels[grid.index(p)].is_some());
    let wall_at = |pos: Option<Position>| {
        pos.and_then(|p| grid.get(p))
            .is_some_and(|ch| alphabet.contains(ch))
    };

    for pos in grid.positions() {
        let Some(ch) = grid.get(pos) else { continue };
        let west = grid.offset(pos, -1, 0);
        let east = grid.offset(pos, 1, 0);

        if ch == alphabet.left {
            if zone_at(west) {
                return Err(CompileError::zone(pos, format!("zone to the left of '{ch}'")));
            }
            if !(wall_at(east) || zone_at(east)) {
                return Err(CompileError::zone(pos, format!("'{ch}' does not open onto a zone")));
            }
        } else if ch == alphabet.right {
            if zone_at(east) {
                return Err(CompileError::zone(pos, format!("zone to the right of '{ch}'")));
            }
            if !(wall_at(west) || zone_at(west)) {
                return Err(CompileError::zone(pos, format!("'{ch}' does not close a zone")));
            }
        } else if ch == alphabet.horizontal {
            let above = zone_at(grid.offset(pos, 0, -1));
            let below = zone_at(grid.offset(pos, 0, 1));
            match (above, below) {
                (true, true) => {
                    return Err(CompileError::zone(
                        pos,
                        format!("'{ch}' is ambiguous: zones above and below"),
                    ));
                }
                (false, false) => {
                    return Err(CompileError::zone(pos, format!("'{ch}' does not bound a zone")));
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// 每格的区域分类与区域编号
#[derive(Debug, Clone)]
pub struct ZoneMap {
    zones: Vec<Zone>,
    ids: Vec<Option<u32>>,
    cols: usize,
    count: usize,
}

impl ZoneMap {
    /// 检测并校验全部区域
    ///
    /// Errors:
    ///     ZoneError: 边界不完整、角字形方向错误、横边歧义、区域嵌套
    pub fn detect(grid: &Grid) -> CompileResult<Self> {
        let fence = label(grid, &FENCE);
        validate(grid, &FENCE, &fence)?;
        let fort = label(grid, &FORT);
        validate(grid, &FORT, &fort)?;

        // 一种墙落在另一种区域内部即为嵌套
        for pos in grid.positions() {
            let idx = grid.index(pos);
            let Some(ch) = grid.get(pos) else { continue };
            if (FENCE.contains(ch) && fort[idx].is_some())
                || (FORT.contains(ch) && fence[idx].is_some())
            {
                return Err(CompileError::zone(pos, "nested zone"));
            }
        }

        let mut map = ZoneMap {
            zones: vec![Zone::None; grid.len()],
            ids: vec![None; grid.len()],
            cols: grid.cols(),
            count: 0,
        };
        map.absorb(&fence, FENCE.zone);
        map.absorb(&fort, FORT.zone);

        debug!(zones = map.count, "zone detection finished");
        Ok(map)
    }

    /// 按发现顺序重新编号，并写入分类
    fn absorb(&mut self, labels: &[Option<u32>], zone: Zone) {
        let mut compact: Vec<(u32, u32)> = Vec::new();
        for (idx, label) in labels.iter().enumerate() {
            let Some(root) = *label else { continue };
            let id = match compact.iter().find(|(r, _)| *r == root) {
                Some(&(_, id)) => id,
                None => {
                    let id = self.count as u32;
                    compact.push((root, id));
                    self.count += 1;
                    id
                }
            };
            self.zones[idx] = zone;
            self.ids[idx] = Some(id);
        }
    }

    #[inline]
    fn slot(&self, pos: Position) -> Option<usize> {
        (pos.col < self.cols).then_some(pos.row * self.cols + pos.col)
    }

    #[inline]
    pub fn zone_at(&self, pos: Position) -> Zone {
        self.slot(pos)
            .and_then(|idx| self.zones.get(idx).copied())
            .unwrap_or_default()
    }

    #[inline]
    pub fn zone_id(&self, pos: Position) -> Option<u32> {
        self.slot(pos).and_then(|idx| self.ids.get(idx).copied().flatten())
    }

    /// 是否位于某个区域内部
    #[inline]
    pub fn is_inside(&self, pos: Position) -> bool {
        self.zone_at(pos) != Zone::None
    }

    /// 区域个数
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorKind;

    fn detect(src: &str) -> CompileResult<(Grid, ZoneMap)> {
        let grid = Grid::build(src)?;
        let zones = ZoneMap::detect(&grid)?;
        Ok((grid, zones))
    }

    #[test]
    fn test_fence_block_is_exclusion() {
        let (_, zones) = detect("{~~}\n{aa}\n{~~}").unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones.zone_at(Position::new(1, 1)), Zone::Exclusion);
        assert_eq!(zones.zone_at(Position::new(2, 1)), Zone::Exclusion);
        assert_eq!(zones.zone_at(Position::new(0, 1)), Zone::None);
        assert_eq!(zones.zone_at(Position::new(1, 0)), Zone::None);
        assert_eq!(zones.zone_id(Position::new(1, 1)), Some(0));
    }

    #[test]
    fn test_fort_block_is_metropolis() {
        let (_, zones) = detect("  [===]\n@ [ x ] 0\n  [===]").unwrap();
        assert_eq!(zones.zone_at(Position::new(4, 1)), Zone::Metropolis);
        assert_eq!(zones.zone_at(Position::new(0, 1)), Zone::None);
        assert!(!zones.is_inside(Position::new(8, 1)));
    }

    #[test]
    fn test_wrong_corner_fails() {
        let err = detect("{~~}\n}aa}\n{~~}").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Zone);
        assert_eq!(err.position, Position::new(0, 1));
    }

    #[test]
    fn test_foreign_corner_fails() {
        let err = detect("{~~}\n[aa}\n{~~}").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Zone);
    }

    #[test]
    fn test_open_region_fails_wall_validation() {
        // 底边缺失：泄漏到网格边界
        let err = detect("{~~}\n{aa}\n{  }").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Zone);
        assert_eq!(err.position, Position::new(1, 0));
    }

    #[test]
    fn test_no_walls_no_zones() {
        let (_, zones) = detect("0<.>0").unwrap();
        assert!(zones.is_empty());
    }

    #[test]
    fn test_shared_edge_is_ambiguous() {
        let err = detect("{~}\n{a}\n{~}\n{b}\n{~}").unwrap_err();
        assert_eq!(err.position, Position::new(1, 2));
        assert!(err.message.contains("ambiguous"));
    }

    #[test]
    fn test_two_zones_numbered_in_order() {
        let (_, zones) = detect("{~} [=]\n{a} [b]\n{~} [=]").unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones.zone_id(Position::new(1, 1)), Some(0));
        assert_eq!(zones.zone_id(Position::new(5, 1)), Some(1));
        assert_eq!(zones.zone_at(Position::new(5, 1)), Zone::Metropolis);
    }

    #[test]
    fn test_nested_zone_fails() {
        let src = "{~~~~~}\n{ [=] }\n{ [x] }\n{ [=] }\n{~~~~~}";
        let err = detect(src).unwrap_err();
        assert_eq!(err.message, "nested zone");
    }

    #[test]
    fn test_disjoint_set_merges_fronts() {
        // a 与 b 各自起一个编号，在下一行相遇后合并
        let grid = Grid::build("{~~~~}\n{a{}b}\n{    }\n{~~~~}").unwrap();
        let labels = label(&grid, &FENCE);
        let a = labels[grid.index(Position::new(1, 1))];
        let b = labels[grid.index(Position::new(4, 1))];
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_eq!(labels[grid.index(Position::new(2, 1))], None);
    }
}
