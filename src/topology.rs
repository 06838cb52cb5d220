//! 拓扑解析
//!
//! 1. 扫描区域与气泡之外的格子，每个站点字形实例化一个站点
//! 2. 八邻接的站点并为一个绑定组（显式栈泛洪）
//! 3. 从每个成员出发沿隧道/光圈直线追踪，到达站点即记一条边

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::{CompileError, CompileResult};
use crate::expr::Definition;
use crate::grid::{Direction, Grid, Position, BLANK};
use crate::program::arena::{GroupId, StationArena, StationId};
use crate::station::StationKind;
use crate::zone::{is_wall_glyph, ZoneMap};

pub const TUNNELS: [char; 7] = ['-', '|', '/', '\\', '+', 'X', '*'];
pub const APERTURES: [char; 5] = ['>', '^', '<', 'v', '#'];

#[inline]
pub fn is_tunnel(ch: char) -> bool {
    TUNNELS.contains(&ch)
}

#[inline]
pub fn is_aperture(ch: char) -> bool {
    APERTURES.contains(&ch)
}

/// 语言保留字形，不能作为合成站符号
pub fn is_reserved(ch: char) -> bool {
    StationKind::from_glyph(ch).is_some()
        || is_tunnel(ch)
        || is_aperture(ch)
        || is_wall_glyph(ch)
        || ch == '('
        || ch == ')'
}

/// 隧道/光圈是否允许沿 `dir` 通过
///
/// 直隧道只走自身轴线，`+` 走正交、`X` 走对角、`*` 全向；
/// 光圈只放行一个方向。
///
/// `#` 是关闭的闸门：任何方向都不放行，通行效果与空格相同，
/// 但它是保留字形，不能用作合成站符号。
pub fn accepts(ch: char, dir: Direction) -> bool {
    use Direction::*;
    match ch {
        '-' => matches!(dir, E | W),
        '|' => matches!(dir, N | S),
        '/' => matches!(dir, NE | SW),
        '\\' => matches!(dir, NW | SE),
        '+' => !dir.is_diagonal(),
        'X' => dir.is_diagonal(),
        '*' => true,
        '>' => dir == E,
        '<' => dir == W,
        '^' => dir == N,
        'v' => dir == S,
        _ => false,
    }
}

struct Resolver<'a> {
    grid: &'a Grid,
    zones: &'a ZoneMap,
    /// 格子下标 -> 站点 ID
    slots: Vec<Option<StationId>>,
}

impl Resolver<'_> {
    #[inline]
    fn station_at(&self, pos: Position) -> Option<StationId> {
        self.slots[self.grid.index(pos)]
    }

    #[inline]
    fn excluded(&self, pos: Position) -> bool {
        self.grid.is_masked(pos) || self.zones.is_inside(pos)
    }

    /// 扫描站点，遇到未知字形报错
    fn scan(
        &mut self,
        synthetic: &HashMap<char, StationKind>,
    ) -> CompileResult<Vec<(Position, StationKind)>> {
        let mut found = Vec::new();
        for pos in self.grid.positions() {
            if self.excluded(pos) {
                continue;
            }
            let Some(ch) = self.grid.get(pos) else { continue };
            if ch == BLANK {
                continue;
            }
            let kind = StationKind::from_glyph(ch).or_else(|| synthetic.get(&ch).copied());
            match kind {
                Some(kind) => {
                    self.slots[self.grid.index(pos)] = Some(found.len() as StationId);
                    found.push((pos, kind));
                }
                None if is_tunnel(ch) || is_aperture(ch) || is_wall_glyph(ch) => {}
                None => return Err(CompileError::syntax(pos, format!("unknown glyph '{ch}'"))),
            }
        }
        Ok(found)
    }

    /// 八邻接分组；组按首个成员的行优先顺序编号
    fn group(&self, found: &[(Position, StationKind)]) -> (Vec<GroupId>, usize) {
        let mut group_of: Vec<Option<GroupId>> = vec![None; found.len()];
        let mut next: GroupId = 0;
        let mut stack: Vec<StationId> = Vec::new();

        for seed in 0..found.len() {
            if group_of[seed].is_some() {
                continue;
            }
            group_of[seed] = Some(next);
            stack.push(seed as StationId);

            while let Some(id) = stack.pop() {
                let pos = found[id as usize].0;
                for dir in Direction::ALL {
                    let Some(neighbour) = self.grid.step(pos, dir) else { continue };
                    if let Some(other) = self.station_at(neighbour) {
                        if group_of[other as usize].is_none() {
                            group_of[other as usize] = Some(next);
                            stack.push(other);
                        }
                    }
                }
            }
            next += 1;
        }

        let groups = group_of.into_iter().map(|g| g.unwrap_or_default()).collect();
        (groups, next as usize)
    }

    /// 沿 `dir` 直线追踪
    ///
    /// Returns:
    ///     Some(station): 路径到达的站点；None: 起点不是可通行字形或路径中断
    ///
    /// Errors:
    ///     TopologyError: 经过光圈的路径没有到达任何站点
    fn trace(&self, start: Position, dir: Direction) -> CompileResult<Option<StationId>> {
        let mut pos = start;
        let mut last: Option<Position> = None;
        let mut through_aperture = false;

        loop {
            if let Some(target) = self.station_at(pos) {
                // 相邻站点属于同一组，不是路径
                return Ok(last.map(|_| target));
            }
            if self.excluded(pos) {
                break;
            }
            let ch = self.grid.get(pos).unwrap_or(BLANK);
            if !accepts(ch, dir) {
                break;
            }
            through_aperture |= is_aperture(ch);
            last = Some(pos);
            match self.grid.step(pos, dir) {
                Some(next) => pos = next,
                None => break,
            }
        }

        match last {
            Some(end) if through_aperture => {
                Err(CompileError::topology(end, "aperture leads nowhere"))
            }
            Some(end) => {
                trace!(%start, %end, ?dir, "tunnel ends without a station");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// 解析拓扑，产出站点/组 Arena
///
/// Args:
///     grid: 可执行网格
///     zones: 区域图（区域内部不参与扫描）
///     definitions: 合成站定义，下标即 `StationKind::Synthetic::def`
///
/// Errors:
///     SyntaxError: 未知字形
///     TopologyError: 光圈链无法到达站点
pub fn resolve(
    grid: &Grid,
    zones: &ZoneMap,
    definitions: &[Definition],
) -> CompileResult<StationArena> {
    let synthetic: HashMap<char, StationKind> = definitions
        .iter()
        .enumerate()
        .map(|(i, d)| {
            (
                d.symbol(),
                StationKind::Synthetic {
                    def: i as u32,
                    symbol: d.symbol(),
                },
            )
        })
        .collect();

    let mut resolver = Resolver {
        grid,
        zones,
        slots: vec![None; grid.len()],
    };
    let found = resolver.scan(&synthetic)?;
    let (group_of, group_count) = resolver.group(&found);

    let mut arena = StationArena::with_capacity(found.len());
    for _ in 0..group_count {
        arena.add_group();
    }
    for (i, &(pos, kind)) in found.iter().enumerate() {
        arena.add_station(pos, kind, group_of[i]);
    }

    for group in 0..group_count as GroupId {
        let members = arena.group(group).members.clone();
        for member in members {
            let origin = arena.station(member).position;
            for dir in Direction::ALL {
                let Some(start) = grid.step(origin, dir) else { continue };
                if let Some(target) = resolver.trace(start, dir)? {
                    arena.link(group, target);
                }
            }
        }
    }

    debug!(
        stations = arena.len(),
        groups = group_count,
        links = arena.link_count(),
        "topology resolved"
    );
    Ok(arena)
}
