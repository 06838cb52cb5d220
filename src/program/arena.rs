//! 站点/组 Arena
//!
//! 站点与绑定组都按下标存放：站点记录所属组的 GroupId，组记录成员的
//! StationId，避免父子之间的共享可变引用。
//! 计数器不在这里，由引擎以双缓冲数组按 StationId 索引。

use std::collections::HashMap;

use crate::grid::Position;
use crate::station::StationKind;

pub type StationId = u32;
pub type GroupId = u32;

/// 单个站点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    pub position: Position,
    pub kind: StationKind,
    pub group: GroupId,
}

/// 绑定组：相邻站点的集合
///
/// `links` 是组内全部成员共享的出边（目标站点），允许重复与自环。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundGroup {
    pub members: Vec<StationId>,
    pub links: Vec<StationId>,
}

impl BoundGroup {
    /// 组总量：成员计数之和
    ///
    /// Args:
    ///     counts: 按 StationId 索引的计数数组（通常是快照缓冲）
    #[inline]
    pub fn total(&self, counts: &[u64]) -> u64 {
        self.members
            .iter()
            .fold(0u64, |acc, &m| acc.saturating_add(counts[m as usize]))
    }

    #[inline]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

/// 站点与组的中央仓库
#[derive(Debug, Clone, Default)]
pub struct StationArena {
    stations: Vec<Station>,
    groups: Vec<BoundGroup>,
    by_position: HashMap<Position, StationId>,
}

impl StationArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(stations: usize) -> Self {
        StationArena {
            stations: Vec::with_capacity(stations),
            groups: Vec::new(),
            by_position: HashMap::with_capacity(stations),
        }
    }

    /// 新建空组
    ///
    /// Returns:
    ///     GroupId: 新组的 ID
    pub fn add_group(&mut self) -> GroupId {
        let id = self.groups.len() as GroupId;
        self.groups.push(BoundGroup::default());
        id
    }

    /// 新建站点并加入指定组
    ///
    /// Args:
    ///     position: 站点所在格
    ///     kind: 站点种类
    ///     group: 所属组（必须已存在）
    ///
    /// Returns:
    ///     StationId: 新站点的 ID
    pub fn add_station(
        &mut self,
        position: Position,
        kind: StationKind,
        group: GroupId,
    ) -> StationId {
        let id = self.stations.len() as StationId;
        self.stations.push(Station { position, kind, group });
        self.groups[group as usize].members.push(id);
        self.by_position.insert(position, id);
        id
    }

    /// 追加一条出边 group -> station
    pub fn link(&mut self, group: GroupId, target: StationId) {
        self.groups[group as usize].links.push(target);
    }

    #[inline]
    pub fn station(&self, id: StationId) -> &Station {
        &self.stations[id as usize]
    }

    #[inline]
    pub fn group(&self, id: GroupId) -> &BoundGroup {
        &self.groups[id as usize]
    }

    #[inline]
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    #[inline]
    pub fn groups(&self) -> &[BoundGroup] {
        &self.groups
    }

    #[inline]
    pub fn station_at(&self, position: Position) -> Option<StationId> {
        self.by_position.get(&position).copied()
    }

    /// 站点数量
    #[inline]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// 边总数（含重复边）
    pub fn link_count(&self) -> usize {
        self.groups.iter().map(BoundGroup::link_count).sum()
    }
}
