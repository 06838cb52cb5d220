/// 编译器 - 将源码网格编译为可执行的 Program
///
/// 流水线：
/// 1. 头部与正文构建网格（括号配对，收集透镜）
/// 2. 透镜解析为合成站定义，头部在前
/// 3. 区域检测
/// 4. 拓扑解析（站点、绑定组、出边）
///
/// 任一阶段出错立即返回，不做部分恢复。

use std::collections::HashMap;

use tracing::{debug, debug_span};

use crate::error::{CompileError, CompileResult, Section};
use crate::expr::Definition;
use crate::grid::{Grid, Lens, Position};
use crate::program::Program;
use crate::topology;
use crate::zone::ZoneMap;

/// 编译源码
///
/// Args:
///     name: 程序名（日志与诊断用）
///     source: 正文网格
///     header: 额外的透镜定义文本，可为空；透镜之外的内容被忽略
///
/// Returns:
///     Program: 处于 Created 状态的程序
///
/// Errors:
///     CompileError: 第一个检测到的错误，带所在段与位置
pub fn compile(name: &str, source: &str, header: &str) -> CompileResult<Program> {
    let span = debug_span!("compile", program = name);
    let _guard = span.enter();

    let header_grid = Grid::build(header).map_err(|e| e.in_section(Section::Header))?;
    let grid = Grid::build(source)?;
    debug!(cols = grid.cols(), rows = grid.rows(), "grid built");

    let mut definitions = Vec::new();
    let mut seen: HashMap<char, Position> = HashMap::new();
    collect_definitions(header_grid.lenses(), Section::Header, &mut definitions, &mut seen)?;
    collect_definitions(grid.lenses(), Section::Body, &mut definitions, &mut seen)?;
    debug!(definitions = definitions.len(), "lenses parsed");

    let zones = ZoneMap::detect(&grid)?;
    debug!(zones = zones.len(), "zones detected");

    let arena = topology::resolve(&grid, &zones, &definitions)?;
    Ok(Program::new(name, grid, zones, arena, definitions))
}

/// 解析一段的全部透镜，符号不得与已定义的重复
fn collect_definitions(
    lenses: &[Lens],
    section: Section,
    definitions: &mut Vec<Definition>,
    seen: &mut HashMap<char, Position>,
) -> CompileResult<()> {
    for lens in lenses {
        let def = Definition::parse(&lens.text, lens.position).map_err(|e| e.in_section(section))?;
        if let Some(first) = seen.insert(def.symbol(), lens.position) {
            return Err(CompileError::definition(
                lens.position,
                format!("symbol '{}' already defined at {first}", def.symbol()),
            )
            .in_section(section));
        }
        definitions.push(def);
    }
    Ok(())
}
