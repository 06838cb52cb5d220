/// Python 绑定
///
/// Python 持有一个 Program 及其输出缓冲；编译错误映射为 ValueError，
/// 运行期 I/O 故障映射为 RuntimeError。

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::compiler::compile;
use crate::env::{BufferInput, BufferOutput, BufferPrinter, Environment};
use crate::grid::Position;
use crate::program::Program;
use crate::runner::{RunConfig, RunOutcome, Runner};

/// 编译后的程序
///
/// 单线程使用（unsendable），输出写入内存缓冲供 Python 读取。
#[pyclass(unsendable, name = "Program")]
pub struct PyProgram {
    program: Program,
    output: BufferOutput,
    error: BufferOutput,
    printer: BufferPrinter,
}

#[pymethods]
impl PyProgram {
    /// 编译源码
    ///
    /// Args:
    ///     name: 程序名
    ///     source: 正文网格
    ///     header: 头部透镜定义
    ///     input: 输入字节（ByteIn / NumIn 读取）
    ///
    /// Raises:
    ///     ValueError: 编译失败，消息含错误种类与位置
    #[new]
    #[pyo3(signature = (name, source, header = "", input = None))]
    fn new(name: &str, source: &str, header: &str, input: Option<Vec<u8>>) -> PyResult<Self> {
        let output = BufferOutput::new();
        let error = BufferOutput::new();
        let printer = BufferPrinter::new();
        let env = Environment::new()
            .with_input(BufferInput::new(input.unwrap_or_default()))
            .with_output(output.clone())
            .with_error(error.clone())
            .with_printer(printer.clone());
        let program = compile(name, source, header)
            .map_err(|e| PyValueError::new_err(e.to_string()))?
            .with_environment(env);
        Ok(PyProgram {
            program,
            output,
            error,
            printer,
        })
    }

    fn reset(&mut self) {
        self.program.reset();
    }

    /// 推进一个 tick
    ///
    /// Returns:
    ///     bool: 是否有计数发生变化
    ///
    /// Raises:
    ///     RuntimeError: I/O 故障，程序已停机
    fn step(&mut self) -> PyResult<bool> {
        self.program
            .step()
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    /// 站点快照
    ///
    /// Returns:
    ///     List[Tuple[int, int, str, int, int]]: [(col, row, glyph, current, group), ...]
    fn stations(&self) -> Vec<(usize, usize, char, u64, u32)> {
        self.program
            .stations()
            .map(|s| (s.position.col, s.position.row, s.kind.glyph(), s.current, s.group))
            .collect()
    }

    /// 向 (col, row) 处的站点注入 token
    ///
    /// Returns:
    ///     bool: 该格是否有站点
    fn inject(&mut self, col: usize, row: usize, amount: u64) -> bool {
        self.program.inject(Position::new(col, row), amount).is_some()
    }

    fn count_at(&self, col: usize, row: usize) -> Option<u64> {
        self.program.count_at(Position::new(col, row))
    }

    /// 运行到停机或 tick 上限
    ///
    /// Returns:
    ///     Tuple[str, int]: (结束原因, tick 数)，原因为 "halted" / "cancelled" / "tick_limit"
    #[pyo3(signature = (tick_limit = None, pause_unit_ms = 1))]
    fn run(
        &mut self,
        tick_limit: Option<u64>,
        pause_unit_ms: u64,
    ) -> PyResult<(&'static str, u64)> {
        let config = RunConfig {
            pause_unit: std::time::Duration::from_millis(pause_unit_ms),
            tick_limit,
            ..RunConfig::default()
        };
        let outcome = Runner::new(config)
            .run(&mut self.program)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        let reason = match outcome {
            RunOutcome::Halted { .. } => "halted",
            RunOutcome::Cancelled { .. } => "cancelled",
            RunOutcome::TickLimit { .. } => "tick_limit",
        };
        Ok((reason, outcome.ticks()))
    }

    /// 标准输出通道收到的字节
    fn output(&self) -> Vec<u8> {
        self.output.contents()
    }

    /// 错误通道收到的字节
    fn error_output(&self) -> Vec<u8> {
        self.error.contents()
    }

    /// 打印器收到的消息（故障提示等）
    fn messages(&self) -> Vec<String> {
        self.printer.messages()
    }

    #[getter]
    fn name(&self) -> String {
        self.program.name().to_string()
    }

    #[getter]
    fn ticks(&self) -> u64 {
        self.program.tick_count()
    }

    #[getter]
    fn halted(&self) -> bool {
        self.program.is_halted()
    }

    #[getter]
    fn station_count(&self) -> usize {
        self.program.arena().len()
    }

    fn __repr__(&self) -> String {
        format!(
            "<Program name={:?} stations={} groups={} ticks={}>",
            self.program.name(),
            self.program.arena().len(),
            self.program.arena().groups().len(),
            self.program.tick_count()
        )
    }
}

/// Python 模块定义
#[pymodule]
fn dronegrid_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyProgram>()?;
    Ok(())
}
