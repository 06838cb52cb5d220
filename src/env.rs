//! 运行环境：I/O 通道、打印器、停机标志与取消令牌
//!
//! 一次运行对应一个 Environment；两次运行之间由调用方 `reset()`。
//! 通道只在 I/O 类站点的 tick / postTick 中被调用。

use std::io::{self, BufRead, BufReader, Cursor, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

/// 输入通道
pub trait Input: Send {
    fn reset(&mut self);

    /// 读取一个字节；EOF 返回 Ok(None)
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// 读取一个十进制整数（跳过前导空白）；EOF 返回 Ok(None)
    fn read_integer(&mut self) -> io::Result<Option<i64>>;
}

/// 输出通道（错误通道共用同一契约）
pub trait Output: Send {
    fn reset(&mut self);

    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    fn write_text(&mut self, text: &str) -> io::Result<()>;
}

/// 面向用户的消息出口（停机、故障提示）
pub trait Printer: Send {
    fn print(&mut self, message: &str);
}

/// 协作式取消令牌
///
/// 跨线程共享；运行循环在两个 tick 之间轮询，Pause 在睡眠切片之间轮询。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// 重新启用（下一次运行前）
    pub fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// 运行期环境
pub struct Environment {
    input: Box<dyn Input>,
    output: Box<dyn Output>,
    error: Box<dyn Output>,
    printer: Box<dyn Printer>,
    cancel: CancelToken,
    halted: bool,
}

impl Environment {
    /// 空环境：无输入，输出丢弃，消息进日志
    pub fn new() -> Self {
        Environment {
            input: Box::new(NullInput),
            output: Box::new(NullOutput),
            error: Box::new(NullOutput),
            printer: Box::new(TracingPrinter),
            cancel: CancelToken::new(),
            halted: false,
        }
    }

    /// 标准输入/输出/错误
    pub fn stdio() -> Self {
        Environment::new()
            .with_input(StdinInput::new())
            .with_output(StdoutOutput)
            .with_error(StderrOutput)
    }

    pub fn with_input(mut self, input: impl Input + 'static) -> Self {
        self.input = Box::new(input);
        self
    }

    pub fn with_output(mut self, output: impl Output + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn with_error(mut self, error: impl Output + 'static) -> Self {
        self.error = Box::new(error);
        self
    }

    pub fn with_printer(mut self, printer: impl Printer + 'static) -> Self {
        self.printer = Box::new(printer);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 清除停机标志并重置全部通道
    pub fn reset(&mut self) {
        self.halted = false;
        self.input.reset();
        self.output.reset();
        self.error.reset();
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn input(&mut self) -> &mut dyn Input {
        self.input.as_mut()
    }

    pub fn output(&mut self) -> &mut dyn Output {
        self.output.as_mut()
    }

    pub fn error(&mut self) -> &mut dyn Output {
        self.error.as_mut()
    }

    pub fn print(&mut self, message: &str) {
        self.printer.print(message);
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// 输入实现
// =========================================================================

fn read_byte_from<R: BufRead>(reader: &mut R) -> io::Result<Option<u8>> {
    let byte = reader.fill_buf()?.first().copied();
    if byte.is_some() {
        reader.consume(1);
    }
    Ok(byte)
}

fn peek_byte<R: BufRead>(reader: &mut R) -> io::Result<Option<u8>> {
    Ok(reader.fill_buf()?.first().copied())
}

/// 跳过空白后读取可带符号的十进制整数
fn read_integer_from<R: BufRead>(reader: &mut R) -> io::Result<Option<i64>> {
    while peek_byte(reader)?.is_some_and(|b| b.is_ascii_whitespace()) {
        reader.consume(1);
    }

    let mut text = String::new();
    if let Some(sign @ (b'-' | b'+')) = peek_byte(reader)? {
        text.push(sign as char);
        reader.consume(1);
    }
    while let Some(b) = peek_byte(reader)? {
        if !b.is_ascii_digit() {
            break;
        }
        text.push(b as char);
        reader.consume(1);
    }

    if text.is_empty() {
        return match peek_byte(reader)? {
            None => Ok(None),
            Some(b) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected an integer, found byte 0x{b:02x}"),
            )),
        };
    }
    text.parse::<i64>()
        .map(Some)
        .map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid integer {text:?}: {e}"),
            )
        })
}

/// 无输入：总是 EOF
#[derive(Debug, Clone, Copy, Default)]
pub struct NullInput;

impl Input for NullInput {
    fn reset(&mut self) {}

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(None)
    }

    fn read_integer(&mut self) -> io::Result<Option<i64>> {
        Ok(None)
    }
}

/// 内存输入；reset 回到开头
#[derive(Debug, Clone, Default)]
pub struct BufferInput {
    cursor: Cursor<Vec<u8>>,
}

impl BufferInput {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        BufferInput {
            cursor: Cursor::new(data.into()),
        }
    }
}

impl Input for BufferInput {
    fn reset(&mut self) {
        self.cursor.set_position(0);
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        read_byte_from(&mut self.cursor)
    }

    fn read_integer(&mut self) -> io::Result<Option<i64>> {
        read_integer_from(&mut self.cursor)
    }
}

/// 标准输入；流不可回退，reset 不做任何事
pub struct StdinInput {
    reader: BufReader<io::Stdin>,
}

impl StdinInput {
    pub fn new() -> Self {
        StdinInput {
            reader: BufReader::new(io::stdin()),
        }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Input for StdinInput {
    fn reset(&mut self) {}

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        read_byte_from(&mut self.reader)
    }

    fn read_integer(&mut self) -> io::Result<Option<i64>> {
        read_integer_from(&mut self.reader)
    }
}

// =========================================================================
// 输出实现
// =========================================================================

/// 丢弃所有输出
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutput;

impl Output for NullOutput {
    fn reset(&mut self) {}

    fn write_byte(&mut self, _byte: u8) -> io::Result<()> {
        Ok(())
    }

    fn write_text(&mut self, _text: &str) -> io::Result<()> {
        Ok(())
    }
}

/// 共享内存输出
///
/// 克隆出的句柄共享同一缓冲区，便于在程序运行后读取结果。
#[derive(Debug, Clone, Default)]
pub struct BufferOutput {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl BufferOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已写入的字节；锁中毒时仍读取缓冲内容
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    fn with_buffer(&self, f: impl FnOnce(&mut Vec<u8>)) -> io::Result<()> {
        let mut guard = self
            .buffer
            .lock()
            .map_err(|_| io::Error::other("output buffer poisoned"))?;
        f(&mut guard);
        Ok(())
    }
}

impl Output for BufferOutput {
    fn reset(&mut self) {
        match self.buffer.lock() {
            Ok(mut buffer) => buffer.clear(),
            Err(poisoned) => {
                warn!("output buffer poisoned, clearing anyway");
                poisoned.into_inner().clear();
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.with_buffer(|b| b.push(byte))
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.with_buffer(|b| b.extend_from_slice(text.as_bytes()))
    }
}

/// 标准输出（每次写入后 flush，交互式程序需要即时可见）
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutOutput;

impl Output for StdoutOutput {
    fn reset(&mut self) {}

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(&[byte])?;
        out.flush()
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StderrOutput;

impl Output for StderrOutput {
    fn reset(&mut self) {}

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        io::stderr().lock().write_all(&[byte])
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        io::stderr().lock().write_all(text.as_bytes())
    }
}

/// 消息写入 tracing 日志
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPrinter;

impl Printer for TracingPrinter {
    fn print(&mut self, message: &str) {
        info!(target: "dronegrid::printer", "{message}");
    }
}

/// 消息收集到共享列表
#[derive(Debug, Clone, Default)]
pub struct BufferPrinter {
    messages: Arc<Mutex<Vec<String>>>,
}

impl BufferPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl Printer for BufferPrinter {
    fn print(&mut self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}
