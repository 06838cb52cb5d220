//! `dronegrid`: 编译并运行一个网格程序
//!
//! ```text
//! dronegrid program.dg [--header defs.dg] [--tick-limit N]
//!           [--pause-unit-ms MS] [--tick-delay-ms MS] [--check]
//! ```
//!
//! 程序读标准输入、写标准输出/标准错误；日志级别由 `RUST_LOG` 控制。

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dronegrid_rs::{
    compile, CancelToken, CompileError, Environment, RunConfig, RunOutcome, Runner, Section,
};

/// Compile and run a DroneGrid program.
#[derive(Parser)]
#[command(name = "dronegrid", version, about = "Compile and run a DroneGrid program")]
struct Args {
    /// Program source file.
    file: PathBuf,

    /// Optional header file with extra lens definitions.
    #[arg(long)]
    header: Option<PathBuf>,

    /// Stop after this many ticks.
    #[arg(long)]
    tick_limit: Option<u64>,

    /// Duration of one pause unit, in milliseconds.
    #[arg(long, default_value_t = 1)]
    pause_unit_ms: u64,

    /// Delay between ticks, in milliseconds.
    #[arg(long, default_value_t = 0)]
    tick_delay_ms: u64,

    /// Only compile and report the topology.
    #[arg(long)]
    check: bool,
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let args = Args::parse();

    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let header = match &args.header {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
        }
        None => String::new(),
    };

    let name = args
        .file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "program".to_string());

    let mut program = match compile(&name, &source, &header) {
        Ok(program) => program,
        Err(err) => {
            let text = match err.section {
                Section::Header => &header,
                Section::Body => &source,
            };
            highlight(text, &err);
            return Err(err).context(format!("compiling {}", args.file.display()));
        }
    };

    if args.check {
        println!(
            "{}: {} stations, {} groups, {} links, {} zones, {} definitions",
            program.name(),
            program.arena().len(),
            program.arena().groups().len(),
            program.arena().link_count(),
            program.zones().len(),
            program.definitions().len()
        );
        return Ok(());
    }

    program.set_environment(Environment::stdio());
    cancel_on_interrupt(program.cancel_token())?;
    let config = RunConfig {
        pause_unit: Duration::from_millis(args.pause_unit_ms),
        tick_limit: args.tick_limit,
        tick_delay: Duration::from_millis(args.tick_delay_ms),
    };

    let outcome = Runner::new(config)
        .run(&mut program)
        .with_context(|| format!("running {}", program.name()))?;
    match outcome {
        RunOutcome::Halted { ticks } => info!(ticks, "program halted"),
        RunOutcome::Cancelled { ticks } => eprintln!("interrupted after {ticks} ticks"),
        RunOutcome::TickLimit { ticks } => eprintln!("stopped after {ticks} ticks (tick limit)"),
    }
    Ok(())
}

/// Ctrl+C 只置取消令牌，运行循环与 Pause 据此受控停机
fn cancel_on_interrupt(token: CancelToken) -> Result<()> {
    ctrlc::set_handler(move || token.cancel()).context("installing Ctrl+C handler")
}

/// 在标准错误上标出出错的格子
fn highlight(text: &str, err: &CompileError) {
    let Some(line) = text.lines().nth(err.position.row) else { return };
    eprintln!("{:>4} | {}", err.position.row + 1, line);
    eprintln!("     | {}^", " ".repeat(err.position.col));
}
