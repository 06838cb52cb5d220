//! 端到端：编译源码、驱动 tick、检查计数与输出

use std::thread;
use std::time::{Duration, Instant};

use dronegrid_rs::{
    compile, BufferInput, BufferOutput, CompileErrorKind, Environment, Position, Program, RunConfig,
    RunOutcome, Runner, StationKind, Zone,
};

fn started(src: &str) -> Program {
    let mut program = compile("test", src, "").unwrap();
    program.step().unwrap();
    program
}

fn counts(program: &Program) -> Vec<u64> {
    program.stations().map(|s| s.current).collect()
}

#[test]
fn test_dot_between_apertures() {
    let mut program = started("0<.>0");
    program.inject(Position::new(2, 0), 5).unwrap();
    assert!(program.step().unwrap());
    assert_eq!(counts(&program), vec![1, 0, 1]);
}

#[test]
fn test_split_drops_remainder() {
    let mut program = started("0<%>0");
    program.inject(Position::new(2, 0), 5).unwrap();
    program.step().unwrap();
    assert_eq!(program.count_at(Position::new(0, 0)), Some(2));
    assert_eq!(program.count_at(Position::new(4, 0)), Some(2));
}

#[test]
fn test_creates_in_one_group() {
    let mut program = started("@@@-0");
    program.step().unwrap();
    assert_eq!(program.count_at(Position::new(4, 0)), Some(3));
}

#[test]
fn test_duplicate_and_decrement() {
    let mut program = started("0<O>0\n     \n0<o>0");
    program.inject(Position::new(2, 0), 7).unwrap();
    program.inject(Position::new(2, 2), 7).unwrap();
    program.step().unwrap();
    assert_eq!(program.count_at(Position::new(0, 0)), Some(7));
    assert_eq!(program.count_at(Position::new(4, 0)), Some(7));
    assert_eq!(program.count_at(Position::new(0, 2)), Some(6));
    assert_eq!(program.count_at(Position::new(4, 2)), Some(6));
}

#[test]
fn test_same_source_same_counts() {
    let src = "@--O--0\n|     |\n%-----.";
    let mut a = started(src);
    let mut b = started(src);
    for _ in 0..20 {
        assert_eq!(a.step().unwrap(), b.step().unwrap());
        assert_eq!(counts(&a), counts(&b));
    }
}

#[test]
fn test_same_source_same_graph() {
    let src = "@--O--0\n|     |\n%-----.\n\n@@ ((s = N K *))\n s-Q";
    let a = compile("a", src, "").unwrap();
    let b = compile("b", src, "").unwrap();
    assert_eq!(a.arena().stations(), b.arena().stations());
    assert_eq!(a.arena().groups(), b.arena().groups());
    assert_eq!(a.arena().link_count(), b.arena().link_count());
}

#[test]
fn test_reset_restarts_from_zero() {
    let src = "@--O--0";
    let mut program = started(src);
    program.step().unwrap();
    let first = counts(&program);
    for _ in 0..5 {
        program.step().unwrap();
    }
    program.inject(Position::new(6, 0), 99).unwrap();

    program.reset();
    assert!(counts(&program).iter().all(|&c| c == 0));
    program.step().unwrap();
    assert_eq!(counts(&program), first);
    assert_eq!(program.tick_count(), 1);
}

#[test]
fn test_fence_and_fort_classification() {
    let src = "{~~}  [==]\n{  }  [  ]\n{~~}  [==]\n@---------0";
    let program = compile("zones", src, "").unwrap();
    assert_eq!(program.zones().zone_at(Position::new(1, 1)), Zone::Exclusion);
    assert_eq!(program.zones().zone_at(Position::new(7, 1)), Zone::Metropolis);
    assert_eq!(program.zones().len(), 2);
}

#[test]
fn test_wrong_corner_is_zone_error() {
    let err = compile("zones", "{~~}\n}aa}\n{~~}", "").unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Zone);
    assert_eq!(err.position, Position::new(0, 1));
}

#[test]
fn test_header_synthetic_station() {
    let mut program = compile("synthetic", "@-a", "((a = N 10 +))").unwrap();
    assert_eq!(
        program.stations().nth(1).map(|s| s.kind),
        Some(StationKind::Synthetic { def: 0, symbol: 'a' })
    );
    program.step().unwrap();
    program.step().unwrap();
    assert_eq!(program.count_at(Position::new(2, 0)), Some(1));
    program.step().unwrap();
    // a 持有 1：1 + 10 发回 @
    assert_eq!(program.count_at(Position::new(0, 0)), Some(11));
}

#[test]
fn test_num_out_until_tick_limit() {
    let out = BufferOutput::new();
    let mut program = compile("count", "@-;", "")
        .unwrap()
        .with_environment(Environment::new().with_output(out.clone()));
    let config = RunConfig {
        tick_limit: Some(3),
        ..RunConfig::default()
    };
    let outcome = Runner::new(config).run(&mut program).unwrap();
    assert_eq!(outcome, RunOutcome::TickLimit { ticks: 3 });
    assert_eq!(out.text(), "11");
}

#[test]
fn test_num_in_feeds_num_out() {
    let out = BufferOutput::new();
    let mut program = compile("echo", "_>;", "")
        .unwrap()
        .with_environment(
            Environment::new()
                .with_input(BufferInput::new("42"))
                .with_output(out.clone()),
        );
    program.step().unwrap();
    program.step().unwrap();
    program.step().unwrap();
    assert_eq!(out.text(), "42");
}

#[test]
fn test_halt_ends_run() {
    let mut program = compile("halt", "@-Q", "").unwrap();
    let outcome = Runner::default().run(&mut program).unwrap();
    assert_eq!(outcome, RunOutcome::Halted { ticks: 2 });
    assert!(program.monitor().is_halted());
}

#[test]
fn test_cancel_from_other_thread() {
    let mut program = compile("loop", "@-0", "").unwrap();
    let cancel = program.cancel_token();
    let monitor = program.monitor();

    let watcher = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(10);
        while monitor.ticks() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        cancel.cancel();
    });

    let config = RunConfig {
        tick_delay: Duration::from_millis(1),
        tick_limit: Some(1_000_000),
        ..RunConfig::default()
    };
    let outcome = Runner::new(config).run(&mut program).unwrap();
    watcher.join().unwrap();

    assert!(matches!(outcome, RunOutcome::Cancelled { ticks } if ticks >= 3));
    assert_eq!(program.monitor().counts(), counts(&program));
    assert_eq!(program.count_at(Position::new(2, 0)), Some(1));
}

#[test]
fn test_cancel_interrupts_pause() {
    let mut program = compile("pause", "@-`", "").unwrap();
    let cancel = program.cancel_token();
    let config = RunConfig {
        pause_unit: Duration::from_secs(60),
        ..RunConfig::default()
    };

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });
    let started = Instant::now();
    let outcome = Runner::new(config).run(&mut program).unwrap();
    canceller.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(outcome, RunOutcome::Cancelled { ticks: 2 });
    assert!(program.is_halted());
}
