//! Phase timing, allocation tallies and IR counters.
//!
//! Counters are process-global: worker threads of the parallel driver all
//! feed the same accumulator, so everything here is either an atomic or
//! sits behind a mutex. Phase timers tolerate unbalanced begin/end pairs
//! (a second `begin` or a stray `end` is ignored) instead of panicking
//! inside instrumentation.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lexer,
    Parser,
    Semantic,
    IrGen,
    IrOpt,
    Codegen,
    Linking,
}

pub const PHASE_COUNT: usize = 7;

impl Phase {
    pub const ALL: [Phase; PHASE_COUNT] = [
        Phase::Lexer,
        Phase::Parser,
        Phase::Semantic,
        Phase::IrGen,
        Phase::IrOpt,
        Phase::Codegen,
        Phase::Linking,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Lexer => "lexer",
            Phase::Parser => "parser",
            Phase::Semantic => "semantic",
            Phase::IrGen => "ir-gen",
            Phase::IrOpt => "ir-opt",
            Phase::Codegen => "codegen",
            Phase::Linking => "linking",
        }
    }

    fn index(self) -> usize {
        match self {
            Phase::Lexer => 0,
            Phase::Parser => 1,
            Phase::Semantic => 2,
            Phase::IrGen => 3,
            Phase::IrOpt => 4,
            Phase::Codegen => 5,
            Phase::Linking => 6,
        }
    }
}

#[derive(Default, Clone, Copy)]
struct PhaseSlot {
    total_nanos: u128,
    calls: u64,
}

struct PhaseTimers {
    slots: [PhaseSlot; PHASE_COUNT],
    starts: [Option<Instant>; PHASE_COUNT],
}

/// Process-global profiler.
pub struct Profiler {
    timers: Mutex<PhaseTimers>,
}

impl Profiler {
    fn new() -> Self {
        Self {
            timers: Mutex::new(PhaseTimers {
                slots: [PhaseSlot::default(); PHASE_COUNT],
                starts: [None; PHASE_COUNT],
            }),
        }
    }

    pub fn global() -> &'static Profiler {
        static PROFILER: OnceLock<Profiler> = OnceLock::new();
        PROFILER.get_or_init(Profiler::new)
    }

    pub fn begin(&self, phase: Phase) {
        let mut timers = self.timers.lock().expect("profiler lock");
        let i = phase.index();
        if timers.starts[i].is_some() {
            return;
        }
        timers.starts[i] = Some(Instant::now());
        timers.slots[i].calls += 1;
    }

    pub fn end(&self, phase: Phase) {
        let mut timers = self.timers.lock().expect("profiler lock");
        let i = phase.index();
        if let Some(start) = timers.starts[i].take() {
            timers.slots[i].total_nanos += start.elapsed().as_nanos();
        }
    }

    /// Total milliseconds spent in a phase so far.
    pub fn total_ms(&self, phase: Phase) -> f64 {
        let timers = self.timers.lock().expect("profiler lock");
        timers.slots[phase.index()].total_nanos as f64 / 1_000_000.0
    }

    pub fn call_count(&self, phase: Phase) -> u64 {
        let timers = self.timers.lock().expect("profiler lock");
        timers.slots[phase.index()].calls
    }

    pub fn reset(&self) {
        let mut timers = self.timers.lock().expect("profiler lock");
        timers.slots = [PhaseSlot::default(); PHASE_COUNT];
        timers.starts = [None; PHASE_COUNT];
    }

    /// Formatted phase table, one line per phase with recorded time.
    pub fn report(&self) -> String {
        let timers = self.timers.lock().expect("profiler lock");
        let mut out = String::from("phase          time(ms)    calls   avg(ms)\n");
        let mut total = 0.0;
        for phase in Phase::ALL {
            let slot = &timers.slots[phase.index()];
            if slot.calls == 0 {
                continue;
            }
            let ms = slot.total_nanos as f64 / 1_000_000.0;
            let avg = ms / slot.calls as f64;
            out.push_str(&format!(
                "{:<12} {:>10.3} {:>8} {:>9.3}\n",
                phase.name(),
                ms,
                slot.calls,
                avg
            ));
            total += ms;
        }
        out.push_str(&format!("{:<12} {total:>10.3}\n", "total"));
        out
    }
}

/// RAII phase scope; ends the phase on drop.
pub struct PhaseScope {
    phase: Phase,
}

impl PhaseScope {
    pub fn enter(phase: Phase) -> Self {
        Profiler::global().begin(phase);
        Self { phase }
    }
}

impl Drop for PhaseScope {
    fn drop(&mut self) {
        Profiler::global().end(self.phase);
    }
}

// -------------------------------------------------------------------------
// Memory statistics
// -------------------------------------------------------------------------

pub static TOTAL_ALLOCATED: AtomicU64 = AtomicU64::new(0);
pub static TOTAL_FREED: AtomicU64 = AtomicU64::new(0);
pub static CURRENT_USED: AtomicI64 = AtomicI64::new(0);
pub static PEAK_USED: AtomicI64 = AtomicI64::new(0);
pub static ALLOCATION_COUNT: AtomicU64 = AtomicU64::new(0);
pub static FREE_COUNT: AtomicU64 = AtomicU64::new(0);

pub fn track_alloc(size: usize) {
    TOTAL_ALLOCATED.fetch_add(size as u64, Ordering::Relaxed);
    ALLOCATION_COUNT.fetch_add(1, Ordering::Relaxed);
    let current = CURRENT_USED.fetch_add(size as i64, Ordering::Relaxed) + size as i64;
    PEAK_USED.fetch_max(current, Ordering::Relaxed);
}

pub fn track_free(size: usize) {
    TOTAL_FREED.fetch_add(size as u64, Ordering::Relaxed);
    FREE_COUNT.fetch_add(1, Ordering::Relaxed);
    CURRENT_USED.fetch_sub(size as i64, Ordering::Relaxed);
}

// -------------------------------------------------------------------------
// IR generation counters
// -------------------------------------------------------------------------

pub static INST_COUNT: AtomicU64 = AtomicU64::new(0);
pub static BLOCK_COUNT: AtomicU64 = AtomicU64::new(0);
pub static FUNCTION_COUNT: AtomicU64 = AtomicU64::new(0);
pub static VAR_COUNT: AtomicU64 = AtomicU64::new(0);
pub static ARENA_ALLOCS: AtomicU64 = AtomicU64::new(0);
pub static ARENA_BYTES: AtomicU64 = AtomicU64::new(0);

pub fn counters_reset() {
    for counter in [
        &INST_COUNT,
        &BLOCK_COUNT,
        &FUNCTION_COUNT,
        &VAR_COUNT,
        &ARENA_ALLOCS,
        &ARENA_BYTES,
    ] {
        counter.store(0, Ordering::Relaxed);
    }
}

/// Log the counter snapshot through tracing at debug level.
pub fn counters_log() {
    tracing::debug!(
        target: "ir.counters",
        insts = INST_COUNT.load(Ordering::Relaxed),
        blocks = BLOCK_COUNT.load(Ordering::Relaxed),
        functions = FUNCTION_COUNT.load(Ordering::Relaxed),
        vars = VAR_COUNT.load(Ordering::Relaxed),
        arena_allocs = ARENA_ALLOCS.load(Ordering::Relaxed),
        arena_bytes = ARENA_BYTES.load(Ordering::Relaxed),
        "ir_counters"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_end_accumulates() {
        let profiler = Profiler::new();
        profiler.begin(Phase::Lexer);
        profiler.end(Phase::Lexer);
        assert_eq!(profiler.call_count(Phase::Lexer), 1);
        // A stray end is ignored.
        profiler.end(Phase::Lexer);
        assert_eq!(profiler.call_count(Phase::Lexer), 1);
    }

    #[test]
    fn nested_begin_is_ignored() {
        let profiler = Profiler::new();
        profiler.begin(Phase::Parser);
        profiler.begin(Phase::Parser);
        profiler.end(Phase::Parser);
        assert_eq!(profiler.call_count(Phase::Parser), 1);
    }

    #[test]
    fn report_lists_only_active_phases() {
        let profiler = Profiler::new();
        profiler.begin(Phase::Codegen);
        profiler.end(Phase::Codegen);
        let report = profiler.report();
        assert!(report.contains("codegen"));
        assert!(!report.contains("linking "));
    }

    #[test]
    fn memory_peak_tracks_high_water() {
        track_alloc(1000);
        track_alloc(500);
        track_free(1500);
        assert!(PEAK_USED.load(Ordering::Relaxed) >= 1500);
    }
}
