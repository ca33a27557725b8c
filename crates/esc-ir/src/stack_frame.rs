//! Stack-frame size prediction and per-function usage accounting.
//!
//! The predictor matches the x86-64 SysV shape the code generator emits:
//! a 16-byte base, one 8-byte home slot per register-spilled parameter
//! past the sixth, 8 bytes per local, and five callee-saved slots. The
//! result is aligned up to 16 bytes and never drops below the 128-byte
//! floor the runtime reserves.

use tracing::warn;

pub const STACK_ALIGNMENT: usize = 16;
pub const MIN_STACK_SIZE: usize = 128;

const FRAME_BASE: usize = 16;
const CALLEE_SAVED_SLOTS: usize = 5;

fn align_up(size: usize) -> usize {
    size.next_multiple_of(STACK_ALIGNMENT)
}

/// Predict the frame size for a function from its parameter and local
/// counts alone.
pub fn predict(param_count: usize, local_count: usize) -> usize {
    let param_size = param_count.saturating_sub(6) * 8;
    let local_size = local_count * 8;
    let total = FRAME_BASE + param_size + local_size + CALLEE_SAVED_SLOTS * 8;
    align_up(total).max(MIN_STACK_SIZE)
}

/// Coarser estimate from rendered IR text: 64 bytes per ten instructions
/// over the floor.
pub fn predict_from_ir(ir_text: &str) -> usize {
    let instruction_count = ir_text.lines().count();
    let total = MIN_STACK_SIZE + (instruction_count / 10) * 64;
    align_up(total)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageKind {
    Local,
    Spill,
    Temp,
    CalleeSaved,
}

#[derive(Debug, Clone)]
pub struct StackUsage {
    pub offset: usize,
    pub size: usize,
    pub kind: UsageKind,
    pub description: String,
    pub location: Option<(String, u32)>,
}

/// One function's frame under analysis.
#[derive(Debug, Default)]
pub struct StackFrame {
    pub name: String,
    usages: Vec<StackUsage>,
    used: usize,
    max_usage: usize,
}

impl StackFrame {
    pub fn add_usage(
        &mut self,
        size: usize,
        kind: UsageKind,
        description: &str,
        location: Option<(String, u32)>,
    ) {
        if size == 0 {
            return;
        }
        self.usages.push(StackUsage {
            offset: self.used,
            size,
            kind,
            description: description.to_string(),
            location,
        });
        self.used += size;
        self.max_usage = self.max_usage.max(self.used);
    }

    pub fn usages(&self) -> &[StackUsage] {
        &self.usages
    }

    pub fn max_usage(&self) -> usize {
        self.max_usage
    }

    /// Aligned total with the minimum floor applied.
    pub fn total_size(&self) -> usize {
        align_up(self.used).max(MIN_STACK_SIZE)
    }

    /// Returns true when the frame cannot fit the limit. Warns through
    /// tracing at 80% occupancy.
    pub fn check_overflow(&self, stack_limit: usize) -> bool {
        let required = self.total_size();
        if required > stack_limit {
            warn!(
                target: "ir.stack",
                function = self.name.as_str(),
                required,
                limit = stack_limit,
                "stack overflow predicted"
            );
            return true;
        }
        let ratio = self.max_usage as f64 / stack_limit as f64;
        if ratio > 0.8 {
            warn!(
                target: "ir.stack",
                function = self.name.as_str(),
                used = self.max_usage,
                limit = stack_limit,
                "high stack usage"
            );
        }
        false
    }
}

/// Nested-function frame analyser; tracks current and maximum nesting.
#[derive(Debug, Default)]
pub struct FrameAnalyzer {
    frames: Vec<StackFrame>,
    current_depth: usize,
    max_depth: usize,
}

impl FrameAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_function(&mut self, name: &str) -> usize {
        self.frames.push(StackFrame {
            name: name.to_string(),
            ..StackFrame::default()
        });
        self.current_depth += 1;
        self.max_depth = self.max_depth.max(self.current_depth);
        self.frames.len() - 1
    }

    pub fn end_function(&mut self) {
        debug_assert!(self.current_depth > 0, "end_function without begin");
        self.current_depth = self.current_depth.saturating_sub(1);
    }

    pub fn frame_mut(&mut self, index: usize) -> &mut StackFrame {
        &mut self.frames[index]
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Largest predicted frame across all analysed functions.
    pub fn max_frame_size(&self) -> usize {
        self.frames
            .iter()
            .map(StackFrame::total_size)
            .max()
            .unwrap_or(MIN_STACK_SIZE)
    }
}
