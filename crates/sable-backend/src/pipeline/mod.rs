//! Per-routine compilation driver and batch front door
//!
//! Stages run strictly forward per routine: lowering, optimization to a
//! fixed point, slot numbering and live-range collection. A cooperative
//! stop flag on the compilation context lets any stage abort the
//! remaining ones (a routine with no body compiles to a trivial result).
//!
//! Routines never share mutable graph state, so a batch compiles them on
//! independent workers; the layout registry is read-only by this point
//! and the symbol sink sits behind a lock.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::ir::IrFunction;
use crate::layout::TypeLayout;
use crate::metrics::OptStats;
use crate::opt::{self, OptimizerOptions};
use crate::regalloc::{collect_live_ranges, number_instructions, LiveInterval};
use crate::lower;
use crate::symbols::{LinkRequest, SymbolSink};

/// Compiler configuration shared by every routine of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerOptions {
    /// Native pointer size of the target, in bytes
    pub pointer_size: u32,
    /// Run stack-local promotion inside the optimizer
    pub enable_variable_promotion: bool,
    /// Debug ceiling: stop optimizing a routine after this many changes
    pub max_optimization_changes: Option<u32>,
    /// Worker threads for batch compilation (`None` = one per CPU)
    pub workers: Option<usize>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            pointer_size: 4,
            enable_variable_promotion: true,
            max_optimization_changes: None,
            workers: None,
        }
    }
}

impl CompilerOptions {
    fn optimizer_options(&self) -> OptimizerOptions {
        OptimizerOptions {
            enable_promotion: self.enable_variable_promotion,
            max_changes: self.max_optimization_changes,
        }
    }
}

/// What the register allocator receives for one routine
#[derive(Debug)]
pub struct CompiledRoutine {
    /// The fully rewritten, slot-numbered graph
    pub func: IrFunction,
    /// One interval per live virtual register
    pub live_ranges: Vec<LiveInterval>,
    /// Rewrite counters from the optimizer
    pub stats: OptStats,
}

/// Drives one routine through the stage list
pub struct MethodCompiler<'a> {
    func: IrFunction,
    layout: &'a dyn TypeLayout,
    options: &'a CompilerOptions,
    /// Cooperative cancellation, checked between stages
    stop: bool,
}

impl<'a> MethodCompiler<'a> {
    pub fn new(func: IrFunction, layout: &'a dyn TypeLayout, options: &'a CompilerOptions) -> Self {
        MethodCompiler {
            func,
            layout,
            options,
            stop: false,
        }
    }

    /// Abort the remaining stages for this routine
    pub fn cancel(&mut self) {
        self.stop = true;
    }

    fn has_code(&self) -> bool {
        self.func
            .block_ids()
            .any(|b| self.func.block_first_instr(b).is_some())
    }

    /// Run lowering, optimization, and the live-range handoff
    pub fn compile(mut self, symbols: &mut dyn SymbolSink) -> Result<CompiledRoutine, CompileError> {
        // a replaced or bodiless routine skips every stage
        if !self.has_code() {
            self.stop = true;
        }

        if !self.stop {
            lower::run(&mut self.func, self.layout, symbols)?;
        }

        let stats = if !self.stop {
            opt::run(&mut self.func, &self.options.optimizer_options())
        } else {
            OptStats::new()
        };

        let live_ranges = if !self.stop {
            number_instructions(&mut self.func);
            collect_live_ranges(&self.func)
        } else {
            Vec::new()
        };

        Ok(CompiledRoutine {
            func: self.func,
            live_ranges,
            stats,
        })
    }
}

/// Outcome of compiling a batch of routines
#[derive(Debug)]
pub struct BatchResult {
    /// Per-routine outcomes, in submission order
    pub routines: Vec<Result<CompiledRoutine, CompileError>>,
    /// Rewrite counters merged across the successful routines
    pub stats: OptStats,
}

impl BatchResult {
    /// Routines that failed on a known limitation
    pub fn unsupported(&self) -> impl Iterator<Item = &CompileError> {
        self.routines
            .iter()
            .filter_map(|r| r.as_ref().err())
            .filter(|e| !e.is_defect())
    }

    /// Failures that indicate compiler defects; these deserve loud
    /// reporting, not a skip list
    pub fn defects(&self) -> impl Iterator<Item = &CompileError> {
        self.routines
            .iter()
            .filter_map(|r| r.as_ref().err())
            .filter(|e| e.is_defect())
    }
}

/// Adapter giving each worker mutable sink access through the shared lock
struct SharedSink<'a, S: SymbolSink>(&'a Mutex<S>);

impl<S: SymbolSink> SymbolSink for SharedSink<'_, S> {
    fn define_rodata(&mut self, name: &str, alignment: u32, data: &[u8]) -> bool {
        self.0.lock().define_rodata(name, alignment, data)
    }

    fn link_absolute(&mut self, request: LinkRequest) {
        self.0.lock().link_absolute(request)
    }
}

/// Compile independent routines, in parallel when the batch is large
/// enough; one routine's failure never aborts the others
pub fn compile_batch<L, S>(
    routines: Vec<IrFunction>,
    layout: &L,
    sink: &Mutex<S>,
    options: &CompilerOptions,
) -> BatchResult
where
    L: TypeLayout + Sync,
    S: SymbolSink,
{
    let worker_count = options
        .workers
        .unwrap_or_else(num_cpus::get)
        .clamp(1, routines.len().max(1));

    let results: Vec<(usize, Result<CompiledRoutine, CompileError>)> = if worker_count <= 1 {
        routines
            .into_iter()
            .enumerate()
            .map(|(index, func)| {
                let mut shared = SharedSink(sink);
                let result = MethodCompiler::new(func, layout, options).compile(&mut shared);
                (index, result)
            })
            .collect()
    } else {
        let jobs: Mutex<Vec<(usize, IrFunction)>> =
            Mutex::new(routines.into_iter().enumerate().collect());
        let done: Mutex<Vec<(usize, Result<CompiledRoutine, CompileError>)>> =
            Mutex::new(Vec::new());
        let jobs_ref = &jobs;
        let done_ref = &done;

        crossbeam::scope(|scope| {
            for _ in 0..worker_count {
                scope.spawn(move |_| {
                    let mut shared = SharedSink(sink);
                    loop {
                        let job = jobs_ref.lock().pop();
                        let Some((index, func)) = job else {
                            break;
                        };
                        let result =
                            MethodCompiler::new(func, layout, options).compile(&mut shared);
                        done_ref.lock().push((index, result));
                    }
                });
            }
        })
        .expect("batch worker panicked");

        done.into_inner()
    };

    let mut ordered = results;
    ordered.sort_by_key(|(index, _)| *index);

    let mut stats = OptStats::new();
    let routines: Vec<_> = ordered
        .into_iter()
        .map(|(_, result)| {
            if let Ok(compiled) = &result {
                stats.merge(&compiled.stats);
            }
            result
        })
        .collect();

    BatchResult { routines, stats }
}
