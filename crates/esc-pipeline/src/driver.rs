//! Parallel build driver.
//!
//! Tasks are independent per-file compilations. The driver first performs
//! a sequential pre-scan of every input for generic type declarations so
//! all workers observe the same registry snapshot, then dispatches tasks
//! over a bounded crossbeam channel to N worker threads, each running its
//! own [`Pipeline`]. Results are collected under a lock; any failure
//! disables the subsequent link step. There is no cancellation and no
//! retry: a failing worker stops its own pipeline and peers continue.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use tracing::{error, info};

use arklink::import::ImportKind;
use arklink::{ImportLibrary, LinkSession, LinkTarget};
use esc_front::{GenericRegistry, Lexer, TokenKind};
use esc_ir::profile::{Phase, Profiler};

use crate::codegen::Target;
use crate::error::PipelineError;
use crate::pipeline::Pipeline;

/// One unit of work, mutated by its worker and read back on join.
#[derive(Debug, Clone)]
pub struct CompileTask {
    pub input: PathBuf,
    pub output: PathBuf,
    pub object: Option<PathBuf>,
    pub target: Target,
    pub outcome: Option<Result<(), String>>,
    pub duration: Duration,
}

impl CompileTask {
    /// The artefact the link step consumes: the explicit object if the
    /// task has one, the stage output otherwise.
    pub fn link_artifact(&self) -> &Path {
        self.object.as_deref().unwrap_or(&self.output)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Runtime objects appended to every native link.
pub const RUNTIME_OBJECTS: &[&str] = &[
    "runtime.o",
    "output_cache.o",
    "allocator.o",
    "es_string.o",
];

/// Search prefixes for runtime objects, in fixed priority order.
const RUNTIME_SEARCH_SUBDIRS: &[&str] = &[
    "obj/runtime",
    "obj/core/utils",
    "obj/core/memory",
    "obj/compiler",
    "obj/common",
    "build",
];

/// Locate a runtime object: the bare name in the working directory, the
/// well-known subdirectories, the same subdirectories one level up, then
/// the executable directory and its `../../<subdir>` variants. The first
/// existing path wins; with no hit the bare name is returned unchanged.
pub fn find_runtime_object(name: &str) -> PathBuf {
    let direct = PathBuf::from(name);
    if direct.exists() {
        return direct;
    }
    for subdir in RUNTIME_SEARCH_SUBDIRS {
        let candidate = Path::new(subdir).join(name);
        if candidate.exists() {
            return candidate;
        }
    }
    for subdir in RUNTIME_SEARCH_SUBDIRS {
        let candidate = Path::new("..").join(subdir).join(name);
        if candidate.exists() {
            return candidate;
        }
    }
    if let Ok(exe) = std::env::current_exe()
        && let Some(exe_dir) = exe.parent()
    {
        let candidate = exe_dir.join(name);
        if candidate.exists() {
            return candidate;
        }
        for subdir in RUNTIME_SEARCH_SUBDIRS {
            let candidate = exe_dir.join("../..").join(subdir).join(name);
            if candidate.exists() {
                return candidate;
            }
        }
    }
    direct
}

/// Console intrinsics of the E# runtime, resolvable dynamically when the
/// static runtime objects are not on the search path.
pub fn builtin_runtime_imports() -> ImportLibrary {
    let mut lib = ImportLibrary::new("esruntime.builtin");
    let dll = if cfg!(windows) {
        "esruntime.dll"
    } else {
        "libesruntime.so"
    };
    for symbol in [
        "es_console_write_line",
        "es_console_write",
        "es_console_write_line_int",
        "es_console_write_int",
    ] {
        lib.add_entry(symbol, dll, ImportKind::Code);
    }
    lib
}

pub struct ParallelDriver {
    tasks: Vec<CompileTask>,
    max_threads: usize,
    registry: Arc<GenericRegistry>,
    any_failed: bool,
}

impl ParallelDriver {
    pub fn new(max_threads: usize) -> Self {
        Self {
            tasks: Vec::new(),
            max_threads: max_threads.max(1),
            registry: Arc::new(GenericRegistry::new()),
            any_failed: false,
        }
    }

    pub fn registry(&self) -> Arc<GenericRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn tasks(&self) -> &[CompileTask] {
        &self.tasks
    }

    pub fn add_task(
        &mut self,
        input: &Path,
        output: &Path,
        object: Option<&Path>,
        target: Target,
    ) {
        self.tasks.push(CompileTask {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            object: object.map(Path::to_path_buf),
            target,
            outcome: None,
            duration: Duration::ZERO,
        });
    }

    /// Sequential pre-scan: register every `class Name<T, ...>` found in
    /// any task input so workers share one registry snapshot before the
    /// first pipeline starts. Declarations are registered without bodies;
    /// the semantic stage fills those in later without clobbering.
    pub fn collect_generic_types(&self) {
        for task in &self.tasks {
            let Ok(source) = std::fs::read_to_string(&task.input) else {
                continue;
            };
            let tokens = Lexer::new(&source).tokenize();
            let mut i = 0usize;
            while i + 2 < tokens.len() {
                if tokens[i].kind == TokenKind::KwClass
                    && tokens[i + 1].kind == TokenKind::Identifier
                    && tokens[i + 2].kind == TokenKind::Lt
                {
                    let name = tokens[i + 1].text.clone();
                    let mut params = Vec::new();
                    let mut j = i + 3;
                    while j < tokens.len() {
                        match tokens[j].kind {
                            TokenKind::Identifier => params.push(tokens[j].text.clone()),
                            TokenKind::Comma => {}
                            _ => break,
                        }
                        j += 1;
                    }
                    if tokens.get(j).map(|t| t.kind) == Some(TokenKind::Gt) && !params.is_empty() {
                        self.registry.register(&name, Some(params), None);
                    }
                    i = j;
                }
                i += 1;
            }
        }
        info!(
            target: "driver",
            generics = self.registry.len(),
            "generic pre-scan complete"
        );
    }

    /// Dispatch every task over the worker pool and join. Returns the
    /// aggregate stats; per-task outcomes stay on the tasks.
    pub fn execute(&mut self) -> DriverStats {
        if self.tasks.is_empty() {
            return DriverStats::default();
        }
        self.collect_generic_types();

        let worker_count = self.max_threads.min(self.tasks.len());
        info!(
            target: "driver",
            tasks = self.tasks.len(),
            workers = worker_count,
            "parallel build start"
        );

        let (work_tx, work_rx) = bounded::<(usize, CompileTask)>(self.tasks.len());
        for (index, task) in self.tasks.iter().enumerate() {
            work_tx.send((index, task.clone())).expect("queue has capacity");
        }
        drop(work_tx);

        let results: Mutex<Vec<(usize, Result<(), String>, Duration)>> =
            Mutex::new(Vec::with_capacity(self.tasks.len()));
        let registry = &self.registry;

        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                let work_rx = work_rx.clone();
                let results = &results;
                scope.spawn(move || {
                    while let Ok((index, task)) = work_rx.recv() {
                        let start = Instant::now();
                        let mut pipeline =
                            Pipeline::new(task.input.clone(), task.output.clone(), task.target)
                                .with_registry(Arc::clone(registry));
                        let outcome = pipeline.execute().map_err(|e| e.to_string());
                        let duration = start.elapsed();
                        results
                            .lock()
                            .expect("driver results lock")
                            .push((index, outcome, duration));
                    }
                });
            }
        });

        let mut stats = DriverStats {
            total: self.tasks.len(),
            ..DriverStats::default()
        };
        let collected = results.into_inner().expect("driver results lock");
        for (index, outcome, duration) in collected {
            let task = &mut self.tasks[index];
            task.duration = duration;
            match &outcome {
                Ok(()) => stats.succeeded += 1,
                Err(message) => {
                    stats.failed += 1;
                    error!(target: "driver", file = %task.input.display(), "{message}");
                }
            }
            task.outcome = Some(outcome);
        }
        self.any_failed = stats.failed > 0;
        info!(
            target: "driver",
            succeeded = stats.succeeded,
            failed = stats.failed,
            "parallel build finished"
        );
        stats
    }

    /// Link every successful task artefact plus the runtime objects into
    /// `final_output`. Skipped when any task failed.
    pub fn link_results(
        &self,
        final_output: &Path,
        target: LinkTarget,
        import_libs: Vec<ImportLibrary>,
    ) -> Result<(), PipelineError> {
        if self.any_failed {
            return Err(PipelineError::Project(
                "link step skipped: compilation failures".to_string(),
            ));
        }
        let profiler = Profiler::global();
        profiler.begin(Phase::Linking);

        let mut session = LinkSession::new();
        session.set_target(target).set_output(final_output);
        session.add_import_library(builtin_runtime_imports());
        for lib in import_libs {
            session.add_import_library(lib);
        }
        let mut linked_any = false;
        for task in &self.tasks {
            if matches!(task.outcome, Some(Ok(()))) {
                session.add_input(task.link_artifact());
                linked_any = true;
            }
        }
        if !linked_any {
            profiler.end(Phase::Linking);
            return Err(PipelineError::Project("nothing to link".to_string()));
        }
        for name in RUNTIME_OBJECTS {
            let path = find_runtime_object(name);
            if path.exists() {
                session.add_input(&path);
            }
        }

        let result = session.link();
        profiler.end(Phase::Linking);
        result?;
        Ok(())
    }
}
