//! Per-file compilation pipeline, the parallel build driver and the
//! project orchestrator.
//!
//! One [`pipeline::Pipeline`] compiles one source file through the fixed
//! stage sequence; the [`driver::ParallelDriver`] fans pipelines out over
//! a bounded worker pool (sharing one generic registry) and hands the
//! surviving artefacts to the ArkLink session; [`project::Project`]
//! expands `.esproj` files into task lists and owns the on-disk build
//! layout.

pub mod codegen;
pub mod driver;
pub mod error;
pub mod pipeline;
pub mod project;

pub use codegen::Target;
pub use driver::{CompileTask, DriverStats, ParallelDriver};
pub use error::PipelineError;
pub use pipeline::{Pipeline, Stage, StageResult};
pub use project::{Project, ProjectType};
