//! The per-file compilation pipeline.
//!
//! A pipeline runs one source file through the fixed stage sequence
//! ReadSource -> Preprocess -> Lex -> Parse -> Semantic -> TypeCheck ->
//! Codegen -> Complete. Each stage records an outcome and a duration for
//! reporting; the first failing stage stores a human-readable error and
//! short-circuits the rest. Stage artefacts (source text, tokens, AST,
//! analysis results) live in the pipeline and drop together when it does.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info_span};

use esc_front::ast::Program;
use esc_front::preprocess::Preprocessor;
use esc_front::semantic::{Analyzer, SemanticResult, Severity};
use esc_front::typecheck::TypeChecker;
use esc_front::{GenericRegistry, Lexer, Parser, Token, TokenKind};
use esc_ir::profile::{Phase, PhaseScope};

use crate::codegen::{CodeGenerator, Target};
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadSource,
    Preprocess,
    Lex,
    Parse,
    Semantic,
    TypeCheck,
    Codegen,
    Complete,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::ReadSource => "read-source",
            Stage::Preprocess => "preprocess",
            Stage::Lex => "lex",
            Stage::Parse => "parse",
            Stage::Semantic => "semantic",
            Stage::TypeCheck => "type-check",
            Stage::Codegen => "codegen",
            Stage::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: Stage,
    pub ok: bool,
    pub duration: Duration,
    pub file: String,
}

/// Artefacts owned by the pipeline. Field order is reverse construction
/// order so drop releases the newest artefact first.
#[derive(Default)]
struct Artifacts {
    semantic: Option<SemanticResult>,
    program: Option<Program>,
    tokens: Option<Vec<Token>>,
    processed: Option<String>,
    source: Option<String>,
}

pub struct Pipeline {
    input: PathBuf,
    output: PathBuf,
    target: Target,
    registry: Option<Arc<GenericRegistry>>,
    extra_macros: Vec<(String, String)>,
    stages: Vec<StageResult>,
    error: Option<String>,
    artifacts: Artifacts,
    total: Duration,
}

impl Pipeline {
    pub fn new(input: PathBuf, output: PathBuf, target: Target) -> Self {
        Self {
            input,
            output,
            target,
            registry: None,
            extra_macros: Vec::new(),
            stages: Vec::new(),
            error: None,
            artifacts: Artifacts::default(),
            total: Duration::ZERO,
        }
    }

    /// Share the driver's generic registry with this pipeline's semantic
    /// stage.
    pub fn with_registry(mut self, registry: Arc<GenericRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Append a caller macro ahead of execution.
    pub fn add_macro(&mut self, name: &str, replacement: &str) {
        self.extra_macros.push((name.to_string(), replacement.to_string()));
    }

    pub fn stage_results(&self) -> &[StageResult] {
        &self.stages
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// The analysed result, for callers (check mode, LSP) that want the
    /// diagnostics rather than an artefact on disk.
    pub fn semantic_result(&self) -> Option<&SemanticResult> {
        self.artifacts.semantic.as_ref()
    }

    fn file_name(&self) -> String {
        self.input.display().to_string()
    }

    fn run_stage<T>(
        &mut self,
        stage: Stage,
        body: impl FnOnce(&mut Self) -> Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        let span = info_span!("stage", name = stage.name(), file = %self.input.display());
        let _guard = span.enter();
        let start = Instant::now();
        let result = body(self);
        let duration = start.elapsed();
        self.stages.push(StageResult {
            stage,
            ok: result.is_ok(),
            duration,
            file: self.file_name(),
        });
        if let Err(err) = &result {
            self.error = Some(err.to_string());
            debug!(target: "pipeline.stage", stage = stage.name(), error = %err, "stage failed");
        }
        result
    }

    /// Analysis-only run for `esc check`: every stage up to and
    /// including type checking, with no artefact written.
    pub fn check(&mut self) -> Result<(), PipelineError> {
        self.run_front_end()
    }

    /// Execute every stage in order; the first failure is returned and
    /// the remaining stages never run.
    pub fn execute(&mut self) -> Result<(), PipelineError> {
        let start = Instant::now();
        self.run_front_end()?;

        self.run_stage(Stage::Codegen, |p| {
            let program = p.artifacts.program.as_ref().expect("parse stage ran");
            let generator = CodeGenerator::new(p.target, &p.file_name());
            generator.generate(program, &p.output)
        })?;

        self.total = start.elapsed();
        self.stages.push(StageResult {
            stage: Stage::Complete,
            ok: true,
            duration: self.total,
            file: self.file_name(),
        });
        Ok(())
    }

    fn run_front_end(&mut self) -> Result<(), PipelineError> {
        self.run_stage(Stage::ReadSource, |p| {
            let source =
                std::fs::read_to_string(&p.input).map_err(|e| PipelineError::ReadSource {
                    file: p.file_name(),
                    detail: e.to_string(),
                })?;
            p.artifacts.source = Some(source);
            Ok(())
        })?;

        self.run_stage(Stage::Preprocess, |p| {
            let mut preprocessor = Preprocessor::with_standard_macros();
            for (name, replacement) in &p.extra_macros {
                preprocessor.add_macro(name, replacement);
            }
            let source = p.artifacts.source.as_deref().unwrap_or_default();
            p.artifacts.processed = Some(preprocessor.process(source));
            Ok(())
        })?;

        self.run_stage(Stage::Lex, |p| {
            let _phase = PhaseScope::enter(Phase::Lexer);
            let processed = p.artifacts.processed.as_deref().unwrap_or_default();
            let tokens = Lexer::new(processed).tokenize();
            if let Some(bad) = tokens.iter().find(|t| t.kind == TokenKind::Error) {
                return Err(PipelineError::Syntax {
                    file: p.file_name(),
                    detail: format!("unexpected character '{}' at line {}", bad.text, bad.line),
                });
            }
            p.artifacts.tokens = Some(tokens);
            Ok(())
        })?;

        self.run_stage(Stage::Parse, |p| {
            let _phase = PhaseScope::enter(Phase::Parser);
            let tokens = p.artifacts.tokens.take().unwrap_or_default();
            let program = Parser::from_tokens(tokens).parse().map_err(|errors| {
                let first = &errors[0];
                PipelineError::Syntax {
                    file: p.file_name(),
                    detail: format!(
                        "{} at line {} (and {} more)",
                        first.message,
                        first.line,
                        errors.len() - 1
                    ),
                }
            })?;
            p.artifacts.program = Some(program);
            Ok(())
        })?;

        self.run_stage(Stage::Semantic, |p| {
            let _phase = PhaseScope::enter(Phase::Semantic);
            let analyzer = match &p.registry {
                Some(registry) => Analyzer::with_registry(Arc::clone(registry)),
                None => Analyzer::new(),
            };
            let program = p.artifacts.program.as_ref().expect("parse stage ran");
            let result = analyzer.analyze(program);
            let failed = !result.success();
            let first_error = result
                .diagnostics
                .iter()
                .find(|d| d.severity == Severity::Error)
                .cloned();
            p.artifacts.semantic = Some(result);
            if failed {
                let diag = first_error.expect("failure implies an error diagnostic");
                return Err(PipelineError::Semantic {
                    file: p.file_name(),
                    detail: format!("{} at line {}", diag.message, diag.line),
                });
            }
            Ok(())
        })?;

        self.run_stage(Stage::TypeCheck, |p| {
            let program = p.artifacts.program.as_ref().expect("parse stage ran");
            let diagnostics = TypeChecker::new().check(program);
            if let Some(diag) = diagnostics
                .iter()
                .find(|d| d.severity == Severity::Error)
            {
                return Err(PipelineError::Type {
                    file: p.file_name(),
                    detail: format!("{} at line {}", diag.message, diag.line),
                });
            }
            Ok(())
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_source(dir: &tempfile::TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn successful_run_records_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_source(
            &dir,
            "ok.es",
            "int32 main() { println(\"hello\"); return 0; }",
        );
        let output = dir.path().join("ok.ir");
        let mut pipeline = Pipeline::new(input, output.clone(), Target::Ir);
        pipeline.execute().unwrap();

        let stages: Vec<Stage> = pipeline.stage_results().iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::ReadSource,
                Stage::Preprocess,
                Stage::Lex,
                Stage::Parse,
                Stage::Semantic,
                Stage::TypeCheck,
                Stage::Codegen,
                Stage::Complete,
            ]
        );
        assert!(pipeline.stage_results().iter().all(|s| s.ok));
        assert!(output.exists());
    }

    #[test]
    fn syntax_error_short_circuits_at_parse() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_source(&dir, "bad.es", "int32 main( { }");
        let output = dir.path().join("bad.ir");
        let mut pipeline = Pipeline::new(input, output.clone(), Target::Ir);
        let err = pipeline.execute().unwrap_err();
        assert!(matches!(err, PipelineError::Syntax { .. }));

        let last = pipeline.stage_results().last().unwrap();
        assert_eq!(last.stage, Stage::Parse);
        assert!(!last.ok);
        assert!(pipeline.error().is_some());
        assert!(!output.exists());
    }

    #[test]
    fn missing_file_fails_read_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(
            dir.path().join("absent.es"),
            dir.path().join("absent.ir"),
            Target::Ir,
        );
        let err = pipeline.execute().unwrap_err();
        assert!(matches!(err, PipelineError::ReadSource { .. }));
        assert_eq!(pipeline.stage_results().len(), 1);
    }

    #[test]
    fn semantic_error_stops_before_type_check() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_source(&dir, "sem.es", "void main() { var x = missing; }");
        let mut pipeline = Pipeline::new(input, dir.path().join("sem.ir"), Target::Ir);
        let err = pipeline.execute().unwrap_err();
        assert!(matches!(err, PipelineError::Semantic { .. }));
        let stages: Vec<Stage> = pipeline.stage_results().iter().map(|s| s.stage).collect();
        assert!(!stages.contains(&Stage::TypeCheck));
    }

    #[test]
    fn type_error_is_reported_with_file_and_line() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_source(&dir, "ty.es", "int32 main() { return \"nope\"; }");
        let mut pipeline = Pipeline::new(input, dir.path().join("ty.ir"), Target::Ir);
        let err = pipeline.execute().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("ty.es"));
        assert!(text.contains("line 1"));
    }

    #[test]
    fn check_mode_runs_no_codegen() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_source(&dir, "chk.es", "int32 main() { return 0; }");
        let output = dir.path().join("chk.ir");
        let mut pipeline = Pipeline::new(input, output.clone(), Target::Ir);
        pipeline.check().unwrap();
        assert!(!output.exists());
        let last = pipeline.stage_results().last().unwrap();
        assert_eq!(last.stage, Stage::TypeCheck);
    }

    #[test]
    fn preprocessing_applies_standard_macros() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_source(&dir, "pp.es", "void main() { println(\"x\"); }");
        let output = dir.path().join("pp.ir");
        let mut pipeline = Pipeline::new(input, output.clone(), Target::Ir);
        pipeline.execute().unwrap();
        // The IR references the runtime symbol, not the surface macro.
        let ir = fs::read_to_string(&output).unwrap();
        assert!(ir.contains("es_console_write_line"));
        assert!(!ir.contains("println"));
    }

    #[test]
    fn caller_macros_are_applied_after_standard_table() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_source(&dir, "mac.es", "int32 main() { return LIMIT; }");
        let output = dir.path().join("mac.ir");
        let mut pipeline = Pipeline::new(input, output, Target::Ir);
        pipeline.add_macro("LIMIT", "64");
        pipeline.execute().unwrap();
        assert!(pipeline.error().is_none());
    }
}
