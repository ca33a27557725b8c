use thiserror::Error;

/// Stage-tagged pipeline failure. The display form carries the stage
/// name, the file and a human description, which is exactly what the
/// driver reports per task.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("read source failed for {file}: {detail}")]
    ReadSource { file: String, detail: String },

    #[error("preprocess failed for {file}: {detail}")]
    Preprocess { file: String, detail: String },

    #[error("syntax error in {file}: {detail}")]
    Syntax { file: String, detail: String },

    #[error("semantic error in {file}: {detail}")]
    Semantic { file: String, detail: String },

    #[error("type error in {file}: {detail}")]
    Type { file: String, detail: String },

    #[error("code generation failed for {file}: {detail}")]
    Codegen { file: String, detail: String },

    #[error("project error: {0}")]
    Project(String),

    #[error("link failed: {0}")]
    Link(#[from] arklink::LinkError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
