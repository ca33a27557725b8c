//! `esc` entrypoint: the compiler driver CLI.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Once;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use arklink::LinkTarget;
use esc_ir::profile::Profiler;
use esc_pipeline::project::find_project_file;
use esc_pipeline::{ParallelDriver, Pipeline, Project, Target, project::ProjectType};

/// E# compiler driver.
#[derive(Parser, Debug)]
#[command(name = "esc", version, about = "E# compiler")]
struct Args {
    #[command(subcommand)]
    command: Command,
    /// Keep intermediate artefacts (.asm, .eo) after a build.
    #[arg(long = "keep-temp", global = true)]
    keep_temp: bool,
    /// Print the IR of each compiled file to stdout.
    #[arg(long = "show-ir", global = true)]
    show_ir: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a source file or project (default: first *.esproj here).
    Build {
        /// A `.es` source file or `.esproj` project file.
        input: Option<PathBuf>,
        /// Output kind.
        #[arg(long, short, default_value = "exe")]
        target: String,
        /// Final output path (single-file builds).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Remove the obj/ and bin/ directories of the current project.
    Clean,
    /// Run the front-end (through type checking) without emitting code.
    Check {
        input: Option<PathBuf>,
    },
    /// Scaffold a new project: `esc new console hello`.
    New {
        /// Project type: console or library.
        kind: String,
        name: String,
    },
    /// Print the toolchain version.
    Version,
}

fn configure_logging() -> Option<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(Path::new("."), "esc.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_) => None,
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            error!(target: "driver.panic", ?panic_info, "panic");
            default_panic(panic_info);
        }));
    });
}

fn native_link_target() -> LinkTarget {
    if cfg!(windows) {
        LinkTarget::Pe
    } else {
        LinkTarget::Elf
    }
}

fn parse_target(text: &str) -> Result<Target> {
    Target::parse(text).ok_or_else(|| anyhow!("unknown target '{text}' (asm|ir|exe|vm|eo)"))
}

/// Build a whole project: one task per compile item, then link when the
/// target calls for it.
fn build_project(project_path: &Path, target: Target, keep_temp: bool, show_ir: bool) -> Result<()> {
    let project = Project::load(project_path)?;
    project.prepare_dirs()?;
    info!(
        target: "driver",
        project = project.name.as_str(),
        %target,
        "project build"
    );

    // The native-executable path compiles to EO objects for ArkLink.
    let stage_target = if target == Target::Exe { Target::Eo } else { target };
    let mut driver = ParallelDriver::new(std::thread::available_parallelism().map_or(4, |n| n.get()));
    for item in &project.compile_items {
        let input = project.source_path(item);
        let output = project.intermediate_path(item, stage_target.artifact_extension());
        driver.add_task(&input, &output, None, stage_target);
    }
    let stats = driver.execute();
    for task in driver.tasks() {
        if let Some(Err(message)) = &task.outcome {
            eprintln!("error: {message}");
        }
    }
    if stats.failed > 0 {
        bail!("{} of {} file(s) failed to compile", stats.failed, stats.total);
    }

    if show_ir {
        print_project_ir(&project)?;
    }

    if target == Target::Exe {
        let final_output = project.final_output();
        driver
            .link_results(&final_output, native_link_target(), Vec::new())
            .context("link step failed")?;
        println!("built {}", final_output.display());
        if !keep_temp {
            for task in driver.tasks() {
                let _ = std::fs::remove_file(task.link_artifact());
            }
        }
    } else {
        println!(
            "compiled {} file(s) into {}",
            stats.succeeded,
            project.obj_dir().display()
        );
    }
    tracing::debug!(target: "driver", "\n{}", Profiler::global().report());
    Ok(())
}

/// `--show-ir` for projects: run an extra IR-target pass per item and
/// print the rendered modules.
fn print_project_ir(project: &Project) -> Result<()> {
    for item in &project.compile_items {
        let input = project.source_path(item);
        let ir_path = project.intermediate_path(item, "ir");
        let mut pipeline = Pipeline::new(input, ir_path.clone(), Target::Ir);
        if pipeline.execute().is_ok() {
            print!("{}", std::fs::read_to_string(&ir_path)?);
        }
    }
    Ok(())
}

/// Single-file build.
fn build_file(
    input: &Path,
    target: Target,
    output: Option<PathBuf>,
    show_ir: bool,
) -> Result<()> {
    let stage_target = if target == Target::Exe { Target::Eo } else { target };
    let output = output.unwrap_or_else(|| {
        input.with_extension(stage_target.artifact_extension())
    });
    let mut pipeline = Pipeline::new(input.to_path_buf(), output.clone(), stage_target);
    pipeline
        .execute()
        .map_err(|e| anyhow!("{e}"))?;

    if show_ir {
        let ir_path = output.with_extension("ir");
        let mut ir_pipeline = Pipeline::new(input.to_path_buf(), ir_path.clone(), Target::Ir);
        if ir_pipeline.execute().is_ok() {
            print!("{}", std::fs::read_to_string(&ir_path)?);
        }
    }

    if target == Target::Exe {
        let exe_path = output.with_extension(if cfg!(windows) { "exe" } else { "out" });
        let mut session = arklink::LinkSession::new();
        session.set_target(native_link_target()).set_output(&exe_path);
        session.add_import_library(esc_pipeline::driver::builtin_runtime_imports());
        session.add_input(&output);
        session.link()?;
        println!("built {}", exe_path.display());
    } else {
        println!("built {}", output.display());
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Build {
            input,
            target,
            output,
        } => {
            let target = parse_target(&target)?;
            let input = match input {
                Some(path) => path,
                None => find_project_file(Path::new("."))
                    .ok_or_else(|| anyhow!("no .esproj file in the current directory"))?,
            };
            if input.extension().is_some_and(|ext| ext == "esproj") {
                build_project(&input, target, args.keep_temp, args.show_ir)
            } else {
                build_file(&input, target, output, args.show_ir)
            }
        }
        Command::Clean => {
            let project_path = find_project_file(Path::new("."))
                .ok_or_else(|| anyhow!("no .esproj file in the current directory"))?;
            Project::load(&project_path)?.clean()?;
            println!("cleaned");
            Ok(())
        }
        Command::Check { input } => {
            let input = match input {
                Some(path) => path,
                None => find_project_file(Path::new("."))
                    .ok_or_else(|| anyhow!("no .esproj file in the current directory"))?,
            };
            let sources: Vec<PathBuf> =
                if input.extension().is_some_and(|ext| ext == "esproj") {
                    let project = Project::load(&input)?;
                    project
                        .compile_items
                        .iter()
                        .map(|item| project.source_path(item))
                        .collect()
                } else {
                    vec![input]
                };
            let mut failures = 0usize;
            for source in &sources {
                // Check mode never writes the output path.
                let mut pipeline =
                    Pipeline::new(source.clone(), source.with_extension("ir"), Target::Ir);
                if let Err(err) = pipeline.check() {
                    eprintln!("error: {err}");
                    failures += 1;
                }
            }
            if failures > 0 {
                bail!("{failures} of {} file(s) failed the check", sources.len());
            }
            println!("{} file(s) ok", sources.len());
            Ok(())
        }
        Command::New { kind, name } => {
            let project_type = match kind.as_str() {
                "console" => ProjectType::Console,
                "library" => ProjectType::Library,
                other => bail!("unknown project type '{other}' (console|library)"),
            };
            let project = Project::scaffold(Path::new("."), &name, project_type)?;
            println!("created {}", project.root.display());
            Ok(())
        }
        Command::Version => {
            println!("esc {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let _log_guard = configure_logging();
    install_panic_hook();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(target: "driver", "{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
