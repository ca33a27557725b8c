//! `esvm`: execute (or inspect) an `.esbc` bytecode file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use esc_vm::{Chunk, Vm, debug};

#[derive(Parser, Debug)]
#[command(name = "esvm", version, about = "E# bytecode VM")]
struct Args {
    /// Bytecode file produced by `esc build --target vm`.
    chunk: PathBuf,
    /// Print the disassembly instead of executing.
    #[arg(long, short)]
    disassemble: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let chunk = match Chunk::load(&args.chunk) {
        Ok(chunk) => chunk,
        Err(err) => {
            eprintln!("esvm: {err}");
            return ExitCode::FAILURE;
        }
    };

    if args.disassemble {
        print!(
            "{}",
            debug::disassemble_chunk(&chunk, &args.chunk.display().to_string())
        );
        return ExitCode::SUCCESS;
    }

    let mut vm = Vm::new();
    match vm.interpret(&chunk) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("esvm: {err}");
            ExitCode::FAILURE
        }
    }
}
