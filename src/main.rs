use std::fs::File;
use std::io;
use std::io::prelude::*;

mod ast;
mod backpatch;
mod code_gen;
mod common;
mod compiler;
mod image;
mod lexer;
mod parser;
mod scope;
mod type_check;
mod vm;

use crate::common::{CompileError, CompileResult};
use crate::compiler::{compile_source, ProgramOutput};
use crate::vm::Vm;

fn main() -> CompileResult {
    if let Some(file_name) = std::env::args().nth(1) {
        run_file(&file_name)
    } else {
        repl()
    }
}

fn repl() -> CompileResult {
    loop {
        print!("> ");
        io::stdout().flush().map_err(|_| CompileError::File)?;
        let mut line = String::new();
        let bytes = io::stdin()
            .read_line(&mut line)
            .map_err(|_| CompileError::File)?;
        if bytes == 0 {
            println!();
            break;
        }
        run_source(&line);
    }
    Ok(())
}

fn run_file(file_name: &str) -> CompileResult {
    let mut file = File::open(file_name).map_err(|_| CompileError::File)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|_| CompileError::File)?;
    if run_source(&contents) {
        Ok(())
    } else {
        Err(CompileError::Source)
    }
}

/// Reports every program in the source; false if any of them failed.
fn run_source(source: &str) -> bool {
    let mut clean = true;
    for output in compile_source(source) {
        clean &= report(&output);
    }
    clean
}

fn report(output: &ProgramOutput) -> bool {
    for diagnostic in output.diagnostics.iter() {
        eprintln!("program {}: {}", output.number, diagnostic);
    }
    let errors = output.diagnostics.error_count();
    let warnings = output.diagnostics.warning_count();
    match &output.image {
        Some(image) => {
            println!(
                "Program {} compiled with {} error(s) and {} warning(s)",
                output.number, errors, warnings
            );
            print!("{}", image);
            match Vm::new(image).run() {
                Ok(program_output) => println!("Output: {}", program_output),
                Err(e) => eprintln!("program {}: runtime error: {}", output.number, e),
            }
            true
        }
        None => {
            println!(
                "Program {} failed with {} error(s) and {} warning(s); no image produced",
                output.number, errors, warnings
            );
            false
        }
    }
}
