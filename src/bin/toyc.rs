//! The compiler driver.  Takes a source file, parses, lowers, selects, and
//! allocates it, and prints the IR dump followed by the AArch64 assembly to
//! stdout.  `--dump-ast` prepends a dump of the syntax tree.
//!
//! Run with `--help` for more info.

use std::fs;
use std::io::IsTerminal;
use std::process::exit;

use clap::Parser;

use toyc::{back, front, middle};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the input source file
    file: String,
    /// also print the syntax tree, before the IR and assembly dumps
    #[arg(long)]
    dump_ast: bool,
}

/// Print one error line, with the `error:` marker bolded red on a terminal.
fn report(message: impl std::fmt::Display) {
    if std::io::stderr().is_terminal() {
        eprintln!("toyc: \x1b[1;31merror:\x1b[0m {message}");
    } else {
        eprintln!("toyc: error: {message}");
    }
}

fn main() {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // --help and --version land here as well; only real usage
            // mistakes exit nonzero.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            exit(code);
        }
    };

    let source = match fs::read_to_string(&args.file) {
        Ok(source) => source,
        Err(err) => {
            report(format_args!("{err}: \"{}\"", args.file));
            exit(2);
        }
    };

    // Parse errors are recovered: report each one and keep going with the
    // partial unit.
    let parsed = front::parse(&args.file, &source);
    for diag in &parsed.errors {
        report(diag);
    }

    if args.dump_ast {
        print!("{}", front::dump_ast(&parsed.unit));
    }

    // Semantic errors are fatal.
    let ir = match middle::lower(&parsed.unit) {
        Ok(ir) => ir,
        Err(err) => {
            report(&err);
            exit(1);
        }
    };
    print!("{}", middle::dump_ir(&ir));

    let mut asm = back::code_gen(&ir);
    back::allocate(&mut asm);
    back::assign_frames(&mut asm);
    print!("{}", asm.asm_code());
}
