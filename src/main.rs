//=====================================================
// File: main.rs
//=====================================================
// Author: Emberlight Contributors
// License: MIT
// Goal: emberscript CLI entry point
// Objective: Command-line interface for evaluating expression files or an
//            interactive session, with token and AST dump options
//=====================================================

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;

use emberscript::interpreter::{eval_source, Environment};
use emberscript::parser;
use emberscript::tokenizer::Tokenizer;
use emberscript::Vm;

#[derive(ClapParser, Debug)]
#[command(name = "emberscript", about = "emberscript expression runtime")]
struct Args {
    /// Script file to evaluate; starts an interactive session when omitted.
    script: Option<PathBuf>,

    /// Print the token stream as JSON and exit.
    #[arg(long = "dump-tokens")]
    dump_tokens: bool,

    /// Print the parsed AST as JSON and exit.
    #[arg(long = "dump-ast")]
    dump_ast: bool,

    /// Execute through the bytecode VM instead of the tree evaluator.
    #[arg(long = "vm")]
    use_vm: bool,

    /// Enable tracing output (respects EMBERSCRIPT_LOG).
    #[arg(long = "trace")]
    trace: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.trace {
        let filter = tracing_subscriber::EnvFilter::try_from_env("EMBERSCRIPT_LOG")
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match &args.script {
        Some(path) => run_file(&args, path.clone()),
        None => repl(&args),
    }
}

fn run_file(args: &Args, path: PathBuf) -> Result<()> {
    let source = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    if args.dump_tokens {
        let tokens = Tokenizer::scan(&source)?;
        println!("{}", serde_json::to_string_pretty(&tokens)?);
        return Ok(());
    }
    if args.dump_ast {
        let exprs = parser::parse_program(&source)?;
        println!("{}", serde_json::to_string_pretty(&exprs)?);
        return Ok(());
    }

    if args.use_vm {
        let mut vm = Vm::new();
        let result = vm.eval_source(&source)?;
        println!("{}", result.str_());
    } else {
        let mut env = Environment::new();
        let mut last = None;
        for expr in parser::parse_program(&source)? {
            last = Some(emberscript::evaluate(&expr, &mut env)?);
        }
        if let Some(value) = last {
            println!("{}", value.str_());
        }
    }
    Ok(())
}

fn repl(args: &Args) -> Result<()> {
    let stdin = io::stdin();
    let mut env = Environment::new();
    let mut vm = Vm::new();

    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let outcome = if args.use_vm {
            vm.eval_source(line)
        } else {
            eval_source(line, &mut env)
        };
        match outcome {
            Ok(value) => println!("{}", value.str_()),
            Err(error) => eprintln!("[{}] {}", error.code_str(), error),
        }
    }
}

//=====================================================
// End of file
//=====================================================
