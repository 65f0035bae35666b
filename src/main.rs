use clap::{Args, Parser, Subcommand};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use secdkit as lib;
use secdkit::builtins::Prelude;
use secdkit::repl::{ReplState, handle_command, needs_more_lines};
use secdkit::runtime_io::StdIo;
use secdkit::vm::disasm::disassemble_module_to_string;
use secdkit::vm::{MachineConfig, Module, Outcome, ProgramShape, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const MODULE_EXT: &str = "secdb";

#[derive(Parser, Debug)]
#[command(version, about = "S-expression compiler and SECD machine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compiles and runs a source file
    Run(RunArgs),
    /// Compiles a source file into a module file
    Compile(CompileArgs),
    /// Runs a compiled module file
    Exec(ExecArgs),
    /// Prints the instruction listing of a source or module file
    Disasm(SourceArgs),
    /// Enters the interactive session
    Repl,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Source file (one S-expression), or a module file for `disasm`
    file: PathBuf,

    /// The program is a function applied to the argument list
    #[arg(long)]
    applied: bool,

    /// Makes the host primitives visible as the outermost frame
    #[arg(long)]
    prelude: bool,
}

#[derive(Args, Debug)]
struct MachineArgs {
    /// Argument list, as an S-expression
    #[arg(long, default_value = "NIL")]
    args: String,

    /// Maximum number of machine steps
    #[arg(long)]
    max_steps: Option<u64>,

    /// Maximum dump depth (defaults to 1_000_000)
    #[arg(long)]
    max_dump: Option<usize>,

    /// Writes the registers before every step
    #[arg(long)]
    trace: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,
    #[command(flatten)]
    machine: MachineArgs,
}

#[derive(Args, Debug)]
struct CompileArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output path (defaults to the source path with a .secdb extension)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ExecArgs {
    /// Module file written by `compile`
    module: PathBuf,
    #[command(flatten)]
    machine: MachineArgs,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    debug!(?cli, "starting");

    let result = match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::Compile(args) => cmd_compile(args),
        Command::Exec(args) => cmd_exec(args),
        Command::Disasm(args) => cmd_disasm(args),
        Command::Repl => run_repl(),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("{}", message);
            }
            ExitCode::FAILURE
        }
    }
}

// ========== 서브커맨드 ==========

fn compile_file(args: &SourceArgs) -> Result<Module, String> {
    let path = args.file.display().to_string();
    let src = std::fs::read_to_string(&args.file)
        .map_err(|e| format!("failed to read {}: {}", path, e))?;
    let shape = if args.applied {
        ProgramShape::Applied
    } else {
        ProgramShape::Expression
    };
    let prelude = Prelude::standard();
    let prelude = args.prelude.then_some(&prelude);
    lib::compile_source(&src, shape, prelude).map_err(|diagnostics| {
        diagnostics
            .iter()
            .map(|d| d.format(&path, &src, "Compilation failed", 4))
            .collect::<String>()
    })
}

fn machine_config(args: &MachineArgs) -> MachineConfig {
    let mut config = MachineConfig::default();
    config.max_steps = args.max_steps;
    if let Some(max_dump) = args.max_dump {
        config.max_dump = max_dump;
    }
    config
}

fn read_args(args: &MachineArgs) -> Result<Value, String> {
    lib::read_value(&args.args).map_err(|diagnostics| {
        diagnostics
            .iter()
            .map(|d| d.format("<args>", &args.args, "Invalid argument list", 3))
            .collect::<String>()
    })
}

fn execute(module: &Module, args: &MachineArgs) -> Result<(), String> {
    let argv = read_args(args)?;
    let config = machine_config(args);
    let outcome = if args.trace {
        let mut machine = lib::load_machine(module, argv, config);
        machine.run_traced(&mut StdIo)
    } else {
        lib::run_module(module, argv, config)
    };
    match outcome {
        Outcome::Halted(v) => {
            println!("{}", v);
            Ok(())
        }
        Outcome::Faulted(err) => Err(format!("Runtime Error: {}", err.message)),
    }
}

fn cmd_run(args: RunArgs) -> Result<(), String> {
    let module = compile_file(&args.source)?;
    execute(&module, &args.machine)
}

fn cmd_compile(args: CompileArgs) -> Result<(), String> {
    let module = compile_file(&args.source)?;
    let out = args
        .out
        .unwrap_or_else(|| args.source.file.with_extension(MODULE_EXT));
    let out = out.display().to_string();
    lib::save_module(&module, &out).map_err(|e| format!("failed to save {}: {}", out, e))?;
    println!("wrote {}", out);
    Ok(())
}

fn cmd_exec(args: ExecArgs) -> Result<(), String> {
    let path = args.module.display().to_string();
    let module = lib::load_module(&path).map_err(|e| format!("failed to load {}: {}", path, e))?;
    execute(&module, &args.machine)
}

fn cmd_disasm(args: SourceArgs) -> Result<(), String> {
    let is_module = args.file.extension().is_some_and(|ext| ext == MODULE_EXT);
    let module = if is_module {
        let path = args.file.display().to_string();
        lib::load_module(&path).map_err(|e| format!("failed to load {}: {}", path, e))?
    } else {
        compile_file(&args)?
    };
    print!("{}", disassemble_module_to_string(&module));
    Ok(())
}

// ========== REPL ==========

fn history_path() -> Option<PathBuf> {
    let dir = dirs::data_dir()?.join("secdkit");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir.join("history.txt"))
}

fn run_repl() -> Result<(), String> {
    println!("secd REPL. Type :help for commands, :quit to exit.");

    let mut rl = DefaultEditor::new().map_err(|e| format!("could not start the REPL: {}", e))?;
    let history = history_path();
    if let Some(path) = history.as_deref() {
        if rl.load_history(path).is_err() {
            debug!(path = %path.display(), "no history yet");
        }
    }

    let mut state = ReplState::new();
    let mut io = StdIo;
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "secd> " } else { "  ... " };
        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() && line.trim_start().starts_with(':') {
                    let _ = rl.add_history_entry(line.as_str());
                    match handle_command(&line, &mut state, &mut io) {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => eprintln!("{}", e),
                    }
                    continue;
                }

                buffer.push_str(&line);
                buffer.push('\n');
                if needs_more_lines(&buffer) {
                    continue;
                }
                let input = std::mem::take(&mut buffer);
                let _ = rl.add_history_entry(input.trim_end());

                let result = state.eval_line(&input);
                let trace = state.take_trace();
                if !trace.is_empty() {
                    print!("{}", trace);
                }
                match result {
                    Ok(Some(v)) => println!("{}", v),
                    Ok(None) => {}
                    Err(e) => eprintln!("{}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(format!("REPL error: {}", e)),
        }
    }

    if let Some(path) = history.as_deref() {
        if let Err(e) = rl.save_history(path) {
            warn!(error = %e, "could not save REPL history");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::parse_from([
            "secd", "run", "prog.lisp", "--prelude", "--args", "(1 2)", "--max-steps", "10",
        ]);
        match cli.command {
            Command::Run(args) => {
                assert!(args.source.prelude);
                assert!(!args.source.applied);
                assert_eq!(args.machine.args, "(1 2)");
                assert_eq!(machine_config(&args.machine).max_steps, Some(10));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
