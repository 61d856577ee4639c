use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use lox_vm::compiler;
use lox_vm::config::ConfigError;
use lox_vm::error::exit_code;
use lox_vm::{RuntimeConfig, TimingsFormat, VM};

/// Environment variable holding the `tracing` filter, e.g. `LOX_LOG=lox_vm=debug`.
const LOG_ENV: &str = "LOX_LOG";

// Wrapper type for clap ValueEnum support
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum TimingsFormatArg {
    #[default]
    Human,
    Json,
}

impl From<TimingsFormatArg> for TimingsFormat {
    fn from(arg: TimingsFormatArg) -> Self {
        match arg {
            TimingsFormatArg::Human => TimingsFormat::Human,
            TimingsFormatArg::Json => TimingsFormat::Json,
        }
    }
}

#[derive(Parser)]
#[command(name = "lox")]
#[command(about = "A bytecode virtual machine for the Lox language", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Lox source file
    Run {
        /// The source file to run
        file: Option<PathBuf>,

        /// Execute code directly from command line
        #[arg(short = 'c', long, conflicts_with = "file")]
        code: Option<String>,

        /// Print every instruction and the stack while executing
        #[arg(long)]
        trace: bool,

        /// Dump bytecode to stderr before running
        #[arg(long)]
        dump_bytecode: bool,

        /// Print compile and execute timings (human or json format)
        #[arg(long, value_enum, require_equals = true, num_args = 0..=1, default_missing_value = "human")]
        timings: Option<TimingsFormatArg>,

        /// Configuration file (defaults to ./lox.toml when present)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Do not install host functions such as clock()
        #[arg(long)]
        no_natives: bool,
    },
    /// Start an interactive session
    Repl {
        /// Configuration file (defaults to ./lox.toml when present)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print the bytecode of a Lox source file without running it
    Disasm {
        /// The source file to disassemble
        file: PathBuf,
    },
    /// Compile a Lox source file without running it
    Check {
        /// The source file to check
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                exit(exit_code::USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing();

    match cli.command {
        Commands::Run {
            file,
            code,
            trace,
            dump_bytecode,
            timings,
            config,
            no_natives,
        } => {
            let mut config = match load_config(config.as_deref()) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("error: {}", e);
                    return exit(exit_code::CONFIG);
                }
            };
            config.trace_execution |= trace;
            config.dump_bytecode |= dump_bytecode;
            if let Some(format) = timings {
                config.timings = Some(format.into());
            }
            if no_natives {
                config.natives = false;
            }

            let source = match (code, file) {
                (Some(source), _) => source,
                (None, Some(path)) => match read_source(&path) {
                    Ok(source) => source,
                    Err(code) => return exit(code),
                },
                (None, None) => {
                    eprintln!("error: no file specified");
                    eprintln!("usage: lox run <file> or lox run -c <code>");
                    return exit(exit_code::USAGE);
                }
            };

            exit(run_source(&source, config))
        }
        Commands::Repl { config } => match load_config(config.as_deref()) {
            Ok(config) => exit(repl(config)),
            Err(e) => {
                eprintln!("error: {}", e);
                exit(exit_code::CONFIG)
            }
        },
        Commands::Disasm { file } => {
            let source = match read_source(&file) {
                Ok(source) => source,
                Err(code) => return exit(code),
            };
            match compiler::disassemble_source(&source) {
                Ok(listing) => {
                    print!("{}", listing);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("{}", e);
                    exit(exit_code::COMPILE)
                }
            }
        }
        Commands::Check { file } => {
            let source = match read_source(&file) {
                Ok(source) => source,
                Err(code) => return exit(code),
            };
            if let Err(e) = compiler::check(&source) {
                eprintln!("{}", e);
                return exit(exit_code::COMPILE);
            }
            println!("Check passed.");
            ExitCode::SUCCESS
        }
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// Install a stderr `tracing` subscriber when `LOX_LOG` is set.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr).with_target(true))
            .with(filter)
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig, ConfigError> {
    match path {
        Some(path) => RuntimeConfig::load(path),
        None => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            RuntimeConfig::discover(&cwd)
        }
    }
}

fn read_source(path: &Path) -> Result<String, i32> {
    fs::read_to_string(path).map_err(|e| {
        eprintln!("error: could not read {}: {}", path.display(), e);
        exit_code::IO
    })
}

fn run_source(source: &str, config: RuntimeConfig) -> i32 {
    let timings_format = config.timings;
    let mut vm = VM::new_with_config(config, Box::new(io::stdout()));
    let result = vm.interpret(source);

    if let (Some(format), Some(timings)) = (timings_format, vm.last_timings()) {
        eprintln!("{}", timings.render(format));
    }

    match result {
        Ok(()) => exit_code::OK,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}

/// Read-eval-print loop over stdin. Errors are reported and the session
/// continues with its globals intact.
fn repl(config: RuntimeConfig) -> i32 {
    let interactive = io::stdin().is_terminal();
    let mut vm = VM::new_with_config(config, Box::new(io::stdout()));
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        if interactive {
            print!("> ");
            let _ = io::stdout().flush();
        }
        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                eprintln!("error: {}", e);
                return exit_code::IO;
            }
            None => break,
        };
        if let Err(e) = vm.interpret(&line) {
            eprintln!("{}", e);
        }
    }

    if interactive {
        println!();
    }
    exit_code::OK
}
