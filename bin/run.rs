use asmtwo::{
    assembler::{Assembler, BuildError, BuildOptions},
    compiler::ADDRESS_SPACE,
    emulator::{Emulator, ExecutionError, FlatMemory, StdIo},
};

use std::path::Path;

use clap::{App, Arg, ArgMatches};
use slog::{info, o, Discard, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

enum Error {
    IO(std::io::Error),
    Arguments(String),
    Build(BuildError),
    Execution(ExecutionError),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::IO(e)
    }
}

impl From<BuildError> for Error {
    fn from(e: BuildError) -> Error {
        Error::Build(e)
    }
}

impl From<ExecutionError> for Error {
    fn from(e: ExecutionError) -> Error {
        Error::Execution(e)
    }
}

fn parse_arguments() -> ArgMatches<'static> {
    App::new("asmtwo-run")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Utility for assembling and executing programs")
        .arg(Arg::with_name("source")
             .help("File containing assembly source (.a2s) or bytecode")
             .value_name("FILE")
             .required(true)
             .index(1))
        .arg(Arg::with_name("max-steps")
             .help("Stop after executing this many instructions")
             .long("max-steps")
             .value_name("N")
             .takes_value(true))
        .arg(Arg::with_name("verbose")
             .help("Enables verbose logging")
             .long("verbose")
             .short("v"))
        .get_matches()
}

fn logger(verbose: bool) -> Logger {
    if !verbose {
        return Logger::root(Discard, o!());
    }

    let decorator = TermDecorator::new().build();
    let drain = FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    Logger::root(drain, o!())
}

fn main() {
    let args = parse_arguments();

    let result = run(&args);

    if let Err(err) = result {
        match err {
            Error::IO(io) => eprintln!("IO error: {}", io),
            Error::Arguments(message) => eprintln!("{}", message),
            Error::Build(build) => eprintln!("{}", build),
            Error::Execution(execution) => eprintln!("Execution error: {}", execution),
        }

        std::process::exit(1);
    }
}

fn run(args: &ArgMatches) -> Result<(), Error> {
    let logger = logger(args.is_present("verbose"));
    let file_path = args.value_of("source").unwrap_or_default();

    let max_steps = match args.value_of("max-steps") {
        Some(value) => Some(value.parse::<u64>()
            .map_err(|_| Error::Arguments(format!("invalid step count '{}'", value)))?),
        None => None,
    };

    let bytes = if Path::new(file_path).extension().map_or(false, |ext| ext == "a2s") {
        let source = std::fs::read_to_string(file_path)?;

        Assembler::with_logger(BuildOptions::default(), logger.clone())
            .build(&source)?
            .bytecode
            .bytes
    } else {
        std::fs::read(file_path)?
    };

    if bytes.len() > ADDRESS_SPACE {
        return Err(Error::Arguments(format!("{} is larger than the 64 KiB memory", file_path)));
    }

    let memory = FlatMemory::with_program(&bytes);
    let mut emulator = Emulator::with_logger(memory, StdIo, logger.clone());

    let cycles = match max_steps {
        Some(limit) => emulator.run_for(limit)?,
        None => emulator.run()?,
    };

    if emulator.halted {
        info!(logger, "program halted"; "cycles" => cycles);
    } else {
        eprintln!("stopped after {} cycles without halting", cycles);
    }

    Ok(())
}
