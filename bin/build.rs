use asmtwo::{
    assembler::{Assembler, Build, BuildError, BuildOptions},
    symbol_table::FormatError,
};

use std::path::{Path, PathBuf};

use clap::{App, Arg, ArgMatches};
use slog::{o, Discard, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

enum Error {
    IO(PathBuf, std::io::Error),
    Build(BuildError),
    Format(FormatError),
}

impl From<BuildError> for Error {
    fn from(e: BuildError) -> Error {
        Error::Build(e)
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Error {
        Error::Format(e)
    }
}

fn parse_arguments() -> ArgMatches<'static> {
    App::new("asmtwo-build")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Assembles a source file into bytecode and a symbol table")
        .arg(Arg::with_name("source")
             .help("File containing assembly source")
             .value_name("SOURCE")
             .required(true)
             .index(1))
        .arg(Arg::with_name("output")
             .help("Where to write the bytecode, defaults to SOURCE with the .bin extension")
             .long("output")
             .short("o")
             .value_name("FILE")
             .takes_value(true))
        .arg(Arg::with_name("symbols")
             .help("Where to write the symbol table")
             .long("symbols")
             .value_name("FILE")
             .takes_value(true))
        .arg(Arg::with_name("debug")
             .help("Include label names in the symbol table")
             .long("debug"))
        .arg(Arg::with_name("dump")
             .help("Print an intermediate result instead of writing the bytecode")
             .long("dump")
             .value_name("WHAT")
             .possible_values(&["tokens", "ast", "bytes", "symbols"])
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

    match build(&args) {
        Ok(()) => (),
        Err(Error::IO(path, io)) => {
            eprintln!("{}: {}", path.display(), io);
            std::process::exit(1);
        },
        Err(Error::Build(err)) => {
            eprintln!("{}", err);
            std::process::exit(1);
        },
        Err(Error::Format(err)) => {
            eprintln!("could not encode the symbol table: {}", err);
            std::process::exit(1);
        },
    }
}

fn build(args: &ArgMatches) -> Result<(), Error> {
    let source_path = Path::new(args.value_of("source").unwrap_or_default());
    let source = std::fs::read_to_string(source_path)
        .map_err(|err| Error::IO(source_path.to_path_buf(), err))?;

    let options = BuildOptions {
        debug_symbols: args.is_present("debug"),
    };

    let assembler = Assembler::with_logger(options, logger(args.is_present("verbose")));
    let build = assembler.build(&source)?;

    if let Some(what) = args.value_of("dump") {
        dump(&build, what);
    }

    let output = match args.value_of("output") {
        Some(path) => Some(PathBuf::from(path)),
        None if !args.is_present("dump") => Some(source_path.with_extension("bin")),
        None => None,
    };

    if let Some(path) = output {
        std::fs::write(&path, build.bytes())
            .map_err(|err| Error::IO(path.clone(), err))?;
    }

    if let Some(path) = args.value_of("symbols") {
        let bytes = build.symbol_bytes()?;
        std::fs::write(path, bytes)
            .map_err(|err| Error::IO(PathBuf::from(path), err))?;
    }

    Ok(())
}

fn dump(build: &Build, what: &str) {
    match what {
        "tokens" => {
            for token in &build.tokens {
                println!("{}", token);
            }
        },
        "ast" => print!("{}", build.program),
        "bytes" => print!("{}", build.bytecode.hex_dump()),
        "symbols" => print!("{}", build.symbol_table),
        _ => (),
    }
}
