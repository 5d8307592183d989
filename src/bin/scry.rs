//! scry CLI binary entry point.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use scry::cli::{run_merge, run_parse, run_show, ParseOptions};

/// C++ header interrogation: parse declarations into a cross-language
/// interface database.
#[derive(Parser)]
#[command(name = "scry")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log verbosity: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse header files and write an interrogation database.
    Parse {
        /// Header files to parse
        files: Vec<PathBuf>,

        /// Directory to search for include files (repeatable)
        #[arg(short = 'I', long = "include")]
        include: Vec<PathBuf>,

        /// Module name recorded in the database
        #[arg(long, default_value = "scry")]
        module_name: String,

        /// Library name; its hash prefixes every unique wrapper name
        #[arg(long, default_value = "libscry")]
        library_name: String,

        /// Output database file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Treat unresolvable #include directives as warnings, not errors
        #[arg(long)]
        permissive: bool,

        /// Emit the batch report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge database files, unifying type records by true name.
    Merge {
        /// Input database files
        inputs: Vec<PathBuf>,

        /// Output database file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print a readable listing of a database file.
    Show {
        /// Database file to dump
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    let mut stdout = io::stdout();
    let result = match cli.command {
        Command::Parse {
            files,
            include,
            module_name,
            library_name,
            output,
            permissive,
            json,
        } => {
            let options = ParseOptions {
                files,
                include_dirs: include,
                module_name,
                library_name,
                output,
                permissive,
                json,
            };
            match run_parse(&options, &mut stdout) {
                // Warnings alone never fail the run; fatal parse failures
                // do.
                Ok(report) if report.failed() => return ExitCode::FAILURE,
                Ok(_) => Ok(()),
                Err(err) => Err(err),
            }
        }
        Command::Merge { inputs, output } => run_merge(&inputs, &output, &mut stdout),
        Command::Show { input } => run_show(&input, &mut stdout),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("scry: error: {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

/// Initialize the tracing subscriber on stderr.
fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
