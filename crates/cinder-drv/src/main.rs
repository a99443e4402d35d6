use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cinder_drv::{run, validate_input, Config};

/// The Cinder compiler and C preprocessor front-end.
#[derive(Parser, Debug)]
#[command(name = "cinderc", version, about, long_about = None)]
struct Cli {
    /// Input source file.
    input: PathBuf,

    /// Output file (defaults to the input with a `.bc` extension).
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Add a directory to the user include search path.
    #[arg(short = 'I', value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Add a directory to the system include search path.
    #[arg(long = "isystem", value_name = "DIR")]
    system: Vec<PathBuf>,

    /// Preprocess the input as C and print the token stream.
    #[arg(short = 'E', long)]
    preprocess: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(message) = validate_input(&cli.input) {
        // Missing input is a usage error, like any malformed invocation.
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.error(clap::error::ErrorKind::ValueValidation, message)
            .exit();
    }

    let config = Config {
        input: cli.input,
        output: cli.output,
        include_dirs: cli.include,
        system_dirs: cli.system,
        preprocess: cli.preprocess,
    };
    exit(run(config));
}
