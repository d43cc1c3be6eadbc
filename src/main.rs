use argh::FromArgs;
use jobsh::config::{DEFAULT_MAX_ARGS, DEFAULT_MAX_JOBS};
use jobsh::{Interpreter, ShellConfig};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(FromArgs, Debug)]
/// Interactive shell with pipelines and background jobs.
struct Args {
    #[argh(option, default = "DEFAULT_MAX_JOBS")]
    /// maximum number of background jobs tracked at once.
    max_jobs: usize,

    #[argh(option, default = "DEFAULT_MAX_ARGS")]
    /// maximum number of words on one input line.
    max_args: usize,

    #[argh(option, default = "String::from(\"warn\")")]
    /// log filter used when RUST_LOG is not set.
    log_level: String,
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    tracing::debug!("Parsed CLI arguments: {:?}", args);

    let config = ShellConfig::default()
        .with_max_jobs(args.max_jobs)
        .with_max_args(args.max_args);
    let mut shell = Interpreter::new(config);

    if let Err(err) = shell.env().interrupt.install() {
        eprintln!("jobsh: cannot install the interrupt handler: {}", err);
        return ExitCode::FAILURE;
    }

    match shell.repl() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("jobsh: {}", err);
            ExitCode::FAILURE
        }
    }
}
