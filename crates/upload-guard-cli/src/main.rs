use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use upload_guard_cli::cli::{self, KindArg, Settings};

#[derive(Parser)]
#[command(name = "upload-guard", version)]
#[command(about = "Sanitize untrusted SVG and XML uploads", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Suppress human-readable output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// List every removal and enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Policy file (JSON)
    #[arg(long, global = true, env = cli::POLICY_ENV)]
    policy: Option<PathBuf>,

    /// Override the policy's size ceiling, in bytes
    #[arg(long, global = true)]
    max_size: Option<usize>,

    /// Append decisions to the default audit log
    #[arg(long, global = true)]
    audit: bool,

    /// Append decisions to this audit log
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sanitize one file to -o or stdout
    Sanitize {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Declared MIME type used for routing
        #[arg(long)]
        mime: Option<String>,
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
    /// Report what sanitizing would change
    Check {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
    /// Print the effective policy as JSON
    Policy {
        #[arg(long, value_enum, default_value = "svg")]
        kind: KindArg,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.json {
        std::env::set_var("UPLOAD_GUARD_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("UPLOAD_GUARD_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("UPLOAD_GUARD_VERBOSE", "1");
    }
    if cli.no_color {
        std::env::set_var("UPLOAD_GUARD_NO_COLOR", "1");
    }

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env().add_directive(
        format!("upload_guard={level}")
            .parse()
            .unwrap_or_else(|_| LevelFilter::INFO.into()),
    );
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let settings = Settings {
        policy: cli.policy,
        max_size: cli.max_size,
        audit: cli.audit,
        audit_log: cli.audit_log,
    };

    match cli.command {
        Commands::Sanitize {
            input,
            output,
            mime,
            kind,
        } => cli::sanitize_cmd::run(&settings, &input, output, mime.as_deref(), kind),
        Commands::Check { inputs, kind } => cli::check_cmd::run(&settings, &inputs, kind),
        Commands::Policy { kind } => {
            cli::policy_cmd::run(&settings, kind)?;
            Ok(true)
        }
    }
}
