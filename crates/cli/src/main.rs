// xwalk - institution crosswalk builder

mod exit_codes;
mod logging;
mod output;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::EXIT_SUCCESS;

#[derive(Parser)]
#[command(name = "xwalk")]
#[command(about = "Link institution identifiers across registries (exact cascade + fuzzy fallback)")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Only log warnings and errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the crosswalk described by a TOML config
    #[command(after_help = "\
Examples:
  xwalk run schools.toml
  xwalk run schools.toml --output crosswalk.csv --report report.json
  xwalk run schools.toml --candidates review.csv --threads 4
  xwalk run schools.toml --output crosswalk.csv --json | jq .summary
  XWALK_LOG=debug xwalk run schools.toml -o crosswalk.csv")]
    Run {
        /// Path to the crosswalk config file
        config: PathBuf,

        /// Write the crosswalk CSV here (overrides [output].crosswalk; default stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Write the JSON report here (overrides [output].report)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Write every scored fuzzy candidate here (overrides [output].candidates)
        #[arg(long)]
        candidates: Option<PathBuf>,

        /// Print the JSON report to stdout
        #[arg(long)]
        json: bool,

        /// Worker threads for fuzzy retrieval (default: one per core)
        #[arg(long, env = "XWALK_THREADS")]
        threads: Option<usize>,
    },

    /// Check a config and its input files without matching anything
    #[command(after_help = "\
Examples:
  xwalk validate schools.toml")]
    Validate {
        /// Path to the crosswalk config file
        config: PathBuf,
    },

    /// Print the effective exact-match rounds
    #[command(after_help = "\
Examples:
  xwalk rounds schools.toml")]
    Rounds {
        /// Path to the crosswalk config file
        config: PathBuf,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        "\nengine:  crosswalk-linkage ", env!("CARGO_PKG_VERSION"),
        "\nlog:     XWALK_LOG",
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::configure_logging(cli.quiet);

    let result = match cli.command {
        Commands::Run {
            config,
            output,
            report,
            candidates,
            json,
            threads,
        } => run::cmd_run(run::RunArgs {
            config,
            output,
            report,
            candidates,
            json,
            threads,
        }),
        Commands::Validate { config } => run::cmd_validate(config),
        Commands::Rounds { config } => run::cmd_rounds(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}
