//! Clockgate CLI - biometric-verified clock-in/clock-out from the terminal.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod dashboard;
mod exit_codes;
mod utils;

use dashboard::{Connection, Device};

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error
  65  Clock action refused (attendance rules, missing location)
  69  Server unavailable
  77  Login refused, verification failed or role not allowed";

#[derive(Parser)]
#[command(name = "clockgate")]
#[command(author, version, about = "Biometric-verified attendance tracking", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Show debug logs
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// When to use colors
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Attendance server URL (default: built-in demo data)
    #[arg(long, global = true, env = "CLOCKGATE_SERVER", value_name = "URL")]
    server: Option<String>,

    /// Account email
    #[arg(long, global = true, env = "CLOCKGATE_EMAIL", default_value = "employee@pardee.com")]
    email: String,

    /// Account password
    #[arg(
        long,
        global = true,
        env = "CLOCKGATE_PASSWORD",
        default_value = "password",
        hide_default_value = true,
        hide_env_values = true
    )]
    password: String,
}

/// The simulated platform authenticator standing in for the device sensor.
#[derive(Args)]
struct DeviceArgs {
    /// How the authenticator prompt ends
    #[arg(long, value_enum, default_value_t = Prompt::Approve)]
    prompt: Prompt,

    /// Credential id held by the device (default: the demo device)
    #[arg(long, value_name = "ID")]
    credential: Option<String>,

    /// Device position as LAT,LNG
    #[arg(long, value_name = "LAT,LNG", default_value = "51.5074,-0.1278", conflicts_with = "no_location")]
    location: String,

    /// Report no device position
    #[arg(long)]
    no_location: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Prompt {
    /// The user verifies
    Approve,
    /// The user dismisses the prompt
    Cancel,
    /// No platform authenticator on this device
    Unsupported,
    /// The platform reports an insecure context
    Insecure,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Subcommand)]
enum Commands {
    /// Clock in after biometric verification
    ClockIn {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Clock out after biometric verification
    ClockOut {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Show today's clock-in/out and which actions are available
    Status,

    /// Show attendance history
    History {
        /// Employee id (admin and HR only; default: yourself)
        #[arg(long, value_name = "ID")]
        user: Option<String>,
    },

    /// Register this device's authenticator for your account
    Register {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// List employees (admin and HR only)
    Employees,

    /// Browse attendance logs (admin and HR only)
    Logs {
        /// Only this day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<chrono::NaiveDate>,

        /// Employee name contains
        #[arg(long)]
        search: Option<String>,

        /// Write the matching logs as CSV instead ("-" for stdout)
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,
    },

    /// Show today's headcount: present, absent and late (admin and HR only)
    Stats,

    /// Show absenteeism and working-hours reports (admin and HR only)
    Reports,
}

impl DeviceArgs {
    fn device(&self) -> Result<Device> {
        let location = if self.no_location {
            None
        } else {
            Some(utils::parse_location(&self.location)?)
        };
        Ok(Device {
            prompt: match self.prompt {
                Prompt::Approve => dashboard::PromptBehavior::Approve,
                Prompt::Cancel => dashboard::PromptBehavior::Cancel,
                Prompt::Unsupported => dashboard::PromptBehavior::Unsupported,
                Prompt::Insecure => dashboard::PromptBehavior::Insecure,
            },
            credential: self.credential.clone(),
            location,
        })
    }
}

fn init_logging(verbose: bool, quiet: bool, ansi: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let connection = Connection {
        server: cli.connection.server,
        email: cli.connection.email,
        password: cli.connection.password,
    };
    let quiet = cli.quiet;

    match cli.command {
        Commands::ClockIn { device } => {
            commands::clock::execute(connection, device.device()?, true, quiet).await
        }
        Commands::ClockOut { device } => {
            commands::clock::execute(connection, device.device()?, false, quiet).await
        }
        Commands::Status => commands::status::execute(connection, quiet).await,
        Commands::History { user } => commands::history::execute(connection, user, quiet).await,
        Commands::Register { device } => {
            commands::register::execute(connection, device.device()?, quiet).await
        }
        Commands::Employees => commands::admin::employees(connection, quiet).await,
        Commands::Logs {
            date,
            search,
            export,
        } => commands::admin::logs(connection, date, search, export, quiet).await,
        Commands::Stats => commands::admin::stats(connection, quiet).await,
        Commands::Reports => commands::admin::reports(connection, quiet).await,
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let ansi = match cli.color {
        ColorChoice::Always => {
            colored::control::set_override(true);
            true
        }
        ColorChoice::Never => {
            colored::control::set_override(false);
            false
        }
        ColorChoice::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
    };
    init_logging(cli.verbose, cli.quiet, ansi);

    let exit = match run(cli).await {
        Ok(()) => exit_codes::ExitCode::success(),
        Err(err) => exit_codes::ExitCode::from_anyhow(&err),
    };
    if let Some(message) = &exit.message {
        eprintln!("{} {}", "error:".red().bold(), message);
    }
    std::process::ExitCode::from(exit.code as u8)
}
