pub mod commands;

use clap::{Parser, Subcommand};
use formchain_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "formchain",
    about = "Formchain operator CLI",
    long_about = "Operate the form approval workflow: migrations, readiness checks, approver queues, decisions and status reconciliation.",
    after_help = "Examples:\n  formchain doctor --json\n  formchain queue --staff staff-dean-001\n  formchain reconcile --repair"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load reference form types and approving staff")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution"
    )]
    Config,
    #[command(about = "Validate config, DB connectivity and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Create a submission and its approval chain")]
    Submit {
        #[arg(long = "form-type")]
        form_type: String,
        #[arg(long)]
        student: String,
        #[arg(long, help = "Staff member picked for the first step")]
        assignee: Option<String>,
        #[arg(long, default_value = "{}", help = "Form payload as a JSON object")]
        data: String,
    },
    #[command(about = "List approval steps a staff member can decide right now")]
    Queue {
        #[arg(long)]
        staff: String,
    },
    #[command(about = "List active staff eligible for an approval role")]
    Staff {
        #[arg(long, help = "lecturer, dean, registrar or accounts_receivable")]
        role: String,
        #[arg(long)]
        department: Option<String>,
    },
    #[command(about = "List approval steps a staff member decided, newest first")]
    History {
        #[arg(long)]
        staff: String,
    },
    #[command(about = "Approve the ready step of a submission")]
    Approve {
        #[arg(long)]
        submission: String,
        #[arg(long)]
        step: String,
        #[arg(long)]
        by: String,
        #[arg(long)]
        comments: Option<String>,
        #[arg(long = "next-assignee")]
        next_assignee: Option<String>,
    },
    #[command(about = "Reject the ready step of a submission, closing it")]
    Reject {
        #[arg(long)]
        submission: String,
        #[arg(long)]
        step: String,
        #[arg(long)]
        by: String,
        #[arg(long)]
        reason: String,
    },
    #[command(about = "Compare stored submission status with the status derived from its steps")]
    Reconcile {
        #[arg(long, help = "Write the derived status where it can be settled")]
        repair: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let logging = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    if let Err(error) = init_logging(&logging) {
        eprintln!("logging disabled: {error}");
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Submit { form_type, student, assignee, data } => {
            commands::submit::run(commands::submit::SubmitInput {
                form_type,
                student,
                assignee,
                data,
            })
        }
        Command::Queue { staff } => commands::queue::run(&staff),
        Command::Staff { role, department } => {
            commands::staff::run(&role, department.as_deref())
        }
        Command::History { staff } => commands::queue::history(&staff),
        Command::Approve { submission, step, by, comments, next_assignee } => {
            commands::decide::approve(commands::decide::ApproveInput {
                submission,
                step,
                by,
                comments,
                next_assignee,
            })
        }
        Command::Reject { submission, step, by, reason } => {
            commands::decide::reject(commands::decide::RejectInput {
                submission,
                step,
                by,
                reason,
            })
        }
        Command::Reconcile { repair } => commands::reconcile::run(repair),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Installs the global subscriber. Events go to stderr; stdout carries command payloads.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing::Level;

    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|error| anyhow::anyhow!(error))
}
