pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "mailsmith",
    about = "Mailsmith operator CLI",
    long_about = "Operate the Mailsmith email pipeline: migrations, config inspection, readiness checks, and offline classify/sanitize/lint runs.",
    after_help = "Examples:\n  mailsmith doctor --json\n  mailsmith classify --text \"make the button green\" --html-file email.html\n  mailsmith sanitize response.txt --include https://cdn.example.org/hero.png\n  mailsmith lint email.html"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, llm credentials, database schema, and fallback template")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Classify an instruction and show the prompt template it would use")]
    Classify {
        #[arg(long, help = "Instruction text")]
        text: String,
        #[arg(long, help = "Current document html, if any")]
        html_file: Option<PathBuf>,
        #[arg(long, help = "Declared operation: create, edit, or analyze")]
        declared: Option<String>,
    },
    #[command(about = "Clean a raw model response into a single email document")]
    Sanitize {
        input: PathBuf,
        #[arg(long = "include", help = "Image url to embed (repeatable)")]
        include: Vec<String>,
        #[arg(long, help = "Write cleaned html here instead of the JSON payload")]
        output: Option<PathBuf>,
    },
    #[command(about = "Check an email document for client-readiness issues")]
    Lint {
        input: PathBuf,
        #[arg(long, help = "Subject line to score; defaults to the document title")]
        subject: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Classify { text, html_file, declared } => {
            commands::classify::run(&text, html_file.as_deref(), declared.as_deref())
        }
        Command::Sanitize { input, include, output } => {
            commands::sanitize::run(&input, &include, output.as_deref())
        }
        Command::Lint { input, subject } => commands::lint::run(&input, subject.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
