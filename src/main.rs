use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use planwright::cli::OutputFormat;
use planwright::cli::commands::{self, generate::GenerateOptions, plan::PlanOptions};

#[derive(Parser)]
#[command(name = "planwright")]
#[command(
    version,
    about = "Generate project documents from a context graph across multiple LLM providers"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one or more documents
    Generate {
        #[arg(long = "type", short = 't', required = true, help = "Document type (repeatable)")]
        types: Vec<String>,
        #[arg(long, short, help = "Context graph JSON file")]
        context: PathBuf,
        #[arg(long, help = "Provider to try first (openai, google, azure-openai, ollama)")]
        provider: Option<String>,
        #[arg(long, help = "Model to use")]
        model: Option<String>,
        #[arg(long, short, help = "Write each document to <dir>/<type>.md")]
        output: Option<PathBuf>,
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List provider backends and their configuration state
    Providers {
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List known document types
    Types {
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show which context would be sent, without calling a provider
    Plan {
        #[arg(long = "type", short = 't', help = "Document type")]
        document_type: String,
        #[arg(long, short, help = "Context graph JSON file")]
        context: PathBuf,
        #[arg(long, short, help = "Model context window in tokens")]
        window: Option<u32>,
        #[arg(long, help = "Provider whose model window to plan against")]
        provider: Option<String>,
        #[arg(long, help = "Model whose window to plan against")]
        model: Option<String>,
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show recorded token usage
    Usage {
        #[arg(long, short = 'n', default_value = "20", help = "Recent records to show")]
        limit: usize,
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'g', long, help = "Show global config file only")]
        global: bool,
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mPlanwright encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Generate {
            types,
            context,
            provider,
            model,
            output,
            format,
        } => {
            let summary = commands::generate::run(GenerateOptions {
                document_types: types,
                context,
                provider,
                model,
                output,
                format,
            })?;
            if summary.failed > 0 {
                anyhow::bail!(
                    "{} of {} documents failed",
                    summary.failed,
                    summary.failed + summary.succeeded
                );
            }
        }
        Commands::Providers { format } => {
            commands::providers::run(format)?;
        }
        Commands::Types { format } => {
            commands::types::run(format)?;
        }
        Commands::Plan {
            document_type,
            context,
            window,
            provider,
            model,
            format,
        } => {
            commands::plan::run(PlanOptions {
                document_type,
                context,
                window,
                provider,
                model,
                format,
            })?;
        }
        Commands::Usage { limit, format } => {
            commands::usage::run(limit, format)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { global, format } => {
                commands::config::show(global, format)?;
            }
            ConfigAction::Path => {
                commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                if global {
                    commands::config::init_global(force)?;
                } else {
                    commands::config::init_project(force)?;
                }
            }
        },
    }

    Ok(())
}
