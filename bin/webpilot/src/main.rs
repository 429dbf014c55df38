mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "webpilot")]
#[command(about = "Drive a local Chrome/Edge over the DevTools protocol", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Navigate to a URL and print the final location
    Navigate {
        url: String,

        /// Show the browser window instead of running headless
        #[arg(long)]
        headed: bool,
    },

    /// Capture a page screenshot
    Screenshot {
        url: String,

        /// Output file (default: timestamped PNG under the media dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Capture beyond the viewport
        #[arg(long)]
        full_page: bool,

        /// Show the browser window instead of running headless
        #[arg(long)]
        headed: bool,
    },

    /// Evaluate JavaScript on a page and print the result
    Eval {
        expression: String,

        /// Navigate here first (default: evaluate on the blank page)
        #[arg(long)]
        url: Option<String>,

        /// Show the browser window instead of running headless
        #[arg(long)]
        headed: bool,
    },

    /// Walk the interactive login flow for a service if it is needed
    Login {
        url: String,

        /// URL substring that marks a login page (repeatable)
        #[arg(long = "url-pattern")]
        url_patterns: Vec<String>,

        /// Title substring that marks a login page (repeatable)
        #[arg(long = "title-pattern")]
        title_patterns: Vec<String>,
    },

    /// List inspectable targets of an already-running browser
    Targets {
        /// Remote debugging port to query
        #[arg(short, long, default_value_t = 9377)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Navigate { url, headed } => {
            commands::navigate::run(url, headed).await?;
        }
        Commands::Screenshot {
            url,
            output,
            full_page,
            headed,
        } => {
            commands::screenshot::run(url, output, full_page, headed).await?;
        }
        Commands::Eval {
            expression,
            url,
            headed,
        } => {
            commands::eval::run(expression, url, headed).await?;
        }
        Commands::Login {
            url,
            url_patterns,
            title_patterns,
        } => {
            commands::login::run(url, url_patterns, title_patterns).await?;
        }
        Commands::Targets { port } => {
            commands::targets::run(port).await?;
        }
    }

    Ok(())
}
