use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use paramstage::cli::{self, CliContext};
use paramstage::config::StageConfig;
use paramstage::models::Service;
use paramstage::Result;
use std::io;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "paramstage")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stage, review and apply parameter and secret changes", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show staged changes
    Status {
        /// Service (param or secret); all services when omitted
        service: Option<Service>,

        /// Only this item
        #[arg(short, long)]
        name: Option<String>,

        /// Print staged values
        #[arg(short = 'v', long)]
        show_values: bool,

        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },

    /// Stage creation of a new item
    Add {
        service: Service,
        name: String,

        /// Value (prompted for when omitted)
        value: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Stage a new value for an existing item
    Edit {
        service: Service,
        name: String,

        /// Value (prompted for when omitted)
        value: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Stage deletion of an item
    Delete {
        service: Service,
        name: String,

        /// Delete secrets immediately, without a recovery window
        #[arg(short, long)]
        force: bool,

        /// Days a deleted secret stays recoverable (7-30)
        #[arg(long)]
        recovery_window: Option<u32>,
    },

    /// Stage tags to add (key=value)
    Tag {
        service: Service,
        name: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Stage tag keys to remove
    Untag {
        service: Service,
        name: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Withdraw staged tag keys
    #[command(name = "cancel-tag")]
    CancelTag {
        service: Service,
        name: String,
        #[arg(required = true)]
        keys: Vec<String>,

        /// Withdraw staged removals instead of additions
        #[arg(short, long)]
        remove: bool,
    },

    /// Unstage an item, restore it to a version (name#version), or clear a service
    Reset {
        service: Service,

        /// Item name, or name#version to stage a restore
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        spec: Option<String>,

        /// Unstage everything for the service
        #[arg(short, long)]
        all: bool,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Compare staged changes with the remote
    Diff {
        /// Service (param or secret); all services when omitted
        service: Option<Service>,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        json: bool,
    },

    /// Push staged changes to the remote
    Apply {
        service: Service,

        /// Only this item
        #[arg(short, long)]
        name: Option<String>,

        /// Apply over stale or diverged items
        #[arg(long)]
        ignore_conflicts: bool,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,

        #[arg(short, long)]
        json: bool,
    },

    /// Run the staging agent (HTTP)
    Serve {
        /// Port to listen on (default from config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    init_tracing(default_level);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", format!("Error: failed to create tokio runtime: {}", e).red());
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_async(cli)) {
        eprintln!("{}", format!("Error: {:#}", e).red());
        std::process::exit(1);
    }
}

async fn run_async(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "paramstage", &mut io::stdout());
        }

        Commands::Serve { port } => {
            let config = StageConfig::load()?;
            println!(
                "{}",
                format!("Starting staging agent for {}", config.scope()).cyan()
            );
            cli::serve::run(config, port).await?;
        }

        command => {
            let ctx = CliContext::load()?;
            run_staging(&ctx, command).await?;
        }
    }

    Ok(())
}

async fn run_staging(ctx: &CliContext, command: Commands) -> Result<()> {
    match command {
        Commands::Status {
            service,
            name,
            show_values,
            json,
        } => cli::status::run(ctx, service, name, show_values, json)?,

        Commands::Add {
            service,
            name,
            value,
            description,
        } => cli::stage::run_add(ctx, service, name, value, description).await?,

        Commands::Edit {
            service,
            name,
            value,
            description,
        } => cli::stage::run_edit(ctx, service, name, value, description).await?,

        Commands::Delete {
            service,
            name,
            force,
            recovery_window,
        } => cli::stage::run_delete(ctx, service, name, force, recovery_window).await?,

        Commands::Tag {
            service,
            name,
            tags,
        } => cli::tag::run_tag(ctx, service, name, tags).await?,

        Commands::Untag {
            service,
            name,
            keys,
        } => cli::tag::run_untag(ctx, service, name, keys).await?,

        Commands::CancelTag {
            service,
            name,
            keys,
            remove,
        } => cli::tag::run_cancel(ctx, service, name, keys, remove)?,

        Commands::Reset {
            service,
            spec,
            all,
            yes,
        } => cli::reset::run(ctx, service, spec, all, yes).await?,

        Commands::Diff {
            service,
            name,
            json,
        } => cli::diff::run(ctx, service, name, json).await?,

        Commands::Apply {
            service,
            name,
            ignore_conflicts,
            yes,
            json,
        } => cli::apply::run(ctx, service, name, ignore_conflicts, yes, json).await?,

        // Handled in run_async
        Commands::Serve { .. } | Commands::Completions { .. } => {}
    }
    Ok(())
}
