mod app;
mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, plant::PlantSubcommand, rules::RulesSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "taniclaw",
    about = "Rules-first plant care agent: decide, validate, act, record",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .taniclaw/)
    #[arg(long, global = true, env = "TANICLAW_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold .taniclaw/ with config, default rules and plant knowledge
    Init,

    /// Manage plants
    Plant {
        #[command(subcommand)]
        subcommand: PlantSubcommand,
    },

    /// Run one decision cycle now (all active plants, or one)
    Run {
        /// Plant id (omit to sweep every active plant)
        #[arg(long)]
        plant: Option<String>,
    },

    /// Run the scheduler until Ctrl-C
    Schedule,

    /// Show today's care instructions for a plant
    Today {
        #[arg(long)]
        plant: String,
    },

    /// Record and execute a manual (human override) action
    Act {
        #[arg(long)]
        plant: String,
        /// water, skip_water, fertilize, harvest, notify, alert or log
        #[arg(long = "type", value_name = "TYPE")]
        action_type: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        amount_ml: Option<u32>,
        #[arg(long)]
        amount_grams: Option<u32>,
    },

    /// Inspect and dry-run care rules
    Rules {
        #[command(subcommand)]
        subcommand: RulesSubcommand,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Schedule => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Plant { subcommand } => cmd::plant::run(&root, subcommand, cli.json),
        Commands::Run { plant } => cmd::run::run(&root, plant.as_deref(), cli.json),
        Commands::Schedule => cmd::schedule::run(&root),
        Commands::Today { plant } => cmd::today::run(&root, &plant, cli.json),
        Commands::Act {
            plant,
            action_type,
            description,
            amount_ml,
            amount_grams,
        } => cmd::act::run(
            &root,
            cmd::act::ActArgs {
                plant,
                action_type,
                description,
                amount_ml,
                amount_grams,
            },
            cli.json,
        ),
        Commands::Rules { subcommand } => cmd::rules::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
