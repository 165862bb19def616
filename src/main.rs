mod projection;
mod source;
mod store;
mod tracker;
mod web;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::time::Duration;

use crate::projection::{build_path, center_of, from_plane, Viewport};
use crate::store::{demo_records, LocationStore, SortDirection, DEMO_OWNER};
use crate::web::Config;

#[derive(Parser)]
#[command(name = "track-o-mat")]
#[command(about = "Location tracking and history service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Validate a config file
    Validate { config: String },
    /// Insert the demo track into the store
    Seed {
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Print the projected path of the stored history as JSON
    Path {
        #[arg(short, long)]
        config: Option<String>,
        /// Only records with this owner tag
        #[arg(long)]
        owner: Option<String>,
    },
    /// Delete records older than the given age, e.g. "30days"
    Prune {
        #[arg(short, long)]
        config: Option<String>,
        #[arg(long, value_parser = humantime::parse_duration)]
        older_than: Duration,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(config.as_deref()).await,
        Commands::Validate { config } => validate(&config),
        Commands::Seed { config } => seed(config.as_deref()),
        Commands::Path { config, owner } => path(config.as_deref(), owner.as_deref()),
        Commands::Prune { config, older_than } => prune(config.as_deref(), older_than),
    }
}

fn load_config(path: Option<&str>) -> Option<Config> {
    let Some(path) = path else {
        return Some(Config::default());
    };
    match Config::from_file(path) {
        Ok(c) => Some(c),
        Err(e) => {
            eprintln!("Error loading config {}: {}", path, e);
            None
        }
    }
}

fn open_store(config: &Config) -> Option<LocationStore> {
    match LocationStore::open(&config.store.path) {
        Ok(s) => Some(s),
        Err(e) => {
            eprintln!("Error opening store {}: {}", config.store.path.display(), e);
            None
        }
    }
}

async fn serve(config_path: Option<&str>) -> ExitCode {
    let Some(config) = load_config(config_path) else {
        return ExitCode::FAILURE;
    };

    match web::run_server(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn validate(path: &str) -> ExitCode {
    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Config is valid");
    println!("  bind: {}", config.web.bind);
    println!("  store: {}", config.store.path.display());
    println!(
        "  tracker: owner {}, every {} (fastest {})",
        config.tracker.owner_id,
        humantime::format_duration(config.tracker.min_interval),
        humantime::format_duration(config.tracker.fastest_interval)
    );
    println!(
        "  map: levels {}..={}, {} px tiles",
        config.map.min_level, config.map.max_level, config.map.tile_size
    );
    println!("  source: {:?}", config.source.kind);
    ExitCode::SUCCESS
}

fn seed(config_path: Option<&str>) -> ExitCode {
    let Some(config) = load_config(config_path) else {
        return ExitCode::FAILURE;
    };
    let Some(store) = open_store(&config) else {
        return ExitCode::FAILURE;
    };

    match store.insert_many(demo_records(chrono::Utc::now().timestamp_millis())) {
        Ok(records) => {
            println!("Seeded {} locations for {}", records.len(), DEMO_OWNER);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Seed failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn path(config_path: Option<&str>, owner: Option<&str>) -> ExitCode {
    let Some(config) = load_config(config_path) else {
        return ExitCode::FAILURE;
    };
    let Some(store) = open_store(&config) else {
        return ExitCode::FAILURE;
    };

    let records = match owner {
        Some(owner) => store.query_by_owner(owner, SortDirection::Asc),
        None => store.query_all(SortDirection::Asc),
    };
    let records = match records {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Query failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let points = match build_path(&records) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Projection failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let center = center_of(&points);
    let output = serde_json::json!({
        "points": points,
        "center": center,
        "center_location": center.and_then(|c| from_plane(c).ok()),
        "viewport": Viewport::for_path(&points, &config.map),
    });

    match serde_json::to_string_pretty(&output) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Serialization failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn prune(config_path: Option<&str>, older_than: Duration) -> ExitCode {
    let Some(config) = load_config(config_path) else {
        return ExitCode::FAILURE;
    };
    let Some(store) = open_store(&config) else {
        return ExitCode::FAILURE;
    };

    let age_ms = i64::try_from(older_than.as_millis()).unwrap_or(i64::MAX);
    let threshold = chrono::Utc::now().timestamp_millis().saturating_sub(age_ms);
    match store.delete_older_than(threshold) {
        Ok(removed) => {
            println!("Removed {} locations", removed);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Prune failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
