use anyhow::{Context, Result};
use galaxy_nav::{
    api,
    cli::{Cli, Commands},
    config::{default_db_path, EngineConfig},
    engine::{Arrival, Navigator},
    store::{SqliteStore, WorldSeed},
};
use serde::Serialize;
use std::fs;
use std::sync::Arc;
use std::time::Instant;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse_args();
    let config = EngineConfig::load(cli.config.as_deref())?;

    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let store = Arc::new(
        SqliteStore::open(&db_path, config.busy_timeout())
            .with_context(|| format!("Failed to open world database {:?}", db_path))?,
    );
    let nav = Navigator::new(Arc::clone(&store), config);

    match cli.command {
        Commands::Init => {
            println!("World database ready at {:?}", db_path);
        }

        Commands::Import { input_dir } => {
            let start = Instant::now();

            let seed = WorldSeed::from_jsonl_dir(&input_dir)?;
            let record_count = store
                .import(&seed)
                .with_context(|| format!("Failed to import {:?}", input_dir))?;
            store.optimize()?;

            println!(
                "\nImported {} records into {:?} in {:.1}s",
                record_count,
                db_path,
                start.elapsed().as_secs_f64()
            );
        }

        Commands::Systems => print_json(&nav.list_systems()?)?,

        Commands::Pilot { username } => print_json(&nav.pilot_view(&username)?)?,

        Commands::Move { username, sector } => {
            let arrival = nav.move_pilot(&username, sector)?;
            print_arrival(&username, &arrival);
        }

        Commands::Warp { username, system } => {
            let arrival = nav.warp_pilot(&username, system)?;
            print_arrival(&username, &arrival);
        }

        Commands::Request { method, path, body } => {
            let response = api::dispatch(&nav, &method, &path, body.as_deref());
            println!("{}", response.status);
            print_json(&response.body)?;
            if !response.is_success() {
                anyhow::bail!("{} {} answered {}", method, path, response.status);
            }
        }

        Commands::Check => {
            let report = nav.universe()?.integrity_report();
            print!("{}", report);
            if !report.is_clean() {
                anyhow::bail!("World data in {:?} has integrity problems", db_path);
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_arrival(username: &str, arrival: &Arrival) {
    if arrival.moved {
        println!(
            "{} is now in sector {} of system {} ({} turns left)",
            username, arrival.sector_number, arrival.system_id, arrival.turns
        );
    } else {
        println!(
            "{} is already in sector {} of system {}",
            username, arrival.sector_number, arrival.system_id
        );
    }
}
