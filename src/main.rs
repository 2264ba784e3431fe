// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stemmix::config;
use stemmix::controller::{keyboard, Controller};
use stemmix::source::Provider as _;
use stemmix::tracks::{GroupLabel, TrackId};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A multitrack mixer for separated stems."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists and verifies every track in the mixer's track source.
    Tracks {
        /// The path to the mixer config.
        config_path: String,
    },
    /// Adds a stem to the mixer's track source.
    Add {
        /// The path to the mixer config.
        config_path: String,
        /// The role of the stem: vocals, instrumental, drums, bass, guitar, piano or other.
        group: GroupLabel,
        /// The path to the stem.
        uri: String,
        /// The name of the file the stem was separated from.
        original_name: String,
    },
    /// Removes a stem from the mixer's track source.
    Remove {
        /// The path to the mixer config.
        config_path: String,
        /// The id of the stem to remove.
        id: String,
    },
    /// Loads every track and starts the mixer with a keyboard controller.
    Start {
        /// The path to the mixer config.
        config_path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Tracks { config_path } => {
            let mixer = config::init_mixer(&PathBuf::from(&config_path))?;
            let (loaded, errors) = mixer.sync_from_source().await?;

            if loaded.is_empty() && errors.is_empty() {
                println!("No tracks found in {}.", config_path);
                return Ok(());
            }

            println!("Tracks (count: {}):", loaded.len());
            for track in loaded.iter() {
                println!("- {}", track);
            }

            if !errors.is_empty() {
                println!("\nUnable to load (count: {}):", errors.len());
                for error in errors.iter() {
                    println!("- {}", error);
                }
            }
            mixer.shutdown().await;
        }
        Commands::Add {
            config_path,
            group,
            uri,
            original_name,
        } => {
            let source = config::init_source(&PathBuf::from(&config_path))?;
            let id = source.add_track(group, &uri, &original_name)?;
            println!("Added {} as {}.", uri, id);
        }
        Commands::Remove { config_path, id } => {
            let source = config::init_source(&PathBuf::from(&config_path))?;
            source.remove_track(&TrackId::from(id.as_str()))?;
            println!("Removed {}.", id);
        }
        Commands::Start { config_path } => {
            let mixer = Arc::new(config::init_mixer(&PathBuf::from(&config_path))?);
            let (loaded, errors) = mixer.sync_from_source().await?;
            for error in errors.iter() {
                warn!(err = error.to_string(), "Skipping track.");
            }
            info!(tracks = loaded.len(), "Mixer ready.");

            mixer.spawn_scheduler();
            let mut controller = Controller::new(mixer.clone(), Arc::new(keyboard::Driver::new()));
            controller.join().await?;
            mixer.shutdown().await;
        }
    }

    Ok(())
}
