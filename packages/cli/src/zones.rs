//! `safezone zones`: manage zones persisted on the backend.

use clap::Subcommand;
use safezone_api::{ApiClient, ApiError};
use safezone_cli_utils::{MultiProgress, spinner};
use safezone_geo::Coordinate;
use safezone_zone_models::validate_radius;

use crate::config::{Config, ConfigError, parse_position};

#[derive(Subcommand)]
pub enum ZonesCommand {
    /// List stored zones
    List,
    /// Store a new zone
    Add {
        /// Display name
        #[arg(long)]
        name: String,
        /// Radius in kilometres
        #[arg(long)]
        radius_km: f64,
        /// Center as `lat,lng`
        #[arg(long, value_parser = parse_position)]
        center: Coordinate,
    },
    /// Delete every stored zone
    Clear,
}

#[derive(Debug, thiserror::Error)]
pub enum ZonesError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Validation(#[from] safezone_zone_models::ValidationError),
}

/// Runs one zone management command against the configured backend.
///
/// # Errors
///
/// Returns [`ZonesError`] if the backend is not configured, the request
/// fails, or the new zone is invalid.
pub async fn run(
    config: &Config,
    multi: &MultiProgress,
    command: ZonesCommand,
) -> Result<(), ZonesError> {
    let client = ApiClient::new(&config.base_url()?, config.request_timeout())?;

    match command {
        ZonesCommand::List => {
            let pb = spinner(multi, "Fetching zones...");
            let zones = client.list_zones().await;
            pb.finish_and_clear();

            let zones = zones?;
            println!("{:<26} {:<24} {:>10}  CENTER", "ID", "NAME", "RADIUS KM");
            println!("{}", "-".repeat(80));
            for zone in &zones {
                println!(
                    "{:<26} {:<24} {:>10.2}  {}",
                    zone.id.as_str(),
                    zone.name,
                    zone.radius_km,
                    zone.center
                );
            }
        }
        ZonesCommand::Add {
            name,
            radius_km,
            center,
        } => {
            if name.trim().is_empty() {
                return Err(safezone_zone_models::ValidationError::EmptyName.into());
            }
            validate_radius(radius_km)?;

            let zone = client.create_zone(name.trim(), radius_km, center).await?;
            log::info!("Stored zone {:?} as {}", zone.name, zone.id);
        }
        ZonesCommand::Clear => {
            client.clear_zones().await?;
            log::info!("Deleted all stored zones");
        }
    }

    Ok(())
}
