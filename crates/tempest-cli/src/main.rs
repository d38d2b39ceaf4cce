use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tempest_cache::{Cache, SqliteStore};
use tempest_core::rest::RestClient;
use tempest_core::{ConnectionType, HubConfig, HubEvent, WeatherApi, WeatherHub};
use tempest_types::{FieldSources, Observation};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "tempest")]
#[command(author, version, about = "CLI for Tempest weather stations", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Access token (overrides the config file)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the account's stations
    Stations,

    /// Fetch and print one station observation
    Observation {
        /// Station id (defaults to the configured station)
        #[arg(short, long)]
        station: Option<i64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Watch live conditions over all transports until interrupted
    Watch {
        /// Station id (defaults to the configured station)
        #[arg(short, long)]
        station: Option<i64>,

        /// Disable the local broadcast listener
        #[arg(long)]
        no_udp: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if let Some(token) = cli.token {
        config.token = token;
    }
    if config.token.is_empty() {
        bail!(
            "no access token configured; set `token` in {} or pass --token",
            config::default_config_path().display()
        );
    }

    match cli.command {
        Commands::Stations => stations(&config).await,
        Commands::Observation { station, format } => observation(&config, station, &format).await,
        Commands::Watch { station, no_udp } => watch(&config, station, no_udp).await,
    }
}

fn rest_client(config: &Config) -> Result<RestClient> {
    RestClient::new(&config.api_url, &config.token).context("building REST client")
}

fn open_cache(config: &Config) -> Result<Cache> {
    let store = match &config.cache_path {
        Some(path) => SqliteStore::open(path)?,
        None => SqliteStore::open_default()?,
    };
    Ok(Cache::new(Arc::new(store)))
}

async fn stations(config: &Config) -> Result<()> {
    let client = rest_client(config)?;
    let stations = client.get_stations().await?;

    if stations.is_empty() {
        println!("No stations on this account.");
        return Ok(());
    }

    for station in stations {
        println!(
            "{:>8}  {}  ({:.4}, {:.4})  {}",
            station.station_id, station.name, station.latitude, station.longitude, station.timezone
        );
        for device in &station.devices {
            println!(
                "          {} {} (id {})",
                device.device_type, device.serial_number, device.device_id
            );
        }
    }
    Ok(())
}

async fn observation(config: &Config, station: Option<i64>, format: &str) -> Result<()> {
    let station_id = match station.or(config.station_id) {
        Some(id) => id,
        None => {
            let client = rest_client(config)?;
            first_station_id(&client).await?
        }
    };

    let client = rest_client(config)?;
    let obs = client.get_station_observation(station_id).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&obs)?),
        _ => print_observation(&obs),
    }
    Ok(())
}

async fn watch(config: &Config, station: Option<i64>, no_udp: bool) -> Result<()> {
    let api = Arc::new(rest_client(config)?);
    let cache = open_cache(config)?;

    let hub_config = HubConfig {
        udp_enabled: config.udp.enabled && !no_udp,
        udp_port: config.udp.port,
        websocket_url: config.websocket_url.clone(),
        refresh_interval: Duration::from_secs(config.refresh_interval_secs),
        ..HubConfig::new(config.token.clone())
    };
    let hub = Arc::new(WeatherHub::new(api, cache, hub_config));
    hub.start().await;

    let stations = hub.refresh_stations().await?;
    let station_id = match station.or(config.station_id) {
        Some(id) => id,
        None => match stations.first() {
            Some(station) => station.station_id,
            None => bail!("no stations on this account"),
        },
    };

    let mut events = hub.subscribe();
    hub.select_station(station_id).await?;

    println!("Watching station {station_id} (press Ctrl-C to stop)");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&hub, event).await,
                Err(_) => break,
            },
        }
    }

    hub.stop().await;
    Ok(())
}

async fn first_station_id(client: &RestClient) -> Result<i64> {
    let stations = client.get_stations().await?;
    match stations.first() {
        Some(station) => Ok(station.station_id),
        None => bail!("no stations on this account"),
    }
}

async fn print_event(hub: &Arc<WeatherHub>, event: HubEvent) {
    match event {
        HubEvent::ObservationUpdated { serial, .. } => {
            if let Some(obs) = hub.resolve(&FieldSources::default()).await {
                println!("[{serial}] merged view:");
                print_observation(&obs);
            }
        }
        HubEvent::ConnectionChanged { connection } => {
            let label = match connection {
                ConnectionType::WebSocket => "websocket (live push)",
                ConnectionType::Udp => "udp (local broadcast)",
                ConnectionType::Rest => "rest (polling)",
                ConnectionType::None => "none",
            };
            println!("connection: {label}");
        }
        HubEvent::ForecastUpdated => println!("forecast updated"),
        HubEvent::StrikeRecorded { strike } => {
            println!(
                "lightning: {:.1} km away (energy {})",
                strike.distance / 1000.0,
                strike.energy
            );
        }
        HubEvent::RainStarted { .. } => println!("rain started"),
        HubEvent::ErrorChanged { error: Some(error) } => println!("error: {error}"),
        _ => {}
    }
}

fn print_observation(obs: &Observation) {
    println!("  time:       {}", obs.timestamp);
    println!("  source:     {}", obs.source);
    if let Some(v) = obs.air_temperature {
        println!("  temp:       {:.1} °C", v - 273.15);
    }
    if let Some(v) = obs.relative_humidity {
        println!("  humidity:   {:.0} %", v * 100.0);
    }
    if let Some(v) = obs.station_pressure {
        println!("  pressure:   {:.1} hPa", v / 100.0);
    }
    if let Some(v) = obs.wind_avg {
        let dir = obs
            .wind_direction
            .map(|d| format!(" @ {d:.0}°"))
            .unwrap_or_default();
        println!("  wind:       {v:.1} m/s{dir}");
    }
    if let Some(v) = obs.uv {
        println!("  uv:         {v:.1}");
    }
    if let Some(v) = obs.solar_radiation {
        println!("  solar:      {v:.0} W/m²");
    }
    if let Some(v) = obs.rain_accumulated {
        println!("  rain:       {:.2} mm", v * 1000.0);
    }
    if let Some(v) = obs.battery_voltage {
        println!("  battery:    {v:.2} V");
    }
}
