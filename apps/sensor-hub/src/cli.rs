use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sensor-hub",
    version,
    about = "Environmental sensor ingest with live viewer fan-out"
)]
pub struct Args {
    /// Listen address. Use 0.0.0.0 so devices on the LAN can post readings.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value_t = 3000)]
    pub port: u16,
    /// SQLite database file (overrides SENSOR_HUB_DATABASE_PATH).
    #[arg(long)]
    pub database_path: Option<PathBuf>,
    #[arg(long)]
    pub static_root: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub print_openapi: bool,
}
