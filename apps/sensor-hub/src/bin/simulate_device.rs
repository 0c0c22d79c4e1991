//! Posts synthetic readings to a running hub, standing in for field devices.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SimulatedClass {
    Environment,
    Beehive,
}

#[derive(Parser, Debug)]
#[command(about = "Send simulated sensor readings to sensor-hub")]
struct Args {
    /// Hub base URL.
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    url: String,
    #[arg(long, value_enum, default_value_t = SimulatedClass::Environment)]
    device_class: SimulatedClass,
    #[arg(long)]
    device_id: Option<String>,
    #[arg(long, default_value_t = 5)]
    interval_seconds: u64,
    /// Number of readings to send; 0 runs until interrupted.
    #[arg(long, default_value_t = 0)]
    count: u64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn simulated_reading(
    class: SimulatedClass,
    device_id: &str,
    timestamp_ms: i64,
    rng: &mut impl Rng,
) -> Value {
    match class {
        SimulatedClass::Environment => json!({
            "device_id": device_id,
            "device_class": "environment",
            "timestamp": timestamp_ms,
            "temperature": round2(rng.gen_range(18.0..28.0)),
            "humidity": round2(rng.gen_range(35.0..65.0)),
            "light": round2(rng.gen_range(0.0..1000.0)),
        }),
        SimulatedClass::Beehive => json!({
            "device_id": device_id,
            "device_class": "beehive",
            "timestamp": timestamp_ms,
            "temperature": round2(rng.gen_range(20.0..30.0)),
            "humidity": round2(rng.gen_range(40.0..70.0)),
            "sound": round2(rng.gen_range(30.0..60.0)),
            "battery": rng.gen_range(50.0_f64..100.0).round(),
        }),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let endpoint = url::Url::parse(&args.url)
        .and_then(|base| base.join("/api/data"))
        .with_context(|| format!("invalid hub url {}", args.url))?;
    let device_id = args.device_id.unwrap_or_else(|| match args.device_class {
        SimulatedClass::Environment => "environment_simulator_1".to_string(),
        SimulatedClass::Beehive => "beehive_simulator_1".to_string(),
    });
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("failed to build http client")?;

    tracing::info!(
        %endpoint,
        %device_id,
        interval_seconds = args.interval_seconds,
        "simulator started"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_seconds.max(1)));
    let mut sent = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(sent, "simulator stopped");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let payload = simulated_reading(
            args.device_class,
            &device_id,
            chrono::Utc::now().timestamp_millis(),
            &mut rand::thread_rng(),
        );
        match client.post(endpoint.clone()).json(&payload).send().await {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if status.is_success() {
                    tracing::info!(%status, %body, "reading sent");
                } else {
                    tracing::warn!(%status, %body, "reading refused");
                }
            }
            Err(err) => tracing::error!(error = %err, "failed to reach hub"),
        }

        sent += 1;
        if args.count > 0 && sent >= args.count {
            tracing::info!(sent, "simulator finished");
            return Ok(());
        }
    }
}
