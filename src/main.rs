mod classifier;
mod cli;
mod config;
mod error;
mod inference;
mod model;
mod server;

use candle_core::Device;
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use error::Result;
use inference::InferenceService;
use model::ModelLoader;

fn parse_device(device_str: &str) -> Result<Device> {
    match device_str {
        "cpu" => Ok(Device::Cpu),
        s if s.starts_with("cuda") => {
            let parts: Vec<&str> = s.split(':').collect();
            let ordinal = if parts.len() > 1 {
                parts[1].parse::<usize>().map_err(|_| {
                    error::Error::InvalidInput(format!("Invalid CUDA device: {}", s))
                })?
            } else {
                0
            };
            Device::new_cuda(ordinal).map_err(|e| {
                error::Error::ConfigError(format!("Failed to initialize CUDA device: {}", e))
            })
        }
        _ => Err(error::Error::InvalidInput(format!(
            "Unknown device: {}",
            device_str
        ))),
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

    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing::debug!("Data directory: {:?}", config.data_dir);
    tracing::debug!("Config file: {:?}", config.config_path);

    match cli.command {
        Commands::Fetch => {
            let loader = ModelLoader::from_config(&config, Device::Cpu);
            let path = loader.fetch().await?;

            println!("✓ Model artifact ready");
            println!("  Source: {}", loader.artifact().url);
            println!("  Path: {:?}", path);
        }

        Commands::Serve { device, port, host } => {
            let device = parse_device(&device)?;
            let device_name = format!("{:?}", device);

            // The listener is only bound once the model is in memory; a load failure ends the process here.
            tracing::info!("Loading model on {}", device_name);
            let model = ModelLoader::from_config(&config, device).load_model().await?;
            let service = InferenceService::new(model);
            tracing::info!("Model '{}' ready", service.model_name());

            let state = server::AppState::new(
                service,
                device_name.clone(),
                config.settings.server.max_upload_bytes,
            );

            println!("🚀 Classy server starting...");
            println!("   Device: {}", device_name);
            println!("   Listening on: http://{}:{}", host, port);
            println!("   Health: http://{}:{}/api/health", host, port);
            println!("   Analyze: http://{}:{}/analyze", host, port);

            server::serve(&host, port, state).await?;
        }

        Commands::Classify { image, device } => {
            let device = parse_device(&device)?;

            tracing::info!("Loading model");
            let model = ModelLoader::from_config(&config, device).load_model().await?;
            let service = InferenceService::new(model);

            let bytes = std::fs::read(&image)?;
            let decoded = inference::decode_image(&bytes)?;
            let prediction = service.predict(&decoded)?;

            let output = serde_json::json!({
                "image": image,
                "result": prediction.label,
                "index": prediction.index,
                "confidence": prediction.confidence(),
            });

            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
