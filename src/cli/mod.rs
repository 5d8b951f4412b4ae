use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "classy")]
#[command(version, about = "A minimal single-model image classification server", long_about = None)]
pub struct Cli {
	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Download the configured model artifact if it is not already present
	Fetch,

	/// Load the model, then start the HTTP API server
	Serve {
		/// Device to run on (e.g., "cpu" or "cuda:0")
		#[arg(long, env = "CLASSY_DEVICE", default_value = "cpu")]
		device: String,

		/// Port to listen on
		#[arg(long, env = "CLASSY_PORT", default_value = "8080")]
		port: u16,

		/// Host to bind to
		#[arg(long, env = "CLASSY_HOST", default_value = "0.0.0.0")]
		host: String,
	},

	/// Classify a local image file
	Classify {
		/// Path to the image
		image: PathBuf,

		/// Device to run on (e.g., "cpu" or "cuda:0")
		#[arg(long, env = "CLASSY_DEVICE", default_value = "cpu")]
		device: String,
	},
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn serve_defaults() {
		let cli = Cli::try_parse_from(["classy", "serve"]).unwrap();
		match cli.command {
			Commands::Serve { device, port, host } => {
				assert_eq!(device, "cpu");
				assert_eq!(port, 8080);
				assert_eq!(host, "0.0.0.0");
			}
			_ => panic!("expected serve"),
		}
	}

	#[test]
	fn classify_takes_image_path() {
		let cli = Cli::try_parse_from(["classy", "classify", "pikachu.jpg", "--device", "cuda:1"]).unwrap();
		match cli.command {
			Commands::Classify { image, device } => {
				assert_eq!(image, PathBuf::from("pikachu.jpg"));
				assert_eq!(device, "cuda:1");
			}
			_ => panic!("expected classify"),
		}
	}
}
