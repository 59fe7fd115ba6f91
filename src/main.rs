use anyhow::Result;
use clap::Parser;
use image_converter::app::App;
use image_converter::models::{Config, TargetFormat};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "image-converter")]
#[command(about = "Convert images to PNG, JPEG or WebP")]
struct CliArgs {
    /// Image files to convert.
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Output format: png, jpeg (jpg) or webp.
    #[arg(short, long, value_parser = parse_format_arg)]
    format: Option<TargetFormat>,

    /// Directory converted files are written to.
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// JPEG quality (1-100).
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Print a JSON summary of the results to stdout.
    #[arg(long)]
    json: bool,
}

fn parse_format_arg(input: &str) -> std::result::Result<TargetFormat, String> {
    input.parse().map_err(|_| {
        format!(
            "Invalid format '{}'. Expected one of: png, jpeg, webp",
            input
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_converter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(quality) = args.quality {
        config.jpeg_quality = quality;
    }
    let target = args.format.unwrap_or(config.default_format);

    let app = match App::new(&config).await {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    let outcomes = app.run(&args.inputs, target).await;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    }

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        error!("{} of {} conversion(s) failed", failed, outcomes.len());
        std::process::exit(1);
    }

    info!("Converted {} file(s)", outcomes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format_arg_valid() {
        assert_eq!(parse_format_arg("jpg").unwrap(), TargetFormat::Jpeg);
        assert_eq!(parse_format_arg("WEBP").unwrap(), TargetFormat::Webp);
    }

    #[test]
    fn test_parse_format_arg_invalid() {
        let err = parse_format_arg("bmp").unwrap_err();
        assert!(err.contains("png, jpeg, webp"));
    }

    #[test]
    fn test_cli_requires_input() {
        assert!(CliArgs::try_parse_from(["image-converter"]).is_err());
    }

    #[test]
    fn test_cli_rejects_quality_out_of_range() {
        assert!(CliArgs::try_parse_from(["image-converter", "-q", "0", "a.png"]).is_err());
        assert!(CliArgs::try_parse_from(["image-converter", "-q", "100", "a.png"]).is_ok());
    }
}
