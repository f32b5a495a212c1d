//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::config::{BackgroundColor, PipelineConfig};
use crate::services::ImageIOService;
use anyhow::{Context, Result};
use std::time::Duration;

/// Convert CLI arguments to a `PipelineConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the pipeline configuration: config file (or defaults) first,
    /// then command-line flags on top
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        let base = match &cli.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file '{}'", path.display()))?,
            None => PipelineConfig::default(),
        };

        let mut builder = PipelineConfig::builder()
            .feather_radius(cli.feather.unwrap_or(base.feather_radius))
            .zoom_bounds(base.zoom_bounds.min, base.zoom_bounds.max)
            .min_crop_side_px(base.min_crop_side_px)
            .segmentation_timeout(
                cli.segmentation_timeout
                    .map_or_else(|| base.segmentation_timeout(), Duration::from_secs),
            )
            .standard(cli.standard.map_or(base.standard, Into::into))
            .export_format(cli.format.map_or(base.export_format, Into::into))
            .jpeg_quality(cli.quality.unwrap_or(base.jpeg_quality));

        builder = match &cli.background {
            Some(value) => builder.background(
                value
                    .parse::<BackgroundColor>()
                    .with_context(|| format!("Unknown background color '{}'", value))?,
            ),
            None => builder.background(base.background),
        };

        builder.build().context("Invalid configuration")
    }

    /// Validate CLI arguments that the builder would silently adjust
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let Some(quality) = cli.quality {
            if quality == 0 || quality > 100 {
                anyhow::bail!("JPEG quality must be between 1 and 100, got {}", quality);
            }
        }
        if let Some(zoom) = cli.zoom {
            if !zoom.is_finite() {
                anyhow::bail!("Zoom must be a finite number");
            }
        }
        if let Some(radius) = cli.feather {
            if !radius.is_finite() || radius < 0.0 {
                anyhow::bail!("Feather radius must be a non-negative number, got {}", radius);
            }
        }
        if cli.segmentation_timeout == Some(0) {
            anyhow::bail!("Segmentation timeout must be at least one second");
        }
        if !cli.offset_x.is_finite() || !cli.offset_y.is_finite() {
            anyhow::bail!("Pan offsets must be finite numbers");
        }
        // Extensionless files are left to content sniffing
        for path in cli.input.iter().chain(cli.mask.iter()) {
            if path.extension().is_some() && !ImageIOService::is_supported_format(path) {
                anyhow::bail!(
                    "Unsupported image format '{}' (expected JPEG or PNG)",
                    path.display()
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExportFormat, PhotoStandard};
    use clap::Parser;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["passport-photo"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["photo.jpg"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_ok());
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "photo.jpg",
            "--standard",
            "us",
            "--background",
            "light-gray",
            "--format",
            "png",
            "--quality",
            "90",
            "--feather",
            "2.5",
            "--segmentation-timeout",
            "5",
            "--offset-x",
            "-12.5",
        ]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_ok());
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.standard, PhotoStandard::Us);
        assert_eq!(config.background, BackgroundColor::LIGHT_GRAY);
        assert_eq!(config.export_format, ExportFormat::Png);
        assert_eq!(config.jpeg_quality, 90);
        assert_eq!(config.feather_radius, 2.5);
        assert_eq!(config.segmentation_timeout_ms, 5_000);
        assert_eq!(cli.offset_x, -12.5);
    }

    #[test]
    fn test_hex_background() {
        let cli = parse(&["photo.jpg", "-b", "#102030"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.background, BackgroundColor::new(0x10, 0x20, 0x30));
    }

    #[test]
    fn test_unknown_background_rejected() {
        let cli = parse(&["photo.jpg", "--background", "plaid"]);
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(CliConfigBuilder::validate_cli(&parse(&["p.jpg", "--quality", "0"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["p.jpg", "--feather=-1"])).is_err());
        assert!(
            CliConfigBuilder::validate_cli(&parse(&["p.jpg", "--segmentation-timeout", "0"]))
                .is_err()
        );
    }

    #[test]
    fn test_validation_checks_image_formats() {
        assert!(CliConfigBuilder::validate_cli(&parse(&["photo.gif"])).is_err());
        assert!(
            CliConfigBuilder::validate_cli(&parse(&["photo.png", "--mask", "mask.webp"])).is_err()
        );
        assert!(CliConfigBuilder::validate_cli(&parse(&["photo.JPG", "-m", "mask.png"])).is_ok());
        assert!(CliConfigBuilder::validate_cli(&parse(&["photo"])).is_ok());
    }

    #[test]
    fn test_config_file_then_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"standard": "us", "background": {{"r": 135, "g": 206, "b": 235}}, "jpeg_quality": 80}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = parse(&["photo.jpg", "--config", &path, "--quality", "95"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.standard, PhotoStandard::Us);
        assert_eq!(config.background, BackgroundColor::BLUE);
        assert_eq!(config.jpeg_quality, 95);
    }

    #[test]
    fn test_list_flags_need_no_input() {
        let cli = parse(&["--list-standards"]);
        assert!(cli.input.is_none());
        assert!(cli.list_standards);
    }
}
