//! CLI argument parsing definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use studio_interfaces::GenerationType;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the daemon and check that it answers
    Health,

    /// List the image models the daemon can load
    Models,

    /// Queue one or more generations and wait for them to finish
    Generate(GenerateArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Write a sample configuration file with every default spelled out
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
pub struct GenerateArgs {
    /// What to generate
    #[arg(long)]
    pub prompt: String,

    /// What to avoid
    #[arg(long, default_value = "")]
    pub negative: String,

    /// Number of jobs to queue
    #[arg(long, default_value_t = 1)]
    pub count: u32,

    #[arg(long = "type", value_enum, default_value_t = GenerationKind::TextToImage)]
    pub kind: GenerationKind,

    /// Source image for image-to-image
    #[arg(long, value_name = "PATH")]
    pub init_image: Option<PathBuf>,

    #[arg(long)]
    pub steps: Option<u32>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    /// -1 lets the daemon pick
    #[arg(long, allow_negative_numbers = true)]
    pub seed: Option<i64>,

    #[arg(long)]
    pub cfg_scale: Option<f64>,

    /// Length of generated audio in seconds
    #[arg(long)]
    pub duration: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum GenerationKind {
    TextToImage,
    ImageToImage,
    Audio,
}

impl From<GenerationKind> for GenerationType {
    fn from(kind: GenerationKind) -> Self {
        match kind {
            GenerationKind::TextToImage => GenerationType::TextToImage,
            GenerationKind::ImageToImage => GenerationType::ImageToImage,
            GenerationKind::Audio => GenerationType::Audio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_arguments() {
        let cli = Cli::parse_from([
            "studio",
            "--log-level",
            "debug",
            "generate",
            "--prompt",
            "night market",
            "--count",
            "3",
            "--type",
            "audio",
            "--seed",
            "-1",
        ]);

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.prompt, "night market");
                assert_eq!(args.count, 3);
                assert_eq!(args.kind, GenerationKind::Audio);
                assert_eq!(args.seed, Some(-1));
                assert!(args.steps.is_none());
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["studio", "health", "--config", "studio.yaml"]);
        assert_eq!(cli.config, Some(PathBuf::from("studio.yaml")));
        assert!(matches!(cli.command, Commands::Health));
    }

    #[test]
    fn test_config_generate_arguments() {
        let cli = Cli::parse_from(["studio", "config", "generate", "--output", "out.yaml", "--force"]);
        match cli.command {
            Commands::Config {
                config_cmd: ConfigCommands::Generate { output, force },
            } => {
                assert_eq!(output, PathBuf::from("out.yaml"));
                assert!(force);
            }
            _ => panic!("expected config generate"),
        }
    }

    #[test]
    fn test_unknown_generation_type_rejected() {
        let result = Cli::try_parse_from(["studio", "generate", "--prompt", "x", "--type", "video"]);
        assert!(result.is_err());
    }
}
