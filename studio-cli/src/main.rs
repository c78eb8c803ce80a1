use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use studio_config::{ConfigLoader, LogLevel, StudioConfig};
use studio_daemon::{DaemonBackend, DaemonSupervisor, SupervisorConfig};
use studio_interfaces::{GenerationParameters, GenerationType, OutputStore};
use studio_logging::{init_logging_from_config, init_simple_tracing};
use studio_output::FilesystemOutputStore;
use studio_queue::{GenerationQueue, GenerationStatus};
use tracing::{debug, info, warn};

mod cli;
use cli::{Cli, Commands, ConfigCommands, GenerateArgs};

/// Load configuration from file or use defaults
fn load_config(config_path: Option<&PathBuf>) -> Result<StudioConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => {
            if path.exists() {
                info!("Loading configuration from: {:?}", path);
                loader
                    .from_file(path)
                    .context(format!("Failed to load configuration from {:?}", path))
            } else {
                warn!("Configuration file not found: {:?}. Using defaults.", path);
                loader
                    .from_env()
                    .context("Failed to load configuration from environment")
            }
        }
        None => {
            debug!("No configuration file specified. Loading from environment or defaults.");
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
    }
}

fn build_parameters(args: &GenerateArgs) -> Result<GenerationParameters> {
    let mut params = GenerationParameters::default();
    if let Some(steps) = args.steps {
        params.steps = steps;
    }
    if let Some(width) = args.width {
        params.width = width;
    }
    if let Some(height) = args.height {
        params.height = height;
    }
    if let Some(seed) = args.seed {
        params.seed = seed;
    }
    if let Some(cfg_scale) = args.cfg_scale {
        params.cfg_scale = cfg_scale;
    }
    if let Some(duration) = args.duration {
        params.duration_seconds = duration;
    }
    if let Some(path) = &args.init_image {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read init image {:?}", path))?;
        params.init_image = Some(STANDARD.encode(bytes));
    }
    Ok(params)
}

async fn health_command(backend: &DaemonBackend) -> Result<()> {
    let status = backend
        .health_check()
        .await
        .context("Daemon health check failed")?;
    let pid = backend
        .supervisor()
        .pid()
        .map(|pid| pid.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("daemon: {} (pid {})", status, pid);
    Ok(())
}

async fn models_command(backend: &DaemonBackend) -> Result<()> {
    let models = backend
        .list_models()
        .await
        .context("Failed to list image models")?;

    if models.is_empty() {
        println!("No image models available");
    }
    for model in models {
        match model.path {
            Some(path) => println!("{}\t{}", model.name, path),
            None => println!("{}", model.name),
        }
    }
    Ok(())
}

async fn generate_command(
    config: &StudioConfig,
    backend: Arc<DaemonBackend>,
    args: &GenerateArgs,
) -> Result<()> {
    let params = build_parameters(args)?;
    let generation_type = GenerationType::from(args.kind);

    let queue = if config.queue.auto_save {
        let store: Arc<dyn OutputStore> =
            Arc::new(FilesystemOutputStore::from_config(&config.output));
        GenerationQueue::with_output_store(backend, store, &config.queue)
    } else {
        GenerationQueue::new(backend, &config.queue)
    };

    for _ in 0..args.count {
        queue
            .try_enqueue(
                args.prompt.clone(),
                args.negative.clone(),
                params.clone(),
                generation_type,
            )
            .context("Failed to queue generation")?;
    }
    info!("Queued {} {} generation(s)", args.count, generation_type);

    tokio::select! {
        _ = queue.wait_until_idle() => {}
        _ = tokio::signal::ctrl_c() => return Err(interrupt(&queue)),
    }

    let items = queue.snapshot();
    let mut unfinished = 0;
    for item in &items {
        println!("{} {}", item.id, item.status);
        if let Some(error) = &item.error {
            println!("  error: {}", error);
        }
        for path in &item.output_paths {
            println!("  {}", path.display());
        }
        if item.status != GenerationStatus::Completed {
            unfinished += 1;
        }
    }

    if unfinished > 0 {
        anyhow::bail!("{} of {} generations did not complete", unfinished, items.len());
    }
    Ok(())
}

/// Drop every unfinished job and report how many were lost
fn interrupt(queue: &GenerationQueue) -> anyhow::Error {
    let unfinished = queue
        .snapshot()
        .iter()
        .filter(|item| !item.is_finished())
        .count();
    warn!("Interrupted, cancelling remaining generations");
    queue.clear_all();
    anyhow::anyhow!("Interrupted; {} queued generation(s) cancelled", unfinished)
}

fn handle_config_validate(config_file: &PathBuf) -> Result<()> {
    ConfigLoader::new()
        .from_file(config_file)
        .context(format!("Invalid configuration in {:?}", config_file))?;
    println!("Configuration is valid: {}", config_file.display());
    Ok(())
}

fn handle_config_generate(output: &PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite",
            output.display()
        );
    }
    std::fs::write(output, StudioConfig::generate_sample())
        .context(format!("Failed to write {:?}", output))?;
    println!("Wrote sample configuration to {}", output.display());
    Ok(())
}

async fn run_daemon_command(config: &StudioConfig, command: &Commands) -> Result<()> {
    let supervisor = DaemonSupervisor::new(SupervisorConfig::from(&config.daemon));
    let backend = Arc::new(DaemonBackend::new(supervisor.clone()));

    let result = match command {
        Commands::Health => health_command(&backend).await,
        Commands::Models => models_command(&backend).await,
        Commands::Generate(args) => generate_command(config, backend, args).await,
        Commands::Config { .. } => Ok(()),
    };

    supervisor.stop();
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { config_cmd } = &cli.command {
        init_simple_tracing(cli.log_level.as_deref().unwrap_or("warn"))?;
        return match config_cmd {
            ConfigCommands::Validate { config_file } => handle_config_validate(config_file),
            ConfigCommands::Generate { output, force } => handle_config_generate(output, *force),
        };
    }

    let mut config = load_config(cli.config.as_ref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level
            .parse::<LogLevel>()
            .map_err(|e| anyhow::anyhow!("Invalid --log-level: {}", e))?;
    }
    init_logging_from_config(&config.logging)?;

    run_daemon_command(&config, &cli.command).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use studio_config::QueueConfig;
    use studio_interfaces::{BackendError, GenerationBackend, GenerationRequest, GenerationResult};

    /// Never finishes a generation
    struct StalledBackend;

    #[async_trait]
    impl GenerationBackend for StalledBackend {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<GenerationResult, BackendError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_interrupt_clears_queue_and_fails() {
        let queue = GenerationQueue::new(Arc::new(StalledBackend), &QueueConfig::default());
        for _ in 0..3 {
            queue
                .try_enqueue("harbor", "", GenerationParameters::default(), GenerationType::TextToImage)
                .unwrap();
        }

        let error = interrupt(&queue);

        assert_eq!(
            error.to_string(),
            "Interrupted; 3 queued generation(s) cancelled"
        );
        assert!(queue.is_empty());
        tokio::time::timeout(std::time::Duration::from_secs(1), queue.wait_until_idle())
            .await
            .unwrap();
    }

    #[test]
    fn test_build_parameters_overrides_defaults() {
        let cli = Cli::parse_from([
            "studio", "generate", "--prompt", "x", "--steps", "4", "--seed", "-1", "--width", "768",
        ]);
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };

        let params = build_parameters(&args).unwrap();
        assert_eq!(params.steps, 4);
        assert_eq!(params.seed, -1);
        assert_eq!(params.width, 768);
        assert_eq!(params.height, GenerationParameters::default().height);
        assert!(params.init_image.is_none());
    }
}
