//! Wav2Lip server command line
//!
//! `serve` runs the HTTP API, `render` runs one generation against files on
//! disk, and `config` prints or checks configuration documents.

use super::config::CliConfigBuilder;
use crate::{
    config::Wav2LipConfig,
    progress::TracingProgressReporter,
    server,
    service::LipSyncService,
    tracing_config::init_cli_tracing,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Lip-sync video generation server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "wav2lip-server")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Plain log lines without colors
    #[arg(long, global = true, env = "WAV2LIP_COMPACT_LOGS")]
    pub compact_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Generate one video from files on disk
    Render(RenderArgs),
    /// Print or validate configuration documents
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// How the inference process is found and launched
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Directory containing Wav2Lip.pth and Wav2Lip_GAN.pth
    #[arg(long, env = "WAV2LIP_CHECKPOINTS_DIR", default_value = "checkpoints")]
    pub checkpoints_dir: PathBuf,

    /// Directory the inference process runs in
    #[arg(long, env = "WAV2LIP_WORK_ROOT", default_value = ".")]
    pub work_root: PathBuf,

    /// Parent directory for per-request working directories [default: system temp]
    #[arg(long, env = "WAV2LIP_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Interpreter used to launch the inference script
    #[arg(long, env = "WAV2LIP_PYTHON", default_value = crate::settings::DEFAULT_PYTHON)]
    pub python: PathBuf,

    /// Arguments placed before the inference arguments [default: -m wav2lip.inference]
    #[arg(
        long = "entry-arg",
        value_name = "ARG",
        env = "WAV2LIP_ENTRY_ARGS",
        value_delimiter = ' ',
        allow_hyphen_values = true
    )]
    pub entry_args: Option<Vec<String>>,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "WAV2LIP_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "WAV2LIP_PORT", default_value_t = crate::settings::DEFAULT_PORT)]
    pub port: u16,

    /// Largest accepted request body in MiB
    #[arg(long, env = "WAV2LIP_MAX_UPLOAD_MB", default_value_t = 100)]
    pub max_upload_mb: usize,

    /// Defaults applied when a request carries no configuration
    #[arg(long, value_enum, default_value_t = CliProfile::Api)]
    pub default_profile: CliProfile,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Face image or video
    #[arg(value_name = "FACE")]
    pub face: PathBuf,

    /// Voice track
    #[arg(value_name = "AUDIO")]
    pub audio: PathBuf,

    /// Directory the video is written to
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Defaults used when no configuration file is given
    #[arg(long, value_enum, default_value_t = CliProfile::Settings)]
    pub profile: CliProfile,

    /// Override the quality tier
    #[arg(short, long, value_enum)]
    pub quality: Option<CliQuality>,

    /// Override the output height ("full", "half" or pixels)
    #[arg(long, value_name = "HEIGHT")]
    pub output_height: Option<String>,

    /// Use the GAN checkpoint
    #[arg(long)]
    pub gan: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Print a default configuration
    Default {
        #[arg(long, value_enum, default_value_t = CliProfile::Api)]
        profile: CliProfile,
    },
    /// Print the configuration JSON schema
    Schema,
    /// Validate a configuration file and summarize it
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliProfile {
    /// HTTP API defaults (Improved)
    Api,
    /// Settings-file defaults (Enhanced)
    Settings,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliQuality {
    Fast,
    Improved,
    Enhanced,
    Experimental,
}

/// Main entry point for the CLI application
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _tracing_guard =
        init_cli_tracing(cli.verbose, cli.compact_logs).context("Failed to initialize tracing")?;

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Render(args) => render(args).await,
        Command::Config(command) => config_command(command),
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let settings = CliConfigBuilder::settings_from_serve(&args).context("Invalid server settings")?;

    let engine = settings.subprocess_engine();
    engine.preflight(&settings.checkpoints_dir);

    let service = LipSyncService::new(Arc::new(engine), &settings)
        .with_progress_reporter(Arc::new(TracingProgressReporter))
        .with_default_profile(args.default_profile.into());

    server::serve(&settings, service)
        .await
        .context("Server terminated with an error")
}

async fn render(args: RenderArgs) -> Result<()> {
    let settings = CliConfigBuilder::settings_from_engine(&args.engine)
        .context("Invalid engine settings")?;
    let config = CliConfigBuilder::render_config(&args).context("Invalid configuration")?;

    let engine = settings.subprocess_engine();
    engine.preflight(&settings.checkpoints_dir);
    let service = LipSyncService::new(Arc::new(engine), &settings)
        .with_progress_reporter(Arc::new(TracingProgressReporter));

    info!(
        quality = %config.options.quality,
        face = %args.face.display(),
        audio = %args.audio.display(),
        "🎬 Rendering lip-sync video"
    );
    let started = Instant::now();
    let saved = service
        .render_files(&args.face, &args.audio, &config, &args.output_dir)
        .await
        .with_context(|| format!("Failed to render {}", args.face.display()))?;

    println!(
        "✅ Saved {} ({:.1}s)",
        saved.display(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn config_command(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Default { profile } => {
            let config = Wav2LipConfig::for_profile(profile.into());
            println!("{}", serde_json::to_string_pretty(&config)?);
        },
        ConfigCommand::Schema => {
            println!("{}", serde_json::to_string_pretty(&Wav2LipConfig::json_schema())?);
        },
        ConfigCommand::Validate { file } => {
            let config = Wav2LipConfig::from_file(&file)
                .with_context(|| format!("{} is not a valid configuration", file.display()))?;
            println!("✅ {} is valid", file.display());
            println!("   quality:          {} ({})", config.options.quality, config.quality_description());
            println!("   resolution scale: {}", config.resolution_scale().legacy_factor());
            println!("   custom height:    {}", config.is_custom_resolution());
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_defaults() {
        let cli = Cli::try_parse_from(["wav2lip-server", "serve"]).unwrap();
        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.port, 8000);
                assert_eq!(args.host.to_string(), "0.0.0.0");
                assert_eq!(args.default_profile, CliProfile::Api);
                assert_eq!(args.engine.checkpoints_dir, PathBuf::from("checkpoints"));
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_render_with_overrides() {
        let cli = Cli::try_parse_from([
            "wav2lip-server",
            "-vv",
            "render",
            "face.png",
            "voice.wav",
            "--quality",
            "fast",
            "--output-height",
            "480",
            "--gan",
            "--entry-arg",
            "inference.py",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Render(args) => {
                assert_eq!(args.face, PathBuf::from("face.png"));
                assert_eq!(args.quality, Some(CliQuality::Fast));
                assert_eq!(args.output_height.as_deref(), Some("480"));
                assert!(args.gan);
                assert_eq!(args.engine.entry_args, Some(vec!["inference.py".to_string()]));
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = Cli::try_parse_from(["wav2lip-server", "config", "validate", "cfg.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { .. })
        ));
    }
}
