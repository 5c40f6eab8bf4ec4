use anyhow::Context;
use clap::{Parser, Subcommand};
use narrate::controllers::tts::TtsController;
use narrate::domain::tts::{
    AudioFormat, ConversionRequest, JobEvent, Model, RateLimiter, RetryPolicy, ServiceOptions,
    Speed, SynthesisParams, TtsService, TtsServiceApi, Voice,
};
use narrate::infrastructure::audio::FfmpegAssembler;
use narrate::infrastructure::config::{Config, LogFormat};
use narrate::infrastructure::http::start_http_server;
use narrate::infrastructure::repositories::OpenAiTtsRepository;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Turn long text into one speech audio file
#[derive(Parser)]
#[command(name = "narrate")]
#[command(version)]
#[command(
    about = "Convert arbitrary-length text to speech with the OpenAI TTS API",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a text file into an audio file
    Convert(ConvertArgs),

    /// Serve the HTTP API
    Serve,

    /// Check that ffmpeg is installed and recent enough
    Preflight,
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Text file to read, `-` for stdin
    #[arg(long = "in", value_name = "FILE")]
    input: PathBuf,

    /// Output audio file; the format's extension is added when missing
    #[arg(long = "out", value_name = "FILE")]
    output: PathBuf,

    #[arg(long, default_value_t = Model::default())]
    model: Model,

    #[arg(long, default_value_t = Voice::default())]
    voice: Voice,

    #[arg(long, default_value_t = AudioFormat::default())]
    format: AudioFormat,

    /// Playback speed between 0.25 and 4.0
    #[arg(long, default_value = "1.0", value_parser = parse_speed)]
    speed: Speed,

    /// Speaking style, only used by gpt-4o-mini-tts
    #[arg(long)]
    instructions: Option<String>,

    /// Keep the per-segment audio files
    #[arg(long)]
    retain_files: bool,

    /// Segments synthesized concurrently (1-8); defaults to TTS_PARALLELISM
    #[arg(long)]
    parallelism: Option<usize>,

    /// Do not write the `<output>.json` metadata file
    #[arg(long)]
    no_sidecar: bool,
}

fn parse_speed(value: &str) -> Result<Speed, String> {
    let speed: f32 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    Speed::new(speed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config =
        Config::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    let default_filter = match cli.command {
        Commands::Serve => "narrate=debug,tower_http=debug",
        _ => "narrate=info",
    };
    init_logging(&config, default_filter);
    config.log_ignored_settings();

    match cli.command {
        Commands::Convert(args) => convert(config, args).await,
        Commands::Serve => serve(config).await,
        Commands::Preflight => preflight(&config).await,
    }
}

async fn convert(config: Config, args: ConvertArgs) -> anyhow::Result<()> {
    let text = read_input(&args.input).await?;
    let options = ServiceOptions {
        max_chunk_chars: config.max_chunk_size,
        parallelism: args.parallelism.unwrap_or(config.parallelism),
        write_sidecar: config.write_sidecar && !args.no_sidecar,
    };
    let tts_service = build_tts_service(&config, options)?;

    tts_service
        .preflight()
        .await
        .context("ffmpeg is required to assemble audio")?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let request = ConversionRequest {
        text,
        output_path: args.output,
        params: SynthesisParams {
            model: args.model,
            voice: args.voice,
            format: args.format,
            speed: args.speed,
            instructions: args.instructions,
        },
        retain_files: args.retain_files,
    };

    let result = tts_service.convert(request, Arc::new(tx)).await;
    // The service dropped its senders, so the printer drains and stops
    printer.await.ok();

    let outcome = result?;
    println!("{}", outcome.output_path.display());
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting narrate on {}:{}", config.host, config.port);

    let options = ServiceOptions {
        max_chunk_chars: config.max_chunk_size,
        parallelism: config.parallelism,
        write_sidecar: config.write_sidecar,
    };
    let tts_service = build_tts_service(&config, options)?;

    if let Err(e) = tts_service.preflight().await {
        tracing::warn!(error = %e, "ffmpeg preflight failed, multi-segment jobs will fail");
    }

    let tts_service: Arc<dyn TtsServiceApi> = tts_service;
    let tts_controller = Arc::new(TtsController::new(
        tts_service.clone(),
        config.output_dir.clone(),
        config.max_chunk_size,
    ));

    start_http_server(Arc::new(config), tts_service, tts_controller)
        .await
        .map_err(|e| anyhow::anyhow!(e))
}

async fn preflight(config: &Config) -> anyhow::Result<()> {
    let assembler = FfmpegAssembler::new(config.ffmpeg_command.clone());
    match assembler.preflight().await? {
        Some(version) => println!("ffmpeg {} OK", version),
        None => println!("ffmpeg OK (version not recognized)"),
    }
    Ok(())
}

fn build_tts_service(config: &Config, options: ServiceOptions) -> anyhow::Result<Arc<TtsService>> {
    let api_key = config
        .require_api_key()
        .map_err(|e| anyhow::anyhow!(e))?;

    // === DEPENDENCY INJECTION SETUP ===
    let tts_repo = Arc::new(
        OpenAiTtsRepository::new(api_key, &config.openai_base_url, config.openai_timeout())
            .context("failed to build HTTP client")?,
    );
    tracing::info!(base_url = %config.openai_base_url, "OpenAI TTS repository initialized");

    // One limiter per process so every job shares the provider budget
    let limiter = Arc::new(match config.min_request_interval() {
        Some(interval) => RateLimiter::with_fixed_interval(interval),
        None => RateLimiter::new(),
    });
    let retry_policy = RetryPolicy::new(config.max_retries, config.retry_delay());
    let assembler = FfmpegAssembler::new(config.ffmpeg_command.clone());

    Ok(Arc::new(TtsService::new(
        tts_repo,
        limiter,
        retry_policy,
        assembler,
        options,
    )))
}

async fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("failed to read text from stdin")?;
        return Ok(text);
    }

    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

fn print_event(event: &JobEvent) {
    let mut stderr = std::io::stderr();
    let _ = match event {
        JobEvent::Progress { percent } => write!(stderr, "\rProgress: {:>3}%", percent),
        JobEvent::Status { message } => write!(stderr, "\n{}\n", message),
        JobEvent::Completed { .. } => writeln!(stderr),
        JobEvent::Failed { reason } => writeln!(stderr, "\nFailed: {}", reason),
    };
    let _ = stderr.flush();
}

fn init_logging(config: &Config, default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}
