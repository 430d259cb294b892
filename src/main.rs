// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow, Context};
use log::{error, warn, info, LevelFilter, Log, Metadata, Record, Level, SetLoggerError};
use std::path::{Path, PathBuf};
use std::io::Write;
use clap::{Parser, ValueEnum, CommandFactory, Subcommand, Args};
use clap_complete::{generate, Shell};
use tokio_util::sync::CancellationToken;

use nikud_narrator::app_config::{self, Config};
use nikud_narrator::app_controller::{Controller, NarrateOptions};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Narrate a Hebrew text file into audio and a timeline (default command)
    Narrate(NarrateArgs),

    /// Add nikud to a text file without narrating it
    Vocalize(VocalizeArgs),

    /// Print the units a text would be narrated as, one JSON object per line
    Segment(SegmentArgs),

    /// Generate shell completions for nikud-narrator
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options shared by every command that reads the configuration
#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Args, Debug, Clone)]
struct NarrateArgs {
    /// Input text file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output audio file (the timeline is written next to it as .json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pronunciation dictionary (JSON)
    #[arg(short, long)]
    dictionary: Option<PathBuf>,

    /// Add nikud before narrating
    #[arg(long)]
    vocalize: bool,

    /// Voice to narrate with
    #[arg(long)]
    voice: Option<String>,

    /// Rate change in percent (e.g. -10, 25)
    #[arg(long, allow_hyphen_values = true)]
    rate: Option<i32>,

    /// Volume change in percent (e.g. -20, 10)
    #[arg(long, allow_hyphen_values = true)]
    volume: Option<i32>,

    /// Maximum number of synthesis requests in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// API key for the speech endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug, Clone)]
struct VocalizeArgs {
    /// Input text file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output text file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pronunciation dictionary (JSON)
    #[arg(short, long)]
    dictionary: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug, Clone)]
struct SegmentArgs {
    /// Input text file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

/// nikud-narrator - Hebrew text to narrated audio
///
/// Adds nikud to Hebrew text, narrates it with a speech service and writes
/// the audio together with a timeline for synchronized playback.
#[derive(Parser, Debug)]
#[command(name = "nikud-narrator")]
#[command(version)]
#[command(about = "Hebrew narration with nikud and a playback timeline")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "nikud-narrator vocalizes Hebrew text, narrates it with a speech service and writes
the audio with a JSON timeline next to it.

EXAMPLES:
    nikud-narrator book.txt                          # Narrate using default config
    nikud-narrator book.txt --vocalize -d dict.json  # Add nikud with a dictionary first
    nikud-narrator book.txt --voice nova --rate 10   # Pick voice and speed
    nikud-narrator vocalize book.txt                 # Only add nikud
    nikud-narrator segment book.txt                  # Show the narration units
    nikud-narrator completions bash > nikud.bash     # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

OUTPUT:
    <name>.wav          narrated audio
    <name>.json         timeline: [{index, text, start, end, is_image, page_trigger?}]
    <name>.issues.log   units replaced by silence and other warnings, if any")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    narrate: Option<NarrateArgs>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        // Accept everything here; log::set_max_level does the filtering
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌",
            Level::Warn => "🚧",
            Level::Info => "🔊",
            Level::Debug => "🔍",
            Level::Trace => "📋",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "nikud-narrator", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Narrate(args)) => run_narrate(args).await,
        Some(Commands::Vocalize(args)) => run_vocalize(args).await,
        Some(Commands::Segment(args)) => run_segment(args),
        None => {
            let args = cli
                .narrate
                .ok_or_else(|| anyhow!("INPUT is required when no subcommand is specified"))?;
            run_narrate(args).await
        }
    }
}

async fn run_narrate(args: NarrateArgs) -> Result<()> {
    let mut config = load_config(&args.common)?;

    if let Some(voice) = &args.voice {
        config.speech.voice = voice.clone();
    }
    if let Some(rate) = args.rate {
        config.speech.rate = rate;
    }
    if let Some(volume) = args.volume {
        config.speech.volume = volume;
    }
    if let Some(concurrency) = args.concurrency {
        config.speech.max_concurrent = concurrency;
    }
    if let Some(api_key) = &args.api_key {
        config.speech.api_key = api_key.clone();
    }

    // Validate the configuration after loading and overriding
    config.validate()
        .context("Configuration validation failed")?;

    let controller = Controller::with_config(config)?;
    let shutdown = shutdown_on_ctrl_c();

    let options = NarrateOptions {
        input: args.input,
        output: args.output,
        dictionary: args.dictionary,
        vocalize: args.vocalize,
        force_overwrite: args.force_overwrite,
    };

    if let Err(e) = controller.run(options, shutdown).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run_vocalize(args: VocalizeArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let controller = Controller::with_config(config)?;
    controller
        .vocalize_file(&args.input, args.output, args.dictionary.as_deref())
        .await?;
    Ok(())
}

fn run_segment(args: SegmentArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let controller = Controller::with_config(config)?;

    let mut stdout = std::io::stdout().lock();
    for unit in controller.segment_file(&args.input)? {
        let line = serde_json::to_string(&unit).context("Failed to serialize unit")?;
        writeln!(stdout, "{}", line)?;
    }
    Ok(())
}

/// Load the configuration, creating a default one when missing, and apply the log level
fn load_config(common: &CommonArgs) -> Result<Config> {
    // If log level is set via command line, apply it immediately
    if let Some(cmd_log_level) = &common.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let config_path = &common.config_path;
    let mut config = if Path::new(config_path).exists() {
        Config::from_file(config_path)?
    } else {
        warn!("Config file not found at '{}', creating default config.", config_path);
        let config = Config::default();
        config.save(config_path)?;
        config
    };

    match &common.log_level {
        Some(log_level) => config.log_level = log_level.clone().into(),
        // Just update the max level without reinitializing the logger
        None => log::set_max_level(config.log_level.to_level_filter()),
    }

    Ok(config)
}

/// A token that fires on the first Ctrl-C
fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping the current job");
            token.cancel();
        }
    });
    shutdown
}
