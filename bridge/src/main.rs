use anyhow::{Context, Result};
use bridge::capture::{CaptureSource, GstCaptureSource, TestPatternSource};
use bridge::config::{self, Config};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "edb")]
#[command(about = "Low-latency capture-to-display bridge", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.config/edb/config.toml)
    #[arg(short, long, env = "EDB_CONFIG")]
    config: Option<String>,

    /// Capture device index or path (overrides the config file)
    #[arg(short, long)]
    device: Option<String>,

    /// Show synthetic colour bars instead of a capture device
    #[arg(long)]
    test_pattern: bool,

    /// Start with vsync enabled
    #[arg(long)]
    vsync: bool,

    /// Start with the FPS overlay shown
    #[arg(long)]
    show_fps: bool,

    /// Run in a window instead of borderless fullscreen
    #[arg(long)]
    windowed: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.capture.device = device.clone();
            config.capture.source = "device".to_string();
        }
        if self.test_pattern {
            config.capture.source = "pattern".to_string();
        }
        if self.vsync {
            config.display.vsync = true;
        }
        if self.show_fps {
            config.display.show_overlay = true;
        }
        if self.windowed {
            config.display.fullscreen = false;
        }
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => config::resolve_path(path),
        None => Config::default_config_path()?,
    };
    let loaded = Config::load_from_path(&config_path);

    // RUST_LOG still wins over both
    let log_level = cli
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|c| c.general.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("Starting edb v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using config at: {}", config_path.display());

    let mut config = loaded?;
    cli.apply(&mut config);
    config.validate().context("Invalid settings")?;

    log::info!("  Capture:");
    if config.uses_test_pattern() {
        log::info!("    - Source: test pattern");
    } else {
        log::info!("    - Source: {}", config.device_settings().device_path());
    }
    log::info!(
        "    - Mode: {}x{}@{}",
        config.capture.width,
        config.capture.height,
        config.capture.fps
    );
    log::info!("  Display:");
    log::info!(
        "    - VSync: {}",
        if config.display.vsync { "on" } else { "off" }
    );
    log::info!(
        "    - Keys: overlay={}, vsync={}, exit={}",
        config.keys.toggle_overlay,
        config.keys.toggle_vsync,
        config.keys.exit
    );

    let source: Box<dyn CaptureSource> = if config.uses_test_pattern() {
        Box::new(TestPatternSource::new(
            config.capture.width,
            config.capture.height,
            config.capture.fps,
        )?)
    } else {
        Box::new(GstCaptureSource::open(&config.device_settings())?)
    };

    bridge::app::run(&config, source)?;

    log::info!("edb stopped");
    Ok(())
}
