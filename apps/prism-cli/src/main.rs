use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use prism_common::Settings;
use prism_pipeline::{FixedWindow, Renderer, RendererStats};
use prism_render::RecordingBackend;
use prism_scene::World;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prism-cli", about = "Headless tools for the prism renderer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Render the demo scene through the recording backend
    Run {
        /// Number of frames to render
        #[arg(short, long, default_value = "60")]
        frames: u64,
        #[arg(long, default_value = "1280")]
        width: u32,
        #[arg(long, default_value = "720")]
        height: u32,
        /// Settings file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Resize before a frame, as WIDTHxHEIGHT@FRAME. Repeatable.
        #[arg(long = "resize")]
        resizes: Vec<Resize>,
        /// Print a JSON report instead of text
        #[arg(long)]
        json: bool,
    },
    /// Load, validate and print settings
    Settings {
        /// Settings file (YAML). Defaults are printed when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

/// A window size change scheduled before a given frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Resize {
    width: u32,
    height: u32,
    frame: u64,
}

impl FromStr for Resize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (size, frame) = s
            .split_once('@')
            .ok_or_else(|| format!("`{s}` is not WIDTHxHEIGHT@FRAME"))?;
        let (width, height) = size
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("`{size}` is not WIDTHxHEIGHT"))?;
        let parse = |v: &str, what: &str| {
            v.trim()
                .parse::<u64>()
                .map_err(|e| format!("bad {what} `{v}`: {e}"))
        };
        let width = u32::try_from(parse(width, "width")?).map_err(|e| e.to_string())?;
        let height = u32::try_from(parse(height, "height")?).map_err(|e| e.to_string())?;
        Ok(Self {
            width,
            height,
            frame: parse(frame, "frame")?,
        })
    }
}

#[derive(Serialize)]
struct Report {
    stats: RendererStats,
    entities: usize,
    /// Recorded backend commands grouped by kind.
    commands: BTreeMap<&'static str, usize>,
    live_buffers: usize,
    live_textures: usize,
    live_framebuffers: usize,
}

fn load_settings(config: Option<&Path>) -> anyhow::Result<Settings> {
    match config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => Ok(Settings::default()),
    }
}

fn run(
    frames: u64,
    size: (u32, u32),
    settings: Settings,
    mut resizes: Vec<Resize>,
    json: bool,
) -> anyhow::Result<()> {
    resizes.sort_by_key(|r| r.frame);
    let mut window = FixedWindow::new(size.0, size.1);
    let mut world = World::new();
    let mut backend = RecordingBackend::new();
    let scene = prism_scene::demo::populate(&mut world, &mut backend, &settings.camera)?;
    tracing::debug!("demo camera entity {:?}", scene.camera);

    let mut renderer = Renderer::new(backend, settings, &window)?;
    let mut pending = resizes.into_iter().peekable();
    for frame in 0..frames {
        while let Some(resize) = pending.next_if(|r| r.frame <= frame) {
            tracing::info!(
                "resizing to {}x{} before frame {}",
                resize.width,
                resize.height,
                frame
            );
            window.width = resize.width;
            window.height = resize.height;
        }
        world.step(1.0 / 60.0);
        renderer.render(&window, &world)?;
    }

    let stats = renderer.stats();
    let entities = world.entity_count();
    let mut backend = renderer.shutdown();
    let mut commands = BTreeMap::new();
    for command in backend.commands() {
        *commands.entry(command.name()).or_insert(0) += 1;
    }
    world.destroy(&mut backend);

    if json {
        let report = Report {
            stats,
            entities,
            commands,
            live_buffers: backend.live_buffer_count(),
            live_textures: backend.live_texture_count(),
            live_framebuffers: backend.live_framebuffer_count(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{stats}");
        println!("Entities: {entities}");
        for (name, count) in &commands {
            println!("  {name:<22} {count}");
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info => {
            println!("prism-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("render: {}", prism_render::crate_info());
            println!("pipeline: {}", prism_pipeline::crate_info());
        }
        Commands::Run {
            frames,
            width,
            height,
            config,
            resizes,
            json,
        } => {
            let settings = load_settings(config.as_deref())?;
            run(frames, (width, height), settings, resizes, json)?;
        }
        Commands::Settings { config, json } => {
            let settings = load_settings(config.as_deref())?;
            settings.validate()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                print!("{}", settings.to_yaml_string()?);
            }
        }
    }

    Ok(())
}
