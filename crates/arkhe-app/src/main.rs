use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use arkhe_app::{Dashboard, DashboardReport};
use arkhe_core::{DomainParams, EngineConfig, FieldMode, ViewKind};
use arkhe_render::MAX_SURFACE_DIMENSION;
use clap::Parser;
use serde::Serialize;
use tracing::info;

/// Upper bound on frames per run.
const MAX_FRAMES: usize = 100_000;

#[derive(Parser, Debug)]
#[command(
    name = "arkhe-app",
    version,
    about = "Render Arkhe(N) dashboard panels headlessly"
)]
struct Cli {
    /// Views to mount, one panel each.
    #[arg(
        long = "view",
        env = "ARKHE_VIEWS",
        value_enum,
        value_delimiter = ',',
        default_value = "particle-field"
    )]
    views: Vec<ViewKind>,

    /// JSON engine configuration; replaces the view presets with one panel.
    #[arg(long, env = "ARKHE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(
        long,
        env = "ARKHE_WIDTH",
        default_value_t = 640,
        value_parser = surface_dimension()
    )]
    width: u32,

    #[arg(
        long,
        env = "ARKHE_HEIGHT",
        default_value_t = 480,
        value_parser = surface_dimension()
    )]
    height: u32,

    /// Host frames to run.
    #[arg(long, env = "ARKHE_FRAMES", default_value_t = 120)]
    frames: usize,

    /// Frame pacing; 0 runs as fast as possible.
    #[arg(long, env = "ARKHE_FPS", default_value_t = 0)]
    fps: u32,

    /// Override the preset entity count.
    #[arg(long, env = "ARKHE_ENTITIES")]
    entities: Option<usize>,

    /// Seed for reproducible runs.
    #[arg(long, env = "ARKHE_SEED")]
    seed: Option<u64>,

    #[arg(long, env = "ARKHE_COHERENCE", default_value_t = 0.5)]
    coherence: f32,

    #[arg(long, env = "ARKHE_FLUCTUATION", default_value_t = 0.2)]
    fluctuation: f32,

    /// Field mode; defaults to each view's preset.
    #[arg(long, env = "ARKHE_MODE", value_enum)]
    mode: Option<FieldMode>,

    /// Enable each view's alternate rendering.
    #[arg(long, env = "ARKHE_ALTERNATE")]
    alternate: bool,

    /// Directory receiving one PNG per panel after the run.
    #[arg(long, env = "ARKHE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Path for a JSON run report.
    #[arg(long, env = "ARKHE_REPORT")]
    report: Option<PathBuf>,
}

fn surface_dimension() -> clap::builder::RangedI64ValueParser<u32> {
    clap::value_parser!(u32).range(1..=i64::from(MAX_SURFACE_DIMENSION))
}

impl Cli {
    fn panel_configs(&self) -> Result<Vec<EngineConfig>> {
        let mut configs = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                let config = EngineConfig::from_json_str(&text)
                    .with_context(|| format!("invalid config {}", path.display()))?;
                vec![config]
            }
            None => self
                .views
                .iter()
                .map(|view| EngineConfig::for_view(*view))
                .collect(),
        };
        for config in &mut configs {
            if let Some(count) = self.entities {
                config.entity_count = count;
            }
            if let Some(seed) = self.seed {
                config.rng_seed = Some(seed);
            }
            config.validate().context("invalid panel configuration")?;
        }
        Ok(configs)
    }

    fn params(&self) -> DomainParams {
        DomainParams {
            coherence: self.coherence,
            fluctuation: self.fluctuation,
            mode: self.mode,
            alternate: self.alternate,
        }
        .sanitized()
    }
}

#[derive(Debug, Serialize)]
struct RunReport {
    frames: usize,
    fps: u32,
    elapsed_ms: f64,
    dashboard: DashboardReport,
}

impl RunReport {
    fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).context("failed to serialize run report")?;
        Ok(())
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run(&cli)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn run(cli: &Cli) -> Result<()> {
    let mut dashboard = Dashboard::new();
    let params = cli.params();
    for config in cli.panel_configs()? {
        let view = config.view;
        dashboard
            .mount(config, cli.width, cli.height, params)
            .with_context(|| format!("failed to mount {} panel", view.as_str()))?;
    }

    let frames = cli.frames.min(MAX_FRAMES);
    let interval = (cli.fps > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(cli.fps)));
    info!(
        panels = dashboard.len(),
        frames,
        fps = cli.fps,
        width = cli.width,
        height = cli.height,
        "Starting headless run"
    );

    let started = Instant::now();
    for _ in 0..frames {
        let frame_started = Instant::now();
        dashboard.tick();
        if let Some(interval) = interval {
            let elapsed = frame_started.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
    }
    let elapsed = started.elapsed();

    if let Some(dir) = &cli.output_dir {
        write_snapshots(&dashboard, dir)?;
    }

    let report = RunReport {
        frames,
        fps: cli.fps,
        elapsed_ms: elapsed.as_secs_f64() * 1_000.0,
        dashboard: dashboard.report(),
    };
    if let Some(path) = &cli.report {
        report
            .write_json(path)
            .with_context(|| format!("failed to write run report to {}", path.display()))?;
    }

    let drawn: u64 = report
        .dashboard
        .panels
        .iter()
        .map(|panel| panel.stats.draw_commands)
        .sum();
    info!(
        frames,
        elapsed_ms = report.elapsed_ms,
        draw_commands = drawn,
        "Headless run completed"
    );
    Ok(())
}

fn write_snapshots(dashboard: &Dashboard, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let report = dashboard.report();
    for (index, (id, panel)) in dashboard.panel_ids().zip(&report.panels).enumerate() {
        let png = dashboard
            .snapshot_png(id)
            .with_context(|| format!("failed to snapshot panel {index}"))?;
        let path = dir.join(format!("{index:02}-{}.png", panel.view.as_str()));
        fs::write(&path, png).with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}
