//! `skelfuse` – command line front end for multi-camera skeleton fusion.
//!
//! ```text
//! skelfuse fuse [FRAMES|-]   fuse JSON-lines frames (stdin by default)
//! skelfuse schema            print the JSON Schemas of the input files
//! skelfuse init              write a default ~/.skelfuse/config.toml
//! skelfuse help              show usage
//! ```
//!
//! Fused frames go to stdout as JSON lines; everything meant for a human,
//! including logs, goes to stderr.

mod config;

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use std::process::ExitCode;

use colored::Colorize;
use schemars::schema_for;
use skelfuse_runtime::{FusionPipeline, PipelineConfig, build_restorer, load_calibration};
use skelfuse_types::{CalibrationSet, FrameInput};
use tracing::error;

fn main() -> ExitCode {
    let _guard = skelfuse_runtime::init_tracing("skelfuse");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str).unwrap_or("help") {
        "fuse" => cmd_fuse(args.get(1).map(String::as_str)),
        "schema" => cmd_schema(),
        "init" => cmd_init(),
        "help" | "-h" | "--help" => {
            print_usage();
            ExitCode::SUCCESS
        }
        other => {
            eprintln!("{} '{}'", "Unknown command:".red(), other.yellow());
            print_usage();
            ExitCode::from(2)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_fuse(frames: Option<&str>) -> ExitCode {
    let cfg = match config::load_or_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let restorer = match load_calibration(&cfg.calibration_path).and_then(|set| build_restorer(&set)) {
        Ok(r) => r,
        Err(e) => {
            error!(path = %cfg.calibration_path.display(), error = %e, "calibration failed");
            eprintln!(
                "{} {}: {}",
                "Cannot use calibration".red(),
                cfg.calibration_path.display().to_string().bold(),
                e
            );
            return ExitCode::FAILURE;
        }
    };

    let reader: Box<dyn BufRead> = match frames {
        None | Some("-") => Box::new(io::stdin().lock()),
        Some(path) => match File::open(path) {
            Ok(f) => Box::new(BufReader::new(f)),
            Err(e) => {
                eprintln!("{} {}: {}", "Cannot open".red(), path.bold(), e);
                return ExitCode::FAILURE;
            }
        },
    };

    let mut pipeline = FusionPipeline::new(
        restorer,
        PipelineConfig {
            skip_unknown_feeds: cfg.skip_unknown_feeds,
            strict: cfg.strict,
        },
    );

    match pipeline.run(reader, BufWriter::new(io::stdout().lock())) {
        Ok(stats) => {
            eprintln!(
                "  {} {} frame(s) fused, {} failed, {} feed(s) dropped",
                "✓".green().bold(),
                stats.frames_fused,
                stats.frames_failed,
                stats.feeds_dropped
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            let stats = pipeline.stats();
            eprintln!(
                "{}: {} (after {} fused frame(s))",
                "Fusion aborted".red(),
                e,
                stats.frames_fused
            );
            ExitCode::FAILURE
        }
    }
}

fn cmd_schema() -> ExitCode {
    let schemas = serde_json::json!({
        "calibration": schema_for!(CalibrationSet),
        "frame": schema_for!(FrameInput),
    });
    match serde_json::to_string_pretty(&schemas) {
        Ok(s) => {
            println!("{s}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Schema error".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_init() -> ExitCode {
    let path = config::config_path();
    match config::load() {
        Ok(Some(_)) => {
            eprintln!(
                "  Config already present at {}",
                path.display().to_string().bold()
            );
            return ExitCode::SUCCESS;
        }
        Ok(None) => {}
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    }

    let cfg = config::Config::default();
    match config::save(&cfg) {
        Ok(()) => {
            eprintln!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            eprintln!(
                "  Calibration will be read from {}",
                cfg.calibration_path.display().to_string().dimmed()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Error saving config".red(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Usage
// ─────────────────────────────────────────────────────────────────────────────

fn print_usage() {
    eprintln!();
    eprintln!(
        "  {} {}",
        "skelfuse".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    eprintln!("  Multi-camera skeleton fusion");
    eprintln!();
    eprintln!("{}", "Commands".bold().underline());
    eprintln!("  {}  – fuse JSON-lines frames from FRAMES or stdin", "fuse [FRAMES|-]".bold().cyan());
    eprintln!("  {}           – print JSON Schemas for calibration and frame input", "schema".bold().cyan());
    eprintln!("  {}             – write a default {}", "init".bold().cyan(), config::config_path().display());
    eprintln!("  {}             – show this message", "help".bold().cyan());
    eprintln!();
    eprintln!("{}", "Environment".bold().underline());
    eprintln!("  SKELFUSE_CONFIG, SKELFUSE_CALIBRATION, SKELFUSE_SKIP_UNKNOWN, SKELFUSE_STRICT,");
    eprintln!("  SKELFUSE_LOG_FORMAT=json, RUST_LOG, OTEL_EXPORTER_OTLP_ENDPOINT");
    eprintln!();
}
