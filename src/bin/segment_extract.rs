//! Cuts the ideal segment out of a full pose recording.
//!
//! Usage: segment-extract <recording.json> <output.json> [window]

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dance_coach::segment::{extract_ideal_segment, IdealSegment, DEFAULT_WINDOW_SIZE};

const RECORDING_SUFFIX: &str = "_pose_data";

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _tracing = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .try_init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        bail!("usage: {} <recording.json> <output.json> [window]", args[0]);
    }
    let input = Path::new(&args[1]);
    let output = Path::new(&args[2]);
    let window = match args.get(3) {
        Some(w) => w.parse::<usize>().with_context(|| format!("invalid window size: {}", w))?,
        None => DEFAULT_WINDOW_SIZE,
    };

    let clip = input
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_end_matches(RECORDING_SUFFIX).to_string())
        .context("input path has no file name")?;

    let content = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let recording = IdealSegment::parse(&clip, &content)?;
    tracing::info!(clip = %clip, frames = recording.len(), window, "recording loaded");

    let ideal = extract_ideal_segment(&recording, window)?;
    std::fs::write(output, ideal.to_json_pretty()?)
        .with_context(|| format!("failed to write {}", output.display()))?;

    let first = ideal.frame(0).map(|f| f.frame).unwrap_or_default();
    tracing::info!(
        clip = %clip,
        first_frame = first,
        output = %output.display(),
        "ideal segment written"
    );
    Ok(())
}
