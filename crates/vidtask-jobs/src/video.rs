//! Video job bodies.
//!
//! Each body parses its JSON argument object, validates the input,
//! builds an FFmpeg argv, runs it through the executor, and attaches a
//! `task_info` map of the resolved arguments. Command construction is
//! kept separate from execution so argument resolution is testable
//! without FFmpeg.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use vidtask_exec::run_command;
use vidtask_models::ExecutionResult;

use crate::error::{JobError, JobResult};
use crate::registry::JobRegistry;

/// Register all video jobs.
pub fn register_video_jobs(registry: &mut JobRegistry) {
    registry.register("video", "convert_video_format", convert_video_format);
    registry.register("video", "compress_video", compress_video);
    registry.register("video", "extract_frames", extract_frames);
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

async fn require_input_file(path: &str) -> JobResult<()> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(JobError::validation(format!(
            "Input file not found: {}",
            path
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------
// convert_video_format
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ConvertArgs {
    input_file: String,
    #[serde(default = "default_output_format")]
    output_format: String,
    #[serde(default)]
    output_file: Option<String>,
    #[serde(default)]
    options: Option<Map<String, Value>>,
}

fn default_output_format() -> String {
    "mp4".to_string()
}

/// Build the convert argv and resolved-argument map.
fn build_convert_command(args: &ConvertArgs) -> (Vec<String>, Map<String, Value>) {
    let output_file = args.output_file.clone().unwrap_or_else(|| {
        format!("{}.{}", file_stem(&args.input_file), args.output_format)
    });

    let mut cmd = vec!["ffmpeg".to_string(), "-i".to_string(), args.input_file.clone()];

    // Free-form FFmpeg options: true adds a bare flag, false/null are
    // skipped, anything else adds the flag with its value.
    if let Some(options) = &args.options {
        for (key, value) in options {
            match value {
                Value::Bool(true) => cmd.push(format!("-{}", key)),
                Value::Bool(false) | Value::Null => {}
                Value::String(s) => {
                    cmd.push(format!("-{}", key));
                    cmd.push(s.clone());
                }
                other => {
                    cmd.push(format!("-{}", key));
                    cmd.push(other.to_string());
                }
            }
        }
    }

    cmd.push(output_file.clone());

    let mut task_info = Map::new();
    task_info.insert("input_file".into(), Value::String(args.input_file.clone()));
    task_info.insert(
        "output_format".into(),
        Value::String(args.output_format.clone()),
    );
    task_info.insert("output_file".into(), Value::String(output_file));

    (cmd, task_info)
}

/// Convert a video to another container format.
pub async fn convert_video_format(args: Value) -> JobResult<ExecutionResult> {
    let args: ConvertArgs = serde_json::from_value(args)?;
    require_input_file(&args.input_file).await?;

    let (cmd, task_info) = build_convert_command(&args);
    debug!("convert_video_format: {}", cmd.join(" "));

    let result = run_command(&cmd).await?;
    Ok(result.with_task_info(task_info))
}

// ---------------------------------------------------------------------
// compress_video
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CompressArgs {
    input_file: String,
    #[serde(default)]
    output_file: Option<String>,
    #[serde(default = "default_quality")]
    quality: String,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    bitrate: Option<String>,
}

fn default_quality() -> String {
    "medium".to_string()
}

/// CRF and preset for a quality label. Unknown labels fall back to medium.
fn quality_preset(quality: &str) -> (&'static str, &'static str) {
    match quality.to_lowercase().as_str() {
        "low" => ("28", "ultrafast"),
        "high" => ("18", "slow"),
        _ => ("23", "medium"),
    }
}

/// Build the compress argv and resolved-argument map.
fn build_compress_command(args: &CompressArgs) -> (Vec<String>, Map<String, Value>) {
    let output_file = args
        .output_file
        .clone()
        .unwrap_or_else(|| format!("{}_compressed.mp4", file_stem(&args.input_file)));

    let (crf, preset) = quality_preset(&args.quality);

    let mut cmd = vec![
        "ffmpeg".to_string(),
        "-i".to_string(),
        args.input_file.clone(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-crf".to_string(),
        crf.to_string(),
        "-preset".to_string(),
        preset.to_string(),
    ];

    if let Some(resolution) = &args.resolution {
        let scale = match resolution.as_str() {
            "720p" => "scale=-1:720".to_string(),
            "1080p" => "scale=-1:1080".to_string(),
            other => format!("scale={}", other),
        };
        cmd.push("-vf".to_string());
        cmd.push(scale);
    }

    if let Some(bitrate) = &args.bitrate {
        cmd.push("-b:v".to_string());
        cmd.push(bitrate.clone());
    }

    cmd.push("-c:a".to_string());
    cmd.push("aac".to_string());
    cmd.push("-b:a".to_string());
    cmd.push("128k".to_string());
    cmd.push(output_file.clone());

    let mut task_info = Map::new();
    task_info.insert("input_file".into(), Value::String(args.input_file.clone()));
    task_info.insert("output_file".into(), Value::String(output_file));
    task_info.insert("quality".into(), Value::String(args.quality.clone()));
    task_info.insert(
        "resolution".into(),
        args.resolution
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    task_info.insert(
        "bitrate".into(),
        args.bitrate.clone().map(Value::String).unwrap_or(Value::Null),
    );

    (cmd, task_info)
}

/// Compress a video with libx264.
pub async fn compress_video(args: Value) -> JobResult<ExecutionResult> {
    let args: CompressArgs = serde_json::from_value(args)?;
    require_input_file(&args.input_file).await?;

    let (cmd, task_info) = build_compress_command(&args);
    debug!("compress_video: {}", cmd.join(" "));

    let result = run_command(&cmd).await?;
    Ok(result.with_task_info(task_info))
}

// ---------------------------------------------------------------------
// extract_frames
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ExtractFramesArgs {
    input_file: String,
    output_dir: String,
    #[serde(default)]
    frame_rate: Option<f64>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default = "default_frame_format")]
    format: String,
}

fn default_frame_format() -> String {
    "jpg".to_string()
}

/// Build the frame-extraction argv and resolved-argument map.
fn build_extract_frames_command(args: &ExtractFramesArgs) -> (Vec<String>, Map<String, Value>) {
    let output_pattern = Path::new(&args.output_dir)
        .join(format!("frame_%04d.{}", args.format))
        .to_string_lossy()
        .to_string();

    let mut cmd = vec![
        "ffmpeg".to_string(),
        "-i".to_string(),
        args.input_file.clone(),
    ];

    if let Some(start_time) = &args.start_time {
        cmd.push("-ss".to_string());
        cmd.push(start_time.clone());
    }

    if let Some(duration) = &args.duration {
        cmd.push("-t".to_string());
        cmd.push(duration.clone());
    }

    if let Some(frame_rate) = args.frame_rate {
        cmd.push("-r".to_string());
        cmd.push(frame_rate.to_string());
    }

    cmd.push("-q:v".to_string());
    cmd.push("2".to_string());
    cmd.push(output_pattern);

    let mut task_info = Map::new();
    task_info.insert("input_file".into(), Value::String(args.input_file.clone()));
    task_info.insert("output_dir".into(), Value::String(args.output_dir.clone()));
    task_info.insert(
        "frame_rate".into(),
        args.frame_rate
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    );
    task_info.insert(
        "start_time".into(),
        args.start_time
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    task_info.insert(
        "duration".into(),
        args.duration
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    task_info.insert("format".into(), Value::String(args.format.clone()));

    (cmd, task_info)
}

/// Create the frame output directory if it does not exist yet.
async fn prepare_output_dir(dir: &str) -> JobResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| JobError::Infrastructure(format!("Cannot create output dir {}: {}", dir, e)))
}

/// Extract frames from a video into an image sequence.
pub async fn extract_frames(args: Value) -> JobResult<ExecutionResult> {
    let args: ExtractFramesArgs = serde_json::from_value(args)?;
    require_input_file(&args.input_file).await?;
    prepare_output_dir(&args.output_dir).await?;

    let (cmd, task_info) = build_extract_frames_command(&args);
    debug!("extract_frames: {}", cmd.join(" "));

    let result = run_command(&cmd).await?;
    Ok(result.with_task_info(task_info))
}
