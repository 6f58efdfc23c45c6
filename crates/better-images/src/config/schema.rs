use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Placeholder replaced by the step's input path in external command args.
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder replaced by the step's output path in external command args.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_upload_directory")]
    pub upload_directory: PathBuf,
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Sources larger than this (either side) are shrunk before upscaling.
    #[serde(default = "default_max_input_dimension")]
    pub max_input_dimension: u32,
    #[serde(default = "default_icon_sizes")]
    pub icon_sizes: Vec<u32>,
    #[serde(default = "default_background_removal")]
    pub background_removal: CommandConfig,
    #[serde(default = "default_vectorizer")]
    pub vectorizer: CommandConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_directory: default_upload_directory(),
            output_directory: default_output_directory(),
            worker_count: default_worker_count(),
            max_upload_bytes: default_max_upload_bytes(),
            max_input_dimension: default_max_input_dimension(),
            icon_sizes: default_icon_sizes(),
            background_removal: default_background_removal(),
            vectorizer: default_vectorizer(),
            retention: RetentionConfig::default(),
        }
    }
}

fn default_upload_directory() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("outputs")
}

/// Heavy transformations are memory bound, so stay small even on big machines.
fn default_worker_count() -> usize {
    num_cpus::get().clamp(1, 2)
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_max_input_dimension() -> u32 {
    1500
}

fn default_icon_sizes() -> Vec<u32> {
    vec![16, 32, 48, 64, 128, 256]
}

fn default_background_removal() -> CommandConfig {
    CommandConfig {
        program: "rembg".to_string(),
        args: vec![
            "i".to_string(),
            INPUT_PLACEHOLDER.to_string(),
            OUTPUT_PLACEHOLDER.to_string(),
        ],
    }
}

fn default_vectorizer() -> CommandConfig {
    let args = [
        "--input",
        INPUT_PLACEHOLDER,
        "--output",
        OUTPUT_PLACEHOLDER,
        "--colormode",
        "color",
        "--hierarchical",
        "stacked",
        "--mode",
        "spline",
        "--filter_speckle",
        "2",
        "--color_precision",
        "8",
        "--gradient_step",
        "5",
        "--corner_threshold",
        "45",
        "--segment_length",
        "3",
        "--splice_threshold",
        "35",
        "--path_precision",
        "5",
    ];
    CommandConfig {
        program: "vtracer".to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
    }
}

/// An external program invoked for one transformation step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// What happens to produced artifacts over time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Delete the previous run's artifacts when a job is processed again.
    #[serde(default = "default_true")]
    pub purge_on_rerun: bool,
    /// Output files older than this are swept. `None` keeps them forever.
    #[serde(default)]
    pub max_age_hours: Option<u64>,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            purge_on_rerun: true,
            max_age_hours: None,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}
