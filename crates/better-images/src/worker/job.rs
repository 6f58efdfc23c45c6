use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upload types accepted by the intake, by lowercase extension.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tiff"];

/// Extensions of artifacts whose dimensions can be read for display.
const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tiff", "tif"];

/// Returns the lowercase extension of `filename` when it is an accepted upload type.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?.to_lowercase();
    ALLOWED_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

pub fn is_raster(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| RASTER_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upscale factors the super-resolution step supports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "u32", into = "u32")]
pub enum UpscaleFactor {
    X2,
    X4,
}

impl UpscaleFactor {
    pub fn value(&self) -> u32 {
        match self {
            UpscaleFactor::X2 => 2,
            UpscaleFactor::X4 => 4,
        }
    }
}

impl TryFrom<u32> for UpscaleFactor {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(UpscaleFactor::X2),
            4 => Ok(UpscaleFactor::X4),
            other => Err(format!("upscale factor must be 2 or 4, got {}", other)),
        }
    }
}

impl From<UpscaleFactor> for u32 {
    fn from(factor: UpscaleFactor) -> Self {
        factor.value()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Keep the raster produced by the previous steps.
    #[default]
    #[serde(alias = "raster")]
    Png,
    #[serde(alias = "vector")]
    Svg,
    #[serde(alias = "icon")]
    Ico,
}

/// The steps requested for one run of a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineOptions {
    #[serde(default)]
    pub upscale: Option<UpscaleFactor>,
    #[serde(default)]
    pub remove_bg: bool,
    #[serde(default)]
    pub format: OutputFormat,
}

impl PipelineOptions {
    /// Result kinds a successful run with these options produces.
    pub fn expected_kinds(&self) -> Vec<ResultKind> {
        let mut kinds = Vec::new();
        if self.upscale.is_some() {
            kinds.push(ResultKind::Upscaled);
        }
        if self.remove_bg {
            kinds.push(ResultKind::NoBackground);
        }
        match self.format {
            OutputFormat::Png => {}
            OutputFormat::Svg => kinds.push(ResultKind::Svg),
            OutputFormat::Ico => kinds.push(ResultKind::Ico),
        }
        kinds.push(ResultKind::Final);
        kinds
    }
}

/// Named category of a produced artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Original,
    Upscaled,
    NoBackground,
    Svg,
    Ico,
    Final,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Original => "original",
            ResultKind::Upscaled => "upscaled",
            ResultKind::NoBackground => "no_background",
            ResultKind::Svg => "svg",
            ResultKind::Ico => "ico",
            ResultKind::Final => "final",
        }
    }

    /// Suffix appended to the upload's base name in download filenames.
    pub fn download_suffix(&self) -> &'static str {
        match self {
            ResultKind::Upscaled => "_upscaled",
            ResultKind::NoBackground => "_nobg",
            ResultKind::Final => "_processed",
            ResultKind::Original | ResultKind::Svg | ResultKind::Ico => "",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(ResultKind::Original),
            "upscaled" => Ok(ResultKind::Upscaled),
            "no_background" => Ok(ResultKind::NoBackground),
            "svg" => Ok(ResultKind::Svg),
            "ico" => Ok(ResultKind::Ico),
            "final" => Ok(ResultKind::Final),
            other => Err(format!("unknown result kind '{}'", other)),
        }
    }
}

/// Pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Prepare,
    Upscale,
    RemoveBackground,
    Convert,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Prepare => write!(f, "prepare"),
            Step::Upscale => write!(f, "upscale"),
            Step::RemoveBackground => write!(f, "remove_background"),
            Step::Convert => write!(f, "convert"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A transformation provider raised.
    Provider,
    /// Reading or writing job files failed.
    Storage,
    /// The worker could not run the job at all.
    Worker,
}

/// Why a job ended in `error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<Step>,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub batch_id: Option<String>,
    pub status: JobStatus,
    pub progress: String,
    pub error: Option<JobFailure>,
    /// Current source bytes on disk.
    pub source: PathBuf,
    /// Filename as uploaded by the client.
    pub original_name: String,
    pub width: u32,
    pub height: u32,
    pub pipeline: Option<PipelineOptions>,
    pub results: BTreeMap<ResultKind, PathBuf>,
    pub final_dimensions: Option<(u32, u32)>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(source: PathBuf, original_name: String, width: u32, height: u32) -> Self {
        Self::with_id(
            uuid::Uuid::new_v4().to_string(),
            source,
            original_name,
            width,
            height,
        )
    }

    /// Constructor with an explicit id, used when the id names the stored upload.
    pub fn with_id(
        id: String,
        source: PathBuf,
        original_name: String,
        width: u32,
        height: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            batch_id: None,
            status: JobStatus::Uploaded,
            progress: String::new(),
            error: None,
            source,
            original_name,
            width,
            height,
            pipeline: None,
            results: BTreeMap::new(),
            final_dimensions: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn in_batch(mut self, batch_id: &str) -> Self {
        self.batch_id = Some(batch_id.to_string());
        self
    }

    pub fn has_results(&self) -> bool {
        !self.results.is_empty()
    }

    /// Result kinds currently available, without exposing their paths.
    pub fn available_results(&self) -> BTreeMap<String, bool> {
        self.results
            .keys()
            .map(|k| (k.as_str().to_string(), true))
            .collect()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
