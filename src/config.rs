use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{
    DetectorSettings, InferenceBackend, ModelFamily, SyntheticCrowdBackend,
    DEFAULT_OVERLAP_THRESHOLD,
};

const DEFAULT_FAMILY: ModelFamily = ModelFamily::GridAnchor;
const DEFAULT_OUTPUT_DIR: &str = "processed";
const DEFAULT_SEED: u64 = 7;

pub const CONFIG_ENV: &str = "HEADCOUNT_CONFIG";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CounterConfigFile {
    detector: Option<DetectorConfigFile>,
    annotate: Option<AnnotateConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    family: Option<String>,
    backend: Option<String>,
    model: Option<PathBuf>,
    confidence: Option<f32>,
    nms_overlap: Option<f32>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AnnotateConfigFile {
    font: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
}

/// Where inference runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Deterministic synthetic crowd; no model needed.
    Synthetic,
    /// ONNX model through tract (feature: backend-tract).
    Tract,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "synthetic" => Ok(BackendKind::Synthetic),
            "tract" | "onnx" => Ok(BackendKind::Tract),
            other => Err(anyhow!(
                "unknown backend '{}' (expected synthetic or tract)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CounterConfig {
    pub detector: DetectorConfig,
    pub font_path: Option<PathBuf>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub family: ModelFamily,
    /// `None` until a model or an explicit backend is configured.
    pub backend: Option<BackendKind>,
    pub model_path: Option<PathBuf>,
    /// `None` keeps the family default.
    pub confidence_threshold: Option<f32>,
    pub overlap_threshold: f32,
    pub seed: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig {
                family: DEFAULT_FAMILY,
                backend: None,
                model_path: None,
                confidence_threshold: None,
                overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
                seed: DEFAULT_SEED,
            },
            font_path: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl CounterConfig {
    /// File named by `HEADCOUNT_CONFIG` (if any), then environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, with an explicit config file.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => CounterConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CounterConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let detector = file.detector.unwrap_or_default();
        let family = match detector.family.as_deref() {
            Some(family) => family.parse()?,
            None => defaults.detector.family,
        };
        let model_path = detector.model;
        let backend = match detector.backend.as_deref() {
            Some(backend) => Some(backend.parse()?),
            None => model_path.as_ref().map(|_| BackendKind::Tract),
        };
        Ok(Self {
            detector: DetectorConfig {
                family,
                backend,
                model_path,
                confidence_threshold: detector.confidence,
                overlap_threshold: detector
                    .nms_overlap
                    .unwrap_or(defaults.detector.overlap_threshold),
                seed: detector.seed.unwrap_or(defaults.detector.seed),
            },
            font_path: file.annotate.and_then(|annotate| annotate.font),
            output_dir: file
                .output
                .and_then(|output| output.dir)
                .unwrap_or(defaults.output_dir),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(family) = non_empty_env("HEADCOUNT_FAMILY") {
            self.detector.family = family.parse()?;
        }
        if let Some(model) = non_empty_env("HEADCOUNT_MODEL") {
            self.detector.model_path = Some(PathBuf::from(model));
            self.detector.backend = Some(BackendKind::Tract);
        }
        if let Some(backend) = non_empty_env("HEADCOUNT_BACKEND") {
            self.detector.backend = Some(backend.parse()?);
        }
        if let Some(confidence) = non_empty_env("HEADCOUNT_CONFIDENCE") {
            let value: f32 = confidence
                .parse()
                .map_err(|_| anyhow!("HEADCOUNT_CONFIDENCE must be a number"))?;
            self.detector.confidence_threshold = Some(value);
        }
        if let Some(overlap) = non_empty_env("HEADCOUNT_NMS_OVERLAP") {
            self.detector.overlap_threshold = overlap
                .parse()
                .map_err(|_| anyhow!("HEADCOUNT_NMS_OVERLAP must be a number"))?;
        }
        if let Some(font) = non_empty_env("HEADCOUNT_FONT") {
            self.font_path = Some(PathBuf::from(font));
        }
        if let Some(dir) = non_empty_env("HEADCOUNT_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(threshold) = self.detector.confidence_threshold {
            if !(0.0..1.0).contains(&threshold) {
                bail!("confidence threshold must be in [0, 1), got {}", threshold);
            }
        }
        if !(0.0..=1.0).contains(&self.detector.overlap_threshold) {
            bail!(
                "NMS overlap threshold must be in [0, 1], got {}",
                self.detector.overlap_threshold
            );
        }
        if self.detector.backend == Some(BackendKind::Tract) && self.detector.model_path.is_none()
        {
            bail!("the tract backend needs a model path");
        }
        Ok(())
    }

    /// `validate`, then settle the backend for `input`. Synthetic clips
    /// (`stub://`) fall back to the synthetic backend; real media needs a
    /// model or an explicit backend choice.
    pub fn validate_for_input(&mut self, input: &str) -> Result<()> {
        self.validate()?;
        if self.detector.backend.is_none() {
            if !input.starts_with(crate::ingest::file::SYNTHETIC_SCHEME) {
                bail!(
                    "no detector model configured for {} (set --model, HEADCOUNT_MODEL or \
                     detector.model)",
                    input
                );
            }
            self.detector.backend = Some(BackendKind::Synthetic);
        }
        Ok(())
    }
}

impl DetectorConfig {
    pub fn settings(&self) -> DetectorSettings {
        DetectorSettings {
            confidence_threshold: self.confidence_threshold,
            overlap_threshold: self.overlap_threshold,
        }
    }

    /// Threshold actually applied: the override or the family default.
    pub fn effective_confidence(&self) -> f32 {
        self.confidence_threshold
            .unwrap_or_else(|| self.family.default_confidence_threshold())
    }

    /// Instantiate the configured inference backend (not yet loaded).
    pub fn build_backend(&self) -> Result<Box<dyn InferenceBackend>> {
        match self.backend {
            Some(BackendKind::Synthetic) => Ok(Box::new(SyntheticCrowdBackend::new(
                self.family,
                self.seed,
            ))),
            Some(BackendKind::Tract) => self.build_tract(),
            None => bail!("no detector model configured"),
        }
    }

    #[cfg(feature = "backend-tract")]
    fn build_tract(&self) -> Result<Box<dyn InferenceBackend>> {
        let model = self
            .model_path
            .as_ref()
            .ok_or_else(|| anyhow!("the tract backend needs a model path"))?;
        Ok(Box::new(crate::detect::TractBackend::new(model, self.family)))
    }

    #[cfg(not(feature = "backend-tract"))]
    fn build_tract(&self) -> Result<Box<dyn InferenceBackend>> {
        bail!("ONNX models require building with the backend-tract feature")
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<CounterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))
    }
}
