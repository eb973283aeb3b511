//! 配置（JSON5 文件，所有字段都有默认值）

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::error::ScoringError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub ffmpeg_path: String,
    pub wkhtmltopdf_path: String,
    pub model_path: PathBuf,
    pub template_path: PathBuf,
    /// 抽帧临时目录，每次抽帧前清空
    pub work_dir: PathBuf,
    /// 每个视频最多参与分类的帧数
    pub max_frames: usize,
    /// 裁剪区域的最小边长（源视频像素）
    pub min_crop_side: u32,
    pub crop_quality: u32,
    pub crop_frame_limit: Option<u32>,
    pub crop_suffix: String,
    pub report_html_name: String,
    pub report_pdf_name: String,
    pub worker_threads: Option<usize>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            wkhtmltopdf_path: "wkhtmltopdf".to_string(),
            model_path: PathBuf::from("model.json"),
            template_path: PathBuf::from("resources/report.html"),
            work_dir: std::env::temp_dir().join("lung_score_frames"),
            max_frames: 16,
            min_crop_side: 224,
            crop_quality: 2,
            crop_frame_limit: None,
            crop_suffix: "_cropped".to_string(),
            report_html_name: "report.html".to_string(),
            report_pdf_name: "report.pdf".to_string(),
            worker_threads: None,
        }
    }
}

impl ScoringConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScoringError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json5(&text)
    }

    pub fn from_json5(text: &str) -> Result<Self, ScoringError> {
        let config: ScoringConfig =
            json5::from_str(text).map_err(|e| ScoringError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ScoringError> {
        if self.max_frames == 0 {
            return Err(ScoringError::Config("max_frames must be at least 1".into()));
        }
        if self.min_crop_side == 0 {
            return Err(ScoringError::Config("min_crop_side must be at least 1".into()));
        }
        if self.crop_suffix.is_empty() {
            return Err(ScoringError::Config(
                "crop_suffix must not be empty, the crop would overwrite its source".into(),
            ));
        }
        Ok(())
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1)
    }
}
