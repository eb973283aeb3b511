use std::path::PathBuf;
use thiserror::Error;

use crate::core::region::RegionKey;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("视频不可用 {path:?}: {reason}")]
    MediaUnavailable { path: PathBuf, reason: String },
    #[error("分类失败 {video:?}: {reason}")]
    ClassificationFailure { video: PathBuf, reason: String },
    #[error("裁剪转码失败 {video:?}: {reason}")]
    CropTranscodeFailure { video: PathBuf, reason: String },
    #[error("报告模板损坏 ({region}): {reason}")]
    TemplateCorruption { region: RegionKey, reason: String },
    #[error("报告模板为空: {path:?}")]
    TemplateEmpty { path: PathBuf },
    #[error("PDF 导出失败: {0}")]
    PdfRenderFailure(String),
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("A job is already in flight")]
    JobInFlight,
    #[error("No region selected")]
    NoRegionSelected,
    #[error("Worker panicked: {0}")]
    WorkerPanic(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl ScoringError {
    pub fn media_unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ScoringError::MediaUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// 稳定的错误类别名，供 Dart 侧分支判断
    pub fn kind(&self) -> &'static str {
        match self {
            ScoringError::MediaUnavailable { .. } => "MediaUnavailable",
            ScoringError::ClassificationFailure { .. } => "ClassificationFailure",
            ScoringError::CropTranscodeFailure { .. } => "CropTranscodeFailure",
            ScoringError::TemplateCorruption { .. } => "TemplateCorruption",
            ScoringError::TemplateEmpty { .. } => "TemplateEmpty",
            ScoringError::PdfRenderFailure(_) => "PdfRenderFailure",
            ScoringError::InvalidGeometry(_) => "InvalidGeometry",
            ScoringError::JobInFlight => "JobInFlight",
            ScoringError::NoRegionSelected => "NoRegionSelected",
            ScoringError::WorkerPanic(_) => "WorkerPanic",
            ScoringError::Config(_) => "Config",
            ScoringError::Io(_) => "Io",
            ScoringError::Image(_) => "Image",
        }
    }
}
