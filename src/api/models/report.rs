use log::warn;
use serde::{Deserialize, Serialize};

use crate::api::models::error::ScoringApiError;
use crate::core::region::{RegionKey, RegionScoreMap, Totals};
use crate::core::report::ReportExport;
use crate::core::session::SessionUpdate;

const PREVIEW_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionScore {
    pub region: String,
    /// 0-3，4 表示未测量
    pub severity: u8,
    pub color: String,
}

impl RegionScore {
    pub(crate) fn list(scores: &RegionScoreMap) -> Vec<Self> {
        scores
            .iter()
            .map(|(region, severity)| RegionScore {
                region: region.as_str().to_string(),
                severity: severity.value(),
                color: severity.color().to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreTotals {
    pub white: u32,
    pub yellow: u32,
    pub orange: u32,
    pub red: u32,
    pub grey: u32,
    pub pathological: u32,
}

impl From<Totals> for ScoreTotals {
    fn from(t: Totals) -> Self {
        Self {
            white: t.white,
            yellow: t.yellow,
            orange: t.orange,
            red: t.red,
            grey: t.not_measured,
            pathological: t.pathological,
        }
    }
}

/// 预览帧（JPEG）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewImage {
    pub width: u32,
    pub height: u32,
    pub jpeg_data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEventKind {
    PreviewReady,
    Cropped,
    Scored,
    DirectoryScored,
    Failed,
}

/// 任务完成事件，字段按 kind 选择性填充
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub job_id: u64,
    pub kind: SessionEventKind,
    pub region: Option<String>,
    pub severity: Option<u8>,
    pub preview: Option<PreviewImage>,
    /// 裁剪输出文件
    pub output_path: Option<String>,
    /// 裁剪成功后自动提交的分类任务
    pub follow_up_job: Option<u64>,
    /// 目录模式下每个分区的结果
    pub region_scores: Vec<RegionScore>,
    pub errors: Vec<ScoringApiError>,
}

impl SessionEvent {
    fn new(job_id: u64, kind: SessionEventKind, region: Option<RegionKey>) -> Self {
        Self {
            job_id,
            kind,
            region: region.map(|r| r.as_str().to_string()),
            severity: None,
            preview: None,
            output_path: None,
            follow_up_job: None,
            region_scores: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl From<SessionUpdate> for SessionEvent {
    fn from(update: SessionUpdate) -> Self {
        match update {
            SessionUpdate::PreviewReady { job_id, frame } => {
                let mut event = Self::new(job_id, SessionEventKind::PreviewReady, None);
                match frame.to_jpeg(PREVIEW_JPEG_QUALITY) {
                    Ok(jpeg_data) => {
                        event.preview = Some(PreviewImage {
                            width: frame.width,
                            height: frame.height,
                            jpeg_data,
                        })
                    }
                    Err(e) => {
                        warn!("Preview encoding failed: {}", e);
                        event.kind = SessionEventKind::Failed;
                        event.errors.push(e.into());
                    }
                }
                event
            }
            SessionUpdate::Cropped {
                job_id,
                output,
                classification_job,
                ..
            } => {
                let mut event = Self::new(job_id, SessionEventKind::Cropped, None);
                event.output_path = Some(output.to_string_lossy().into_owned());
                event.follow_up_job = classification_job;
                event
            }
            SessionUpdate::Scored { job_id, region, score } => {
                let mut event = Self::new(job_id, SessionEventKind::Scored, region);
                event.severity = Some(score.severity().value());
                event
            }
            SessionUpdate::DirectoryScored { job_id, scores } => {
                let mut event = Self::new(job_id, SessionEventKind::DirectoryScored, None);
                event.region_scores = RegionScore::list(&scores.regions)
                    .into_iter()
                    .filter(|s| s.severity != crate::core::region::Severity::NotMeasured.value())
                    .collect();
                event.errors = scores.failures.into_iter().map(ScoringApiError::from).collect();
                event
            }
            SessionUpdate::Failed { job_id, region, error } => {
                let mut event = Self::new(job_id, SessionEventKind::Failed, region);
                event.errors.push(error.into());
                event
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedReport {
    pub html_path: String,
    pub pdf_path: Option<String>,
}

impl From<ReportExport> for ExportedReport {
    fn from(export: ReportExport) -> Self {
        Self {
            html_path: export.html_path.to_string_lossy().into_owned(),
            pdf_path: export.pdf_path.map(|p| p.to_string_lossy().into_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::{DirectoryScores, VideoScore};
    use crate::core::error::ScoringError;
    use crate::core::region::Severity;
    use crate::core::video::FrameSample;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    #[test]
    fn test_region_score_list_covers_all_regions() {
        let mut scores = RegionScoreMap::new();
        scores.set(RegionKey::LeftAnteriorBasal, Severity::Mild);
        let list = RegionScore::list(&scores);
        assert_eq!(list.len(), 14);
        assert_eq!(
            list[1],
            RegionScore {
                region: "left-anterior-basal".into(),
                severity: 1,
                color: "yellow".into()
            }
        );
        assert_eq!(list[0].color, "grey");
    }

    #[test]
    fn test_totals_dto_names_grey_bucket() {
        let totals: ScoreTotals = RegionScoreMap::new().totals().into();
        assert_eq!(totals.grey, 14);
        let json = serde_json::to_value(totals).unwrap();
        assert_eq!(json["grey"], 14);
    }

    #[test]
    fn test_event_from_updates() {
        let frame = FrameSample::new(RgbImage::from_pixel(8, 6, Rgb([1, 2, 3])), "clip.avi", 0);
        let event = SessionEvent::from(SessionUpdate::PreviewReady { job_id: 1, frame });
        assert_eq!(event.kind, SessionEventKind::PreviewReady);
        let preview = event.preview.unwrap();
        assert_eq!((preview.width, preview.height), (8, 6));
        assert!(!preview.jpeg_data.is_empty());

        let event = SessionEvent::from(SessionUpdate::Scored {
            job_id: 2,
            region: Some(RegionKey::RightLateralApical),
            score: VideoScore { class_index: 2, frames_used: 16 },
        });
        assert_eq!(event.region.as_deref(), Some("right-lateral-apical"));
        assert_eq!(event.severity, Some(2));

        let event = SessionEvent::from(SessionUpdate::Cropped {
            job_id: 3,
            output: PathBuf::from("/v/clip_cropped.avi"),
            region: crate::core::video::SourceCropRegion::new(0, 0, 224, 224),
            classification_job: Some(4),
        });
        assert_eq!(event.output_path.as_deref(), Some("/v/clip_cropped.avi"));
        assert_eq!(event.follow_up_job, Some(4));
    }

    #[test]
    fn test_directory_event_lists_measured_regions_and_failures() {
        let mut scores = DirectoryScores::default();
        scores.regions.set(RegionKey::LeftLateralApical, Severity::Severe);
        scores.failures.push(ScoringError::media_unavailable("bad.avi", "corrupt"));

        let event = SessionEvent::from(SessionUpdate::DirectoryScored { job_id: 5, scores });
        assert_eq!(event.region_scores.len(), 1);
        assert_eq!(event.region_scores[0].color, "red");
        assert_eq!(event.errors.len(), 1);
        assert_eq!(event.errors[0].error_type, "MediaUnavailable");
    }
}
