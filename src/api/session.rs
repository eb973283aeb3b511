//! 肺部超声评分会话

use crate::api::models::{ExportedReport, RegionScore, ScoreTotals, ScoringApiError, SessionEvent};
use crate::core::config::ScoringConfig;
use crate::core::region::RegionKey;
use crate::core::report::{PatientDetails, PdfRenderer};
use crate::core::session::{EventSource, SessionController};
use crate::core::video::CropSelection;
use flutter_rust_bridge::frb;
use log::info;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// 评分会话 - 预览、裁剪、分类、报告
///
/// ```dart
/// final session = ScoringSession.create(configPath: "/path/to/config.json5");
/// session.selectRegion(region: "left-anterior-apical");
/// final job = session.preview(videoPath: path);
/// final event = session.waitEvent(timeoutMs: 5000);
/// ```
#[frb(opaque)]
pub struct ScoringSession {
    controller: Mutex<SessionController>,
    events: EventSource,
}

impl ScoringSession {
    /// 创建会话；不传配置文件时使用默认配置
    #[frb(sync)]
    pub fn create(config_path: Option<String>) -> Result<Self, ScoringApiError> {
        crate::init_logging();
        let config = match config_path {
            Some(path) => {
                info!("🔧 Loading config from: {}", path);
                ScoringConfig::load(&path)?
            }
            None => ScoringConfig::default(),
        };
        let controller = SessionController::from_config(config)?;
        info!("🫁 ScoringSession: created");
        Ok(Self {
            events: controller.events(),
            controller: Mutex::new(controller),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionController>, ScoringApiError> {
        self.controller.lock().map_err(ScoringApiError::lock_poisoned)
    }

    #[frb(sync)]
    pub fn select_region(&self, region: String) -> Result<(), ScoringApiError> {
        let key: RegionKey = region.parse()?;
        Ok(self.lock()?.select_region(key)?)
    }

    #[frb(sync)]
    pub fn selected_region(&self) -> Result<Option<String>, ScoringApiError> {
        Ok(self.lock()?.selected_region().map(|r| r.as_str().to_string()))
    }

    /// 抽取第一帧作为预览，返回任务 id
    #[frb(sync)]
    pub fn preview(&self, video_path: String) -> Result<u64, ScoringApiError> {
        Ok(self.lock()?.request_preview(video_path)?)
    }

    /// 框选坐标为预览控件坐标
    #[frb(sync)]
    pub fn crop(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        widget_width: u32,
        widget_height: u32,
    ) -> Result<u64, ScoringApiError> {
        let selection = CropSelection::new(x, y, width, height);
        Ok(self.lock()?.request_crop(selection, (widget_width, widget_height))?)
    }

    #[frb(sync)]
    pub fn classify(&self, video_path: String) -> Result<u64, ScoringApiError> {
        Ok(self.lock()?.request_classification(video_path)?)
    }

    #[frb(sync)]
    pub fn classify_directory(&self, dir: String) -> Result<u64, ScoringApiError> {
        Ok(self.lock()?.request_directory_classification(dir)?)
    }

    /// 取出所有已完成的事件，不阻塞
    #[frb(sync)]
    pub fn poll_events(&self) -> Result<Vec<SessionEvent>, ScoringApiError> {
        Ok(self.lock()?.poll_events().into_iter().map(SessionEvent::from).collect())
    }

    /// 等待下一个事件，超时返回 None；等待期间不占用会话
    pub fn wait_event(&self, timeout_ms: u64) -> Result<Option<SessionEvent>, ScoringApiError> {
        let Some(event) = self.events.next_timeout(Duration::from_millis(timeout_ms)) else {
            return Ok(None);
        };
        let update = self.lock()?.apply_event(event);
        Ok(Some(SessionEvent::from(update)))
    }

    #[frb(sync, getter)]
    pub fn in_flight(&self) -> Result<Option<u64>, ScoringApiError> {
        Ok(self.lock()?.in_flight())
    }

    #[frb(sync)]
    pub fn scores(&self) -> Result<Vec<RegionScore>, ScoringApiError> {
        Ok(RegionScore::list(self.lock()?.scores()))
    }

    /// `{"left-anterior-apical": 0, ...}`
    #[frb(sync)]
    pub fn scores_json(&self) -> Result<String, ScoringApiError> {
        let snapshot = self.lock()?.scores().snapshot();
        serde_json::to_string(&snapshot).map_err(|e| ScoringApiError {
            error_type: "Serialization".to_string(),
            message: e.to_string(),
        })
    }

    #[frb(sync)]
    pub fn totals(&self) -> Result<ScoreTotals, ScoringApiError> {
        Ok(self.lock()?.totals().into())
    }

    /// 当前报告 HTML 快照
    #[frb(sync)]
    pub fn document(&self) -> Result<String, ScoringApiError> {
        Ok(self.lock()?.document().to_string())
    }

    #[frb(sync)]
    pub fn reset(&self) -> Result<(), ScoringApiError> {
        Ok(self.lock()?.reset()?)
    }

    /// 写出 report.html，`with_pdf` 时再用 wkhtmltopdf 生成 report.pdf
    pub fn export_report(
        &self,
        details: PatientDetails,
        output_dir: String,
        with_pdf: bool,
    ) -> Result<ExportedReport, ScoringApiError> {
        let controller = self.lock()?;
        let renderer = controller.pdf_renderer();
        let pdf = if with_pdf {
            Some(&renderer as &dyn PdfRenderer)
        } else {
            None
        };
        let export = controller.finalize_report(&details, Path::new(&output_dir), pdf)?;
        info!("📤 Report exported to {}", output_dir);
        Ok(export.into())
    }
}

impl Drop for ScoringSession {
    fn drop(&mut self) {
        info!("🗑️ ScoringSession: released");
    }
}

/// 所有分区 id，按报告顺序
#[frb(sync)]
pub fn region_keys() -> Vec<String> {
    RegionKey::ALL.iter().map(|r| r.as_str().to_string()).collect()
}
