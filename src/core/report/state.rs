//! 会话报告状态机
//!
//! Fresh：模板原样，没有任何分区评分
//! InSession：工作副本存在，零个或多个分区已评分
//! reset() 丢弃工作副本，回到 Fresh

use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::core::error::ScoringError;
use crate::core::region::{RegionKey, RegionScoreMap, Severity, Totals};
use crate::core::report::template::{set_region_class, ReportTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPhase {
    Fresh,
    InSession,
}

/// 报告文档与分区评分一起维护，保证两者始终一致
pub struct SessionReportState {
    template: ReportTemplate,
    working_path: PathBuf,
    document: Option<String>,
    scores: RegionScoreMap,
}

impl SessionReportState {
    pub fn new(template: ReportTemplate, working_path: impl Into<PathBuf>) -> Self {
        Self {
            template,
            working_path: working_path.into(),
            document: None,
            scores: RegionScoreMap::new(),
        }
    }

    pub fn phase(&self) -> ReportPhase {
        match self.document {
            Some(_) => ReportPhase::InSession,
            None => ReportPhase::Fresh,
        }
    }

    /// 当前文档快照
    pub fn document(&self) -> &str {
        self.document.as_deref().unwrap_or_else(|| self.template.html())
    }

    pub fn template(&self) -> &ReportTemplate {
        &self.template
    }

    pub fn working_path(&self) -> &Path {
        &self.working_path
    }

    pub fn scores(&self) -> &RegionScoreMap {
        &self.scores
    }

    pub fn totals(&self) -> Totals {
        self.scores.totals()
    }

    /// 接受一个分区评分：改一个元素的颜色并写回工作副本。
    /// 任何一步失败，文档、评分和阶段都保持原样。
    pub fn apply_score(&mut self, region: RegionKey, severity: Severity) -> Result<&str, ScoringError> {
        let updated = set_region_class(self.document(), region, severity.color())?;
        persist(&self.working_path, &updated)?;

        if self.document.is_none() {
            info!("📝 Report session started, working copy at {:?}", self.working_path);
        }
        debug!("Region {} -> {}", region, severity.color());

        self.scores.set(region, severity);
        Ok(self.document.insert(updated).as_str())
    }

    pub fn reset(&mut self) -> Result<(), ScoringError> {
        if self.working_path.exists() {
            std::fs::remove_file(&self.working_path)?;
        }
        self.document = None;
        self.scores.reset();
        info!("🔄 Report reset to template");
        Ok(())
    }
}

/// 先写临时文件再 rename，避免留下写了一半的工作副本
fn persist(path: &Path, html: &str) -> Result<(), ScoringError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, html)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{template_html, template_html_without};

    fn state_in(dir: &Path, html: String) -> SessionReportState {
        let template = ReportTemplate::from_html(html, dir.join("report.html")).unwrap();
        SessionReportState::new(template, dir.join("session").join("working.html"))
    }

    #[test]
    fn test_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path(), template_html());
        assert_eq!(state.phase(), ReportPhase::Fresh);
        assert_eq!(state.document(), template_html());
        assert_eq!(state.totals().not_measured, 14);
        assert!(!state.working_path().exists());
    }

    #[test]
    fn test_first_score_enters_session_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path(), template_html());

        let snapshot = state
            .apply_score(RegionKey::LeftAnteriorBasal, Severity::Moderate)
            .unwrap()
            .to_string();

        assert_eq!(state.phase(), ReportPhase::InSession);
        assert!(snapshot.contains(r#"id="left-anterior-basal" class="orange""#));
        assert_eq!(std::fs::read_to_string(state.working_path()).unwrap(), snapshot);
        assert_eq!(state.scores().get(RegionKey::LeftAnteriorBasal), Severity::Moderate);
        assert_eq!(state.totals().orange, 1);
        assert_eq!(state.totals().pathological, 1);
    }

    #[test]
    fn test_each_update_changes_exactly_one_class_token() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path(), template_html());

        let updates = [
            (RegionKey::LeftAnteriorApical, Severity::Severe),
            (RegionKey::RightPosteriorMedial, Severity::Healthy),
            (RegionKey::LeftAnteriorApical, Severity::Mild),
        ];
        for (region, severity) in updates {
            let before = state.document().to_string();
            let after = state.apply_score(region, severity).unwrap().to_string();

            let marker = format!(r#"id="{}" class=""#, region);
            let class_start = before.find(&marker).unwrap() + marker.len();
            let class_end = class_start + before[class_start..].find('"').unwrap();
            let expected = format!("{}{}{}", &before[..class_start], severity.color(), &before[class_end..]);
            assert_eq!(after, expected);
        }
    }

    #[test]
    fn test_document_agrees_with_scores() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path(), template_html());
        state.apply_score(RegionKey::LeftLateralApical, Severity::Healthy).unwrap();
        state.apply_score(RegionKey::RightAnteriorBasal, Severity::Severe).unwrap();

        for (region, severity) in state.scores().measured() {
            let expected = format!(r#"id="{}" class="{}""#, region, severity.color());
            assert!(state.document().contains(&expected), "{expected}");
        }
    }

    #[test]
    fn test_corrupt_template_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path(), template_html_without(RegionKey::LeftPosteriorBasal));
        state.apply_score(RegionKey::LeftAnteriorApical, Severity::Mild).unwrap();
        let before = state.document().to_string();

        let result = state.apply_score(RegionKey::LeftPosteriorBasal, Severity::Severe);
        assert!(matches!(result, Err(ScoringError::TemplateCorruption { .. })));
        assert_eq!(state.document(), before);
        assert_eq!(state.scores().get(RegionKey::LeftPosteriorBasal), Severity::NotMeasured);
        assert_eq!(std::fs::read_to_string(state.working_path()).unwrap(), before);
    }

    #[test]
    fn test_corrupt_first_update_stays_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path(), template_html_without(RegionKey::LeftPosteriorBasal));
        assert!(state.apply_score(RegionKey::LeftPosteriorBasal, Severity::Mild).is_err());
        assert_eq!(state.phase(), ReportPhase::Fresh);
        assert!(!state.working_path().exists());
    }

    #[test]
    fn test_reset_restores_template_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path(), template_html());
        for region in RegionKey::ALL {
            state.apply_score(region, Severity::Severe).unwrap();
        }
        assert_eq!(state.totals().red, 14);

        state.reset().unwrap();
        assert_eq!(state.phase(), ReportPhase::Fresh);
        assert_eq!(state.document().as_bytes(), template_html().as_bytes());
        assert_eq!(state.totals().not_measured, 14);
        assert!(!state.working_path().exists());
    }
}
