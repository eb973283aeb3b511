//! 报告定稿与导出
//!
//! 占位符（`_name`、`_n_white` 等）一次性逐字替换，
//! 随后去掉 `<!--EDITME` / `EDITME-->` 注释标记。PDF 由外部工具生成。

use log::{error, info};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::core::error::ScoringError;
use crate::core::region::{RegionKey, RegionScoreMap};

const FIELD_PLACEHOLDERS: [&str; 13] = [
    "_name",
    "_surname",
    "_id",
    "_dob",
    "_doe",
    "_date",
    "_notes",
    "_pathological_areas",
    "_n_white",
    "_n_yellow",
    "_n_orange",
    "_n_red",
    "_n_grey",
];

/// 所有占位符，长的优先，避免 `_n_red` 之类被更短的前缀抢先匹配
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    let mut tokens: Vec<String> = FIELD_PLACEHOLDERS.iter().map(|t| t.to_string()).collect();
    tokens.extend(RegionKey::ALL.iter().map(|key| format!("_{}", key.as_str())));
    tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = tokens.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    Regex::new(&alternation).expect("valid placeholder regex")
});

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientDetails {
    pub name: String,
    pub surname: String,
    pub id: String,
    pub date_of_birth: String,
    pub date_of_examination: String,
    pub notes: String,
}

/// 生成最终 HTML：占位符单次替换（替换进去的内容不会再被替换），再去掉 EDITME 标记
pub fn finalize_report(document: &str, details: &PatientDetails, scores: &RegionScoreMap) -> String {
    let totals = scores.totals();
    let mut values: HashMap<String, String> = HashMap::new();
    values.insert("_name".into(), details.name.clone());
    values.insert("_surname".into(), details.surname.clone());
    values.insert("_id".into(), details.id.clone());
    values.insert("_dob".into(), details.date_of_birth.clone());
    values.insert("_doe".into(), details.date_of_examination.clone());
    values.insert("_date".into(), details.date_of_examination.clone());
    values.insert("_notes".into(), details.notes.clone());
    values.insert("_pathological_areas".into(), totals.pathological.to_string());
    values.insert("_n_white".into(), totals.white.to_string());
    values.insert("_n_yellow".into(), totals.yellow.to_string());
    values.insert("_n_orange".into(), totals.orange.to_string());
    values.insert("_n_red".into(), totals.red.to_string());
    values.insert("_n_grey".into(), totals.not_measured.to_string());
    for (region, severity) in scores.iter() {
        values.insert(format!("_{}", region.as_str()), severity.color().to_string());
    }

    let substituted = PLACEHOLDER.replace_all(document, |caps: &Captures| {
        values.get(&caps[0]).cloned().unwrap_or_else(|| caps[0].to_string())
    });

    substituted.replace("<!--EDITME", "").replace("EDITME-->", "")
}

pub trait PdfRenderer: Send + Sync {
    fn render(&self, html: &str, output: &Path) -> Result<(), ScoringError>;
}

/// 通过 stdin 把 HTML 交给 wkhtmltopdf
pub struct WkhtmltopdfRenderer {
    binary: String,
}

impl WkhtmltopdfRenderer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl PdfRenderer for WkhtmltopdfRenderer {
    fn render(&self, html: &str, output: &Path) -> Result<(), ScoringError> {
        let mut child = Command::new(&self.binary)
            .arg("--quiet")
            .arg("-")
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ScoringError::PdfRenderFailure(format!("无法启动 {}: {}", self.binary, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(html.as_bytes())
                .map_err(|e| ScoringError::PdfRenderFailure(format!("写入 HTML 失败: {}", e)))?;
        }

        let result = child
            .wait_with_output()
            .map_err(|e| ScoringError::PdfRenderFailure(e.to_string()))?;
        if !result.status.success() {
            return Err(ScoringError::PdfRenderFailure(format!(
                "{} exited with {}: {}",
                self.binary,
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportExport {
    pub html_path: PathBuf,
    pub pdf_path: Option<PathBuf>,
}

/// HTML 一定写出；PDF 失败时返回错误，已写出的 HTML 保留
pub fn export_report(
    html: &str,
    output_dir: &Path,
    html_name: &str,
    pdf: Option<(&dyn PdfRenderer, &str)>,
) -> Result<ReportExport, ScoringError> {
    std::fs::create_dir_all(output_dir)?;

    let html_path = output_dir.join(html_name);
    std::fs::write(&html_path, html)?;
    info!("💾 Report HTML written: {:?}", html_path);

    let pdf_path = match pdf {
        Some((renderer, pdf_name)) => {
            let path = output_dir.join(pdf_name);
            if let Err(e) = renderer.render(html, &path) {
                error!("❌ PDF export failed: {}", e);
                return Err(e);
            }
            info!("💾 Report PDF written: {:?}", path);
            Some(path)
        }
        None => None,
    };

    Ok(ReportExport { html_path, pdf_path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::region::Severity;

    struct RecordingRenderer;

    impl PdfRenderer for RecordingRenderer {
        fn render(&self, html: &str, output: &Path) -> Result<(), ScoringError> {
            std::fs::write(output, format!("%PDF {}", html.len()))?;
            Ok(())
        }
    }

    fn details() -> PatientDetails {
        PatientDetails {
            name: "Maria".into(),
            surname: "Rossi".into(),
            id: "P-042".into(),
            date_of_birth: "1 Jan 1960".into(),
            date_of_examination: "18 Oct 2026".into(),
            notes: "B-lines in _name region".into(),
        }
    }

    #[test]
    fn test_placeholders_replaced_once() {
        let mut scores = RegionScoreMap::new();
        scores.set(RegionKey::LeftAnteriorApical, Severity::Severe);
        scores.set(RegionKey::LeftAnteriorBasal, Severity::Mild);
        scores.set(RegionKey::RightLateralBasal, Severity::Healthy);

        let doc = "<p>_name _surname (_id) _dob / _doe</p><p>_notes</p>\
                   <p>_pathological_areas: _n_white _n_yellow _n_orange _n_red _n_grey</p>";
        let html = finalize_report(doc, &details(), &scores);

        assert_eq!(
            html,
            "<p>Maria Rossi (P-042) 1 Jan 1960 / 18 Oct 2026</p><p>B-lines in _name region</p>\
             <p>2: 1 1 0 1 11</p>"
        );
    }

    #[test]
    fn test_region_placeholders_become_colors() {
        let mut scores = RegionScoreMap::new();
        scores.set(RegionKey::RightPosteriorMedial, Severity::Moderate);
        let doc = r#"<path class="_right-posterior-medial"/><path class="_left-lateral-apical"/>"#;
        let html = finalize_report(doc, &PatientDetails::default(), &scores);
        assert_eq!(html, r#"<path class="orange"/><path class="grey"/>"#);
    }

    #[test]
    fn test_editme_markers_stripped() {
        let doc = "<div><!--EDITME<textarea>_notes</textarea>EDITME--></div>";
        let html = finalize_report(doc, &details(), &RegionScoreMap::new());
        assert_eq!(html, "<div><textarea>B-lines in _name region</textarea></div>");
    }

    #[test]
    fn test_export_writes_html_and_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let export = export_report("<html></html>", &out, "report.html", Some((&RecordingRenderer, "report.pdf"))).unwrap();

        assert_eq!(std::fs::read_to_string(&export.html_path).unwrap(), "<html></html>");
        assert_eq!(std::fs::read_to_string(export.pdf_path.unwrap()).unwrap(), "%PDF 13");
    }

    #[test]
    fn test_export_html_only() {
        let dir = tempfile::tempdir().unwrap();
        let export = export_report("<html></html>", dir.path(), "r.html", None).unwrap();
        assert!(export.pdf_path.is_none());
        assert!(dir.path().join("r.html").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_wkhtmltopdf_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let missing = WkhtmltopdfRenderer::new("/no/such/wkhtmltopdf");
        assert!(matches!(
            missing.render("<html></html>", &dir.path().join("r.pdf")),
            Err(ScoringError::PdfRenderFailure(_))
        ));
    }
}
