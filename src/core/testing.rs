//! 测试辅助：假解码器、假转码器、报告模板样例

use image::{Rgb, RgbImage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::classify::{Classifier, ModelError};
use crate::core::error::ScoringError;
use crate::core::region::RegionKey;
use crate::core::video::{FrameDecoder, SourceCropRegion, Transcoder};

type PredictFn = Box<dyn Fn(&RgbImage) -> Result<Vec<f32>, ModelError> + Send + Sync>;

/// 由闭包决定输出的分类器，记录调用次数
pub struct MockClassifier {
    input: (u32, u32),
    outputs: usize,
    pattern: PredictFn,
    calls: AtomicUsize,
}

impl MockClassifier {
    pub fn with_pattern<F>(input: (u32, u32), outputs: usize, pattern: F) -> Self
    where
        F: Fn(&RgbImage) -> Result<Vec<f32>, ModelError> + Send + Sync + 'static,
    {
        Self {
            input,
            outputs,
            pattern: Box::new(pattern),
            calls: AtomicUsize::new(0),
        }
    }

    /// 每一帧都输出同一个 one-hot 向量；下标越界时输出全零
    pub fn fixed(class_index: usize, outputs: usize) -> Self {
        Self::with_pattern((32, 32), outputs, move |_| {
            let mut v = vec![0.0; outputs];
            if let Some(slot) = v.get_mut(class_index) {
                *slot = 1.0;
            }
            Ok(v)
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for MockClassifier {
    fn input_size(&self) -> (u32, u32) {
        self.input
    }

    fn output_len(&self) -> usize {
        self.outputs
    }

    fn predict(&self, input: &RgbImage) -> Result<Vec<f32>, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.pattern)(input)
    }
}

/// 按文件名片段决定行为的解码器，帧直接画成纯色 PNG
pub struct MockDecoder {
    frames: usize,
    size: (u32, u32),
    color: [u8; 3],
    frame_overrides: Vec<(String, usize)>,
    color_overrides: Vec<(String, [u8; 3])>,
    failing: Vec<String>,
}

impl MockDecoder {
    pub fn with_frames(frames: usize) -> Self {
        Self {
            frames,
            size: (64, 48),
            color: [0, 0, 0],
            frame_overrides: Vec::new(),
            color_overrides: Vec::new(),
            failing: Vec::new(),
        }
    }

    pub fn sized(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }

    pub fn frames_for(mut self, name: &str, frames: usize) -> Self {
        self.frame_overrides.push((name.to_string(), frames));
        self
    }

    pub fn colored(mut self, name: &str, color: [u8; 3]) -> Self {
        self.color_overrides.push((name.to_string(), color));
        self
    }

    pub fn failing_for(mut self, name: &str) -> Self {
        self.failing.push(name.to_string());
        self
    }
}

impl FrameDecoder for MockDecoder {
    fn extract(&self, video: &Path, max_frames: usize, out_dir: &Path) -> Result<(), ScoringError> {
        let name = video.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

        if self.failing.iter().any(|f| name.contains(f.as_str())) {
            return Err(ScoringError::media_unavailable(video, "mock decoder refused"));
        }

        let frames = self
            .frame_overrides
            .iter()
            .find(|(f, _)| name.contains(f.as_str()))
            .map(|(_, n)| *n)
            .unwrap_or(self.frames);
        let color = self
            .color_overrides
            .iter()
            .find(|(f, _)| name.contains(f.as_str()))
            .map(|(_, c)| *c)
            .unwrap_or(self.color);

        for i in 0..frames.min(max_frames) {
            let img = RgbImage::from_pixel(self.size.0, self.size.1, Rgb(color));
            img.save(out_dir.join(format!("frame_{:04}.png", i + 1)))?;
        }
        Ok(())
    }
}

/// 直接复制输入文件当作裁剪结果
#[derive(Default)]
pub struct CopyTranscoder {
    failure: Option<String>,
}

impl CopyTranscoder {
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
        }
    }
}

impl Transcoder for CopyTranscoder {
    fn crop(&self, input: &Path, _region: &SourceCropRegion, output: &Path) -> Result<(), String> {
        if let Some(reason) = &self.failure {
            // 模拟写了一半就失败
            let _ = std::fs::write(output, b"partial");
            return Err(reason.clone());
        }
        std::fs::copy(input, output).map(|_| ()).map_err(|e| e.to_string())
    }
}

fn region_paths(skip: Option<RegionKey>) -> String {
    RegionKey::ALL
        .iter()
        .filter(|key| Some(**key) != skip)
        .map(|key| format!(r#"    <path id="{}" class="grey" d="M0 0h10v10z"/>"#, key))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_template(skip: Option<RegionKey>) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><style>.white{{fill:#fff}} .yellow{{fill:#ff0}} .orange{{fill:#f80}} .red{{fill:#f00}} .grey{{fill:#999}}</style></head>
<body>
  <h1>Lung ultrasound report</h1>
  <p>Patient: _name _surname (_id)</p>
  <p>Born: _dob, examined: _doe</p>
  <svg viewBox="0 0 100 100">
{}
  </svg>
  <table><tr><td>_n_white</td><td>_n_yellow</td><td>_n_orange</td><td>_n_red</td><td>_n_grey</td></tr></table>
  <p>Pathological areas: _pathological_areas</p>
  <!--EDITME<p>_notes</p>EDITME-->
</body>
</html>
"#,
        region_paths(skip)
    )
}

pub fn template_html() -> String {
    render_template(None)
}

pub fn template_html_without(region: RegionKey) -> String {
    render_template(Some(region))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_classifier_counts_calls() {
        let mock = MockClassifier::fixed(2, 4);
        let out = mock.predict(&RgbImage::new(32, 32)).unwrap();
        assert_eq!(out, vec![0.0, 0.0, 1.0, 0.0]);
        assert_eq!(mock.calls(), 1);
    }

    #[test]
    fn test_mock_classifier_out_of_range_class_is_all_zero() {
        let mock = MockClassifier::fixed(7, 4);
        assert_eq!(mock.predict(&RgbImage::new(32, 32)).unwrap(), vec![0.0; 4]);
    }
}
