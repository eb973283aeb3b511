//! 分类引擎
//!
//! 每个视频：累加向量置零 -> 每帧缩放到模型输入尺寸并推理 -> 累加 -> argmax。
//! 目录模式下逐个视频评分，单个视频失败不影响其它视频。

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::core::classify::model::{Classifier, ModelError};
use crate::core::error::ScoringError;
use crate::core::region::{RegionKey, RegionScoreMap, Severity, Totals};
use crate::core::video::{FrameSample, FrameSampler, VideoAsset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoScore {
    pub class_index: usize,
    pub frames_used: usize,
}

impl VideoScore {
    pub fn severity(&self) -> Severity {
        Severity::from_class_index(self.class_index)
    }
}

/// 最大值下标；并列时取第一个，全零（或空）时为 0
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// 从文件名推断分区：`left-anterior-apical.avi`、`Left_Anterior_Apical_cropped.mov` 都可以
pub fn region_for_video(path: &Path) -> Option<RegionKey> {
    let mut stem = path.file_stem()?.to_string_lossy().into_owned();
    loop {
        if let Ok(key) = stem.parse::<RegionKey>() {
            return Some(key);
        }
        let cut = stem.rfind(|c: char| c == '_' || c == '-')?;
        stem.truncate(cut);
    }
}

#[derive(Debug, Default)]
pub struct DirectoryScores {
    /// 文件名 -> 评分
    pub per_video: BTreeMap<String, VideoScore>,
    pub regions: RegionScoreMap,
    pub failures: Vec<ScoringError>,
}

impl DirectoryScores {
    pub fn totals(&self) -> Totals {
        self.regions.totals()
    }
}

#[derive(Debug)]
pub enum ScoreOutcome {
    Video(VideoScore),
    Directory(DirectoryScores),
}

pub struct ClassificationEngine {
    model: Arc<dyn Classifier>,
    sampler: FrameSampler,
}

impl ClassificationEngine {
    pub fn new(model: Arc<dyn Classifier>, sampler: FrameSampler) -> Self {
        Self { model, sampler }
    }

    pub fn sampler(&self) -> &FrameSampler {
        &self.sampler
    }

    /// 路径是目录则按目录评分，否则按单个视频评分
    pub fn score(&self, path: &Path) -> Result<ScoreOutcome, ScoringError> {
        if path.is_dir() {
            self.score_directory(path).map(ScoreOutcome::Directory)
        } else {
            self.score_video(&VideoAsset::new(path)).map(ScoreOutcome::Video)
        }
    }

    pub fn score_video(&self, asset: &VideoAsset) -> Result<VideoScore, ScoringError> {
        let frames = self.sampler.sample(asset)?;
        self.score_frames(asset.path(), frames)
    }

    pub fn score_frames<I>(&self, video: &Path, frames: I) -> Result<VideoScore, ScoringError>
    where
        I: IntoIterator<Item = Result<FrameSample, ScoringError>>,
    {
        let (input_w, input_h) = self.model.input_size();
        let expected = self.model.output_len();
        let mut accumulator = vec![0f32; expected];
        let mut frames_used = 0;

        for frame in frames {
            let frame = frame?;
            let input = frame.resize_to(input_w, input_h);
            let output = self
                .model
                .predict(&input)
                .and_then(|v| {
                    if v.len() == expected {
                        Ok(v)
                    } else {
                        Err(ModelError::Shape {
                            expected,
                            actual: v.len(),
                        })
                    }
                })
                .map_err(|e| ScoringError::ClassificationFailure {
                    video: video.to_path_buf(),
                    reason: format!("frame {}: {}", frame.index, e),
                })?;

            for (acc, v) in accumulator.iter_mut().zip(&output) {
                *acc += v;
            }
            frames_used += 1;
            debug!("Analyzed frame {} of {} for {:?}", frames_used, self.sampler.max_frames(), video);
        }

        if frames_used == 0 {
            warn!("⚠️ No frames decoded from {:?}, defaulting to class 0", video);
        }

        let score = VideoScore {
            class_index: argmax(&accumulator),
            frames_used,
        };
        info!("🎯 {:?}: class {} from {} frame(s)", video, score.class_index, frames_used);
        Ok(score)
    }

    pub fn score_directory(&self, dir: &Path) -> Result<DirectoryScores, ScoringError> {
        let mut result = DirectoryScores::default();

        for (asset, stream) in self.sampler.sample_directory(dir)? {
            let scored = stream.and_then(|frames| self.score_frames(asset.path(), frames));
            match scored {
                Ok(score) => {
                    if let Some(region) = region_for_video(asset.path()) {
                        if result.regions.get(region) != Severity::NotMeasured {
                            warn!("Region {} scored by more than one video, keeping {}", region, asset.file_name());
                        }
                        result.regions.set(region, score.severity());
                    }
                    result.per_video.insert(asset.file_name(), score);
                }
                Err(e) => {
                    warn!("❌ Skipping {}: {}", asset.file_name(), e);
                    result.failures.push(e);
                }
            }
        }

        info!(
            "📊 Directory {:?}: {} scored, {} failed",
            dir,
            result.per_video.len(),
            result.failures.len()
        );
        Ok(result)
    }
}
