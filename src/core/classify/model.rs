//! 分类模型接口
//!
//! 引擎只依赖 `predict(buffer) -> vector` 这一个能力，任何实现都可以替换进来。

use image::RgbImage;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model load failed: {0}")]
    Load(String),
    #[error("Output length mismatch: expected {expected}, got {actual}")]
    Shape { expected: usize, actual: usize },
    #[error("Inference failed: {0}")]
    Inference(String),
}

pub trait Classifier: Send + Sync {
    /// 模型输入尺寸 (width, height)，输入为 H x W x 3
    fn input_size(&self) -> (u32, u32);

    /// 输出向量长度
    fn output_len(&self) -> usize;

    fn predict(&self, input: &RgbImage) -> Result<Vec<f32>, ModelError>;
}

/// 线性模型：把图像切成 grid x grid 个格子，每格取 RGB 均值作为特征，
/// 再做一次线性变换 + softmax。权重来自预训练好的 JSON 文件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub input_width: u32,
    pub input_height: u32,
    pub grid: u32,
    #[serde(default)]
    pub labels: Vec<String>,
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl LinearModel {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        info!("🔧 Loading classifier weights from: {:?}", path);
        let text = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Load(format!("{:?}: {}", path, e)))?;
        let model = Self::from_json(&text)?;
        info!(
            "✅ Classifier loaded: {}x{} input, {} classes",
            model.input_width,
            model.input_height,
            model.weights.len()
        );
        Ok(model)
    }

    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        let model: LinearModel =
            serde_json::from_str(text).map_err(|e| ModelError::Load(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    fn feature_len(&self) -> usize {
        (self.grid * self.grid * 3) as usize
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(ModelError::Load("input size must be non-zero".into()));
        }
        if self.grid == 0 || self.grid > self.input_width.min(self.input_height) {
            return Err(ModelError::Load(format!("invalid grid {}", self.grid)));
        }
        if self.weights.is_empty() {
            return Err(ModelError::Load("model has no classes".into()));
        }
        if self.bias.len() != self.weights.len() {
            return Err(ModelError::Load(format!(
                "bias has {} entries for {} classes",
                self.bias.len(),
                self.weights.len()
            )));
        }
        if !self.labels.is_empty() && self.labels.len() != self.weights.len() {
            return Err(ModelError::Load(format!(
                "{} labels for {} classes",
                self.labels.len(),
                self.weights.len()
            )));
        }
        let expected = self.feature_len();
        if let Some(row) = self.weights.iter().find(|row| row.len() != expected) {
            return Err(ModelError::Load(format!(
                "weight row has {} entries, expected {}",
                row.len(),
                expected
            )));
        }
        Ok(())
    }

    fn features(&self, input: &RgbImage) -> Vec<f32> {
        let (w, h) = input.dimensions();
        let grid = self.grid;
        let mut features = Vec::with_capacity(self.feature_len());

        for gy in 0..grid {
            let y0 = gy * h / grid;
            let y1 = ((gy + 1) * h / grid).max(y0 + 1);
            for gx in 0..grid {
                let x0 = gx * w / grid;
                let x1 = ((gx + 1) * w / grid).max(x0 + 1);

                let mut sum = [0f32; 3];
                for y in y0..y1 {
                    for x in x0..x1 {
                        let p = input.get_pixel(x, y);
                        sum[0] += p[0] as f32;
                        sum[1] += p[1] as f32;
                        sum[2] += p[2] as f32;
                    }
                }
                let count = ((x1 - x0) * (y1 - y0)) as f32 * 255.0;
                features.extend(sum.iter().map(|s| s / count));
            }
        }
        features
    }

    pub fn label(&self, class_index: usize) -> Option<&str> {
        self.labels.get(class_index).map(String::as_str)
    }
}

impl Classifier for LinearModel {
    fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    fn output_len(&self) -> usize {
        self.weights.len()
    }

    fn predict(&self, input: &RgbImage) -> Result<Vec<f32>, ModelError> {
        if input.dimensions() != self.input_size() {
            return Err(ModelError::Inference(format!(
                "input is {}x{}, expected {}x{}",
                input.width(),
                input.height(),
                self.input_width,
                self.input_height
            )));
        }

        let features = self.features(input);
        let logits: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(&features).map(|(w, f)| w * f).sum::<f32>() + b)
            .collect();
        Ok(softmax(&logits))
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|v| v / sum).collect()
}
