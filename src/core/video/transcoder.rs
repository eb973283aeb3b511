use log::{error, info};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::error::ScoringError;
use crate::core::video::asset::{CroppedVideoAsset, VideoAsset};
use crate::core::video::crop::SourceCropRegion;

pub trait Transcoder: Send + Sync {
    /// 把 `input` 的 `region` 区域转码写入 `output`，失败时返回可读的原因
    fn crop(&self, input: &Path, region: &SourceCropRegion, output: &Path) -> Result<(), String>;
}

pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    quality: u32,
    frame_limit: Option<u32>,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>, quality: u32, frame_limit: Option<u32>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            quality,
            frame_limit,
        }
    }

    pub fn build_args(&self, input: &Path, region: &SourceCropRegion, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into(), "-y".into(), "-i".into()];
        args.push(input.as_os_str().to_owned());
        args.push("-vf".into());
        args.push(region.filter_spec().into());
        if let Some(limit) = self.frame_limit {
            args.push("-frames:v".into());
            args.push(limit.to_string().into());
        }
        args.push("-q:v".into());
        args.push(self.quality.to_string().into());
        args.push(output.as_os_str().to_owned());
        args
    }
}

impl Transcoder for FfmpegTranscoder {
    fn crop(&self, input: &Path, region: &SourceCropRegion, output: &Path) -> Result<(), String> {
        let result = Command::new(&self.ffmpeg_path)
            .args(self.build_args(input, region, output))
            .output()
            .map_err(|e| format!("无法启动 {}: {}", self.ffmpeg_path, e))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(format!("{} exited with {}: {}", self.ffmpeg_path, result.status, stderr.trim()));
        }
        Ok(())
    }
}

/// `clip.avi` -> `clip_cropped.avi`
pub fn cropped_output_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    input.with_file_name(name)
}

/// 临时文件与最终文件同目录、同扩展名，保证 rename 是原子的且转码器能识别格式
fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!("{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!("{}.partial", stem),
    };
    output.with_file_name(name)
}

/// 一次裁剪任务，只能执行一次
pub struct CropJob {
    asset: VideoAsset,
    region: SourceCropRegion,
    output: PathBuf,
}

impl CropJob {
    pub fn new(asset: VideoAsset, region: SourceCropRegion, suffix: &str) -> Self {
        let output = cropped_output_path(asset.path(), suffix);
        Self { asset, region, output }
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// 成功后才出现最终文件名；失败时清理临时文件，源视频不受影响
    pub fn run(self, transcoder: &dyn Transcoder) -> Result<CroppedVideoAsset, ScoringError> {
        let input = self.asset.path().to_path_buf();
        let failure = |reason: String| ScoringError::CropTranscodeFailure {
            video: input.clone(),
            reason,
        };

        if !input.is_file() {
            return Err(failure("源视频不存在".to_string()));
        }

        let partial = partial_path(&self.output);
        info!(
            "✂️ Cropping {} with {} -> {:?}",
            self.asset.file_name(),
            self.region.filter_spec(),
            self.output
        );

        if let Err(reason) = transcoder.crop(&input, &self.region, &partial) {
            error!("❌ Crop failed for {:?}: {}", input, reason);
            let _ = std::fs::remove_file(&partial);
            return Err(failure(reason));
        }

        if !partial.is_file() {
            return Err(failure("转码器没有生成输出文件".to_string()));
        }

        if let Err(e) = std::fs::rename(&partial, &self.output) {
            let _ = std::fs::remove_file(&partial);
            return Err(failure(format!("无法写入 {:?}: {}", self.output, e)));
        }

        let asset = VideoAsset::new(&self.output);
        asset.discover_dimensions(self.region.width, self.region.height);
        info!("✅ Crop finished: {:?}", self.output);

        Ok(CroppedVideoAsset {
            asset,
            source: input,
            region: self.region,
        })
    }
}
