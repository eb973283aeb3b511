//! 抽帧器
//!
//! 解码交给外部工具（默认 ffmpeg），帧图片写入会话持有的临时目录，
//! 之后按需逐帧读取。每次抽帧前先清空临时目录。

use log::{debug, info, warn};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::core::error::ScoringError;
use crate::core::video::asset::{list_videos, VideoAsset};
use crate::core::video::frame::FrameSample;

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub trait FrameDecoder: Send + Sync {
    /// 把视频的前 `max_frames` 帧以图片形式写入 `out_dir`，文件名按帧序排序。
    /// 视频能打开但没有可解码帧时返回 Ok 且不写任何文件。
    fn extract(&self, video: &Path, max_frames: usize, out_dir: &Path) -> Result<(), ScoringError>;
}

pub struct FfmpegDecoder {
    ffmpeg_path: String,
}

impl FfmpegDecoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn build_args(video: &Path, max_frames: usize, out_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(video.as_os_str().to_owned());
        args.push("-frames:v".into());
        args.push(max_frames.to_string().into());
        args.push(out_dir.join("frame_%04d.png").into_os_string());
        args
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn extract(&self, video: &Path, max_frames: usize, out_dir: &Path) -> Result<(), ScoringError> {
        let output = Command::new(&self.ffmpeg_path)
            .args(Self::build_args(video, max_frames, out_dir))
            .output()
            .map_err(|e| {
                ScoringError::media_unavailable(video, format!("无法启动 {}: {}", self.ffmpeg_path, e))
            })?;

        if !output.status.success() {
            return Err(ScoringError::media_unavailable(
                video,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}

/// 抽帧临时目录
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// 清空并重建目录，返回帧输出目录
    pub fn prepare(&self) -> Result<PathBuf, ScoringError> {
        let frames = self.root.join("frames");
        if frames.exists() {
            std::fs::remove_dir_all(&frames)?;
        }
        std::fs::create_dir_all(&frames)?;
        Ok(frames)
    }

    pub fn clear(&self) -> Result<(), ScoringError> {
        let frames = self.root.join("frames");
        if frames.exists() {
            std::fs::remove_dir_all(&frames)?;
        }
        Ok(())
    }
}

/// 一个视频的帧序列：有限、只能遍历一次，读取到哪一帧才加载哪一帧
pub struct FrameStream {
    source: PathBuf,
    files: std::vec::IntoIter<PathBuf>,
    next_index: usize,
}

impl FrameStream {
    fn new(source: PathBuf, files: Vec<PathBuf>) -> Self {
        Self {
            source,
            files: files.into_iter(),
            next_index: 0,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn remaining(&self) -> usize {
        self.files.len()
    }
}

impl Iterator for FrameStream {
    type Item = Result<FrameSample, ScoringError>;

    fn next(&mut self) -> Option<Self::Item> {
        let file = self.files.next()?;
        let index = self.next_index;
        self.next_index += 1;

        let loaded = image::open(&file)
            .map(|img| FrameSample::new(img.to_rgb8(), self.source.clone(), index))
            .map_err(|e| {
                ScoringError::media_unavailable(&self.source, format!("帧 {} 读取失败: {}", index, e))
            });
        Some(loaded)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.files.size_hint()
    }
}

pub struct FrameSampler {
    decoder: Arc<dyn FrameDecoder>,
    work_dir: WorkDir,
    max_frames: usize,
}

impl FrameSampler {
    pub fn new(decoder: Arc<dyn FrameDecoder>, work_dir: WorkDir, max_frames: usize) -> Self {
        Self {
            decoder,
            work_dir,
            max_frames: max_frames.max(1),
        }
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// 单个视频最多 `max_frames` 帧
    pub fn sample(&self, asset: &VideoAsset) -> Result<FrameStream, ScoringError> {
        self.extract(asset, self.max_frames)
    }

    /// 预览：只取第一帧，同时记录视频尺寸
    pub fn preview(&self, asset: &VideoAsset) -> Result<FrameSample, ScoringError> {
        let mut stream = self.extract(asset, 1)?;
        let frame = stream
            .next()
            .ok_or_else(|| ScoringError::media_unavailable(asset.path(), "没有可解码的帧"))??;
        asset.discover_dimensions(frame.width, frame.height);
        info!(
            "🖼️ Preview frame for {}: {}x{}",
            asset.file_name(),
            frame.width,
            frame.height
        );
        Ok(frame)
    }

    /// 目录模式：按文件名顺序逐个视频抽帧。
    /// 下一个视频会清空临时目录，所以必须先消费完上一个视频的帧序列。
    pub fn sample_directory(&self, dir: &Path) -> Result<DirectorySamples<'_>, ScoringError> {
        let videos = list_videos(dir)?;
        info!("📂 {} video(s) found in {:?}", videos.len(), dir);
        Ok(DirectorySamples {
            sampler: self,
            videos: videos.into_iter(),
        })
    }

    fn extract(&self, asset: &VideoAsset, max_frames: usize) -> Result<FrameStream, ScoringError> {
        if !asset.path().is_file() {
            return Err(ScoringError::media_unavailable(asset.path(), "文件不存在"));
        }
        asset.ensure_readable()?;

        let out_dir = self.work_dir.prepare()?;
        self.decoder.extract(asset.path(), max_frames, &out_dir)?;

        let mut files = collect_frame_files(&out_dir)?;
        if files.len() > max_frames {
            warn!(
                "Decoder wrote {} frames for {}, keeping the first {}",
                files.len(),
                asset.file_name(),
                max_frames
            );
            files.truncate(max_frames);
        }
        debug!("{} frame(s) extracted from {}", files.len(), asset.file_name());
        Ok(FrameStream::new(asset.path().to_path_buf(), files))
    }
}

pub struct DirectorySamples<'a> {
    sampler: &'a FrameSampler,
    videos: std::vec::IntoIter<PathBuf>,
}

impl Iterator for DirectorySamples<'_> {
    type Item = (VideoAsset, Result<FrameStream, ScoringError>);

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.videos.next()?;
        let asset = VideoAsset::new(path);
        let stream = self.sampler.sample(&asset);
        Some((asset, stream))
    }
}

fn collect_frame_files(dir: &Path) -> Result<Vec<PathBuf>, ScoringError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_ascii_lowercase();
                    FRAME_EXTENSIONS.contains(&ext.as_str())
                })
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}
