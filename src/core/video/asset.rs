use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

use crate::core::error::ScoringError;
use crate::core::video::crop::SourceCropRegion;

/// 支持的视频扩展名（按文件名子串匹配）
pub const VIDEO_EXTENSIONS: [&str; 4] = [".avi", ".AVI", ".mov", ".MOV"];

pub fn is_video_file(path: &Path) -> bool {
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy(),
        None => return false,
    };
    VIDEO_EXTENSIONS.iter().any(|ext| name.contains(ext))
}

/// 目录下的视频文件，按文件名排序；非视频文件被忽略
pub fn list_videos(dir: &Path) -> Result<Vec<PathBuf>, ScoringError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ScoringError::media_unavailable(dir, e.to_string()))?;

    let mut videos = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScoringError::media_unavailable(dir, e.to_string()))?;
        let path = entry.path();
        if path.is_file() && is_video_file(&path) {
            videos.push(path);
        }
    }
    videos.sort();
    Ok(videos)
}

/// 视频资源；尺寸在第一次抽帧后才知道，之后不再变化
#[derive(Debug, Clone)]
pub struct VideoAsset {
    path: PathBuf,
    dimensions: OnceCell<(u32, u32)>,
}

impl VideoAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dimensions: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions.get().copied()
    }

    /// 记录尺寸；已经记录过则保持原值
    pub fn discover_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        *self.dimensions.get_or_init(|| (width, height))
    }

    pub fn ensure_readable(&self) -> Result<(), ScoringError> {
        std::fs::File::open(&self.path)
            .map(|_| ())
            .map_err(|e| ScoringError::media_unavailable(&self.path, e.to_string()))
    }
}

/// 裁剪后的新视频，替代原视频参与分类
#[derive(Debug, Clone)]
pub struct CroppedVideoAsset {
    pub asset: VideoAsset,
    pub source: PathBuf,
    pub region: SourceCropRegion,
}

impl CroppedVideoAsset {
    pub fn path(&self) -> &Path {
        self.asset.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_extension_match() {
        assert!(is_video_file(Path::new("/data/left-anterior-apical.avi")));
        assert!(is_video_file(Path::new("CLIP.MOV")));
        assert!(is_video_file(Path::new("clip.avi.bak")));
        assert!(!is_video_file(Path::new("notes.txt")));
        assert!(!is_video_file(Path::new("clip.mp4")));
    }

    #[test]
    fn test_list_videos_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.avi", "a.MOV", "readme.txt", "c.mov"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.avi")).unwrap();

        let names: Vec<String> = list_videos(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.MOV", "b.avi", "c.mov"]);
    }

    #[test]
    fn test_list_videos_missing_dir() {
        let err = list_videos(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, ScoringError::MediaUnavailable { .. }));
    }

    #[test]
    fn test_dimensions_discovered_once() {
        let asset = VideoAsset::new("clip.avi");
        assert_eq!(asset.dimensions(), None);
        assert_eq!(asset.discover_dimensions(640, 480), (640, 480));
        assert_eq!(asset.discover_dimensions(1, 1), (640, 480));
        assert_eq!(asset.file_name(), "clip.avi");
    }
}
