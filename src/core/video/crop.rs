//! 裁剪坐标换算
//!
//! 用户在预览控件上框选的矩形（控件坐标）换算到源视频像素坐标。
//! 控件尺寸和渲染出的图像尺寸可能不同（控件可以单独缩放），
//! 所以两个轴分别计算缩放比例。

use serde::{Deserialize, Serialize};

use crate::core::error::ScoringError;

/// 控件坐标系下的框选，允许负宽高（从右下往左上拖）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropSelection {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl CropSelection {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_drag(start: (i32, i32), end: (i32, i32)) -> Self {
        Self {
            x: start.0.min(end.0),
            y: start.1.min(end.1),
            width: saturating_i32(end.0.abs_diff(start.0)),
            height: saturating_i32(end.1.abs_diff(start.1)),
        }
    }

    /// 宽高取正，原点移到左上角；超出 i32 范围的部分饱和截断
    pub fn normalized(&self) -> Self {
        let (x, width) = if self.width < 0 {
            (self.x.saturating_add(self.width), self.width.saturating_neg())
        } else {
            (self.x, self.width)
        };
        let (y, height) = if self.height < 0 {
            (self.y.saturating_add(self.height), self.height.saturating_neg())
        } else {
            (self.y, self.height)
        };
        Self { x, y, width, height }
    }

    pub fn shorter_side(&self) -> i32 {
        self.width.min(self.height)
    }
}

/// 源视频像素坐标下的裁剪区域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SourceCropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// ffmpeg crop 滤镜参数
    pub fn filter_spec(&self) -> String {
        format!("crop={}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub widget_width: u32,
    pub widget_height: u32,
    pub source_width: u32,
    pub source_height: u32,
}

impl DisplayGeometry {
    pub fn new(widget: (u32, u32), source: (u32, u32)) -> Self {
        Self {
            widget_width: widget.0,
            widget_height: widget.1,
            source_width: source.0,
            source_height: source.1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper {
    geometry: DisplayGeometry,
    min_source_side: u32,
    scale_x: f64,
    scale_y: f64,
}

impl CoordinateMapper {
    pub fn new(geometry: DisplayGeometry, min_source_side: u32) -> Result<Self, ScoringError> {
        let g = &geometry;
        if g.widget_width == 0 || g.widget_height == 0 {
            return Err(ScoringError::InvalidGeometry(format!(
                "widget size {}x{}",
                g.widget_width, g.widget_height
            )));
        }
        if g.source_width == 0 || g.source_height == 0 {
            return Err(ScoringError::InvalidGeometry(format!(
                "source size {}x{}",
                g.source_width, g.source_height
            )));
        }

        Ok(Self {
            scale_x: g.source_width as f64 / g.widget_width as f64,
            scale_y: g.source_height as f64 / g.widget_height as f64,
            geometry,
            min_source_side: min_source_side.max(1),
        })
    }

    pub fn scale(&self) -> (f64, f64) {
        (self.scale_x, self.scale_y)
    }

    /// 控件坐标下的最小边长：缩放后两个轴都不小于 `min_source_side`
    pub fn min_display_side(&self) -> i32 {
        let scale = self.scale_x.min(self.scale_y);
        (self.min_source_side as f64 / scale).ceil() as i32
    }

    /// 四条边分别乘以对应轴的比例后截断取整，不做任何限制
    pub fn scale_selection(&self, selection: &CropSelection) -> SourceCropRegion {
        let sel = selection.normalized();
        let left = scale_edge(sel.x, self.scale_x);
        let top = scale_edge(sel.y, self.scale_y);
        let right = scale_edge(sel.x.saturating_add(sel.width), self.scale_x);
        let bottom = scale_edge(sel.y.saturating_add(sel.height), self.scale_y);

        SourceCropRegion {
            x: left,
            y: top,
            width: right.saturating_sub(left),
            height: bottom.saturating_sub(top),
        }
    }

    /// 短边不足最小值时，以原点为锚点改成最小边长的正方形
    pub fn clamp_selection(&self, selection: &CropSelection) -> CropSelection {
        let sel = selection.normalized();
        let x = sel.x.clamp(0, saturating_i32(self.geometry.widget_width).saturating_sub(1));
        let y = sel.y.clamp(0, saturating_i32(self.geometry.widget_height).saturating_sub(1));
        let min_side = self.min_display_side();

        if sel.shorter_side() < min_side {
            CropSelection::new(x, y, min_side, min_side)
        } else {
            CropSelection::new(x, y, sel.width, sel.height)
        }
    }

    /// 完整换算：最小尺寸限制 -> 缩放 -> 限制在源帧范围内。
    /// 结果总是落在 `[0, W) x [0, H)` 内；源帧不小于最小边长时，两边都不小于最小边长。
    pub fn map(&self, selection: &CropSelection) -> SourceCropRegion {
        let clamped = self.clamp_selection(selection);
        let scaled = self.scale_selection(&clamped);

        let frame_w = self.geometry.source_width;
        let frame_h = self.geometry.source_height;

        // 截断取整可能少一个像素，这里再补齐一次
        let width = scaled.width.max(self.min_source_side).min(frame_w);
        let height = scaled.height.max(self.min_source_side).min(frame_h);
        let x = scaled.x.min(frame_w - width);
        let y = scaled.y.min(frame_h - height);

        SourceCropRegion::new(x, y, width, height)
    }
}

fn saturating_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn scale_edge(value: i32, scale: f64) -> u32 {
    (value.max(0) as f64 * scale).floor() as u32
}
