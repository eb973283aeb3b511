//! 肺部分区与严重程度
//!
//! 14 个固定分区，每个分区的评分为 0-3，或者"未测量"（4，灰色）。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const REGION_COUNT: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegionKey {
    LeftAnteriorApical,
    LeftAnteriorBasal,
    LeftLateralApical,
    LeftLateralBasal,
    LeftPosteriorApical,
    LeftPosteriorMedial,
    LeftPosteriorBasal,
    RightAnteriorApical,
    RightAnteriorBasal,
    RightLateralApical,
    RightLateralBasal,
    RightPosteriorApical,
    RightPosteriorMedial,
    RightPosteriorBasal,
}

impl RegionKey {
    pub const ALL: [RegionKey; REGION_COUNT] = [
        RegionKey::LeftAnteriorApical,
        RegionKey::LeftAnteriorBasal,
        RegionKey::LeftLateralApical,
        RegionKey::LeftLateralBasal,
        RegionKey::LeftPosteriorApical,
        RegionKey::LeftPosteriorMedial,
        RegionKey::LeftPosteriorBasal,
        RegionKey::RightAnteriorApical,
        RegionKey::RightAnteriorBasal,
        RegionKey::RightLateralApical,
        RegionKey::RightLateralBasal,
        RegionKey::RightPosteriorApical,
        RegionKey::RightPosteriorMedial,
        RegionKey::RightPosteriorBasal,
    ];

    /// 模板中元素的 id
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionKey::LeftAnteriorApical => "left-anterior-apical",
            RegionKey::LeftAnteriorBasal => "left-anterior-basal",
            RegionKey::LeftLateralApical => "left-lateral-apical",
            RegionKey::LeftLateralBasal => "left-lateral-basal",
            RegionKey::LeftPosteriorApical => "left-posterior-apical",
            RegionKey::LeftPosteriorMedial => "left-posterior-medial",
            RegionKey::LeftPosteriorBasal => "left-posterior-basal",
            RegionKey::RightAnteriorApical => "right-anterior-apical",
            RegionKey::RightAnteriorBasal => "right-anterior-basal",
            RegionKey::RightLateralApical => "right-lateral-apical",
            RegionKey::RightLateralBasal => "right-lateral-basal",
            RegionKey::RightPosteriorApical => "right-posterior-apical",
            RegionKey::RightPosteriorMedial => "right-posterior-medial",
            RegionKey::RightPosteriorBasal => "right-posterior-basal",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRegion(pub String);

impl fmt::Display for UnknownRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown region: {}", self.0)
    }
}

impl std::error::Error for UnknownRegion {}

impl FromStr for RegionKey {
    type Err = UnknownRegion;

    /// 大小写不敏感，`_` 与 `-` 等价（文件名常写成 left_anterior_apical）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        RegionKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| UnknownRegion(s.to_string()))
    }
}

/// 严重程度，数值与颜色是和报告模板之间的固定约定
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Severity {
    Healthy = 0,
    Mild = 1,
    Moderate = 2,
    Severe = 3,
    #[default]
    NotMeasured = 4,
}

impl Severity {
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Severity::Healthy),
            1 => Some(Severity::Mild),
            2 => Some(Severity::Moderate),
            3 => Some(Severity::Severe),
            4 => Some(Severity::NotMeasured),
            _ => None,
        }
    }

    /// 分类器输出的类别下标 -> 严重程度；超出 0..=3 的下标视为未测量
    pub fn from_class_index(index: usize) -> Self {
        match index {
            0 => Severity::Healthy,
            1 => Severity::Mild,
            2 => Severity::Moderate,
            3 => Severity::Severe,
            _ => Severity::NotMeasured,
        }
    }

    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn color(&self) -> &'static str {
        match self {
            Severity::Healthy => "white",
            Severity::Mild => "yellow",
            Severity::Moderate => "orange",
            Severity::Severe => "red",
            Severity::NotMeasured => "grey",
        }
    }

    pub fn is_pathological(&self) -> bool {
        matches!(self, Severity::Mild | Severity::Moderate | Severity::Severe)
    }
}

/// 各颜色分区计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub white: u32,
    pub yellow: u32,
    pub orange: u32,
    pub red: u32,
    pub not_measured: u32,
    pub pathological: u32,
}

impl Totals {
    pub fn bucket_sum(&self) -> u32 {
        self.white + self.yellow + self.orange + self.red + self.not_measured
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegionScoreMap {
    scores: [Severity; REGION_COUNT],
}

impl RegionScoreMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, region: RegionKey) -> Severity {
        self.scores[region.index()]
    }

    pub fn set(&mut self, region: RegionKey, severity: Severity) {
        self.scores[region.index()] = severity;
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionKey, Severity)> + '_ {
        RegionKey::ALL.iter().map(move |key| (*key, self.get(*key)))
    }

    /// 已测量（非灰色）的分区
    pub fn measured(&self) -> impl Iterator<Item = (RegionKey, Severity)> + '_ {
        self.iter().filter(|(_, s)| *s != Severity::NotMeasured)
    }

    pub fn totals(&self) -> Totals {
        let mut totals = Totals::default();
        for (_, severity) in self.iter() {
            match severity {
                Severity::Healthy => totals.white += 1,
                Severity::Mild => totals.yellow += 1,
                Severity::Moderate => totals.orange += 1,
                Severity::Severe => totals.red += 1,
                Severity::NotMeasured => totals.not_measured += 1,
            }
            if severity.is_pathological() {
                totals.pathological += 1;
            }
        }
        totals
    }

    pub fn snapshot(&self) -> BTreeMap<RegionKey, u8> {
        self.iter().map(|(k, s)| (k, s.value())).collect()
    }

    pub fn reset(&mut self) {
        self.scores = [Severity::NotMeasured; REGION_COUNT];
    }
}
