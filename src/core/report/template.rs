//! 报告模板
//!
//! 模板里每个分区对应唯一一个 `id="<分区>"` 的元素，其 `class` 属性就是当前颜色。
//! 改色时只替换该属性值的字节区间，其余内容逐字节保持不变。

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::core::error::ScoringError;
use crate::core::region::RegionKey;

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\s([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .expect("valid attribute regex")
});

/// 内容按纯文本解析的元素，里面的 `<` 不开始新标签
const RAW_TEXT_ELEMENTS: [&str; 8] = [
    "script", "style", "textarea", "title", "xmp", "iframe", "noembed", "noframes",
];

#[derive(Debug, Clone)]
pub struct ReportTemplate {
    path: PathBuf,
    html: String,
}

impl ReportTemplate {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScoringError> {
        let path = path.as_ref();
        let html = std::fs::read_to_string(path)?;
        let template = Self::from_html(html, path)?;

        let missing = template.missing_regions();
        if missing.is_empty() {
            info!("📄 Report template loaded: {:?}", path);
        } else {
            warn!(
                "⚠️ Report template {:?} has no usable element for: {}",
                path,
                missing.iter().map(RegionKey::as_str).collect::<Vec<_>>().join(", ")
            );
        }
        Ok(template)
    }

    pub fn from_html(html: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self, ScoringError> {
        let html = html.into();
        let path = path.into();
        if html.trim().is_empty() {
            return Err(ScoringError::TemplateEmpty { path });
        }
        Ok(Self { path, html })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// 用 HTML 解析器检查：缺失、重复或没有 class 属性的分区。
    /// 改色时定位不到的分区同样算缺失，两边的结论始终一致。
    pub fn missing_regions(&self) -> Vec<RegionKey> {
        let document = Html::parse_document(&self.html);
        RegionKey::ALL
            .iter()
            .copied()
            .filter(|key| {
                let selector = match Selector::parse(&format!(r#"[id="{}"]"#, key.as_str())) {
                    Ok(selector) => selector,
                    Err(_) => return true,
                };
                let matches: Vec<_> = document.select(&selector).collect();
                matches.len() != 1
                    || matches[0].value().attr("class").is_none()
                    || locate_class_value(&self.html, *key).is_err()
            })
            .collect()
    }
}

/// 标签结束位置（`>` 之后）；引号只在 `=` 之后才开始属性值
fn tag_end(html: &str, from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    let mut after_eq = false;
    for (offset, &b) in html.as_bytes()[from..].iter().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'>' => return Some(from + offset + 1),
            b'=' => after_eq = true,
            b'"' | b'\'' if after_eq => {
                quote = Some(b);
                after_eq = false;
            }
            b if b.is_ascii_whitespace() => {}
            _ => after_eq = false,
        }
    }
    None
}

fn skip_past(html: &str, from: usize, terminator: &str) -> usize {
    html[from..]
        .find(terminator)
        .map(|offset| from + offset + terminator.len())
        .unwrap_or(html.len())
}

/// 所有开始标签的字节区间，跳过注释、结束标签、声明以及纯文本元素的内容
fn start_tags(html: &str) -> Vec<Range<usize>> {
    let bytes = html.as_bytes();
    let mut tags = Vec::new();
    let mut i = 0;

    while let Some(offset) = html[i..].find('<') {
        let start = i + offset;
        let rest = &html[start..];

        if rest.starts_with("<!--") {
            i = skip_past(html, start + 4, "-->");
            continue;
        }
        if rest.starts_with("<![CDATA[") {
            i = skip_past(html, start + 9, "]]>");
            continue;
        }

        match bytes.get(start + 1) {
            Some(b) if b.is_ascii_alphabetic() => {
                let Some(end) = tag_end(html, start + 1) else {
                    break;
                };
                tags.push(start..end);

                let name = rest[1..]
                    .split(|c: char| c.is_ascii_whitespace() || c == '/' || c == '>')
                    .next()
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                let self_closing = html[..end].ends_with("/>");
                i = if RAW_TEXT_ELEMENTS.contains(&name.as_str()) && !self_closing {
                    let close = format!("</{}", name);
                    html[end..]
                        .to_ascii_lowercase()
                        .find(&close)
                        .map(|offset| end + offset)
                        .unwrap_or(html.len())
                } else {
                    end
                };
            }
            Some(b'/') | Some(b'!') | Some(b'?') => {
                i = tag_end(html, start + 1).unwrap_or(html.len());
            }
            _ => i = start + 1,
        }
    }
    tags
}

/// 分区元素 class 属性值在文本中的字节区间
pub fn locate_class_value(html: &str, region: RegionKey) -> Result<Range<usize>, ScoringError> {
    let corruption = |reason: String| ScoringError::TemplateCorruption { region, reason };

    let mut found: Option<Range<usize>> = None;
    let mut tagged = 0;

    for tag in start_tags(html) {
        let mut id = None;
        let mut class_range = None;

        // 重复的属性以第一次出现为准
        for attr in ATTRIBUTE.captures_iter(&html[tag.clone()]) {
            let name = &attr[1];
            let value = match attr.get(2).or_else(|| attr.get(3)).or_else(|| attr.get(4)) {
                Some(value) => value,
                None => continue,
            };
            if name.eq_ignore_ascii_case("id") && id.is_none() {
                id = Some(value.as_str());
            } else if name.eq_ignore_ascii_case("class") && class_range.is_none() {
                class_range = Some(tag.start + value.start()..tag.start + value.end());
            }
        }
        let id_matches = id == Some(region.as_str());

        if id_matches {
            tagged += 1;
            found = class_range;
        }
    }

    match (tagged, found) {
        (0, _) => Err(corruption(format!("no element with id=\"{}\"", region))),
        (1, Some(range)) => Ok(range),
        (1, None) => Err(corruption("tagged element has no class attribute".to_string())),
        (n, _) => Err(corruption(format!("{} elements share id=\"{}\"", n, region))),
    }
}

/// 返回改色后的新文本；找不到元素时原文不变
pub fn set_region_class(html: &str, region: RegionKey, class: &str) -> Result<String, ScoringError> {
    let range = locate_class_value(html, region)?;
    let mut updated = String::with_capacity(html.len() + class.len());
    updated.push_str(&html[..range.start]);
    updated.push_str(class);
    updated.push_str(&html[range.end..]);
    Ok(updated)
}
