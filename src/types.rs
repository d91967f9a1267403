//! 内部数据类型
//! 上游 JSON 经过 normalize 之后统一落到这些结构上

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 条目种类，决定卡片点击后进入哪个详情路由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Comic,
    Anime,
}

/// 列表中的一个漫画/动漫条目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListItem {
    pub title: String,
    pub image: String,
    pub slug: Option<String>,
    pub item_type: Option<String>,
    /// 章节/集数标签 (例如 "Chapter 1090" 或 "12")
    pub count_label: Option<String>,
    /// 原站链接，没有 slug 时作为外链兜底
    pub link: Option<String>,
}

/// 详情页中的一个章节/剧集
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterRef {
    pub title: String,
    pub slug: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detail {
    pub title: String,
    pub image: String,
    pub synopsis: String,
    pub item_type: Option<String>,
    pub genres: Vec<String>,
    pub chapters: Vec<ChapterRef>,
}

/// 阅读页: 图片列表 + 上一话/下一话
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterPages {
    pub title: String,
    /// 所属漫画标题与封面，写历史记录用
    pub series_title: Option<String>,
    pub cover: String,
    pub images: Vec<String>,
    pub prev: Option<String>,
    pub next: Option<String>,
}

/// 剧集播放页
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeView {
    pub title: String,
    pub series_title: Option<String>,
    pub series_slug: Option<String>,
    pub poster: String,
    pub stream_url: Option<String>,
    pub prev: Option<String>,
    pub next: Option<String>,
}

/// 分页信息流的续传游标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedCursor {
    pub offset: u64,
    pub batch_id: u64,
    pub has_more: bool,
}

impl Default for FeedCursor {
    fn default() -> Self {
        Self {
            offset: 0,
            batch_id: 0,
            has_more: true,
        }
    }
}

/// 上游 scroll_info 中的续传数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollInfo {
    pub next_offset: u64,
    pub batch_id: Option<u64>,
    pub has_more: bool,
}

/// 观看/阅读历史
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub title: String,
    pub episode_or_chapter_label: String,
    pub slug: String,
    pub poster_url: String,
    pub timestamp: DateTime<Utc>,
    /// 重新打开时跳转的路由
    #[serde(default)]
    pub route: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

/// 放送表中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub title: String,
    pub slug: Option<String>,
    pub day: Option<String>,
    pub time: Option<String>,
}

impl ScheduleEntry {
    /// 用于快照比对的键: 优先 slug，否则标题
    pub fn key(&self) -> &str {
        self.slug.as_deref().unwrap_or(&self.title)
    }
}
