//! 上游响应规范化
//! 上游不同接口、不同版本的字段名各不相同，这里按固定顺序尝试已知别名。
//! 新出现的字段名只需要改下面的表，不用改调用方。

use crate::types::{ChapterPages, ChapterRef, Detail, EpisodeView, ListItem, ScheduleEntry, ScrollInfo};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// 列表容器
pub const LIST_KEYS: &[&str] = &["comics", "data", "animes", "anime_list", "results"];
pub const TITLE_KEYS: &[&str] = &["title", "name", "judul"];
pub const IMAGE_KEYS: &[&str] = &["cover", "image", "poster", "thumbnail"];
pub const TYPE_KEYS: &[&str] = &["type", "format"];
pub const COUNT_KEYS: &[&str] = &["chapter", "episode", "chapter_count", "episode_count", "latest_chapter"];
pub const LINK_KEYS: &[&str] = &["link", "href", "url"];
pub const SLUG_KEYS: &[&str] = &["slug", "endpoint"];

const SYNOPSIS_KEYS: &[&str] = &["synopsis", "description", "sinopsis"];
const CHAPTER_LIST_KEYS: &[&str] = &["chapters", "chapter_list", "episodes", "episode_list"];
const CHAPTER_TITLE_KEYS: &[&str] = &["title", "name", "chapter", "episode"];
const DATE_KEYS: &[&str] = &["date", "release", "uploaded", "updated_at"];
const PAGE_LIST_KEYS: &[&str] = &["images", "pages", "data"];
const PAGE_URL_KEYS: &[&str] = &["url", "src", "image"];
const PREV_KEYS: &[&str] = &["prev", "prev_chapter", "previous", "prev_episode"];
const NEXT_KEYS: &[&str] = &["next", "next_chapter", "next_episode"];
const STREAM_KEYS: &[&str] = &["stream_url", "stream", "iframe", "video"];
const SERIES_KEYS: &[&str] = &["anime", "series", "comic"];
const SERIES_TITLE_KEYS: &[&str] = &["comic_title", "manga_title", "anime_title", "series_title"];
const SCHEDULE_KEYS: &[&str] = &["schedule"];
const DAY_KEYS: &[&str] = &["day", "hari"];
const TIME_KEYS: &[&str] = &["time", "jam", "airing_time"];

/// 缺省显示标题
pub const MISSING_TITLE: &str = "N/A";

/// 从链接中提取 slug 的固定路径模式
static SLUG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(?:comic|manga|manhwa|manhua|anime|chapter|episode)/([^/?#]+)/?")
        .expect("slug pattern")
});

static SLUG_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._~-]+$").expect("slug chars"));

/// 按别名顺序取第一个非空字符串 (数字也接受)
pub fn first_string(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| scalar_string(obj.get(*key)?))
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_array<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter().find_map(|key| obj.get(*key)?.as_array())
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 单条详情类响应通常包在 data 里
fn unwrap_data(body: &Value) -> &Value {
    match body.get("data") {
        Some(inner @ Value::Object(_)) => inner,
        _ => body,
    }
}

/// 取出响应中的条目列表
///
/// 依次尝试 `LIST_KEYS`; `data` 是对象时再往里找一层; 响应本身是数组时直接使用。
pub fn list_container(body: &Value) -> &[Value] {
    list_container_with(body, &[])
}

fn list_container_with<'a>(body: &'a Value, extra: &[&str]) -> &'a [Value] {
    if let Value::Array(items) = body {
        return items;
    }
    if let Some(items) = first_array(body, LIST_KEYS).or_else(|| first_array(body, extra)) {
        return items;
    }
    if let Some(inner @ Value::Object(_)) = body.get("data") {
        if let Some(items) = first_array(inner, LIST_KEYS).or_else(|| first_array(inner, extra)) {
            return items;
        }
    }
    &[]
}

/// 从链接中提取 slug，不匹配路径模式时返回 None
pub fn extract_slug(link: &str) -> Option<String> {
    let captures = SLUG_PATTERN.captures(link)?;
    let slug = captures.get(1)?.as_str();
    valid_slug(slug)
}

fn valid_slug(candidate: &str) -> Option<String> {
    let candidate = candidate.trim().trim_matches('/');
    SLUG_CHARS.is_match(candidate).then(|| candidate.to_string())
}

/// slug 解析顺序: slug → endpoint → 从 link/href/url 中按路径模式提取
pub fn resolve_slug(obj: &Value) -> Option<String> {
    for key in SLUG_KEYS {
        if let Some(raw) = obj.get(*key).and_then(scalar_string) {
            let resolved = if raw.contains('/') {
                extract_slug(&raw).or_else(|| valid_slug(&raw))
            } else {
                valid_slug(&raw)
            };
            if resolved.is_some() {
                return resolved;
            }
        }
    }

    LINK_KEYS
        .iter()
        .filter_map(|key| obj.get(*key).and_then(scalar_string))
        .find_map(|link| extract_slug(&link))
}

/// 把一条原始记录映射为 `ListItem`
pub fn normalize_item(raw: &Value) -> ListItem {
    ListItem {
        title: first_string(raw, TITLE_KEYS).unwrap_or_else(|| MISSING_TITLE.to_string()),
        image: first_string(raw, IMAGE_KEYS).unwrap_or_default(),
        slug: resolve_slug(raw),
        item_type: first_string(raw, TYPE_KEYS),
        count_label: first_string(raw, COUNT_KEYS),
        link: first_string(raw, LINK_KEYS).filter(|l| l.starts_with("http")),
    }
}

/// 取列表并逐条规范化
pub fn normalize_list(body: &Value) -> Vec<ListItem> {
    list_container(body).iter().map(normalize_item).collect()
}

fn normalize_chapter(raw: &Value) -> ChapterRef {
    match raw {
        Value::String(s) => ChapterRef {
            title: s.clone(),
            slug: extract_slug(s).or_else(|| valid_slug(s)),
            date: None,
        },
        _ => ChapterRef {
            title: first_string(raw, CHAPTER_TITLE_KEYS).unwrap_or_else(|| MISSING_TITLE.to_string()),
            slug: resolve_slug(raw),
            date: first_string(raw, DATE_KEYS),
        },
    }
}

fn genre_names(obj: &Value) -> Vec<String> {
    let Some(Value::Array(genres)) = obj.get("genres").or_else(|| obj.get("genre")) else {
        return Vec::new();
    };
    genres
        .iter()
        .filter_map(|g| scalar_string(g).or_else(|| first_string(g, TITLE_KEYS)))
        .collect()
}

/// 漫画/动漫详情
pub fn normalize_detail(body: &Value) -> Detail {
    let obj = unwrap_data(body);
    let chapters = first_array(obj, CHAPTER_LIST_KEYS)
        .or_else(|| first_array(body, CHAPTER_LIST_KEYS))
        .map(|list| list.iter().map(normalize_chapter).collect())
        .unwrap_or_default();

    Detail {
        title: first_string(obj, TITLE_KEYS).unwrap_or_else(|| MISSING_TITLE.to_string()),
        image: first_string(obj, IMAGE_KEYS).unwrap_or_default(),
        synopsis: first_string(obj, SYNOPSIS_KEYS).unwrap_or_default(),
        item_type: first_string(obj, TYPE_KEYS),
        genres: genre_names(obj),
        chapters,
    }
}

fn nav_target(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => extract_slug(s).or_else(|| valid_slug(s)),
        Value::Object(_) => resolve_slug(value),
        _ => None,
    }
}

fn first_nav(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| nav_target(obj.get(*key)?))
}

/// 上一话/下一话 slug
pub fn normalize_navigation(body: &Value) -> (Option<String>, Option<String>) {
    let obj = unwrap_data(body);
    let obj = obj.get("navigation").filter(|n| n.is_object()).unwrap_or(obj);
    (first_nav(obj, PREV_KEYS), first_nav(obj, NEXT_KEYS))
}

/// 阅读页图片列表
pub fn normalize_pages(body: &Value) -> ChapterPages {
    let obj = unwrap_data(body);
    let images = first_array(obj, PAGE_LIST_KEYS)
        .or_else(|| first_array(body, PAGE_LIST_KEYS))
        .map(|list| {
            list.iter()
                .filter_map(|p| scalar_string(p).or_else(|| first_string(p, PAGE_URL_KEYS)))
                .collect()
        })
        .unwrap_or_default();
    let (prev, next) = normalize_navigation(body);

    ChapterPages {
        title: first_string(obj, TITLE_KEYS).unwrap_or_else(|| MISSING_TITLE.to_string()),
        series_title: series_title(obj),
        cover: first_string(obj, IMAGE_KEYS).unwrap_or_default(),
        images,
        prev,
        next,
    }
}

/// 剧集页
pub fn normalize_episode(body: &Value) -> EpisodeView {
    let obj = unwrap_data(body);
    let series_slug = SERIES_KEYS
        .iter()
        .find_map(|key| nav_target(obj.get(*key)?))
        .or_else(|| first_string(obj, &["anime_slug", "series_slug"]).and_then(|s| valid_slug(&s)));
    let (prev, next) = normalize_navigation(body);

    EpisodeView {
        title: first_string(obj, TITLE_KEYS).unwrap_or_else(|| MISSING_TITLE.to_string()),
        series_title: series_title(obj),
        series_slug,
        poster: first_string(obj, IMAGE_KEYS).unwrap_or_default(),
        stream_url: first_string(obj, STREAM_KEYS).filter(|u| u.starts_with("http")),
        prev,
        next,
    }
}

/// 所属系列标题: 先看专用字段，再看嵌套的系列对象
fn series_title(obj: &Value) -> Option<String> {
    first_string(obj, SERIES_TITLE_KEYS).or_else(|| {
        SERIES_KEYS
            .iter()
            .find_map(|key| first_string(obj.get(*key)?, TITLE_KEYS))
    })
}

/// 分页接口是否还有下一页; 没有明确标记时以本页是否有条目为准
pub fn has_next_page(body: &Value) -> bool {
    let obj = unwrap_data(body);
    let flag = ["has_next", "has_next_page", "hasNextPage"]
        .iter()
        .find_map(|key| obj.get(*key).or_else(|| body.get(*key))?.as_bool())
        .or_else(|| {
            body.get("pagination")
                .or_else(|| obj.get("pagination"))?
                .get("has_next_page")?
                .as_bool()
        });
    flag.unwrap_or_else(|| !list_container(body).is_empty())
}

/// 解析 scroll_info; 缺少 next_offset 时视为没有续传数据
pub fn scroll_info(body: &Value) -> Option<ScrollInfo> {
    let info = body.get("scroll_info").or_else(|| unwrap_data(body).get("scroll_info"))?;
    let next_offset = info.get("next_offset").and_then(as_u64)?;

    Some(ScrollInfo {
        next_offset,
        batch_id: info.get("batch_id").and_then(as_u64),
        has_more: info.get("has_more").and_then(Value::as_bool).unwrap_or(true),
    })
}

/// 放送表，按天分组的结构会被拍平
pub fn normalize_schedule(body: &Value) -> Vec<ScheduleEntry> {
    let mut entries = Vec::new();

    for raw in list_container_with(body, SCHEDULE_KEYS) {
        let nested = list_container_with(raw, SCHEDULE_KEYS);
        if raw.is_object() && !nested.is_empty() {
            let day = first_string(raw, DAY_KEYS);
            entries.extend(nested.iter().map(|item| schedule_entry(item, day.clone())));
        } else {
            entries.push(schedule_entry(raw, None));
        }
    }

    // { "senin": [...], "selasa": [...] }
    if entries.is_empty() {
        if let Some(days) = unwrap_data(body).as_object().map(day_map) {
            entries = days;
        }
    }

    entries
}

fn day_map(map: &Map<String, Value>) -> Vec<ScheduleEntry> {
    map.iter()
        .filter_map(|(day, list)| Some((day, list.as_array()?)))
        .flat_map(|(day, list)| list.iter().map(move |item| schedule_entry(item, Some(day.clone()))))
        .collect()
}

fn schedule_entry(raw: &Value, day: Option<String>) -> ScheduleEntry {
    ScheduleEntry {
        title: first_string(raw, TITLE_KEYS).unwrap_or_else(|| MISSING_TITLE.to_string()),
        slug: resolve_slug(raw),
        day: first_string(raw, DAY_KEYS).or(day),
        time: first_string(raw, TIME_KEYS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_image_fallback_order() {
        let item = normalize_item(&json!({"title": "A", "poster": "p.jpg", "thumbnail": "t.jpg"}));
        assert_eq!(item.image, "p.jpg");

        let item = normalize_item(&json!({"title": "A", "image": "", "thumbnail": "t.jpg"}));
        assert_eq!(item.image, "t.jpg");

        let item = normalize_item(&json!({"cover": "c.jpg", "image": "i.jpg"}));
        assert_eq!(item.image, "c.jpg");
        assert_eq!(item.title, MISSING_TITLE);
    }

    #[test]
    fn test_slug_from_link() {
        let item = normalize_item(&json!({
            "title": "Solo Leveling",
            "link": "https://komiku.id/manga/solo-leveling/"
        }));
        assert_eq!(item.slug.as_deref(), Some("solo-leveling"));

        let item = normalize_item(&json!({"href": "/comic/one-piece"}));
        assert_eq!(item.slug.as_deref(), Some("one-piece"));
    }

    #[test]
    fn test_slug_unresolvable() {
        let item = normalize_item(&json!({"title": "X", "link": "https://example.com/about"}));
        assert_eq!(item.slug, None);
        assert_eq!(item.link.as_deref(), Some("https://example.com/about"));

        let item = normalize_item(&json!({"title": "Y"}));
        assert_eq!(item.slug, None);
        assert_eq!(item.link, None);

        // 含非法字符的 slug 不接受
        let item = normalize_item(&json!({"slug": "a b<c>"}));
        assert_eq!(item.slug, None);
    }

    #[test]
    fn test_endpoint_path_as_slug() {
        let item = normalize_item(&json!({"endpoint": "/anime/spy-x-family-s2/"}));
        assert_eq!(item.slug.as_deref(), Some("spy-x-family-s2"));
    }

    #[test]
    fn test_list_container_order() {
        let body = json!({"data": [{"title": "d"}], "comics": [{"title": "c"}]});
        assert_eq!(normalize_list(&body)[0].title, "c");

        let body = json!({"data": {"anime_list": [{"title": "nested"}]}});
        assert_eq!(normalize_list(&body)[0].title, "nested");

        let body = json!([{"title": "bare"}]);
        assert_eq!(normalize_list(&body)[0].title, "bare");

        assert!(normalize_list(&json!({"status": "ok"})).is_empty());
    }

    #[test]
    fn test_numeric_count_label() {
        let item = normalize_item(&json!({"title": "A", "episode": 12, "type": "TV"}));
        assert_eq!(item.count_label.as_deref(), Some("12"));
        assert_eq!(item.item_type.as_deref(), Some("TV"));
    }

    #[test]
    fn test_detail_with_chapters() {
        let detail = normalize_detail(&json!({
            "title": "One Piece",
            "chapters": [{"slug": "ch-1"}, {"title": "Chapter 2", "link": "/chapter/ch-2/"}],
            "genres": ["Action", {"name": "Adventure"}]
        }));
        assert_eq!(detail.title, "One Piece");
        assert_eq!(detail.chapters.len(), 2);
        assert_eq!(detail.chapters[0].slug.as_deref(), Some("ch-1"));
        assert_eq!(detail.chapters[1].slug.as_deref(), Some("ch-2"));
        assert_eq!(detail.genres, vec!["Action", "Adventure"]);
    }

    #[test]
    fn test_pages_and_navigation() {
        let pages = normalize_pages(&json!({
            "data": {
                "title": "Chapter 5",
                "images": ["1.jpg", {"src": "2.jpg"}],
                "navigation": {"prev": "/chapter/ch-4/", "next": {"slug": "ch-6"}}
            }
        }));
        assert_eq!(pages.images, vec!["1.jpg", "2.jpg"]);
        assert_eq!(pages.prev.as_deref(), Some("ch-4"));
        assert_eq!(pages.next.as_deref(), Some("ch-6"));
        assert_eq!(pages.series_title, None);
    }

    #[test]
    fn test_episode_series() {
        let view = normalize_episode(&json!({
            "title": "Frieren Episode 3",
            "anime": {"title": "Frieren", "link": "https://otakudesu.cloud/anime/frieren/"},
            "stream_url": "https://player.example/embed/3",
            "next_episode": "/episode/frieren-ep-4/"
        }));
        assert_eq!(view.series_slug.as_deref(), Some("frieren"));
        assert_eq!(view.series_title.as_deref(), Some("Frieren"));
        assert_eq!(view.next.as_deref(), Some("frieren-ep-4"));
        assert_eq!(view.prev, None);
    }

    #[test]
    fn test_has_next_page() {
        assert!(!has_next_page(&json!({"comics": [{"title": "a"}], "pagination": {"has_next_page": false}})));
        assert!(has_next_page(&json!({"data": {"has_next": true, "comics": []}})));
        assert!(has_next_page(&json!({"comics": [{"title": "a"}]})));
        assert!(!has_next_page(&json!({"comics": []})));
    }

    #[test]
    fn test_scroll_info() {
        let info = scroll_info(&json!({
            "comics": [],
            "scroll_info": {"next_offset": 20, "has_more": true, "batch_id": 1}
        }))
        .unwrap();
        assert_eq!(info.next_offset, 20);
        assert_eq!(info.batch_id, Some(1));
        assert!(info.has_more);

        assert!(scroll_info(&json!({"scroll_info": {"has_more": true}})).is_none());
        assert!(scroll_info(&json!({"comics": []})).is_none());
    }

    #[test]
    fn test_schedule_day_groups() {
        let grouped = normalize_schedule(&json!({
            "data": [
                {"day": "Senin", "animes": [{"title": "A", "slug": "a"}]},
                {"day": "Selasa", "animes": [{"title": "B", "slug": "b", "time": "20:00"}]}
            ]
        }));
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[1].day.as_deref(), Some("Selasa"));
        assert_eq!(grouped[1].time.as_deref(), Some("20:00"));

        let keyed = normalize_schedule(&json!({"senin": [{"title": "C"}]}));
        assert_eq!(keyed.len(), 1);
        assert_eq!(keyed[0].day.as_deref(), Some("senin"));
        assert_eq!(keyed[0].key(), "C");
    }
}
