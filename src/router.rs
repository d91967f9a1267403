//! 哈希路由
//! 把 `location.hash` 解析成页面，纯函数，不保存任何状态

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "page", rename_all = "snake_case")]
pub enum Route {
    Home,
    Search { query: Option<String> },
    Genres,
    Genre { slug: String },
    Browse { number: u32 },
    Trending,
    Random,
    Stats,
    Infinite,
    Realtime,
    History,
    Comic { slug: String },
    Read { comic: String, chapter: String },
    Anime { slug: String },
    Episode { slug: String },
}

impl Route {
    /// 解析哈希片段; 无法识别的输入一律回到首页
    pub fn parse(hash: &str) -> Route {
        let trimmed = hash.trim().trim_start_matches('#').trim_matches('/');
        let segments: Vec<String> = trimmed
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode)
            .collect();
        let parts: Vec<&str> = segments.iter().map(String::as_str).collect();

        match parts.as_slice() {
            [] | ["home"] => Route::Home,
            ["search"] => Route::Search { query: None },
            ["search", query, ..] => Route::Search {
                query: Some(query.trim().to_string()).filter(|q| !q.is_empty()),
            },
            ["genres"] => Route::Genres,
            ["genre", slug] => Route::Genre { slug: slug.to_string() },
            ["browse"] => Route::Browse { number: 1 },
            ["browse", page] => Route::Browse {
                number: page.parse().ok().filter(|p| *p > 0).unwrap_or(1),
            },
            ["trending"] => Route::Trending,
            ["random"] => Route::Random,
            ["stats"] => Route::Stats,
            ["infinite"] => Route::Infinite,
            ["realtime"] => Route::Realtime,
            ["history"] => Route::History,
            ["comic", slug] => Route::Comic { slug: slug.to_string() },
            ["read", comic, chapter] => Route::Read {
                comic: comic.to_string(),
                chapter: chapter.to_string(),
            },
            ["anime", slug] => Route::Anime { slug: slug.to_string() },
            ["episode", slug] => Route::Episode { slug: slug.to_string() },
            _ => Route::Home,
        }
    }

    /// 规范化后的哈希片段 (带 `#`)
    pub fn to_hash(&self) -> String {
        match self {
            Route::Home => "#home".to_string(),
            Route::Search { query: None } => "#search".to_string(),
            Route::Search { query: Some(q) } => format!("#search/{}", encode(q)),
            Route::Genres => "#genres".to_string(),
            Route::Genre { slug } => format!("#genre/{}", encode(slug)),
            Route::Browse { number } => format!("#browse/{}", number),
            Route::Trending => "#trending".to_string(),
            Route::Random => "#random".to_string(),
            Route::Stats => "#stats".to_string(),
            Route::Infinite => "#infinite".to_string(),
            Route::Realtime => "#realtime".to_string(),
            Route::History => "#history".to_string(),
            Route::Comic { slug } => format!("#comic/{}", encode(slug)),
            Route::Read { comic, chapter } => format!("#read/{}/{}", encode(comic), encode(chapter)),
            Route::Anime { slug } => format!("#anime/{}", encode(slug)),
            Route::Episode { slug } => format!("#episode/{}", encode(slug)),
        }
    }
}

fn decode(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

fn encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}
