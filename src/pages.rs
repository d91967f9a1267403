//! 页面加载器
//! 每次导航拿到一份独立的 ViewContext，路由 → 上游请求 → 规范化 → 渲染

use crate::http_client::{encode_segment, HttpClientError, Upstream};
use crate::normalize::{
    has_next_page, normalize_detail, normalize_episode, normalize_item, normalize_list,
    normalize_navigation, normalize_pages, normalize_schedule, MISSING_TITLE,
};
use crate::render::{self, detail_route};
use crate::router::Route;
use crate::store::Store;
use crate::types::{HistoryEntry, ItemKind};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Upstream(#[from] HttpClientError),
}

/// 一次导航所需的依赖
pub struct ViewContext<'a> {
    pub upstream: &'a dyn Upstream,
    pub store: &'a Store,
}

/// 渲染结果
#[derive(Debug, Clone, Serialize)]
pub struct View {
    pub route: Route,
    pub title: String,
    pub html: String,
    /// 需要前端改写 hash 的情况 (随机推荐)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl View {
    fn new(route: &Route, title: impl Into<String>, html: String) -> Self {
        Self {
            route: route.clone(),
            title: title.into(),
            html,
            redirect: None,
        }
    }
}

/// 按路由分发到各页面
pub async fn load(route: &Route, ctx: &ViewContext<'_>) -> Result<View, PageError> {
    debug!("加载页面: {}", route.to_hash());
    match route {
        Route::Home => home(route, ctx).await,
        Route::Search { query } => search(route, ctx, query.as_deref()).await,
        Route::Genres => genres(route, ctx).await,
        Route::Genre { slug } => genre(route, ctx, slug).await,
        Route::Browse { number } => browse(route, ctx, *number).await,
        Route::Trending => simple_list(route, ctx, "/trending", "Trending").await,
        Route::Random => random(route, ctx).await,
        Route::Stats => Ok(stats(route, ctx).await),
        Route::Infinite => Ok(View::new(route, "Infinite", render::render_infinite_shell())),
        Route::Realtime => realtime(route, ctx).await,
        Route::History => Ok(history(route, ctx).await),
        Route::Comic { slug } => detail(route, ctx, ItemKind::Comic, slug).await,
        Route::Anime { slug } => detail(route, ctx, ItemKind::Anime, slug).await,
        Route::Read { comic, chapter } => read(route, ctx, comic, chapter).await,
        Route::Episode { slug } => episode(route, ctx, slug).await,
    }
}

/// 首页: 最新 + 热门并发请求，两者都成功才渲染
async fn home(route: &Route, ctx: &ViewContext<'_>) -> Result<View, PageError> {
    let (latest, popular) = tokio::try_join!(
        ctx.upstream.get_json("/home", &[]),
        ctx.upstream.get_json("/popular", &[]),
    )?;

    let html = format!(
        "{}{}",
        render::render_section("Populer", &render::render_slider(&normalize_list(&popular), ItemKind::Comic)),
        render::render_section("Terbaru", &render::render_grid(&normalize_list(&latest), ItemKind::Comic)),
    );
    Ok(View::new(route, "Home", html))
}

async fn search(route: &Route, ctx: &ViewContext<'_>, query: Option<&str>) -> Result<View, PageError> {
    let form = render::render_search_form(query);
    let Some(query) = query else {
        return Ok(View::new(route, "Search", form));
    };

    let body = ctx
        .upstream
        .get_json(&format!("/search/{}", encode_segment(query)), &[])
        .await?;
    let items = normalize_list(&body);
    info!("🔍 搜索: {} ({} 个结果)", query, items.len());

    let html = format!(
        "{}{}",
        form,
        render::render_section(&format!("Hasil: {query}"), &render::render_grid(&items, ItemKind::Comic))
    );
    Ok(View::new(route, format!("Search: {query}"), html))
}

async fn genres(route: &Route, ctx: &ViewContext<'_>) -> Result<View, PageError> {
    let body = ctx.upstream.get_json("/genres", &[]).await?;
    let genres = normalize_list(&body);
    Ok(View::new(route, "Genres", render::render_genres(&genres)))
}

async fn genre(route: &Route, ctx: &ViewContext<'_>, slug: &str) -> Result<View, PageError> {
    let body = ctx
        .upstream
        .get_json(&format!("/genre/{}", encode_segment(slug)), &[])
        .await?;
    let html = render::render_section(slug, &render::render_grid(&normalize_list(&body), ItemKind::Comic));
    Ok(View::new(route, format!("Genre: {slug}"), html))
}

async fn browse(route: &Route, ctx: &ViewContext<'_>, page: u32) -> Result<View, PageError> {
    let body = ctx
        .upstream
        .get_json("/advanced-search", &[("page", page.to_string())])
        .await?;
    let html = format!(
        "{}{}",
        render::render_grid(&normalize_list(&body), ItemKind::Comic),
        render::render_pagination(page, has_next_page(&body))
    );
    Ok(View::new(route, format!("Browse {page}"), html))
}

async fn simple_list(route: &Route, ctx: &ViewContext<'_>, path: &str, heading: &str) -> Result<View, PageError> {
    let body = ctx.upstream.get_json(path, &[]).await?;
    let html = render::render_section(heading, &render::render_grid(&normalize_list(&body), ItemKind::Comic));
    Ok(View::new(route, heading, html))
}

/// 随机推荐: 能解析出 slug 时让前端跳到详情页
async fn random(route: &Route, ctx: &ViewContext<'_>) -> Result<View, PageError> {
    let body = ctx.upstream.get_json("/random", &[]).await?;
    let item = normalize_list(&body)
        .into_iter()
        .next()
        .unwrap_or_else(|| normalize_item(body.get("data").unwrap_or(&body)));

    let mut view = View::new(route, "Random", render::render_card(&item, ItemKind::Comic));
    view.redirect = item
        .slug
        .as_deref()
        .map(|slug| detail_route(ItemKind::Comic, slug).to_hash());
    Ok(view)
}

async fn detail(route: &Route, ctx: &ViewContext<'_>, kind: ItemKind, slug: &str) -> Result<View, PageError> {
    let path = match kind {
        ItemKind::Comic => format!("/comic/comic/{}", encode_segment(slug)),
        ItemKind::Anime => format!("/anime/{}", encode_segment(slug)),
    };
    let body = ctx.upstream.get_json(&path, &[]).await?;
    let detail = normalize_detail(&body);
    debug!("{} 共 {} 个章节", slug, detail.chapters.len());

    let html = render::render_detail(&detail, kind, slug);
    Ok(View::new(route, detail.title, html))
}

/// 阅读页: 章节内容与导航并发请求，并写入阅读历史
async fn read(route: &Route, ctx: &ViewContext<'_>, comic: &str, chapter: &str) -> Result<View, PageError> {
    let chapter_path = format!("/chapter/{}", encode_segment(chapter));
    let navigation_path = format!("{chapter_path}/navigation");
    let (content, navigation) = tokio::try_join!(
        ctx.upstream.get_json(&chapter_path, &[]),
        ctx.upstream.get_json(&navigation_path, &[]),
    )?;

    let mut pages = normalize_pages(&content);
    let (prev, next) = normalize_navigation(&navigation);
    pages.prev = prev.or(pages.prev);
    pages.next = next.or(pages.next);

    record(
        ctx,
        HistoryEntry {
            title: pages.series_title.clone().unwrap_or_else(|| comic.to_string()),
            episode_or_chapter_label: pages.title.clone(),
            slug: comic.to_string(),
            poster_url: pages.cover.clone(),
            timestamp: Utc::now(),
            route: route.to_hash(),
        },
    )
    .await;

    let html = render::render_reader(&pages, comic);
    Ok(View::new(route, pages.title, html))
}

async fn episode(route: &Route, ctx: &ViewContext<'_>, slug: &str) -> Result<View, PageError> {
    let body = ctx
        .upstream
        .get_json(&format!("/episode/{}", encode_segment(slug)), &[])
        .await?;
    let view = normalize_episode(&body);

    record(
        ctx,
        HistoryEntry {
            title: view.series_title.clone().unwrap_or_else(|| view.title.clone()),
            episode_or_chapter_label: view.title.clone(),
            slug: view.series_slug.clone().unwrap_or_else(|| slug.to_string()),
            poster_url: view.poster.clone(),
            timestamp: Utc::now(),
            route: route.to_hash(),
        },
    )
    .await;

    let html = render::render_episode(&view);
    Ok(View::new(route, view.title, html))
}

/// 实时页: 首次拉取失败只显示内联错误面板，推送流会继续重试
async fn realtime(route: &Route, ctx: &ViewContext<'_>) -> Result<View, PageError> {
    let html = match ctx.upstream.get_json("/schedule", &[]).await {
        Ok(body) => render::render_realtime_shell(&normalize_schedule(&body)),
        Err(e) => {
            warn!("放送表加载失败: {}", e);
            format!(
                "{}{}",
                render::render_error_panel(&e.to_string()),
                render::render_realtime_shell(&[])
            )
        }
    };
    Ok(View::new(route, "Jadwal Rilis", html))
}

async fn history(route: &Route, ctx: &ViewContext<'_>) -> View {
    let data = ctx.store.snapshot().await;
    View::new(route, "Riwayat", render::render_history(data.history()))
}

/// 本地统计，不访问上游
async fn stats(route: &Route, ctx: &ViewContext<'_>) -> View {
    let data = ctx.store.snapshot().await;
    let entries = data.history();
    let titles: HashSet<&str> = entries
        .iter()
        .map(|e| e.title.as_str())
        .filter(|t| *t != MISSING_TITLE)
        .collect();
    let reads = entries.iter().filter(|e| e.route.starts_with("#read/")).count();
    let latest = entries
        .first()
        .map(|e| e.timestamp.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());

    let html = format!(
        r#"<table class="stats"><tbody><tr><th>Riwayat</th><td>{}</td></tr><tr><th>Judul unik</th><td>{}</td></tr><tr><th>Chapter dibaca</th><td>{}</td></tr><tr><th>Episode ditonton</th><td>{}</td></tr><tr><th>Terakhir</th><td>{}</td></tr><tr><th>Tema</th><td>{}</td></tr></tbody></table>"#,
        entries.len(),
        titles.len(),
        reads,
        entries.len() - reads,
        latest,
        data.theme.as_str(),
    );
    View::new(route, "Stats", html)
}

/// 历史记录写入失败不影响页面渲染
async fn record(ctx: &ViewContext<'_>, entry: HistoryEntry) {
    let slug = entry.slug.clone();
    match ctx.store.update(|data| data.record_history(entry)).await {
        Ok(true) => debug!("历史记录: {}", slug),
        Ok(false) => debug!("历史记录刷新: {}", slug),
        Err(e) => warn!("写入历史记录失败: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::stub::StubUpstream;
    use crate::store::testing::TempPath;
    use serde_json::{json, Value};

    async fn load_hash(hash: &str, upstream: &StubUpstream, store: &Store) -> Result<View, PageError> {
        let ctx = ViewContext { upstream, store };
        load(&Route::parse(hash), &ctx).await
    }

    #[tokio::test]
    async fn test_comic_detail_scenario() {
        let upstream = StubUpstream::new().with(
            "/comic/comic/one-piece",
            json!({"title": "One Piece", "chapters": [{"slug": "ch-1"}]}),
        );
        let file = TempPath::new("detail");
        let store = Store::open(file.path()).await;

        let view = load_hash("#comic/one-piece", &upstream, &store).await.unwrap();
        assert_eq!(upstream.requested(), vec!["/comic/comic/one-piece"]);
        assert_eq!(view.title, "One Piece");

        let doc = scraper::Html::parse_fragment(&view.html);
        let selector = scraper::Selector::parse("li.chapter[data-hash]").unwrap();
        let targets: Vec<_> = doc
            .select(&selector)
            .filter_map(|el| el.value().attr("data-hash"))
            .collect();
        assert_eq!(targets, vec!["#read/one-piece/ch-1"]);
    }

    #[tokio::test]
    async fn test_home_requires_both_fetches() {
        let file = TempPath::new("home");
        let store = Store::open(file.path()).await;
        let partial = StubUpstream::new().with("/home", json!({"comics": [{"title": "A", "slug": "a"}]}));
        assert!(load_hash("#home", &partial, &store).await.is_err());

        let full = StubUpstream::new()
            .with("/home", json!({"comics": [{"title": "A", "slug": "a"}]}))
            .with("/popular", json!({"data": [{"title": "B", "slug": "b"}]}));
        let view = load_hash("#home", &full, &store).await.unwrap();
        assert!(view.html.contains("#comic/a"));
        assert!(view.html.contains("#comic/b"));
    }

    #[tokio::test]
    async fn test_read_records_history_once() {
        let file = TempPath::new("read");
        let upstream = StubUpstream::new()
            .with(
                "/chapter/ch-2",
                json!({"data": {"title": "Chapter 2", "comic_title": "One Piece", "images": ["1.jpg"]}}),
            )
            .with("/chapter/ch-2/navigation", json!({"prev": "ch-1", "next": null}));
        let store = Store::open(file.path()).await;

        let view = load_hash("#read/one-piece/ch-2", &upstream, &store).await.unwrap();
        assert!(view.html.contains("#read/one-piece/ch-1"));
        load_hash("#read/one-piece/ch-2", &upstream, &store).await.unwrap();

        let data = store.snapshot().await;
        assert_eq!(data.history().len(), 1);
        assert_eq!(data.history()[0].title, "One Piece");
        assert_eq!(data.history()[0].slug, "one-piece");
        assert_eq!(data.history()[0].episode_or_chapter_label, "Chapter 2");
    }

    #[tokio::test]
    async fn test_reading_next_chapter_refreshes_history() {
        let file = TempPath::new("next_chapter");
        let chapter = |n: u32| json!({"data": {"title": format!("Chapter {n}"), "comic_title": "One Piece", "images": ["1.jpg"]}});
        let upstream = StubUpstream::new()
            .with("/chapter/ch-1", chapter(1))
            .with("/chapter/ch-1/navigation", json!({"prev": null, "next": "ch-2"}))
            .with("/chapter/ch-2", chapter(2))
            .with("/chapter/ch-2/navigation", json!({"prev": "ch-1", "next": null}));
        let store = Store::open(file.path()).await;

        load_hash("#read/one-piece/ch-1", &upstream, &store).await.unwrap();
        load_hash("#read/one-piece/ch-2", &upstream, &store).await.unwrap();

        let data = store.snapshot().await;
        assert_eq!(data.history().len(), 1);
        assert_eq!(data.history()[0].episode_or_chapter_label, "Chapter 2");
        assert_eq!(data.history()[0].route, "#read/one-piece/ch-2");
    }

    #[tokio::test]
    async fn test_random_redirects_to_detail() {
        let upstream = StubUpstream::new().with(
            "/random",
            json!({"data": {"title": "Berserk", "link": "https://komiku.id/manga/berserk/"}}),
        );
        let file = TempPath::new("random");
        let store = Store::open(file.path()).await;
        let view = load_hash("#random", &upstream, &store).await.unwrap();
        assert_eq!(view.redirect.as_deref(), Some("#comic/berserk"));
    }

    #[tokio::test]
    async fn test_search_paths() {
        let upstream = StubUpstream::new().with("/search/solo%20leveling", json!({"results": []}));
        let file = TempPath::new("search");
        let store = Store::open(file.path()).await;

        let view = load_hash("#search", &upstream, &store).await.unwrap();
        assert!(view.html.contains("data-search"));
        assert!(upstream.requested().is_empty());

        let view = load_hash("#search/solo%20leveling", &upstream, &store).await.unwrap();
        assert_eq!(upstream.requested(), vec!["/search/solo%20leveling"]);
        assert!(view.html.contains("Tidak ada hasil"));
    }

    #[tokio::test]
    async fn test_browse_pagination_query() {
        let items: Vec<Value> = (0..3).map(|i| json!({"title": format!("t{i}"), "slug": format!("t{i}")})).collect();
        let upstream = StubUpstream::new().with(
            "/advanced-search?page=2",
            json!({"comics": items, "pagination": {"has_next_page": false}}),
        );
        let file = TempPath::new("browse");
        let store = Store::open(file.path()).await;
        let view = load_hash("#browse/2", &upstream, &store).await.unwrap();
        assert!(view.html.contains("#browse/1"));
        assert!(!view.html.contains("#browse/3"));
    }

    #[tokio::test]
    async fn test_realtime_failure_is_inline() {
        let file = TempPath::new("realtime");
        let store = Store::open(file.path()).await;
        let view = load_hash("#realtime", &StubUpstream::new(), &store).await.unwrap();
        assert!(view.html.contains("error-panel"));
        assert!(view.html.contains("data-realtime"));
    }

    #[tokio::test]
    async fn test_unknown_hash_renders_home() {
        let upstream = StubUpstream::new()
            .with("/home", json!({"comics": []}))
            .with("/popular", json!({"comics": []}));
        let file = TempPath::new("fallback");
        let store = Store::open(file.path()).await;
        let view = load_hash("#definitely/not/a/page", &upstream, &store).await.unwrap();
        assert_eq!(view.route, Route::Home);
    }
}
