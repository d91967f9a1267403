mod config;
mod error;
mod feed;
mod http_client;
mod normalize;
mod pages;
mod realtime;
mod render;
mod router;
mod store;
mod types;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::AppError;
use crate::feed::{near_bottom, FeedRegistry, SCROLL_MARGIN_PX};
use crate::http_client::{ApiClient, Upstream};
use crate::pages::ViewContext;
use crate::router::Route;
use crate::store::Store;
use crate::types::ItemKind;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: Arc<dyn Upstream>,
    pub store: Store,
    pub feeds: FeedRegistry,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = Config::from_env();
    let upstream = ApiClient::new(&config.api_base_url, config.http_timeout)?;
    let store = Store::open(config.data_path.clone()).await;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("🔗 上游 API: {}", config.api_base_url);
    info!("💾 数据文件: {}", config.data_path.display());

    let state = AppState {
        config: Arc::new(config),
        upstream: Arc::new(upstream),
        store,
        feeds: FeedRegistry::default(),
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🚀 漫画聚合站启动在 http://{}", addr);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// 路由
fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(index_handler))
        .route("/api", get(api_info_handler))
        .route("/health", get(health_handler))
        .route("/view", get(view_handler))
        .route("/feed/{session}/next", post(feed_next_handler))
        .route("/feed/{session}", delete(feed_discard_handler))
        .route("/history", get(history_handler).delete(history_clear_handler))
        .route("/theme", get(theme_handler))
        .route("/theme/toggle", post(theme_toggle_handler))
        .route("/realtime/stream", get(realtime_stream_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - 前端外壳页面
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /api - 接口信息
async fn api_info_handler() -> impl IntoResponse {
    Json(json!({
        "name": "Comic Portal",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /view?hash=": "按哈希路由渲染页面",
            "POST /feed/{session}/next": "无限滚动加载下一页 (?scroll_y=&viewport=&document=)",
            "DELETE /feed/{session}": "离开页面时丢弃游标",
            "GET /history": "观看/阅读历史",
            "DELETE /history": "清空历史",
            "GET /theme": "当前主题",
            "POST /theme/toggle": "切换主题",
            "GET /realtime/stream": "放送表推送 (每行一个 JSON)",
            "GET /health": "健康检查"
        },
        "routes": [
            "#home", "#search", "#search/<query>", "#genres", "#genre/<slug>", "#browse/<page>",
            "#trending", "#random", "#stats", "#infinite", "#realtime", "#history",
            "#comic/<slug>", "#read/<comic>/<chapter>", "#anime/<slug>", "#episode/<slug>"
        ]
    }))
}

/// 健康检查
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[derive(Debug, Deserialize)]
struct ViewQuery {
    #[serde(default)]
    hash: String,
}

/// GET /view?hash=#comic/one-piece
async fn view_handler(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<Response, AppError> {
    let route = Route::parse(&query.hash);
    let ctx = ViewContext {
        upstream: state.upstream.as_ref(),
        store: &state.store,
    };

    let view = pages::load(&route, &ctx)
        .await
        .map_err(|e| AppError::from_page(e, state.config.error_banner_ms))?;
    Ok(Json(view).into_response())
}

/// 前端上报的滚动位置，缺省时视为已到底部 (例如点击 "加载更多")
#[derive(Debug, Deserialize)]
struct ScrollQuery {
    scroll_y: Option<f64>,
    viewport: Option<f64>,
    document: Option<f64>,
}

/// POST /feed/{session}/next
async fn feed_next_handler(
    State(state): State<AppState>,
    Path(session): Path<String>,
    Query(scroll): Query<ScrollQuery>,
) -> Result<Response, AppError> {
    if let (Some(y), Some(viewport), Some(document)) = (scroll.scroll_y, scroll.viewport, scroll.document) {
        if !near_bottom(y, viewport, document, SCROLL_MARGIN_PX) {
            return Ok(StatusCode::NO_CONTENT.into_response());
        }
    }

    let page = state
        .feeds
        .next_page(&session, state.upstream.as_ref())
        .await
        .map_err(|e| AppError::from_feed(e, state.config.error_banner_ms))?;

    Ok(Json(json!({
        "html": render::render_feed_items(&page.items, ItemKind::Comic),
        "count": page.items.len(),
        "cursor": page.cursor,
    }))
    .into_response())
}

/// DELETE /feed/{session}
async fn feed_discard_handler(State(state): State<AppState>, Path(session): Path<String>) -> StatusCode {
    state.feeds.discard(&session).await;
    StatusCode::NO_CONTENT
}

async fn history_handler(State(state): State<AppState>) -> impl IntoResponse {
    let data = state.store.snapshot().await;
    Json(json!({ "history": data.history() }))
}

async fn history_clear_handler(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state
        .store
        .update(|data| data.history.clear())
        .await
        .map_err(|e| AppError::from_store(e, state.config.error_banner_ms))?;
    info!("🧹 历史记录已清空");
    Ok(StatusCode::NO_CONTENT)
}

async fn theme_handler(State(state): State<AppState>) -> impl IntoResponse {
    let data = state.store.snapshot().await;
    Json(json!({ "theme": data.theme }))
}

async fn theme_toggle_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let theme = state
        .store
        .update(|data| data.toggle_theme())
        .await
        .map_err(|e| AppError::from_store(e, state.config.error_banner_ms))?;
    Ok(Json(json!({ "theme": theme })))
}

/// GET /realtime/stream - 放送表推送
async fn realtime_stream_handler(State(state): State<AppState>) -> Response {
    let stream = realtime::schedule_stream(
        state.upstream.clone(),
        state.store.clone(),
        state.config.notify,
        state.config.schedule_poll,
    );
    let body = Body::from_stream(stream.map(Ok::<_, std::convert::Infallible>));

    (
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="id">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Comic Portal</title>
  <style>
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body {
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
      background: #14141f;
      color: #e8e8e8;
      min-height: 100vh;
    }
    body[data-theme="light"] { background: #f5f5f7; color: #1d1d1f; }
    nav { display: flex; gap: 12px; padding: 14px 20px; flex-wrap: wrap; align-items: center; }
    nav a { color: inherit; text-decoration: none; opacity: .8; }
    nav a:hover { opacity: 1; }
    nav button { margin-left: auto; }
    main { max-width: 1100px; margin: 0 auto; padding: 20px; }
    h1, h2 { margin: 16px 0 10px; }
    .grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(150px, 1fr)); gap: 14px; }
    .slider { display: flex; gap: 14px; overflow-x: auto; padding-bottom: 8px; }
    .slider .card { min-width: 150px; }
    .card { display: block; cursor: pointer; color: inherit; text-decoration: none; }
    .card.disabled { cursor: default; opacity: .6; }
    .card img { width: 100%; aspect-ratio: 3/4; object-fit: cover; border-radius: 8px; background: #2a2a3a; }
    .card-title { font-weight: 600; margin-top: 6px; font-size: .95rem; }
    .card-meta { font-size: .8rem; opacity: .7; }
    .detail { display: flex; gap: 20px; flex-wrap: wrap; }
    .detail .poster { width: 220px; border-radius: 8px; }
    .detail .info { flex: 1; min-width: 260px; }
    .genre, .badge { display: inline-block; padding: 2px 10px; margin: 2px; border-radius: 12px; background: #c44dff33; }
    .chapter-list { list-style: none; margin-top: 16px; }
    .chapter { padding: 10px; border-bottom: 1px solid #ffffff14; cursor: pointer; }
    .chapter.disabled { cursor: default; opacity: .5; }
    .chapter .date { float: right; opacity: .6; }
    .reader img { display: block; width: 100%; max-width: 800px; margin: 0 auto; }
    .reader-nav, .pagination { display: flex; gap: 10px; justify-content: center; margin: 14px 0; align-items: center; }
    .history { list-style: none; }
    .history li { display: flex; gap: 12px; padding: 8px; cursor: pointer; }
    .history img { width: 48px; height: 64px; object-fit: cover; border-radius: 4px; }
    .player { width: 100%; aspect-ratio: 16/9; border: 0; }
    .empty, .feed-status, .loading { text-align: center; opacity: .7; padding: 30px; }
    .error-panel { padding: 16px; border-radius: 8px; background: #ff4d4d22; }
    #banner {
      position: fixed; top: 16px; left: 50%; transform: translateX(-50%);
      background: #ff4d4d; color: #fff; padding: 10px 18px; border-radius: 8px; display: none; z-index: 10;
    }
    button { padding: 6px 14px; border: none; border-radius: 6px; background: #c44dff; color: #fff; cursor: pointer; }
    button[disabled] { opacity: .4; cursor: default; }
    input[type="text"] { padding: 8px 12px; border-radius: 6px; border: 1px solid #555; min-width: 260px; }
    table { border-collapse: collapse; }
    td, th { padding: 6px 12px; text-align: left; }
  </style>
</head>
<body>
  <div id="banner"></div>
  <nav>
    <a href="#home">Home</a>
    <a href="#search">Search</a>
    <a href="#genres">Genres</a>
    <a href="#browse">Browse</a>
    <a href="#trending">Trending</a>
    <a href="#random">Random</a>
    <a href="#infinite">Infinite</a>
    <a href="#realtime">Jadwal</a>
    <a href="#history">Riwayat</a>
    <a href="#stats">Stats</a>
    <button id="theme-toggle">Tema</button>
  </nav>
  <main id="app"></main>
  <script>
    const app = document.getElementById('app');
    const banner = document.getElementById('banner');
    // 每次导航自增，晚到的旧响应直接丢弃
    let navSeq = 0;
    let feed = null;
    let realtime = null;

    function showBanner(message, ms) {
      banner.textContent = message;
      banner.style.display = 'block';
      clearTimeout(showBanner.timer);
      showBanner.timer = setTimeout(() => { banner.style.display = 'none'; }, ms || 3000);
    }

    function leavePage() {
      if (feed) {
        fetch('/feed/' + feed.id, { method: 'DELETE' });
        feed = null;
      }
      if (realtime) {
        realtime.abort();
        realtime = null;
      }
    }

    async function navigate() {
      const seq = ++navSeq;
      leavePage();
      app.innerHTML = '<div class="loading">Memuat...</div>';
      try {
        const res = await fetch('/view?hash=' + encodeURIComponent(location.hash || '#home'));
        const data = await res.json();
        if (seq !== navSeq) return;
        if (!res.ok) {
          app.innerHTML = '';
          showBanner(data.error, data.dismiss_after_ms);
          return;
        }
        if (data.redirect) {
          location.hash = data.redirect;
          return;
        }
        document.title = data.title + ' - Comic Portal';
        app.innerHTML = data.html;
        window.scrollTo(0, 0);
        enterPage(data.route.page);
      } catch (e) {
        if (seq === navSeq) showBanner('Gagal memuat: ' + e, 3000);
      }
    }

    function enterPage(page) {
      if (page === 'infinite') {
        feed = { id: Math.random().toString(36).slice(2), loading: false, done: false };
        loadMore(false);
      } else if (page === 'realtime') {
        watchSchedule();
      }
    }

    async function loadMore(fromScroll) {
      const current = feed;
      if (!current || current.loading || current.done) return;
      let url = '/feed/' + current.id + '/next';
      if (fromScroll) {
        url += '?scroll_y=' + window.scrollY + '&viewport=' + window.innerHeight +
          '&document=' + document.documentElement.scrollHeight;
      }
      current.loading = true;
      try {
        const res = await fetch(url, { method: 'POST' });
        if (feed !== current) return;
        const status = app.querySelector('[data-feed-status]');
        if (res.status === 204 || res.status === 409) return;
        if (res.status === 410) {
          current.done = true;
          if (status) status.textContent = 'Sudah habis';
          return;
        }
        const data = await res.json();
        if (!res.ok) {
          showBanner(data.error, data.dismiss_after_ms);
          return;
        }
        app.querySelector('[data-feed]').insertAdjacentHTML('beforeend', data.html);
        current.done = !data.cursor.hasMore;
        if (status) status.textContent = current.done ? 'Sudah habis' : '';
      } catch (e) {
        showBanner('Gagal memuat: ' + e, 3000);
      } finally {
        current.loading = false;
      }
    }

    async function watchSchedule() {
      const controller = new AbortController();
      realtime = controller;
      if ('Notification' in window && Notification.permission === 'default') {
        Notification.requestPermission();
      }
      try {
        const res = await fetch('/realtime/stream', { signal: controller.signal });
        const reader = res.body.getReader();
        const decoder = new TextDecoder();
        let partial = '';
        while (true) {
          const { done, value } = await reader.read();
          if (done) break;
          partial += decoder.decode(value, { stream: true });
          const lines = partial.split('\n');
          partial = lines.pop();
          for (const line of lines) {
            if (line.trim()) handleRealtime(JSON.parse(line));
          }
        }
      } catch (e) {
        // 离开页面时 abort
      }
    }

    function handleRealtime(event) {
      const target = app.querySelector('[data-realtime]');
      const status = app.querySelector('[data-realtime-status]');
      if (event.type === 'schedule' && target) {
        target.innerHTML = event.html;
        if (status) status.textContent = 'Diperbarui ' + new Date().toLocaleTimeString();
      } else if (event.type === 'new') {
        const titles = event.entries.map(e => e.title).join(', ');
        if ('Notification' in window && Notification.permission === 'granted') {
          new Notification('Rilis baru', { body: titles });
        }
      } else if (event.type === 'error') {
        showBanner(event.message, 3000);
      }
    }

    async function applyTheme() {
      try {
        const res = await fetch('/theme');
        const data = await res.json();
        document.body.dataset.theme = data.theme;
      } catch (e) {}
    }

    document.getElementById('theme-toggle').addEventListener('click', async () => {
      const res = await fetch('/theme/toggle', { method: 'POST' });
      if (res.ok) document.body.dataset.theme = (await res.json()).theme;
    });

    document.addEventListener('click', (e) => {
      const more = e.target.closest('[data-feed-more]');
      if (more) {
        loadMore(false);
        return;
      }
      const target = e.target.closest('[data-hash]');
      if (target && !target.disabled) location.hash = target.dataset.hash;
    });

    document.addEventListener('submit', (e) => {
      const form = e.target.closest('[data-search]');
      if (!form) return;
      e.preventDefault();
      const q = form.querySelector('input[name="q"]').value.trim();
      if (q) location.hash = '#search/' + encodeURIComponent(q);
    });

    window.addEventListener('scroll', () => { if (feed) loadMore(true); });
    window.addEventListener('hashchange', navigate);
    applyTheme();
    navigate();
  </script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::stub::StubUpstream;
    use crate::store::testing::TempPath;
    use axum::body::to_bytes;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    /// 返回的 TempPath 要活到测试结束
    async fn test_app(upstream: StubUpstream, name: &str) -> (Router, TempPath) {
        let file = TempPath::new(name);
        let state = AppState {
            config: Arc::new(Config::default()),
            upstream: Arc::new(upstream),
            store: Store::open(file.path()).await,
            feeds: FeedRegistry::default(),
        };
        (app(state), file)
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_view_renders_route() {
        let upstream = StubUpstream::new().with(
            "/comic/comic/one-piece",
            serde_json::json!({"title": "One Piece", "chapters": [{"slug": "ch-1"}]}),
        );
        let (app, _file) = test_app(upstream, "view").await;
        let (status, body) = send(app, "GET", "/view?hash=%23comic%2Fone-piece").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["route"]["page"], "comic");
        assert_eq!(body["title"], "One Piece");
        assert!(body["html"].as_str().unwrap().contains("#read/one-piece/ch-1"));
    }

    #[tokio::test]
    async fn test_upstream_failure_returns_banner_payload() {
        let (app, _file) = test_app(StubUpstream::new(), "fail").await;
        let (status, body) = send(app, "GET", "/view?hash=%23trending").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["dismiss_after_ms"], 3000);
        assert!(body["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_feed_advances_then_exhausts() {
        let upstream = StubUpstream::new().with(
            "/scroll?offset=0&batch_id=0",
            serde_json::json!({"comics": [{"title": "A", "slug": "a"}]}),
        );
        let (app, _file) = test_app(upstream, "feed").await;

        let (status, body) = send(app.clone(), "POST", "/feed/s1/next").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["cursor"]["hasMore"], false);
        assert_eq!(body["cursor"]["offset"], 20);

        let (status, _) = send(app.clone(), "POST", "/feed/s1/next").await;
        assert_eq!(status, StatusCode::GONE);

        let (status, _) = send(app, "POST", "/feed/s2/next?scroll_y=0&viewport=800&document=5000").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_theme_toggle_persists() {
        let (app, _file) = test_app(StubUpstream::new(), "theme").await;
        let (_, body) = send(app.clone(), "GET", "/theme").await;
        assert_eq!(body["theme"], "dark");
        let (status, body) = send(app.clone(), "POST", "/theme/toggle").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["theme"], "light");
        let (_, body) = send(app, "GET", "/theme").await;
        assert_eq!(body["theme"], "light");
    }

    #[tokio::test]
    async fn test_view_last_browse_page() {
        let upstream = StubUpstream::new().with(
            "/advanced-search?page=4294967295",
            serde_json::json!({"comics": [], "pagination": {"has_next_page": true}}),
        );
        let (app, _file) = test_app(upstream, "browse_max").await;
        let (status, body) = send(app, "GET", "/view?hash=%23browse%2F4294967295").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["route"]["page"], "browse");
        assert_eq!(body["route"]["number"], u32::MAX);
        assert!(!body["html"].as_str().unwrap().contains("#browse/0"));
    }
}
