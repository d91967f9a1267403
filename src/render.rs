//! HTML 片段渲染
//! 每次加载整体替换容器内容，不做 diff

use crate::router::Route;
use crate::types::{ChapterPages, Detail, EpisodeView, HistoryEntry, ItemKind, ListItem, ScheduleEntry};
use std::fmt::Write;

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// 条目详情路由
pub fn detail_route(kind: ItemKind, slug: &str) -> Route {
    match kind {
        ItemKind::Comic => Route::Comic { slug: slug.to_string() },
        ItemKind::Anime => Route::Anime { slug: slug.to_string() },
    }
}

/// 章节/剧集路由，漫画章节需要同时带上漫画 slug
pub fn chapter_route(kind: ItemKind, series: &str, chapter: &str) -> Route {
    match kind {
        ItemKind::Comic => Route::Read {
            comic: series.to_string(),
            chapter: chapter.to_string(),
        },
        ItemKind::Anime => Route::Episode { slug: chapter.to_string() },
    }
}

/// 卡片第二行: 类型 + 章节/集数
pub fn secondary_line(item: &ListItem, kind: ItemKind) -> String {
    let count = item.count_label.as_deref().map(|label| {
        if label.chars().all(|c| c.is_ascii_digit()) {
            match kind {
                ItemKind::Comic => format!("Ch. {label}"),
                ItemKind::Anime => format!("Ep. {label}"),
            }
        } else {
            label.to_string()
        }
    });

    [item.item_type.clone(), count]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" • ")
}

/// 单张卡片; 没有 slug 时退回外链，连外链都没有则不可点击
pub fn render_card(item: &ListItem, kind: ItemKind) -> String {
    let body = format!(
        r#"<img src="{img}" alt="{title}" loading="lazy"><div class="card-title">{title}</div><div class="card-meta">{meta}</div>"#,
        img = escape_html(&item.image),
        title = escape_html(&item.title),
        meta = escape_html(&secondary_line(item, kind)),
    );

    match (&item.slug, &item.link) {
        (Some(slug), _) => format!(
            r#"<div class="card" data-hash="{}">{}</div>"#,
            escape_html(&detail_route(kind, slug).to_hash()),
            body
        ),
        (None, Some(link)) => format!(
            r#"<a class="card external" href="{}" target="_blank" rel="noopener">{}</a>"#,
            escape_html(link),
            body
        ),
        (None, None) => format!(r#"<div class="card disabled">{}</div>"#, body),
    }
}

fn render_cards(items: &[ListItem], kind: ItemKind) -> String {
    items.iter().map(|item| render_card(item, kind)).collect()
}

pub fn render_grid(items: &[ListItem], kind: ItemKind) -> String {
    if items.is_empty() {
        return render_empty("Tidak ada hasil");
    }
    format!(r#"<div class="grid">{}</div>"#, render_cards(items, kind))
}

pub fn render_slider(items: &[ListItem], kind: ItemKind) -> String {
    format!(r#"<div class="slider">{}</div>"#, render_cards(items, kind))
}

/// 无限滚动追加用的卡片片段 (不带容器)
pub fn render_feed_items(items: &[ListItem], kind: ItemKind) -> String {
    render_cards(items, kind)
}

pub fn render_section(heading: &str, inner: &str) -> String {
    format!(
        r#"<section><h2>{}</h2>{}</section>"#,
        escape_html(heading),
        inner
    )
}

pub fn render_empty(message: &str) -> String {
    format!(r#"<div class="empty">{}</div>"#, escape_html(message))
}

/// 内联错误面板
pub fn render_error_panel(message: &str) -> String {
    format!(
        r#"<div class="error-panel">Gagal memuat: {}</div>"#,
        escape_html(message)
    )
}

pub fn render_detail(detail: &Detail, kind: ItemKind, series_slug: &str) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        r#"<div class="detail"><img class="poster" src="{}" alt="{}"><div class="info"><h1>{}</h1>"#,
        escape_html(&detail.image),
        escape_html(&detail.title),
        escape_html(&detail.title),
    );
    if let Some(item_type) = &detail.item_type {
        let _ = write!(html, r#"<span class="badge">{}</span>"#, escape_html(item_type));
    }
    if !detail.genres.is_empty() {
        html.push_str(r#"<div class="genres">"#);
        for genre in &detail.genres {
            let _ = write!(html, r#"<span class="genre">{}</span>"#, escape_html(genre));
        }
        html.push_str("</div>");
    }
    let _ = write!(html, r#"<p class="synopsis">{}</p></div></div>"#, escape_html(&detail.synopsis));

    html.push_str(r#"<ul class="chapter-list">"#);
    for chapter in &detail.chapters {
        let date = chapter
            .date
            .as_deref()
            .map(|d| format!(r#"<span class="date">{}</span>"#, escape_html(d)))
            .unwrap_or_default();
        match &chapter.slug {
            Some(slug) => {
                let _ = write!(
                    html,
                    r#"<li class="chapter" data-hash="{}">{}{}</li>"#,
                    escape_html(&chapter_route(kind, series_slug, slug).to_hash()),
                    escape_html(&chapter.title),
                    date
                );
            }
            None => {
                let _ = write!(
                    html,
                    r#"<li class="chapter disabled">{}{}</li>"#,
                    escape_html(&chapter.title),
                    date
                );
            }
        }
    }
    html.push_str("</ul>");
    html
}

fn nav_button(label: &str, target: Option<Route>) -> String {
    match target {
        Some(route) => format!(
            r#"<button class="nav" data-hash="{}">{}</button>"#,
            escape_html(&route.to_hash()),
            label
        ),
        None => format!(r#"<button class="nav" disabled>{}</button>"#, label),
    }
}

pub fn render_reader(pages: &ChapterPages, comic: &str) -> String {
    let chapter_target = |slug: &Option<String>| {
        slug.as_deref().map(|s| chapter_route(ItemKind::Comic, comic, s))
    };
    let nav = format!(
        r#"<div class="reader-nav">{}{}{}</div>"#,
        nav_button("&larr; Prev", chapter_target(&pages.prev)),
        nav_button("Detail", Some(detail_route(ItemKind::Comic, comic))),
        nav_button("Next &rarr;", chapter_target(&pages.next)),
    );

    let mut html = format!(r#"<h1 class="reader-title">{}</h1>{}"#, escape_html(&pages.title), nav);
    html.push_str(r#"<div class="reader">"#);
    if pages.images.is_empty() {
        html.push_str(&render_empty("Gambar tidak tersedia"));
    }
    for (index, src) in pages.images.iter().enumerate() {
        let _ = write!(
            html,
            r#"<img src="{}" alt="Page {}" loading="lazy">"#,
            escape_html(src),
            index + 1
        );
    }
    html.push_str("</div>");
    html.push_str(&nav);
    html
}

pub fn render_episode(view: &EpisodeView) -> String {
    let episode_target = |slug: &Option<String>| slug.as_deref().map(|s| Route::Episode { slug: s.to_string() });
    let player = match &view.stream_url {
        Some(url) => format!(
            r#"<iframe class="player" src="{}" allowfullscreen></iframe>"#,
            escape_html(url)
        ),
        None => render_empty("Stream tidak tersedia"),
    };
    format!(
        r#"<h1>{}</h1>{}<div class="reader-nav">{}{}{}</div>"#,
        escape_html(&view.title),
        player,
        nav_button("&larr; Prev", episode_target(&view.prev)),
        nav_button(
            "Detail",
            view.series_slug.as_deref().map(|s| detail_route(ItemKind::Anime, s))
        ),
        nav_button("Next &rarr;", episode_target(&view.next)),
    )
}

pub fn render_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return render_empty("Belum ada riwayat");
    }
    let mut html = String::from(r#"<ul class="history">"#);
    for entry in entries {
        let _ = write!(
            html,
            r#"<li data-hash="{}"><img src="{}" alt=""><div><div class="card-title">{}</div><div class="card-meta">{} • {}</div></div></li>"#,
            escape_html(&entry.route),
            escape_html(&entry.poster_url),
            escape_html(&entry.title),
            escape_html(&entry.episode_or_chapter_label),
            entry.timestamp.format("%Y-%m-%d %H:%M"),
        );
    }
    html.push_str("</ul>");
    html
}

pub fn render_genres(genres: &[ListItem]) -> String {
    if genres.is_empty() {
        return render_empty("Genre tidak tersedia");
    }
    let mut html = String::from(r#"<div class="genre-list">"#);
    for genre in genres {
        match &genre.slug {
            Some(slug) => {
                let _ = write!(
                    html,
                    r#"<button class="genre" data-hash="{}">{}</button>"#,
                    escape_html(&Route::Genre { slug: slug.clone() }.to_hash()),
                    escape_html(&genre.title)
                );
            }
            None => {
                let _ = write!(html, r#"<span class="genre">{}</span>"#, escape_html(&genre.title));
            }
        }
    }
    html.push_str("</div>");
    html
}

pub fn render_search_form(query: Option<&str>) -> String {
    format!(
        r#"<form class="search-box" data-search><input type="text" name="q" value="{}" placeholder="Cari judul..."><button type="submit">Cari</button></form>"#,
        escape_html(query.unwrap_or_default())
    )
}

pub fn render_pagination(page: u32, has_next: bool) -> String {
    let prev = page.checked_sub(1).filter(|p| *p > 0).map(|number| Route::Browse { number });
    let next = page
        .checked_add(1)
        .filter(|_| has_next)
        .map(|number| Route::Browse { number });
    format!(
        r#"<div class="pagination">{}<span>Halaman {}</span>{}</div>"#,
        nav_button("&larr;", prev),
        page,
        nav_button("&rarr;", next)
    )
}

pub fn render_schedule(entries: &[ScheduleEntry]) -> String {
    if entries.is_empty() {
        return render_empty("Jadwal kosong");
    }
    let mut html = String::from(r#"<table class="schedule"><tbody>"#);
    for entry in entries {
        let title = match &entry.slug {
            Some(slug) => format!(
                r#"<a data-hash="{}">{}</a>"#,
                escape_html(&detail_route(ItemKind::Anime, slug).to_hash()),
                escape_html(&entry.title)
            ),
            None => escape_html(&entry.title),
        };
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(entry.day.as_deref().unwrap_or("-")),
            escape_html(entry.time.as_deref().unwrap_or("-")),
            title
        );
    }
    html.push_str("</tbody></table>");
    html
}

/// 无限滚动页面骨架，卡片由前端按会话追加
pub fn render_infinite_shell() -> String {
    r#"<div class="grid" data-feed></div><div class="feed-status" data-feed-status>Memuat...</div><button class="load-more" data-feed-more>Muat lagi</button>"#.to_string()
}

/// 实时放送页面骨架
pub fn render_realtime_shell(entries: &[ScheduleEntry]) -> String {
    format!(
        r#"<div data-realtime>{}</div><div class="feed-status" data-realtime-status></div>"#,
        render_schedule(entries)
    )
}
