//! 实时放送推送
//! 定时拉取放送表，与本地快照比对，新出现的条目作为通知事件推给前端

use crate::http_client::Upstream;
use crate::normalize::normalize_schedule;
use crate::render::render_schedule;
use crate::store::Store;
use crate::types::ScheduleEntry;
use futures::stream::Stream;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RealtimeEvent {
    /// 最新放送表 (已渲染)
    Schedule { total: usize, html: String },
    /// 快照中没有的新条目
    New { entries: Vec<ScheduleEntry> },
    Error { message: String },
}

/// 拉取一次并更新快照
///
/// 通知被禁用时仍然更新快照，只是不产生 `New` 事件。
pub async fn poll_schedule(upstream: &dyn Upstream, store: &Store, notify: bool) -> Vec<RealtimeEvent> {
    let body = match upstream.get_json("/schedule", &[]).await {
        Ok(body) => body,
        Err(e) => {
            warn!("拉取放送表失败: {}", e);
            return vec![RealtimeEvent::Error { message: e.to_string() }];
        }
    };

    let entries = normalize_schedule(&body);
    let mut events = vec![RealtimeEvent::Schedule {
        total: entries.len(),
        html: render_schedule(&entries),
    }];

    let added = match store.update(|data| data.replace_schedule(entries)).await {
        Ok(added) => added,
        Err(e) => {
            warn!("保存放送表快照失败: {}", e);
            Vec::new()
        }
    };

    if !added.is_empty() {
        info!("🔔 新增 {} 个放送条目", added.len());
        if notify {
            events.push(RealtimeEvent::New { entries: added });
        }
    }

    events
}

/// 事件流，前端断开后停止轮询
pub fn schedule_stream(
    upstream: Arc<dyn Upstream>,
    store: Store,
    notify: bool,
    interval: Duration,
) -> impl Stream<Item = String> {
    let (tx, rx) = mpsc::channel::<String>(16);

    tokio::spawn(async move {
        loop {
            for event in poll_schedule(upstream.as_ref(), &store, notify).await {
                if tx.send(format_event(&event)).await.is_err() {
                    debug!("实时连接已断开");
                    return;
                }
            }
            tokio::time::sleep(interval).await;
            if tx.is_closed() {
                return;
            }
        }
    });

    ReceiverStream::new(rx)
}

/// 一行一个 JSON 事件
fn format_event(event: &RealtimeEvent) -> String {
    format!("{}\n", serde_json::to_string(event).unwrap_or_default())
}
