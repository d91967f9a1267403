//! 无限滚动信息流
//! 状态只有 Idle / Loading 两种; 加载中的重复触发直接拒绝

use crate::http_client::{HttpClientError, Upstream};
use crate::normalize::{normalize_list, scroll_info};
use crate::types::{FeedCursor, ListItem};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// 上游没有给续传数据时每页前进的条数
pub const FALLBACK_PAGE_SIZE: u64 = 20;

/// 距离页面底部多少像素时触发加载
pub const SCROLL_MARGIN_PX: f64 = 300.0;

/// 空闲超过该时长的会话会被清理 (标签页直接关闭时收不到 DELETE)
pub const FEED_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    Idle,
    Loading,
}

/// 一次被允许发出的翻页请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedRequest {
    pub offset: u64,
    pub batch_id: u64,
}

#[derive(Debug, Clone)]
pub struct Feed {
    cursor: FeedCursor,
    state: FeedState,
    last_used: Instant,
}

impl Default for Feed {
    fn default() -> Self {
        Self::new()
    }
}

impl Feed {
    pub fn new() -> Self {
        Self {
            cursor: FeedCursor::default(),
            state: FeedState::Idle,
            last_used: Instant::now(),
        }
    }

    pub fn cursor(&self) -> FeedCursor {
        self.cursor
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    /// Idle 且还有更多时进入 Loading 并返回请求参数，否则返回 None
    pub fn begin(&mut self) -> Option<FeedRequest> {
        if self.state == FeedState::Loading || !self.cursor.has_more {
            return None;
        }
        self.state = FeedState::Loading;
        self.last_used = Instant::now();
        Some(FeedRequest {
            offset: self.cursor.offset,
            batch_id: self.cursor.batch_id,
        })
    }

    /// 请求成功: 按 scroll_info 前进; 没有续传数据时固定前进一页并标记没有更多
    pub fn succeed(&mut self, body: &serde_json::Value) {
        self.state = FeedState::Idle;
        self.last_used = Instant::now();
        match scroll_info(body) {
            Some(info) => {
                self.cursor = FeedCursor {
                    offset: info.next_offset,
                    batch_id: info.batch_id.unwrap_or(self.cursor.batch_id),
                    has_more: info.has_more,
                };
            }
            None => {
                debug!("响应缺少 scroll_info, 进入降级模式");
                self.cursor = FeedCursor {
                    offset: self.cursor.offset.saturating_add(FALLBACK_PAGE_SIZE),
                    batch_id: self.cursor.batch_id,
                    has_more: false,
                };
            }
        }
    }

    /// 请求失败: 回到 Idle，游标不动
    pub fn fail(&mut self) {
        self.state = FeedState::Idle;
        self.last_used = Instant::now();
    }

    /// Loading 中的会话永远不算过期
    fn expired(&self, ttl: Duration) -> bool {
        self.state == FeedState::Idle && self.last_used.elapsed() >= ttl
    }
}

/// 视口底部是否已进入阈值范围
pub fn near_bottom(scroll_y: f64, viewport_height: f64, document_height: f64, margin: f64) -> bool {
    scroll_y + viewport_height >= document_height - margin
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("上一页仍在加载")]
    Busy,
    #[error("没有更多内容")]
    Exhausted,
    #[error("信息流已关闭")]
    Discarded,
    #[error(transparent)]
    Upstream(#[from] HttpClientError),
}

/// 一次翻页的结果
#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub items: Vec<ListItem>,
    pub cursor: FeedCursor,
}

/// 按会话保存的信息流，离开页面或空闲过久时丢弃
#[derive(Debug, Clone)]
pub struct FeedRegistry {
    feeds: Arc<Mutex<HashMap<String, Slot>>>,
    generation: Arc<AtomicU64>,
    idle_ttl: Duration,
}

/// 同名会话被丢弃后重建时 generation 不同，迟到的响应不会写进新会话
#[derive(Debug)]
struct Slot {
    generation: u64,
    feed: Feed,
}

impl Default for FeedRegistry {
    fn default() -> Self {
        Self::with_idle_ttl(FEED_IDLE_TTL)
    }
}

impl FeedRegistry {
    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            feeds: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            idle_ttl,
        }
    }

    /// 为会话加载下一页
    ///
    /// 锁只在状态切换时持有，网络请求期间同一会话处于 Loading，重复触发会得到 `Busy`。
    /// 请求期间会话被丢弃时结果作废，返回 `Discarded`。
    pub async fn next_page(&self, session: &str, upstream: &dyn Upstream) -> Result<FeedPage, FeedError> {
        let (generation, request) = {
            let mut feeds = self.feeds.lock().await;
            let before = feeds.len();
            feeds.retain(|_, slot| !slot.feed.expired(self.idle_ttl));
            if feeds.len() < before {
                debug!("清理 {} 个空闲信息流", before - feeds.len());
            }

            let slot = feeds.entry(session.to_string()).or_insert_with(|| Slot {
                generation: self.generation.fetch_add(1, Ordering::Relaxed),
                feed: Feed::new(),
            });
            match slot.feed.begin() {
                Some(request) => (slot.generation, request),
                None if slot.feed.state() == FeedState::Loading => return Err(FeedError::Busy),
                None => return Err(FeedError::Exhausted),
            }
        };

        let query = [
            ("offset", request.offset.to_string()),
            ("batch_id", request.batch_id.to_string()),
        ];
        let result = upstream.get_json("/scroll", &query).await;

        let mut feeds = self.feeds.lock().await;
        let Some(slot) = feeds.get_mut(session).filter(|slot| slot.generation == generation) else {
            debug!("信息流 {} 已丢弃, 忽略迟到的响应", session);
            return Err(FeedError::Discarded);
        };
        let feed = &mut slot.feed;
        match result {
            Ok(body) => {
                feed.succeed(&body);
                let items = normalize_list(&body);
                info!("📜 信息流 {} 追加 {} 条, 游标 {:?}", session, items.len(), feed.cursor());
                Ok(FeedPage {
                    items,
                    cursor: feed.cursor(),
                })
            }
            Err(e) => {
                feed.fail();
                Err(FeedError::Upstream(e))
            }
        }
    }

    pub async fn discard(&self, session: &str) -> bool {
        self.feeds.lock().await.remove(session).is_some()
    }

    #[cfg(test)]
    pub async fn state_of(&self, session: &str) -> Option<FeedState> {
        self.feeds.lock().await.get(session).map(|slot| slot.feed.state())
    }
}
