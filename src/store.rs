//! 本地持久化
//! 历史记录、主题、放送表快照，整体存成一个 JSON 文件

use crate::types::{HistoryEntry, ScheduleEntry, Theme};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// 历史记录上限
pub const HISTORY_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("读写数据文件失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalData {
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub schedule_snapshot: Vec<ScheduleEntry>,
}

impl LocalData {
    /// 记录一次观看/阅读，返回是否新增或移动了条目
    ///
    /// 与最新一条 slug 相同时原地刷新 (章节、路由、时间)，长度不变; 已存在的同 slug 条目移到最前;
    /// 超过上限丢弃最旧的。
    pub fn record_history(&mut self, entry: HistoryEntry) -> bool {
        if let Some(head) = self.history.first_mut().filter(|head| head.slug == entry.slug) {
            *head = entry;
            return false;
        }

        self.history.retain(|e| e.slug != entry.slug);
        self.history.insert(0, entry);
        self.history.truncate(HISTORY_LIMIT);
        true
    }

    /// 最新的在前
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }

    /// 用新放送表替换快照，返回快照中原本没有的条目
    ///
    /// 第一次 (快照为空) 不算新增，避免启动时把整张表都当成通知。
    pub fn replace_schedule(&mut self, fresh: Vec<ScheduleEntry>) -> Vec<ScheduleEntry> {
        let added = if self.schedule_snapshot.is_empty() {
            Vec::new()
        } else {
            let known: HashSet<&str> = self.schedule_snapshot.iter().map(ScheduleEntry::key).collect();
            fresh
                .iter()
                .filter(|e| !known.contains(e.key()))
                .cloned()
                .collect()
        };
        self.schedule_snapshot = fresh;
        added
    }
}

/// 文件存储，内存中保留一份副本，每次修改后落盘
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    data: Arc<Mutex<LocalData>>,
}

impl Store {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = load_data(&path).await;
        debug!("已加载 {} 条历史记录", data.history.len());
        Self {
            path,
            data: Arc::new(Mutex::new(data)),
        }
    }

    pub async fn snapshot(&self) -> LocalData {
        self.data.lock().await.clone()
    }

    /// 在锁内修改副本，落盘成功后才替换内存中的数据
    pub async fn update<R>(&self, f: impl FnOnce(&mut LocalData) -> R) -> Result<R, StoreError> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let result = f(&mut next);
        persist_data(&self.path, &next).await?;
        *data = next;
        Ok(result)
    }
}

async fn load_data(path: &Path) -> LocalData {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("数据文件解析失败, 使用空数据: {err}");
                LocalData::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => LocalData::default(),
        Err(err) => {
            warn!("读取数据文件失败: {err}");
            LocalData::default()
        }
    }
}

async fn persist_data(path: &Path, data: &LocalData) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(data)?;
    fs::write(path, payload).await?;
    Ok(())
}
