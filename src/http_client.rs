use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36 (ComicPortal)";

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("请求超时")]
    Timeout,
    #[error("请求失败: {0}")]
    RequestFailed(String),
    #[error("响应异常状态码: {0}")]
    BadStatus(u16),
    #[error("响应不是合法 JSON: {0}")]
    InvalidJson(String),
    #[error("无效的请求地址: {0}")]
    InvalidUrl(String),
}

/// 上游 REST API
///
/// 页面加载器只依赖这个 trait，测试里用内存桩替换真实网络。
#[async_trait]
pub trait Upstream: Send + Sync {
    /// 单次 GET 请求并把响应体解析为 JSON
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, HttpClientError>;
}

/// 基于 reqwest 的上游客户端
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, HttpClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| HttpClientError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 拼接基础地址、路径与查询参数
    pub fn build_url(&self, path: &str, query: &[(&str, String)]) -> Result<url::Url, HttpClientError> {
        let path = path.trim_start_matches('/');
        let mut url = url::Url::parse(&format!("{}/{}", self.base_url, path))
            .map_err(|e| HttpClientError::InvalidUrl(e.to_string()))?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl Upstream for ApiClient {
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, HttpClientError> {
        let url = self.build_url(path, query)?;
        debug!("上游请求: {}", url);

        let response = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .header("Accept-Language", "id-ID,id;q=0.9,en;q=0.8")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HttpClientError::Timeout
                } else {
                    HttpClientError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            warn!("上游 {} 返回 {}", url.path(), response.status());
            return Err(HttpClientError::BadStatus(response.status().as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| HttpClientError::RequestFailed(e.to_string()))?;

        serde_json::from_slice(&body).map_err(|e| HttpClientError::InvalidJson(e.to_string()))
    }
}

/// 路径片段编码，slug 和搜索词拼进路径前都要经过这里
pub fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// 测试用的内存上游: 按路径返回预设 JSON，并记录请求过的路径
#[cfg(test)]
pub mod stub {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct StubUpstream {
        responses: HashMap<String, Value>,
        requested: Mutex<Vec<String>>,
    }

    impl StubUpstream {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, path: &str, body: Value) -> Self {
            self.responses.insert(path.to_string(), body);
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Upstream for StubUpstream {
        async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, HttpClientError> {
            let key = if query.is_empty() {
                path.to_string()
            } else {
                let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
                format!("{}?{}", path, pairs.join("&"))
            };
            self.requested.lock().unwrap().push(key.clone());
            self.responses
                .get(&key)
                .cloned()
                .ok_or(HttpClientError::BadStatus(404))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        let client = ApiClient::new("https://api.example.com/api/", Duration::from_secs(1)).unwrap();

        let url = client.build_url("/comic/comic/one-piece", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/api/comic/comic/one-piece");

        let url = client
            .build_url("scroll", &[("offset", "20".to_string()), ("batch_id", "1".to_string())])
            .unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/api/scroll?offset=20&batch_id=1");
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("one piece"), "one%20piece");
        assert_eq!(encode_segment("a/b"), "a%2Fb");
    }
}
