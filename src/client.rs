// src/client.rs

use crate::{config::NetworkConfig, constants, error::*};
use anyhow::Context;
use reqwest::{IntoUrl, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde_json::Value;
use std::time::Duration;

/// 共享连接池的两个客户端视图：
/// `client` 带指数退避重试，只用于后台批量同步；
/// `once` 只尝试一次，用于页面请求的远程拉取和设备调用。
#[derive(Clone)]
pub struct RobustClient {
    pub client: ClientWithMiddleware,
    once: ClientWithMiddleware,
}

impl RobustClient {
    pub fn new(network: &NetworkConfig) -> AppResult<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(constants::USER_AGENT)
            .connect_timeout(Duration::from_secs(network.connect_timeout_secs.max(1)))
            .pool_max_idle_per_host(network.sync_workers.max(1) * 3)
            .build()
            .context("无法创建 HTTP 客户端")?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(network.max_retries);
        let client = ClientBuilder::new(inner.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        let once = ClientBuilder::new(inner).build();

        Ok(Self { client, once })
    }

    /// 单次尝试的客户端
    pub fn once(&self) -> &ClientWithMiddleware {
        &self.once
    }

    /// 按需选择是否带重试
    pub fn pick(&self, with_retry: bool) -> &ClientWithMiddleware {
        if with_retry { &self.client } else { &self.once }
    }

    /// 单次 GET 并解析 JSON；非 2xx 视为错误。
    pub async fn get_json<T: IntoUrl>(
        &self,
        url: T,
        query: &[(&str, &str)],
        timeout: Duration,
    ) -> AppResult<Value> {
        let res = self.once.get(url).query(query).timeout(timeout).send().await?;
        let res = res.error_for_status()?;
        Ok(res.json().await?)
    }

    /// 单次 GET，响应体能解析成 JSON 就返回 JSON，否则原样返回文本；非 2xx 视为错误。
    pub async fn get_value<T: IntoUrl>(
        &self,
        url: T,
        query: &[(&str, &str)],
        timeout: Duration,
    ) -> AppResult<Value> {
        let res = self.once.get(url).query(query).timeout(timeout).send().await?;
        let (_, value) = read_lenient(res).await?;
        Ok(value)
    }

    /// 单次 POST JSON，返回响应体 (可能不是 JSON)。
    pub async fn post_json<T: IntoUrl>(
        &self,
        url: T,
        body: &Value,
        timeout: Duration,
    ) -> AppResult<(StatusCode, Value)> {
        let res = self.once.post(url).json(body).timeout(timeout).send().await?;
        read_lenient(res).await
    }
}

async fn read_lenient(res: reqwest::Response) -> AppResult<(StatusCode, Value)> {
    let status = res.status();
    let res = res.error_for_status()?;
    let text = res.text().await?;
    let value = serde_json::from_str(&text).unwrap_or(Value::String(text));
    Ok((status, value))
}
