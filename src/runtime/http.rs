use async_trait::async_trait;
use crate::catalog::HttpMethod;
use anyhow::{Result, anyhow};
use reqwest::Client;
use serde::{Serialize, Deserialize};
use serde_json::{Value, json};
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Path with placeholders already substituted.
    pub path: String,
    #[serde(default)]
    pub query: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 注入给生成工具的唯一副作用能力：发起一次 HTTP 调用
#[async_trait]
pub trait HttpCaller: Send + Sync + Debug {
    async fn call(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Calls a live service rooted at `base_url`.
#[derive(Debug)]
pub struct ReqwestCaller {
    client: Client,
    base_url: String,
}

impl ReqwestCaller {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl HttpCaller for ReqwestCaller {
    async fn call(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = request.method.as_str().parse::<reqwest::Method>()
            .map_err(|_| anyhow!("Invalid HTTP method: {}", request.method))?;
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self.client.request(method, url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();

        // Non-JSON bodies are kept as text so a failing step still shows what came back
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok(HttpResponse { status, body })
    }
}

fn default_status() -> u16 {
    200
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub body: Value,
    /// Artificial latency, for exercising timeouts.
    #[serde(default)]
    pub delay_ms: u64,
}

/// Canned responses keyed by method and exact path. Unknown routes answer 404.
///
/// Clones share the request log; use [`RouteTable::fresh`] to get an
/// independent copy for another isolated context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteTable {
    routes: Vec<Route>,
    #[serde(skip)]
    log: Arc<Mutex<Vec<HttpRequest>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, method: HttpMethod, path: &str, status: u16, body: Value) -> Self {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            status,
            body,
            delay_ms: 0,
        });
        self
    }

    /// Delays the most recently added route.
    pub fn delayed(mut self, delay: Duration) -> Self {
        if let Some(route) = self.routes.last_mut() {
            route.delay_ms = delay.as_millis() as u64;
        }
        self
    }

    /// Same routes, empty request log.
    pub fn fresh(&self) -> Self {
        Self {
            routes: self.routes.clone(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HttpCaller for RouteTable {
    async fn call(&self, request: HttpRequest) -> Result<HttpResponse> {
        if let Ok(mut log) = self.log.lock() {
            log.push(request.clone());
        }

        let route = self
            .routes
            .iter()
            .find(|r| r.method == request.method && r.path == request.path);

        match route {
            Some(route) => {
                if route.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(route.delay_ms)).await;
                }
                Ok(HttpResponse {
                    status: route.status,
                    body: route.body.clone(),
                })
            }
            None => Ok(HttpResponse {
                status: 404,
                body: json!({ "error": format!("no route for {} {}", request.method, request.path) }),
            }),
        }
    }
}
