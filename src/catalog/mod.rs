pub mod redis_catalog;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Serialize, Deserialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "head")]
    Head,
    #[serde(alias = "options")]
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Body,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in", alias = "location")]
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
    /// JSON-Schema-shaped description of the accepted value.
    #[serde(default = "any_schema")]
    pub schema: Value,
}

impl Parameter {
    /// Path placeholders cannot be omitted, whatever the definition says.
    pub fn is_required(&self) -> bool {
        self.required || self.location == ParameterLocation::Path
    }
}

fn any_schema() -> Value {
    json!({})
}

/// API 定义 (由外部导入流程写入目录，编译器只读)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDefinition {
    pub id: String,
    pub method: HttpMethod,
    /// Path template, e.g. `/items/{id}`.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Response schemas keyed by status code ("200", "404", ...).
    #[serde(default)]
    pub responses: BTreeMap<String, Value>,
}

impl ApiDefinition {
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// The lowest declared 2xx status and its schema.
    pub fn success_response(&self) -> Option<(u16, &Value)> {
        self.responses
            .iter()
            .filter_map(|(code, schema)| code.trim().parse::<u16>().ok().map(|c| (c, schema)))
            .filter(|(code, _)| (200..300).contains(code))
            .min_by_key(|(code, _)| *code)
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog backend error: {0}")]
    Backend(#[from] redis::RedisError),
    #[error("definition `{id}` could not be decoded: {source}")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("catalog lookup task failed: {0}")]
    Lookup(String),
}

/// Read-only lookup of API definitions by identifier.
#[async_trait]
pub trait ApiCatalog: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ApiDefinition>, CatalogError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    definitions: DashMap<String, ApiDefinition>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            definitions: DashMap::new(),
        }
    }

    pub fn from_definitions(definitions: impl IntoIterator<Item = ApiDefinition>) -> Self {
        let catalog = Self::new();
        for def in definitions {
            catalog.insert(def);
        }
        catalog
    }

    pub fn insert(&self, definition: ApiDefinition) {
        self.definitions.insert(definition.id.clone(), definition);
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[async_trait]
impl ApiCatalog for InMemoryCatalog {
    async fn get(&self, id: &str) -> Result<Option<ApiDefinition>, CatalogError> {
        Ok(self.definitions.get(id).map(|d| d.value().clone()))
    }
}
