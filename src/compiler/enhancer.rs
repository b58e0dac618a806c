use async_trait::async_trait;
use crate::compiler::synthesizer::tool_name;
use crate::runtime::tool::GeneratedTool;
use anyhow::Result;
use serde::{Serialize, Deserialize};
use tracing::{info, warn};

/// The only part of a tool an enhancer may rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
}

/// 可选的后处理：只改写名称和描述，不参与正确性
#[async_trait]
pub trait MetadataEnhancer: Send + Sync {
    fn name(&self) -> &str;
    async fn enhance(&self, metadata: ToolMetadata, tool: &GeneratedTool) -> Result<ToolMetadata>;
}

impl GeneratedTool {
    pub fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

/// Applies an enhancer's name/description to `tool`. Failures and unusable
/// answers leave the tool as synthesized.
pub async fn apply(enhancer: &dyn MetadataEnhancer, mut tool: GeneratedTool) -> GeneratedTool {
    let original = tool.metadata();
    let enhanced = enhancer.enhance(original, &tool).await;
    match enhanced {
        Ok(meta) => {
            let name = tool_name(&meta.name);
            if name.is_empty() {
                warn!(enhancer = enhancer.name(), "Enhancer returned an empty name; keeping original metadata");
                return tool;
            }
            info!(enhancer = enhancer.name(), tool = %name, "Tool metadata enhanced");
            tool.name = name;
            if !meta.description.trim().is_empty() {
                tool.description = meta.description;
            }
            tool
        }
        Err(e) => {
            warn!(enhancer = enhancer.name(), error = ?e, "Enhancer failed; keeping original metadata");
            tool
        }
    }
}
