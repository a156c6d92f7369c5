use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value, // JSON Schema object
}

/// Identity of the caller on whose behalf tools run. Passed explicitly into
/// every tool invocation; tools never capture it at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: Uuid,
}

impl CallerIdentity {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }
}

/// A named capability the model can request. `call` receives fully-parsed
/// args; any failure it returns is captured as an error-flagged result and
/// never crosses the dispatch boundary as an error.
///
/// Tools return a payload only, and never touch conversation state: the
/// calls of one turn run concurrently behind the barrier, so side-context
/// writes happen at the embedding boundary, via
/// [`ConversationState::set_context`](crate::state::ConversationState::set_context)
/// between runs.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    async fn call(&self, args: Value, caller: &CallerIdentity) -> Result<Value>;
}

/// Exact-name lookup from tool name to its spec and execution capability.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.spec().name;
        self.tools.insert(name, Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Specs for all registered tools, sorted by name so prompt rendering and
    /// provider payloads are stable.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}
