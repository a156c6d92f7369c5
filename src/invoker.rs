use std::pin::Pin;

use anyhow::Result;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::message::Message;
use crate::registry::ToolSpec;
use crate::stream::StreamEvent;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// What one model invocation produced: either a finished message or an
/// ordered event stream terminated by `TurnEnd`.
pub enum ModelTurn {
    Complete(Message),
    Stream(EventStream),
}

impl ModelTurn {
    /// Wrap a fixed event sequence as a turn stream. Mostly useful for tests
    /// and replay.
    pub fn from_events(events: Vec<StreamEvent>) -> Self {
        ModelTurn::Stream(Box::pin(futures::stream::iter(
            events.into_iter().map(Ok),
        )))
    }
}

/// The model capability consumed by the orchestrator. Implementations own
/// transport, retries and provider wire formats; the loop only sees messages
/// and events. An invocation failure aborts the current turn, and the
/// orchestrator surfaces whatever was accumulated so far.
#[async_trait::async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(
        &self,
        messages: &[Message],
        system_prompt: &str,
        tools: &[ToolSpec],
        cancel: CancellationToken,
    ) -> Result<ModelTurn>;
}
