use std::collections::HashSet;

use anyhow::{Result, anyhow};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::AgentErrorKind;
use crate::message::{ToolCallRequest, ToolCallResult};
use crate::registry::{CallerIdentity, ToolRegistry};

/// Execute one reconstructed tool call. Registry misses and tool failures are
/// both folded into an error-flagged result; this function never fails across
/// the component boundary.
pub async fn dispatch_tool_call(
    registry: &ToolRegistry,
    call: &ToolCallRequest,
    caller: &CallerIdentity,
) -> ToolCallResult {
    let Some(tool) = registry.get(&call.name) else {
        warn!(tool = %call.name, id = %call.id, "tool not found");
        return ToolCallResult::err(
            &call.id,
            AgentErrorKind::ToolNotFound(call.name.clone()).to_string(),
        );
    };
    debug!(tool = %call.name, id = %call.id, "dispatching tool call");
    match tool.call(call.args.clone(), caller).await {
        Ok(payload) => ToolCallResult::ok(&call.id, payload),
        Err(e) => {
            error!(tool = %call.name, id = %call.id, error = %e, "tool execution failed");
            ToolCallResult::err(&call.id, AgentErrorKind::ToolExecution(e.to_string()).to_string())
        }
    }
}

/// Barrier dispatch for one turn's pending calls: the N executions run
/// concurrently with no ordering guarantee among themselves, and this
/// function resolves only once results for all of them are in. Duplicate ids
/// are executed once; at most one execution per request id.
pub async fn dispatch_all(
    registry: &ToolRegistry,
    calls: &[ToolCallRequest],
    caller: &CallerIdentity,
    cancel: CancellationToken,
) -> Result<Vec<ToolCallResult>> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(calls.len());
    for call in calls {
        if seen.insert(call.id.as_str()) {
            unique.push(call);
        } else {
            warn!(id = %call.id, tool = %call.name, "duplicate tool call id; executing once");
        }
    }

    let futs = unique
        .iter()
        .map(|call| dispatch_tool_call(registry, call, caller));

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!("dispatch_all cancelled at barrier");
            Err(anyhow!(AgentErrorKind::Cancelled))
        }
        results = join_all(futs) => Ok(results),
    }
}
