use anyhow::{Result, anyhow};
use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dispatch::dispatch_all;
use crate::error::AgentErrorKind;
use crate::invoker::{ModelInvoker, ModelTurn};
use crate::message::Message;
use crate::registry::{CallerIdentity, ToolRegistry};
use crate::router::{Route, should_continue};
use crate::state::ConversationState;
use crate::stream::{StreamAccumulator, StreamEvent, TurnOutput};

pub const DEFAULT_MAX_TURNS: usize = 25;

/// Per-request configuration, passed explicitly into the run. There is no
/// ambient lookup: the system prompt, the caller identity and the turn cap
/// all live here, immutable for the duration of the request.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub system_prompt: String,
    pub caller: CallerIdentity,
    /// Upper bound on model turns for one request. The source loop had no
    /// bound; a tool that always triggers another call would spin forever.
    pub max_turns: usize,
    /// Optional live subscriber: every stream event is forwarded as it
    /// arrives, plus one `ToolResult` per dispatched call. Best-effort; a
    /// closed receiver never affects the run.
    pub events: Option<UnboundedSender<StreamEvent>>,
}

impl RequestConfig {
    pub fn new(system_prompt: impl Into<String>, caller: CallerIdentity) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            caller,
            max_turns: DEFAULT_MAX_TURNS,
            events: None,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_events(mut self, tx: UnboundedSender<StreamEvent>) -> Self {
        self.events = Some(tx);
        self
    }
}

/// What one request produced. `output` aggregates the whole run: every
/// turn's text concatenated and every reconstructed call with its dispatched
/// result. `error` is set when the run stopped early (model failure, turn
/// cap); `output` then holds the partial aggregation instead of being
/// discarded.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub output: TurnOutput,
    pub error: Option<AgentErrorKind>,
}

impl RunOutcome {
    fn done(output: TurnOutput) -> Self {
        Self {
            output,
            error: None,
        }
    }

    fn aborted(output: TurnOutput, error: AgentErrorKind) -> Self {
        Self {
            output,
            error: Some(error),
        }
    }
}

fn forward(events: &Option<UnboundedSender<StreamEvent>>, event: &StreamEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event.clone());
    }
}

/// Drive one request to completion: invoke the model, reassemble its turn,
/// append the assistant message, and either finalize or run the tool barrier
/// and loop. The state is exclusively owned by this run; cancellation aborts
/// cooperatively and persists nothing.
pub async fn run_request(
    invoker: &dyn ModelInvoker,
    registry: &ToolRegistry,
    cfg: &RequestConfig,
    state: &mut ConversationState,
    cancel: Option<CancellationToken>,
) -> Result<RunOutcome> {
    let cancel_token = cancel.unwrap_or_default();
    let specs = registry.specs();
    let mut turns = 0usize;
    // Run-level aggregate: text and calls from every turn, results folded in
    // after each barrier.
    let mut aggregate = TurnOutput::default();

    loop {
        turns += 1;
        debug!(turn = turns, messages = state.messages().len(), "agent loop turn");
        if turns > cfg.max_turns {
            warn!(max_turns = cfg.max_turns, "turn limit exceeded");
            return Ok(RunOutcome::aborted(
                aggregate,
                AgentErrorKind::TurnLimitExceeded(cfg.max_turns),
            ));
        }

        let turn = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                warn!("run_request cancelled before model invocation");
                return Err(anyhow!(AgentErrorKind::Cancelled));
            }
            res = invoker.invoke(
                state.messages(),
                &cfg.system_prompt,
                &specs,
                cancel_token.clone(),
            ) => {
                match res {
                    Ok(turn) => turn,
                    Err(e) => {
                        if e.downcast_ref::<AgentErrorKind>() == Some(&AgentErrorKind::Cancelled) {
                            return Err(e);
                        }
                        warn!(error = %e, "model invocation failed; returning partial output");
                        return Ok(RunOutcome::aborted(
                            aggregate,
                            AgentErrorKind::ModelInvocation(e.to_string()),
                        ));
                    }
                }
            }
        };

        let output = match turn {
            // Non-streaming path: the message is an already-finished turn.
            ModelTurn::Complete(msg) => TurnOutput::from_assistant(&msg.text, &msg.tool_calls),
            ModelTurn::Stream(events) => {
                match accumulate_stream(events, &cfg.events, &cancel_token).await {
                    Ok(output) => output,
                    Err(TurnAbort::Cancelled) => return Err(anyhow!(AgentErrorKind::Cancelled)),
                    Err(TurnAbort::Model { partial, detail }) => {
                        aggregate.merge(partial);
                        return Ok(RunOutcome::aborted(
                            aggregate,
                            AgentErrorKind::ModelInvocation(detail),
                        ));
                    }
                }
            }
        };

        // Arguments are fully assembled here; no tool was dispatched while
        // its fragment text was still streaming.
        state.append(Message::assistant(output.text.clone(), output.requests()));
        let requests = output.requests();
        aggregate.merge(output);

        match should_continue(state.last_message()) {
            Route::Done => return Ok(RunOutcome::done(aggregate)),
            Route::ToolsNeeded => {
                let results =
                    dispatch_all(registry, &requests, &cfg.caller, cancel_token.clone()).await?;
                for res in &results {
                    forward(
                        &cfg.events,
                        &StreamEvent::ToolResult {
                            id: res.id.clone(),
                            payload: res.payload.clone(),
                            error: res.error.clone(),
                        },
                    );
                    state.append(Message::tool(res.clone()));
                }
                aggregate.record_results(&results);
            }
        }
    }
}

enum TurnAbort {
    Cancelled,
    Model { partial: TurnOutput, detail: String },
}

/// Feed every event into a fresh accumulator, in arrival order, until
/// `TurnEnd`. A stream that ends without `TurnEnd` is finalized as-is; a
/// mid-stream error aborts the turn but surfaces the partial accumulation.
async fn accumulate_stream(
    mut events: crate::invoker::EventStream,
    subscriber: &Option<UnboundedSender<StreamEvent>>,
    cancel: &CancellationToken,
) -> Result<TurnOutput, TurnAbort> {
    let mut acc = StreamAccumulator::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("turn stream cancelled");
                return Err(TurnAbort::Cancelled);
            }
            ev = events.next() => ev,
        };
        match next {
            Some(Ok(event)) => {
                forward(subscriber, &event);
                acc.push(event);
                if acc.is_finished() {
                    return Ok(acc.finish());
                }
            }
            Some(Err(e)) => {
                if e.downcast_ref::<AgentErrorKind>() == Some(&AgentErrorKind::Cancelled) {
                    return Err(TurnAbort::Cancelled);
                }
                warn!(error = %e, "model stream failed mid-turn");
                return Err(TurnAbort::Model {
                    partial: acc.snapshot(),
                    detail: e.to_string(),
                });
            }
            None => {
                debug!("turn stream ended without turn_end event");
                return Ok(acc.finish());
            }
        }
    }
}

/// Convenience for the single-shot path: one user message on a fresh state.
pub async fn run_single_shot(
    invoker: &dyn ModelInvoker,
    registry: &ToolRegistry,
    cfg: &RequestConfig,
    user_text: &str,
    cancel: Option<CancellationToken>,
) -> Result<RunOutcome> {
    let mut state = ConversationState::from_messages(vec![Message::user(user_text)]);
    run_request(invoker, registry, cfg, &mut state, cancel).await
}
