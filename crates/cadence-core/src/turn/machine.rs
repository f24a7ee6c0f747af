//! Per-session turn state.

use super::{FinalizedMessage, TurnEnd, TurnState, TurnStats, TurnTransition};
use crate::error::{CadenceError, Result};
use crate::protocol::{AgentEvent, TokenUsage, TurnResult};
use std::collections::VecDeque;
use std::time::Instant;

/// What the machine did with an inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// The event belongs to the active turn, or arrived outside any turn.
    /// It should be forwarded; `transition` is set when it ended the turn.
    Current { transition: Option<TurnTransition> },
    /// The event belongs to a turn that already ended locally and was dropped.
    /// `accounting_changed` is set when a late `result` still updated cost or tokens.
    Stale {
        generation: u64,
        accounting_changed: bool,
    },
}

/// Where the subprocess is in its own output for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upstream {
    /// Records are still arriving for this generation.
    Open(u64),
    /// The final message stopped, or an error was reported. Trailing
    /// `result`, `usage` and `error` records still belong to it.
    Winding(u64),
    /// A `result` record closed it. Nothing more belongs to it.
    Closed(u64),
}

impl Upstream {
    fn generation(self) -> u64 {
        match self {
            Upstream::Open(g) | Upstream::Winding(g) | Upstream::Closed(g) => g,
        }
    }
}

/// Tracks idle/streaming/compacting for one session.
///
/// Every turn gets a generation id. Sent generations wait in `pending` until
/// the subprocess starts answering them; `upstream` is the generation whose
/// records are arriving. A `message_start` after a new send always opens the
/// newest pending generation, so a turn that ended without a `result` record
/// (or was interrupted) never captures the next turn's output. An event whose
/// generation is not the active one is stale.
#[derive(Debug)]
pub struct TurnStateMachine {
    session_id: String,
    state: TurnState,
    next_generation: u64,
    active: Option<u64>,
    pending: VecDeque<u64>,
    upstream: Option<Upstream>,
    stop_reason: Option<String>,
    text: String,
    interrupted: bool,
    started_at: Option<Instant>,
    stats: TurnStats,
}

impl TurnStateMachine {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::with_stats(session_id, TurnStats::default())
    }

    /// Restores cumulative counters of a persisted session. State is Idle.
    pub fn with_stats(session_id: impl Into<String>, stats: TurnStats) -> Self {
        Self {
            session_id: session_id.into(),
            state: TurnState::Idle,
            next_generation: 1,
            active: None,
            pending: VecDeque::new(),
            upstream: None,
            stop_reason: None,
            text: String::new(),
            interrupted: false,
            started_at: None,
            stats,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Whether the most recent turn was ended by an explicit interrupt.
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn active_generation(&self) -> Option<u64> {
        self.active
    }

    pub fn stats(&self) -> &TurnStats {
        &self.stats
    }

    /// Text streamed so far in the active turn.
    pub fn buffered_text(&self) -> &str {
        &self.text
    }

    /// Starts a streaming turn. Only valid from Idle.
    pub fn begin_turn(&mut self) -> Result<u64> {
        self.begin(TurnState::Streaming)
    }

    /// Starts compaction. Only valid from Idle; never queued.
    pub fn begin_compaction(&mut self) -> Result<u64> {
        self.begin(TurnState::Compacting)
    }

    fn begin(&mut self, next: TurnState) -> Result<u64> {
        if self.state != TurnState::Idle {
            return Err(CadenceError::busy(&self.session_id, self.state));
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.active = Some(generation);
        self.pending.push_back(generation);
        self.state = next;
        self.interrupted = false;
        self.text.clear();
        self.started_at = Some(Instant::now());

        tracing::debug!(
            "[Turn] {} -> {} (generation {})",
            self.session_id,
            next,
            generation
        );
        Ok(generation)
    }

    /// Rolls back a turn whose outbound write never reached the subprocess.
    ///
    /// No accounting is recorded and the interrupt flag is left alone.
    pub fn abort(&mut self, generation: u64) {
        if self.active != Some(generation) {
            return;
        }
        self.pending.retain(|g| *g != generation);
        self.active = None;
        self.state = TurnState::Idle;
        self.text.clear();
        self.started_at = None;
        tracing::debug!("[Turn] {} aborted generation {}", self.session_id, generation);
    }

    /// Ends the active turn locally without waiting for the subprocess.
    ///
    /// Returns `None` when there was nothing to interrupt.
    pub fn interrupt(&mut self) -> Option<TurnTransition> {
        if self.state == TurnState::Idle {
            return None;
        }
        self.interrupted = true;
        Some(self.finish(TurnEnd::Interrupted, None))
    }

    /// Ends the active turn because the subprocess went away.
    ///
    /// Nothing further will arrive for sent generations, so they are
    /// forgotten.
    pub fn fail(&mut self, reason: impl Into<String>) -> Option<TurnTransition> {
        self.pending.clear();
        self.upstream = None;
        self.stop_reason = None;
        if self.state == TurnState::Idle {
            return None;
        }
        Some(self.finish(TurnEnd::Failed(reason.into()), None))
    }

    /// Applies one inbound event in arrival order.
    pub fn apply(&mut self, event: &AgentEvent) -> Disposition {
        let tag = self.attribute(event);
        let final_stop = matches!(event, AgentEvent::MessageStop { .. }) && self.stop_is_final();

        if let Some(generation) = tag {
            if self.active != Some(generation) {
                let accounting_changed = match event {
                    AgentEvent::Result(result) => self.record_accounting(result),
                    _ => false,
                };
                tracing::debug!(
                    "[Turn] {} dropping stale {} from generation {}",
                    self.session_id,
                    event.name(),
                    generation
                );
                return Disposition::Stale {
                    generation,
                    accounting_changed,
                };
            }
        }

        let transition = match event {
            AgentEvent::TextDelta { text, .. } if self.state == TurnState::Streaming => {
                self.text.push_str(text);
                None
            }
            AgentEvent::MessageStop { .. } if self.state == TurnState::Streaming && final_stop => {
                Some(self.finish(TurnEnd::Completed, None))
            }
            AgentEvent::Result(result) => {
                self.record_accounting(result);
                match self.state {
                    TurnState::Idle => None,
                    TurnState::Compacting => Some(self.finish(TurnEnd::Compacted, None)),
                    TurnState::Streaming if result.is_error => {
                        let message = result
                            .text
                            .clone()
                            .or_else(|| result.subtype.clone())
                            .unwrap_or_else(|| "agent reported an error".to_string());
                        Some(self.finish(TurnEnd::Failed(message), None))
                    }
                    TurnState::Streaming => {
                        Some(self.finish(TurnEnd::Completed, result.text.as_deref()))
                    }
                }
            }
            AgentEvent::Error { message, .. } if self.state != TurnState::Idle => {
                Some(self.finish(TurnEnd::Failed(message.clone()), None))
            }
            AgentEvent::CompactBoundary if self.state == TurnState::Compacting => {
                Some(self.finish(TurnEnd::Compacted, None))
            }
            _ => None,
        };

        Disposition::Current { transition }
    }

    /// Finds the generation an inbound record belongs to and advances the
    /// subprocess-side view of that generation.
    ///
    /// `None` means the record is not part of any turn (session `init`, or
    /// output before anything was sent).
    fn attribute(&mut self, event: &AgentEvent) -> Option<u64> {
        if matches!(event, AgentEvent::SystemInit { .. }) {
            return None;
        }

        let starts_message = matches!(event, AgentEvent::MessageStart { .. });
        let continues = match self.upstream {
            Some(Upstream::Open(_)) => !starts_message || self.pending.is_empty(),
            Some(Upstream::Winding(_)) => event.is_trailing() || self.pending.is_empty(),
            Some(Upstream::Closed(_)) | None => self.pending.is_empty(),
        };

        if !continues {
            // A new message answers the newest send; anything else is the
            // first output of the oldest one.
            let next = if starts_message {
                let newest = self.pending.back().copied();
                self.pending.clear();
                newest
            } else {
                self.pending.pop_front()
            };
            if let Some(generation) = next {
                self.upstream = Some(Upstream::Open(generation));
                self.stop_reason = None;
            }
        }

        let generation = self.upstream.map(Upstream::generation)?;
        match event {
            AgentEvent::MessageStart { .. } => {
                self.stop_reason = None;
                self.upstream = Some(Upstream::Open(generation));
            }
            AgentEvent::MessageDelta {
                stop_reason: Some(reason),
                ..
            } => {
                self.stop_reason = Some(reason.clone());
            }
            AgentEvent::MessageStop { .. } if self.stop_is_final() => {
                self.upstream = Some(Upstream::Winding(generation));
            }
            AgentEvent::Error { .. } | AgentEvent::CompactBoundary
                if self.upstream == Some(Upstream::Open(generation)) =>
            {
                self.upstream = Some(Upstream::Winding(generation));
            }
            AgentEvent::Result(_) => {
                self.upstream = Some(Upstream::Closed(generation));
            }
            _ => {}
        }
        Some(generation)
    }

    /// A stop reason other than `tool_use` means the agent is done talking.
    fn stop_is_final(&self) -> bool {
        matches!(self.stop_reason.as_deref(), Some(reason) if reason != "tool_use")
    }

    /// Cost and tokens from a `result`. Stale turns are counted too.
    fn record_accounting(&mut self, result: &TurnResult) -> bool {
        let mut changed = false;
        if let Some(cost) = result.total_cost_usd.filter(|cost| *cost > 0.0) {
            self.stats.total_cost_usd += cost;
            changed = true;
        }
        if let Some(usage) = result.usage.filter(|usage| *usage != TokenUsage::default()) {
            self.stats.usage.add(usage);
            changed = true;
        }
        changed
    }

    fn finish(&mut self, end: TurnEnd, fallback_text: Option<&str>) -> TurnTransition {
        let generation = self.active.take().unwrap_or_default();
        let elapsed_ms = self
            .started_at
            .take()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let was_streaming = self.state == TurnState::Streaming;
        self.state = TurnState::Idle;

        let mut content = std::mem::take(&mut self.text);
        if content.is_empty() {
            if let Some(text) = fallback_text {
                content = text.to_string();
            }
        }
        let finalized = (was_streaming && !content.is_empty()).then(|| FinalizedMessage {
            content,
            interrupted: end == TurnEnd::Interrupted,
        });

        if end == TurnEnd::Completed {
            self.stats.turn_count += 1;
        }
        self.stats.last_elapsed_ms = Some(elapsed_ms);

        tracing::debug!(
            "[Turn] {} -> idle ({:?}, generation {}, {}ms)",
            self.session_id,
            end,
            generation,
            elapsed_ms
        );

        TurnTransition {
            generation,
            end,
            finalized,
            elapsed_ms,
        }
    }
}
