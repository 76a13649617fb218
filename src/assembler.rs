//! Streaming tool-call assembler (C5): buffers incremental tool-call
//! argument JSON keyed by content-block index and emits each call's parsed
//! arguments exactly once (invariant I5) — as soon as an `ArgDelta` first
//! makes the buffer parseable, or at `Stop` if it never does.

use rustc_hash::FxHashMap;

use crate::canonical::ToolCall;

/// A fragment stream from an adapter, before translation into a
/// [`ToolCall`]. Adapters drive the assembler with these as they decode
/// provider SSE/NDJSON events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockEvent {
    Start {
        index: u32,
        id: String,
        name: String,
        /// Non-streaming providers (Gemini, Ollama) hand over the whole
        /// arguments object at once instead of incremental deltas.
        initial_input: Option<serde_json::Value>,
    },
    ArgDelta {
        index: u32,
        fragment: String,
    },
    Stop {
        index: u32,
    },
}

/// Bound on how large one call's argument buffer may grow. A fragment that
/// would exceed this is dropped silently; the call is still surfaced at
/// `Stop` with `arguments: None` rather than treated as a parse error.
pub const MAX_ARG_BUFFER: usize = 200_000;

struct Accumulator {
    id: String,
    name: String,
    partial_json: String,
    initial_input: Option<serde_json::Value>,
    overflowed: bool,
    yielded: bool,
}

/// Drives tool-call assembly for one `stream_chat` call. Not shared across
/// calls; owned by the single task decoding that stream.
#[derive(Default)]
pub struct ToolCallAssembler {
    blocks: FxHashMap<u32, Accumulator>,
}

impl ToolCallAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one block event. `Start` never emits. `ArgDelta` emits as soon as
    /// the accumulated JSON first becomes parseable — lower latency than
    /// waiting for `Stop` when the body completes early — and never again
    /// for that index afterward. `Stop` emits only if the index hasn't
    /// already yielded via an `ArgDelta`.
    pub fn feed(&mut self, event: BlockEvent) -> Option<ToolCall> {
        match event {
            BlockEvent::Start {
                index,
                id,
                name,
                initial_input,
            } => {
                self.blocks.insert(
                    index,
                    Accumulator {
                        id,
                        name,
                        partial_json: String::new(),
                        initial_input,
                        overflowed: false,
                        yielded: false,
                    },
                );
                None
            }
            BlockEvent::ArgDelta { index, fragment } => {
                let acc = self.blocks.get_mut(&index)?;
                if acc.yielded || acc.overflowed {
                    return None;
                }
                if acc.partial_json.len() + fragment.len() > MAX_ARG_BUFFER {
                    acc.overflowed = true;
                    return None;
                }
                acc.partial_json.push_str(&fragment);
                let Ok(value) = serde_json::from_str::<serde_json::Value>(acc.partial_json.trim()) else {
                    return None;
                };
                acc.yielded = true;
                Some(ToolCall {
                    id: acc.id.clone(),
                    name: acc.name.clone(),
                    arguments: Some(value),
                })
            }
            BlockEvent::Stop { index } => {
                let acc = self.blocks.remove(&index)?;
                if acc.yielded {
                    return None;
                }
                let arguments = if acc.overflowed {
                    None
                } else if let Ok(value) = serde_json::from_str::<serde_json::Value>(acc.partial_json.trim()) {
                    Some(value)
                } else {
                    acc.initial_input.clone()
                };
                Some(ToolCall {
                    id: acc.id,
                    name: acc.name,
                    arguments,
                })
            }
        }
    }

    /// True once every opened block has been stopped.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Finalize every still-open block at once. Some providers (OpenAI Chat
    /// Completions) signal tool-call completion once at the message level
    /// (`finish_reason`) instead of per content-block, so there is no
    /// individual `Stop` event to feed; this flushes them all the same way
    /// `Stop` would, one at a time, preserving index order.
    pub fn drain_all(&mut self) -> Vec<ToolCall> {
        let mut indices: Vec<u32> = self.blocks.keys().copied().collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .filter_map(|index| self.feed(BlockEvent::Stop { index }))
            .collect()
    }
}
