//! Provider-agnostic LLM chat runtime.
//!
//! A caller builds a [`canonical::Message`] history and a set of
//! [`canonical::ToolDescriptor`]s once, then hands both to whichever
//! [`providers::Adapter`] the [`factory::ServiceFactory`] returns for the
//! target provider. Every adapter normalizes the history, converts tool
//! schemas, and streams back a uniform [`canonical::Event`] sequence —
//! including tool calls reassembled from incremental argument deltas by
//! [`assembler::ToolCallAssembler`] regardless of whether the wire provider
//! streams them incrementally or hands them over whole.

pub mod assembler;
pub mod cancel;
pub mod canonical;
pub mod config;
pub mod error;
pub mod factory;
pub mod normalize;
pub mod observability;
pub mod providers;
pub mod retry;
pub mod stream;
pub mod tools;

pub use canonical::{ChatOptions, Event, Message, ProviderTag, Role, ToolCall, ToolDescriptor};
pub use error::{CanonicalError, ErrorKind};
pub use factory::{Credential, ServiceFactory};
pub use providers::Adapter;
