//! Cancellation primitive used throughout the runtime. Re-exported from
//! `tokio_util` rather than hand-rolled: it already gives child/parent
//! token relationships and an awaitable `cancelled()` future, which is
//! exactly what `stream_chat`'s suspension points need.

pub use tokio_util::sync::CancellationToken;
