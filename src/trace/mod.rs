//! Tracing backend.
//!
//! # Data Flow
//! ```text
//! Tracer::next_span
//!     → current.rs (ambient parent on this thread, if any)
//!     → sampler.rs (decision at trace root only)
//!     → span.rs (in-flight span handle)
//!     → Span::end
//!     → reporter.rs (queue → batch → SpanSender)
//! ```
//!
//! # Design Decisions
//! - The backend is deliberately small; exporters plug in behind `SpanSender`
//! - Ambient propagation is per thread; crossing threads is done explicitly
//!   by closing a scope on one thread and opening another elsewhere

pub mod current;
pub mod reporter;
pub mod sampler;
pub mod span;
pub mod tracer;

pub use current::Scope;
pub use reporter::{AsyncReporter, InMemoryReporter, LoggingSender, SpanReporter, SpanSender};
pub use sampler::{Sampler, SharedSampler};
pub use span::{FinishedSpan, Span, SpanContext, SpanKind};
pub use tracer::Tracer;
