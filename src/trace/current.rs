//! Ambient "current span" propagation.
//!
//! # Responsibilities
//! - Track which span is current on each thread
//! - Push a span as current (`open`) and pop it again (`Scope::close`)
//!
//! # Design Decisions
//! - Thread-local slot holding a copyable `SpanContext`; no locking
//! - A scope remembers what was current before it and restores that on close
//! - Closing is idempotent and also happens on drop
//! - A scope closed on a thread other than its owner cannot touch the owner's
//!   thread-local; it is marked closed and the event is logged. Work that
//!   hops threads must release its scope on the owner first
//!   (`Recorder::detach`), otherwise the owner keeps a stale current span

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use crate::trace::span::SpanContext;

thread_local! {
    static CURRENT: Cell<Option<SpanContext>> = const { Cell::new(None) };
}

/// The span that is current on this thread, if any.
pub fn current() -> Option<SpanContext> {
    CURRENT.with(Cell::get)
}

/// Make `context` current on this thread until the returned scope closes.
pub fn open(context: SpanContext) -> Scope {
    let previous = CURRENT.with(|slot| slot.replace(Some(context)));
    Scope {
        context,
        previous,
        owner: thread::current().id(),
        closed: AtomicBool::new(false),
    }
}

/// Marks a span as the ambient current span.
#[derive(Debug)]
pub struct Scope {
    context: SpanContext,
    previous: Option<SpanContext>,
    owner: ThreadId,
    closed: AtomicBool,
}

impl Scope {
    pub fn context(&self) -> SpanContext {
        self.context
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Restore the previously current span.
    ///
    /// Only takes effect on the thread that opened the scope. Returns `true`
    /// if this call closed the scope.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        if thread::current().id() == self.owner {
            CURRENT.with(|slot| slot.set(self.previous));
        } else {
            tracing::warn!(
                span = %self.context,
                "Scope closed off its owning thread, ambient span left untouched"
            );
        }
        true
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(span_id: u64) -> SpanContext {
        SpanContext { trace_id: 7, span_id, parent_id: None, sampled: true }
    }

    #[test]
    fn test_open_and_close_restores_previous() {
        assert_eq!(current(), None);

        let outer = open(ctx(1));
        assert_eq!(current().map(|c| c.span_id), Some(1));

        let inner = open(ctx(2));
        assert_eq!(current().map(|c| c.span_id), Some(2));

        assert!(inner.close());
        assert_eq!(current().map(|c| c.span_id), Some(1));

        assert!(outer.close());
        assert_eq!(current(), None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let outer = open(ctx(1));
        let inner = open(ctx(2));
        assert!(inner.close());
        assert!(!inner.close());
        assert_eq!(current().map(|c| c.span_id), Some(1));
        drop(outer);
        assert_eq!(current(), None);
    }

    #[test]
    fn test_drop_closes() {
        {
            let _scope = open(ctx(3));
            assert!(current().is_some());
        }
        assert_eq!(current(), None);
    }

    #[test]
    fn test_close_on_other_thread_leaves_ambient() {
        let scope = open(ctx(4));
        let closed = std::thread::spawn(move || {
            let closed = scope.close();
            (closed, current())
        })
        .join()
        .unwrap();

        assert_eq!(closed, (true, None));
        // The owner thread still sees the span; only its owner can pop it.
        assert_eq!(current().map(|c| c.span_id), Some(4));
    }
}
