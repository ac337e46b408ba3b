//! Thread-to-context binding.
//!
//! Every context thread carries exactly one binding for its whole life: it is
//! attached when the thread starts and released when the thread retires. The
//! binding lives in a thread-local slot so "which context am I on?" never
//! takes a lock; a process-wide map from [`ThreadId`] to [`ContextId`] mirrors
//! long-lived attachments for diagnostics.
//!
//! Lab contexts enter a scoped binding instead: it is installed while the lab
//! drains its queue and the previous binding is restored afterwards.

use crate::cx::ThreadContext;
use crate::types::ContextId;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Weak};
use std::thread::{self, ThreadId};

#[derive(Clone)]
struct Binding {
    id: ContextId,
    context: Weak<dyn ThreadContext>,
}

thread_local! {
    static CURRENT: RefCell<Option<Binding>> = const { RefCell::new(None) };
}

static ATTACHED: LazyLock<Mutex<HashMap<ThreadId, ContextId>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Guard that restores the previous binding on drop.
pub(crate) struct BindingGuard {
    prev: Option<Binding>,
    attached: bool,
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT.with(|slot| {
            *slot.borrow_mut() = prev;
        });
        if self.attached {
            ATTACHED.lock().remove(&thread::current().id());
        }
    }
}

fn install(id: ContextId, context: Weak<dyn ThreadContext>, attached: bool) -> BindingGuard {
    let prev = CURRENT.with(|slot| slot.borrow_mut().replace(Binding { id, context }));
    if attached {
        ATTACHED.lock().insert(thread::current().id(), id);
    }
    BindingGuard { prev, attached }
}

/// Attaches a context to the calling thread for the thread's lifetime.
pub(crate) fn attach(id: ContextId, context: Weak<dyn ThreadContext>) -> BindingGuard {
    install(id, context, true)
}

/// Binds a context to the calling thread until the guard drops.
pub(crate) fn enter(id: ContextId, context: Weak<dyn ThreadContext>) -> BindingGuard {
    install(id, context, false)
}

/// Returns the context bound to the calling thread, if it is still alive.
#[must_use]
pub fn current() -> Option<Arc<dyn ThreadContext>> {
    CURRENT.with(|slot| slot.borrow().as_ref().and_then(|b| b.context.upgrade()))
}

/// Returns the id of the context bound to the calling thread.
///
/// Unlike [`current`], this works while the context is being torn down.
#[must_use]
pub fn current_id() -> Option<ContextId> {
    CURRENT.with(|slot| slot.borrow().as_ref().map(|b| b.id))
}

/// Returns the context attached to `thread`, if any.
#[must_use]
pub fn context_of(thread: ThreadId) -> Option<ContextId> {
    ATTACHED.lock().get(&thread).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cx::LabContext;

    fn downgrade(lab: &Arc<LabContext>) -> Weak<LabContext> {
        Arc::downgrade(lab)
    }

    #[test]
    fn unbound_thread_has_no_context() {
        std::thread::spawn(|| {
            assert!(current().is_none());
            assert!(current_id().is_none());
        })
        .join()
        .expect("thread panicked");
    }

    #[test]
    fn enter_restores_previous_binding() {
        let outer = LabContext::new();
        let inner = LabContext::new();
        let outer_weak: Weak<dyn ThreadContext> = downgrade(&outer);
        let inner_weak: Weak<dyn ThreadContext> = downgrade(&inner);

        let _outer_guard = enter(outer.id(), outer_weak);
        assert_eq!(current_id(), Some(outer.id()));
        {
            let _inner_guard = enter(inner.id(), inner_weak);
            assert_eq!(current_id(), Some(inner.id()));
            let current = current().expect("inner bound");
            assert_eq!(current.id(), inner.id());
        }
        assert_eq!(current_id(), Some(outer.id()));
    }

    #[test]
    fn attach_registers_thread() {
        let lab = LabContext::new();
        let id = lab.id();
        let weak: Weak<dyn ThreadContext> = downgrade(&lab);
        let thread_id = std::thread::spawn(move || {
            let _guard = attach(id, weak);
            assert_eq!(context_of(thread::current().id()), Some(id));
            thread::current().id()
        })
        .join()
        .expect("thread panicked");
        assert_eq!(context_of(thread_id), None);
    }

    #[test]
    fn dead_context_is_not_returned() {
        let lab = LabContext::new();
        let id = lab.id();
        let weak: Weak<dyn ThreadContext> = downgrade(&lab);
        let _guard = enter(id, weak);
        drop(lab);
        assert!(current().is_none());
        assert_eq!(current_id(), Some(id));
    }
}
