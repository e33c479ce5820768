#![forbid(unsafe_code)]

//! Change blocks: deferred, FIFO-ordered notification dispatch.
//!
//! Every [`Observable`](crate::Observable) routes its notifications through a
//! [`Dispatcher`]. While no change block is open, dispatch is immediate and
//! synchronous. Opening a [`ChangeBlock`] makes the dispatcher queue every
//! notification instead; closing the outermost block drains the queue in the
//! order the notifications were triggered.
//!
//! Use a block when several interdependent observables must all hold their
//! new values before any dependent reacts:
//!
//! ```
//! use tether_reactive::{Dispatcher, Observable};
//!
//! let dispatcher = Dispatcher::new();
//! let width = Observable::with_dispatcher(&dispatcher, 10);
//! let height = Observable::with_dispatcher(&dispatcher, 20);
//!
//! let block = dispatcher.begin_change_block();
//! width.set(30);
//! height.set(40);
//! assert_eq!(dispatcher.pending(), 2);
//! block.end();
//! assert_eq!(dispatcher.pending(), 0);
//! ```
//!
//! # Invariants
//!
//! 1. Queued notifications run strictly in enqueue order.
//! 2. Blocks nest; only closing the outermost block flushes.
//! 3. Notifications triggered while flushing (with no block open) run
//!    immediately rather than being appended to the queue.
//! 4. A queued notification delivers the value current at flush time.
//!
//! # Failure Modes
//!
//! - **Leaked block**: a `ChangeBlock` that is `mem::forget`-ed keeps the
//!   dispatcher blocked; notifications accumulate until another block on
//!   the same dispatcher is opened and closed.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

type Job = Box<dyn FnOnce()>;

struct DispatcherInner {
    depth: Cell<u32>,
    queue: RefCell<VecDeque<Job>>,
}

/// Shared dispatch context for a group of observables.
///
/// Cloning a `Dispatcher` yields another handle to the same queue. A
/// component tree owns one dispatcher and hands it to every observable it
/// creates, so a single change block covers the whole tree.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Rc<DispatcherInner>,
}

impl Dispatcher {
    /// Create a dispatcher with no open block and an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DispatcherInner {
                depth: Cell::new(0),
                queue: RefCell::new(VecDeque::new()),
            }),
        }
    }

    /// Open a change block. Notifications are queued until the returned
    /// guard (and every enclosing guard) is closed.
    #[must_use = "dropping the ChangeBlock closes it immediately"]
    pub fn begin_change_block(&self) -> ChangeBlock {
        self.inner.depth.set(self.inner.depth.get() + 1);
        ChangeBlock {
            dispatcher: self.clone(),
            open: true,
        }
    }

    /// Whether at least one change block is open.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.inner.depth.get() > 0
    }

    /// Current block nesting depth.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.inner.depth.get()
    }

    /// Number of queued notifications.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Whether two handles refer to the same dispatcher.
    #[must_use]
    pub fn same_as(&self, other: &Dispatcher) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `job` now, or queue it if a change block is open.
    pub(crate) fn dispatch(&self, job: impl FnOnce() + 'static) {
        if self.is_blocked() {
            self.inner.queue.borrow_mut().push_back(Box::new(job));
            return;
        }
        job();
    }

    fn close_block(&self) {
        let depth = self.inner.depth.get().saturating_sub(1);
        self.inner.depth.set(depth);
        if depth == 0 {
            self.flush();
        }
    }

    fn flush(&self) {
        tracing::trace!(pending = self.pending(), "flushing change block");
        // A job may open a new block that outlives it; stop draining then and
        // leave the rest to that block's close.
        while !self.is_blocked() {
            let job = self.inner.queue.borrow_mut().pop_front();
            match job {
                Some(job) => job(),
                None => break,
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("depth", &self.depth())
            .field("pending", &self.pending())
            .finish()
    }
}

/// RAII guard for an open change block.
///
/// Closing happens on [`end`](ChangeBlock::end) or on drop, whichever comes
/// first.
#[must_use = "dropping the ChangeBlock closes it immediately"]
pub struct ChangeBlock {
    dispatcher: Dispatcher,
    open: bool,
}

impl ChangeBlock {
    /// Close the block explicitly. If this was the outermost block, queued
    /// notifications are delivered before `end` returns.
    pub fn end(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.dispatcher.close_block();
        }
    }
}

impl Drop for ChangeBlock {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ChangeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBlock")
            .field("open", &self.open)
            .field("depth", &self.dispatcher.depth())
            .finish()
    }
}
