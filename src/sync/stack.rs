//! LIFO stack whose `pop` waits for an item.
//!
//! Items come out newest first. Tasks blocked in `pop` are still served in
//! the order they started waiting.

use std::cell::RefCell;
use std::future::Future;

use crate::cancel::CancelToken;
use crate::error::{Result, SyncError};
use crate::sync::notify::Notify;
use crate::sync::uncancelled;

/// An unbounded LIFO stack for passing items between tasks.
#[derive(Debug)]
pub struct Stack<T> {
    items: RefCell<Vec<T>>,
    not_empty: Notify,
}

impl<T> Stack<T> {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: RefCell::new(Vec::new()),
            not_empty: Notify::new(),
        }
    }

    /// Returns the number of items on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Returns true if the stack holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Returns true while some task is blocked in `pop`.
    #[must_use]
    pub fn locked(&self) -> bool {
        self.not_empty.waiter_count() > 0
    }

    /// Pushes `value` and wakes the oldest waiting consumer.
    pub fn push(&self, value: T) {
        self.items.borrow_mut().push(value);
        self.not_empty.wake(1);
    }

    /// Removes the newest item, waiting for one if the stack is empty.
    ///
    /// A consumer that finds the stack empty joins the wait list when this
    /// method is called.
    pub fn pop(&self) -> impl Future<Output = T> {
        let queued = self.is_empty().then(|| self.not_empty.notified().forwarding());
        async move {
            if let Some(queued) = queued {
                uncancelled(queued.await);
            }
            loop {
                if let Some(value) = self.items.borrow_mut().pop() {
                    return value;
                }
                uncancelled(self.not_empty.notified().forwarding().await);
            }
        }
    }

    /// Removes the newest item, giving up when `token` fires.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if `token` has already fired or fires
    /// before an item arrives.
    pub fn pop_with(&self, token: &CancelToken) -> impl Future<Output = Result<T>> {
        let fired = token.checkpoint();
        let queued = (fired.is_ok() && self.is_empty())
            .then(|| self.not_empty.notified_with(token).forwarding());
        async move {
            fired?;
            if let Some(queued) = queued {
                queued.await?;
            }
            loop {
                if let Some(value) = self.items.borrow_mut().pop() {
                    return Ok(value);
                }
                self.not_empty.notified_with(token).forwarding().await?;
            }
        }
    }

    /// Removes the newest item without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Empty`] if the stack is empty.
    pub fn pop_nowait(&self) -> Result<T> {
        self.items
            .borrow_mut()
            .pop()
            .ok_or(SyncError::Empty { container: "stack" })
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self::new()
    }
}
