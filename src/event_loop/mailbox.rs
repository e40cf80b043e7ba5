//! Cross-thread delivery into the loop.
//!
//! Work that has to block (reading stdin, waiting on a signal, disk I/O)
//! runs on its own thread and hands results back through a [`Mailbox`].
//! Every mailbox of a loop shares the loop's single `mio::Waker`; the loop
//! drains all inboxes on the loop thread after a wake-up.

use crossbeam_channel::{Receiver, SendError, Sender, TryRecvError};
use mio::Waker;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{EventId, EventLoop};

/// Messages handed to a callback per inbox per tick.
pub(super) const MAILBOX_BATCH: usize = 1024;

pub(super) type MailCallback<C, T> =
    Box<dyn FnMut(&mut EventLoop<C>, &mut C, T) -> anyhow::Result<()>>;

/// Sending half of a loop mailbox. Cheap to clone and `Send` for `T: Send`.
pub struct Mailbox<T> {
    sender: Sender<T>,
    waker: Arc<Waker>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            waker: Arc::clone(&self.waker),
        }
    }
}

impl<T> std::fmt::Debug for Mailbox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("queued", &self.sender.len())
            .finish()
    }
}

impl<T> Mailbox<T> {
    pub(super) fn new(sender: Sender<T>, waker: Arc<Waker>) -> Self {
        Self { sender, waker }
    }

    /// Queues `msg` and wakes the loop.
    ///
    /// Fails, handing the message back, once the mailbox was cancelled or
    /// the loop dropped.
    pub fn send(&self, msg: T) -> Result<(), SendError<T>> {
        self.sender.send(msg)?;
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake event loop");
        }
        Ok(())
    }
}

/// Type-erased receiving half, owned by the loop.
pub(super) trait Inbox<C> {
    /// Delivers up to [`MAILBOX_BATCH`] messages. Returns `true` if more
    /// are queued.
    fn deliver(&mut self, id: EventId, event_loop: &mut EventLoop<C>, ctx: &mut C) -> bool;
}

pub(super) struct Channel<C, T> {
    receiver: Receiver<T>,
    callback: MailCallback<C, T>,
}

impl<C, T> Channel<C, T> {
    pub(super) fn new(receiver: Receiver<T>, callback: MailCallback<C, T>) -> Self {
        Self { receiver, callback }
    }
}

impl<C, T> Inbox<C> for Channel<C, T> {
    fn deliver(&mut self, id: EventId, event_loop: &mut EventLoop<C>, ctx: &mut C) -> bool {
        for _ in 0..MAILBOX_BATCH {
            match self.receiver.try_recv() {
                Ok(msg) => {
                    if let Err(e) = (self.callback)(event_loop, ctx, msg) {
                        warn!(event = %id, error = %e, "Mailbox callback failed");
                    }
                }
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => {
                    debug!(event = %id, "All senders dropped");
                    return false;
                }
            }
        }
        !self.receiver.is_empty()
    }
}
