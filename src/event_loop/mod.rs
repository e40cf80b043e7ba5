//! Single-threaded Event Loop
//!
//! Drives an owned context `C` from one thread: file descriptor readiness,
//! timers, cross-thread mailboxes and a bounded housekeeping slice per tick.
//!
//! ## Tick
//!
//! ```text
//!   before_sleep ──> poll(timeout) ──> after_sleep
//!                                          │
//!        ┌─────────────────────────────────┘
//!        ▼
//!   fd callbacks ──> mailbox deliveries ──> due timers ──> housekeeping
//! ```
//!
//! The poll timeout is the time until the earliest timer, zero while
//! housekeeping or a mailbox still has work queued, and unbounded otherwise.
//!
//! Callbacks receive the loop itself, so they can register, schedule,
//! cancel (including their own id) or stop from inside. A callback that
//! returns an error is logged and the loop carries on.
//!
//! ## Example
//!
//! ```no_run
//! use flashkv_core::event_loop::{EventLoop, Housekeeping};
//! use std::time::Duration;
//!
//! struct Ticks(u32);
//!
//! impl Housekeeping for Ticks {
//!     fn housekeeping(&mut self) -> anyhow::Result<bool> {
//!         Ok(false)
//!     }
//! }
//!
//! let mut el = EventLoop::new()?;
//! el.schedule(
//!     Duration::from_millis(10),
//!     |el: &mut EventLoop<Ticks>, ticks: &mut Ticks| {
//!         ticks.0 += 1;
//!         if ticks.0 == 3 {
//!             el.stop();
//!         }
//!         Ok(())
//!     },
//!     Some(Duration::from_millis(10)),
//! );
//! el.run(&mut Ticks(0))?;
//! # Ok::<(), std::io::Error>(())
//! ```

mod mailbox;
mod timer;

use mio::event::Event;
use mio::unix::SourceFd;
use mio::{Events, Poll, Token, Waker};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, ErrorKind};
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub use mailbox::Mailbox;
pub use mio::Interest;

use mailbox::{Channel, Inbox};
use timer::{deadline, TimerQueue};

/// Token reserved for the shared mailbox waker.
const WAKER: Token = Token(usize::MAX);

/// Readiness events fetched per poll.
const EVENTS_CAPACITY: usize = 1024;

/// Identifies a registered fd, timer or mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a descriptor became ready for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    /// Peer closed its write side (or the descriptor hung up).
    pub read_closed: bool,
    pub write_closed: bool,
    pub error: bool,
}

impl From<&Event> for Readiness {
    fn from(event: &Event) -> Self {
        Self {
            readable: event.is_readable(),
            writable: event.is_writable(),
            read_closed: event.is_read_closed(),
            write_closed: event.is_write_closed(),
            error: event.is_error(),
        }
    }
}

/// Per-tick background work of the driven context.
pub trait Housekeeping {
    /// Runs one bounded slice. Returns `true` if more work is pending, in
    /// which case the next poll does not block.
    fn housekeeping(&mut self) -> anyhow::Result<bool>;
}

pub type IoCallback<C> = Box<dyn FnMut(&mut EventLoop<C>, &mut C, Readiness) -> anyhow::Result<()>>;
pub type TimerCallback<C> = Box<dyn FnMut(&mut EventLoop<C>, &mut C) -> anyhow::Result<()>>;
pub type SleepHook<C> = Box<dyn FnMut(&mut C)>;

struct IoEvent<C> {
    fd: RawFd,
    /// `None` while the callback is running.
    callback: Option<IoCallback<C>>,
}

pub struct EventLoop<C> {
    poll: Poll,
    events: Events,
    io: HashMap<EventId, IoEvent<C>>,
    timers: TimerQueue<C>,
    inboxes: HashMap<EventId, Option<Box<dyn Inbox<C>>>>,
    waker: Option<Arc<Waker>>,
    next_id: u64,
    before_sleep: Option<SleepHook<C>>,
    after_sleep: Option<SleepHook<C>>,
    stopped: bool,
    woken: bool,
    mail_pending: bool,
    housekeeping_pending: bool,
}

impl<C> fmt::Debug for EventLoop<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("fds", &self.io.len())
            .field("timers", &self.timers.len())
            .field("mailboxes", &self.inboxes.len())
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl<C> EventLoop<C> {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENTS_CAPACITY),
            io: HashMap::new(),
            timers: TimerQueue::new(),
            inboxes: HashMap::new(),
            waker: None,
            next_id: 1,
            before_sleep: None,
            after_sleep: None,
            stopped: false,
            woken: false,
            mail_pending: false,
            housekeeping_pending: false,
        })
    }

    fn next_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Watches `fd` for `interest`. Readiness is edge-triggered, so the
    /// callback must drain the descriptor until it would block.
    ///
    /// The loop does not own `fd`; the caller keeps it open until it
    /// cancels the registration.
    pub fn register<F>(&mut self, fd: RawFd, interest: Interest, callback: F) -> io::Result<EventId>
    where
        F: FnMut(&mut EventLoop<C>, &mut C, Readiness) -> anyhow::Result<()> + 'static,
    {
        let id = self.next_id();
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), Token(id.0 as usize), interest)?;
        self.io.insert(
            id,
            IoEvent {
                fd,
                callback: Some(Box::new(callback)),
            },
        );
        debug!(event = %id, fd, "Registered descriptor");
        Ok(id)
    }

    /// Runs `callback` after `delay`, then every `repeat` if given.
    pub fn schedule<F>(&mut self, delay: Duration, callback: F, repeat: Option<Duration>) -> EventId
    where
        F: FnMut(&mut EventLoop<C>, &mut C) -> anyhow::Result<()> + 'static,
    {
        let id = self.next_id();
        self.timers
            .insert(id, deadline(Instant::now(), delay), repeat, Box::new(callback));
        id
    }

    /// Opens a mailbox whose messages are handed to `callback` on the loop
    /// thread.
    pub fn mailbox<T, F>(&mut self, callback: F) -> io::Result<Mailbox<T>>
    where
        C: 'static,
        T: Send + 'static,
        F: FnMut(&mut EventLoop<C>, &mut C, T) -> anyhow::Result<()> + 'static,
    {
        let waker = match &self.waker {
            Some(waker) => Arc::clone(waker),
            None => {
                let waker = Arc::new(Waker::new(self.poll.registry(), WAKER)?);
                self.waker = Some(Arc::clone(&waker));
                waker
            }
        };
        let (sender, receiver) = crossbeam_channel::unbounded();
        let id = self.next_id();
        self.inboxes
            .insert(id, Some(Box::new(Channel::new(receiver, Box::new(callback)))));
        debug!(event = %id, "Opened mailbox");
        Ok(Mailbox::new(sender, waker))
    }

    /// Removes a descriptor registration, timer or mailbox. Returns
    /// `false` if `id` is unknown or already gone.
    pub fn cancel(&mut self, id: EventId) -> bool {
        if let Some(event) = self.io.remove(&id) {
            if let Err(e) = self.poll.registry().deregister(&mut SourceFd(&event.fd)) {
                debug!(event = %id, error = %e, "Deregister failed");
            }
            return true;
        }
        self.timers.cancel(id) || self.inboxes.remove(&id).is_some()
    }

    pub fn set_before_sleep(&mut self, hook: impl FnMut(&mut C) + 'static) {
        self.before_sleep = Some(Box::new(hook));
    }

    pub fn set_after_sleep(&mut self, hook: impl FnMut(&mut C) + 'static) {
        self.after_sleep = Some(Box::new(hook));
    }

    /// Makes `run` return after the current tick.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Number of live fd registrations, timers and mailboxes.
    pub fn len(&self) -> usize {
        self.io.len() + self.timers.len() + self.inboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ticks until [`stop`](Self::stop) is called.
    pub fn run(&mut self, ctx: &mut C) -> io::Result<()>
    where
        C: Housekeeping,
    {
        self.stopped = false;
        info!("Event loop started");
        while !self.stopped {
            self.tick(ctx)?;
        }
        info!("Event loop stopped");
        Ok(())
    }

    /// Runs a single iteration of the loop.
    pub fn tick(&mut self, ctx: &mut C) -> io::Result<()>
    where
        C: Housekeeping,
    {
        if let Some(hook) = self.before_sleep.as_mut() {
            hook(ctx);
        }

        let timeout = if self.housekeeping_pending || self.mail_pending || self.stopped {
            Some(Duration::ZERO)
        } else {
            self.timers
                .next_due()
                .map(|due| due.saturating_duration_since(Instant::now()))
        };

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                debug!("Poll interrupted");
                self.events.clear();
            }
            Err(e) => return Err(e),
        }

        if let Some(hook) = self.after_sleep.as_mut() {
            hook(ctx);
        }

        let ready: Vec<(Token, Readiness)> = self
            .events
            .iter()
            .map(|event| (event.token(), Readiness::from(event)))
            .collect();
        for (token, readiness) in ready {
            if token == WAKER {
                self.woken = true;
                continue;
            }
            self.dispatch_io(EventId(token.0 as u64), ctx, readiness);
        }

        if self.woken || self.mail_pending {
            self.woken = false;
            self.deliver_mail(ctx);
        }

        self.run_timers(ctx);

        self.housekeeping_pending = match ctx.housekeeping() {
            Ok(more) => more,
            Err(e) => {
                warn!(error = %e, "Housekeeping failed");
                false
            }
        };
        Ok(())
    }

    fn dispatch_io(&mut self, id: EventId, ctx: &mut C, readiness: Readiness) {
        let Some(mut callback) = self.io.get_mut(&id).and_then(|event| event.callback.take())
        else {
            return;
        };
        if let Err(e) = callback(self, ctx, readiness) {
            warn!(event = %id, error = %e, "I/O callback failed");
        }
        // cancelled from inside the callback
        if let Some(event) = self.io.get_mut(&id) {
            event.callback = Some(callback);
        }
    }

    fn deliver_mail(&mut self, ctx: &mut C) {
        let ids: Vec<EventId> = self.inboxes.keys().copied().collect();
        let mut pending = false;
        for id in ids {
            let Some(mut inbox) = self.inboxes.get_mut(&id).and_then(Option::take) else {
                continue;
            };
            pending |= inbox.deliver(id, self, ctx);
            if let Some(slot) = self.inboxes.get_mut(&id) {
                *slot = Some(inbox);
            }
        }
        self.mail_pending = pending;
    }

    fn run_timers(&mut self, ctx: &mut C) {
        let now = Instant::now();
        for id in self.timers.take_due(now) {
            let Some(mut callback) = self.timers.take_callback(id) else {
                continue;
            };
            if let Err(e) = callback(self, ctx) {
                warn!(event = %id, error = %e, "Timer callback failed");
            }
            self.timers.finish(id, callback, Instant::now());
        }
    }
}
