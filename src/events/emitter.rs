//! Lifecycle event emitter
//!
//! Three channels: `request` (a request matched an interceptor), `replied`
//! (its response was built and handed back), and `no match`. Delivery is
//! synchronous, in subscription order. Nothing is buffered: a handler only
//! sees events emitted after it subscribed.

use crate::mocking::interceptor::Interceptor;
use crate::mocking::request::{Origin, RequestRecord};
use bytes::Bytes;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Named event channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Request,
    Replied,
    NoMatch,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Request => "request",
            Channel::Replied => "replied",
            Channel::NoMatch => "no match",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payloads, borrowed for the duration of delivery
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    Request {
        request: &'a RequestRecord,
        interceptor: &'a Arc<Interceptor>,
        body: Option<&'a Bytes>,
    },
    Replied {
        request: &'a RequestRecord,
        interceptor: &'a Arc<Interceptor>,
    },
    NoMatch {
        request: &'a RequestRecord,
    },
}

impl<'a> Event<'a> {
    pub fn channel(&self) -> Channel {
        match self {
            Event::Request { .. } => Channel::Request,
            Event::Replied { .. } => Channel::Replied,
            Event::NoMatch { .. } => Channel::NoMatch,
        }
    }

    pub fn request(&self) -> &'a RequestRecord {
        match *self {
            Event::Request { request, .. }
            | Event::Replied { request, .. }
            | Event::NoMatch { request } => request,
        }
    }

    pub fn interceptor(&self) -> Option<&'a Arc<Interceptor>> {
        match *self {
            Event::Request { interceptor, .. } | Event::Replied { interceptor, .. } => {
                Some(interceptor)
            }
            Event::NoMatch { .. } => None,
        }
    }

    /// Buffered request body, on `request` events only
    pub fn body(&self) -> Option<&'a Bytes> {
        match *self {
            Event::Request { body, .. } => body,
            _ => None,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&Event<'_>) + Send + Sync>;

/// Handle returned by subscriptions, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone)]
enum Filter {
    All,
    /// Events of one scope: its interceptors, or unmatched requests to its origin
    Scope { scope_id: u64, origin: Origin },
}

impl Filter {
    fn admits(&self, event: &Event<'_>) -> bool {
        match self {
            Filter::All => true,
            Filter::Scope { scope_id, origin } => match event.interceptor() {
                Some(interceptor) => interceptor.scope_id() == *scope_id,
                None => event.request().origin() == origin,
            },
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    channel: Channel,
    filter: Filter,
    once: bool,
    handler: EventHandler,
}

/// Multi-channel publish/subscribe hub
pub struct EventEmitter {
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    pub fn on<F>(&self, channel: Channel, handler: F) -> SubscriptionId
    where
        F: Fn(&Event<'_>) + Send + Sync + 'static,
    {
        self.subscribe(channel, Filter::All, false, Arc::new(handler))
    }

    /// Like [`EventEmitter::on`], removed after its first delivery
    pub fn once<F>(&self, channel: Channel, handler: F) -> SubscriptionId
    where
        F: Fn(&Event<'_>) + Send + Sync + 'static,
    {
        self.subscribe(channel, Filter::All, true, Arc::new(handler))
    }

    pub(crate) fn on_scoped(
        &self,
        scope_id: u64,
        origin: Origin,
        channel: Channel,
        once: bool,
        handler: EventHandler,
    ) -> SubscriptionId {
        self.subscribe(channel, Filter::Scope { scope_id, origin }, once, handler)
    }

    fn subscribe(
        &self,
        channel: Channel,
        filter: Filter,
        once: bool,
        handler: EventHandler,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription {
            id,
            channel,
            filter,
            once,
            handler,
        });
        id
    }

    /// Unsubscribe; returns false if the subscription was already gone
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        before != subscriptions.len()
    }

    /// Drop every subscription on `channel`, or on all channels when `None`
    pub fn remove_all(&self, channel: Option<Channel>) {
        self.subscriptions
            .write()
            .retain(|s| channel.map_or(false, |c| s.channel != c));
    }

    pub(crate) fn remove_scope(&self, scope_id: u64) {
        self.subscriptions.write().retain(|s| match &s.filter {
            Filter::Scope { scope_id: id, .. } => *id != scope_id,
            Filter::All => true,
        });
    }

    pub fn listener_count(&self, channel: Channel) -> usize {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| s.channel == channel)
            .count()
    }

    /// Deliver `event` to every admitting subscriber; returns how many ran.
    ///
    /// Handlers run after the lock is released, so they may subscribe or
    /// unsubscribe freely.
    pub fn emit(&self, event: &Event<'_>) -> usize {
        let channel = event.channel();
        let handlers: Vec<EventHandler> = {
            let mut subscriptions = self.subscriptions.write();
            let mut handlers = Vec::new();
            subscriptions.retain(|s| {
                if s.channel != channel || !s.filter.admits(event) {
                    return true;
                }
                handlers.push(Arc::clone(&s.handler));
                !s.once
            });
            handlers
        };

        debug!(
            "Emitting '{}' for {} to {} handler(s)",
            channel,
            event.request().url(),
            handlers.len()
        );
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
