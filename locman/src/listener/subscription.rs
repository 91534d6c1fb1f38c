//! Listener lifecycle: activation, delivery and idempotent removal.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::kind::{ListenerEvent, ListenerKind};
use crate::error::LocationError;
use crate::registry::Registry;

// =============================================================================
// Listener Identity
// =============================================================================

/// Global counter for listener ids. Ids are never reused.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Unique, monotonically increasing listener identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Options
// =============================================================================

/// Subscription options.
#[derive(Debug, Clone, Default)]
pub struct ListenerOptions {
    /// Remove the listener after its first delivery.
    pub once: bool,

    /// Deliver a timeout error if nothing arrives within this window.
    pub ttl: Option<Duration>,

    /// Runtime on which the handler runs. Defaults to the registry's runtime.
    pub context: Option<Handle>,
}

impl ListenerOptions {
    /// Options for a one-shot listener.
    pub fn once() -> Self {
        Self {
            once: true,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Run the handler on `handle` instead of the registry's runtime.
    pub fn on(mut self, handle: Handle) -> Self {
        self.context = Some(handle);
        self
    }
}

// =============================================================================
// Shared Listener State
// =============================================================================

/// State shared between a [`Listener`] handle, the registry and the
/// listener's own tasks.
///
/// `active` is the single source of truth for membership: the first path to
/// clear it (unlisten, one-shot delivery, timeout) wins and every later path
/// is a no-op. The timer and the delivery queue are released on that
/// transition regardless of how handlers behave.
pub(crate) struct ListenerShared {
    id: ListenerId,
    kind: ListenerKind,
    once: bool,
    ttl: Option<Duration>,
    context: Handle,
    owner: Weak<Registry>,
    active: AtomicBool,
    fired: AtomicBool,
    timer: Mutex<Option<CancellationToken>>,
    queue: Mutex<Option<mpsc::UnboundedSender<ListenerEvent>>>,
}

impl ListenerShared {
    pub(crate) fn new(
        kind: ListenerKind,
        options: ListenerOptions,
        default_context: Handle,
        owner: Weak<Registry>,
    ) -> Self {
        Self {
            id: ListenerId::next(),
            kind,
            once: options.once,
            ttl: options.ttl,
            context: options.context.unwrap_or(default_context),
            owner,
            active: AtomicBool::new(false),
            fired: AtomicBool::new(false),
            timer: Mutex::new(None),
            queue: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn kind(&self) -> &ListenerKind {
        &self.kind
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Open the delivery queue, arm the timer and attach to the owner.
    ///
    /// The owner replays its current value before registering, which may
    /// complete a one-shot listener on the spot.
    fn activate(self: &Arc<Self>) {
        let Some(owner) = self.owner.upgrade() else {
            tracing::debug!(listener = %self.id, "Registry gone, listener not activated");
            return;
        };

        if self.active.swap(true, Ordering::SeqCst) {
            return;
        }

        self.fired.store(false, Ordering::SeqCst);
        self.open_queue();
        self.arm_timer();

        tracing::debug!(
            listener = %self.id,
            kind = self.kind.as_str(),
            once = self.once,
            "Listener activated"
        );

        owner.attach(Arc::clone(self));
    }

    fn open_queue(&self) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ListenerEvent>();
        let kind = self.kind.clone();
        let id = self.id;

        self.context.spawn(async move {
            while let Some(event) = rx.recv().await {
                if !kind.dispatch(event) {
                    tracing::warn!(listener = %id, "Dropped event of the wrong kind");
                }
            }
        });

        *self.queue.lock() = Some(tx);
    }

    fn arm_timer(self: &Arc<Self>) {
        let Some(ttl) = self.ttl else {
            return;
        };

        let token = CancellationToken::new();
        if let Some(previous) = self.timer.lock().replace(token.clone()) {
            previous.cancel();
        }

        let listener = Arc::clone(self);
        self.context.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(ttl) => listener.on_timeout(ttl),
            }
        });
    }

    fn cancel_timer(&self) {
        if let Some(token) = self.timer.lock().take() {
            token.cancel();
        }
    }

    /// Queue `event` for the handler.
    ///
    /// Returns whether the listener is still subscribed afterwards. Safe to
    /// call with the registry lock held.
    pub(crate) fn emit(&self, event: ListenerEvent) -> bool {
        if !self.is_active() {
            return false;
        }
        if self.once && self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.cancel_timer();

        let sent = match self.queue.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        };
        if !sent {
            tracing::warn!(listener = %self.id, "Delivery queue closed, event dropped");
        }

        if self.once {
            self.retire();
            return false;
        }
        true
    }

    fn on_timeout(&self, ttl: Duration) {
        tracing::debug!(listener = %self.id, ttl_ms = ttl.as_millis() as u64, "Listener timed out");

        if !self.emit(ListenerEvent::Failure(LocationError::Timeout { ttl })) {
            self.detach();
        }
    }

    /// Mark inactive and release the timer and queue.
    ///
    /// Does not touch the registry, so it may run under the registry lock.
    /// Events already queued are still delivered. Returns true on the
    /// transition from active.
    pub(crate) fn retire(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.cancel_timer();
        self.queue.lock().take();
        tracing::debug!(listener = %self.id, "Listener retired");
        true
    }

    fn detach(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.detach(self.id);
        }
    }

    /// Retire and remove from the owning registry. Idempotent.
    fn deactivate(&self) {
        self.retire();
        self.detach();
    }
}

impl fmt::Debug for ListenerShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerShared")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("once", &self.once)
            .field("ttl", &self.ttl)
            .field("active", &self.is_active())
            .finish()
    }
}

// =============================================================================
// Public Handle
// =============================================================================

/// Handle to a subscription.
///
/// Dropping the handle does not unsubscribe; call [`Listener::unlisten`].
/// Equality and hashing use the id only.
#[derive(Clone)]
pub struct Listener {
    shared: Arc<ListenerShared>,
}

impl Listener {
    /// Create and activate a listener.
    pub(crate) fn start(shared: ListenerShared) -> Self {
        let listener = Self {
            shared: Arc::new(shared),
        };
        listener.shared.activate();
        listener
    }

    pub fn id(&self) -> ListenerId {
        self.shared.id
    }

    pub fn kind(&self) -> &ListenerKind {
        &self.shared.kind
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    pub fn is_once(&self) -> bool {
        self.shared.once
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.shared.ttl
    }

    /// Re-activate after [`unlisten`](Self::unlisten) or expiry.
    ///
    /// Re-arms the timer and replays the current value. No-op while active.
    pub fn listen(&self) {
        self.shared.activate();
    }

    /// Stop receiving events. Safe to call repeatedly.
    pub fn unlisten(&self) {
        self.shared.deactivate();
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.shared.id == other.shared.id
    }
}

impl Eq for Listener {}

impl Hash for Listener {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shared.id.hash(state);
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.shared.id)
            .field("kind", &self.shared.kind)
            .field("active", &self.is_active())
            .finish()
    }
}
