//! Listener handler types and event dispatch.

use std::fmt;
use std::sync::Arc;

use crate::error::LocationError;
use crate::geo::{Address, Location};

/// Handler for location updates.
pub type LocationHandler = Arc<dyn Fn(Result<Location, LocationError>) + Send + Sync>;

/// Handler for address updates. `Ok(None)` means no usable address.
pub type AddressHandler = Arc<dyn Fn(Result<Option<Address>, LocationError>) + Send + Sync>;

/// Single-use callback for one address resolution.
pub type AddressCallback = Box<dyn FnOnce(Result<Option<Address>, LocationError>) + Send>;

/// What a listener subscribes to. Fixed at creation.
#[derive(Clone)]
pub enum ListenerKind {
    Location(LocationHandler),
    Address(AddressHandler),
}

impl ListenerKind {
    pub fn location<F>(handler: F) -> Self
    where
        F: Fn(Result<Location, LocationError>) + Send + Sync + 'static,
    {
        ListenerKind::Location(Arc::new(handler))
    }

    pub fn address<F>(handler: F) -> Self
    where
        F: Fn(Result<Option<Address>, LocationError>) + Send + Sync + 'static,
    {
        ListenerKind::Address(Arc::new(handler))
    }

    pub fn is_location(&self) -> bool {
        matches!(self, ListenerKind::Location(_))
    }

    pub fn is_address(&self) -> bool {
        matches!(self, ListenerKind::Address(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerKind::Location(_) => "location",
            ListenerKind::Address(_) => "address",
        }
    }

    /// Whether a broadcast of `event` is meant for this kind.
    pub(crate) fn accepts(&self, event: &ListenerEvent) -> bool {
        match event {
            ListenerEvent::Location(_) => self.is_location(),
            ListenerEvent::Address(_) => self.is_address(),
            ListenerEvent::Failure(_) => true,
        }
    }

    /// Run the handler for `event`. Returns false if the event does not
    /// belong to this kind of listener.
    pub(crate) fn dispatch(&self, event: ListenerEvent) -> bool {
        match (self, event) {
            (ListenerKind::Location(handler), ListenerEvent::Location(result)) => handler(result),
            (ListenerKind::Address(handler), ListenerEvent::Address(result)) => handler(result),
            (ListenerKind::Location(handler), ListenerEvent::Failure(error)) => handler(Err(error)),
            (ListenerKind::Address(handler), ListenerEvent::Failure(error)) => handler(Err(error)),
            (ListenerKind::Location(_), ListenerEvent::Address(_))
            | (ListenerKind::Address(_), ListenerEvent::Location(_)) => return false,
        }
        true
    }
}

impl fmt::Debug for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerKind::{}", self.as_str())
    }
}

/// A value queued for delivery to a listener.
#[derive(Debug, Clone)]
pub(crate) enum ListenerEvent {
    Location(Result<Location, LocationError>),
    Address(Result<Option<Address>, LocationError>),
    /// Kind-independent failure, e.g. a timeout.
    Failure(LocationError),
}
