//! Listener contract and registry
//!
//! A [`Listener`] is bound to one key. Every binding owns a delivery queue
//! drained by its own worker task, which gives each binding:
//! - in-order delivery (never an older content after a newer one)
//! - de-duplication (the same fingerprint is never delivered twice in a row)
//! - isolation (a slow or panicking listener only stalls itself)
//!
//! Callbacks run on the blocking pool of the listener's own runtime handle
//! when [`Listener::executor`] supplies one, otherwise on the client's
//! default runtime.

mod binding;
mod registry;

pub(crate) use binding::*;
pub(crate) use registry::*;


use std::sync::Arc;

use tokio::runtime::Handle;

pub trait Listener: Send + Sync + 'static {
    /// Called with the (inbound-filtered) content of the key after a change
    fn on_change(
        &self,
        content: &str,
    );

    /// Runtime to deliver on; `None` uses the client's default worker
    fn executor(&self) -> Option<Handle> {
        None
    }
}

impl<F> Listener for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn on_change(
        &self,
        content: &str,
    ) {
        self(content)
    }
}

/// Listeners are identified by the allocation behind their `Arc`
pub(crate) fn same_listener(
    a: &Arc<dyn Listener>,
    b: &Arc<dyn Listener>,
) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
