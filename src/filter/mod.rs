//! Content filter chain
//!
//! An explicit, ordered list of transform steps handed to the client at
//! construction. Outbound content runs through the chain before a publish;
//! inbound content runs through it before being returned to a caller,
//! whichever tier it came from. A step may rewrite the content or reject it.


use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::ConfigKey;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDirection {
    /// Content about to be published
    Outbound,
    /// Content about to be handed to a caller
    Inbound,
}

/// Mutable view handed to every filter in turn
#[derive(Debug)]
pub struct FilterContext<'a> {
    pub key: &'a ConfigKey,
    pub direction: FilterDirection,
    pub content: String,
}

pub trait ConfigFilter: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Rewrite `ctx.content` in place, or return an error to reject it.
    fn filter(
        &self,
        ctx: &mut FilterContext<'_>,
    ) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn ConfigFilter>>,
}

impl fmt::Debug for FilterChain {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_list().entries(self.filters.iter().map(|x| x.name())).finish()
    }
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn ConfigFilter>>) -> Self {
        Self { filters }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Runs `content` through every filter in order.
    ///
    /// The first failing filter stops the chain; its error is reported as
    /// [`Error::Filter`] naming that filter.
    pub fn apply(
        &self,
        key: &ConfigKey,
        direction: FilterDirection,
        content: String,
    ) -> Result<String> {
        let mut ctx = FilterContext { key, direction, content };
        for filter in &self.filters {
            if let Err(e) = filter.filter(&mut ctx) {
                warn!(key = %key, filter = filter.name(), ?direction, error = %e, "content rejected by filter");
                return Err(match e {
                    e @ Error::Filter { .. } => e,
                    other => Error::Filter {
                        filter: filter.name().to_string(),
                        reason: other.to_string(),
                    },
                });
            }
        }
        Ok(ctx.content)
    }
}
