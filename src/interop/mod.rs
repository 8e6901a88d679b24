//! Interop layer - the bridge between the host and guest runtimes
//!
//! Design:
//! - `types` - the shared value model and proxy families
//! - `registry` - one live proxy per (direction, object)
//! - `proxy` - guest-side and host-side proxies
//! - `marshal` - primitive and aggregate conversion
//! - `call` - argument binding and calls across the boundary
//! - `translate` - errors crossing the boundary
//! - `embed` - the embedding facade installed into both runtimes
//! - `stats` - crossing counters
//!
//! A `Bridge` owns both interpreters. Everything that needs it back (proxies,
//! resolvers, installed builtins) holds it weakly.

pub mod call;
pub mod embed;
pub mod marshal;
pub mod proxy;
pub mod registry;
pub mod stats;
pub mod translate;
pub mod types;

#[cfg(test)]
mod tests;

pub use proxy::{GuestProxy, HostProxy};
pub use stats::BridgeStats;
pub use types::{Direction, PassMode, ProxyKind};

use crate::errors::BridgeError;
use crate::frontend::config::BridgeConfig;
use crate::runtime::guest::{GuestError, GuestInterp, GuestValue};
use crate::runtime::host::{HostError, HostInterp, HostValue};
use std::rc::Rc;
use tracing::{debug, info};

pub struct Bridge {
    host: HostInterp,
    guest: GuestInterp,
    config: BridgeConfig,
}

impl Bridge {
    /// Build both runtimes and install the embedding facade.
    ///
    /// The identity registry is per thread and created by the first bridge
    /// on it; `config.registry` of later bridges on the same thread is ignored.
    pub fn new(config: BridgeConfig) -> Rc<Bridge> {
        registry::init(&config.registry);
        let bridge = Rc::new(Bridge {
            host: HostInterp::new(config.host.max_call_depth),
            guest: GuestInterp::new(config.guest.max_call_depth),
            config,
        });
        embed::install(&bridge);
        info!(
            host_depth = bridge.config.host.max_call_depth,
            guest_depth = bridge.config.guest.max_call_depth,
            "bridge ready"
        );
        bridge
    }

    /// Bridge built from `BridgeConfig::default()`
    pub fn with_defaults() -> Rc<Bridge> {
        Self::new(BridgeConfig::default())
    }

    /// The host runtime
    pub fn host(&self) -> &HostInterp {
        &self.host
    }

    /// The guest runtime
    pub fn guest(&self) -> &GuestInterp {
        &self.guest
    }

    /// Configuration this bridge was built with
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Run a host program against the host globals
    pub fn run_host(&self, source: &str) -> Result<(), HostError> {
        debug!(bytes = source.len(), "running host program");
        self.host.run(source)
    }

    /// Run a guest program in `__main__`
    pub fn run_guest(&self, source: &str) -> Result<(), GuestError> {
        debug!(bytes = source.len(), "running guest program");
        self.guest.run(source)
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats::capture(registry::with(|r| r.stats()).unwrap_or_default())
    }

    pub fn import_guest_module(self: &Rc<Self>, name: &str) -> Result<HostValue, BridgeError> {
        embed::import_guest_module(self, name)
    }

    pub fn embed_guest_function(self: &Rc<Self>, source: &str) -> Result<HostValue, BridgeError> {
        embed::embed_guest_function(self, source)
    }

    pub fn embed_guest_method(self: &Rc<Self>, class: &str, source: &str) -> Result<(), BridgeError> {
        embed::embed_guest_method(self, class, source)
    }

    pub fn embed_guest_module(self: &Rc<Self>, name: &str, source: &str) -> Result<HostValue, BridgeError> {
        embed::embed_guest_module(self, name, source)
    }

    pub fn embed_host_function(self: &Rc<Self>, source: &str) -> Result<GuestValue, BridgeError> {
        embed::embed_host_function(self, source)
    }
}
