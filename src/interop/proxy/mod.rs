//! Proxies - objects of one runtime standing for objects of the other
//!
//! Design:
//! - `GuestProxy` lives in the guest and forwards to a host object
//! - `HostProxy` lives in the host and forwards to a guest object
//! - Construction always goes through the identity registry, so one object
//!   has at most one live proxy per direction
//! - The family (`ProxyKind`) is fixed at construction
//! - Proxies hold their target strongly and the bridge weakly

mod guest_side;
mod host_side;

pub use guest_side::GuestProxy;
pub use host_side::HostProxy;

use super::registry::{self, RegistryKey};
use super::types::{guest_kind, watch_guest, Direction, HostTarget};
use super::Bridge;
use crate::errors::BridgeError;
use crate::runtime::guest::GuestValue;
use crate::runtime::host::HostValue;
use std::rc::Rc;
use tracing::debug;

/// The guest-side proxy for `target`
pub fn guest_proxy(bridge: &Rc<Bridge>, target: HostTarget) -> Result<GuestValue, BridgeError> {
    let key = RegistryKey::new(Direction::HostToGuest, target.identity());
    let alive = target.watch();
    let proxy = registry::with(|reg| {
        reg.get_or_create(key, alive, |token| {
            let kind = target.kind();
            debug!(kind = ?kind, target = %target.type_name(), "guest-side proxy created");
            Rc::new(GuestProxy::new(kind, target, Rc::downgrade(bridge), token))
        })
    })?;
    Ok(GuestValue::Foreign(proxy))
}

/// The host-side proxy for `target`
pub fn host_proxy(bridge: &Rc<Bridge>, target: GuestValue) -> Result<HostValue, BridgeError> {
    let key = RegistryKey::new(Direction::GuestToHost, target.identity().unwrap_or(0));
    let alive = watch_guest(&target);
    let proxy = registry::with(|reg| {
        reg.get_or_create(key, alive, |token| {
            let kind = guest_kind(&target);
            debug!(kind = ?kind, target = %target.type_name(), "host-side proxy created");
            Rc::new(HostProxy::new(kind, target, Rc::downgrade(bridge), token))
        })
    })?;
    Ok(HostValue::Foreign(proxy))
}
