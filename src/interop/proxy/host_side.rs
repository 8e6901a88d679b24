use crate::interop::call;
use crate::interop::marshal::{guest_to_host, host_to_guest};
use crate::interop::registry::{release_quietly, ProxyToken};
use crate::interop::translate::{guest_failure, to_host_error};
use crate::interop::types::{PassMode, ProxyKind};
use crate::interop::Bridge;
use crate::errors::IdentityRegistryError;
use crate::runtime::guest::GuestValue;
use crate::runtime::host::{HostCallable, HostError, HostForeign, HostFunction, HostValue};
use crate::runtime::signature::CallArgs;
use std::any::Any;
use std::rc::{Rc, Weak};

/// A guest object as seen by host code
pub struct HostProxy {
    kind: ProxyKind,
    target: GuestValue,
    bridge: Weak<Bridge>,
    token: ProxyToken,
}

impl HostProxy {
    pub(super) fn new(kind: ProxyKind, target: GuestValue, bridge: Weak<Bridge>, token: ProxyToken) -> Self {
        Self { kind, target, bridge, token }
    }

    /// Kind fixed when the proxy was created
    pub fn kind(&self) -> ProxyKind {
        self.kind
    }

    /// The guest value this proxy stands for
    pub fn target(&self) -> &GuestValue {
        &self.target
    }

    /// The guest callable behind a host function installed from the guest
    pub fn backing(function: &HostFunction) -> Option<&GuestValue> {
        match &function.body {
            HostCallable::Foreign(target) => target.as_any().downcast_ref::<HostProxy>().map(|p| &p.target),
            _ => None,
        }
    }

    fn bridge(&self) -> Result<Rc<Bridge>, HostError> {
        self.bridge
            .upgrade()
            .ok_or_else(|| to_host_error(IdentityRegistryError::Detached.into()))
    }
}

impl Drop for HostProxy {
    fn drop(&mut self) {
        release_quietly(self.token);
    }
}

impl HostForeign for HostProxy {
    fn type_name(&self) -> String {
        self.target.type_name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn get_property(&self, name: &str) -> Result<HostValue, HostError> {
        let bridge = self.bridge()?;
        let value = bridge.guest().getattr(&self.target, name).map_err(guest_failure)?;
        guest_to_host(&bridge, &value).map_err(to_host_error)
    }

    fn set_property(&self, name: &str, value: HostValue) -> Result<(), HostError> {
        let bridge = self.bridge()?;
        let value = host_to_guest(&bridge, &value, PassMode::ByValue).map_err(to_host_error)?;
        bridge.guest().setattr(&self.target, name, value).map_err(guest_failure)
    }

    fn call_method(&self, name: &str, args: Vec<HostValue>) -> Result<HostValue, HostError> {
        let bridge = self.bridge()?;
        let method = bridge.guest().getattr(&self.target, name).map_err(guest_failure)?;
        call::invoke_guest(&bridge, &method, CallArgs::positional(args)).map_err(to_host_error)
    }

    fn invoke(&self, args: Vec<HostValue>) -> Result<HostValue, HostError> {
        let bridge = self.bridge()?;
        call::invoke_guest(&bridge, &self.target, CallArgs::positional(args)).map_err(to_host_error)
    }

    fn get_index(&self, key: &HostValue) -> Result<HostValue, HostError> {
        let bridge = self.bridge()?;
        let key = host_to_guest(&bridge, key, PassMode::ByValue).map_err(to_host_error)?;
        let value = bridge.guest().getitem(&self.target, &key).map_err(guest_failure)?;
        guest_to_host(&bridge, &value).map_err(to_host_error)
    }

    /// Guest `==` against another host-side proxy; never equal to a
    /// native host value
    fn loose_eq(&self, other: &HostValue) -> Result<bool, HostError> {
        let other = match other {
            HostValue::Foreign(f) => match f.as_any().downcast_ref::<HostProxy>() {
                Some(proxy) => proxy.target.clone(),
                None => return Ok(false),
            },
            _ => return Ok(false),
        };
        let bridge = self.bridge()?;
        bridge.guest().equals(&self.target, &other).map_err(guest_failure)
    }

    fn to_host_string(&self) -> Result<String, HostError> {
        let bridge = self.bridge()?;
        bridge.guest().to_str(&self.target).map_err(guest_failure)
    }
}
