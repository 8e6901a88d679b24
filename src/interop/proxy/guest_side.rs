use crate::interop::call;
use crate::interop::marshal::{guest_to_host, host_to_guest};
use crate::interop::registry::{release_quietly, ProxyToken};
use crate::interop::translate::{host_failure, to_guest_error};
use crate::interop::types::{HostTarget, PassMode, ProxyKind, Value};
use crate::interop::Bridge;
use crate::errors::IdentityRegistryError;
use crate::runtime::guest::{GuestError, GuestForeign, GuestValue, Kwargs};
use crate::runtime::host::{ArrayKey, HostValue};
use crate::runtime::signature::CallArgs;
use std::any::Any;
use std::rc::{Rc, Weak};

/// A host object as seen by guest code
pub struct GuestProxy {
    kind: ProxyKind,
    target: HostTarget,
    bridge: Weak<Bridge>,
    token: ProxyToken,
}

impl GuestProxy {
    pub(super) fn new(kind: ProxyKind, target: HostTarget, bridge: Weak<Bridge>, token: ProxyToken) -> Self {
        Self { kind, target, bridge, token }
    }

    /// Kind fixed when the proxy was created
    pub fn kind(&self) -> ProxyKind {
        self.kind
    }

    /// The host value or class this proxy stands for
    pub fn target(&self) -> &HostTarget {
        &self.target
    }

    fn bridge(&self) -> Result<Rc<Bridge>, GuestError> {
        self.bridge
            .upgrade()
            .ok_or_else(|| to_guest_error(IdentityRegistryError::Detached.into()))
    }

    fn no_attribute(&self, name: &str) -> GuestError {
        GuestError::new(
            "AttributeError",
            format!("'{}' object has no attribute '{}'", self.type_name(), name),
        )
    }

    fn array_key(&self, bridge: &Rc<Bridge>, key: &GuestValue) -> Result<ArrayKey, GuestError> {
        let key = guest_to_host(bridge, key).map_err(to_guest_error)?;
        ArrayKey::from_value(&key)
            .ok_or_else(|| GuestError::new("TypeError", format!("illegal array key: {}", key.type_name())))
    }
}

impl Drop for GuestProxy {
    fn drop(&mut self) {
        release_quietly(self.token);
    }
}

impl GuestForeign for GuestProxy {
    fn type_name(&self) -> String {
        self.target.type_name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn identity(&self) -> usize {
        self.target.identity()
    }

    fn get_attr(&self, name: &str) -> Result<GuestValue, GuestError> {
        let bridge = self.bridge()?;
        match &self.target {
            HostTarget::Value(this @ HostValue::Object(obj)) => {
                if let Some(value) = obj.get(name) {
                    return host_to_guest(&bridge, &value, PassMode::ByValue).map_err(to_guest_error);
                }
                let method = obj.class.find_method(name).ok_or_else(|| self.no_attribute(name))?;
                let weak = Rc::downgrade(&bridge);
                let this = this.clone();
                Ok(GuestValue::builtin(name, move |_, args, kwargs| {
                    let bridge = weak
                        .upgrade()
                        .ok_or_else(|| to_guest_error(IdentityRegistryError::Detached.into()))?;
                    let args = CallArgs { positional: args, named: kwargs.into_iter().collect() };
                    call::invoke_host(&bridge, &method, Some(this.clone()), args).map_err(to_guest_error)
                }))
            }
            HostTarget::Value(HostValue::Function(f)) if name == "__name__" => Ok(GuestValue::Str(f.name.clone())),
            HostTarget::Class(c) if name == "__name__" => Ok(GuestValue::Str(c.name.clone())),
            HostTarget::Value(HostValue::Foreign(f)) => {
                let value = f.get_property(name).map_err(host_failure)?;
                host_to_guest(&bridge, &value, PassMode::ByValue).map_err(to_guest_error)
            }
            _ => Err(self.no_attribute(name)),
        }
    }

    fn set_attr(&self, name: &str, value: GuestValue) -> Result<(), GuestError> {
        let bridge = self.bridge()?;
        match &self.target {
            HostTarget::Value(target @ (HostValue::Object(_) | HostValue::Foreign(_))) => {
                let value = guest_to_host(&bridge, &value).map_err(to_guest_error)?;
                bridge.host().set_property(target, name, value).map_err(host_failure)
            }
            _ => Err(self.no_attribute(name)),
        }
    }

    fn call(&self, args: Vec<GuestValue>, kwargs: Kwargs) -> Result<GuestValue, GuestError> {
        let bridge = self.bridge()?;
        let args = CallArgs { positional: args, named: kwargs.into_iter().collect() };
        match &self.target {
            HostTarget::Value(HostValue::Function(f)) => {
                call::invoke_host(&bridge, f, None, args).map_err(to_guest_error)
            }
            HostTarget::Class(class) => call::instantiate_host(&bridge, class, args).map_err(to_guest_error),
            HostTarget::Value(HostValue::Foreign(f)) => {
                if !args.named.is_empty() {
                    return Err(GuestError::new(
                        "TypeError",
                        format!("{}() does not accept named arguments", f.type_name()),
                    ));
                }
                let args = args
                    .positional
                    .iter()
                    .map(|v| guest_to_host(&bridge, v))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(to_guest_error)?;
                let result = f.invoke(args).map_err(host_failure)?;
                host_to_guest(&bridge, &result, PassMode::ByValue).map_err(to_guest_error)
            }
            _ => Err(GuestError::new("TypeError", format!("'{}' object is not callable", self.type_name()))),
        }
    }

    fn get_item(&self, key: &GuestValue) -> Result<GuestValue, GuestError> {
        let bridge = self.bridge()?;
        match &self.target {
            HostTarget::Value(HostValue::Array(array)) => {
                let host_key = self.array_key(&bridge, key)?;
                let value = array
                    .get(&host_key)
                    .ok_or_else(|| GuestError::new("KeyError", bridge.guest().repr(key)))?;
                host_to_guest(&bridge, &value, PassMode::ByValue).map_err(to_guest_error)
            }
            _ => Err(GuestError::new(
                "TypeError",
                format!("'{}' object is not subscriptable", self.type_name()),
            )),
        }
    }

    fn set_item(&self, key: &GuestValue, value: GuestValue) -> Result<(), GuestError> {
        let bridge = self.bridge()?;
        match &self.target {
            HostTarget::Value(HostValue::Array(array)) => {
                let host_key = self.array_key(&bridge, key)?;
                let value = guest_to_host(&bridge, &value).map_err(to_guest_error)?;
                array.set(host_key, value);
                Ok(())
            }
            _ => Err(GuestError::new(
                "TypeError",
                format!("'{}' object does not support item assignment", self.type_name()),
            )),
        }
    }

    fn len(&self) -> Result<usize, GuestError> {
        match &self.target {
            HostTarget::Value(HostValue::Array(array)) => Ok(array.len()),
            _ => Err(GuestError::new(
                "TypeError",
                format!("object of type '{}' has no len()", self.type_name()),
            )),
        }
    }

    /// Lists yield their values, maps their keys
    fn iterate(&self) -> Result<Vec<GuestValue>, GuestError> {
        let bridge = self.bridge()?;
        match &self.target {
            HostTarget::Value(HostValue::Array(array)) => {
                let items: Vec<HostValue> = if array.is_list() {
                    array.values()
                } else {
                    array.entries().into_iter().map(|(k, _)| k.to_value()).collect()
                };
                items
                    .iter()
                    .map(|v| host_to_guest(&bridge, v, PassMode::ByValue))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(to_guest_error)
            }
            _ => Err(GuestError::new("TypeError", format!("'{}' object is not iterable", self.type_name()))),
        }
    }

    /// Instances and arrays compare with the host's `==`; functions and
    /// classes by identity. A non-proxy is never equal.
    fn equals(&self, other: &GuestValue) -> Result<bool, GuestError> {
        let other = match Value::from_guest(other) {
            Value::HostOpaque(target) => target,
            Value::HostAggregate(array) => HostTarget::Value(HostValue::Array(array)),
            _ => return Ok(false),
        };
        match (&self.target, &other) {
            (
                HostTarget::Value(left @ (HostValue::Object(_) | HostValue::Array(_))),
                HostTarget::Value(right @ (HostValue::Object(_) | HostValue::Array(_))),
            ) => {
                let bridge = self.bridge()?;
                bridge.host().loose_eq(left, right).map_err(host_failure)
            }
            _ => Ok(self.target.identity() == other.identity()),
        }
    }

    fn instance_check(&self, obj: &GuestValue) -> Result<Option<bool>, GuestError> {
        match &self.target {
            HostTarget::Class(class) => Ok(Some(match Value::from_guest(obj) {
                Value::HostOpaque(HostTarget::Value(HostValue::Object(o))) => o.class.is_subclass(class),
                _ => false,
            })),
            _ => Ok(None),
        }
    }

    fn repr(&self) -> String {
        match &self.target {
            HostTarget::Value(HostValue::Function(f)) => format!("<host function {}>", f.name),
            HostTarget::Class(c) => format!("<host class '{}'>", c.name),
            target => format!("<host {} object>", target.type_name()),
        }
    }
}
