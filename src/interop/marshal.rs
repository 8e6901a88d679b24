//! Primitive converter - values crossing the boundary
//!
//! Primitives convert directly. Aggregates are copied element by element
//! unless passed by reference. Opaque values become proxies, and a proxy
//! returning to its own runtime is unwrapped.

use super::proxy::{guest_proxy, host_proxy};
use super::types::{HostTarget, PassMode, Value};
use super::Bridge;
use crate::errors::{BridgeError, ConversionError};
use crate::runtime::guest::{DictKey, GuestValue};
use crate::runtime::host::{ArrayKey, HostArray, HostValue};
use indexmap::IndexMap;
use std::rc::Rc;

pub fn host_to_guest(bridge: &Rc<Bridge>, value: &HostValue, mode: PassMode) -> Result<GuestValue, BridgeError> {
    convert_host(bridge, value, mode, 0)
}

pub fn guest_to_host(bridge: &Rc<Bridge>, value: &GuestValue) -> Result<HostValue, BridgeError> {
    convert_guest(bridge, value, 0)
}

fn depth_check(bridge: &Bridge, depth: usize) -> Result<(), BridgeError> {
    let limit = bridge.config().conversion.max_depth;
    if depth >= limit {
        return Err(ConversionError::DepthExceeded { limit }.into());
    }
    Ok(())
}

fn convert_host(bridge: &Rc<Bridge>, value: &HostValue, mode: PassMode, depth: usize) -> Result<GuestValue, BridgeError> {
    Ok(match Value::from_host(value) {
        Value::Null => GuestValue::None,
        Value::Bool(b) => GuestValue::Bool(b),
        Value::Int(i) => GuestValue::Int(i),
        Value::Float(f) => GuestValue::Float(f),
        Value::Str(s) => GuestValue::Str(s),
        Value::HostAggregate(array) => match mode {
            PassMode::ByReference => guest_proxy(bridge, HostTarget::Value(HostValue::Array(array)))?,
            PassMode::ByValue => copy_array(bridge, &array, depth)?,
        },
        Value::GuestAggregate(original) | Value::GuestOpaque(original) => original,
        Value::HostOpaque(target) => guest_proxy(bridge, target)?,
    })
}

/// Lists (keys `0..n` in order) become guest lists, anything else a dict
fn copy_array(bridge: &Rc<Bridge>, array: &HostArray, depth: usize) -> Result<GuestValue, BridgeError> {
    depth_check(bridge, depth)?;
    if array.is_list() {
        let items = array
            .values()
            .iter()
            .map(|v| convert_host(bridge, v, PassMode::ByValue, depth + 1))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(GuestValue::list(items));
    }
    let mut entries = IndexMap::with_capacity(array.len());
    for (key, value) in array.entries() {
        let key = match key {
            ArrayKey::Int(i) => DictKey::Int(i),
            ArrayKey::Str(s) => DictKey::Str(s),
        };
        entries.insert(key, convert_host(bridge, &value, PassMode::ByValue, depth + 1)?);
    }
    Ok(GuestValue::dict(entries))
}

fn convert_guest(bridge: &Rc<Bridge>, value: &GuestValue, depth: usize) -> Result<HostValue, BridgeError> {
    Ok(match Value::from_guest(value) {
        Value::Null => HostValue::Null,
        Value::Bool(b) => HostValue::Bool(b),
        Value::Int(i) => HostValue::Int(i),
        Value::Float(f) => HostValue::Float(f),
        Value::Str(s) => HostValue::Str(s),
        Value::HostAggregate(array) => HostValue::Array(array),
        Value::HostOpaque(HostTarget::Value(original)) => original,
        // Host code names classes by string
        Value::HostOpaque(HostTarget::Class(class)) => HostValue::Str(class.name.clone()),
        Value::GuestAggregate(aggregate) => copy_aggregate(bridge, &aggregate, depth)?,
        Value::GuestOpaque(target) => host_proxy(bridge, target)?,
    })
}

fn copy_aggregate(bridge: &Rc<Bridge>, value: &GuestValue, depth: usize) -> Result<HostValue, BridgeError> {
    depth_check(bridge, depth)?;
    let array = HostArray::new();
    match value {
        GuestValue::List(items) => {
            let items = items.borrow().clone();
            for item in &items {
                array.push(convert_guest(bridge, item, depth + 1)?);
            }
        }
        GuestValue::Tuple(items) => {
            for item in items.iter() {
                array.push(convert_guest(bridge, item, depth + 1)?);
            }
        }
        GuestValue::Dict(entries) => {
            let entries: Vec<(DictKey, GuestValue)> =
                entries.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            for (key, item) in entries {
                let key = match key {
                    DictKey::Int(i) => ArrayKey::Int(i),
                    DictKey::Str(s) => ArrayKey::Str(s),
                    other => {
                        return Err(ConversionError::UnsupportedKey { kind: other.kind().to_string() }.into())
                    }
                };
                array.set(key, convert_guest(bridge, &item, depth + 1)?);
            }
        }
        other => return host_proxy(bridge, other.clone()),
    }
    Ok(HostValue::Array(Rc::new(array)))
}
