//! Call marshaler - calls crossing the boundary in either direction
//!
//! Arguments are bound against the destination's declared signature before
//! any of them is converted, so arity errors name the callee and
//! reference-preserving parameters can be honoured per slot. Empty slots
//! keep the destination's own defaults.

use super::marshal::{guest_to_host, host_to_guest};
use super::proxy::HostProxy;
use super::stats::counters;
use super::translate::{guest_raised, host_raised};
use super::types::PassMode;
use super::Bridge;
use crate::errors::{BridgeError, CallError};
use crate::runtime::guest::GuestValue;
use crate::runtime::host::{HostCallable, HostClass, HostFunction, HostObject, HostValue};
use crate::runtime::signature::{CallArgs, CallFrame, Signature};
use std::rc::Rc;
use tracing::debug_span;

fn pass_mode(signature: &Signature, slot: Option<usize>) -> PassMode {
    match slot {
        Some(i) if signature.preserves_ref(i) => PassMode::ByReference,
        _ => PassMode::ByValue,
    }
}

fn convert_frame(
    bridge: &Rc<Bridge>,
    signature: &Signature,
    args: CallArgs<HostValue>,
) -> Result<CallFrame<GuestValue>, BridgeError> {
    signature
        .bind(args)?
        .map(|slot, value| host_to_guest(bridge, &value, pass_mode(signature, slot)))
}

/// Call a guest callable from host code
pub fn invoke_guest(
    bridge: &Rc<Bridge>,
    callee: &GuestValue,
    args: CallArgs<HostValue>,
) -> Result<HostValue, BridgeError> {
    let _span = debug_span!("host_to_guest", callee = %callee.type_name(), args = args.len()).entered();
    counters().record_host_to_guest();

    let guest = bridge.guest();
    let result = match callee {
        GuestValue::Function(function) => {
            let frame = convert_frame(bridge, &function.signature, args)?;
            guest.call_function(function, frame)
        }
        GuestValue::BoundMethod(method) => match &method.function {
            GuestValue::Function(function) => {
                let mut frame = convert_frame(bridge, &function.signature.without_receiver(), args)?;
                frame.slots.insert(0, Some(method.receiver.clone()));
                guest.call_function(function, frame)
            }
            other => {
                let args = convert_args(bridge, args)?.with_receiver(method.receiver.clone());
                guest.call(other, args.positional, args.named.into_iter().collect())
            }
        },
        other => {
            let args = convert_args(bridge, args)?;
            guest.call(other, args.positional, args.named.into_iter().collect())
        }
    };
    let value = result.map_err(guest_raised)?;
    guest_to_host(bridge, &value)
}

/// Arguments for a callee without a declared signature
fn convert_args(bridge: &Rc<Bridge>, args: CallArgs<HostValue>) -> Result<CallArgs<GuestValue>, BridgeError> {
    args.map(|v| host_to_guest(bridge, &v, PassMode::ByValue))
}

/// Call a host function from guest code; `this` is set for methods
pub fn invoke_host(
    bridge: &Rc<Bridge>,
    function: &Rc<HostFunction>,
    this: Option<HostValue>,
    args: CallArgs<GuestValue>,
) -> Result<GuestValue, BridgeError> {
    let _span = debug_span!("guest_to_host", callee = %function.name, args = args.len()).entered();
    counters().record_guest_to_host();

    // installed from the guest: call it there directly so named arguments survive
    if let Some(guest) = HostProxy::backing(function) {
        let args = match this {
            Some(this) => args.with_receiver(host_to_guest(bridge, &this, PassMode::ByValue)?),
            None => args,
        };
        return bridge
            .guest()
            .call(guest, args.positional, args.named.into_iter().collect())
            .map_err(guest_raised);
    }

    let host = bridge.host();
    let result = match &function.body {
        HostCallable::User(decl) => {
            let frame = decl.signature.bind(args)?.map(|_, value| guest_to_host(bridge, &value))?;
            host.invoke_bound(function, frame, this)
        }
        HostCallable::Native(_) | HostCallable::Foreign(_) => {
            if !args.named.is_empty() {
                return Err(CallError::NamedUnsupported { callee: function.name.to_string() }.into());
            }
            let args = args
                .positional
                .iter()
                .map(|v| guest_to_host(bridge, v))
                .collect::<Result<Vec<_>, _>>()?;
            host.call_function(function, args, this)
        }
    };
    let value = result.map_err(host_raised)?;
    host_to_guest(bridge, &value, PassMode::ByValue)
}

/// Instantiate a host class from guest code
pub fn instantiate_host(
    bridge: &Rc<Bridge>,
    class: &Rc<HostClass>,
    args: CallArgs<GuestValue>,
) -> Result<GuestValue, BridgeError> {
    let object = HostValue::Object(Rc::new(HostObject::new(class.clone())));
    if let Some(ctor) = class.find_method("__construct") {
        invoke_host(bridge, &ctor, Some(object.clone()), args)?;
    }
    host_to_guest(bridge, &object, PassMode::ByValue)
}
