//! Error translation - every bridge error surfaces as the receiving
//! runtime's own catchable error.
//!
//! A native error that crossed once carries its original object as a
//! payload, so crossing back restores it instead of wrapping it again.

use super::stats::counters;
use crate::errors::{BridgeError, CallError, ErrorPayload, Runtime};
use crate::runtime::guest::{GuestError, GuestObject};
use crate::runtime::host::{HostError, HostObject, HostValue};
use std::any::Any;
use std::rc::Rc;
use tracing::{error, warn};

/// A guest error escaping from a host-to-guest call
pub fn guest_raised(err: GuestError) -> BridgeError {
    match err {
        GuestError::Raised(exc) => CallError::Raised {
            runtime: Runtime::Guest,
            type_name: exc.class.name.to_string(),
            message: exc.exception_message(),
            payload: ErrorPayload(exc),
        }
        .into(),
        GuestError::Fatal(message) => CallError::Aborted { runtime: Runtime::Guest, message }.into(),
    }
}

/// A host error escaping from a guest-to-host call
pub fn host_raised(err: HostError) -> BridgeError {
    match err {
        HostError::Exception(obj) => {
            let message = HostError::Exception(obj.clone()).message();
            CallError::Raised {
                runtime: Runtime::Host,
                type_name: obj.class.name.to_string(),
                message,
                payload: ErrorPayload(obj),
            }
            .into()
        }
        HostError::Fatal(message) => CallError::Aborted { runtime: Runtime::Host, message }.into(),
    }
}

pub fn to_host_error(err: BridgeError) -> HostError {
    counters().record_translated_error();
    if err.is_fatal() {
        error!(error = %err, "fatal bridge error surfaced in host");
    } else {
        warn!(error = %err, "bridge error surfaced in host");
    }
    match err {
        BridgeError::Call(CallError::Raised { type_name, message, payload, .. }) => {
            match restore_host(&payload) {
                Some(original) => HostError::Exception(original),
                None => guest_exception(&type_name, &message, Some(payload.0)),
            }
        }
        BridgeError::Call(CallError::Aborted { message, .. }) => HostError::Fatal(message),
        BridgeError::Registry(e) => HostError::Fatal(e.to_string()),
        BridgeError::Import(e) => guest_exception("ImportError", &e.message, None),
        other => HostError::throw("BridgeException", other.to_string()),
    }
}

pub fn to_guest_error(err: BridgeError) -> GuestError {
    counters().record_translated_error();
    if err.is_fatal() {
        error!(error = %err, "fatal bridge error surfaced in guest");
    } else {
        warn!(error = %err, "bridge error surfaced in guest");
    }
    match err {
        BridgeError::Call(CallError::Raised { message, payload, .. }) => {
            match restore_guest(&payload) {
                Some(original) => GuestError::Raised(original),
                None => with_payload(GuestError::new("HostException", message), payload.0),
            }
        }
        BridgeError::Call(CallError::Aborted { message, .. }) => GuestError::Fatal(message),
        BridgeError::Registry(e) => GuestError::Fatal(e.to_string()),
        BridgeError::Call(e) => GuestError::new("TypeError", e.to_string()),
        BridgeError::Conversion(e) => GuestError::new("ValueError", e.to_string()),
        BridgeError::Import(e) => GuestError::new("ImportError", e.message),
        BridgeError::Embedding(e) => GuestError::new("SyntaxError", e.to_string()),
    }
}

/// A host failure seen from guest code
pub fn host_failure(err: HostError) -> GuestError {
    to_guest_error(host_raised(err))
}

/// A guest failure seen from host code
pub fn guest_failure(err: GuestError) -> HostError {
    to_host_error(guest_raised(err))
}

fn guest_exception(type_name: &str, message: &str, payload: Option<Rc<dyn Any>>) -> HostError {
    match HostError::throw("GuestException", message) {
        HostError::Exception(obj) => {
            obj.set("guestType", HostValue::str(type_name));
            *obj.payload.borrow_mut() = payload;
            HostError::Exception(obj)
        }
        fatal => fatal,
    }
}

fn with_payload(err: GuestError, payload: Rc<dyn Any>) -> GuestError {
    if let GuestError::Raised(exc) = &err {
        *exc.payload.borrow_mut() = Some(payload);
    }
    err
}

/// The host exception a payload stands for, directly or through the guest
/// exception that wrapped it
fn restore_host(payload: &ErrorPayload) -> Option<Rc<HostObject>> {
    match payload.0.clone().downcast::<HostObject>() {
        Ok(obj) => Some(obj),
        Err(other) => {
            let exc = other.downcast::<GuestObject>().ok()?;
            let inner = exc.payload.borrow().clone()?;
            inner.downcast::<HostObject>().ok()
        }
    }
}

fn restore_guest(payload: &ErrorPayload) -> Option<Rc<GuestObject>> {
    match payload.0.clone().downcast::<GuestObject>() {
        Ok(exc) => Some(exc),
        Err(other) => {
            let obj = other.downcast::<HostObject>().ok()?;
            let inner = obj.payload.borrow().clone()?;
            inner.downcast::<GuestObject>().ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ConversionError, EmbeddingError, IdentityRegistryError, ImportError};

    #[test]
    fn test_guest_exception_keeps_message_and_type() {
        let err = guest_raised(GuestError::new("ValueError", "bad input"));
        let host = to_host_error(err);
        assert_eq!(host.class_name(), "GuestException");
        assert_eq!(host.message(), "bad input");
        match host {
            HostError::Exception(obj) => {
                assert_eq!(obj.get("guestType"), Some(HostValue::str("ValueError")));
            }
            HostError::Fatal(_) => panic!("expected a catchable exception"),
        }
    }

    #[test]
    fn test_round_trip_restores_original_guest_exception() {
        let original = match GuestError::new("KeyError", "k") {
            GuestError::Raised(exc) => exc,
            GuestError::Fatal(_) => unreachable!(),
        };
        let host = to_host_error(guest_raised(GuestError::Raised(original.clone())));
        let back = to_guest_error(host_raised(host));
        match back {
            GuestError::Raised(exc) => assert!(Rc::ptr_eq(&exc, &original)),
            GuestError::Fatal(_) => panic!("expected the original exception"),
        }
    }

    #[test]
    fn test_round_trip_restores_original_host_exception() {
        let original = match HostError::throw("Exception", "from host") {
            HostError::Exception(obj) => obj,
            HostError::Fatal(_) => unreachable!(),
        };
        let guest = host_failure(HostError::Exception(original.clone()));
        assert_eq!(guest.class_name(), "HostException");
        assert_eq!(guest.message(), "from host");
        match guest_failure(guest) {
            HostError::Exception(obj) => assert!(Rc::ptr_eq(&obj, &original)),
            HostError::Fatal(_) => panic!("expected the original exception"),
        }
    }

    #[test]
    fn test_kind_mapping() {
        let conversion = BridgeError::from(ConversionError::DepthExceeded { limit: 2 });
        assert_eq!(to_host_error(conversion.clone()).class_name(), "BridgeException");
        assert_eq!(to_guest_error(conversion).class_name(), "ValueError");

        let import = BridgeError::from(ImportError::new("nope", "No module named nope"));
        let host = to_host_error(import.clone());
        assert_eq!(host.class_name(), "GuestException");
        assert_eq!(host.message(), "No module named nope");
        assert_eq!(to_guest_error(import).class_name(), "ImportError");

        let embed = BridgeError::from(EmbeddingError::Compile {
            operation: "embed_host_func",
            message: "unexpected token".into(),
        });
        assert_eq!(to_guest_error(embed).class_name(), "SyntaxError");

        let arity = BridgeError::from(CallError::MissingArgument { callee: "f".into(), name: "a".into() });
        assert_eq!(to_guest_error(arity).class_name(), "TypeError");
    }

    #[test]
    fn test_registry_errors_are_uncatchable() {
        let err = BridgeError::from(IdentityRegistryError::Detached);
        assert!(matches!(to_host_error(err.clone()), HostError::Fatal(_)));
        assert!(matches!(to_guest_error(err), GuestError::Fatal(_)));
    }
}
