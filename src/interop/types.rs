//! Value classification - the tagged union both runtimes are viewed through
//!
//! A proxy crossing back to the runtime that owns its target classifies as
//! the value it wraps, so conversion unwraps instead of double-wrapping.

use super::proxy::{GuestProxy, HostProxy};
use crate::runtime::guest::GuestValue;
use crate::runtime::host::{HostArray, HostClass, HostValue};
use serde::Serialize;
use std::rc::{Rc, Weak};

/// Which way a proxy points: from the runtime owning the object to the
/// runtime holding the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    HostToGuest,
    GuestToHost,
}

/// Proxy family, chosen once when the proxy is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProxyKind {
    Function,
    Module,
    Class,
    Instance,
    /// By-reference aggregates and any other attribute holder
    Generic,
}

/// How an argument crosses the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassMode {
    #[default]
    ByValue,
    /// Host aggregates are proxied, keeping identity and mutability
    ByReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Primitive,
    Aggregate,
    Opaque(ProxyKind),
}

/// Host object a guest-side proxy stands for. Classes are not host values,
/// but guest code can still call them and use them with `isinstance`.
#[derive(Clone)]
pub enum HostTarget {
    Value(HostValue),
    Class(Rc<HostClass>),
}

impl HostTarget {
    pub fn identity(&self) -> usize {
        match self {
            HostTarget::Value(v) => v.identity().unwrap_or(0),
            HostTarget::Class(c) => Rc::as_ptr(c) as *const () as usize,
        }
    }

    pub fn kind(&self) -> ProxyKind {
        match self {
            HostTarget::Value(HostValue::Object(_)) => ProxyKind::Instance,
            HostTarget::Value(HostValue::Function(_)) => ProxyKind::Function,
            HostTarget::Value(_) => ProxyKind::Generic,
            HostTarget::Class(_) => ProxyKind::Class,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            HostTarget::Value(v) => v.type_name(),
            HostTarget::Class(c) => c.name.to_string(),
        }
    }

    /// Liveness check that does not keep the target alive
    pub fn watch(&self) -> Box<dyn Fn() -> bool> {
        match self {
            HostTarget::Value(HostValue::Array(a)) => watch(a),
            HostTarget::Value(HostValue::Object(o)) => watch(o),
            HostTarget::Value(HostValue::Function(f)) => watch(f),
            HostTarget::Value(HostValue::Foreign(f)) => watch(f),
            HostTarget::Value(_) => Box::new(|| true),
            HostTarget::Class(c) => watch(c),
        }
    }
}

/// Liveness check for a guest value with identity
pub fn watch_guest(value: &GuestValue) -> Box<dyn Fn() -> bool> {
    match value {
        GuestValue::List(l) => watch(l),
        GuestValue::Dict(d) => watch(d),
        GuestValue::Function(f) => watch(f),
        GuestValue::Builtin(b) => watch(b),
        GuestValue::BoundMethod(m) => watch(m),
        GuestValue::Module(m) => watch(m),
        GuestValue::Class(c) => watch(c),
        GuestValue::Object(o) => watch(o),
        GuestValue::Foreign(f) => watch(f),
        _ => Box::new(|| true),
    }
}

fn watch<T: ?Sized + 'static>(rc: &Rc<T>) -> Box<dyn Fn() -> bool> {
    let weak: Weak<T> = Rc::downgrade(rc);
    Box::new(move || weak.strong_count() > 0)
}

/// A value of either runtime, as seen by the bridge
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    HostAggregate(Rc<HostArray>),
    /// A guest list, tuple or dict
    GuestAggregate(GuestValue),
    HostOpaque(HostTarget),
    GuestOpaque(GuestValue),
}

impl Value {
    pub fn from_host(value: &HostValue) -> Value {
        match value {
            HostValue::Null => Value::Null,
            HostValue::Bool(b) => Value::Bool(*b),
            HostValue::Int(i) => Value::Int(*i),
            HostValue::Float(f) => Value::Float(*f),
            HostValue::Str(s) => Value::Str(s.clone()),
            HostValue::Array(a) => Value::HostAggregate(a.clone()),
            HostValue::Foreign(f) => match f.as_any().downcast_ref::<HostProxy>() {
                Some(proxy) => Value::from_guest(proxy.target()),
                None => Value::HostOpaque(HostTarget::Value(value.clone())),
            },
            HostValue::Function(f) => match HostProxy::backing(f) {
                Some(guest) => Value::from_guest(guest),
                None => Value::HostOpaque(HostTarget::Value(value.clone())),
            },
            HostValue::Object(_) => Value::HostOpaque(HostTarget::Value(value.clone())),
        }
    }

    pub fn from_guest(value: &GuestValue) -> Value {
        match value {
            GuestValue::None => Value::Null,
            GuestValue::Bool(b) => Value::Bool(*b),
            GuestValue::Int(i) => Value::Int(*i),
            GuestValue::Float(f) => Value::Float(*f),
            GuestValue::Str(s) => Value::Str(s.clone()),
            GuestValue::List(_) | GuestValue::Tuple(_) | GuestValue::Dict(_) => {
                Value::GuestAggregate(value.clone())
            }
            GuestValue::Foreign(f) => match f.as_any().downcast_ref::<GuestProxy>() {
                Some(proxy) => match proxy.target() {
                    HostTarget::Value(v) => Value::from_host(v),
                    class => Value::HostOpaque(class.clone()),
                },
                None => Value::GuestOpaque(value.clone()),
            },
            _ => Value::GuestOpaque(value.clone()),
        }
    }

    pub fn classify(&self) -> Classification {
        match self {
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => {
                Classification::Primitive
            }
            Value::HostAggregate(_) | Value::GuestAggregate(_) => Classification::Aggregate,
            Value::HostOpaque(target) => Classification::Opaque(target.kind()),
            Value::GuestOpaque(value) => Classification::Opaque(guest_kind(value)),
        }
    }
}

/// Proxy family for a guest value, by capability
pub fn guest_kind(value: &GuestValue) -> ProxyKind {
    match value {
        GuestValue::Function(_) | GuestValue::Builtin(_) | GuestValue::BoundMethod(_) => {
            ProxyKind::Function
        }
        GuestValue::Module(_) => ProxyKind::Module,
        GuestValue::Class(_) => ProxyKind::Class,
        GuestValue::Object(_) => ProxyKind::Instance,
        _ => ProxyKind::Generic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::guest::GuestModule;
    use crate::runtime::host::HostObject;

    #[test]
    fn test_primitives_classify_as_primitive() {
        for value in [HostValue::Null, HostValue::Int(3), HostValue::Float(f64::NAN), HostValue::str("s")] {
            assert_eq!(Value::from_host(&value).classify(), Classification::Primitive);
        }
        assert_eq!(Value::from_guest(&GuestValue::Bool(true)).classify(), Classification::Primitive);
    }

    #[test]
    fn test_aggregates_and_opaques() {
        let array = HostValue::list(vec![HostValue::Int(1)]);
        assert_eq!(Value::from_host(&array).classify(), Classification::Aggregate);

        let class = Rc::new(HostClass::new("C", None, Vec::new()));
        let object = HostValue::Object(Rc::new(HostObject::new(class.clone())));
        assert_eq!(
            Value::from_host(&object).classify(),
            Classification::Opaque(ProxyKind::Instance)
        );
        assert_eq!(HostTarget::Class(class).kind(), ProxyKind::Class);

        let module = GuestValue::Module(GuestModule::new("m"));
        assert_eq!(
            Value::from_guest(&module).classify(),
            Classification::Opaque(ProxyKind::Module)
        );
        assert_eq!(
            Value::from_guest(&GuestValue::tuple(vec![])).classify(),
            Classification::Aggregate
        );
    }

    #[test]
    fn test_watch_tracks_target_lifetime() {
        let class = Rc::new(HostClass::new("C", None, Vec::new()));
        let target = HostTarget::Value(HostValue::Object(Rc::new(HostObject::new(class))));
        let alive = target.watch();
        assert!(alive());
        drop(target);
        assert!(!alive());
    }
}
