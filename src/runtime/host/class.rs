//! Host classes - single inheritance with a dynamically extensible method table

use super::value::{HostError, HostFunction, HostValue, NativeContext};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

pub struct HostClass {
    pub name: Rc<str>,
    pub parent: Option<Rc<HostClass>>,
    props: Vec<(String, HostValue)>,
    methods: RefCell<IndexMap<String, Rc<HostFunction>>>,
}

impl HostClass {
    pub fn new(name: &str, parent: Option<Rc<HostClass>>, props: Vec<(String, HostValue)>) -> Self {
        Self {
            name: Rc::from(name),
            parent,
            props,
            methods: RefCell::new(IndexMap::new()),
        }
    }

    /// Canonical (case-insensitive) name
    pub fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    /// Install or replace a method on this class only
    pub fn install_method(&self, name: &str, method: Rc<HostFunction>) {
        self.methods.borrow_mut().insert(name.to_ascii_lowercase(), method);
    }

    pub fn has_own_method(&self, name: &str) -> bool {
        self.methods.borrow().contains_key(&name.to_ascii_lowercase())
    }

    /// Resolve through the parent chain; the nearest definition wins
    pub fn find_method(&self, name: &str) -> Option<Rc<HostFunction>> {
        let key = name.to_ascii_lowercase();
        let mut class = Some(self);
        while let Some(c) = class {
            if let Some(m) = c.methods.borrow().get(&key) {
                return Some(m.clone());
            }
            class = c.parent.as_deref();
        }
        None
    }

    /// Property defaults, ancestors first so subclasses override
    pub fn default_props(&self) -> IndexMap<String, HostValue> {
        let mut props = match &self.parent {
            Some(parent) => parent.default_props(),
            None => IndexMap::new(),
        };
        for (name, value) in &self.props {
            props.insert(name.clone(), value.clone());
        }
        props
    }

    pub fn is_subclass_of(&self, name: &str) -> bool {
        let mut class = Some(self);
        while let Some(c) = class {
            if c.name.eq_ignore_ascii_case(name) {
                return true;
            }
            class = c.parent.as_deref();
        }
        false
    }

    pub fn is_subclass(&self, other: &HostClass) -> bool {
        let mut class = Some(self);
        while let Some(c) = class {
            if std::ptr::eq(c, other) {
                return true;
            }
            class = c.parent.as_deref();
        }
        false
    }
}

thread_local! {
    static BUILTIN_CLASSES: IndexMap<String, Rc<HostClass>> = build_builtin_classes();
}

/// Throwable classes every interpreter starts with
pub fn builtin_class(name: &str) -> Option<Rc<HostClass>> {
    BUILTIN_CLASSES.with(|classes| classes.get(&name.to_ascii_lowercase()).cloned())
}

pub fn builtin_classes() -> Vec<Rc<HostClass>> {
    BUILTIN_CLASSES.with(|classes| classes.values().cloned().collect())
}

fn build_builtin_classes() -> IndexMap<String, Rc<HostClass>> {
    let exception = Rc::new(HostClass::new(
        "Exception",
        None,
        vec![("message".to_string(), HostValue::str(""))],
    ));
    exception.install_method(
        "__construct",
        HostFunction::native(
            "__construct",
            Rc::new(|_, ctx: &NativeContext, args| {
                if let Some(HostValue::Object(this)) = &ctx.this {
                    let message = args.into_iter().next().unwrap_or_else(|| HostValue::str(""));
                    this.set("message", message);
                }
                Ok(HostValue::Null)
            }),
        ),
    );
    exception.install_method(
        "getMessage",
        HostFunction::native(
            "getMessage",
            Rc::new(|_, ctx: &NativeContext, _| match &ctx.this {
                Some(HostValue::Object(this)) => Ok(this.get("message").unwrap_or(HostValue::Null)),
                _ => Err(HostError::Fatal("getMessage() called without an instance".into())),
            }),
        ),
    );

    let error = Rc::new(HostClass::new("Error", Some(exception.clone()), Vec::new()));
    let parse_error = Rc::new(HostClass::new("ParseError", Some(error.clone()), Vec::new()));
    let bridge = Rc::new(HostClass::new("BridgeException", Some(exception.clone()), Vec::new()));
    let guest = Rc::new(HostClass::new(
        "GuestException",
        Some(exception.clone()),
        vec![("guestType".to_string(), HostValue::str("Exception"))],
    ));

    [exception, error, parse_error, bridge, guest]
        .into_iter()
        .map(|c| (c.key(), c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> Rc<HostFunction> {
        HostFunction::native(name, Rc::new(|_, _, _| Ok(HostValue::Null)))
    }

    #[test]
    fn test_method_resolution_prefers_subclass() {
        let base = Rc::new(HostClass::new("B", None, Vec::new()));
        let derived = Rc::new(HostClass::new("D", Some(base.clone()), Vec::new()));
        base.install_method("m", leaf("base_m"));
        assert_eq!(&*derived.find_method("M").unwrap().name, "base_m");

        derived.install_method("m", leaf("derived_m"));
        assert_eq!(&*derived.find_method("m").unwrap().name, "derived_m");
        assert_eq!(&*base.find_method("m").unwrap().name, "base_m");
    }

    #[test]
    fn test_props_inherit_and_override() {
        let base = Rc::new(HostClass::new(
            "A",
            None,
            vec![("x".into(), HostValue::Int(1)), ("y".into(), HostValue::Int(2))],
        ));
        let derived = HostClass::new("B", Some(base), vec![("y".into(), HostValue::Int(3))]);
        let props = derived.default_props();
        assert_eq!(props.get("x"), Some(&HostValue::Int(1)));
        assert_eq!(props.get("y"), Some(&HostValue::Int(3)));
    }

    #[test]
    fn test_builtin_throwables_extend_exception() {
        for name in ["Error", "BridgeException", "GuestException", "ParseError"] {
            let class = builtin_class(name).unwrap();
            assert!(class.is_subclass_of("exception"), "{}", name);
        }
        assert!(builtin_class("Nope").is_none());
    }
}
