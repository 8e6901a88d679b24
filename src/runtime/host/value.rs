//! Host values - scalars, shared ordered arrays, class instances, callables
//!
//! Design:
//! - Arrays are shared handles: every holder observes mutation
//! - Objects carry an optional payload slot used when an error object
//!   travels through the other runtime and must be restored on return
//! - `Foreign` wraps a value owned by another runtime behind `HostForeign`

use super::ast::FunctionDecl;
use super::class::{builtin_class, HostClass};
use super::interp::HostInterp;
use indexmap::IndexMap;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

pub type HostScope = Rc<RefCell<IndexMap<String, HostValue>>>;

pub fn new_scope() -> HostScope {
    Rc::new(RefCell::new(IndexMap::new()))
}

#[derive(Clone)]
pub enum HostValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Array(Rc<HostArray>),
    Object(Rc<HostObject>),
    Function(Rc<HostFunction>),
    Foreign(Rc<dyn HostForeign>),
}

impl HostValue {
    pub fn str(s: &str) -> Self {
        HostValue::Str(Rc::from(s))
    }

    pub fn list(values: Vec<HostValue>) -> Self {
        HostValue::Array(Rc::new(HostArray::from_list(values)))
    }

    pub fn type_name(&self) -> String {
        match self {
            HostValue::Null => "null".to_string(),
            HostValue::Bool(_) => "bool".to_string(),
            HostValue::Int(_) => "int".to_string(),
            HostValue::Float(_) => "float".to_string(),
            HostValue::Str(_) => "string".to_string(),
            HostValue::Array(_) => "array".to_string(),
            HostValue::Object(o) => o.class.name.to_string(),
            HostValue::Function(_) => "Closure".to_string(),
            HostValue::Foreign(f) => f.type_name(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            HostValue::Null => false,
            HostValue::Bool(b) => *b,
            HostValue::Int(i) => *i != 0,
            HostValue::Float(f) => *f != 0.0,
            HostValue::Str(s) => !s.is_empty() && &**s != "0",
            HostValue::Array(a) => a.len() > 0,
            _ => true,
        }
    }

    /// Address of the shared allocation, for values that have identity
    pub fn identity(&self) -> Option<usize> {
        match self {
            HostValue::Array(a) => Some(Rc::as_ptr(a) as *const () as usize),
            HostValue::Object(o) => Some(Rc::as_ptr(o) as *const () as usize),
            HostValue::Function(f) => Some(Rc::as_ptr(f) as *const () as usize),
            HostValue::Foreign(f) => Some(Rc::as_ptr(f) as *const () as usize),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => write!(f, "null"),
            HostValue::Bool(b) => write!(f, "{}", b),
            HostValue::Int(i) => write!(f, "{}", i),
            HostValue::Float(x) => write!(f, "{:?}", x),
            HostValue::Str(s) => write!(f, "{:?}", s),
            HostValue::Array(a) => f.debug_map().entries(a.entries()).finish(),
            HostValue::Object(o) => write!(f, "object({})", o.class.name),
            HostValue::Function(func) => write!(f, "function {}", func.name),
            HostValue::Foreign(p) => write!(f, "foreign({})", p.type_name()),
        }
    }
}

impl PartialEq for HostValue {
    /// Structural comparison for tests; language-level equality lives in
    /// `HostInterp::loose_eq` / `strict_eq`.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (HostValue::Str(a), HostValue::Str(b)) => a == b,
            (HostValue::Array(a), HostValue::Array(b)) => {
                Rc::ptr_eq(a, b) || a.entries() == b.entries()
            }
            _ => match (self.identity(), other.identity()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayKey {
    Int(i64),
    Str(Rc<str>),
}

impl ArrayKey {
    /// Key normalisation: integral strings become integer keys
    pub fn from_value(value: &HostValue) -> Option<ArrayKey> {
        match value {
            HostValue::Int(i) => Some(ArrayKey::Int(*i)),
            HostValue::Bool(b) => Some(ArrayKey::Int(*b as i64)),
            HostValue::Float(f) if f.is_finite() => Some(ArrayKey::Int(f.trunc() as i64)),
            HostValue::Null => Some(ArrayKey::Str(Rc::from(""))),
            HostValue::Str(s) => Some(match s.parse::<i64>() {
                Ok(i) if i.to_string() == **s => ArrayKey::Int(i),
                _ => ArrayKey::Str(s.clone()),
            }),
            _ => None,
        }
    }

    pub fn to_value(&self) -> HostValue {
        match self {
            ArrayKey::Int(i) => HostValue::Int(*i),
            ArrayKey::Str(s) => HostValue::Str(s.clone()),
        }
    }
}

/// Insertion-ordered map with an auto-increment index for appends
#[derive(Default)]
pub struct HostArray {
    entries: RefCell<IndexMap<ArrayKey, HostValue>>,
    next_index: Cell<i64>,
}

impl HostArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_list(values: Vec<HostValue>) -> Self {
        let array = Self::new();
        for v in values {
            array.push(v);
        }
        array
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &ArrayKey) -> Option<HostValue> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn set(&self, key: ArrayKey, value: HostValue) {
        if let ArrayKey::Int(i) = key {
            if i >= self.next_index.get() {
                self.next_index.set(i + 1);
            }
        }
        self.entries.borrow_mut().insert(key, value);
    }

    pub fn push(&self, value: HostValue) {
        let index = self.next_index.get();
        self.set(ArrayKey::Int(index), value);
    }

    /// Snapshot of the entries; callers may mutate the array while iterating it
    pub fn entries(&self) -> Vec<(ArrayKey, HostValue)> {
        self.entries.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn values(&self) -> Vec<HostValue> {
        self.entries.borrow().values().cloned().collect()
    }

    /// Keys are exactly `0..len` in order
    pub fn is_list(&self) -> bool {
        self.entries
            .borrow()
            .keys()
            .enumerate()
            .all(|(i, k)| *k == ArrayKey::Int(i as i64))
    }
}

pub struct HostObject {
    pub class: Rc<HostClass>,
    pub props: RefCell<IndexMap<String, HostValue>>,
    pub payload: RefCell<Option<Rc<dyn Any>>>,
}

impl HostObject {
    pub fn new(class: Rc<HostClass>) -> Self {
        let props = class.default_props();
        Self { class, props: RefCell::new(props), payload: RefCell::new(None) }
    }

    pub fn get(&self, name: &str) -> Option<HostValue> {
        self.props.borrow().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: HostValue) {
        self.props.borrow_mut().insert(name.to_string(), value);
    }

    pub fn is_instance_of(&self, class_name: &str) -> bool {
        self.class.is_subclass_of(class_name)
    }
}

/// Context handed to native functions
pub struct NativeContext {
    pub this: Option<HostValue>,
    /// Variable scope of the calling code
    pub scope: HostScope,
}

pub type NativeFn = Rc<dyn Fn(&HostInterp, &NativeContext, Vec<HostValue>) -> Result<HostValue, HostError>>;

pub enum HostCallable {
    User(Rc<FunctionDecl>),
    Native(NativeFn),
    /// A callable owned by another runtime; a method receives `$this` first
    Foreign(Rc<dyn HostForeign>),
}

pub struct HostFunction {
    pub name: Rc<str>,
    pub body: HostCallable,
}

impl HostFunction {
    pub fn native(name: &str, f: NativeFn) -> Rc<Self> {
        Rc::new(Self { name: Rc::from(name), body: HostCallable::Native(f) })
    }

    pub fn foreign(name: &str, target: Rc<dyn HostForeign>) -> Rc<Self> {
        Rc::new(Self { name: Rc::from(name), body: HostCallable::Foreign(target) })
    }
}

/// Capability interface of values owned by another runtime.
///
/// Every operation defaults to the error the host raises for a value that
/// does not support it.
pub trait HostForeign {
    fn type_name(&self) -> String;

    fn as_any(&self) -> &dyn Any;

    fn get_property(&self, name: &str) -> Result<HostValue, HostError> {
        Err(HostError::error(format!(
            "Undefined property: {}::${}",
            self.type_name(),
            name
        )))
    }

    fn set_property(&self, name: &str, _value: HostValue) -> Result<(), HostError> {
        Err(HostError::error(format!(
            "Cannot set property {} on {}",
            name,
            self.type_name()
        )))
    }

    fn call_method(&self, name: &str, _args: Vec<HostValue>) -> Result<HostValue, HostError> {
        Err(HostError::error(format!(
            "Call to undefined method {}::{}()",
            self.type_name(),
            name
        )))
    }

    fn invoke(&self, _args: Vec<HostValue>) -> Result<HostValue, HostError> {
        Err(HostError::error(format!("Object of type {} is not callable", self.type_name())))
    }

    fn get_index(&self, _key: &HostValue) -> Result<HostValue, HostError> {
        Err(HostError::error(format!("Cannot use object of type {} as array", self.type_name())))
    }

    fn loose_eq(&self, _other: &HostValue) -> Result<bool, HostError> {
        Ok(false)
    }

    fn to_host_string(&self) -> Result<String, HostError> {
        Err(HostError::error(format!(
            "Object of class {} could not be converted to string",
            self.type_name()
        )))
    }
}

/// Host-level failure. `Exception` is catchable; `Fatal` is not.
#[derive(Clone)]
pub enum HostError {
    Exception(Rc<HostObject>),
    Fatal(String),
}

impl HostError {
    /// Raise an instance of a built-in throwable class
    pub fn throw(class: &str, message: impl Into<String>) -> Self {
        match builtin_class(class) {
            Some(class) => HostError::Exception(new_throwable(class, message.into())),
            None => HostError::Fatal(format!("unknown exception class {}", class)),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::throw("Error", message)
    }

    pub fn class_name(&self) -> String {
        match self {
            HostError::Exception(obj) => obj.class.name.to_string(),
            HostError::Fatal(_) => "Fatal".to_string(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            HostError::Exception(obj) => match obj.get("message") {
                Some(HostValue::Str(s)) => s.to_string(),
                _ => String::new(),
            },
            HostError::Fatal(msg) => msg.clone(),
        }
    }
}

pub fn new_throwable(class: Rc<HostClass>, message: String) -> Rc<HostObject> {
    let obj = Rc::new(HostObject::new(class));
    obj.set("message", HostValue::Str(Rc::from(message)));
    obj
}

impl fmt::Debug for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Exception(_) => write!(f, "{}: {}", self.class_name(), self.message()),
            HostError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Exception(_) => {
                write!(f, "Uncaught {}: {}", self.class_name(), self.message())
            }
            HostError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for HostError {}
