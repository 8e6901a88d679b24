//! Guest values - dynamically typed objects, modules, classes and callables
//!
//! Design:
//! - Containers are shared handles (`Rc<RefCell<..>>`), as in the host
//! - Exceptions are ordinary instances of built-in exception classes,
//!   available from any code through a thread-scoped class table
//! - `Foreign` wraps a value owned by another runtime behind `GuestForeign`

use super::ast::Stmt;
use super::interp::GuestInterp;
use crate::runtime::signature::Signature;
use indexmap::IndexMap;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type Kwargs = Vec<(Rc<str>, GuestValue)>;
pub type BuiltinFn = Rc<dyn Fn(&GuestInterp, Vec<GuestValue>, Kwargs) -> Result<GuestValue, GuestError>>;

#[derive(Clone)]
pub enum GuestValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<GuestValue>>>),
    Tuple(Rc<[GuestValue]>),
    Dict(Rc<RefCell<IndexMap<DictKey, GuestValue>>>),
    Function(Rc<GuestFunction>),
    Builtin(Rc<GuestBuiltin>),
    BoundMethod(Rc<BoundMethod>),
    Module(Rc<GuestModule>),
    Class(Rc<GuestClass>),
    Object(Rc<GuestObject>),
    Foreign(Rc<dyn GuestForeign>),
}

impl GuestValue {
    pub fn str(s: &str) -> Self {
        GuestValue::Str(Rc::from(s))
    }

    pub fn list(values: Vec<GuestValue>) -> Self {
        GuestValue::List(Rc::new(RefCell::new(values)))
    }

    pub fn tuple(values: Vec<GuestValue>) -> Self {
        GuestValue::Tuple(Rc::from(values))
    }

    pub fn dict(entries: IndexMap<DictKey, GuestValue>) -> Self {
        GuestValue::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn builtin(
        name: &str,
        f: impl Fn(&GuestInterp, Vec<GuestValue>, Kwargs) -> Result<GuestValue, GuestError> + 'static,
    ) -> Self {
        GuestValue::Builtin(Rc::new(GuestBuiltin { name: Rc::from(name), func: Rc::new(f) }))
    }

    pub fn type_name(&self) -> String {
        match self {
            GuestValue::None => "NoneType".to_string(),
            GuestValue::Bool(_) => "bool".to_string(),
            GuestValue::Int(_) => "int".to_string(),
            GuestValue::Float(_) => "float".to_string(),
            GuestValue::Str(_) => "str".to_string(),
            GuestValue::List(_) => "list".to_string(),
            GuestValue::Tuple(_) => "tuple".to_string(),
            GuestValue::Dict(_) => "dict".to_string(),
            GuestValue::Function(_) => "function".to_string(),
            GuestValue::Builtin(_) => "builtin_function_or_method".to_string(),
            GuestValue::BoundMethod(_) => "method".to_string(),
            GuestValue::Module(_) => "module".to_string(),
            GuestValue::Class(_) => "type".to_string(),
            GuestValue::Object(o) => o.class.name.to_string(),
            GuestValue::Foreign(f) => f.type_name(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            GuestValue::None => false,
            GuestValue::Bool(b) => *b,
            GuestValue::Int(i) => *i != 0,
            GuestValue::Float(f) => *f != 0.0,
            GuestValue::Str(s) => !s.is_empty(),
            GuestValue::List(l) => !l.borrow().is_empty(),
            GuestValue::Tuple(t) => !t.is_empty(),
            GuestValue::Dict(d) => !d.borrow().is_empty(),
            _ => true,
        }
    }

    /// Address of the shared allocation, for reference values
    pub fn identity(&self) -> Option<usize> {
        fn addr<T: ?Sized>(rc: &Rc<T>) -> usize {
            Rc::as_ptr(rc) as *const () as usize
        }
        match self {
            GuestValue::Str(s) => Some(addr(s)),
            GuestValue::List(l) => Some(addr(l)),
            GuestValue::Tuple(t) => Some(addr(t)),
            GuestValue::Dict(d) => Some(addr(d)),
            GuestValue::Function(f) => Some(addr(f)),
            GuestValue::Builtin(b) => Some(addr(b)),
            GuestValue::BoundMethod(m) => Some(addr(m)),
            GuestValue::Module(m) => Some(addr(m)),
            GuestValue::Class(c) => Some(addr(c)),
            GuestValue::Object(o) => Some(addr(o)),
            GuestValue::Foreign(f) => Some(addr(f)),
            _ => None,
        }
    }
}

impl fmt::Debug for GuestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestValue::None => write!(f, "None"),
            GuestValue::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            GuestValue::Int(i) => write!(f, "{}", i),
            GuestValue::Float(x) => write!(f, "{:?}", x),
            GuestValue::Str(s) => write!(f, "{:?}", s),
            GuestValue::List(l) => f.debug_list().entries(l.borrow().iter()).finish(),
            GuestValue::Tuple(t) => f.debug_tuple("").field(t).finish(),
            GuestValue::Dict(d) => f.debug_map().entries(d.borrow().iter()).finish(),
            GuestValue::Function(func) => write!(f, "<function {}>", func.name),
            GuestValue::Builtin(b) => write!(f, "<built-in function {}>", b.name),
            GuestValue::BoundMethod(_) => write!(f, "<bound method>"),
            GuestValue::Module(m) => write!(f, "<module '{}'>", m.name),
            GuestValue::Class(c) => write!(f, "<class '{}'>", c.name),
            GuestValue::Object(o) => write!(f, "<{} object>", o.class.name),
            GuestValue::Foreign(p) => write!(f, "<foreign {}>", p.type_name()),
        }
    }
}

impl PartialEq for GuestValue {
    /// Structural comparison for tests; language-level `==` is
    /// `GuestInterp::equals`.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (GuestValue::None, GuestValue::None) => true,
            (GuestValue::Bool(a), GuestValue::Bool(b)) => a == b,
            (GuestValue::Int(a), GuestValue::Int(b)) => a == b,
            (GuestValue::Float(a), GuestValue::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (GuestValue::Str(a), GuestValue::Str(b)) => a == b,
            (GuestValue::List(a), GuestValue::List(b)) => *a.borrow() == *b.borrow(),
            (GuestValue::Tuple(a), GuestValue::Tuple(b)) => a == b,
            (GuestValue::Dict(a), GuestValue::Dict(b)) => *a.borrow() == *b.borrow(),
            _ => match (self.identity(), other.identity()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// Hashable projection of a dict key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Rc<[DictKey]>),
}

impl DictKey {
    /// `True`/`1`/`1.0` collapse to one key, as they hash equal
    pub fn from_value(value: &GuestValue) -> Result<DictKey, GuestError> {
        match value {
            GuestValue::None => Ok(DictKey::None),
            GuestValue::Bool(b) => Ok(DictKey::Int(*b as i64)),
            GuestValue::Int(i) => Ok(DictKey::Int(*i)),
            GuestValue::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(DictKey::Int(*f as i64)),
            GuestValue::Float(f) => Ok(DictKey::Float(f.to_bits())),
            GuestValue::Str(s) => Ok(DictKey::Str(s.clone())),
            GuestValue::Tuple(items) => Ok(DictKey::Tuple(
                items.iter().map(DictKey::from_value).collect::<Result<Vec<_>, _>>()?.into(),
            )),
            other => Err(GuestError::new(
                "TypeError",
                format!("unhashable type: '{}'", other.type_name()),
            )),
        }
    }

    pub fn to_value(&self) -> GuestValue {
        match self {
            DictKey::None => GuestValue::None,
            DictKey::Int(i) => GuestValue::Int(*i),
            DictKey::Float(bits) => GuestValue::Float(f64::from_bits(*bits)),
            DictKey::Str(s) => GuestValue::Str(s.clone()),
            DictKey::Tuple(items) => GuestValue::tuple(items.iter().map(DictKey::to_value).collect()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DictKey::None => "NoneType",
            DictKey::Int(_) => "int",
            DictKey::Float(_) => "float",
            DictKey::Str(_) => "str",
            DictKey::Tuple(_) => "tuple",
        }
    }
}

/// Variable scope of a function activation
pub struct Env {
    pub vars: RefCell<IndexMap<String, GuestValue>>,
    pub globals: RefCell<Vec<String>>,
    pub parent: Option<Rc<Env>>,
}

impl Env {
    pub fn new(parent: Option<Rc<Env>>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(IndexMap::new()),
            globals: RefCell::new(Vec::new()),
            parent,
        })
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.borrow().iter().any(|g| g == name)
    }
}

pub struct GuestFunction {
    pub name: Rc<str>,
    pub signature: Signature,
    /// Evaluated once, when the `def` runs
    pub defaults: Vec<Option<GuestValue>>,
    pub body: Rc<Vec<Stmt>>,
    pub globals: Rc<GuestModule>,
    pub closure: Option<Rc<Env>>,
}

pub struct GuestBuiltin {
    pub name: Rc<str>,
    pub func: BuiltinFn,
}

pub struct BoundMethod {
    pub receiver: GuestValue,
    pub function: GuestValue,
}

/// Hook through which an embedding supplies names the guest cannot resolve
pub trait NameResolver {
    fn lookup_variable(&self, name: &str) -> Result<Option<GuestValue>, GuestError>;

    /// Returns `true` when the assignment was taken over by the embedder
    fn assign_variable(&self, _name: &str, _value: &GuestValue) -> Result<bool, GuestError> {
        Ok(false)
    }

    fn lookup_symbol(&self, name: &str) -> Result<Option<GuestValue>, GuestError>;
}

pub struct GuestModule {
    pub name: Rc<str>,
    pub dict: RefCell<IndexMap<String, GuestValue>>,
    resolver: RefCell<Option<Rc<dyn NameResolver>>>,
}

impl GuestModule {
    pub fn new(name: &str) -> Rc<Self> {
        let module = Rc::new(Self {
            name: Rc::from(name),
            dict: RefCell::new(IndexMap::new()),
            resolver: RefCell::new(None),
        });
        module.set("__name__", GuestValue::str(name));
        module
    }

    pub fn with_resolver(name: &str, resolver: Rc<dyn NameResolver>) -> Rc<Self> {
        let module = Self::new(name);
        *module.resolver.borrow_mut() = Some(resolver);
        module
    }

    pub fn resolver(&self) -> Option<Rc<dyn NameResolver>> {
        self.resolver.borrow().clone()
    }

    pub fn get(&self, name: &str) -> Option<GuestValue> {
        self.dict.borrow().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: GuestValue) {
        self.dict.borrow_mut().insert(name.to_string(), value);
    }
}

pub struct GuestClass {
    pub name: Rc<str>,
    pub base: Option<Rc<GuestClass>>,
    pub dict: RefCell<IndexMap<String, GuestValue>>,
}

impl GuestClass {
    pub fn new(name: &str, base: Option<Rc<GuestClass>>) -> Rc<Self> {
        Rc::new(Self { name: Rc::from(name), base, dict: RefCell::new(IndexMap::new()) })
    }

    pub fn lookup(&self, name: &str) -> Option<GuestValue> {
        let mut class = Some(self);
        while let Some(c) = class {
            if let Some(v) = c.dict.borrow().get(name) {
                return Some(v.clone());
            }
            class = c.base.as_deref();
        }
        None
    }

    pub fn is_subclass(&self, other: &GuestClass) -> bool {
        let mut class = Some(self);
        while let Some(c) = class {
            if std::ptr::eq(c, other) {
                return true;
            }
            class = c.base.as_deref();
        }
        false
    }

    pub fn is_exception(&self) -> bool {
        exception_class("BaseException").is_some_and(|base| self.is_subclass(&base))
    }
}

pub struct GuestObject {
    pub class: Rc<GuestClass>,
    pub dict: RefCell<IndexMap<String, GuestValue>>,
    /// Error object of the other runtime this exception stands for
    pub payload: RefCell<Option<Rc<dyn Any>>>,
}

impl GuestObject {
    pub fn new(class: Rc<GuestClass>) -> Rc<Self> {
        Rc::new(Self { class, dict: RefCell::new(IndexMap::new()), payload: RefCell::new(None) })
    }

    pub fn get(&self, name: &str) -> Option<GuestValue> {
        self.dict.borrow().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: GuestValue) {
        self.dict.borrow_mut().insert(name.to_string(), value);
    }

    /// First exception argument rendered as text
    pub fn exception_message(&self) -> String {
        match self.get("args") {
            Some(GuestValue::Tuple(args)) => match args.first() {
                Some(GuestValue::Str(s)) => s.to_string(),
                Some(GuestValue::Int(i)) => i.to_string(),
                Some(other) => format!("{:?}", other),
                None => String::new(),
            },
            _ => String::new(),
        }
    }
}

/// Capability interface of values owned by another runtime.
///
/// Every operation defaults to the error the guest raises for an object
/// that does not support it.
pub trait GuestForeign {
    fn type_name(&self) -> String;

    fn as_any(&self) -> &dyn Any;

    /// Stable identity reported by `id()`
    fn identity(&self) -> usize;

    fn get_attr(&self, name: &str) -> Result<GuestValue, GuestError> {
        Err(GuestError::new(
            "AttributeError",
            format!("'{}' object has no attribute '{}'", self.type_name(), name),
        ))
    }

    fn set_attr(&self, name: &str, _value: GuestValue) -> Result<(), GuestError> {
        Err(GuestError::new(
            "AttributeError",
            format!("'{}' object has no attribute '{}'", self.type_name(), name),
        ))
    }

    fn call(&self, _args: Vec<GuestValue>, _kwargs: Kwargs) -> Result<GuestValue, GuestError> {
        Err(GuestError::new("TypeError", format!("'{}' object is not callable", self.type_name())))
    }

    fn get_item(&self, _key: &GuestValue) -> Result<GuestValue, GuestError> {
        Err(GuestError::new(
            "TypeError",
            format!("'{}' object is not subscriptable", self.type_name()),
        ))
    }

    fn set_item(&self, _key: &GuestValue, _value: GuestValue) -> Result<(), GuestError> {
        Err(GuestError::new(
            "TypeError",
            format!("'{}' object does not support item assignment", self.type_name()),
        ))
    }

    fn len(&self) -> Result<usize, GuestError> {
        Err(GuestError::new("TypeError", format!("object of type '{}' has no len()", self.type_name())))
    }

    fn iterate(&self) -> Result<Vec<GuestValue>, GuestError> {
        Err(GuestError::new("TypeError", format!("'{}' object is not iterable", self.type_name())))
    }

    fn equals(&self, _other: &GuestValue) -> Result<bool, GuestError> {
        Ok(false)
    }

    /// `isinstance(obj, self)`; `None` when `self` is not a class
    fn instance_check(&self, _obj: &GuestValue) -> Result<Option<bool>, GuestError> {
        Ok(None)
    }

    fn repr(&self) -> String {
        format!("<{} object>", self.type_name())
    }
}

/// Guest-level failure. `Raised` is catchable; `Fatal` is not.
#[derive(Clone)]
pub enum GuestError {
    Raised(Rc<GuestObject>),
    Fatal(String),
}

impl GuestError {
    /// Raise a built-in exception class by name
    pub fn new(class: &str, message: impl Into<String>) -> Self {
        match exception_class(class) {
            Some(class) => {
                let exc = GuestObject::new(class);
                exc.set("args", GuestValue::tuple(vec![GuestValue::str(&message.into())]));
                GuestError::Raised(exc)
            }
            None => GuestError::Fatal(format!("unknown exception class {}", class)),
        }
    }

    pub fn class_name(&self) -> String {
        match self {
            GuestError::Raised(exc) => exc.class.name.to_string(),
            GuestError::Fatal(_) => "Fatal".to_string(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            GuestError::Raised(exc) => exc.exception_message(),
            GuestError::Fatal(msg) => msg.clone(),
        }
    }
}

impl fmt::Debug for GuestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class_name(), self.message())
    }
}

impl fmt::Display for GuestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestError::Raised(_) => write!(f, "{}: {}", self.class_name(), self.message()),
            GuestError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for GuestError {}

const EXCEPTION_TREE: &[(&str, &str)] = &[
    ("Exception", "BaseException"),
    ("ArithmeticError", "Exception"),
    ("ZeroDivisionError", "ArithmeticError"),
    ("OverflowError", "ArithmeticError"),
    ("AttributeError", "Exception"),
    ("ImportError", "Exception"),
    ("LookupError", "Exception"),
    ("MemoryError", "Exception"),
    ("IndexError", "LookupError"),
    ("KeyError", "LookupError"),
    ("NameError", "Exception"),
    ("RuntimeError", "Exception"),
    ("RecursionError", "RuntimeError"),
    ("NotImplementedError", "RuntimeError"),
    ("StopIteration", "Exception"),
    ("SyntaxError", "Exception"),
    ("TypeError", "Exception"),
    ("ValueError", "Exception"),
    ("HostException", "Exception"),
];

thread_local! {
    static EXCEPTION_CLASSES: IndexMap<String, Rc<GuestClass>> = {
        let mut classes = IndexMap::new();
        classes.insert("BaseException".to_string(), GuestClass::new("BaseException", None));
        for (name, base) in EXCEPTION_TREE {
            let base = classes.get(*base).cloned();
            classes.insert(name.to_string(), GuestClass::new(name, base));
        }
        classes
    };
}

pub fn exception_class(name: &str) -> Option<Rc<GuestClass>> {
    EXCEPTION_CLASSES.with(|classes| classes.get(name).cloned())
}

pub fn exception_classes() -> Vec<Rc<GuestClass>> {
    EXCEPTION_CLASSES.with(|classes| classes.values().cloned().collect())
}
