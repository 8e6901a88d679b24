//! Guest interpreter - tree-walking evaluator over the guest syntax tree
//!
//! Design:
//! - Modules are cached by dotted name; native library modules load on demand
//! - Name lookup: locals, enclosing scopes, module globals, resolver
//!   variables, builtins, resolver symbols
//! - Exceptions propagate as `Err(GuestError::Raised)`; control flow as `Flow`

use super::ast::{Arg, BinOp, CmpOp, Expr, FunctionDef, Handler, Stmt, Target};
use super::builtins;
use super::modules;
use super::parser::parse_module;
use super::value::{
    BoundMethod, DictKey, Env, GuestClass, GuestError, GuestFunction,
    GuestModule, GuestObject, GuestValue, Kwargs, NameResolver,
};
use crate::runtime::signature::{CallArgs, CallFrame};
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;
use tracing::{debug, trace};

enum Flow {
    Normal,
    Return(GuestValue),
    Break,
    Continue,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Module,
    Function,
    Class,
    Comprehension,
}

struct Frame {
    module: Rc<GuestModule>,
    env: Option<Rc<Env>>,
    kind: ScopeKind,
}

impl Frame {
    fn module(module: Rc<GuestModule>) -> Self {
        Frame { module, env: None, kind: ScopeKind::Module }
    }

    fn nested(&self, kind: ScopeKind) -> (Frame, Rc<Env>) {
        let env = Env::new(self.env.clone());
        let frame = Frame { module: self.module.clone(), env: Some(env.clone()), kind };
        (frame, env)
    }
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &GuestValue) -> Option<Num> {
        match value {
            GuestValue::Bool(b) => Some(Num::Int(*b as i64)),
            GuestValue::Int(i) => Some(Num::Int(*i)),
            GuestValue::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

pub struct GuestInterp {
    modules: RefCell<IndexMap<String, Rc<GuestModule>>>,
    builtins: RefCell<IndexMap<String, GuestValue>>,
    main: Rc<GuestModule>,
    output: RefCell<String>,
    /// Exceptions being handled by enclosing `except` blocks, for bare `raise`
    handling: RefCell<Vec<Rc<GuestObject>>>,
    depth: Cell<usize>,
    max_depth: usize,
}

impl GuestInterp {
    pub fn new(max_depth: usize) -> Self {
        let interp = Self {
            modules: RefCell::new(IndexMap::new()),
            builtins: RefCell::new(IndexMap::new()),
            main: GuestModule::new("__main__"),
            output: RefCell::new(String::new()),
            handling: RefCell::new(Vec::new()),
            depth: Cell::new(0),
            max_depth,
        };
        builtins::install(&interp);
        interp.register_module("__main__", interp.main.clone());
        interp
    }

    pub fn main_module(&self) -> Rc<GuestModule> {
        self.main.clone()
    }

    pub fn write(&self, text: &str) {
        self.output.borrow_mut().push_str(text);
    }

    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.output.borrow_mut())
    }

    pub fn register_builtin(&self, name: &str, value: GuestValue) {
        self.builtins.borrow_mut().insert(name.to_string(), value);
    }

    pub fn builtin(&self, name: &str) -> Option<GuestValue> {
        self.builtins.borrow().get(name).cloned()
    }

    /// Run source in the `__main__` module
    pub fn run(&self, source: &str) -> Result<(), GuestError> {
        let program = parse_module(source).map_err(|msg| GuestError::new("SyntaxError", msg))?;
        self.exec_module(&self.main, &program)
    }

    /// Compile and execute `source` as a fresh module, optionally resolving
    /// unknown names through `resolver`. The module is not cached.
    pub fn compile_module(
        &self,
        name: &str,
        source: &str,
        resolver: Option<Rc<dyn NameResolver>>,
    ) -> Result<Rc<GuestModule>, GuestError> {
        let program = parse_module(source).map_err(|msg| GuestError::new("SyntaxError", msg))?;
        let module = match resolver {
            Some(resolver) => GuestModule::with_resolver(name, resolver),
            None => GuestModule::new(name),
        };
        self.exec_module(&module, &program)?;
        debug!(module = name, "guest module compiled");
        Ok(module)
    }

    fn exec_module(&self, module: &Rc<GuestModule>, program: &[Stmt]) -> Result<(), GuestError> {
        let frame = Frame::module(module.clone());
        match self.exec_block(program, &frame)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(GuestError::new("SyntaxError", "'return' outside function")),
            Flow::Break | Flow::Continue => Err(GuestError::new("SyntaxError", "'break' outside loop")),
        }
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    pub fn register_module(&self, name: &str, module: Rc<GuestModule>) {
        debug!(module = name, "guest module registered");
        self.modules.borrow_mut().insert(name.to_string(), module);
    }

    pub fn lookup_module(&self, name: &str) -> Option<Rc<GuestModule>> {
        self.modules.borrow().get(name).cloned()
    }

    /// Import a dotted module path, loading each prefix and binding every
    /// child as an attribute of its parent. Returns the leaf module.
    pub fn import_module(&self, dotted: &str) -> Result<Rc<GuestModule>, GuestError> {
        if let Some(module) = self.lookup_module(dotted) {
            return Ok(module);
        }
        let mut parent: Option<Rc<GuestModule>> = None;
        let mut path = String::new();
        for part in dotted.split('.') {
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(part);
            let module = match self.lookup_module(&path) {
                Some(module) => module,
                None => {
                    let module = modules::load(self, &path).ok_or_else(|| {
                        GuestError::new("ImportError", format!("No module named {}", path))
                    })?;
                    self.register_module(&path, module.clone());
                    module
                }
            };
            if let Some(parent) = &parent {
                parent.set(part, GuestValue::Module(module.clone()));
            }
            parent = Some(module);
        }
        parent.ok_or_else(|| GuestError::new("ImportError", "Empty module name"))
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    pub fn call(&self, callee: &GuestValue, args: Vec<GuestValue>, kwargs: Kwargs) -> Result<GuestValue, GuestError> {
        match callee {
            GuestValue::Function(f) => {
                let frame = f
                    .signature
                    .bind(CallArgs { positional: args, named: kwargs.into_iter().collect() })
                    .map_err(|e| GuestError::new("TypeError", e.to_string()))?;
                self.call_function(f, frame)
            }
            GuestValue::Builtin(b) => (b.func)(self, args, kwargs),
            GuestValue::BoundMethod(m) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(m.receiver.clone());
                full.extend(args);
                self.call(&m.function, full, kwargs)
            }
            GuestValue::Class(class) => self.instantiate(class, args, kwargs),
            GuestValue::Foreign(f) => f.call(args, kwargs),
            GuestValue::Object(obj) => match obj.class.lookup("__call__") {
                Some(method) => self.call(&bind_attr(callee, method), args, kwargs),
                None => Err(not_callable(callee)),
            },
            other => Err(not_callable(other)),
        }
    }

    /// Run a function with arguments already bound to its parameters.
    /// Empty slots take the function's own defaults.
    pub fn call_function(&self, function: &Rc<GuestFunction>, frame: CallFrame<GuestValue>) -> Result<GuestValue, GuestError> {
        let depth = self.depth.get();
        if depth >= self.max_depth {
            return Err(GuestError::new("RecursionError", "maximum recursion depth exceeded"));
        }
        trace!(function = %function.name, "guest call");
        self.depth.set(depth + 1);
        let result = self.run_function(function, frame);
        self.depth.set(depth);
        result
    }

    fn run_function(&self, function: &GuestFunction, frame: CallFrame<GuestValue>) -> Result<GuestValue, GuestError> {
        let env = Env::new(function.closure.clone());
        {
            let mut vars = env.vars.borrow_mut();
            for (i, slot) in frame.slots.into_iter().enumerate() {
                let value = match slot {
                    Some(value) => value,
                    None => function.defaults.get(i).cloned().flatten().unwrap_or(GuestValue::None),
                };
                vars.insert(function.signature.params[i].name.to_string(), value);
            }
            if let Some(rest) = &function.signature.variadic {
                vars.insert(rest.to_string(), GuestValue::tuple(frame.variadic));
            }
        }
        let scope = Frame { module: function.globals.clone(), env: Some(env), kind: ScopeKind::Function };
        match self.exec_block(&function.body, &scope)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(GuestValue::None),
        }
    }

    pub fn instantiate(&self, class: &Rc<GuestClass>, args: Vec<GuestValue>, kwargs: Kwargs) -> Result<GuestValue, GuestError> {
        let obj = GuestObject::new(class.clone());
        let value = GuestValue::Object(obj.clone());
        match class.lookup("__init__") {
            Some(init) => {
                self.call(&bind_attr(&value, init), args, kwargs)?;
            }
            None if class.is_exception() => obj.set("args", GuestValue::tuple(args)),
            None if !args.is_empty() || !kwargs.is_empty() => {
                return Err(GuestError::new("TypeError", format!("{}() takes no arguments", class.name)));
            }
            None => {}
        }
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Attribute and item protocol
    // ------------------------------------------------------------------

    pub fn getattr(&self, obj: &GuestValue, name: &str) -> Result<GuestValue, GuestError> {
        match obj {
            GuestValue::Object(o) => {
                if let Some(value) = o.get(name) {
                    return Ok(value);
                }
                if name == "__class__" {
                    return Ok(GuestValue::Class(o.class.clone()));
                }
                match o.class.lookup(name) {
                    Some(value) => Ok(bind_attr(obj, value)),
                    None => Err(no_attribute(obj, name)),
                }
            }
            GuestValue::Module(m) => m.get(name).ok_or_else(|| {
                GuestError::new("AttributeError", format!("module '{}' has no attribute '{}'", m.name, name))
            }),
            GuestValue::Class(c) => match name {
                "__name__" => Ok(GuestValue::Str(c.name.clone())),
                _ => c.lookup(name).ok_or_else(|| {
                    GuestError::new(
                        "AttributeError",
                        format!("type object '{}' has no attribute '{}'", c.name, name),
                    )
                }),
            },
            GuestValue::Function(f) if name == "__name__" => Ok(GuestValue::Str(f.name.clone())),
            GuestValue::Builtin(b) if name == "__name__" => Ok(GuestValue::Str(b.name.clone())),
            GuestValue::Foreign(f) => f.get_attr(name),
            _ => builtins::method(obj, name).ok_or_else(|| no_attribute(obj, name)),
        }
    }

    pub fn setattr(&self, obj: &GuestValue, name: &str, value: GuestValue) -> Result<(), GuestError> {
        match obj {
            GuestValue::Object(o) => o.set(name, value),
            GuestValue::Module(m) => m.set(name, value),
            GuestValue::Class(c) => {
                c.dict.borrow_mut().insert(name.to_string(), value);
            }
            GuestValue::Foreign(f) => return f.set_attr(name, value),
            other => {
                return Err(GuestError::new(
                    "AttributeError",
                    format!("'{}' object attribute '{}' is read-only", other.type_name(), name),
                ))
            }
        }
        Ok(())
    }

    pub fn getitem(&self, obj: &GuestValue, key: &GuestValue) -> Result<GuestValue, GuestError> {
        match obj {
            GuestValue::List(items) => {
                let items = items.borrow();
                let i = sequence_index(key, items.len(), "list")?;
                Ok(items[i].clone())
            }
            GuestValue::Tuple(items) => {
                let i = sequence_index(key, items.len(), "tuple")?;
                Ok(items[i].clone())
            }
            GuestValue::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = sequence_index(key, chars.len(), "string")?;
                Ok(GuestValue::str(&chars[i].to_string()))
            }
            GuestValue::Dict(entries) => {
                let k = DictKey::from_value(key)?;
                let found = entries.borrow().get(&k).cloned();
                found.ok_or_else(|| GuestError::new("KeyError", self.repr(key)))
            }
            GuestValue::Foreign(f) => f.get_item(key),
            GuestValue::Object(o) => match o.class.lookup("__getitem__") {
                Some(method) => self.call(&bind_attr(obj, method), vec![key.clone()], Vec::new()),
                None => Err(not_subscriptable(obj)),
            },
            other => Err(not_subscriptable(other)),
        }
    }

    pub fn setitem(&self, obj: &GuestValue, key: &GuestValue, value: GuestValue) -> Result<(), GuestError> {
        match obj {
            GuestValue::List(items) => {
                let len = items.borrow().len();
                let i = sequence_index(key, len, "list assignment")?;
                items.borrow_mut()[i] = value;
                Ok(())
            }
            GuestValue::Dict(entries) => {
                let k = DictKey::from_value(key)?;
                entries.borrow_mut().insert(k, value);
                Ok(())
            }
            GuestValue::Foreign(f) => f.set_item(key, value),
            GuestValue::Object(o) => match o.class.lookup("__setitem__") {
                Some(method) => {
                    self.call(&bind_attr(obj, method), vec![key.clone(), value], Vec::new())?;
                    Ok(())
                }
                None => Err(no_item_assignment(obj)),
            },
            other => Err(no_item_assignment(other)),
        }
    }

    fn slice(&self, obj: &GuestValue, lower: Option<i64>, upper: Option<i64>) -> Result<GuestValue, GuestError> {
        let bounds = |len: usize| {
            let clamp = |i: i64| {
                let i = if i < 0 { i + len as i64 } else { i };
                i.clamp(0, len as i64) as usize
            };
            let start = lower.map(clamp).unwrap_or(0);
            let end = upper.map(clamp).unwrap_or(len);
            (start, end.max(start))
        };
        match obj {
            GuestValue::List(items) => {
                let items = items.borrow();
                let (start, end) = bounds(items.len());
                Ok(GuestValue::list(items[start..end].to_vec()))
            }
            GuestValue::Tuple(items) => {
                let (start, end) = bounds(items.len());
                Ok(GuestValue::tuple(items[start..end].to_vec()))
            }
            GuestValue::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let (start, end) = bounds(chars.len());
                Ok(GuestValue::str(&chars[start..end].iter().collect::<String>()))
            }
            other => Err(not_subscriptable(other)),
        }
    }

    /// Materialize the items of an iterable
    pub fn iterate(&self, obj: &GuestValue) -> Result<Vec<GuestValue>, GuestError> {
        match obj {
            GuestValue::List(items) => Ok(items.borrow().clone()),
            GuestValue::Tuple(items) => Ok(items.to_vec()),
            GuestValue::Str(s) => Ok(s.chars().map(|c| GuestValue::str(&c.to_string())).collect()),
            GuestValue::Dict(entries) => Ok(entries.borrow().keys().map(DictKey::to_value).collect()),
            GuestValue::Foreign(f) => f.iterate(),
            other => Err(GuestError::new(
                "TypeError",
                format!("'{}' object is not iterable", other.type_name()),
            )),
        }
    }

    pub fn len(&self, obj: &GuestValue) -> Result<usize, GuestError> {
        match obj {
            GuestValue::Str(s) => Ok(s.chars().count()),
            GuestValue::List(items) => Ok(items.borrow().len()),
            GuestValue::Tuple(items) => Ok(items.len()),
            GuestValue::Dict(entries) => Ok(entries.borrow().len()),
            GuestValue::Foreign(f) => f.len(),
            GuestValue::Object(o) => match o.class.lookup("__len__") {
                Some(method) => match self.call(&bind_attr(obj, method), Vec::new(), Vec::new())? {
                    GuestValue::Int(n) if n >= 0 => Ok(n as usize),
                    _ => Err(GuestError::new("TypeError", "__len__() should return a non-negative int")),
                },
                None => Err(no_len(obj)),
            },
            other => Err(no_len(other)),
        }
    }

    // ------------------------------------------------------------------
    // Equality, identity and text
    // ------------------------------------------------------------------

    /// `==`
    pub fn equals(&self, left: &GuestValue, right: &GuestValue) -> Result<bool, GuestError> {
        use GuestValue::*;
        if let (Foreign(a), Foreign(b)) = (left, right) {
            if Rc::ptr_eq(a, b) {
                return Ok(true);
            }
        }
        Ok(match (left, right) {
            (Foreign(f), other) | (other, Foreign(f)) => f.equals(other)?,
            (None, None) => true,
            (Str(a), Str(b)) => a == b,
            (List(a), List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                self.sequence_eq(&a, &b)?
            }
            (Tuple(a), Tuple(b)) => self.sequence_eq(a, b)?,
            (Dict(a), Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let a: Vec<(DictKey, GuestValue)> = a.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                if a.len() != b.borrow().len() {
                    return Ok(false);
                }
                for (key, value) in a {
                    let other = b.borrow().get(&key).cloned();
                    match other {
                        Some(other) if self.equals(&value, &other)? => {}
                        _ => return Ok(false),
                    }
                }
                true
            }
            (Object(o), _) if o.class.lookup("__eq__").is_some() => {
                let method = self.getattr(left, "__eq__")?;
                self.call(&method, vec![right.clone()], Vec::new())?.is_truthy()
            }
            _ => match (Num::of(left), Num::of(right)) {
                (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
                (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
                _ => match (left.identity(), right.identity()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                },
            },
        })
    }

    fn sequence_eq(&self, a: &[GuestValue], b: &[GuestValue]) -> Result<bool, GuestError> {
        if a.len() != b.len() {
            return Ok(false);
        }
        for (x, y) in a.iter().zip(b) {
            if !self.equals(x, y)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// `is`: reference identity; primitives compare by value
    pub fn is_same(&self, left: &GuestValue, right: &GuestValue) -> bool {
        match (left, right) {
            (GuestValue::None, GuestValue::None) => true,
            (GuestValue::Bool(a), GuestValue::Bool(b)) => a == b,
            (GuestValue::Int(a), GuestValue::Int(b)) => a == b,
            (GuestValue::Float(a), GuestValue::Float(b)) => a.to_bits() == b.to_bits(),
            _ => match (left.identity(), right.identity()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// `id()`: the reference address; a foreign value reports the identity
    /// of the object it stands for
    pub fn id(&self, value: &GuestValue) -> i64 {
        match value {
            GuestValue::Foreign(f) => f.identity() as i64,
            GuestValue::None => 0,
            GuestValue::Bool(b) => *b as i64,
            GuestValue::Int(i) => *i,
            GuestValue::Float(f) => f.to_bits() as i64,
            other => other.identity().unwrap_or(0) as i64,
        }
    }

    /// `str()`
    pub fn to_str(&self, value: &GuestValue) -> Result<String, GuestError> {
        match value {
            GuestValue::Str(s) => Ok(s.to_string()),
            GuestValue::Object(o) => {
                if o.class.lookup("__str__").is_some() {
                    let method = self.getattr(value, "__str__")?;
                    let result = self.call(&method, Vec::new(), Vec::new())?;
                    return self.to_str(&result);
                }
                if o.class.is_exception() {
                    return Ok(o.exception_message());
                }
                Ok(self.repr(value))
            }
            other => Ok(self.repr(other)),
        }
    }

    /// `repr()`
    pub fn repr(&self, value: &GuestValue) -> String {
        match value {
            GuestValue::None => "None".to_string(),
            GuestValue::Bool(true) => "True".to_string(),
            GuestValue::Bool(false) => "False".to_string(),
            GuestValue::Int(i) => i.to_string(),
            GuestValue::Float(f) => format_float(*f),
            GuestValue::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            GuestValue::List(items) => {
                let items: Vec<String> = items.borrow().iter().map(|v| self.repr(v)).collect();
                format!("[{}]", items.join(", "))
            }
            GuestValue::Tuple(items) if items.len() == 1 => format!("({},)", self.repr(&items[0])),
            GuestValue::Tuple(items) => {
                let items: Vec<String> = items.iter().map(|v| self.repr(v)).collect();
                format!("({})", items.join(", "))
            }
            GuestValue::Dict(entries) => {
                let entries: Vec<String> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", self.repr(&k.to_value()), self.repr(v)))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
            GuestValue::Function(f) => format!("<function {}>", f.name),
            GuestValue::Builtin(b) => format!("<built-in function {}>", b.name),
            GuestValue::BoundMethod(m) => format!("<bound method of {}>", self.repr(&m.receiver)),
            GuestValue::Module(m) => format!("<module '{}'>", m.name),
            GuestValue::Class(c) => format!("<class '{}'>", c.name),
            GuestValue::Object(o) if o.class.is_exception() => {
                format!("{}({})", o.class.name, self.repr(&GuestValue::str(&o.exception_message())))
            }
            GuestValue::Object(o) => format!("<{} object>", o.class.name),
            GuestValue::Foreign(f) => f.repr(),
        }
    }

    /// `isinstance(obj, classinfo)`
    pub fn isinstance(&self, obj: &GuestValue, classinfo: &GuestValue) -> Result<bool, GuestError> {
        match classinfo {
            GuestValue::Class(class) => Ok(match obj {
                GuestValue::Object(o) => o.class.is_subclass(class),
                _ => false,
            }),
            GuestValue::Builtin(b) => {
                let actual = obj.type_name();
                Ok(*b.name == *actual || (&*b.name == "int" && actual == "bool") || &*b.name == "object")
            }
            GuestValue::Tuple(options) => {
                for option in options.iter() {
                    if self.isinstance(obj, option)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            GuestValue::Foreign(f) => f.instance_check(obj)?.ok_or_else(isinstance_type_error),
            _ => Err(isinstance_type_error()),
        }
    }

    pub fn contains(&self, container: &GuestValue, item: &GuestValue) -> Result<bool, GuestError> {
        match container {
            GuestValue::Str(s) => match item {
                GuestValue::Str(needle) => Ok(s.contains(&**needle)),
                other => Err(GuestError::new(
                    "TypeError",
                    format!("'in <string>' requires string as left operand, not {}", other.type_name()),
                )),
            },
            GuestValue::Dict(entries) => {
                let key = DictKey::from_value(item)?;
                Ok(entries.borrow().contains_key(&key))
            }
            GuestValue::List(_) | GuestValue::Tuple(_) | GuestValue::Foreign(_) => {
                for candidate in self.iterate(container)? {
                    if self.equals(&candidate, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            other => Err(GuestError::new(
                "TypeError",
                format!("argument of type '{}' is not iterable", other.type_name()),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn exec_block(&self, stmts: &[Stmt], frame: &Frame) -> Result<Flow, GuestError> {
        for stmt in stmts {
            match self.exec(stmt, frame)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&self, stmt: &Stmt, frame: &Frame) -> Result<Flow, GuestError> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, frame)?;
            }
            Stmt::Assign { targets, value } => {
                let value = self.eval(value, frame)?;
                for target in targets {
                    self.assign(target, value.clone(), frame)?;
                }
            }
            Stmt::AugAssign { target, op, value } => {
                let current = match target {
                    Target::Name(name) => self.load_name(name, frame)?,
                    Target::Attr(obj, name) => {
                        let obj = self.eval(obj, frame)?;
                        self.getattr(&obj, name)?
                    }
                    Target::Subscript(obj, key) => {
                        let obj = self.eval(obj, frame)?;
                        let key = self.eval(key, frame)?;
                        self.getitem(&obj, &key)?
                    }
                    Target::Tuple(_) => {
                        return Err(GuestError::new(
                            "SyntaxError",
                            "illegal expression for augmented assignment",
                        ))
                    }
                };
                let operand = self.eval(value, frame)?;
                let updated = match (&current, op) {
                    (GuestValue::List(items), BinOp::Add) => {
                        let extra = self.iterate(&operand)?;
                        items.borrow_mut().extend(extra);
                        current.clone()
                    }
                    _ => self.binary(*op, &current, &operand)?,
                };
                self.assign(target, updated, frame)?;
            }
            Stmt::FunctionDef(def) => {
                let function = self.define_function(def, frame)?;
                self.store_name(&def.name, function, frame)?;
            }
            Stmt::ClassDef { name, base, body } => {
                let base = match base {
                    Some(expr) => match self.eval(expr, frame)? {
                        GuestValue::Class(class) => Some(class),
                        other => {
                            return Err(GuestError::new(
                                "TypeError",
                                format!("cannot inherit from '{}'", other.type_name()),
                            ))
                        }
                    },
                    None => None,
                };
                let (class_frame, env) = frame.nested(ScopeKind::Class);
                self.exec_block(body, &class_frame)?;
                let class = GuestClass::new(name, base);
                for (key, value) in env.vars.borrow().iter() {
                    class.dict.borrow_mut().insert(key.clone(), value.clone());
                }
                debug!(class = %name, "guest class defined");
                self.store_name(name, GuestValue::Class(class), frame)?;
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, frame)?,
                    None => GuestValue::None,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::If { branches, otherwise } => {
                for (cond, body) in branches {
                    if self.eval(cond, frame)?.is_truthy() {
                        return self.exec_block(body, frame);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec_block(body, frame);
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond, frame)?.is_truthy() {
                    match self.exec_block(body, frame)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::For { target, iter, body } => {
                let iterable = self.eval(iter, frame)?;
                for item in self.iterate(&iterable)? {
                    self.assign(target, item, frame)?;
                    match self.exec_block(body, frame)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::Import { module, alias } => {
                let leaf = self.import_module(module)?;
                match alias {
                    Some(alias) => self.store_name(alias, GuestValue::Module(leaf), frame)?,
                    None => {
                        let top = module.split('.').next().unwrap_or(module);
                        let top_module = self.import_module(top)?;
                        self.store_name(top, GuestValue::Module(top_module), frame)?;
                    }
                }
            }
            Stmt::ImportFrom { module, names } => {
                let source = self.import_module(module)?;
                for (name, alias) in names {
                    let value = match source.get(name) {
                        Some(value) => value,
                        None => {
                            let submodule = format!("{}.{}", module, name);
                            match self.import_module(&submodule) {
                                Ok(m) => GuestValue::Module(m),
                                Err(_) => {
                                    return Err(GuestError::new(
                                        "ImportError",
                                        format!("cannot import name '{}' from '{}'", name, module),
                                    ))
                                }
                            }
                        }
                    };
                    self.store_name(alias.as_deref().unwrap_or(name), value, frame)?;
                }
            }
            Stmt::Raise(expr) => return Err(self.raise(expr.as_ref(), frame)?),
            Stmt::Try { body, handlers, finally } => {
                let result = match self.exec_block(body, frame) {
                    Err(GuestError::Raised(exc)) => self.handle(exc, handlers, frame),
                    other => other,
                };
                if let Some(finally) = finally {
                    match self.exec_block(finally, frame)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                return result;
            }
            Stmt::Global(names) => {
                if let Some(env) = &frame.env {
                    env.globals.borrow_mut().extend(names.iter().cloned());
                }
            }
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
            Stmt::Pass => {}
        }
        Ok(Flow::Normal)
    }

    fn define_function(&self, def: &FunctionDef, frame: &Frame) -> Result<GuestValue, GuestError> {
        let defaults = def
            .defaults
            .iter()
            .map(|d| d.as_ref().map(|e| self.eval(e, frame)).transpose())
            .collect::<Result<Vec<_>, _>>()?;
        // Methods close over the scope enclosing the class body, not the class body itself
        let closure = match (&frame.env, frame.kind) {
            (Some(env), ScopeKind::Class) => env.parent.clone(),
            (env, _) => env.clone(),
        };
        let mut value = GuestValue::Function(Rc::new(GuestFunction {
            name: Rc::from(def.name.as_str()),
            signature: def.signature.clone(),
            defaults,
            body: def.body.clone(),
            globals: frame.module.clone(),
            closure,
        }));
        for decorator in def.decorators.iter().rev() {
            let decorator = self.eval(decorator, frame)?;
            value = self.call(&decorator, vec![value], Vec::new())?;
        }
        Ok(value)
    }

    fn raise(&self, expr: Option<&Expr>, frame: &Frame) -> Result<GuestError, GuestError> {
        let Some(expr) = expr else {
            return Ok(match self.handling.borrow().last() {
                Some(exc) => GuestError::Raised(exc.clone()),
                None => GuestError::new("RuntimeError", "No active exception to reraise"),
            });
        };
        let value = match self.eval(expr, frame)? {
            GuestValue::Class(class) => self.instantiate(&class, Vec::new(), Vec::new())?,
            other => other,
        };
        match value {
            GuestValue::Object(obj) if obj.class.is_exception() => Ok(GuestError::Raised(obj)),
            _ => Ok(GuestError::new("TypeError", "exceptions must derive from BaseException")),
        }
    }

    fn handle(&self, exc: Rc<GuestObject>, handlers: &[Handler], frame: &Frame) -> Result<Flow, GuestError> {
        for handler in handlers {
            let matches = match &handler.class {
                None => true,
                Some(expr) => {
                    let classinfo = self.eval(expr, frame)?;
                    self.isinstance(&GuestValue::Object(exc.clone()), &classinfo)?
                }
            };
            if !matches {
                continue;
            }
            if let Some(name) = &handler.name {
                self.store_name(name, GuestValue::Object(exc.clone()), frame)?;
            }
            self.handling.borrow_mut().push(exc);
            let result = self.exec_block(&handler.body, frame);
            self.handling.borrow_mut().pop();
            return result;
        }
        Err(GuestError::Raised(exc))
    }

    // ------------------------------------------------------------------
    // Names and targets
    // ------------------------------------------------------------------

    fn load_name(&self, name: &str, frame: &Frame) -> Result<GuestValue, GuestError> {
        let mut env = frame.env.clone();
        while let Some(scope) = env {
            if scope.is_global(name) {
                break;
            }
            if let Some(value) = scope.vars.borrow().get(name) {
                return Ok(value.clone());
            }
            env = scope.parent.clone();
        }
        if let Some(value) = frame.module.get(name) {
            return Ok(value);
        }
        let resolver = frame.module.resolver();
        if let Some(resolver) = &resolver {
            if let Some(value) = resolver.lookup_variable(name)? {
                return Ok(value);
            }
        }
        if let Some(value) = self.builtin(name) {
            return Ok(value);
        }
        if let Some(resolver) = &resolver {
            if let Some(value) = resolver.lookup_symbol(name)? {
                return Ok(value);
            }
        }
        Err(GuestError::new("NameError", format!("name '{}' is not defined", name)))
    }

    fn store_name(&self, name: &str, value: GuestValue, frame: &Frame) -> Result<(), GuestError> {
        match &frame.env {
            Some(env) if !env.is_global(name) => {
                let is_local = env.vars.borrow().contains_key(name);
                if frame.kind == ScopeKind::Function && !is_local {
                    if let Some(resolver) = frame.module.resolver() {
                        if resolver.assign_variable(name, &value)? {
                            return Ok(());
                        }
                    }
                }
                env.vars.borrow_mut().insert(name.to_string(), value);
            }
            _ => frame.module.set(name, value),
        }
        Ok(())
    }

    fn assign(&self, target: &Target, value: GuestValue, frame: &Frame) -> Result<(), GuestError> {
        match target {
            Target::Name(name) => self.store_name(name, value, frame),
            Target::Attr(obj, name) => {
                let obj = self.eval(obj, frame)?;
                self.setattr(&obj, name, value)
            }
            Target::Subscript(obj, key) => {
                let obj = self.eval(obj, frame)?;
                let key = self.eval(key, frame)?;
                self.setitem(&obj, &key, value)
            }
            Target::Tuple(targets) => {
                let items = self.iterate(&value)?;
                match items.len().cmp(&targets.len()) {
                    Ordering::Less => Err(GuestError::new(
                        "ValueError",
                        format!("not enough values to unpack (expected {}, got {})", targets.len(), items.len()),
                    )),
                    Ordering::Greater => Err(GuestError::new(
                        "ValueError",
                        format!("too many values to unpack (expected {})", targets.len()),
                    )),
                    Ordering::Equal => {
                        for (target, item) in targets.iter().zip(items) {
                            self.assign(target, item, frame)?;
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval(&self, expr: &Expr, frame: &Frame) -> Result<GuestValue, GuestError> {
        match expr {
            Expr::None => Ok(GuestValue::None),
            Expr::Bool(b) => Ok(GuestValue::Bool(*b)),
            Expr::Int(i) => Ok(GuestValue::Int(*i)),
            Expr::Float(f) => Ok(GuestValue::Float(*f)),
            Expr::Str(s) => Ok(GuestValue::Str(s.clone())),
            Expr::Name(name) => self.load_name(name, frame),
            Expr::List(items) => Ok(GuestValue::list(self.eval_all(items, frame)?)),
            Expr::Tuple(items) => Ok(GuestValue::tuple(self.eval_all(items, frame)?)),
            Expr::Dict(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = DictKey::from_value(&self.eval(key, frame)?)?;
                    map.insert(key, self.eval(value, frame)?);
                }
                Ok(GuestValue::dict(map))
            }
            Expr::Attr(obj, name) => {
                let obj = self.eval(obj, frame)?;
                self.getattr(&obj, name)
            }
            Expr::Subscript(obj, key) => {
                let obj = self.eval(obj, frame)?;
                match &**key {
                    Expr::Slice(lower, upper) => {
                        let lower = self.eval_bound(lower.as_deref(), frame)?;
                        let upper = self.eval_bound(upper.as_deref(), frame)?;
                        self.slice(&obj, lower, upper)
                    }
                    key => {
                        let key = self.eval(key, frame)?;
                        self.getitem(&obj, &key)
                    }
                }
            }
            Expr::Slice(..) => Err(GuestError::new("SyntaxError", "slice outside of subscript")),
            Expr::Call { func, args } => {
                let callee = self.eval(func, frame)?;
                let mut positional = Vec::with_capacity(args.len());
                let mut kwargs = Vec::new();
                for arg in args {
                    match arg {
                        Arg::Positional(expr) => positional.push(self.eval(expr, frame)?),
                        Arg::Named(name, expr) => kwargs.push((Rc::from(name.as_str()), self.eval(expr, frame)?)),
                        Arg::Star(expr) => {
                            let spread = self.eval(expr, frame)?;
                            positional.extend(self.iterate(&spread)?);
                        }
                    }
                }
                self.call(&callee, positional, kwargs)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, frame)?;
                let right = self.eval(right, frame)?;
                self.binary(*op, &left, &right)
            }
            Expr::Compare { op, left, right } => {
                let left = self.eval(left, frame)?;
                let right = self.eval(right, frame)?;
                Ok(GuestValue::Bool(self.compare(*op, &left, &right)?))
            }
            Expr::Neg(operand) => match self.eval(operand, frame)? {
                GuestValue::Int(i) => i
                    .checked_neg()
                    .map(GuestValue::Int)
                    .ok_or_else(|| GuestError::new("OverflowError", "integer overflow")),
                GuestValue::Bool(b) => Ok(GuestValue::Int(-(b as i64))),
                GuestValue::Float(f) => Ok(GuestValue::Float(-f)),
                other => Err(GuestError::new(
                    "TypeError",
                    format!("bad operand type for unary -: '{}'", other.type_name()),
                )),
            },
            Expr::Not(operand) => Ok(GuestValue::Bool(!self.eval(operand, frame)?.is_truthy())),
            Expr::And(left, right) => {
                let left = self.eval(left, frame)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right, frame)
            }
            Expr::Or(left, right) => {
                let left = self.eval(left, frame)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right, frame)
            }
            Expr::IfExp { cond, then, otherwise } => {
                if self.eval(cond, frame)?.is_truthy() {
                    self.eval(then, frame)
                } else {
                    self.eval(otherwise, frame)
                }
            }
            Expr::ListComp { elt, target, iter, cond } => {
                let iterable = self.eval(iter, frame)?;
                let (scope, _env) = frame.nested(ScopeKind::Comprehension);
                let mut out = Vec::new();
                for item in self.iterate(&iterable)? {
                    self.assign(target, item, &scope)?;
                    if let Some(cond) = cond {
                        if !self.eval(cond, &scope)?.is_truthy() {
                            continue;
                        }
                    }
                    out.push(self.eval(elt, &scope)?);
                }
                Ok(GuestValue::list(out))
            }
        }
    }

    fn eval_all(&self, exprs: &[Expr], frame: &Frame) -> Result<Vec<GuestValue>, GuestError> {
        exprs.iter().map(|e| self.eval(e, frame)).collect()
    }

    fn eval_bound(&self, expr: Option<&Expr>, frame: &Frame) -> Result<Option<i64>, GuestError> {
        match expr {
            None => Ok(None),
            Some(expr) => match self.eval(expr, frame)? {
                GuestValue::Int(i) => Ok(Some(i)),
                GuestValue::Bool(b) => Ok(Some(b as i64)),
                GuestValue::None => Ok(None),
                _ => Err(GuestError::new("TypeError", "slice indices must be integers or None")),
            },
        }
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    pub fn compare(&self, op: CmpOp, left: &GuestValue, right: &GuestValue) -> Result<bool, GuestError> {
        match op {
            CmpOp::Eq => self.equals(left, right),
            CmpOp::NotEq => Ok(!self.equals(left, right)?),
            CmpOp::Is => Ok(self.is_same(left, right)),
            CmpOp::IsNot => Ok(!self.is_same(left, right)),
            CmpOp::In => self.contains(right, left),
            CmpOp::NotIn => Ok(!self.contains(right, left)?),
            CmpOp::Lt | CmpOp::Gt | CmpOp::LtEq | CmpOp::GtEq => {
                let ordering = self.order(left, right).ok_or_else(|| {
                    GuestError::new(
                        "TypeError",
                        format!(
                            "'{}' not supported between instances of '{}' and '{}'",
                            cmp_symbol(op),
                            left.type_name(),
                            right.type_name()
                        ),
                    )
                })?;
                Ok(match op {
                    CmpOp::Lt => ordering == Some(Ordering::Less),
                    CmpOp::Gt => ordering == Some(Ordering::Greater),
                    CmpOp::LtEq => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                    _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                })
            }
        }
    }

    /// `None` when the operands are not orderable; `Some(None)` for NaN
    fn order(&self, left: &GuestValue, right: &GuestValue) -> Option<Option<Ordering>> {
        match (left, right) {
            (GuestValue::Str(a), GuestValue::Str(b)) => Some(Some(a.cmp(b))),
            _ => match (Num::of(left)?, Num::of(right)?) {
                (Num::Int(a), Num::Int(b)) => Some(Some(a.cmp(&b))),
                (a, b) => Some(a.as_f64().partial_cmp(&b.as_f64())),
            },
        }
    }

    pub fn binary(&self, op: BinOp, left: &GuestValue, right: &GuestValue) -> Result<GuestValue, GuestError> {
        use GuestValue::*;
        match (op, left, right) {
            (BinOp::Add, Str(a), Str(b)) => return Ok(GuestValue::str(&format!("{}{}", a, b))),
            (BinOp::Add, List(a), List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                return Ok(GuestValue::list(items));
            }
            (BinOp::Add, Tuple(a), Tuple(b)) => {
                return Ok(GuestValue::tuple(a.iter().chain(b.iter()).cloned().collect()))
            }
            (BinOp::Mul, Str(s), Int(n)) | (BinOp::Mul, Int(n), Str(s)) => {
                let mut out = String::new();
                let count = reserve_repeated(s.len(), repeat_count(*n)?, |total| out.try_reserve_exact(total))?;
                for _ in 0..count {
                    out.push_str(s);
                }
                return Ok(GuestValue::str(&out));
            }
            (BinOp::Mul, List(items), Int(n)) | (BinOp::Mul, Int(n), List(items)) => {
                let items = items.borrow();
                let mut out = Vec::new();
                let count = reserve_repeated(items.len(), repeat_count(*n)?, |total| out.try_reserve_exact(total))?;
                for _ in 0..count {
                    out.extend(items.iter().cloned());
                }
                return Ok(GuestValue::list(out));
            }
            (BinOp::Mod, Str(fmt), args) => return Ok(GuestValue::str(&self.format_percent(fmt, args)?)),
            _ => {}
        }
        let (Some(a), Some(b)) = (Num::of(left), Num::of(right)) else {
            return Err(GuestError::new(
                "TypeError",
                format!(
                    "unsupported operand type(s) for {}: '{}' and '{}'",
                    op_symbol(op),
                    left.type_name(),
                    right.type_name()
                ),
            ));
        };
        arithmetic(op, a, b)
    }

    /// `fmt % args` with `%s %r %d %i %f %.Nf %%`
    fn format_percent(&self, fmt: &str, args: &GuestValue) -> Result<String, GuestError> {
        let args: Vec<GuestValue> = match args {
            GuestValue::Tuple(items) => items.to_vec(),
            other => vec![other.clone()],
        };
        let mut args = args.into_iter();
        let mut out = String::with_capacity(fmt.len());
        let mut chars = fmt.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            let mut precision = None;
            if chars.peek() == Some(&'.') {
                chars.next();
                let mut digits = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(*d);
                    chars.next();
                }
                precision = digits.parse::<usize>().ok();
            }
            let spec = chars
                .next()
                .ok_or_else(|| GuestError::new("ValueError", "incomplete format"))?;
            if spec == '%' {
                out.push('%');
                continue;
            }
            let arg = args
                .next()
                .ok_or_else(|| GuestError::new("TypeError", "not enough arguments for format string"))?;
            match spec {
                's' => out.push_str(&self.to_str(&arg)?),
                'r' => out.push_str(&self.repr(&arg)),
                'd' | 'i' => match Num::of(&arg) {
                    Some(Num::Int(i)) => out.push_str(&i.to_string()),
                    Some(Num::Float(f)) => out.push_str(&(f.trunc() as i64).to_string()),
                    None => {
                        return Err(GuestError::new(
                            "TypeError",
                            format!("%d format: a number is required, not {}", arg.type_name()),
                        ))
                    }
                },
                'f' => match Num::of(&arg) {
                    Some(n) => out.push_str(&format!("{:.*}", precision.unwrap_or(6), n.as_f64())),
                    None => {
                        return Err(GuestError::new(
                            "TypeError",
                            format!("must be real number, not {}", arg.type_name()),
                        ))
                    }
                },
                other => {
                    return Err(GuestError::new(
                        "ValueError",
                        format!("unsupported format character '{}'", other),
                    ))
                }
            }
        }
        if args.next().is_some() {
            return Err(GuestError::new(
                "TypeError",
                "not all arguments converted during string formatting",
            ));
        }
        Ok(out)
    }
}

/// Functions and builtins found on a class are bound to the instance
fn bind_attr(receiver: &GuestValue, attr: GuestValue) -> GuestValue {
    match attr {
        GuestValue::Function(_) | GuestValue::Builtin(_) => GuestValue::BoundMethod(Rc::new(BoundMethod {
            receiver: receiver.clone(),
            function: attr,
        })),
        other => other,
    }
}

fn sequence_index(key: &GuestValue, len: usize, what: &str) -> Result<usize, GuestError> {
    let index = match key {
        GuestValue::Int(i) => *i,
        GuestValue::Bool(b) => *b as i64,
        other => {
            return Err(GuestError::new(
                "TypeError",
                format!("{} indices must be integers, not {}", what, other.type_name()),
            ))
        }
    };
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(GuestError::new("IndexError", format!("{} index out of range", what)));
    }
    Ok(resolved as usize)
}


/// Negative counts repeat zero times
fn repeat_count(n: i64) -> Result<usize, GuestError> {
    usize::try_from(n.max(0))
        .map_err(|_| GuestError::new("OverflowError", "cannot fit 'int' into an index-sized integer"))
}

/// Reserve room for `count` copies of a `unit`-long sequence and return how
/// many copies to append
fn reserve_repeated<E>(
    unit: usize,
    count: usize,
    reserve: impl FnOnce(usize) -> Result<(), E>,
) -> Result<usize, GuestError> {
    if unit == 0 {
        return Ok(0);
    }
    let total = unit.checked_mul(count).ok_or_else(|| GuestError::new("MemoryError", ""))?;
    reserve(total).map_err(|_| GuestError::new("MemoryError", ""))?;
    Ok(count)
}

fn arithmetic(op: BinOp, a: Num, b: Num) -> Result<GuestValue, GuestError> {
    let overflow = || GuestError::new("OverflowError", "integer overflow");
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        return match op {
            BinOp::Add => x.checked_add(y).map(GuestValue::Int).ok_or_else(overflow),
            BinOp::Sub => x.checked_sub(y).map(GuestValue::Int).ok_or_else(overflow),
            BinOp::Mul => x.checked_mul(y).map(GuestValue::Int).ok_or_else(overflow),
            BinOp::Div => {
                if y == 0 {
                    return Err(GuestError::new("ZeroDivisionError", "division by zero"));
                }
                Ok(GuestValue::Float(x as f64 / y as f64))
            }
            BinOp::FloorDiv | BinOp::Mod => {
                if y == 0 {
                    return Err(GuestError::new("ZeroDivisionError", "integer division or modulo by zero"));
                }
                let q = x.checked_div(y).ok_or_else(overflow)?;
                let r = x - q * y;
                let (q, r) = if r != 0 && ((r < 0) != (y < 0)) { (q - 1, r + y) } else { (q, r) };
                Ok(GuestValue::Int(if op == BinOp::FloorDiv { q } else { r }))
            }
            BinOp::Pow => {
                if y < 0 {
                    return Ok(GuestValue::Float((x as f64).powf(y as f64)));
                }
                let exp = u32::try_from(y).map_err(|_| overflow())?;
                x.checked_pow(exp).map(GuestValue::Int).ok_or_else(overflow)
            }
        };
    }
    let (x, y) = (a.as_f64(), b.as_f64());
    let result = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(GuestError::new("ZeroDivisionError", "float division by zero"));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(GuestError::new("ZeroDivisionError", "float floor division by zero"));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(GuestError::new("ZeroDivisionError", "float modulo"));
            }
            x - y * (x / y).floor()
        }
        BinOp::Pow => x.powf(y),
    };
    Ok(GuestValue::Float(result))
}

/// Shortest text that reads back as the same float, always with a fraction or exponent
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if f.fract() == 0.0 && f.abs() < 1e16 {
        return format!("{:.1}", f);
    }
    let text = format!("{}", f);
    if text.len() > 17 {
        format!("{:e}", f)
    } else {
        text
    }
}

fn op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
    }
}

fn cmp_symbol(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Lt => "<",
        CmpOp::Gt => ">",
        CmpOp::LtEq => "<=",
        _ => ">=",
    }
}

fn not_callable(value: &GuestValue) -> GuestError {
    GuestError::new("TypeError", format!("'{}' object is not callable", value.type_name()))
}

fn no_attribute(value: &GuestValue, name: &str) -> GuestError {
    GuestError::new(
        "AttributeError",
        format!("'{}' object has no attribute '{}'", value.type_name(), name),
    )
}

fn not_subscriptable(value: &GuestValue) -> GuestError {
    GuestError::new("TypeError", format!("'{}' object is not subscriptable", value.type_name()))
}

fn no_item_assignment(value: &GuestValue) -> GuestError {
    GuestError::new(
        "TypeError",
        format!("'{}' object does not support item assignment", value.type_name()),
    )
}

fn no_len(value: &GuestValue) -> GuestError {
    GuestError::new("TypeError", format!("object of type '{}' has no len()", value.type_name()))
}

fn isinstance_type_error() -> GuestError {
    GuestError::new("TypeError", "isinstance() arg 2 must be a type or tuple of types")
}

#[cfg(test)]
mod tests;
