//! Host interpreter - tree-walking evaluator over the host syntax tree
//!
//! Design:
//! - Top-level functions are hoisted; classes exist once their declaration runs
//! - Function and class names are case-insensitive (stored lowercase)
//! - Exceptions propagate as `Err(HostError::Exception)`; control flow as `Flow`

use super::ast::{BinOp, ClassDecl, Expr, FunctionDecl, Stmt, UnaryOp};
use super::builtins;
use super::class::{builtin_classes, HostClass};
use super::parser::parse_program;
use super::value::{
    new_scope, new_throwable, ArrayKey, HostArray, HostCallable, HostError, HostFunction,
    HostObject, HostScope, HostValue, NativeContext, NativeFn,
};
use crate::runtime::signature::{CallArgs, CallFrame};
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;
use tracing::{debug, trace, warn};

enum Flow {
    Normal,
    Return(HostValue),
    Break,
    Continue,
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn into_value(self) -> HostValue {
        match self {
            Num::Int(i) => HostValue::Int(i),
            Num::Float(f) => HostValue::Float(f),
        }
    }
}

pub struct HostInterp {
    functions: RefCell<IndexMap<String, Rc<HostFunction>>>,
    classes: RefCell<IndexMap<String, Rc<HostClass>>>,
    globals: HostScope,
    output: RefCell<Vec<HostValue>>,
    depth: Cell<usize>,
    max_depth: usize,
}

impl HostInterp {
    pub fn new(max_depth: usize) -> Self {
        let interp = Self {
            functions: RefCell::new(IndexMap::new()),
            classes: RefCell::new(IndexMap::new()),
            globals: new_scope(),
            output: RefCell::new(Vec::new()),
            depth: Cell::new(0),
            max_depth,
        };
        for class in builtin_classes() {
            interp.classes.borrow_mut().insert(class.key(), class);
        }
        builtins::install(&interp);
        interp
    }

    pub fn globals(&self) -> HostScope {
        self.globals.clone()
    }

    pub fn echo(&self, value: HostValue) {
        self.output.borrow_mut().push(value);
    }

    pub fn take_output(&self) -> Vec<HostValue> {
        std::mem::take(&mut *self.output.borrow_mut())
    }

    /// Parse and run a program against the global scope
    pub fn run(&self, source: &str) -> Result<(), HostError> {
        let program = self.compile(source)?;
        self.execute(&program, &self.globals)
    }

    pub fn compile(&self, source: &str) -> Result<Vec<Stmt>, HostError> {
        parse_program(source).map_err(|msg| HostError::throw("ParseError", msg))
    }

    pub fn execute(&self, program: &[Stmt], scope: &HostScope) -> Result<(), HostError> {
        for stmt in program {
            if let Stmt::Function(decl) = stmt {
                self.define_function(decl)?;
            }
        }
        match self.exec_block(program, scope)? {
            Flow::Normal | Flow::Return(_) => Ok(()),
            Flow::Break | Flow::Continue => {
                Err(HostError::throw("Error", "'break' not in the 'loop' or 'switch' context"))
            }
        }
    }

    // ------------------------------------------------------------------
    // Symbol tables
    // ------------------------------------------------------------------

    pub fn lookup_function(&self, name: &str) -> Option<Rc<HostFunction>> {
        self.functions.borrow().get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn declare_function(&self, function: Rc<HostFunction>) -> Result<(), HostError> {
        let key = function.name.to_ascii_lowercase();
        let mut functions = self.functions.borrow_mut();
        if functions.contains_key(&key) {
            return Err(HostError::error(format!("Cannot redeclare {}()", function.name)));
        }
        debug!(function = %function.name, "host function declared");
        functions.insert(key, function);
        Ok(())
    }

    pub fn register_native(&self, name: &str, f: NativeFn) {
        self.functions
            .borrow_mut()
            .insert(name.to_ascii_lowercase(), HostFunction::native(name, f));
    }

    /// Declare a user function unless this very declaration is already bound
    pub fn define_function(&self, decl: &Rc<FunctionDecl>) -> Result<Rc<HostFunction>, HostError> {
        if let Some(existing) = self.lookup_function(&decl.name) {
            if let HostCallable::User(d) = &existing.body {
                if Rc::ptr_eq(d, decl) {
                    return Ok(existing);
                }
            }
        }
        let function = Rc::new(HostFunction {
            name: Rc::from(decl.name.as_str()),
            body: HostCallable::User(decl.clone()),
        });
        self.declare_function(function.clone())?;
        Ok(function)
    }

    pub fn lookup_class(&self, name: &str) -> Option<Rc<HostClass>> {
        self.classes.borrow().get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn declare_class(&self, class: Rc<HostClass>) -> Result<(), HostError> {
        let mut classes = self.classes.borrow_mut();
        if classes.contains_key(&class.key()) {
            return Err(HostError::error(format!(
                "Cannot declare class {}, because the name is already in use",
                class.name
            )));
        }
        debug!(class = %class.name, "host class declared");
        classes.insert(class.key(), class);
        Ok(())
    }

    fn declare_class_decl(&self, decl: &ClassDecl) -> Result<(), HostError> {
        let parent = match &decl.parent {
            Some(name) => Some(
                self.lookup_class(name)
                    .ok_or_else(|| HostError::error(format!("Class \"{}\" not found", name)))?,
            ),
            None => None,
        };
        let empty = new_scope();
        let mut props = Vec::with_capacity(decl.props.len());
        for (name, default) in &decl.props {
            let value = match default {
                Some(expr) => self.eval(expr, &empty)?,
                None => HostValue::Null,
            };
            props.push((name.clone(), value));
        }
        let class = Rc::new(HostClass::new(&decl.name, parent, props));
        for method in &decl.methods {
            class.install_method(
                &method.name,
                Rc::new(HostFunction {
                    name: Rc::from(method.name.as_str()),
                    body: HostCallable::User(method.clone()),
                }),
            );
        }
        self.declare_class(class)
    }

    /// Raise an instance of any declared throwable class
    pub fn throw(&self, class: &str, message: impl Into<String>) -> HostError {
        match self.lookup_class(class) {
            Some(c) if c.is_subclass_of("Exception") => {
                HostError::Exception(new_throwable(c, message.into()))
            }
            _ => HostError::throw("Error", message),
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// Call with host semantics: surplus arguments are dropped unless the
    /// callee collects them.
    pub fn call_function(
        &self,
        function: &Rc<HostFunction>,
        args: Vec<HostValue>,
        this: Option<HostValue>,
    ) -> Result<HostValue, HostError> {
        self.call_in_scope(function, args, this, &self.globals)
    }

    fn call_in_scope(
        &self,
        function: &Rc<HostFunction>,
        mut args: Vec<HostValue>,
        this: Option<HostValue>,
        caller: &HostScope,
    ) -> Result<HostValue, HostError> {
        trace!(function = %function.name, args = args.len(), "host call");
        match &function.body {
            HostCallable::User(decl) => {
                if decl.signature.variadic.is_none() {
                    args.truncate(decl.signature.params.len());
                }
                let frame = decl
                    .signature
                    .bind(CallArgs::positional(args))
                    .map_err(|e| HostError::throw("Error", format!("Too few arguments: {}", e)))?;
                self.call_user(decl, frame, this)
            }
            HostCallable::Native(f) => {
                let ctx = NativeContext { this, scope: caller.clone() };
                f(self, &ctx, args)
            }
            HostCallable::Foreign(target) => {
                if let Some(this) = this {
                    args.insert(0, this);
                }
                target.invoke(args)
            }
        }
    }

    /// Invoke with arguments already bound to the callee's declared
    /// parameters. Empty slots take the callee's own defaults.
    pub fn invoke_bound(
        &self,
        function: &Rc<HostFunction>,
        frame: CallFrame<HostValue>,
        this: Option<HostValue>,
    ) -> Result<HostValue, HostError> {
        match &function.body {
            HostCallable::User(decl) => self.call_user(decl, frame, this),
            _ => {
                let mut args: Vec<HostValue> =
                    frame.slots.into_iter().map(|s| s.unwrap_or(HostValue::Null)).collect();
                args.extend(frame.variadic);
                self.call_function(function, args, this)
            }
        }
    }

    fn call_user(
        &self,
        decl: &Rc<FunctionDecl>,
        frame: CallFrame<HostValue>,
        this: Option<HostValue>,
    ) -> Result<HostValue, HostError> {
        let depth = self.depth.get();
        if depth >= self.max_depth {
            return Err(HostError::error(format!(
                "Maximum function nesting level of '{}' reached",
                self.max_depth
            )));
        }
        self.depth.set(depth + 1);
        let result = self.run_user(decl, frame, this);
        self.depth.set(depth);
        result
    }

    fn run_user(
        &self,
        decl: &FunctionDecl,
        frame: CallFrame<HostValue>,
        this: Option<HostValue>,
    ) -> Result<HostValue, HostError> {
        let scope = new_scope();
        if let Some(this) = this {
            scope.borrow_mut().insert("this".to_string(), this);
        }
        for (i, slot) in frame.slots.into_iter().enumerate() {
            let value = match (slot, &decl.defaults[i]) {
                (Some(v), _) => v,
                (None, Some(default)) => self.eval(default, &scope)?,
                (None, None) => HostValue::Null,
            };
            scope.borrow_mut().insert(decl.signature.params[i].name.to_string(), value);
        }
        if let Some(rest) = &decl.signature.variadic {
            scope.borrow_mut().insert(rest.to_string(), HostValue::list(frame.variadic));
        }
        match self.exec_block(&decl.body, &scope)? {
            Flow::Return(v) => Ok(v),
            _ => Ok(HostValue::Null),
        }
    }

    pub fn call_value(&self, callee: &HostValue, args: Vec<HostValue>) -> Result<HostValue, HostError> {
        self.call_value_in(callee, args, &self.globals)
    }

    fn call_value_in(
        &self,
        callee: &HostValue,
        args: Vec<HostValue>,
        caller: &HostScope,
    ) -> Result<HostValue, HostError> {
        match callee {
            HostValue::Function(f) => self.call_in_scope(f, args, None, caller),
            HostValue::Foreign(f) => f.invoke(args),
            HostValue::Str(name) => {
                let f = self.lookup_function(name).ok_or_else(|| {
                    HostError::error(format!("Call to undefined function {}()", name))
                })?;
                self.call_in_scope(&f, args, None, caller)
            }
            other => Err(HostError::error(format!("Value of type {} is not callable", other.type_name()))),
        }
    }

    pub fn call_method(&self, target: &HostValue, name: &str, args: Vec<HostValue>) -> Result<HostValue, HostError> {
        match target {
            HostValue::Object(obj) => {
                let method = obj.class.find_method(name).ok_or_else(|| {
                    HostError::error(format!("Call to undefined method {}::{}()", obj.class.name, name))
                })?;
                self.call_function(&method, args, Some(target.clone()))
            }
            HostValue::Foreign(f) => f.call_method(name, args),
            other => Err(HostError::error(format!(
                "Call to a member function {}() on {}",
                name,
                other.type_name()
            ))),
        }
    }

    pub fn instantiate(&self, class: &Rc<HostClass>, args: Vec<HostValue>) -> Result<HostValue, HostError> {
        let value = HostValue::Object(Rc::new(HostObject::new(class.clone())));
        if let Some(ctor) = class.find_method("__construct") {
            self.call_function(&ctor, args, Some(value.clone()))?;
        }
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Property and index protocol
    // ------------------------------------------------------------------

    pub fn get_property(&self, target: &HostValue, name: &str) -> Result<HostValue, HostError> {
        match target {
            HostValue::Object(obj) => Ok(obj.get(name).unwrap_or_else(|| {
                warn!(class = %obj.class.name, property = name, "undefined property");
                HostValue::Null
            })),
            HostValue::Foreign(f) => f.get_property(name),
            other => {
                warn!(property = name, on = %other.type_name(), "property read on non-object");
                Ok(HostValue::Null)
            }
        }
    }

    pub fn set_property(&self, target: &HostValue, name: &str, value: HostValue) -> Result<(), HostError> {
        match target {
            HostValue::Object(obj) => {
                obj.set(name, value);
                Ok(())
            }
            HostValue::Foreign(f) => f.set_property(name, value),
            other => Err(HostError::error(format!(
                "Attempt to assign property \"{}\" on {}",
                name,
                other.type_name()
            ))),
        }
    }

    pub fn get_index(&self, target: &HostValue, key: &HostValue) -> Result<HostValue, HostError> {
        match target {
            HostValue::Array(array) => {
                let key = ArrayKey::from_value(key)
                    .ok_or_else(|| HostError::error("Illegal offset type"))?;
                Ok(array.get(&key).unwrap_or(HostValue::Null))
            }
            HostValue::Str(s) => {
                let index = self.to_number(key)?.as_f64() as i64;
                let len = s.chars().count() as i64;
                let index = if index < 0 { len + index } else { index };
                Ok(s.chars()
                    .nth(index.max(0) as usize)
                    .filter(|_| index >= 0)
                    .map(|c| HostValue::str(&c.to_string()))
                    .unwrap_or_else(|| HostValue::str("")))
            }
            HostValue::Foreign(f) => f.get_index(key),
            HostValue::Null => Ok(HostValue::Null),
            other => Err(HostError::error(format!(
                "Cannot use a scalar value of type {} as an array",
                other.type_name()
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn exec_block(&self, stmts: &[Stmt], scope: &HostScope) -> Result<Flow, HostError> {
        for stmt in stmts {
            match self.exec(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&self, stmt: &Stmt, scope: &HostScope) -> Result<Flow, HostError> {
        match stmt {
            Stmt::Echo(exprs) => {
                for expr in exprs {
                    let value = self.eval(expr, scope)?;
                    self.echo(value);
                }
            }
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => HostValue::Null,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Function(decl) => {
                self.define_function(decl)?;
            }
            Stmt::Class(decl) => self.declare_class_decl(decl)?,
            Stmt::If { branches, otherwise } => {
                for (cond, body) in branches {
                    if self.eval(cond, scope)?.is_truthy() {
                        return self.exec_block(body, scope);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec_block(body, scope);
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond, scope)?.is_truthy() {
                    match self.exec_block(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::For { init, cond, step, body } => {
                for expr in init {
                    self.eval(expr, scope)?;
                }
                loop {
                    if let Some(cond) = cond {
                        if !self.eval(cond, scope)?.is_truthy() {
                            break;
                        }
                    }
                    match self.exec_block(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    for expr in step {
                        self.eval(expr, scope)?;
                    }
                }
            }
            Stmt::Foreach { subject, key, value, body } => {
                let entries = match self.eval(subject, scope)? {
                    HostValue::Array(array) => array
                        .entries()
                        .into_iter()
                        .map(|(k, v)| (k.to_value(), v))
                        .collect::<Vec<_>>(),
                    HostValue::Object(obj) => obj
                        .props
                        .borrow()
                        .iter()
                        .map(|(k, v)| (HostValue::str(k), v.clone()))
                        .collect(),
                    other => {
                        return Err(HostError::error(format!(
                            "foreach() argument must be of type array, {} given",
                            other.type_name()
                        )))
                    }
                };
                for (k, v) in entries {
                    if let Some(key) = key {
                        scope.borrow_mut().insert(key.clone(), k);
                    }
                    scope.borrow_mut().insert(value.clone(), v);
                    match self.exec_block(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::Try { body, catches, finally } => {
                let result = match self.exec_block(body, scope) {
                    Err(HostError::Exception(exc)) => {
                        let handler = catches.iter().find(|c| {
                            c.classes.iter().any(|name| {
                                name.eq_ignore_ascii_case("Throwable") || exc.is_instance_of(name)
                            })
                        });
                        match handler {
                            Some(handler) => {
                                if let Some(var) = &handler.var {
                                    scope.borrow_mut().insert(var.clone(), HostValue::Object(exc));
                                }
                                self.exec_block(&handler.body, scope)
                            }
                            None => Err(HostError::Exception(exc)),
                        }
                    }
                    other => other,
                };
                if let Some(finally) = finally {
                    match self.exec_block(finally, scope)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                return result;
            }
            Stmt::Throw(expr) => {
                return match self.eval(expr, scope)? {
                    HostValue::Object(obj) if obj.is_instance_of("Exception") => {
                        Err(HostError::Exception(obj))
                    }
                    _ => Err(HostError::error("Can only throw objects")),
                };
            }
            Stmt::Block(stmts) => return self.exec_block(stmts, scope),
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval_args(&self, args: &[Expr], scope: &HostScope) -> Result<Vec<HostValue>, HostError> {
        args.iter().map(|a| self.eval(a, scope)).collect()
    }

    fn eval(&self, expr: &Expr, scope: &HostScope) -> Result<HostValue, HostError> {
        match expr {
            Expr::Null => Ok(HostValue::Null),
            Expr::Bool(b) => Ok(HostValue::Bool(*b)),
            Expr::Int(i) => Ok(HostValue::Int(*i)),
            Expr::Float(f) => Ok(HostValue::Float(*f)),
            Expr::Str(s) => Ok(HostValue::Str(s.clone())),
            Expr::Var(name) => match scope.borrow().get(name) {
                Some(v) => Ok(v.clone()),
                None => {
                    warn!(variable = %name, "undefined variable");
                    Ok(HostValue::Null)
                }
            },
            Expr::Const(name) => match name.as_str() {
                "PHP_EOL" => Ok(HostValue::str("\n")),
                "PHP_INT_MAX" => Ok(HostValue::Int(i64::MAX)),
                "PHP_INT_MIN" => Ok(HostValue::Int(i64::MIN)),
                "M_PI" => Ok(HostValue::Float(std::f64::consts::PI)),
                "NAN" => Ok(HostValue::Float(f64::NAN)),
                "INF" => Ok(HostValue::Float(f64::INFINITY)),
                _ => Err(HostError::error(format!("Undefined constant \"{}\"", name))),
            },
            Expr::Array(items) => {
                let array = HostArray::new();
                for (key, value) in items {
                    let value = self.eval(value, scope)?;
                    match key {
                        Some(key) => {
                            let key = self.eval(key, scope)?;
                            let key = ArrayKey::from_value(&key)
                                .ok_or_else(|| HostError::error("Illegal offset type"))?;
                            array.set(key, value);
                        }
                        None => array.push(value),
                    }
                }
                Ok(HostValue::Array(Rc::new(array)))
            }
            Expr::Prop(object, name) => {
                let object = self.eval(object, scope)?;
                self.get_property(&object, name)
            }
            Expr::Index(container, key) => {
                let container = self.eval(container, scope)?;
                match key {
                    Some(key) => {
                        let key = self.eval(key, scope)?;
                        self.get_index(&container, &key)
                    }
                    None => Err(HostError::error("Cannot use [] for reading")),
                }
            }
            Expr::Call { name, args } => {
                let function = self.lookup_function(name).ok_or_else(|| {
                    HostError::error(format!("Call to undefined function {}()", name))
                })?;
                let args = self.eval_args(args, scope)?;
                self.call_in_scope(&function, args, None, scope)
            }
            Expr::CallValue { callee, args } => {
                let callee = self.eval(callee, scope)?;
                let args = self.eval_args(args, scope)?;
                self.call_value_in(&callee, args, scope)
            }
            Expr::MethodCall { object, method, args } => {
                let object = self.eval(object, scope)?;
                let args = self.eval_args(args, scope)?;
                self.call_method(&object, method, args)
            }
            Expr::New { class, args } => {
                let class = self
                    .lookup_class(class)
                    .ok_or_else(|| HostError::error(format!("Class \"{}\" not found", class)))?;
                let args = self.eval_args(args, scope)?;
                self.instantiate(&class, args)
            }
            Expr::Assign { target, value } => {
                let value = self.eval(value, scope)?;
                self.assign(target, value.clone(), scope)?;
                Ok(value)
            }
            Expr::CompoundAssign { op, target, value } => {
                let current = self.eval(target, scope)?;
                let operand = self.eval(value, scope)?;
                let result = self.binary(*op, &current, &operand)?;
                self.assign(target, result.clone(), scope)?;
                Ok(result)
            }
            Expr::IncDec { target, delta, prefix } => {
                let current = self.eval(target, scope)?;
                let updated = self.binary(BinOp::Add, &current, &HostValue::Int(*delta))?;
                self.assign(target, updated.clone(), scope)?;
                Ok(if *prefix { updated } else { current })
            }
            Expr::Binary { op: BinOp::And, left, right } => {
                let truth = self.eval(left, scope)?.is_truthy() && self.eval(right, scope)?.is_truthy();
                Ok(HostValue::Bool(truth))
            }
            Expr::Binary { op: BinOp::Or, left, right } => {
                let truth = self.eval(left, scope)?.is_truthy() || self.eval(right, scope)?.is_truthy();
                Ok(HostValue::Bool(truth))
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary(*op, &left, &right)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, scope)?;
                match op {
                    UnaryOp::Not => Ok(HostValue::Bool(!value.is_truthy())),
                    UnaryOp::Plus => Ok(self.to_number(&value)?.into_value()),
                    UnaryOp::Neg => Ok(match self.to_number(&value)? {
                        Num::Int(i) => i.checked_neg().map(HostValue::Int).unwrap_or(HostValue::Float(-(i as f64))),
                        Num::Float(f) => HostValue::Float(-f),
                    }),
                }
            }
            Expr::InstanceOf { value, class } => match self.eval(value, scope)? {
                HostValue::Object(obj) => Ok(HostValue::Bool(obj.is_instance_of(class))),
                _ => Ok(HostValue::Bool(false)),
            },
            Expr::Ternary { cond, then, otherwise } => {
                let cond_value = self.eval(cond, scope)?;
                if cond_value.is_truthy() {
                    match then {
                        Some(then) => self.eval(then, scope),
                        None => Ok(cond_value),
                    }
                } else {
                    self.eval(otherwise, scope)
                }
            }
        }
    }

    fn assign(&self, target: &Expr, value: HostValue, scope: &HostScope) -> Result<(), HostError> {
        match target {
            Expr::Var(name) => {
                scope.borrow_mut().insert(name.clone(), value);
                Ok(())
            }
            Expr::Prop(object, name) => {
                let object = self.eval(object, scope)?;
                self.set_property(&object, name, value)
            }
            Expr::Index(container, key) => {
                let container = self.container_for_write(container, scope)?;
                let key = match key {
                    Some(key) => Some(self.eval(key, scope)?),
                    None => None,
                };
                match (&container, key) {
                    (HostValue::Array(array), None) => {
                        array.push(value);
                        Ok(())
                    }
                    (HostValue::Array(array), Some(key)) => {
                        let key = ArrayKey::from_value(&key)
                            .ok_or_else(|| HostError::error("Illegal offset type"))?;
                        array.set(key, value);
                        Ok(())
                    }
                    (other, _) => Err(HostError::error(format!(
                        "Cannot use a scalar value of type {} as an array",
                        other.type_name()
                    ))),
                }
            }
            _ => Err(HostError::error("Cannot assign to this expression")),
        }
    }

    /// Resolve an assignment container, creating an empty array in place of null
    fn container_for_write(&self, expr: &Expr, scope: &HostScope) -> Result<HostValue, HostError> {
        let current = match expr {
            Expr::Var(name) => scope.borrow().get(name).cloned().unwrap_or(HostValue::Null),
            Expr::Prop(object, name) => match self.eval(object, scope)? {
                HostValue::Object(obj) => obj.get(name).unwrap_or(HostValue::Null),
                other => self.get_property(&other, name)?,
            },
            Expr::Index(inner, Some(key)) => {
                let inner = self.container_for_write(inner, scope)?;
                let key = self.eval(key, scope)?;
                self.get_index(&inner, &key)?
            }
            other => self.eval(other, scope)?,
        };
        if let HostValue::Null = current {
            let fresh = HostValue::Array(Rc::new(HostArray::new()));
            self.assign(expr, fresh.clone(), scope)?;
            return Ok(fresh);
        }
        Ok(current)
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn to_number(&self, value: &HostValue) -> Result<Num, HostError> {
        match value {
            HostValue::Null => Ok(Num::Int(0)),
            HostValue::Bool(b) => Ok(Num::Int(*b as i64)),
            HostValue::Int(i) => Ok(Num::Int(*i)),
            HostValue::Float(f) => Ok(Num::Float(*f)),
            HostValue::Str(s) => parse_numeric(s).ok_or_else(|| {
                HostError::error(format!("Unsupported operand types: non-numeric string \"{}\"", s))
            }),
            other => Err(HostError::error(format!(
                "Unsupported operand types: {}",
                other.type_name()
            ))),
        }
    }

    pub fn binary(&self, op: BinOp, left: &HostValue, right: &HostValue) -> Result<HostValue, HostError> {
        match op {
            BinOp::Concat => {
                let mut s = self.to_display(left)?;
                s.push_str(&self.to_display(right)?);
                Ok(HostValue::str(&s))
            }
            BinOp::Eq => Ok(HostValue::Bool(self.loose_eq(left, right)?)),
            BinOp::NotEq => Ok(HostValue::Bool(!self.loose_eq(left, right)?)),
            BinOp::Identical => Ok(HostValue::Bool(strict_eq(left, right))),
            BinOp::NotIdentical => Ok(HostValue::Bool(!strict_eq(left, right))),
            BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq => {
                let ordering = self.compare(left, right)?;
                let truth = match (op, ordering) {
                    (_, None) => false,
                    (BinOp::Lt, Some(o)) => o == Ordering::Less,
                    (BinOp::Gt, Some(o)) => o == Ordering::Greater,
                    (BinOp::LtEq, Some(o)) => o != Ordering::Greater,
                    (_, Some(o)) => o != Ordering::Less,
                };
                Ok(HostValue::Bool(truth))
            }
            BinOp::And => Ok(HostValue::Bool(left.is_truthy() && right.is_truthy())),
            BinOp::Or => Ok(HostValue::Bool(left.is_truthy() || right.is_truthy())),
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                let a = self.to_number(left)?;
                let b = self.to_number(right)?;
                arithmetic(op, a, b)
            }
        }
    }

    fn compare(&self, left: &HostValue, right: &HostValue) -> Result<Option<Ordering>, HostError> {
        match (left, right) {
            (HostValue::Str(a), HostValue::Str(b)) => match (parse_numeric(a), parse_numeric(b)) {
                (Some(x), Some(y)) => Ok(x.as_f64().partial_cmp(&y.as_f64())),
                _ => Ok(Some(a.cmp(b))),
            },
            (HostValue::Bool(_), _) | (_, HostValue::Bool(_)) | (HostValue::Null, _) | (_, HostValue::Null) => {
                Ok(Some(left.is_truthy().cmp(&right.is_truthy())))
            }
            (HostValue::Array(a), HostValue::Array(b)) => Ok(Some(a.len().cmp(&b.len()))),
            _ => {
                let a = self.to_number(left)?;
                let b = self.to_number(right)?;
                Ok(match (a, b) {
                    (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
                    _ => a.as_f64().partial_cmp(&b.as_f64()),
                })
            }
        }
    }

    /// `==`: numeric across int/float/numeric strings, objects equal when
    /// of the same class with loosely equal properties.
    pub fn loose_eq(&self, left: &HostValue, right: &HostValue) -> Result<bool, HostError> {
        self.loose_eq_at(left, right, 0)
    }

    /// Aggregates compare member-wise; cyclic ones hit the nesting limit
    fn loose_eq_at(&self, left: &HostValue, right: &HostValue, depth: usize) -> Result<bool, HostError> {
        use HostValue::*;
        if depth >= self.max_depth {
            return Err(HostError::error("Nesting level too deep - recursive dependency?"));
        }
        Ok(match (left, right) {
            (Foreign(f), other) | (other, Foreign(f)) => {
                if let (Foreign(a), Foreign(b)) = (left, right) {
                    if Rc::ptr_eq(a, b) {
                        return Ok(true);
                    }
                }
                f.loose_eq(other)?
            }
            (Null, Null) => true,
            (Bool(_), _) | (_, Bool(_)) => left.is_truthy() == right.is_truthy(),
            (Null, Str(s)) | (Str(s), Null) => s.is_empty(),
            (Null, _) | (_, Null) => !left.is_truthy() && !right.is_truthy(),
            (Str(a), Str(b)) => match (parse_numeric(a), parse_numeric(b)) {
                (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
                _ => a == b,
            },
            (Int(_) | Float(_), Str(s)) | (Str(s), Int(_) | Float(_)) => {
                let number = if let Str(_) = left { right } else { left };
                match parse_numeric(s) {
                    Some(n) => n.as_f64() == self.to_number(number)?.as_f64(),
                    None => *self.to_display(number)? == **s,
                }
            }
            (Int(a), Int(b)) => a == b,
            (Int(_) | Float(_), Int(_) | Float(_)) => {
                self.to_number(left)?.as_f64() == self.to_number(right)?.as_f64()
            }
            (Array(a), Array(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (key, value) in a.entries() {
                    match b.get(&key) {
                        Some(other) if self.loose_eq_at(&value, &other, depth + 1)? => {}
                        _ => return Ok(false),
                    }
                }
                true
            }
            (Object(a), Object(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                if !Rc::ptr_eq(&a.class, &b.class) {
                    return Ok(false);
                }
                let a_props: Vec<(String, HostValue)> =
                    a.props.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                if a_props.len() != b.props.borrow().len() {
                    return Ok(false);
                }
                for (key, value) in a_props {
                    match b.get(&key) {
                        Some(other) if self.loose_eq_at(&value, &other, depth + 1)? => {}
                        _ => return Ok(false),
                    }
                }
                true
            }
            (Function(a), Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        })
    }

    /// String conversion as performed by `echo` and `.`
    pub fn to_display(&self, value: &HostValue) -> Result<String, HostError> {
        match value {
            HostValue::Null => Ok(String::new()),
            HostValue::Bool(true) => Ok("1".to_string()),
            HostValue::Bool(false) => Ok(String::new()),
            HostValue::Int(i) => Ok(i.to_string()),
            HostValue::Float(f) => Ok(format_float(*f)),
            HostValue::Str(s) => Ok(s.to_string()),
            HostValue::Array(_) => Ok("Array".to_string()),
            HostValue::Object(obj) => match obj.class.find_method("__toString") {
                Some(method) => {
                    let result = self.call_function(&method, Vec::new(), Some(value.clone()))?;
                    self.to_display(&result)
                }
                None => Err(HostError::error(format!(
                    "Object of class {} could not be converted to string",
                    obj.class.name
                ))),
            },
            HostValue::Function(_) => Err(HostError::error("Object of class Closure could not be converted to string")),
            HostValue::Foreign(f) => f.to_host_string(),
        }
    }
}

/// `===`: same type and value; identity for objects and callables
pub fn strict_eq(left: &HostValue, right: &HostValue) -> bool {
    match (left, right) {
        (HostValue::Float(a), HostValue::Float(b)) => a == b,
        (HostValue::Array(a), HostValue::Array(b)) => {
            if Rc::ptr_eq(a, b) {
                return true;
            }
            let (a, b) = (a.entries(), b.entries());
            a.len() == b.len()
                && a.iter().zip(&b).all(|((ka, va), (kb, vb))| ka == kb && strict_eq(va, vb))
        }
        (HostValue::Object(_), HostValue::Object(_))
        | (HostValue::Function(_), HostValue::Function(_))
        | (HostValue::Foreign(_), HostValue::Foreign(_)) => left.identity() == right.identity(),
        _ => left == right,
    }
}

fn parse_numeric(s: &str) -> Option<Num> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Num::Int(i));
    }
    let looks_numeric = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if looks_numeric {
        trimmed.parse::<f64>().ok().map(Num::Float)
    } else {
        None
    }
}

fn arithmetic(op: BinOp, a: Num, b: Num) -> Result<HostValue, HostError> {
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        let exact = match op {
            BinOp::Add => x.checked_add(y),
            BinOp::Sub => x.checked_sub(y),
            BinOp::Mul => x.checked_mul(y),
            BinOp::Div => {
                if y == 0 {
                    return Err(HostError::error("Division by zero"));
                }
                if x.checked_rem(y) == Some(0) { x.checked_div(y) } else { None }
            }
            BinOp::Mod => {
                if y == 0 {
                    return Err(HostError::error("Modulo by zero"));
                }
                Some(x.wrapping_rem(y))
            }
            _ => None,
        };
        if let Some(result) = exact {
            return Ok(HostValue::Int(result));
        }
    }
    let (x, y) = (a.as_f64(), b.as_f64());
    let result = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(HostError::error("Division by zero"));
            }
            x / y
        }
        BinOp::Mod => {
            let divisor = y as i64;
            if divisor == 0 {
                return Err(HostError::error("Modulo by zero"));
            }
            return Ok(HostValue::Int((x as i64).wrapping_rem(divisor)));
        }
        _ => return Err(HostError::error("unsupported arithmetic operator")),
    };
    Ok(HostValue::Float(result))
}

/// Fourteen significant digits, integral floats without a fraction
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NAN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if f.fract() == 0.0 && f.abs() < 1e15 {
        return format!("{}", f as i64);
    }
    let magnitude = f.abs().log10().floor() as i32 + 1;
    let decimals = 14 - magnitude;
    if (0..=17).contains(&decimals) {
        let s = format!("{:.*}", decimals as usize, f);
        let s = s.trim_end_matches('0').trim_end_matches('.');
        s.to_string()
    } else {
        format!("{:.13E}", f)
    }
}

#[cfg(test)]
mod tests;
