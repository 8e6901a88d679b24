//! Guest syntax tree

use crate::runtime::signature::Signature;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Is,
    IsNot,
    In,
    NotIn,
}

#[derive(Debug, Clone)]
pub enum Arg {
    Positional(Expr),
    Named(String, Expr),
    Star(Expr),
}

#[derive(Debug, Clone)]
pub enum Expr {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attr(Box<Expr>, String),
    Subscript(Box<Expr>, Box<Expr>),
    Slice(Option<Box<Expr>>, Option<Box<Expr>>),
    Call { func: Box<Expr>, args: Vec<Arg> },
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Compare { op: CmpOp, left: Box<Expr>, right: Box<Expr> },
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    IfExp { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    ListComp { elt: Box<Expr>, target: Box<Target>, iter: Box<Expr>, cond: Option<Box<Expr>> },
}

#[derive(Debug, Clone)]
pub enum Target {
    Name(String),
    Attr(Expr, String),
    Subscript(Expr, Expr),
    Tuple(Vec<Target>),
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: String,
    pub signature: Signature,
    /// Default expressions, parallel to `signature.params`
    pub defaults: Vec<Option<Expr>>,
    /// Decorators applied at definition time, innermost last
    pub decorators: Vec<Expr>,
    pub body: Rc<Vec<Stmt>>,
}

#[derive(Debug)]
pub struct Handler {
    pub class: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub enum Stmt {
    Expr(Expr),
    Assign { targets: Vec<Target>, value: Expr },
    AugAssign { target: Target, op: BinOp, value: Expr },
    FunctionDef(Rc<FunctionDef>),
    ClassDef { name: String, base: Option<Expr>, body: Vec<Stmt> },
    Return(Option<Expr>),
    If { branches: Vec<(Expr, Vec<Stmt>)>, otherwise: Option<Vec<Stmt>> },
    While { cond: Expr, body: Vec<Stmt> },
    For { target: Target, iter: Expr, body: Vec<Stmt> },
    Import { module: String, alias: Option<String> },
    ImportFrom { module: String, names: Vec<(String, Option<String>)> },
    Raise(Option<Expr>),
    Try { body: Vec<Stmt>, handlers: Vec<Handler>, finally: Option<Vec<Stmt>> },
    Global(Vec<String>),
    Break,
    Continue,
    Pass,
}
