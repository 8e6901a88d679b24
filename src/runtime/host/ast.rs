//! Host syntax tree

use crate::runtime::signature::Signature;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    NotEq,
    Identical,
    NotIdentical,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Var(String),
    Const(String),
    Array(Vec<(Option<Expr>, Expr)>),
    Prop(Box<Expr>, String),
    /// `None` index is the append form `$a[]`
    Index(Box<Expr>, Option<Box<Expr>>),
    Call { name: String, args: Vec<Expr> },
    CallValue { callee: Box<Expr>, args: Vec<Expr> },
    MethodCall { object: Box<Expr>, method: String, args: Vec<Expr> },
    New { class: String, args: Vec<Expr> },
    Assign { target: Box<Expr>, value: Box<Expr> },
    CompoundAssign { op: BinOp, target: Box<Expr>, value: Box<Expr> },
    IncDec { target: Box<Expr>, delta: i64, prefix: bool },
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    InstanceOf { value: Box<Expr>, class: String },
    Ternary { cond: Box<Expr>, then: Option<Box<Expr>>, otherwise: Box<Expr> },
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub signature: Signature,
    /// Default expressions, parallel to `signature.params`
    pub defaults: Vec<Option<Expr>>,
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub struct ClassDecl {
    pub name: String,
    pub parent: Option<String>,
    pub props: Vec<(String, Option<Expr>)>,
    pub methods: Vec<Rc<FunctionDecl>>,
}

#[derive(Debug)]
pub struct Catch {
    pub classes: Vec<String>,
    pub var: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub enum Stmt {
    Echo(Vec<Expr>),
    Expr(Expr),
    Return(Option<Expr>),
    Function(Rc<FunctionDecl>),
    Class(Rc<ClassDecl>),
    If { branches: Vec<(Expr, Vec<Stmt>)>, otherwise: Option<Vec<Stmt>> },
    While { cond: Expr, body: Vec<Stmt> },
    For { init: Vec<Expr>, cond: Option<Expr>, step: Vec<Expr>, body: Vec<Stmt> },
    Foreach { subject: Expr, key: Option<String>, value: String, body: Vec<Stmt> },
    Try { body: Vec<Stmt>, catches: Vec<Catch>, finally: Option<Vec<Stmt>> },
    Throw(Expr),
    Block(Vec<Stmt>),
    Break,
    Continue,
}
