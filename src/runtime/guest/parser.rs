//! Guest parser - `rustpython-parser` front end lowered into the guest tree
//!
//! The reference-preservation decorator `@host_refs('a', ...)` is consumed
//! here and recorded on the function's signature; it never reaches runtime.
//! Constructs the interpreter does not evaluate are rejected at parse time.

use super::ast::{Arg, BinOp, CmpOp, Expr, FunctionDef, Handler, Stmt, Target};
use crate::runtime::signature::{Param, Signature};
use num_traits::ToPrimitive;
use rustpython_parser::ast::{self as py, Constant, Mod, ModModule};
use rustpython_parser::{parse, Mode};
use std::rc::Rc;

/// Decorator name marking parameters that receive host aggregates by reference
pub const REF_DECORATOR: &str = "host_refs";

pub type ParseError = String;

pub fn parse_module(source: &str) -> Result<Vec<Stmt>, ParseError> {
    match parse(source, Mode::Module, "<guest>") {
        Ok(Mod::Module(ModModule { body, .. })) => lower_body(&body),
        Ok(_) => Err("expected a module".to_string()),
        Err(e) => Err(format!("invalid syntax: {}", e)),
    }
}

fn unsupported(what: &str) -> ParseError {
    format!("{} is not supported", what)
}

fn lower_body(body: &[py::Stmt]) -> Result<Vec<Stmt>, ParseError> {
    let mut out = Vec::with_capacity(body.len());
    for stmt in body {
        match stmt {
            // `import a, b` runs as consecutive imports
            py::Stmt::Import(import) => out.extend(import.names.iter().map(|alias| Stmt::Import {
                module: alias.name.to_string(),
                alias: alias.asname.as_ref().map(|a| a.to_string()),
            })),
            other => out.push(lower_stmt(other)?),
        }
    }
    Ok(out)
}

/// `else` blocks of loops and `try` are outside the guest language
fn no_orelse(orelse: &[py::Stmt], what: &str) -> Result<(), ParseError> {
    if orelse.is_empty() {
        Ok(())
    } else {
        Err(unsupported(&format!("'else' on {}", what)))
    }
}

fn lower_stmt(stmt: &py::Stmt) -> Result<Stmt, ParseError> {
    Ok(match stmt {
        py::Stmt::Expr(s) => Stmt::Expr(lower_expr(&s.value)?),
        py::Stmt::Assign(s) => Stmt::Assign {
            targets: s.targets.iter().map(lower_target).collect::<Result<_, _>>()?,
            value: lower_expr(&s.value)?,
        },
        py::Stmt::AnnAssign(s) => match &s.value {
            Some(value) => Stmt::Assign { targets: vec![lower_target(&s.target)?], value: lower_expr(value)? },
            None => Stmt::Pass,
        },
        py::Stmt::AugAssign(s) => Stmt::AugAssign {
            target: lower_target(&s.target)?,
            op: lower_operator(&s.op)?,
            value: lower_expr(&s.value)?,
        },
        py::Stmt::FunctionDef(def) => Stmt::FunctionDef(Rc::new(lower_function(def)?)),
        py::Stmt::ClassDef(def) => {
            if !def.decorator_list.is_empty() {
                return Err(unsupported("class decorators"));
            }
            if !def.keywords.is_empty() || def.bases.len() > 1 {
                return Err(unsupported("multiple inheritance"));
            }
            Stmt::ClassDef {
                name: def.name.to_string(),
                base: def.bases.first().map(lower_expr).transpose()?,
                body: lower_body(&def.body)?,
            }
        }
        py::Stmt::Return(s) => Stmt::Return(s.value.as_deref().map(lower_expr).transpose()?),
        py::Stmt::If(s) => lower_if(s)?,
        py::Stmt::While(s) => {
            no_orelse(&s.orelse, "while")?;
            Stmt::While { cond: lower_expr(&s.test)?, body: lower_body(&s.body)? }
        }
        py::Stmt::For(s) => {
            no_orelse(&s.orelse, "for")?;
            Stmt::For {
                target: lower_target(&s.target)?,
                iter: lower_expr(&s.iter)?,
                body: lower_body(&s.body)?,
            }
        }
        py::Stmt::ImportFrom(s) => {
            if s.level.map_or(false, |level| level.to_u32() > 0) {
                return Err(unsupported("relative import"));
            }
            let module = s.module.as_ref().map(|m| m.to_string()).ok_or_else(|| unsupported("relative import"))?;
            let names = s
                .names
                .iter()
                .map(|alias| {
                    if alias.name.as_str() == "*" {
                        Err(unsupported("'import *'"))
                    } else {
                        Ok((alias.name.to_string(), alias.asname.as_ref().map(|a| a.to_string())))
                    }
                })
                .collect::<Result<_, _>>()?;
            Stmt::ImportFrom { module, names }
        }
        py::Stmt::Raise(s) => {
            if s.cause.is_some() {
                return Err(unsupported("'raise ... from'"));
            }
            Stmt::Raise(s.exc.as_deref().map(lower_expr).transpose()?)
        }
        py::Stmt::Try(s) => {
            no_orelse(&s.orelse, "try")?;
            let handlers = s
                .handlers
                .iter()
                .map(|handler| {
                    let py::ExceptHandler::ExceptHandler(h) = handler;
                    Ok(Handler {
                        class: h.type_.as_deref().map(lower_expr).transpose()?,
                        name: h.name.as_ref().map(|n| n.to_string()),
                        body: lower_body(&h.body)?,
                    })
                })
                .collect::<Result<Vec<_>, ParseError>>()?;
            let finally = if s.finalbody.is_empty() { None } else { Some(lower_body(&s.finalbody)?) };
            Stmt::Try { body: lower_body(&s.body)?, handlers, finally }
        }
        py::Stmt::Global(s) => Stmt::Global(s.names.iter().map(|n| n.to_string()).collect()),
        py::Stmt::Pass(_) => Stmt::Pass,
        py::Stmt::Break(_) => Stmt::Break,
        py::Stmt::Continue(_) => Stmt::Continue,
        py::Stmt::AsyncFunctionDef(_) | py::Stmt::AsyncFor(_) | py::Stmt::AsyncWith(_) => {
            return Err(unsupported("async code"))
        }
        py::Stmt::With(_) => return Err(unsupported("'with'")),
        py::Stmt::Delete(_) => return Err(unsupported("'del'")),
        py::Stmt::Assert(_) => return Err(unsupported("'assert'")),
        py::Stmt::Nonlocal(_) => return Err(unsupported("'nonlocal'")),
        _ => return Err(unsupported("this statement")),
    })
}

/// `elif` chains arrive as an `If` nested alone in `orelse`
fn lower_if(stmt: &py::StmtIf) -> Result<Stmt, ParseError> {
    let mut branches = vec![(lower_expr(&stmt.test)?, lower_body(&stmt.body)?)];
    let mut orelse = &stmt.orelse;
    loop {
        match orelse.as_slice() {
            [] => return Ok(Stmt::If { branches, otherwise: None }),
            [py::Stmt::If(elif)] => {
                branches.push((lower_expr(&elif.test)?, lower_body(&elif.body)?));
                orelse = &elif.orelse;
            }
            other => return Ok(Stmt::If { branches, otherwise: Some(lower_body(other)?) }),
        }
    }
}

fn lower_function(def: &py::StmtFunctionDef) -> Result<FunctionDef, ParseError> {
    let name = def.name.to_string();
    let args = &def.args;
    if !args.kwonlyargs.is_empty() {
        return Err(unsupported("keyword-only parameters"));
    }
    if args.kwarg.is_some() {
        return Err(unsupported("keyword-variadic parameters"));
    }

    let mut params = Vec::new();
    let mut defaults = Vec::new();
    for arg in args.posonlyargs.iter().chain(args.args.iter()) {
        let param = arg.def.arg.as_str();
        match &arg.default {
            Some(default) => {
                params.push(Param::optional(param));
                defaults.push(Some(lower_expr(default)?));
            }
            None => {
                params.push(Param::required(param));
                defaults.push(None);
            }
        }
    }
    let variadic = args.vararg.as_ref().map(|arg| arg.arg.to_string());

    let mut decorators = Vec::new();
    let mut ref_params: Vec<String> = Vec::new();
    for decorator in &def.decorator_list {
        match ref_decorator_names(decorator)? {
            Some(names) => ref_params.extend(names),
            None => decorators.push(lower_expr(decorator)?),
        }
    }

    let mut signature = Signature::new(&name, params, variadic.as_deref());
    signature.preserve_refs(&ref_params).map_err(|unknown| {
        format!("{}: '{}' is not a parameter of {}()", REF_DECORATOR, unknown, name)
    })?;
    Ok(FunctionDef { name, signature, defaults, decorators, body: Rc::new(lower_body(&def.body)?) })
}

/// Parameter names of a `@host_refs('a', 'b')` decorator, if that is what it is
fn ref_decorator_names(decorator: &py::Expr) -> Result<Option<Vec<String>>, ParseError> {
    let py::Expr::Call(call) = decorator else { return Ok(None) };
    if !matches!(&*call.func, py::Expr::Name(n) if n.id.as_str() == REF_DECORATOR) {
        return Ok(None);
    }
    if !call.keywords.is_empty() {
        return Err(format!("{}() takes parameter names only", REF_DECORATOR));
    }
    call.args
        .iter()
        .map(|arg| match arg {
            py::Expr::Constant(c) => match &c.value {
                Constant::Str(s) => Ok(s.clone()),
                _ => Err(format!("{}() takes parameter names only", REF_DECORATOR)),
            },
            _ => Err(format!("{}() takes parameter names only", REF_DECORATOR)),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn lower_target(expr: &py::Expr) -> Result<Target, ParseError> {
    Ok(match expr {
        py::Expr::Name(n) => Target::Name(n.id.to_string()),
        py::Expr::Attribute(a) => Target::Attr(lower_expr(&a.value)?, a.attr.to_string()),
        py::Expr::Subscript(s) => Target::Subscript(lower_expr(&s.value)?, lower_expr(&s.slice)?),
        py::Expr::Tuple(t) => Target::Tuple(t.elts.iter().map(lower_target).collect::<Result<_, _>>()?),
        py::Expr::List(l) => Target::Tuple(l.elts.iter().map(lower_target).collect::<Result<_, _>>()?),
        py::Expr::Starred(_) => return Err(unsupported("starred assignment")),
        _ => return Err("cannot assign to expression".to_string()),
    })
}

fn lower_operator(op: &py::Operator) -> Result<BinOp, ParseError> {
    Ok(match op {
        py::Operator::Add => BinOp::Add,
        py::Operator::Sub => BinOp::Sub,
        py::Operator::Mult => BinOp::Mul,
        py::Operator::Div => BinOp::Div,
        py::Operator::FloorDiv => BinOp::FloorDiv,
        py::Operator::Mod => BinOp::Mod,
        py::Operator::Pow => BinOp::Pow,
        _ => return Err(unsupported("bitwise and matrix operators")),
    })
}

fn lower_cmp(op: &py::CmpOp) -> CmpOp {
    match op {
        py::CmpOp::Eq => CmpOp::Eq,
        py::CmpOp::NotEq => CmpOp::NotEq,
        py::CmpOp::Lt => CmpOp::Lt,
        py::CmpOp::LtE => CmpOp::LtEq,
        py::CmpOp::Gt => CmpOp::Gt,
        py::CmpOp::GtE => CmpOp::GtEq,
        py::CmpOp::Is => CmpOp::Is,
        py::CmpOp::IsNot => CmpOp::IsNot,
        py::CmpOp::In => CmpOp::In,
        py::CmpOp::NotIn => CmpOp::NotIn,
    }
}

fn lower_exprs(exprs: &[py::Expr]) -> Result<Vec<Expr>, ParseError> {
    exprs.iter().map(lower_expr).collect()
}

fn boxed(expr: &py::Expr) -> Result<Box<Expr>, ParseError> {
    lower_expr(expr).map(Box::new)
}

fn lower_constant(value: &Constant) -> Result<Expr, ParseError> {
    Ok(match value {
        Constant::None => Expr::None,
        Constant::Bool(b) => Expr::Bool(*b),
        Constant::Int(i) => Expr::Int(i.to_i64().ok_or_else(|| "integer literal too large".to_string())?),
        Constant::Float(f) => Expr::Float(*f),
        Constant::Str(s) => Expr::Str(Rc::from(s.as_str())),
        Constant::Tuple(items) => Expr::Tuple(items.iter().map(lower_constant).collect::<Result<_, _>>()?),
        Constant::Bytes(_) => return Err(unsupported("bytes literal")),
        Constant::Complex { .. } => return Err(unsupported("complex literal")),
        Constant::Ellipsis => return Err(unsupported("'...'")),
    })
}

/// A single-generator comprehension; several `if` clauses are joined by `and`
fn lower_comprehension(elt: &py::Expr, generators: &[py::Comprehension]) -> Result<Expr, ParseError> {
    let [generator] = generators else { return Err(unsupported("nested comprehension")) };
    if generator.is_async {
        return Err(unsupported("async code"));
    }
    let cond = generator
        .ifs
        .iter()
        .map(lower_expr)
        .reduce(|acc, next| Ok(Expr::And(Box::new(acc?), Box::new(next?))))
        .transpose()?
        .map(Box::new);
    Ok(Expr::ListComp {
        elt: boxed(elt)?,
        target: Box::new(lower_target(&generator.target)?),
        iter: boxed(&generator.iter)?,
        cond,
    })
}

fn lower_expr(expr: &py::Expr) -> Result<Expr, ParseError> {
    Ok(match expr {
        py::Expr::Constant(c) => lower_constant(&c.value)?,
        py::Expr::Name(n) => Expr::Name(n.id.to_string()),
        py::Expr::List(l) => Expr::List(lower_exprs(&l.elts)?),
        py::Expr::Tuple(t) => Expr::Tuple(lower_exprs(&t.elts)?),
        py::Expr::Dict(d) => {
            let entries = d
                .keys
                .iter()
                .zip(d.values.iter())
                .map(|(key, value)| match key {
                    Some(key) => Ok((lower_expr(key)?, lower_expr(value)?)),
                    None => Err(unsupported("'**' in dict display")),
                })
                .collect::<Result<_, ParseError>>()?;
            Expr::Dict(entries)
        }
        py::Expr::Attribute(a) => Expr::Attr(boxed(&a.value)?, a.attr.to_string()),
        py::Expr::Subscript(s) => Expr::Subscript(boxed(&s.value)?, boxed(&s.slice)?),
        py::Expr::Slice(s) => {
            if s.step.is_some() {
                return Err(unsupported("slice step"));
            }
            Expr::Slice(
                s.lower.as_deref().map(boxed).transpose()?,
                s.upper.as_deref().map(boxed).transpose()?,
            )
        }
        py::Expr::Call(call) => {
            let mut args = Vec::with_capacity(call.args.len() + call.keywords.len());
            for arg in &call.args {
                args.push(match arg {
                    py::Expr::Starred(star) => Arg::Star(lower_expr(&star.value)?),
                    other => Arg::Positional(lower_expr(other)?),
                });
            }
            for keyword in &call.keywords {
                let name = keyword.arg.as_ref().ok_or_else(|| unsupported("'**' arguments"))?;
                args.push(Arg::Named(name.to_string(), lower_expr(&keyword.value)?));
            }
            Expr::Call { func: boxed(&call.func)?, args }
        }
        py::Expr::BinOp(b) => Expr::Binary { op: lower_operator(&b.op)?, left: boxed(&b.left)?, right: boxed(&b.right)? },
        py::Expr::UnaryOp(u) => match u.op {
            py::UnaryOp::USub => Expr::Neg(boxed(&u.operand)?),
            py::UnaryOp::UAdd => lower_expr(&u.operand)?,
            py::UnaryOp::Not => Expr::Not(boxed(&u.operand)?),
            py::UnaryOp::Invert => return Err(unsupported("'~'")),
        },
        py::Expr::BoolOp(b) => {
            let mut values = b.values.iter().map(lower_expr);
            let first = values.next().ok_or_else(|| "empty boolean expression".to_string())??;
            values.try_fold(first, |acc, next| {
                let next = Box::new(next?);
                Ok::<_, ParseError>(match b.op {
                    py::BoolOp::And => Expr::And(Box::new(acc), next),
                    py::BoolOp::Or => Expr::Or(Box::new(acc), next),
                })
            })?
        }
        // `a < b < c` is `a < b and b < c`
        py::Expr::Compare(c) => {
            let mut left = lower_expr(&c.left)?;
            let mut result: Option<Expr> = None;
            for (op, right) in c.ops.iter().zip(c.comparators.iter()) {
                let right = lower_expr(right)?;
                let cmp = Expr::Compare { op: lower_cmp(op), left: Box::new(left), right: Box::new(right.clone()) };
                result = Some(match result {
                    Some(prev) => Expr::And(Box::new(prev), Box::new(cmp)),
                    None => cmp,
                });
                left = right;
            }
            result.unwrap_or(left)
        }
        py::Expr::IfExp(i) => Expr::IfExp { cond: boxed(&i.test)?, then: boxed(&i.body)?, otherwise: boxed(&i.orelse)? },
        py::Expr::ListComp(c) => lower_comprehension(&c.elt, &c.generators)?,
        // Generators are evaluated eagerly
        py::Expr::GeneratorExp(g) => lower_comprehension(&g.elt, &g.generators)?,
        py::Expr::Starred(_) => return Err(unsupported("starred expression here")),
        py::Expr::Lambda(_) => return Err(unsupported("'lambda'")),
        py::Expr::JoinedStr(_) | py::Expr::FormattedValue(_) => return Err(unsupported("f-strings")),
        py::Expr::Set(_) | py::Expr::SetComp(_) => return Err(unsupported("sets")),
        py::Expr::DictComp(_) => return Err(unsupported("dict comprehension")),
        _ => return Err(unsupported("this expression")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_decorator_marks_params_and_is_not_kept() {
        let stmts = parse_module("@host_refs('x', 'y')\ndef f(x, y, z):\n    return x\n").unwrap();
        let Stmt::FunctionDef(def) = &stmts[0] else { panic!("expected def") };
        assert!(def.decorators.is_empty());
        assert!(def.signature.preserves_ref(0));
        assert!(def.signature.preserves_ref(1));
        assert!(!def.signature.preserves_ref(2));
    }

    #[test]
    fn test_ref_decorator_rejects_unknown_param() {
        let err = parse_module("@host_refs('q')\ndef f(x):\n    pass\n").unwrap_err();
        assert!(err.contains("'q' is not a parameter of f()"), "{}", err);
    }

    #[test]
    fn test_defaults_and_variadic() {
        let stmts = parse_module("def f(a, b=0, *rest): pass").unwrap();
        let Stmt::FunctionDef(def) = &stmts[0] else { panic!("expected def") };
        assert_eq!(def.signature.params.len(), 2);
        assert!(def.defaults[1].is_some());
        assert_eq!(def.signature.variadic.as_deref(), Some("rest"));
    }

    #[test]
    fn test_one_line_suites_and_comprehension_condition() {
        let stmts = parse_module("if n == 0: n = 1\nxs = [i for i in y if i]\nz = a if b else c\n").unwrap();
        assert_eq!(stmts.len(), 3);
        let Stmt::Assign { value: Expr::ListComp { cond, .. }, .. } = &stmts[1] else {
            panic!("expected comprehension")
        };
        assert!(cond.is_some());
        assert!(matches!(&stmts[2], Stmt::Assign { value: Expr::IfExp { .. }, .. }));
    }

    #[test]
    fn test_import_forms() {
        let stmts = parse_module("import os.path as p\nfrom math import pi, sqrt as s\nimport sys, os\n").unwrap();
        assert_eq!(stmts.len(), 4);
        assert!(matches!(&stmts[0], Stmt::Import { module, alias: Some(a) } if module == "os.path" && a == "p"));
        assert!(matches!(&stmts[1], Stmt::ImportFrom { names, .. } if names.len() == 2));
        assert!(matches!(&stmts[3], Stmt::Import { module, alias: None } if module == "os"));
    }

    #[test]
    fn test_elif_chain_flattens() {
        let src = "def f(n):\n    if n == 1:\n        return 1\n    elif n == 2:\n        return 2\n    else:\n        return 3\n";
        let stmts = parse_module(src).unwrap();
        let Stmt::FunctionDef(def) = &stmts[0] else { panic!("expected def") };
        let Stmt::If { branches, otherwise } = &def.body[0] else { panic!("expected if") };
        assert_eq!(branches.len(), 2);
        assert!(otherwise.is_some());
    }

    #[test]
    fn test_chained_comparison_becomes_conjunction() {
        let stmts = parse_module("ok = 1 < x <= 3").unwrap();
        assert!(matches!(&stmts[0], Stmt::Assign { value: Expr::And(..), .. }));
    }

    #[test]
    fn test_rejects_unsupported_constructs() {
        assert!(parse_module("f = lambda x: x").unwrap_err().contains("'lambda'"));
        assert!(parse_module("def f(**kw): pass").unwrap_err().contains("keyword-variadic"));
        assert!(parse_module("def f(:").unwrap_err().starts_with("invalid syntax"));
    }
}
