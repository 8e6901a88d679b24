//! Host parser - recursive descent over the token stream

use super::ast::{BinOp, Catch, ClassDecl, Expr, FunctionDecl, Stmt, UnaryOp};
use super::lexer::{tokenize, Tok, Token};
use crate::runtime::signature::{Param, Signature};
use std::rc::Rc;

pub fn parse_program(source: &str) -> Result<Vec<Stmt>, String> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut stmts = Vec::new();
    while !parser.at_eof() {
        stmts.push(parser.statement()?);
    }
    Ok(stmts)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].tok
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].tok
    }

    fn line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Tok::Eof)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn is_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Tok::Sym(s) if *s == sym)
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if self.is_sym(sym) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> String {
        let found = match self.peek() {
            Tok::Var(v) => format!("variable \"${}\"", v),
            Tok::Ident(i) => format!("identifier \"{}\"", i),
            Tok::Int(i) => format!("integer \"{}\"", i),
            Tok::Float(f) => format!("number \"{}\"", f),
            Tok::Str(_) => "string".to_string(),
            Tok::Sym(s) => format!("token \"{}\"", s),
            Tok::Eof => "end of file".to_string(),
        };
        format!("syntax error, unexpected {} on line {}", found, self.line())
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), String> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_ident(&mut self) -> Result<String, String> {
        match self.peek() {
            Tok::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn expect_var(&mut self) -> Result<String, String> {
        match self.peek() {
            Tok::Var(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, String> {
        self.expect_sym("{")?;
        let mut stmts = Vec::new();
        while !self.eat_sym("}") {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    /// A braced block or a single statement
    fn body(&mut self) -> Result<Vec<Stmt>, String> {
        if self.is_sym("{") {
            self.block()
        } else {
            Ok(vec![self.statement()?])
        }
    }

    fn statement(&mut self) -> Result<Stmt, String> {
        if self.eat_sym(";") {
            return Ok(Stmt::Block(Vec::new()));
        }
        if self.is_sym("{") {
            return Ok(Stmt::Block(self.block()?));
        }
        let keyword = match self.peek() {
            Tok::Ident(word) => Some(word.to_ascii_lowercase()),
            _ => None,
        };
        if let Some(keyword) = keyword {
            match keyword.as_str() {
                "echo" | "print" => {
                    self.advance();
                    let mut exprs = vec![self.expr()?];
                    while self.eat_sym(",") {
                        exprs.push(self.expr()?);
                    }
                    self.expect_sym(";")?;
                    return Ok(Stmt::Echo(exprs));
                }
                "return" => {
                    self.advance();
                    let value = if self.is_sym(";") { None } else { Some(self.expr()?) };
                    self.expect_sym(";")?;
                    return Ok(Stmt::Return(value));
                }
                "function" if matches!(self.peek_at(1), Tok::Ident(_)) => {
                    self.advance();
                    return Ok(Stmt::Function(Rc::new(self.function_rest()?)));
                }
                "class" => {
                    self.advance();
                    return self.class_decl();
                }
                "if" => {
                    self.advance();
                    return self.if_stmt();
                }
                "while" => {
                    self.advance();
                    self.expect_sym("(")?;
                    let cond = self.expr()?;
                    self.expect_sym(")")?;
                    let body = self.body()?;
                    return Ok(Stmt::While { cond, body });
                }
                "for" => {
                    self.advance();
                    return self.for_stmt();
                }
                "foreach" => {
                    self.advance();
                    return self.foreach_stmt();
                }
                "try" => {
                    self.advance();
                    return self.try_stmt();
                }
                "throw" => {
                    self.advance();
                    let value = self.expr()?;
                    self.expect_sym(";")?;
                    return Ok(Stmt::Throw(value));
                }
                "break" => {
                    self.advance();
                    self.expect_sym(";")?;
                    return Ok(Stmt::Break);
                }
                "continue" => {
                    self.advance();
                    self.expect_sym(";")?;
                    return Ok(Stmt::Continue);
                }
                _ => {}
            }
        }
        let expr = self.expr()?;
        self.expect_sym(";")?;
        Ok(Stmt::Expr(expr))
    }

    /// After `function`: name, parameter list and body
    fn function_rest(&mut self) -> Result<FunctionDecl, String> {
        let name = self.expect_ident()?;
        self.expect_sym("(")?;
        let mut params = Vec::new();
        let mut defaults = Vec::new();
        let mut variadic = None;
        while !self.eat_sym(")") {
            if variadic.is_some() {
                return Err(format!("only the last parameter can be variadic on line {}", self.line()));
            }
            if self.eat_sym("...") {
                variadic = Some(self.expect_var()?);
            } else {
                let param = self.expect_var()?;
                if self.eat_sym("=") {
                    defaults.push(Some(self.expr()?));
                    params.push(Param::optional(&param));
                } else {
                    defaults.push(None);
                    params.push(Param::required(&param));
                }
            }
            if !self.is_sym(")") {
                self.expect_sym(",")?;
            }
        }
        let body = self.block()?;
        let signature = Signature::new(&name, params, variadic.as_deref());
        Ok(FunctionDecl { name, signature, defaults, body })
    }

    fn class_decl(&mut self) -> Result<Stmt, String> {
        let name = self.expect_ident()?;
        let parent = if self.eat_keyword("extends") { Some(self.expect_ident()?) } else { None };
        self.expect_sym("{")?;
        let mut props = Vec::new();
        let mut methods = Vec::new();
        while !self.eat_sym("}") {
            while ["public", "private", "protected", "var", "static"]
                .iter()
                .any(|kw| self.eat_keyword(kw))
            {}
            if self.eat_keyword("function") {
                methods.push(Rc::new(self.function_rest()?));
            } else if let Tok::Var(_) = self.peek() {
                let prop = self.expect_var()?;
                let default = if self.eat_sym("=") { Some(self.expr()?) } else { None };
                self.expect_sym(";")?;
                props.push((prop, default));
            } else {
                return Err(self.unexpected());
            }
        }
        Ok(Stmt::Class(Rc::new(ClassDecl { name, parent, props, methods })))
    }

    fn if_stmt(&mut self) -> Result<Stmt, String> {
        let mut branches = Vec::new();
        let mut otherwise = None;
        loop {
            self.expect_sym("(")?;
            let cond = self.expr()?;
            self.expect_sym(")")?;
            branches.push((cond, self.body()?));
            if self.eat_keyword("elseif") {
                continue;
            }
            if self.is_keyword("else") && matches!(self.peek_at(1), Tok::Ident(w) if w.eq_ignore_ascii_case("if")) {
                self.advance();
                self.advance();
                continue;
            }
            if self.eat_keyword("else") {
                otherwise = Some(self.body()?);
            }
            break;
        }
        Ok(Stmt::If { branches, otherwise })
    }

    fn expr_list(&mut self, terminator: &str) -> Result<Vec<Expr>, String> {
        let mut exprs = Vec::new();
        while !self.is_sym(terminator) {
            exprs.push(self.expr()?);
            if !self.eat_sym(",") {
                break;
            }
        }
        self.expect_sym(terminator)?;
        Ok(exprs)
    }

    fn for_stmt(&mut self) -> Result<Stmt, String> {
        self.expect_sym("(")?;
        let init = self.expr_list(";")?;
        let cond = if self.is_sym(";") { None } else { Some(self.expr()?) };
        self.expect_sym(";")?;
        let step = self.expr_list(")")?;
        let body = self.body()?;
        Ok(Stmt::For { init, cond, step, body })
    }

    fn foreach_stmt(&mut self) -> Result<Stmt, String> {
        self.expect_sym("(")?;
        let subject = self.expr()?;
        if !self.eat_keyword("as") {
            return Err(self.unexpected());
        }
        let first = self.expect_var()?;
        let (key, value) = if self.eat_sym("=>") {
            (Some(first), self.expect_var()?)
        } else {
            (None, first)
        };
        self.expect_sym(")")?;
        let body = self.body()?;
        Ok(Stmt::Foreach { subject, key, value, body })
    }

    fn try_stmt(&mut self) -> Result<Stmt, String> {
        let body = self.block()?;
        let mut catches = Vec::new();
        while self.eat_keyword("catch") {
            self.expect_sym("(")?;
            let mut classes = vec![self.expect_ident()?];
            while self.eat_sym("|") {
                classes.push(self.expect_ident()?);
            }
            let var = match self.peek() {
                Tok::Var(_) => Some(self.expect_var()?),
                _ => None,
            };
            self.expect_sym(")")?;
            catches.push(Catch { classes, var, body: self.block()? });
        }
        let finally = if self.eat_keyword("finally") { Some(self.block()?) } else { None };
        if catches.is_empty() && finally.is_none() {
            return Err(format!("cannot use try without catch or finally on line {}", self.line()));
        }
        Ok(Stmt::Try { body, catches, finally })
    }

    pub fn expr(&mut self) -> Result<Expr, String> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, String> {
        let target = self.ternary()?;
        let compound = match self.peek() {
            Tok::Sym("=") => None,
            Tok::Sym(".=") => Some(BinOp::Concat),
            Tok::Sym("+=") => Some(BinOp::Add),
            Tok::Sym("-=") => Some(BinOp::Sub),
            Tok::Sym("*=") => Some(BinOp::Mul),
            Tok::Sym("/=") => Some(BinOp::Div),
            _ => return Ok(target),
        };
        if !matches!(target, Expr::Var(_) | Expr::Prop(..) | Expr::Index(..)) {
            return Err(format!("cannot assign to this expression on line {}", self.line()));
        }
        self.advance();
        let value = Box::new(self.assignment()?);
        let target = Box::new(target);
        Ok(match compound {
            None => Expr::Assign { target, value },
            Some(op) => Expr::CompoundAssign { op, target, value },
        })
    }

    fn ternary(&mut self) -> Result<Expr, String> {
        let cond = self.binary(0)?;
        if !self.eat_sym("?") {
            return Ok(cond);
        }
        let then = if self.is_sym(":") { None } else { Some(Box::new(self.assignment()?)) };
        self.expect_sym(":")?;
        let otherwise = Box::new(self.assignment()?);
        Ok(Expr::Ternary { cond: Box::new(cond), then, otherwise })
    }

    fn binary_op(&self, level: usize) -> Option<BinOp> {
        let Tok::Sym(sym) = self.peek() else { return None };
        let op = match (level, *sym) {
            (0, "||") => BinOp::Or,
            (1, "&&") => BinOp::And,
            (2, "==") => BinOp::Eq,
            (2, "!=") | (2, "<>") => BinOp::NotEq,
            (2, "===") => BinOp::Identical,
            (2, "!==") => BinOp::NotIdentical,
            (3, "<") => BinOp::Lt,
            (3, ">") => BinOp::Gt,
            (3, "<=") => BinOp::LtEq,
            (3, ">=") => BinOp::GtEq,
            (4, ".") => BinOp::Concat,
            (5, "+") => BinOp::Add,
            (5, "-") => BinOp::Sub,
            (6, "*") => BinOp::Mul,
            (6, "/") => BinOp::Div,
            (6, "%") => BinOp::Mod,
            _ => return None,
        };
        Some(op)
    }

    fn binary(&mut self, level: usize) -> Result<Expr, String> {
        if level > 6 {
            return self.instanceof();
        }
        let mut left = self.binary(level + 1)?;
        while let Some(op) = self.binary_op(level) {
            self.advance();
            let right = self.binary(level + 1)?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn instanceof(&mut self) -> Result<Expr, String> {
        let value = self.unary()?;
        if self.eat_keyword("instanceof") {
            let class = self.expect_ident()?;
            return Ok(Expr::InstanceOf { value: Box::new(value), class });
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        let op = match self.peek() {
            Tok::Sym("!") => UnaryOp::Not,
            Tok::Sym("-") => UnaryOp::Neg,
            Tok::Sym("+") => UnaryOp::Plus,
            Tok::Sym("++") | Tok::Sym("--") => {
                let delta = if self.is_sym("++") { 1 } else { -1 };
                self.advance();
                let target = self.unary()?;
                return Ok(Expr::IncDec { target: Box::new(target), delta, prefix: true });
            }
            _ => return self.postfix(),
        };
        self.advance();
        let operand = self.unary()?;
        Ok(Expr::Unary { op, operand: Box::new(operand) })
    }

    fn args(&mut self) -> Result<Vec<Expr>, String> {
        self.expect_sym("(")?;
        self.expr_list(")")
    }

    fn postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_sym("->") {
                let name = self.expect_ident()?;
                if self.is_sym("(") {
                    let args = self.args()?;
                    expr = Expr::MethodCall { object: Box::new(expr), method: name, args };
                } else {
                    expr = Expr::Prop(Box::new(expr), name);
                }
            } else if self.eat_sym("[") {
                if self.eat_sym("]") {
                    expr = Expr::Index(Box::new(expr), None);
                } else {
                    let index = self.expr()?;
                    self.expect_sym("]")?;
                    expr = Expr::Index(Box::new(expr), Some(Box::new(index)));
                }
            } else if self.is_sym("(") {
                let args = self.args()?;
                expr = Expr::CallValue { callee: Box::new(expr), args };
            } else if self.is_sym("++") || self.is_sym("--") {
                let delta = if self.is_sym("++") { 1 } else { -1 };
                self.advance();
                expr = Expr::IncDec { target: Box::new(expr), delta, prefix: false };
            } else {
                return Ok(expr);
            }
        }
    }

    fn array_literal(&mut self, close: &str) -> Result<Expr, String> {
        let mut items = Vec::new();
        while !self.is_sym(close) {
            let first = self.expr()?;
            if self.eat_sym("=>") {
                items.push((Some(first), self.expr()?));
            } else {
                items.push((None, first));
            }
            if !self.eat_sym(",") {
                break;
            }
        }
        self.expect_sym(close)?;
        Ok(Expr::Array(items))
    }

    fn primary(&mut self) -> Result<Expr, String> {
        if self.at_eof() {
            return Err(self.unexpected());
        }
        match self.advance() {
            Tok::Var(name) => Ok(Expr::Var(name)),
            Tok::Int(i) => Ok(Expr::Int(i)),
            Tok::Float(f) => Ok(Expr::Float(f)),
            Tok::Str(s) => Ok(Expr::Str(Rc::from(s))),
            Tok::Sym("(") => {
                let inner = self.expr()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            Tok::Sym("[") => self.array_literal("]"),
            Tok::Ident(word) => match word.to_ascii_lowercase().as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "array" if self.is_sym("(") => {
                    self.advance();
                    self.array_literal(")")
                }
                "new" => {
                    let class = self.expect_ident()?;
                    let args = if self.is_sym("(") { self.args()? } else { Vec::new() };
                    Ok(Expr::New { class, args })
                }
                _ if self.is_sym("(") => {
                    let args = self.args()?;
                    Ok(Expr::Call { name: word, args })
                }
                _ => Ok(Expr::Const(word)),
            },
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_signature_collects_defaults_and_variadic() {
        let prog = parse_program("function f($a, $b = 2, ...$rest) { return $a; }").unwrap();
        let Stmt::Function(decl) = &prog[0] else { panic!("expected function") };
        assert_eq!(decl.signature.params.len(), 2);
        assert!(!decl.signature.params[0].has_default);
        assert!(decl.signature.params[1].has_default);
        assert_eq!(decl.signature.variadic.as_deref(), Some("rest"));
    }

    #[test]
    fn test_precedence_concat_below_additive() {
        let prog = parse_program("echo 1 + 2 . 'x';").unwrap();
        let Stmt::Echo(exprs) = &prog[0] else { panic!("expected echo") };
        assert!(matches!(exprs[0], Expr::Binary { op: BinOp::Concat, .. }));
    }

    #[test]
    fn test_class_with_props_and_methods() {
        let prog = parse_program(
            "class B extends A { public $x = 1; var $y; function m() { return $this->x; } };",
        )
        .unwrap();
        let Stmt::Class(decl) = &prog[0] else { panic!("expected class") };
        assert_eq!(decl.parent.as_deref(), Some("A"));
        assert_eq!(decl.props.len(), 2);
        assert_eq!(decl.methods[0].name, "m");
    }

    #[test]
    fn test_try_catch_with_alternatives() {
        let prog = parse_program("try { f(); } catch (A | B $e) { echo 1; }").unwrap();
        let Stmt::Try { catches, .. } = &prog[0] else { panic!("expected try") };
        assert_eq!(catches[0].classes, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(catches[0].var.as_deref(), Some("e"));
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = parse_program("$a = 1;\n$b = ;").unwrap_err();
        assert!(err.contains("line 2"), "{}", err);
    }
}
