//! Host tokenizer

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Var(String),
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Sym(&'static str),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

const SYMBOLS: &[&str] = &[
    "===", "!==", "...", "->", "=>", "==", "!=", "<>", "<=", ">=", "&&", "||", ".=", "+=", "-=",
    "*=", "/=", "++", "--", "(", ")", "{", "}", "[", "]", ";", ",", ".", "+", "-", "*", "/",
    "%", "=", "<", ">", "!", "?", ":", "|",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut lexer = Lexer { chars, pos: 0, line: 1, tokens: Vec::new() };
    lexer.run()?;
    Ok(lexer.tokens)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek(i) == Some(c))
    }

    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token { tok, line: self.line });
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn run(&mut self) -> Result<(), String> {
        if self.starts_with("<?php") {
            self.pos += 5;
        }
        while let Some(c) = self.peek(0) {
            if c.is_whitespace() {
                self.bump();
            } else if self.starts_with("//") || c == '#' {
                while let Some(c) = self.peek(0) {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else if self.starts_with("/*") {
                self.pos += 2;
                while !self.starts_with("*/") {
                    if self.bump().is_none() {
                        return Err(format!("unterminated comment on line {}", self.line));
                    }
                }
                self.pos += 2;
            } else if self.starts_with("?>") {
                self.pos += 2;
            } else if self.starts_with("<<<") {
                self.heredoc()?;
            } else if c == '$' && self.peek(1).is_some_and(is_ident_start) {
                self.pos += 1;
                let name = self.ident();
                self.push(Tok::Var(name));
            } else if is_ident_start(c) {
                let name = self.ident();
                self.push(Tok::Ident(name));
            } else if c.is_ascii_digit() {
                self.number()?;
            } else if c == '\'' {
                self.pos += 1;
                let s = self.single_quoted()?;
                self.push(Tok::Str(s));
            } else if c == '"' {
                self.pos += 1;
                let line = self.line;
                let mut raw = String::new();
                loop {
                    match self.bump() {
                        None => return Err(format!("unterminated string on line {}", line)),
                        Some('"') => break,
                        Some('\\') => {
                            raw.push('\\');
                            if let Some(next) = self.bump() {
                                raw.push(next);
                            }
                        }
                        Some(c) => raw.push(c),
                    }
                }
                self.push(Tok::Str(unescape(&raw)));
            } else {
                let sym = SYMBOLS
                    .iter()
                    .find(|s| self.starts_with(s))
                    .ok_or_else(|| format!("syntax error, unexpected '{}' on line {}", c, self.line))?;
                self.pos += sym.len();
                self.push(Tok::Sym(sym));
            }
        }
        self.push(Tok::Eof);
        Ok(())
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while self.peek(0).is_some_and(is_ident_char) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn number(&mut self) -> Result<(), String> {
        let start = self.pos;
        while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek(0) == Some('.') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(0), Some('e') | Some('E')) {
            let sign = usize::from(matches!(self.peek(1), Some('+') | Some('-')));
            if self.peek(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if !is_float {
            if let Ok(i) = text.parse::<i64>() {
                self.push(Tok::Int(i));
                return Ok(());
            }
        }
        let f = text
            .parse::<f64>()
            .map_err(|_| format!("invalid number '{}' on line {}", text, self.line))?;
        self.push(Tok::Float(f));
        Ok(())
    }

    fn single_quoted(&mut self) -> Result<String, String> {
        let line = self.line;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(format!("unterminated string on line {}", line)),
                Some('\'') => return Ok(out),
                Some('\\') if matches!(self.peek(0), Some('\'') | Some('\\')) => {
                    if let Some(c) = self.bump() {
                        out.push(c);
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    /// `<<<ID` heredoc (escapes processed) or `<<<'ID'` nowdoc (raw).
    /// The closing marker's indentation is removed from every body line.
    fn heredoc(&mut self) -> Result<(), String> {
        let line = self.line;
        self.pos += 3;
        let quote = match self.peek(0) {
            Some(q @ ('\'' | '"')) => {
                self.pos += 1;
                Some(q)
            }
            _ => None,
        };
        let marker = self.ident();
        if marker.is_empty() {
            return Err(format!("invalid heredoc marker on line {}", line));
        }
        if let Some(q) = quote {
            if self.bump() != Some(q) {
                return Err(format!("unterminated heredoc marker on line {}", line));
            }
        }
        while self.peek(0).is_some_and(|c| c != '\n') {
            self.bump();
        }
        self.bump();

        let mut lines: Vec<String> = Vec::new();
        let indent = loop {
            if self.peek(0).is_none() {
                return Err(format!("unterminated heredoc starting on line {}", line));
            }
            let mut text = String::new();
            while let Some(c) = self.peek(0) {
                if c == '\n' {
                    break;
                }
                text.push(c);
                self.pos += 1;
            }
            let trimmed = text.trim_start();
            let closes = trimmed.starts_with(marker.as_str())
                && !trimmed[marker.len()..].starts_with(is_ident_char);
            if closes {
                let indent = text.len() - trimmed.len();
                // Leave whatever follows the marker (`;`, `)`) for the tokenizer
                self.pos -= trimmed.chars().count() - marker.chars().count();
                break indent;
            }
            self.bump();
            lines.push(text);
        };

        let body = lines
            .iter()
            .map(|l| {
                let cut = l.len() - l.trim_start().len();
                &l[cut.min(indent)..]
            })
            .collect::<Vec<_>>()
            .join("\n");
        let value = if quote == Some('\'') { body } else { unescape(&body) };
        self.push(Tok::Str(value));
        Ok(())
    }
}

/// Double-quoted escapes. Unknown escapes are kept verbatim.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('$') => out.push('$'),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_variables_and_symbols() {
        assert_eq!(
            toks("$a === $b->c;"),
            vec![
                Tok::Var("a".into()),
                Tok::Sym("==="),
                Tok::Var("b".into()),
                Tok::Sym("->"),
                Tok::Ident("c".into()),
                Tok::Sym(";"),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_heredoc_strips_closing_indent_and_escapes() {
        let src = "$s = <<<EOD\n    def f(\\$a):\n        return 1\n    EOD;\n";
        let tokens = toks(src);
        assert_eq!(tokens[2], Tok::Str("def f($a):\n    return 1".into()));
        assert_eq!(tokens[3], Tok::Sym(";"));
    }

    #[test]
    fn test_nowdoc_is_raw() {
        let tokens = toks("<<<'X'\n\\n\nX;");
        assert_eq!(tokens[0], Tok::Str("\\n".into()));
    }

    #[test]
    fn test_comments_and_numbers() {
        assert_eq!(
            toks("// c\n1 # d\n/* e */ 2.5"),
            vec![Tok::Int(1), Tok::Float(2.5), Tok::Eof]
        );
    }
}
