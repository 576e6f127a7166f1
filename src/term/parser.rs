//! Query text → `Term`
//!
//! Syntax:
//! ```text
//! term    := '(' operator operand* ')'
//! operand := term | literal | identifier | '$' identifier
//! literal := integer | float | timestamp | 'quoted' | "quoted" | true | false
//! ```
//! `#` starts a comment running to the end of the line (outside of quotes).

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use regex_lite::Regex;

use crate::error::{FactbaseError, Result};
use crate::fact::is_identifier;
use crate::value::{looks_like_time, Value};

use super::{Operand, Term};

static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?[0-9]+$").expect("static pattern"));
static FLOAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?[0-9]+\.[0-9]+(e\+[0-9]+)?$").expect("static pattern"));

/// Deepest nesting of terms a query may have.
pub(crate) const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Quoted(String),
    Bare(String),
}

impl Token {
    fn text(&self) -> String {
        match self {
            Token::Open => "(".to_string(),
            Token::Close => ")".to_string(),
            Token::Quoted(s) => Value::Str(s.clone()).to_string(),
            Token::Bare(s) => s.clone(),
        }
    }
}

/// Parse query text into a simplified term.
pub fn parse(query: &str) -> Result<Term> {
    Parser::new(query)?.run()
}

struct Parser<'a> {
    query: &'a str,
    tokens: Vec<Token>,
}

impl<'a> Parser<'a> {
    fn new(query: &'a str) -> Result<Self> {
        let tokens = tokenize(query)?;
        Ok(Self { query, tokens })
    }

    fn fail(&self, reason: impl Into<String>) -> FactbaseError {
        let tokens: Vec<String> = self.tokens.iter().map(Token::text).collect();
        FactbaseError::syntax(self.query, &tokens, reason)
    }

    fn run(self) -> Result<Term> {
        if self.tokens.is_empty() {
            return Err(self.fail("empty query"));
        }
        let (root, at) = self.operand(0, 0)?;
        if at < self.tokens.len() {
            return Err(self.fail("unbalanced parentheses, extra tokens after the term"));
        }
        match root {
            Operand::Term(t) => Ok(Arc::unwrap_or_clone(t).simplify()),
            other => Err(self.fail(format!("'{}' is not a term", other))),
        }
    }

    /// Parse one operand starting at `at`; returns it with the next position.
    fn operand(&self, at: usize, depth: usize) -> Result<(Operand, usize)> {
        match self.tokens.get(at) {
            None => Err(self.fail("unbalanced parentheses, term not closed")),
            Some(Token::Close) => Err(self.fail("unbalanced parentheses, unexpected ')'")),
            Some(Token::Open) if depth >= MAX_NESTING => Err(self.fail(format!(
                "terms nested deeper than {} levels",
                MAX_NESTING
            ))),
            Some(Token::Open) => self.term(at + 1, depth + 1),
            Some(Token::Quoted(s)) => Ok((Operand::Literal(Value::Str(s.clone())), at + 1)),
            Some(Token::Bare(s)) => Ok((self.bare(s)?, at + 1)),
        }
    }

    fn term(&self, mut at: usize, depth: usize) -> Result<(Operand, usize)> {
        let op = match self.tokens.get(at) {
            Some(Token::Bare(s)) if is_identifier(s) => s.clone(),
            Some(Token::Close) => return Err(self.fail("operator is missing")),
            Some(t) => return Err(self.fail(format!("invalid operator '{}'", t.text()))),
            None => return Err(self.fail("unbalanced parentheses, term not closed")),
        };
        at += 1;
        let mut operands = Vec::new();
        loop {
            match self.tokens.get(at) {
                Some(Token::Close) => {
                    let term = Term::new(op, operands);
                    return Ok((Operand::Term(Arc::new(term)), at + 1));
                }
                None => return Err(self.fail("unbalanced parentheses, term not closed")),
                Some(_) => {
                    let (o, next) = self.operand(at, depth)?;
                    operands.push(o);
                    at = next;
                }
            }
        }
    }

    fn bare(&self, s: &str) -> Result<Operand> {
        if s == "true" || s == "false" {
            return Ok(Operand::Literal(Value::Bool(s == "true")));
        }
        if INTEGER.is_match(s) {
            return s
                .trim_start_matches('+')
                .parse::<i64>()
                .map(|i| Operand::Literal(Value::Int(i)))
                .map_err(|_| self.fail(format!("integer '{}' is out of range", s)));
        }
        if FLOAT.is_match(s) {
            return s
                .parse::<f64>()
                .map(|f| Operand::Literal(Value::Float(f)))
                .map_err(|_| self.fail(format!("invalid float '{}'", s)));
        }
        if looks_like_time(s) {
            return Value::parse_time(s)
                .map(|t| Operand::Literal(Value::from(t)))
                .ok_or_else(|| self.fail(format!("invalid timestamp '{}'", s)));
        }
        if let Some(var) = s.strip_prefix('$') {
            if is_identifier(var) {
                return Ok(Operand::Var(var.to_string()));
            }
        } else if is_identifier(s) {
            return Ok(Operand::Prop(s.to_string()));
        }
        Err(self.fail(format!("invalid token '{}'", s)))
    }
}

fn tokenize(query: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = query.chars();
    let mut bare = String::new();
    let flush = |bare: &mut String, tokens: &mut Vec<Token>| {
        if !bare.is_empty() {
            tokens.push(Token::Bare(std::mem::take(bare)));
        }
    };
    while let Some(c) = chars.next() {
        match c {
            '(' | ')' => {
                flush(&mut bare, &mut tokens);
                tokens.push(if c == '(' { Token::Open } else { Token::Close });
            }
            '#' => {
                flush(&mut bare, &mut tokens);
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
            }
            '\'' | '"' => {
                flush(&mut bare, &mut tokens);
                let mut text = String::new();
                let mut closed = false;
                while let Some(q) = chars.next() {
                    match q {
                        '\\' => match chars.next() {
                            Some(escaped) => text.push(escaped),
                            None => break,
                        },
                        q if q == c => {
                            closed = true;
                            break;
                        }
                        q => text.push(q),
                    }
                }
                if !closed {
                    let seen: Vec<String> = tokens.iter().map(Token::text).collect();
                    return Err(FactbaseError::syntax(query, &seen, "string not closed"));
                }
                tokens.push(Token::Quoted(text));
            }
            c if c.is_whitespace() => flush(&mut bare, &mut tokens),
            c => bare.push(c),
        }
    }
    flush(&mut bare, &mut tokens);
    Ok(tokens)
}

// ── Parse cache ─────────────────────────────────────────────────────

/// Parse cache keyed by raw query text, shared by every handle of a store.
///
/// Flushed wholesale once it holds more than `limit` entries. Failed parses
/// are not cached.
pub struct Syntax {
    cache: Mutex<HashMap<String, Arc<Term>>>,
    limit: usize,
}

impl Syntax {
    pub fn new(limit: usize) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            limit,
        }
    }

    pub fn parse(&self, query: &str) -> Result<Arc<Term>> {
        if let Some(t) = self.cache.lock().get(query) {
            return Ok(t.clone());
        }
        let term = Arc::new(parse(query)?);
        let mut cache = self.cache.lock();
        if cache.len() >= self.limit {
            cache.clear();
        }
        cache.insert(query.to_string(), term.clone());
        Ok(term)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
