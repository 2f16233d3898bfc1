//! Arithmetic over numbers and top-level config keys, e.g.
//! `"monthlyRent * 12"` or `"-(salary + bonus) / 2"`.

use serde_json::{Map, Value};
use thiserror::Error;

/// Combined nesting of parentheses, unary signs and name lookups.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unknown name '{0}'")]
    UnknownName(String),
    #[error("'{0}' is not numeric")]
    NotNumeric(String),
    #[error("'{0}' refers to itself")]
    Cycle(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("expression nests deeper than {0} levels")]
    TooDeep(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Ident(name) => name.clone(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' | '(' | ')' => {
                chars.next();
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' || d == '_' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let mut ahead = chars.clone();
                if matches!(ahead.next(), Some((_, 'e' | 'E'))) {
                    let mut exponent = String::from("e");
                    if let Some(&(_, sign @ ('+' | '-'))) = ahead.peek() {
                        exponent.push(sign);
                        ahead.next();
                    }
                    if ahead.peek().is_some_and(|&(_, d)| d.is_ascii_digit()) {
                        while let Some(&(_, d)) = ahead.peek() {
                            if !d.is_ascii_digit() {
                                break;
                            }
                            exponent.push(d);
                            ahead.next();
                        }
                        literal.push_str(&exponent);
                        chars = ahead;
                    }
                }
                let value = literal
                    .replace('_', "")
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(literal.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            }
            other => return Err(ExprError::UnexpectedChar(other, offset)),
        }
    }
    Ok(tokens)
}

/// Evaluates expressions against the top-level keys of one config document.
/// Names are resolved recursively; a name that depends on itself is an error.
pub struct Evaluator<'a> {
    vars: &'a Map<String, Value>,
    resolving: Vec<String>,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(vars: &'a Map<String, Value>) -> Self {
        Self {
            vars,
            resolving: Vec::new(),
            depth: 0,
        }
    }

    pub fn eval_str(&mut self, source: &str) -> Result<f64, ExprError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            evaluator: self,
        };
        let value = parser.expr()?;
        match tokens.get(parser.pos) {
            None => Ok(value),
            Some(token) => Err(ExprError::UnexpectedToken(token.describe())),
        }
    }

    /// A JSON value that is either a number or an expression string.
    pub fn eval_value(&mut self, value: &Value) -> Result<f64, ExprError> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| ExprError::InvalidNumber(n.to_string())),
            Value::String(source) => self.eval_str(source),
            other => Err(ExprError::NotNumeric(other.to_string())),
        }
    }

    fn lookup(&mut self, name: &str) -> Result<f64, ExprError> {
        if self.resolving.iter().any(|n| n == name) {
            return Err(ExprError::Cycle(name.to_string()));
        }
        let vars = self.vars;
        let value = vars
            .get(name)
            .ok_or_else(|| ExprError::UnknownName(name.to_string()))?;
        if !matches!(value, Value::Number(_) | Value::String(_)) {
            return Err(ExprError::NotNumeric(name.to_string()));
        }
        self.resolving.push(name.to_string());
        let result = self.nested(|evaluator| evaluator.eval_value(value));
        self.resolving.pop();
        result
    }

    /// Runs `f` one level deeper, failing instead of recursing past [`MAX_DEPTH`].
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ExprError>) -> Result<T, ExprError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }
}

struct Parser<'t, 'e, 'a> {
    tokens: &'t [Token],
    pos: usize,
    evaluator: &'e mut Evaluator<'a>,
}

impl Parser<'_, '_, '_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    // term := unary (('*' | '/') unary)*
    fn term(&mut self) -> Result<f64, ExprError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, ExprError> {
        if self.evaluator.depth >= MAX_DEPTH {
            return Err(ExprError::TooDeep(MAX_DEPTH));
        }
        self.evaluator.depth += 1;
        let result = self.unary_inner();
        self.evaluator.depth -= 1;
        result
    }

    fn unary_inner(&mut self) -> Result<f64, ExprError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<f64, ExprError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Ident(name)) => self.evaluator.lookup(&name),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    Some(other) => Err(ExprError::UnexpectedToken(other.describe())),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(other) => Err(ExprError::UnexpectedToken(other.describe())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test vars must be an object"),
        }
    }

    fn eval(source: &str, scope: &Map<String, Value>) -> Result<f64, ExprError> {
        Evaluator::new(scope).eval_str(source)
    }

    #[test]
    fn precedence_and_parentheses() {
        let scope = Map::new();
        assert_eq!(eval("1 + 2 * 3", &scope), Ok(7.0));
        assert_eq!(eval("(1 + 2) * 3", &scope), Ok(9.0));
        assert_eq!(eval("10 - 4 - 3", &scope), Ok(3.0));
        assert_eq!(eval("-(2 + 3) * 2", &scope), Ok(-10.0));
        assert_eq!(eval("1_000 / 8", &scope), Ok(125.0));
        assert_eq!(eval("0.5", &scope), Ok(0.5));
    }

    #[test]
    fn names_resolve_recursively() {
        let scope = vars(json!({
            "monthlyRent": 1500,
            "annualRent": "monthlyRent * 12",
            "rentExpense": "-annualRent",
        }));
        assert_eq!(eval("rentExpense", &scope), Ok(-18_000.0));
    }

    #[test]
    fn cycles_are_rejected() {
        let scope = vars(json!({ "a": "b + 1", "b": "a * 2" }));
        assert_eq!(eval("a", &scope), Err(ExprError::Cycle("a".to_string())));
    }

    #[test]
    fn same_name_twice_is_not_a_cycle() {
        let scope = vars(json!({ "x": 3, "y": "x * x" }));
        assert_eq!(eval("y + x", &scope), Ok(12.0));
    }

    #[test]
    fn malformed_input_is_reported() {
        let scope = vars(json!({ "name": "Alice", "flag": true }));
        assert_eq!(eval("1 +", &scope), Err(ExprError::UnexpectedEnd));
        assert_eq!(eval("(1 + 2", &scope), Err(ExprError::UnexpectedEnd));
        assert_eq!(eval("1 2", &scope), Err(ExprError::UnexpectedToken("2".into())));
        assert_eq!(eval("2 ^ 3", &scope), Err(ExprError::UnexpectedChar('^', 2)));
        assert_eq!(eval("1 / 0", &scope), Err(ExprError::DivisionByZero));
        assert_eq!(eval("missing", &scope), Err(ExprError::UnknownName("missing".into())));
        assert_eq!(eval("flag", &scope), Err(ExprError::NotNumeric("flag".into())));
        assert!(matches!(eval("name", &scope), Err(ExprError::UnknownName(_))));
        assert!(matches!(eval("1..2", &scope), Err(ExprError::InvalidNumber(_))));
    }

    #[test]
    fn exponent_literals() {
        let scope = Map::new();
        assert_eq!(eval("1e5", &scope), Ok(100_000.0));
        assert_eq!(eval("2.5E-2 * 4", &scope), Ok(0.1));
        assert_eq!(eval("3e+2 - 1", &scope), Ok(299.0));
        assert_eq!(
            eval("2e", &Map::new()),
            Err(ExprError::UnexpectedToken("e".into()))
        );
    }

    #[test]
    fn deep_nesting_is_rejected_not_overflowed() {
        let scope = Map::new();
        let deep = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(eval(&deep, &scope), Err(ExprError::TooDeep(MAX_DEPTH)));

        let signs = format!("{}1", "-".repeat(100_000));
        assert_eq!(eval(&signs, &scope), Err(ExprError::TooDeep(MAX_DEPTH)));

        let shallow = format!("{}7{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval(&shallow, &scope), Ok(7.0));
    }

    #[test]
    fn long_name_chains_are_rejected() {
        let mut scope = Map::new();
        for idx in 0..1_000 {
            scope.insert(format!("v{idx}"), Value::String(format!("v{} + 1", idx + 1)));
        }
        scope.insert("v1000".to_string(), json!(0));
        assert_eq!(eval("v0", &scope), Err(ExprError::TooDeep(MAX_DEPTH)));
        assert_eq!(eval("v990", &scope), Ok(10.0));
    }

    #[test]
    fn eval_value_accepts_numbers_and_strings() {
        let scope = Map::new();
        let mut evaluator = Evaluator::new(&scope);
        assert_eq!(evaluator.eval_value(&json!(42)), Ok(42.0));
        assert_eq!(evaluator.eval_value(&json!("40 + 2")), Ok(42.0));
        assert!(evaluator.eval_value(&json!([1])).is_err());
    }
}
