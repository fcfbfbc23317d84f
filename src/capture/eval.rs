//! Interactive expression evaluation.
//!
//! # Responsibilities
//! - `Evaluator`: the seam the console capture evaluates through
//! - `ScopeEvaluator`: a small evaluator over a shared variable scope
//!
//! # Grammar
//! ```text
//! expr       := json-literal | assignment | path
//! assignment := ident '=' json-literal
//! path       := ident ( '.' ident | '[' (index | json-string) ']' )*
//! ```
//!
//! # Design Decisions
//! - No evaluator is installed unless the embedding application opts in
//! - Reading a member of `null` is a type error; a missing member is `null`

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::capture::error::EvaluationError;

/// Evaluates expressions typed into the console.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, expression: &str) -> Result<Value, EvaluationError>;
}

impl<F> Evaluator for F
where
    F: Fn(&str) -> Result<Value, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, expression: &str) -> Result<Value, EvaluationError> {
        self(expression)
    }
}

/// Named values visible to a `ScopeEvaluator`. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: Arc<DashMap<String, Value>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.vars.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.get(name).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.vars.remove(name).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variable names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vars.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// Evaluates literals, variable paths and assignments against a `Scope`.
#[derive(Debug, Clone, Default)]
pub struct ScopeEvaluator {
    scope: Scope,
}

impl ScopeEvaluator {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Evaluator for ScopeEvaluator {
    fn evaluate(&self, expression: &str) -> Result<Value, EvaluationError> {
        let source = expression.trim();
        if source.is_empty() {
            return Err(EvaluationError::Syntax("unexpected end of input".into()));
        }
        if let Ok(value) = serde_json::from_str::<Value>(source) {
            return Ok(value);
        }

        let mut cursor = Cursor::new(source);
        let name = cursor.ident().ok_or_else(|| unexpected(&cursor))?;
        cursor.skip_ws();

        if cursor.peek() == Some('=') && !cursor.rest().starts_with("==") {
            cursor.bump();
            let value = serde_json::from_str::<Value>(cursor.rest().trim())
                .map_err(|e| EvaluationError::Syntax(e.to_string()))?;
            self.scope.set(name, value.clone());
            return Ok(value);
        }

        let mut current = self
            .scope
            .get(name)
            .ok_or_else(|| EvaluationError::Reference(name.to_string()))?;

        loop {
            cursor.skip_ws();
            match cursor.peek() {
                None => return Ok(current),
                Some('.') => {
                    cursor.bump();
                    let key = cursor.ident().ok_or_else(|| unexpected(&cursor))?;
                    current = member(current, key)?;
                }
                Some('[') => {
                    cursor.bump();
                    let key = cursor.bracket_key()?;
                    current = match key {
                        Key::Index(i) => index(current, i)?,
                        Key::Name(name) => member(current, &name)?,
                    };
                }
                Some(_) => return Err(unexpected(&cursor)),
            }
        }
    }
}

enum Key {
    Index(usize),
    Name(String),
}

fn unexpected(cursor: &Cursor<'_>) -> EvaluationError {
    match cursor.peek() {
        Some(c) => EvaluationError::Syntax(format!("unexpected token '{}'", c)),
        None => EvaluationError::Syntax("unexpected end of input".into()),
    }
}

fn member(value: Value, key: &str) -> Result<Value, EvaluationError> {
    match value {
        Value::Null => Err(EvaluationError::Type(format!(
            "cannot read properties of null (reading '{}')",
            key
        ))),
        Value::Object(mut map) => Ok(map.remove(key).unwrap_or(Value::Null)),
        Value::Array(items) if key == "length" => Ok(Value::from(items.len())),
        Value::String(s) if key == "length" => Ok(Value::from(s.chars().count())),
        _ => Ok(Value::Null),
    }
}

fn index(value: Value, i: usize) -> Result<Value, EvaluationError> {
    match value {
        Value::Null => Err(EvaluationError::Type(format!(
            "cannot read properties of null (reading '{}')",
            i
        ))),
        Value::Array(mut items) if i < items.len() => Ok(items.swap_remove(i)),
        Value::Object(mut map) => Ok(map.remove(&i.to_string()).unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {
                self.bump();
            }
            _ => return None,
        }
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.bump();
        }
        Some(&self.src[start..self.pos])
    }

    /// Parse `<index or string>]` after an opening bracket.
    fn bracket_key(&mut self) -> Result<Key, EvaluationError> {
        let rest = self.rest();
        let close = rest
            .find(']')
            .ok_or_else(|| EvaluationError::Syntax("missing ] after member expression".into()))?;
        let inner = rest[..close].trim();
        let key = match serde_json::from_str::<Value>(inner) {
            Ok(Value::String(name)) => Key::Name(name),
            Ok(Value::Number(n)) => match n.as_u64() {
                Some(i) => Key::Index(i as usize),
                None => Key::Name(n.to_string()),
            },
            _ => {
                return Err(EvaluationError::Syntax(format!(
                    "invalid member key '{}'",
                    inner
                )))
            }
        };
        self.pos += close + 1;
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn evaluator() -> ScopeEvaluator {
        let scope = Scope::new();
        scope.set("user", json!({"name": "ada", "tags": ["a", "b"], "meta": null}));
        ScopeEvaluator::new(scope)
    }

    #[test]
    fn test_literals() {
        let eval = evaluator();
        assert_eq!(eval.evaluate("1 "), Ok(json!(1)));
        assert_eq!(eval.evaluate("\"hi\""), Ok(json!("hi")));
        assert_eq!(eval.evaluate("{\"a\": [1]}"), Ok(json!({"a": [1]})));
        assert_eq!(eval.evaluate("null"), Ok(Value::Null));
    }

    #[test]
    fn test_paths() {
        let eval = evaluator();
        assert_eq!(eval.evaluate("user.name"), Ok(json!("ada")));
        assert_eq!(eval.evaluate("user.tags[1]"), Ok(json!("b")));
        assert_eq!(eval.evaluate("user[\"tags\"].length"), Ok(json!(2)));
        assert_eq!(eval.evaluate("user.missing"), Ok(Value::Null));
        assert_eq!(eval.evaluate("user.tags[9]"), Ok(Value::Null));
    }

    #[test]
    fn test_assignment_updates_scope() {
        let eval = evaluator();
        assert_eq!(eval.evaluate("count = 3"), Ok(json!(3)));
        assert_eq!(eval.scope().get("count"), Some(json!(3)));
        assert_eq!(eval.evaluate("count"), Ok(json!(3)));
    }

    #[test]
    fn test_errors() {
        let eval = evaluator();
        assert_eq!(
            eval.evaluate("nope"),
            Err(EvaluationError::Reference("nope".into()))
        );
        assert!(matches!(
            eval.evaluate("user.meta.x"),
            Err(EvaluationError::Type(_))
        ));
        assert!(matches!(eval.evaluate("1 +"), Err(EvaluationError::Syntax(_))));
        assert!(matches!(eval.evaluate("user.tags[1"), Err(EvaluationError::Syntax(_))));
        assert!(matches!(eval.evaluate("   "), Err(EvaluationError::Syntax(_))));
        assert!(matches!(eval.evaluate("x = {"), Err(EvaluationError::Syntax(_))));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            EvaluationError::Reference("x".into()).to_string(),
            "ReferenceError: x is not defined"
        );
        assert_eq!(EvaluationError::Disabled.to_string(), "evaluation is disabled");
    }

    #[test]
    fn test_closure_evaluator() {
        let eval = |expr: &str| Ok::<_, EvaluationError>(json!(expr.len()));
        assert_eq!(eval.evaluate("abc"), Ok(json!(3)));
    }
}
