//! Runtime values of the script language.

use std::cmp::Ordering;

use super::ScriptError;

/// Deepest nesting of lists and maps a script may build.
pub const MAX_DEPTH: usize = 256;
/// Largest value a script may build, counted as elements plus string bytes.
pub const MAX_SIZE: usize = 1_000_000;

pub fn too_large() -> ScriptError {
    ScriptError::Value(format!("value exceeds the size limit of {MAX_SIZE}"))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// Insertion-ordered; keys are scalars.
    Map(Vec<(Value, Value)>),
    /// The environment handle passed to `main`.
    Env,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Env => "env",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Env => true,
        }
    }

    /// Size of this value as elements plus string bytes, walked with an
    /// explicit stack. Its outermost level sits at `depth`; fails once a
    /// node lies deeper than [`MAX_DEPTH`] or the size passes [`MAX_SIZE`].
    pub fn footprint_at(&self, depth: usize) -> Result<usize, ScriptError> {
        let mut size = 0usize;
        let mut pending = vec![(self, depth)];
        while let Some((value, depth)) = pending.pop() {
            if depth > MAX_DEPTH {
                return Err(ScriptError::Value(format!(
                    "value nested deeper than {MAX_DEPTH} levels"
                )));
            }
            size += match value {
                Value::Str(s) => s.len().max(1),
                Value::List(items) => {
                    pending.extend(items.iter().map(|item| (item, depth + 1)));
                    1
                }
                Value::Map(entries) => {
                    for (k, v) in entries {
                        pending.push((k, depth + 1));
                        pending.push((v, depth + 1));
                    }
                    1
                }
                _ => 1,
            };
            if size > MAX_SIZE {
                return Err(too_large());
            }
        }
        Ok(size)
    }

    pub fn footprint(&self) -> Result<usize, ScriptError> {
        self.footprint_at(0)
    }

    /// Debug rendering used in `"OK: <repr>"`.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".into(),
            Value::Bool(true) => "True".into(),
            Value::Bool(false) => "False".into(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => format!("{x:?}"),
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'").replace('\n', "\\n")),
            Value::List(items) => format!(
                "[{}]",
                items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
            ),
            Value::Map(entries) => format!(
                "{{{}}}",
                entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Value::Env => "<env>".into(),
        }
    }

    /// What `str(x)` and `print` show: strings bare, everything else as repr.
    pub fn display(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.repr(),
        }
    }

    pub fn is_hashable(&self) -> bool {
        matches!(self, Value::None | Value::Bool(_) | Value::Int(_) | Value::Str(_))
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Equality with numeric promotion: `1 == 1.0`.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(k2, v2)| k.equals(k2) && v.equals(v2))
                    })
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::None, Value::None) | (Value::Env, Value::Env) => true,
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    pub fn compare(&self, other: &Value) -> Result<Ordering, ScriptError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    let ord = x.compare(y)?;
                    if ord != Ordering::Equal {
                        return Ok(ord);
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| {
                    ScriptError::Value("cannot order NaN".into())
                }),
                _ => Err(ScriptError::Type(format!(
                    "ordering not supported between '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ))),
            },
        }
    }

    /// Items produced by `for x in value`.
    pub fn iterate(&self) -> Result<Vec<Value>, ScriptError> {
        match self {
            Value::List(items) => Ok(items.clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::Map(entries) => Ok(entries.iter().map(|(k, _)| k.clone()).collect()),
            other => Err(ScriptError::Type(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    pub fn map_get<'v>(entries: &'v [(Value, Value)], key: &Value) -> Option<&'v Value> {
        entries.iter().find(|(k, _)| k.equals(key)).map(|(_, v)| v)
    }

    pub fn map_insert(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) -> Result<(), ScriptError> {
        if !key.is_hashable() {
            return Err(ScriptError::Type(format!(
                "unhashable type: '{}'",
                key.type_name()
            )));
        }
        match entries.iter_mut().find(|(k, _)| k.equals(&key)) {
            Some(slot) => slot.1 = value,
            None => entries.push((key, value)),
        }
        Ok(())
    }
}

/// Resolve a possibly negative index into `0..len`.
pub fn resolve_index(index: &Value, len: usize, what: &str) -> Result<usize, ScriptError> {
    let Value::Int(i) = index else {
        return Err(ScriptError::Type(format!(
            "{what} indices must be integers, not '{}'",
            index.type_name()
        )));
    };
    let len = len as i64;
    let resolved = if *i < 0 { len + i } else { *i };
    if (0..len).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(ScriptError::Index(format!("{what} index out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_matches_literal_syntax() {
        let v = Value::List(vec![
            Value::Int(1),
            Value::Float(2.0),
            Value::Str("it's".into()),
            Value::None,
            Value::Bool(true),
        ]);
        assert_eq!(v.repr(), "[1, 2.0, 'it\\'s', None, True]");
        let m = Value::Map(vec![(Value::Str("k".into()), Value::Int(3))]);
        assert_eq!(m.repr(), "{'k': 3}");
    }

    #[test]
    fn numeric_equality_promotes() {
        assert!(Value::Int(1).equals(&Value::Float(1.0)));
        assert!(!Value::Int(1).equals(&Value::Str("1".into())));
    }

    #[test]
    fn ordering_rejects_mixed_kinds() {
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)).unwrap(), Ordering::Less);
        assert!(Value::Int(1).compare(&Value::Str("a".into())).is_err());
    }

    #[test]
    fn footprint_counts_elements_and_bytes() {
        let v = Value::List(vec![Value::Str("abc".into()), Value::Int(1), Value::List(vec![])]);
        assert_eq!(v.footprint().unwrap(), 6);
        assert!(Value::Str("x".repeat(MAX_SIZE + 1)).footprint().is_err());
    }

    #[test]
    fn footprint_rejects_deep_nesting_without_recursing() {
        let mut v = Value::List(vec![]);
        for _ in 0..MAX_DEPTH {
            v = Value::List(vec![v]);
        }
        assert!(v.footprint().is_ok());
        assert!(v.footprint_at(1).is_err());
    }

    #[test]
    fn negative_indices_count_from_end() {
        assert_eq!(resolve_index(&Value::Int(-1), 3, "list").unwrap(), 2);
        assert!(resolve_index(&Value::Int(3), 3, "list").is_err());
    }

    #[test]
    fn maps_replace_existing_keys() {
        let mut entries = Vec::new();
        Value::map_insert(&mut entries, Value::Str("a".into()), Value::Int(1)).unwrap();
        Value::map_insert(&mut entries, Value::Str("a".into()), Value::Int(2)).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(Value::map_insert(&mut entries, Value::List(vec![]), Value::None).is_err());
    }
}
