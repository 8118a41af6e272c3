//! Async tree-walking interpreter.
//!
//! Variables live in one function-level namespace. Only the builtins in
//! [`call_builtin`] and the methods of the environment handle are
//! reachable, so nothing else touches the host.

use std::collections::HashMap;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::info;
use uipilot_core::{Environment, MouseButton};

use super::ScriptError;
use super::ast::{BinaryOp, Expr, Function, Stmt, UnaryOp};
use super::value::{MAX_SIZE, Value, resolve_index, too_large};

/// Largest list `range` may build.
pub const MAX_RANGE: i64 = 100_000;

enum Flow {
    Next,
    Break,
    Continue,
    Return(Value),
}

pub(crate) struct Interpreter<'e> {
    env: &'e dyn Environment,
    vars: HashMap<String, Value>,
    /// Upper bounds on the footprint of variables grown by indexed
    /// assignment, so each write need not walk the whole value.
    footprints: HashMap<String, usize>,
    max_wait: Duration,
    manifest_limit: usize,
}

impl<'e> Interpreter<'e> {
    pub fn new(env: &'e dyn Environment, max_wait: Duration, manifest_limit: usize) -> Self {
        Self {
            env,
            vars: HashMap::new(),
            footprints: HashMap::new(),
            max_wait,
            manifest_limit,
        }
    }

    /// Bind the handle to `main`'s only parameter and run its body.
    pub async fn call_main(mut self, main: &Function) -> Result<Value, ScriptError> {
        if let Some(param) = main.params.first() {
            self.vars.insert(param.clone(), Value::Env);
        }
        match self.block(&main.body).await? {
            Flow::Return(value) => Ok(value),
            Flow::Next | Flow::Break | Flow::Continue => Ok(Value::None),
        }
    }

    fn block<'s>(&'s mut self, stmts: &'s [Stmt]) -> BoxFuture<'s, Result<Flow, ScriptError>> {
        self.run_block(stmts).boxed()
    }

    async fn run_block(&mut self, stmts: &[Stmt]) -> Result<Flow, ScriptError> {
        for stmt in stmts {
            match self.statement(stmt).await? {
                Flow::Next => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    async fn statement(&mut self, stmt: &Stmt) -> Result<Flow, ScriptError> {
        match stmt {
            Stmt::Let { name, value } => {
                let value = self.eval(value).await?;
                self.footprints.remove(name);
                self.vars.insert(name.clone(), value);
            }
            Stmt::Assign { target, op, value } => {
                let value = self.eval(value).await?;
                self.assign(target, *op, value).await?;
            }
            Stmt::Expr(expr) => {
                self.eval(expr).await?;
            }
            Stmt::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if self.eval(cond).await?.truthy() {
                        return self.block(body).await;
                    }
                }
                if let Some(body) = otherwise {
                    return self.block(body).await;
                }
            }
            Stmt::While { cond, body } => loop {
                // a tight loop must still let the deadline fire
                tokio::task::yield_now().await;
                if !self.eval(cond).await?.truthy() {
                    break;
                }
                match self.block(body).await? {
                    Flow::Break => break,
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Next | Flow::Continue => {}
                }
            },
            Stmt::For {
                names,
                iterable,
                body,
            } => {
                let items = self.eval(iterable).await?.iterate()?;
                for item in items {
                    tokio::task::yield_now().await;
                    self.bind_loop_vars(names, item)?;
                    match self.block(body).await? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Next | Flow::Continue => {}
                    }
                }
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr).await?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Next)
    }

    fn bind_loop_vars(&mut self, names: &[String], item: Value) -> Result<(), ScriptError> {
        if let [name] = names {
            self.footprints.remove(name);
            self.vars.insert(name.clone(), item);
            return Ok(());
        }
        match item {
            Value::List(parts) if parts.len() == names.len() => {
                for (name, part) in names.iter().zip(parts) {
                    self.footprints.remove(name);
                    self.vars.insert(name.clone(), part);
                }
                Ok(())
            }
            other => Err(ScriptError::Value(format!(
                "cannot unpack {} into {} names",
                other.repr(),
                names.len()
            ))),
        }
    }

    async fn assign(&mut self, target: &Expr, op: Option<BinaryOp>, value: Value) -> Result<(), ScriptError> {
        // Walk down to the variable, evaluating indices outermost-last.
        let mut indices = Vec::new();
        let mut cursor = target;
        let name = loop {
            match cursor {
                Expr::Var(name) => break name,
                Expr::Index { target, index } => {
                    indices.push(self.eval(index).await?);
                    cursor = target;
                }
                _ => return Err(ScriptError::Type("invalid assignment target".into())),
            }
        };
        indices.reverse();

        let slot = self.vars.get_mut(name).ok_or_else(|| undefined(name))?;
        if indices.is_empty() {
            // operators bound their own results
            self.footprints.remove(name);
            return assign_path(slot, &indices, op, value);
        }

        let added = value.footprint_at(indices.len())?;
        assign_path(slot, &indices, op, value)?;
        let estimate = match (op, self.footprints.get(name)) {
            (None, Some(known)) => known.saturating_add(added),
            _ => slot.footprint()?,
        };
        let footprint = if estimate > MAX_SIZE {
            slot.footprint()?
        } else {
            estimate
        };
        self.footprints.insert(name.clone(), footprint);
        Ok(())
    }

    fn eval<'s>(&'s mut self, expr: &'s Expr) -> BoxFuture<'s, Result<Value, ScriptError>> {
        self.eval_inner(expr).boxed()
    }

    async fn eval_inner(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        Ok(match expr {
            Expr::None => Value::None,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Int(n) => Value::Int(*n),
            Expr::Float(x) => Value::Float(*x),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item).await?);
                }
                bounded(Value::List(values))?
            }
            Expr::Map(entries) => {
                let mut map = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.eval(key).await?;
                    let value = self.eval(value).await?;
                    Value::map_insert(&mut map, key, value)?;
                }
                bounded(Value::Map(map))?
            }
            Expr::Var(name) => self.vars.get(name).cloned().ok_or_else(|| undefined(name))?,
            Expr::Unary { op, operand } => {
                let value = self.eval(operand).await?;
                match (op, value) {
                    (UnaryOp::Not, v) => Value::Bool(!v.truthy()),
                    (UnaryOp::Neg, Value::Int(n)) => Value::Int(
                        n.checked_neg()
                            .ok_or_else(|| ScriptError::Value("integer overflow".into()))?,
                    ),
                    (UnaryOp::Neg, Value::Float(x)) => Value::Float(-x),
                    (UnaryOp::Neg, v) => {
                        return Err(ScriptError::Type(format!(
                            "bad operand type for unary -: '{}'",
                            v.type_name()
                        )));
                    }
                }
            }
            Expr::Binary { op: BinaryOp::And, lhs, rhs } => {
                let lhs = self.eval(lhs).await?;
                if !lhs.truthy() { lhs } else { self.eval(rhs).await? }
            }
            Expr::Binary { op: BinaryOp::Or, lhs, rhs } => {
                let lhs = self.eval(lhs).await?;
                if lhs.truthy() { lhs } else { self.eval(rhs).await? }
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs).await?;
                let rhs = self.eval(rhs).await?;
                binary(*op, &lhs, &rhs)?
            }
            Expr::Index { target, index } => {
                let target = self.eval(target).await?;
                let index = self.eval(index).await?;
                index_value(&target, &index)?
            }
            Expr::Call { function, args } => {
                let args = self.eval_all(args).await?;
                call_builtin(function, args)?
            }
            Expr::Method {
                receiver,
                method,
                args,
            } => {
                let receiver = self.eval(receiver).await?;
                let args = self.eval_all(args).await?;
                match receiver {
                    Value::Env => self.env_method(method, args).await?,
                    other => value_method(other, method, args)?,
                }
            }
            Expr::Await(inner) => self.eval(inner).await?,
        })
    }

    async fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, ScriptError> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(self.eval(expr).await?);
        }
        Ok(values)
    }

    async fn env_method(&self, method: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        let env = self.env;
        match method {
            "click" | "check" => {
                let (role, name) = role_and_name(method, args)?;
                if method == "click" {
                    env.click_role(&role, name.as_deref()).await?;
                } else {
                    env.check_role(&role, name.as_deref()).await?;
                }
            }
            "fill" | "select" => {
                let [role, name, value] = exact::<3>(method, args)?;
                let role = string(method, "role", role)?;
                let name = optional_string(method, name)?;
                let value = string(method, "value", value)?;
                if method == "fill" {
                    env.fill_role(&role, name.as_deref(), &value).await?;
                } else {
                    env.select_option(&role, name.as_deref(), &value).await?;
                }
            }
            "click_at" => {
                let (x, y, button) = match args.len() {
                    2 | 3 => {
                        let mut args = args.into_iter();
                        let x = number(method, args.next())?;
                        let y = number(method, args.next())?;
                        let button = match args.next() {
                            Some(b) => MouseButton::parse(&string(method, "button", b)?),
                            None => MouseButton::Left,
                        };
                        (x, y, button)
                    }
                    n => return Err(arity(method, "2 or 3", n)),
                };
                env.mouse_click(x, y, button).await?;
            }
            "double_click" => {
                let [x, y] = exact::<2>(method, args)?;
                env.double_click(number(method, Some(x))?, number(method, Some(y))?)
                    .await?;
            }
            "scroll" => {
                let [dx, dy] = exact::<2>(method, args)?;
                env.wheel(number(method, Some(dx))?, number(method, Some(dy))?)
                    .await?;
            }
            "type" => {
                let [text] = exact::<1>(method, args)?;
                env.type_text(&string(method, "text", text)?).await?;
            }
            "press" => {
                let [key] = exact::<1>(method, args)?;
                env.press_key(&string(method, "key", key)?).await?;
            }
            "goto" => {
                let [url] = exact::<1>(method, args)?;
                env.navigate(&string(method, "url", url)?).await?;
            }
            "back" => {
                exact::<0>(method, args)?;
                env.go_back().await?;
            }
            "location" => {
                exact::<0>(method, args)?;
                return Ok(Value::Str(env.location()));
            }
            "manifest" => {
                exact::<0>(method, args)?;
                let tree = env.accessibility_tree().await?;
                let manifest = uipilot_perception::manifest::build(tree.as_ref(), self.manifest_limit);
                return Ok(Value::Str(manifest.render()));
            }
            "wait" => {
                let [seconds] = exact::<1>(method, args)?;
                let seconds = number(method, Some(seconds))?;
                let seconds = if seconds.is_finite() {
                    seconds.clamp(0.0, self.max_wait.as_secs_f64())
                } else {
                    0.0
                };
                tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            }
            "screenshot_size" => {
                exact::<0>(method, args)?;
                return Ok(Value::Int(env.screenshot().await?.len() as i64));
            }
            other => {
                return Err(ScriptError::Name(format!(
                    "environment handle has no method '{other}'"
                )));
            }
        }
        Ok(Value::None)
    }
}

fn call_builtin(name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    match name {
        "str" => {
            let [v] = exact::<1>(name, args)?;
            bounded(Value::Str(v.display()))
        }
        "int" => {
            let [v] = exact::<1>(name, args)?;
            to_int(v)
        }
        "float" => {
            let [v] = exact::<1>(name, args)?;
            to_float(v)
        }
        "bool" => {
            let [v] = exact::<1>(name, args)?;
            Ok(Value::Bool(v.truthy()))
        }
        "list" => match args.len() {
            0 => Ok(Value::List(Vec::new())),
            _ => {
                let [v] = exact::<1>(name, args)?;
                bounded(Value::List(v.iterate()?))
            }
        },
        "dict" => {
            let mut map = Vec::new();
            if !args.is_empty() {
                let [pairs] = exact::<1>(name, args)?;
                if let Value::Map(entries) = pairs {
                    return Ok(Value::Map(entries));
                }
                for pair in pairs.iterate()? {
                    match pair {
                        Value::List(kv) if kv.len() == 2 => {
                            let mut kv = kv.into_iter();
                            let (k, v) = (kv.next().unwrap_or(Value::None), kv.next().unwrap_or(Value::None));
                            Value::map_insert(&mut map, k, v)?;
                        }
                        other => {
                            return Err(ScriptError::Value(format!(
                                "dict() needs key/value pairs, got {}",
                                other.repr()
                            )));
                        }
                    }
                }
            }
            Ok(Value::Map(map))
        }
        "len" => {
            let [v] = exact::<1>(name, args)?;
            let len = match &v {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(entries) => entries.len(),
                other => {
                    return Err(ScriptError::Type(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::Int(len as i64))
        }
        "min" | "max" => {
            let items = if args.len() == 1 {
                args.into_iter().next().unwrap_or(Value::None).iterate()?
            } else {
                args
            };
            let mut items = items.into_iter();
            let mut best = items
                .next()
                .ok_or_else(|| ScriptError::Value(format!("{name}() arg is an empty sequence")))?;
            for item in items {
                let ord = item.compare(&best)?;
                if (name == "min" && ord.is_lt()) || (name == "max" && ord.is_gt()) {
                    best = item;
                }
            }
            Ok(best)
        }
        "sum" => {
            let (iterable, start) = match args.len() {
                1 | 2 => {
                    let mut args = args.into_iter();
                    let iterable = args.next().unwrap_or(Value::None);
                    (iterable, args.next().unwrap_or(Value::Int(0)))
                }
                n => return Err(arity(name, "1 or 2", n)),
            };
            iterable
                .iterate()?
                .iter()
                .try_fold(start, |acc, item| binary(BinaryOp::Add, &acc, item))
        }
        "range" => {
            let ints = args
                .iter()
                .map(|a| match a {
                    Value::Int(n) => Ok(*n),
                    other => Err(ScriptError::Type(format!(
                        "range() arguments must be int, not '{}'",
                        other.type_name()
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => return Err(arity(name, "1 to 3", ints.len())),
            };
            if step == 0 {
                return Err(ScriptError::Value("range() step must not be zero".into()));
            }
            let span = if step > 0 { stop.saturating_sub(start) } else { start.saturating_sub(stop) };
            let count = if span <= 0 { 0 } else { (span - 1) / step.saturating_abs() + 1 };
            if count > MAX_RANGE {
                return Err(ScriptError::Value(format!(
                    "range() of {count} items exceeds the limit of {MAX_RANGE}"
                )));
            }
            Ok(Value::List(
                (0..count).map(|i| Value::Int(start + i * step)).collect(),
            ))
        }
        "enumerate" => {
            let [v] = exact::<1>(name, args)?;
            bounded(Value::List(
                v.iterate()?
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| Value::List(vec![Value::Int(i as i64), item]))
                    .collect(),
            ))
        }
        "print" => {
            let line = args.iter().map(Value::display).collect::<Vec<_>>().join(" ");
            info!(target: "uipilot::script", "{line}");
            Ok(Value::None)
        }
        "matches" => {
            let [text, pattern] = exact::<2>(name, args)?;
            let (Value::Str(text), Value::Str(pattern)) = (&text, &pattern) else {
                return Err(ScriptError::Type("matches() takes (text, pattern) strings".into()));
            };
            let re = regex::Regex::new(pattern)
                .map_err(|e| ScriptError::Value(format!("invalid pattern: {e}")))?;
            Ok(Value::Bool(re.is_match(text)))
        }
        "expect" => {
            let (cond, message) = match args.len() {
                1 | 2 => {
                    let mut args = args.into_iter();
                    (args.next().unwrap_or(Value::None), args.next())
                }
                n => return Err(arity(name, "1 or 2", n)),
            };
            if cond.truthy() {
                Ok(Value::None)
            } else {
                Err(ScriptError::Assertion(
                    message.map(|m| m.display()).unwrap_or_else(|| "expectation failed".into()),
                ))
            }
        }
        other => Err(undefined(other)),
    }
}

fn undefined(name: &str) -> ScriptError {
    ScriptError::Name(format!("name '{name}' is not defined"))
}

fn arity(name: &str, expected: &str, found: usize) -> ScriptError {
    ScriptError::Type(format!("{name}() takes {expected} arguments ({found} given)"))
}

fn exact<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], ScriptError> {
    let found = args.len();
    <[Value; N]>::try_from(args).map_err(|_| arity(name, &N.to_string(), found))
}

fn string(method: &str, what: &str, value: Value) -> Result<String, ScriptError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::Type(format!(
            "{method}(): '{what}' must be str, not '{}'",
            other.type_name()
        ))),
    }
}

fn optional_string(method: &str, value: Value) -> Result<Option<String>, ScriptError> {
    match value {
        Value::None => Ok(None),
        other => string(method, "name", other).map(Some),
    }
}

fn number(method: &str, value: Option<Value>) -> Result<f64, ScriptError> {
    match value {
        Some(Value::Int(n)) => Ok(n as f64),
        Some(Value::Float(x)) => Ok(x),
        Some(other) => Err(ScriptError::Type(format!(
            "{method}(): expected a number, not '{}'",
            other.type_name()
        ))),
        None => Err(ScriptError::Type(format!("{method}(): missing number"))),
    }
}

fn role_and_name(method: &str, args: Vec<Value>) -> Result<(String, Option<String>), ScriptError> {
    match args.len() {
        1 | 2 => {
            let mut args = args.into_iter();
            let role = string(method, "role", args.next().unwrap_or(Value::None))?;
            let name = optional_string(method, args.next().unwrap_or(Value::None))?;
            Ok((role, name))
        }
        n => Err(arity(method, "1 or 2", n)),
    }
}

fn to_int(value: Value) -> Result<Value, ScriptError> {
    match value {
        Value::Int(n) => Ok(Value::Int(n)),
        Value::Bool(b) => Ok(Value::Int(b as i64)),
        Value::Float(x) if x.is_finite() && x.abs() < 9.2e18 => Ok(Value::Int(x.trunc() as i64)),
        Value::Float(x) => Err(ScriptError::Value(format!("cannot convert {x:?} to int"))),
        Value::Str(s) => s
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| ScriptError::Value(format!("invalid literal for int(): '{s}'"))),
        other => Err(ScriptError::Type(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(value: Value) -> Result<Value, ScriptError> {
    match value {
        Value::Int(n) => Ok(Value::Float(n as f64)),
        Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
        Value::Float(x) => Ok(Value::Float(x)),
        Value::Str(s) => s
            .trim()
            .parse()
            .map(Value::Float)
            .map_err(|_| ScriptError::Value(format!("could not convert string to float: '{s}'"))),
        other => Err(ScriptError::Type(format!(
            "float() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

/// Reject a value that nests too deeply or grew past [`MAX_SIZE`].
fn bounded(value: Value) -> Result<Value, ScriptError> {
    value.footprint()?;
    Ok(value)
}

fn repeat(value: &Value, times: i64) -> Result<Value, ScriptError> {
    let times = times.max(0) as usize;
    if value.footprint()?.saturating_mul(times) > MAX_SIZE {
        return Err(too_large());
    }
    Ok(match value {
        Value::Str(s) => Value::Str(s.repeat(times)),
        Value::List(items) => Value::List(std::iter::repeat_n(items, times).flatten().cloned().collect()),
        other => other.clone(),
    })
}

fn overflow() -> ScriptError {
    ScriptError::Value("integer overflow".into())
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ScriptError> {
    use Value::{Float, Int, List, Str};

    match op {
        BinaryOp::Eq => return Ok(Value::Bool(lhs.equals(rhs))),
        BinaryOp::Ne => return Ok(Value::Bool(!lhs.equals(rhs))),
        BinaryOp::Lt => return Ok(Value::Bool(lhs.compare(rhs)?.is_lt())),
        BinaryOp::Le => return Ok(Value::Bool(lhs.compare(rhs)?.is_le())),
        BinaryOp::Gt => return Ok(Value::Bool(lhs.compare(rhs)?.is_gt())),
        BinaryOp::Ge => return Ok(Value::Bool(lhs.compare(rhs)?.is_ge())),
        _ => {}
    }

    let unsupported = || {
        ScriptError::Type(format!(
            "unsupported operand types for {}: '{}' and '{}'",
            op.symbol(),
            lhs.type_name(),
            rhs.type_name()
        ))
    };

    match (op, lhs, rhs) {
        (BinaryOp::Add, Str(a), Str(b)) => {
            if a.len() + b.len() > MAX_SIZE {
                return Err(too_large());
            }
            Ok(Str(format!("{a}{b}")))
        }
        (BinaryOp::Add, List(a), List(b)) => {
            if lhs.footprint()? + rhs.footprint()? > MAX_SIZE {
                return Err(too_large());
            }
            Ok(List(a.iter().chain(b).cloned().collect()))
        }
        (BinaryOp::Mul, seq @ (Str(_) | List(_)), Int(n))
        | (BinaryOp::Mul, Int(n), seq @ (Str(_) | List(_))) => repeat(seq, *n),
        (BinaryOp::Add, Int(a), Int(b)) => a.checked_add(*b).map(Int).ok_or_else(overflow),
        (BinaryOp::Sub, Int(a), Int(b)) => a.checked_sub(*b).map(Int).ok_or_else(overflow),
        (BinaryOp::Mul, Int(a), Int(b)) => a.checked_mul(*b).map(Int).ok_or_else(overflow),
        (BinaryOp::Rem, Int(_), Int(0)) | (BinaryOp::Div, Int(_), Int(0)) => {
            Err(ScriptError::ZeroDivision)
        }
        (BinaryOp::Rem, Int(a), Int(b)) => {
            // result takes the divisor's sign
            let r = a.checked_rem(*b).ok_or_else(overflow)?;
            Ok(Int(if r != 0 && (r < 0) != (*b < 0) { r + b } else { r }))
        }
        (BinaryOp::Div, Int(a), Int(b)) => Ok(Float(*a as f64 / *b as f64)),
        (_, Int(_) | Float(_), Int(_) | Float(_)) => {
            let (a, b) = (as_f64(lhs), as_f64(rhs));
            match op {
                BinaryOp::Add => Ok(Float(a + b)),
                BinaryOp::Sub => Ok(Float(a - b)),
                BinaryOp::Mul => Ok(Float(a * b)),
                BinaryOp::Div | BinaryOp::Rem if b == 0.0 => Err(ScriptError::ZeroDivision),
                BinaryOp::Div => Ok(Float(a / b)),
                BinaryOp::Rem => Ok(Float(a - b * (a / b).floor())),
                _ => Err(unsupported()),
            }
        }
        _ => Err(unsupported()),
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Int(n) => *n as f64,
        Value::Float(x) => *x,
        _ => 0.0,
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, ScriptError> {
    match target {
        Value::List(items) => Ok(items[resolve_index(index, items.len(), "list")?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = resolve_index(index, chars.len(), "string")?;
            Ok(Value::Str(chars[i].to_string()))
        }
        Value::Map(entries) => Value::map_get(entries, index)
            .cloned()
            .ok_or_else(|| ScriptError::Key(format!("key not found: {}", index.repr()))),
        other => Err(ScriptError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn assign_path(
    slot: &mut Value,
    indices: &[Value],
    op: Option<BinaryOp>,
    value: Value,
) -> Result<(), ScriptError> {
    let Some((index, rest)) = indices.split_first() else {
        *slot = match op {
            Some(op) => binary(op, slot, &value)?,
            None => value,
        };
        return Ok(());
    };
    match slot {
        Value::List(items) => {
            let i = resolve_index(index, items.len(), "list")?;
            assign_path(&mut items[i], rest, op, value)
        }
        Value::Map(entries) => {
            if rest.is_empty() && op.is_none() {
                return Value::map_insert(entries, index.clone(), value);
            }
            let entry = entries
                .iter_mut()
                .find(|(k, _)| k.equals(index))
                .ok_or_else(|| ScriptError::Key(format!("key not found: {}", index.repr())))?;
            assign_path(&mut entry.1, rest, op, value)
        }
        other => Err(ScriptError::Type(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn value_method(receiver: Value, method: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    match (receiver, method) {
        (Value::Str(s), "upper") => exact::<0>(method, args).map(|_| Value::Str(s.to_uppercase())),
        (Value::Str(s), "lower") => exact::<0>(method, args).map(|_| Value::Str(s.to_lowercase())),
        (Value::Str(s), "strip") => exact::<0>(method, args).map(|_| Value::Str(s.trim().to_string())),
        (Value::Str(s), "contains" | "startswith" | "endswith") => {
            let [needle] = exact::<1>(method, args)?;
            let needle = string(method, "needle", needle)?;
            Ok(Value::Bool(match method {
                "contains" => s.contains(&needle),
                "startswith" => s.starts_with(&needle),
                _ => s.ends_with(&needle),
            }))
        }
        (Value::Str(s), "split") => {
            let parts: Vec<Value> = match args.len() {
                0 => s.split_whitespace().map(|p| Value::Str(p.into())).collect(),
                _ => {
                    let [sep] = exact::<1>(method, args)?;
                    let sep = string(method, "sep", sep)?;
                    if sep.is_empty() {
                        return Err(ScriptError::Value("empty separator".into()));
                    }
                    s.split(sep.as_str()).map(|p| Value::Str(p.into())).collect()
                }
            };
            bounded(Value::List(parts))
        }
        (Value::Str(sep), "join") => {
            let [items] = exact::<1>(method, args)?;
            let parts = items
                .iterate()?
                .into_iter()
                .map(|v| string(method, "item", v))
                .collect::<Result<Vec<_>, _>>()?;
            let joined_len = parts.iter().map(String::len).sum::<usize>()
                + sep.len().saturating_mul(parts.len().saturating_sub(1));
            if joined_len > MAX_SIZE {
                return Err(too_large());
            }
            Ok(Value::Str(parts.join(&sep)))
        }
        (Value::List(items), "contains") => {
            let [needle] = exact::<1>(method, args)?;
            Ok(Value::Bool(items.iter().any(|v| v.equals(&needle))))
        }
        (Value::Map(entries), "get") => {
            let (key, default) = match args.len() {
                1 | 2 => {
                    let mut args = args.into_iter();
                    (args.next().unwrap_or(Value::None), args.next().unwrap_or(Value::None))
                }
                n => return Err(arity(method, "1 or 2", n)),
            };
            Ok(Value::map_get(&entries, &key).cloned().unwrap_or(default))
        }
        (Value::Map(entries), "keys") => {
            exact::<0>(method, args)?;
            Ok(Value::List(entries.into_iter().map(|(k, _)| k).collect()))
        }
        (Value::Map(entries), "values") => {
            exact::<0>(method, args)?;
            Ok(Value::List(entries.into_iter().map(|(_, v)| v).collect()))
        }
        (Value::Map(entries), "items") => {
            exact::<0>(method, args)?;
            bounded(Value::List(
                entries.into_iter().map(|(k, v)| Value::List(vec![k, v])).collect(),
            ))
        }
        (Value::Map(entries), "contains") => {
            let [key] = exact::<1>(method, args)?;
            Ok(Value::Bool(Value::map_get(&entries, &key).is_some()))
        }
        (other, _) => Err(ScriptError::Type(format!(
            "'{}' object has no method '{method}'",
            other.type_name()
        ))),
    }
}
