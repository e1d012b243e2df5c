//! The template expression AST and its two evaluators.
//!
//! Every expression can be evaluated twice: once at compile time against
//! host bindings ([`Expr::eval_initial`]) and once into a JS fragment plus
//! the set of reactive cells it reads ([`Expr::eval_script`]). The two must
//! agree: the JS fragment, run against the emitted initial cell values,
//! yields the same value `eval_initial` produced.

use indexmap::IndexMap;
use script_builder::{js_string, Quote};
use smol_str::SmolStr;
use std::fmt;

use crate::error::{CompileError, CompileResult};
use crate::functions::ReactiveFunction;
use crate::ops::{BinaryOperator, UnaryOperator};
use crate::scope::{CellId, DepSet, ScopeRef};
use crate::value::{Bindings, Value};

/// A parsed template expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    Array(Vec<Expr>),
    Dict(IndexMap<SmolStr, Expr>),
    /// A template variable, resolved against the scope tree at
    /// evaluation time.
    Var(SmolStr),
    /// A raw JS variable, invisible to initial evaluation.
    NativeVar(SmolStr),
    Property {
        root: Box<Expr>,
        path: Vec<SmolStr>,
    },
    Ternary {
        condition: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    Unary {
        symbol: &'static str,
        op: &'static dyn UnaryOperator,
        arg: Box<Expr>,
    },
    Binary {
        symbol: &'static str,
        op: &'static dyn BinaryOperator,
        args: Vec<Expr>,
    },
    Call {
        name: SmolStr,
        func: &'static dyn ReactiveFunction,
        args: Vec<Expr>,
    },
    /// A reference to an existing reactive cell; renders as a fresh
    /// `__reactive_data` construction carrying that cell's state.
    CellRef(CellId),
    /// Wraps an expression whose rendered text must not contain the
    /// delimiter (attribute values inside quoted HTML).
    Escaped {
        inner: Box<Expr>,
        delimiter: char,
    },
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        use Expr::*;
        match (self, other) {
            (Str(a), Str(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (None, None) => true,
            (Array(a), Array(b)) => a == b,
            (Dict(a), Dict(b)) => a == b,
            (Var(a), Var(b)) => a == b,
            (NativeVar(a), NativeVar(b)) => a == b,
            (
                Property { root: ra, path: pa },
                Property { root: rb, path: pb },
            ) => ra == rb && pa == pb,
            (
                Ternary {
                    condition: ca,
                    if_true: ta,
                    if_false: fa,
                },
                Ternary {
                    condition: cb,
                    if_true: tb,
                    if_false: fb,
                },
            ) => ca == cb && ta == tb && fa == fb,
            (
                Unary {
                    symbol: sa, arg: aa, ..
                },
                Unary {
                    symbol: sb, arg: ab, ..
                },
            ) => sa == sb && aa == ab,
            (
                Binary {
                    symbol: sa, args: aa, ..
                },
                Binary {
                    symbol: sb, args: ab, ..
                },
            ) => sa == sb && aa == ab,
            (
                Call {
                    name: na, args: aa, ..
                },
                Call {
                    name: nb, args: ab, ..
                },
            ) => na == nb && aa == ab,
            (CellRef(a), CellRef(b)) => a == b,
            (
                Escaped {
                    inner: ia,
                    delimiter: da,
                },
                Escaped {
                    inner: ib,
                    delimiter: db,
                },
            ) => ia == ib && da == db,
            _ => false,
        }
    }
}

/// Convert a host value into the literal expression producing it.
pub fn value_to_expr(value: &Value) -> Expr {
    match value {
        Value::None => Expr::None,
        Value::Bool(b) => Expr::Bool(*b),
        Value::Int(n) => Expr::Int(*n),
        Value::Float(f) => Expr::Float(*f),
        Value::Str(s) => Expr::Str(s.clone()),
        Value::Array(items) => Expr::Array(items.iter().map(value_to_expr).collect()),
        Value::Dict(entries) => Expr::Dict(
            entries
                .iter()
                .map(|(key, val)| (key.clone(), value_to_expr(val)))
                .collect(),
        ),
        Value::Cell(id) => Expr::CellRef(*id),
    }
}

fn float_js(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

impl Expr {
    /// Shorthand for a `+` chain; a single argument stays unwrapped.
    pub fn sum(mut args: Vec<Expr>) -> Expr {
        if args.len() == 1 {
            args.pop().unwrap_or(Expr::None)
        } else {
            Expr::Binary {
                symbol: "+",
                op: &crate::ops::Sum,
                args,
            }
        }
    }

    /// Whether evaluation can never read a variable or cell.
    pub fn constant(&self) -> bool {
        match self {
            Expr::Str(_) | Expr::Int(_) | Expr::Float(_) | Expr::Bool(_) | Expr::None => true,
            Expr::Array(items) => items.iter().all(Expr::constant),
            Expr::Dict(entries) => entries.values().all(Expr::constant),
            Expr::Ternary {
                condition,
                if_true,
                if_false,
            } => condition.constant() && if_true.constant() && if_false.constant(),
            Expr::Unary { arg, .. } => arg.constant(),
            Expr::Binary { args, .. } => args.iter().all(Expr::constant),
            Expr::Var(_)
            | Expr::NativeVar(_)
            | Expr::Property { .. }
            | Expr::Call { .. }
            | Expr::CellRef(_)
            | Expr::Escaped { .. } => false,
        }
    }

    /// Whether a cell reference occurs anywhere in the expression. Dict
    /// rendering switches to a const-binding IIFE in that case so each
    /// `__reactive_data` construction is evaluated exactly once.
    pub fn contains_cell_ref(&self) -> bool {
        match self {
            Expr::CellRef(_) => true,
            Expr::Array(items) => items.iter().any(Expr::contains_cell_ref),
            Expr::Dict(entries) => entries.values().any(Expr::contains_cell_ref),
            Expr::Property { root, .. } => root.contains_cell_ref(),
            Expr::Ternary {
                condition,
                if_true,
                if_false,
            } => {
                condition.contains_cell_ref()
                    || if_true.contains_cell_ref()
                    || if_false.contains_cell_ref()
            }
            Expr::Unary { arg, .. } => arg.contains_cell_ref(),
            Expr::Binary { args, .. } | Expr::Call { args, .. } => {
                args.iter().any(Expr::contains_cell_ref)
            }
            Expr::Escaped { inner, .. } => inner.contains_cell_ref(),
            _ => false,
        }
    }

    /// Substitute host bindings for free variables.
    pub fn reduce(&self, bindings: &Bindings) -> Expr {
        match self {
            Expr::Var(name) => match bindings.get(name) {
                Some(value) => value_to_expr(value),
                Option::None => self.clone(),
            },
            Expr::Array(items) => {
                Expr::Array(items.iter().map(|item| item.reduce(bindings)).collect())
            }
            Expr::Dict(entries) => Expr::Dict(
                entries
                    .iter()
                    .map(|(key, val)| (key.clone(), val.reduce(bindings)))
                    .collect(),
            ),
            Expr::Property { root, path } => Expr::Property {
                root: Box::new(root.reduce(bindings)),
                path: path.clone(),
            },
            Expr::Ternary {
                condition,
                if_true,
                if_false,
            } => Expr::Ternary {
                condition: Box::new(condition.reduce(bindings)),
                if_true: Box::new(if_true.reduce(bindings)),
                if_false: Box::new(if_false.reduce(bindings)),
            },
            Expr::Unary { symbol, op, arg } => Expr::Unary {
                symbol,
                op: *op,
                arg: Box::new(arg.reduce(bindings)),
            },
            Expr::Binary { symbol, op, args } => Expr::Binary {
                symbol,
                op: *op,
                args: args.iter().map(|arg| arg.reduce(bindings)).collect(),
            },
            Expr::Call { name, func, args } => Expr::Call {
                name: name.clone(),
                func: *func,
                args: args.iter().map(|arg| arg.reduce(bindings)).collect(),
            },
            Expr::Escaped { inner, delimiter } => Expr::Escaped {
                inner: Box::new(inner.reduce(bindings)),
                delimiter: *delimiter,
            },
            _ => self.clone(),
        }
    }

    fn condition_initial(
        condition: &Expr,
        scope: Option<ScopeRef<'_>>,
    ) -> CompileResult<bool> {
        match condition.eval_initial(scope)? {
            Value::Bool(b) => Ok(b),
            other => Err(CompileError::type_mismatch(
                condition.to_string(),
                other.repr(),
                "the initial value of a condition must be boolean",
            )),
        }
    }

    /// Evaluate against host bindings registered in the scope tree.
    pub fn eval_initial(&self, scope: Option<ScopeRef<'_>>) -> CompileResult<Value> {
        match self {
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.eval_initial(scope)?);
                }
                Ok(Value::Array(out))
            }
            Expr::Dict(entries) => {
                let mut out = IndexMap::new();
                for (key, val) in entries {
                    out.insert(key.clone(), val.eval_initial(scope)?);
                }
                Ok(Value::Dict(out))
            }
            Expr::Var(name) => {
                let scope = scope.ok_or_else(|| {
                    CompileError::scope(format!(
                        "cannot evaluate variable `{name}` without a scope"
                    ))
                })?;
                match scope.resolve(name) {
                    Some(cell) => scope.tree.cell_eval_initial(cell),
                    Option::None => Ok(Value::Str(String::new())),
                }
            }
            Expr::NativeVar(_) => Ok(Value::None),
            Expr::Property { root, path } => {
                let root_val = root.eval_initial(scope)?;
                let mut current = root_val.clone();
                for key in path {
                    let Value::Dict(entries) = &current else {
                        return Err(CompileError::resolution(
                            self.to_string(),
                            key.to_string(),
                            current.repr(),
                        ));
                    };
                    match entries.get(key.as_str()) {
                        Some(next) => current = next.clone(),
                        Option::None => {
                            return Err(CompileError::resolution(
                                self.to_string(),
                                key.to_string(),
                                current.repr(),
                            ))
                        }
                    }
                }
                Ok(current)
            }
            Expr::Ternary {
                condition,
                if_true,
                if_false,
            } => {
                if Self::condition_initial(condition, scope)? {
                    if_true.eval_initial(scope)
                } else {
                    if_false.eval_initial(scope)
                }
            }
            Expr::Unary { op, arg, .. } => {
                let value = arg.eval_initial(scope)?;
                op.eval_value(&value)
                    .map_err(|e| e.with_expr_text(&self.to_string()))
            }
            Expr::Binary { op, args, .. } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.eval_initial(scope)?);
                }
                op.eval_values(&values)
                    .map_err(|e| e.with_expr_text(&self.to_string()))
            }
            Expr::Call { func, args, .. } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.eval_initial(scope)?);
                }
                func.eval_initial(&values)
                    .map_err(|e| e.with_expr_text(&self.to_string()))
            }
            Expr::CellRef(id) => Ok(Value::Cell(*id)),
            Expr::Escaped { inner, delimiter } => {
                let value = inner.eval_initial(scope)?;
                let escaped = value
                    .to_string()
                    .replace(*delimiter, &format!("\\{delimiter}"));
                Ok(Value::Str(escaped))
            }
        }
    }

    /// Render as a JS fragment plus the cells it reads.
    pub fn eval_script(
        &self,
        scope: Option<ScopeRef<'_>>,
        quote: Quote,
    ) -> CompileResult<(String, DepSet)> {
        match self {
            Expr::Str(s) => Ok((js_string(s, quote), DepSet::default())),
            Expr::Int(n) => Ok((n.to_string(), DepSet::default())),
            Expr::Float(f) => Ok((float_js(*f), DepSet::default())),
            Expr::Bool(b) => Ok((
                if *b { "true" } else { "false" }.to_string(),
                DepSet::default(),
            )),
            Expr::None => Ok(("null".to_string(), DepSet::default())),
            Expr::Array(items) => {
                let mut parts = Vec::with_capacity(items.len());
                let mut deps = DepSet::default();
                for item in items {
                    let (js, item_deps) = item.eval_script(scope, quote)?;
                    parts.push(js);
                    deps.extend(item_deps);
                }
                Ok((format!("[{}]", parts.join(",")), deps))
            }
            Expr::Dict(entries) => {
                let mut rendered = Vec::with_capacity(entries.len());
                let mut deps = DepSet::default();
                let mut any_cell = false;
                for (key, val) in entries {
                    let (js, val_deps) = val.eval_script(scope, quote)?;
                    any_cell = any_cell || val.contains_cell_ref();
                    rendered.push((key.clone(), js));
                    deps.extend(val_deps);
                }
                let js = if any_cell {
                    let mut out = String::from("( () => {\n");
                    for (key, js) in &rendered {
                        out.push_str(&format!("const {key}={js};\n"));
                    }
                    out.push_str("return {");
                    out.push_str(
                        &rendered
                            .iter()
                            .map(|(key, _)| format!("{key}:{key}"))
                            .collect::<Vec<_>>()
                            .join(","),
                    );
                    out.push_str("};\n} )()");
                    out
                } else {
                    format!(
                        "{{{}}}",
                        rendered
                            .iter()
                            .map(|(key, js)| format!("{key}:{js}"))
                            .collect::<Vec<_>>()
                            .join(",")
                    )
                };
                Ok((js, deps))
            }
            Expr::Var(name) => {
                let scope = scope.ok_or_else(|| {
                    CompileError::scope(format!(
                        "cannot evaluate variable `{name}` without a scope"
                    ))
                })?;
                match scope.resolve(name) {
                    Some(cell) => {
                        let mut deps = DepSet::default();
                        deps.insert(cell);
                        Ok((scope.tree.cell_js_get(cell), deps))
                    }
                    Option::None => Ok((js_string("", quote), DepSet::default())),
                }
            }
            Expr::NativeVar(name) => Ok((name.to_string(), DepSet::default())),
            Expr::Property { root, path } => {
                let (root_js, deps) = root.eval_script(scope, quote)?;
                Ok((format!("({root_js}).{}", path.join(".")), deps))
            }
            Expr::Ternary {
                condition,
                if_true,
                if_false,
            } => {
                if condition.constant() {
                    return if Self::condition_initial(condition, scope)? {
                        if_true.eval_script(scope, quote)
                    } else {
                        if_false.eval_script(scope, quote)
                    };
                }
                let (cond_js, mut deps) = condition.eval_script(scope, quote)?;
                let (true_js, true_deps) = if_true.eval_script(scope, quote)?;
                let (false_js, false_deps) = if_false.eval_script(scope, quote)?;
                deps.extend(true_deps);
                deps.extend(false_deps);
                Ok((format!("({cond_js}?{true_js}:{false_js})"), deps))
            }
            Expr::Unary { op, arg, .. } => {
                if arg.constant() {
                    let value = self.eval_initial(scope)?;
                    return value_to_expr(&value).eval_script(scope, quote);
                }
                let (arg_js, deps) = arg.eval_script(scope, quote)?;
                Ok((op.eval_js(&arg_js), deps))
            }
            Expr::Binary { op, .. } => {
                let optimized = self.optimized_binary_args()?;
                if optimized.len() == 1 {
                    return optimized[0].eval_script(scope, quote);
                }
                let mut parts = Vec::with_capacity(optimized.len());
                let mut deps = DepSet::default();
                for arg in &optimized {
                    let (js, arg_deps) = arg.eval_script(scope, quote)?;
                    parts.push(js);
                    deps.extend(arg_deps);
                }
                Ok((op.eval_js(&parts), deps))
            }
            Expr::Call { func, args, .. } => {
                let mut parts = Vec::with_capacity(args.len());
                let mut deps = DepSet::default();
                for arg in args {
                    let (js, arg_deps) = if func.wants_html_args() {
                        arg.eval_script_html(scope, quote)?
                    } else {
                        arg.eval_script(scope, quote)?
                    };
                    parts.push(js);
                    deps.extend(arg_deps);
                }
                if !func.tracks_dependencies() {
                    deps = DepSet::default();
                }
                Ok((func.eval_js(&parts), deps))
            }
            Expr::CellRef(id) => {
                let scope = scope.ok_or_else(|| {
                    CompileError::scope("cannot render a cell reference without a scope")
                })?;
                Ok((
                    scope.tree.cell_initial_val_js(*id, false, quote)?,
                    DepSet::default(),
                ))
            }
            Expr::Escaped { inner, delimiter } => {
                let (inner_js, deps) = inner.eval_script(scope, quote)?;
                let escaped_delim = if *delimiter == quote.char() {
                    format!("\\{delimiter}")
                } else {
                    delimiter.to_string()
                };
                Ok((
                    format!(
                        "({inner_js}).toString().replace(/{escaped_delim}/g, {})",
                        js_string(&escaped_delim, quote)
                    ),
                    deps,
                ))
            }
        }
    }

    /// Fold adjacent constant argument runs of a `Binary` down to literal
    /// expressions. A lone constant in a run stays as written.
    fn optimized_binary_args(&self) -> CompileResult<Vec<Expr>> {
        let Expr::Binary { op, args, .. } = self else {
            return Ok(vec![self.clone()]);
        };
        let fold_run = |run: &mut Vec<Expr>, out: &mut Vec<Expr>| -> CompileResult<()> {
            match run.len() {
                0 => {}
                1 => out.push(run.pop().unwrap_or(Expr::None)),
                _ => {
                    let mut values = Vec::with_capacity(run.len());
                    for arg in run.iter() {
                        values.push(arg.eval_initial(Option::None)?);
                    }
                    let value = op
                        .eval_values(&values)
                        .map_err(|e| e.with_expr_text(&self.to_string()))?;
                    out.push(value_to_expr(&value));
                    run.clear();
                }
            }
            Ok(())
        };

        let mut out = Vec::new();
        let mut run: Vec<Expr> = Vec::new();
        for arg in args {
            if arg.constant() {
                run.push(arg.clone());
            } else {
                fold_run(&mut run, &mut out)?;
                out.push(arg.clone());
            }
        }
        fold_run(&mut run, &mut out)?;
        Ok(out)
    }

    /// Render as a JS fragment producing display-ready HTML text.
    pub fn eval_script_html(
        &self,
        scope: Option<ScopeRef<'_>>,
        quote: Quote,
    ) -> CompileResult<(String, DepSet)> {
        match self {
            Expr::Str(s) => Ok((js_string(s, quote), DepSet::default())),
            Expr::Int(n) => {
                let delim = quote.char();
                Ok((format!("{delim}{n}{delim}"), DepSet::default()))
            }
            Expr::Bool(b) => Ok((
                if *b { "'True'" } else { "'False'" }.to_string(),
                DepSet::default(),
            )),
            Expr::None => Ok(("'None'".to_string(), DepSet::default())),
            _ => {
                let (js, deps) = self.eval_script(scope, quote)?;
                Ok((format!("__reactive_print_html({js})"), deps))
            }
        }
    }

    /// Whether `js_set`/`js_notify` can target this expression.
    pub fn is_settable(&self) -> bool {
        matches!(
            self,
            Expr::Var(_) | Expr::NativeVar(_) | Expr::Property { .. }
        )
    }

    /// Emit the assignment statement setting this expression to an
    /// already-rendered JS value.
    pub fn js_set(
        &self,
        scope: Option<ScopeRef<'_>>,
        value_js: &str,
        value_deps: &DepSet,
        quote: Quote,
    ) -> CompileResult<String> {
        match self {
            Expr::Var(name) => {
                let scope = scope.ok_or_else(|| {
                    CompileError::scope(format!("cannot set variable `{name}` without a scope"))
                })?;
                let cell = scope.resolve(name).ok_or_else(|| {
                    CompileError::scope(format!("no reactive variable named `{name}` was found"))
                })?;
                Ok(scope.tree.cell_js_set(cell, value_js, value_deps, Option::None))
            }
            Expr::NativeVar(name) => Ok(format!("{name}={value_js};")),
            Expr::Property { root, .. } => {
                let (path_js, _) = self.eval_script(scope, quote)?;
                let notify = root.js_notify(scope)?;
                Ok(format!("{path_js} = {value_js}; {notify}"))
            }
            other => Err(CompileError::scope(format!(
                "expression `{other}` is not settable"
            ))),
        }
    }

    /// Emit the change-notification statement for this expression.
    pub fn js_notify(&self, scope: Option<ScopeRef<'_>>) -> CompileResult<String> {
        match self {
            Expr::Var(name) => {
                let scope = scope.ok_or_else(|| {
                    CompileError::scope(format!(
                        "cannot notify variable `{name}` without a scope"
                    ))
                })?;
                let cell = scope.resolve(name).ok_or_else(|| {
                    CompileError::scope(format!("no reactive variable named `{name}` was found"))
                })?;
                Ok(scope.tree.cell_js_notify(cell, Option::None))
            }
            Expr::NativeVar(_) => Ok(String::new()),
            Expr::Property { root, .. } => root.js_notify(scope),
            other => Err(CompileError::scope(format!(
                "expression `{other}` is not settable"
            ))),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Str(s) => f.write_str(&js_string(s, Quote::Single)),
            Expr::Int(n) => write!(f, "{n}"),
            Expr::Float(v) => f.write_str(&float_js(*v)),
            Expr::Bool(true) => f.write_str("True"),
            Expr::Bool(false) => f.write_str("False"),
            Expr::None => f.write_str("None"),
            Expr::Array(items) => {
                let parts: Vec<String> = items.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Expr::Dict(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(key, val)| format!("{key}:{val}"))
                    .collect();
                write!(f, "{{{}}}", parts.join(","))
            }
            Expr::Var(name) | Expr::NativeVar(name) => f.write_str(name),
            Expr::Property { root, path } => write!(f, "({root}).{}", path.join(".")),
            Expr::Ternary {
                condition,
                if_true,
                if_false,
            } => write!(f, "({condition}?{if_true}:{if_false})"),
            Expr::Unary { symbol, arg, .. } => write!(f, "{symbol}{arg}"),
            Expr::Binary { symbol, args, .. } => {
                let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                f.write_str(&parts.join(symbol))
            }
            Expr::Call { name, args, .. } => {
                let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{name}({})", parts.join(","))
            }
            Expr::CellRef(id) => write!(f, "<cell {}>", id.index()),
            Expr::Escaped { inner, delimiter } => write!(f, "Escaping-{delimiter}({inner})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeTree;
    use pretty_assertions::assert_eq;

    fn bindings(pairs: &[(&str, Value)]) -> Bindings {
        let mut b = Bindings::new();
        for (name, value) in pairs {
            b.insert(*name, value.clone());
        }
        b
    }

    #[test]
    fn test_literals_script() {
        let cases = [
            (Expr::Str("a'b".into()), "'a\\'b'"),
            (Expr::Int(-3), "-3"),
            (Expr::Bool(true), "true"),
            (Expr::None, "null"),
            (Expr::Float(2.0), "2.0"),
        ];
        for (expr, expected) in cases {
            let (js, deps) = expr.eval_script(None, Quote::Single).unwrap();
            assert_eq!(js, expected);
            assert!(deps.is_empty());
        }
    }

    #[test]
    fn test_var_resolution_and_deps() {
        let mut tree = ScopeTree::new();
        let root = tree.new_scope("block", None);
        let cell = tree.add_cell(root, "count", Some(Expr::Int(7))).unwrap();

        let expr = Expr::Var("count".into());
        assert_eq!(
            expr.eval_initial(Some(tree.at(root))).unwrap(),
            Value::Int(7)
        );
        let (js, deps) = expr.eval_script(Some(tree.at(root)), Quote::Single).unwrap();
        assert_eq!(js, "(count_block_0.val)");
        assert_eq!(deps.len(), 1);
        assert!(deps.contains(&cell));
    }

    #[test]
    fn test_unresolved_var_is_empty_string() {
        let mut tree = ScopeTree::new();
        let root = tree.new_scope("block", None);
        let expr = Expr::Var("missing".into());
        assert_eq!(
            expr.eval_initial(Some(tree.at(root))).unwrap(),
            Value::Str(String::new())
        );
        let (js, deps) = expr.eval_script(Some(tree.at(root)), Quote::Single).unwrap();
        assert_eq!(js, "''");
        assert!(deps.is_empty());
    }

    #[test]
    fn test_property_lookup_and_error() {
        let mut entries = IndexMap::new();
        entries.insert("name".into(), Value::Str("Ada".into()));
        let b = bindings(&[("user", Value::Dict(entries))]);

        let expr = Expr::Property {
            root: Box::new(Expr::Var("user".into())),
            path: vec!["name".into()],
        }
        .reduce(&b);
        assert_eq!(expr.eval_initial(None).unwrap(), Value::Str("Ada".into()));

        let bad = Expr::Property {
            root: Box::new(Expr::Var("user".into())),
            path: vec!["age".into()],
        }
        .reduce(&b);
        let err = bad.eval_initial(None).unwrap_err();
        assert!(matches!(err, CompileError::Resolution { key, .. } if key == "age"));
    }

    #[test]
    fn test_property_script_shape() {
        let mut tree = ScopeTree::new();
        let root = tree.new_scope("block", None);
        tree.add_cell(root, "user", Some(Expr::None)).unwrap();
        let expr = Expr::Property {
            root: Box::new(Expr::Var("user".into())),
            path: vec!["name".into(), "first".into()],
        };
        let (js, _) = expr.eval_script(Some(tree.at(root)), Quote::Single).unwrap();
        assert_eq!(js, "((user_block_0.val)).name.first");
    }

    #[test]
    fn test_ternary_folds_constant_condition() {
        let expr = Expr::Ternary {
            condition: Box::new(Expr::Bool(false)),
            if_true: Box::new(Expr::Var("a".into())),
            if_false: Box::new(Expr::Int(2)),
        };
        let (js, deps) = expr.eval_script(None, Quote::Single).unwrap();
        assert_eq!(js, "2");
        assert!(deps.is_empty());
        assert!(!expr.constant());
    }

    #[test]
    fn test_ternary_script_shape() {
        let mut tree = ScopeTree::new();
        let root = tree.new_scope("block", None);
        tree.add_cell(root, "flag", Some(Expr::Bool(true))).unwrap();
        let expr = Expr::Ternary {
            condition: Box::new(Expr::Var("flag".into())),
            if_true: Box::new(Expr::Int(1)),
            if_false: Box::new(Expr::Int(2)),
        };
        let (js, deps) = expr.eval_script(Some(tree.at(root)), Quote::Single).unwrap();
        assert_eq!(js, "((flag_block_0.val)?1:2)");
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn test_binary_constant_run_folding() {
        let mut tree = ScopeTree::new();
        let root = tree.new_scope("block", None);
        tree.add_cell(root, "n", Some(Expr::Int(5))).unwrap();

        // 1 + 2 + n + 3 -> 3 + n + 3 (only adjacent constants fold)
        let expr = Expr::sum(vec![
            Expr::Int(1),
            Expr::Int(2),
            Expr::Var("n".into()),
            Expr::Int(3),
        ]);
        let (js, deps) = expr.eval_script(Some(tree.at(root)), Quote::Single).unwrap();
        assert_eq!(js, "3+(n_block_0.val)+3");
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn test_fully_constant_binary_collapses() {
        let expr = Expr::sum(vec![Expr::Int(1), Expr::Str("a".into())]);
        let (js, deps) = expr.eval_script(None, Quote::Single).unwrap();
        assert_eq!(js, "'1a'");
        assert!(deps.is_empty());
    }

    #[test]
    fn test_dict_switches_to_iife_with_cell_members() {
        let mut tree = ScopeTree::new();
        let root = tree.new_scope("block", None);
        let cell = tree.add_cell(root, "x", Some(Expr::Int(1))).unwrap();

        let mut plain = IndexMap::new();
        plain.insert("a".into(), Expr::Int(1));
        let (js, _) = Expr::Dict(plain)
            .eval_script(Some(tree.at(root)), Quote::Single)
            .unwrap();
        assert_eq!(js, "{a:1}");

        let mut with_cell = IndexMap::new();
        with_cell.insert("x_block_0".into(), Expr::CellRef(cell));
        let (js, _) = Expr::Dict(with_cell)
            .eval_script(Some(tree.at(root)), Quote::Single)
            .unwrap();
        assert_eq!(
            js,
            "( () => {\nconst x_block_0=__reactive_data(1,__reactive_empty_array,undefined);\n\
             return {x_block_0:x_block_0};\n} )()"
        );
    }

    #[test]
    fn test_escaped_container() {
        let mut tree = ScopeTree::new();
        let root = tree.new_scope("block", None);
        tree.add_cell(root, "title", Some(Expr::Str("say \"hi\"".into())))
            .unwrap();
        let expr = Expr::Escaped {
            inner: Box::new(Expr::Var("title".into())),
            delimiter: '"',
        };
        assert_eq!(
            expr.eval_initial(Some(tree.at(root))).unwrap(),
            Value::Str("say \\\"hi\\\"".into())
        );
        let (js, _) = expr.eval_script(Some(tree.at(root)), Quote::Single).unwrap();
        assert_eq!(
            js,
            "((title_block_0.val)).toString().replace(/\"/g, '\"')"
        );
    }

    #[test]
    fn test_html_output_shapes() {
        assert_eq!(
            Expr::Int(3).eval_script_html(None, Quote::Single).unwrap().0,
            "'3'"
        );
        assert_eq!(
            Expr::Bool(false)
                .eval_script_html(None, Quote::Single)
                .unwrap()
                .0,
            "'False'"
        );
        assert_eq!(
            Expr::None.eval_script_html(None, Quote::Single).unwrap().0,
            "'None'"
        );
        assert_eq!(
            Expr::Str("x".into())
                .eval_script_html(None, Quote::Single)
                .unwrap()
                .0,
            "'x'"
        );
        assert_eq!(
            Expr::Array(vec![])
                .eval_script_html(None, Quote::Single)
                .unwrap()
                .0,
            "__reactive_print_html([])"
        );
    }

    #[test]
    fn test_js_set_and_notify() {
        let mut tree = ScopeTree::new();
        let root = tree.new_scope("block", None);
        tree.add_cell(root, "count", Some(Expr::Int(0))).unwrap();

        let var = Expr::Var("count".into());
        assert_eq!(
            var.js_set(Some(tree.at(root)), "3", &DepSet::default(), Quote::Single)
                .unwrap(),
            "__reactive_data_set(count_block_0,3,__reactive_empty_array,undefined);"
        );
        assert_eq!(
            var.js_notify(Some(tree.at(root))).unwrap(),
            "__reactive_data_notify(count_block_0);"
        );

        let native = Expr::NativeVar("i".into());
        assert_eq!(
            native
                .js_set(Some(tree.at(root)), "i+1", &DepSet::default(), Quote::Single)
                .unwrap(),
            "i=i+1;"
        );
        assert_eq!(native.js_notify(Some(tree.at(root))).unwrap(), "");

        let prop = Expr::Property {
            root: Box::new(Expr::Var("count".into())),
            path: vec!["x".into()],
        };
        assert_eq!(
            prop.js_set(Some(tree.at(root)), "1", &DepSet::default(), Quote::Single)
                .unwrap(),
            "((count_block_0.val)).x = 1; __reactive_data_notify(count_block_0);"
        );

        assert!(Expr::Int(1)
            .js_set(Some(tree.at(root)), "1", &DepSet::default(), Quote::Single)
            .is_err());
    }

    #[test]
    fn test_reduce_substitutes_bindings() {
        let b = bindings(&[("name", Value::Str("Ada".into()))]);
        let expr = Expr::sum(vec![
            Expr::Var("name".into()),
            Expr::Str("!".into()),
        ]);
        let reduced = expr.reduce(&b);
        assert_eq!(
            reduced,
            Expr::sum(vec![Expr::Str("Ada".into()), Expr::Str("!".into())])
        );
        assert_eq!(
            reduced.eval_initial(None).unwrap(),
            Value::Str("Ada!".into())
        );
    }

    #[test]
    fn test_reduce_is_idempotent() {
        let b = bindings(&[("name", Value::Str("Ada".into()))]);
        // `name` is bound, `flag` and `suffix` stay free.
        let expr = Expr::Ternary {
            condition: Box::new(Expr::Var("flag".into())),
            if_true: Box::new(Expr::sum(vec![
                Expr::Var("name".into()),
                Expr::Var("suffix".into()),
            ])),
            if_false: Box::new(Expr::Property {
                root: Box::new(Expr::Var("name".into())),
                path: vec!["length".into()],
            }),
        };
        let once = expr.reduce(&b);
        assert_eq!(once.reduce(&b), once);
    }
}
