//! Expression parsing.
//!
//! The surface grammar is eliminated form by form: parenthesis unwrap,
//! ternary, literals, containers, variables, unary, binary (in registry
//! order, so `>=` wins over `>`), property paths, and finally function
//! calls. Splitting is delimiter-aware: separators inside strings,
//! parentheses, brackets or braces don't count.

use smol_str::SmolStr;

use crate::error::{CompileError, CompileResult};
use crate::expr::Expr;
use crate::functions::lookup_function;
use crate::ops::{unary_operator, BINARY_OPERATORS};

/// Scan a string literal starting at byte `start` (which must hold a
/// quote). Returns the byte index just past the closing quote.
fn scan_string(input: &str, start: usize) -> CompileResult<usize> {
    let bytes = input.as_bytes();
    let delim = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                let next = bytes.get(i + 1).copied();
                match next {
                    Some(b'\\') | Some(b'n') | Some(b't') => i += 2,
                    Some(c) if c == delim => i += 2,
                    _ => {
                        return Err(CompileError::syntax(format!(
                            "invalid escape sequence in string literal: ({input})"
                        )))
                    }
                }
            }
            c if c == delim => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(CompileError::syntax(format!(
        "unterminated string literal: ({input})"
    )))
}

/// Parse a complete string literal (delimiters included) into its
/// unescaped content. `None` when the input is not exactly one literal.
pub fn parse_string_literal(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let delim = bytes[0];
    if delim != b'\'' && delim != b'"' {
        return None;
    }
    if scan_string(input, 0) != Ok(bytes.len()) {
        return None;
    }
    let mut out = String::with_capacity(bytes.len() - 2);
    let mut i = 1;
    while i < bytes.len() - 1 {
        if bytes[i] == b'\\' {
            match bytes[i + 1] {
                b'\\' => out.push('\\'),
                b'n' => out.push('\n'),
                b't' => out.push('\t'),
                c => out.push(c as char),
            }
            i += 2;
        } else {
            // Multi-byte characters pass through untouched.
            let ch_len = input[i..].chars().next().map(char::len_utf8).unwrap_or(1);
            out.push_str(&input[i..i + ch_len]);
            i += ch_len;
        }
    }
    Some(out)
}

/// Split `input` on top-level occurrences of any separator, trying
/// separators in the given order at each position. Delimited regions
/// (strings and bracket pairs) are opaque.
pub fn smart_split<'a>(
    input: &'a str,
    separators: &[&str],
    skip_blank: bool,
) -> CompileResult<Vec<&'a str>> {
    let bytes = input.as_bytes();
    let mut stack: Vec<u8> = Vec::new();
    let mut parts: Vec<&str> = Vec::new();
    let mut seg_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if stack.is_empty() {
            if let Some(sep) = separators.iter().find(|sep| input[i..].starts_with(**sep)) {
                parts.push(&input[seg_start..i]);
                i += sep.len();
                seg_start = i;
                continue;
            }
        }
        match bytes[i] {
            b'(' => stack.push(b')'),
            b'[' => stack.push(b']'),
            b'{' => stack.push(b'}'),
            b')' | b']' | b'}' => {
                if stack.last() == Some(&bytes[i]) {
                    stack.pop();
                } else {
                    return Err(CompileError::syntax(format!(
                        "unbalanced `{}` in expression: ({input})",
                        bytes[i] as char
                    )));
                }
            }
            b'\'' | b'"' => {
                i = scan_string(input, i)?;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    if !stack.is_empty() {
        return Err(CompileError::syntax(format!(
            "missing closing `{}` in expression: ({input})",
            stack[stack.len() - 1] as char
        )));
    }
    parts.push(&input[seg_start..]);
    if skip_blank {
        parts.retain(|part| !part.trim().is_empty());
    }
    Ok(parts)
}

/// If `input` starts with a bracket, the byte index of its matching
/// closer.
fn matching_close(input: &str) -> CompileResult<Option<usize>> {
    let bytes = input.as_bytes();
    let close = match bytes.first() {
        Some(b'(') => b')',
        Some(b'[') => b']',
        Some(b'{') => b'}',
        _ => return Ok(None),
    };
    let mut stack: Vec<u8> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => stack.push(b')'),
            b'[' => stack.push(b']'),
            b'{' => stack.push(b'}'),
            b')' | b']' | b'}' => {
                if stack.last() == Some(&bytes[i]) {
                    stack.pop();
                    if stack.is_empty() {
                        return if bytes[i] == close {
                            Ok(Some(i))
                        } else {
                            Err(CompileError::syntax(format!(
                                "mismatched brackets in expression: ({input})"
                            )))
                        };
                    }
                } else {
                    return Err(CompileError::syntax(format!(
                        "unbalanced `{}` in expression: ({input})",
                        bytes[i] as char
                    )));
                }
            }
            b'\'' | b'"' => {
                i = scan_string(input, i)?;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    Err(CompileError::syntax(format!(
        "missing closing `{}` in expression: ({input})",
        close as char
    )))
}

/// First top-level occurrence of `needle` outside any delimited region.
fn top_level_find(input: &str, needle: u8) -> CompileResult<Option<usize>> {
    let bytes = input.as_bytes();
    let mut stack: Vec<u8> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if stack.is_empty() && bytes[i] == needle {
            return Ok(Some(i));
        }
        match bytes[i] {
            b'(' => stack.push(b')'),
            b'[' => stack.push(b']'),
            b'{' => stack.push(b'}'),
            b')' | b']' | b'}' => {
                if stack.last() == Some(&bytes[i]) {
                    stack.pop();
                }
            }
            b'\'' | b'"' => {
                i = scan_string(input, i)?;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    Ok(None)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_float_literal(s: &str) -> bool {
    let Some((whole, frac)) = s.split_once('.') else {
        return false;
    };
    !whole.is_empty()
        && !frac.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
}

fn try_parse_ternary(input: &str) -> CompileResult<Option<Expr>> {
    let question_parts = smart_split(input, &["?"], false)?;
    match question_parts.len() {
        1 => Ok(None),
        2 => {
            let colon_parts = smart_split(question_parts[1], &[":"], false)?;
            match colon_parts.len() {
                1 => Err(CompileError::syntax(format!(
                    "found `?` but no `:` in ternary expression: ({input})"
                ))),
                2 => Ok(Some(Expr::Ternary {
                    condition: Box::new(parse_expression(question_parts[0])?),
                    if_true: Box::new(parse_expression(colon_parts[0])?),
                    if_false: Box::new(parse_expression(colon_parts[1])?),
                })),
                _ => Err(CompileError::syntax(format!(
                    "too many `:` after `?` in ternary expression: ({input})"
                ))),
            }
        }
        _ => Err(CompileError::syntax(format!(
            "too many `?` in ternary expression: ({input})"
        ))),
    }
}

fn try_parse_dict(input: &str) -> Option<Expr> {
    let inner = &input[1..input.len() - 1];
    let parts = smart_split(inner, &[","], false).ok()?;
    let mut entries = indexmap::IndexMap::new();
    for part in parts {
        let colon = top_level_find(part, b':').ok()??;
        let raw_key = part[..colon].trim();
        let key: SmolStr = match parse_string_literal(raw_key) {
            Some(s) => s.into(),
            None => raw_key.into(),
        };
        let value = parse_expression(&part[colon + 1..]).ok()?;
        entries.insert(key, value);
    }
    Some(Expr::Dict(entries))
}

fn try_parse_binary(input: &str) -> CompileResult<Option<Expr>> {
    for (symbol, op) in BINARY_OPERATORS.iter().copied() {
        let parts = smart_split(input, &[symbol], false)?;
        if parts.len() < 2 {
            continue;
        }
        op.validate_arity(symbol, parts.len())?;
        let mut args = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            if part.trim().is_empty() {
                return Err(CompileError::syntax(format!(
                    "argument {i} of operator `{symbol}` is empty: ({input})"
                )));
            }
            args.push(parse_expression(part)?);
        }
        return Ok(Some(Expr::Binary { symbol, op, args }));
    }
    Ok(None)
}

fn try_parse_property(input: &str) -> CompileResult<Option<Expr>> {
    let parts = smart_split(input, &["."], false)?;
    if parts.len() < 2 {
        return Ok(None);
    }
    if !parts[1..].iter().all(|part| is_identifier(part)) {
        return Ok(None);
    }
    let Ok(root) = parse_expression(parts[0]) else {
        return Ok(None);
    };
    Ok(Some(Expr::Property {
        root: Box::new(root),
        path: parts[1..].iter().map(|p| SmolStr::new(p)).collect(),
    }))
}

fn try_parse_call(input: &str) -> CompileResult<Option<Expr>> {
    let Some(open) = top_level_find(input, b'(')? else {
        return Ok(None);
    };
    let name = input[..open].trim();
    if !is_identifier(name) || !input.ends_with(')') {
        return Ok(None);
    }
    match matching_close(&input[open..])? {
        Some(close) if open + close == input.len() - 1 => {}
        _ => return Ok(None),
    }
    let func = lookup_function(name).ok_or_else(|| {
        CompileError::syntax(format!(
            "the reactive function `{name}` doesn't exist: ({input})"
        ))
    })?;
    let inner = &input[open + 1..input.len() - 1];
    let mut args = Vec::new();
    if !inner.trim().is_empty() {
        for part in smart_split(inner, &[","], false)? {
            args.push(parse_expression(part)?);
        }
    }
    func.validate_arity(args.len())?;
    Ok(Some(Expr::Call {
        name: SmolStr::new(name),
        func,
        args,
    }))
}

/// Parse an expression from template source text.
pub fn parse_expression(input: &str) -> CompileResult<Expr> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CompileError::syntax("cannot parse an empty expression"));
    }

    if input.starts_with('(') {
        if let Some(close) = matching_close(input)? {
            if close == input.len() - 1 {
                return parse_expression(&input[1..close]);
            }
        }
    }

    if let Some(expr) = try_parse_ternary(input)? {
        return Ok(expr);
    }

    if let Some(s) = parse_string_literal(input) {
        return Ok(Expr::Str(s));
    }

    match input {
        "True" | "true" => return Ok(Expr::Bool(true)),
        "False" | "false" => return Ok(Expr::Bool(false)),
        "None" | "null" => return Ok(Expr::None),
        _ => {}
    }

    if input.bytes().all(|b| b.is_ascii_digit()) {
        let n: i64 = input
            .parse()
            .map_err(|_| CompileError::syntax(format!("integer literal too large: ({input})")))?;
        return Ok(Expr::Int(n));
    }

    if is_float_literal(input) {
        let v: f64 = input
            .parse()
            .map_err(|_| CompileError::syntax(format!("invalid float literal: ({input})")))?;
        return Ok(Expr::Float(v));
    }

    if input.starts_with('[') {
        if let Some(close) = matching_close(input)? {
            if close == input.len() - 1 {
                let inner = &input[1..close];
                let mut items = Vec::new();
                if !inner.trim().is_empty() {
                    for part in smart_split(inner, &[","], false)? {
                        items.push(parse_expression(part)?);
                    }
                }
                return Ok(Expr::Array(items));
            }
        }
    }

    if input.starts_with('{') {
        if let Some(close) = matching_close(input)? {
            if close == input.len() - 1 {
                if let Some(expr) = try_parse_dict(input) {
                    return Ok(expr);
                }
            }
        }
    }

    if is_identifier(input) {
        return Ok(Expr::Var(SmolStr::new(input)));
    }

    if let Some(rest) = input.strip_prefix('!') {
        if !rest.starts_with('=') {
            let op = unary_operator("!").ok_or_else(|| {
                CompileError::syntax("the unary operator `!` is not registered")
            })?;
            return Ok(Expr::Unary {
                symbol: "!",
                op,
                arg: Box::new(parse_expression(rest)?),
            });
        }
    }

    if let Some(expr) = try_parse_binary(input)? {
        return Ok(expr);
    }

    if let Some(expr) = try_parse_property(input)? {
        return Ok(expr);
    }

    if let Some(expr) = try_parse_call(input)? {
        return Ok(expr);
    }

    Err(CompileError::syntax(format!(
        "cannot parse expression: ({input})"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_smart_split_respects_delimiters() {
        assert_eq!(
            smart_split("a, [1, 2], 'x, y', f(1, 2)", &[","], false).unwrap(),
            vec!["a", " [1, 2]", " 'x, y'", " f(1, 2)"]
        );
    }

    #[test]
    fn test_smart_split_multichar_separator() {
        assert_eq!(
            smart_split("a >= b", &[">=", ">"], false).unwrap(),
            vec!["a ", " b"]
        );
        assert_eq!(
            smart_split("a > b", &[">=", ">"], false).unwrap(),
            vec!["a ", " b"]
        );
    }

    #[test]
    fn test_smart_split_unbalanced() {
        assert!(smart_split("(a", &[","], false).is_err());
        assert!(smart_split("a)", &[","], false).is_err());
        assert!(smart_split("'a", &[","], false).is_err());
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(parse_string_literal("'it\\'s'"), Some("it's".to_string()));
        assert_eq!(parse_string_literal("\"a'b\""), Some("a'b".to_string()));
        assert_eq!(parse_string_literal("'a\\nb'"), Some("a\nb".to_string()));
        assert_eq!(parse_string_literal("'a' + 'b'"), None);
        assert_eq!(parse_string_literal("x"), None);
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_expression("42").unwrap(), Expr::Int(42));
        assert_eq!(parse_expression("1.5").unwrap(), Expr::Float(1.5));
        assert_eq!(parse_expression("True").unwrap(), Expr::Bool(true));
        assert_eq!(parse_expression("false").unwrap(), Expr::Bool(false));
        assert_eq!(parse_expression("None").unwrap(), Expr::None);
        assert_eq!(
            parse_expression("'hi'").unwrap(),
            Expr::Str("hi".to_string())
        );
    }

    #[test]
    fn test_containers() {
        assert_eq!(
            parse_expression("[1, 'a', [2]]").unwrap(),
            Expr::Array(vec![
                Expr::Int(1),
                Expr::Str("a".into()),
                Expr::Array(vec![Expr::Int(2)]),
            ])
        );
        assert_eq!(parse_expression("[]").unwrap(), Expr::Array(vec![]));

        let parsed = parse_expression("{'key': 'a', value: 1}").unwrap();
        let Expr::Dict(entries) = parsed else {
            panic!("expected a dict");
        };
        assert_eq!(entries.get("key"), Some(&Expr::Str("a".into())));
        assert_eq!(entries.get("value"), Some(&Expr::Int(1)));
    }

    #[test]
    fn test_variable_and_property() {
        assert_eq!(parse_expression("count").unwrap(), Expr::Var("count".into()));
        assert_eq!(
            parse_expression("user.name.first").unwrap(),
            Expr::Property {
                root: Box::new(Expr::Var("user".into())),
                path: vec!["name".into(), "first".into()],
            }
        );
    }

    #[test]
    fn test_ternary() {
        assert_eq!(
            parse_expression("a ? 1 : 2").unwrap(),
            Expr::Ternary {
                condition: Box::new(Expr::Var("a".into())),
                if_true: Box::new(Expr::Int(1)),
                if_false: Box::new(Expr::Int(2)),
            }
        );
        assert!(parse_expression("a ? 1").is_err());
        assert!(parse_expression("a ? b ? 1 : 2 : 3").is_err());
        // A '?' inside a string is not a ternary.
        assert_eq!(
            parse_expression("'a?b'").unwrap(),
            Expr::Str("a?b".to_string())
        );
    }

    #[test]
    fn test_binary_registry_order() {
        let parsed = parse_expression("a >= 2").unwrap();
        let Expr::Binary { symbol, args, .. } = &parsed else {
            panic!("expected a binary expression");
        };
        assert_eq!(*symbol, ">=");
        assert_eq!(args.len(), 2);

        let parsed = parse_expression("a !== b").unwrap();
        let Expr::Binary { symbol, .. } = &parsed else {
            panic!("expected a binary expression");
        };
        assert_eq!(*symbol, "!==");
    }

    #[test]
    fn test_binary_multi_arg() {
        let parsed = parse_expression("a + b + 'c'").unwrap();
        let Expr::Binary { symbol, args, .. } = &parsed else {
            panic!("expected a binary expression");
        };
        assert_eq!(*symbol, "+");
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_relational_takes_exactly_two() {
        assert!(parse_expression("a > b > c").is_err());
        assert!(parse_expression("a + ").is_err());
    }

    #[test]
    fn test_unary() {
        assert_eq!(
            parse_expression("!done").unwrap(),
            Expr::Unary {
                symbol: "!",
                op: unary_operator("!").unwrap(),
                arg: Box::new(Expr::Var("done".into())),
            }
        );
        // `!==` must not be taken as a unary prefix.
        assert!(matches!(
            parse_expression("a!==b").unwrap(),
            Expr::Binary { symbol: "!==", .. }
        ));
    }

    #[test]
    fn test_function_calls() {
        let parsed = parse_expression("len(items)").unwrap();
        let Expr::Call { name, args, .. } = &parsed else {
            panic!("expected a call");
        };
        assert_eq!(name, "len");
        assert_eq!(args.len(), 1);

        // Nested calls.
        let parsed = parse_expression("len(present(items))").unwrap();
        let Expr::Call { name, args, .. } = &parsed else {
            panic!("expected a call");
        };
        assert_eq!(name, "len");
        assert!(matches!(&args[0], Expr::Call { name, .. } if name == "present"));

        assert!(parse_expression("nosuch(1)").is_err());
        assert!(parse_expression("len(a, b)").is_err());
    }

    #[test]
    fn test_parenthesis_unwrap() {
        assert_eq!(parse_expression("(42)").unwrap(), Expr::Int(42));
        assert_eq!(
            parse_expression("((a))").unwrap(),
            Expr::Var("a".into())
        );
        // Adjacent groups are not one wrapped expression.
        let parsed = parse_expression("(a) + (b)").unwrap();
        assert!(matches!(parsed, Expr::Binary { symbol: "+", .. }));
    }

    #[test]
    fn test_mixed_precedence_by_elimination_order() {
        // `?:` splits before `&&`, `&&` before comparison.
        let parsed = parse_expression("a && b === c").unwrap();
        let Expr::Binary { symbol, args, .. } = &parsed else {
            panic!("expected a binary expression");
        };
        assert_eq!(*symbol, "&&");
        assert!(matches!(&args[1], Expr::Binary { symbol: "===", .. }));
    }

    #[test]
    fn test_property_of_call() {
        let parsed = parse_expression("matchKeyVal(k, table).label").unwrap();
        let Expr::Property { root, path } = &parsed else {
            panic!("expected a property");
        };
        assert_eq!(path.len(), 1);
        assert!(matches!(&**root, Expr::Call { name, .. } if name == "matchKeyVal"));
    }

    #[test]
    fn test_unparsable() {
        let err = parse_expression("@@").unwrap_err();
        assert!(matches!(err, CompileError::Syntax(_)));
        assert!(parse_expression("").is_err());
    }
}
