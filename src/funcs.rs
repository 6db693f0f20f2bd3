//! Function table and builtin template functions

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A function callable from templates. Errors are plain messages; the
/// executor attaches the template name.
pub type Function = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Functions supplied by the caller, consulted before the builtins.
#[derive(Clone, Default)]
pub struct FuncMap {
    functions: HashMap<String, Function>,
}

impl FuncMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    /// Builder-style [`FuncMap::insert`].
    pub fn with<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.insert(name, function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// True if `name` resolves to a user function or a builtin.
    pub fn is_defined(&self, name: &str) -> bool {
        self.functions.contains_key(name) || is_builtin(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for FuncMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FuncMap").field("functions", &names).finish()
    }
}

pub const BUILTINS: &[&str] = &[
    "and", "or", "not", "eq", "ne", "lt", "le", "gt", "ge", "len", "index", "print", "println",
    "html", "js", "urlquery", "safe",
];

/// Builtins whose result is written to the page without further escaping.
pub const TRUSTED_OUTPUT: &[&str] = &["html", "js", "urlquery", "safe"];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Call a builtin, `None` if no builtin has that name.
pub fn call_builtin(name: &str, args: &[Value]) -> Option<Result<Value, String>> {
    let result = match name {
        "and" => at_least(name, args, 1).map(|_| {
            args.iter()
                .find(|v| !is_true(v))
                .unwrap_or(&args[args.len() - 1])
                .clone()
        }),
        "or" => at_least(name, args, 1).map(|_| {
            args.iter()
                .find(|v| is_true(v))
                .unwrap_or(&args[args.len() - 1])
                .clone()
        }),
        "not" => exactly(name, args, 1).map(|_| Value::Bool(!is_true(&args[0]))),
        "eq" => at_least(name, args, 2)
            .map(|_| Value::Bool(args[1..].iter().any(|other| values_equal(&args[0], other)))),
        "ne" => exactly(name, args, 2).map(|_| Value::Bool(!values_equal(&args[0], &args[1]))),
        "lt" => compare(name, args).map(|o| Value::Bool(o == Ordering::Less)),
        "le" => compare(name, args).map(|o| Value::Bool(o != Ordering::Greater)),
        "gt" => compare(name, args).map(|o| Value::Bool(o == Ordering::Greater)),
        "ge" => compare(name, args).map(|o| Value::Bool(o != Ordering::Less)),
        "len" => exactly(name, args, 1).and_then(|_| length(&args[0])),
        "index" => at_least(name, args, 1).and_then(|_| index(&args[0], &args[1..])),
        "print" => Ok(Value::String(sprint(args))),
        "println" => Ok(Value::String(sprintln(args))),
        "html" => Ok(Value::String(html_escape(&sprint(args)))),
        "js" => Ok(Value::String(js_escape(&sprint(args)))),
        "urlquery" => Ok(Value::String(urlencoding::encode(&sprint(args)).into_owned())),
        "safe" => Ok(Value::String(sprint(args))),
        _ => return None,
    };
    Some(result)
}

/// Truthiness: false, zero, null and empty values are false.
pub fn is_true(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Format a value for output. Null prints as `<no value>`.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "<no value>".to_string(),
        other => format_nested(other),
    }
}

/// Format a value for insertion into markup: HTML-escaped, with a missing
/// value printing nothing.
pub fn escape_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => html_escape(&format_nested(other)),
    }
}

fn format_nested(value: &Value) -> String {
    match value {
        Value::Null => "<nil>".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(format_nested).collect();
            format!("[{}]", parts.join(" "))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}:{}", k, format_nested(v)))
                .collect();
            format!("map[{}]", parts.join(" "))
        }
    }
}

/// Operands are joined with a space when neither side is a string.
pub fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !arg.is_string() && !args[i - 1].is_string() {
            out.push(' ');
        }
        out.push_str(&format_nested(arg));
    }
    out
}

pub fn sprintln(args: &[Value]) -> String {
    let parts: Vec<String> = args.iter().map(format_nested).collect();
    format!("{}\n", parts.join(" "))
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

fn compare(name: &str, args: &[Value]) -> Result<Ordering, String> {
    exactly(name, args, 2)?;
    match (&args[0], &args[1]) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return Ok(x.cmp(&y));
            }
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y)
                .ok_or_else(|| format!("{}: cannot compare {} and {}", name, x, y))
        }
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (x, y) => Err(format!(
            "{}: incompatible types for comparison: {} and {}",
            name,
            type_name(x),
            type_name(y)
        )),
    }
}

fn length(value: &Value) -> Result<Value, String> {
    let len = match value {
        Value::String(s) => s.len(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => return Err(format!("len of type {}", type_name(other))),
    };
    Ok(Value::from(len))
}

fn index(item: &Value, keys: &[Value]) -> Result<Value, String> {
    let mut current = item.clone();
    for key in keys {
        current = match (&current, key) {
            (Value::Array(items), Value::Number(n)) => {
                let i = n
                    .as_u64()
                    .ok_or_else(|| format!("cannot index array with {}", n))?;
                items
                    .get(i as usize)
                    .cloned()
                    .ok_or_else(|| format!("index out of range: {}", i))?
            }
            (Value::Object(map), Value::String(k)) => map.get(k).cloned().unwrap_or(Value::Null),
            (container, key) => {
                return Err(format!(
                    "cannot index {} with {}",
                    type_name(container),
                    type_name(key)
                ))
            }
        };
    }
    Ok(current)
}

pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            '\0' => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
    out
}

pub fn js_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '&' => out.push_str("\\u0026"),
            '=' => out.push_str("\\u003D"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

fn exactly(name: &str, args: &[Value], count: usize) -> Result<(), String> {
    if args.len() == count {
        Ok(())
    } else {
        Err(format!("wrong number of args for {}: want {} got {}", name, count, args.len()))
    }
}

fn at_least(name: &str, args: &[Value], count: usize) -> Result<(), String> {
    if args.len() >= count {
        Ok(())
    } else {
        Err(format!("wrong number of args for {}: want at least {} got {}", name, count, args.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: &[Value]) -> Value {
        call_builtin(name, args).unwrap().unwrap()
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_true(&json!(null)));
        assert!(!is_true(&json!(0)));
        assert!(!is_true(&json!("")));
        assert!(!is_true(&json!([])));
        assert!(!is_true(&json!({})));
        assert!(is_true(&json!(0.5)));
        assert!(is_true(&json!({"a": 1})));
    }

    #[test]
    fn test_logic_returns_operands() {
        assert_eq!(call("and", &[json!(1), json!(""), json!(2)]), json!(""));
        assert_eq!(call("and", &[json!(1), json!(2)]), json!(2));
        assert_eq!(call("or", &[json!(0), json!("x")]), json!("x"));
        assert_eq!(call("not", &[json!(0)]), json!(true));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(call("eq", &[json!(1), json!(1.0)]), json!(true));
        assert_eq!(call("eq", &[json!("a"), json!("b"), json!("a")]), json!(true));
        assert_eq!(call("ne", &[json!("a"), json!("b")]), json!(true));
        assert_eq!(call("lt", &[json!(1), json!(2)]), json!(true));
        assert_eq!(call("ge", &[json!("b"), json!("a")]), json!(true));
        assert!(call_builtin("lt", &[json!(1), json!("a")]).unwrap().is_err());
    }

    #[test]
    fn test_len_and_index() {
        assert_eq!(call("len", &[json!([1, 2, 3])]), json!(3));
        assert_eq!(call("index", &[json!({"a": [10, 20]}), json!("a"), json!(1)]), json!(20));
        assert_eq!(call("index", &[json!({"a": 1}), json!("missing")]), json!(null));
        assert!(call_builtin("index", &[json!([1]), json!(5)]).unwrap().is_err());
        assert!(call_builtin("len", &[json!(3)]).unwrap().is_err());
    }

    #[test]
    fn test_print_spacing() {
        assert_eq!(call("print", &[json!("a"), json!(1), json!(2), json!("b")]), json!("a1 2b"));
        assert_eq!(call("println", &[json!("a"), json!(1)]), json!("a 1\n"));
    }

    #[test]
    fn test_escapers() {
        assert_eq!(call("html", &[json!("<a href=\"x\">&</a>")]), json!("&lt;a href=&#34;x&#34;&gt;&amp;&lt;/a&gt;"));
        assert_eq!(call("js", &[json!("it's <b>")]), json!("it\\'s \\u003Cb\\u003E"));
        assert_eq!(call("urlquery", &[json!("a b&c")]), json!("a%20b%26c"));
        assert_eq!(call("safe", &[json!("<b>"), json!(1)]), json!("<b>1"));
    }

    #[test]
    fn test_escape_value() {
        assert_eq!(escape_value(&json!("<b>")), "&lt;b&gt;");
        assert_eq!(escape_value(&json!(null)), "");
        assert_eq!(escape_value(&json!(["a&b", null])), "[a&amp;b &lt;nil&gt;]");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&json!(null)), "<no value>");
        assert_eq!(format_value(&json!([1, null, "x"])), "[1 <nil> x]");
        assert_eq!(format_value(&json!({"b": 2, "a": true})), "map[a:true b:2]");
    }

    #[test]
    fn test_func_map_overrides_and_lookup() {
        let funcs = FuncMap::new().with("upper", |args: &[Value]| {
            Ok(Value::String(sprint(args).to_uppercase()))
        });
        assert!(funcs.is_defined("upper"));
        assert!(funcs.is_defined("len"));
        assert!(!funcs.is_defined("missing"));
        let upper = funcs.get("upper").unwrap();
        assert_eq!(upper(&[json!("abc")]).unwrap(), json!("ABC"));
    }
}
