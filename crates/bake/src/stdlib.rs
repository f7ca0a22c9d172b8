//! built-in functions
//!
//! Every function has a fixed or ranged arity which is checked before it runs. Arguments are
//! already evaluated. Type errors are reported as [ErrorKind::TypeMismatch] and prefixed with the
//! function name by the caller.
use crate::context::Context;
use crate::error::ErrorKind;
use crate::eval::arithmetic;
use crate::value::Value;
use hcl::expr::BinaryOperator;
use indexmap::IndexMap;

type Func = fn(&Context, Vec<Value>) -> Result<Value, ErrorKind>;

pub(crate) struct Builtin {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic functions
    pub max_args: Option<usize>,
    pub func: Func,
}

impl Builtin {
    pub fn check_arity(&self, count: usize) -> Result<(), ErrorKind> {
        let expected = match self.max_args {
            Some(max) if max == self.min_args => format!("{max}"),
            Some(max) => format!("{} to {max}", self.min_args),
            None => format!("at least {}", self.min_args),
        };

        if count < self.min_args || self.max_args.is_some_and(|max| count > max) {
            return Err(ErrorKind::Arity(format!(
                "{}() takes {expected} argument(s), got {count}",
                self.name
            )));
        }
        Ok(())
    }
}

const fn builtin(
    name: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    func: Func,
) -> Builtin {
    Builtin {
        name,
        min_args,
        max_args,
        func,
    }
}

static BUILTINS: &[Builtin] = &[
    // strings
    builtin("upper", 1, Some(1), |_, args| map_string(args, |s| s.to_uppercase())),
    builtin("lower", 1, Some(1), |_, args| map_string(args, |s| s.to_lowercase())),
    builtin("title", 1, Some(1), |_, args| map_string(args, title)),
    builtin("trimspace", 1, Some(1), |_, args| map_string(args, |s| s.trim().to_string())),
    builtin("trim", 2, Some(2), trim),
    builtin("trimprefix", 2, Some(2), trimprefix),
    builtin("trimsuffix", 2, Some(2), trimsuffix),
    builtin("replace", 3, Some(3), replace),
    builtin("split", 2, Some(2), split),
    builtin("join", 2, None, join),
    builtin("format", 1, None, format),
    builtin("substr", 3, Some(3), substr),
    builtin("strlen", 1, Some(1), |_, args| {
        Ok(Value::Integer(string(&args[0])?.chars().count() as i64))
    }),
    builtin("sanitize", 1, Some(1), |_, args| map_string(args, sanitize)),
    // numbers
    builtin("add", 2, Some(2), |_, args| {
        arithmetic(BinaryOperator::Plus, &args[0], &args[1])
    }),
    builtin("subtract", 2, Some(2), |_, args| {
        arithmetic(BinaryOperator::Minus, &args[0], &args[1])
    }),
    builtin("multiply", 2, Some(2), |_, args| {
        arithmetic(BinaryOperator::Mul, &args[0], &args[1])
    }),
    builtin("divide", 2, Some(2), |_, args| {
        arithmetic(BinaryOperator::Div, &args[0], &args[1])
    }),
    builtin("modulo", 2, Some(2), |_, args| arithmetic(BinaryOperator::Mod, &args[0], &args[1])),
    builtin("abs", 1, Some(1), |_, args| match &args[0] {
        Value::Integer(i) => Ok(Value::Integer(i.saturating_abs())),
        other => Ok(Value::number(other.to_number()?.abs())),
    }),
    builtin("ceil", 1, Some(1), |_, args| Ok(Value::number(args[0].to_number()?.ceil()))),
    builtin("floor", 1, Some(1), |_, args| Ok(Value::number(args[0].to_number()?.floor()))),
    builtin("max", 1, None, |_, args| extremum(args, |a, b| a > b)),
    builtin("min", 1, None, |_, args| extremum(args, |a, b| a < b)),
    builtin("parseint", 2, Some(2), parseint),
    // collections
    builtin("length", 1, Some(1), |_, args| match &args[0] {
        Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
        Value::Array(array) => Ok(Value::Integer(array.len() as i64)),
        Value::Object(object) => Ok(Value::Integer(object.len() as i64)),
        other => Err(mismatch("a string, list or map", other)),
    }),
    builtin("concat", 1, None, |_, args| {
        let mut result = vec![];
        for arg in args {
            result.extend(list(arg)?);
        }
        Ok(Value::Array(result))
    }),
    builtin("contains", 2, Some(2), |_, mut args| {
        let needle = args.pop().unwrap_or(Value::Null);
        Ok(Value::Boolean(list(args.swap_remove(0))?.contains(&needle)))
    }),
    builtin("distinct", 1, Some(1), |_, args| {
        let mut result: Vec<Value> = vec![];
        for element in list(args.into_iter().next().unwrap_or(Value::Null))? {
            if !result.contains(&element) {
                result.push(element);
            }
        }
        Ok(Value::Array(result))
    }),
    builtin("element", 2, Some(2), element),
    builtin("flatten", 1, Some(1), |_, args| {
        let mut result = vec![];
        flatten(list(args.into_iter().next().unwrap_or(Value::Null))?, &mut result);
        Ok(Value::Array(result))
    }),
    builtin("index", 2, Some(2), |_, mut args| {
        let needle = args.pop().unwrap_or(Value::Null);
        list(args.swap_remove(0))?
            .iter()
            .position(|element| *element == needle)
            .map(|position| Value::Integer(position as i64))
            .ok_or_else(|| ErrorKind::TypeMismatch(format!("index(): {needle} is not in the list")))
    }),
    builtin("keys", 1, Some(1), |_, args| {
        let object = map(args.into_iter().next().unwrap_or(Value::Null))?;
        Ok(Value::Array(object.into_keys().map(Value::String).collect()))
    }),
    builtin("values", 1, Some(1), |_, args| {
        let object = map(args.into_iter().next().unwrap_or(Value::Null))?;
        Ok(Value::Array(object.into_values().collect()))
    }),
    builtin("lookup", 2, Some(3), map_lookup),
    builtin("merge", 0, None, |_, args| {
        let mut result = IndexMap::new();
        for arg in args {
            if arg.is_null() {
                continue;
            }
            result.extend(map(arg)?);
        }
        Ok(Value::Object(result))
    }),
    builtin("reverse", 1, Some(1), |_, args| {
        let mut elements = list(args.into_iter().next().unwrap_or(Value::Null))?;
        elements.reverse();
        Ok(Value::Array(elements))
    }),
    builtin("slice", 3, Some(3), slice),
    builtin("coalesce", 1, None, |_, args| {
        args.into_iter()
            .find(|arg| !arg.is_null() && arg.as_str() != Some(""))
            .ok_or_else(|| ErrorKind::TypeMismatch("no non-null, non-empty argument".to_string()))
    }),
    builtin("compact", 1, Some(1), |_, args| {
        let elements = list(args.into_iter().next().unwrap_or(Value::Null))?;
        Ok(Value::Array(
            elements
                .into_iter()
                .filter(|element| !element.is_null() && element.as_str() != Some(""))
                .collect(),
        ))
    }),
    // logic
    builtin("and", 2, Some(2), |_, args| {
        Ok(Value::Boolean(args[0].to_bool()? && args[1].to_bool()?))
    }),
    builtin("or", 2, Some(2), |_, args| {
        Ok(Value::Boolean(args[0].to_bool()? || args[1].to_bool()?))
    }),
    builtin("not", 1, Some(1), |_, args| Ok(Value::Boolean(!args[0].to_bool()?))),
    builtin("equal", 2, Some(2), |_, args| Ok(Value::Boolean(args[0] == args[1]))),
    builtin("notequal", 2, Some(2), |_, args| Ok(Value::Boolean(args[0] != args[1]))),
    // encoding
    builtin("jsonencode", 1, Some(1), |_, args| {
        serde_json::to_string(&args[0])
            .map(Value::String)
            .map_err(|err| ErrorKind::TypeMismatch(err.to_string()))
    }),
    builtin("jsondecode", 1, Some(1), |_, args| {
        serde_json::from_str::<serde_json::Value>(&string(&args[0])?)
            .map(Value::from)
            .map_err(|err| ErrorKind::TypeMismatch(format!("invalid json: {err}")))
    }),
    // build environment
    builtin("gittag", 0, Some(0), |ctx, _| ctx.git_tag().map(Value::String)),
];

pub(crate) fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

fn mismatch(expected: &str, got: &Value) -> ErrorKind {
    ErrorKind::TypeMismatch(format!("{expected} is required, got {}", got.type_name()))
}

fn string(value: &Value) -> Result<String, ErrorKind> {
    value.to_template_string()
}

fn integer(value: &Value) -> Result<i64, ErrorKind> {
    match value {
        Value::Integer(int) => return Ok(*int),
        Value::String(s) => {
            if let Ok(int) = s.trim().parse::<i64>() {
                return Ok(int);
            }
        }
        _ => {}
    }
    let number = value.to_number()?;
    // i64::MAX as f64 rounds up to 2^63, which is out of range
    if number.fract() != 0.0 || number < i64::MIN as f64 || number >= i64::MAX as f64 {
        return Err(ErrorKind::TypeMismatch(format!("an integer is required, got {number}")));
    }
    Ok(number as i64)
}

fn list(value: Value) -> Result<Vec<Value>, ErrorKind> {
    match value {
        Value::Array(elements) => Ok(elements),
        other => Err(mismatch("a list", &other)),
    }
}

fn map(value: Value) -> Result<IndexMap<String, Value>, ErrorKind> {
    match value {
        Value::Object(object) => Ok(object),
        other => Err(mismatch("a map", &other)),
    }
}

fn map_string(args: Vec<Value>, f: impl Fn(&str) -> String) -> Result<Value, ErrorKind> {
    Ok(Value::String(f(&string(&args[0])?)))
}

fn title(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if word_start {
            result.extend(c.to_uppercase());
        } else {
            result.push(c);
        }
        word_start = c.is_whitespace();
    }
    result
}

/// Replace everything outside `[a-zA-Z0-9_-]` by `_`
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}

fn trim(_: &Context, args: Vec<Value>) -> Result<Value, ErrorKind> {
    let cutset = string(&args[1])?;
    Ok(Value::String(
        string(&args[0])?.trim_matches(|c| cutset.contains(c)).to_string(),
    ))
}

fn trimprefix(_: &Context, args: Vec<Value>) -> Result<Value, ErrorKind> {
    let (s, prefix) = (string(&args[0])?, string(&args[1])?);
    Ok(Value::String(s.strip_prefix(&prefix).unwrap_or(&s).to_string()))
}

fn trimsuffix(_: &Context, args: Vec<Value>) -> Result<Value, ErrorKind> {
    let (s, suffix) = (string(&args[0])?, string(&args[1])?);
    Ok(Value::String(s.strip_suffix(&suffix).unwrap_or(&s).to_string()))
}

fn replace(_: &Context, args: Vec<Value>) -> Result<Value, ErrorKind> {
    let (s, search, replacement) = (string(&args[0])?, string(&args[1])?, string(&args[2])?);
    Ok(Value::String(s.replace(&search, &replacement)))
}

fn split(_: &Context, args: Vec<Value>) -> Result<Value, ErrorKind> {
    let (separator, s) = (string(&args[0])?, string(&args[1])?);
    if s.is_empty() {
        return Ok(Value::Array(vec![]));
    }
    Ok(Value::Array(s.split(separator.as_str()).map(Value::from).collect()))
}

fn join(_: &Context, mut args: Vec<Value>) -> Result<Value, ErrorKind> {
    let separator = string(&args.remove(0))?;
    let mut parts = vec![];
    for arg in args {
        for element in list(arg)? {
            parts.push(string(&element)?);
        }
    }
    Ok(Value::String(parts.join(&separator)))
}

fn substr(_: &Context, args: Vec<Value>) -> Result<Value, ErrorKind> {
    let chars: Vec<char> = string(&args[0])?.chars().collect();
    let (offset, length) = (integer(&args[1])?, integer(&args[2])?);
    let len = chars.len() as i64;

    let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) };
    let end = if length < 0 { len } else { start.saturating_add(length).min(len) };
    Ok(Value::String(chars[start as usize..end as usize].iter().collect()))
}

const MAX_FORMAT_PRECISION: usize = 100;

/// `%s` `%v` `%d` `%f` `%.Nf` `%q` `%%`
fn format(_: &Context, mut args: Vec<Value>) -> Result<Value, ErrorKind> {
    let pattern = string(&args.remove(0))?;
    let mut args = args.into_iter();
    let mut next_arg = || {
        args.next()
            .ok_or_else(|| {
                ErrorKind::Arity("format(): not enough arguments for format string".to_string())
            })
    };

    let mut result = String::new();
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }

        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(digit) = chars.next_if(char::is_ascii_digit) {
                digits.push(digit);
            }
            precision = digits.parse::<usize>().ok();
            if precision.is_some_and(|precision| precision > MAX_FORMAT_PRECISION) {
                return Err(ErrorKind::TypeMismatch(format!(
                    "precision .{digits} exceeds {MAX_FORMAT_PRECISION}"
                )));
            }
        }

        match chars.next() {
            Some('%') => result.push('%'),
            Some('s') => result.push_str(&string(&next_arg()?)?),
            Some('v') => result.push_str(&next_arg()?.to_string()),
            Some('d') => result.push_str(&integer(&next_arg()?)?.to_string()),
            Some('f') => {
                let number = next_arg()?.to_number()?;
                result.push_str(&format!("{number:.prec$}", prec = precision.unwrap_or(6)));
            }
            Some('q') => {
                let quoted = serde_json::to_string(&string(&next_arg()?)?)
                    .map_err(|err| ErrorKind::TypeMismatch(err.to_string()))?;
                result.push_str(&quoted);
            }
            other => {
                return Err(ErrorKind::TypeMismatch(format!(
                    "unsupported format verb %{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(Value::String(result))
}

fn extremum(args: Vec<Value>, better: fn(f64, f64) -> bool) -> Result<Value, ErrorKind> {
    let mut best: Option<(f64, Value)> = None;
    for arg in args {
        let number = arg.to_number()?;
        match &best {
            Some((current, _)) if !better(number, *current) => {}
            _ => best = Some((number, arg)),
        }
    }

    // numeric strings are returned as numbers
    Ok(best.map(|(number, _)| Value::number(number)).unwrap_or(Value::Null))
}

fn parseint(_: &Context, args: Vec<Value>) -> Result<Value, ErrorKind> {
    let (s, base) = (string(&args[0])?, integer(&args[1])?);
    if !(2..=36).contains(&base) {
        return Err(ErrorKind::TypeMismatch(format!("base {base} must be between 2 and 36")));
    }
    i64::from_str_radix(&s, base as u32)
        .map(Value::Integer)
        .map_err(|_| {
            ErrorKind::TypeMismatch(format!("cannot parse {s:?} as a base {base} integer"))
        })
}

fn element(_: &Context, mut args: Vec<Value>) -> Result<Value, ErrorKind> {
    let index = integer(&args[1])?;
    let mut elements = list(args.swap_remove(0))?;
    if elements.is_empty() {
        return Err(ErrorKind::TypeMismatch("cannot use element() with an empty list".to_string()));
    }
    if index < 0 {
        return Err(ErrorKind::TypeMismatch("index must not be negative".to_string()));
    }
    let position = index as usize % elements.len();
    Ok(elements.swap_remove(position))
}

fn flatten(elements: Vec<Value>, result: &mut Vec<Value>) {
    for element in elements {
        match element {
            Value::Array(nested) => flatten(nested, result),
            other => result.push(other),
        }
    }
}

fn map_lookup(_: &Context, mut args: Vec<Value>) -> Result<Value, ErrorKind> {
    let default = if args.len() == 3 { args.pop() } else { None };
    let key = string(&args[1])?;
    let mut object = map(args.swap_remove(0))?;

    match (object.swap_remove(&key), default) {
        (Some(value), _) => Ok(value),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(ErrorKind::UndefinedReference(format!(
            "lookup(): map has no key {key:?}"
        ))),
    }
}

fn slice(_: &Context, mut args: Vec<Value>) -> Result<Value, ErrorKind> {
    let (start, end) = (integer(&args[1])?, integer(&args[2])?);
    let elements = list(args.swap_remove(0))?;
    if start < 0 || end < start || end as usize > elements.len() {
        return Err(ErrorKind::TypeMismatch(format!(
            "invalid range {start}..{end} for list of length {}",
            elements.len()
        )));
    }
    Ok(Value::Array(elements[start as usize..end as usize].to_vec()))
}
