//! Path templates.
//!
//! Two syntaxes meet here. Acquisition writes frames through a printf-style
//! template (`%s%s_%06d.tif`) over `(directory, filename, frame_index)`.
//! Destinations use named placeholders (`{det_name}`, `{N:06d}`) resolved in
//! two stages: run-level fields first, then event-level fields. Stage one
//! leaves unknown placeholders in place and unescapes `{{`/`}}`, so either can
//! introduce placeholders that only the event row can fill.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use serde_json::Value;

/// A value substituted into a named placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Text, inserted as-is.
    Text(String),
    /// Integer.
    Int(i64),
    /// Floating-point number.
    Float(f64),
}

/// Named template fields.
pub type Fields = BTreeMap<String, FieldValue>;

impl FieldValue {
    /// Converts a scalar JSON value. Arrays contribute their first element;
    /// `null` and objects have no template representation.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self::Text(text.clone())),
            Value::Number(number) => {
                number.as_i64().map(Self::Int).or_else(|| number.as_f64().map(Self::Float))
            }
            Value::Bool(flag) => Some(Self::Text(if *flag { "True" } else { "False" }.to_string())),
            Value::Array(items) => items.first().and_then(Self::from_json),
            Value::Null | Value::Object(_) => None,
        }
    }

    fn is_numeric(&self) -> bool {
        !matches!(self, Self::Text(_))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Int(value) => write!(f, "{value}"),
            // Whole floats keep a trailing `.0` (16100.0, not 16100).
            Self::Float(value)
                if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 =>
            {
                write!(f, "{value:.1}")
            }
            Self::Float(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Template resolution failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    /// Placeholders remained after the final resolution stage.
    #[error("unresolved template fields: {}", .0.join(", "))]
    Unresolved(Vec<String>),
    /// A brace without a partner.
    #[error("unbalanced brace at offset {offset} in template {template:?}")]
    Unbalanced {
        /// Byte offset of the brace.
        offset: usize,
        /// The template being resolved.
        template: String,
    },
    /// A placeholder without a name, such as `{}` or `{:03d}`.
    #[error("empty placeholder at offset {offset} in template {template:?}")]
    EmptyPlaceholder {
        /// Byte offset of the opening brace.
        offset: usize,
        /// The template being resolved.
        template: String,
    },
    /// The format spec is malformed or does not suit the value.
    #[error("field {field} cannot be formatted with spec {spec:?}")]
    BadSpec {
        /// Placeholder name.
        field: String,
        /// The format spec after `:`.
        spec: String,
    },
    /// A printf-style template could not be applied to its arguments.
    #[error("printf template {template:?}: {message}")]
    Printf {
        /// The template being applied.
        template: String,
        /// What went wrong.
        message: String,
    },
}

/// Resolves a destination template in two stages.
///
/// Stage one substitutes `structural` fields and keeps anything unknown;
/// stage two substitutes `event` fields and fails on anything left.
///
/// # Errors
///
/// Returns [`TemplateError::Unresolved`] naming every field missing after
/// stage two, or a syntax/spec error from either stage.
pub fn resolve_two_stage(
    template: &str,
    structural: &Fields,
    event: &Fields,
) -> Result<String, TemplateError> {
    let revealed = render_partial(template, structural)?;
    render_strict(&revealed, event)
}

/// Substitutes known fields and keeps unknown placeholders verbatim.
///
/// # Errors
///
/// Returns a [`TemplateError`] on unbalanced braces or a bad format spec.
pub fn render_partial(template: &str, fields: &Fields) -> Result<String, TemplateError> {
    render(template, fields, false)
}

/// Substitutes fields and fails if any placeholder is unknown.
///
/// # Errors
///
/// Returns [`TemplateError::Unresolved`] listing unknown placeholders, or a
/// syntax/spec error.
pub fn render_strict(template: &str, fields: &Fields) -> Result<String, TemplateError> {
    render(template, fields, true)
}

enum Segment<'a> {
    Literal(String),
    Field { name: &'a str, spec: &'a str, raw: &'a str },
}

fn render(template: &str, fields: &Fields, strict: bool) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut missing: Vec<String> = Vec::new();

    for segment in segments(template)? {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Field { name, spec, raw } => match fields.get(name) {
                Some(value) => out.push_str(&format_field(name, value, spec)?),
                None if strict => {
                    if !missing.iter().any(|m| m == name) {
                        missing.push(name.to_string());
                    }
                }
                None => {
                    out.push('{');
                    out.push_str(raw);
                    out.push('}');
                }
            },
        }
    }

    if missing.is_empty() {
        Ok(out)
    } else {
        Err(TemplateError::Unresolved(missing))
    }
}

fn segments(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let unbalanced =
        |offset: usize| TemplateError::Unbalanced { offset, template: template.to_string() };
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '{' if next_is(&mut chars, '{') => literal.push('{'),
            '}' if next_is(&mut chars, '}') => literal.push('}'),
            '}' => return Err(unbalanced(offset)),
            '{' => {
                let close = template[offset + 1..]
                    .find('}')
                    .map(|end| offset + 1 + end)
                    .ok_or_else(|| unbalanced(offset))?;
                let raw = &template[offset + 1..close];
                if raw.contains('{') {
                    return Err(unbalanced(offset));
                }
                let (name, spec) = raw.split_once(':').unwrap_or((raw, ""));
                if name.is_empty() {
                    return Err(TemplateError::EmptyPlaceholder {
                        offset,
                        template: template.to_string(),
                    });
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field { name, spec, raw });
                while chars.next_if(|&(i, _)| i <= close).is_some() {}
            }
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn next_is(chars: &mut Peekable<CharIndices<'_>>, expected: char) -> bool {
    chars.next_if(|&(_, c)| c == expected).is_some()
}

/// Parsed `[[fill]align][0][width][.precision][type]`.
#[derive(Debug, Default)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<char>,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    kind: Option<char>,
}

impl FormatSpec {
    fn parse(spec: &str) -> Option<Self> {
        let chars: Vec<char> = spec.chars().collect();
        let mut parsed = Self::default();
        let mut i = 0;

        let is_align = |c: char| matches!(c, '<' | '>' | '^');
        if chars.len() >= 2 && is_align(chars[1]) {
            parsed.fill = Some(chars[0]);
            parsed.align = Some(chars[1]);
            i = 2;
        } else if chars.first().copied().is_some_and(is_align) {
            parsed.align = chars.first().copied();
            i = 1;
        }
        if chars.get(i) == Some(&'0') {
            parsed.zero = true;
            i += 1;
        }
        let (width, next) = digits(&chars, i);
        parsed.width = width.unwrap_or(0);
        i = next;
        if chars.get(i) == Some(&'.') {
            let (precision, next) = digits(&chars, i + 1);
            parsed.precision = Some(precision?);
            i = next;
        }
        if let Some(&kind) = chars.get(i) {
            if !matches!(kind, 'd' | 'f' | 's') {
                return None;
            }
            parsed.kind = Some(kind);
            i += 1;
        }
        (i == chars.len()).then_some(parsed)
    }
}

fn digits(chars: &[char], start: usize) -> (Option<usize>, usize) {
    let end = chars[start.min(chars.len())..]
        .iter()
        .position(|c| !c.is_ascii_digit())
        .map_or(chars.len(), |n| start + n);
    if end <= start {
        return (None, start);
    }
    let text: String = chars[start..end].iter().collect();
    (text.parse().ok(), end)
}

fn format_field(name: &str, value: &FieldValue, spec: &str) -> Result<String, TemplateError> {
    if spec.is_empty() {
        return Ok(value.to_string());
    }
    let bad = || TemplateError::BadSpec { field: name.to_string(), spec: spec.to_string() };
    let parsed = FormatSpec::parse(spec).ok_or_else(bad)?;

    let body = match (parsed.kind, value) {
        (Some('d'), FieldValue::Int(n)) => n.to_string(),
        (Some('f'), FieldValue::Int(n)) => {
            #[allow(clippy::cast_precision_loss)]
            let as_float = *n as f64;
            format!("{as_float:.prec$}", prec = parsed.precision.unwrap_or(6))
        }
        (Some('f') | None, FieldValue::Float(x))
            if parsed.kind.is_some() || parsed.precision.is_some() =>
        {
            format!("{x:.prec$}", prec = parsed.precision.unwrap_or(6))
        }
        (Some('s') | None, FieldValue::Text(text)) => match parsed.precision {
            Some(limit) => text.chars().take(limit).collect(),
            None => text.clone(),
        },
        (None, other) => other.to_string(),
        _ => return Err(bad()),
    };

    Ok(pad(&body, &parsed, value.is_numeric()))
}

fn pad(body: &str, spec: &FormatSpec, numeric: bool) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body.to_string();
    }
    let gap = spec.width - len;

    if spec.zero && numeric && spec.align.is_none() {
        let (sign, digits) = body.strip_prefix('-').map_or(("", body), |rest| ("-", rest));
        return format!("{sign}{}{digits}", "0".repeat(gap));
    }

    let fill = spec.fill.unwrap_or(if spec.zero { '0' } else { ' ' }).to_string();
    match spec.align.unwrap_or(if numeric { '>' } else { '<' }) {
        '>' => format!("{}{body}", fill.repeat(gap)),
        '^' => format!("{}{body}{}", fill.repeat(gap / 2), fill.repeat(gap - gap / 2)),
        _ => format!("{body}{}", fill.repeat(gap)),
    }
}

/// An argument to a printf-style template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintfArg {
    /// Text argument.
    Text(String),
    /// Unsigned integer argument.
    Int(u64),
}

impl fmt::Display for PrintfArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Int(n) => write!(f, "{n}"),
        }
    }
}

/// Applies a printf-style template to positional arguments.
///
/// Supports `%s`, `%d`, `%i`, `%u`, the `-` and `0` flags, width,
/// precision and `%%`. Every argument must be consumed.
///
/// # Errors
///
/// Returns [`TemplateError::Printf`] on an unsupported conversion, a type
/// mismatch, or an argument count mismatch.
pub fn format_printf(template: &str, args: &[PrintfArg]) -> Result<String, TemplateError> {
    let fail = |message: &str| TemplateError::Printf {
        template: template.to_string(),
        message: message.to_string(),
    };
    let mut out = String::with_capacity(template.len() + 32);
    let mut remaining = args.iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut left = false;
        let mut zero = false;
        while let Some(flag) = chars.next_if(|f| matches!(f, '-' | '0' | ' ' | '+' | '#')) {
            match flag {
                '-' => left = true,
                '0' => zero = true,
                _ => {}
            }
        }
        let width = take_number(&mut chars).unwrap_or(0);
        let precision = if chars.next_if_eq(&'.').is_some() {
            Some(take_number(&mut chars).unwrap_or(0))
        } else {
            None
        };

        let conversion = chars.next().ok_or_else(|| fail("incomplete format"))?;
        let (body, numeric) = match conversion {
            '%' => {
                out.push('%');
                continue;
            }
            's' => {
                let arg = remaining.next().ok_or_else(|| fail("not enough arguments"))?;
                let text = arg.to_string();
                let text = match precision {
                    Some(limit) => text.chars().take(limit).collect(),
                    None => text,
                };
                (text, false)
            }
            'd' | 'i' | 'u' => match remaining.next() {
                Some(PrintfArg::Int(n)) => {
                    let digits = n.to_string();
                    let min = precision.unwrap_or(0);
                    let digits = if digits.len() < min {
                        format!("{}{digits}", "0".repeat(min - digits.len()))
                    } else {
                        digits
                    };
                    (digits, true)
                }
                Some(PrintfArg::Text(_)) => return Err(fail("%d format: a number is required")),
                None => return Err(fail("not enough arguments")),
            },
            other => return Err(fail(&format!("unsupported conversion %{other}"))),
        };

        let len = body.chars().count();
        if len >= width {
            out.push_str(&body);
        } else if left {
            out.push_str(&body);
            out.push_str(&" ".repeat(width - len));
        } else if zero && numeric {
            out.push_str(&"0".repeat(width - len));
            out.push_str(&body);
        } else {
            out.push_str(&" ".repeat(width - len));
            out.push_str(&body);
        }
    }

    if remaining.next().is_some() {
        return Err(fail("not all arguments converted"));
    }
    Ok(out)
}

fn take_number(chars: &mut Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut text = String::new();
    while let Some(d) = chars.next_if(char::is_ascii_digit) {
        text.push(d);
    }
    text.parse().ok()
}
