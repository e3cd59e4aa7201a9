//! Token-level rules shared by the parser and the printer: keyword literals,
//! the numeric pattern with its width suffixes, and the escape vocabulary.

use crate::value::Value;

/// Characters that end a bare token or need quoting inside one.
pub const STRUCTURAL: [char; 7] = ['(', ')', ',', ';', '"', '\'', '\\'];

/// Whitespace and control characters are skipped between tokens and trimmed from bare ones.
pub fn is_ignorable(ch: char) -> bool {
    ch.is_whitespace() || ch.is_control()
}

/// Turns a trimmed bare token into its literal value. Anything that is not a
/// keyword or a well-formed number stays a string.
pub fn canonicalize(token: &str) -> Value {
    keyword(token)
        .or_else(|| parse_number(token))
        .unwrap_or_else(|| Value::String(token.to_string()))
}

fn keyword(token: &str) -> Option<Value> {
    let value = match token.to_ascii_lowercase().as_str() {
        "nil" | "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "infinity" | "+infinity" => Value::F64(f64::INFINITY),
        "-infinity" => Value::F64(f64::NEG_INFINITY),
        "infinityf" | "+infinityf" => Value::F32(f32::INFINITY),
        "-infinityf" => Value::F32(f32::NEG_INFINITY),
        "nan" => Value::F64(f64::NAN),
        "nanf" => Value::F32(f32::NAN),
        _ => return None,
    };
    Some(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suffix {
    None,
    U8,
    I8,
    I16,
    U16,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl Suffix {
    fn parse(text: &str) -> Option<Self> {
        let suffix = match text {
            "" => Suffix::None,
            "b" => Suffix::U8,
            "sb" | "bs" => Suffix::I8,
            "s" => Suffix::I16,
            "us" | "su" => Suffix::U16,
            "u" => Suffix::U32,
            "l" => Suffix::I64,
            "ul" | "lu" => Suffix::U64,
            "f" => Suffix::F32,
            "d" | "m" => Suffix::F64,
            _ => return None,
        };
        Some(suffix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form<'a> {
    Radix(&'a str, u32),
    Decimal(&'a str),
    Float(&'a str),
}

/// Matches `0x<hex>`, `0<octal>`, `[+-]<digits>` or `[+-]<digits>.<digits>e<exp>`,
/// each followed by an optional suffix, case-insensitively.
pub fn parse_number(token: &str) -> Option<Value> {
    let lower = token.to_ascii_lowercase();
    let (form, suffix) = split_number(&lower)?;
    convert(form, suffix)
}

fn split_number(text: &str) -> Option<(Form<'_>, Suffix)> {
    if let Some(rest) = text.strip_prefix("0x") {
        let end = run_length(rest, |c| c.is_ascii_hexdigit());
        if end > 0 {
            if let Some(suffix) = Suffix::parse(&rest[end..]) {
                return Some((Form::Radix(&rest[..end], 16), suffix));
            }
        }
    }
    if let Some(rest) = text.strip_prefix('0') {
        let end = run_length(rest, |c| ('0'..='7').contains(&c));
        if end > 0 {
            if let Some(suffix) = Suffix::parse(&rest[end..]) {
                return Some((Form::Radix(&rest[..end], 8), suffix));
            }
        }
    }
    let sign = usize::from(text.starts_with(['+', '-']));
    let digits = run_length(&text[sign..], |c| c.is_ascii_digit());
    if digits > 0 {
        if let Some(suffix) = Suffix::parse(&text[sign + digits..]) {
            return Some((Form::Decimal(&text[..sign + digits]), suffix));
        }
    }
    let end = float_length(text)?;
    let suffix = Suffix::parse(&text[end..])?;
    Some((Form::Float(&text[..end]), suffix))
}

fn run_length(text: &str, accept: impl Fn(char) -> bool) -> usize {
    text.find(|c: char| !accept(c)).unwrap_or(text.len())
}

fn float_length(text: &str) -> Option<usize> {
    let mut end = usize::from(text.starts_with(['+', '-']));
    let integral = run_length(&text[end..], |c| c.is_ascii_digit());
    end += integral;
    if text[end..].starts_with('.') {
        let fraction = run_length(&text[end + 1..], |c| c.is_ascii_digit());
        if fraction == 0 {
            return None;
        }
        end += 1 + fraction;
    } else if integral == 0 {
        return None;
    }
    if text[end..].starts_with('e') {
        let mut exponent = end + 1;
        if text[exponent..].starts_with(['+', '-']) {
            exponent += 1;
        }
        let digits = run_length(&text[exponent..], |c| c.is_ascii_digit());
        if digits == 0 {
            return None;
        }
        end = exponent + digits;
    }
    Some(end)
}

fn convert(form: Form<'_>, suffix: Suffix) -> Option<Value> {
    match form {
        // Hex and octal spell the bit pattern, so signed widths reinterpret the unsigned value.
        Form::Radix(digits, radix) => Some(match suffix {
            Suffix::None => Value::I32(u32::from_str_radix(digits, radix).ok()? as i32),
            Suffix::U8 => Value::U8(u8::from_str_radix(digits, radix).ok()?),
            Suffix::I8 => Value::I8(u8::from_str_radix(digits, radix).ok()? as i8),
            Suffix::I16 => Value::I16(u16::from_str_radix(digits, radix).ok()? as i16),
            Suffix::U16 => Value::U16(u16::from_str_radix(digits, radix).ok()?),
            Suffix::U32 => Value::U32(u32::from_str_radix(digits, radix).ok()?),
            Suffix::I64 => Value::I64(u64::from_str_radix(digits, radix).ok()? as i64),
            Suffix::U64 => Value::U64(u64::from_str_radix(digits, radix).ok()?),
            Suffix::F32 | Suffix::F64 => return None,
        }),
        Form::Decimal(text) | Form::Float(text) => Some(match suffix {
            Suffix::None if matches!(form, Form::Decimal(_)) => Value::I32(text.parse().ok()?),
            Suffix::None | Suffix::F64 => Value::F64(text.parse().ok()?),
            Suffix::U8 => Value::U8(text.parse().ok()?),
            Suffix::I8 => Value::I8(text.parse().ok()?),
            Suffix::I16 => Value::I16(text.parse().ok()?),
            Suffix::U16 => Value::U16(text.parse().ok()?),
            Suffix::U32 => Value::U32(text.parse().ok()?),
            Suffix::I64 => Value::I64(text.parse().ok()?),
            Suffix::U64 => Value::U64(text.parse().ok()?),
            Suffix::F32 => Value::F32(text.parse().ok()?),
        }),
    }
}

/// Control character named by a single-letter escape (`\n`, `\t`, ...).
pub fn named_escape(letter: char) -> Option<char> {
    let ch = match letter {
        'a' => '\u{07}',
        'b' => '\u{08}',
        'e' => '\u{1b}',
        'f' => '\u{0c}',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\u{0b}',
        _ => return None,
    };
    Some(ch)
}

/// Number of hex digits taken by `\x`, `\u` and `\U`.
pub fn hex_escape_width(letter: char) -> Option<usize> {
    match letter {
        'x' => Some(2),
        'u' => Some(4),
        'U' => Some(8),
        _ => None,
    }
}

fn escape_letter(ch: char) -> Option<char> {
    let letter = match ch {
        '\u{07}' => 'a',
        '\u{08}' => 'b',
        '\u{1b}' => 'e',
        '\u{0c}' => 'f',
        '\n' => 'n',
        '\r' => 'r',
        '\t' => 't',
        '\u{0b}' => 'v',
        _ => return None,
    };
    Some(letter)
}

/// Whether a string would not survive as a bare token.
pub fn needs_quotes(text: &str) -> bool {
    text.is_empty()
        || keyword(text).is_some()
        || parse_number(text).is_some()
        || text.chars().any(|c| STRUCTURAL.contains(&c) || is_ignorable(c))
}

pub fn quote_if_needed(text: &str) -> String {
    if needs_quotes(text) {
        quote(text)
    } else {
        text.to_string()
    }
}

/// Wraps `text` in double quotes using the parser's escape vocabulary.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            '\0' => {
                // `\0` followed by an octal digit would read as a longer octal escape.
                if chars.peek().is_some_and(|next| ('0'..='7').contains(next)) {
                    out.push_str("\\x00");
                } else {
                    out.push_str("\\0");
                }
            }
            _ => {
                if let Some(letter) = escape_letter(ch) {
                    out.push('\\');
                    out.push(letter);
                } else if ch.is_control() {
                    let code = u32::from(ch);
                    if code < 0x100 {
                        out.push_str(&format!("\\x{code:02x}"));
                    } else {
                        out.push_str(&format!("\\u{code:04x}"));
                    }
                } else {
                    out.push(ch);
                }
            }
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(canonicalize("NIL"), Value::Null);
        assert_eq!(canonicalize("Null"), Value::Null);
        assert_eq!(canonicalize("TRUE"), Value::Bool(true));
        assert_eq!(canonicalize("-Infinity"), Value::F64(f64::NEG_INFINITY));
        assert_eq!(canonicalize("+infinityF"), Value::F32(f32::INFINITY));
        assert_eq!(canonicalize("NaNf"), Value::F32(f32::NAN));
    }

    #[test]
    fn integer_suffixes_select_width() {
        assert_eq!(canonicalize("42"), Value::I32(42));
        assert_eq!(canonicalize("-42"), Value::I32(-42));
        assert_eq!(canonicalize("200b"), Value::U8(200));
        assert_eq!(canonicalize("-5SB"), Value::I8(-5));
        assert_eq!(canonicalize("-5bs"), Value::I8(-5));
        assert_eq!(canonicalize("7s"), Value::I16(7));
        assert_eq!(canonicalize("7us"), Value::U16(7));
        assert_eq!(canonicalize("7su"), Value::U16(7));
        assert_eq!(canonicalize("7u"), Value::U32(7));
        assert_eq!(canonicalize("7L"), Value::I64(7));
        assert_eq!(canonicalize("10UL"), Value::U64(10));
        assert_eq!(canonicalize("10lu"), Value::U64(10));
    }

    #[test]
    fn float_forms() {
        assert_eq!(canonicalize("2.5"), Value::F64(2.5));
        assert_eq!(canonicalize(".5"), Value::F64(0.5));
        assert_eq!(canonicalize("1e3"), Value::F64(1000.0));
        assert_eq!(canonicalize("1.5E-1"), Value::F64(0.15));
        assert_eq!(canonicalize("2.5f"), Value::F32(2.5));
        assert_eq!(canonicalize("3f"), Value::F32(3.0));
        assert_eq!(canonicalize("3d"), Value::F64(3.0));
        assert_eq!(canonicalize("3m"), Value::F64(3.0));
    }

    #[test]
    fn radix_forms() {
        assert_eq!(canonicalize("0x1F"), Value::I32(31));
        assert_eq!(canonicalize("0xFFFFFFFF"), Value::I32(-1));
        assert_eq!(canonicalize("0xffu"), Value::U32(255));
        assert_eq!(canonicalize("0xFFsb"), Value::I8(-1));
        assert_eq!(canonicalize("017"), Value::I32(15));
        assert_eq!(canonicalize("019"), Value::I32(19));
        assert_eq!(canonicalize("0"), Value::I32(0));
    }

    #[test]
    fn failed_conversions_stay_strings() {
        assert_eq!(canonicalize("300b"), Value::String("300b".into()));
        assert_eq!(canonicalize("-5u"), Value::String("-5u".into()));
        assert_eq!(canonicalize("1.5u"), Value::String("1.5u".into()));
        assert_eq!(canonicalize("1."), Value::String("1.".into()));
        assert_eq!(canonicalize("1e"), Value::String("1e".into()));
        assert_eq!(canonicalize("12abc"), Value::String("12abc".into()));
        assert_eq!(canonicalize("0x"), Value::String("0x".into()));
        assert_eq!(canonicalize("foo"), Value::String("foo".into()));
        assert_eq!(canonicalize("99999999999"), Value::String("99999999999".into()));
    }

    #[test]
    fn quoting_guards_collisions() {
        assert!(!needs_quotes("foo"));
        assert!(!needs_quotes("GetStringLength"));
        assert!(needs_quotes(""));
        assert!(needs_quotes("nil"));
        assert!(needs_quotes("nanf"));
        assert!(needs_quotes("12"));
        assert!(needs_quotes("a b"));
        assert!(needs_quotes("a;b"));
        assert!(needs_quotes("(x)"));
    }

    #[test]
    fn quote_uses_escape_vocabulary() {
        assert_eq!(quote("say \"hi\"\n"), r#""say \"hi\"\n""#);
        assert_eq!(quote("a\\b"), r#""a\\b""#);
        assert_eq!(quote("\u{1}"), r#""\x01""#);
        assert_eq!(quote("\0"), r#""\0""#);
        assert_eq!(quote("\u{0}7"), r#""\x007""#);
    }
}
