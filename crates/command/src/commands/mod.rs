//! Concrete mission-sequence commands.

mod assignment;
mod basic;
mod control;
mod propagate;
mod target;

pub use assignment::Assignment;
pub use basic::{EndMarker, NoOp, Stop};
pub use control::{For, If, While};
pub use propagate::{PropMode, Propagate};
pub use target::{Achieve, Target, Vary};

use crate::CommandError;

/// Split on `separator` where it is not nested in `()`, `{}` or quotes.
pub(crate) fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' | '{' if !quoted => depth += 1,
            ')' | '}' if !quoted => depth -= 1,
            c if c == separator && depth == 0 && !quoted => {
                parts.push(text[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

/// Byte index of the bracket closing the one at `open`.
pub(crate) fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let (opening, closing) = match bytes.get(open)? {
        b'(' => (b'(', b')'),
        b'{' => (b'{', b'}'),
        _ => return None,
    };
    let mut depth = 0;
    for (i, b) in bytes.iter().enumerate().skip(open) {
        if *b == opening {
            depth += 1;
        } else if *b == closing {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Parse `Solver(inner)` into the solver name and the text between the parentheses.
pub(crate) fn solver_call<'t>(command: &str, text: &'t str) -> Result<(&'t str, &'t str), CommandError> {
    let open = text
        .find('(')
        .ok_or_else(|| CommandError::parse(command, format!("expected `Solver(...)`, found `{text}`")))?;
    let close = matching_close(text, open)
        .ok_or_else(|| CommandError::parse(command, "unbalanced parentheses"))?;
    if !text[close + 1..].trim().is_empty() {
        return Err(CommandError::parse(
            command,
            format!("unexpected text after `)`: `{}`", text[close + 1..].trim()),
        ));
    }
    let name = text[..open].trim();
    if name.is_empty() {
        return Err(CommandError::parse(command, "missing solver name"));
    }
    Ok((name, &text[open + 1..close]))
}

/// `{Key = value, ...}` option list into key/value pairs.
pub(crate) fn parse_options<'t>(
    command: &str,
    text: &'t str,
) -> Result<Vec<(&'t str, &'t str)>, CommandError> {
    let inner = text
        .trim()
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or_else(|| CommandError::parse(command, format!("expected `{{...}}`, found `{text}`")))?;
    split_top_level(inner, ',')
        .into_iter()
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| CommandError::parse(command, format!("expected `Key = value`, found `{item}`")))
        })
        .collect()
}

pub(crate) fn parse_number(command: &str, key: &str, text: &str) -> Result<f64, CommandError> {
    text.parse()
        .map_err(|_| CommandError::parse(command, format!("{key} must be a number, found `{text}`")))
}

/// `Obj.Prop` or `Obj(...)` with `Obj == old` becomes the same text on `new`.
pub(crate) fn rename_leading(text: &str, old: &str, new: &str) -> Option<String> {
    if text == old {
        return Some(new.to_string());
    }
    text.strip_prefix(old)
        .filter(|rest| rest.starts_with('.') || rest.starts_with('('))
        .map(|rest| format!("{new}{rest}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_split_ignores_nested_separators() {
        let parts = split_top_level("Sat.X = M(1, 2), {Tolerance = 0.1, Lower = 0}", ',');
        assert_eq!(parts, vec!["Sat.X = M(1, 2)", "{Tolerance = 0.1, Lower = 0}"]);
    }

    #[test]
    fn solver_call_rejects_trailing_text() {
        assert!(solver_call("Vary", "DC1(Sat.VX = 1) extra").is_err());
        let (name, inner) = solver_call("Vary", "DC1(Sat.VX = 1)").unwrap();
        assert_eq!((name, inner), ("DC1", "Sat.VX = 1"));
    }
}
