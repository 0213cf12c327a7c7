//! Quoting of atom values for consumption by other languages.

use crate::error::{FilterError, Result};

/// How each interpolated atom value is quoted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum QuoteStyle {
    #[default]
    None,
    Shell,
    Perl,
    Python,
    Tcl,
}

impl QuoteStyle {
    /// Pick the single requested style; more than one is an error.
    pub fn from_requested(styles: &[QuoteStyle]) -> Result<Self> {
        let mut chosen = QuoteStyle::None;
        for &style in styles.iter().filter(|s| **s != QuoteStyle::None) {
            if chosen != QuoteStyle::None && chosen != style {
                return Err(FilterError::ConflictingQuoteStyle);
            }
            chosen = style;
        }
        Ok(chosen)
    }

    pub fn quote(&self, value: &str) -> String {
        match self {
            QuoteStyle::None => value.to_string(),
            QuoteStyle::Shell => shell_quote(value),
            QuoteStyle::Perl => single_quote_escaped(value, false),
            QuoteStyle::Python => single_quote_escaped(value, true),
            QuoteStyle::Tcl => tcl_quote(value),
        }
    }
}

/// `'...'`, with `'` and `!` closed out of the quotes.
fn shell_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' | '!' => {
                out.push_str("'\\");
                out.push(c);
                out.push('\'');
            }
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn single_quote_escaped(value: &str, escape_newline: bool) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' if escape_newline => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn tcl_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '[' | ']' | '{' | '}' | '$' | '\\' | '"' => {
                out.push('\\');
                out.push(c);
            }
            '\u{c}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\u{b}' => out.push_str("\\v"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
