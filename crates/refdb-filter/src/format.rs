//! Output templates.
//!
//! A template is literal text with `%(atom)` placeholders. `%%` is a literal
//! percent sign and `%xx` inserts the byte with hex value `xx`.
//!
//! Atoms:
//!
//! | atom | value |
//! |---|---|
//! | `refname` | full name; `:short`, `:lstrip=N`, `:rstrip=N` |
//! | `objectname` | object id; `:short`, `:short=N` |
//! | `objecttype` | `commit`, `tree`, `blob`, or `tag` |
//! | `objectsize` | size in bytes |
//! | `symref` | target of a symbolic ref, same modifiers as `refname` |
//! | `HEAD` | `*` for the ref `HEAD` points at, otherwise a space |

use refdb_refs::names;
use refdb_types::object::DEFAULT_ABBREV;

use crate::error::{FilterError, Result};
use crate::item::RefItem;
use crate::quote::QuoteStyle;

pub const DEFAULT_FORMAT: &str = "%(objectname) %(objecttype)\t%(refname)";

/// How a ref name is shortened before display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameMod {
    Full,
    Short,
    /// Remove `N` leading components; negative keeps the last `-N`.
    Lstrip(i64),
    /// Remove `N` trailing components; negative keeps the first `-N`.
    Rstrip(i64),
}

impl NameMod {
    fn parse(atom: &str, arg: Option<&str>) -> Result<Self> {
        let Some(arg) = arg else {
            return Ok(NameMod::Full);
        };
        let number = |value: &str| {
            value
                .parse::<i64>()
                .map_err(|_| FilterError::InvalidFormat(format!("%({atom}) needs an integer: '{arg}'")))
        };
        if arg == "short" {
            Ok(NameMod::Short)
        } else if let Some(n) = arg.strip_prefix("lstrip=").or_else(|| arg.strip_prefix("strip=")) {
            Ok(NameMod::Lstrip(number(n)?))
        } else if let Some(n) = arg.strip_prefix("rstrip=") {
            Ok(NameMod::Rstrip(number(n)?))
        } else {
            Err(FilterError::InvalidFormat(format!("unrecognized %({atom}) argument: {arg}")))
        }
    }

    pub fn apply(&self, name: &str) -> String {
        match *self {
            NameMod::Full => name.to_string(),
            NameMod::Short => names::shorten(name).to_string(),
            NameMod::Lstrip(n) => {
                let parts: Vec<&str> = name.split('/').collect();
                let len = parts.len() as i64;
                let skip = if n >= 0 { n } else { (len + n).max(0) };
                if skip >= len {
                    return String::new();
                }
                parts[skip as usize..].join("/")
            }
            NameMod::Rstrip(n) => {
                let parts: Vec<&str> = name.split('/').collect();
                let len = parts.len();
                let strip = usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX);
                let keep = if n >= 0 { len.saturating_sub(strip) } else { strip.min(len) };
                parts[..keep].join("/")
            }
        }
    }
}

/// A placeholder in a template or a sort key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Atom {
    RefName(NameMod),
    /// `None` for the full id, otherwise the abbreviation length.
    ObjectName(Option<usize>),
    ObjectType,
    ObjectSize,
    Symref(NameMod),
    Head,
}

impl Atom {
    pub fn parse(spec: &str) -> Result<Self> {
        let (name, arg) = match spec.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (spec, None),
        };
        let no_arg = |atom: Atom| match arg {
            None => Ok(atom),
            Some(arg) => Err(FilterError::InvalidFormat(format!("%({name}) does not take arguments: {arg}"))),
        };
        match name {
            "refname" => Ok(Atom::RefName(NameMod::parse(name, arg)?)),
            "symref" => Ok(Atom::Symref(NameMod::parse(name, arg)?)),
            "objectname" => match arg {
                None => Ok(Atom::ObjectName(None)),
                Some("short") => Ok(Atom::ObjectName(Some(DEFAULT_ABBREV))),
                Some(arg) => match arg.strip_prefix("short=").map(str::parse::<usize>) {
                    Some(Ok(len)) if len > 0 => Ok(Atom::ObjectName(Some(len))),
                    _ => Err(FilterError::InvalidFormat(format!(
                        "unrecognized %(objectname) argument: {arg}"
                    ))),
                },
            },
            "objecttype" => no_arg(Atom::ObjectType),
            "objectsize" => no_arg(Atom::ObjectSize),
            "HEAD" => no_arg(Atom::Head),
            _ => Err(FilterError::InvalidFormat(format!("unknown field name: {name}"))),
        }
    }

    /// Returns `true` if the value needs the object to be read.
    pub fn needs_object(&self) -> bool {
        matches!(self, Atom::ObjectType | Atom::ObjectSize)
    }

    /// Unquoted value for `item`. Object facts that were not loaded render
    /// as empty.
    pub fn value(&self, item: &RefItem, head: Option<&str>) -> String {
        match self {
            Atom::RefName(m) => m.apply(&item.name),
            Atom::ObjectName(None) => item.id.to_hex(),
            Atom::ObjectName(Some(len)) => item.id.short_hex_len(*len),
            Atom::ObjectType => item.object.map(|o| o.kind.to_string()).unwrap_or_default(),
            Atom::ObjectSize => item.object.map(|o| o.size.to_string()).unwrap_or_default(),
            Atom::Symref(m) => item.target.symbolic_name().map(|t| m.apply(t)).unwrap_or_default(),
            Atom::Head => {
                if head == Some(item.name.as_str()) {
                    "*".into()
                } else {
                    " ".into()
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Atom(Atom),
}

/// A parsed output template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    pieces: Vec<Piece>,
}

impl Default for Template {
    fn default() -> Self {
        // The default template is known to parse.
        Self::parse(DEFAULT_FORMAT).unwrap_or(Self { pieces: Vec::new() })
    }
}

/// `%xx` escapes may only spell out valid UTF-8.
fn literal_text(bytes: &[u8], format: &str) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| FilterError::InvalidFormat(format!("escape in {format} is not valid UTF-8")))
}

impl Template {
    pub fn parse(format: &str) -> Result<Self> {
        let bytes = format.as_bytes();
        let mut pieces = Vec::new();
        let mut literal = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] != b'%' {
                literal.push(bytes[i]);
                i += 1;
                continue;
            }
            match bytes.get(i + 1) {
                Some(b'%') => {
                    literal.push(b'%');
                    i += 2;
                }
                Some(b'(') => {
                    let close = format[i + 2..].find(')').map(|p| i + 2 + p).ok_or_else(|| {
                        FilterError::InvalidFormat(format!("malformed format string {format}"))
                    })?;
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(literal_text(&literal, format)?));
                        literal.clear();
                    }
                    pieces.push(Piece::Atom(Atom::parse(&format[i + 2..close])?));
                    i = close + 1;
                }
                Some(&hi) if hi.is_ascii_hexdigit() && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit) => {
                    let hex = &format[i + 1..i + 3];
                    literal.push(u8::from_str_radix(hex, 16).unwrap_or(b'?'));
                    i += 3;
                }
                _ => {
                    literal.push(b'%');
                    i += 1;
                }
            }
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal_text(&literal, format)?));
        }
        Ok(Self { pieces })
    }

    pub fn atoms(&self) -> impl Iterator<Item = &Atom> {
        self.pieces.iter().filter_map(|p| match p {
            Piece::Atom(atom) => Some(atom),
            Piece::Literal(_) => None,
        })
    }

    pub fn needs_object(&self) -> bool {
        self.atoms().any(Atom::needs_object)
    }

    pub fn render(&self, item: &RefItem, head: Option<&str>, quote: QuoteStyle) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Atom(atom) => out.push_str(&quote.quote(&atom.value(item, head))),
            }
        }
        out
    }
}
