use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The actor and wall-clock time attached to a reflog entry.
///
/// Rendered as `Name <email> <seconds> <+hhmm>`. Ordering of reflog entries
/// is by `seconds` only; the timezone offset is presentation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// Seconds since the UNIX epoch.
    pub seconds: i64,
    /// Offset from UTC in minutes.
    pub tz_offset: i32,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>, seconds: i64, tz_offset: i32) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            seconds,
            tz_offset,
        }
    }

    /// A signature stamped with the current wall-clock time in UTC.
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        Self::new(name, email, seconds, 0)
    }

    fn format_offset(&self) -> String {
        let sign = if self.tz_offset < 0 { '-' } else { '+' };
        let minutes = self.tz_offset.unsigned_abs();
        format!("{sign}{:02}{:02}", minutes / 60, minutes % 60)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.seconds,
            self.format_offset()
        )
    }
}

impl FromStr for Signature {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TypeError::MalformedSignature(s.to_string());

        let open = s.find('<').ok_or_else(malformed)?;
        let close = s[open..].find('>').map(|i| open + i).ok_or_else(malformed)?;
        // Exactly one space separates the name from `<`; the name keeps the rest.
        let name = s[..open].strip_suffix(' ').ok_or_else(malformed)?.to_string();
        let email = s[open + 1..close].to_string();

        let mut rest = s[close + 1..].split_whitespace();
        let seconds = rest
            .next()
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or_else(malformed)?;
        let tz = rest.next().ok_or_else(malformed)?;
        if rest.next().is_some() || tz.len() != 5 {
            return Err(malformed());
        }
        let sign = match &tz[..1] {
            "+" => 1,
            "-" => -1,
            _ => return Err(malformed()),
        };
        let hours: i32 = tz[1..3].parse().map_err(|_| malformed())?;
        let minutes: i32 = tz[3..5].parse().map_err(|_| malformed())?;

        Ok(Self {
            name,
            email,
            seconds,
            tz_offset: sign * (hours * 60 + minutes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_ident_layout() {
        let sig = Signature::new("Ada Lovelace", "ada@example.com", 1_700_000_000, 90);
        assert_eq!(sig.to_string(), "Ada Lovelace <ada@example.com> 1700000000 +0130");
    }

    #[test]
    fn negative_offsets_render_with_minus() {
        let sig = Signature::new("A", "a@x", 5, -300);
        assert!(sig.to_string().ends_with(" -0500"));
    }

    #[test]
    fn parses_rendered_signature() {
        let sig = Signature::new("Grace Hopper", "grace@navy.mil", 42, -480);
        let parsed: Signature = sig.to_string().parse().unwrap();
        assert_eq!(parsed, sig);
    }

    #[test]
    fn name_whitespace_is_kept() {
        for name in ["Name ", " padded  ", ""] {
            let sig = Signature::new(name, "n@x", 7, 0);
            let parsed: Signature = sig.to_string().parse().unwrap();
            assert_eq!(parsed.name, name);
        }
        assert!("Glued<n@x> 1 +0000".parse::<Signature>().is_err());
    }

    #[test]
    fn rejects_missing_timestamp() {
        assert!("Nobody <n@x>".parse::<Signature>().is_err());
        assert!("Nobody <n@x> 12 0100".parse::<Signature>().is_err());
        assert!("no email 12 +0000".parse::<Signature>().is_err());
    }
}
