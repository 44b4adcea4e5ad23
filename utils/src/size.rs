//! Parsing of the `size[K|M|G]` and `[+|-]size[K|M|G]` arguments accepted by the
//! reiserfs command-line tools.

use std::fmt;

/// A size or size delta given on the command line, already expanded to bytes.
///
/// The sign is kept separate from the magnitude so callers can tell "grow by 10M"
/// from "shrink to 10M" apart from a plain "10M".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeArg {
    pub bytes: u64,
    pub sign: Sign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
    None,
}

#[derive(Debug)]
pub struct ParseSizeError(String);

impl fmt::Display for ParseSizeError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "invalid size `{}`", self.0)
    }
}

impl std::error::Error for ParseSizeError {}

/// Parses a string of the form `[+|-]<number>[K|M|G]` into a [`SizeArg`].
///
/// The suffix is a binary multiplier (K = 1024, M = 1024^2, G = 1024^3), matching
/// the units `mkfs`/`resizefs`/`tunefs` report sizes in.
pub fn parse_size(s: &str) -> Result<SizeArg, ParseSizeError> {
    let mut rest = s;
    let sign = match rest.as_bytes().first() {
        Some(b'+') => {
            rest = &rest[1..];
            Sign::Plus
        }
        Some(b'-') => {
            rest = &rest[1..];
            Sign::Minus
        }
        _ => Sign::None,
    };

    let mult = match rest.as_bytes().last() {
        Some(b'K' | b'k') => {
            rest = &rest[..rest.len() - 1];
            1024u64
        }
        Some(b'M' | b'm') => {
            rest = &rest[..rest.len() - 1];
            1024 * 1024
        }
        Some(b'G' | b'g') => {
            rest = &rest[..rest.len() - 1];
            1024 * 1024 * 1024
        }
        _ => 1,
    };

    let number: u64 = rest
        .parse()
        .map_err(|_| ParseSizeError(s.to_string()))?;

    Ok(SizeArg {
        bytes: number * mult,
        sign,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain() {
        let a = parse_size("40M").unwrap();
        assert_eq!(a.sign, Sign::None);
        assert_eq!(a.bytes, 40 * 1024 * 1024);
    }

    #[test]
    fn signed() {
        let a = parse_size("+10K").unwrap();
        assert_eq!(a.sign, Sign::Plus);
        assert_eq!(a.bytes, 10 * 1024);

        let b = parse_size("-1G").unwrap();
        assert_eq!(b.sign, Sign::Minus);
        assert_eq!(b.bytes, 1024 * 1024 * 1024);
    }

    #[test]
    fn no_suffix() {
        let a = parse_size("4096").unwrap();
        assert_eq!(a.bytes, 4096);
    }

    #[test]
    fn invalid() {
        assert!(parse_size("abc").is_err());
    }
}
