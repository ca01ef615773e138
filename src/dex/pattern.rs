//! Byte signatures with wildcards, written the way Frida's `Memory.scan` takes them

use crate::error::{DumperError, Result};

/// A fixed-length signature where `None` matches any byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BytePattern {
    bytes: Vec<Option<u8>>,
}

impl BytePattern {
    /// Parse whitespace-separated hex bytes, `??` for a wildcard.
    pub fn parse(text: &str) -> Result<Self> {
        let bytes = text
            .split_whitespace()
            .map(|token| match token {
                "??" | "?" => Ok(None),
                hex if hex.len() == 2 => u8::from_str_radix(hex, 16)
                    .map(Some)
                    .map_err(|_| DumperError::ConfigError(format!("bad pattern byte '{hex}'"))),
                other => Err(DumperError::ConfigError(format!(
                    "bad pattern token '{other}'"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        if bytes.iter().all(Option::is_none) {
            return Err(DumperError::ConfigError(format!(
                "pattern '{text}' has no fixed bytes"
            )));
        }
        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn matches_at(&self, haystack: &[u8], offset: usize) -> bool {
        let Some(end) = offset.checked_add(self.bytes.len()) else {
            return false;
        };
        haystack.get(offset..end).is_some_and(|window| {
            window
                .iter()
                .zip(&self.bytes)
                .all(|(b, p)| p.map_or(true, |want| *b == want))
        })
    }

    /// Every offset in `haystack` where the pattern matches, overlaps included.
    pub fn find_iter<'a>(&'a self, haystack: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
        let last = haystack.len().checked_sub(self.bytes.len());
        (0..last.map_or(0, |l| l + 1)).filter(move |&off| self.matches_at(haystack, off))
    }
}
