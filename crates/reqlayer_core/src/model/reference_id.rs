//! Human-readable reference identifiers.
//!
//! # Responsibility
//! - Render sequential and fallback reference ids.
//! - Parse stored ids back into `(family, tail)` pairs.
//!
//! # Invariants
//! - Sequential tails below 1000 are zero-padded to exactly three digits.
//! - Sequential tails from 1000 upward carry no leading zeros.
//! - Fallback tails are exactly eight lowercase hex digits.
//! - `parse(id).to_string() == id` for every accepted id.

use crate::model::family::FamilyTag;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static REFERENCE_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(EP|US|REQ|AC|STD|PROMPT)-([0-9]{3}|[1-9][0-9]{3,}|[a-f0-9]{8})$")
        .expect("valid reference id regex")
});

const PADDED_TAIL_MAX: u64 = 999;

/// Numeric or random tail following the family prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceTail {
    /// Issued from a family counter; always `>= 1`.
    Sequential(u64),
    /// Issued when no counter value could be obtained.
    Fallback(u32),
}

/// Parsed reference identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceId {
    pub family: FamilyTag,
    pub tail: ReferenceTail,
}

/// Errors from `ReferenceId::parse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceIdParseError {
    /// Input does not match the reference-id grammar.
    Malformed(String),
    /// Sequential tail is zero or does not fit in 64 bits.
    TailOutOfRange(String),
}

impl Display for ReferenceIdParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(value) => write!(f, "malformed reference id `{value}`"),
            Self::TailOutOfRange(value) => {
                write!(f, "reference id `{value}` has an out-of-range numeric tail")
            }
        }
    }
}

impl Error for ReferenceIdParseError {}

impl ReferenceId {
    pub fn sequential(family: FamilyTag, number: u64) -> Self {
        Self {
            family,
            tail: ReferenceTail::Sequential(number),
        }
    }

    pub fn fallback(family: FamilyTag, bits: u32) -> Self {
        Self {
            family,
            tail: ReferenceTail::Fallback(bits),
        }
    }

    /// Parses one id against the bit-exact grammar.
    ///
    /// An all-digit eight-character tail without a leading zero reads as
    /// sequential; rendering it back yields the same text either way.
    pub fn parse(value: &str) -> Result<Self, ReferenceIdParseError> {
        let captures = REFERENCE_ID_RE
            .captures(value)
            .ok_or_else(|| ReferenceIdParseError::Malformed(value.to_string()))?;

        let family = FamilyTag::from_prefix(&captures[1])
            .ok_or_else(|| ReferenceIdParseError::Malformed(value.to_string()))?;
        let tail_text = &captures[2];

        let numeric = tail_text.bytes().all(|byte| byte.is_ascii_digit())
            && (tail_text.len() == 3 || !tail_text.starts_with('0'));
        if numeric {
            let number = tail_text
                .parse::<u64>()
                .map_err(|_| ReferenceIdParseError::TailOutOfRange(value.to_string()))?;
            if number == 0 {
                return Err(ReferenceIdParseError::TailOutOfRange(value.to_string()));
            }
            return Ok(Self::sequential(family, number));
        }

        if tail_text.len() == 8 {
            let bits = u32::from_str_radix(tail_text, 16)
                .map_err(|_| ReferenceIdParseError::Malformed(value.to_string()))?;
            return Ok(Self::fallback(family, bits));
        }

        Err(ReferenceIdParseError::Malformed(value.to_string()))
    }

    /// Returns the counter value when this id came from a family counter.
    pub fn sequence_number(&self) -> Option<u64> {
        match self.tail {
            ReferenceTail::Sequential(number) => Some(number),
            ReferenceTail::Fallback(_) => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.tail, ReferenceTail::Fallback(_))
    }
}

impl Display for ReferenceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let prefix = self.family.prefix();
        match self.tail {
            ReferenceTail::Sequential(number) if number <= PADDED_TAIL_MAX => {
                write!(f, "{prefix}-{number:03}")
            }
            ReferenceTail::Sequential(number) => write!(f, "{prefix}-{number}"),
            ReferenceTail::Fallback(bits) => write!(f, "{prefix}-{bits:08x}"),
        }
    }
}

impl FromStr for ReferenceId {
    type Err = ReferenceIdParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}
