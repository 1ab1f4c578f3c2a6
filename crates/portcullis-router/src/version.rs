//! Semantic versions and version requirements.
//!
//! Only the subset needed for handler negotiation is supported: three
//! numeric components, no pre-release or build metadata.
//!
//! # Requirement syntax
//!
//! | Requirement | Matches |
//! |-------------|---------|
//! | `*`, `x`, empty | any version |
//! | `1.2.3`, `^1.2.3` | `>=1.2.3 <2.0.0` |
//! | `^0.2.3` | `>=0.2.3 <0.3.0` |
//! | `^0.0.3` | `>=0.0.3 <0.0.4` |
//! | `~1.2.3` | `>=1.2.3 <1.3.0` |
//! | `1`, `^1`, `1.x` | `>=1.0.0 <2.0.0` |
//! | `1.2.x`, `=1.2` | `>=1.2.0 <1.3.0` |
//! | `=1.2.3` | exactly `1.2.3` |
//! | `>1.2`, `>=1.2.0`, `<2`, `<=2.1` | the usual comparisons, partials filled |
//! | `1.2.3 - 2.3` | `>=1.2.3 <2.4.0` |
//!
//! Comparators separated by whitespace or `,` must all match; alternatives
//! are separated by `||`.
//!
//! # Example
//!
//! ```
//! use portcullis_router::version::{Version, VersionReq};
//!
//! let req: VersionReq = "^1.2".parse().unwrap();
//! assert!(req.matches(&Version::new(1, 9, 0)));
//! assert!(!req.matches(&Version::new(2, 0, 0)));
//!
//! assert_eq!(Version::coerce("v2"), Some(Version::new(2, 0, 0)));
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Errors raised while parsing versions and requirements.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The input is not a strict `major.minor.patch` version.
    #[error("invalid version `{0}`: expected major.minor.patch")]
    InvalidVersion(String),

    /// The input is not a valid requirement.
    #[error("invalid version requirement `{input}`: {reason}")]
    InvalidRequirement {
        /// The requirement as given.
        input: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl VersionError {
    pub(crate) fn requirement(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRequirement {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// A `major.minor.patch` version.
///
/// Ordering compares major, then minor, then patch numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    /// Major version.
    pub major: u64,
    /// Minor version.
    pub minor: u64,
    /// Patch version.
    pub patch: u64,
}

impl Version {
    /// Creates a version.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Leniently extracts a version from free-form text.
    ///
    /// The first `N[.N[.N]]` run in `input` wins; missing components are
    /// zero. `"v1"` is `1.0.0`, `"api-2.3"` is `2.3.0`, `"1.2.3.4"` is
    /// `1.2.3`. Returns `None` when `input` contains no digits.
    #[must_use]
    pub fn coerce(input: &str) -> Option<Self> {
        let captures = coerce_pattern().captures(input)?;
        let component = |index: usize| -> Option<u64> {
            captures
                .get(index)
                .map_or(Some(0), |m| m.as_str().parse().ok())
        };
        Some(Self::new(component(1)?, component(2)?, component(3)?))
    }
}

fn coerce_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("valid regex"))
}

impl FromStr for Version {
    type Err = VersionError;

    /// Parses a strict `major.minor.patch`, optionally prefixed with `v` or `=`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let raw = trimmed
            .strip_prefix(|c: char| c == 'v' || c == 'V' || c == '=')
            .unwrap_or(trimmed);

        let parts: Vec<&str> = raw.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(VersionError::InvalidVersion(s.to_string()));
        };

        let number = |part: &str| -> Result<u64, VersionError> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionError::InvalidVersion(s.to_string()));
            }
            part.parse()
                .map_err(|_| VersionError::InvalidVersion(s.to_string()))
        };

        Ok(Self::new(number(major)?, number(minor)?, number(patch)?))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A version requirement such as `^1.2`, `>=1.0.0 <2.0.0` or `1.x || 3.x`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionReq {
    raw: String,
    /// Alternatives; each is a conjunction of bounds.
    sets: Vec<Vec<Bound>>,
}

impl VersionReq {
    /// A requirement matching every version.
    #[must_use]
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            sets: vec![Vec::new()],
        }
    }

    /// The caret requirement `^version`: compatible releases of `version`.
    #[must_use]
    pub fn caret(version: Version) -> Self {
        Self {
            raw: format!("^{version}"),
            sets: vec![caret(Partial {
                major: Some(version.major),
                minor: Some(version.minor),
                patch: Some(version.patch),
                wildcard: false,
            })],
        }
    }

    /// Parses a requirement.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let sets = input
            .split("||")
            .map(|set| parse_set(set, input))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            raw: input.trim().to_string(),
            sets,
        })
    }

    /// Returns `true` if `version` satisfies the requirement.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.sets
            .iter()
            .any(|set| set.iter().all(|bound| bound.matches(version)))
    }

    /// Returns the requirement as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for VersionReq {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ── Bounds ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Exact,
    Greater,
    GreaterEq,
    Less,
}

/// A primitive comparison every requirement desugars into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bound {
    cmp: Cmp,
    version: Version,
}

impl Bound {
    fn matches(&self, version: &Version) -> bool {
        match self.cmp {
            Cmp::Exact => *version == self.version,
            Cmp::Greater => *version > self.version,
            Cmp::GreaterEq => *version >= self.version,
            Cmp::Less => *version < self.version,
        }
    }
}

const fn ge(major: u64, minor: u64, patch: u64) -> Bound {
    Bound {
        cmp: Cmp::GreaterEq,
        version: Version::new(major, minor, patch),
    }
}

const fn lt(major: u64, minor: u64, patch: u64) -> Bound {
    Bound {
        cmp: Cmp::Less,
        version: Version::new(major, minor, patch),
    }
}

/// `<0.0.0`: nothing satisfies it.
const NOTHING: Bound = lt(0, 0, 0);

// ── Parsing ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
    Tilde,
    Caret,
}

/// A possibly incomplete version: `1`, `1.2`, `1.x`, `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    wildcard: bool,
}

impl Partial {
    const fn floor(self) -> Version {
        Version::new(
            match self.major {
                Some(v) => v,
                None => 0,
            },
            match self.minor {
                Some(v) => v,
                None => 0,
            },
            match self.patch {
                Some(v) => v,
                None => 0,
            },
        )
    }
}

fn is_wildcard(segment: &str) -> bool {
    matches!(segment, "*" | "x" | "X")
}

fn split_operator(token: &str) -> (Option<Operator>, &str) {
    const OPERATORS: [(&str, Operator); 8] = [
        (">=", Operator::Ge),
        ("<=", Operator::Le),
        ("~>", Operator::Tilde),
        (">", Operator::Gt),
        ("<", Operator::Lt),
        ("=", Operator::Eq),
        ("~", Operator::Tilde),
        ("^", Operator::Caret),
    ];
    OPERATORS
        .iter()
        .find_map(|(prefix, op)| token.strip_prefix(prefix).map(|rest| (Some(*op), rest)))
        .unwrap_or((None, token))
}

fn parse_partial(raw: &str, input: &str) -> Result<Partial, VersionError> {
    let raw = raw
        .strip_prefix(|c: char| c == 'v' || c == 'V')
        .unwrap_or(raw);

    let segments: Vec<&str> = raw.split('.').collect();
    if segments.len() > 3 {
        return Err(VersionError::requirement(input, "too many version components"));
    }

    let mut parts = [None; 3];
    let mut wildcard = false;
    for (slot, segment) in parts.iter_mut().zip(segments) {
        if is_wildcard(segment) {
            wildcard = true;
            continue;
        }
        if wildcard {
            return Err(VersionError::requirement(input, "number after wildcard"));
        }
        if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
            return Err(VersionError::requirement(
                input,
                format!("`{segment}` is not a version number"),
            ));
        }
        *slot = Some(
            segment
                .parse()
                .map_err(|_| VersionError::requirement(input, "version number out of range"))?,
        );
    }

    Ok(Partial {
        major: parts[0],
        minor: parts[1],
        patch: parts[2],
        wildcard,
    })
}

fn parse_set(set: &str, input: &str) -> Result<Vec<Bound>, VersionError> {
    let tokens: Vec<&str> = set
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();

    if let [from, "-", to] = tokens.as_slice() {
        let from = parse_partial(from, input)?;
        let to = parse_partial(to, input)?;
        let mut bounds = desugar(Some(Operator::Ge), from);
        bounds.extend(desugar(Some(Operator::Le), to));
        return Ok(bounds);
    }

    let mut bounds = Vec::new();
    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        let (op, mut rest) = split_operator(token);
        if op.is_some() && rest.is_empty() {
            // `>= 1.2.0`: operator and version as separate tokens
            rest = iter.next().ok_or_else(|| {
                VersionError::requirement(input, format!("operator `{token}` without a version"))
            })?;
        }
        bounds.extend(desugar(op, parse_partial(rest, input)?));
    }
    Ok(bounds)
}

fn x_range(p: Partial) -> Vec<Bound> {
    match (p.major, p.minor, p.patch) {
        (None, _, _) => Vec::new(),
        (Some(ma), None, _) => vec![ge(ma, 0, 0), lt(ma.saturating_add(1), 0, 0)],
        (Some(ma), Some(mi), None) => vec![ge(ma, mi, 0), lt(ma, mi.saturating_add(1), 0)],
        (Some(ma), Some(mi), Some(pa)) => vec![Bound {
            cmp: Cmp::Exact,
            version: Version::new(ma, mi, pa),
        }],
    }
}

fn caret(p: Partial) -> Vec<Bound> {
    match (p.major, p.minor, p.patch) {
        (None, _, _) => Vec::new(),
        (Some(ma), None, _) => vec![ge(ma, 0, 0), lt(ma.saturating_add(1), 0, 0)],
        (Some(0), Some(mi), None) => vec![ge(0, mi, 0), lt(0, mi.saturating_add(1), 0)],
        (Some(ma), Some(mi), None) => vec![ge(ma, mi, 0), lt(ma.saturating_add(1), 0, 0)],
        (Some(0), Some(0), Some(pa)) => vec![ge(0, 0, pa), lt(0, 0, pa.saturating_add(1))],
        (Some(0), Some(mi), Some(pa)) => vec![ge(0, mi, pa), lt(0, mi.saturating_add(1), 0)],
        (Some(ma), Some(mi), Some(pa)) => vec![ge(ma, mi, pa), lt(ma.saturating_add(1), 0, 0)],
    }
}

fn tilde(p: Partial) -> Vec<Bound> {
    match (p.major, p.minor, p.patch) {
        (None, _, _) => Vec::new(),
        (Some(ma), None, _) => vec![ge(ma, 0, 0), lt(ma.saturating_add(1), 0, 0)],
        (Some(ma), Some(mi), pa) => vec![
            ge(ma, mi, pa.unwrap_or(0)),
            lt(ma, mi.saturating_add(1), 0),
        ],
    }
}

/// Expands a single comparator into primitive bounds.
fn desugar(op: Option<Operator>, p: Partial) -> Vec<Bound> {
    let floor = p.floor();
    match op {
        None if p.wildcard || p.major.is_none() => x_range(p),
        None | Some(Operator::Caret) => caret(p),
        Some(Operator::Eq) => x_range(p),
        Some(Operator::Tilde) => tilde(p),
        Some(Operator::Ge) => match p.major {
            None => Vec::new(),
            Some(_) => vec![ge(floor.major, floor.minor, floor.patch)],
        },
        Some(Operator::Lt) => match p.major {
            None => vec![NOTHING],
            Some(_) => vec![lt(floor.major, floor.minor, floor.patch)],
        },
        Some(Operator::Gt) => match (p.major, p.minor, p.patch) {
            (None, _, _) => vec![NOTHING],
            (Some(ma), None, _) => vec![ge(ma.saturating_add(1), 0, 0)],
            (Some(ma), Some(mi), None) => vec![ge(ma, mi.saturating_add(1), 0)],
            (Some(_), Some(_), Some(_)) => vec![Bound {
                cmp: Cmp::Greater,
                version: floor,
            }],
        },
        Some(Operator::Le) => match (p.major, p.minor, p.patch) {
            (None, _, _) => Vec::new(),
            (Some(ma), None, _) => vec![lt(ma.saturating_add(1), 0, 0)],
            (Some(ma), Some(mi), None) => vec![lt(ma, mi.saturating_add(1), 0)],
            (Some(ma), Some(mi), Some(pa)) => vec![lt(ma, mi, pa.saturating_add(1))],
        },
    }
}
