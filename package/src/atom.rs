//! Package atom parsing and normalization
//!
//! Handles dependency atoms as they appear in recipes:
//! - `category/package`
//! - `>=category/package-1.0-r2`
//! - `category/package:slot/subslot=`
//! - `category/package[use_flag,-other]`
//! - `!category/package` (blockers)
//!
//! [`normalize`] reduces any of these to the canonical `category/package`.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Version comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VersionOp {
    /// No version constraint
    #[default]
    Any,
    /// Exact version match (=)
    Equal,
    /// Greater than (>)
    Greater,
    /// Greater than or equal (>=)
    GreaterEqual,
    /// Less than (<)
    Less,
    /// Less than or equal (<=)
    LessEqual,
    /// Any revision of a version (~)
    Approximate,
}

impl VersionOp {
    fn as_str(&self) -> &'static str {
        match self {
            VersionOp::Any => "",
            VersionOp::Equal => "=",
            VersionOp::Greater => ">",
            VersionOp::GreaterEqual => ">=",
            VersionOp::Less => "<",
            VersionOp::LessEqual => "<=",
            VersionOp::Approximate => "~",
        }
    }

    /// Split a leading operator off an atom string
    fn split(s: &str) -> (Self, &str) {
        // Two-character operators must be tried first
        const OPS: &[(&str, VersionOp)] = &[
            (">=", VersionOp::GreaterEqual),
            ("<=", VersionOp::LessEqual),
            (">", VersionOp::Greater),
            ("<", VersionOp::Less),
            ("=", VersionOp::Equal),
            ("~", VersionOp::Approximate),
        ];
        for (prefix, op) in OPS {
            if let Some(rest) = s.strip_prefix(prefix) {
                return (*op, rest);
            }
        }
        (VersionOp::Any, s)
    }
}

/// A dependency atom with its decorations
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Atom {
    /// Blocker atom (`!` or `!!` prefix)
    pub blocker: bool,
    /// Version operator
    pub operator: VersionOp,
    /// Package category (e.g., "net-print")
    pub category: String,
    /// Package name (e.g., "cups")
    pub name: String,
    /// Version string, without revision
    pub version: Option<String>,
    /// Revision (the `N` of `-rN`)
    pub revision: Option<String>,
    /// Slot
    pub slot: Option<String>,
    /// Sub-slot
    pub subslot: Option<String>,
    /// Raw text of the USE dependency bracket, uninterpreted
    pub use_deps: Option<String>,
}

impl Atom {
    /// Create an atom with just category and name
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            blocker: false,
            operator: VersionOp::Any,
            category: category.into(),
            name: name.into(),
            version: None,
            revision: None,
            slot: None,
            subslot: None,
            use_deps: None,
        }
    }

    /// Parse an atom token
    pub fn parse(s: &str) -> Result<Self> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(Error::InvalidAtom("empty atom".to_string()));
        }

        let (blocker, rest) = split_blocker(raw);
        let (operator, mut remaining) = VersionOp::split(rest);

        let mut use_deps = None;
        if let Some(start) = remaining.find('[') {
            let end = remaining
                .rfind(']')
                .filter(|end| *end > start)
                .ok_or_else(|| Error::InvalidAtom(format!("unclosed USE deps: {}", raw)))?;
            use_deps = Some(remaining[start + 1..end].to_string());
            remaining = &remaining[..start];
        }

        let mut slot = None;
        let mut subslot = None;
        if let Some(idx) = remaining.find(':') {
            let slot_str = remaining[idx + 1..].trim_start_matches(':');
            let slot_str = slot_str.trim_end_matches('=');
            if let Some((s, sub)) = slot_str.split_once('/') {
                slot = Some(s.to_string());
                subslot = Some(sub.to_string());
            } else if !slot_str.is_empty() && slot_str != "*" {
                slot = Some(slot_str.to_string());
            }
            remaining = &remaining[..idx];
        }

        let (category, name_version) = remaining
            .split_once('/')
            .ok_or_else(|| Error::InvalidAtom(format!("missing category: {}", raw)))?;

        let (name, version, revision) = match version_suffix().captures(name_version) {
            Some(caps) => {
                let whole = caps.get(0).map_or(0, |m| m.start());
                (
                    &name_version[..whole],
                    caps.get(1).map(|m| m.as_str().to_string()),
                    caps.get(2).map(|m| m.as_str().to_string()),
                )
            }
            None => (name_version, None, None),
        };

        if category.is_empty() || name.is_empty() || name.contains('/') {
            return Err(Error::InvalidAtom(format!("invalid atom: {}", raw)));
        }

        Ok(Atom {
            blocker,
            operator,
            category: category.to_string(),
            name: name.to_string(),
            version,
            revision,
            slot,
            subslot,
            use_deps,
        })
    }

    /// Canonical `category/name`
    pub fn cpn(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }
}

impl FromStr for Atom {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Atom::parse(s)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.blocker {
            write!(f, "!")?;
        }
        write!(f, "{}{}/{}", self.operator.as_str(), self.category, self.name)?;
        if let Some(version) = &self.version {
            write!(f, "-{}", version)?;
        }
        if let Some(revision) = &self.revision {
            write!(f, "-r{}", revision)?;
        }
        if let Some(slot) = &self.slot {
            write!(f, ":{}", slot)?;
            if let Some(subslot) = &self.subslot {
                write!(f, "/{}", subslot)?;
            }
        }
        if let Some(use_deps) = &self.use_deps {
            write!(f, "[{}]", use_deps)?;
        }
        Ok(())
    }
}

/// `-<version>[-r<rev>][*]` at the end of a package name
fn version_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"-([0-9]+(?:\.[0-9]+)*[a-z]?(?:_(?:alpha|beta|pre|rc|p)[0-9]*)*)(?:-r([0-9]+))?\*?$",
        )
        .expect("invalid version pattern")
    })
}

fn split_blocker(s: &str) -> (bool, &str) {
    if let Some(rest) = s.strip_prefix("!!") {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('!') {
        (true, rest)
    } else {
        (false, s)
    }
}

/// Whether a recipe token looks like an atom rather than a flag or operator
pub fn is_atom_token(token: &str) -> bool {
    let (_, rest) = split_blocker(token);
    let (_, rest) = VersionOp::split(rest);
    match rest.find('/') {
        Some(idx) => idx > 0 && !rest.ends_with('?') && !rest.starts_with('$'),
        None => false,
    }
}

/// Reduce a raw atom token to its canonical `category/name`
///
/// Strips, in order: blocker and comparison operator, USE bracket, slot and
/// sub-slot, version and revision, surrounding whitespace. Running it on an
/// already canonical identifier returns it unchanged.
pub fn normalize(raw: &str) -> String {
    let mut current = raw.trim().to_string();
    loop {
        let next = normalize_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn normalize_once(raw: &str) -> String {
    let (_, s) = split_blocker(raw.trim());
    let (_, mut s) = VersionOp::split(s);

    if let Some(idx) = s.find('[') {
        s = &s[..idx];
    }
    if let Some(idx) = s.find(':') {
        s = &s[..idx];
    }
    if let Some(m) = version_suffix().find(s) {
        // Never strip into the category
        if s[..m.start()].contains('/') {
            s = &s[..m.start()];
        }
    }
    s.trim().to_string()
}
