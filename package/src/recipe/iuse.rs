//! Use-flag registry
//!
//! Collects a recipe's declared flags from `IUSE` and `REQUIRED_USE`, then
//! marks the ones its dependency trees actually branch on as toggleable.

use super::depend::{is_flag_name, DependencyTree};
use crate::error::{ParseError, ParseErrorKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Default polarity of a declared flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlagDefault {
    /// `+flag`
    Enabled,
    /// `-flag`
    Disabled,
    /// Bare `flag`, or only referenced from `REQUIRED_USE`
    #[default]
    Unset,
}

/// A flag declared by one recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseFlag {
    pub name: String,
    pub default: FlagDefault,
    /// `~flag`: testing/masked
    pub testing: bool,
    /// Some dependency in the same recipe is guarded by this flag
    pub toggleable: bool,
}

impl UseFlag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: FlagDefault::Unset,
            testing: false,
            toggleable: false,
        }
    }

    /// Parse one `IUSE` token (`cups`, `+ssl`, `-debug`, `~gles2`)
    pub fn parse(token: &str) -> Option<Self> {
        let mut flag = UseFlag::new("");
        let mut rest = token;
        loop {
            if let Some(r) = rest.strip_prefix('+') {
                flag.default = FlagDefault::Enabled;
                rest = r;
            } else if let Some(r) = rest.strip_prefix('-') {
                flag.default = FlagDefault::Disabled;
                rest = r;
            } else if let Some(r) = rest.strip_prefix('~') {
                flag.testing = true;
                rest = r;
            } else {
                break;
            }
        }
        if !is_flag_name(rest) {
            return None;
        }
        flag.name = rest.to_string();
        Some(flag)
    }
}

/// Flags of one recipe, unique by name, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseFlagRegistry {
    flags: IndexMap<String, UseFlag>,
}

impl UseFlagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flag, merging with an earlier declaration of the same name
    ///
    /// An explicit polarity replaces `Unset`; `testing` is sticky.
    pub fn declare(&mut self, flag: UseFlag) {
        match self.flags.get_mut(&flag.name) {
            Some(existing) => {
                if flag.default != FlagDefault::Unset {
                    existing.default = flag.default;
                }
                existing.testing |= flag.testing;
                existing.toggleable |= flag.toggleable;
            }
            None => {
                self.flags.insert(flag.name.clone(), flag);
            }
        }
    }

    /// Register the tokens of an `IUSE` declaration
    ///
    /// Tokens that are not flags (unexpanded `${VAR}` and the like) are skipped.
    pub fn add_iuse(&mut self, tokens: &[String]) {
        for token in tokens {
            match UseFlag::parse(token) {
                Some(flag) => self.declare(flag),
                None => tracing::debug!("Skipping IUSE token {:?}", token),
            }
        }
    }

    /// Pre-register every flag named in a `REQUIRED_USE` declaration
    ///
    /// Accepts bare flags, `!flag`, `flag?` / `!flag?` guards, the group
    /// operators and parentheses. Unbalanced parentheses fail closed.
    pub fn add_required_use(&mut self, tokens: &[String]) -> Result<(), ParseError> {
        let mut open: Vec<usize> = Vec::new();

        for (idx, token) in tokens.iter().enumerate() {
            match token.as_str() {
                "(" => open.push(idx),
                ")" => {
                    if open.pop().is_none() {
                        return Err(
                            ParseError::new(ParseErrorKind::UnmatchedClose, idx).with_token(")")
                        );
                    }
                }
                "||" | "^^" | "??" => {
                    if tokens.get(idx + 1).map(String::as_str) != Some("(") {
                        return Err(ParseError::new(ParseErrorKind::ExpectedGroupOpen, idx + 1));
                    }
                }
                other => {
                    let name = other.trim_start_matches('!').trim_end_matches('?');
                    if !is_flag_name(name) {
                        return Err(ParseError::new(ParseErrorKind::UnexpectedToken, idx)
                            .with_token(other));
                    }
                    self.declare(UseFlag::new(name));
                }
            }
        }

        match open.first() {
            Some(&idx) => Err(ParseError::new(ParseErrorKind::UnmatchedOpen, idx).with_token("(")),
            None => Ok(()),
        }
    }

    /// Mark flags used as guards in `trees` as toggleable
    ///
    /// Runs once every declaration of the recipe has been read, since a
    /// guard may appear before the flag's own declaration.
    pub fn derive_toggleable<'a>(&mut self, trees: impl IntoIterator<Item = &'a DependencyTree>) {
        for tree in trees {
            for name in tree.guard_flags() {
                if let Some(flag) = self.flags.get_mut(name) {
                    flag.toggleable = true;
                }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&UseFlag> {
        self.flags.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    /// Declared and used as a dependency guard
    pub fn is_toggleable(&self, name: &str) -> bool {
        self.flags.get(name).is_some_and(|f| f.toggleable)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UseFlag> {
        self.flags.values()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}
