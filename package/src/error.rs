//! Error types for removal planning

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for removal operations
pub type Result<T> = std::result::Result<T, Error>;

/// Removal errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Unknown atom: {0}")]
    UnknownAtom(String),

    #[error("Invalid atom: {0}")]
    InvalidAtom(String),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Operation cancelled by user")]
    UserCancelled,

    #[error("Query failed: {0}")]
    Query(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] depprune_config::ConfigError),

    #[error("{0}")]
    Other(String),
}

/// What went wrong while reading a recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A quoted declaration value never closed
    UnterminatedDeclaration,
    /// A `(` without its `)`
    UnmatchedOpen,
    /// A `)` without its `(`
    UnmatchedClose,
    /// A group operator or flag guard not followed by `(`
    ExpectedGroupOpen,
    /// A token that is neither an atom, a guard nor a group operator
    UnexpectedToken,
    /// Tokens left over after a complete expression
    TrailingTokens,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParseErrorKind::UnterminatedDeclaration => "unterminated declaration",
            ParseErrorKind::UnmatchedOpen => "unmatched '('",
            ParseErrorKind::UnmatchedClose => "unmatched ')'",
            ParseErrorKind::ExpectedGroupOpen => "expected '('",
            ParseErrorKind::UnexpectedToken => "unexpected token",
            ParseErrorKind::TrailingTokens => "trailing tokens",
        };
        f.write_str(s)
    }
}

/// Positioned recipe parse failure
///
/// `position` is the 1-based source line for tokenizer failures and the
/// 0-based token index for expression failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: usize,
    /// Declaration being parsed, when known
    pub declaration: Option<String>,
    /// Offending token, when there is one
    pub token: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, position: usize) -> Self {
        Self {
            kind,
            position,
            declaration: None,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn in_declaration(mut self, name: impl Into<String>) -> Self {
        self.declaration = Some(name.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.declaration, self.kind) {
            (Some(decl), ParseErrorKind::UnterminatedDeclaration) => write!(
                f,
                "{} in {} starting at line {}",
                self.kind, decl, self.position
            )?,
            (None, ParseErrorKind::UnterminatedDeclaration) => {
                write!(f, "{} starting at line {}", self.kind, self.position)?
            }
            (Some(decl), _) => write!(f, "{} in {} at token {}", self.kind, decl, self.position)?,
            (None, _) => write!(f, "{} at {}", self.kind, self.position)?,
        }
        if let Some(token) = &self.token {
            write!(f, " ({:?})", token)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Mask-file commit failures
///
/// These always halt the commit phase and are reported verbatim.
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error(
        "{path} was modified by another process during the commit; \
         file left unchanged, backup kept at {backup}"
    )]
    ConcurrentModification { path: PathBuf, backup: PathBuf },

    #[error("commit of {path} failed: {cause}{}", describe_backup(.backup))]
    CommitFailed {
        path: PathBuf,
        /// Backup still on disk, if restoring the original did not complete
        backup: Option<PathBuf>,
        cause: String,
    },

    #[error("partially applied: {committed} was committed, but {failed}")]
    PartiallyApplied {
        committed: PathBuf,
        failed: Box<TransactionError>,
    },
}

fn describe_backup(backup: &Option<PathBuf>) -> String {
    match backup {
        Some(path) => format!("; file may be partially applied, backup at {}", path.display()),
        None => "; file left unchanged".to_string(),
    }
}
