//! Dependency expression parsing
//!
//! Parses the token stream of a `*DEPEND` declaration into an expression tree
//! and flattens it into guarded edges.
//!
//! # Syntax
//!
//! - Atom: `net-print/cups`, `>=dev-libs/glib-2.40:2`
//! - Use-conditional: `cups? ( net-print/cups )`, `!minimal? ( dev-libs/a )`
//! - Any-of group: `|| ( dev-a/x dev-b/y )`
//! - Exactly-one-of: `^^ ( dev-a/x dev-b/y )`
//! - At-most-one-of: `?? ( dev-a/x dev-b/y )`
//! - All-of group: `( dev-a/x dev-b/y )`
//! - Variable reference: `${COMMON_DEPEND}` (kept opaque, never expanded)

use crate::atom::{is_atom_token, Atom};
use crate::error::{ParseError, ParseErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Boolean combinator of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKind {
    /// Implicit sequencing, `( ... )`
    AllOf,
    /// `|| ( ... )`
    AnyOf,
    /// `^^ ( ... )`
    ExactlyOne,
    /// `?? ( ... )`
    AtMostOne,
}

impl GroupKind {
    fn from_operator(token: &str) -> Option<Self> {
        match token {
            "||" => Some(GroupKind::AnyOf),
            "^^" => Some(GroupKind::ExactlyOne),
            "??" => Some(GroupKind::AtMostOne),
            _ => None,
        }
    }

    /// Whether members of this group are alternatives rather than all required
    pub fn is_choice(&self) -> bool {
        !matches!(self, GroupKind::AllOf)
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKind::AllOf => write!(f, "all-of"),
            GroupKind::AnyOf => write!(f, "any-of"),
            GroupKind::ExactlyOne => write!(f, "exactly-one-of"),
            GroupKind::AtMostOne => write!(f, "at-most-one-of"),
        }
    }
}

/// A `flag?` or `!flag?` guard
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlagCondition {
    pub flag: String,
    /// `!flag?`: applies when the flag is off
    pub negated: bool,
}

impl FlagCondition {
    fn parse(token: &str) -> Option<Self> {
        let body = token.strip_suffix('?')?;
        let (negated, flag) = match body.strip_prefix('!') {
            Some(flag) => (true, flag),
            None => (false, body),
        };
        if is_flag_name(flag) {
            Some(Self {
                flag: flag.to_string(),
                negated,
            })
        } else {
            None
        }
    }
}

impl fmt::Display for FlagCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!")?;
        }
        write!(f, "{}?", self.flag)
    }
}

/// USE flag names: alphanumerics plus `_ - + @ .`, starting alphanumeric
pub fn is_flag_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '@' | '.'))
}

/// A node of a dependency expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepExpr {
    /// A package atom
    Atom(Atom),
    /// `$VAR` or `${VAR}`, left unexpanded
    Reference(String),
    /// A boolean group
    Group {
        kind: GroupKind,
        children: Vec<DepExpr>,
    },
    /// A use-conditional block
    Conditional {
        condition: FlagCondition,
        children: Vec<DepExpr>,
    },
}

/// One enclosing condition of an edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Flag(FlagCondition),
    Group(GroupKind),
}

/// The conditions under which an edge applies, outermost first
///
/// An empty guard is a mandatory dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Guard {
    conditions: Vec<Condition>,
}

impl Guard {
    /// Mandatory, unguarded
    pub fn none() -> Self {
        Self::default()
    }

    /// Guarded by a single `flag?`
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            conditions: vec![Condition::Flag(FlagCondition {
                flag: name.into(),
                negated: false,
            })],
        }
    }

    /// Guarded by a single `!flag?`
    pub fn negated_flag(name: impl Into<String>) -> Self {
        Self {
            conditions: vec![Condition::Flag(FlagCondition {
                flag: name.into(),
                negated: true,
            })],
        }
    }

    /// Build from an explicit chain, outermost first
    pub fn from_conditions(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// No flag guard and no choice group: the edge always applies
    pub fn is_mandatory(&self) -> bool {
        self.conditions.iter().all(|c| match c {
            Condition::Group(kind) => !kind.is_choice(),
            Condition::Flag(_) => false,
        })
    }

    /// Flag conditions, outermost first
    pub fn flags(&self) -> impl Iterator<Item = &FlagCondition> {
        self.conditions.iter().filter_map(|c| match c {
            Condition::Flag(f) => Some(f),
            Condition::Group(_) => None,
        })
    }

    /// Innermost choice group, if the edge is one of several alternatives
    pub fn choice(&self) -> Option<GroupKind> {
        self.conditions.iter().rev().find_map(|c| match c {
            Condition::Group(kind) if kind.is_choice() => Some(*kind),
            _ => None,
        })
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return write!(f, "mandatory");
        }
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|c| match c {
                Condition::Flag(flag) => flag.to_string(),
                Condition::Group(kind) => kind.to_string(),
            })
            .collect();
        write!(f, "{}", parts.join(" > "))
    }
}

/// A dependency of one package on another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Package declaring the dependency
    pub source: String,
    /// Depended-upon atom
    pub target: Atom,
    /// Conditions under which it applies
    pub guard: Guard,
    /// Declaration the edge came from (e.g., "RDEPEND")
    pub declaration: String,
}

/// Parsed expression of one dependency declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyTree {
    pub declaration: String,
    pub exprs: Vec<DepExpr>,
}

impl DependencyTree {
    /// Parse the tokens of a dependency declaration
    pub fn parse(declaration: &str, tokens: &[String]) -> Result<Self, ParseError> {
        let exprs = parse_dependencies(tokens).map_err(|e| e.in_declaration(declaration))?;
        Ok(Self {
            declaration: declaration.to_string(),
            exprs,
        })
    }

    /// Flatten into edges, one per atom, each carrying its enclosing conditions
    pub fn edges(&self, source: &str) -> Vec<DependencyEdge> {
        let mut edges = Vec::new();
        let mut chain = Vec::new();
        collect_edges(&self.exprs, source, &self.declaration, &mut chain, &mut edges);
        edges
    }

    /// Every flag used as a guard anywhere in the tree
    pub fn guard_flags(&self) -> Vec<&str> {
        let mut flags = Vec::new();
        collect_guard_flags(&self.exprs, &mut flags);
        flags
    }
}

fn collect_edges(
    exprs: &[DepExpr],
    source: &str,
    declaration: &str,
    chain: &mut Vec<Condition>,
    edges: &mut Vec<DependencyEdge>,
) {
    for expr in exprs {
        match expr {
            DepExpr::Atom(atom) => edges.push(DependencyEdge {
                source: source.to_string(),
                target: atom.clone(),
                guard: Guard::from_conditions(chain.clone()),
                declaration: declaration.to_string(),
            }),
            DepExpr::Reference(_) => {}
            DepExpr::Group { kind, children } => {
                chain.push(Condition::Group(*kind));
                collect_edges(children, source, declaration, chain, edges);
                chain.pop();
            }
            DepExpr::Conditional {
                condition,
                children,
            } => {
                chain.push(Condition::Flag(condition.clone()));
                collect_edges(children, source, declaration, chain, edges);
                chain.pop();
            }
        }
    }
}

fn collect_guard_flags<'a>(exprs: &'a [DepExpr], flags: &mut Vec<&'a str>) {
    for expr in exprs {
        match expr {
            DepExpr::Atom(_) | DepExpr::Reference(_) => {}
            DepExpr::Group { children, .. } => collect_guard_flags(children, flags),
            DepExpr::Conditional {
                condition,
                children,
            } => {
                flags.push(condition.flag.as_str());
                collect_guard_flags(children, flags);
            }
        }
    }
}

/// Parse a dependency token stream, requiring every token to be consumed
pub fn parse_dependencies(tokens: &[String]) -> Result<Vec<DepExpr>, ParseError> {
    let mut parser = Parser { tokens, pos: 0 };
    let exprs = parser.parse_sequence()?;
    if parser.pos < tokens.len() {
        return Err(
            ParseError::new(ParseErrorKind::TrailingTokens, parser.pos)
                .with_token(tokens[parser.pos].as_str()),
        );
    }
    Ok(exprs)
}

/// Cursor over the tokens of one declaration
struct Parser<'t> {
    tokens: &'t [String],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    /// Parse expressions until end of input or a `)` (left unconsumed)
    fn parse_sequence(&mut self) -> Result<Vec<DepExpr>, ParseError> {
        let mut exprs = Vec::new();
        while let Some(token) = self.peek() {
            if token == ")" {
                break;
            }
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self) -> Result<DepExpr, ParseError> {
        let start = self.pos;
        let token = self
            .peek()
            .ok_or_else(|| ParseError::new(ParseErrorKind::UnexpectedToken, start))?;

        if let Some(kind) = GroupKind::from_operator(token) {
            self.pos += 1;
            let children = self.parse_group(start)?;
            return Ok(DepExpr::Group { kind, children });
        }

        if token == "(" {
            let children = self.parse_group(start)?;
            return Ok(DepExpr::Group {
                kind: GroupKind::AllOf,
                children,
            });
        }

        if let Some(condition) = FlagCondition::parse(token) {
            self.pos += 1;
            let children = self.parse_group(start)?;
            return Ok(DepExpr::Conditional {
                condition,
                children,
            });
        }

        if token.starts_with('$') {
            self.pos += 1;
            let name = token
                .trim_start_matches('$')
                .trim_start_matches('{')
                .trim_end_matches('}');
            return Ok(DepExpr::Reference(name.to_string()));
        }

        if is_atom_token(token) {
            let atom = Atom::parse(token).map_err(|_| {
                ParseError::new(ParseErrorKind::UnexpectedToken, start).with_token(token)
            })?;
            self.pos += 1;
            return Ok(DepExpr::Atom(atom));
        }

        Err(ParseError::new(ParseErrorKind::UnexpectedToken, start).with_token(token))
    }

    /// Parse `( expr* )` at the cursor; `owner` is where the group began
    fn parse_group(&mut self, owner: usize) -> Result<Vec<DepExpr>, ParseError> {
        match self.peek() {
            Some("(") => self.pos += 1,
            Some(other) => {
                return Err(
                    ParseError::new(ParseErrorKind::ExpectedGroupOpen, self.pos).with_token(other),
                )
            }
            None => return Err(ParseError::new(ParseErrorKind::ExpectedGroupOpen, self.pos)),
        }

        let children = self.parse_sequence()?;

        match self.peek() {
            Some(")") => {
                self.pos += 1;
                Ok(children)
            }
            _ => Err(ParseError::new(ParseErrorKind::UnmatchedOpen, owner)
                .with_token(self.tokens[owner].as_str())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::tokenizer::tokenize;

    fn parse(input: &str) -> Result<Vec<DepExpr>, ParseError> {
        parse_dependencies(&tokenize(input))
    }

    fn edges(input: &str) -> Vec<DependencyEdge> {
        DependencyTree::parse("RDEPEND", &tokenize(input))
            .unwrap()
            .edges("app-misc/test")
    }

    #[test]
    fn test_flag_guarded_atom() {
        let edges = edges("cups? ( net-print/cups )");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target.cpn(), "net-print/cups");
        assert_eq!(edges[0].guard, Guard::flag("cups"));
        assert_eq!(edges[0].source, "app-misc/test");
        assert_eq!(edges[0].declaration, "RDEPEND");
    }

    #[test]
    fn test_any_of_group() {
        let exprs = parse("|| ( dev-a/x dev-b/y )").unwrap();
        assert_eq!(exprs.len(), 1);
        match &exprs[0] {
            DepExpr::Group { kind, children } => {
                assert_eq!(*kind, GroupKind::AnyOf);
                assert_eq!(children.len(), 2);
                assert!(matches!(&children[0], DepExpr::Atom(a) if a.cpn() == "dev-a/x"));
                assert!(matches!(&children[1], DepExpr::Atom(a) if a.cpn() == "dev-b/y"));
            }
            other => panic!("Expected Group, got {:?}", other),
        }

        for edge in edges("|| ( dev-a/x dev-b/y )") {
            assert_eq!(edge.guard.flags().count(), 0);
            assert_eq!(edge.guard.choice(), Some(GroupKind::AnyOf));
        }
    }

    #[test]
    fn test_group_operators() {
        for (op, kind) in [
            ("||", GroupKind::AnyOf),
            ("^^", GroupKind::ExactlyOne),
            ("??", GroupKind::AtMostOne),
        ] {
            let exprs = parse(&format!("{} ( dev-a/x dev-b/y )", op)).unwrap();
            assert!(matches!(&exprs[0], DepExpr::Group { kind: k, .. } if *k == kind));
        }
    }

    #[test]
    fn test_top_level_atoms_are_mandatory() {
        let edges = edges(">=dev-libs/glib-2.40:2 sys-libs/zlib");
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.guard == Guard::none()));
        assert!(edges[0].guard.is_mandatory());
    }

    #[test]
    fn test_negated_guard() {
        let edges = edges("!minimal? ( dev-libs/a )");
        assert_eq!(edges[0].guard, Guard::negated_flag("minimal"));
        assert!(!edges[0].guard.is_mandatory());
    }

    #[test]
    fn test_flag_guard_wrapping_any_of() {
        let edges = edges("cups? ( || ( net-print/cups net-print/lprng ) )");
        assert_eq!(edges.len(), 2);
        let guard = &edges[0].guard;
        assert_eq!(
            guard.conditions(),
            &[
                Condition::Flag(FlagCondition {
                    flag: "cups".to_string(),
                    negated: false
                }),
                Condition::Group(GroupKind::AnyOf),
            ]
        );
        assert_ne!(*guard, Guard::flag("cups"));
        assert_eq!(guard.choice(), Some(GroupKind::AnyOf));
    }

    #[test]
    fn test_nested_conditionals() {
        let edges = edges("a? ( b? ( dev-libs/x ) dev-libs/y )");
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].guard.flags().count(), 2);
        assert_eq!(edges[1].guard, Guard::flag("a"));
    }

    #[test]
    fn test_all_of_group_is_mandatory() {
        let edges = edges("( dev-libs/x dev-libs/y )");
        assert!(edges.iter().all(|e| e.guard.is_mandatory()));
    }

    #[test]
    fn test_references_are_opaque() {
        let exprs = parse("${COMMON_DEPEND} $RDEPEND dev-libs/x").unwrap();
        assert_eq!(exprs[0], DepExpr::Reference("COMMON_DEPEND".to_string()));
        assert_eq!(exprs[1], DepExpr::Reference("RDEPEND".to_string()));
        assert_eq!(edges("${COMMON_DEPEND} dev-libs/x").len(), 1);
    }

    #[test]
    fn test_blockers_parse_as_atoms() {
        let edges = edges("!net-print/cups !!sys-apps/foo");
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.target.blocker));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn test_missing_close_paren() {
        for input in [
            "cups? ( net-print/cups",
            "|| ( dev-a/x dev-b/y",
            "a? ( b? ( dev-libs/x ) dev-libs/y",
            "( dev-libs/x",
        ] {
            let err = parse(input).unwrap_err();
            assert_eq!(err.kind, ParseErrorKind::UnmatchedOpen, "input: {}", input);
        }
    }

    #[test]
    fn test_truncating_any_well_formed_close_fails() {
        let input = "a? ( || ( dev-a/x dev-b/y ) ^^ ( dev-c/z ) ) dev-d/w";
        let tokens = tokenize(input);
        assert!(parse_dependencies(&tokens).is_ok());
        for (idx, token) in tokens.iter().enumerate() {
            if token == ")" {
                let mut truncated = tokens.clone();
                truncated.remove(idx);
                assert!(
                    parse_dependencies(&truncated).is_err(),
                    "removing ')' at {} should fail",
                    idx
                );
            }
        }
    }

    #[test]
    fn test_stray_close_is_trailing() {
        let err = parse("dev-libs/x ) dev-libs/y").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TrailingTokens);
        assert_eq!(err.position, 1);
    }

    #[test]
    fn test_guard_without_paren() {
        let err = parse("cups? net-print/cups").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedGroupOpen);
        assert_eq!(err.position, 1);

        let err = parse("||").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedGroupOpen);
    }

    #[test]
    fn test_unrecognized_content_in_group_fails_closed() {
        let err = parse("cups? ( %%% net-print/cups )").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
        assert_eq!(err.position, 2);
        assert_eq!(err.token.as_deref(), Some("%%%"));
    }

    #[test]
    fn test_guard_flags() {
        let tree = DependencyTree::parse(
            "DEPEND",
            &tokenize("a? ( dev-libs/x ) !b? ( ${FOO} ) || ( c? ( dev-libs/y ) dev-libs/z )"),
        )
        .unwrap();
        assert_eq!(tree.guard_flags(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_error_names_declaration() {
        let err = DependencyTree::parse("BDEPEND", &tokenize("a? ( dev-libs/x")).unwrap_err();
        assert_eq!(err.declaration.as_deref(), Some("BDEPEND"));
    }
}
