//! Tests for recipe parsing and atom normalization

use depprune_package::recipe::{
    parse_dependencies, tokenize, DepExpr, DependencyTree, FlagDefault, GroupKind, Guard, Package,
};
use depprune_package::{normalize, ParseErrorKind};

/// Parse a dependency string as an RDEPEND of `app-misc/test`
fn rdepend(value: &str) -> DependencyTree {
    DependencyTree::parse("RDEPEND", &tokenize(value)).expect("valid dependency string")
}

mod normalization {
    use super::*;
    use pretty_assertions::assert_eq;

    const ATOMS: &[&str] = &[
        "net-print/cups",
        ">=net-print/cups-2.2.0",
        "<=dev-libs/glib-2.76.3-r1",
        "=sys-libs/zlib-1.2.13*",
        "~dev-lang/python-3.11.4",
        "dev-libs/openssl:0/3=",
        "dev-libs/glib:2",
        ">=dev-qt/qtcore-5.15.2:5=[icu,-debug]",
        "!!sys-apps/foo-1.0_p20230101",
        "!net-print/foomatic-filters",
        "  media-libs/libpng-1.6.39  ",
        "dev-util/gtk-doc-am",
        "x11-libs/gtk+-3.24.38:3",
        "chromeos-base/libchrome-0.0.1-r123",
    ];

    #[test]
    fn test_normalize_is_idempotent() {
        for atom in ATOMS {
            let once = normalize(atom);
            assert_eq!(normalize(&once), once, "atom: {}", atom);
        }
    }

    #[test]
    fn test_normalize_strips_decorations() {
        let expected = [
            "net-print/cups",
            "net-print/cups",
            "dev-libs/glib",
            "sys-libs/zlib",
            "dev-lang/python",
            "dev-libs/openssl",
            "dev-libs/glib",
            "dev-qt/qtcore",
            "sys-apps/foo",
            "net-print/foomatic-filters",
            "media-libs/libpng",
            "dev-util/gtk-doc-am",
            "x11-libs/gtk+",
            "chromeos-base/libchrome",
        ];
        let got: Vec<String> = ATOMS.iter().map(|a| normalize(a)).collect();
        assert_eq!(got, expected);
    }
}

mod dependency_expressions {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flag_guard_produces_one_edge() {
        let edges = rdepend("cups? ( net-print/cups )").edges("net-fs/samba");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target.cpn(), "net-print/cups");
        assert_eq!(edges[0].guard, Guard::flag("cups"));
    }

    #[test]
    fn test_any_of_group() {
        let tree = rdepend("|| ( dev-a/x dev-b/y )");
        assert_eq!(tree.exprs.len(), 1);
        let DepExpr::Group { kind, children } = &tree.exprs[0] else {
            panic!("expected a group, got {:?}", tree.exprs[0]);
        };
        assert_eq!(*kind, GroupKind::AnyOf);
        let names: Vec<String> = children
            .iter()
            .map(|c| match c {
                DepExpr::Atom(a) => a.cpn(),
                other => panic!("expected an atom, got {:?}", other),
            })
            .collect();
        assert_eq!(names, vec!["dev-a/x", "dev-b/y"]);

        for edge in tree.edges("app-misc/test") {
            assert_eq!(edge.guard.flags().count(), 0);
        }
    }

    #[test]
    fn test_whole_stream_is_consumed() {
        let inputs = [
            "dev-libs/a",
            "a? ( dev-libs/b ) !c? ( dev-libs/d )",
            "|| ( ( dev-libs/e dev-libs/f ) dev-libs/g ) ^^ ( x? ( dev-libs/h ) dev-libs/i )",
            "?? ( dev-libs/j dev-libs/k ) ${COMMON_DEPEND}",
            "|| ( )",
        ];
        for input in inputs {
            assert!(
                parse_dependencies(&tokenize(input)).is_ok(),
                "input: {}",
                input
            );
        }
    }

    #[test]
    fn test_dropping_any_close_paren_fails() {
        let input = "a? ( || ( dev-libs/b dev-libs/c ) ( dev-libs/d ) ) !e? ( dev-libs/f )";
        let tokens = tokenize(input);
        let closes: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| *t == ")")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(closes.len(), 4);

        for idx in closes {
            let mut truncated = tokens.clone();
            truncated.remove(idx);
            assert!(parse_dependencies(&truncated).is_err(), "removed ')' at {}", idx);
        }
    }

    #[test]
    fn test_truncated_stream_fails_with_unmatched_open() {
        let tokens = tokenize("x? ( dev-libs/a || ( dev-libs/b dev-libs/c ) )");
        let truncated = &tokens[..tokens.len() - 1];
        let err = parse_dependencies(truncated).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnmatchedOpen);
        assert_eq!(err.position, 0);
    }
}

mod packages {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMBA: &str = r#"
# Copyright 1999-2023 Gentoo Authors
EAPI=8

inherit systemd

DESCRIPTION="Samba Suite Version 4"
SLOT="0"
IUSE="acl addc ads ceph client cluster cups debug"
IUSE+=" +ldap pam -profiling-data python quota selinux syslog system-heimdal"
REQUIRED_USE="addc? ( python !system-heimdal ) ads? ( acl ldap python )"

COMMON_DEPEND="
	>=app-arch/libarchive-3.1.2[${MULTILIB_USEDEP}]
	dev-lang/perl:=
	cups? ( net-print/cups )
	ceph? ( sys-cluster/ceph )
	!minimal? ( dev-libs/icu:= )
"
RDEPEND="${COMMON_DEPEND}
	client? ( net-fs/cifs-utils[ads?] )
	selinux? ( sec-policy/selinux-samba )
"
DEPEND="${COMMON_DEPEND}"
BDEPEND="
	virtual/pkgconfig
"

src_configure() {
	local myconf=( --enable-fhs ) # not a declaration
}
"#;

    #[test]
    fn test_samba_recipe() {
        let pkg = Package::parse("net-fs/samba-4.16.8-r2", "/o/samba-4.16.8-r2.ebuild", SAMBA)
            .expect("samba recipe parses");

        assert_eq!(pkg.name, "net-fs/samba");
        let declarations: Vec<&str> = pkg.trees.iter().map(|t| t.declaration.as_str()).collect();
        assert_eq!(declarations, vec!["COMMON_DEPEND", "RDEPEND", "DEPEND", "BDEPEND"]);

        let cups: Vec<_> = pkg.edges_to("net-print/cups").collect();
        assert_eq!(cups.len(), 1);
        assert_eq!(cups[0].guard, Guard::flag("cups"));

        assert!(pkg.use_flags.is_toggleable("cups"));
        assert!(pkg.use_flags.is_toggleable("client"));
        assert!(!pkg.use_flags.is_toggleable("debug"));
        assert!(!pkg.use_flags.is_toggleable("minimal"));
        assert!(!pkg.use_flags.contains("minimal"));

        assert_eq!(pkg.use_flags.get("ldap").unwrap().default, FlagDefault::Enabled);
        assert_eq!(
            pkg.use_flags.get("profiling-data").unwrap().default,
            FlagDefault::Disabled
        );
    }

    #[test]
    fn test_unterminated_recipe() {
        let err = Package::parse("a/b", "b.ebuild", "IUSE=\"x\"\nRDEPEND=\"\n\tdev-libs/c\n")
            .unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedDeclaration);
        assert_eq!(err.position, 2);
    }
}
