//! Template name formats.
//!
//! A template is requested by a name such as `mail/../common/footer.ftl` or
//! `classpath:layout.ftl`. Before any loader is asked for bytes the name is
//! checked and brought to a canonical, root-based form:
//!
//! - no `.` or `..` steps (`..` that would leave the root is rejected)
//! - no leading `/`
//! - the `*` acquisition marker is kept as a step of its own
//!
//! Two formats exist. [`NameFormat::Normalized`] collapses `//`, recognizes
//! terminating `.`/`..` steps, and treats steps around `*` correctly.
//! [`NameFormat::Legacy`] preserves repeated separators and collapses `..`
//! textually. Both reject NUL characters, backslashes and root-escaping `..`.

mod legacy;
mod normalized;

use std::fmt;

/// The acquisition marker step.
pub const ACQUISITION_MARKER: &str = "*";

/// Why a name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformedness {
    /// The name contains a `\0`.
    NullCharacter,
    /// The name contains a `\`.
    Backslash,
    /// A `..` step would move above the root directory.
    BackingOutFromRoot,
    /// A `:` appears in the path part (normalized format only).
    MisplacedColon,
}

impl Malformedness {
    /// Human readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Malformedness::NullCharacter => "null character (\\0) is not allowed in template names",
            Malformedness::Backslash => {
                "backslash (\"\\\") is not allowed in template names; use slash (\"/\") instead"
            }
            Malformedness::BackingOutFromRoot => "backing out from the root directory is not allowed",
            Malformedness::MisplacedColon => {
                "the ':' character can only be used after the scheme name, not in the path part"
            }
        }
    }
}

/// A raw template name failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed template name {name:?}: {}", .kind.description())]
pub struct MalformedNameError {
    /// The offending raw name, as supplied.
    pub name: String,
    /// What is wrong with it.
    pub kind: Malformedness,
}

impl MalformedNameError {
    pub(crate) fn new(name: &str, kind: Malformedness) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// A successfully normalized template name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedName {
    /// Canonical root-based path (what lookups and caches key on).
    pub canonical: String,
    /// The name as it was requested.
    pub requested: String,
}

impl fmt::Display for ResolvedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Selects how names are normalized and combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NameFormat {
    /// Preserves repeated separators, collapses `..` textually.
    Legacy,
    /// Collapses repeated separators and redundant `*` steps.
    #[default]
    Normalized,
}

impl NameFormat {
    /// All formats, in declaration order.
    pub const ALL: [NameFormat; 2] = [NameFormat::Legacy, NameFormat::Normalized];

    /// Configuration name of this format.
    pub fn as_str(&self) -> &'static str {
        match self {
            NameFormat::Legacy => "legacy",
            NameFormat::Normalized => "normalized",
        }
    }

    /// Look a format up by its configuration name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Normalize a root-based name into its canonical form.
    pub fn normalize(&self, name: &str) -> Result<String, MalformedNameError> {
        check_common(name)?;
        match self {
            NameFormat::Legacy => legacy::normalize(name),
            NameFormat::Normalized => normalized::normalize(name),
        }
    }

    /// Normalize and keep the requested form alongside the canonical one.
    pub fn resolve(&self, name: &str) -> Result<ResolvedName, MalformedNameError> {
        Ok(ResolvedName {
            canonical: self.normalize(name)?,
            requested: name.to_string(),
        })
    }

    /// Resolve `target` against the directory of `base`.
    ///
    /// An absolute target (leading `/`, or a scheme) ignores `base`'s
    /// directory. The result is not normalized.
    pub fn to_root_based(&self, base: &str, target: &str) -> String {
        match self {
            NameFormat::Legacy => legacy::to_root_based(base, target),
            NameFormat::Normalized => normalized::to_root_based(base, target),
        }
    }

    /// Resolve and normalize in one step.
    pub fn resolve_relative(
        &self,
        base: &str,
        target: &str,
    ) -> Result<ResolvedName, MalformedNameError> {
        let joined = self.to_root_based(base, target);
        Ok(ResolvedName {
            canonical: self.normalize(&joined)?,
            requested: target.to_string(),
        })
    }

    /// Turn a root-based name into the absolute form shown to users.
    pub fn root_based_to_absolute(&self, name: &str) -> String {
        let has_scheme = match self {
            NameFormat::Legacy => legacy::scheme_end(name) != 0,
            NameFormat::Normalized => normalized::scheme_end(name) != 0,
        };
        if has_scheme || name.starts_with('/') {
            name.to_string()
        } else {
            format!("/{}", name)
        }
    }
}

impl fmt::Display for NameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn check_common(name: &str) -> Result<(), MalformedNameError> {
    if name.contains('\0') {
        return Err(MalformedNameError::new(name, Malformedness::NullCharacter));
    }
    if name.contains('\\') {
        return Err(MalformedNameError::new(name, Malformedness::Backslash));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_null_and_backslash_in_both_formats() {
        for format in NameFormat::ALL {
            let err = format.normalize("foo\0").unwrap_err();
            assert_eq!(err.kind, Malformedness::NullCharacter);
            assert_eq!(err.name, "foo\0");
            assert!(err.to_string().contains("null character"));

            let err = format.normalize("././foo\\bar.ftl").unwrap_err();
            assert_eq!(err.kind, Malformedness::Backslash);
            assert!(err.to_string().contains("backslash"));
        }
    }

    #[test]
    fn test_from_name() {
        assert_eq!(NameFormat::from_name("LEGACY"), Some(NameFormat::Legacy));
        assert_eq!(NameFormat::from_name(" normalized "), Some(NameFormat::Normalized));
        assert_eq!(NameFormat::from_name("2.4"), None);
    }

    #[test]
    fn test_resolve_keeps_requested() {
        let resolved = NameFormat::Normalized.resolve("/a/./b.ftl").unwrap();
        assert_eq!(resolved.canonical, "a/b.ftl");
        assert_eq!(resolved.requested, "/a/./b.ftl");
    }

    #[test]
    fn test_root_based_to_absolute() {
        let f = NameFormat::Normalized;
        assert_eq!(f.root_based_to_absolute("foo/bar"), "/foo/bar");
        assert_eq!(f.root_based_to_absolute("scheme://foo/bar"), "scheme://foo/bar");
        assert_eq!(f.root_based_to_absolute("/foo/bar"), "/foo/bar");
        assert_eq!(f.root_based_to_absolute("a/b://c/d"), "/a/b://c/d");
        assert_eq!(f.root_based_to_absolute("b:/c/d"), "b:/c/d");
        assert_eq!(f.root_based_to_absolute("b:c/d"), "b:c/d");

        assert_eq!(NameFormat::Legacy.root_based_to_absolute("b:c/d"), "/b:c/d");
        assert_eq!(NameFormat::Legacy.root_based_to_absolute("s://c/d"), "s://c/d");
    }

    #[test]
    fn test_resolve_relative() {
        let f = NameFormat::Normalized;
        let r = f.resolve_relative("mail/welcome.ftl", "../lib/util.ftl").unwrap();
        assert_eq!(r.canonical, "lib/util.ftl");
        assert_eq!(r.requested, "../lib/util.ftl");

        let err = f.resolve_relative("welcome.ftl", "../util.ftl").unwrap_err();
        assert_eq!(err.kind, Malformedness::BackingOutFromRoot);
    }
}
