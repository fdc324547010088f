//! The normalized name format.
//!
//! Normalization steps, applied to the part after the scheme:
//! - `//` collapses to `/`, the leading `/` is dropped
//! - `.` steps are removed; a terminating `.` leaves a terminating `/`
//! - `..` removes the preceding step; `*` steps in between are kept as one `*`
//! - consecutive `*` steps collapse, a leading `*` step is dropped

use crate::{MalformedNameError, Malformedness, ACQUISITION_MARKER};

/// Length of the scheme section (`scheme:` or `scheme://`), 0 if none.
pub(crate) fn scheme_end(name: &str) -> usize {
    let Some(colon) = name.find(':') else {
        return 0;
    };
    if name[..colon].contains('/') {
        return 0;
    }
    if name[colon + 1..].starts_with("//") {
        colon + 3
    } else {
        colon + 1
    }
}

pub(crate) fn to_root_based(base: &str, target: &str) -> String {
    if scheme_end(target) != 0 {
        return target.to_string();
    }

    if let Some(relative) = target.strip_prefix('/') {
        let base_scheme_end = scheme_end(base);
        return format!("{}{}", &base[..base_scheme_end], relative);
    }

    let dir = if base.ends_with('/') {
        base
    } else {
        let end = match base.rfind('/') {
            Some(idx) => idx + 1,
            // "classpath:t.ftl" keeps its scheme
            None => scheme_end(base),
        };
        &base[..end]
    };
    format!("{}{}", dir, target)
}

pub(crate) fn normalize(name: &str) -> Result<String, MalformedNameError> {
    let (scheme, path) = name.split_at(scheme_end(name));

    if path.contains(':') {
        return Err(MalformedNameError::new(name, Malformedness::MisplacedColon));
    }

    let steps: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut directory = path.ends_with('/');

    let mut out: Vec<&str> = Vec::with_capacity(steps.len());
    let last_index = steps.len().saturating_sub(1);
    for (i, step) in steps.iter().enumerate() {
        let is_last = i == last_index;
        match *step {
            "." => {
                if is_last {
                    directory = true;
                }
            }
            ".." => {
                let mut skipped_marker = false;
                while out.last() == Some(&ACQUISITION_MARKER) {
                    out.pop();
                    skipped_marker = true;
                }
                if out.pop().is_none() {
                    return Err(MalformedNameError::new(
                        name,
                        Malformedness::BackingOutFromRoot,
                    ));
                }
                if skipped_marker {
                    out.push(ACQUISITION_MARKER);
                }
                if is_last {
                    directory = true;
                }
            }
            other => out.push(other),
        }
    }

    out.dedup_by(|a, b| *a == ACQUISITION_MARKER && *b == ACQUISITION_MARKER);
    if out.first() == Some(&ACQUISITION_MARKER) {
        out.remove(0);
    }

    let mut normalized = String::with_capacity(name.len());
    normalized.push_str(scheme);
    normalized.push_str(&out.join("/"));
    if directory && !out.is_empty() {
        normalized.push('/');
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(name: &str) -> String {
        normalize(name).unwrap()
    }

    fn assert_backing_out(name: &str) {
        let err = normalize(name).unwrap_err();
        assert_eq!(err.kind, Malformedness::BackingOutFromRoot, "{}", name);
        assert_eq!(err.name, name);
        assert!(err.to_string().contains("backing out"));
    }

    #[test]
    fn test_to_root_based_relative() {
        assert_eq!(to_root_based("a/", "b"), "a/b");
        assert_eq!(to_root_based("/a/", "b"), "/a/b");
        assert_eq!(to_root_based("a/f", "b"), "a/b");
        assert_eq!(to_root_based("/a/f", "b"), "/a/b");
        assert_eq!(to_root_based("s://a/", "b"), "s://a/b");
        assert_eq!(to_root_based("s:///a/f", "b"), "s:///a/b");
        assert_eq!(to_root_based("s://f", "b"), "s://b");
        assert_eq!(to_root_based("s:f", "b"), "s:b");
        assert_eq!(to_root_based("s:/f", "b"), "s:/b");
        assert_eq!(to_root_based("s:f/", "b"), "s:f/b");
    }

    #[test]
    fn test_to_root_based_absolute() {
        assert_eq!(to_root_based("a/", "/b"), "b");
        assert_eq!(to_root_based("/a/", "/b"), "b");
        assert_eq!(to_root_based("a/s:/f/", "/b"), "b");
        assert_eq!(to_root_based("s://x/", "/b"), "s://b");
        assert_eq!(to_root_based("s:///x/", "/b"), "s://b");
        assert_eq!(to_root_based("s:f", "/b"), "s:b");
        assert_eq!(to_root_based("s:/f/", "/b"), "s:b");
        assert_eq!(to_root_based("a/s://f/", "/b"), "b");
        assert_eq!(to_root_based("a/", "s://b"), "s://b");
        assert_eq!(to_root_based("i://a/", "s://b"), "s://b");
    }

    #[test]
    fn test_dot_steps() {
        for lead in ["", "/"] {
            assert_eq!(norm(&format!("{}foo", lead)), "foo");
            assert_eq!(norm(&format!("{}./foo", lead)), "foo");
            assert_eq!(norm(&format!("{}./././foo", lead)), "foo");
            assert_eq!(norm(&format!("{}bar/../foo", lead)), "foo");
            assert_backing_out(&format!("{}bar/../../x/foo", lead));
            assert_backing_out(&format!("{}../x", lead));
            assert_backing_out(&format!("{}../../../x", lead));
        }
        assert_eq!(norm("bar/./../foo"), "foo");
        assert_eq!(norm("a/b/"), "a/b/");
        assert_eq!(norm("a/b/../"), "a/");
        assert_eq!(norm("a/c../..d/e*/*f"), "a/c../..d/e*/*f");
        assert_backing_out("../../foo");
        assert_backing_out("..");
        assert_backing_out("x://../../../foo");
        assert_backing_out("x:../foo");
    }

    #[test]
    fn test_terminating_steps() {
        assert_eq!(norm(""), "");
        assert_eq!(norm("/"), "");
        assert_eq!(norm("."), "");
        assert_eq!(norm("foo/bar/.."), "foo/");
        assert_eq!(norm("foo/bar/."), "foo/bar/");
    }

    #[test]
    fn test_dot_dot_and_marker() {
        assert_eq!(norm("a/b/*/../foo"), "a/*/foo");
        assert_eq!(norm("a/b/*/../../foo"), "foo");
        assert_backing_out("a/b/*/../../../foo");
        assert_eq!(norm("a/b/*/*/../foo"), "a/*/foo");
        assert_eq!(norm("a/b/*/c/*/../foo"), "a/b/*/foo");
        assert_eq!(norm("a/b/*/c/d/*/../../foo"), "a/b/*/foo");
        assert_eq!(norm("a/*//b/*/c/d/*/../../foo"), "a/*/b/*/foo");
        assert_eq!(norm("a/../*"), "");
        assert_eq!(norm("a/../*/"), "");
        assert_backing_out("*/..");
    }

    #[test]
    fn test_redundant_separators_and_markers() {
        assert_eq!(norm("foo//bar"), "foo/bar");
        assert_eq!(norm("////foo//bar///baaz////wombat"), "foo/bar/baaz/wombat");
        assert_eq!(norm("a/*/*/b"), "a/*/b");
        assert_eq!(norm("a/*/*/*/b"), "a/*/b");
        assert_eq!(norm("*/*/b"), "b");
        assert_eq!(norm("/*/*/b"), "b");
        assert_eq!(norm("b/*/*"), "b/*");
        assert_eq!(norm("*/a/*/b/*/*/c"), "a/*/b/*/c");
        assert_eq!(norm("foo/bar/*"), "foo/bar/*");
    }

    #[test]
    fn test_schemes() {
        assert_eq!(norm("schema://"), "schema://");
        assert_eq!(norm("scheme://foo"), "scheme://foo");
        assert_eq!(norm("scheme://foo//x/y"), "scheme://foo/x/y");
        assert_eq!(norm("scheme:///foo"), "scheme://foo");
        assert_eq!(norm("scheme:////foo"), "scheme://foo");
        assert_eq!(norm("s:a/b"), "s:a/b");
        assert_eq!(norm("s:/a/b"), "s:a/b");
        assert_eq!(norm("s:///a/b"), "s://a/b");
    }

    #[test]
    fn test_misplaced_colon() {
        for name in ["a/b:c/d", "a/b:/.."] {
            let err = normalize(name).unwrap_err();
            assert_eq!(err.kind, Malformedness::MisplacedColon);
            assert!(err.to_string().contains("':'"));
        }
    }
}
