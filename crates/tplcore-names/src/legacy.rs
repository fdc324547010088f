//! The legacy name format.
//!
//! `..` and `.` steps are collapsed textually, repeated `/` and repeated `*`
//! steps are preserved. Only `scheme://` is recognized as a scheme.

use crate::{MalformedNameError, Malformedness};

const PARENT_DIR: &str = "/../";
const CURRENT_DIR: &str = "/./";

/// Length of the `scheme://` prefix, 0 if none.
pub(crate) fn scheme_end(name: &str) -> usize {
    match name.find("://") {
        Some(idx) if idx > 0 => idx + 3,
        _ => 0,
    }
}

pub(crate) fn to_root_based(base: &str, target: &str) -> String {
    if target.contains("://") {
        return target.to_string();
    }

    if let Some(relative) = target.strip_prefix('/') {
        let base_scheme_end = scheme_end(base);
        return format!("{}{}", &base[..base_scheme_end], relative);
    }

    let dir = if base.ends_with('/') {
        base
    } else {
        &base[..base.rfind('/').map(|idx| idx + 1).unwrap_or(0)]
    };
    format!("{}{}", dir, target)
}

pub(crate) fn normalize(name: &str) -> Result<String, MalformedNameError> {
    let (scheme, path) = name.split_at(scheme_end(name));
    let backing_out = || MalformedNameError::new(name, Malformedness::BackingOutFromRoot);

    let mut path = path.to_string();
    loop {
        let before = path.len();

        while let Some(idx) = path.find(PARENT_DIR) {
            if idx == 0 {
                return Err(backing_out());
            }
            let previous_step = path[..idx].rfind('/').map(|i| i + 1).unwrap_or(0);
            path = format!("{}{}", &path[..previous_step], &path[idx + PARENT_DIR.len()..]);
        }

        while let Some(idx) = path.find(CURRENT_DIR) {
            path.replace_range(idx..idx + CURRENT_DIR.len() - 1, "");
        }
        if let Some(rest) = path.strip_prefix("./") {
            path = rest.to_string();
        }

        let trimmed = path.trim_start_matches('/');
        if trimmed.len() != path.len() {
            path = trimmed.to_string();
        }

        if path.len() == before {
            break;
        }
    }

    if path == ".." || path.starts_with("../") {
        return Err(backing_out());
    }

    Ok(format!("{}{}", scheme, path))
}
