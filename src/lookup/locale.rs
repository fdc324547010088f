//! Locales and the locale-suffix fallback sequence.

use std::fmt;

/// A locale such as `en`, `en_US` or `aa_BB_CC_DD`.
///
/// Parts are kept as given; only the separator is normalized (`-` becomes `_`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locale {
    tag: String,
}

/// A locale string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid locale {raw:?}: {reason}")]
pub struct LocaleError {
    pub raw: String,
    pub reason: &'static str,
}

impl Locale {
    /// Parse `lang[_COUNTRY[_VARIANT...]]`.
    pub fn parse(raw: &str) -> Result<Self, LocaleError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LocaleError {
                raw: raw.to_string(),
                reason: "empty locale",
            });
        }

        let tag = trimmed.replace('-', "_");
        for part in tag.split('_') {
            if part.is_empty() {
                return Err(LocaleError {
                    raw: raw.to_string(),
                    reason: "empty locale component",
                });
            }
            if !part.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(LocaleError {
                    raw: raw.to_string(),
                    reason: "locale components must be alphanumeric",
                });
            }
        }
        Ok(Self { tag })
    }

    pub fn language(&self) -> &str {
        self.parts().next().unwrap_or("")
    }

    pub fn country(&self) -> Option<&str> {
        self.parts().nth(1)
    }

    /// Everything after the country, joined with `_`.
    pub fn variant(&self) -> Option<&str> {
        let mut split = self.tag.splitn(3, '_');
        split.nth(2)
    }

    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.tag.split('_')
    }

    pub fn as_str(&self) -> &str {
        &self.tag
    }

    /// Suffixes to try, most specific first, ending with the empty suffix.
    ///
    /// `aa_BB_CC_DD` gives `_aa_BB_CC_DD`, `_aa_BB_CC`, `_aa_BB`, `_aa`, ``.
    pub fn suffixes(&self) -> Vec<String> {
        let parts: Vec<&str> = self.parts().collect();
        let mut suffixes: Vec<String> = (1..=parts.len())
            .rev()
            .map(|n| format!("_{}", parts[..n].join("_")))
            .collect();
        suffixes.push(String::new());
        suffixes
    }
}

impl Default for Locale {
    /// `en_US`
    fn default() -> Self {
        Self {
            tag: "en_US".to_string(),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}

impl std::str::FromStr for Locale {
    type Err = LocaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Insert `suffix` before the extension of the last path step.
///
/// `foo/bar.ftl` + `_de` gives `foo/bar_de.ftl`; `test` + `_de` gives `test_de`.
pub fn insert_locale_suffix(name: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return name.to_string();
    }
    let step_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name[step_start..].rfind('.') {
        Some(dot) => {
            let dot = step_start + dot;
            format!("{}{}{}", &name[..dot], suffix, &name[dot..])
        }
        None => format!("{}{}", name, suffix),
    }
}
