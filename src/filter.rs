use std::{collections::BTreeSet, fmt, path::Path};

use serde::{Deserialize, Serialize};

/// Set of normalized file extensions (`.jpg`, `.mp4`, ...).
///
/// Stored in settings as a comma separated string, e.g. `".jpg, PNG,.Gif"`.
/// Entries are lowercased, trimmed and get a leading dot; empty entries are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ExtensionSet(BTreeSet<String>);

impl ExtensionSet {
    pub fn parse(list: &str) -> Self {
        list.split(',').collect()
    }

    pub fn contains(&self, ext: &str) -> bool {
        match normalize_extension(ext) {
            Some(ext) => self.0.contains(&ext),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for ExtensionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().filter_map(|e| normalize_extension(e.as_ref())).collect())
    }
}

impl From<String> for ExtensionSet {
    fn from(list: String) -> Self {
        Self::parse(&list)
    }
}

impl From<ExtensionSet> for String {
    fn from(set: ExtensionSet) -> Self {
        set.to_string()
    }
}

impl fmt::Display for ExtensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.iter().collect::<Vec<_>>().join(",");
        f.write_str(&joined)
    }
}

/// `" JPG "` -> `".jpg"`, `""` -> `None`.
pub fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    Some(format!(".{}", trimmed.to_lowercase()))
}

/// Normalized extension of `path`, if it has one.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(normalize_extension)
}

/// Whitelist/blacklist policy. An empty whitelist lets everything through,
/// the blacklist always excludes.
pub fn is_allowed(path: &Path, whitelist: &ExtensionSet, blacklist: &ExtensionSet) -> bool {
    match extension_of(path) {
        Some(ext) => (whitelist.is_empty() || whitelist.0.contains(&ext)) && !blacklist.0.contains(&ext),
        None => whitelist.is_empty(),
    }
}
