//! Specifier and path helpers for module resolution.

use std::path::{Component, Path, PathBuf};

/// Marker for library-root shorthand imports.
pub const ALIAS_MARKER: char = '@';

/// Directory, relative to the application root, holding first-party libraries.
pub const LIB_DIR: &str = "lib";

/// Trailing extension of a specifier: everything after the last `.`, or the
/// whole specifier when it has none.
pub fn extension(specifier: &str) -> &str {
    specifier.rsplit('.').next().unwrap_or(specifier)
}

/// Last `/`-separated segment.
pub fn file_name(specifier: &str) -> &str {
    specifier.rsplit('/').next().unwrap_or(specifier)
}

/// Rewrite `@pkg/sub` to `<app_root>/lib/pkg/sub/sub.js`.
pub fn expand_alias(specifier: &str, app_root: &Path) -> Option<String> {
    let name = specifier.strip_prefix(ALIAS_MARKER)?;
    let path = app_root
        .join(LIB_DIR)
        .join(name)
        .join(format!("{}.js", file_name(name)));
    Some(path.to_string_lossy().into_owned())
}

/// Join a specifier onto a base directory and normalize the result.
/// Absolute specifiers replace the base.
pub fn join(base: &Path, specifier: &str) -> PathBuf {
    normalize(&base.join(specifier))
}

/// Lexically resolve `.` and `..` components without touching the disk.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Name of `path` inside the embedded resource store: relative to the
/// application root with `/` separators, or the path without its leading
/// slash when it lies outside the root.
pub fn resource_name(path: &Path, app_root: &Path) -> String {
    let relative = path.strip_prefix(app_root).unwrap_or(path);
    let name: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    name.join("/")
}
