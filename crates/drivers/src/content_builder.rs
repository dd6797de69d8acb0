// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure, synchronous rendering of the literal body placed inside a `.strm`
//! file (spec §4.3).

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use strmsync_core::{ReplaceRule, StrmMode, TaskError};

/// Cleans `path` as a POSIX path: collapses `.`/`..`, dedupes slashes,
/// always leading-slash. `..` segments that would escape the root are
/// silently discarded rather than erroring (spec §4.3).
pub fn clean_posix_path(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            seg => stack.push(seg),
        }
    }
    format!("/{}", stack.join("/"))
}

#[derive(Debug, Clone, Default)]
pub struct ContentBuilderConfig {
    /// Required when rendering `StrmMode::Local`.
    pub local_root: Option<String>,
    /// Required when rendering `StrmMode::Url`.
    pub base_url: Option<String>,
    pub replace_rules: Vec<ReplaceRule>,
}

/// Renders the `.strm` body for `remote_path`, relative to `remote_root`.
pub fn build(
    remote_path: &str,
    remote_root: &str,
    mode: StrmMode,
    config: &ContentBuilderConfig,
) -> Result<String, TaskError> {
    let cleaned = clean_posix_path(remote_path);
    let cleaned_root = clean_posix_path(remote_root);
    let relative = cleaned
        .strip_prefix(&cleaned_root)
        .unwrap_or(&cleaned)
        .trim_start_matches('/');

    let mut body = match mode {
        StrmMode::Local => {
            let root = config
                .local_root
                .as_deref()
                .ok_or_else(|| TaskError::invalid_input("local_root is required for STRMMode=local"))?;
            join_slash(root, relative)
        }
        StrmMode::Url => {
            let base = config
                .base_url
                .as_deref()
                .ok_or_else(|| TaskError::invalid_input("base_url is required for STRMMode=url"))?;
            let encoded = relative
                .split('/')
                .map(|seg| utf8_percent_encode(seg, NON_ALPHANUMERIC).to_string())
                .collect::<Vec<_>>()
                .join("/");
            join_slash(base, &encoded)
        }
    };

    for rule in &config.replace_rules {
        body = body.replace(rule.from.as_str(), rule.to.as_str());
    }
    Ok(body)
}

fn join_slash(root: &str, relative: &str) -> String {
    let root = root.trim_end_matches('/');
    if relative.is_empty() {
        root.to_string()
    } else {
        format!("{root}/{relative}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_dot_and_dedupes_slashes() {
        assert_eq!(clean_posix_path("/a//./b/"), "/a/b");
    }

    #[test]
    fn escape_attempts_collapse_to_root() {
        assert_eq!(clean_posix_path("/../../etc/passwd"), "/etc/passwd");
        assert_eq!(clean_posix_path("../.."), "/");
    }

    #[test]
    fn local_mode_joins_relative_portion_under_local_root() {
        let config = ContentBuilderConfig {
            local_root: Some("/mnt/media".into()),
            ..Default::default()
        };
        let body = build("/movies/a.mkv", "/movies", StrmMode::Local, &config).unwrap();
        assert_eq!(body, "/mnt/media/a.mkv");
    }

    #[test]
    fn url_mode_percent_encodes_segments() {
        let config = ContentBuilderConfig {
            base_url: Some("https://cd2.local/dav".into()),
            ..Default::default()
        };
        let body = build("/movies/a b.mkv", "/movies", StrmMode::Url, &config).unwrap();
        assert_eq!(body, "https://cd2.local/dav/a%20b.mkv");
    }

    #[test]
    fn replace_rules_apply_in_order() {
        let config = ContentBuilderConfig {
            local_root: Some("/mnt/media".into()),
            replace_rules: vec![
                ReplaceRule { from: "/mnt/media".into(), to: "/media".into() },
                ReplaceRule { from: "/media/a".into(), to: "/media/renamed".into() },
            ],
            ..Default::default()
        };
        let body = build("/movies/a.mkv", "/movies", StrmMode::Local, &config).unwrap();
        assert_eq!(body, "/media/renamed.mkv");
    }

    #[test]
    fn local_mode_without_local_root_is_invalid_input() {
        let config = ContentBuilderConfig::default();
        let err = build("/a.mkv", "/", StrmMode::Local, &config).unwrap_err();
        assert_eq!(err.kind, strmsync_core::ErrorKind::InvalidInput);
    }
}
