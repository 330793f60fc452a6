//! Source location helpers
//!
//! Repository locations come in three shapes: URLs with a scheme
//! (`https://host/group/repo.git`), scp-like ssh addresses
//! (`git@host:group/repo.git`) and local paths. These helpers derive a
//! comparable identity from any of them, build default mirror paths, and
//! strip credentials out of text before it reaches logs or reports.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref SCP_LIKE: Regex =
        Regex::new(r"^[A-Za-z0-9._-]+@[A-Za-z0-9.-]+:").expect("valid scp pattern");
    static ref URL_USERINFO: Regex =
        Regex::new(r"(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*://)[^/@\s]+@").expect("valid userinfo pattern");
}

/// True for anything git would reach over the network.
pub fn is_remote(location: &str) -> bool {
    let location = location.trim();
    if location.starts_with("file://") {
        return false;
    }
    location.contains("://") || SCP_LIKE.is_match(location)
}

/// Normalized identity used to decide whether a target already mirrors a source.
///
/// Credentials are dropped, scheme and host are lowercased, trailing `/` and
/// `.git` are removed from remote paths. Local paths are made absolute.
pub fn source_identity(location: &str) -> String {
    let trimmed = location.trim();

    if let Some(path) = trimmed.strip_prefix("file://") {
        return local_identity(path);
    }

    if let Some((scheme, rest)) = trimmed.split_once("://") {
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
        return format!(
            "{}://{}/{}",
            scheme.to_ascii_lowercase(),
            host.to_ascii_lowercase(),
            strip_repo_suffix(path)
        );
    }

    if SCP_LIKE.is_match(trimmed) {
        if let Some((authority, path)) = trimmed.split_once(':') {
            return format!("{}:{}", authority.to_ascii_lowercase(), strip_repo_suffix(path));
        }
    }

    local_identity(trimmed)
}

fn strip_repo_suffix(path: &str) -> &str {
    let path = path.trim_end_matches('/');
    path.strip_suffix(".git").unwrap_or(path).trim_end_matches('/')
}

fn local_identity(path: &str) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| PathBuf::from(path));
    let text = absolute.to_string_lossy().into_owned();
    let trimmed = text.trim_end_matches('/');
    if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() }
}

/// Relative path a repository lands at below the target root.
///
/// `https://gitlab.example.com/dso/app1.git` becomes `dso/app1` (with a
/// `.git` suffix for bare mirrors), keeping the source namespace the way the
/// destination host lays it out.
pub fn namespace_path(location: &str, bare: bool) -> PathBuf {
    let trimmed = location.trim();
    let path = if let Some(local) = trimmed.strip_prefix("file://") {
        last_component(local)
    } else if let Some((_, rest)) = trimmed.split_once("://") {
        rest.split_once('/').map_or("", |(_, path)| path).to_string()
    } else if SCP_LIKE.is_match(trimmed) {
        trimmed.split_once(':').map_or("", |(_, path)| path).to_string()
    } else {
        last_component(trimmed)
    };

    let stem = strip_repo_suffix(path.trim_start_matches('/'));
    let stem = if stem.is_empty() { "repository" } else { stem };
    let mut relative = PathBuf::new();
    for part in stem.split('/').filter(|part| !part.is_empty() && *part != "." && *part != "..") {
        relative.push(part);
    }
    if bare {
        let mut name = relative.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".git");
        relative.set_file_name(name);
    }
    relative
}

fn last_component(path: &str) -> String {
    Path::new(path.trim_end_matches('/'))
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Short display name for a location, e.g. `dso/app1`.
pub fn display_name(location: &str) -> String {
    namespace_path(location, false).to_string_lossy().into_owned()
}

/// Remove embedded URL credentials and any known secret values from `text`.
pub fn redact(text: &str, secrets: &[&str]) -> String {
    let mut scrubbed = URL_USERINFO.replace_all(text, "${scheme}***@").into_owned();
    for secret in secrets.iter().filter(|secret| !secret.is_empty()) {
        scrubbed = scrubbed.replace(secret, "***");
    }
    scrubbed
}
