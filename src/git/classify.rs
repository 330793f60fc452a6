//! Failure classification for git subprocesses
//!
//! Maps `(exit code, stderr)` onto a closed set of failure classes so the
//! engine can decide whether a retry has any chance of succeeding. Pattern
//! groups are checked in order: auth, then not-found, then transient;
//! anything unmatched is permanent.

use lazy_static::lazy_static;
use regex::RegexSet;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureClass {
    /// Network hiccups, server errors, lock contention; worth retrying
    Transient,
    /// Credentials rejected or missing
    Auth,
    /// Source repository or ref does not exist
    NotFound,
    Permanent,
}

impl FailureClass {
    pub fn is_transient(self) -> bool {
        matches!(self, FailureClass::Transient)
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureClass::Transient => "transient",
            FailureClass::Auth => "auth",
            FailureClass::NotFound => "not-found",
            FailureClass::Permanent => "permanent",
        };
        f.write_str(label)
    }
}

lazy_static! {
    static ref AUTH: RegexSet = RegexSet::new([
        r"(?i)authentication failed",
        r"(?i)could not read (username|password)",
        r"(?i)terminal prompts disabled",
        r"(?i)http basic: access denied",
        r"(?i)invalid username or password",
        r"(?i)permission denied \((publickey|keyboard-interactive)",
        r"(?i)host key verification failed",
        r"(?i)the requested url returned error: 40[13]",
    ])
    .expect("valid auth patterns");
    static ref NOT_FOUND: RegexSet = RegexSet::new([
        r"(?i)repository (.* )?not found",
        r"(?i)repository '.*' does not exist",
        r"(?i)does not appear to be a git repository",
        r"(?i)not a git repository",
        r"(?i)couldn't find remote ref",
        r"(?i)remote branch .* not found",
        r"(?i)the requested url returned error: 404",
    ])
    .expect("valid not-found patterns");
    static ref TRANSIENT: RegexSet = RegexSet::new([
        r"(?i)could not resolve (host|proxy)",
        r"(?i)temporary failure in name resolution",
        r"(?i)connection (timed out|refused|reset)",
        r"(?i)operation timed out",
        r"(?i)failed to connect to",
        r"(?i)network is unreachable",
        r"(?i)early eof",
        r"(?i)the remote end hung up unexpectedly",
        r"(?i)rpc failed",
        r"(?i)the requested url returned error: 5\d\d",
        r"(?i)(gnutls_handshake|ssl_connect|ssl_error|tls connection was non-properly terminated)",
        r"(?i)http/2 stream \d+ was not closed cleanly",
        r"(?i)index-pack failed",
        r"(?i)unable to create '.*\.lock'",
        r"(?i)cannot lock ref",
        r"(?i)could not read from remote repository",
    ])
    .expect("valid transient patterns");
}

/// Classify a failed git invocation.
///
/// `exit_code` is `None` when the process died from a signal, which is
/// treated as transient.
pub fn classify(exit_code: Option<i32>, stderr: &str) -> FailureClass {
    if exit_code.is_none() {
        return FailureClass::Transient;
    }
    if AUTH.is_match(stderr) {
        FailureClass::Auth
    } else if NOT_FOUND.is_match(stderr) {
        FailureClass::NotFound
    } else if TRANSIENT.is_match(stderr) {
        FailureClass::Transient
    } else {
        FailureClass::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_errors_are_transient() {
        let samples = [
            "fatal: unable to access 'https://gitlab.example.com/a.git/': Could not resolve host: gitlab.example.com",
            "fatal: unable to access 'https://x/': Failed to connect to x port 443: Connection refused",
            "error: RPC failed; curl 56 GnuTLS recv error (-9)\nfatal: early EOF",
            "fatal: the remote end hung up unexpectedly",
            "error: The requested URL returned error: 502",
            "ssh: connect to host example.com port 22: Connection timed out\nfatal: Could not read from remote repository.",
            "fatal: Unable to create '/srv/mirror.git/packed-refs.lock': File exists.",
        ];
        for stderr in samples {
            assert_eq!(classify(Some(128), stderr), FailureClass::Transient, "{stderr}");
        }
    }

    #[test]
    fn test_auth_errors() {
        let samples = [
            "remote: HTTP Basic: Access denied\nfatal: Authentication failed for 'https://gitlab.example.com/a.git/'",
            "fatal: could not read Username for 'https://github.com': terminal prompts disabled",
            "git@github.com: Permission denied (publickey).\nfatal: Could not read from remote repository.",
            "error: The requested URL returned error: 403",
        ];
        for stderr in samples {
            assert_eq!(classify(Some(128), stderr), FailureClass::Auth, "{stderr}");
        }
    }

    #[test]
    fn test_not_found_errors() {
        let samples = [
            "remote: Repository not found.\nfatal: repository 'https://github.com/o/missing.git/' not found",
            "fatal: repository '/srv/git/missing' does not exist",
            "fatal: '/tmp/nope' does not appear to be a git repository\nfatal: Could not read from remote repository.",
            "fatal: couldn't find remote ref refs/heads/nope",
            "warning: Could not find remote branch nope to clone.\nfatal: Remote branch nope not found in upstream origin",
        ];
        for stderr in samples {
            assert_eq!(classify(Some(128), stderr), FailureClass::NotFound, "{stderr}");
        }
    }

    #[test]
    fn test_unknown_errors_are_permanent() {
        assert_eq!(
            classify(Some(128), "fatal: Not possible to fast-forward, aborting."),
            FailureClass::Permanent
        );
        assert_eq!(classify(Some(1), ""), FailureClass::Permanent);
    }

    #[test]
    fn test_signal_death_is_transient() {
        assert_eq!(classify(None, ""), FailureClass::Transient);
        assert!(FailureClass::Transient.is_transient());
        assert!(!FailureClass::Auth.is_transient());
    }
}
