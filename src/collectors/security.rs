use crate::collectors::HostProbe;
use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, BufRead};
use std::path::PathBuf;
use tracing::debug;

const FAILED_PASSWORD: &str = "failed password";

/// Where failed authentication attempts are counted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSource {
    /// systemd journal, current boot only.
    Journal,
    File(PathBuf),
}

impl fmt::Display for AuthSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthSource::Journal => f.write_str("journal"),
            AuthSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

pub fn auth_sources(journal: bool, files: &[PathBuf]) -> Vec<AuthSource> {
    let mut out = Vec::with_capacity(files.len() + 1);
    if journal {
        out.push(AuthSource::Journal);
    }
    out.extend(files.iter().cloned().map(AuthSource::File));
    out
}

/// Distinct user names from `who`-style output (user name in the first column), sorted.
pub fn parse_session_users(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Counts lines containing `Failed password` in any case. Reads one line at a time into a
/// reused buffer, so auth logs of any size stay out of memory; invalid UTF-8 is tolerated.
pub fn count_failed_passwords<R: BufRead>(mut reader: R) -> io::Result<u64> {
    let needle = FAILED_PASSWORD.as_bytes();
    let mut line = Vec::with_capacity(256);
    let mut count = 0;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(count);
        }
        if line.windows(needle.len()).any(|w| w.eq_ignore_ascii_case(needle)) {
            count += 1;
        }
    }
}

/// Counts failed logins from the first source the probe can read. Later sources are never
/// consulted once one is available, even if it holds zero matches.
pub fn failed_login_count(probe: &mut dyn HostProbe, sources: &[AuthSource]) -> Option<u64> {
    for source in sources {
        if let Some(count) = probe.failed_logins(source) {
            debug!(source = %source, count, "failed login source selected");
            return Some(count);
        }
        debug!(source = %source, "failed login source unavailable");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::tests::FixtureProbe;

    #[test]
    fn session_users_are_unique_and_sorted() {
        let who = "zoe      pts/0        2024-05-01 10:00 (10.0.0.5)\n\
                   admin    tty1         2024-05-01 09:00\n\
                   zoe      pts/1        2024-05-01 10:05 (10.0.0.5)\n\n";
        assert_eq!(parse_session_users(who), vec!["admin", "zoe"]);
        assert!(parse_session_users("").is_empty());
    }

    #[test]
    fn failed_password_match_ignores_case() {
        let log = "May  1 sshd[1]: Failed password for root from 1.2.3.4\n\
                   May  1 sshd[2]: Accepted publickey for zoe\n\
                   May  1 sshd[3]: FAILED PASSWORD for invalid user bob\n";
        assert_eq!(count_failed_passwords(log.as_bytes()).unwrap(), 2);
        assert_eq!(count_failed_passwords(&b""[..]).unwrap(), 0);
    }

    #[test]
    fn failed_password_count_streams_lines() {
        // Lines longer than the reader's buffer, a missing final newline and invalid UTF-8.
        let mut log = Vec::new();
        log.extend_from_slice(&vec![b'x'; 10_000]);
        log.extend_from_slice(b" failed Password for root\n");
        log.extend_from_slice(b"sshd: \xff\xfe Failed password for bob\n");
        log.extend_from_slice(b"sshd: Accepted password for zoe\n");
        log.extend_from_slice(b"sshd: Failed password for eve");
        let reader = io::BufReader::with_capacity(64, &log[..]);
        assert_eq!(count_failed_passwords(reader).unwrap(), 3);
    }

    #[test]
    fn first_available_source_wins() {
        let debian = PathBuf::from("/var/log/auth.log");
        let redhat = PathBuf::from("/var/log/secure");
        let mut probe = FixtureProbe::default();
        probe
            .auth_logs
            .push((AuthSource::File(debian.clone()), "nothing here\n".to_string()));
        probe.auth_logs.push((
            AuthSource::File(redhat.clone()),
            "Failed password\nFailed password\n".to_string(),
        ));

        let sources = auth_sources(true, &[debian, redhat]);
        assert_eq!(failed_login_count(&mut probe, &sources), Some(0));
        assert_eq!(
            probe.auth_reads,
            vec![AuthSource::Journal, AuthSource::File("/var/log/auth.log".into())]
        );
    }

    #[test]
    fn journal_takes_priority() {
        let mut probe = FixtureProbe::default();
        probe
            .auth_logs
            .push((AuthSource::Journal, "sshd: Failed password for x\n".to_string()));
        probe.auth_logs.push((
            AuthSource::File("/var/log/auth.log".into()),
            "Failed password\nFailed password\n".to_string(),
        ));

        let sources = auth_sources(true, &["/var/log/auth.log".into()]);
        assert_eq!(failed_login_count(&mut probe, &sources), Some(1));
    }

    #[test]
    fn no_source_is_unknown() {
        let mut probe = FixtureProbe::default();
        let sources = auth_sources(true, &["/var/log/auth.log".into(), "/var/log/secure".into()]);
        assert_eq!(failed_login_count(&mut probe, &sources), None);
        assert_eq!(probe.auth_reads.len(), 3);
    }
}
