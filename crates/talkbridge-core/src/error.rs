use std::fmt;

/// Machine-readable error codes surfaced by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    StoreOpenFailed,
    ConfigParseError,
    CsvReadFailed,
    TalkNotFound,
    SyncGroupNotFound,
    DuplicateSyncGroup,
    SameTalkPairing,
    ConfirmationRequired,
    ActuatorNotConfigured,
    ActuatorSpawnFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::StoreOpenFailed => "E1001",
            Self::ConfigParseError => "E1002",
            Self::CsvReadFailed => "E1003",
            Self::TalkNotFound => "E2001",
            Self::SyncGroupNotFound => "E2002",
            Self::DuplicateSyncGroup => "E2003",
            Self::SameTalkPairing => "E2004",
            Self::ConfirmationRequired => "E3001",
            Self::ActuatorNotConfigured => "E4001",
            Self::ActuatorSpawnFailed => "E4002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::StoreOpenFailed => "Store database could not be opened",
            Self::ConfigParseError => "Config file could not be parsed",
            Self::CsvReadFailed => "CSV input could not be read",
            Self::TalkNotFound => "Talk not found",
            Self::SyncGroupNotFound => "Sync group not found",
            Self::DuplicateSyncGroup => "Duplicate sync group",
            Self::SameTalkPairing => "A talk cannot be paired with itself",
            Self::ConfirmationRequired => "Destructive operation needs confirmation",
            Self::ActuatorNotConfigured => "No actuator program configured",
            Self::ActuatorSpawnFailed => "Actuator program could not be started",
            Self::InternalUnexpected => "Unexpected internal failure",
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::StoreOpenFailed => Some("Check the --db path and its directory permissions."),
            Self::ConfigParseError => Some("Fix syntax in .talkbridge/config.toml and retry."),
            Self::CsvReadFailed => {
                Some("Expected columns: email, talk_title, talk_url, source, created_at.")
            }
            Self::TalkNotFound => Some("Run `tb talks` to list imported talk titles."),
            Self::SyncGroupNotFound => Some("Run `tb group list` to see existing groups."),
            Self::DuplicateSyncGroup => {
                Some("Reuse the existing group id with `tb seed` or `tb run --group`.")
            }
            Self::SameTalkPairing => Some("Pick two different talk titles."),
            Self::ConfirmationRequired => Some("Re-run with --yes to confirm."),
            Self::ActuatorNotConfigured => {
                Some("Set [actuator] program in .talkbridge/config.toml, or use --dry-run.")
            }
            Self::ActuatorSpawnFailed => Some("Verify the actuator program path is executable."),
            Self::InternalUnexpected => Some("Re-run with -v and keep the log if it happens again."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;

    const EVERY_CODE: [ErrorCode; 11] = [
        ErrorCode::StoreOpenFailed,
        ErrorCode::ConfigParseError,
        ErrorCode::CsvReadFailed,
        ErrorCode::TalkNotFound,
        ErrorCode::SyncGroupNotFound,
        ErrorCode::DuplicateSyncGroup,
        ErrorCode::SameTalkPairing,
        ErrorCode::ConfirmationRequired,
        ErrorCode::ActuatorNotConfigured,
        ErrorCode::ActuatorSpawnFailed,
        ErrorCode::InternalUnexpected,
    ];

    #[test]
    fn codes_are_distinct_and_ascending() {
        let codes: Vec<&str> = EVERY_CODE.iter().map(|c| c.code()).collect();
        let mut sorted = codes.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(codes, sorted, "codes must be unique and listed in order");
    }

    #[test]
    fn codes_are_e_plus_four_digits() {
        for code in EVERY_CODE.map(ErrorCode::code) {
            let digits = code.strip_prefix('E').expect("E prefix");
            assert_eq!(digits.len(), 4, "{code}");
            assert!(digits.bytes().all(|b| b.is_ascii_digit()), "{code}");
        }
    }

    #[test]
    fn every_code_has_message_and_hint() {
        for code in EVERY_CODE {
            assert!(!code.message().is_empty());
            assert!(code.hint().is_some_and(|hint| hint.ends_with('.')), "{code}");
            assert_eq!(code.to_string(), code.code());
        }
    }
}
