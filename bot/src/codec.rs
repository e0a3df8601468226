//! Pipe-delimited node-to-central wire format.
//!
//! A success record has five fields:
//! `<path>|<token>|<summary>|<url>|<counts>`. A failure record has two:
//! `<path>|Error: <message>`. The only authentication is that field 4 of a
//! success record must contain the trusted paste origin.

use std::fmt;

const SEPARATOR: char = '|';
const ERROR_MARKER: &str = "Error: ";

/// A record sent by a node to the central bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeMessage {
    /// A completed analysis.
    Report {
        /// Release path or folder name.
        subject_path: String,
        /// Tracker identifier, or any token unique to the outcome.
        snatch_id: String,
        /// Human summary (release name, permalink, image).
        human_summary: String,
        /// Paste URL with the full log.
        attachment_url: String,
        /// `"N checks OK, ..."` line.
        counts_summary: String,
    },
    /// An analysis that could not run.
    Failure {
        /// Release path or folder name.
        subject_path: String,
        /// Reason, without the `Error: ` marker.
        message: String,
    },
}

impl NodeMessage {
    /// Path field of the record.
    pub fn subject_path(&self) -> &str {
        match self {
            Self::Report { subject_path, .. } | Self::Failure { subject_path, .. } => subject_path,
        }
    }

    /// Second field of the record, used with the path as dedup key.
    pub fn token(&self) -> String {
        match self {
            Self::Report { snatch_id, .. } => snatch_id.clone(),
            Self::Failure { message, .. } => format!("{ERROR_MARKER}{message}"),
        }
    }
}

impl fmt::Display for NodeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

/// Reasons a wire record is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Wrong number of fields.
    #[error("unrecognized input from {sender}: {raw}")]
    Malformed {
        /// Nick that sent the record.
        sender: String,
        /// Record as received.
        raw: String,
    },
    /// Attachment URL does not point at the trusted paste service.
    #[error("untrusted attachment from {sender}: {raw}")]
    UntrustedSource {
        /// Nick that sent the record.
        sender: String,
        /// Record as received.
        raw: String,
    },
}

/// A record accepted by [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Field 1.
    pub subject_path: String,
    /// Field 2, verbatim.
    pub token: String,
    /// Channel line crediting the sender.
    pub line: String,
}

impl DecodedMessage {
    /// Dedup key: path and token concatenated without separator.
    pub fn dedup_key(&self) -> Vec<u8> {
        dedup_key(&self.subject_path, &self.token)
    }
}

/// Raw concatenation of `path` and `token`, as stored in the dedup table.
pub fn dedup_key(path: &str, token: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(path.len().saturating_add(token.len()));
    key.extend_from_slice(path.as_bytes());
    key.extend_from_slice(token.as_bytes());
    key
}

/// Serialize a record to its wire form.
pub fn encode(message: &NodeMessage) -> String {
    match message {
        NodeMessage::Report {
            subject_path,
            snatch_id,
            human_summary,
            attachment_url,
            counts_summary,
        } => [
            subject_path.as_str(),
            snatch_id,
            human_summary,
            attachment_url,
            counts_summary,
        ]
        .join("|"),
        NodeMessage::Failure {
            subject_path,
            message,
        } => format!("{subject_path}{SEPARATOR}{ERROR_MARKER}{message}"),
    }
}

/// Channel line for a record relayed on behalf of `sender`.
pub fn format_line(sender: &str, raw: &str) -> String {
    format!("\u{2}\u{3}71{sender}>\u{f} {raw}")
}

/// Parse a record received from `sender`.
///
/// # Errors
///
/// [`ProtocolError::Malformed`] when the record is neither the two-field
/// error form nor five fields; [`ProtocolError::UntrustedSource`] when field
/// 4 does not contain `trusted_origin`.
pub fn decode(
    raw: &str,
    sender: &str,
    trusted_origin: &str,
) -> Result<DecodedMessage, ProtocolError> {
    let fields: Vec<&str> = raw.split(SEPARATOR).collect();

    let accepted = |path: &str, token: &str| DecodedMessage {
        subject_path: path.to_owned(),
        token: token.to_owned(),
        line: format_line(sender, raw),
    };

    match fields.as_slice() {
        [path, token] if raw.contains(ERROR_MARKER) => Ok(accepted(path, token)),
        [path, token, _, url, _] => {
            if !url.contains(trusted_origin) {
                return Err(ProtocolError::UntrustedSource {
                    sender: sender.to_owned(),
                    raw: raw.to_owned(),
                });
            }
            Ok(accepted(path, token))
        }
        _ => Err(ProtocolError::Malformed {
            sender: sender.to_owned(),
            raw: raw.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://privatebin.url";

    #[test]
    fn decodes_reference_record() {
        let raw = "NAO - Woman (2020) - WEB FLAC|2940820|7wj612|https://privatebin.url/?a#b|35 checks OK, 0 checks KO, and 1 warnings.";
        let decoded = decode(raw, "node1", ORIGIN).expect("valid record");
        assert_eq!(decoded.subject_path, "NAO - Woman (2020) - WEB FLAC");
        assert_eq!(decoded.token, "2940820");
        assert_eq!(decoded.line, format!("\u{2}\u{3}71node1>\u{f} {raw}"));
        assert_eq!(
            decoded.dedup_key(),
            b"NAO - Woman (2020) - WEB FLAC2940820".to_vec()
        );
    }

    #[test]
    fn error_record_keeps_marker_in_token() {
        let raw = "some/path|Error: Tracks seem incorrectly organized: 01.flac";
        let decoded = decode(raw, "node1", ORIGIN).expect("error record");
        assert_eq!(decoded.token, "Error: Tracks seem incorrectly organized: 01.flac");
    }

    #[test]
    fn two_fields_without_marker_are_malformed() {
        let err = decode("a|b", "x", ORIGIN).expect_err("malformed");
        assert!(matches!(err, ProtocolError::Malformed { .. }));
    }

    #[test]
    fn error_marker_alone_does_not_rescue_other_arities() {
        let err = decode("a|Error: b|c", "x", ORIGIN).expect_err("malformed");
        assert!(matches!(err, ProtocolError::Malformed { .. }));
    }

    #[test]
    fn failure_encodes_with_marker() {
        let msg = NodeMessage::Failure {
            subject_path: "Album".to_owned(),
            message: "target path not found".to_owned(),
        };
        assert_eq!(encode(&msg), "Album|Error: target path not found");
        assert_eq!(msg.token(), "Error: target path not found");
    }
}
