//! Wire format tests.

use propolis_bot::codec::{decode, encode, NodeMessage, ProtocolError};

const ORIGIN: &str = "https://privatebin.url";

fn report() -> NodeMessage {
    NodeMessage::Report {
        subject_path: "NAO - Woman (2020) - WEB FLAC".to_owned(),
        snatch_id: "2940820".to_owned(),
        human_summary: "7wj612".to_owned(),
        attachment_url: "https://privatebin.url/?abc#def".to_owned(),
        counts_summary: "35 checks OK, 0 checks KO, and 1 warnings.".to_owned(),
    }
}

#[test]
fn report_round_trips_its_fields() {
    let raw = encode(&report());
    assert_eq!(
        raw,
        "NAO - Woman (2020) - WEB FLAC|2940820|7wj612|https://privatebin.url/?abc#def|35 checks OK, 0 checks KO, and 1 warnings."
    );

    let decoded = decode(&raw, "node7", ORIGIN).expect("decode");
    assert_eq!(decoded.subject_path, "NAO - Woman (2020) - WEB FLAC");
    assert_eq!(decoded.token, "2940820");
    // The sender is added in front; the record itself is unchanged.
    assert!(decoded.line.contains("node7>"));
    assert!(decoded.line.ends_with(&raw));
}

#[test]
fn failure_round_trips() {
    let msg = NodeMessage::Failure {
        subject_path: "Album".to_owned(),
        message: "target path Album not found".to_owned(),
    };
    let decoded = decode(&encode(&msg), "node7", ORIGIN).expect("decode");
    assert_eq!(decoded.subject_path, "Album");
    assert_eq!(decoded.token, msg.token());
}

#[test]
fn three_fields_without_marker_are_malformed() {
    let err = decode("a|b|c", "node7", ORIGIN).expect_err("rejected");
    assert_eq!(
        err,
        ProtocolError::Malformed {
            sender: "node7".to_owned(),
            raw: "a|b|c".to_owned(),
        }
    );
}

#[test]
fn untrusted_attachment_is_rejected() {
    let raw = "Album|1|x|https://evil.example/paste|1 checks OK, 0 checks KO, and 0 warnings.";
    let err = decode(raw, "node7", ORIGIN).expect_err("rejected");
    assert!(matches!(err, ProtocolError::UntrustedSource { .. }));
}

#[test]
fn trust_check_is_a_substring_match() {
    let raw = "Album|1|x|see https://privatebin.url/?z there|summary";
    assert!(decode(raw, "node7", ORIGIN).is_ok());
}
