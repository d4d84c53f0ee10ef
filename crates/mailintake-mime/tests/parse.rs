//! Integration tests for message decoding.
//!
//! Every test feeds a complete raw message through the public API.

use mailintake_mime::{
    Email, Error, FieldError, PartContext, Parser, ParserConfig, SequentialIds, parse_email,
};
use proptest::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("mailintake_mime=trace")
        .with_test_writer()
        .try_init();
}

fn sequential_parser() -> Parser {
    Parser::with_config(ParserConfig::builder().ids(SequentialIds::default()).build())
}

#[test]
fn test_koi8_quoted_printable_body() {
    let raw = concat!(
        "From: Office <office@example.ru>\r\n",
        "Subject: test\r\n",
        "Content-Type: text/plain; charset=koi8-r\r\n",
        "Content-Transfer-Encoding: quoted-printable\r\n",
        "\r\n",
        "=EB=CF=CC=CC=C5=C7=C9, =C4=CF=C2=D2=D9=CA =C4=C5=CE=D8!\r\n",
    );

    let email = parse_email(raw.as_bytes()).unwrap();
    assert_eq!(email.text_body, "Коллеги, добрый день!");
    assert!(email.content.is_none());
}

#[test]
fn test_windows_1251_base64_body() {
    let raw = concat!(
        "Subject: test\r\n",
        "Content-Type: text/plain; charset=windows-1251\r\n",
        "Content-Transfer-Encoding: Base64\r\n",
        "\r\n",
        "yu7r6+Xj6Cwg5O7h8PvpIOTl7fwh\r\n",
    );

    let email = parse_email(raw.as_bytes()).unwrap();
    assert_eq!(email.text_body, "Коллеги, добрый день!");
}

#[test]
fn test_koi8_subject() {
    let raw = "Subject: =?KOI8-R?B?9MXNwSDQydPYzcE=?=\r\n\r\nbody\r\n";
    let email = parse_email(raw.as_bytes()).unwrap();
    assert_eq!(email.subject(), "Тема письма");
    assert_eq!(email.headers.get("Subject"), Some("Тема письма"));
}

#[test]
fn test_koi8_subject_fails_open() {
    let raw = "Subject: =?koi8-r?B?***?=\r\n\r\nbody\r\n";
    let email = parse_email(raw.as_bytes()).unwrap();
    assert_eq!(email.subject(), "=?koi8-r?B?***?=");
}

#[test]
fn test_fused_utf8_subject() {
    let raw = concat!(
        "Subject: =?UTF-8?B?0J/RgNC40LLQtdGC?= =?UTF-8?B?INC80LjRgA==?= online ",
        "=?UTF-8?B?INC60YPRgNGB?= =?UTF-8?B?INGB0LXQs9C+0LTQvdGP?=\r\n",
        "\r\n",
        "body\r\n",
    );

    let email = parse_email(raw.as_bytes()).unwrap();
    assert_eq!(email.subject(), "Привет мир online курс сегодня");
}

const MIXED: &str = concat!(
    "From: Alice <alice@example.com>\r\n",
    "To: Bob <bob@example.com>\r\n",
    "Subject: Report\r\n",
    "Date: Tue, 14 Nov 2023 09:30:00 -0800\r\n",
    "Message-ID: <report-1@example.com>\r\n",
    "MIME-Version: 1.0\r\n",
    "Content-Type: multipart/mixed; boundary=\"outer\"\r\n",
    "\r\n",
    "This is a multi-part message in MIME format.\r\n",
    "--outer\r\n",
    "Content-Type: multipart/alternative; boundary=\"inner\"\r\n",
    "\r\n",
    "--inner\r\n",
    "Content-Type: text/plain; charset=utf-8\r\n",
    "\r\n",
    "Plain version\r\n",
    "--inner\r\n",
    "Content-Type: text/html; charset=utf-8\r\n",
    "\r\n",
    "<p>HTML version</p>\r\n",
    "--inner--\r\n",
    "--outer\r\n",
    "Content-Type: application/octet-stream; charset=windows-1251\r\n",
    "Content-Transfer-Encoding: base64\r\n",
    "\r\n",
    "AAEC//4=\r\n",
    "--outer\r\n",
    "Content-Type: application/pdf\r\n",
    "Content-Disposition: attachment; filename=\"=?utf-8?B?0L7RgtGH0ZHRgi5wZGY=?=\"\r\n",
    "Content-Transfer-Encoding: base64\r\n",
    "\r\n",
    "JVBERi0=\r\n",
    "--outer--\r\n",
);

#[test]
fn test_mixed_with_alternative_and_attachments() {
    init_tracing();
    let email = sequential_parser().parse(MIXED.as_bytes()).unwrap();

    assert_eq!(email.subject(), "Report");
    assert_eq!(email.message_id(), "report-1@example.com");
    assert!(email.date().is_some());
    assert_eq!(email.content_type, "multipart/mixed; boundary=\"outer\"");
    assert_eq!(email.text_body, "Plain version");
    assert_eq!(email.html_body, "<p>HTML version</p>");
    assert!(email.content.is_none());
    assert!(email.embedded_files.is_empty());

    assert_eq!(email.attachments.len(), 2);
    let raw = &email.attachments[0];
    assert_eq!(raw.filename, "attachment-1");
    assert_eq!(raw.content_type, "application/octet-stream");
    assert_eq!(raw.data, b"AAEC//4=");

    let pdf = &email.attachments[1];
    assert_eq!(pdf.filename, "отчёт.pdf");
    assert_eq!(pdf.content_type, "application/pdf");
    assert_eq!(pdf.data, b"%PDF-");
}

#[test]
fn test_fallback_filename_with_default_ids() {
    let email = parse_email(MIXED.as_bytes()).unwrap();
    let name = &email.attachments[0].filename;
    assert!(name.starts_with("attachment-"));
    assert!(name.len() > "attachment-".len());
}

#[test]
fn test_related_leaf_without_transfer_encoding() {
    let raw = concat!(
        "Content-Type: multipart/related; boundary=rel\r\n",
        "\r\n",
        "--rel\r\n",
        "Content-Type: text/html\r\n",
        "\r\n",
        "<img src=\"cid:pic\">\r\n",
        "--rel\r\n",
        "Content-Type: image/gif\r\n",
        "Content-ID: <pic>\r\n",
        "\r\n",
        "GIF89a\r\n",
        "--rel--\r\n",
    );

    let err = parse_email(raw.as_bytes()).unwrap_err();
    match err {
        Error::UnsupportedPartType {
            media_type,
            context,
        } => {
            assert_eq!(media_type, "image/gif");
            assert_eq!(context, PartContext::Related);
        }
        other => panic!("Expected unsupported part type, got {other:?}"),
    }
}

#[test]
fn test_alternative_with_related_embedded_files() {
    let raw = concat!(
        "Subject: newsletter\r\n",
        "Content-Type: multipart/alternative; boundary=alt\r\n",
        "\r\n",
        "--alt\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "See the logo.\r\n",
        "--alt\r\n",
        "Content-Type: multipart/related; boundary=rel\r\n",
        "\r\n",
        "--rel\r\n",
        "Content-Type: text/html; charset=koi8-r\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "7s/Xz9PUyQ==\r\n",
        "--rel\r\n",
        "Content-Type: image/png; name=logo.png\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "Content-ID: <logo@example.com>\r\n",
        "\r\n",
        "iVBORw==\r\n",
        "--rel--\r\n",
        "--alt--\r\n",
    );

    let email = parse_email(raw.as_bytes()).unwrap();
    assert_eq!(email.text_body, "See the logo.");
    assert_eq!(email.html_body, "Новости");
    assert!(email.attachments.is_empty());
    assert_eq!(email.embedded_files.len(), 1);

    let logo = &email.embedded_files[0];
    assert_eq!(logo.cid, "logo@example.com");
    assert_eq!(logo.content_type, "image/png; name=logo.png");
    assert_eq!(logo.data, [0x89, b'P', b'N', b'G']);
}

#[test]
fn test_text_leaves_accumulate_in_order() {
    let raw = concat!(
        "Content-Type: multipart/mixed; boundary=m\r\n",
        "\r\n",
        "--m\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "first\n\n",
        "\r\n",
        "--m\r\n",
        "\r\n",
        "second\r\n",
        "--m--\r\n",
    );

    let email = parse_email(raw.as_bytes()).unwrap();
    assert_eq!(email.text_body, "first\nsecond");
}

#[test]
fn test_duplicate_charset_parameter() {
    let raw = concat!(
        "Content-Type: text/plain; charset=koi8-r; charset=\"KOI8-R\"\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "7s/Xz9PUyQ==\r\n",
    );

    let email = parse_email(raw.as_bytes()).unwrap();
    assert_eq!(email.text_body, "Новости");
}

#[test]
fn test_mismatched_weekday_still_parses() {
    let raw = concat!(
        "Subject: s\r\n",
        "Date: Mon, 14 Nov 2023 09:30:00 -0800\r\n",
        "Message-ID: <kept@example.com>\r\n",
        "\r\n",
        "body",
    );

    let email = parse_email(raw.as_bytes()).unwrap();
    assert!(email.date().is_some());
    assert_eq!(email.message_id(), "kept@example.com");
    assert_eq!(email.text_body, "body");
}

#[test]
fn test_header_error_keeps_earlier_fields() {
    let raw = concat!(
        "Subject: partial\r\n",
        "From: alice@example.com\r\n",
        "To: bob@example.com\r\n",
        "Date: sometime last week\r\n",
        "Message-ID: <lost@example.com>\r\n",
        "\r\n",
        "body\r\n",
    );

    let err = parse_email(raw.as_bytes()).unwrap_err();
    assert!(matches!(
        err.field_error(),
        Some(FieldError::MalformedDate { field: "Date", .. })
    ));

    let Error::Header { partial, .. } = err else {
        panic!("Expected header error");
    };
    assert_eq!(partial.subject, "partial");
    assert_eq!(partial.from[0].address, "alice@example.com");
    assert_eq!(partial.to[0].address, "bob@example.com");
    assert!(partial.date.is_none());
    assert!(partial.message_id.is_empty());
}

#[test]
fn test_malformed_header_block() {
    let raw = "Subject: fine\r\nthis line has no colon\r\n\r\nbody";
    assert!(matches!(
        parse_email(raw.as_bytes()),
        Err(Error::InvalidHeader(_))
    ));
}

#[test]
fn test_multipart_structure_errors() {
    let no_boundary = "Content-Type: multipart/mixed\r\n\r\n--x\r\n\r\nbody\r\n--x--\r\n";
    assert!(matches!(
        parse_email(no_boundary.as_bytes()),
        Err(Error::MissingBoundary)
    ));

    let truncated = "Content-Type: multipart/mixed; boundary=x\r\n\r\n--x\r\n\r\nbody\r\n";
    assert!(matches!(
        parse_email(truncated.as_bytes()),
        Err(Error::InvalidMultipart(_))
    ));
}

#[test]
fn test_non_text_message_goes_to_content() {
    let raw = concat!(
        "Content-Type: image/gif\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "R0lGODlh\r\n",
    );

    let email = parse_email(raw.as_bytes()).unwrap();
    assert_eq!(email.content.as_deref(), Some(&b"GIF89a"[..]));
    assert!(email.text_body.is_empty());
    assert!(email.html_body.is_empty());
    assert!(email.attachments.is_empty());
    assert!(email.embedded_files.is_empty());
}

#[test]
fn test_parse_is_repeatable() {
    let parser = sequential_parser();
    let first = parser.parse(MIXED.as_bytes()).unwrap();
    let second = parser.parse(MIXED.as_bytes()).unwrap();

    // Only the synthesized name differs between runs.
    assert_eq!(first.attachments[0].filename, "attachment-1");
    assert_eq!(second.attachments[0].filename, "attachment-2");
    assert_eq!(without_fallback_names(first), without_fallback_names(second));
}

fn without_fallback_names(mut email: Email) -> Email {
    for attachment in &mut email.attachments {
        if attachment.filename.starts_with("attachment-") {
            attachment.filename.clear();
        }
    }
    email
}

#[cfg(feature = "serde")]
#[test]
fn test_serialize_email() {
    let email = sequential_parser().parse(MIXED.as_bytes()).unwrap();
    let json = serde_json::to_value(&email).unwrap();
    assert_eq!(json["subject"], "Report");
    assert_eq!(json["text_body"], "Plain version");
    assert_eq!(json["attachments"][1]["filename"], "отчёт.pdf");
    assert_eq!(json["from"][0]["address"], "alice@example.com");
}

proptest! {
    #[test]
    fn parse_twice_gives_same_result(
        subject in "[ -~]{0,40}",
        body in proptest::collection::vec(any::<u8>(), 0..256),
        transfer_encoding in prop::sample::select(vec!["", "7bit", "base64", "quoted-printable", "x-unknown"]),
        charset in prop::sample::select(vec!["utf-8", "koi8-r", "windows-1251", "iso-8859-1"]),
    ) {
        let mut raw = format!(
            "Subject: {subject}\r\nContent-Type: text/plain; charset={charset}\r\nContent-Transfer-Encoding: {transfer_encoding}\r\n\r\n"
        )
        .into_bytes();
        raw.extend_from_slice(&body);

        let first = parse_email(&raw).map_err(|e| e.to_string());
        let second = parse_email(&raw).map_err(|e| e.to_string());
        prop_assert_eq!(first, second);
    }
}
