//! Turns a raw RFC 822 message into an [`InboundMessage`].
//!
//! MIME decoding (header folding, encoded words, transfer encodings and
//! body charsets) is left to `mailparse`. This module only picks the pieces
//! the reply pipeline needs: the bare sender address, the subject, the
//! `Auto-Submitted` header and the first `text/plain` part that is not an
//! attachment.

use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail};

use replydesk_core::models::InboundMessage;

use super::MailboxError;

const MAX_MIME_DEPTH: usize = 8;

/// Parse a raw RFC 822 message.
pub fn parse_message(raw: &[u8]) -> Result<InboundMessage, MailboxError> {
    let mail = mailparse::parse_mail(raw)
        .map_err(|e| MailboxError::Parse(format!("malformed message: {}", e)))?;

    let sender = sender_address(&mail)?;

    let subject = mail.headers.get_first_value("Subject").unwrap_or_default();

    let auto_submitted = mail
        .headers
        .get_first_value("Auto-Submitted")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let body = first_plain_text(&mail, 0)?
        .ok_or_else(|| MailboxError::Parse(format!("no text/plain part in message from {}", sender)))?;

    Ok(InboundMessage {
        sender,
        subject: subject.trim().to_string(),
        body: body.trim().to_string(),
        auto_submitted,
    })
}

/// `"Jane Doe" <jane@example.com>` → `jane@example.com`.
fn sender_address(mail: &ParsedMail<'_>) -> Result<String, MailboxError> {
    let header = mail
        .headers
        .get_first_header("From")
        .ok_or_else(|| MailboxError::Parse("message has no From header".to_string()))?;
    let addresses = mailparse::addrparse_header(header).map_err(|e| {
        MailboxError::Parse(format!("unparseable From header '{}': {}", header.get_value(), e))
    })?;

    addresses
        .iter()
        .find_map(|address| match address {
            MailAddr::Single(single) => Some(single.addr.clone()),
            MailAddr::Group(group) => group.addrs.first().map(|single| single.addr.clone()),
        })
        .filter(|addr| addr.contains('@'))
        .ok_or_else(|| {
            MailboxError::Parse(format!("no address in From header '{}'", header.get_value()))
        })
}

/// Depth-first walk for the first inline `text/plain` part, decoded with
/// its declared charset.
fn first_plain_text(part: &ParsedMail<'_>, depth: usize) -> Result<Option<String>, MailboxError> {
    if depth > MAX_MIME_DEPTH {
        return Ok(None);
    }
    if matches!(
        part.get_content_disposition().disposition,
        DispositionType::Attachment
    ) {
        return Ok(None);
    }

    let mime = part.ctype.mimetype.to_ascii_lowercase();
    if mime.starts_with("multipart/") {
        for sub in &part.subparts {
            if let Some(text) = first_plain_text(sub, depth + 1)? {
                return Ok(Some(text));
            }
        }
        return Ok(None);
    }

    if mime == "text/plain" {
        let body = part
            .get_body()
            .map_err(|e| MailboxError::Parse(format!("undecodable text/plain part: {}", e)))?;
        return Ok(Some(body));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_plain_message() {
        let raw = b"From: Jane Doe <jane@example.com>\r\nSubject: Payment issue\r\n\r\nMy payment failed.\r\n";
        let msg = parse_message(raw).unwrap();
        assert_eq!(msg.sender, "jane@example.com");
        assert_eq!(msg.subject, "Payment issue");
        assert_eq!(msg.body, "My payment failed.");
        assert_eq!(msg.auto_submitted, None);
    }

    #[test]
    fn test_auto_submitted_captured() {
        let raw = b"From: bot@example.com\nSubject: Out of office\nAuto-Submitted: auto-replied\n\nAway.";
        let msg = parse_message(raw).unwrap();
        assert_eq!(msg.sender, "bot@example.com");
        assert_eq!(msg.auto_submitted.as_deref(), Some("auto-replied"));
    }

    #[test]
    fn test_multipart_prefers_plain_over_html() {
        let raw = concat!(
            "From: user@example.com\r\n",
            "Subject: Refund\r\n",
            "Content-Type: multipart/alternative; boundary=\"XYZ\"\r\n",
            "\r\n",
            "preamble\r\n",
            "--XYZ\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>Where is my refund?</p>\r\n",
            "--XYZ\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "Where is my refund?\r\n",
            "--XYZ--\r\n"
        );
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(msg.body, "Where is my refund?");
    }

    #[test]
    fn test_plain_attachment_is_skipped() {
        let raw = concat!(
            "From: user@example.com\n",
            "Subject: Logs\n",
            "Content-Type: multipart/mixed; boundary=b1\n",
            "\n",
            "--b1\n",
            "Content-Type: text/plain\n",
            "Content-Disposition: attachment; filename=log.txt\n",
            "\n",
            "log line\n",
            "--b1\n",
            "Content-Type: text/plain\n",
            "\n",
            "Please see the attached log.\n",
            "--b1--\n"
        );
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(msg.body, "Please see the attached log.");
    }

    #[test]
    fn test_quoted_printable_soft_breaks_unfolded() {
        let raw = concat!(
            "From: user@example.com\r\n",
            "Subject: Delay\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "My withdrawal has been pending for a very long=\r\n",
            " time =E2=80=94 please help.\r\n"
        );
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(
            msg.body,
            "My withdrawal has been pending for a very long time \u{2014} please help."
        );
    }

    #[test]
    fn test_latin1_body_decoded_with_charset() {
        let raw = concat!(
            "From: client@example.fr\r\n",
            "Subject: Commande\r\n",
            "Content-Type: text/plain; charset=iso-8859-1\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "Mon caf=E9 est froid\r\n"
        );
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(msg.body, "Mon caf\u{e9} est froid");
    }

    #[test]
    fn test_base64_body() {
        let raw = b"From: user@example.com\nSubject: KYC\nContent-Transfer-Encoding: base64\n\nS1lDIHJlamVjdGVkIHR3aWNl\n";
        let msg = parse_message(raw).unwrap();
        assert_eq!(msg.body, "KYC rejected twice");
    }

    #[test]
    fn test_encoded_subject() {
        let raw = b"From: user@example.com\nSubject: =?UTF-8?B?UGF5bWVudA==?= =?UTF-8?Q?_failed?=\n\nbody text";
        let msg = parse_message(raw).unwrap();
        assert_eq!(msg.subject, "Payment failed");
    }

    #[test]
    fn test_missing_from_is_parse_error() {
        let raw = b"Subject: hi\n\nbody";
        assert!(matches!(parse_message(raw), Err(MailboxError::Parse(_))));
    }

    #[test]
    fn test_html_only_is_parse_error() {
        let raw = b"From: user@example.com\nSubject: hi\nContent-Type: text/html\n\n<p>hi</p>";
        assert!(matches!(parse_message(raw), Err(MailboxError::Parse(_))));
    }

    #[test]
    fn test_folded_header() {
        let raw = b"From: user@example.com\r\nSubject: A very\r\n long subject\r\n\r\nbody";
        let msg = parse_message(raw).unwrap();
        assert_eq!(msg.subject, "A very long subject");
    }
}
