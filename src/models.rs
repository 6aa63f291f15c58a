//! Wire records returned by the portal and the normalized models built
//! from them.

use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::constants::{DATE_FORMAT, PORTAL_TZ};
use crate::error::{Error, Result};

/// Status envelope the portal wraps every JSON response in.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PortalStatus {
    #[serde(rename = "CODIGO")]
    pub code: String,
    #[serde(rename = "DESCRIPCION", default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(rename = "ESTADO")]
    pub status: PortalStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(rename = "ESTADO")]
    pub status: PortalStatus,
    #[serde(rename = "RESULTADO", default)]
    pub messages: Vec<RawMessage>,
}

/// One message record exactly as the portal serializes it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(rename = "X_NOTMENSAL")]
    pub id: u64,
    #[serde(rename = "F_ENVIO", default)]
    pub sent_date: String,
    #[serde(rename = "REMITIDO", default)]
    pub sender: String,
    #[serde(rename = "T_ASUNTO", default)]
    pub subject: String,
    #[serde(rename = "T_MENSAJE", default)]
    pub body: String,
    #[serde(rename = "L_ADJUNTO", default)]
    pub contains_attachments: String,
    #[serde(rename = "ADJUNTOS", default)]
    pub attachments: Vec<RawAttachment>,
    #[serde(rename = "F_LECTURA", default)]
    pub read_date: String,
}

/// Attachment entry inside a raw message. The portal only lists id and
/// filename; payload bytes are downloaded separately and filled in before
/// parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAttachment {
    #[serde(rename = "X_ADJMENSAL")]
    pub id: u64,
    #[serde(rename = "T_NOMFIC", default)]
    pub file_name: String,
    #[serde(skip)]
    pub contents: Vec<u8>,
}

/// Normalized portal message. Ids are unique and monotonically assigned per
/// chat by the portal, so they double as the delivery watermark.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: u64,
    /// Sent timestamp in the portal's civil timezone; `None` when the portal
    /// reported an empty date.
    pub sent_date: Option<DateTime<Tz>>,
    pub sender: String,
    pub subject: String,
    /// Raw markup body as served by the portal. Sanitized at the notifier
    /// boundary, not here.
    pub body: String,
    pub contains_attachments: bool,
    pub attachments: Vec<Attachment>,
    /// Read timestamp; `None` means the message is still unread.
    pub read_date: Option<DateTime<Tz>>,
}

/// Attachment with its payload bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub id: u64,
    pub file_name: String,
    pub contents: Vec<u8>,
}

/// Parse one raw record into a normalized [`Message`].
///
/// Only a non-empty timestamp that fails the portal's fixed format is an
/// error; every other field is passed through as-is.
pub fn parse_message(raw: RawMessage) -> Result<Message> {
    let sent_date = parse_portal_date(&raw.sent_date)?;
    let read_date = parse_portal_date(&raw.read_date)?;

    let attachments = raw
        .attachments
        .into_iter()
        .map(|ra| Attachment {
            id: ra.id,
            file_name: ra.file_name,
            contents: ra.contents,
        })
        .collect();

    Ok(Message {
        id: raw.id,
        sent_date,
        sender: raw.sender,
        subject: raw.subject,
        body: raw.body,
        contains_attachments: raw.contains_attachments == "S",
        attachments,
        read_date,
    })
}

pub(crate) fn parse_messages(raw: Vec<RawMessage>) -> Result<Vec<Message>> {
    raw.into_iter().map(parse_message).collect()
}

/// Parse a portal timestamp (`DD/MM/YYYY HH:MM`) in the portal's timezone.
/// An empty string is the portal's way of saying "unset".
fn parse_portal_date(s: &str) -> Result<Option<DateTime<Tz>>> {
    if s.is_empty() {
        return Ok(None);
    }

    let naive = NaiveDateTime::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| Error::Parse(format!("bad portal date {s:?}: {e}")))?;

    PORTAL_TZ
        .from_local_datetime(&naive)
        .earliest()
        .map(Some)
        .ok_or_else(|| Error::Parse(format!("nonexistent local time {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(sent: &str, flag: &str) -> RawMessage {
        RawMessage {
            id: 12345678,
            sent_date: sent.into(),
            sender: "Jon Doe (Director)".into(),
            subject: "SOME SUBJECT".into(),
            body: "A message with some HTML entities&nbsp; and <div>markup</div>".into(),
            contains_attachments: flag.into(),
            attachments: vec![RawAttachment {
                id: 123456,
                file_name: "Some File.ext".into(),
                contents: vec![1, 2, 3, 4, 5, 6],
            }],
            read_date: String::new(),
        }
    }

    #[test]
    fn sent_date_round_trips_in_portal_timezone() {
        let msg = parse_message(raw("01/10/2021 18:27", "S")).unwrap();
        let sent = msg.sent_date.expect("sent date should be set");
        assert_eq!(sent.format(DATE_FORMAT).to_string(), "01/10/2021 18:27");
        assert_eq!(sent, PORTAL_TZ.with_ymd_and_hms(2021, 10, 1, 18, 27, 0).unwrap());
    }

    #[test]
    fn empty_dates_parse_as_unset() {
        let msg = parse_message(raw("", "S")).unwrap();
        assert_eq!(msg.sent_date, None);
        assert_eq!(msg.read_date, None);
    }

    #[test]
    fn malformed_date_is_an_error() {
        let err = parse_message(raw("2021-10-01 18:27", "S")).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn attachment_flag_mapping_is_tolerant() {
        assert!(parse_message(raw("", "S")).unwrap().contains_attachments);
        for flag in ["", "N", "s", "X"] {
            assert!(
                !parse_message(raw("", flag)).unwrap().contains_attachments,
                "flag {flag:?} should map to false"
            );
        }
    }

    #[test]
    fn fields_pass_through_unvalidated() {
        let msg = parse_message(raw("01/10/2021 18:27", "S")).unwrap();
        assert_eq!(msg.id, 12345678);
        assert_eq!(msg.sender, "Jon Doe (Director)");
        assert_eq!(msg.subject, "SOME SUBJECT");
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].file_name, "Some File.ext");
        assert_eq!(msg.attachments[0].contents, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn raw_message_deserializes_portal_field_names() {
        let json = r#"
            {
                "X_NOTMENSAL": 12345678,
                "F_ENVIO": "01/10/2021 18:27",
                "L_ADJUNTO": "S",
                "T_ASUNTO": "SOME SUBJECT",
                "F_LECTURA": "02/10/2021 19:03",
                "CENTRO": "12345678 - SOME SCHOOL",
                "REMITIDO": "Jon Doe (Director)",
                "T_MENSAJE": "A message",
                "ADJUNTOS": [{"X_ADJMENSAL": 123456, "T_NOMFIC": "Some File.ext"}]
            }
        "#;
        let raw: RawMessage = serde_json::from_str(json).unwrap();
        assert_eq!(raw.id, 12345678);
        assert_eq!(raw.attachments.len(), 1);
        assert_eq!(raw.attachments[0].id, 123456);
        assert!(raw.attachments[0].contents.is_empty());
    }
}
