//! Notification sink: forwards portal messages to their chat.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use scraper::Html;
use tracing::debug;
use url::Url;

use crate::constants::{default_timeout, DATE_FORMAT};
use crate::error::{DeliveryError, Error, Result};
use crate::models::{Attachment, Message};
use crate::repo::ChatId;

const CHAT_ID_PARAM: &str = "chat_id";
const TEXT_PARAM: &str = "text";
const PARSE_MODE_PARAM: &str = "parse_mode";
const PARSE_MODE_HTML: &str = "HTML";
const DOCUMENT_PARAM: &str = "document";

const SEND_MESSAGE_PATH: &str = "sendMessage";
const SEND_DOCUMENT_PATH: &str = "sendDocument";

/// Delivers an ordered batch of messages to a chat.
///
/// Implementations attempt messages in order and stop at the first failure,
/// reporting the id of the last message that was fully delivered so the
/// caller can checkpoint progress (see [`DeliveryError`]).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        chat_id: ChatId,
        msgs: &[Message],
    ) -> std::result::Result<u64, DeliveryError>;
}

/// Notifier that posts messages through the Telegram Bot API.
pub struct TelegramNotifier {
    http: Client,
    base_url: Url,
}

impl TelegramNotifier {
    pub fn new(base_url: impl AsRef<str>, bot_token: &str) -> Result<Self> {
        let base_url: Url =
            format!("{}/bot{bot_token}", base_url.as_ref().trim_end_matches('/')).parse()?;

        let http = Client::builder()
            .timeout(default_timeout())
            .build()
            .map_err(Error::Http)?;

        Ok(Self { http, base_url })
    }

    fn endpoint(&self, method: &str) -> Result<Url> {
        Ok(format!("{}/{method}", self.base_url).parse()?)
    }

    async fn send_message(&self, chat_id: ChatId, msg: &Message) -> Result<()> {
        let form = [
            (CHAT_ID_PARAM, chat_id.to_string()),
            (PARSE_MODE_PARAM, PARSE_MODE_HTML.to_string()),
            (TEXT_PARAM, format_text(msg)),
        ];

        let resp = self
            .http
            .post(self.endpoint(SEND_MESSAGE_PATH)?)
            .form(&form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status { status, body });
        }
        Ok(())
    }

    async fn upload_attachment(&self, chat_id: ChatId, attachment: &Attachment) -> Result<()> {
        let part = Part::bytes(attachment.contents.clone())
            .file_name(attachment.file_name.clone());
        let form = Form::new()
            .text(CHAT_ID_PARAM, chat_id.to_string())
            .part(DOCUMENT_PARAM, part);

        let resp = self
            .http
            .post(self.endpoint(SEND_DOCUMENT_PATH)?)
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(
        &self,
        chat_id: ChatId,
        msgs: &[Message],
    ) -> std::result::Result<u64, DeliveryError> {
        let mut last_delivered = 0u64;
        for msg in msgs {
            if let Err(source) = self.send_message(chat_id, msg).await {
                return Err(DeliveryError {
                    last_delivered,
                    source,
                });
            }

            // A message only counts as delivered once its attachments are up
            for att in &msg.attachments {
                if let Err(source) = self.upload_attachment(chat_id, att).await {
                    return Err(DeliveryError {
                        last_delivered,
                        source,
                    });
                }
            }

            last_delivered = msg.id;
            debug!(chat_id, message_id = msg.id, "message delivered");
        }

        Ok(last_delivered)
    }
}

fn format_text(msg: &Message) -> String {
    let mut text = String::from("Nuevo mensaje en Raíces!");
    if let Some(sent) = msg.sent_date {
        text.push_str(&format!("\n\n<b>Fecha:</b> {}", sent.format(DATE_FORMAT)));
    }
    text.push_str(&format!("\n<b>De:</b> {}", msg.sender));
    text.push_str(&format!("\n<b>Asunto:</b> {}", msg.subject));
    text.push_str(&format!("\n\n{}", format_body(&msg.body)));

    if msg.contains_attachments {
        text.push_str(&format!(
            "\n\n<b>Adjuntos:</b>\n{}",
            format_attachments(&msg.attachments)
        ));
    }

    text
}

/// Strip the portal's markup down to plain text, keeping `<div>` breaks as
/// newlines, then re-escape for Telegram's HTML parse mode.
fn format_body(body: &str) -> String {
    let broken = body.replace("<div>", "\n");
    let text: String = Html::parse_fragment(&broken).root_element().text().collect();
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn format_attachments(attachments: &[Attachment]) -> String {
    let mut out = String::new();
    for att in attachments {
        out.push_str(&format!("\t\t\t{}\n", att.file_name));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PORTAL_TZ;
    use chrono::TimeZone;
    use mockito::{Matcher, Server};

    fn message(id: u64, subject: &str, attachments: Vec<Attachment>) -> Message {
        Message {
            id,
            sent_date: Some(PORTAL_TZ.with_ymd_and_hms(2021, 11, 11, 0, 0, 0).unwrap()),
            sender: "Test Sender".into(),
            subject: subject.into(),
            body: "Hi you, this is a test message".into(),
            contains_attachments: !attachments.is_empty(),
            attachments,
            read_date: None,
        }
    }

    fn attachment() -> Attachment {
        Attachment {
            id: 123456,
            file_name: "attachment.file".into(),
            contents: vec![1, 2, 3],
        }
    }

    #[test]
    fn formats_the_notification_text() {
        let msg = message(123456, "Test Subject", vec![attachment()]);

        let expected = "Nuevo mensaje en Raíces!\n\n<b>Fecha:</b> 11/11/2021 00:00\
                        \n<b>De:</b> Test Sender\n<b>Asunto:</b> Test Subject\
                        \n\nHi you, this is a test message\
                        \n\n<b>Adjuntos:</b>\n\t\t\tattachment.file\n";
        assert_eq!(format_text(&msg), expected);
    }

    #[test]
    fn omits_the_date_line_when_the_sent_date_is_unset() {
        let mut msg = message(1, "Subject", vec![]);
        msg.sent_date = None;

        assert!(!format_text(&msg).contains("<b>Fecha:</b>"));
    }

    #[test]
    fn body_markup_is_stripped_and_reescaped() {
        assert_eq!(
            format_body("one<div>two <b>bold</b> 1 < 2 &nbsp;end"),
            "one\ntwo bold 1 &lt; 2 \u{a0}end"
        );
    }

    #[tokio::test]
    async fn notifies_a_batch_and_reports_the_last_id() {
        let mut server = Server::new_async().await;
        let send = server
            .mock("POST", "/bot42:token/sendMessage")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded(CHAT_ID_PARAM.into(), "7".into()),
                Matcher::UrlEncoded(PARSE_MODE_PARAM.into(), PARSE_MODE_HTML.into()),
            ]))
            .with_status(200)
            .expect(2)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new(server.url(), "42:token").unwrap();
        let msgs = vec![message(10, "first", vec![]), message(11, "second", vec![])];

        let last = notifier.notify(7, &msgs).await.unwrap();

        assert_eq!(last, 11);
        send.assert_async().await;
    }

    #[tokio::test]
    async fn uploads_attachments_after_the_message_text() {
        let mut server = Server::new_async().await;
        let _send = server
            .mock("POST", "/bot42:token/sendMessage")
            .with_status(200)
            .create_async()
            .await;
        let upload = server
            .mock("POST", "/bot42:token/sendDocument")
            .with_status(200)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new(server.url(), "42:token").unwrap();
        let msgs = vec![message(10, "with attachment", vec![attachment()])];

        let last = notifier.notify(7, &msgs).await.unwrap();

        assert_eq!(last, 10);
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn failed_send_reports_the_previous_message_as_last_delivered() {
        let mut server = Server::new_async().await;
        let _first = server
            .mock("POST", "/bot42:token/sendMessage")
            .match_body(Matcher::Regex("FIRST".into()))
            .with_status(200)
            .create_async()
            .await;
        let _second = server
            .mock("POST", "/bot42:token/sendMessage")
            .match_body(Matcher::Regex("SECOND".into()))
            .with_status(500)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new(server.url(), "42:token").unwrap();
        let msgs = vec![message(10, "FIRST", vec![]), message(11, "SECOND", vec![])];

        let err = notifier.notify(7, &msgs).await.unwrap_err();

        assert_eq!(err.last_delivered, 10);
        assert!(matches!(err.source, Error::Status { .. }));
    }

    #[tokio::test]
    async fn failed_attachment_upload_leaves_the_message_undelivered() {
        let mut server = Server::new_async().await;
        let _send = server
            .mock("POST", "/bot42:token/sendMessage")
            .with_status(200)
            .create_async()
            .await;
        let _upload = server
            .mock("POST", "/bot42:token/sendDocument")
            .with_status(500)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new(server.url(), "42:token").unwrap();
        let msgs = vec![message(10, "with attachment", vec![attachment()])];

        let err = notifier.notify(7, &msgs).await.unwrap_err();

        assert_eq!(err.last_delivered, 0);
    }
}
