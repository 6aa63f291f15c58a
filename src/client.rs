use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, ClientBuilder};
use tracing::{debug, warn};
use url::Url;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::models::{parse_messages, LoginResponse, Message, MessagesResponse, RawMessage};
use crate::repo::Credentials;

/// Source of new portal messages for one chat, as seen by the sync pass.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch all messages with id greater than `last_notified`, ascending.
    async fn fetch_messages(
        &self,
        creds: &Credentials,
        last_notified: u64,
    ) -> Result<Vec<Message>>;
}

/// HTTP client for the Raíces portal.
///
/// Owns its cookie jar, so the session established by a login stays scoped
/// to this instance. Every [`MessageSource::fetch_messages`] call starts
/// with a fresh login; nothing is persisted between passes. One instance
/// must not be used from concurrent tasks, as a second login would replace
/// the session cookie mid-pagination.
pub struct RaicesClient {
    http: Client,
    jar: Arc<Jar>,
    base_url: Url,
}

impl RaicesClient {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let base_url: Url = base_url.as_ref().parse()?;
        let jar = Arc::new(Jar::default());

        let http = ClientBuilder::new()
            .cookie_provider(jar.clone())
            .timeout(default_timeout())
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            http,
            jar,
            base_url,
        })
    }

    async fn login(&self, creds: &Credentials) -> Result<()> {
        let url = self.base_url.join(LOGIN_PATH)?;
        let form = [
            (USER_PARAM, creds.user.as_str()),
            (PASS_PARAM, creds.pass.as_str()),
            (VER_PARAM, VER_STRING),
        ];

        let resp = self.http.post(url).form(&form).send().await?;
        let status = resp.status();
        let body = decode_portal_bytes(&resp.bytes().await?);
        if !status.is_success() {
            return Err(Error::Status { status, body });
        }

        let login: LoginResponse = serde_json::from_str(&body)?;
        if login.status.code != STATUS_CODE_OK {
            return Err(Error::Auth(format!(
                "status {}: {}",
                login.status.code, login.status.description
            )));
        }

        self.check_session_cookie()
    }

    /// A login can come back with a happy status body and still no session.
    /// Catch that here instead of failing with a confusing page error later.
    fn check_session_cookie(&self) -> Result<()> {
        let cookies = self.jar.cookies(&self.base_url).ok_or(Error::NoSession)?;
        let raw = cookies.to_str().map_err(|_| Error::NoSession)?;
        let found = raw
            .split(';')
            .filter_map(|c| c.trim().split('=').next())
            .any(|name| name == SESSION_COOKIE);
        if found {
            Ok(())
        } else {
            Err(Error::NoSession)
        }
    }

    async fn fetch_page(&self, page: usize) -> Result<Vec<RawMessage>> {
        let url = self.base_url.join(MSG_PATH)?;
        let resp = self
            .http
            .get(url)
            .query(&[(PAGE_PARAM, page.to_string())])
            .send()
            .await?;
        let status = resp.status();
        let body = decode_portal_bytes(&resp.bytes().await?);
        if !status.is_success() {
            return Err(Error::Status { status, body });
        }

        let msg_resp: MessagesResponse = serde_json::from_str(&body)?;
        if msg_resp.status.code != STATUS_CODE_OK {
            warn!(page, code = %msg_resp.status.code, "portal flagged message page");
        }

        Ok(msg_resp.messages)
    }

    /// Download the payload of one attachment within the current session.
    pub async fn fetch_attachment(&self, attachment_id: u64) -> Result<Vec<u8>> {
        let url = self.base_url.join(ATTACHMENT_PATH)?;
        let resp = self
            .http
            .get(url)
            .query(&[(ATTACHMENT_PARAM, attachment_id.to_string())])
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(Error::Status {
                status,
                body: format!("failed to download attachment {attachment_id}"),
            });
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl MessageSource for RaicesClient {
    async fn fetch_messages(
        &self,
        creds: &Credentials,
        last_notified: u64,
    ) -> Result<Vec<Message>> {
        self.login(creds).await?;

        // Pages come newest-id-first, so the watermark acts as a cutoff:
        // once a record at or below it shows up, the rest of the page and
        // all following pages are already delivered.
        let mut retained: Vec<RawMessage> = Vec::new();
        let mut page = 1;
        loop {
            let records = self.fetch_page(page).await?;
            let page_len = records.len();

            let mut hit_watermark = false;
            for raw in records {
                if raw.id <= last_notified {
                    hit_watermark = true;
                    break;
                }
                retained.push(raw);
            }

            if hit_watermark || page_len < MSGS_PER_PAGE {
                break;
            }
            page += 1;
        }
        debug!(pages = page, count = retained.len(), "fetched portal messages");

        for raw in &mut retained {
            for att in &mut raw.attachments {
                att.contents = self.fetch_attachment(att.id).await?;
            }
        }

        let mut msgs = parse_messages(retained)?;
        // The caller wants them in the order they happened
        msgs.reverse();
        Ok(msgs)
    }
}

/// The portal serves ISO-8859-1 bytes no matter what its content type
/// claims, so transcode before handing anything to the JSON decoder.
fn decode_portal_bytes(bytes: &[u8]) -> String {
    let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    text.into_owned()
}
