use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::{backend::MessagingBackend, error::SendError, media::MediaItem};

pub const API_BASE: &str = "https://api.telegram.org";

pub struct TelegramClient {
    token: String,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(60),
            read: Duration::from_secs(60),
            write: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
struct TelegramInputMedia {
    r#type: &'static str,
    media: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<String>,
}

#[derive(Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Deserialize)]
struct TelegramUser {
    first_name: String,
    username: Option<String>,
}

impl TelegramClient {
    pub fn new(token: String, timeouts: Timeouts) -> Result<Self, reqwest::Error> {
        // reqwest has no separate write timeout, it is covered by the total one.
        let http = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .timeout(timeouts.connect + timeouts.read + timeouts.write)
            .build()?;

        Ok(Self {
            token,
            api_base: API_BASE.into(),
            http,
        })
    }

    /// Point the client at another Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base.trim_end_matches('/'), self.token, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, form: Option<Form>) -> Result<T, SendError> {
        let mut req = self.http.post(self.method_url(method));
        if let Some(form) = form {
            req = req.multipart(form);
        }

        let res = req.send().await?;
        let status = res.status().as_u16();
        let text = res.text().await?;

        debug!("{} -> {}", method, status);

        parse_response(status, &text)
    }
}

#[async_trait]
impl MessagingBackend for TelegramClient {
    async fn send_media_batch(
        &self,
        channel_id: &str,
        items: &[MediaItem],
        caption: Option<&str>,
    ) -> Result<(), SendError> {
        let mut form = Form::new().text("chat_id", channel_id.to_string());

        // Media groups need at least two items.
        if let [item] = items {
            let kind = item.kind.as_str();
            form = form.part(kind, Part::bytes(item.data.clone()).file_name(item.file_name()));
            if let Some(caption) = caption {
                form = form.text("caption", caption.to_string());
            }

            let method = format!("send{}{}", &kind[..1].to_uppercase(), &kind[1..]);
            self.call::<serde_json::Value>(&method, Some(form)).await?;
            return Ok(());
        }

        let media = serde_json::to_string(&input_media(items, caption))
            .map_err(|e| SendError::Api { code: 0, description: format!("(postfolder) {}", e) })?;
        form = form.text("media", media);

        for (i, item) in items.iter().enumerate() {
            form = form.part(format!("file{}", i), Part::bytes(item.data.clone()).file_name(item.file_name()));
        }

        self.call::<serde_json::Value>("sendMediaGroup", Some(form)).await?;
        Ok(())
    }

    async fn get_identity(&self) -> Result<String, SendError> {
        let me: TelegramUser = self.call("getMe", None).await?;
        Ok(me.username.unwrap_or(me.first_name))
    }
}

fn input_media(items: &[MediaItem], caption: Option<&str>) -> Vec<TelegramInputMedia> {
    let mut media: Vec<TelegramInputMedia> = items
        .iter()
        .enumerate()
        .map(|(i, item)| TelegramInputMedia {
            r#type: item.kind.as_str(),
            media: format!("attach://file{}", i),
            caption: None,
        })
        .collect();

    if let (Some(first), Some(caption)) = (media.first_mut(), caption) {
        first.caption = Some(caption.to_string());
    }

    media
}

fn parse_response<T: DeserializeOwned>(status: u16, text: &str) -> Result<T, SendError> {
    let unparseable = || SendError::Api {
        code: status,
        description: "(postfolder) unparseable response".into(),
    };

    let res: TelegramResponse<T> = serde_json::from_str(text).map_err(|_| unparseable())?;

    if res.ok {
        res.result.ok_or_else(unparseable)
    } else {
        Err(SendError::Api {
            code: res.error_code.unwrap_or(status),
            description: res.description.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::media::MediaKind;

    use super::*;

    fn item(kind: MediaKind, name: &str) -> MediaItem {
        MediaItem {
            kind,
            path: PathBuf::from(name),
            data: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_input_media_caption_on_first_only() {
        let items = vec![item(MediaKind::Photo, "a.jpg"), item(MediaKind::Video, "b.mp4")];

        let media = input_media(&items, Some("hello"));

        assert_eq!(
            media,
            vec![
                TelegramInputMedia { r#type: "photo", media: "attach://file0".into(), caption: Some("hello".into()) },
                TelegramInputMedia { r#type: "video", media: "attach://file1".into(), caption: None },
            ]
        );
        let json = serde_json::to_string(&media).expect("Should serialize");
        assert_eq!(
            json,
            r#"[{"type":"photo","media":"attach://file0","caption":"hello"},{"type":"video","media":"attach://file1"}]"#
        );
    }

    #[test]
    fn test_parse_ok() {
        let user: TelegramUser = parse_response(200, r#"{"ok":true,"result":{"id":1,"is_bot":true,"first_name":"Poster","username":"poster_bot"}}"#)
            .expect("Should parse");
        assert_eq!(user.username.as_deref(), Some("poster_bot"));
        assert_eq!(user.first_name, "Poster");
    }

    #[test]
    fn test_parse_api_error() {
        let err = parse_response::<serde_json::Value>(400, r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#)
            .expect_err("Should fail");
        match err {
            SendError::Api { code, description } => {
                assert_eq!(code, 400);
                assert_eq!(description, "Bad Request: chat not found");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_response::<serde_json::Value>(400, "{}").is_err());
    }

    #[test]
    fn test_parse_garbage() {
        let err = parse_response::<serde_json::Value>(502, "<html>Bad Gateway</html>").expect_err("Should fail");
        assert!(matches!(err, SendError::Api { code: 502, .. }));
    }

    #[test]
    fn test_method_url() {
        let client = TelegramClient::new("123:abc".into(), Timeouts::default())
            .expect("Should build")
            .with_api_base("http://localhost:8081/");
        assert_eq!(client.method_url("getMe"), "http://localhost:8081/bot123:abc/getMe");
    }
}
