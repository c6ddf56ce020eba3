use crate::{MessageId, Path};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A mail transaction exactly as the protocol collected it:
/// the HELO/EHLO name, envelope and the DATA payload. The payload is
/// kept as received; it need not be valid UTF-8.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpMessage {
    pub helo: String,
    pub from: String,
    pub to: Vec<String>,
    pub data: Vec<u8>,
}

/// The headers and body of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: String,
    pub size: usize,
}

impl Content {
    /// Split `data` into its header block and body. Data whose header
    /// block cannot be parsed is treated as being all body. The body is
    /// a decoded view; bytes that are not UTF-8 show up as U+FFFD here
    /// and are preserved untouched in [SmtpMessage::data].
    pub fn parse(data: &[u8]) -> Self {
        let size = data.len();
        match mailparse::parse_headers(data) {
            Ok((parsed, body_offset)) => {
                let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for header in parsed {
                    headers
                        .entry(header.get_key())
                        .or_default()
                        .push(header.get_value());
                }
                Self {
                    headers,
                    body: String::from_utf8_lossy(data.get(body_offset..).unwrap_or_default())
                        .into_owned(),
                    size,
                }
            }
            Err(_) => Self {
                headers: BTreeMap::new(),
                body: String::from_utf8_lossy(data).into_owned(),
                size,
            },
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    fn set_header<V: Into<String>>(&mut self, name: &str, value: V) {
        self.headers
            .retain(|key, _| !key.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), vec![value.into()]);
    }
}

/// A message that has been accepted and finalized: it has an id,
/// parsed envelope and content, and still carries the raw transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub from: Path,
    pub to: Vec<Path>,
    pub content: Content,
    pub created: DateTime<Utc>,
    pub raw: SmtpMessage,
}

impl SmtpMessage {
    /// Finalize the transaction as received by `hostname`.
    /// Assigns a fresh id and stamps the `Message-ID`, `Received`
    /// and `Return-Path` headers into the content.
    pub fn parse(self, hostname: &str) -> Message {
        let id = MessageId::generate(hostname);
        let created = Utc::now();

        let mut content = Content::parse(&self.data);
        content.set_header("Message-ID", id.as_str());
        content.set_header(
            "Received",
            format!(
                "from {} by {hostname}\r\n          id {id}; {}",
                self.helo,
                created.to_rfc2822()
            ),
        );
        content.set_header("Return-Path", format!("<{}>", self.from));

        Message {
            from: Path::parse(&self.from),
            to: self.to.iter().map(|to| Path::parse(to)).collect(),
            id,
            content,
            created,
            raw: self,
        }
    }
}
