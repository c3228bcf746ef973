use chrono::{DateTime, FixedOffset};
use std::collections::VecDeque;

use futures_util::Stream;

use super::client::{GmailClient, decode_base64url};
use super::models::{MessageData, MessagePart, MessageRef};
use super::query::MessageQuery;
use super::send::SendMessage;
use crate::error::{Error, Result};

/// A parsed email address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub name: Option<String>,
    pub email: String,
}

impl Address {
    /// Parse a `Name <addr@host>` or bare `addr@host` header value.
    pub(crate) fn parse(raw: &str) -> Option<Address> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(start) = raw.find('<') {
            let end = raw.find('>').unwrap_or(raw.len());
            let email = raw[start + 1..end].trim().to_lowercase();
            if email.is_empty() {
                return None;
            }
            let name = raw[..start].trim().trim_matches('"');
            Some(Address {
                name: (!name.is_empty()).then(|| decode_header(name)),
                email,
            })
        } else {
            Some(Address {
                name: None,
                email: raw.to_lowercase(),
            })
        }
    }

    /// Render back to header form.
    pub fn to_header(&self) -> String {
        match &self.name {
            Some(name) => format!("{name} <{}>", self.email),
            None => self.email.clone(),
        }
    }
}

/// Reference to an attachment carried by a message. The payload itself is
/// fetched on demand via [`GmailClient::get_attachment`].
#[derive(Debug, Clone)]
pub struct AttachmentRef {
    pub filename: String,
    pub mime_type: String,
    pub attachment_id: Option<String>,
    pub size: u64,
}

/// Immutable snapshot of a remote message, parsed from the `format=full`
/// payload. Mutating actions are remote side effects; the local value goes
/// stale after any of them.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub label_ids: Vec<String>,
    pub snippet: Option<String>,
    pub history_id: Option<String>,
    pub subject: String,
    pub from: Option<Address>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub date: Option<DateTime<FixedOffset>>,
    /// RFC 5322 Message-Id, angle brackets stripped.
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub text: String,
    pub html: String,
    pub attachments: Vec<AttachmentRef>,
}

impl Message {
    pub(crate) fn from_data(data: MessageData) -> Self {
        let mut message = Message {
            id: data.id,
            thread_id: data.thread_id,
            label_ids: data.label_ids,
            snippet: data.snippet,
            history_id: data.history_id,
            subject: String::new(),
            from: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            date: None,
            message_id: None,
            in_reply_to: None,
            references: None,
            text: String::new(),
            html: String::new(),
            attachments: Vec::new(),
        };
        if let Some(payload) = data.payload {
            message.read_headers(&payload);
            walk_parts(&payload, &mut message);
        }
        message
    }

    fn read_headers(&mut self, payload: &MessagePart) {
        for header in payload.headers.iter().flatten() {
            match header.name.to_lowercase().as_str() {
                "subject" => self.subject = decode_header(&header.value),
                "from" => self.from = Address::parse(&header.value),
                "to" => self.to = parse_address_list(&header.value),
                "cc" => self.cc = parse_address_list(&header.value),
                "bcc" => self.bcc = parse_address_list(&header.value),
                "date" => self.date = parse_date(&header.value),
                "message-id" => self.message_id = Some(strip_angles(&header.value)),
                "in-reply-to" => self.in_reply_to = Some(strip_angles(&header.value)),
                "references" => self.references = Some(header.value.trim().to_string()),
                _ => {}
            }
        }
    }

    pub fn is_unread(&self) -> bool {
        self.label_ids.iter().any(|l| l == "UNREAD")
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    pub async fn mark_read(&self, client: &GmailClient) -> Result<()> {
        client.mark_message_read(&self.id).await
    }

    pub async fn mark_unread(&self, client: &GmailClient) -> Result<()> {
        client.mark_message_unread(&self.id).await
    }

    pub async fn add_label(&self, client: &GmailClient, label: &str) -> Result<()> {
        client.modify_message_labels(&self.id, &[label], &[]).await
    }

    pub async fn remove_label(&self, client: &GmailClient, label: &str) -> Result<()> {
        client.modify_message_labels(&self.id, &[], &[label]).await
    }

    pub async fn delete(&self, client: &GmailClient) -> Result<()> {
        client.delete_message(&self.id).await
    }

    pub async fn trash(&self, client: &GmailClient) -> Result<()> {
        client.trash_message(&self.id).await
    }

    pub async fn untrash(&self, client: &GmailClient) -> Result<()> {
        client.untrash_message(&self.id).await
    }

    /// Send `draft` as a reply on this message's thread: recipient,
    /// subject and the References chain are filled in from this message.
    pub async fn reply(&self, client: &GmailClient, draft: SendMessage) -> Result<MessageRef> {
        let sender = self
            .from
            .as_ref()
            .ok_or_else(|| Error::Draft("message has no sender to reply to".into()))?;
        let mut draft = draft;
        draft.to = vec![sender.to_header()];
        draft.subject = Some(reply_subject(&self.subject));
        draft.in_reply_to = self.message_id.clone();
        draft.references = self.reference_chain();
        draft.thread_id = Some(self.thread_id.clone());
        client.send_message(draft).await
    }

    /// Forward this message, re-attaching its attachments.
    pub async fn forward(
        &self,
        client: &GmailClient,
        to: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<MessageRef> {
        let mut draft = SendMessage::new().subject(format!("Fwd: {}", self.subject));
        for recipient in to {
            draft = draft.to(recipient);
        }
        if !self.text.is_empty() {
            draft = draft.text(self.text.clone());
        }
        if !self.html.is_empty() {
            draft = draft.html(self.html.clone());
        }
        for attachment in &self.attachments {
            if let Some(attachment_id) = &attachment.attachment_id {
                let data = client.get_attachment(&self.id, attachment_id).await?;
                draft = draft.attachment(&attachment.filename, &attachment.mime_type, data);
            }
        }
        client.send_message(draft).await
    }

    // Existing References plus this message's own id, oldest first.
    fn reference_chain(&self) -> Vec<String> {
        let mut chain: Vec<String> = self
            .references
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(strip_angles)
            .collect();
        if let Some(message_id) = &self.message_id {
            chain.push(message_id.clone());
        }
        chain
    }
}

fn walk_parts(part: &MessagePart, message: &mut Message) {
    let mime_type = part.mime_type.as_deref().unwrap_or("");
    let has_filename = part.filename.as_deref().is_some_and(|f| !f.is_empty());

    if has_filename {
        // A named part with a body is an attachment regardless of mime type.
        if let Some(body) = &part.body {
            message.attachments.push(AttachmentRef {
                filename: part.filename.clone().unwrap_or_default(),
                mime_type: mime_type.to_string(),
                attachment_id: body.attachment_id.clone(),
                size: body.size.unwrap_or(0),
            });
        }
    } else if mime_type == "text/plain" || mime_type == "text/html" {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
            if let Ok(bytes) = decode_base64url(data) {
                let content = String::from_utf8_lossy(&bytes).into_owned();
                if mime_type == "text/plain" && message.text.is_empty() {
                    message.text = content;
                } else if mime_type == "text/html" && message.html.is_empty() {
                    message.html = content;
                }
            }
        }
    }

    for child in part.parts.iter().flatten() {
        walk_parts(child, message);
    }
}

// Splits on commas outside double quotes, so quoted display names like
// "Doe, Jane" <jane@example.com> stay in one piece.
fn parse_address_list(raw: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in raw.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fragments.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fragments.push(&raw[start..]);
    fragments
        .into_iter()
        .filter_map(Address::parse)
        .map(|a| a.email)
        .collect()
}

// RFC 2047 encoded words in Subject and display names. Decoding runs the
// value through mailparse as a synthetic header.
fn decode_header(raw: &str) -> String {
    if !raw.contains("=?") {
        return raw.to_string();
    }
    let synthetic = format!("X: {raw}");
    match mailparse::parse_header(synthetic.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => raw.to_string(),
    }
}

fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    // Strip trailing comments like "(UTC)" which rfc2822 parsing rejects.
    let raw = match raw.find('(') {
        Some(pos) => raw[..pos].trim(),
        None => raw.trim(),
    };
    DateTime::parse_from_rfc2822(raw).ok()
}

fn strip_angles(raw: &str) -> String {
    raw.trim().trim_start_matches('<').trim_end_matches('>').to_string()
}

fn reply_subject(subject: &str) -> String {
    if subject.to_lowercase().starts_with("re:") {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}

/// Lazy, finite sequence of messages. Fetches list pages on demand and the
/// full message for each item. Restartable only by building a new one.
pub struct MessageStream<'a> {
    client: &'a GmailClient,
    query: MessageQuery,
    page_token: Option<String>,
    buffer: VecDeque<MessageRef>,
    done: bool,
}

impl<'a> MessageStream<'a> {
    pub(crate) fn new(client: &'a GmailClient, query: MessageQuery) -> Self {
        MessageStream {
            client,
            query,
            page_token: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    pub async fn next(&mut self) -> Option<Result<Message>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(self.client.get_message(&item.id).await);
            }
            if self.done {
                return None;
            }
            match self
                .client
                .list_messages(&self.query, self.page_token.as_deref())
                .await
            {
                Ok(page) => {
                    self.buffer.extend(page.messages.unwrap_or_default());
                    self.page_token = page.next_page_token;
                    if self.page_token.is_none() {
                        self.done = true;
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }

    /// Drain the remaining sequence into a vector.
    pub async fn collect(mut self) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        while let Some(item) = self.next().await {
            messages.push(item?);
        }
        Ok(messages)
    }

    /// Adapt into a [`futures_util::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<Message>> + 'a {
        futures_util::stream::unfold(self, |mut state| async move {
            let item = state.next().await?;
            Some((item, state))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::prelude::*;
    use serde_json::json;

    fn full_message_json(id: &str, labels: &[&str]) -> serde_json::Value {
        json!({
            "id": id,
            "threadId": format!("t-{id}"),
            "labelIds": labels,
            "snippet": "snippet",
            "historyId": "1000",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    {"name": "Subject", "value": "Quarterly report"},
                    {"name": "From", "value": "\"Ada Lovelace\" <ada@example.com>"},
                    {"name": "To", "value": "Bob <bob@example.com>, carol@example.com"},
                    {"name": "Date", "value": "Tue, 1 Jul 2025 10:52:37 +0200"},
                    {"name": "Message-Id", "value": "<msg-1@mail.example.com>"},
                    {"name": "References", "value": "<root@mail.example.com>"}
                ],
                "parts": [
                    {
                        "mimeType": "multipart/alternative",
                        "parts": [
                            {
                                "mimeType": "text/plain",
                                "body": {"data": BASE64_URL_SAFE_NO_PAD.encode("plain body")}
                            },
                            {
                                "mimeType": "text/html",
                                "body": {"data": BASE64_URL_SAFE_NO_PAD.encode("<p>html body</p>")}
                            }
                        ]
                    },
                    {
                        "mimeType": "application/pdf",
                        "filename": "report.pdf",
                        "body": {"attachmentId": "att-1", "size": 2048}
                    }
                ]
            }
        })
    }

    #[test]
    fn test_parse_full_payload() {
        let data: MessageData =
            serde_json::from_value(full_message_json("m1", &["INBOX", "UNREAD"])).unwrap();
        let message = Message::from_data(data);

        assert_eq!(message.id, "m1");
        assert_eq!(message.thread_id, "t-m1");
        assert_eq!(message.subject, "Quarterly report");
        let from = message.from.as_ref().unwrap();
        assert_eq!(from.email, "ada@example.com");
        assert_eq!(from.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(message.to, vec!["bob@example.com", "carol@example.com"]);
        assert_eq!(message.date.unwrap().to_rfc2822(), "Tue, 1 Jul 2025 10:52:37 +0200");
        assert_eq!(message.message_id.as_deref(), Some("msg-1@mail.example.com"));
        assert_eq!(message.text, "plain body");
        assert_eq!(message.html, "<p>html body</p>");
        assert!(message.is_unread());
        assert!(message.has_attachments());
        assert_eq!(message.attachments[0].filename, "report.pdf");
        assert_eq!(message.attachments[0].attachment_id.as_deref(), Some("att-1"));
        assert_eq!(message.attachments[0].size, 2048);
    }

    #[test]
    fn test_address_parsing() {
        let addr = Address::parse("\"Doe, Jane\" <Jane.Doe@Example.COM>").unwrap();
        assert_eq!(addr.email, "jane.doe@example.com");
        let bare = Address::parse("someone@example.com").unwrap();
        assert!(bare.name.is_none());
        assert!(Address::parse("   ").is_none());
    }

    #[test]
    fn test_address_list_with_quoted_commas() {
        assert_eq!(
            parse_address_list("\"Doe, Jane\" <jane@example.com>, bob@example.com"),
            vec!["jane@example.com", "bob@example.com"]
        );
        assert_eq!(
            parse_address_list("a@example.com, \"Last, First\" <b@example.com>, c@example.com"),
            vec!["a@example.com", "b@example.com", "c@example.com"]
        );
    }

    #[test]
    fn test_encoded_word_headers_are_decoded() {
        let data: MessageData = serde_json::from_value(json!({
            "id": "m1",
            "threadId": "t1",
            "payload": {
                "mimeType": "text/plain",
                "headers": [
                    {"name": "Subject", "value": "=?UTF-8?Q?Gr=C3=BC=C3=9Fe?="},
                    {"name": "From", "value": "=?UTF-8?Q?J=C3=BCrgen_M=C3=BCller?= <jm@example.com>"}
                ]
            }
        }))
        .unwrap();
        let message = Message::from_data(data);

        assert_eq!(message.subject, "Grüße");
        let from = message.from.unwrap();
        assert_eq!(from.name.as_deref(), Some("Jürgen Müller"));
        assert_eq!(from.email, "jm@example.com");
    }

    #[test]
    fn test_reply_subject_and_references() {
        let data: MessageData = serde_json::from_value(full_message_json("m1", &["INBOX"])).unwrap();
        let message = Message::from_data(data);
        assert_eq!(reply_subject(&message.subject), "Re: Quarterly report");
        assert_eq!(reply_subject("RE: ping"), "RE: ping");
        assert_eq!(
            message.reference_chain(),
            vec!["root@mail.example.com", "msg-1@mail.example.com"]
        );
    }

    #[tokio::test]
    async fn test_stream_returns_only_labeled_messages() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users/me/messages")
            .match_query(mockito::Matcher::UrlEncoded("labelIds".into(), "INBOX".into()))
            .with_body(
                r#"{"messages":[{"id":"m1","threadId":"t1"},{"id":"m2","threadId":"t2"}],"resultSizeEstimate":2}"#,
            )
            .create_async()
            .await;
        for id in ["m1", "m2"] {
            server
                .mock("GET", &*format!("/users/me/messages/{id}"))
                .match_query(mockito::Matcher::Any)
                .with_body(full_message_json(id, &["INBOX"]).to_string())
                .create_async()
                .await;
        }

        let client = GmailClient::from_token("t").with_base_url(server.url());
        let messages = client
            .get_messages(MessageQuery::new().label("inbox"))
            .collect()
            .await
            .unwrap();

        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.label_ids.contains(&"INBOX".to_string())));
    }

    #[tokio::test]
    async fn test_stream_follows_pagination() {
        let mut server = mockito::Server::new_async().await;
        // An empty query means the first page request carries no parameters.
        server
            .mock("GET", "/users/me/messages")
            .with_body(r#"{"messages":[{"id":"m1"}],"nextPageToken":"page-2"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/users/me/messages")
            .match_query(mockito::Matcher::UrlEncoded("pageToken".into(), "page-2".into()))
            .with_body(r#"{"messages":[{"id":"m2"}]}"#)
            .create_async()
            .await;
        for id in ["m1", "m2"] {
            server
                .mock("GET", &*format!("/users/me/messages/{id}"))
                .match_query(mockito::Matcher::Any)
                .with_body(full_message_json(id, &["INBOX"]).to_string())
                .create_async()
                .await;
        }

        let client = GmailClient::from_token("t").with_base_url(server.url());
        let mut stream = client.get_messages(MessageQuery::new());
        let mut ids = Vec::new();
        while let Some(message) = stream.next().await {
            ids.push(message.unwrap().id);
        }
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_empty_listing_yields_nothing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users/me/messages")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"resultSizeEstimate":0}"#)
            .create_async()
            .await;

        let client = GmailClient::from_token("t").with_base_url(server.url());
        let messages = client.get_messages(MessageQuery::new()).collect().await.unwrap();
        assert!(messages.is_empty());
    }
}
