use base64::prelude::*;
use log::debug;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::label::{Label, NewLabel};
use super::message::{Message, MessageStream};
use super::models::*;
use super::query::{MessageQuery, label_id};
use super::send::SendMessage;
use super::thread::{Thread, ThreadStream};
use crate::auth::Credentials;
use crate::error::{Error, Result};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Authorized Gmail API client. Holds its own transport and token; pass it
/// by reference to anything that needs mailbox access.
#[derive(Debug, Clone)]
pub struct GmailClient {
    http: Client,
    access_token: String,
    base_url: String,
}

impl GmailClient {
    pub fn new(credentials: &Credentials) -> Self {
        Self::from_token(credentials.access_token.clone())
    }

    pub fn from_token(access_token: impl Into<String>) -> Self {
        GmailClient {
            http: Client::new(),
            access_token: access_token.into(),
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/me/{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.access_token)
            .query(params)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    // For mutations whose response body we discard (trash, modify, ...).
    async fn post_unit(&self, path: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_LENGTH, "0")
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete_unit(&self, path: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(path))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Mailbox profile: address, totals and the current history id.
    pub async fn profile(&self) -> Result<Profile> {
        self.get_json("profile", &[]).await
    }

    // Messages

    /// Lazily paginated listing; restartable from the start only.
    pub fn get_messages(&self, query: MessageQuery) -> MessageStream<'_> {
        MessageStream::new(self, query)
    }

    pub(crate) async fn list_messages(
        &self,
        query: &MessageQuery,
        page_token: Option<&str>,
    ) -> Result<MessageList> {
        let mut params = query.to_params();
        if let Some(token) = page_token {
            params.push(("pageToken".to_string(), token.to_string()));
        }
        self.get_json("messages", &params).await
    }

    pub async fn get_message(&self, message_id: &str) -> Result<Message> {
        let data: MessageData = self
            .get_json(
                &format!("messages/{message_id}"),
                &[("format".to_string(), "full".to_string())],
            )
            .await?;
        Ok(Message::from_data(data))
    }

    /// Render the draft to RFC 5322, base64url-encode it and issue one
    /// send call. Returns the remote reference of the created message.
    pub async fn send_message(&self, draft: SendMessage) -> Result<MessageRef> {
        let body = draft.into_send_request()?;
        debug!("sending message ({} bytes raw)", body.raw.len());
        self.post_json("messages/send", &body).await
    }

    /// Permanently delete a message, bypassing the trash.
    pub async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.delete_unit(&format!("messages/{message_id}")).await
    }

    pub async fn trash_message(&self, message_id: &str) -> Result<()> {
        self.post_unit(&format!("messages/{message_id}/trash")).await
    }

    pub async fn untrash_message(&self, message_id: &str) -> Result<()> {
        self.post_unit(&format!("messages/{message_id}/untrash"))
            .await
    }

    pub async fn modify_message_labels(
        &self,
        message_id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<()> {
        let body = ModifyRequest {
            add_label_ids: add.iter().map(|l| label_id(l)).collect(),
            remove_label_ids: remove.iter().map(|l| label_id(l)).collect(),
        };
        let _: serde_json::Value = self
            .post_json(&format!("messages/{message_id}/modify"), &body)
            .await?;
        Ok(())
    }

    pub async fn mark_message_read(&self, message_id: &str) -> Result<()> {
        self.modify_message_labels(message_id, &[], &["UNREAD"]).await
    }

    pub async fn mark_message_unread(&self, message_id: &str) -> Result<()> {
        self.modify_message_labels(message_id, &["UNREAD"], &[]).await
    }

    /// Download and decode one attachment.
    pub async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>> {
        let attachment: AttachmentData = self
            .get_json(
                &format!("messages/{message_id}/attachments/{attachment_id}"),
                &[],
            )
            .await?;
        decode_base64url(&attachment.data)
    }

    // Threads

    pub fn get_threads(&self, query: MessageQuery) -> ThreadStream<'_> {
        ThreadStream::new(self, query)
    }

    pub(crate) async fn list_threads(
        &self,
        query: &MessageQuery,
        page_token: Option<&str>,
    ) -> Result<ThreadList> {
        let mut params = query.to_params();
        if let Some(token) = page_token {
            params.push(("pageToken".to_string(), token.to_string()));
        }
        self.get_json("threads", &params).await
    }

    pub async fn get_thread(&self, thread_id: &str) -> Result<Thread> {
        let data: ThreadData = self
            .get_json(
                &format!("threads/{thread_id}"),
                &[("format".to_string(), "full".to_string())],
            )
            .await?;
        Ok(Thread::from_data(data))
    }

    pub async fn modify_thread_labels(
        &self,
        thread_id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<()> {
        let body = ModifyRequest {
            add_label_ids: add.iter().map(|l| label_id(l)).collect(),
            remove_label_ids: remove.iter().map(|l| label_id(l)).collect(),
        };
        let _: serde_json::Value = self
            .post_json(&format!("threads/{thread_id}/modify"), &body)
            .await?;
        Ok(())
    }

    pub async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.delete_unit(&format!("threads/{thread_id}")).await
    }

    pub async fn trash_thread(&self, thread_id: &str) -> Result<()> {
        self.post_unit(&format!("threads/{thread_id}/trash")).await
    }

    pub async fn untrash_thread(&self, thread_id: &str) -> Result<()> {
        self.post_unit(&format!("threads/{thread_id}/untrash")).await
    }

    // Labels

    pub async fn get_labels(&self) -> Result<Vec<Label>> {
        let list: LabelList = self.get_json("labels", &[]).await?;
        Ok(list.labels.into_iter().map(Label::from_data).collect())
    }

    pub async fn get_label(&self, label: &str) -> Result<Label> {
        let data: LabelData = self
            .get_json(&format!("labels/{}", label_id(label)), &[])
            .await?;
        Ok(Label::from_data(data))
    }

    pub async fn create_label(&self, label: NewLabel) -> Result<Label> {
        let data: LabelData = self.post_json("labels", &label.into_request()).await?;
        Ok(Label::from_data(data))
    }

    pub async fn update_label(&self, label_id: &str, label: NewLabel) -> Result<Label> {
        let response = self
            .http
            .patch(self.url(&format!("labels/{label_id}")))
            .bearer_auth(&self.access_token)
            .json(&label.into_request())
            .send()
            .await?;
        let response = check(response).await?;
        let data: LabelData = response.json().await?;
        Ok(Label::from_data(data))
    }

    pub async fn delete_label(&self, label_id: &str) -> Result<()> {
        self.delete_unit(&format!("labels/{label_id}")).await
    }

    // History

    /// One page of mailbox deltas since `start_history_id`. A checkpoint
    /// outside the retention window surfaces as `CheckpointExpired`.
    pub async fn list_history(
        &self,
        start_history_id: &str,
        history_types: &[&str],
        label_filter: Option<&str>,
        page_token: Option<&str>,
        max_results: Option<u32>,
    ) -> Result<HistoryList> {
        let mut params = vec![(
            "startHistoryId".to_string(),
            start_history_id.to_string(),
        )];
        for history_type in history_types {
            params.push(("historyTypes".to_string(), history_type.to_string()));
        }
        if let Some(label) = label_filter {
            params.push(("labelId".to_string(), label_id(label)));
        }
        if let Some(token) = page_token {
            params.push(("pageToken".to_string(), token.to_string()));
        }
        if let Some(max) = max_results {
            params.push(("maxResults".to_string(), max.to_string()));
        }
        match self.get_json("history", &params).await {
            Err(Error::NotFound(message)) => Err(Error::CheckpointExpired(message)),
            other => other,
        }
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(Error::from_status(status, message))
}

/// Gmail returns base64url-encoded bodies (RFC 4648 §5), but padding and
/// alphabet vary in practice, so try the lenient fallbacks too.
pub(crate) fn decode_base64url(data: &str) -> Result<Vec<u8>> {
    BASE64_URL_SAFE_NO_PAD
        .decode(data.as_bytes())
        .or_else(|_| BASE64_URL_SAFE.decode(data.as_bytes()))
        .or_else(|_| BASE64_STANDARD.decode(data.as_bytes()))
        .or_else(|_| {
            let cleaned = data.replace('-', "+").replace('_', "/");
            BASE64_STANDARD.decode(cleaned.as_bytes())
        })
        .map_err(|e| Error::Api {
            status: 0,
            message: format!("undecodable base64 payload ({} bytes): {e}", data.len()),
        })
}
