use std::collections::VecDeque;

use futures_util::Stream;

use super::client::GmailClient;
use super::message::Message;
use super::models::{ThreadData, ThreadRef};
use super::query::MessageQuery;
use crate::error::Result;

/// A conversation: the thread resource plus its fully parsed messages,
/// oldest first as the API returns them.
#[derive(Debug, Clone)]
pub struct Thread {
    pub id: String,
    pub snippet: Option<String>,
    pub history_id: Option<String>,
    pub messages: Vec<Message>,
}

impl Thread {
    pub(crate) fn from_data(data: ThreadData) -> Self {
        Thread {
            id: data.id,
            snippet: data.snippet,
            history_id: data.history_id,
            messages: data.messages.into_iter().map(Message::from_data).collect(),
        }
    }

    /// The newest message in the conversation.
    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn is_unread(&self) -> bool {
        self.messages.iter().any(Message::is_unread)
    }

    pub async fn add_label(&self, client: &GmailClient, label: &str) -> Result<()> {
        client.modify_thread_labels(&self.id, &[label], &[]).await
    }

    pub async fn remove_label(&self, client: &GmailClient, label: &str) -> Result<()> {
        client.modify_thread_labels(&self.id, &[], &[label]).await
    }

    /// Marks every message in the thread read.
    pub async fn mark_read(&self, client: &GmailClient) -> Result<()> {
        client.modify_thread_labels(&self.id, &[], &["UNREAD"]).await
    }

    pub async fn mark_unread(&self, client: &GmailClient) -> Result<()> {
        client.modify_thread_labels(&self.id, &["UNREAD"], &[]).await
    }

    pub async fn delete(&self, client: &GmailClient) -> Result<()> {
        client.delete_thread(&self.id).await
    }

    pub async fn trash(&self, client: &GmailClient) -> Result<()> {
        client.trash_thread(&self.id).await
    }

    pub async fn untrash(&self, client: &GmailClient) -> Result<()> {
        client.untrash_thread(&self.id).await
    }
}

/// Lazy, finite sequence of threads, paginated like
/// [`MessageStream`](super::message::MessageStream). Each item costs one
/// `threads.get` call on top of the shared list pages.
pub struct ThreadStream<'a> {
    client: &'a GmailClient,
    query: MessageQuery,
    page_token: Option<String>,
    buffer: VecDeque<ThreadRef>,
    done: bool,
}

impl<'a> ThreadStream<'a> {
    pub(crate) fn new(client: &'a GmailClient, query: MessageQuery) -> Self {
        ThreadStream {
            client,
            query,
            page_token: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    pub async fn next(&mut self) -> Option<Result<Thread>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(self.client.get_thread(&item.id).await);
            }
            if self.done {
                return None;
            }
            match self
                .client
                .list_threads(&self.query, self.page_token.as_deref())
                .await
            {
                Ok(page) => {
                    self.buffer.extend(page.threads.unwrap_or_default());
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
    pub async fn collect(mut self) -> Result<Vec<Thread>> {
        let mut threads = Vec::new();
        while let Some(item) = self.next().await {
            threads.push(item?);
        }
        Ok(threads)
    }

    /// Adapt into a [`futures_util::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<Thread>> + 'a {
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

    fn thread_json(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "snippet": "latest snippet",
            "historyId": "500",
            "messages": [
                {
                    "id": format!("{id}-m1"),
                    "threadId": id,
                    "labelIds": ["INBOX"],
                    "payload": {
                        "mimeType": "text/plain",
                        "headers": [
                            {"name": "Subject", "value": "First"},
                            {"name": "From", "value": "ada@example.com"}
                        ],
                        "body": {"data": BASE64_URL_SAFE_NO_PAD.encode("opening")}
                    }
                },
                {
                    "id": format!("{id}-m2"),
                    "threadId": id,
                    "labelIds": ["INBOX", "UNREAD"],
                    "payload": {
                        "mimeType": "text/plain",
                        "headers": [
                            {"name": "Subject", "value": "Re: First"},
                            {"name": "From", "value": "bob@example.com"}
                        ],
                        "body": {"data": BASE64_URL_SAFE_NO_PAD.encode("reply")}
                    }
                }
            ]
        })
    }

    #[test]
    fn test_thread_from_data() {
        let data: ThreadData = serde_json::from_value(thread_json("t1")).unwrap();
        let thread = Thread::from_data(data);

        assert_eq!(thread.id, "t1");
        assert_eq!(thread.messages.len(), 2);
        assert!(thread.is_unread());
        let latest = thread.latest().unwrap();
        assert_eq!(latest.subject, "Re: First");
        assert_eq!(latest.text, "reply");
    }

    #[tokio::test]
    async fn test_thread_stream() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users/me/threads")
            .with_body(r#"{"threads":[{"id":"t1"},{"id":"t2"}],"resultSizeEstimate":2}"#)
            .create_async()
            .await;
        for id in ["t1", "t2"] {
            server
                .mock("GET", &*format!("/users/me/threads/{id}"))
                .match_query(mockito::Matcher::Any)
                .with_body(thread_json(id).to_string())
                .create_async()
                .await;
        }

        let client = GmailClient::from_token("t").with_base_url(server.url());
        let threads = client.get_threads(MessageQuery::new()).collect().await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].id, "t1");
        assert_eq!(threads[1].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_thread_mark_read_modifies_labels() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/users/me/threads/t1/modify")
            .match_body(mockito::Matcher::JsonString(
                r#"{"removeLabelIds":["UNREAD"]}"#.to_string(),
            ))
            .with_body("{}")
            .create_async()
            .await;

        let data: ThreadData = serde_json::from_value(thread_json("t1")).unwrap();
        let thread = Thread::from_data(data);
        let client = GmailClient::from_token("t").with_base_url(server.url());
        thread.mark_read(&client).await.unwrap();
        mock.assert_async().await;
    }
}
