use super::client::GmailClient;
use super::message::MessageStream;
use super::models::{LabelColor, LabelData, LabelRequest};
use super::query::MessageQuery;
use crate::error::Result;

/// A mailbox label, system (`INBOX`, `UNREAD`, ...) or user-created.
#[derive(Debug, Clone)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub label_type: Option<String>,
    pub message_list_visibility: Option<String>,
    pub label_list_visibility: Option<String>,
    pub messages_total: Option<u64>,
    pub messages_unread: Option<u64>,
    pub threads_total: Option<u64>,
    pub threads_unread: Option<u64>,
    pub color: Option<LabelColor>,
}

impl Label {
    pub(crate) fn from_data(data: LabelData) -> Self {
        Label {
            id: data.id,
            name: data.name,
            label_type: data.label_type,
            message_list_visibility: data.message_list_visibility,
            label_list_visibility: data.label_list_visibility,
            messages_total: data.messages_total,
            messages_unread: data.messages_unread,
            threads_total: data.threads_total,
            threads_unread: data.threads_unread,
            color: data.color,
        }
    }

    /// System labels cannot be renamed or deleted.
    pub fn is_system(&self) -> bool {
        self.label_type.as_deref() == Some("system")
    }

    /// Stream the messages carrying this label.
    pub fn get_messages<'a>(&self, client: &'a GmailClient) -> MessageStream<'a> {
        client.get_messages(MessageQuery::new().label(&self.id))
    }

    pub async fn delete(&self, client: &GmailClient) -> Result<()> {
        client.delete_label(&self.id).await
    }
}

/// Where a label shows in the message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageListVisibility {
    Show,
    Hide,
}

impl MessageListVisibility {
    fn wire_name(self) -> &'static str {
        match self {
            MessageListVisibility::Show => "show",
            MessageListVisibility::Hide => "hide",
        }
    }
}

/// Where a label shows in the sidebar label list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelListVisibility {
    Show,
    ShowIfUnread,
    Hide,
}

impl LabelListVisibility {
    fn wire_name(self) -> &'static str {
        match self {
            LabelListVisibility::Show => "labelShow",
            LabelListVisibility::ShowIfUnread => "labelShowIfUnread",
            LabelListVisibility::Hide => "labelHide",
        }
    }
}

/// Builder for label create and update calls.
#[derive(Debug, Clone)]
pub struct NewLabel {
    name: String,
    message_list_visibility: Option<MessageListVisibility>,
    label_list_visibility: Option<LabelListVisibility>,
    background_color: Option<String>,
    text_color: Option<String>,
}

impl NewLabel {
    pub fn new(name: impl Into<String>) -> Self {
        NewLabel {
            name: name.into(),
            message_list_visibility: None,
            label_list_visibility: None,
            background_color: None,
            text_color: None,
        }
    }

    pub fn message_list_visibility(mut self, visibility: MessageListVisibility) -> Self {
        self.message_list_visibility = Some(visibility);
        self
    }

    pub fn label_list_visibility(mut self, visibility: LabelListVisibility) -> Self {
        self.label_list_visibility = Some(visibility);
        self
    }

    /// Colors are hex strings from the fixed Gmail palette, e.g. `#fb4c2f`.
    pub fn color(
        mut self,
        background: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.background_color = Some(background.into());
        self.text_color = Some(text.into());
        self
    }

    pub(crate) fn into_request(self) -> LabelRequest {
        let color = if self.background_color.is_some() || self.text_color.is_some() {
            Some(LabelColor {
                background_color: self.background_color,
                text_color: self.text_color,
            })
        } else {
            None
        };
        LabelRequest {
            name: self.name,
            message_list_visibility: self.message_list_visibility.map(|v| v.wire_name().to_string()),
            label_list_visibility: self.label_list_visibility.map(|v| v.wire_name().to_string()),
            color,
        }
    }
}
