use crate::gmail::Message;

/// The mailbox change categories `history.list` can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryType {
    MessageAdded,
    MessageDeleted,
    LabelAdded,
    LabelRemoved,
}

impl HistoryType {
    /// The `historyTypes` parameter value for this category.
    pub(crate) fn wire_name(self) -> &'static str {
        match self {
            HistoryType::MessageAdded => "messageAdded",
            HistoryType::MessageDeleted => "messageDeleted",
            HistoryType::LabelAdded => "labelAdded",
            HistoryType::LabelRemoved => "labelRemoved",
        }
    }
}

/// One mailbox change, delivered to handlers in mailbox order.
///
/// `message` is populated for [`HistoryType::MessageAdded`] events; deleted
/// messages and label changes carry only the reference fields, so content
/// filters never match those events.
#[derive(Debug, Clone)]
pub struct HistoryEvent {
    pub kind: HistoryType,
    pub message_id: String,
    pub thread_id: Option<String>,
    /// Labels on the message at the time the change was recorded.
    pub label_ids: Vec<String>,
    /// Labels added or removed, for the label change kinds.
    pub changed_label_ids: Vec<String>,
    pub message: Option<Message>,
}
