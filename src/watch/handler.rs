use super::history::{HistoryEvent, HistoryType};
use crate::error::Result;
use crate::gmail::query::label_id;

type Callback = Box<dyn FnMut(&HistoryEvent) -> Result<()> + Send>;
type Predicate = Box<dyn Fn(&HistoryEvent) -> bool + Send>;

/// A callback bound to one history kind, with optional filters narrowing
/// which events it receives. A handler error aborts the current batch and
/// the whole batch is redelivered on the next poll.
pub struct Handler {
    kind: HistoryType,
    label: Option<String>,
    from: Option<String>,
    subject_exact: Option<String>,
    subject_fragment: Option<String>,
    predicates: Vec<Predicate>,
    callback: Callback,
}

impl Handler {
    fn new<F>(kind: HistoryType, callback: F) -> Self
    where
        F: FnMut(&HistoryEvent) -> Result<()> + Send + 'static,
    {
        Handler {
            kind,
            label: None,
            from: None,
            subject_exact: None,
            subject_fragment: None,
            predicates: Vec::new(),
            callback: Box::new(callback),
        }
    }

    pub fn message_added<F>(callback: F) -> Self
    where
        F: FnMut(&HistoryEvent) -> Result<()> + Send + 'static,
    {
        Handler::new(HistoryType::MessageAdded, callback)
    }

    pub fn message_deleted<F>(callback: F) -> Self
    where
        F: FnMut(&HistoryEvent) -> Result<()> + Send + 'static,
    {
        Handler::new(HistoryType::MessageDeleted, callback)
    }

    pub fn label_added<F>(callback: F) -> Self
    where
        F: FnMut(&HistoryEvent) -> Result<()> + Send + 'static,
    {
        Handler::new(HistoryType::LabelAdded, callback)
    }

    pub fn label_removed<F>(callback: F) -> Self
    where
        F: FnMut(&HistoryEvent) -> Result<()> + Send + 'static,
    {
        Handler::new(HistoryType::LabelRemoved, callback)
    }

    pub fn kind(&self) -> HistoryType {
        self.kind
    }

    /// Only events whose message carries this label.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label_id(label));
        self
    }

    /// Only events whose message sender matches this address exactly.
    /// Requires message content, so only `messageAdded` events can match.
    pub fn from_is(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into().to_lowercase());
        self
    }

    pub fn subject_is(mut self, subject: impl Into<String>) -> Self {
        self.subject_exact = Some(subject.into());
        self
    }

    pub fn subject_has(mut self, fragment: impl Into<String>) -> Self {
        self.subject_fragment = Some(fragment.into());
        self
    }

    /// Arbitrary extra condition.
    pub fn filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&HistoryEvent) -> bool + Send + 'static,
    {
        self.predicates.push(Box::new(predicate));
        self
    }

    pub(crate) fn matches(&self, event: &HistoryEvent) -> bool {
        if event.kind != self.kind {
            return false;
        }
        if let Some(label) = &self.label {
            if !event.label_ids.contains(label) {
                return false;
            }
        }
        if let Some(from) = &self.from {
            let sender = event
                .message
                .as_ref()
                .and_then(|m| m.from.as_ref())
                .map(|a| a.email.as_str());
            if sender != Some(from.as_str()) {
                return false;
            }
        }
        if let Some(subject) = &self.subject_exact {
            if event.message.as_ref().map(|m| m.subject.as_str()) != Some(subject.as_str()) {
                return false;
            }
        }
        if let Some(fragment) = &self.subject_fragment {
            let matched = event
                .message
                .as_ref()
                .is_some_and(|m| m.subject.contains(fragment.as_str()));
            if !matched {
                return false;
            }
        }
        self.predicates.iter().all(|p| p(event))
    }

    pub(crate) fn call(&mut self, event: &HistoryEvent) -> Result<()> {
        (self.callback)(event)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: HistoryType, labels: &[&str]) -> HistoryEvent {
        HistoryEvent {
            kind,
            message_id: "m1".into(),
            thread_id: Some("t1".into()),
            label_ids: labels.iter().map(|l| l.to_string()).collect(),
            changed_label_ids: Vec::new(),
            message: None,
        }
    }

    #[test]
    fn test_kind_must_match() {
        let handler = Handler::message_added(|_| Ok(()));
        assert!(handler.matches(&event(HistoryType::MessageAdded, &[])));
        assert!(!handler.matches(&event(HistoryType::MessageDeleted, &[])));
    }

    #[test]
    fn test_label_filter_normalizes_system_names() {
        let handler = Handler::message_added(|_| Ok(())).with_label("inbox");
        assert!(handler.matches(&event(HistoryType::MessageAdded, &["INBOX"])));
        assert!(!handler.matches(&event(HistoryType::MessageAdded, &["SPAM"])));
    }

    #[test]
    fn test_content_filters_need_a_message() {
        let handler = Handler::message_added(|_| Ok(())).from_is("ada@example.com");
        assert!(!handler.matches(&event(HistoryType::MessageAdded, &["INBOX"])));
    }

    #[test]
    fn test_custom_predicate() {
        let handler = Handler::message_deleted(|_| Ok(())).filter(|e| e.message_id == "m1");
        assert!(handler.matches(&event(HistoryType::MessageDeleted, &[])));
        let handler = Handler::message_deleted(|_| Ok(())).filter(|e| e.message_id == "other");
        assert!(!handler.matches(&event(HistoryType::MessageDeleted, &[])));
    }
}
