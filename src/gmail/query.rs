use chrono::NaiveDate;

const SYSTEM_LABELS: &[&str] = &[
    "chat",
    "sent",
    "inbox",
    "important",
    "trash",
    "draft",
    "spam",
    "category_forums",
    "category_updates",
    "category_personal",
    "category_promotions",
    "category_social",
    "starred",
    "unread",
];

/// Normalize a label name to the id the API expects: system labels are
/// uppercase ids, user labels pass through unchanged.
pub(crate) fn label_id(name: &str) -> String {
    if SYSTEM_LABELS.contains(&name.to_lowercase().as_str()) {
        name.to_uppercase()
    } else {
        name.to_string()
    }
}

/// Builder for message/thread list filters. Produces the Gmail search `q`
/// string plus the structured list parameters.
#[derive(Debug, Default, Clone)]
pub struct MessageQuery {
    label_ids: Vec<String>,
    seen: Option<bool>,
    from: Option<String>,
    to: Vec<String>,
    subject: Option<String>,
    after: Option<NaiveDate>,
    before: Option<NaiveDate>,
    has_attachment: bool,
    terms: Vec<String>,
    include_spam_trash: bool,
}

impl MessageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a label, by system name (`"inbox"`) or label id.
    pub fn label(mut self, name: &str) -> Self {
        self.label_ids.push(label_id(name));
        self
    }

    /// `true` restricts to read messages, `false` to unread.
    pub fn seen(mut self, seen: bool) -> Self {
        self.seen = Some(seen);
        self
    }

    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn after(mut self, date: NaiveDate) -> Self {
        self.after = Some(date);
        self
    }

    pub fn before(mut self, date: NaiveDate) -> Self {
        self.before = Some(date);
        self
    }

    pub fn has_attachment(mut self) -> Self {
        self.has_attachment = true;
        self
    }

    /// Free-text search term, passed through to the `q` string verbatim.
    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.terms.push(term.into());
        self
    }

    pub fn include_spam_and_trash(mut self) -> Self {
        self.include_spam_trash = true;
        self
    }

    /// The `q` search string, or `None` when no text filter applies.
    pub fn q(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(seen) = self.seen {
            parts.push(if seen { "is:read".to_string() } else { "is:unread".to_string() });
        }
        if let Some(after) = self.after {
            parts.push(format!("after:{}", after.format("%Y/%m/%d")));
        }
        if let Some(before) = self.before {
            parts.push(format!("before:{}", before.format("%Y/%m/%d")));
        }
        if let Some(from) = &self.from {
            parts.push(format!("from:({from})"));
        }
        if !self.to.is_empty() {
            parts.push(format!("to:({})", self.to.join(",")));
        }
        if let Some(subject) = &self.subject {
            parts.push(format!("subject:({subject})"));
        }
        if self.has_attachment {
            parts.push("has:attachment".to_string());
        }
        parts.extend(self.terms.iter().cloned());
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// Query parameters for the list endpoints.
    pub(crate) fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(q) = self.q() {
            params.push(("q".to_string(), q));
        }
        for label in &self.label_ids {
            params.push(("labelIds".to_string(), label.clone()));
        }
        if self.include_spam_trash {
            params.push(("includeSpamTrash".to_string(), "true".to_string()));
        }
        params
    }
}
