use base64::prelude::*;
use mail_builder::MessageBuilder;
use mail_builder::headers::address::Address;
use mail_builder::headers::raw::Raw;

use super::models::SendRequest;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub(crate) struct OutgoingAttachment {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Builder for an outgoing message. Rendered to RFC 5322 with
/// `mail-builder` and base64url-encoded for the send endpoint; Gmail fills
/// in the From header for the authenticated account when it is omitted.
#[derive(Debug, Clone, Default)]
pub struct SendMessage {
    pub(crate) from: Option<String>,
    pub(crate) to: Vec<String>,
    pub(crate) cc: Vec<String>,
    pub(crate) bcc: Vec<String>,
    pub(crate) subject: Option<String>,
    pub(crate) text: Option<String>,
    pub(crate) html: Option<String>,
    pub(crate) attachments: Vec<OutgoingAttachment>,
    pub(crate) in_reply_to: Option<String>,
    pub(crate) references: Vec<String>,
    pub(crate) thread_id: Option<String>,
}

impl SendMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit sender, as `addr@host` or `Name <addr@host>`.
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    pub fn attachment(
        mut self,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.attachments.push(OutgoingAttachment {
            filename: filename.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        });
        self
    }

    /// Continue an existing thread instead of starting a new one.
    pub fn thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    #[cfg(test)]
    fn with_reply_context(mut self, in_reply_to: &str, references: Vec<String>) -> Self {
        self.in_reply_to = Some(in_reply_to.to_string());
        self.references = references;
        self
    }

    pub(crate) fn into_send_request(mut self) -> Result<SendRequest> {
        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Err(Error::Draft("no recipients".into()));
        }
        let thread_id = self.thread_id.take();
        let raw = self.render()?;
        Ok(SendRequest {
            raw: BASE64_URL_SAFE_NO_PAD.encode(raw),
            thread_id,
        })
    }

    fn render(self) -> Result<Vec<u8>> {
        let mut builder = MessageBuilder::new();
        if let Some(from) = &self.from {
            builder = builder.from(parse_address(from));
        }
        if !self.to.is_empty() {
            builder = builder.to(address_list(&self.to));
        }
        if !self.cc.is_empty() {
            builder = builder.cc(address_list(&self.cc));
        }
        if !self.bcc.is_empty() {
            builder = builder.bcc(address_list(&self.bcc));
        }
        if let Some(subject) = &self.subject {
            builder = builder.subject(subject.as_str());
        }
        if let Some(in_reply_to) = &self.in_reply_to {
            builder = builder.header("In-Reply-To", Raw::new(format!("<{in_reply_to}>")));
        }
        if !self.references.is_empty() {
            let chain = self
                .references
                .iter()
                .map(|r| format!("<{r}>"))
                .collect::<Vec<_>>()
                .join(" ");
            builder = builder.header("References", Raw::new(chain));
        }
        if let Some(text) = &self.text {
            builder = builder.text_body(text.as_str());
        }
        if let Some(html) = &self.html {
            builder = builder.html_body(html.as_str());
        }
        for attachment in &self.attachments {
            builder = builder.attachment(
                attachment.mime_type.as_str(),
                attachment.filename.as_str(),
                attachment.data.as_slice(),
            );
        }
        Ok(builder.write_to_vec()?)
    }
}

fn address_list(addresses: &[String]) -> Address<'_> {
    Address::new_list(
        addresses
            .iter()
            .map(|a| parse_address(a))
            .collect::<Vec<_>>(),
    )
}

// Accept either "addr@host" or "Name <addr@host>".
fn parse_address(raw: &str) -> Address<'_> {
    if let (Some(start), Some(end)) = (raw.find('<'), raw.rfind('>')) {
        if start < end {
            let name = raw[..start].trim().trim_matches('"');
            let email = raw[start + 1..end].trim();
            if name.is_empty() {
                return Address::new_address(None::<&str>, email);
            }
            return Address::new_address(Some(name), email);
        }
    }
    Address::new_address(None::<&str>, raw.trim())
}
