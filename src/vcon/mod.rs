//! Minimal vCon (virtual conversation) document model.
//!
//! Only the parts the adapter populates are typed; the remaining top-level
//! arrays are carried as raw JSON so the emitted document keeps the full
//! vCon shape.

pub mod builder;

pub use builder::RecordBuilder;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// vCon schema version emitted by this adapter
pub const VCON_VERSION: &str = "0.0.1";

/// Attachment type carrying the fax image
pub const FAX_IMAGE_ATTACHMENT: &str = "fax_image";

/// Attachment type carrying `name:value` metadata tags
pub const TAGS_ATTACHMENT: &str = "tags";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vcon {
    pub vcon: String,
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub redacted: serde_json::Map<String, Value>,
    #[serde(default)]
    pub group: Vec<Value>,
    #[serde(default)]
    pub parties: Vec<Party>,
    #[serde(default)]
    pub dialog: Vec<Value>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub analysis: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub tel: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub body: Value,
    pub encoding: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
}

impl Vcon {
    /// Empty vCon with a fresh UUID
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            vcon: VCON_VERSION.to_string(),
            uuid: Uuid::new_v4(),
            created_at,
            redacted: serde_json::Map::new(),
            group: Vec::new(),
            parties: Vec::new(),
            dialog: Vec::new(),
            attachments: Vec::new(),
            analysis: Vec::new(),
        }
    }

    pub fn add_party(&mut self, tel: impl Into<String>) {
        self.parties.push(Party { tel: tel.into() });
    }

    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    /// Append a `name:value` tag, creating the tags attachment on first use.
    pub fn add_tag(&mut self, name: &str, value: impl AsRef<str>) {
        let tag = Value::String(format!("{}:{}", name, value.as_ref()));

        if let Some(tags) = self
            .attachments
            .iter_mut()
            .find(|a| a.kind == TAGS_ATTACHMENT)
        {
            if let Value::Array(items) = &mut tags.body {
                items.push(tag);
                return;
            }
            tags.body = Value::Array(vec![tag]);
            return;
        }

        self.attachments.push(Attachment {
            kind: TAGS_ATTACHMENT.to_string(),
            body: Value::Array(vec![tag]),
            encoding: "json".to_string(),
            filename: None,
            mimetype: None,
        });
    }

    /// Look up a tag value by name
    pub fn tag(&self, name: &str) -> Option<&str> {
        let tags = self.attachments.iter().find(|a| a.kind == TAGS_ATTACHMENT)?;
        tags.body
            .as_array()?
            .iter()
            .find_map(|v| v.as_str()?.strip_prefix(name)?.strip_prefix(':'))
    }

    /// The fax image attachment, if present
    pub fn image_attachment(&self) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.kind == FAX_IMAGE_ATTACHMENT)
    }
}
