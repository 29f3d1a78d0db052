use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use super::order::not_blank;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Contact,
    Ticket,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageKind::Contact => "contact",
            MessageKind::Ticket => "ticket",
        })
    }
}

/// A contact-form message or support ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[validate(custom = "not_blank")]
    pub name: String,
    #[serde(default)]
    #[validate(custom = "optional_email")]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[validate(custom = "not_blank", length(max = 4000))]
    pub message: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ContactMessage {
    pub fn has_reply_channel(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().map_or(false, |s| !s.trim().is_empty());
        filled(&self.email) || filled(&self.phone)
    }
}

fn optional_email(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Ok(());
    }
    super::order::email_has_at(value)
}
