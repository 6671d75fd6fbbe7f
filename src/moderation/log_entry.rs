//! Moderation log entries
//!
//! A [`LogEntry`] is a sink-neutral description of an embed. The serenity
//! backend renders it; tests inspect it directly.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const COLOR_RED: u32 = 0x00FF_0000;
pub const COLOR_YELLOW: u32 = 0x00FF_FF00;
pub const COLOR_PINK: u32 = 0x00FF_AFAF;

/// Discord's limit on an embed field value, in characters
pub const FIELD_VALUE_LIMIT: usize = 1024;
/// Discord's limit on a message body, in characters
pub const CONTENT_LIMIT: usize = 2000;
/// Stands in for empty field values, which Discord rejects
pub const EMPTY_FIELD_VALUE: &str = "\u{200b}";

const ELLIPSIS: char = '\u{2026}';

/// Logical log destinations, resolved to channels by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogChannel {
    /// Role grants and other events moderators must see
    Important,
    /// Automatic deletions (scam links, departed users' requests)
    RequestsDeletion,
    /// Joins and leaves
    Basic,
}

impl fmt::Display for LogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Important => write!(f, "important"),
            Self::RequestsDeletion => write!(f, "requests-deletion"),
            Self::Basic => write!(f, "basic"),
        }
    }
}

/// A single inline or block field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Embed author line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogAuthor {
    pub name: String,
    pub icon_url: Option<String>,
}

/// Description of one log message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogEntry {
    pub title: String,
    pub description: Option<String>,
    pub color: u32,
    pub fields: Vec<LogField>,
    pub footer: Option<String>,
    pub thumbnail: Option<String>,
    pub author: Option<LogAuthor>,
    /// Plain message body sent alongside the embed, with mentions disabled
    pub content: Option<String>,
}

impl LogEntry {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            color,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a field. Empty values get a placeholder and long ones are cut
    /// to [`FIELD_VALUE_LIMIT`].
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        let value = value.into();
        let value = if value.is_empty() {
            EMPTY_FIELD_VALUE.to_string()
        } else {
            truncate_chars(&value, FIELD_VALUE_LIMIT)
        };
        self.fields.push(LogField {
            name: name.into(),
            value,
            inline,
        });
        self
    }

    #[must_use]
    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Set the thumbnail, ignoring empty URLs
    #[must_use]
    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !url.is_empty() {
            self.thumbnail = Some(url);
        }
        self
    }

    #[must_use]
    pub fn author(mut self, name: impl Into<String>, icon_url: Option<String>) -> Self {
        self.author = Some(LogAuthor {
            name: name.into(),
            icon_url: icon_url.filter(|url| !url.is_empty()),
        });
        self
    }

    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(truncate_chars(&content.into(), CONTENT_LIMIT));
        self
    }

    /// Value of the first field with the given name
    #[must_use]
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }
}

/// Cut `text` to at most `max` characters, marking the cut with an ellipsis
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push(ELLIPSIS);
    cut
}

/// Wrap text in a Markdown code block that fits in one field value
#[must_use]
pub fn codeblock(text: &str) -> String {
    const FENCES: usize = "```\n\n```".len();
    let escaped = text.replace("```", "`\u{200b}``");
    format!(
        "```\n{}\n```",
        truncate_chars(&escaped, FIELD_VALUE_LIMIT - FENCES)
    )
}
