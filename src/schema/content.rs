//! Display artifacts produced by passages.
//!
//! These are the resolved, renderer-facing records. Anything dynamic has
//! already been evaluated by the time one of these exists.

use serde::{Deserialize, Serialize};

/// One renderable unit of a story screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoryComponent {
    Text {
        content: String,
    },
    Header {
        content: String,
        #[serde(default = "default_header_level")]
        level: u8,
    },
    Image {
        src: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
    },
    Video {
        src: String,
        #[serde(default)]
        autoplay: bool,
        #[serde(default, rename = "loop")]
        looped: bool,
    },
    /// Navigation to another passage.
    Link {
        content: String,
        #[serde(rename = "passageId")]
        passage_id: String,
    },
}

fn default_header_level() -> u8 {
    1
}

impl StoryComponent {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn header(content: impl Into<String>, level: u8) -> Self {
        Self::Header {
            content: content.into(),
            level,
        }
    }

    pub fn link(content: impl Into<String>, passage_id: impl Into<String>) -> Self {
        Self::Link {
            content: content.into(),
            passage_id: passage_id.into(),
        }
    }

    /// Visible text of the component, if it has any.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Text { content } | Self::Header { content, .. } | Self::Link { content, .. } => {
                Some(content)
            }
            Self::Image { alt, .. } => alt.as_deref(),
            Self::Video { .. } => None,
        }
    }
}

/// A hotspot after its dynamic fields were evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedHotspot {
    pub id: String,
    /// Position in percent of the map image.
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// What an interactive map shows for one display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDisplay {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    pub hotspots: Vec<ResolvedHotspot>,
}

impl MapDisplay {
    pub fn hotspot(&self, id: &str) -> Option<&ResolvedHotspot> {
        self.hotspots.iter().find(|h| h.id == id)
    }
}
