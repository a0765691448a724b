//! Typed units of assistant output.

use std::fmt;

/// One unit of an assistant reply.
///
/// The variant decides how the renderer treats the payload. Fragments are
/// produced by the conversation bridge and consumed once by the renderer.
#[derive(Clone, PartialEq, Eq)]
pub enum MessageFragment {
    /// Raw markdown text.
    Text(String),
    /// Raw image bytes (PNG as produced by the code interpreter).
    Image(Vec<u8>),
}

impl MessageFragment {
    /// Creates a text fragment.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Creates an image fragment.
    #[must_use]
    pub fn image(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Image(bytes.into())
    }

    /// Fragment kind as a lowercase label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
        }
    }

    /// Returns true for image fragments.
    #[must_use]
    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }
}

impl fmt::Debug for MessageFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Image(bytes) => write!(f, "Image({} bytes)", bytes.len()),
        }
    }
}
