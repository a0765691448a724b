//! HTML rendering of conversation transcripts.
//!
//! Provides the question/answer transcript page and the list of documents included
//! in the conversation.

mod transcript;

pub use transcript::{markdown_to_html, render, render_sources};
