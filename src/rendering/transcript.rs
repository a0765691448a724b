//! Transcript page rendering.

use std::fmt::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pulldown_cmark::{Options, Parser, html};
use pulldown_cmark_escape::escape_html;

use crate::models::MessageFragment;

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Chat Conversation</title>
    <style>
        body {
            font-family: "Roboto","Helvetica","Arial", sans-serif;
            font-size: 0.875rem;
            line-height: 1.43;
            letter-spacing: 0.01071em;
            color: #4e4b66;
        }

        .user {
            display: block;
            font-weight: bold;
            font-style: italic;
            background: #F7F7FC;
            border-radius: 4px;
        }

        .user p {
            padding: 1em;
        }

        .message {
            margin: 10px;
            border: 1px solid #ccc;
            padding: 10px;
        }

        .content {
            display: none;
            margin-top: 1px;
            padding: 1px;
        }

        .summary {
            cursor: pointer;
        }

        details[open] .content {
            display: block;
        }

        pre {
            background-color: #f8f9fa;
            border-radius: 4px;
            overflow-x: auto;
        }

        blockquote {
            background-color: #f2f2f2;
            padding: 10px;
        }
    </style>
</head>
<body>
    <div class="conversation">
"#;

const PAGE_TAIL: &str = r#"    </div>
    <link rel="stylesheet" href="//cdnjs.cloudflare.com/ajax/libs/highlight.js/11.7.0/styles/base16/chalk.min.css">
    <script src="//cdnjs.cloudflare.com/ajax/libs/highlight.js/11.7.0/highlight.min.js"></script>
    <script>hljs.highlightAll();</script>
</body>
</html>
"#;

/// Converts markdown to an HTML fragment.
///
/// Tables and strikethrough are enabled; raw HTML passes through unchanged.
#[must_use]
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Renders a question and its reply fragments as a standalone HTML page.
///
/// The question becomes a level-two heading. Each fragment gets its own
/// `message` container in order: text through markdown, images inlined as
/// base64 PNG data URIs inside a blockquote.
#[must_use]
pub fn render(question: &str, fragments: &[MessageFragment]) -> String {
    let mut page = String::from(PAGE_HEAD);

    let heading = markdown_to_html(&format!("## {question}\n"));
    let _ = writeln!(page, r#"<div class="message">{heading}</div>"#);

    for fragment in fragments {
        match fragment {
            MessageFragment::Image(bytes) => {
                let encoded = STANDARD.encode(bytes);
                let _ = writeln!(
                    page,
                    r#"<blockquote><div class="message"><img src="data:image/png;base64,{encoded}" style="width:50%;" /></div></blockquote>"#
                );
            },
            MessageFragment::Text(text) => {
                let _ = writeln!(page, r#"<div class="message">{}</div>"#, markdown_to_html(text));
            },
        }
    }

    page.push_str(PAGE_TAIL);
    page
}

/// Renders the list of documents included in the conversation.
#[must_use]
pub fn render_sources(items: &[String]) -> String {
    let mut page = String::from("<html>\n<body>\n");
    page.push_str(
        "<strong>The following documents are currently included in the search:</strong>\n",
    );
    page.push_str("<ul>\n");
    for item in items {
        page.push_str("<li>");
        let _ = escape_html(&mut page, item);
        page.push_str("</li>\n");
    }
    page.push_str("</ul>\n</body>\n</html>\n");
    page
}
