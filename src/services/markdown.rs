//! Markdown rendering for learning modules
//!
//! Module bodies are written by LGU staff in Markdown and rendered once, on
//! save, with pulldown-cmark. Raw HTML in the source is emitted as escaped
//! text and script-capable link targets are neutralised, so the stored
//! `content_html` is safe to inject into the page.
//!
//! ```
//! use preppal::services::markdown::MarkdownRenderer;
//!
//! let html = MarkdownRenderer::new().render("# Go Bag\n\nPack **water** first.");
//! assert!(html.contains("<h1>"));
//! assert!(html.contains("<strong>water</strong>"));
//! ```

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};

#[derive(Debug, Clone, Copy)]
pub struct MarkdownRenderer {
    options: Options,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    /// Tables, strikethrough and task lists enabled
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        Self { options }
    }

    pub fn render(&self, markdown: &str) -> String {
        let parser = Parser::new_ext(markdown, self.options).map(sanitize);
        let mut output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut output, parser);
        output
    }
}

fn sanitize(event: Event<'_>) -> Event<'_> {
    match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link { link_type, dest_url, title, id }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image { link_type, dest_url, title, id }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        other => other,
    }
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let scheme = url.trim_start().to_ascii_lowercase();
    if scheme.starts_with("javascript:") || scheme.starts_with("vbscript:") || scheme.starts_with("data:") {
        CowStr::Borrowed("#")
    } else {
        url
    }
}
