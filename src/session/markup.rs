// Annotated file content: line gutter, classified spans and anchors

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::fmt::Write;

static DISALLOWED_CLASS_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new("[^a-zA-Z_-]").unwrap());

const GUTTER_OPEN: &str =
    "<div class='cz'><table class='tb' cellpadding='0' cellspacing='0'><tr><td valign='top' align='right'><pre id='ln'>";
const CODE_OPEN: &str = "</pre></td><td valign='top' align='left'><pre id='code'>";
const CONTENT_CLOSE: &str = "</pre></td></tr></table></div>";

/// Whether a classification denotes unmarked text
pub fn is_plain_text(classification: &str) -> bool {
    classification.is_empty() || classification.eq_ignore_ascii_case("text")
}

/// CSS class for a classification: invalid characters dropped, language
/// prefixed, lowercased.
pub fn normalize_class_name(language: &str, classification: &str) -> String {
    let name = DISALLOWED_CLASS_CHARS.replace_all(classification, "");
    format!("{}-{}", language, name).to_lowercase()
}

/// Escape text for inclusion in element content
pub fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Markup for one file, built token by token
#[derive(Debug, Default)]
pub struct FileContent {
    buf: String,
}

impl FileContent {
    /// Start a buffer with a line-number gutter of `line_count` lines
    pub fn with_gutter(line_count: u32) -> Self {
        let mut buf = String::with_capacity(GUTTER_OPEN.len() + CODE_OPEN.len() + line_count as usize * 48);
        buf.push_str(GUTTER_OPEN);
        for line in 1..=line_count {
            let _ = write!(buf, "<a id='line-{0}' href='#line-{0}'>{0}</a><br/>", line);
        }
        buf.push_str(CODE_OPEN);
        Self { buf }
    }

    /// Append unclassified text
    pub fn push_text(&mut self, text: &str) {
        self.buf.push_str(&escape_html(text));
    }

    /// Append a classified span. The first anchor becomes the span id; any
    /// further anchors are emitted as empty elements inside the span.
    pub fn push_span(&mut self, class: &str, anchors: &[String], text: &str) {
        let _ = write!(self.buf, "<span class='{}'", class);
        if let Some(first) = anchors.first() {
            let _ = write!(self.buf, " id='{}'", first);
        }
        self.buf.push('>');
        for anchor in anchors.iter().skip(1) {
            let _ = write!(self.buf, "<a id='{}'></a>", anchor);
        }
        self.buf.push_str(&escape_html(text));
        self.buf.push_str("</span>");
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Close the markup and take the finished content, leaving the buffer empty
    pub fn finish(&mut self) -> String {
        self.buf.push_str(CONTENT_CLOSE);
        std::mem::take(&mut self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_classifications() {
        assert!(is_plain_text("text"));
        assert!(is_plain_text("Text"));
        assert!(is_plain_text(""));
        assert!(!is_plain_text("keyword"));
    }

    #[test]
    fn test_normalize_class_name() {
        assert_eq!(normalize_class_name("csharp", "kw"), "csharp-kw");
        assert_eq!(normalize_class_name("CSharp", "Type Name"), "csharp-typename");
        assert_eq!(normalize_class_name("cpp", "string - escape"), "cpp-string-escape");
        assert_eq!(normalize_class_name("cpp", "x1.y2"), "cpp-xy");
    }

    #[test]
    fn test_escape_html() {
        assert!(matches!(escape_html("plain"), Cow::Borrowed(_)));
        assert_eq!(escape_html("a < b && c > 'd' \"e\""), "a &lt; b &amp;&amp; c &gt; &#39;d&#39; &quot;e&quot;");
    }

    #[test]
    fn test_gutter() {
        let content = FileContent::with_gutter(2);
        assert!(content.as_str().starts_with("<div class='cz'>"));
        assert!(content.as_str().contains("<a id='line-1' href='#line-1'>1</a><br/><a id='line-2' href='#line-2'>2</a><br/>"));
        assert!(!content.as_str().contains("line-3"));
        assert!(content.as_str().ends_with("<pre id='code'>"));
    }

    #[test]
    fn test_spans_and_anchors() {
        let mut content = FileContent::with_gutter(0);
        content.push_span("csharp-kw", &[], "class");
        content.push_text(" ");
        content.push_span("csharp-i", &["d-1".to_string()], "Foo");
        content.push_span("csharp-i", &["r-2".to_string(), "i-1".to_string(), "i-2".to_string()], "Bar");
        content.push_text("<T>");

        let body = content.as_str();
        assert!(body.contains("<span class='csharp-kw'>class</span> <span class='csharp-i' id='d-1'>Foo</span>"));
        assert!(body.contains("<span class='csharp-i' id='r-2'><a id='i-1'></a><a id='i-2'></a>Bar</span>&lt;T&gt;"));
    }

    #[test]
    fn test_finish_closes_and_empties() {
        let mut content = FileContent::with_gutter(1);
        let finished = content.finish();
        assert!(finished.ends_with("<pre id='code'></pre></td></tr></table></div>"));
        assert!(content.as_str().is_empty());
    }
}
