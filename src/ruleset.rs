// rewrite_core::ruleset
//
// Rule Set, per §2 item 7 and §9's "Class-keyed policy map" note: a mapping
// `{header, css, xml, html, json, js} -> rewriter factory` plus custom regex
// rules, captured as a `RewriterFactory` value rather than looked up through
// a runtime class registry. `ContentKind` is the tagged-variant replacement
// for the source's per-class dispatch table; `build` hands back the
// concrete streaming rewriter for a response's MIME type.

use std::rc::Rc;

use bytes::Bytes;

use crate::context::RewriteContext;
use crate::css::CssRewriter;
use crate::header::HeaderRewriter;
use crate::html::HtmlRewriter;
use crate::js::StreamingJsRewriter;
use crate::regex_rewriter::{streaming_xml_rewriter, StreamingRegexRewriter};
use crate::url::UrlRewriter;

/// The subset of response content this rewriter family knows how to
/// transform, keyed the way `RewriterFactory::build` dispatches on MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    Js,
    Json,
    Xml,
    /// No body rewriter applies; only headers are touched.
    Opaque,
}

impl ContentKind {
    /// Maps a `Content-Type` value (ignoring parameters like `; charset=`)
    /// to the rewriter family that applies to it.
    pub fn from_content_type(content_type: &str) -> Self {
        let base = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match base.as_str() {
            "text/html" | "application/xhtml+xml" => ContentKind::Html,
            "text/css" => ContentKind::Css,
            "application/javascript" | "text/javascript" | "application/x-javascript" => {
                ContentKind::Js
            }
            "application/json" | "text/json" => ContentKind::Json,
            "application/xml" | "text/xml" | "application/rss+xml" | "application/vnd.apple.mpegurl" => {
                ContentKind::Xml
            }
            _ => ContentKind::Opaque,
        }
    }
}

/// Output of `RewriterFactory::build`: whichever concrete streaming rewriter
/// applies, already bound to the response's shared `UrlRewriter`.
pub enum ContentRewriter {
    Html(HtmlRewriter),
    Css(CssRewriter),
    Js(StreamingJsRewriter),
    Json(StreamingJsRewriter),
    Xml(StreamingRegexRewriter),
    Opaque,
}

impl ContentRewriter {
    /// Accepts a `bytes::Bytes` chunk, matching the shape a response body
    /// stream hands the replay server one frame at a time.
    pub fn feed(&mut self, chunk: Bytes) -> Vec<u8> {
        match self {
            ContentRewriter::Html(r) => r.feed(&chunk),
            ContentRewriter::Css(r) => r.feed(&String::from_utf8_lossy(&chunk)).into_bytes(),
            ContentRewriter::Js(r) => r.feed(&String::from_utf8_lossy(&chunk)).into_bytes(),
            ContentRewriter::Json(r) => r.feed(&String::from_utf8_lossy(&chunk)).into_bytes(),
            ContentRewriter::Xml(r) => r.feed(&String::from_utf8_lossy(&chunk)).into_bytes(),
            ContentRewriter::Opaque => chunk.to_vec(),
        }
    }

    /// Consumes the rewriter, returning the final trailing bytes.
    pub fn close(self) -> Vec<u8> {
        match self {
            ContentRewriter::Html(r) => r.close(),
            ContentRewriter::Css(r) => r.close().into_bytes(),
            ContentRewriter::Js(r) => r.close().into_bytes(),
            ContentRewriter::Json(r) => r.close().into_bytes(),
            ContentRewriter::Xml(r) => r.close().into_bytes(),
            ContentRewriter::Opaque => Vec::new(),
        }
    }
}

/// Carries the compiled policy (currently just the shared context; custom
/// regex rule lists would be threaded through here too) and builds the
/// per-response rewriters that share one `UrlRewriter` instance, per §2's
/// "all content rewriters share one URL Rewriter instance" requirement.
pub struct RewriterFactory {
    head_insert: Option<String>,
}

impl RewriterFactory {
    pub fn new() -> Self {
        RewriterFactory { head_insert: None }
    }

    pub fn with_head_insert(mut self, html: impl Into<String>) -> Self {
        self.head_insert = Some(html.into());
        self
    }

    /// Builds the shared `UrlRewriter` plus the `HeaderRewriter` for a
    /// response's rewrite context. The header rewriter is returned
    /// separately since it applies independent of body MIME type.
    pub fn build_headers(&self, context: RewriteContext) -> (Rc<UrlRewriter>, HeaderRewriter) {
        let url_rewriter = Rc::new(UrlRewriter::new(context));
        let header_rewriter = HeaderRewriter::new(url_rewriter.clone());
        (url_rewriter, header_rewriter)
    }

    /// Builds the body rewriter for `kind`, sharing `url_rewriter` so a
    /// `<base href>` observed mid-document affects every sub-rewriter.
    pub fn build(&self, kind: ContentKind, url_rewriter: Rc<UrlRewriter>) -> ContentRewriter {
        match kind {
            ContentKind::Html => {
                ContentRewriter::Html(HtmlRewriter::new(url_rewriter, self.head_insert.clone()))
            }
            ContentKind::Css => ContentRewriter::Css(CssRewriter::new(url_rewriter)),
            ContentKind::Js => {
                let mode = url_rewriter.context().flags.js_rewrite_location;
                ContentRewriter::Js(StreamingJsRewriter::new(url_rewriter, mode))
            }
            ContentKind::Json => {
                let ambient = url_rewriter.context().flags.js_rewrite_location;
                ContentRewriter::Json(StreamingJsRewriter::for_json(url_rewriter, ambient))
            }
            ContentKind::Xml => ContentRewriter::Xml(streaming_xml_rewriter(url_rewriter)),
            ContentKind::Opaque => ContentRewriter::Opaque,
        }
    }
}

impl Default for RewriterFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RewriteContext;

    #[test]
    fn content_kind_dispatches_by_mime() {
        assert_eq!(
            ContentKind::from_content_type("text/html; charset=utf-8"),
            ContentKind::Html
        );
        assert_eq!(ContentKind::from_content_type("text/css"), ContentKind::Css);
        assert_eq!(
            ContentKind::from_content_type("application/javascript"),
            ContentKind::Js
        );
        assert_eq!(
            ContentKind::from_content_type("application/json"),
            ContentKind::Json
        );
        assert_eq!(ContentKind::from_content_type("text/xml"), ContentKind::Xml);
        assert_eq!(
            ContentKind::from_content_type("image/png"),
            ContentKind::Opaque
        );
    }

    #[test]
    fn build_html_rewrites_body() {
        let factory = RewriterFactory::new();
        let ctx = RewriteContext::new("/web/", "20131226101010", "http://example.com/a.html");
        let (url_rewriter, _headers) = factory.build_headers(ctx);
        let mut rewriter = factory.build(ContentKind::Html, url_rewriter);
        let mut out = rewriter.feed(Bytes::from_static(b"<a href=\"b.html\">x</a>"));
        out.extend(rewriter.close());
        let s = String::from_utf8(out).unwrap();
        assert!(s.contains("/web/20131226101010/http://example.com/b.html"));
    }
}
