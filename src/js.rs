// rewrite_core::js
//
// JavaScript Rewriter. Four variants selected by `JsRewriteMode`, all purely
// textual (regex-based, not AST-level) per §4.4:
//
//   link-only  rewrite absolute/protocol-relative string literals
//   location   shadow the bare `location` identifier only
//   all        both of the above
//   none       passthrough
//
// The JSON rewriter is a thin specialization built on top of this one (see
// `for_json`) that defaults to `link-only` but degrades to `none` under
// `location`/`none` so it never mangles JSON string values that happen to
// contain the word "location".

use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::JsRewriteMode;
use crate::url::UrlRewriter;

/// Matches a quoted string literal whose contents look like an absolute or
/// protocol-relative URL: `"https://..."`, `'http://...'`, `"//host/..."`.
static LINK_LITERAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(https?://[^"\\]*|//[^"\\]*)"|'(https?://[^'\\]*|//[^'\\]*)'"#).unwrap()
});

/// Matches `window.location` / `self.location` as a member access.
static WINDOW_LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(window|self)\.location\b").unwrap());

/// Matches any standalone `location` identifier (member-access exclusion is
/// applied afterwards by inspecting the preceding byte, since the `regex`
/// crate has no lookbehind).
static BARE_LOCATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\blocation\b").unwrap());

pub struct JsRewriter {
    url_rewriter: Rc<UrlRewriter>,
    mode: JsRewriteMode,
}

impl JsRewriter {
    pub fn new(url_rewriter: Rc<UrlRewriter>, mode: JsRewriteMode) -> Self {
        JsRewriter { url_rewriter, mode }
    }

    /// A JSON-specialized variant: `link-only` unless the ambient mode would
    /// have disabled location-shadowing, in which case it degrades to
    /// `none` so JSON string contents are never touched (§4.4).
    pub fn for_json(url_rewriter: Rc<UrlRewriter>, ambient_mode: JsRewriteMode) -> Self {
        let mode = match ambient_mode {
            JsRewriteMode::Location | JsRewriteMode::None => JsRewriteMode::None,
            JsRewriteMode::All | JsRewriteMode::LinkOnly => JsRewriteMode::LinkOnly,
        };
        JsRewriter { url_rewriter, mode }
    }

    pub fn rewrite(&self, js: &str) -> String {
        match self.mode {
            JsRewriteMode::None => js.to_string(),
            JsRewriteMode::LinkOnly => self.rewrite_links(js),
            JsRewriteMode::Location => self.rewrite_location(js),
            JsRewriteMode::All => self.rewrite_links(&self.rewrite_location(js)),
        }
    }

    fn rewrite_links(&self, js: &str) -> String {
        LINK_LITERAL_RE
            .replace_all(js, |caps: &regex::Captures| {
                let (quote, url) = match (caps.get(1), caps.get(2)) {
                    (Some(m), _) => ("\"", m.as_str()),
                    (_, Some(m)) => ("'", m.as_str()),
                    (None, None) => unreachable!(),
                };
                let rewritten = self.url_rewriter.rewrite(url, None);
                format!("{quote}{rewritten}{quote}")
            })
            .into_owned()
    }

    fn rewrite_location(&self, js: &str) -> String {
        let after_member = WINDOW_LOCATION_RE.replace_all(js, "$1.WB_wombat_location");

        let bytes = after_member.as_bytes();
        let mut out = String::with_capacity(after_member.len());
        let mut last = 0;
        for m in BARE_LOCATION_RE.find_iter(&after_member) {
            let start = m.start();
            out.push_str(&after_member[last..start]);
            let preceded_by_dot = start > 0 && bytes[start - 1] == b'.';
            if preceded_by_dot {
                out.push_str(m.as_str());
            } else {
                out.push_str("WB_wombat_location");
            }
            last = m.end();
        }
        out.push_str(&after_member[last..]);
        out
    }
}

/// Streaming entry point: like `CssRewriter`, buffers fed chunks and
/// rewrites the whole accumulated body on `close` since regex substitution
/// needs to see complete string literals / identifiers, which chunk
/// boundaries can otherwise split.
pub struct StreamingJsRewriter {
    inner: JsRewriter,
    buffer: String,
}

impl StreamingJsRewriter {
    pub fn new(url_rewriter: Rc<UrlRewriter>, mode: JsRewriteMode) -> Self {
        StreamingJsRewriter {
            inner: JsRewriter::new(url_rewriter, mode),
            buffer: String::new(),
        }
    }

    /// JSON-specialized variant; see `JsRewriter::for_json`.
    pub fn for_json(url_rewriter: Rc<UrlRewriter>, ambient_mode: JsRewriteMode) -> Self {
        StreamingJsRewriter {
            inner: JsRewriter::for_json(url_rewriter, ambient_mode),
            buffer: String::new(),
        }
    }

    pub fn feed(&mut self, chunk: &str) -> String {
        self.buffer.push_str(chunk);
        String::new()
    }

    pub fn close(self) -> String {
        self.inner.rewrite(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RewriteContext;

    fn rewriter(mode: JsRewriteMode) -> JsRewriter {
        let ctx = RewriteContext::new(
            "/web/",
            "20131226101010",
            "http://example.com/some/path/index.html",
        );
        JsRewriter::new(Rc::new(UrlRewriter::new(ctx)), mode)
    }

    #[test]
    fn link_only_rewrites_absolute_literal() {
        let rw = rewriter(JsRewriteMode::LinkOnly);
        let out = rw.rewrite(r#"fetch("http://example.com/a.json")"#);
        assert_eq!(
            out,
            r#"fetch("/web/20131226101010/http://example.com/a.json")"#
        );
    }

    #[test]
    fn link_only_leaves_location_alone() {
        let rw = rewriter(JsRewriteMode::LinkOnly);
        let out = rw.rewrite("window.location = x;");
        assert_eq!(out, "window.location = x;");
    }

    #[test]
    fn location_mode_shadows_window_location() {
        let rw = rewriter(JsRewriteMode::Location);
        let out = rw.rewrite(r#"window.location = "http://example.com/a.html""#);
        assert_eq!(
            out,
            r#"window.WB_wombat_location = "http://example.com/a.html""#
        );
    }

    #[test]
    fn all_mode_rewrites_both() {
        let rw = rewriter(JsRewriteMode::All);
        let out = rw.rewrite(r#"window.location = "http://example.com/a.html""#);
        assert_eq!(
            out,
            r#"window.WB_wombat_location = "/web/20131226101010/http://example.com/a.html""#
        );
    }

    #[test]
    fn bare_location_shadowed_but_not_member_access() {
        let rw = rewriter(JsRewriteMode::Location);
        let out = rw.rewrite("var x = location; var y = foo.location;");
        assert_eq!(out, "var x = WB_wombat_location; var y = foo.location;");
    }

    #[test]
    fn none_mode_is_passthrough() {
        let rw = rewriter(JsRewriteMode::None);
        let src = r#"window.location = "http://example.com/a.html""#;
        assert_eq!(rw.rewrite(src), src);
    }

    #[test]
    fn json_rewriter_degrades_under_location_mode() {
        let ctx = RewriteContext::new("/web/", "20131226101010", "http://example.com/x");
        let rw = JsRewriter::for_json(Rc::new(UrlRewriter::new(ctx)), JsRewriteMode::Location);
        let src = r#"{"location": "http://example.com/a"}"#;
        assert_eq!(rw.rewrite(src), src);
    }

    #[test]
    fn json_rewriter_defaults_to_link_only() {
        let ctx = RewriteContext::new("/web/", "20131226101010", "http://example.com/x");
        let rw = JsRewriter::for_json(Rc::new(UrlRewriter::new(ctx)), JsRewriteMode::All);
        let src = r#"{"url": "http://example.com/a"}"#;
        assert_eq!(
            rw.rewrite(src),
            r#"{"url": "/web/20131226101010/http://example.com/a"}"#
        );
    }
}
