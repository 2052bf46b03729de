// rewrite_core::regex_rewriter
//
// Regex Rewriter (base), per §4.2: an ordered list of `(pattern, replace_fn)`
// rules applied left-to-right against a whole buffered body. Every other
// textual rewriter in this crate (CSS, JS) is purpose-built around its own
// tokenizer instead, but MIME types with no dedicated rewriter — notably
// `application/xml`/`text/xml`, which the original pywb project rewrites
// with its `XMLRewriter` — fall back to this one with a small rule set that
// targets `url="..."` and `href="..."` style attributes inside XML/manifest
// bodies (§11).

use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::url::UrlRewriter;

/// `replace_fn(full_match, captured_url, url_rewriter) -> replacement`.
pub type ReplaceFn = fn(&str, &str, &UrlRewriter) -> String;

pub struct Rule {
    pattern: Regex,
    replace: ReplaceFn,
}

impl Rule {
    pub fn new(pattern: Regex, replace: ReplaceFn) -> Self {
        Rule { pattern, replace }
    }
}

/// Applies an ordered list of rules against a buffered body, left-to-right.
pub struct RegexRewriter {
    url_rewriter: Rc<UrlRewriter>,
    rules: Vec<Rule>,
}

impl RegexRewriter {
    pub fn new(url_rewriter: Rc<UrlRewriter>, rules: Vec<Rule>) -> Self {
        RegexRewriter { url_rewriter, rules }
    }

    pub fn rewrite(&self, body: &str) -> String {
        let mut out = body.to_string();
        for rule in &self.rules {
            let url_rewriter = &self.url_rewriter;
            let replace = rule.replace;
            out = rule
                .pattern
                .replace_all(&out, |caps: &Captures| {
                    let whole = caps.get(0).map(|m| m.as_str()).unwrap_or("");
                    let url = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                    replace(whole, url, url_rewriter)
                })
                .into_owned();
        }
        out
    }
}

/// Streaming entry point, same buffer-until-close contract as the CSS/JS
/// rewriters: regex substitution needs the whole body to avoid splitting a
/// match across a chunk boundary.
pub struct StreamingRegexRewriter {
    inner: RegexRewriter,
    buffer: String,
}

impl StreamingRegexRewriter {
    pub fn new(url_rewriter: Rc<UrlRewriter>, rules: Vec<Rule>) -> Self {
        StreamingRegexRewriter {
            inner: RegexRewriter::new(url_rewriter, rules),
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

// ---------------------------------------------------------------------------
// XML Rewriter: a Regex Rewriter specialization for application/xml,
// text/xml, and manifest-style bodies (HLS playlists, SMIL, RSS) that carry
// bare `url="..."` / `href="..."` attributes outside of HTML's tag grammar.
// ---------------------------------------------------------------------------

static XML_URL_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\b(?:href|src|url)\s*=\s*"([^"]*)""#).unwrap());

fn xml_attr_replace(whole: &str, url: &str, url_rewriter: &UrlRewriter) -> String {
    let rewritten = url_rewriter.rewrite(url, None);
    whole.replacen(url, &rewritten, 1)
}

/// Builds the default XML rule set: rewrite every `href=`/`src=`/`url=`
/// double-quoted attribute value found anywhere in the document.
pub fn xml_rewriter(url_rewriter: Rc<UrlRewriter>) -> RegexRewriter {
    RegexRewriter::new(
        url_rewriter,
        vec![Rule::new(XML_URL_ATTR_RE.clone(), xml_attr_replace)],
    )
}

pub fn streaming_xml_rewriter(url_rewriter: Rc<UrlRewriter>) -> StreamingRegexRewriter {
    StreamingRegexRewriter::new(
        url_rewriter,
        vec![Rule::new(XML_URL_ATTR_RE.clone(), xml_attr_replace)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RewriteContext;

    fn rw() -> Rc<UrlRewriter> {
        let ctx = RewriteContext::new("/web/", "20131226101010", "http://example.com/feed.xml");
        Rc::new(UrlRewriter::new(ctx))
    }

    #[test]
    fn rewrites_href_attribute_in_xml_body() {
        let rewriter = xml_rewriter(rw());
        let out = rewriter.rewrite(r#"<link href="http://example.com/a.html"/>"#);
        assert_eq!(
            out,
            r#"<link href="/web/20131226101010/http://example.com/a.html"/>"#
        );
    }

    #[test]
    fn rewrites_url_attribute_in_manifest_body() {
        let rewriter = xml_rewriter(rw());
        let out = rewriter.rewrite(r#"<Default url="segment1.ts" />"#);
        assert_eq!(
            out,
            r#"<Default url="/web/20131226101010/http://example.com/segment1.ts" />"#
        );
    }

    #[test]
    fn streaming_close_rewrites_full_buffer() {
        let mut rewriter = streaming_xml_rewriter(rw());
        assert_eq!(rewriter.feed(r#"<item src="#), "");
        let out = rewriter.feed(r#"a.mp4">"#);
        assert_eq!(out, "");
        let out = rewriter.close();
        assert_eq!(out, r#"<item src="/web/20131226101010/http://example.com/a.mp4">"#);
    }
}
