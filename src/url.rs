// rewrite_core::url
//
// The URL Rewriter: a pure function (modulo the document-scoped `<base>`
// pointer) mapping an input URL and a modifier into an archive-prefixed
// URL. Every other rewriter in the crate calls through this one so that the
// archive URL shape stays in exactly one place.
//
// Archive URL shape:  {prefix}{timestamp}{mod}/{resolved_url}

use std::cell::RefCell;

use url::Url;

use crate::context::RewriteContext;

/// Schemes that are never proxied: the browser handles them locally, or
/// (for `file:`) they must never be allowed to leak the archive host's
/// filesystem.
const PASSTHROUGH_SCHEMES: &[&str] = &["javascript", "data", "mailto", "blob", "about", "file"];

pub struct UrlRewriter {
    context: RewriteContext,
    /// The in-document base URL, initially `context.original_url`.
    /// Updated when the HTML rewriter observes a `<base href>`.
    base: RefCell<String>,
}

impl UrlRewriter {
    pub fn new(context: RewriteContext) -> Self {
        let base = RefCell::new(context.original_url.clone());
        UrlRewriter { context, base }
    }

    pub fn context(&self) -> &RewriteContext {
        &self.context
    }

    /// The in-document base currently in effect.
    pub fn base(&self) -> String {
        self.base.borrow().clone()
    }

    /// Update the in-document base, e.g. on observing `<base href>`.
    /// Per spec this happens regardless of whether `rewrite_base` is set,
    /// and regardless of whether the new base itself is a URL we were able
    /// to rewrite.
    pub fn set_base(&self, new_base: impl Into<String>) {
        *self.base.borrow_mut() = new_base.into();
    }

    /// `rewrite(url_in, mod=None) -> url_out`, per §4.1.
    pub fn rewrite(&self, url_in: &str, mod_override: Option<&str>) -> String {
        let trimmed = url_in.trim_matches(|c: char| c.is_ascii_whitespace());

        if trimmed.is_empty() {
            return String::new();
        }
        if trimmed.starts_with('#') {
            return trimmed.to_string();
        }
        if let Some(scheme) = leading_scheme(trimmed) {
            if PASSTHROUGH_SCHEMES
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&scheme))
            {
                log::debug!("url: passthrough scheme {scheme:?} for {trimmed:?}");
                return trimmed.to_string();
            }
        }

        let decoded = decode_entities(trimmed);
        let resolved = self.resolve(&decoded);
        let resolved = self.apply_punycode(&resolved);

        let m = mod_override.unwrap_or(&self.context.default_mod);
        format!(
            "{}{}{}/{}",
            self.context.archive_prefix, self.context.timestamp, m, resolved
        )
    }

    /// Resolve `url_in` against the current in-document base. Falls back to
    /// the literal string (minus whitespace) if the base itself cannot be
    /// parsed or the join fails, which keeps malformed content flowing
    /// through rather than raising (§7).
    ///
    /// Exposed crate-wide so the HTML rewriter's `<base href>` handling can
    /// absolutize a new base against the *old* one before swapping it in.
    pub(crate) fn resolve(&self, url_in: &str) -> String {
        let base_str = self.base.borrow().clone();
        match Url::parse(&base_str) {
            Ok(base_url) => match base_url.join(url_in) {
                Ok(resolved) => resolved.to_string(),
                Err(e) => {
                    log::debug!("url: failed to resolve {url_in:?} against base {base_str:?}: {e}");
                    url_in.to_string()
                }
            },
            Err(e) => {
                log::debug!("url: base {base_str:?} does not parse: {e}");
                url_in.to_string()
            }
        }
    }

    fn apply_punycode(&self, resolved: &str) -> String {
        if !self.context.flags.punycode_links {
            return resolved.to_string();
        }
        match Url::parse(resolved) {
            Ok(mut u) => {
                if let Some(host) = u.host_str() {
                    if let Ok(ascii_host) = idna::domain_to_ascii(host) {
                        if ascii_host != host {
                            let _ = u.set_host(Some(&ascii_host));
                            return u.to_string();
                        }
                    }
                }
                resolved.to_string()
            }
            Err(_) => resolved.to_string(),
        }
    }
}

/// Returns the lowercase scheme if `s` looks like `scheme:...` with a valid
/// scheme token (letters, digits, `+`, `-`, `.`, starting with a letter).
/// Deliberately looser than `url::Url`'s parser since we need to recognize
/// `javascript:`/`data:`/etc. even when the remainder isn't a valid URL.
fn leading_scheme(s: &str) -> Option<String> {
    let colon = s.find(':')?;
    let candidate = &s[..colon];
    if candidate.is_empty() {
        return None;
    }
    let mut chars = candidate.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    Some(candidate.to_ascii_lowercase())
}

/// HTML-entity-decode a URL string (numeric and named entities), per the
/// `href` unescape requirement in §4.1 step 4. Decode failures leave the
/// original character sequence untouched rather than raising (§7).
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    html_escape::decode_html_entities(s).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{modifiers, RewriteContext};

    fn ctx() -> RewriteContext {
        RewriteContext::new(
            "/web/",
            "20131226101010",
            "http://example.com/some/path/index.html",
        )
    }

    #[test]
    fn rewrites_relative_url() {
        let rw = UrlRewriter::new(ctx());
        let out = rw.rewrite("page.html", None);
        assert_eq!(
            out,
            "/web/20131226101010/http://example.com/some/path/page.html"
        );
    }

    #[test]
    fn rewrites_absolute_path() {
        let rw = UrlRewriter::new(ctx());
        let out = rw.rewrite("/img.gif", Some(modifiers::IMAGE));
        assert_eq!(out, "/web/20131226101010im_/http://example.com/img.gif");
    }

    #[test]
    fn empty_and_whitespace_only_become_empty() {
        let rw = UrlRewriter::new(ctx());
        assert_eq!(rw.rewrite("", None), "");
        assert_eq!(rw.rewrite("   ", None), "");
    }

    #[test]
    fn fragment_only_passes_through() {
        let rw = UrlRewriter::new(ctx());
        assert_eq!(rw.rewrite("#section", None), "#section");
    }

    #[test]
    fn passthrough_schemes_untouched() {
        let rw = UrlRewriter::new(ctx());
        for input in [
            "javascript:void(0)",
            "data:text/plain,hi",
            "mailto:a@b.com",
            "blob:https://example.com/abc",
            "about:blank",
            "file:///etc/passwd",
        ] {
            assert_eq!(rw.rewrite(input, None), input);
        }
    }

    #[test]
    fn decodes_entities_before_rewriting() {
        let rw = UrlRewriter::new(ctx());
        let out = rw.rewrite("http&#x3a;&#x2f;&#x2f;www.example.com/", None);
        assert_eq!(out, "/web/20131226101010/http://www.example.com/");
    }

    #[test]
    fn base_updates_resolution() {
        let rw = UrlRewriter::new(ctx());
        rw.set_base("http://example.com/some/path/static/");
        let out = rw.rewrite("image.gif", Some(modifiers::IMAGE));
        assert_eq!(
            out,
            "/web/20131226101010im_/http://example.com/some/path/static/image.gif"
        );
    }

    #[test]
    fn scheme_relative_resolves_against_base_scheme() {
        let rw = UrlRewriter::new(ctx());
        let out = rw.rewrite("//cdn.example.com/lib.js", Some(modifiers::JS));
        assert_eq!(out, "/web/20131226101010js_/http://cdn.example.com/lib.js");
    }

    proptest::proptest! {
        /// §8 scheme-passthrough property: any `scheme:rest` string whose
        /// scheme is one of the passthrough schemes comes back unchanged,
        /// regardless of what garbage follows the colon.
        #[test]
        fn prop_passthrough_scheme_never_rewritten(rest in "[a-zA-Z0-9/:._#?=&%-]{0,64}") {
            let rw = UrlRewriter::new(ctx());
            for scheme in ["javascript", "data", "mailto", "blob", "about", "file"] {
                let input = format!("{scheme}:{rest}");
                let out = rw.rewrite(&input, None);
                proptest::prop_assert_eq!(out, input);
            }
        }

        /// Any non-empty, non-fragment, non-passthrough-scheme input produces
        /// an archive-prefixed URL carrying the configured timestamp.
        #[test]
        fn prop_rewritten_urls_carry_the_timestamp(path in "[a-zA-Z0-9/._-]{1,32}") {
            let rw = UrlRewriter::new(ctx());
            let out = rw.rewrite(&path, None);
            proptest::prop_assert!(out.starts_with("/web/20131226101010/"));
        }
    }
}
