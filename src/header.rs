// rewrite_core::header
//
// Header Rewriter, per §4.5. Given the response's header list, produces the
// headers to emit to the client: `Location`/`Content-Location` routed
// through the URL Rewriter, `Set-Cookie` scoped to the archive, hop-by-hop
// transport headers dropped, CSP/HSTS/HPKP dropped from their live name (the
// replay server is not the origin these policies were written for), and
// everything else passed through with an `X-Archive-Orig-` audit copy
// alongside it. Header names are matched case-insensitively, as HTTP
// requires.

use std::rc::Rc;

use crate::context::CookieScope;
use crate::url::UrlRewriter;

const DROPPED_TRANSPORT_HEADERS: &[&str] =
    &["content-encoding", "transfer-encoding", "content-length"];

const DROPPED_POLICY_HEADERS: &[&str] = &[
    "content-security-policy",
    "strict-transport-security",
    "public-key-pins",
];

pub struct HeaderRewriter {
    url_rewriter: Rc<UrlRewriter>,
}

impl HeaderRewriter {
    pub fn new(url_rewriter: Rc<UrlRewriter>) -> Self {
        HeaderRewriter { url_rewriter }
    }

    /// Rewrites an ordered list of `(name, value)` header pairs, returning
    /// the headers to emit (in emission order; relative order of the input
    /// is otherwise preserved).
    pub fn rewrite(&self, headers: &[(String, String)]) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(headers.len());
        for (name, value) in headers {
            let lower = name.to_ascii_lowercase();
            match lower.as_str() {
                "location" | "content-location" => {
                    let rewritten = self.url_rewriter.rewrite(value, None);
                    out.push((name.clone(), rewritten));
                    out.push((archive_orig_name(name), value.clone()));
                }
                "set-cookie" => {
                    let scope = self.url_rewriter.context().flags.cookie_scope;
                    let rewritten = rewrite_set_cookie(value, &self.url_rewriter, scope);
                    out.push(("Set-Cookie".to_string(), rewritten));
                    out.push((archive_orig_name(name), value.clone()));
                }
                _ if DROPPED_TRANSPORT_HEADERS.contains(&lower.as_str()) => {
                    log::debug!("header: dropping transport header {name}");
                }
                _ if DROPPED_POLICY_HEADERS.contains(&lower.as_str()) => {
                    out.push((archive_orig_name(name), value.clone()));
                }
                _ => {
                    out.push((name.clone(), value.clone()));
                    out.push((archive_orig_name(name), value.clone()));
                }
            }
        }
        out
    }
}

fn archive_orig_name(name: &str) -> String {
    format!("X-Archive-Orig-{name}")
}

/// Rewrites a single `Set-Cookie` value: `Domain=` is always stripped (the
/// archive host is never the original cookie's domain), `Path=` is remapped
/// under the archive prefix per `scope`, and — when `scope` asks for
/// anything narrower than the full original domain scope — `Secure` and
/// `HttpOnly` are dropped too, since the replay origin and protocol rarely
/// match what the cookie was set for. Unparseable segments are passed
/// through unchanged rather than dropped, per §7's never-raise contract.
fn rewrite_set_cookie(value: &str, url_rewriter: &UrlRewriter, scope: CookieScope) -> String {
    let strip_flags = scope != CookieScope::Default;
    let new_path = scoped_cookie_path(url_rewriter, scope);

    let mut parts = Vec::new();
    for (i, segment) in value.split(';').enumerate() {
        let trimmed = segment.trim();
        if i == 0 {
            parts.push(trimmed.to_string());
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("domain=") {
            continue;
        }
        if lower.starts_with("path=") {
            parts.push(format!("Path={new_path}"));
            continue;
        }
        if strip_flags && (lower == "secure" || lower == "httponly") {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    parts.join("; ")
}

fn scoped_cookie_path(url_rewriter: &UrlRewriter, scope: CookieScope) -> String {
    let ctx = url_rewriter.context();
    match scope {
        CookieScope::Root => "/".to_string(),
        CookieScope::Coll => ctx.archive_prefix.clone(),
        CookieScope::Default | CookieScope::Host => {
            format!("{}{}/", ctx.archive_prefix, ctx.timestamp)
        }
        CookieScope::Exact => {
            let dir = url::Url::parse(&ctx.original_url)
                .ok()
                .map(|u| {
                    let path = u.path();
                    match path.rfind('/') {
                        Some(idx) => path[..=idx].to_string(),
                        None => "/".to_string(),
                    }
                })
                .unwrap_or_else(|| "/".to_string());
            format!(
                "{}{}/{}{}",
                ctx.archive_prefix,
                ctx.timestamp,
                u_scheme_and_authority(&ctx.original_url),
                dir
            )
        }
    }
}

fn u_scheme_and_authority(original_url: &str) -> String {
    match url::Url::parse(original_url) {
        Ok(u) => format!("{}://{}", u.scheme(), u.authority()),
        Err(_) => String::new(),
    }
}
