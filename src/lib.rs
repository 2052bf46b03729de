// rewrite_core
//
// Content rewriting core for a web archive replay proxy: given a capture's
// rewrite context (archive prefix, timestamp, original URL, policy flags)
// and a response's headers/body, rewrites every embedded reference into an
// archive-relative URL so replayed pages fetch their own resources back
// through the same proxy instead of the live web.
//
// Data flow for one response: bytes -> Header Rewriter (rewrites headers,
// chooses a body rewriter by MIME type) -> HTML/CSS/JS/XML Rewriter
// (streaming) -> bytes out. Every sub-rewriter shares one `UrlRewriter`
// instance bound to the response's `RewriteContext`, so a `<base href>`
// observed mid-document affects URL resolution everywhere else in that
// document.
//
// None of the rewriters here raise: malformed input degrades to passthrough
// (see each module's doc comment for specifics), matching the archive
// replay use case where refusing to serve a byte is worse than serving it
// unrewritten.

pub mod context;
pub mod css;
pub mod header;
pub mod html;
pub mod js;
pub mod regex_rewriter;
pub mod ruleset;
pub mod url;

pub use context::{CookieScope, Flags, JsRewriteMode, RewriteContext};
pub use css::CssRewriter;
pub use header::HeaderRewriter;
pub use html::HtmlRewriter;
pub use js::{JsRewriter, StreamingJsRewriter};
pub use ruleset::{ContentKind, ContentRewriter, RewriterFactory};
pub use url::UrlRewriter;
