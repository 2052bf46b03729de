// rewrite_core::context
//
// The immutable per-response bundle every rewriter is built from: where in
// the archive we are serving from, when the capture was made, what the
// original resource's URL was, and which policy toggles apply.

use std::fmt;

/// Selects which JS-rewriting behaviors are active for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsRewriteMode {
    /// Rewrite absolute link literals and shadow `location`.
    All,
    /// Shadow `location` only; leave link literals alone.
    Location,
    /// No JS rewriting at all.
    None,
    /// Rewrite absolute link literals only; leave `location` alone.
    LinkOnly,
}

impl Default for JsRewriteMode {
    fn default() -> Self {
        JsRewriteMode::All
    }
}

/// Scope used when rewriting `Set-Cookie` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieScope {
    Default,
    Host,
    Exact,
    Coll,
    Root,
}

impl Default for CookieScope {
    fn default() -> Self {
        CookieScope::Default
    }
}

/// Policy toggles that vary the rewriters' behavior independent of the
/// rewrite context's URLs. All fields default to the behavior pywb-style
/// replay systems ship with out of the box.
#[derive(Debug, Clone, Copy)]
pub struct Flags {
    pub rewrite_rel_canon: bool,
    pub rewrite_base: bool,
    pub punycode_links: bool,
    pub js_rewrite_location: JsRewriteMode,
    pub parse_comments: bool,
    pub cookie_scope: CookieScope,
}

impl Default for Flags {
    fn default() -> Self {
        Flags {
            rewrite_rel_canon: true,
            rewrite_base: true,
            punycode_links: false,
            js_rewrite_location: JsRewriteMode::All,
            parse_comments: false,
            cookie_scope: CookieScope::Default,
        }
    }
}

/// Short suffix inserted between the timestamp and the original URL that
/// selects how the replay server serves an embedded reference.
pub mod modifiers {
    pub const IDENTITY: &str = "";
    pub const IMAGE: &str = "im_";
    pub const JS: &str = "js_";
    pub const CSS: &str = "cs_";
    pub const IFRAME: &str = "if_";
    pub const OPAQUE: &str = "oe_";
}

/// Immutable record attached to a single response rewrite.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    pub archive_prefix: String,
    pub timestamp: String,
    pub original_url: String,
    pub default_mod: String,
    pub flags: Flags,
}

impl RewriteContext {
    pub fn new(
        archive_prefix: impl Into<String>,
        timestamp: impl Into<String>,
        original_url: impl Into<String>,
    ) -> Self {
        RewriteContext {
            archive_prefix: archive_prefix.into(),
            timestamp: timestamp.into(),
            original_url: original_url.into(),
            default_mod: String::new(),
            flags: Flags::default(),
        }
    }

    pub fn with_mod(mut self, m: impl Into<String>) -> Self {
        self.default_mod = m.into();
        self
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }
}

impl fmt::Display for RewriteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RewriteContext({}{}{} <- {})",
            self.archive_prefix, self.timestamp, self.default_mod, self.original_url
        )
    }
}
