// rewrite_core::html
//
// HTML Rewriter. Per §4.6 this is deliberately NOT a conformant HTML5 parser
// and does NOT build a DOM: it is a forgiving streaming tokenizer that
// recognizes tags, attributes, comments, doctypes, CDATA sections and raw-text
// elements (`script`/`style`/`title`/`textarea`) well enough to find the
// handful of URL-bearing and script-bearing attributes worth rewriting, then
// re-emits everything else byte-for-byte.
//
// `feed()`/`close()` mirror the CSS/JS rewriters' streaming contract, except
// the HTML rewriter genuinely needs to hold state across calls (the current
// raw-text element, the in-document `<base>`, whether the head-insertion has
// fired yet), since a single element can itself span many chunks.

use std::rc::Rc;

use crate::context::{modifiers, Flags};
use crate::css::rewrite_css_string;
use crate::js::JsRewriter;
use crate::url::UrlRewriter;

/// Hard cap on how much of a single raw-text element (`<script>`/`<style>`)
/// we hold in memory before giving up on rewriting it and flushing it
/// unrewritten. Keeps memory bounded to O(largest buffered element) per §5/§9
/// even against a pathologically large inline script.
const MAX_RAW_TEXT_BUFFER: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
struct RawAttr {
    name: String,
    value: Option<String>,
    quote: Option<char>,
}

#[derive(Debug)]
enum Event {
    Text(String),
    Comment(String),
    Doctype(String),
    Cdata(String),
    ProcessingInstruction(String),
    StartTag {
        name: String,
        attrs: Vec<RawAttr>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RawKind {
    Script,
    Style,
    /// `<title>`/`<textarea>`: tokenized as raw text so embedded `<` never
    /// gets misread as a tag, but never rewritten.
    Passthrough,
}

struct RawState {
    kind: RawKind,
    tag: String,
    buffer: String,
    /// Set once the buffer has hit the safety cap and been flushed
    /// unrewritten; any further text is appended verbatim too.
    overflowed: bool,
}

/// Streaming, non-DOM HTML rewriter.
pub struct HtmlRewriter {
    url_rewriter: Rc<UrlRewriter>,
    head_insert: Option<String>,
    text_pending: String,
    byte_tail: Vec<u8>,
    raw_state: Option<RawState>,
    seen_head_open: bool,
    head_insert_done: bool,
}

impl HtmlRewriter {
    pub fn new(url_rewriter: Rc<UrlRewriter>, head_insert: Option<String>) -> Self {
        HtmlRewriter {
            url_rewriter,
            head_insert,
            text_pending: String::new(),
            byte_tail: Vec::new(),
            raw_state: None,
            seen_head_open: false,
            head_insert_done: false,
        }
    }

    fn flags(&self) -> Flags {
        self.url_rewriter.context().flags
    }

    /// Feed a chunk of the response body. Returns whatever output could be
    /// produced from complete tokens; incomplete trailing content (a tag
    /// split across chunk boundaries, a truncated multi-byte UTF-8 sequence,
    /// an in-progress `<script>` body) is buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut combined = std::mem::take(&mut self.byte_tail);
        combined.extend_from_slice(chunk);
        let (valid, tail) = split_valid_utf8(&combined);
        self.text_pending.push_str(valid);
        self.byte_tail = tail.to_vec();

        let mut out = String::new();
        self.drain_events(&mut out, false);
        out.into_bytes()
    }

    /// Flush any remaining buffered content, auto-closing unterminated tags
    /// and raw-text elements, and consuming `self`.
    pub fn close(mut self) -> Vec<u8> {
        if !self.byte_tail.is_empty() {
            let lossy = String::from_utf8_lossy(&self.byte_tail).into_owned();
            self.text_pending.push_str(&lossy);
            self.byte_tail.clear();
        }

        let mut out = String::new();
        self.drain_events(&mut out, true);

        if let Some(state) = self.raw_state.take() {
            flush_raw_state(&self.url_rewriter, state, &mut out);
        }

        if let Some(insert) = self.head_insert.clone() {
            if !self.head_insert_done {
                out.push_str(&insert);
                self.head_insert_done = true;
            }
        }

        out.into_bytes()
    }

    fn drain_events(&mut self, out: &mut String, eof: bool) {
        loop {
            if self.text_pending.is_empty() {
                break;
            }
            let raw_tag = self.raw_state.as_ref().map(|s| s.tag.clone());
            match next_event(&self.text_pending, raw_tag.as_deref(), eof) {
                None => break,
                Some((event, consumed)) => {
                    self.process_event(event, out);
                    if consumed == 0 {
                        break;
                    }
                    self.text_pending.drain(..consumed);
                }
            }
        }
    }

    fn process_event(&mut self, event: Event, out: &mut String) {
        match event {
            Event::Text(t) => {
                if let Some(state) = &mut self.raw_state {
                    state.buffer.push_str(&t);
                    if !state.overflowed && state.buffer.len() > MAX_RAW_TEXT_BUFFER {
                        log::warn!(
                            "html: {} element exceeded {} bytes, flushing unrewritten",
                            state.tag,
                            MAX_RAW_TEXT_BUFFER
                        );
                        out.push_str(&state.buffer);
                        state.buffer.clear();
                        state.overflowed = true;
                    }
                } else {
                    self.maybe_insert_head(out, !t.trim().is_empty());
                    out.push_str(&t);
                }
            }
            Event::Comment(c) => {
                out.push_str("<!--");
                if self.flags().parse_comments {
                    out.push_str(&rewrite_fragment(&self.url_rewriter, &c));
                } else {
                    out.push_str(&c);
                }
                out.push_str("-->");
            }
            Event::Doctype(d) => {
                out.push_str("<!");
                out.push_str(&d);
                out.push('>');
            }
            Event::Cdata(c) => {
                out.push_str("<![CDATA[");
                out.push_str(&c);
                out.push_str("]]>");
            }
            Event::ProcessingInstruction(p) => {
                out.push_str("<?");
                out.push_str(&p);
                out.push('>');
            }
            Event::StartTag {
                name,
                attrs,
                self_closing,
            } => {
                let tag_lower = name.to_ascii_lowercase();
                self.maybe_insert_head(out, !matches!(tag_lower.as_str(), "html" | "head"));
                let rendered = self.rewrite_start_tag(&tag_lower, attrs, self_closing);
                out.push_str(&rendered);

                if tag_lower == "head" {
                    self.seen_head_open = true;
                    if let Some(insert) = self.head_insert.clone() {
                        if !self.head_insert_done {
                            out.push_str(&insert);
                            self.head_insert_done = true;
                        }
                    }
                }

                if !self_closing {
                    match tag_lower.as_str() {
                        "script" => self.enter_raw(RawKind::Script, tag_lower),
                        "style" => self.enter_raw(RawKind::Style, tag_lower),
                        "title" | "textarea" => self.enter_raw(RawKind::Passthrough, tag_lower),
                        _ => {}
                    }
                }
            }
            Event::EndTag { name } => {
                let tag_lower = name.to_ascii_lowercase();
                if let Some(state) = &self.raw_state {
                    if state.tag == tag_lower {
                        let state = self.raw_state.take().unwrap();
                        flush_raw_state(&self.url_rewriter, state, out);
                        out.push_str(&format!("</{tag_lower}>"));
                        return;
                    }
                }
                out.push_str(&format!("</{tag_lower}>"));
            }
        }
    }

    fn enter_raw(&mut self, kind: RawKind, tag: String) {
        self.raw_state = Some(RawState {
            kind,
            tag,
            buffer: String::new(),
            overflowed: false,
        });
    }

    /// Fires the configured head-insert exactly once: right after `<head>`'s
    /// open tag, or (if no `<head>` has appeared yet) right before the first
    /// content-bearing tag or non-whitespace text.
    fn maybe_insert_head(&mut self, out: &mut String, is_content_bearing: bool) {
        if is_content_bearing
            && self.head_insert.is_some()
            && !self.head_insert_done
            && !self.seen_head_open
        {
            out.push_str(self.head_insert.as_ref().unwrap());
            self.head_insert_done = true;
        }
    }

    fn rewrite_start_tag(
        &mut self,
        tag: &str,
        mut attrs: Vec<RawAttr>,
        self_closing: bool,
    ) -> String {
        match tag {
            "base" => self.handle_base(&mut attrs),
            "meta" => handle_meta_refresh(&self.url_rewriter, &mut attrs),
            "link" => self.handle_link(&mut attrs),
            "script" => handle_script_attrs(&mut attrs),
            _ => {}
        }

        let is_image = attrs_type_is_image(&attrs);
        for attr in attrs.iter_mut() {
            if let Some(m) = generic_url_mod(tag, &attr.name, &is_image) {
                if let Some(v) = &attr.value {
                    attr.value = Some(self.url_rewriter.rewrite(v, Some(m)));
                }
            }
        }

        if matches!(tag, "img" | "source") {
            rewrite_srcset_attr(&self.url_rewriter, &mut attrs);
        }

        rewrite_style_attr(&self.url_rewriter, &mut attrs);
        rewrite_event_handler_attrs(&self.url_rewriter, self.flags().js_rewrite_location, &mut attrs);
        rewrite_data_attrs(&self.url_rewriter, &mut attrs);
        if tag == "param" {
            rewrite_param_value(&self.url_rewriter, &mut attrs);
        }

        serialize_tag(tag, &attrs, self_closing)
    }

    fn handle_base(&self, attrs: &mut Vec<RawAttr>) {
        let href_val = match get_attr(attrs, "href") {
            Some(v) => v.clone(),
            None => return,
        };
        let resolved = self.url_rewriter.resolve(&href_val);

        if self.flags().rewrite_base {
            let archived = self.url_rewriter.rewrite(&resolved, Some(modifiers::IDENTITY));
            set_attr(attrs, "href", archived);
        } else {
            set_attr(attrs, "href", resolved.clone());
        }

        self.url_rewriter.set_base(resolved);
    }

    fn handle_link(&self, attrs: &mut Vec<RawAttr>) {
        let rel = get_attr(attrs, "rel")
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_default();
        let rel_tokens: Vec<&str> = rel.split_ascii_whitespace().collect();
        let is_canonical = rel_tokens.iter().any(|t| *t == "canonical");
        let is_stylesheet = rel_tokens.iter().any(|t| *t == "stylesheet");

        let href_val = match get_attr(attrs, "href") {
            Some(v) => v.clone(),
            None => return,
        };

        if is_canonical {
            if self.flags().rewrite_rel_canon {
                let rewritten = self.url_rewriter.rewrite(&href_val, Some(modifiers::IDENTITY));
                set_attr(attrs, "href", rewritten);
            } else {
                let resolved = self.url_rewriter.resolve(&href_val);
                set_attr(attrs, "href", resolved);
            }
        } else if is_stylesheet {
            let rewritten = self.url_rewriter.rewrite(&href_val, Some(modifiers::CSS));
            set_attr(attrs, "href", rewritten);
        } else {
            let rewritten = self.url_rewriter.rewrite(&href_val, Some(modifiers::OPAQUE));
            set_attr(attrs, "href", rewritten);
        }
    }
}

fn attrs_type_is_image(attrs: &[RawAttr]) -> bool {
    get_attr(attrs, "type")
        .map(|v| v.eq_ignore_ascii_case("image"))
        .unwrap_or(false)
}

/// Table-driven URL attribute -> modifier lookup for the tags not handled by
/// their own special case above. `link` and `base` are excluded here since
/// they need extra context (rel tokens, base updates) beyond a plain lookup.
fn generic_url_mod(tag: &str, attr: &str, input_type_is_image: &bool) -> Option<&'static str> {
    let attr = attr.to_ascii_lowercase();
    match (tag, attr.as_str()) {
        ("a", "href") | ("area", "href") => Some(modifiers::IDENTITY),
        ("img", "src") => Some(modifiers::IMAGE),
        ("input", "src") if *input_type_is_image => Some(modifiers::IMAGE),
        ("script", "src") => Some(modifiers::JS),
        ("iframe", "src") | ("frame", "src") => Some(modifiers::IFRAME),
        ("form", "action") => Some(modifiers::IDENTITY),
        ("object", "data") | ("object", "src") | ("embed", "src") | ("embed", "data") => {
            Some(modifiers::OPAQUE)
        }
        ("table", "background") | ("td", "background") | ("th", "background")
        | ("body", "background") => Some(modifiers::IMAGE),
        _ => None,
    }
}

fn handle_script_attrs(attrs: &mut Vec<RawAttr>) {
    rename_attr(attrs, "integrity", "_integrity");
    rename_attr(attrs, "crossorigin", "_crossorigin");
}

fn handle_meta_refresh(url_rewriter: &UrlRewriter, attrs: &mut [RawAttr]) {
    let http_equiv = get_attr(attrs, "http-equiv")
        .map(|v| v.to_ascii_lowercase())
        .unwrap_or_default();
    if http_equiv != "refresh" {
        return;
    }
    let content = match get_attr(attrs, "content") {
        Some(v) => v.clone(),
        None => return,
    };
    let lower = content.to_ascii_lowercase();
    if let Some(pos) = lower.find("url=") {
        let (prefix, rest) = content.split_at(pos + 4);
        let rewritten = url_rewriter.rewrite(rest, None);
        set_attr_mut(attrs, "content", format!("{prefix}{rewritten}"));
    }
}

fn rewrite_srcset_attr(url_rewriter: &UrlRewriter, attrs: &mut [RawAttr]) {
    if let Some(v) = get_attr(attrs, "srcset") {
        let rewritten = rewrite_srcset(url_rewriter, v);
        set_attr_mut(attrs, "srcset", rewritten);
    }
}

/// `srcset` is a comma-separated list of `url [descriptor]` candidates.
fn rewrite_srcset(url_rewriter: &UrlRewriter, srcset: &str) -> String {
    srcset
        .split(',')
        .map(|candidate| {
            let trimmed = candidate.trim();
            if trimmed.is_empty() {
                return String::new();
            }
            let mut parts = trimmed.splitn(2, char::is_whitespace);
            let url = parts.next().unwrap_or("");
            let descriptor = parts.next().unwrap_or("").trim();
            let rewritten = url_rewriter.rewrite(url, Some(modifiers::IMAGE));
            if descriptor.is_empty() {
                rewritten
            } else {
                format!("{rewritten} {descriptor}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn rewrite_style_attr(url_rewriter: &UrlRewriter, attrs: &mut [RawAttr]) {
    if let Some(v) = get_attr(attrs, "style") {
        let rewritten = rewrite_css_string(url_rewriter, v);
        set_attr_mut(attrs, "style", rewritten);
    }
}

fn rewrite_event_handler_attrs(
    url_rewriter: &UrlRewriter,
    js_mode: crate::context::JsRewriteMode,
    attrs: &mut Vec<RawAttr>,
) {
    let js = JsRewriter::new(Rc::new(clone_url_rewriter(url_rewriter)), js_mode);
    for attr in attrs.iter_mut() {
        if attr.name.len() > 2 && attr.name.as_bytes()[0].to_ascii_lowercase() == b'o'
            && attr.name.as_bytes()[1].to_ascii_lowercase() == b'n'
        {
            if let Some(v) = &attr.value {
                attr.value = Some(js.rewrite(v));
            }
        }
    }
}

fn rewrite_data_attrs(url_rewriter: &UrlRewriter, attrs: &mut Vec<RawAttr>) {
    for attr in attrs.iter_mut() {
        if attr.name.to_ascii_lowercase().starts_with("data-") {
            if let Some(v) = &attr.value {
                if looks_like_absolute_url(v) {
                    attr.value = Some(url_rewriter.rewrite(v, Some(modifiers::OPAQUE)));
                }
            }
        }
    }
}

fn rewrite_param_value(url_rewriter: &UrlRewriter, attrs: &mut Vec<RawAttr>) {
    for attr in attrs.iter_mut() {
        if attr.name.eq_ignore_ascii_case("value") {
            if let Some(v) = &attr.value {
                if looks_like_absolute_url(v) {
                    attr.value = Some(url_rewriter.rewrite(v, Some(modifiers::OPAQUE)));
                }
            }
        }
    }
}

fn looks_like_absolute_url(s: &str) -> bool {
    url::Url::parse(s.trim()).is_ok()
}

/// `UrlRewriter` isn't `Clone`; event handlers need their own `Rc` handle to
/// build a throwaway `JsRewriter`, so share the same context and base.
fn clone_url_rewriter(url_rewriter: &UrlRewriter) -> UrlRewriter {
    let rewriter = UrlRewriter::new(url_rewriter.context().clone());
    rewriter.set_base(url_rewriter.base());
    rewriter
}

fn get_attr<'a>(attrs: &'a [RawAttr], name: &str) -> Option<&'a String> {
    attrs
        .iter()
        .find(|a| a.name.eq_ignore_ascii_case(name))
        .and_then(|a| a.value.as_ref())
}

fn set_attr(attrs: &mut Vec<RawAttr>, name: &str, value: String) {
    set_attr_mut(attrs, name, value)
}

fn set_attr_mut(attrs: &mut [RawAttr], name: &str, value: String) {
    if let Some(a) = attrs.iter_mut().find(|a| a.name.eq_ignore_ascii_case(name)) {
        a.value = Some(value);
    }
}

fn rename_attr(attrs: &mut [RawAttr], from: &str, to: &str) {
    for a in attrs.iter_mut() {
        if a.name.eq_ignore_ascii_case(from) {
            a.name = to.to_string();
        }
    }
}

fn serialize_tag(tag: &str, attrs: &[RawAttr], self_closing: bool) -> String {
    let mut out = String::new();
    out.push('<');
    out.push_str(tag);
    for attr in attrs {
        out.push(' ');
        out.push_str(&attr.name.to_ascii_lowercase());
        if let Some(v) = &attr.value {
            let q = attr.quote.unwrap_or('"');
            out.push('=');
            out.push(q);
            out.push_str(v);
            out.push(q);
        }
    }
    if self_closing {
        out.push('/');
    }
    out.push('>');
    out
}

fn flush_raw_state(url_rewriter: &Rc<UrlRewriter>, state: RawState, out: &mut String) {
    if state.overflowed {
        out.push_str(&state.buffer);
        return;
    }
    match state.kind {
        RawKind::Script => {
            let js = JsRewriter::new(url_rewriter.clone(), url_rewriter.context().flags.js_rewrite_location);
            out.push_str(&js.rewrite(&state.buffer));
        }
        RawKind::Style => {
            out.push_str(&rewrite_css_string(url_rewriter, &state.buffer));
        }
        RawKind::Passthrough => {
            out.push_str(&state.buffer);
        }
    }
}

/// Rewrites a standalone fragment of markup (used for `parse_comments`) by
/// running it through a throwaway rewriter that shares the same URL Rewriter
/// but never performs head-insertion.
fn rewrite_fragment(url_rewriter: &Rc<UrlRewriter>, fragment: &str) -> String {
    let mut inner = HtmlRewriter::new(url_rewriter.clone(), None);
    let mut out = inner.feed(fragment.as_bytes());
    out.extend(inner.close());
    String::from_utf8_lossy(&out).into_owned()
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Splits off the longest valid-UTF-8 prefix of `bytes`, returning
/// `(valid_str, remaining_bytes)`. The remainder is either an incomplete
/// trailing multi-byte sequence (wait for more data) or genuinely invalid
/// bytes (left for `close()` to force through lossily).
fn split_valid_utf8(bytes: &[u8]) -> (&str, &[u8]) {
    match std::str::from_utf8(bytes) {
        Ok(s) => (s, &[]),
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            let s = std::str::from_utf8(&bytes[..valid_up_to]).unwrap();
            (s, &bytes[valid_up_to..])
        }
    }
}

fn next_event(buf: &str, raw_tag: Option<&str>, eof: bool) -> Option<(Event, usize)> {
    if buf.is_empty() {
        return None;
    }

    if let Some(tag) = raw_tag {
        return next_raw_text_event(buf, tag, eof);
    }

    if !buf.starts_with('<') {
        let idx = buf.find('<').unwrap_or(buf.len());
        return Some((Event::Text(buf[..idx].to_string()), idx));
    }

    if buf.len() < 2 {
        return if eof {
            Some((Event::Text(buf.to_string()), buf.len()))
        } else {
            None
        };
    }

    if buf.starts_with("<!--") {
        return match buf.find("-->") {
            Some(end) => Some((Event::Comment(buf[4..end].to_string()), end + 3)),
            None if eof => Some((Event::Comment(buf[4..].to_string()), buf.len())),
            None => None,
        };
    }

    if buf.len() >= 9 && buf[..9].eq_ignore_ascii_case("<![cdata[") {
        return match buf.find("]]>") {
            Some(end) => Some((Event::Cdata(buf[9..end].to_string()), end + 3)),
            None if eof => Some((Event::Cdata(buf[9..].to_string()), buf.len())),
            None => None,
        };
    }

    if buf.as_bytes()[1] == b'!' {
        return match buf.find('>') {
            Some(end) => Some((Event::Doctype(buf[2..end].to_string()), end + 1)),
            None if eof => Some((Event::Doctype(buf[2..].to_string()), buf.len())),
            None => None,
        };
    }

    if buf.starts_with("<?") {
        return match buf.find('>') {
            Some(end) => Some((Event::ProcessingInstruction(buf[2..end].to_string()), end + 1)),
            None if eof => Some((
                Event::ProcessingInstruction(buf[2..].to_string()),
                buf.len(),
            )),
            None => None,
        };
    }

    if buf.starts_with("</") {
        return match parse_tag_like(buf, 2, eof) {
            TagParse::Done(name, _attrs, _self_closing, consumed) => {
                Some((Event::EndTag { name }, consumed))
            }
            TagParse::NeedMore => None,
            TagParse::Bogus => Some((Event::Text(buf[..2].to_string()), 2)),
        };
    }

    if (buf.as_bytes()[1] as char).is_ascii_alphabetic() {
        return match parse_tag_like(buf, 1, eof) {
            TagParse::Done(name, attrs, self_closing, consumed) => Some((
                Event::StartTag {
                    name,
                    attrs,
                    self_closing,
                },
                consumed,
            )),
            TagParse::NeedMore => None,
            TagParse::Bogus => Some((Event::Text(buf[..1].to_string()), 1)),
        };
    }

    // A lone '<' that doesn't start any recognized construct (e.g. "< 5").
    Some((Event::Text(buf[..1].to_string()), 1))
}

/// Scans the raw-text body of a `<script>`/`<style>`/`<title>`/`<textarea>`
/// element for its matching end tag. Returns a `Text` event for everything
/// before the end tag's `</tag` marker, leaving the marker itself in the
/// buffer so the next call parses it as a normal end tag.
fn next_raw_text_event(buf: &str, tag: &str, eof: bool) -> Option<(Event, usize)> {
    match find_end_tag_start(buf, tag) {
        None => {
            if eof {
                Some((Event::Text(buf.to_string()), buf.len()))
            } else {
                None
            }
        }
        Some(0) => {
            // Already sitting at "</tag"; parse it as a real end tag.
            match parse_tag_like(buf, 2, eof) {
                TagParse::Done(name, _attrs, _self_closing, consumed) => {
                    Some((Event::EndTag { name }, consumed))
                }
                TagParse::NeedMore => None,
                TagParse::Bogus => Some((Event::Text(buf[..2].to_string()), 2)),
            }
        }
        Some(i) => {
            // Confirm a terminator exists before committing to the split, so
            // we don't hand back a Text event for content we'd need to undo.
            if buf[i..].find('>').is_some() || eof {
                Some((Event::Text(buf[..i].to_string()), i))
            } else {
                None
            }
        }
    }
}

/// Finds the byte offset of `</tag` (case-insensitive, word-bounded) in
/// `buf`, if present.
fn find_end_tag_start(buf: &str, tag: &str) -> Option<usize> {
    let bytes = buf.as_bytes();
    let tag_bytes = tag.as_bytes();
    let mut i = 0;
    while let Some(rel) = buf[i..].find("</") {
        let start = i + rel;
        let name_start = start + 2;
        let name_end = name_start + tag_bytes.len();
        if name_end <= bytes.len()
            && bytes[name_start..name_end].eq_ignore_ascii_case(tag_bytes)
            && bytes
                .get(name_end)
                .map(|b| !(*b as char).is_ascii_alphanumeric())
                .unwrap_or(true)
        {
            return Some(start);
        }
        i = start + 2;
        if i >= buf.len() {
            break;
        }
    }
    None
}

enum TagParse {
    Done(String, Vec<RawAttr>, bool, usize),
    NeedMore,
    Bogus,
}

/// Parses a start or end tag beginning at byte 0 of `buf` (the tag name
/// begins at `name_start`, i.e. 1 for `<tag` or 2 for `</tag`).
fn parse_tag_like(buf: &str, name_start: usize, eof: bool) -> TagParse {
    let bytes = buf.as_bytes();
    let n = bytes.len();
    let is_end_tag = name_start == 2;

    let mut i = name_start;
    let name_begin = i;
    while i < n {
        let c = bytes[i] as char;
        if c.is_ascii_alphanumeric() || c == '-' || c == ':' {
            i += 1;
        } else {
            break;
        }
    }
    if i == name_begin {
        if i >= n {
            return if eof { TagParse::Bogus } else { TagParse::NeedMore };
        }
        return TagParse::Bogus;
    }
    let name = buf[name_begin..i].to_string();

    let mut attrs = Vec::new();
    let mut self_closing = false;

    loop {
        while i < n && (bytes[i] as char).is_ascii_whitespace() {
            i += 1;
        }
        if i >= n {
            return if eof {
                TagParse::Done(name, attrs, self_closing, n)
            } else {
                TagParse::NeedMore
            };
        }
        let c = bytes[i] as char;
        if c == '>' {
            i += 1;
            return TagParse::Done(name, attrs, self_closing, i);
        }
        if c == '/' {
            if i + 1 < n && bytes[i + 1] as char == '>' {
                self_closing = true;
                i += 2;
                return TagParse::Done(name, attrs, self_closing, i);
            } else if i + 1 >= n {
                return if eof {
                    TagParse::Done(name, attrs, self_closing, n)
                } else {
                    TagParse::NeedMore
                };
            } else {
                i += 1;
                continue;
            }
        }
        if is_end_tag {
            // Forgiving: swallow any stray characters inside an end tag
            // until its terminator.
            i += 1;
            continue;
        }

        let attr_name_start = i;
        while i < n {
            let c = bytes[i] as char;
            if c.is_ascii_whitespace() || c == '=' || c == '>' || c == '/' {
                break;
            }
            i += 1;
        }
        if i >= n {
            return if eof {
                let attr_name = buf[attr_name_start..i].to_string();
                if !attr_name.is_empty() {
                    attrs.push(RawAttr {
                        name: attr_name,
                        value: None,
                        quote: None,
                    });
                }
                TagParse::Done(name, attrs, self_closing, n)
            } else {
                TagParse::NeedMore
            };
        }
        let attr_name = buf[attr_name_start..i].to_string();

        while i < n && (bytes[i] as char).is_ascii_whitespace() {
            i += 1;
        }

        if i < n && bytes[i] as char == '=' {
            i += 1;
            while i < n && (bytes[i] as char).is_ascii_whitespace() {
                i += 1;
            }
            if i >= n {
                return if eof {
                    attrs.push(RawAttr {
                        name: attr_name,
                        value: Some(String::new()),
                        quote: None,
                    });
                    TagParse::Done(name, attrs, self_closing, n)
                } else {
                    TagParse::NeedMore
                };
            }
            let q = bytes[i] as char;
            if q == '"' || q == '\'' {
                i += 1;
                let val_start = i;
                match buf[i..].find(q) {
                    Some(rel_end) => {
                        let val_end = i + rel_end;
                        let value = buf[val_start..val_end].to_string();
                        i = val_end + 1;
                        attrs.push(RawAttr {
                            name: attr_name,
                            value: Some(value),
                            quote: Some(q),
                        });
                    }
                    None => {
                        return if eof {
                            let value = buf[val_start..].to_string();
                            attrs.push(RawAttr {
                                name: attr_name,
                                value: Some(value),
                                quote: Some(q),
                            });
                            TagParse::Done(name, attrs, self_closing, n)
                        } else {
                            TagParse::NeedMore
                        };
                    }
                }
            } else {
                let val_start = i;
                while i < n {
                    let c = bytes[i] as char;
                    if c.is_ascii_whitespace() || c == '>' {
                        break;
                    }
                    i += 1;
                }
                if i >= n && !eof {
                    return TagParse::NeedMore;
                }
                let value = buf[val_start..i].to_string();
                attrs.push(RawAttr {
                    name: attr_name,
                    value: Some(value),
                    quote: None,
                });
            }
        } else {
            attrs.push(RawAttr {
                name: attr_name,
                value: None,
                quote: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RewriteContext;

    fn rewriter(head_insert: Option<&str>) -> HtmlRewriter {
        let ctx = RewriteContext::new(
            "/web/",
            "20131226101010",
            "http://example.com/some/path/index.html",
        );
        HtmlRewriter::new(
            Rc::new(UrlRewriter::new(ctx)),
            head_insert.map(|s| s.to_string()),
        )
    }

    fn run(rw: HtmlRewriter, html: &str) -> String {
        let mut rw = rw;
        let mut out = rw.feed(html.as_bytes());
        out.extend(rw.close());
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn lowercases_tags_and_attrs_and_rewrites_href() {
        let out = run(rewriter(None), r#"<HTML><A Href="page.html">T</a></hTmL>"#);
        assert_eq!(
            out,
            r#"<html><a href="/web/20131226101010/http://example.com/some/path/page.html">T</a></html>"#
        );
    }

    #[test]
    fn img_src_gets_image_modifier() {
        let out = run(rewriter(None), r#"<img src="pic.gif">"#);
        assert_eq!(
            out,
            r#"<img src="/web/20131226101010im_/http://example.com/some/path/pic.gif">"#
        );
    }

    #[test]
    fn script_body_is_js_rewritten() {
        let out = run(
            rewriter(None),
            r#"<script>window.location = "http://example.com/a.html";</script>"#,
        );
        assert!(out.contains("WB_wombat_location"));
        assert!(out.contains("/web/20131226101010/http://example.com/a.html"));
    }

    #[test]
    fn style_body_is_css_rewritten() {
        let out = run(
            rewriter(None),
            r#"<style>body { background: url(bg.png); }</style>"#,
        );
        assert!(out.contains("/web/20131226101010/http://example.com/some/path/bg.png"));
    }

    #[test]
    fn title_body_is_passthrough_raw_text() {
        let out = run(rewriter(None), r#"<title>A < B & window.location</title>"#);
        assert_eq!(out, r#"<title>A < B & window.location</title>"#);
    }

    #[test]
    fn head_insert_fires_once_after_head_open() {
        let out = run(
            rewriter(Some("<script>INSERTED</script>")),
            "<html><head><meta charset=\"utf-8\"></head><body>hi</body></html>",
        );
        assert_eq!(
            out,
            "<html><head><script>INSERTED</script><meta charset=\"utf-8\"></head><body>hi</body></html>"
        );
    }

    #[test]
    fn head_insert_fires_before_first_content_when_no_head() {
        let out = run(rewriter(Some("<script>INSERTED</script>")), "<html><body>hi</body></html>");
        assert_eq!(
            out,
            "<html><script>INSERTED</script><body>hi</body></html>"
        );
    }

    #[test]
    fn comments_pass_through_unchanged_by_default() {
        let out = run(rewriter(None), "<!-- <a href=\"x.html\">y</a> -->");
        assert_eq!(out, "<!-- <a href=\"x.html\">y</a> -->");
    }

    #[test]
    fn comments_descend_when_parse_comments_enabled() {
        let ctx = RewriteContext::new(
            "/web/",
            "20131226101010",
            "http://example.com/some/path/index.html",
        )
        .with_flags(crate::context::Flags {
            parse_comments: true,
            ..Default::default()
        });
        let rw = HtmlRewriter::new(Rc::new(UrlRewriter::new(ctx)), None);
        let out = run(rw, "<!--[if IE]><script src=\"a.js\"></script><![endif]-->");
        assert!(out.contains("/web/20131226101010js_/http://example.com/some/path/a.js"));
    }

    #[test]
    fn unterminated_script_auto_closes_at_eof() {
        let out = run(
            rewriter(None),
            r#"<script>window.location = "http://example.com/a.html";"#,
        );
        assert!(out.contains("WB_wombat_location"));
        assert!(out.ends_with("</script>"));
    }

    #[test]
    fn base_tag_updates_base_and_rewrites_href() {
        let out = run(rewriter(None), r#"<base href="http://example.com"/><a href="x.html">y</a>"#);
        assert!(out.contains("/web/20131226101010/http://example.com/"));
        assert!(out.contains("/web/20131226101010/http://example.com/x.html"));
    }

    #[test]
    fn chunk_boundary_in_the_middle_of_a_tag_is_handled() {
        let mut rw = rewriter(None);
        let mut out = rw.feed(b"<a hr");
        out.extend(rw.feed(b"ef=\"page.html\">t</a>"));
        out.extend(rw.close());
        let s = String::from_utf8(out).unwrap();
        assert_eq!(
            s,
            r#"<a href="/web/20131226101010/http://example.com/some/path/page.html">t</a>"#
        );
    }

    #[test]
    fn event_handler_attribute_is_js_rewritten() {
        let out = run(
            rewriter(None),
            r##"<a href="#" onclick="window.location='http://example.com/a.html'">x</a>"##,
        );
        assert!(out.contains("WB_wombat_location"));
    }

    #[test]
    fn srcset_rewrites_each_candidate() {
        let out = run(
            rewriter(None),
            r#"<img srcset="a.png 1x, b.png 2x">"#,
        );
        assert!(out.contains("/web/20131226101010im_/http://example.com/some/path/a.png 1x"));
        assert!(out.contains("/web/20131226101010im_/http://example.com/some/path/b.png 2x"));
    }

    #[test]
    fn orphan_end_tag_passes_through() {
        let out = run(rewriter(None), "<p>hi</p></div>");
        assert_eq!(out, "<p>hi</p></div>");
    }

    proptest::proptest! {
        /// §8 chunk-boundary invariance property: splitting a well-formed
        /// document's bytes across two `feed()` calls at any boundary
        /// produces the same output as feeding it whole.
        #[test]
        fn prop_chunk_boundary_invariance(split in 0usize..=70) {
            let html = r#"<html><head><title>T</title></head><body><a href="page.html">x</a><img src="pic.gif"></body></html>"#;
            let split = split.min(html.len());

            let whole = run(rewriter(None), html);

            let mut rw = rewriter(None);
            let mut out = rw.feed(html[..split].as_bytes());
            out.extend(rw.feed(html[split..].as_bytes()));
            out.extend(rw.close());
            let chunked = String::from_utf8(out).unwrap();

            proptest::prop_assert_eq!(chunked, whole);
        }

        /// §8 head-insertion-exactly-once property: whatever well-formed
        /// document shape we feed (with or without an explicit `<head>`,
        /// with arbitrary leading whitespace text before the first tag), the
        /// configured head-insert string appears in the output exactly once.
        #[test]
        fn prop_head_insert_appears_at_most_once(
            has_head in proptest::prelude::any::<bool>(),
            leading_ws in "[ \\t\\n]{0,8}",
        ) {
            let body = "<body>hi</body></html>";
            let html = if has_head {
                format!("{leading_ws}<html><head><title>t</title></head>{body}")
            } else {
                format!("{leading_ws}<html>{body}")
            };
            let out = run(rewriter(Some("<script>INSERTED</script>")), &html);
            let count = out.matches("INSERTED").count();
            proptest::prop_assert_eq!(count, 1);
        }
    }
}
