// rewrite_core::css
//
// CSS Rewriter. Walks a CSS token stream with `cssparser` and rewrites every
// `url(...)` / `image-set(...)` argument and every `@import` target through
// the shared URL Rewriter, leaving every other token byte-for-byte (modulo
// the fixed-width re-serialization cssparser's tokenizer gives us for
// numbers/strings).
//
// Used both for standalone `text/css` responses and, by the HTML Rewriter,
// for `<style>` element bodies and `style="..."` attribute values.

use std::rc::Rc;

use cssparser::{Parser, ParserInput, Token};

use crate::url::UrlRewriter;

/// Rewrite a complete CSS fragment (stylesheet, inline `<style>` body, or a
/// `style="..."` attribute value) in one shot.
pub fn rewrite_css_string(url_rewriter: &UrlRewriter, css: &str) -> String {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut out = String::with_capacity(css.len());
    rewrite_token_stream(&mut parser, url_rewriter, &mut out);
    out
}

/// Streaming entry point: buffers fed chunks and rewrites the whole
/// accumulated body on `close`, since a CSS token (a quoted string split
/// mid-escape, an unterminated `url(`) cannot safely be rewritten from a
/// partial chunk. This mirrors §4.3's note that unterminated constructs are
/// only resolved when the buffer is flushed.
pub struct CssRewriter {
    url_rewriter: Rc<UrlRewriter>,
    buffer: String,
}

impl CssRewriter {
    pub fn new(url_rewriter: Rc<UrlRewriter>) -> Self {
        CssRewriter {
            url_rewriter,
            buffer: String::new(),
        }
    }

    pub fn feed(&mut self, chunk: &str) -> String {
        self.buffer.push_str(chunk);
        String::new()
    }

    pub fn close(mut self) -> String {
        let css = std::mem::take(&mut self.buffer);
        rewrite_css_string(&self.url_rewriter, &css)
    }
}

// ---------------------------------------------------------------------------
// Token-level rewriter
// ---------------------------------------------------------------------------

fn rewrite_token_stream(parser: &mut Parser<'_, '_>, url_rewriter: &UrlRewriter, out: &mut String) {
    // Track whether we are inside an @import context so bare string tokens
    // are treated as URLs.
    let mut in_import = false;

    loop {
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(t) => t.clone(),
            Err(_) => break,
        };

        match token {
            Token::UnquotedUrl(ref url_val) => {
                let rewritten = url_rewriter.rewrite(url_val.as_ref(), None);
                out.push_str("url(");
                out.push_str(&quote_css_url(&rewritten));
                out.push(')');
            }

            Token::Function(ref name) if name.eq_ignore_ascii_case("url") => {
                out.push_str("url(");
                rewrite_function_args(parser, url_rewriter, out, true);
                out.push(')');
            }

            Token::Function(ref name) if name.eq_ignore_ascii_case("image-set") => {
                out.push_str("image-set(");
                rewrite_function_args(parser, url_rewriter, out, true);
                out.push(')');
            }

            Token::AtKeyword(ref kw) if kw.eq_ignore_ascii_case("import") => {
                out.push_str("@import ");
                in_import = true;
            }

            Token::AtKeyword(ref kw) if kw.eq_ignore_ascii_case("namespace") => {
                out.push_str("@namespace ");
                // The url() token is handled by the branch above.
            }

            Token::AtKeyword(ref kw) => {
                out.push('@');
                out.push_str(kw.as_ref());
            }

            Token::QuotedString(ref s) => {
                let s_str: &str = s.as_ref();
                if in_import {
                    let rewritten = url_rewriter.rewrite(s_str, None);
                    out.push_str(&format!("\"{}\"", escape_css_string(&rewritten)));
                    in_import = false;
                } else {
                    out.push_str(&format!("\"{}\"", escape_css_string(s_str)));
                }
            }

            Token::CurlyBracketBlock => {
                out.push('{');
                let _ = parser.parse_nested_block(|inner| -> Result<(), cssparser::ParseError<'_, ()>> {
                    rewrite_token_stream(inner, url_rewriter, out);
                    Ok(())
                });
                out.push('}');
            }

            Token::ParenthesisBlock => {
                out.push('(');
                let _ = parser.parse_nested_block(|inner| -> Result<(), cssparser::ParseError<'_, ()>> {
                    rewrite_token_stream(inner, url_rewriter, out);
                    Ok(())
                });
                out.push(')');
            }

            Token::SquareBracketBlock => {
                out.push('[');
                let _ = parser.parse_nested_block(|inner| -> Result<(), cssparser::ParseError<'_, ()>> {
                    rewrite_token_stream(inner, url_rewriter, out);
                    Ok(())
                });
                out.push(']');
            }

            Token::Function(ref name) => {
                out.push_str(name.as_ref());
                out.push('(');
                let _ = parser.parse_nested_block(|inner| -> Result<(), cssparser::ParseError<'_, ()>> {
                    rewrite_token_stream(inner, url_rewriter, out);
                    Ok(())
                });
                out.push(')');
            }

            Token::Ident(ref v) => out.push_str(v.as_ref()),
            Token::Hash(ref v) | Token::IDHash(ref v) => {
                out.push('#');
                out.push_str(v.as_ref());
            }
            Token::Number { value, .. } => out.push_str(&format_number(value)),
            Token::Percentage { unit_value, .. } => {
                out.push_str(&format_number(unit_value * 100.0));
                out.push('%');
            }
            Token::Dimension { value, ref unit, .. } => {
                out.push_str(&format_number(value));
                out.push_str(unit.as_ref());
            }
            Token::WhiteSpace(ref s) => out.push_str(s),
            Token::Colon => out.push(':'),
            Token::Semicolon => {
                in_import = false;
                out.push(';');
            }
            Token::Comma => out.push(','),
            Token::Delim(c) => out.push(c),
            Token::IncludeMatch => out.push_str("~="),
            Token::DashMatch => out.push_str("|="),
            Token::PrefixMatch => out.push_str("^="),
            Token::SuffixMatch => out.push_str("$="),
            Token::SubstringMatch => out.push_str("*="),
            Token::CDO => out.push_str("<!--"),
            Token::CDC => out.push_str("-->"),
            Token::Comment(ref c) => {
                out.push_str("/*");
                out.push_str(c.as_ref());
                out.push_str("*/");
            }
            Token::BadString(ref s) => out.push_str(s.as_ref()),
            Token::BadUrl(ref s) => {
                out.push_str("url(");
                out.push_str(s.as_ref());
                out.push(')');
            }
            Token::CloseParenthesis => out.push(')'),
            Token::CloseSquareBracket => out.push(']'),
            Token::CloseCurlyBracket => out.push('}'),
            _ => {}
        }
    }
}

fn rewrite_function_args(
    parser: &mut Parser<'_, '_>,
    url_rewriter: &UrlRewriter,
    out: &mut String,
    is_url_context: bool,
) {
    let _ = parser.parse_nested_block(|inner| -> Result<(), cssparser::ParseError<'_, ()>> {
        loop {
            let tok: Token = match inner.next_including_whitespace_and_comments() {
                Ok(t) => t.clone(),
                Err(_) => break,
            };
            match tok {
                Token::QuotedString(ref s) if is_url_context => {
                    let rewritten = url_rewriter.rewrite(s.as_ref(), None);
                    out.push_str(&format!("\"{}\"", escape_css_string(&rewritten)));
                }
                Token::UnquotedUrl(ref s) => {
                    let rewritten = url_rewriter.rewrite(s.as_ref(), None);
                    out.push_str(&quote_css_url(&rewritten));
                }
                Token::Function(ref name) if name.eq_ignore_ascii_case("url") => {
                    out.push_str("url(");
                    rewrite_function_args(inner, url_rewriter, out, true);
                    out.push(')');
                }
                Token::WhiteSpace(ref s) => out.push_str(s),
                Token::Comma => out.push(','),
                Token::Number { value, .. } => out.push_str(&format_number(value)),
                Token::Dimension { value, ref unit, .. } => {
                    out.push_str(&format_number(value));
                    out.push_str(unit.as_ref());
                }
                Token::Ident(ref v) => out.push_str(v.as_ref()),
                Token::Delim(c) => out.push(c),
                _ => {}
            }
        }
        Ok(())
    });
}

fn quote_css_url(url: &str) -> String {
    format!("\"{}\"", escape_css_string(url))
}

fn escape_css_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\a ")
}

fn format_number(v: f32) -> String {
    if v == (v as i64) as f32 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RewriteContext;

    fn rewriter() -> UrlRewriter {
        let ctx = RewriteContext::new("/web/", "20131226101010", "https://example.com/style/x.css");
        UrlRewriter::new(ctx)
    }

    #[test]
    fn rewrites_url_function() {
        let css = r#"body { background: url(https://example.com/bg.png); }"#;
        let result = rewrite_css_string(&rewriter(), css);
        assert!(result.contains("/web/20131226101010/https://example.com/bg.png"));
    }

    #[test]
    fn rewrites_import() {
        let css = r#"@import "https://example.com/reset.css";"#;
        let result = rewrite_css_string(&rewriter(), css);
        assert!(result.contains("/web/20131226101010/https://example.com/reset.css"));
    }

    #[test]
    fn preserves_data_urls() {
        let css = r#"body { background: url(data:image/png;base64,abc); }"#;
        let result = rewrite_css_string(&rewriter(), css);
        assert!(result.contains("data:image/png;base64,abc"));
    }

    #[test]
    fn rewrites_relative_url_against_base() {
        let css = r#"div { background: url(bg.png); }"#;
        let result = rewrite_css_string(&rewriter(), css);
        assert!(result.contains("/web/20131226101010/https://example.com/style/bg.png"));
    }

    #[test]
    fn streaming_close_flushes_buffer() {
        let ctx = RewriteContext::new("/web/", "20131226101010", "https://example.com/style/x.css");
        let mut rw = CssRewriter::new(Rc::new(UrlRewriter::new(ctx)));
        assert_eq!(rw.feed("body { color: "), "");
        assert_eq!(rw.feed("red; background: url(bg.png) }"), "");
        let out = rw.close();
        assert!(out.contains("/web/20131226101010/https://example.com/style/bg.png"));
    }
}
