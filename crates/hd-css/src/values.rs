//! Tokenizers for the few CSS and HTML value grammars that carry resource
//! references: `url()` tokens, `@font-face` `src` lists and `srcset`
//! candidate lists.

use crate::parser::split_top_level;

/// A `url(...)` token located inside a larger value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlToken {
    /// Byte offset of the `u` in `url(`.
    pub start: usize,
    /// Byte offset just past the closing `)`.
    pub end: usize,
    /// The reference with quotes and escapes removed.
    pub url: String,
}

/// Parses a `url(...)` token at the very start of `input`.
pub fn url_at_start(input: &str) -> Option<UrlToken> {
    parse_url_token(input, 0)
}

/// Every `url(...)` token in `value`, in source order.
pub fn find_urls(value: &str) -> Vec<UrlToken> {
    let bytes = value.as_bytes();
    let mut out = Vec::new();
    let mut idx = 0_usize;
    let mut quote: Option<u8> = None;

    while idx < bytes.len() {
        let byte = bytes[idx];
        if let Some(open) = quote {
            if byte == b'\\' {
                idx = idx.saturating_add(2);
                continue;
            }
            if byte == open {
                quote = None;
            }
            idx = idx.saturating_add(1);
            continue;
        }

        if byte == b'\'' || byte == b'"' {
            quote = Some(byte);
            idx = idx.saturating_add(1);
            continue;
        }

        let boundary = idx == 0 || !is_ident_byte(bytes[idx - 1]);
        if boundary {
            if let Some(token) = parse_url_token(value, idx) {
                idx = token.end;
                out.push(token);
                continue;
            }
        }

        idx = idx.saturating_add(1);
    }

    out
}

/// Replaces each token's range in `value` using `rewrite`; tokens for which
/// `rewrite` returns `None` are left as written.
pub fn replace_urls(value: &str, mut rewrite: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut cursor = 0_usize;
    for token in find_urls(value) {
        out.push_str(&value[cursor..token.start]);
        match rewrite(&token.url) {
            Some(replacement) => out.push_str(&serialize_url(&replacement)),
            None => out.push_str(&value[token.start..token.end]),
        }
        cursor = token.end;
    }
    out.push_str(&value[cursor..]);
    out
}

/// Serializes a reference as `url("...")`.
pub fn serialize_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len() + 7);
    out.push_str("url(\"");
    for ch in url.chars() {
        match ch {
            '"' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => out.push_str("\\a "),
            _ => out.push(ch),
        }
    }
    out.push_str("\")");
    out
}

fn parse_url_token(input: &str, start: usize) -> Option<UrlToken> {
    let bytes = input.as_bytes();
    let open = start.saturating_add(4);
    if open > bytes.len() || !bytes[start..open].eq_ignore_ascii_case(b"url(") {
        return None;
    }

    let mut idx = skip_ws(bytes, open);
    let url = match bytes.get(idx).copied() {
        Some(quote @ (b'"' | b'\'')) => {
            idx = idx.saturating_add(1);
            let mut raw = Vec::new();
            loop {
                let byte = *bytes.get(idx)?;
                if byte == b'\\' {
                    let escaped = *bytes.get(idx.saturating_add(1))?;
                    raw.push(escaped);
                    idx = idx.saturating_add(2);
                    continue;
                }
                idx = idx.saturating_add(1);
                if byte == quote {
                    break;
                }
                raw.push(byte);
            }
            idx = skip_ws(bytes, idx);
            String::from_utf8_lossy(&raw).into_owned()
        }
        _ => {
            let value_start = idx;
            while idx < bytes.len() && bytes[idx] != b')' {
                idx = idx.saturating_add(1);
            }
            input[value_start..idx].trim().to_owned()
        }
    };

    if bytes.get(idx).copied() != Some(b')') {
        return None;
    }

    Some(UrlToken {
        start,
        end: idx.saturating_add(1),
        url,
    })
}

fn skip_ws(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx = idx.saturating_add(1);
    }
    idx
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_'
}

/// One comma-separated term of an `@font-face` `src` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSrcTerm {
    /// `url(...)` followed by optional hints such as `format("woff")`.
    Url { url: String, hints: String },
    /// `local(...)`, kept verbatim.
    Local(String),
    Unknown(String),
}

impl FontSrcTerm {
    pub fn css_text(&self) -> String {
        match self {
            Self::Url { url, hints } => {
                if hints.is_empty() {
                    serialize_url(url)
                } else {
                    format!("{} {}", serialize_url(url), hints)
                }
            }
            Self::Local(text) | Self::Unknown(text) => text.clone(),
        }
    }
}

pub fn parse_font_src(value: &str) -> Vec<FontSrcTerm> {
    let mut terms = Vec::new();
    for raw in split_top_level(value, b',') {
        let term = raw.trim();
        if term.is_empty() {
            continue;
        }

        if let Some(token) = url_at_start(term) {
            terms.push(FontSrcTerm::Url {
                url: token.url,
                hints: term[token.end..].trim().to_owned(),
            });
            continue;
        }

        let is_local = term.len() > 6
            && term.as_bytes()[..6].eq_ignore_ascii_case(b"local(")
            && term.ends_with(')');
        if is_local {
            terms.push(FontSrcTerm::Local(term.to_owned()));
        } else {
            terms.push(FontSrcTerm::Unknown(term.to_owned()));
        }
    }
    terms
}

/// One `srcset` image candidate: a URL plus an optional width/density descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcsetCandidate {
    pub url: String,
    pub descriptor: String,
}

pub fn parse_srcset(value: &str) -> Vec<SrcsetCandidate> {
    let bytes = value.as_bytes();
    let mut out = Vec::new();
    let mut idx = 0_usize;

    loop {
        while idx < bytes.len() && (bytes[idx].is_ascii_whitespace() || bytes[idx] == b',') {
            idx = idx.saturating_add(1);
        }
        if idx >= bytes.len() {
            break;
        }

        let url_start = idx;
        while idx < bytes.len() && !bytes[idx].is_ascii_whitespace() {
            idx = idx.saturating_add(1);
        }
        let raw_url = &value[url_start..idx];

        let mut descriptor = String::new();
        let url = if raw_url.ends_with(',') {
            raw_url.trim_end_matches(',')
        } else {
            let descriptor_start = idx;
            let mut depth = 0_u32;
            while idx < bytes.len() {
                match bytes[idx] {
                    b'(' => depth = depth.saturating_add(1),
                    b')' => depth = depth.saturating_sub(1),
                    b',' if depth == 0 => break,
                    _ => {}
                }
                idx = idx.saturating_add(1);
            }
            descriptor = value[descriptor_start..idx].trim().to_owned();
            raw_url
        };

        if !url.is_empty() {
            out.push(SrcsetCandidate {
                url: url.to_owned(),
                descriptor,
            });
        }
    }

    out
}

pub fn serialize_srcset(candidates: &[SrcsetCandidate]) -> String {
    candidates
        .iter()
        .map(|candidate| {
            if candidate.descriptor.is_empty() {
                candidate.url.clone()
            } else {
                format!("{} {}", candidate.url, candidate.descriptor)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::FontSrcTerm;
    use super::find_urls;
    use super::parse_font_src;
    use super::parse_srcset;
    use super::replace_urls;
    use super::serialize_srcset;

    #[test]
    fn finds_quoted_and_bare_urls() {
        let tokens = find_urls("url(\"a.png\"), linear-gradient(red, blue), URL( b.png )");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].url, "a.png");
        assert_eq!(tokens[1].url, "b.png");
    }

    #[test]
    fn ignores_url_text_inside_strings() {
        assert!(find_urls("\"url(a.png)\"").is_empty());
        assert!(find_urls("myurl(a.png)").is_empty());
    }

    #[test]
    fn replace_only_rewrites_resolved_references() {
        let out = replace_urls("url(a.png) no-repeat, url('b.png')", |url| {
            (url == "a.png").then(|| "att/1.png".to_owned())
        });
        assert_eq!(out, "url(\"att/1.png\") no-repeat, url('b.png')");
    }

    #[test]
    fn font_src_terms_keep_order() {
        let terms = parse_font_src(
            "url(\"a.woff\") format(\"woff\"), local(\"Arial\"), url(\"b.woff2\") format(\"woff2\"), bogus",
        );
        assert_eq!(terms.len(), 4);
        assert_eq!(
            terms[0],
            FontSrcTerm::Url {
                url: "a.woff".to_owned(),
                hints: "format(\"woff\")".to_owned(),
            }
        );
        assert_eq!(terms[1], FontSrcTerm::Local("local(\"Arial\")".to_owned()));
        assert_eq!(terms[3], FontSrcTerm::Unknown("bogus".to_owned()));
    }

    #[test]
    fn non_ascii_font_src_terms_are_unknown() {
        let terms = parse_font_src("url(\"a.woff\"), a€€x, lоcal(\"Arial\")");
        assert_eq!(terms.len(), 3);
        assert!(matches!(terms[0], FontSrcTerm::Url { .. }));
        assert_eq!(terms[1], FontSrcTerm::Unknown("a€€x".to_owned()));
        assert_eq!(terms[2], FontSrcTerm::Unknown("lоcal(\"Arial\")".to_owned()));
    }

    #[test]
    fn srcset_candidates_and_commas_in_urls() {
        let candidates = parse_srcset("a.png 1x, b.png 2x,c.png, data:image/png;base64,AAA= 3x");
        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[1].url, "b.png");
        assert_eq!(candidates[1].descriptor, "2x");
        assert_eq!(candidates[2].url, "c.png");
        assert_eq!(candidates[2].descriptor, "");
        assert_eq!(candidates[3].url, "data:image/png;base64,AAA=");
        assert_eq!(
            serialize_srcset(&candidates),
            "a.png 1x, b.png 2x, c.png, data:image/png;base64,AAA= 3x"
        );
    }
}
