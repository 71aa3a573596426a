use crate::CssRule;
use crate::Declaration;
use crate::Declarations;
use crate::FontFaceRule;
use crate::ImportRule;
use crate::MediaRule;
use crate::StyleRule;
use crate::StyleSheet;
use crate::values;

/// Parses CSS source text into the owned object model.
///
/// Parsing never fails: malformed blocks are skipped and anything after an
/// unterminated block is dropped, as a browser would.
#[derive(Debug, Default)]
pub struct CssParser;

impl CssParser {
    pub fn parse(&self, input: &str) -> StyleSheet {
        StyleSheet {
            href: None,
            rules: Some(self.parse_rules(input)),
        }
    }

    pub fn parse_rules(&self, input: &str) -> Vec<CssRule> {
        rules_in(&strip_comments(input))
    }

    /// Parses a bare declaration list such as a `style` attribute.
    pub fn parse_declarations(&self, input: &str) -> Declarations {
        declarations_in(&strip_comments(input))
    }
}

/// Bytes of CSS source outside string literals, each tagged with whether
/// it sits inside `(...)` or `[...]`.
struct Unquoted<'a> {
    bytes: &'a [u8],
    at: usize,
    quote: Option<u8>,
    parens: u32,
    brackets: u32,
}

fn unquoted(input: &str, from: usize) -> Unquoted<'_> {
    Unquoted {
        bytes: input.as_bytes(),
        at: from,
        quote: None,
        parens: 0,
        brackets: 0,
    }
}

impl Iterator for Unquoted<'_> {
    type Item = (usize, u8, bool);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(&byte) = self.bytes.get(self.at) {
            let at = self.at;
            self.at += 1;

            if let Some(open) = self.quote {
                if byte == b'\\' {
                    self.at += 1;
                } else if byte == open {
                    self.quote = None;
                }
                continue;
            }

            let nested = self.parens > 0 || self.brackets > 0;
            match byte {
                b'"' | b'\'' => {
                    self.quote = Some(byte);
                    continue;
                }
                b'(' => self.parens += 1,
                b')' => self.parens = self.parens.saturating_sub(1),
                b'[' => self.brackets += 1,
                b']' => self.brackets = self.brackets.saturating_sub(1),
                _ => {}
            }
            return Some((at, byte, nested));
        }
        None
    }
}

fn rules_in(input: &str) -> Vec<CssRule> {
    let mut rules = Vec::new();
    let mut cursor = 0;

    while let Some(start) = input[cursor..]
        .find(|ch: char| !ch.is_whitespace() && ch != ';')
        .map(|offset| cursor + offset)
    {
        let parsed = if input[start..].starts_with('@') {
            at_rule(input, start)
        } else {
            style_rule(input, start)
        };
        let Some((rule, next)) = parsed else {
            break;
        };
        rules.extend(rule);
        cursor = next;
    }
    rules
}

fn style_rule(input: &str, start: usize) -> Option<(Option<CssRule>, usize)> {
    let open = unquoted(input, start)
        .find(|&(_, byte, nested)| byte == b'{' && !nested)
        .map(|(at, ..)| at)?;
    let close = matching_brace(input, open)?;

    let selector = squash(&input[start..open]);
    let rule = (!selector.is_empty()).then(|| {
        CssRule::Style(StyleRule {
            selector,
            declarations: declarations_in(&input[open + 1..close]),
        })
    });
    Some((rule, close + 1))
}

fn at_rule(input: &str, start: usize) -> Option<(Option<CssRule>, usize)> {
    let name_len = input[start + 1..]
        .find(|ch: char| !ch.is_ascii_alphanumeric() && ch != '-')
        .unwrap_or(input.len() - start - 1);
    let name_end = start + 1 + name_len;
    let keyword = input[start + 1..name_end].to_ascii_lowercase();

    // A statement ends at the first top-level `;`; a block opens at `{`.
    let terminator = unquoted(input, name_end)
        .find(|&(_, byte, nested)| (byte == b';' || byte == b'{') && !nested)
        .map(|(at, byte, _)| (at, byte));
    let Some((open, b'{')) = terminator else {
        let end = terminator.map_or(input.len(), |(at, _)| at);
        let rule = match keyword.as_str() {
            "import" => import_rule(&input[name_end..end]),
            _ => Some(CssRule::Other(format!("{};", collapse_whitespace(&input[start..end])))),
        };
        return Some((rule, (end + 1).min(input.len())));
    };

    let close = matching_brace(input, open)?;
    let body = &input[open + 1..close];
    let rule = match keyword.as_str() {
        "media" => CssRule::Media(MediaRule {
            condition: squash(&input[name_end..open]),
            rules: rules_in(body),
        }),
        "font-face" => CssRule::FontFace(FontFaceRule {
            declarations: declarations_in(body),
        }),
        // Kept verbatim: the capture has nothing to rewrite inside them.
        _ => {
            let head = squash(&input[start..open]);
            match collapse_whitespace(body) {
                inner if inner.is_empty() => CssRule::Other(format!("{head} {{ }}")),
                inner => CssRule::Other(format!("{head} {{ {inner} }}")),
            }
        }
    };
    Some((Some(rule), close + 1))
}

/// `@import url(x) media;` and `@import "x" media;`.
fn import_rule(prelude: &str) -> Option<CssRule> {
    let prelude = prelude.trim();
    let (href, media) = match values::url_at_start(prelude) {
        Some(token) => (token.url, &prelude[token.end..]),
        None => {
            let quote = prelude.chars().next().filter(|ch| matches!(ch, '"' | '\''))?;
            let (href, media) = prelude[1..].split_once(quote)?;
            (href.to_owned(), media)
        }
    };
    Some(CssRule::Import(ImportRule {
        href,
        media: squash(media),
        sheet: None,
    }))
}

/// Index of the `}` closing the block opened at `open`.
fn matching_brace(input: &str, open: usize) -> Option<usize> {
    let mut depth = 0_u32;
    for (at, byte, _) in unquoted(input, open) {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(at);
                }
            }
            _ => {}
        }
    }
    None
}

fn declarations_in(block: &str) -> Declarations {
    let parsed = split_top_level(block, b';')
        .into_iter()
        .filter_map(|raw| {
            let raw = raw.trim();
            let colon = unquoted(raw, 0)
                .find(|&(_, byte, nested)| byte == b':' && !nested)
                .map(|(at, ..)| at)?;
            let name = squash(&raw[..colon]).to_ascii_lowercase();
            let mut value = collapse_whitespace(&raw[colon + 1..]);
            let important = match value.rfind('!') {
                Some(bang) if value[bang + 1..].trim().eq_ignore_ascii_case("important") => {
                    value.truncate(bang);
                    value.truncate(value.trim_end().len());
                    true
                }
                _ => false,
            };
            (!name.is_empty() && !value.is_empty()).then_some(Declaration {
                name,
                value,
                important,
            })
        })
        .collect();
    Declarations(parsed)
}

/// Splits on `delimiter` wherever it is outside strings, parens and brackets.
pub(crate) fn split_top_level(input: &str, delimiter: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (at, byte, nested) in unquoted(input, 0) {
        if byte == delimiter && !nested {
            parts.push(&input[start..at]);
            start = at + 1;
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Drops `/* ... */` comments that are not inside string literals.
fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    loop {
        let bytes = rest.as_bytes();
        let opener = unquoted(rest, 0)
            .find(|&(at, byte, _)| byte == b'/' && bytes.get(at + 1) == Some(&b'*'))
            .map(|(at, ..)| at);
        let Some(opener) = opener else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..opener]);
        match rest[opener + 2..].find("*/") {
            Some(close) => rest = &rest[opener + 2 + close + 2..],
            None => return out,
        }
    }
}

fn squash(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trims and collapses whitespace runs to one space, leaving strings intact.
fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut quote = None;
    let mut chars = input.trim().chars();
    while let Some(ch) = chars.next() {
        match quote {
            Some(open) => {
                out.push(ch);
                if ch == '\\' {
                    out.extend(chars.next());
                } else if ch == open {
                    quote = None;
                }
            }
            None if ch.is_whitespace() => {
                if !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            None => {
                if ch == '"' || ch == '\'' {
                    quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::CssParser;
    use super::split_top_level;
    use crate::CssRule;

    fn rules(input: &str) -> Vec<CssRule> {
        CssParser.parse_rules(input)
    }

    #[test]
    fn style_rules_round_out_to_css_text() {
        let parsed = rules("body { color: red; }\n.card   { padding:8px }");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].css_text(), "body { color: red; }");
        assert_eq!(parsed[1].css_text(), ".card { padding: 8px; }");
    }

    #[test]
    fn comments_go_but_strings_keep_them() {
        let parsed = rules(r#"/* x */ p { font-size: 14px; /* y */ content: "/* kept */" }"#);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].css_text(), r#"p { font-size: 14px; content: "/* kept */"; }"#);
        assert_eq!(rules("p { color: red } /* never closed").len(), 1);
    }

    #[test]
    fn media_blocks_nest_rules() {
        let parsed = rules(
            "@media screen and (min-width: 800px) { .hero { margin: 0 auto; } .title { color: #fff; } }",
        );
        assert_eq!(parsed.len(), 1);
        let CssRule::Media(media) = &parsed[0] else {
            panic!("expected media rule");
        };
        assert_eq!(media.condition, "screen and (min-width: 800px)");
        assert_eq!(media.rules.len(), 2);
    }

    #[test]
    fn semicolons_inside_urls_and_strings_do_not_split() {
        let parsed = rules(
            r#".icon { background-image: url(data:image/svg+xml;utf8,<svg/>); content: "a;b"; color: red; }"#,
        );
        let CssRule::Style(rule) = &parsed[0] else {
            panic!("expected style rule");
        };
        assert_eq!(rule.declarations.get("background-image"), Some("url(data:image/svg+xml;utf8,<svg/>)"));
        assert_eq!(rule.declarations.get("content"), Some("\"a;b\""));
        assert_eq!(rule.declarations.get("color"), Some("red"));
    }

    #[test]
    fn import_statements_keep_their_media() {
        let parsed = rules("@charset \"utf-8\"; @import url(a.css); @import \"b.css\" print;");
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].css_text(), "@charset \"utf-8\";");
        let CssRule::Import(first) = &parsed[1] else {
            panic!("expected import");
        };
        assert_eq!(first.href, "a.css");
        assert_eq!(first.media, "");
        let CssRule::Import(second) = &parsed[2] else {
            panic!("expected import");
        };
        assert_eq!(second.href, "b.css");
        assert_eq!(second.media, "print");
    }

    #[test]
    fn font_face_is_parsed_and_other_blocks_pass_through() {
        let parsed = rules(
            "@font-face { font-family: X; src: url(a.woff) format('woff'); } @keyframes spin { from { opacity: 0 } to { opacity: 1 } }",
        );
        assert_eq!(parsed.len(), 2);
        let CssRule::FontFace(face) = &parsed[0] else {
            panic!("expected font-face");
        };
        assert_eq!(face.declarations.get("src"), Some("url(a.woff) format('woff')"));
        assert_eq!(
            parsed[1].css_text(),
            "@keyframes spin { from { opacity: 0 } to { opacity: 1 } }"
        );
    }

    #[test]
    fn style_attribute_declarations() {
        let decls = CssParser.parse_declarations("display:none ; COLOR: Red !important; broken");
        assert_eq!(decls.get("display"), Some("none"));
        assert_eq!(decls.0.len(), 2);
        assert_eq!(decls.0[1].name, "color");
        assert_eq!(decls.0[1].value, "Red");
        assert!(decls.0[1].important);
    }

    #[test]
    fn top_level_split_respects_nesting() {
        assert_eq!(
            split_top_level("url(a,b) 1x, 'c,d' 2x, e[f,g]", b','),
            vec!["url(a,b) 1x", " 'c,d' 2x", " e[f,g]"]
        );
    }
}
