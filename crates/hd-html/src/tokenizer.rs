use hd_dom::Attribute;
use hd_dom::Doctype;

use crate::entities::decode_entities;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Token {
    Doctype(Doctype),
    Comment(String),
    Start {
        name: String,
        attrs: Vec<Attribute>,
        self_closing: bool,
    },
    End {
        name: String,
    },
    Text(String),
}

/// Elements whose content is not markup: everything up to the matching
/// end tag is one text token.
const RAW_TEXT: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript", "textarea", "title",
];
/// Raw-text elements whose content still has entities decoded.
const ESCAPABLE_RAW_TEXT: &[&str] = &["textarea", "title"];

pub(crate) fn tokenize(source: &str) -> Vec<Token> {
    let mut cursor = Cursor { src: source, at: 0 };
    let mut tokens = Vec::new();

    loop {
        let rest = cursor.rest();
        if rest.is_empty() {
            break;
        }

        if rest.starts_with("<!--") {
            let comment = cursor.comment();
            tokens.push(Token::Comment(comment));
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            tokens.extend(cursor.declaration().map(Token::Doctype));
            continue;
        }
        if let Some(end) = cursor.attempt(Cursor::end_tag) {
            tokens.push(end);
            continue;
        }
        if let Some(start) = cursor.attempt(Cursor::start_tag) {
            let raw = match &start {
                Token::Start {
                    name,
                    self_closing: false,
                    ..
                } if RAW_TEXT.contains(&name.as_str()) => Some(name.clone()),
                _ => None,
            };
            tokens.push(start);
            if let Some(name) = raw {
                let content = cursor.raw_text(&name);
                if !content.is_empty() {
                    let text = if ESCAPABLE_RAW_TEXT.contains(&name.as_str()) {
                        decode_entities(content)
                    } else {
                        content.to_owned()
                    };
                    tokens.push(Token::Text(text));
                }
                tokens.push(Token::End { name });
            }
            continue;
        }

        let text = decode_entities(cursor.text());
        match tokens.last_mut() {
            Some(Token::Text(previous)) => previous.push_str(&text),
            _ => tokens.push(Token::Text(text)),
        }
    }
    tokens
}

/// Byte position in the source. Every stop lands on an ASCII delimiter, so
/// slices always fall on character boundaries.
struct Cursor<'s> {
    src: &'s str,
    at: usize,
}

impl<'s> Cursor<'s> {
    fn rest(&self) -> &'s str {
        &self.src[self.at..]
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.at).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        let matched = self.peek() == Some(byte);
        if matched {
            self.at += 1;
        }
        matched
    }

    fn take_while(&mut self, keep: impl Fn(u8) -> bool) -> &'s str {
        let start = self.at;
        while self.peek().is_some_and(&keep) {
            self.at += 1;
        }
        &self.src[start..self.at]
    }

    fn skip_spaces(&mut self) {
        self.take_while(|byte| byte.is_ascii_whitespace());
    }

    /// Runs `parse`, rewinding when it does not produce a token.
    fn attempt(&mut self, parse: fn(&mut Self) -> Option<Token>) -> Option<Token> {
        let saved = self.at;
        let token = parse(self);
        if token.is_none() {
            self.at = saved;
        }
        token
    }

    /// Text up to the next `<`; a leading `<` that opened nothing is text too.
    fn text(&mut self) -> &'s str {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .skip(1)
            .find(|&(_, ch)| ch == '<')
            .map_or(rest.len(), |(at, _)| at);
        self.at += end;
        &rest[..end]
    }

    fn comment(&mut self) -> String {
        let body = &self.rest()[4..];
        match body.find("-->") {
            Some(end) => {
                self.at += 4 + end + 3;
                body[..end].to_owned()
            }
            None => {
                self.at = self.src.len();
                body.to_owned()
            }
        }
    }

    /// Skips `<!...>` or `<?...>`, returning the doctype if that is what it was.
    fn declaration(&mut self) -> Option<Doctype> {
        let rest = self.rest();
        let mut quote = None;
        let mut end = rest.len();
        for (at, byte) in rest.bytes().enumerate().skip(2) {
            match quote {
                Some(open) if byte == open => quote = None,
                Some(_) => {}
                None if byte == b'"' || byte == b'\'' => quote = Some(byte),
                None if byte == b'>' => {
                    end = at;
                    break;
                }
                None => {}
            }
        }
        self.at += (end + 1).min(rest.len());

        let is_doctype = rest.get(..9).is_some_and(|head| head.eq_ignore_ascii_case("<!doctype"));
        is_doctype.then(|| doctype(&rest[9..end]))
    }

    fn end_tag(&mut self) -> Option<Token> {
        if !self.rest().starts_with("</") {
            return None;
        }
        self.at += 2;
        self.skip_spaces();
        let name = self.take_while(is_name_byte);
        if name.is_empty() {
            return None;
        }
        let name = name.to_ascii_lowercase();
        self.take_while(|byte| byte != b'>');
        self.eat(b'>').then_some(Token::End { name })
    }

    fn start_tag(&mut self) -> Option<Token> {
        if !self.eat(b'<') || !self.peek().is_some_and(|byte| byte.is_ascii_alphabetic()) {
            return None;
        }
        let name = self.take_while(is_name_byte).to_ascii_lowercase();
        let mut attrs: Vec<Attribute> = Vec::new();

        loop {
            self.skip_spaces();
            match self.peek()? {
                b'>' => {
                    self.at += 1;
                    return Some(Token::Start {
                        name,
                        attrs,
                        self_closing: false,
                    });
                }
                b'/' => {
                    self.at += 1;
                    self.skip_spaces();
                    if self.eat(b'>') {
                        return Some(Token::Start {
                            name,
                            attrs,
                            self_closing: true,
                        });
                    }
                }
                _ => {
                    let attr_name = self.take_while(is_attr_name_byte);
                    if attr_name.is_empty() {
                        // A stray quote or `=` where a name should start.
                        self.at += 1;
                        continue;
                    }
                    let attr_name = attr_name.to_ascii_lowercase();
                    self.skip_spaces();
                    let value = if self.eat(b'=') {
                        self.skip_spaces();
                        self.attr_value()
                    } else {
                        ""
                    };
                    // The first of a duplicated attribute wins.
                    if !attrs.iter().any(|attr| attr.name == attr_name) {
                        attrs.push(Attribute {
                            name: attr_name,
                            value: decode_entities(value),
                        });
                    }
                }
            }
        }
    }

    fn attr_value(&mut self) -> &'s str {
        match self.peek() {
            Some(quote @ (b'"' | b'\'')) => {
                self.at += 1;
                let value = self.take_while(|byte| byte != quote);
                self.eat(quote);
                value
            }
            _ => self.take_while(|byte| !byte.is_ascii_whitespace() && byte != b'>'),
        }
    }

    /// Content of a raw-text element, up to (not including) `</name>`.
    /// Without a closing tag the rest of the source is content.
    fn raw_text(&mut self, name: &str) -> &'s str {
        let rest = self.rest();
        let mut from = 0;
        while let Some(offset) = rest[from..].find("</") {
            let open = from + offset;
            let name_end = open + 2 + name.len();
            let named = rest
                .as_bytes()
                .get(open + 2..name_end)
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name.as_bytes()));
            if named {
                let after = rest[name_end..].trim_start_matches(|ch: char| ch.is_ascii_whitespace());
                if after.starts_with('>') {
                    self.at += rest.len() - after.len() + 1;
                    return &rest[..open];
                }
            }
            from = open + 2;
        }
        self.at = self.src.len();
        rest
    }
}

fn doctype(body: &str) -> Doctype {
    let body = body.trim_start();
    let (name, rest) = body
        .split_once(|ch: char| ch.is_ascii_whitespace())
        .unwrap_or((body, ""));
    let rest = rest.trim_start();
    let keyword = rest.get(..6).unwrap_or_default().to_ascii_lowercase();

    let (public_id, system_id) = match keyword.as_str() {
        "public" => {
            let (public_id, after) = quoted(&rest[6..]);
            (public_id, quoted(after).0)
        }
        "system" => (String::new(), quoted(&rest[6..]).0),
        _ => (String::new(), String::new()),
    };
    Doctype {
        name: name.to_ascii_lowercase(),
        public_id,
        system_id,
    }
}

/// A leading quoted string and what follows it; empty when unquoted.
fn quoted(input: &str) -> (String, &str) {
    let input = input.trim_start();
    let Some(quote) = input.chars().next().filter(|ch| matches!(ch, '"' | '\'')) else {
        return (String::new(), input);
    };
    match input[1..].split_once(quote) {
        Some((value, after)) => (value.to_owned(), after),
        None => (input[1..].to_owned(), ""),
    }
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b':')
}

fn is_attr_name_byte(byte: u8) -> bool {
    !byte.is_ascii_whitespace() && !matches!(byte, b'"' | b'\'' | b'>' | b'/' | b'=' | b'<')
}

#[cfg(test)]
mod tests {
    use super::Token;
    use super::tokenize;

    fn start_attrs(tokens: &[Token]) -> Vec<(String, String)> {
        match tokens.first() {
            Some(Token::Start { attrs, .. }) => attrs
                .iter()
                .map(|attr| (attr.name.clone(), attr.value.clone()))
                .collect(),
            other => panic!("expected start tag, got {other:?}"),
        }
    }

    #[test]
    fn unquoted_values_may_contain_slashes() {
        let tokens = tokenize("<a href=/docs/web/>x</a>");
        assert_eq!(start_attrs(&tokens), vec![("href".to_owned(), "/docs/web/".to_owned())]);
        assert_eq!(tokens[1], Token::Text("x".to_owned()));
        assert_eq!(tokens[2], Token::End { name: "a".to_owned() });
    }

    #[test]
    fn lone_less_than_is_text() {
        assert_eq!(tokenize("a < b"), vec![Token::Text("a < b".to_owned())]);
        assert_eq!(tokenize("é<3"), vec![Token::Text("é<3".to_owned())]);
    }

    #[test]
    fn self_closing_lazy_image() {
        let tokens = tokenize("<IMG data-src='x.png' alt data-src=\"dup\"/>");
        let Some(Token::Start { name, self_closing, .. }) = tokens.first() else {
            panic!("expected start tag");
        };
        assert_eq!(name, "img");
        assert!(*self_closing);
        assert_eq!(
            start_attrs(&tokens),
            vec![
                ("data-src".to_owned(), "x.png".to_owned()),
                ("alt".to_owned(), String::new()),
            ]
        );
    }

    #[test]
    fn script_and_style_bodies_are_raw() {
        let tokens = tokenize("<script>if (a < b) { x('</p>') }</SCRIPT ><style>a &gt; b {}</style>");
        assert_eq!(tokens[1], Token::Text("if (a < b) { x('</p>') }".to_owned()));
        assert_eq!(tokens[2], Token::End { name: "script".to_owned() });
        assert_eq!(tokens[4], Token::Text("a &gt; b {}".to_owned()));
    }

    #[test]
    fn title_entities_are_decoded() {
        let tokens = tokenize("<title>Tom &amp; Jerry</title>");
        assert_eq!(tokens[1], Token::Text("Tom & Jerry".to_owned()));
    }

    #[test]
    fn doctype_and_comments() {
        let tokens = tokenize(
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd"><!-- note --><?xml x?>"#,
        );
        let Some(Token::Doctype(doctype)) = tokens.first() else {
            panic!("expected doctype");
        };
        assert_eq!(doctype.name, "html");
        assert_eq!(doctype.public_id, "-//W3C//DTD XHTML 1.0//EN");
        assert!(doctype.system_id.ends_with("xhtml1-strict.dtd"));
        assert_eq!(tokens[1], Token::Comment(" note ".to_owned()));
        assert_eq!(tokens.len(), 2);
    }
}
