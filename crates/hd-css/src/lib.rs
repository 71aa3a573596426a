//! CSS object model, parser, and the narrow value grammars the capture
//! pipeline rewrites (`url()` references, font-face `src`, `srcset`).

mod parser;
pub mod values;

pub use parser::CssParser;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
    pub important: bool,
}

impl Declaration {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            value: value.to_owned(),
            important: false,
        }
    }

    pub fn css_text(&self) -> String {
        if self.important {
            format!("{}: {} !important;", self.name, self.value)
        } else {
            format!("{}: {};", self.name, self.value)
        }
    }
}

/// Ordered declaration block, as found inside a style or font-face rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations(pub Vec<Declaration>);

impl Declarations {
    /// Value of the last declaration named `name`, which is the one that applies.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|decl| decl.name.eq_ignore_ascii_case(name))
            .map(|decl| decl.value.as_str())
    }

    /// Overwrites the applying declaration for `name`; returns the previous value.
    pub fn set(&mut self, name: &str, value: &str) -> Option<String> {
        match self
            .0
            .iter_mut()
            .rev()
            .find(|decl| decl.name.eq_ignore_ascii_case(name))
        {
            Some(decl) => Some(std::mem::replace(&mut decl.value, value.to_owned())),
            None => {
                self.0.push(Declaration::new(name, value));
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn css_text(&self) -> String {
        self.0
            .iter()
            .map(Declaration::css_text)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRule {
    /// Reference exactly as written in the source.
    pub href: String,
    pub media: String,
    /// The imported sheet once loaded; `None` when it was never fetched.
    pub sheet: Option<Box<StyleSheet>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub selector: String,
    pub declarations: Declarations,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRule {
    pub condition: String,
    pub rules: Vec<CssRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontFaceRule {
    pub declarations: Declarations,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssRule {
    Import(ImportRule),
    Style(StyleRule),
    Media(MediaRule),
    FontFace(FontFaceRule),
    /// Any other at-rule, kept as normalized source text.
    Other(String),
}

impl ImportRule {
    pub fn css_text(&self) -> String {
        let mut out = format!("@import {}", values::serialize_url(&self.href));
        if !self.media.is_empty() {
            out.push(' ');
            out.push_str(&self.media);
        }
        out.push(';');
        out
    }
}

impl StyleRule {
    pub fn css_text(&self) -> String {
        if self.declarations.is_empty() {
            format!("{} {{ }}", self.selector)
        } else {
            format!("{} {{ {} }}", self.selector, self.declarations.css_text())
        }
    }
}

impl MediaRule {
    pub fn css_text(&self) -> String {
        let inner = self
            .rules
            .iter()
            .map(CssRule::css_text)
            .collect::<Vec<_>>()
            .join(" ");
        format!("@media {} {{ {} }}", self.condition, inner)
    }
}

impl FontFaceRule {
    pub fn css_text(&self) -> String {
        format!("@font-face {{ {} }}", self.declarations.css_text())
    }
}

impl CssRule {
    pub fn css_text(&self) -> String {
        match self {
            Self::Import(rule) => rule.css_text(),
            Self::Style(rule) => rule.css_text(),
            Self::Media(rule) => rule.css_text(),
            Self::FontFace(rule) => rule.css_text(),
            Self::Other(text) => text.clone(),
        }
    }
}

/// A parsed stylesheet. `rules` is `None` when the sheet exists but its rules
/// cannot be read, as with cross-origin sheets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSheet {
    pub href: Option<String>,
    pub rules: Option<Vec<CssRule>>,
}

impl StyleSheet {
    pub fn parse(href: Option<String>, source: &str) -> Self {
        Self {
            href,
            rules: Some(CssParser.parse_rules(source)),
        }
    }

    pub fn inaccessible(href: Option<String>) -> Self {
        Self { href, rules: None }
    }

    pub fn is_accessible(&self) -> bool {
        self.rules.is_some()
    }

    pub fn css_text(&self) -> String {
        self.rules
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(CssRule::css_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::CssRule;
    use super::Declarations;
    use super::StyleSheet;

    #[test]
    fn set_returns_previous_value_for_restoration() {
        let sheet = StyleSheet::parse(None, "a { color: red; color: blue }");
        let Some(rules) = sheet.rules else {
            panic!("sheet should be accessible");
        };
        let CssRule::Style(mut rule) = rules[0].clone() else {
            panic!("expected style rule");
        };
        assert_eq!(rule.declarations.get("color"), Some("blue"));

        let previous = rule.declarations.set("color", "green");
        assert_eq!(previous.as_deref(), Some("blue"));
        assert_eq!(rule.declarations.0[0].value, "red");
        assert_eq!(rule.declarations.get("color"), Some("green"));
    }

    #[test]
    fn serializes_like_css_text() {
        let sheet = StyleSheet::parse(
            None,
            "@import 'base.css' screen; .a{color:red !important} @media print{.b{display:none}}",
        );
        assert_eq!(
            sheet.css_text(),
            "@import url(\"base.css\") screen;\n.a { color: red !important; }\n@media print { .b { display: none; } }"
        );
    }

    #[test]
    fn inaccessible_sheet_serializes_empty() {
        let sheet = StyleSheet::inaccessible(Some("https://cdn.example/x.css".to_owned()));
        assert!(!sheet.is_accessible());
        assert_eq!(sheet.css_text(), "");
        assert!(Declarations::default().is_empty());
    }
}
