//! Selector engine covering type, id, class and attribute selectors joined by
//! descendant or child combinators. Pseudo-classes and sibling combinators are
//! rejected at parse time so they never match by accident.

use crate::Document;
use crate::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOperator {
    Exists,
    Equals,
    Prefix,
    Suffix,
    Contains,
    Word,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    pub name: String,
    pub operator: AttrOperator,
    pub value: String,
}

impl AttrSelector {
    fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };

        match self.operator {
            AttrOperator::Exists => true,
            AttrOperator::Equals => actual == self.value,
            AttrOperator::Prefix => !self.value.is_empty() && actual.starts_with(&self.value),
            AttrOperator::Suffix => !self.value.is_empty() && actual.ends_with(&self.value),
            AttrOperator::Contains => !self.value.is_empty() && actual.contains(&self.value),
            AttrOperator::Word => actual
                .split_ascii_whitespace()
                .any(|word| word == self.value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundSelector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrSelector>,
}

impl CompoundSelector {
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(tag) = doc.tag(node) else {
            return false;
        };

        if let Some(expected) = &self.tag {
            if !tag.eq_ignore_ascii_case(expected) {
                return false;
            }
        }

        if let Some(id) = &self.id {
            if doc.attr(node, "id") != Some(id.as_str()) {
                return false;
            }
        }

        if !self.classes.is_empty() {
            let classes = doc.attr(node, "class").unwrap_or_default();
            for class_name in &self.classes {
                if !classes
                    .split_ascii_whitespace()
                    .any(|candidate| candidate == class_name)
                {
                    return false;
                }
            }
        }

        self.attrs
            .iter()
            .all(|attr| attr.matches(doc.attr(node, &attr.name)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectorSegment {
    compound: CompoundSelector,
    combinator_to_next: Option<Combinator>,
}

/// Complex selector stored right-to-left, subject first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    segments: Vec<SelectorSegment>,
}

impl Selector {
    pub fn parse(input: &str) -> Option<Self> {
        parse_selector(input)
    }

    /// The rightmost compound, which the matched element itself must satisfy.
    pub fn subject(&self) -> Option<&CompoundSelector> {
        self.segments.first().map(|segment| &segment.compound)
    }

    pub fn is_simple(&self) -> bool {
        self.segments.len() == 1
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(first) = self.segments.first() else {
            return false;
        };
        if !first.compound.matches(doc, node) {
            return false;
        }

        let mut current = node;
        for index in 0..self.segments.len().saturating_sub(1) {
            let combinator = self.segments[index]
                .combinator_to_next
                .unwrap_or(Combinator::Descendant);
            let next = &self.segments[index + 1].compound;

            match combinator {
                Combinator::Child => {
                    let Some(parent) = doc.parent_element(current) else {
                        return false;
                    };
                    if !next.matches(doc, parent) {
                        return false;
                    }
                    current = parent;
                }
                Combinator::Descendant => {
                    let mut search = doc.parent_element(current);
                    let mut found = None;
                    while let Some(candidate) = search {
                        if next.matches(doc, candidate) {
                            found = Some(candidate);
                            break;
                        }
                        search = doc.parent_element(candidate);
                    }
                    let Some(found) = found else {
                        return false;
                    };
                    current = found;
                }
            }
        }

        true
    }
}

/// Comma separated group of selectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    selectors: Vec<Selector>,
}

impl SelectorList {
    /// Returns `None` when any member of the group uses unsupported syntax.
    pub fn parse(input: &str) -> Option<Self> {
        let mut selectors = Vec::new();
        for part in split_selector_group(input) {
            selectors.push(parse_selector(&part)?);
        }

        if selectors.is_empty() {
            None
        } else {
            Some(Self { selectors })
        }
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.selectors
            .iter()
            .any(|selector| selector.matches(doc, node))
    }
}

fn split_selector_group(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut bracket_depth = 0_u32;

    for ch in input.chars() {
        if let Some(open) = quote {
            current.push(ch);
            if ch == open {
                quote = None;
            }
            continue;
        }

        match ch {
            '\'' | '"' if bracket_depth > 0 => {
                quote = Some(ch);
                current.push(ch);
            }
            '[' => {
                bracket_depth = bracket_depth.saturating_add(1);
                current.push(ch);
            }
            ']' => {
                bracket_depth = bracket_depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if bracket_depth == 0 => {
                parts.push(current.trim().to_owned());
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current.trim().to_owned());
    }
    parts
}

fn parse_selector(input: &str) -> Option<Selector> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let bytes = trimmed.as_bytes();
    let mut idx = 0_usize;
    let mut quote: Option<u8> = None;
    let mut bracket_depth = 0_u32;
    let mut pending_descendant = false;
    let mut compound = String::new();
    let mut compounds = Vec::new();
    let mut combinators = Vec::new();

    while idx < bytes.len() {
        let byte = bytes[idx];

        if let Some(open) = quote {
            compound.push(byte as char);
            if byte == open {
                quote = None;
            }
            idx = idx.saturating_add(1);
            continue;
        }

        if bracket_depth > 0 {
            compound.push(byte as char);
            match byte {
                b'\'' | b'"' => quote = Some(byte),
                b']' => bracket_depth = bracket_depth.saturating_sub(1),
                _ => {}
            }
            idx = idx.saturating_add(1);
            continue;
        }

        match byte {
            b'[' => {
                if pending_descendant {
                    combinators.push(Combinator::Descendant);
                    pending_descendant = false;
                }
                compound.push(byte as char);
                bracket_depth = bracket_depth.saturating_add(1);
            }
            b'>' => {
                let current = compound.trim();
                if !current.is_empty() {
                    compounds.push(current.to_owned());
                    compound.clear();
                } else if compounds.is_empty() {
                    return None;
                }
                pending_descendant = false;
                combinators.push(Combinator::Child);
            }
            b'+' | b'~' | b':' | b'(' => return None,
            _ if byte.is_ascii_whitespace() => {
                let current = compound.trim();
                if !current.is_empty() {
                    compounds.push(current.to_owned());
                    compound.clear();
                    pending_descendant = true;
                } else if !compounds.is_empty() && combinators.len() < compounds.len() {
                    pending_descendant = true;
                }
            }
            _ => {
                if pending_descendant {
                    combinators.push(Combinator::Descendant);
                    pending_descendant = false;
                }
                compound.push(byte as char);
            }
        }

        idx = idx.saturating_add(1);
    }

    let tail = compound.trim();
    if !tail.is_empty() {
        compounds.push(tail.to_owned());
    }

    if compounds.is_empty() || combinators.len() + 1 != compounds.len() {
        return None;
    }

    let mut left_to_right = Vec::with_capacity(compounds.len());
    for raw in &compounds {
        left_to_right.push(parse_compound(raw)?);
    }

    let mut segments = Vec::with_capacity(left_to_right.len());
    for index in (0..left_to_right.len()).rev() {
        let combinator_to_next = if index == 0 {
            None
        } else {
            combinators.get(index - 1).copied()
        };
        segments.push(SelectorSegment {
            compound: left_to_right[index].clone(),
            combinator_to_next,
        });
    }

    Some(Selector { segments })
}

fn parse_compound(input: &str) -> Option<CompoundSelector> {
    let mut selector = CompoundSelector::default();
    let bytes = input.as_bytes();
    let mut idx = 0_usize;
    let mut universal = false;

    if bytes.first() == Some(&b'*') {
        universal = true;
        idx = 1;
    } else if bytes.first().is_some_and(u8::is_ascii_alphabetic) {
        let start = idx;
        while idx < bytes.len() && is_ident_char(bytes[idx]) {
            idx = idx.saturating_add(1);
        }
        selector.tag = Some(input[start..idx].to_ascii_lowercase());
    }

    while idx < bytes.len() {
        let marker = bytes[idx];
        idx = idx.saturating_add(1);
        match marker {
            b'#' | b'.' => {
                let start = idx;
                while idx < bytes.len() && is_ident_char(bytes[idx]) {
                    idx = idx.saturating_add(1);
                }
                if start == idx {
                    return None;
                }
                let value = input[start..idx].to_owned();
                if marker == b'#' {
                    if selector.id.is_some() {
                        return None;
                    }
                    selector.id = Some(value);
                } else {
                    selector.classes.push(value);
                }
            }
            b'[' => {
                let end = find_attr_end(bytes, idx);
                selector.attrs.push(parse_attr_selector(&input[idx..end])?);
                idx = end.saturating_add(1);
            }
            _ => return None,
        }
    }

    let empty = selector.tag.is_none()
        && selector.id.is_none()
        && selector.classes.is_empty()
        && selector.attrs.is_empty();
    if empty && !universal {
        None
    } else {
        Some(selector)
    }
}

/// Index of the closing `]`, or the input length when the bracket is never closed.
fn find_attr_end(bytes: &[u8], start: usize) -> usize {
    let mut idx = start;
    let mut quote: Option<u8> = None;
    while idx < bytes.len() {
        let byte = bytes[idx];
        match quote {
            Some(open) if byte == open => quote = None,
            Some(_) => {}
            None if byte == b'\'' || byte == b'"' => quote = Some(byte),
            None if byte == b']' => return idx,
            None => {}
        }
        idx = idx.saturating_add(1);
    }
    bytes.len()
}

fn parse_attr_selector(input: &str) -> Option<AttrSelector> {
    let body = input.trim();
    let name_end = body
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == ':'))
        .unwrap_or(body.len());
    let name = body[..name_end].to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }

    let rest = body[name_end..].trim_start();
    if rest.is_empty() {
        return Some(AttrSelector {
            name,
            operator: AttrOperator::Exists,
            value: String::new(),
        });
    }

    let (operator, raw_value) = if let Some(value) = rest.strip_prefix("^=") {
        (AttrOperator::Prefix, value)
    } else if let Some(value) = rest.strip_prefix("$=") {
        (AttrOperator::Suffix, value)
    } else if let Some(value) = rest.strip_prefix("*=") {
        (AttrOperator::Contains, value)
    } else if let Some(value) = rest.strip_prefix("~=") {
        (AttrOperator::Word, value)
    } else if let Some(value) = rest.strip_prefix('=') {
        (AttrOperator::Equals, value)
    } else {
        return None;
    };

    Some(AttrSelector {
        name,
        operator,
        value: unquote(raw_value.trim()),
    })
}

fn unquote(raw: &str) -> String {
    for quote in ['"', '\''] {
        if let Some(inner) = raw.strip_prefix(quote) {
            return match inner.find(quote) {
                Some(end) => inner[..end].to_owned(),
                None => inner.to_owned(),
            };
        }
    }

    // Unquoted values may carry a trailing case flag (`[a=b i]`).
    raw.split_ascii_whitespace()
        .next()
        .unwrap_or_default()
        .to_owned()
}

fn is_ident_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_'
}
