//! Per-site cleanup rules applied to the snapshot before flattening.
//!
//! Each hook is data: a URL pattern and an ordered list of selector/action
//! steps. Steps only touch the detached snapshot.

use crate::style_attr::set_inline_property;
use hd_core::HoardError;
use hd_core::HoardResult;
use hd_dom::Document;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookAction {
    Remove,
    /// Overrides one inline style property.
    SetStyle {
        property: &'static str,
        value: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookStep {
    pub selector: &'static str,
    pub action: HookAction,
}

impl HookStep {
    pub const fn remove(selector: &'static str) -> Self {
        Self {
            selector,
            action: HookAction::Remove,
        }
    }

    pub const fn set_style(
        selector: &'static str,
        property: &'static str,
        value: &'static str,
    ) -> Self {
        Self {
            selector,
            action: HookAction::SetStyle { property, value },
        }
    }

    fn apply(&self, doc: &mut Document) -> usize {
        let targets = doc.select(doc.root(), self.selector);
        for node in &targets {
            match &self.action {
                HookAction::Remove => doc.detach(*node),
                HookAction::SetStyle { property, value } => {
                    set_inline_property(doc, *node, property, value);
                }
            }
        }
        targets.len()
    }
}

#[derive(Debug, Clone)]
pub struct SiteHook {
    pub name: String,
    pattern: Regex,
    steps: Vec<HookStep>,
}

impl SiteHook {
    pub fn matches(&self, page_url: &str) -> bool {
        self.pattern.is_match(page_url)
    }
}

/// Ordered table of site hooks.
#[derive(Debug, Clone, Default)]
pub struct SiteHookRegistry {
    hooks: Vec<SiteHook>,
}

const MDN_STEPS: &[HookStep] = &[
    HookStep::remove(".top-navigation-main"),
    HookStep::remove(".article-actions"),
    HookStep::remove(".mdn-cta-container"),
];

const AH_RECIPE_STEPS: &[HookStep] = &[
    HookStep::set_style("#navigation-header > *[class^=header_root_]", "position", "static"),
    HookStep::set_style("#navigation-header > *[class^=header_root_]", "transform", "none"),
    HookStep::remove("#navigation-header > *[class^=header_root_] > *[class^=top-bar_root_]"),
    HookStep::remove("#navigation-header > *[class^=header_placeholder_]"),
    HookStep::remove("button[class^=back-to-top_]"),
    HookStep::remove("button[class^=play-button_root_]"),
];

impl SiteHookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shipped rules for MDN articles and ah.nl recipes.
    pub fn builtin() -> HoardResult<Self> {
        let mut registry = Self::new();
        registry.register(
            "mdn-docs",
            r"^https://developer\.mozilla\.org/.*docs/.*$",
            MDN_STEPS.to_vec(),
        )?;
        registry.register(
            "ah-recipes",
            r"^https://(www\.)?ah\.nl/(allerhande/recept|recepten)/.*$",
            AH_RECIPE_STEPS.to_vec(),
        )?;
        Ok(registry)
    }

    pub fn register(&mut self, name: &str, pattern: &str, steps: Vec<HookStep>) -> HoardResult<()> {
        let pattern = Regex::new(pattern).map_err(|error| {
            HoardError::new(
                "capture.hooks.pattern_invalid",
                format!("hook `{name}` has an invalid pattern: {error}"),
            )
        })?;
        self.hooks.push(SiteHook {
            name: name.to_owned(),
            pattern,
            steps,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every matching hook once, in registration order; returns the names that fired.
    pub fn apply(&self, doc: &mut Document, page_url: &str) -> Vec<String> {
        let mut fired = Vec::new();
        for hook in self.hooks.iter().filter(|hook| hook.matches(page_url)) {
            let touched: usize = hook.steps.iter().map(|step| step.apply(doc)).sum();
            tracing::debug!(hook = %hook.name, touched, "site hook applied");
            fired.push(hook.name.clone());
        }
        fired
    }
}
