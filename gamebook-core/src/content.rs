//! Story content: nodes, choices, items and perks, keyed by language.
//!
//! A repository is loaded once at startup from the story JSON and is
//! read-only afterwards. Loading validates every cross reference so that a
//! broken story is rejected up front instead of failing mid-playthrough.

use crate::state::{ItemEntry, ItemKind, Stat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Suffix appended to a choice's target when its stat test fails.
pub const FAIL_SUFFIX: &str = "_fail";

/// The node a failed test leads to.
pub fn fail_target(next: &str) -> String {
    format!("{next}{FAIL_SUFFIX}")
}

/// Errors from loading or querying story content.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown language: {0}")]
    UnknownLanguage(String),

    #[error("Story content for '{language}' has {} broken reference(s); first: {}", .issues.len(), .issues.first().map(ToString::to_string).unwrap_or_default())]
    Invalid {
        language: String,
        issues: Vec<ContentIssue>,
    },
}

/// A single broken reference found while validating a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentIssue {
    MissingStartNode {
        node: String,
    },
    MissingTarget {
        node: String,
        choice: usize,
        target: String,
    },
    MissingFailTarget {
        node: String,
        choice: usize,
        target: String,
    },
    UnknownItem {
        context: String,
        item: String,
    },
    UnknownPerk {
        context: String,
        perk: String,
    },
}

impl fmt::Display for ContentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentIssue::MissingStartNode { node } => write!(f, "start node '{node}' is missing"),
            ContentIssue::MissingTarget {
                node,
                choice,
                target,
            } => write!(f, "node '{node}' choice {choice} leads to missing node '{target}'"),
            ContentIssue::MissingFailTarget {
                node,
                choice,
                target,
            } => write!(
                f,
                "node '{node}' choice {choice} has a test but no failure node '{target}'"
            ),
            ContentIssue::UnknownItem { context, item } => {
                write!(f, "{context} references unknown item '{item}'")
            }
            ContentIssue::UnknownPerk { context, perk } => {
                write!(f, "{context} references unknown perk '{perk}'")
            }
        }
    }
}

/// Display strings of one language bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UiStrings(HashMap<String, String>);

impl UiStrings {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Look up a string, falling back when the bundle does not define it.
    pub fn get_or<'a>(&'a self, key: &str, fallback: &'a str) -> &'a str {
        self.get(key).unwrap_or(fallback)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }
}

/// Preconditions on a choice. Every listed entry must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub perks: Vec<String>,
}

/// State changes declared by a choice or an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Effects {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanity: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

impl Effects {
    pub fn health(amount: i32) -> Self {
        Self {
            health: Some(amount),
            ..Self::default()
        }
    }

    pub fn sanity(amount: i32) -> Self {
        Self {
            sanity: Some(amount),
            ..Self::default()
        }
    }

    pub fn with_item(mut self, item: ItemEntry) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }
}

/// A randomized stat check: two d6 plus the stat against a difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatTest {
    pub stat: Stat,
    pub difficulty: i32,
}

/// An outgoing edge of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
    pub next: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Requirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<Effects>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<StatTest>,
    #[serde(default)]
    pub oneshot: bool,
}

impl Choice {
    pub fn new(text: impl Into<String>, next: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            next: next.into(),
            requirements: None,
            effects: None,
            test: None,
            oneshot: false,
        }
    }

    pub fn with_requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = Some(requirements);
        self
    }

    pub fn with_effects(mut self, effects: Effects) -> Self {
        self.effects = Some(effects);
        self
    }

    pub fn with_test(mut self, stat: Stat, difficulty: i32) -> Self {
        self.test = Some(StatTest { stat, difficulty });
        self
    }

    pub fn oneshot(mut self) -> Self {
        self.oneshot = true;
        self
    }
}

/// A narrative waypoint. `image` and `music` are for the view layer only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// An item definition from the bundle's catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ItemKind,
    #[serde(default)]
    pub usable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<Effects>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perk {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// All content for one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBundle {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub ui: UiStrings,
    pub nodes: HashMap<String, Node>,
    #[serde(default)]
    pub items: HashMap<String, Item>,
    #[serde(default)]
    pub perks: Vec<Perk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<serde_json::Value>,
}

impl ContentBundle {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn perk(&self, id: &str) -> Option<&Perk> {
        self.perks.iter().find(|p| p.id == id)
    }

    /// Display name of a perk, or its id if the bundle does not list it.
    pub fn perk_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.perk(id).map(|p| p.name.as_str()).unwrap_or(id)
    }

    /// Collect every broken reference in this bundle.
    pub fn issues(&self, start_node: &str) -> Vec<ContentIssue> {
        let mut issues = Vec::new();

        if !self.nodes.contains_key(start_node) {
            issues.push(ContentIssue::MissingStartNode {
                node: start_node.to_string(),
            });
        }

        // Sorted so the report is stable between runs.
        let mut node_ids: Vec<&String> = self.nodes.keys().collect();
        node_ids.sort();

        for node_id in node_ids {
            let node = &self.nodes[node_id];
            for (index, choice) in node.choices.iter().enumerate() {
                let context = format!("node '{node_id}' choice {index}");

                if !self.nodes.contains_key(&choice.next) {
                    issues.push(ContentIssue::MissingTarget {
                        node: node_id.clone(),
                        choice: index,
                        target: choice.next.clone(),
                    });
                }

                if choice.test.is_some() {
                    let target = fail_target(&choice.next);
                    if !self.nodes.contains_key(&target) {
                        issues.push(ContentIssue::MissingFailTarget {
                            node: node_id.clone(),
                            choice: index,
                            target,
                        });
                    }
                }

                if let Some(requirements) = &choice.requirements {
                    for item in &requirements.items {
                        self.check_item(&context, item, &mut issues);
                    }
                    for perk in &requirements.perks {
                        if self.perk(perk).is_none() {
                            issues.push(ContentIssue::UnknownPerk {
                                context: context.clone(),
                                perk: perk.clone(),
                            });
                        }
                    }
                }

                if let Some(effects) = &choice.effects {
                    self.check_effect_items(&context, effects, &mut issues);
                }
            }
        }

        let mut item_ids: Vec<&String> = self.items.keys().collect();
        item_ids.sort();
        for item_id in item_ids {
            if let Some(effects) = &self.items[item_id].effects {
                self.check_effect_items(&format!("item '{item_id}'"), effects, &mut issues);
            }
        }

        issues
    }

    fn check_effect_items(&self, context: &str, effects: &Effects, issues: &mut Vec<ContentIssue>) {
        for entry in &effects.items {
            self.check_item(context, &entry.id, issues);
        }
    }

    fn check_item(&self, context: &str, item: &str, issues: &mut Vec<ContentIssue>) {
        if !self.items.contains_key(item) {
            issues.push(ContentIssue::UnknownItem {
                context: context.to_string(),
                item: item.to_string(),
            });
        }
    }
}

/// Language code to content bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRepository {
    bundles: HashMap<String, ContentBundle>,
}

impl ContentRepository {
    /// Parse and validate a story JSON document.
    pub fn from_json(json: &str, start_node: &str) -> Result<Self, ContentError> {
        let repository: Self = serde_json::from_str(json)?;
        repository.validate(start_node)?;
        Ok(repository)
    }

    /// Load and validate a story file.
    pub async fn load(path: impl AsRef<Path>, start_node: &str) -> Result<Self, ContentError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await?;
        let repository = Self::from_json(&content, start_node)?;
        tracing::info!(
            path = %path.display(),
            languages = repository.bundles.len(),
            "Loaded story content"
        );
        Ok(repository)
    }

    /// Build a repository from bundles already in memory, validating them.
    pub fn from_bundles(
        bundles: impl IntoIterator<Item = (String, ContentBundle)>,
        start_node: &str,
    ) -> Result<Self, ContentError> {
        let repository = Self {
            bundles: bundles.into_iter().collect(),
        };
        repository.validate(start_node)?;
        Ok(repository)
    }

    /// Reject the repository if any bundle has a broken reference.
    pub fn validate(&self, start_node: &str) -> Result<(), ContentError> {
        let mut languages: Vec<&String> = self.bundles.keys().collect();
        languages.sort();

        for language in languages {
            let issues = self.bundles[language].issues(start_node);
            if !issues.is_empty() {
                tracing::warn!(
                    language = %language,
                    count = issues.len(),
                    "Story content failed validation"
                );
                return Err(ContentError::Invalid {
                    language: language.clone(),
                    issues,
                });
            }
        }
        Ok(())
    }

    pub fn bundle(&self, language: &str) -> Result<&ContentBundle, ContentError> {
        self.bundles
            .get(language)
            .ok_or_else(|| ContentError::UnknownLanguage(language.to_string()))
    }

    pub fn has_language(&self, language: &str) -> bool {
        self.bundles.contains_key(language)
    }

    /// Available language codes, sorted.
    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.bundles.keys().map(String::as_str).collect();
        languages.sort_unstable();
        languages
    }
}
