use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    Dosage,
    SideEffects,
    Benefits,
    Storage,
    Lifestyle,
    Interactions,
    Cost,
    General,
}

impl QueryCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dosage => "dosage",
            Self::SideEffects => "side_effects",
            Self::Benefits => "benefits",
            Self::Storage => "storage",
            Self::Lifestyle => "lifestyle",
            Self::Interactions => "interactions",
            Self::Cost => "cost",
            Self::General => "general",
        }
    }
}

/// Checked in order; the first category with a matching keyword wins.
const CATEGORY_KEYWORDS: &[(QueryCategory, &[&str])] = &[
    (
        QueryCategory::Dosage,
        &[
            "dose",
            "dosage",
            "how to take",
            "when to take",
            "injection",
            "administration",
        ],
    ),
    (
        QueryCategory::SideEffects,
        &[
            "side effect",
            "adverse",
            "reaction",
            "problem",
            "issues",
            "symptoms",
        ],
    ),
    (
        QueryCategory::Benefits,
        &[
            "benefit",
            "advantage",
            "help",
            "work",
            "effect",
            "weight",
            "glucose",
        ],
    ),
    (
        QueryCategory::Storage,
        &["store", "storage", "keep", "refrigerate", "temperature"],
    ),
    (
        QueryCategory::Lifestyle,
        &["diet", "exercise", "lifestyle", "food", "alcohol", "eating"],
    ),
    (
        QueryCategory::Interactions,
        &["interaction", "drug", "medication", "combine", "mixing"],
    ),
    (
        QueryCategory::Cost,
        &["cost", "price", "insurance", "coverage", "afford"],
    ),
];

pub fn categorize_query(query: &str) -> QueryCategory {
    let normalized = query.to_lowercase();

    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| normalized.contains(keyword)))
        .map(|(category, _)| *category)
        .unwrap_or(QueryCategory::General)
}
