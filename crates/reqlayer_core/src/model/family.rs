//! Reference-tagged entity families.
//!
//! # Responsibility
//! - Name every entity kind that owns a reference-id counter.
//! - Describe each family's prefix, coordination key and storage names.
//!
//! # Invariants
//! - Prefixes, coordination keys and counter names are unique per family.
//! - Coordination keys live in the reserved block
//!   `COORD_KEY_BLOCK_START..=COORD_KEY_BLOCK_END`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// First coordination key reserved for reference allocation.
pub const COORD_KEY_BLOCK_START: i64 = 2_147_483_642;
/// Last coordination key reserved for reference allocation.
pub const COORD_KEY_BLOCK_END: i64 = 2_147_483_647;

/// Entity kind whose reference ids share one prefix and one counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyTag {
    Epic,
    UserStory,
    Requirement,
    AcceptanceCriteria,
    SteeringDocument,
    Prompt,
}

impl FamilyTag {
    pub const ALL: [FamilyTag; 6] = [
        FamilyTag::Epic,
        FamilyTag::UserStory,
        FamilyTag::Requirement,
        FamilyTag::AcceptanceCriteria,
        FamilyTag::SteeringDocument,
        FamilyTag::Prompt,
    ];

    /// Upper-case prefix rendered before the `-` separator.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Epic => "EP",
            Self::UserStory => "US",
            Self::Requirement => "REQ",
            Self::AcceptanceCriteria => "AC",
            Self::SteeringDocument => "STD",
            Self::Prompt => "PROMPT",
        }
    }

    /// Exact, case-sensitive prefix lookup.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.prefix() == prefix)
    }
}

impl Display for FamilyTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Static description of one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Family {
    pub tag: FamilyTag,
    pub prefix: &'static str,
    /// Key of the cooperative lock serializing this family's allocations.
    pub coord_key: i64,
    /// Row name in `ref_sequences`.
    pub counter_name: &'static str,
    /// Record table holding this family's entities.
    pub table: &'static str,
}

/// Families registered at startup.
pub const BUILTIN_FAMILIES: [Family; 6] = [
    Family {
        tag: FamilyTag::Epic,
        prefix: "EP",
        coord_key: 2_147_483_647,
        counter_name: "epic_ref_seq",
        table: "epics",
    },
    Family {
        tag: FamilyTag::UserStory,
        prefix: "US",
        coord_key: 2_147_483_646,
        counter_name: "user_story_ref_seq",
        table: "user_stories",
    },
    Family {
        tag: FamilyTag::Requirement,
        prefix: "REQ",
        coord_key: 2_147_483_645,
        counter_name: "requirement_ref_seq",
        table: "requirements",
    },
    Family {
        tag: FamilyTag::AcceptanceCriteria,
        prefix: "AC",
        coord_key: 2_147_483_644,
        counter_name: "acceptance_criteria_ref_seq",
        table: "acceptance_criteria",
    },
    Family {
        tag: FamilyTag::SteeringDocument,
        prefix: "STD",
        coord_key: 2_147_483_643,
        counter_name: "steering_document_ref_seq",
        table: "steering_documents",
    },
    Family {
        tag: FamilyTag::Prompt,
        prefix: "PROMPT",
        coord_key: 2_147_483_642,
        counter_name: "prompt_ref_seq",
        table: "prompts",
    },
];
