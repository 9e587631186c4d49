/*
    conflict.rs - Concurrent edits to the same record

    Without clocks there is no ordering signal between the two sides, so the
    default is to withhold both changes and report the conflict. The record
    keeps diverging from both baselines, which makes the conflict reappear
    every cycle until the two copies are made to agree.
*/

use super::delta::{Change, Delta};
use crate::core_sync::model::RecordId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How to settle a record changed on both sides in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Apply neither change and report the conflict
    #[default]
    Flag,
    /// Left's change wins
    PreferLeft,
    /// Right's change wins
    PreferRight,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::Flag => "flag",
            ConflictStrategy::PreferLeft => "prefer_left",
            ConflictStrategy::PreferRight => "prefer_right",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "flag" => Some(ConflictStrategy::Flag),
            "prefer_left" | "left" => Some(ConflictStrategy::PreferLeft),
            "prefer_right" | "right" => Some(ConflictStrategy::PreferRight),
            _ => None,
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Neither change was applied
    Withheld,
    LeftWins,
    RightWins,
}

/// Both sides changed one record differently
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub identity: RecordId,
    pub left: Change,
    pub right: Change,
    pub resolution: Resolution,
}

/// Find records changed differently on both sides and settle them according
/// to `strategy`, removing withheld or losing changes from the deltas.
/// Identical changes on both sides are left in place.
pub fn resolve_conflicts(
    left: &mut Delta,
    right: &mut Delta,
    strategy: ConflictStrategy,
) -> Vec<Conflict> {
    let contested: Vec<RecordId> = left
        .iter()
        .filter_map(|change| {
            let id = change.identity()?;
            let theirs = right.get(id)?;
            (!change.to_record().identical(&theirs.to_record())).then_some(id)
        })
        .collect();

    let mut conflicts = Vec::with_capacity(contested.len());
    for id in contested {
        let (ours, theirs) = match strategy {
            ConflictStrategy::Flag => (left.take(id), right.take(id)),
            ConflictStrategy::PreferLeft => (left.get(id).cloned(), right.take(id)),
            ConflictStrategy::PreferRight => (left.take(id), right.get(id).cloned()),
        };
        if let (Some(left_change), Some(right_change)) = (ours, theirs) {
            conflicts.push(Conflict {
                identity: id,
                left: left_change,
                right: right_change,
                resolution: match strategy {
                    ConflictStrategy::Flag => Resolution::Withheld,
                    ConflictStrategy::PreferLeft => Resolution::LeftWins,
                    ConflictStrategy::PreferRight => Resolution::RightWins,
                },
            });
        }
    }
    conflicts
}
