//! # Approval chain
//!
//! The ordered list of reviewer roles an event must pass through. The chain
//! is deployment configuration: the state machine only ever asks it for the
//! role at a given stage, so a three-stage and a four-stage deployment run
//! the same code.
//!
//! | Preset        | Stages                                   |
//! |---------------|------------------------------------------|
//! | `three_stage` | Mentor → Dean → VC                       |
//! | `four_stage`  | Mentor → HOD (budget) → Dean → VC        |
//!
//! Custom chains are written as a comma separated list, with `:budget`
//! marking the stages whose approval also deducts from the department
//! budget, e.g. `Mentor,HOD:budget,Dean,VC`.

use serde::Serialize;

use crate::errors::{DashboardError, Result};

/// One reviewer role and its fixed position in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub label: String,
    pub sequence_index: usize,
    pub has_budget_authority: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleChain {
    stages: Vec<Role>,
}

const BUDGET_MARKER: &str = "budget";

impl RoleChain {
    /// Build a chain from `(label, has_budget_authority)` pairs, in order.
    pub fn new<S: Into<String>>(stages: impl IntoIterator<Item = (S, bool)>) -> Result<Self> {
        let mut built: Vec<Role> = Vec::new();
        for (label, budget) in stages {
            let label = label.into().trim().to_string();
            if label.is_empty() {
                return Err(DashboardError::Config(
                    "approval chain contains an empty role label".to_string(),
                ));
            }
            if built.iter().any(|r| r.label.eq_ignore_ascii_case(&label)) {
                return Err(DashboardError::Config(format!(
                    "approval chain lists role {label} more than once"
                )));
            }
            built.push(Role {
                label,
                sequence_index: built.len(),
                has_budget_authority: budget,
            });
        }
        if built.is_empty() {
            return Err(DashboardError::Config(
                "approval chain must contain at least one role".to_string(),
            ));
        }
        Ok(Self { stages: built })
    }

    pub fn three_stage() -> Self {
        Self {
            stages: vec![
                stage("Mentor", 0, false),
                stage("Dean", 1, false),
                stage("VC", 2, false),
            ],
        }
    }

    pub fn four_stage() -> Self {
        Self {
            stages: vec![
                stage("Mentor", 0, false),
                stage("HOD", 1, true),
                stage("Dean", 2, false),
                stage("VC", 3, false),
            ],
        }
    }

    /// Parse a preset name or a custom `Label[:budget],...` list.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "three_stage" => return Ok(Self::three_stage()),
            "four_stage" => return Ok(Self::four_stage()),
            _ => {}
        }

        let mut stages = Vec::new();
        for entry in value.split(',') {
            let (label, budget) = match entry.split_once(':') {
                Some((label, flag)) if flag.trim().eq_ignore_ascii_case(BUDGET_MARKER) => {
                    (label, true)
                }
                Some((label, flag)) => {
                    return Err(DashboardError::Config(format!(
                        "unknown flag '{}' on role {}",
                        flag.trim(),
                        label.trim()
                    )))
                }
                None => (entry, false),
            };
            stages.push((label.to_string(), budget));
        }
        Self::new(stages)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn stages(&self) -> &[Role] {
        &self.stages
    }

    /// The role that acts at `index`, if the chain is that long.
    pub fn stage(&self, index: usize) -> Option<&Role> {
        self.stages.get(index)
    }

    /// Look a ledger-reported label up in the chain (case-insensitive).
    pub fn role(&self, label: &str) -> Option<&Role> {
        let label = label.trim();
        self.stages
            .iter()
            .find(|r| r.label.eq_ignore_ascii_case(label))
    }

    pub fn has_budget_stage(&self) -> bool {
        self.stages.iter().any(|r| r.has_budget_authority)
    }
}

fn stage(label: &str, sequence_index: usize, has_budget_authority: bool) -> Role {
    Role {
        label: label.to_string(),
        sequence_index,
        has_budget_authority,
    }
}
