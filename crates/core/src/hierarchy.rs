//! Validation hierarchy resolution.
//!
//! A note is validated by an ordered chain of approvers derived from its
//! department. The default policy has two levels:
//!
//! 1. the head of the note's department (skipped when none is configured);
//! 2. the executive director.
//!
//! The chain is never stored; it is recomputed from the [`Directory`]
//! whenever the state machine needs to pick the next approver.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{define_text_enum, DbId};

define_text_enum! {
    /// The organisational role an approver holds at a chain level.
    ApproverRole {
        DepartmentHead = "DEPARTMENT_HEAD",
        ExecutiveDirector = "EXECUTIVE_DIRECTOR",
    }
}

/// Identity-provider lookups required by the resolver.
pub trait Directory: Send + Sync {
    /// The user heading `department`, if one is configured.
    fn department_head(&self, department: &str) -> Option<DbId>;

    /// The user holding the executive director role, if any.
    fn executive_director(&self) -> Option<DbId>;
}

/// A single level of a [`ValidationChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLevel {
    /// 1-based level number.
    pub level: u8,
    pub role: ApproverRole,
    pub approver_id: DbId,
}

/// Ordered list of required approvers for a note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationChain {
    levels: Vec<ChainLevel>,
}

impl ValidationChain {
    pub fn levels(&self) -> &[ChainLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Approver at the given 0-based step.
    pub fn approver_at(&self, step: usize) -> Option<DbId> {
        self.levels.get(step).map(|l| l.approver_id)
    }

    /// 0-based step at which `user_id` approves, if they are in the chain.
    pub fn position_of(&self, user_id: DbId) -> Option<usize> {
        self.levels.iter().position(|l| l.approver_id == user_id)
    }

    /// Whether `step` is the last level of the chain.
    pub fn is_last(&self, step: usize) -> bool {
        step + 1 >= self.levels.len()
    }

    fn push(&mut self, role: ApproverRole, approver_id: DbId) {
        // A user holding both roles approves once.
        if self.levels.iter().any(|l| l.approver_id == approver_id) {
            return;
        }
        let level = self.levels.len() as u8 + 1;
        self.levels.push(ChainLevel {
            level,
            role,
            approver_id,
        });
    }
}

/// Compute the validation chain for a note belonging to `department`.
///
/// Returns [`CoreError::EmptyChain`] when no level can be resolved.
pub fn resolve(department: &str, directory: &dyn Directory) -> Result<ValidationChain, CoreError> {
    let mut chain = ValidationChain::default();

    if let Some(head) = directory.department_head(department) {
        chain.push(ApproverRole::DepartmentHead, head);
    }
    if let Some(director) = directory.executive_director() {
        chain.push(ApproverRole::ExecutiveDirector, director);
    }

    if chain.is_empty() {
        return Err(CoreError::EmptyChain(format!(
            "no department head for '{department}' and no executive director configured"
        )));
    }
    Ok(chain)
}

// ---------------------------------------------------------------------------
// StaticDirectory
// ---------------------------------------------------------------------------

/// A [`Directory`] backed by configuration-supplied mappings.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    department_heads: HashMap<String, DbId>,
    executive_director: Option<DbId>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_department_head(mut self, department: impl Into<String>, user_id: DbId) -> Self {
        self.department_heads.insert(department.into(), user_id);
        self
    }

    pub fn with_executive_director(mut self, user_id: DbId) -> Self {
        self.executive_director = Some(user_id);
        self
    }

    /// Parse a `dept=user_id` comma-separated list, e.g. `tech=12,hr=14`.
    pub fn parse_department_heads(list: &str) -> Result<HashMap<String, DbId>, CoreError> {
        let mut heads = HashMap::new();
        for pair in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (dept, id) = pair.split_once('=').ok_or_else(|| {
                CoreError::Validation(format!("Invalid department head entry '{pair}'"))
            })?;
            let id: DbId = id.trim().parse().map_err(|_| {
                CoreError::Validation(format!("Invalid user id in department head entry '{pair}'"))
            })?;
            heads.insert(dept.trim().to_string(), id);
        }
        Ok(heads)
    }

    pub fn from_parts(department_heads: HashMap<String, DbId>, executive_director: Option<DbId>) -> Self {
        Self {
            department_heads,
            executive_director,
        }
    }
}

impl Directory for StaticDirectory {
    fn department_head(&self, department: &str) -> Option<DbId> {
        self.department_heads.get(department).copied()
    }

    fn executive_director(&self) -> Option<DbId> {
        self.executive_director
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn directory() -> StaticDirectory {
        StaticDirectory::new()
            .with_department_head("tech", 10)
            .with_executive_director(1)
    }

    #[test]
    fn two_level_chain_for_department_with_head() {
        let chain = resolve("tech", &directory()).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.levels()[0].role, ApproverRole::DepartmentHead);
        assert_eq!(chain.approver_at(0), Some(10));
        assert_eq!(chain.levels()[1].role, ApproverRole::ExecutiveDirector);
        assert_eq!(chain.approver_at(1), Some(1));
        assert_eq!(chain.levels()[1].level, 2);
    }

    #[test]
    fn missing_head_degrades_to_director_only() {
        let chain = resolve("finance", &directory()).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.levels()[0].role, ApproverRole::ExecutiveDirector);
        assert_eq!(chain.levels()[0].level, 1);
    }

    #[test]
    fn head_only_when_no_director() {
        let dir = StaticDirectory::new().with_department_head("tech", 10);
        let chain = resolve("tech", &dir).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.approver_at(0), Some(10));
    }

    #[test]
    fn nothing_configured_is_empty_chain() {
        assert_matches!(
            resolve("tech", &StaticDirectory::new()),
            Err(CoreError::EmptyChain(_))
        );
    }

    #[test]
    fn head_who_is_also_director_approves_once() {
        let dir = StaticDirectory::new()
            .with_department_head("exec", 1)
            .with_executive_director(1);
        let chain = resolve("exec", &dir).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(chain.is_last(0));
    }

    #[test]
    fn resolve_is_deterministic() {
        assert_eq!(resolve("tech", &directory()).unwrap(), resolve("tech", &directory()).unwrap());
    }

    #[test]
    fn position_and_last_level() {
        let chain = resolve("tech", &directory()).unwrap();
        assert_eq!(chain.position_of(10), Some(0));
        assert_eq!(chain.position_of(1), Some(1));
        assert_eq!(chain.position_of(99), None);
        assert!(!chain.is_last(0));
        assert!(chain.is_last(1));
    }

    #[test]
    fn parse_department_heads_list() {
        let heads = StaticDirectory::parse_department_heads("tech=12, hr = 14,").unwrap();
        assert_eq!(heads.get("tech"), Some(&12));
        assert_eq!(heads.get("hr"), Some(&14));
    }

    #[test]
    fn parse_department_heads_rejects_garbage() {
        assert!(StaticDirectory::parse_department_heads("tech").is_err());
        assert!(StaticDirectory::parse_department_heads("tech=abc").is_err());
    }
}
