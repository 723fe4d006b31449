//! Skill registry — builtin catalogue plus dynamically registered skills
//! with ownership rules.
//!
//! Builtin skills are readable and executable by everyone. A dynamic skill
//! belongs to its author: only the author may read, update, or remove it.

use std::collections::HashMap;

use parking_lot::RwLock;

use ha_domain::{Error, Result};

use crate::builtin::builtin_skills;
use crate::graph::SkillGraph;
use crate::types::SkillDefinition;

#[derive(Debug, Clone)]
pub struct RegisteredSkill {
    pub definition: SkillDefinition,
    pub graph: SkillGraph,
}

pub struct SkillRegistry {
    skills: RwLock<HashMap<String, RegisteredSkill>>,
}

impl SkillRegistry {
    /// Registry seeded with the builtin catalogue.
    pub fn with_builtins() -> Self {
        let mut skills = HashMap::new();
        for (definition, graph) in builtin_skills() {
            skills.insert(definition.id.clone(), RegisteredSkill { definition, graph });
        }
        Self {
            skills: RwLock::new(skills),
        }
    }

    /// Empty registry (tests).
    pub fn empty() -> Self {
        Self {
            skills: RwLock::new(HashMap::new()),
        }
    }

    /// Register a dynamic skill owned by `author`. The host is responsible
    /// for validating dynamic graphs before registration. Builtin ids
    /// cannot be shadowed.
    pub fn register_dynamic(
        &self,
        mut definition: SkillDefinition,
        graph: SkillGraph,
        author: &str,
    ) -> Result<()> {
        let mut skills = self.skills.write();
        if let Some(existing) = skills.get(&definition.id) {
            if existing.definition.is_builtin {
                return Err(Error::InvalidParams(format!(
                    "skill id '{}' is reserved by a builtin skill",
                    definition.id
                )));
            }
            if existing.definition.author != author {
                return Err(Error::InvalidParams(format!(
                    "skill '{}' belongs to another author",
                    definition.id
                )));
            }
        }
        definition.is_builtin = false;
        definition.author = author.to_string();
        skills.insert(
            definition.id.clone(),
            RegisteredSkill { definition, graph },
        );
        Ok(())
    }

    /// Look up a skill for execution: exists, enabled, and visible to the
    /// user.
    pub fn get_for_user(&self, skill_id: &str, user_id: &str) -> Result<RegisteredSkill> {
        let skills = self.skills.read();
        let skill = skills
            .get(skill_id)
            .ok_or_else(|| Error::SkillNotFound(skill_id.to_string()))?;
        if !skill.definition.enabled {
            return Err(Error::SkillNotFound(skill_id.to_string()));
        }
        if !skill.definition.is_builtin && skill.definition.author != user_id {
            // Dynamic skills are private to their author; report not-found
            // rather than leaking existence.
            return Err(Error::SkillNotFound(skill_id.to_string()));
        }
        Ok(skill.clone())
    }

    /// Raw lookup without visibility rules (internal use).
    pub fn get(&self, skill_id: &str) -> Option<RegisteredSkill> {
        self.skills.read().get(skill_id).cloned()
    }

    /// Skills visible to a user: all builtins plus their own dynamics.
    pub fn list_for_user(&self, user_id: &str) -> Vec<SkillDefinition> {
        let mut out: Vec<SkillDefinition> = self
            .skills
            .read()
            .values()
            .filter(|s| s.definition.is_builtin || s.definition.author == user_id)
            .map(|s| s.definition.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Remove a dynamic skill; only the author may do so.
    pub fn remove_dynamic(&self, skill_id: &str, user_id: &str) -> Result<bool> {
        let mut skills = self.skills.write();
        match skills.get(skill_id) {
            None => Ok(false),
            Some(skill) if skill.definition.is_builtin => Err(Error::InvalidParams(
                "builtin skills cannot be removed".into(),
            )),
            Some(skill) if skill.definition.author != user_id => Err(Error::InvalidParams(
                format!("skill '{skill_id}' belongs to another author"),
            )),
            Some(_) => {
                skills.remove(skill_id);
                Ok(true)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.skills.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.read().is_empty()
    }
}
