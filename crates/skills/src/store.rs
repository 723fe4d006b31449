//! Skill execution records — JSONL persistence plus a bounded in-memory
//! ring for fast queries.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::types::SkillExecution;

const MAX_EXECUTIONS_IN_MEMORY: usize = 1000;

pub struct ExecutionStore {
    inner: RwLock<StoreInner>,
    log_path: PathBuf,
}

struct StoreInner {
    executions: VecDeque<SkillExecution>,
    index: HashMap<Uuid, usize>,
    base_seq: usize,
}

impl StoreInner {
    fn new(executions: VecDeque<SkillExecution>) -> Self {
        let mut index = HashMap::with_capacity(executions.len());
        for (i, exec) in executions.iter().enumerate() {
            index.insert(exec.id, i);
        }
        Self {
            executions,
            index,
            base_seq: 0,
        }
    }

    fn get_mut(&mut self, id: &Uuid) -> Option<&mut SkillExecution> {
        let seq = *self.index.get(id)?;
        let idx = seq - self.base_seq;
        self.executions.get_mut(idx)
    }

    fn get(&self, id: &Uuid) -> Option<&SkillExecution> {
        let seq = *self.index.get(id)?;
        let idx = seq - self.base_seq;
        self.executions.get(idx)
    }

    fn push_back(&mut self, exec: SkillExecution) {
        let seq = self.base_seq + self.executions.len();
        self.index.insert(exec.id, seq);
        self.executions.push_back(exec);
    }

    fn pop_front(&mut self) {
        if let Some(exec) = self.executions.pop_front() {
            self.index.remove(&exec.id);
            self.base_seq += 1;
        }
    }
}

impl ExecutionStore {
    /// Create a store, loading recent records from the JSONL log.
    pub fn new(state_path: &Path) -> Self {
        let dir = state_path.join("skills");
        std::fs::create_dir_all(&dir).ok();
        let log_path = dir.join("executions.jsonl");

        let mut executions = VecDeque::new();
        if let Ok(content) = std::fs::read_to_string(&log_path) {
            let lines: Vec<&str> = content.lines().collect();
            for line in lines.iter().rev().take(MAX_EXECUTIONS_IN_MEMORY) {
                if let Ok(exec) = serde_json::from_str::<SkillExecution>(line) {
                    executions.push_front(exec);
                }
            }
        }

        Self {
            inner: RwLock::new(StoreInner::new(executions)),
            log_path,
        }
    }

    /// Insert a new execution record. Returns its id.
    pub fn insert(&self, exec: SkillExecution) -> Uuid {
        let id = exec.id;
        let mut inner = self.inner.write();
        inner.push_back(exec);
        if inner.executions.len() > MAX_EXECUTIONS_IN_MEMORY {
            inner.pop_front();
        }
        id
    }

    /// Update a record in place. Returns true if found.
    pub fn update<F>(&self, id: &Uuid, f: F) -> bool
    where
        F: FnOnce(&mut SkillExecution),
    {
        let mut inner = self.inner.write();
        if let Some(exec) = inner.get_mut(id) {
            f(exec);
            return true;
        }
        false
    }

    pub fn get(&self, id: &Uuid) -> Option<SkillExecution> {
        self.inner.read().get(id).cloned()
    }

    /// Append a terminal record to the JSONL log.
    pub fn persist(&self, exec: &SkillExecution) {
        if let Ok(json) = serde_json::to_string(exec) {
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)
            {
                let _ = writeln!(file, "{json}");
            }
        }
    }

    /// Recent executions for a user, newest first.
    pub fn list_for_user(
        &self,
        user_id: &str,
        skill_id: Option<&str>,
        limit: usize,
    ) -> Vec<SkillExecution> {
        let inner = self.inner.read();
        inner
            .executions
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .filter(|e| skill_id.map_or(true, |s| e.skill_id == s))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exec_for(user: &str, skill: &str) -> SkillExecution {
        SkillExecution::start(skill, user, None, json!({}))
    }

    #[test]
    fn insert_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExecutionStore::new(dir.path());

        let exec = exec_for("u1", "web_research");
        let id = store.insert(exec);
        assert_eq!(store.get(&id).unwrap().skill_id, "web_research");
    }

    #[test]
    fn update_marks_completion() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExecutionStore::new(dir.path());

        let id = store.insert(exec_for("u1", "data_viz"));
        let found = store.update(&id, |e| e.finish_success(json!({"ok": true})));
        assert!(found);
        let exec = store.get(&id).unwrap();
        assert_eq!(exec.status, crate::types::ExecutionStatus::Completed);
    }

    #[test]
    fn persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExecutionStore::new(dir.path());

        let mut exec = exec_for("u1", "web_research");
        exec.finish_success(json!({"report": "x"}));
        let id = exec.id;
        store.insert(exec.clone());
        store.persist(&exec);

        let store2 = ExecutionStore::new(dir.path());
        assert_eq!(store2.get(&id).unwrap().skill_id, "web_research");
    }

    #[test]
    fn list_filters_by_user_and_skill() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExecutionStore::new(dir.path());

        store.insert(exec_for("alice", "web_research"));
        store.insert(exec_for("alice", "data_viz"));
        store.insert(exec_for("bob", "web_research"));

        assert_eq!(store.list_for_user("alice", None, 10).len(), 2);
        assert_eq!(store.list_for_user("alice", Some("data_viz"), 10).len(), 1);
        assert_eq!(store.list_for_user("bob", None, 10).len(), 1);
        assert_eq!(store.list_for_user("carol", None, 10).len(), 0);
    }

    #[test]
    fn ring_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExecutionStore::new(dir.path());

        for _ in 0..(MAX_EXECUTIONS_IN_MEMORY + 5) {
            store.insert(exec_for("u", "s"));
        }
        assert_eq!(
            store.list_for_user("u", None, usize::MAX).len(),
            MAX_EXECUTIONS_IN_MEMORY
        );
    }
}
