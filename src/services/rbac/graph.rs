//! Breadth-first walk over the role inheritance relation.
//!
//! Every discovered name gets a stable arena index and a visited bit, so a
//! cyclic hierarchy still terminates.
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub struct RoleWalk {
    names: Vec<String>,
    index: HashMap<String, usize>,
    visited: Vec<bool>,
    queue: VecDeque<usize>,
}

impl RoleWalk {
    pub fn new<I, S>(starts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut walk = Self::default();
        walk.extend(starts);
        walk
    }

    fn intern(&mut self, name: String) -> usize {
        if let Some(&idx) = self.index.get(&name) {
            return idx;
        }
        let idx = self.names.len();
        self.index.insert(name.clone(), idx);
        self.names.push(name);
        self.visited.push(false);
        idx
    }

    /// Queue names that have not been seen yet.
    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let idx = self.intern(name.into());
            if !self.visited[idx] {
                self.visited[idx] = true;
                self.queue.push_back(idx);
            }
        }
    }

    /// Next name whose parents still need to be looked up.
    pub fn next_pending(&mut self) -> Option<String> {
        self.queue.pop_front().map(|idx| self.names[idx].clone())
    }

    /// Every name reached, in discovery order.
    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}
