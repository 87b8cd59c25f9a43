//! Classes hierarchy graph representation.
//!
//! The hierarchy is a DAG (interfaces multi-inherit) built once by the
//! repository and only queried afterwards, so nodes store no
//! back-edges; traversals go through petgraph visitors.

use crate::errors::{AnalysisError, AnalysisResult};
use crate::repo::ClassUid;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub enum Inheritance {
    Extends,
    Implements,
}

impl fmt::Display for Inheritance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Extends => write!(f, "<extends>"),
            Self::Implements => write!(f, "<implements>"),
        }
    }
}

#[derive(Debug)]
pub struct Hierarchy {
    inner: DiGraph<ClassUid, Inheritance>,
    node_ids: BTreeMap<String, NodeIndex>,
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl Hierarchy {
    pub(crate) fn new() -> Self {
        Self {
            inner: DiGraph::new(),
            node_ids: BTreeMap::new(),
        }
    }

    pub(crate) fn insert_class(&mut self, name: &str, uid: ClassUid) -> AnalysisResult<()> {
        if self.node_ids.contains_key(name) {
            return Err(AnalysisError::Internal(
                "duplicate object in hierarchy graph".to_string(),
            ));
        }
        let id = self.inner.add_node(uid);
        self.node_ids.insert(name.to_string(), id);
        Ok(())
    }

    pub(crate) fn contains_class(&self, class_name: &str) -> bool {
        self.node_ids.contains_key(class_name)
    }

    #[must_use]
    pub(crate) fn get_uid(&self, class_name: &str) -> Option<ClassUid> {
        self.node_ids.get(class_name).map(|id| self.inner[*id])
    }

    pub(crate) fn insert_extends(&mut self, class: &str, superclass: &str) -> AnalysisResult<()> {
        self.insert_link(class, superclass, Inheritance::Extends)
    }

    pub(crate) fn insert_implements(&mut self, class: &str, interface: &str) -> AnalysisResult<()> {
        self.insert_link(class, interface, Inheritance::Implements)
    }

    fn insert_link(&mut self, from: &str, to: &str, link: Inheritance) -> AnalysisResult<()> {
        let src = self
            .node_ids
            .get(from)
            .ok_or_else(|| AnalysisError::ClassNotFound(from.to_string()))?;
        let dst = self
            .node_ids
            .get(to)
            .ok_or_else(|| AnalysisError::ClassNotFound(to.to_string()))?;
        self.inner.add_edge(*src, *dst, link);
        Ok(())
    }

    /// Class names that inherit from nothing yet (no outgoing edge).
    pub(crate) fn orphans(&self) -> Vec<String> {
        self.node_ids
            .iter()
            .filter(|(_, id)| {
                self.inner
                    .edges_directed(**id, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// All supertypes of the class, along both inheritance kinds,
    /// including the class itself.
    pub(crate) fn all_parents(&self, class_name: &str) -> AnalysisResult<Vec<ClassUid>> {
        let id = self
            .node_ids
            .get(class_name)
            .ok_or_else(|| AnalysisError::ClassNotFound(class_name.to_string()))?;
        let mut parents = Vec::new();
        let mut dfs = Dfs::new(&self.inner, *id);
        while let Some(id) = dfs.next(&self.inner) {
            parents.push(self.inner[id]);
        }
        Ok(parents)
    }

    /// All subtypes of the class, including the class itself.
    pub(crate) fn all_children(&self, class_name: &str) -> AnalysisResult<Vec<ClassUid>> {
        let id = self
            .node_ids
            .get(class_name)
            .ok_or_else(|| AnalysisError::ClassNotFound(class_name.to_string()))?;
        let reversed = Reversed(&self.inner);
        let mut children = Vec::new();
        let mut dfs = Dfs::new(reversed, *id);
        while let Some(id) = dfs.next(reversed) {
            children.push(self.inner[id]);
        }
        Ok(children)
    }
}
