//! Declarative dependency graph for the cascade.
//!
//! The graph is a list of [`DependencyEdge`]s rooted at the event collection.
//! [`CascadeGraph::new`] validates the edges and builds one [`Branch`] tree per
//! Level-1 collection; the engine walks those trees children-first. Adding a
//! dependent collection is a change to [`CascadeGraph::standard`], not to the
//! engine.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::gateway::{is_identifier, FieldUpdate, FieldValue, ID_FIELD};

/// `child.foreign_key` references `parent.id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub child: String,
    pub parent: String,
    pub foreign_key: String,
}

impl DependencyEdge {
    pub fn new(child: &str, parent: &str, foreign_key: &str) -> Self {
        Self {
            child: child.to_string(),
            parent: parent.to_string(),
            foreign_key: foreign_key.to_string(),
        }
    }
}

/// One collection and everything that references it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub collection: String,
    /// Column on `collection` that references its parent.
    pub foreign_key: String,
    pub children: Vec<Branch>,
}

impl Branch {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Collections of this subtree, children before parents.
    pub fn deletion_order(&self) -> Vec<&str> {
        let mut order = Vec::new();
        self.push_post_order(&mut order);
        order
    }

    fn push_post_order<'a>(&'a self, out: &mut Vec<&'a str>) {
        for child in &self.children {
            child.push_post_order(out);
        }
        out.push(&self.collection);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("{0:?} is not a valid collection or field name")]
    InvalidName(String),

    #[error("collection {0} has more than one parent edge")]
    DuplicateChild(String),

    #[error("root collection {0} cannot be a child")]
    RootAsChild(String),

    #[error("collections not reachable from the root (cycle or unknown parent): {0:?}")]
    Unreachable(Vec<String>),

    #[error("root collection has no reset fields")]
    NoResetFields,
}

#[derive(Debug, Clone)]
pub struct CascadeGraph {
    root: String,
    reset_fields: Vec<FieldUpdate>,
    branches: Vec<Branch>,
}

impl CascadeGraph {
    /// Validate `edges` and build the branch trees. Branch and child order follow
    /// the order of `edges`.
    pub fn new(
        root: &str,
        edges: Vec<DependencyEdge>,
        reset_fields: Vec<FieldUpdate>,
    ) -> Result<Self, GraphError> {
        if !is_identifier(root) {
            return Err(GraphError::InvalidName(root.to_string()));
        }
        if reset_fields.is_empty() {
            return Err(GraphError::NoResetFields);
        }
        for f in &reset_fields {
            if !is_identifier(&f.field) {
                return Err(GraphError::InvalidName(f.field.clone()));
            }
        }

        let mut seen = HashSet::new();
        for edge in &edges {
            for name in [&edge.child, &edge.parent, &edge.foreign_key] {
                if !is_identifier(name) {
                    return Err(GraphError::InvalidName(name.clone()));
                }
            }
            if edge.child == root {
                return Err(GraphError::RootAsChild(root.to_string()));
            }
            if !seen.insert(edge.child.as_str()) {
                return Err(GraphError::DuplicateChild(edge.child.clone()));
            }
        }

        let mut by_parent: HashMap<&str, Vec<&DependencyEdge>> = HashMap::new();
        for edge in &edges {
            by_parent.entry(edge.parent.as_str()).or_default().push(edge);
        }

        let mut reached = HashSet::new();
        let branches = build_children(root, &by_parent, &mut reached);

        // Each child has one parent, so anything not reached from the root is
        // either orphaned or part of a cycle.
        let unreachable: Vec<String> = edges
            .iter()
            .filter(|e| !reached.contains(e.child.as_str()))
            .map(|e| e.child.clone())
            .collect();
        if !unreachable.is_empty() {
            return Err(GraphError::Unreachable(unreachable));
        }

        Ok(Self {
            root: root.to_string(),
            reset_fields,
            branches,
        })
    }

    /// The event graph: invoices, allocations and cars hang off `events`, each with
    /// one Level-2 collection.
    pub fn standard() -> Self {
        let edges = vec![
            DependencyEdge::new("invoices", "events", "event_id"),
            DependencyEdge::new("invoice_items", "invoices", "invoice_id"),
            DependencyEdge::new("allocations", "events", "event_id"),
            DependencyEdge::new("allocation_lines", "allocations", "allocation_id"),
            DependencyEdge::new("cars", "events", "event_id"),
            DependencyEdge::new("car_participants", "cars", "car_id"),
        ];
        let reset_fields = vec![
            FieldUpdate::new("status", FieldValue::Text("draft".into())),
            FieldUpdate::new("total_collected_cents", FieldValue::Integer(0)),
            FieldUpdate::new("total_disbursed_cents", FieldValue::Integer(0)),
            FieldUpdate::new("updated_at", FieldValue::Now),
        ];
        match Self::new("events", edges, reset_fields) {
            Ok(graph) => graph,
            Err(e) => unreachable!("standard cascade graph is invalid: {e}"),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn root_id_field(&self) -> &str {
        ID_FIELD
    }

    pub fn reset_fields(&self) -> &[FieldUpdate] {
        &self.reset_fields
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    /// Every dependent collection, children before parents, branch by branch.
    pub fn deletion_order(&self) -> Vec<&str> {
        self.branches.iter().flat_map(|b| b.deletion_order()).collect()
    }
}

fn build_children<'a>(
    parent: &str,
    by_parent: &HashMap<&str, Vec<&'a DependencyEdge>>,
    reached: &mut HashSet<&'a str>,
) -> Vec<Branch> {
    let Some(edges) = by_parent.get(parent) else {
        return Vec::new();
    };
    let mut branches = Vec::with_capacity(edges.len());
    for &edge in edges {
        if !reached.insert(edge.child.as_str()) {
            continue;
        }
        branches.push(Branch {
            collection: edge.child.clone(),
            foreign_key: edge.foreign_key.clone(),
            children: build_children(&edge.child, by_parent, reached),
        });
    }
    branches
}
