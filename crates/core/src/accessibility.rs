//! Accessibility nodes: one capability, two backend shapes.
//!
//! Browsers report a DOM accessibility snapshot (`role`, `name`,
//! `disabled`, `hidden`, `children`); desktop sandboxes report the platform
//! tree (`AXRole`, `AXTitle`, `AXDisabled`, `AXHidden`, `AXChildren`). Both
//! are deserialized into their own struct and exposed through
//! [`AccessibilityNode`], so the manifest walk is written exactly once.

use serde::{Deserialize, Serialize};

/// What the manifest walk needs to know about a node.
pub trait AccessibilityNode {
    fn role(&self) -> Option<&str>;
    fn name(&self) -> Option<&str>;
    fn is_disabled(&self) -> bool;
    fn is_hidden(&self) -> bool;
    fn children(&self) -> Vec<&dyn AccessibilityNode>;
}

/// Node of a DOM accessibility snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DomNode>,
}

impl DomNode {
    pub fn new(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_children(mut self, children: Vec<DomNode>) -> Self {
        self.children = children;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

impl AccessibilityNode for DomNode {
    fn role(&self) -> Option<&str> {
        non_empty(self.role.as_deref())
    }

    fn name(&self) -> Option<&str> {
        non_empty(self.name.as_deref())
    }

    fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn children(&self) -> Vec<&dyn AccessibilityNode> {
        self.children.iter().map(|c| c as &dyn AccessibilityNode).collect()
    }
}

/// Node of a desktop platform accessibility tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesktopNode {
    #[serde(rename = "AXRole", default, skip_serializing_if = "Option::is_none")]
    pub ax_role: Option<String>,
    #[serde(rename = "AXTitle", default, skip_serializing_if = "Option::is_none")]
    pub ax_title: Option<String>,
    #[serde(rename = "AXDisabled", default)]
    pub ax_disabled: bool,
    #[serde(rename = "AXHidden", default)]
    pub ax_hidden: bool,
    #[serde(rename = "AXChildren", default, skip_serializing_if = "Vec::is_empty")]
    pub ax_children: Vec<DesktopNode>,
}

impl DesktopNode {
    pub fn new(role: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            ax_role: Some(role.into()),
            ax_title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_children(mut self, children: Vec<DesktopNode>) -> Self {
        self.ax_children = children;
        self
    }
}

impl AccessibilityNode for DesktopNode {
    fn role(&self) -> Option<&str> {
        non_empty(self.ax_role.as_deref())
    }

    fn name(&self) -> Option<&str> {
        non_empty(self.ax_title.as_deref())
    }

    fn is_disabled(&self) -> bool {
        self.ax_disabled
    }

    fn is_hidden(&self) -> bool {
        self.ax_hidden
    }

    fn children(&self) -> Vec<&dyn AccessibilityNode> {
        self.ax_children
            .iter()
            .map(|c| c as &dyn AccessibilityNode)
            .collect()
    }
}

/// A full tree as returned by an environment. Either backend may report a
/// forest rather than a single root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", content = "roots", rename_all = "lowercase")]
pub enum AccessibilityTree {
    Dom(Vec<DomNode>),
    Desktop(Vec<DesktopNode>),
}

impl AccessibilityTree {
    pub fn roots(&self) -> Vec<&dyn AccessibilityNode> {
        match self {
            AccessibilityTree::Dom(nodes) => {
                nodes.iter().map(|n| n as &dyn AccessibilityNode).collect()
            }
            AccessibilityTree::Desktop(nodes) => {
                nodes.iter().map(|n| n as &dyn AccessibilityNode).collect()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AccessibilityTree::Dom(nodes) => nodes.is_empty(),
            AccessibilityTree::Desktop(nodes) => nodes.is_empty(),
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desktop_node_deserializes_ax_fields() {
        let json = serde_json::json!({
            "AXRole": "AXButton",
            "AXTitle": "OK",
            "AXDisabled": true,
            "AXChildren": [{ "AXRole": "AXStaticText", "AXTitle": "label" }]
        });
        let node: DesktopNode = serde_json::from_value(json).unwrap();
        assert_eq!(node.role(), Some("AXButton"));
        assert_eq!(node.name(), Some("OK"));
        assert!(node.is_disabled());
        assert!(!node.is_hidden());
        assert_eq!(node.children().len(), 1);
    }

    #[test]
    fn dom_node_treats_empty_strings_as_absent() {
        let node = DomNode {
            role: Some(String::new()),
            name: Some("Submit".into()),
            ..DomNode::default()
        };
        assert_eq!(node.role(), None);
        assert_eq!(node.name(), Some("Submit"));
    }

    #[test]
    fn tree_exposes_roots_for_both_backends() {
        let dom = AccessibilityTree::Dom(vec![DomNode::new("main", ""), DomNode::new("link", "Home")]);
        assert_eq!(dom.roots().len(), 2);
        let desktop = AccessibilityTree::Desktop(vec![]);
        assert!(desktop.is_empty());
    }
}
