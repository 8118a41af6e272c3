//! Accessibility tree → manifest flattening.
//!
//! Depth-first, parent before children, hidden subtrees skipped. A node
//! is emitted only if it exposes a role or a name. The walk stops at the
//! line limit, so truncation always keeps the first lines in walk order.

use uipilot_core::{AccessibilityNode, AccessibilityTree, Manifest, ManifestEntry};

/// Flatten `tree` into at most `limit` entries.
pub fn flatten(tree: &AccessibilityTree, limit: usize) -> Vec<ManifestEntry> {
    let mut entries = Vec::new();
    // Explicit stack: arbitrarily deep trees must not blow the call stack.
    let mut stack: Vec<&dyn AccessibilityNode> = tree.roots().into_iter().rev().collect();

    while let Some(node) = stack.pop() {
        if entries.len() >= limit {
            break;
        }
        if node.is_hidden() {
            continue;
        }
        if node.role().is_some() || node.name().is_some() {
            entries.push(ManifestEntry {
                role: node.role().map(str::to_string),
                name: node.name().map(str::to_string),
                disabled: node.is_disabled(),
            });
        }
        stack.extend(node.children().into_iter().rev());
    }

    entries
}

/// Build the manifest for a tree the environment may or may not have.
pub fn build(tree: Option<&AccessibilityTree>, limit: usize) -> Manifest {
    let entries = tree.map(|t| flatten(t, limit)).unwrap_or_default();
    if entries.is_empty() {
        Manifest::Empty
    } else {
        Manifest::Entries { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uipilot_core::{DesktopNode, DomNode};

    fn line_count(manifest: &Manifest) -> usize {
        manifest.entries().len()
    }

    #[test]
    fn parent_comes_before_children() {
        let tree = AccessibilityTree::Dom(vec![
            DomNode::new("form", "Login").with_children(vec![
                DomNode::new("textbox", "Email"),
                DomNode::new("button", "Sign in").disabled(),
            ]),
            DomNode::new("link", "Help"),
        ]);
        let rendered = build(Some(&tree), 300).render();
        assert_eq!(
            rendered,
            "- form: Login\n- textbox: Email\n- button: Sign in [disabled]\n- link: Help"
        );
    }

    #[test]
    fn hidden_subtrees_are_skipped() {
        let tree = AccessibilityTree::Dom(vec![
            DomNode::new("dialog", "Cookies")
                .hidden()
                .with_children(vec![DomNode::new("button", "Accept")]),
            DomNode::new("button", "Continue"),
        ]);
        let entries = flatten(&tree, 300);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name.as_deref(), Some("Continue"));
    }

    #[test]
    fn anonymous_nodes_are_walked_but_not_emitted() {
        let tree = AccessibilityTree::Dom(vec![DomNode::default().with_children(vec![
            DomNode::new("button", "Go"),
        ])]);
        let entries = flatten(&tree, 300);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].role.as_deref(), Some("button"));
    }

    #[test]
    fn truncation_keeps_first_lines_in_walk_order() {
        let children: Vec<DomNode> = (0..500)
            .map(|i| DomNode::new("listitem", format!("item {i}")))
            .collect();
        let tree = AccessibilityTree::Dom(vec![DomNode::new("list", "Results").with_children(children)]);
        let manifest = build(Some(&tree), 300);
        assert_eq!(line_count(&manifest), 300);
        let entries = manifest.entries();
        assert_eq!(entries[0].role.as_deref(), Some("list"));
        assert_eq!(entries[1].name.as_deref(), Some("item 0"));
        assert_eq!(entries[299].name.as_deref(), Some("item 298"));
    }

    #[test]
    fn deep_tree_does_not_overflow() {
        let mut node = DomNode::new("button", "leaf");
        for depth in 0..2_000 {
            node = DomNode::new("group", format!("level {depth}")).with_children(vec![node]);
        }
        let tree = AccessibilityTree::Dom(vec![node]);
        assert_eq!(flatten(&tree, 300).len(), 300);
    }

    #[test]
    fn desktop_tree_uses_same_shape() {
        let tree = AccessibilityTree::Desktop(vec![DesktopNode::new("AXWindow", "Editor")
            .with_children(vec![DesktopNode::new("AXButton", "Save")])]);
        assert_eq!(
            build(Some(&tree), 300).render(),
            "- AXWindow: Editor\n- AXButton: Save"
        );
    }

    #[test]
    fn missing_or_empty_tree_is_empty_manifest() {
        assert_eq!(build(None, 300), Manifest::Empty);
        assert_eq!(build(Some(&AccessibilityTree::Dom(vec![])), 300), Manifest::Empty);
    }
}
