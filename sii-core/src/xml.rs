//! Namespace-tolerant element lookup over a parsed XML tree.
//!
//! AEAT endpoints are inconsistent about namespace prefixing: the same
//! response element may arrive as `CSV`, `sii:CSV`, or `siiR:CSV` depending on
//! the gateway. libxml already resolves declared namespaces to local names;
//! these helpers additionally accept literal prefixed names (a recovered parse
//! of a document with undeclared prefixes stores `sii:CSV` verbatim), so a
//! lookup by `CSV` matches all three spellings.
use libxml::tree::Node;

/// Whether a node's element name matches `name` ignoring any namespace prefix.
pub fn name_matches(node: &Node, name: &str) -> bool {
    let node_name = node.get_name();
    node_name == name || node_name.ends_with(&format!(":{name}"))
}

/// First direct element child matching `name` regardless of prefix.
pub fn find_child(parent: &Node, name: &str) -> Option<Node> {
    let mut current = parent.get_first_child();
    while let Some(node) = current {
        if node.is_element_node() && name_matches(&node, name) {
            return Some(node);
        }
        current = node.get_next_sibling();
    }
    None
}

/// First descendant element matching `name`, depth-first in document order.
pub fn find_descendant(scope: &Node, name: &str) -> Option<Node> {
    let mut current = scope.get_first_child();
    while let Some(node) = current {
        if node.is_element_node() {
            if name_matches(&node, name) {
                return Some(node);
            }
            if let Some(found) = find_descendant(&node, name) {
                return Some(found);
            }
        }
        current = node.get_next_sibling();
    }
    None
}

/// Every descendant element matching `name`, in document order.
pub fn find_descendants(scope: &Node, name: &str) -> Vec<Node> {
    let mut found = Vec::new();
    collect_descendants(scope, name, &mut found);
    found
}

fn collect_descendants(scope: &Node, name: &str, found: &mut Vec<Node>) {
    let mut current = scope.get_first_child();
    while let Some(node) = current {
        if node.is_element_node() {
            if name_matches(&node, name) {
                found.push(node.clone());
            }
            collect_descendants(&node, name, found);
        }
        current = node.get_next_sibling();
    }
}

/// Trimmed text content of a node.
pub fn text_of(node: &Node) -> String {
    node.get_content().trim().to_string()
}

/// Trimmed text of the first matching descendant, if present and non-empty.
pub fn descendant_text(scope: &Node, name: &str) -> Option<String> {
    find_descendant(scope, name)
        .map(|node| text_of(&node))
        .filter(|text| !text.is_empty())
}
