use crate::node::{NodeId, Tree};

const INDENT: &str = "  ";

/// Canonical text of the whole tree.
pub fn serialize(tree: &Tree) -> String {
    serialize_node(tree, tree.root())
}

/// Prints `tag (` + one child per line + `)`, two spaces per nesting level.
/// Iterative so deeply nested trees do not grow the native stack.
///
/// Text has no literal for type values: a `Value::Type` tag prints as its
/// type name and reads back as that name, which `typeof` and `var` resolve
/// to the same type.
pub fn serialize_node(tree: &Tree, id: NodeId) -> String {
    let mut out = String::new();
    write_head(tree, id, &mut out);
    if tree.node(id).is_leaf() {
        return out;
    }

    let mut stack: Vec<(NodeId, usize)> = vec![(id, 0)];
    while let Some(&(current, next)) = stack.last() {
        let children = tree.children(current);
        if let Some(&child) = children.get(next) {
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            if next > 0 {
                out.push(',');
            }
            out.push('\n');
            indent(&mut out, stack.len());
            write_head(tree, child, &mut out);
            if !tree.node(child).is_leaf() {
                stack.push((child, 0));
            }
        } else {
            stack.pop();
            out.push('\n');
            indent(&mut out, stack.len());
            out.push(')');
        }
    }
    out
}

fn write_head(tree: &Tree, id: NodeId, out: &mut String) {
    let node = tree.node(id);
    if node.is_leaf() {
        out.push_str(&node.tag().to_string());
        return;
    }
    if !node.tag().is_null() {
        out.push_str(&node.tag().to_string());
        out.push(' ');
    }
    out.push('(');
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}
