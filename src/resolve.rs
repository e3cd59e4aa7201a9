//! Two-phase type resolution.
//!
//! Phase 1 walks the tree breadth-first, declaring variables and event entry
//! points so later references can see them. Phase 2 visits the recorded nodes
//! in reverse, children before parents, and decides each node's construct and
//! type from its tag and its children's types.
use std::collections::VecDeque;

use tracing::debug;

use crate::builder::VariableAttributes;
use crate::codegen::{CompileError, CompileErrorKind};
use crate::node::{NodeId, Tree};
use crate::state::{AssemblerState, Construct};
use crate::types::{TypeId, TYPE};
use crate::value::Value;

pub const KW_VAR: &str = "var";
pub const KW_GET: &str = "$";
pub const KW_SET: &str = "=";
pub const KW_IF: &str = "if";
pub const KW_WHILE: &str = "while";
pub const KW_WHEN: &str = "when";
pub const KW_UASM: &str = "uasm";
pub const KW_TYPEOF: &str = "typeof";

pub const KEYWORDS: [&str; 8] = [
    KW_VAR, KW_GET, KW_SET, KW_IF, KW_WHILE, KW_WHEN, KW_UASM, KW_TYPEOF,
];

pub fn resolve(tree: &Tree, state: &mut AssemblerState<'_>) -> Result<(), CompileError> {
    let order = declare_pass(tree, state)?;
    for &id in order.iter().rev() {
        let (construct, ty) = classify(tree, id, state).map_err(|kind| CompileError::at(kind, id))?;
        state.record(id, construct, ty);
    }
    debug!(
        nodes = order.len(),
        typed = order.iter().filter(|&&id| state.node_type(id).is_some()).count(),
        "types resolved"
    );
    Ok(())
}

/// Breadth-first walk; returns the visit order.
fn declare_pass(tree: &Tree, state: &mut AssemblerState<'_>) -> Result<Vec<NodeId>, CompileError> {
    let mut order = Vec::with_capacity(tree.len());
    let mut queue = VecDeque::from([tree.root()]);
    while let Some(id) = queue.pop_front() {
        order.push(id);
        let node = tree.node(id);
        let descend = match node.tag().as_str() {
            Some(KW_VAR) if !node.is_leaf() => {
                declare_variable(tree, id, state).map_err(|kind| CompileError::at(kind, id))?;
                false
            }
            Some(KW_GET | KW_UASM | KW_TYPEOF) if !node.is_leaf() => false,
            Some(KW_WHEN) if node.len() == 2 => {
                let label = name_of(tree, node.children()[0], KW_WHEN)
                    .map_err(|kind| CompileError::at(kind, id))?;
                state
                    .declare_entry_point(label)
                    .map_err(|err| CompileError::at(err.into(), id))?;
                true
            }
            _ => true,
        };
        if descend {
            queue.extend(node.children().iter().copied());
        }
    }
    Ok(order)
}

/// `var(name, attributes or type..., default)`.
fn declare_variable(
    tree: &Tree,
    id: NodeId,
    state: &mut AssemblerState<'_>,
) -> Result<(), CompileErrorKind> {
    let children = tree.children(id);
    let name = name_of(tree, children[0], KW_VAR)?;
    let types = state.catalog().types();
    let mut ty = None;
    let mut attributes = VariableAttributes::empty();
    let modifiers = if children.len() > 2 {
        &children[1..children.len() - 1]
    } else {
        &[]
    };
    for &modifier in modifiers {
        let tag = tree.tag(modifier);
        let Some(word) = tag.as_str() else {
            return Err(CompileErrorKind::InvalidName {
                construct: KW_VAR,
                found: tag.to_string(),
            });
        };
        match word.to_ascii_lowercase().as_str() {
            "public" => attributes |= VariableAttributes::PUBLIC,
            "private" => attributes -= VariableAttributes::PUBLIC,
            "sync" => attributes |= VariableAttributes::SYNC_NONE,
            "linearsync" => attributes |= VariableAttributes::SYNC_LINEAR,
            "smoothsync" => attributes |= VariableAttributes::SYNC_SMOOTH,
            _ => {
                ty = Some(types.lookup(word).ok_or_else(|| CompileErrorKind::UnknownType {
                    name: word.to_string(),
                })?);
            }
        }
    }

    let mut value = None;
    if let Some(&default) = children.get(1).and(children.last()) {
        let node = tree.node(default);
        if node.is_leaf() {
            value = Some(node.tag().clone()).filter(|v| !v.is_null());
        } else if is_this(tree, default) {
            attributes |= VariableAttributes::DEFAULT_THIS;
        } else {
            return Err(CompileErrorKind::UnsupportedDefault {
                name: name.to_string(),
            });
        }
    }
    state
        .builder_mut()
        .define_variable(name, ty, attributes, value)?;
    Ok(())
}

/// `(this)` as a default value.
fn is_this(tree: &Tree, id: NodeId) -> bool {
    let node = tree.node(id);
    node.tag().is_null()
        && node.len() == 1
        && tree
            .tag(node.children()[0])
            .as_str()
            .is_some_and(|word| word.eq_ignore_ascii_case("this"))
}

/// Non-empty string tag of a name position.
fn name_of<'t>(tree: &'t Tree, id: NodeId, construct: &'static str) -> Result<&'t str, CompileErrorKind> {
    match tree.tag(id).as_str() {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(CompileErrorKind::InvalidName {
            construct,
            found: tree.tag(id).to_string(),
        }),
    }
}

type Resolution = (Option<Construct>, Option<TypeId>);

fn classify(tree: &Tree, id: NodeId, state: &mut AssemblerState<'_>) -> Result<Resolution, CompileErrorKind> {
    let catalog = state.catalog();
    let types = catalog.types();
    let node = tree.node(id);
    let children = node.children();

    if node.is_leaf() {
        return Ok((Some(Construct::Literal), Some(types.type_of_value(node.tag()))));
    }

    let tag = match node.tag() {
        Value::Null => {
            if let [only] = children {
                callable_leaf(tree, *only, state);
            }
            let last = children.last().and_then(|&child| state.node_type(child));
            return Ok((Some(Construct::Sequence), last));
        }
        Value::String(tag) => tag.as_str(),
        _ => return Ok((None, None)),
    };

    let resolution = match (tag, children.len()) {
        (KW_GET, 1) => {
            let name = name_of(tree, children[0], KW_GET)?;
            let ty = state
                .builder_mut()
                .variable_type(name)?
                .ok_or_else(|| CompileErrorKind::UndeclaredVariable {
                    name: name.to_string(),
                })?;
            (Some(Construct::Get), Some(ty))
        }
        (KW_SET, 2) => {
            let name = name_of(tree, children[0], KW_SET)?;
            let ty = state
                .builder_mut()
                .variable_type(name)?
                .or_else(|| state.node_type(children[1]))
                .unwrap_or_else(|| types.object());
            (Some(Construct::Set), Some(ty))
        }
        (KW_VAR, _) => {
            let name = name_of(tree, children[0], KW_VAR)?;
            let ty = state.builder().variable(name).map(|var| var.ty);
            (Some(Construct::Declare), ty)
        }
        (KW_IF, len) if len > 1 => {
            let mut branches: Vec<NodeId> = children.iter().copied().skip(1).step_by(2).collect();
            if len % 2 == 1 {
                branches.extend(children.last().copied());
            }
            let branch_types: Option<Vec<TypeId>> =
                branches.iter().map(|&b| state.node_type(b)).collect();
            let ty = branch_types.and_then(|list| types.common_ancestor(&list));
            (Some(Construct::If), ty)
        }
        (KW_WHILE, 2) => (Some(Construct::While), state.node_type(children[1])),
        (KW_WHEN, 2) => (Some(Construct::When), state.node_type(children[1])),
        (KW_UASM, _) => (Some(Construct::InlineAsm), None),
        (KW_TYPEOF, 1) => {
            let name = name_of(tree, children[0], KW_TYPEOF)?;
            let target = types.lookup(name).ok_or_else(|| CompileErrorKind::UnknownType {
                name: name.to_string(),
            })?;
            (Some(Construct::TypeOf(target)), Some(types.builtin(TYPE)))
        }
        _ => resolve_call(tag, children, state),
    };
    Ok(resolution)
}

/// Overload, then `!Type` cast, then `To<Type>Array` fill.
fn resolve_call(tag: &str, children: &[NodeId], state: &AssemblerState<'_>) -> Resolution {
    let catalog = state.catalog();
    let types = catalog.types();
    let argument_types: Option<Vec<TypeId>> =
        children.iter().map(|&child| state.node_type(child)).collect();

    if let Some(arguments) = &argument_types {
        if let Some(operation) = catalog.resolve_overload(tag, arguments) {
            let ty = catalog.operation(operation).return_type();
            return (Some(Construct::Call(operation)), ty);
        }
    }
    if let Some(target) = tag.strip_prefix('!').and_then(|name| types.lookup(name)) {
        if children.len() == 1 {
            return (Some(Construct::Cast(target)), Some(target));
        }
    }
    let array = tag
        .strip_prefix("To")
        .filter(|rest| rest.ends_with("Array"))
        .and_then(|name| types.lookup(name))
        .filter(|&ty| types.get(ty).is_array());
    if let Some(array) = array {
        return (Some(Construct::ArrayFill(array)), Some(array));
    }
    (None, None)
}

/// `(Name)`: a wrapped bare name is a zero-argument call or an event call.
fn callable_leaf(tree: &Tree, id: NodeId, state: &mut AssemblerState<'_>) {
    let Some(name) = tree.tag(id).as_str() else {
        return;
    };
    let catalog = state.catalog();
    if let Some(operation) = catalog.resolve_overload(name, &[]) {
        let ty = catalog.operation(operation).return_type();
        state.record(id, Some(Construct::Call(operation)), ty);
    } else if state.entry_point(name).is_some() {
        let object = catalog.types().object();
        state.record(id, Some(Construct::CallEvent), Some(object));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::parser::parse;
    use crate::prelude;
    use crate::types::{BOOLEAN, INT32, STRING};

    fn catalog() -> Catalog {
        Catalog::from_source(&prelude::core_source()).expect("core catalog")
    }

    fn resolved<'c>(catalog: &'c Catalog, source: &str) -> (Tree, AssemblerState<'c>) {
        let tree = parse(source).expect("parse");
        let mut state = AssemblerState::new(catalog, &tree, true);
        resolve(&tree, &mut state).expect("resolve");
        (tree, state)
    }

    #[test]
    fn literals_and_sequences() {
        let catalog = catalog();
        let (tree, state) = resolved(&catalog, "(1, \"two\", true)");
        let root = tree.root();
        assert_eq!(state.construct(root), Some(Construct::Sequence));
        assert_eq!(state.node_type(root), Some(catalog.types().builtin(BOOLEAN)));
        let first = tree.children(root)[0];
        assert_eq!(state.construct(first), Some(Construct::Literal));
        assert_eq!(state.node_type(first), Some(catalog.types().builtin(INT32)));
    }

    #[test]
    fn calls_take_return_types() {
        let catalog = catalog();
        let (tree, state) = resolved(&catalog, "==(+(1, 2), 3)");
        let root = tree.root();
        assert!(matches!(state.construct(root), Some(Construct::Call(_))));
        assert_eq!(state.node_type(root), Some(catalog.types().builtin(BOOLEAN)));
        let sum = tree.children(root)[0];
        assert_eq!(state.node_type(sum), Some(catalog.types().builtin(INT32)));
    }

    #[test]
    fn variables_are_declared_before_use() {
        let catalog = catalog();
        let source = "($(greeting), var(greeting, public, String, \"hi\"), =(greeting, \"yo\"))";
        let (tree, state) = resolved(&catalog, source);
        let string = catalog.types().builtin(STRING);
        let get = tree.children(tree.root())[0];
        assert_eq!(state.construct(get), Some(Construct::Get));
        assert_eq!(state.node_type(get), Some(string));
        let var = state.builder().variable("greeting").expect("declared");
        assert_eq!(var.ty, string);
        assert_eq!(var.attributes, VariableAttributes::PUBLIC);
        assert_eq!(var.value, Some(Value::from("hi")));
        let set = tree.children(tree.root())[2];
        assert_eq!(state.construct(set), Some(Construct::Set));
    }

    #[test]
    fn declaration_forms() {
        let catalog = catalog();
        let (_, state) = resolved(
            &catalog,
            "(var(count, Int32, ), var(me, Transform, (this)), var(bare), var(n, linearsync, 5))",
        );
        let builder = state.builder();
        let count = builder.variable("count").expect("count");
        assert_eq!(count.ty, catalog.types().builtin(INT32));
        assert_eq!(count.value, Some(Value::I32(0)));
        let me = builder.variable("me").expect("me");
        assert!(me.attributes.contains(VariableAttributes::DEFAULT_THIS));
        assert_eq!(builder.variable("bare").map(|v| v.ty), Some(catalog.types().object()));
        let n = builder.variable("n").expect("n");
        assert_eq!(n.attributes, VariableAttributes::SYNC_LINEAR);
        assert_eq!(n.value, Some(Value::I32(5)));
    }

    #[test]
    fn conditional_type_is_common_ancestor_of_branches() {
        let catalog = catalog();
        let (tree, state) = resolved(&catalog, "if(true, 1, false, 2, 3)");
        assert_eq!(state.node_type(tree.root()), Some(catalog.types().builtin(INT32)));
        let (tree, state) = resolved(&catalog, "if(true, 1, \"x\")");
        assert_eq!(state.node_type(tree.root()), Some(catalog.types().object()));
    }

    #[test]
    fn wrapped_names_become_zero_argument_calls_or_event_calls() {
        let catalog = catalog();
        let (tree, state) = resolved(&catalog, "(when(_start, 1), (_start), _start)");
        let children = tree.children(tree.root());
        let wrapper = children[1];
        let inner = tree.children(wrapper)[0];
        assert_eq!(state.construct(inner), Some(Construct::CallEvent));
        assert_eq!(state.construct(wrapper), Some(Construct::Sequence));
        assert_eq!(state.construct(children[2]), Some(Construct::Literal));
        assert_eq!(state.construct(children[0]), Some(Construct::When));
        assert!(state.entry_point("_start").is_some());
    }

    #[test]
    fn casts_and_array_fills() {
        let catalog = catalog();
        let (tree, state) = resolved(&catalog, "(!Single(1), !Object(1), ToInt32Array(1, 2), typeof(Int32))");
        let children = tree.children(tree.root());
        assert!(matches!(state.construct(children[0]), Some(Construct::Call(_))));
        assert_eq!(
            state.construct(children[1]),
            Some(Construct::Cast(catalog.types().object()))
        );
        let array = catalog.types().lookup("Int32Array").expect("array type");
        assert_eq!(state.construct(children[2]), Some(Construct::ArrayFill(array)));
        let int = catalog.types().builtin(INT32);
        assert_eq!(state.construct(children[3]), Some(Construct::TypeOf(int)));
    }

    #[test]
    fn undeclared_variables_are_errors() {
        let catalog = catalog();
        let tree = parse("(1, $(ghost))").expect("parse");
        let mut state = AssemblerState::new(&catalog, &tree, true);
        let err = resolve(&tree, &mut state).expect_err("undeclared");
        assert_eq!(
            err.kind,
            CompileErrorKind::UndeclaredVariable {
                name: "ghost".into()
            }
        );
        assert_eq!(err.node, Some(tree.children(tree.root())[1]));
    }

    #[test]
    fn unknown_names_stay_unresolved() {
        let catalog = catalog();
        let (tree, state) = resolved(&catalog, "frobnicate(1)");
        assert_eq!(state.construct(tree.root()), None);
        assert_eq!(state.node_type(tree.root()), None);
    }
}
