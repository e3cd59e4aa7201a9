//! Lowering of a resolved tree into builder instructions.
//!
//! Code generation runs on an explicit stack of [`Unit`]s instead of native
//! recursion. The dispatcher steps the unit on top; a step either finishes
//! the unit, asks to be stepped again, or names a child to compile first.
//! Handlers keep their progress in the unit so they resume where they left off.
use thiserror::Error;
use tracing::{debug, trace};

use crate::builder::{
    BuilderError, InstructionId, JumpTarget, Operand, JUMP_SIZE, RETURN_ADDRESS,
};
use crate::catalog::{Direction, OperationId, RETURN_VALUE};
use crate::node::{NodeId, SourcePosition, Tree};
use crate::prelude::{ARRAY_CREATE, ARRAY_SET_VALUE};
use crate::resolve::{KW_GET, KW_SET, KW_VAR, KW_WHEN};
use crate::state::{AssemblerState, Construct};
use crate::types::TypeId;
use crate::value::Value;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileErrorKind {
    #[error("no matching handler or overload for `{tag}`")]
    NoHandler { tag: String },
    #[error("`{tag}` has no resolved type")]
    Untyped { tag: String },
    #[error("`{construct}` is missing child {index}")]
    MissingChild { construct: &'static str, index: usize },
    #[error("variable `{name}` is not declared")]
    UndeclaredVariable { name: String },
    #[error("unknown type `{name}`")]
    UnknownType { name: String },
    #[error("`{construct}` expects a name but got `{found}`")]
    InvalidName { construct: &'static str, found: String },
    #[error("unsupported default value for `{name}`")]
    UnsupportedDefault { name: String },
    #[error(transparent)]
    Builder(#[from] BuilderError),
}

/// A compile failure tied to the node that caused it.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{kind}{}", .position.map(|p| format!(" at {p}")).unwrap_or_default())]
pub struct CompileError {
    #[source]
    pub kind: CompileErrorKind,
    pub node: Option<NodeId>,
    pub position: Option<SourcePosition>,
}

impl CompileError {
    pub fn at(kind: CompileErrorKind, node: NodeId) -> Self {
        Self {
            kind,
            node: Some(node),
            position: None,
        }
    }

    /// Fills in the line and column of the offending node.
    pub fn locate(mut self, tree: &Tree, source: &str) -> Self {
        if let Some(node) = self.node {
            self.position = tree.position(node, source);
        }
        self
    }
}

impl From<BuilderError> for CompileError {
    fn from(err: BuilderError) -> Self {
        Self {
            kind: err.into(),
            node: None,
            position: None,
        }
    }
}

/// Outcome of one step.
enum Progress {
    Done,
    /// Step again without descending.
    Again,
    /// Compile `node` into `target` first, then step again.
    Descend(NodeId, Option<String>),
}

enum Handler {
    Literal,
    Get,
    Set,
    Declare,
    Sequence,
    If {
        condition: Option<String>,
        pending: Option<InstructionId>,
        exits: Vec<InstructionId>,
    },
    While {
        start: Option<InstructionId>,
        condition: Option<String>,
        exit: Option<InstructionId>,
    },
    Call {
        operation: OperationId,
        arguments: Vec<Operand>,
    },
    Cast {
        value: Option<String>,
    },
    ArrayFill {
        array_type: TypeId,
        array: Option<String>,
        scratch: Option<String>,
    },
    InlineAsm,
    When {
        skip: Option<InstructionId>,
    },
    CallEvent,
    TypeOf(TypeId),
}

impl Handler {
    fn for_construct(construct: Construct) -> Self {
        match construct {
            Construct::Literal => Handler::Literal,
            Construct::Sequence => Handler::Sequence,
            Construct::Get => Handler::Get,
            Construct::Set => Handler::Set,
            Construct::Declare => Handler::Declare,
            Construct::If => Handler::If {
                condition: None,
                pending: None,
                exits: Vec::new(),
            },
            Construct::While => Handler::While {
                start: None,
                condition: None,
                exit: None,
            },
            Construct::When => Handler::When { skip: None },
            Construct::InlineAsm => Handler::InlineAsm,
            Construct::TypeOf(ty) => Handler::TypeOf(ty),
            Construct::Call(operation) => Handler::Call {
                operation,
                arguments: Vec::new(),
            },
            Construct::Cast(_) => Handler::Cast { value: None },
            Construct::CallEvent => Handler::CallEvent,
            Construct::ArrayFill(array_type) => Handler::ArrayFill {
                array_type,
                array: None,
                scratch: None,
            },
        }
    }
}

/// One resumable piece of work: a node, where its value goes, and handler progress.
struct Unit {
    node: NodeId,
    target: Option<String>,
    step: usize,
    temps: Vec<String>,
    handler: Handler,
}

impl Unit {
    fn new(tree: &Tree, state: &AssemblerState<'_>, node: NodeId, target: Option<String>) -> Result<Self, CompileErrorKind> {
        let construct = state.construct(node).ok_or_else(|| CompileErrorKind::NoHandler {
            tag: tree.tag(node).to_string(),
        })?;
        Ok(Self {
            node,
            target,
            step: 0,
            temps: Vec::new(),
            handler: Handler::for_construct(construct),
        })
    }

    fn release(&mut self, state: &mut AssemblerState<'_>) {
        for name in self.temps.drain(..) {
            state.give_back(&name);
        }
    }

    fn step(&mut self, tree: &Tree, state: &mut AssemblerState<'_>) -> Result<Progress, CompileErrorKind> {
        let step = self.step;
        self.step += 1;
        let node = self.node;
        let children = tree.children(node);
        let child = |index: usize, construct: &'static str| {
            children
                .get(index)
                .copied()
                .ok_or(CompileErrorKind::MissingChild { construct, index })
        };

        match &mut self.handler {
            Handler::Literal => {
                let value = tree.tag(node).clone();
                match &self.target {
                    Some(target) => state.builder.emit_copy(&Operand::Constant(value), target)?,
                    None => state.builder.emit_nop(),
                };
                Ok(Progress::Done)
            }

            Handler::Get => {
                let name = variable_name(tree, child(0, KW_GET)?, KW_GET)?;
                if state.builder.variable_type(name)?.is_none() {
                    return Err(CompileErrorKind::UndeclaredVariable {
                        name: name.to_string(),
                    });
                }
                if let Some(target) = &self.target {
                    state.builder.emit_copy(&Operand::variable(name), target)?;
                }
                Ok(Progress::Done)
            }

            Handler::Set => {
                let name = variable_name(tree, child(0, KW_SET)?, KW_SET)?;
                if step == 0 {
                    return Ok(Progress::Descend(child(1, KW_SET)?, Some(name.to_string())));
                }
                if let Some(target) = &self.target {
                    state.builder.emit_copy(&Operand::variable(name), target)?;
                }
                self.release(state);
                Ok(Progress::Done)
            }

            Handler::Declare => {
                if let Some(target) = &self.target {
                    let name = variable_name(tree, child(0, KW_VAR)?, KW_VAR)?;
                    state.builder.emit_copy(&Operand::variable(name), target)?;
                }
                Ok(Progress::Done)
            }

            Handler::Sequence => match children.get(step) {
                Some(&next) => {
                    let target = (step + 1 == children.len()).then(|| self.target.clone()).flatten();
                    Ok(Progress::Descend(next, target))
                }
                None => Ok(Progress::Done),
            },

            Handler::If {
                condition,
                pending,
                exits,
            } => {
                let Some(&branch) = children.get(step) else {
                    let end = JumpTarget::After(state.builder.last_instruction());
                    for exit in exits.drain(..) {
                        state.builder.patch_jump(exit, end)?;
                    }
                    if let Some(jump) = pending.take() {
                        state.builder.patch_jump(jump, end)?;
                    }
                    self.release(state);
                    return Ok(Progress::Done);
                };
                if step % 2 == 1 {
                    let name = condition.take().ok_or(CompileErrorKind::MissingChild {
                        construct: "if",
                        index: step - 1,
                    })?;
                    *pending = Some(state.builder.emit_jump_if_false(&name, JumpTarget::Unresolved)?);
                    self.release(state);
                    return Ok(Progress::Descend(branch, self.target.clone()));
                }
                if step > 0 {
                    let exit = state.builder.emit_jump(JumpTarget::Unresolved);
                    exits.push(exit);
                    if let Some(jump) = pending.take() {
                        state.builder.patch_jump(jump, JumpTarget::After(Some(exit)))?;
                    }
                }
                if step + 1 < children.len() {
                    let ty = state.node_type(branch).ok_or_else(|| CompileErrorKind::Untyped {
                        tag: tree.tag(branch).to_string(),
                    })?;
                    let name = state.rent(ty)?;
                    *condition = Some(name.clone());
                    self.temps.push(name.clone());
                    Ok(Progress::Descend(branch, Some(name)))
                } else {
                    Ok(Progress::Descend(branch, self.target.clone()))
                }
            }

            Handler::While {
                start,
                condition,
                exit,
            } => match step {
                0 => {
                    *start = state.builder.last_instruction();
                    let test = child(0, "while")?;
                    let ty = state.node_type(test).ok_or_else(|| CompileErrorKind::Untyped {
                        tag: tree.tag(test).to_string(),
                    })?;
                    let name = state.rent(ty)?;
                    *condition = Some(name.clone());
                    self.temps.push(name.clone());
                    Ok(Progress::Descend(test, Some(name)))
                }
                1 => {
                    let name = condition.take().ok_or(CompileErrorKind::MissingChild {
                        construct: "while",
                        index: 0,
                    })?;
                    *exit = Some(state.builder.emit_jump_if_false(&name, JumpTarget::Unresolved)?);
                    let body = child(1, "while")?;
                    self.release(state);
                    Ok(Progress::Descend(body, self.target.clone()))
                }
                _ => {
                    let back = state.builder.emit_jump(JumpTarget::After(*start));
                    if let Some(jump) = exit.take() {
                        state.builder.patch_jump(jump, JumpTarget::After(Some(back)))?;
                    }
                    self.release(state);
                    Ok(Progress::Done)
                }
            },

            Handler::Call {
                operation,
                arguments,
            } => {
                let catalog = state.catalog();
                let op = catalog.operation(*operation);
                if let Some(&argument) = children.get(step) {
                    let direction = op
                        .parameters
                        .get(step)
                        .map_or(Direction::In, |p| p.direction);
                    if direction != Direction::In {
                        if let Some(name) = passed_variable(tree, state, argument) {
                            arguments.push(Operand::variable(name));
                            return Ok(Progress::Again);
                        }
                    }
                    let ty = state.node_type(argument).ok_or_else(|| CompileErrorKind::Untyped {
                        tag: tree.tag(argument).to_string(),
                    })?;
                    let name = state.rent(ty)?;
                    self.temps.push(name.clone());
                    arguments.push(Operand::variable(name.clone()));
                    return Ok(Progress::Descend(argument, Some(name)));
                }
                if let Some(ret) = op.return_type() {
                    let slot = match &self.target {
                        Some(target) => target.clone(),
                        None => {
                            let name = state.rent(ret)?;
                            self.temps.push(name.clone());
                            name
                        }
                    };
                    arguments.push(Operand::variable(slot));
                }
                let arguments = std::mem::take(arguments);
                state.builder.emit_call(&op.full_name, &arguments)?;
                self.release(state);
                Ok(Progress::Done)
            }

            Handler::Cast { value } => {
                if step == 0 {
                    let inner = child(0, "cast")?;
                    let ty = state.node_type(inner).ok_or_else(|| CompileErrorKind::Untyped {
                        tag: tree.tag(inner).to_string(),
                    })?;
                    let name = state.rent(ty)?;
                    *value = Some(name.clone());
                    self.temps.push(name.clone());
                    return Ok(Progress::Descend(inner, Some(name)));
                }
                if let (Some(target), Some(value)) = (&self.target, value.as_ref()) {
                    state.builder.emit_copy(&Operand::variable(value.clone()), target)?;
                }
                self.release(state);
                Ok(Progress::Done)
            }

            Handler::ArrayFill {
                array_type,
                array,
                scratch,
            } => {
                if step == 0 {
                    let types = state.catalog().types();
                    let element = types.get(*array_type).element.unwrap_or_else(|| types.object());
                    let array_name = match &self.target {
                        Some(target) => target.clone(),
                        None => {
                            let name = state.rent(*array_type)?;
                            self.temps.push(name.clone());
                            name
                        }
                    };
                    let scratch_name = state.rent(element)?;
                    self.temps.push(scratch_name.clone());
                    let length = i32::try_from(children.len()).map_err(|_| BuilderError::InvalidAddress {
                        value: children.len().to_string(),
                    })?;
                    state.builder.emit_call(
                        ARRAY_CREATE,
                        &[
                            Operand::Constant(Value::Type(types.name(element).to_string())),
                            Operand::Constant(Value::I32(length)),
                            Operand::variable(array_name.clone()),
                        ],
                    )?;
                    *array = Some(array_name);
                    *scratch = Some(scratch_name);
                } else if let (Some(array), Some(scratch)) = (array.as_ref(), scratch.as_ref()) {
                    let index = i32::try_from(step - 1).map_err(|_| BuilderError::InvalidAddress {
                        value: (step - 1).to_string(),
                    })?;
                    state.builder.emit_call(
                        ARRAY_SET_VALUE,
                        &[
                            Operand::variable(array.clone()),
                            Operand::variable(scratch.clone()),
                            Operand::Constant(Value::I32(index)),
                        ],
                    )?;
                }
                match (children.get(step), scratch.clone()) {
                    (Some(&element), Some(scratch)) => Ok(Progress::Descend(element, Some(scratch))),
                    _ => {
                        self.release(state);
                        Ok(Progress::Done)
                    }
                }
            }

            Handler::InlineAsm => {
                for &instruction in children {
                    emit_inline(tree, state, instruction)?;
                }
                Ok(Progress::Done)
            }

            Handler::When { skip } => {
                let label = variable_name(tree, child(0, KW_WHEN)?, KW_WHEN)?;
                if step == 0 {
                    // In value position the block runs as an inline call, then is jumped over.
                    if let Some(target) = &self.target {
                        call_event(state, label, Some(target.as_str()))?;
                        *skip = Some(state.builder.emit_jump(JumpTarget::Unresolved));
                    }
                    let last = state.builder.last_instruction();
                    let entry = state.entry_point_mut(label).ok_or_else(|| CompileErrorKind::NoHandler {
                        tag: label.to_string(),
                    })?;
                    if entry.compiled == 0 {
                        entry.body_start = Some(JumpTarget::After(last));
                        let landing_points = std::mem::take(&mut entry.landing_points);
                        state.builder.define_event(label);
                        for jump in landing_points {
                            state.builder.patch_jump(jump, JumpTarget::After(last))?;
                        }
                    } else if let Some(chain) = entry.chain.take() {
                        state.builder.patch_jump(chain, JumpTarget::After(last))?;
                    }
                    return Ok(Progress::Descend(child(1, KW_WHEN)?, Some(RETURN_VALUE.to_string())));
                }
                let entry = state.entry_point_mut(label).ok_or_else(|| CompileErrorKind::NoHandler {
                    tag: label.to_string(),
                })?;
                entry.compiled += 1;
                let last_block = entry.compiled >= entry.blocks;
                let pointer = entry.return_pointer.clone();
                if last_block {
                    state.builder.emit_jump_indirect(&pointer)?;
                } else {
                    let chain = state.builder.emit_jump(JumpTarget::Unresolved);
                    if let Some(entry) = state.entry_point_mut(label) {
                        entry.chain = Some(chain);
                    }
                }
                if let Some(jump) = skip.take() {
                    let end = JumpTarget::After(state.builder.last_instruction());
                    state.builder.patch_jump(jump, end)?;
                }
                Ok(Progress::Done)
            }

            Handler::CallEvent => {
                let label = variable_name(tree, node, "event call")?;
                call_event(state, label, self.target.as_deref())?;
                Ok(Progress::Done)
            }

            Handler::TypeOf(ty) => {
                if let Some(target) = &self.target {
                    let name = state.catalog().types().name(*ty).to_string();
                    state.builder.emit_copy(&Operand::Constant(Value::Type(name)), target)?;
                }
                Ok(Progress::Done)
            }
        }
    }
}

/// Saves the return address, jumps into the routine and copies its result to `target`.
fn call_event(state: &mut AssemblerState<'_>, label: &str, target: Option<&str>) -> Result<(), CompileErrorKind> {
    let (pointer, body_start) = match state.entry_point(label) {
        Some(entry) => (entry.return_pointer.clone(), entry.body_start),
        None => {
            return Err(CompileErrorKind::NoHandler {
                tag: label.to_string(),
            })
        }
    };
    state.builder.emit_copy_offset(&pointer, JUMP_SIZE)?;
    match body_start {
        Some(start) => {
            state.builder.emit_jump(start);
        }
        None => {
            let jump = state.builder.emit_jump(JumpTarget::Unresolved);
            if let Some(entry) = state.entry_point_mut(label) {
                entry.landing_points.push(jump);
            }
        }
    }
    state
        .builder
        .emit_copy(&Operand::Constant(Value::U32(RETURN_ADDRESS)), &pointer)?;
    if let Some(target) = target {
        state.builder.emit_copy(&Operand::variable(RETURN_VALUE), target)?;
    }
    Ok(())
}

fn variable_name<'t>(tree: &'t Tree, node: NodeId, construct: &'static str) -> Result<&'t str, CompileErrorKind> {
    match tree.tag(node).as_str() {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(CompileErrorKind::InvalidName {
            construct,
            found: tree.tag(node).to_string(),
        }),
    }
}

/// `$(x)` handed straight to an OUT or IN_OUT parameter.
fn passed_variable<'t>(tree: &'t Tree, state: &AssemblerState<'_>, node: NodeId) -> Option<&'t str> {
    if state.construct(node) != Some(Construct::Get) {
        return None;
    }
    let name = tree.children(node).first()?;
    tree.tag(*name).as_str()
}

/// One `uasm` child: `mnemonic` or `mnemonic(operand)`.
fn emit_inline(tree: &Tree, state: &mut AssemblerState<'_>, node: NodeId) -> Result<(), CompileErrorKind> {
    let tag = tree.tag(node);
    let Some(mnemonic) = tag.as_str() else {
        return Err(BuilderError::UnknownMnemonic {
            mnemonic: tag.to_string(),
        }
        .into());
    };
    let operand = || {
        tree.children(node)
            .first()
            .map(|&child| tree.tag(child))
            .ok_or_else(|| BuilderError::MissingOperand {
                mnemonic: mnemonic.to_string(),
            })
    };
    let name_operand = || -> Result<String, BuilderError> {
        let value = operand()?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BuilderError::MissingOperand {
                mnemonic: mnemonic.to_string(),
            })
    };
    let address_operand = || -> Result<u32, BuilderError> {
        let value = operand()?;
        value.as_address().ok_or_else(|| BuilderError::InvalidAddress {
            value: value.to_string(),
        })
    };

    let builder = &mut state.builder;
    match mnemonic.to_ascii_lowercase().as_str() {
        "nop" => {
            builder.emit_nop();
        }
        "pop" => {
            builder.emit_pop();
        }
        "copy" => {
            builder.emit_copy_raw();
        }
        "push" => {
            builder.emit_push(&Operand::Variable(name_operand()?))?;
        }
        "jump" => {
            builder.emit_jump(JumpTarget::Address(address_operand()?));
        }
        "jumpiffalse" => {
            builder.emit_jump_if_false_raw(JumpTarget::Address(address_operand()?));
        }
        "jumpindirect" => {
            builder.emit_jump_indirect(&name_operand()?)?;
        }
        "extern" => {
            builder.emit_extern(&name_operand()?)?;
        }
        "annotation" => {}
        _ => {
            return Err(BuilderError::UnknownMnemonic {
                mnemonic: mnemonic.to_string(),
            }
            .into())
        }
    }
    Ok(())
}

/// Runs the dispatcher from the root until the stack is empty.
pub fn generate(tree: &Tree, state: &mut AssemblerState<'_>) -> Result<(), CompileError> {
    let root = tree.root();
    let mut stack = vec![Unit::new(tree, state, root, None).map_err(|kind| CompileError::at(kind, root))?];
    loop {
        let depth = stack.len();
        let Some(unit) = stack.last_mut() else {
            break;
        };
        let node = unit.node;
        trace!(%node, step = unit.step, depth, "step");
        let progress = unit
            .step(tree, state)
            .map_err(|kind| CompileError::at(kind, node))?;
        match progress {
            Progress::Done => {
                stack.pop();
            }
            Progress::Again => {}
            Progress::Descend(child, target) => {
                let unit = Unit::new(tree, state, child, target).map_err(|kind| CompileError::at(kind, child))?;
                stack.push(unit);
            }
        }
    }
    debug!(
        instructions = state.builder.instruction_count(),
        size = state.builder.size(),
        "code generated"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Instruction;
    use crate::catalog::Catalog;
    use crate::parser::parse;
    use crate::prelude;
    use crate::resolve::resolve;

    fn catalog() -> Catalog {
        Catalog::from_source(&prelude::core_source()).expect("core catalog")
    }

    fn compiled<'c>(catalog: &'c Catalog, source: &str) -> Result<AssemblerState<'c>, CompileError> {
        let tree = parse(source).expect("parse");
        let mut state = AssemblerState::new(catalog, &tree, true);
        resolve(&tree, &mut state)?;
        generate(&tree, &mut state)?;
        Ok(state)
    }

    fn instructions(state: &AssemblerState<'_>) -> Vec<Instruction> {
        state.builder().instructions().cloned().collect()
    }

    #[test]
    fn literal_without_target_is_nop() {
        let catalog = catalog();
        let state = compiled(&catalog, "5").expect("compile");
        assert_eq!(instructions(&state), vec![Instruction::Nop]);
    }

    #[test]
    fn assignment_compiles_value_into_variable() {
        let catalog = catalog();
        let state = compiled(&catalog, "(var(x, Int32, ), =(x, +($(x), 1)))").expect("compile");
        let listing = instructions(&state);
        let externs: Vec<_> = listing
            .iter()
            .filter(|i| matches!(i, Instruction::Extern(_)))
            .collect();
        assert_eq!(
            externs,
            vec![&Instruction::Extern(
                "SystemInt32.__op_Addition__SystemInt32_SystemInt32__SystemInt32".into()
            )]
        );
        assert_eq!(
            listing[listing.len() - 2],
            Instruction::Push("x".into()),
            "result lands in x directly"
        );
        assert_eq!(state.rented_count(), 0);
    }

    #[test]
    fn unknown_mnemonic_is_reported() {
        let catalog = catalog();
        let err = compiled(&catalog, "uasm(nop, frobnicate())").err().expect("error");
        assert_eq!(
            err.kind,
            CompileErrorKind::Builder(BuilderError::UnknownMnemonic {
                mnemonic: "frobnicate".into()
            })
        );
    }

    #[test]
    fn inline_assembly_emits_raw_instructions() {
        let catalog = catalog();
        let state = compiled(
            &catalog,
            "uasm(nop, push(__returnValue), pop, jump(0x10), annotation(hello), copy)",
        )
        .expect("compile");
        assert_eq!(
            instructions(&state),
            vec![
                Instruction::Nop,
                Instruction::Push("__returnValue".into()),
                Instruction::Pop,
                Instruction::Jump(JumpTarget::Address(16)),
                Instruction::Copy,
            ]
        );
        let err = compiled(&catalog, "uasm(push)").err().expect("missing operand");
        assert!(matches!(
            err.kind,
            CompileErrorKind::Builder(BuilderError::MissingOperand { .. })
        ));
    }

    #[test]
    fn while_jumps_back_to_condition() {
        let catalog = catalog();
        let state = compiled(
            &catalog,
            "(var(i, Int32, 0), while(<($(i), 3), =(i, +($(i), 1))))",
        )
        .expect("compile");
        let listing = instructions(&state);
        let back = listing
            .iter()
            .rev()
            .find_map(|i| match i {
                Instruction::Jump(target) => Some(*target),
                _ => None,
            })
            .expect("back jump");
        assert_eq!(back, JumpTarget::After(None), "loop restarts at the condition");
        assert!(listing
            .iter()
            .any(|i| matches!(i, Instruction::JumpIfFalse(JumpTarget::After(Some(_))))));
    }

    #[test]
    fn untyped_nodes_are_reported_with_position() {
        let catalog = catalog();
        let source = "(1,\n  frobnicate(2))";
        let tree = parse(source).expect("parse");
        let mut state = AssemblerState::new(&catalog, &tree, true);
        resolve(&tree, &mut state).expect("resolve");
        let err = generate(&tree, &mut state)
            .expect_err("no handler")
            .locate(&tree, source);
        assert_eq!(
            err.kind,
            CompileErrorKind::NoHandler {
                tag: "frobnicate".into()
            }
        );
        assert_eq!(err.position, Some(SourcePosition { line: 2, column: 3 }));
        assert_eq!(
            err.to_string(),
            "no matching handler or overload for `frobnicate` at line 2, column 3"
        );
    }

    #[test]
    fn call_event_before_body_is_patched_to_body_start() {
        let catalog = catalog();
        let state = compiled(&catalog, "(when(_interact, (_helper)), when(_helper, 7))").expect("compile");
        let helper = state.entry_point("_helper").expect("helper");
        let start = helper.body_start.expect("body start");
        let listing = instructions(&state);
        assert!(listing.contains(&Instruction::Jump(start)));
        assert!(!listing.contains(&Instruction::Jump(JumpTarget::Unresolved)));
    }
}
