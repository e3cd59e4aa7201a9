use std::collections::HashMap;
use std::fmt::Write as _;

use bitflags::bitflags;
use indexmap::{IndexMap, IndexSet};
use thiserror::Error;
use tracing::trace;

use crate::catalog::{Catalog, Direction};
use crate::types::{TypeId, BOOLEAN, UINT32};
use crate::value::Value;

/// Placeholder address for jumps that return to the host.
pub const RETURN_ADDRESS: u32 = u32::MAX - 7;
pub const JUMP_SIZE: u32 = 8;
/// `PUSH, PUSH, COPY`.
pub const COPY_SEQUENCE_SIZE: u32 = 20;

const CONSTANT_PREFIX: &str = "__const_";
const MAX_CONSTANT_STEM: usize = 64;

bitflags! {
    /// Declaration attributes of a heap variable.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    pub struct VariableAttributes: u8 {
        const PUBLIC = 1;
        const SYNC_NONE = 1 << 1;
        const SYNC_LINEAR = 1 << 2;
        const SYNC_SMOOTH = 1 << 3;
        const SYNC = Self::SYNC_NONE.bits() | Self::SYNC_LINEAR.bits() | Self::SYNC_SMOOTH.bits();
        const DEFAULT_THIS = 1 << 4;
        const CONSTANT = 1 << 5;
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuilderError {
    #[error("variable names must not be empty")]
    InvalidVariableName,
    #[error("variable `{name}` is already declared as `{existing}`, cannot redeclare it as `{requested}`")]
    DuplicateVariable {
        name: String,
        existing: String,
        requested: String,
    },
    #[error("constant `{name}` cannot be redefined")]
    ConstantRedefinition { name: String },
    #[error("value `{value}` does not fit variable `{name}` of type `{ty}`")]
    ValueTypeMismatch {
        name: String,
        ty: String,
        value: String,
    },
    #[error("type mismatch: expected variable `{variable}` to be `{expected}` but got `{actual}`")]
    TypeMismatch {
        variable: String,
        expected: String,
        actual: String,
    },
    #[error("extern `{name}` does not exist")]
    UnknownExtern { name: String },
    #[error("invalid number of parameters for `{name}`: expected {expected} but got {actual}")]
    ParameterCount {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("parameter {index} of `{name}` is {direction} but was given the constant `{constant}`")]
    ConstantOutput {
        name: String,
        index: usize,
        direction: Direction,
        constant: String,
    },
    #[error("type mismatch: expected parameter {index} of `{name}` to be `{expected}` but got `{actual}`")]
    ParameterType {
        name: String,
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("unknown inline assembly instruction `{mnemonic}`")]
    UnknownMnemonic { mnemonic: String },
    #[error("inline assembly instruction `{mnemonic}` needs an operand")]
    MissingOperand { mnemonic: String },
    #[error("`{value}` is not a valid code address")]
    InvalidAddress { value: String },
    #[error("instruction {index} is not a jump")]
    NotAJump { index: usize },
    #[error("jump at 0x{offset:08X} was never given a destination")]
    UnresolvedJump { offset: u32 },
    #[error("cannot write assembly text")]
    Format(#[from] std::fmt::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub ty: TypeId,
    pub attributes: VariableAttributes,
    /// Initial heap value; `None` is null.
    pub value: Option<Value>,
}

/// Source of a pushed value: a named variable or a literal backed by a constant slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Variable(String),
    Constant(Value),
}

impl Operand {
    pub fn variable(name: impl Into<String>) -> Self {
        Operand::Variable(name.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstructionId(usize);

impl InstructionId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpTarget {
    /// Not known yet; must be patched before assembly.
    Unresolved,
    Address(u32),
    /// The address right after the given instruction, or 0 for `None`.
    After(Option<InstructionId>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Nop,
    Pop,
    Copy,
    Push(String),
    Jump(JumpTarget),
    JumpIfFalse(JumpTarget),
    JumpIndirect(String),
    Extern(String),
}

impl Instruction {
    pub fn size(&self) -> u32 {
        match self {
            Instruction::Nop | Instruction::Pop | Instruction::Copy => 4,
            _ => 8,
        }
    }
}

#[derive(Debug, Clone)]
struct Emitted {
    instruction: Instruction,
    offset: u32,
}

/// Entry of the loader's symbol table.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub ty: String,
    pub attributes: VariableAttributes,
    pub value: Option<Value>,
}

/// Append-only instruction stream plus the heap layout it refers to.
pub struct Builder<'c> {
    catalog: &'c Catalog,
    type_check: bool,
    instructions: Vec<Emitted>,
    variables: IndexMap<String, Variable>,
    constants: HashMap<Value, String>,
    entry_labels: HashMap<InstructionId, String>,
    pending_label: Option<String>,
    externs: IndexSet<String>,
}

impl<'c> Builder<'c> {
    pub fn new(catalog: &'c Catalog, type_check: bool) -> Self {
        Self {
            catalog,
            type_check,
            instructions: Vec::new(),
            variables: IndexMap::new(),
            constants: HashMap::new(),
            entry_labels: HashMap::new(),
            pending_label: None,
            externs: IndexSet::new(),
        }
    }

    pub fn catalog(&self) -> &'c Catalog {
        self.catalog
    }

    pub fn type_check(&self) -> bool {
        self.type_check
    }

    /// Declares or re-declares a heap variable.
    ///
    /// Names with a predefined role have their type pinned and keep only the
    /// public attribute. Without a type the value's type is used, falling
    /// back to `SystemObject`; primitive value types default to zero.
    pub fn define_variable(
        &mut self,
        name: &str,
        ty: Option<TypeId>,
        attributes: VariableAttributes,
        value: Option<Value>,
    ) -> Result<(), BuilderError> {
        if name.is_empty() {
            return Err(BuilderError::InvalidVariableName);
        }
        let types = self.catalog.types();
        let (ty, attributes) = match self.catalog.predefined_variable(name) {
            Some(fixed) => (Some(fixed), attributes & VariableAttributes::PUBLIC),
            None => (ty, attributes),
        };
        let ty = ty
            .or_else(|| value.as_ref().map(|v| types.type_of_value(v)))
            .unwrap_or_else(|| types.object());
        let value = value.or_else(|| types.default_value(ty));

        if ty != types.void() {
            if let Some(value) = &value {
                if !types.is_assignable_from(ty, types.type_of_value(value)) {
                    return Err(BuilderError::ValueTypeMismatch {
                        name: name.to_string(),
                        ty: types.name(ty).to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }

        if let Some(existing) = self.variables.get(name) {
            if existing.attributes.contains(VariableAttributes::CONSTANT) {
                if existing.ty != ty || existing.value != value {
                    return Err(BuilderError::ConstantRedefinition {
                        name: name.to_string(),
                    });
                }
            } else if existing.ty != ty {
                return Err(BuilderError::DuplicateVariable {
                    name: name.to_string(),
                    existing: types.name(existing.ty).to_string(),
                    requested: types.name(ty).to_string(),
                });
            }
        }

        if attributes.contains(VariableAttributes::CONSTANT) {
            let key = value.clone().unwrap_or(Value::Null);
            self.constants.entry(key).or_insert_with(|| name.to_string());
        }
        trace!(name, ty = types.name(ty), "define variable");
        self.variables.insert(
            name.to_string(),
            Variable {
                ty,
                attributes,
                value,
            },
        );
        Ok(())
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.variables.iter().map(|(name, var)| (name.as_str(), var))
    }

    /// Type of a variable, defining predefined names on first use.
    pub fn variable_type(&mut self, name: &str) -> Result<Option<TypeId>, BuilderError> {
        if !self.variables.contains_key(name) {
            if let Some(fixed) = self.catalog.predefined_variable(name) {
                self.define_variable(name, Some(fixed), VariableAttributes::empty(), None)?;
            }
        }
        Ok(self.variables.get(name).map(|var| var.ty))
    }

    /// Name of the read-only slot holding `value`, created on first use.
    pub fn constant(&mut self, value: &Value) -> Result<String, BuilderError> {
        if let Some(name) = self.constants.get(value) {
            return Ok(name.clone());
        }
        let types = self.catalog.types();
        let ty = types.constant_type(value);
        let base = if value.is_null() {
            format!("{CONSTANT_PREFIX}nil")
        } else {
            let mut stem = sanitize(&format!("{}_{}", types.get(ty).short_name, value));
            stem.truncate(MAX_CONSTANT_STEM);
            format!("{CONSTANT_PREFIX}{stem}")
        };
        let mut name = base.clone();
        let mut suffix = 0;
        while self.variables.contains_key(&name) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        let stored = (!value.is_null()).then(|| value.clone());
        self.define_variable(&name, Some(ty), VariableAttributes::CONSTANT, stored)?;
        Ok(name)
    }

    fn operand_name(&mut self, operand: &Operand) -> Result<String, BuilderError> {
        match operand {
            Operand::Variable(name) => Ok(name.clone()),
            Operand::Constant(value) => self.constant(value),
        }
    }

    /// Validates `name` against `expected`, or declares it with that type if unknown.
    fn check_variable(
        &mut self,
        name: &str,
        expected: Option<TypeId>,
        strict: bool,
    ) -> Result<(), BuilderError> {
        if name.is_empty() {
            return Err(BuilderError::InvalidVariableName);
        }
        match self.variable_type(name)? {
            Some(actual) => {
                let Some(expected) = expected.filter(|_| self.type_check) else {
                    return Ok(());
                };
                let types = self.catalog.types();
                let matches = if strict {
                    actual == expected
                } else {
                    types.is_compatible(actual, expected)
                };
                if !matches {
                    return Err(BuilderError::TypeMismatch {
                        variable: name.to_string(),
                        expected: types.name(expected).to_string(),
                        actual: types.name(actual).to_string(),
                    });
                }
                Ok(())
            }
            None => self.define_variable(name, expected, VariableAttributes::empty(), None),
        }
    }

    fn emit(&mut self, instruction: Instruction) -> InstructionId {
        let id = InstructionId(self.instructions.len());
        let offset = self.size();
        if let Some(label) = self.pending_label.take() {
            self.entry_labels.insert(id, label);
        }
        trace!(offset, ?instruction, "emit");
        self.instructions.push(Emitted {
            instruction,
            offset,
        });
        id
    }

    /// Byte size of the code emitted so far.
    pub fn size(&self) -> u32 {
        self.instructions
            .last()
            .map_or(0, |last| last.offset + last.instruction.size())
    }

    pub fn last_instruction(&self) -> Option<InstructionId> {
        self.instructions.len().checked_sub(1).map(InstructionId)
    }

    pub fn instruction(&self, id: InstructionId) -> Option<&Instruction> {
        self.instructions.get(id.0).map(|e| &e.instruction)
    }

    pub fn offset(&self, id: InstructionId) -> Option<u32> {
        self.instructions.get(id.0).map(|e| e.offset)
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().map(|e| &e.instruction)
    }

    pub fn emit_nop(&mut self) -> InstructionId {
        self.emit(Instruction::Nop)
    }

    pub fn emit_pop(&mut self) -> InstructionId {
        self.emit(Instruction::Pop)
    }

    /// Bare `COPY`; the operands must already be pushed.
    pub fn emit_copy_raw(&mut self) -> InstructionId {
        self.emit(Instruction::Copy)
    }

    pub fn emit_push(&mut self, operand: &Operand) -> Result<InstructionId, BuilderError> {
        let name = self.operand_name(operand)?;
        self.push_checked(&name, None, false)
    }

    fn push_checked(
        &mut self,
        name: &str,
        expected: Option<TypeId>,
        strict: bool,
    ) -> Result<InstructionId, BuilderError> {
        self.check_variable(name, expected, strict)?;
        Ok(self.emit(Instruction::Push(name.to_string())))
    }

    /// `PUSH from, PUSH to, COPY`, checking `to` against the type of `from`.
    pub fn emit_copy(&mut self, from: &Operand, to: &str) -> Result<InstructionId, BuilderError> {
        let from = self.operand_name(from)?;
        self.push_checked(&from, None, false)?;
        let source_type = self
            .variables
            .get(&from)
            .map_or_else(|| self.catalog.types().object(), |var| var.ty);
        self.push_checked(to, Some(source_type), false)?;
        Ok(self.emit(Instruction::Copy))
    }

    /// Stores the address `relative` bytes past the end of this copy sequence into `dest`.
    pub fn emit_copy_offset(&mut self, dest: &str, relative: u32) -> Result<InstructionId, BuilderError> {
        if !self.variables.contains_key(dest) {
            let uint = self.catalog.types().builtin(UINT32);
            self.define_variable(dest, Some(uint), VariableAttributes::empty(), None)?;
        }
        let address = COPY_SEQUENCE_SIZE
            .checked_add(self.size())
            .and_then(|a| a.checked_add(relative))
            .ok_or_else(|| BuilderError::InvalidAddress {
                value: format!("{} + {relative}", self.size()),
            })?;
        self.emit_copy(&Operand::Constant(Value::U32(address)), dest)
    }

    pub fn emit_jump(&mut self, target: JumpTarget) -> InstructionId {
        self.emit(Instruction::Jump(target))
    }

    /// `PUSH condition, JUMP_IF_FALSE target`; the condition must be a `SystemBoolean`.
    pub fn emit_jump_if_false(
        &mut self,
        condition: &str,
        target: JumpTarget,
    ) -> Result<InstructionId, BuilderError> {
        let boolean = self.catalog.types().builtin(BOOLEAN);
        self.push_checked(condition, Some(boolean), true)?;
        Ok(self.emit(Instruction::JumpIfFalse(target)))
    }

    /// `JUMP_IF_FALSE` on whatever is already on the stack.
    pub fn emit_jump_if_false_raw(&mut self, target: JumpTarget) -> InstructionId {
        self.emit(Instruction::JumpIfFalse(target))
    }

    pub fn emit_jump_indirect(&mut self, address: &str) -> Result<InstructionId, BuilderError> {
        let uint = self.catalog.types().builtin(UINT32);
        self.check_variable(address, Some(uint), true)?;
        Ok(self.emit(Instruction::JumpIndirect(address.to_string())))
    }

    /// Bare `EXTERN`; the arguments must already be pushed.
    pub fn emit_extern(&mut self, name: &str) -> Result<InstructionId, BuilderError> {
        if name.is_empty() || (self.type_check && self.catalog.operation_by_name(name).is_none()) {
            return Err(BuilderError::UnknownExtern {
                name: name.to_string(),
            });
        }
        self.externs.insert(name.to_string());
        Ok(self.emit(Instruction::Extern(name.to_string())))
    }

    /// Pushes every argument, including the return slot, then emits the `EXTERN`.
    /// With type checking on, each argument is validated against its parameter direction.
    pub fn emit_call(&mut self, name: &str, operands: &[Operand]) -> Result<InstructionId, BuilderError> {
        let mut arguments = Vec::with_capacity(operands.len());
        for operand in operands {
            arguments.push(self.operand_name(operand)?);
        }

        if self.type_check {
            let catalog = self.catalog;
            let types = catalog.types();
            let operation = catalog
                .operation_by_name(name)
                .ok_or_else(|| BuilderError::UnknownExtern {
                    name: name.to_string(),
                })?;
            if operation.parameters.len() != arguments.len() {
                return Err(BuilderError::ParameterCount {
                    name: name.to_string(),
                    expected: operation.parameters.len(),
                    actual: arguments.len(),
                });
            }
            for (index, (argument, parameter)) in arguments.iter().zip(&operation.parameters).enumerate() {
                let Some(variable) = self.variables.get(argument) else {
                    self.define_variable(argument, Some(parameter.ty), VariableAttributes::empty(), None)?;
                    continue;
                };
                let constant = variable.attributes.contains(VariableAttributes::CONSTANT);
                if constant && parameter.direction != Direction::In {
                    return Err(BuilderError::ConstantOutput {
                        name: name.to_string(),
                        index,
                        direction: parameter.direction,
                        constant: argument.clone(),
                    });
                }
                let accepted = match parameter.direction {
                    Direction::In => types.accepts(parameter.ty, variable.ty),
                    Direction::Out => types.is_compatible(parameter.ty, variable.ty),
                    Direction::InOut => parameter.ty == variable.ty,
                };
                if !accepted {
                    return Err(BuilderError::ParameterType {
                        name: name.to_string(),
                        index,
                        expected: types.name(parameter.ty).to_string(),
                        actual: types.name(variable.ty).to_string(),
                    });
                }
            }
        }

        for argument in &arguments {
            self.push_checked(argument, None, false)?;
        }
        self.emit_extern(name)
    }

    /// Labels the next emitted instruction as an exported entry point.
    pub fn define_event(&mut self, label: &str) {
        self.pending_label = Some(label.to_string());
    }

    pub fn patch_jump(&mut self, id: InstructionId, target: JumpTarget) -> Result<(), BuilderError> {
        match self.instructions.get_mut(id.0).map(|e| &mut e.instruction) {
            Some(Instruction::Jump(slot)) | Some(Instruction::JumpIfFalse(slot)) => {
                trace!(index = id.0, ?target, "patch jump");
                *slot = target;
                Ok(())
            }
            _ => Err(BuilderError::NotAJump { index: id.0 }),
        }
    }

    fn address_of(&self, target: JumpTarget, at: u32) -> Result<u32, BuilderError> {
        match target {
            JumpTarget::Unresolved => Err(BuilderError::UnresolvedJump { offset: at }),
            JumpTarget::Address(address) => Ok(address),
            JumpTarget::After(None) => Ok(0),
            JumpTarget::After(Some(id)) => self
                .instructions
                .get(id.0)
                .map(|e| e.offset + e.instruction.size())
                .ok_or(BuilderError::NotAJump { index: id.0 }),
        }
    }

    fn render(&self, emitted: &Emitted) -> Result<String, BuilderError> {
        let line = match &emitted.instruction {
            Instruction::Nop => "NOP".to_string(),
            Instruction::Pop => "POP".to_string(),
            Instruction::Copy => "COPY".to_string(),
            Instruction::Push(name) => format!("PUSH, {name}"),
            Instruction::Jump(target) => {
                format!("JUMP, 0x{:08X}", self.address_of(*target, emitted.offset)?)
            }
            Instruction::JumpIfFalse(target) => {
                format!("JUMP_IF_FALSE, 0x{:08X}", self.address_of(*target, emitted.offset)?)
            }
            Instruction::JumpIndirect(name) => format!("JUMP_INDIRECT, {name}"),
            Instruction::Extern(name) => format!("EXTERN, \"{name}\""),
        };
        Ok(line)
    }

    /// Two-section assembly text: heap declarations, then one mnemonic per instruction.
    pub fn assemble(&self) -> Result<String, BuilderError> {
        let types = self.catalog.types();
        let mut out = String::from(".data_start\n");
        for (name, var) in &self.variables {
            if var.attributes.contains(VariableAttributes::PUBLIC) {
                writeln!(out, ".export {name}")?;
            }
            let sync = var.attributes & VariableAttributes::SYNC;
            let mode = if sync == VariableAttributes::SYNC_NONE {
                Some("none")
            } else if sync == VariableAttributes::SYNC_LINEAR {
                Some("linear")
            } else if sync == VariableAttributes::SYNC_SMOOTH {
                Some("smooth")
            } else {
                None
            };
            if let Some(mode) = mode {
                writeln!(out, ".sync {name}, {mode}")?;
            }
        }
        for (name, var) in &self.variables {
            let initial = if var.attributes.contains(VariableAttributes::DEFAULT_THIS) {
                "this"
            } else {
                "null"
            };
            writeln!(out, "{name}: %{}, {initial}", types.name(var.ty))?;
        }
        out.push_str(".data_end\n.code_start\n");
        for (index, emitted) in self.instructions.iter().enumerate() {
            if let Some(label) = self.entry_labels.get(&InstructionId(index)) {
                writeln!(out, ".export {label}\n{label}:")?;
            }
            out.push_str(&self.render(emitted)?);
            out.push('\n');
        }
        out.push_str(".code_end\n");
        Ok(out)
    }

    /// Initial heap contents for the loader, skipping `this` slots and void constants.
    pub fn symbols(&self) -> IndexMap<String, Symbol> {
        let types = self.catalog.types();
        self.variables
            .iter()
            .filter(|(_, var)| {
                !var.attributes.contains(VariableAttributes::DEFAULT_THIS) && var.ty != types.void()
            })
            .map(|(name, var)| {
                (
                    name.clone(),
                    Symbol {
                        ty: types.name(var.ty).to_string(),
                        attributes: var.attributes,
                        value: var.value.clone(),
                    },
                )
            })
            .collect()
    }

    /// Heap slots the program needs: one per variable plus one per distinct extern.
    pub fn heap_size(&self) -> usize {
        self.variables.len() + self.externs.len()
    }

    pub fn entry_labels(&self) -> Vec<&str> {
        let mut labels: Vec<(&InstructionId, &String)> = self.entry_labels.iter().collect();
        labels.sort_by_key(|(id, _)| id.0);
        labels.into_iter().map(|(_, label)| label.as_str()).collect()
    }
}

/// Collapses every run of characters that cannot appear in a heap symbol into `_`.
fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}
