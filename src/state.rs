use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;
use tracing::trace;

use crate::builder::{
    Builder, BuilderError, InstructionId, JumpTarget, VariableAttributes, RETURN_ADDRESS,
};
use crate::catalog::{Catalog, OperationId};
use crate::node::{NodeId, Tree};
use crate::types::{TypeId, UINT32};
use crate::value::Value;

/// What a node compiles to, decided once by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Construct {
    Literal,
    /// Tagless list; the last child is the value.
    Sequence,
    Get,
    Set,
    Declare,
    If,
    While,
    When,
    InlineAsm,
    TypeOf(TypeId),
    Call(OperationId),
    Cast(TypeId),
    CallEvent,
    ArrayFill(TypeId),
}

/// Dispatch metadata of one event label, shared by every `when` block for it.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    /// UInt32 variable holding the address to return to.
    pub return_pointer: String,
    /// `when` blocks declared for this label.
    pub blocks: usize,
    /// Blocks compiled so far.
    pub compiled: usize,
    /// Where callers jump to; known once the first block starts.
    pub body_start: Option<JumpTarget>,
    /// Jump ending the previous block, waiting for the next block's start.
    pub chain: Option<InstructionId>,
    /// Caller jumps emitted before `body_start` was known.
    pub landing_points: Vec<InstructionId>,
}

impl EntryPoint {
    fn new(return_pointer: String) -> Self {
        Self {
            return_pointer,
            blocks: 0,
            compiled: 0,
            body_start: None,
            chain: None,
            landing_points: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct TempPool {
    free: VecDeque<String>,
    serial: usize,
}

/// Everything one compile call accumulates: side tables keyed by node, event
/// metadata and the temp variable pool.
pub struct AssemblerState<'c> {
    pub(crate) builder: Builder<'c>,
    catalog: &'c Catalog,
    node_types: Vec<Option<TypeId>>,
    constructs: Vec<Option<Construct>>,
    entry_points: IndexMap<String, EntryPoint>,
    rented: HashMap<String, TypeId>,
    pools: HashMap<TypeId, TempPool>,
}

impl<'c> AssemblerState<'c> {
    pub fn new(catalog: &'c Catalog, tree: &Tree, type_check: bool) -> Self {
        Self {
            builder: Builder::new(catalog, type_check),
            catalog,
            node_types: vec![None; tree.len()],
            constructs: vec![None; tree.len()],
            entry_points: IndexMap::new(),
            rented: HashMap::new(),
            pools: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &'c Catalog {
        self.catalog
    }

    pub fn builder(&self) -> &Builder<'c> {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut Builder<'c> {
        &mut self.builder
    }

    pub fn node_type(&self, node: NodeId) -> Option<TypeId> {
        self.node_types.get(node.index()).copied().flatten()
    }

    pub fn construct(&self, node: NodeId) -> Option<Construct> {
        self.constructs.get(node.index()).copied().flatten()
    }

    pub(crate) fn record(&mut self, node: NodeId, construct: Option<Construct>, ty: Option<TypeId>) {
        let index = node.index();
        if index >= self.constructs.len() {
            self.constructs.resize(index + 1, None);
            self.node_types.resize(index + 1, None);
        }
        self.constructs[index] = construct;
        self.node_types[index] = ty;
    }

    pub fn entry_point(&self, label: &str) -> Option<&EntryPoint> {
        self.entry_points.get(label)
    }

    pub(crate) fn entry_point_mut(&mut self, label: &str) -> Option<&mut EntryPoint> {
        self.entry_points.get_mut(label)
    }

    pub fn entry_point_labels(&self) -> impl Iterator<Item = &str> {
        self.entry_points.keys().map(String::as_str)
    }

    /// Registers one more `when` block for `label`, creating its return pointer on first sight.
    pub fn declare_entry_point(&mut self, label: &str) -> Result<&EntryPoint, BuilderError> {
        let pointer = match self.entry_points.get(label) {
            Some(entry) => entry.return_pointer.clone(),
            None => self.define_return_pointer(label)?,
        };
        let entry = self
            .entry_points
            .entry(label.to_string())
            .or_insert_with(|| EntryPoint::new(pointer));
        entry.blocks += 1;
        Ok(entry)
    }

    fn define_return_pointer(&mut self, label: &str) -> Result<String, BuilderError> {
        let base = format!("__{label}_return");
        let mut name = base.clone();
        let mut suffix = 0;
        while self.builder.variable_type(&name)?.is_some() {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        let uint = self.catalog.types().builtin(UINT32);
        self.builder.define_variable(
            &name,
            Some(uint),
            VariableAttributes::empty(),
            Some(Value::U32(RETURN_ADDRESS)),
        )?;
        Ok(name)
    }

    /// Hands out a scratch variable of type `ty`, reusing returned ones first.
    pub fn rent(&mut self, ty: TypeId) -> Result<String, BuilderError> {
        let pool = self.pools.entry(ty).or_default();
        if let Some(name) = pool.free.pop_front() {
            trace!(name = %name, "reuse temp");
            self.rented.insert(name.clone(), ty);
            return Ok(name);
        }
        let base = format!("__temp_{}", self.catalog.types().name(ty));
        let mut serial = pool.serial;
        let name = loop {
            let candidate = format!("{base}_{serial}");
            if self.builder.variable_type(&candidate)?.is_none() {
                break candidate;
            }
            serial += 1;
        };
        if let Some(pool) = self.pools.get_mut(&ty) {
            pool.serial = serial + 1;
        }
        self.builder
            .define_variable(&name, Some(ty), VariableAttributes::empty(), None)?;
        trace!(name = %name, "new temp");
        self.rented.insert(name.clone(), ty);
        Ok(name)
    }

    /// Returns a rented variable to its pool; names that were not rented are ignored.
    pub fn give_back(&mut self, name: &str) {
        if let Some(ty) = self.rented.remove(name) {
            trace!(name, "return temp");
            self.pools.entry(ty).or_default().free.push_back(name.to_string());
        }
    }

    pub fn rented_count(&self) -> usize {
        self.rented.len()
    }

    pub fn into_builder(self) -> Builder<'c> {
        self.builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude;
    use crate::types::INT32;

    fn catalog() -> Catalog {
        Catalog::from_source(&prelude::core_source()).expect("core catalog")
    }

    #[test]
    fn temps_are_reused_after_return() {
        let catalog = catalog();
        let tree = Tree::new(Value::Null);
        let mut state = AssemblerState::new(&catalog, &tree, true);
        let int = catalog.types().builtin(INT32);

        let first: Vec<String> = (0..3).map(|_| state.rent(int).expect("rent")).collect();
        assert_eq!(first[0], "__temp_SystemInt32_0");
        assert_eq!(first[2], "__temp_SystemInt32_2");
        let defined = state.builder().variables().count();
        for name in &first {
            state.give_back(name);
        }
        assert_eq!(state.rented_count(), 0);

        let second: Vec<String> = (0..3).map(|_| state.rent(int).expect("rent")).collect();
        assert_eq!(state.builder().variables().count(), defined);
        assert_eq!(second, first);
        assert_eq!(state.rented_count(), 3);
    }

    #[test]
    fn giving_back_twice_does_not_duplicate() {
        let catalog = catalog();
        let tree = Tree::new(Value::Null);
        let mut state = AssemblerState::new(&catalog, &tree, true);
        let int = catalog.types().builtin(INT32);
        let name = state.rent(int).expect("rent");
        state.give_back(&name);
        state.give_back(&name);
        state.give_back("not_a_temp");
        let a = state.rent(int).expect("rent");
        let b = state.rent(int).expect("rent");
        assert_eq!(a, name);
        assert_ne!(a, b);
    }

    #[test]
    fn temp_names_skip_existing_variables() {
        let catalog = catalog();
        let tree = Tree::new(Value::Null);
        let mut state = AssemblerState::new(&catalog, &tree, true);
        let int = catalog.types().builtin(INT32);
        state
            .builder_mut()
            .define_variable("__temp_SystemInt32_0", Some(int), VariableAttributes::empty(), None)
            .expect("define");
        assert_eq!(state.rent(int).expect("rent"), "__temp_SystemInt32_1");
    }

    #[test]
    fn entry_points_share_a_return_pointer() {
        let catalog = catalog();
        let tree = Tree::new(Value::Null);
        let mut state = AssemblerState::new(&catalog, &tree, true);
        state
            .builder_mut()
            .define_variable("___start_return", None, VariableAttributes::empty(), None)
            .expect("define");
        let pointer = state
            .declare_entry_point("_start")
            .expect("declare")
            .return_pointer
            .clone();
        assert_eq!(pointer, "___start_return_0");
        let entry = state.declare_entry_point("_start").expect("declare again");
        assert_eq!(entry.return_pointer, pointer);
        assert_eq!(entry.blocks, 2);
        let var = state.builder().variable(&pointer).expect("pointer");
        assert_eq!(var.value, Some(Value::U32(RETURN_ADDRESS)));
    }
}
