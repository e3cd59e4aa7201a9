use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::prelude;
use crate::types::{TypeId, TypeTable, VOID};

/// Upper bound on results returned by [`Catalog::query`].
pub const QUERY_LIMIT: usize = 100;

/// Variable the body of an event writes its result into.
pub const RETURN_VALUE: &str = "__returnValue";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unknown type `{name}` referenced by `{context}`")]
    UnknownType { name: String, context: String },
    #[error("operation name `{name}` is not of the form `Owner.__method__params__return`")]
    MalformedOperationName { name: String },
    #[error("type `{name}` is declared more than once")]
    DuplicateType { name: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    #[default]
    In,
    Out,
    InOut,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::InOut => "in/out",
        })
    }
}

/// Host-supplied catalog contents, loadable from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSource {
    #[serde(default)]
    pub types: Vec<TypeDecl>,
    #[serde(default)]
    pub operations: Vec<OperationDecl>,
    #[serde(default)]
    pub events: Vec<EventDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub short_name: String,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub value_type: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDecl {
    /// Fully qualified name, e.g. `SystemInt32.__op_Addition__SystemInt32_SystemInt32__SystemInt32`.
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDecl {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDecl {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDecl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(usize);

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub ty: TypeId,
    pub direction: Direction,
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub full_name: String,
    pub owner: TypeId,
    pub parameters: Vec<Parameter>,
}

impl Operation {
    /// Method part of the full name (`op_Addition`, `get_Length`, `ctor`, ...).
    pub fn method(&self) -> &str {
        self.full_name.split("__").nth(1).unwrap_or_default()
    }

    /// Parameters a call site supplies; a trailing OUT parameter is the return slot.
    pub fn arity(&self) -> usize {
        match self.parameters.last() {
            Some(last) if last.direction == Direction::Out => self.parameters.len() - 1,
            _ => self.parameters.len(),
        }
    }

    pub fn return_type(&self) -> Option<TypeId> {
        let arity = self.arity();
        self.parameters.get(arity).map(|p| p.ty)
    }

    fn same_signature(&self, other: &Operation) -> bool {
        self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .zip(&other.parameters)
                .all(|(a, b)| {
                    a.direction == b.direction && (a.direction == Direction::Out || a.ty == b.ty)
                })
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    /// Name as declared by the host, e.g. `Start`.
    pub name: String,
    /// Entry label used in source and assembly, e.g. `_start`.
    pub label: String,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    Type,
    Constructor,
    Cast,
    Operator,
    Property,
    Method,
    Event,
}

/// One entry of the interactive reference.
#[derive(Debug, Clone)]
pub struct OperationSummary {
    pub kind: SummaryKind,
    pub title: String,
    pub signature: String,
    pub usage: String,
}

impl OperationSummary {
    fn matches(&self, needle: &str) -> bool {
        [&self.title, &self.signature, &self.usage]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Immutable index over host operations, types and events.
#[derive(Debug, Clone)]
pub struct Catalog {
    types: TypeTable,
    operations: Vec<Operation>,
    by_full_name: HashMap<String, OperationId>,
    overloads: HashMap<(String, usize), Vec<OperationId>>,
    events: IndexMap<String, Event>,
    predefined: HashMap<String, TypeId>,
    summaries: Vec<OperationSummary>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::empty()
    }
}

impl Catalog {
    /// Catalog holding only built-in types and intrinsic operations.
    pub fn empty() -> Self {
        let mut catalog = Self {
            types: TypeTable::new(),
            operations: Vec::new(),
            by_full_name: HashMap::new(),
            overloads: HashMap::new(),
            events: IndexMap::new(),
            predefined: HashMap::new(),
            summaries: Vec::new(),
        };
        catalog.predefined.insert(RETURN_VALUE.to_string(), catalog.types.object());
        catalog
    }

    pub fn from_source(source: &CatalogSource) -> Result<Self, CatalogError> {
        let mut catalog = Self::empty();
        catalog.load(source)?;
        Ok(catalog)
    }

    /// Rebuilds the index in place, e.g. after the host's plugin set changed.
    /// On error the previous contents are kept.
    pub fn reload(&mut self, source: &CatalogSource) -> Result<(), CatalogError> {
        *self = Self::from_source(source)?;
        Ok(())
    }

    fn load(&mut self, source: &CatalogSource) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        if let Some(decl) = source.types.iter().find(|decl| !seen.insert(decl.name.as_str())) {
            return Err(CatalogError::DuplicateType {
                name: decl.name.clone(),
            });
        }
        let declared: Vec<TypeId> = source
            .types
            .iter()
            .map(|decl| self.types.declare(&decl.name, &decl.short_name, decl.value_type))
            .collect();
        for (decl, &id) in source.types.iter().zip(&declared) {
            if let Some(base) = &decl.base {
                let base = self.resolve_type(base, &decl.name)?;
                self.types.set_base(id, base);
            }
        }
        for &id in &declared {
            self.types.array_of(id);
        }

        let intrinsics = prelude::intrinsic_operations();
        for decl in source.operations.iter().chain(&intrinsics) {
            if self.by_full_name.contains_key(&decl.name) {
                continue;
            }
            let operation = self.build_operation(decl)?;
            self.register(operation);
        }
        for list in self.overloads.values_mut() {
            sort_candidates(list, &self.operations, &self.types);
        }

        for decl in &source.events {
            let parameters = self.build_parameters(&decl.parameters, &decl.name)?;
            let stem = lower_first(&decl.name);
            for parameter in &parameters {
                let variable = format!("{stem}{}", upper_first(&parameter.name));
                self.predefined.insert(variable, parameter.ty);
            }
            let label = format!("_{stem}");
            self.events.insert(
                label.clone(),
                Event {
                    name: decl.name.clone(),
                    label,
                    parameters,
                },
            );
        }

        self.summaries = self.build_summaries();
        debug!(
            types = self.types.len(),
            operations = self.operations.len(),
            names = self.overloads.len(),
            events = self.events.len(),
            "catalog indexed"
        );
        Ok(())
    }

    fn resolve_type(&mut self, name: &str, context: &str) -> Result<TypeId, CatalogError> {
        self.types
            .resolve(name)
            .ok_or_else(|| CatalogError::UnknownType {
                name: name.to_string(),
                context: context.to_string(),
            })
    }

    fn build_parameters(
        &mut self,
        decls: &[ParameterDecl],
        context: &str,
    ) -> Result<Vec<Parameter>, CatalogError> {
        decls
            .iter()
            .map(|p| {
                Ok(Parameter {
                    name: p.name.clone(),
                    ty: self.resolve_type(&p.ty, context)?,
                    direction: p.direction,
                })
            })
            .collect()
    }

    fn build_operation(&mut self, decl: &OperationDecl) -> Result<Operation, CatalogError> {
        if decl.name.split("__").count() < 2 {
            return Err(CatalogError::MalformedOperationName {
                name: decl.name.clone(),
            });
        }
        let owner = self.resolve_type(&decl.owner, &decl.name)?;
        let parameters = self.build_parameters(&decl.parameters, &decl.name)?;
        Ok(Operation {
            full_name: decl.name.clone(),
            owner,
            parameters,
        })
    }

    fn register(&mut self, operation: Operation) {
        let id = OperationId(self.operations.len());
        let arity = operation.arity();
        let names = display_names(&operation, &self.types);
        self.by_full_name.insert(operation.full_name.clone(), id);
        self.operations.push(operation);
        for name in names {
            let list = self.overloads.entry((name, arity)).or_default();
            add_candidate(list, id, &self.operations, &self.types);
        }
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn operation(&self, id: OperationId) -> &Operation {
        &self.operations[id.0]
    }

    pub fn operation_by_name(&self, full_name: &str) -> Option<&Operation> {
        self.by_full_name
            .get(full_name)
            .map(|&id| &self.operations[id.0])
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    /// Candidates for a call name and argument count, in resolution order.
    pub fn candidates(&self, name: &str, arity: usize) -> &[OperationId] {
        self.overloads
            .get(&(name.to_string(), arity))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_name(&self, name: &str, arity: usize) -> bool {
        !self.candidates(name, arity).is_empty()
    }

    /// First candidate whose parameters accept the argument types.
    pub fn resolve_overload(&self, name: &str, arguments: &[TypeId]) -> Option<OperationId> {
        self.candidates(name, arguments.len())
            .iter()
            .copied()
            .find(|&id| self.accepts_arguments(&self.operations[id.0], arguments))
    }

    fn accepts_arguments(&self, operation: &Operation, arguments: &[TypeId]) -> bool {
        operation
            .parameters
            .iter()
            .zip(arguments)
            .all(|(parameter, &argument)| match parameter.direction {
                Direction::In => self.types.is_assignable_from(parameter.ty, argument),
                Direction::Out => self.types.is_assignable_from(argument, parameter.ty),
                Direction::InOut => parameter.ty == argument,
            })
    }

    pub fn event(&self, label: &str) -> Option<&Event> {
        self.events.get(label)
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    /// Type pinned for a variable with a conventional role.
    pub fn predefined_variable(&self, name: &str) -> Option<TypeId> {
        self.predefined.get(name).copied()
    }

    /// Case-insensitive substring search over types, operations and events.
    /// The sequence is lazy and yields at most [`QUERY_LIMIT`] entries.
    pub fn query<'a>(&'a self, text: &str) -> impl Iterator<Item = &'a OperationSummary> + 'a {
        let needle = text.trim().to_lowercase();
        self.summaries
            .iter()
            .filter(move |summary| summary.matches(&needle))
            .take(QUERY_LIMIT)
    }

    fn build_summaries(&self) -> Vec<OperationSummary> {
        let mut summaries = Vec::new();
        for (_, info) in self.types.iter() {
            if info.name == VOID {
                continue;
            }
            summaries.push(OperationSummary {
                kind: SummaryKind::Type,
                title: info.short_name.clone(),
                signature: info.name.clone(),
                usage: format!("var(name, {}, )", info.name),
            });
        }
        for operation in &self.operations {
            let names = display_names(operation, &self.types);
            let Some(title) = names.first() else {
                continue;
            };
            let arguments: Vec<String> = operation.parameters[..operation.arity()]
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    if p.name.is_empty() {
                        format!("$(arg{i})")
                    } else {
                        format!("$({})", p.name)
                    }
                })
                .collect();
            let usage = if arguments.is_empty() {
                format!("({title})")
            } else {
                format!("{title}({})", arguments.join(", "))
            };
            summaries.push(OperationSummary {
                kind: summary_kind(operation.method()),
                title: title.clone(),
                signature: operation.full_name.clone(),
                usage,
            });
        }
        for event in self.events.values() {
            summaries.push(OperationSummary {
                kind: SummaryKind::Event,
                title: event.label.clone(),
                signature: event.name.clone(),
                usage: format!("when({}, ...)", event.label),
            });
        }
        summaries
    }
}

fn summary_kind(method: &str) -> SummaryKind {
    if method == "ctor" {
        SummaryKind::Constructor
    } else if matches!(method, "op_Explicit" | "op_Implicit") {
        SummaryKind::Cast
    } else if operator_symbol(method).is_some() {
        SummaryKind::Operator
    } else if method.starts_with("get_") || method.starts_with("set_") {
        SummaryKind::Property
    } else {
        SummaryKind::Method
    }
}

/// Operator methods and the symbol they are called by in source.
static OPERATORS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("op_UnaryPlus", "+"),
        ("op_Addition", "+"),
        ("op_UnaryMinus", "-"),
        ("op_Subtraction", "-"),
        ("op_Increment", "++"),
        ("op_Decrement", "--"),
        ("op_Multiply", "*"),
        ("op_Multiplication", "*"),
        ("op_Division", "/"),
        ("op_Remainder", "%"),
        ("op_Modulus", "%"),
        ("op_Equality", "=="),
        ("op_Inequality", "!="),
        ("op_GreaterThan", ">"),
        ("op_GreaterThanOrEqual", ">="),
        ("op_LessThan", "<"),
        ("op_LessThanOrEqual", "<="),
        ("op_LeftShift", "<<"),
        ("op_RightShift", ">>"),
        ("op_LogicalAnd", "&"),
        ("op_ConditionalAnd", "&"),
        ("op_LogicalOr", "|"),
        ("op_ConditionalOr", "|"),
        ("op_LogicalXor", "^"),
        ("op_ConditionalXor", "^"),
        ("op_UnaryNegation", "~"),
    ])
});

fn operator_symbol(method: &str) -> Option<&'static str> {
    OPERATORS.get(method).copied()
}

/// Source-level names an operation is callable by; the first one is canonical.
pub fn display_names(operation: &Operation, types: &TypeTable) -> Vec<String> {
    let method = operation.method();
    let owner = types.get(operation.owner);
    let (short, udon) = (owner.short_name.as_str(), owner.name.as_str());
    let mut names = Vec::new();

    if method == "ctor" {
        names.push(format!("Create{short}"));
        names.push(format!("Create{udon}"));
    } else if matches!(method, "op_Explicit" | "op_Implicit") {
        if let Some(target) = operation.return_type() {
            let target = types.get(target);
            names.push(format!("!{}", target.short_name));
            names.push(format!("!{}", target.name));
        }
    } else if let Some(symbol) = operator_symbol(method) {
        names.push(symbol.to_string());
    } else if method.starts_with("op_") {
        names.push(method.to_string());
    } else {
        let arity = operation.arity();
        let instance = arity > 0 && operation.parameters[0].ty == operation.owner;
        if let Some(property) = method.strip_prefix("get_") {
            let property = upper_first(property);
            names.push(format!("Get{short}{property}"));
            names.push(format!("Get{udon}{property}"));
            if instance {
                names.push(format!("Get{property}"));
            }
        } else if let Some(property) = method.strip_prefix("set_") {
            let property = upper_first(property);
            names.push(format!("Set{short}{property}"));
            names.push(format!("Set{udon}{property}"));
            if instance {
                names.push(format!("Set{property}"));
            }
        } else {
            let capitalized = upper_first(method);
            names.push(format!("{short}{capitalized}"));
            names.push(format!("{udon}{capitalized}"));
            if instance {
                names.push(method.to_string());
            }
        }
    }

    let mut unique = Vec::with_capacity(names.len());
    for name in names {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }
    unique
}

/// Appends a candidate, collapsing identical signatures onto the more general owner.
fn add_candidate(
    list: &mut Vec<OperationId>,
    id: OperationId,
    operations: &[Operation],
    types: &TypeTable,
) {
    let incoming = &operations[id.0];
    match list
        .iter_mut()
        .find(|existing| operations[existing.0].same_signature(incoming))
    {
        None => list.push(id),
        Some(existing) => {
            if !types.is_assignable_from(operations[existing.0].owner, incoming.owner) {
                *existing = id;
            }
        }
    }
}

/// Stable insertion sort; the comparator is not a total order, so the
/// standard sorts are not used.
fn sort_candidates(list: &mut [OperationId], operations: &[Operation], types: &TypeTable) {
    for i in 1..list.len() {
        let mut j = i;
        while j > 0
            && compare_specificity(&operations[list[j - 1].0], &operations[list[j].0], types)
                == Ordering::Greater
        {
            list.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// Positive when `lhs` takes more general parameters than `rhs`.
fn compare_specificity(lhs: &Operation, rhs: &Operation, types: &TypeTable) -> Ordering {
    if lhs.parameters.len() != rhs.parameters.len() {
        return Ordering::Equal;
    }
    let mut score: i64 = 0;
    for (l, r) in lhs.parameters.iter().zip(&rhs.parameters).rev() {
        if l.direction == Direction::Out && r.direction == Direction::Out {
            continue;
        }
        if l.ty == r.ty {
            continue;
        }
        let (lt, rt) = (types.get(l.ty), types.get(r.ty));
        if let (Some(le), Some(re)) = (lt.element, rt.element) {
            score += value_type_score(types.get(le).value_type, types.get(re).value_type);
        } else if lt.value_type || rt.value_type {
            score += value_type_score(lt.value_type, rt.value_type);
        } else if let Some(steps) = types.distance(l.ty, r.ty) {
            score += steps as i64;
        } else if let Some(steps) = types.distance(r.ty, l.ty) {
            score -= steps as i64;
        }
    }
    score.cmp(&0)
}

fn value_type_score(lhs: bool, rhs: bool) -> i64 {
    match (lhs, rhs) {
        (true, true) => 0,
        (true, false) => -1,
        (false, _) => 1,
    }
}

fn lower_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn upper_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BOOLEAN, INT32};

    fn param(ty: &str, direction: Direction) -> ParameterDecl {
        ParameterDecl {
            name: String::new(),
            ty: ty.to_string(),
            direction,
        }
    }

    fn op(name: &str, owner: &str, params: &[(&str, Direction)]) -> OperationDecl {
        OperationDecl {
            name: name.to_string(),
            owner: owner.to_string(),
            parameters: params.iter().map(|&(t, d)| param(t, d)).collect(),
        }
    }

    fn ty(name: &str, short: &str, base: Option<&str>) -> TypeDecl {
        TypeDecl {
            name: name.to_string(),
            short_name: short.to_string(),
            base: base.map(str::to_string),
            value_type: false,
        }
    }

    fn hierarchy_source() -> CatalogSource {
        use Direction::*;
        CatalogSource {
            types: vec![
                ty("UnityEngineComponent", "Component", None),
                ty("UnityEngineTransform", "Transform", Some("UnityEngineComponent")),
                ty("UnityEngineDebug", "Debug", None),
            ],
            operations: vec![
                op(
                    "UnityEngineDebug.__Describe__UnityEngineComponent__SystemString",
                    "UnityEngineDebug",
                    &[("UnityEngineComponent", In), ("SystemString", Out)],
                ),
                op(
                    "UnityEngineDebug.__Describe__UnityEngineTransform__SystemString",
                    "UnityEngineDebug",
                    &[("UnityEngineTransform", In), ("SystemString", Out)],
                ),
                op(
                    "UnityEngineTransform.__get_childCount__SystemInt32",
                    "UnityEngineTransform",
                    &[("UnityEngineTransform", In), ("SystemInt32", Out)],
                ),
                op(
                    "SystemInt32.__op_Addition__SystemInt32_SystemInt32__SystemInt32",
                    "SystemInt32",
                    &[("SystemInt32", In), ("SystemInt32", In), ("SystemInt32", Out)],
                ),
                op(
                    "UnityEngineTransform.__ctor__UnityEngineTransform",
                    "UnityEngineTransform",
                    &[("UnityEngineTransform", Out)],
                ),
                op(
                    "SystemSingle.__op_Explicit__SystemInt32__SystemSingle",
                    "SystemSingle",
                    &[("SystemInt32", In), ("SystemSingle", Out)],
                ),
            ],
            events: vec![EventDecl {
                name: "OnTriggerEnter".into(),
                parameters: vec![ParameterDecl {
                    name: "other".into(),
                    ty: "UnityEngineComponent".into(),
                    direction: Out,
                }],
            }],
        }
    }

    #[test]
    fn derives_display_names() {
        let catalog = Catalog::from_source(&hierarchy_source()).expect("catalog");
        assert!(catalog.has_name("+", 2));
        assert!(catalog.has_name("GetTransformChildCount", 1));
        assert!(catalog.has_name("GetUnityEngineTransformChildCount", 1));
        assert!(catalog.has_name("GetChildCount", 1));
        assert!(!catalog.has_name("GetchildCount", 1));
        assert!(catalog.has_name("CreateTransform", 0));
        assert!(catalog.has_name("CreateUnityEngineTransform", 0));
        assert!(catalog.has_name("!Single", 1));
        assert!(catalog.has_name("!SystemSingle", 1));
        assert!(catalog.has_name("DebugDescribe", 1));
        assert!(catalog.has_name("UnityEngineDebugDescribe", 1));
        assert!(!catalog.has_name("Describe", 1));
    }

    #[test]
    fn derived_parameter_wins_only_for_derived_arguments() {
        let catalog = Catalog::from_source(&hierarchy_source()).expect("catalog");
        let types = catalog.types();
        let transform = types.lookup("Transform").expect("transform");
        let component = types.lookup("Component").expect("component");
        let list = catalog.candidates("DebugDescribe", 1);
        assert_eq!(list.len(), 2);
        assert_eq!(catalog.operation(list[0]).parameters[0].ty, transform);

        for _ in 0..3 {
            let chosen = catalog
                .resolve_overload("DebugDescribe", &[transform])
                .expect("transform overload");
            assert_eq!(catalog.operation(chosen).parameters[0].ty, transform);
            let chosen = catalog
                .resolve_overload("DebugDescribe", &[component])
                .expect("component overload");
            assert_eq!(catalog.operation(chosen).parameters[0].ty, component);
        }
        let int = types.builtin(INT32);
        assert!(catalog.resolve_overload("DebugDescribe", &[int]).is_none());
    }

    #[test]
    fn identical_signatures_keep_base_owner() {
        use Direction::*;
        let component_op = op(
            "UnityEngineComponent.__op_Addition__SystemObject_SystemObject__SystemObject",
            "UnityEngineComponent",
            &[("SystemObject", In), ("SystemObject", In), ("SystemObject", Out)],
        );
        let transform_op = op(
            "UnityEngineTransform.__op_Addition__SystemObject_SystemObject__SystemObject",
            "UnityEngineTransform",
            &[("SystemObject", In), ("SystemObject", In), ("SystemObject", Out)],
        );
        for operations in [
            vec![component_op.clone(), transform_op.clone()],
            vec![transform_op.clone(), component_op.clone()],
        ] {
            let mut source = hierarchy_source();
            source.operations = operations;
            let catalog = Catalog::from_source(&source).expect("catalog");
            let list = catalog.candidates("+", 2);
            assert_eq!(list.len(), 1);
            assert_eq!(catalog.operation(list[0]).full_name, component_op.name);
        }
    }

    #[test]
    fn value_type_parameters_sort_first() {
        use Direction::*;
        let source = CatalogSource {
            operations: vec![
                op(
                    "SystemConvert.__ToString__SystemObject__SystemString",
                    "SystemObject",
                    &[("SystemObject", In), ("SystemString", Out)],
                ),
                op(
                    "SystemConvert.__ToString__SystemInt32__SystemString",
                    "SystemObject",
                    &[("SystemInt32", In), ("SystemString", Out)],
                ),
            ],
            ..CatalogSource::default()
        };
        let catalog = Catalog::from_source(&source).expect("catalog");
        let types = catalog.types();
        let int = types.builtin(INT32);
        let chosen = catalog.resolve_overload("ObjectToString", &[int]).expect("match");
        assert_eq!(catalog.operation(chosen).parameters[0].ty, int);
        let boolean = types.builtin(BOOLEAN);
        let chosen = catalog.resolve_overload("ObjectToString", &[boolean]).expect("match");
        assert_eq!(catalog.operation(chosen).parameters[0].ty, types.object());
    }

    #[test]
    fn out_arguments_must_accept_parameter_type() {
        use Direction::*;
        let source = CatalogSource {
            operations: vec![op(
                "SystemInt32.__TryParse__SystemString_SystemInt32__SystemBoolean",
                "SystemInt32",
                &[("SystemString", In), ("SystemInt32", Out), ("SystemBoolean", Out)],
            )],
            ..CatalogSource::default()
        };
        let catalog = Catalog::from_source(&source).expect("catalog");
        let types = catalog.types();
        let (string, int) = (types.builtin("SystemString"), types.builtin(INT32));
        let object = types.object();
        assert!(catalog.resolve_overload("Int32TryParse", &[string, int]).is_some());
        assert!(catalog.resolve_overload("Int32TryParse", &[string, object]).is_some());
        assert!(catalog
            .resolve_overload("Int32TryParse", &[string, types.builtin(BOOLEAN)])
            .is_none());
        let op = catalog.operation(catalog.candidates("Int32TryParse", 2)[0]);
        assert_eq!(op.return_type(), Some(types.builtin(BOOLEAN)));
    }

    #[test]
    fn events_pin_parameter_variables() {
        let catalog = Catalog::from_source(&hierarchy_source()).expect("catalog");
        let event = catalog.event("_onTriggerEnter").expect("event");
        assert_eq!(event.name, "OnTriggerEnter");
        let component = catalog.types().lookup("Component");
        assert_eq!(catalog.predefined_variable("onTriggerEnterOther"), component);
        assert_eq!(
            catalog.predefined_variable(RETURN_VALUE),
            Some(catalog.types().object())
        );
    }

    #[test]
    fn unknown_types_are_reported() {
        let source = CatalogSource {
            operations: vec![op(
                "Foo.__Bar__SystemVoid",
                "Foo",
                &[],
            )],
            ..CatalogSource::default()
        };
        let err = Catalog::from_source(&source).expect_err("unknown owner");
        assert_eq!(
            err,
            CatalogError::UnknownType {
                name: "Foo".into(),
                context: "Foo.__Bar__SystemVoid".into()
            }
        );
        let source = CatalogSource {
            operations: vec![op("NoSeparators", "SystemObject", &[])],
            ..CatalogSource::default()
        };
        assert!(matches!(
            Catalog::from_source(&source),
            Err(CatalogError::MalformedOperationName { .. })
        ));
    }

    #[test]
    fn duplicate_type_declarations_are_rejected() {
        let decl = TypeDecl {
            name: "Widget".into(),
            short_name: "Widget".into(),
            base: None,
            value_type: false,
        };
        let source = CatalogSource {
            types: vec![decl.clone(), decl],
            ..CatalogSource::default()
        };
        assert_eq!(
            Catalog::from_source(&source).expect_err("duplicate"),
            CatalogError::DuplicateType {
                name: "Widget".into()
            }
        );
    }

    #[test]
    fn query_is_case_insensitive_and_capped() {
        let catalog = Catalog::from_source(&hierarchy_source()).expect("catalog");
        let hits: Vec<_> = catalog.query("describe").collect();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|s| s.kind == SummaryKind::Method));
        assert_eq!(hits[0].usage, "DebugDescribe($(arg0))");
        assert!(catalog.query("").count() <= QUERY_LIMIT);
        assert!(catalog.query("_ontrigger").any(|s| s.kind == SummaryKind::Event));
    }

    #[test]
    fn reload_replaces_contents() {
        let mut catalog = Catalog::from_source(&hierarchy_source()).expect("catalog");
        assert!(catalog.has_name("DebugDescribe", 1));
        catalog.reload(&CatalogSource::default()).expect("reload");
        assert!(!catalog.has_name("DebugDescribe", 1));
        assert!(catalog
            .operation_by_name(prelude::ARRAY_CREATE)
            .is_some());
    }
}
