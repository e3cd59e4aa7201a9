use std::collections::HashMap;

use crate::value::Value;

pub const OBJECT: &str = "SystemObject";
pub const VALUE_TYPE: &str = "SystemValueType";
pub const VOID: &str = "SystemVoid";
pub const ARRAY: &str = "SystemArray";
pub const TYPE: &str = "SystemType";
pub const STRING: &str = "SystemString";
pub const BOOLEAN: &str = "SystemBoolean";
pub const INT32: &str = "SystemInt32";
pub const UINT32: &str = "SystemUInt32";

/// Primitive value types every catalog knows about, with their short names.
const PRIMITIVES: [(&str, &str); 11] = [
    (BOOLEAN, "Boolean"),
    ("SystemSByte", "SByte"),
    ("SystemByte", "Byte"),
    ("SystemInt16", "Int16"),
    ("SystemUInt16", "UInt16"),
    (INT32, "Int32"),
    (UINT32, "UInt32"),
    ("SystemInt64", "Int64"),
    ("SystemUInt64", "UInt64"),
    ("SystemSingle", "Single"),
    ("SystemDouble", "Double"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(usize);

#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// Udon name, e.g. `SystemInt32`.
    pub name: String,
    /// Name used in source, e.g. `Int32`.
    pub short_name: String,
    pub base: Option<TypeId>,
    pub value_type: bool,
    pub element: Option<TypeId>,
}

impl TypeInfo {
    pub fn is_array(&self) -> bool {
        self.element.is_some()
    }
}

/// Host type universe with single inheritance rooted at `SystemObject`.
#[derive(Debug, Clone)]
pub struct TypeTable {
    types: Vec<TypeInfo>,
    by_name: HashMap<String, TypeId>,
    object: TypeId,
    void: TypeId,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = Self {
            types: Vec::new(),
            by_name: HashMap::new(),
            object: TypeId(0),
            void: TypeId(0),
        };
        let object = table.insert(OBJECT, "Object", None, false, None);
        table.object = object;
        let value_type = table.insert(VALUE_TYPE, "ValueType", Some(object), false, None);
        table.void = table.insert(VOID, "Void", Some(object), false, None);
        table.insert(ARRAY, "Array", Some(object), false, None);
        table.insert(TYPE, "Type", Some(object), false, None);
        table.insert(STRING, "String", Some(object), false, None);
        for (name, short) in PRIMITIVES {
            table.insert(name, short, Some(value_type), true, None);
        }
        for (name, _) in PRIMITIVES.iter().chain([(OBJECT, ""), (STRING, ""), (TYPE, "")].iter()) {
            if let Some(id) = table.lookup(name) {
                table.array_of(id);
            }
        }
        table
    }

    fn insert(
        &mut self,
        name: &str,
        short_name: &str,
        base: Option<TypeId>,
        value_type: bool,
        element: Option<TypeId>,
    ) -> TypeId {
        let id = TypeId(self.types.len());
        self.types.push(TypeInfo {
            name: name.to_string(),
            short_name: short_name.to_string(),
            base,
            value_type,
            element,
        });
        self.by_name.insert(name.to_string(), id);
        self.by_name.entry(short_name.to_string()).or_insert(id);
        id
    }

    /// Registers a host type, or returns the existing one with the same name.
    pub fn declare(&mut self, name: &str, short_name: &str, value_type: bool) -> TypeId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let base = if value_type {
            self.lookup(VALUE_TYPE)
        } else {
            Some(self.object)
        };
        self.insert(name, short_name, base, value_type, None)
    }

    pub fn set_base(&mut self, id: TypeId, base: TypeId) {
        if id != self.object && !self.is_assignable_from(id, base) {
            self.types[id.0].base = Some(base);
        }
    }

    /// Array type with the given element, created on first use.
    pub fn array_of(&mut self, element: TypeId) -> TypeId {
        let info = &self.types[element.0];
        let name = format!("{}Array", info.name);
        if let Some(&id) = self.by_name.get(&name) {
            return id;
        }
        let short = format!("{}Array", info.short_name);
        let base = self.lookup(ARRAY);
        self.insert(&name, &short, base, false, Some(element))
    }

    /// Looks a type up by Udon name or short name, interning arrays of known types.
    pub fn resolve(&mut self, name: &str) -> Option<TypeId> {
        if let Some(id) = self.lookup(name) {
            return Some(id);
        }
        let element = self.resolve(name.strip_suffix("Array")?)?;
        Some(self.array_of(element))
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: TypeId) -> &TypeInfo {
        &self.types[id.0]
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.types[id.0].name
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeInfo)> {
        self.types.iter().enumerate().map(|(i, info)| (TypeId(i), info))
    }

    pub fn object(&self) -> TypeId {
        self.object
    }

    pub fn void(&self) -> TypeId {
        self.void
    }

    /// Id of a built-in type. Built-ins are seeded by [`TypeTable::new`], so a
    /// missing name falls back to `SystemObject`.
    pub fn builtin(&self, name: &str) -> TypeId {
        self.lookup(name).unwrap_or(self.object)
    }

    pub fn type_of_value(&self, value: &Value) -> TypeId {
        match value {
            Value::Null => self.object,
            other => self.builtin(other.type_name()),
        }
    }

    /// Type of a constant slot holding `value`; `nil` lives in a `SystemVoid` slot.
    pub fn constant_type(&self, value: &Value) -> TypeId {
        if value.is_null() {
            self.void
        } else {
            self.type_of_value(value)
        }
    }

    pub fn default_value(&self, id: TypeId) -> Option<Value> {
        Value::default_for(self.name(id))
    }

    /// Whether a value of `source` can be stored where `target` is expected.
    pub fn is_assignable_from(&self, target: TypeId, source: TypeId) -> bool {
        if target == source {
            return true;
        }
        let (target_info, source_info) = (self.get(target), self.get(source));
        if let (Some(te), Some(se)) = (target_info.element, source_info.element) {
            if !self.get(se).value_type && self.is_assignable_from(te, se) {
                return true;
            }
        }
        self.distance(target, source).is_some()
    }

    /// Number of base steps from `derived` up to `base`.
    pub fn distance(&self, base: TypeId, derived: TypeId) -> Option<usize> {
        let mut steps = 0;
        let mut current = Some(derived);
        while let Some(id) = current {
            if id == base {
                return Some(steps);
            }
            steps += 1;
            current = self.get(id).base;
        }
        None
    }

    /// Argument check for IN parameters; a `nil` constant fits any reference type.
    pub fn accepts(&self, parameter: TypeId, argument: TypeId) -> bool {
        if argument == self.void {
            return parameter == self.void || !self.get(parameter).value_type;
        }
        self.is_assignable_from(parameter, argument)
    }

    /// Value types must match exactly; reference types may differ in either subtype direction.
    pub fn is_compatible(&self, a: TypeId, b: TypeId) -> bool {
        if a == self.void {
            return b == self.void || !self.get(b).value_type;
        }
        if b == self.void {
            return !self.get(a).value_type;
        }
        self.is_assignable_from(a, b) || self.is_assignable_from(b, a)
    }

    /// Most specific type every given type is assignable to.
    pub fn common_ancestor(&self, types: &[TypeId]) -> Option<TypeId> {
        let (&first, rest) = types.split_first()?;
        let mut candidate = Some(first);
        while let Some(id) = candidate {
            if rest.iter().all(|&other| self.is_assignable_from(id, other)) {
                return Some(id);
            }
            candidate = self.get(id).base;
        }
        None
    }
}
