//! Built-in catalog contents: the array intrinsics every catalog carries and a
//! small core library used by the command line tool when no catalog file is given.
use crate::catalog::{CatalogSource, Direction, EventDecl, OperationDecl, ParameterDecl, TypeDecl};

pub const ARRAY_CREATE: &str = "SystemArray.__CreateInstance__SystemType_SystemInt32__SystemArray";
pub const ARRAY_SET_VALUE: &str = "SystemArray.__SetValue__SystemObject_SystemInt32__SystemVoid";

fn parameter(name: &str, ty: &str, direction: Direction) -> ParameterDecl {
    ParameterDecl {
        name: name.to_string(),
        ty: ty.to_string(),
        direction,
    }
}

fn operation(name: &str, owner: &str, parameters: Vec<ParameterDecl>) -> OperationDecl {
    OperationDecl {
        name: name.to_string(),
        owner: owner.to_string(),
        parameters,
    }
}

fn reference(name: &str, short_name: &str, base: Option<&str>) -> TypeDecl {
    TypeDecl {
        name: name.to_string(),
        short_name: short_name.to_string(),
        base: base.map(str::to_string),
        value_type: false,
    }
}

/// `Owner.__method__A_B__R` with IN parameters `A`, `B` and an OUT return `R`.
fn function(owner: &str, method: &str, inputs: &[&str], output: &str) -> OperationDecl {
    let mut parameters: Vec<ParameterDecl> = inputs
        .iter()
        .enumerate()
        .map(|(i, ty)| parameter(&format!("arg{i}"), ty, Direction::In))
        .collect();
    let mut name = format!("{owner}.__{method}");
    if !inputs.is_empty() {
        name.push_str("__");
        name.push_str(&inputs.join("_"));
    }
    name.push_str("__");
    name.push_str(output);
    if output != "SystemVoid" {
        parameters.push(parameter("result", output, Direction::Out));
    }
    operation(&name, owner, parameters)
}

/// Operations lowered from language constructs; added to every catalog.
pub fn intrinsic_operations() -> Vec<OperationDecl> {
    vec![
        operation(
            ARRAY_CREATE,
            "SystemArray",
            vec![
                parameter("elementType", "SystemType", Direction::In),
                parameter("length", "SystemInt32", Direction::In),
                parameter("result", "SystemArray", Direction::Out),
            ],
        ),
        operation(
            ARRAY_SET_VALUE,
            "SystemArray",
            vec![
                parameter("instance", "SystemArray", Direction::In),
                parameter("value", "SystemObject", Direction::In),
                parameter("index", "SystemInt32", Direction::In),
            ],
        ),
    ]
}

fn arithmetic(owner: &str, out: &mut Vec<OperationDecl>) {
    for method in [
        "op_Addition",
        "op_Subtraction",
        "op_Multiplication",
        "op_Division",
        "op_Remainder",
    ] {
        out.push(function(owner, method, &[owner, owner], owner));
    }
    for method in [
        "op_Equality",
        "op_Inequality",
        "op_GreaterThan",
        "op_GreaterThanOrEqual",
        "op_LessThan",
        "op_LessThanOrEqual",
    ] {
        out.push(function(owner, method, &[owner, owner], "SystemBoolean"));
    }
    out.push(function(owner, "op_UnaryMinus", &[owner], owner));
}

/// Core library: primitive operators, strings, conversions, logging and a few engine types.
pub fn core_source() -> CatalogSource {
    let types = vec![
        reference("UnityEngineObject", "UnityEngineObject", None),
        reference("UnityEngineComponent", "Component", Some("UnityEngineObject")),
        reference("UnityEngineTransform", "Transform", Some("UnityEngineComponent")),
        reference("UnityEngineCollider", "Collider", Some("UnityEngineComponent")),
        reference("UnityEngineDebug", "Debug", None),
        reference("SystemConvert", "Convert", None),
        TypeDecl {
            name: "UnityEngineVector3".into(),
            short_name: "Vector3".into(),
            base: None,
            value_type: true,
        },
    ];

    let mut operations = Vec::new();
    arithmetic("SystemInt32", &mut operations);
    arithmetic("SystemSingle", &mut operations);
    for method in ["op_LogicalAnd", "op_LogicalOr", "op_LogicalXor", "op_Equality"] {
        operations.push(function(
            "SystemBoolean",
            method,
            &["SystemBoolean", "SystemBoolean"],
            "SystemBoolean",
        ));
    }
    operations.extend([
        function("SystemBoolean", "op_UnaryNegation", &["SystemBoolean"], "SystemBoolean"),
        function("SystemString", "Concat", &["SystemObject", "SystemObject"], "SystemString"),
        function("SystemString", "Concat", &["SystemString", "SystemString"], "SystemString"),
        function("SystemString", "get_Length", &["SystemString"], "SystemInt32"),
        function("SystemString", "Contains", &["SystemString", "SystemString"], "SystemBoolean"),
        function("SystemString", "op_Equality", &["SystemString", "SystemString"], "SystemBoolean"),
        function("SystemInt32", "ToString", &["SystemInt32"], "SystemString"),
        function("SystemObject", "ToString", &["SystemObject"], "SystemString"),
        function("SystemObject", "Equals", &["SystemObject", "SystemObject"], "SystemBoolean"),
        function("SystemConvert", "ToInt32", &["SystemSingle"], "SystemInt32"),
        function("SystemConvert", "ToSingle", &["SystemInt32"], "SystemSingle"),
        function("SystemSingle", "op_Explicit", &["SystemInt32"], "SystemSingle"),
        function("UnityEngineDebug", "Log", &["SystemObject"], "SystemVoid"),
        function(
            "UnityEngineVector3",
            "ctor",
            &["SystemSingle", "SystemSingle", "SystemSingle"],
            "UnityEngineVector3",
        ),
        function("UnityEngineVector3", "get_x", &["UnityEngineVector3"], "SystemSingle"),
        function(
            "UnityEngineObject",
            "op_Equality",
            &["UnityEngineObject", "UnityEngineObject"],
            "SystemBoolean",
        ),
        function("SystemArray", "get_Length", &["SystemArray"], "SystemInt32"),
        function("UnityEngineComponent", "get_transform", &["UnityEngineComponent"], "UnityEngineTransform"),
    ]);
    operations.extend(intrinsic_operations());

    let event = |name: &str, parameters: Vec<ParameterDecl>| EventDecl {
        name: name.to_string(),
        parameters,
    };
    let events = vec![
        event("Start", Vec::new()),
        event("Update", Vec::new()),
        event("Interact", Vec::new()),
        event(
            "OnTriggerEnter",
            vec![parameter("other", "UnityEngineCollider", Direction::In)],
        ),
    ];

    CatalogSource {
        types,
        operations,
        events,
    }
}
