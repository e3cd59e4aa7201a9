pub mod builder;
pub mod catalog;
pub mod codegen;
pub mod lexer;
pub mod node;
pub mod parser;
pub mod prelude;
pub mod printer;
pub mod resolve;
pub mod state;
pub mod types;
pub mod value;

use indexmap::IndexMap;
use thiserror::Error;

pub use builder::Symbol;
pub use catalog::{Catalog, CatalogError, CatalogSource};
pub use codegen::{CompileError, CompileErrorKind};
pub use node::{NodeId, SourcePosition, Tree, TreeError};
pub use parser::SyntaxError;
pub use value::Value;

use crate::state::AssemblerState;

#[derive(Debug, Error)]
pub enum KatanaError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Validate variable types and extern signatures while emitting.
    pub type_check: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { type_check: true }
    }
}

impl CompileOptions {
    pub fn with_type_check(mut self, type_check: bool) -> Self {
        self.type_check = type_check;
        self
    }
}

/// Output handed to the host loader.
#[derive(Debug, Clone)]
pub struct Program {
    pub assembly: String,
    pub symbols: IndexMap<String, Symbol>,
    pub heap_size: usize,
    /// Exported labels in code order.
    pub entry_points: Vec<String>,
}

/// Parses and compiles a Katana source with default options.
pub fn compile(source: &str, catalog: &Catalog) -> Result<Program, KatanaError> {
    compile_with(source, catalog, &CompileOptions::default())
}

pub fn compile_with(
    source: &str,
    catalog: &Catalog,
    options: &CompileOptions,
) -> Result<Program, KatanaError> {
    let tree = parser::parse(source)?;
    compile_tree(&tree, catalog, options).map_err(|err| err.locate(&tree, source).into())
}

/// Resolves and lowers an already built tree. Errors carry the failing node
/// but no position; use [`CompileError::locate`] when the source is at hand.
pub fn compile_tree(
    tree: &Tree,
    catalog: &Catalog,
    options: &CompileOptions,
) -> Result<Program, CompileError> {
    let mut state = AssemblerState::new(catalog, tree, options.type_check);
    resolve::resolve(tree, &mut state)?;
    codegen::generate(tree, &mut state)?;

    let builder = state.into_builder();
    Ok(Program {
        assembly: builder.assemble()?,
        symbols: builder.symbols(),
        heap_size: builder.heap_size(),
        entry_points: builder
            .entry_labels()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuilderError, VariableAttributes};
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        Catalog::from_source(&prelude::core_source()).expect("core catalog")
    }

    fn compiled(source: &str) -> Program {
        compile(source, &catalog()).expect("program should compile")
    }

    fn compile_error(source: &str) -> CompileError {
        match compile(source, &catalog()) {
            Err(KatanaError::Compile(err)) => err,
            other => panic!("expected a compile error, got {other:?}"),
        }
    }

    fn code(program: &Program) -> Vec<&str> {
        program
            .assembly
            .lines()
            .skip_while(|line| *line != ".code_start")
            .skip(1)
            .take_while(|line| *line != ".code_end")
            .collect()
    }

    #[test]
    fn conditional_emits_documented_pattern() {
        let program = compiled("(var(x, Int32, 0), =(x, if(true, 1, 2)))");
        let code = code(&program);
        assert_eq!(code.len(), 12);
        assert_eq!(code[4], "JUMP_IF_FALSE, 0x00000040");
        assert_eq!(code[8], "JUMP, 0x00000054");
        assert_eq!(code[3], "PUSH, __temp_SystemBoolean_0");
        assert_eq!(&code[5..8], ["PUSH, __const_Int32_1", "PUSH, x", "COPY"]);
    }

    #[test]
    fn while_loop_jumps_back_to_its_condition() {
        let program = compiled("(var(i, Int32, 0), while(<($(i), 3), =(i, +($(i), 1))))");
        let code = code(&program);
        let last = code.last().copied().unwrap_or_default();
        assert_eq!(last, "JUMP, 0x00000000");
        assert!(code.iter().any(|line| line.starts_with("JUMP_IF_FALSE")));
    }

    #[test]
    fn event_blocks_merge_into_one_routine() {
        let program = compiled(
            "(when(_start, DebugLog(\"a\")), var(n, Int32, 1), when(_start, DebugLog(\"b\")))",
        );
        assert_eq!(program.entry_points, vec!["_start".to_string()]);
        let exports = program
            .assembly
            .lines()
            .filter(|line| *line == ".export _start")
            .count();
        assert_eq!(exports, 1);
        let code = code(&program);
        let indirect: Vec<_> = code
            .iter()
            .filter(|line| line.starts_with("JUMP_INDIRECT"))
            .collect();
        assert_eq!(indirect, vec![&"JUMP_INDIRECT, ___start_return"]);
        assert_eq!(code.last(), Some(&"JUMP_INDIRECT, ___start_return"));
        assert_eq!(
            program.symbols["___start_return"].value,
            Some(Value::U32(builder::RETURN_ADDRESS))
        );
    }

    #[test]
    fn event_called_before_its_body_is_patched() {
        let program = compiled("(when(_interact, (_helper)), when(_helper, 7))");
        assert_eq!(
            program.entry_points,
            vec!["_interact".to_string(), "_helper".to_string()]
        );
        assert!(program.assembly.contains("JUMP_INDIRECT, ___helper_return"));
        assert!(program.assembly.contains("PUSH, ___helper_return"));
    }

    #[test]
    fn unknown_inline_mnemonic_fails() {
        let err = compile_error("uasm(frobnicate())");
        assert_eq!(
            err.kind,
            CompileErrorKind::Builder(BuilderError::UnknownMnemonic {
                mnemonic: "frobnicate".into()
            })
        );
    }

    #[test]
    fn bracketed_uasm_is_a_plain_sequence() {
        // Without a tag the words are literals, so nothing reaches the mnemonic table.
        let program = compiled("(uasm, (frobnicate, ))");
        assert_eq!(code(&program), vec!["NOP", "NOP", "NOP"]);
    }

    #[test]
    fn event_block_in_value_position_is_called_inline() {
        let program = compiled("(var(x, Int32, 0), =(x, when(_tick, 7)))");
        let code = code(&program);
        let jumps: Vec<_> = code
            .iter()
            .filter(|line| line.starts_with("JUMP"))
            .copied()
            .collect();
        assert_eq!(
            jumps,
            vec!["JUMP, 0x0000004C", "JUMP, 0x00000068", "JUMP_INDIRECT, ___tick_return"]
        );
        let skip = code
            .iter()
            .position(|line| *line == "JUMP, 0x00000068")
            .unwrap_or_default();
        assert_eq!(&code[skip - 3..skip], ["PUSH, __returnValue", "PUSH, x", "COPY"]);
        assert_eq!(&code[skip + 1..skip + 3], [".export _tick", "_tick:"]);
        assert!(code[0].starts_with("PUSH, __const_UInt32_"));
    }

    #[test]
    fn untyped_node_reports_its_position() {
        let err = compile_error("(1,\n  frobnicate(2))");
        assert_eq!(err.position, Some(SourcePosition { line: 2, column: 3 }));
        assert!(err.to_string().ends_with("at line 2, column 3"));
    }

    #[test]
    fn syntax_errors_surface_unchanged() {
        let result = compile("(1, 2", &catalog());
        assert!(matches!(result, Err(KatanaError::Syntax(_))));
    }

    #[test]
    fn temps_are_shared_between_sibling_calls() {
        let program = compiled("(DebugLog(+(1, 2)), DebugLog(+(3, 4)))");
        let temps: Vec<_> = program
            .symbols
            .keys()
            .filter(|name| name.starts_with("__temp_"))
            .collect();
        assert_eq!(
            temps,
            vec!["__temp_SystemInt32_0", "__temp_SystemInt32_1", "__temp_SystemInt32_2"]
        );
    }

    #[test]
    fn compilation_is_deterministic() {
        let source = "(var(s, String, \"\"), =(s, StringConcat(\"a\", 1)), =(s, StringConcat(\"a\", \"b\")))";
        let first = compiled(source);
        let second = compiled(source);
        assert_eq!(first.assembly, second.assembly);
        assert!(first
            .assembly
            .contains("EXTERN, \"SystemString.__Concat__SystemObject_SystemObject__SystemString\""));
        assert!(first
            .assembly
            .contains("EXTERN, \"SystemString.__Concat__SystemString_SystemString__SystemString\""));
    }

    #[test]
    fn array_literals_allocate_and_fill() {
        let program = compiled("(var(xs, Int32Array, ), =(xs, ToInt32Array(4, 5)))");
        let externs: Vec<_> = code(&program)
            .into_iter()
            .filter(|line| line.starts_with("EXTERN"))
            .collect();
        assert_eq!(
            externs,
            vec![
                "EXTERN, \"SystemArray.__CreateInstance__SystemType_SystemInt32__SystemArray\"",
                "EXTERN, \"SystemArray.__SetValue__SystemObject_SystemInt32__SystemVoid\"",
                "EXTERN, \"SystemArray.__SetValue__SystemObject_SystemInt32__SystemVoid\"",
            ]
        );
        assert!(program.symbols.contains_key("__const_Int32_2"));
    }

    #[test]
    fn type_check_can_be_disabled() {
        let source = "uasm(extern(\"Nope.__x__SystemVoid\"))";
        let err = compile_error(source);
        assert!(matches!(
            err.kind,
            CompileErrorKind::Builder(BuilderError::UnknownExtern { .. })
        ));
        let options = CompileOptions::default().with_type_check(false);
        let program = compile_with(source, &catalog(), &options).expect("unchecked compile");
        assert_eq!(code(&program), vec!["EXTERN, \"Nope.__x__SystemVoid\""]);
    }

    #[test]
    fn symbols_describe_the_heap() {
        let program = compiled(
            "(var(score, public, sync, Int32, 3), var(me, Transform, (this)), typeof(Int32))",
        );
        let score = &program.symbols["score"];
        assert_eq!(score.ty, "SystemInt32");
        assert_eq!(
            score.attributes,
            VariableAttributes::PUBLIC | VariableAttributes::SYNC_NONE
        );
        assert_eq!(score.value, Some(Value::I32(3)));
        assert!(!program.symbols.contains_key("me"));
        assert!(program.assembly.contains(".export score\n.sync score, none\n"));
        assert!(program.assembly.contains("me: %UnityEngineTransform, this\n"));
        assert_eq!(program.heap_size, program.assembly.matches(": %").count());
    }
}
