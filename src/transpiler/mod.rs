pub mod rust_generator;

use self::rust_generator::Generator;
use crate::error::CompileError;
use crate::flow;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::structure;

pub struct Transpiler;

impl Transpiler {
    /// Runs the full pipeline: tokens, numbered AST, control-flow contexts,
    /// structured AST, Rust source. Any pass failing aborts the pipeline.
    pub fn transpile(source: &str) -> Result<String, CompileError> {
        let tokens = Lexer::new(source).tokenize()?;
        let program = Parser::new(tokens).parse_program()?;
        let contexts = flow::analyze(program)?;
        let structured = structure::structure_program(contexts)?;
        Ok(Generator::new().generate(&structured))
    }
}
