//! Parser for the system definition language.
//!
//! The core consumes a fully expanded textual representation of a chemical
//! system: value cells, synonyms, computed cells and unknown/equation pairs.
//! The language is line-oriented and directive-prefixed.
//!
//! # Grammar Overview
//!
//! ```text
//! system      = { line }
//! line        = comment | directive | empty
//! comment     = ('#' | ';') { any_char }
//!
//! directive   = ".var" name signed_number
//!             | ".const" name signed_number
//!             | ".global" name [signed_number]
//!             | ".alias" synonym name
//!             | ".calc" name '=' expr
//!             | ".uneq" unknown equation { option }
//!             | ".uneq3" unknown equation si_cell { option }
//! option      = "delta" '=' signed_number | "inactive"
//!
//! expr        = or_expr
//! or_expr     = and_expr { '||' and_expr }
//! and_expr    = cmp_expr { '&&' cmp_expr }
//! cmp_expr    = add_expr { ('<'|'>'|'<='|'>='|'=='|'!=') add_expr }
//! add_expr    = mul_expr { ('+'|'-') mul_expr }
//! mul_expr    = pow_expr { ('*'|'/') pow_expr }
//! pow_expr    = unary [ '^' pow_expr ]
//! unary       = ('-'|'!') unary | primary
//! primary     = number | identifier [ '(' [expr {',' expr}] ')' ] | '(' expr ')'
//!
//! number      = digit+ ['.' digit+] [('e'|'E') ['-'|'+'] digit+]
//! identifier  = (letter | '_') { letter | digit | '_' }
//! ```
//!
//! # Directives
//!
//! | Directive | Description |
//! |-----------|-------------|
//! | .var | Declare a mutable cell with a start value |
//! | .const | Declare a constant cell (folded during optimization) |
//! | .global | Declare a cell exchanged with nodes |
//! | .alias | Register a synonym for an existing cell |
//! | .calc | Declare a cell computed by a memoized expression |
//! | .uneq | Declare an unknown/equation row of the nonlinear system |
//! | .uneq3 | Declare a mineral row with its saturation-index cell |
//!
//! # Example
//!
//! ```text
//! # two-component equilibrium
//! .global tot_ca 1e-3
//! .var ca 1e-5
//! .calc mass_ca = ca + ca * k1 - tot_ca
//! .uneq ca mass_ca
//! ```

pub mod ast;
mod lexer;
mod parser;

pub use ast::{Decl, ExprAst, SystemAst, UnEqDef};
pub use lexer::{parse_value, Lexer, Token, TokenKind};
pub use parser::Parser;

use crate::error::Result;

/// Parse a system definition string into an AST.
pub fn parse(input: &str) -> Result<SystemAst> {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer)?;
    parser.parse()
}

/// Parse a single expression (used by tests and embedding code).
pub fn parse_expression(input: &str) -> Result<ExprAst> {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer)?;
    parser.parse_expression()
}

/// Parse a system definition file.
pub fn parse_file(path: &std::path::Path) -> Result<SystemAst> {
    let content =
        std::fs::read_to_string(path).map_err(|e| crate::error::AquasolveError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
    parse(&content)
}
