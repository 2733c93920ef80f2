//! Parser for the system definition language.

use super::ast::*;
use super::lexer::{parse_value, Lexer, Token, TokenKind};
use crate::error::{AquasolveError, Result};

/// Parser for system definitions.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    /// Create a new parser with the given lexer.
    pub fn new(mut lexer: Lexer<'a>) -> Result<Self> {
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    /// Parse the entire system definition.
    pub fn parse(&mut self) -> Result<SystemAst> {
        let mut ast = SystemAst::new();

        while self.current.kind != TokenKind::Eof {
            match self.current.kind {
                TokenKind::Newline => {
                    self.advance()?;
                }
                TokenKind::Directive => {
                    self.parse_directive(&mut ast)?;
                }
                _ => {
                    return Err(AquasolveError::parse(
                        self.current.line,
                        format!("unexpected token '{}'", self.current.text),
                    ));
                }
            }
        }

        Ok(ast)
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.current.kind == kind {
            let tok = self.current.clone();
            self.advance()?;
            Ok(tok)
        } else {
            Err(AquasolveError::parse(
                self.current.line,
                format!("expected {:?}, got '{}'", kind, self.current.text),
            ))
        }
    }

    fn expect_end_of_line(&mut self) -> Result<()> {
        match self.current.kind {
            TokenKind::Newline => self.advance(),
            TokenKind::Eof => Ok(()),
            _ => Err(AquasolveError::parse(
                self.current.line,
                format!("unexpected token '{}' after declaration", self.current.text),
            )),
        }
    }

    fn parse_directive(&mut self, ast: &mut SystemAst) -> Result<()> {
        let directive = self.current.text.clone();
        let line = self.current.line;
        self.advance()?;

        match directive.as_str() {
            ".var" | ".const" => {
                let name = self.expect(TokenKind::Identifier)?.text;
                let value = self.parse_signed_number()?;
                ast.decls.push(Decl::Var {
                    name,
                    value,
                    constant: directive == ".const",
                    line,
                });
            }
            ".global" => {
                let name = self.expect(TokenKind::Identifier)?.text;
                let value = if matches!(self.current.kind, TokenKind::Number | TokenKind::Minus) {
                    Some(self.parse_signed_number()?)
                } else {
                    None
                };
                ast.decls.push(Decl::Global { name, value, line });
            }
            ".alias" => {
                let synonym = self.expect(TokenKind::Identifier)?.text;
                let target = self.expect(TokenKind::Identifier)?.text;
                ast.decls.push(Decl::Alias {
                    synonym,
                    target,
                    line,
                });
            }
            ".calc" => {
                let name = self.expect(TokenKind::Identifier)?.text;
                self.expect(TokenKind::Equals)?;
                let expr = self.parse_expression()?;
                ast.decls.push(Decl::Calc { name, expr, line });
            }
            ".uneq" => {
                let unknown = self.expect(TokenKind::Identifier)?.text;
                let equation = self.expect(TokenKind::Identifier)?.text;
                let mut def = UnEqDef {
                    unknown,
                    equation,
                    si_variable: None,
                    delta: None,
                    initially_inactive: false,
                    line,
                };
                self.parse_uneq_options(&mut def, true)?;
                ast.decls.push(Decl::UnEq(def));
            }
            ".uneq3" => {
                let unknown = self.expect(TokenKind::Identifier)?.text;
                let equation = self.expect(TokenKind::Identifier)?.text;
                let si = self.expect(TokenKind::Identifier)?.text;
                let mut def = UnEqDef {
                    unknown,
                    equation,
                    si_variable: Some(si),
                    delta: None,
                    initially_inactive: false,
                    line,
                };
                self.parse_uneq_options(&mut def, false)?;
                ast.decls.push(Decl::UnEq(def));
            }
            _ => {
                return Err(AquasolveError::parse(
                    line,
                    format!("unknown directive: {}", directive),
                ));
            }
        }

        self.expect_end_of_line()
    }

    fn parse_uneq_options(&mut self, def: &mut UnEqDef, allow_inactive: bool) -> Result<()> {
        while self.current.kind == TokenKind::Identifier {
            let option = self.current.text.clone();
            let line = self.current.line;
            self.advance()?;
            match option.as_str() {
                "delta" => {
                    self.expect(TokenKind::Equals)?;
                    def.delta = Some(self.parse_signed_number()?);
                }
                "inactive" if allow_inactive => {
                    def.initially_inactive = true;
                }
                _ => {
                    return Err(AquasolveError::parse(
                        line,
                        format!("unknown option '{}'", option),
                    ));
                }
            }
        }
        Ok(())
    }

    fn parse_signed_number(&mut self) -> Result<f64> {
        let negative = if self.current.kind == TokenKind::Minus {
            self.advance()?;
            true
        } else {
            false
        };
        let tok = self.expect(TokenKind::Number)?;
        let value = parse_value(&tok.text)
            .ok_or_else(|| AquasolveError::parse(tok.line, format!("invalid number: {}", tok.text)))?;
        Ok(if negative { -value } else { value })
    }

    // ============ Expressions ============
    //
    // Conventional precedence, loosest first:
    //   ||  &&  comparisons  + -  * /  ^ (right)  unary  primary

    /// Parse a single expression.
    pub fn parse_expression(&mut self) -> Result<ExprAst> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<ExprAst> {
        let mut left = self.parse_and()?;
        while self.current.kind == TokenKind::OrOr {
            self.advance()?;
            let right = self.parse_and()?;
            left = ExprAst::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ExprAst> {
        let mut left = self.parse_comparison()?;
        while self.current.kind == TokenKind::AndAnd {
            self.advance()?;
            let right = self.parse_comparison()?;
            left = ExprAst::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<ExprAst> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Ge => BinaryOp::Ge,
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_additive()?;
            left = ExprAst::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<ExprAst> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_term()?;
            left = ExprAst::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<ExprAst> {
        let mut left = self.parse_power()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_power()?;
            left = ExprAst::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<ExprAst> {
        let base = self.parse_unary()?;
        if self.current.kind == TokenKind::Caret {
            self.advance()?;
            // right-associative
            let exponent = self.parse_power()?;
            return Ok(ExprAst::Binary(
                BinaryOp::Pow,
                Box::new(base),
                Box::new(exponent),
            ));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<ExprAst> {
        match self.current.kind {
            TokenKind::Minus => {
                self.advance()?;
                let inner = self.parse_unary()?;
                Ok(ExprAst::Unary(UnaryOp::Neg, Box::new(inner)))
            }
            TokenKind::Bang => {
                self.advance()?;
                let inner = self.parse_unary()?;
                Ok(ExprAst::Unary(UnaryOp::Not, Box::new(inner)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<ExprAst> {
        match self.current.kind {
            TokenKind::Number => {
                let tok = self.current.clone();
                self.advance()?;
                let value = parse_value(&tok.text).ok_or_else(|| {
                    AquasolveError::parse(tok.line, format!("invalid number: {}", tok.text))
                })?;
                Ok(ExprAst::Number(value))
            }
            TokenKind::Identifier => {
                let name = self.current.text.clone();
                self.advance()?;
                if self.current.kind == TokenKind::OpenParen {
                    self.advance()?;
                    let mut args = Vec::new();
                    if self.current.kind != TokenKind::CloseParen {
                        loop {
                            args.push(self.parse_expression()?);
                            if self.current.kind == TokenKind::Comma {
                                self.advance()?;
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::CloseParen)?;
                    Ok(ExprAst::Call(name, args))
                } else {
                    Ok(ExprAst::Ident(name))
                }
            }
            TokenKind::OpenParen => {
                self.advance()?;
                let inner = self.parse_expression()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(inner)
            }
            _ => Err(AquasolveError::parse(
                self.current.line,
                format!("expected expression, got '{}'", self.current.text),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_decl() {
        let ast = super::super::parse(".var pH 7.5\n.const R 8.314").unwrap();
        assert_eq!(ast.decls.len(), 2);
        match &ast.decls[0] {
            Decl::Var {
                name,
                value,
                constant,
                ..
            } => {
                assert_eq!(name, "pH");
                assert!((*value - 7.5).abs() < 1e-12);
                assert!(!constant);
            }
            other => panic!("expected var, got {:?}", other),
        }
        match &ast.decls[1] {
            Decl::Var { constant, .. } => assert!(constant),
            other => panic!("expected const, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_negative_value() {
        let ast = super::super::parse(".var x -1.5").unwrap();
        match &ast.decls[0] {
            Decl::Var { value, .. } => assert!((*value + 1.5).abs() < 1e-12),
            other => panic!("expected var, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_calc_precedence() {
        let e = super::super::parse_expression("1 + 2 * 3").unwrap();
        match e {
            ExprAst::Binary(BinaryOp::Add, left, right) => {
                assert_eq!(*left, ExprAst::Number(1.0));
                assert!(matches!(*right, ExprAst::Binary(BinaryOp::Mul, _, _)));
            }
            other => panic!("expected + at root, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_power_right_assoc() {
        let e = super::super::parse_expression("2 ^ 3 ^ 2").unwrap();
        match e {
            ExprAst::Binary(BinaryOp::Pow, _, right) => {
                assert!(matches!(*right, ExprAst::Binary(BinaryOp::Pow, _, _)));
            }
            other => panic!("expected ^ at root, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_call() {
        let e = super::super::parse_expression("if(x > 0, log(x), -99)").unwrap();
        match e {
            ExprAst::Call(name, args) => {
                assert_eq!(name, "if");
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_uneq() {
        let ast =
            super::super::parse(".uneq x eq_x delta=1e-8 inactive\n.uneq3 cal eq_cal si_cal")
                .unwrap();
        match &ast.decls[0] {
            Decl::UnEq(def) => {
                assert_eq!(def.unknown, "x");
                assert_eq!(def.equation, "eq_x");
                assert_eq!(def.delta, Some(1e-8));
                assert!(def.initially_inactive);
                assert!(def.si_variable.is_none());
            }
            other => panic!("expected uneq, got {:?}", other),
        }
        match &ast.decls[1] {
            Decl::UnEq(def) => {
                assert_eq!(def.si_variable.as_deref(), Some("si_cal"));
            }
            other => panic!("expected uneq3, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_directive() {
        assert!(super::super::parse(".bogus 1").is_err());
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(super::super::parse(".var x 1 2").is_err());
    }
}
