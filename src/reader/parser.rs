use super::token::{SourceLoc, Token, TokenWithLoc};
use crate::compiler::ast::{BinOp, Expr, Lit, Stmt, UnaryOp};
use crate::error::Diagnostic;

/// Recursive-descent parser over a pre-lexed token list.
///
/// Statement parsing recovers at statement boundaries, so one pass can
/// report multiple diagnostics.
pub struct Parser {
    tokens: Vec<TokenWithLoc>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    pub fn new(tokens: Vec<TokenWithLoc>) -> Self {
        Parser {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn peek_loc(&self) -> SourceLoc {
        self.tokens
            .get(self.pos)
            .map(|t| t.loc)
            .or_else(|| self.tokens.last().map(|t| t.loc))
            .unwrap_or_else(SourceLoc::start)
    }

    fn advance(&mut self) -> Option<TokenWithLoc> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, context: &str) -> Result<SourceLoc, Diagnostic> {
        let loc = self.peek_loc();
        match self.peek() {
            Some(found) if *found == token => {
                self.pos += 1;
                Ok(loc)
            }
            Some(found) => Err(Diagnostic::at(
                format!("expected {} {}, found {}", token.describe(), context, found.describe()),
                loc,
            )),
            None => Err(Diagnostic::at(
                format!("expected {} {}, found end of input", token.describe(), context),
                loc,
            )),
        }
    }

    /// Skip forward to the next statement boundary after a parse error.
    fn synchronize(&mut self) {
        while let Some(token) = self.peek() {
            match token {
                Token::Semicolon => {
                    self.pos += 1;
                    return;
                }
                Token::RightBrace | Token::Let | Token::Fn | Token::If | Token::While
                | Token::Return | Token::Throw => return,
                _ => self.pos += 1,
            }
        }
    }

    /// Parse the whole token stream as a statement list.
    pub fn parse_program(mut self) -> Result<Vec<Stmt>, Vec<Diagnostic>> {
        let mut stmts = Vec::new();
        while !self.at_end() {
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(diagnostic) => {
                    self.diagnostics.push(diagnostic);
                    self.synchronize();
                }
            }
        }

        if self.diagnostics.is_empty() {
            Ok(stmts)
        } else {
            Err(self.diagnostics)
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        match self.peek() {
            Some(Token::Let) => self.parse_let(),
            Some(Token::Fn) => self.parse_fn(),
            Some(Token::If) => self.parse_if(),
            Some(Token::While) => self.parse_while(),
            Some(Token::Return) => self.parse_return(),
            Some(Token::Throw) => self.parse_throw(),
            Some(Token::Ident(_)) if self.tokens.get(self.pos + 1).map(|t| &t.token) == Some(&Token::Equal) => {
                self.parse_assign()
            }
            _ => {
                let expr = self.parse_expr()?;
                // ';' separates statements; the final statement may omit it,
                // which makes a trailing expression the submission's value.
                self.eat(&Token::Semicolon);
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_ident(&mut self, context: &str) -> Result<(String, SourceLoc), Diagnostic> {
        let loc = self.peek_loc();
        match self.advance() {
            Some(TokenWithLoc {
                token: Token::Ident(name),
                loc,
            }) => Ok((name, loc)),
            Some(TokenWithLoc { token, loc }) => Err(Diagnostic::at(
                format!("expected name {}, found {}", context, token.describe()),
                loc,
            )),
            None => Err(Diagnostic::at(
                format!("expected name {}, found end of input", context),
                loc,
            )),
        }
    }

    fn parse_let(&mut self) -> Result<Stmt, Diagnostic> {
        let loc = self.peek_loc();
        self.advance(); // let
        let (name, _) = self.parse_ident("after 'let'")?;
        self.expect(Token::Equal, "after variable name")?;
        let value = self.parse_expr()?;
        self.expect(Token::Semicolon, "after declaration")?;
        Ok(Stmt::Let { name, value, loc })
    }

    fn parse_assign(&mut self) -> Result<Stmt, Diagnostic> {
        let loc = self.peek_loc();
        let (name, _) = self.parse_ident("in assignment")?;
        self.expect(Token::Equal, "in assignment")?;
        let value = self.parse_expr()?;
        self.expect(Token::Semicolon, "after assignment")?;
        Ok(Stmt::Assign { name, value, loc })
    }

    fn parse_fn(&mut self) -> Result<Stmt, Diagnostic> {
        let loc = self.peek_loc();
        self.advance(); // fn
        let (name, _) = self.parse_ident("after 'fn'")?;
        self.expect(Token::LeftParen, "after function name")?;

        let mut params = Vec::new();
        if !self.check(&Token::RightParen) {
            loop {
                let (param, _) = self.parse_ident("in parameter list")?;
                params.push(param);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RightParen, "after parameters")?;

        let body = self.parse_block()?;
        Ok(Stmt::Fn {
            name,
            params,
            body,
            loc,
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.expect(Token::LeftBrace, "to open block")?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RightBrace) {
            if self.at_end() {
                return Err(Diagnostic::at(
                    "expected '}' to close block, found end of input",
                    self.peek_loc(),
                ));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect(Token::RightBrace, "to close block")?;
        Ok(stmts)
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let loc = self.peek_loc();
        self.advance(); // if
        self.expect(Token::LeftParen, "after 'if'")?;
        let cond = self.parse_expr()?;
        self.expect(Token::RightParen, "after condition")?;
        let then_body = self.parse_block()?;

        let else_body = if self.eat(&Token::Else) {
            if self.check(&Token::If) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
            loc,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, Diagnostic> {
        let loc = self.peek_loc();
        self.advance(); // while
        self.expect(Token::LeftParen, "after 'while'")?;
        let cond = self.parse_expr()?;
        self.expect(Token::RightParen, "after condition")?;
        let body = self.parse_block()?;
        Ok(Stmt::While { cond, body, loc })
    }

    fn parse_return(&mut self) -> Result<Stmt, Diagnostic> {
        let loc = self.peek_loc();
        self.advance(); // return
        let value = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(Token::Semicolon, "after 'return'")?;
        Ok(Stmt::Return { value, loc })
    }

    fn parse_throw(&mut self) -> Result<Stmt, Diagnostic> {
        let loc = self.peek_loc();
        self.advance(); // throw
        let value = self.parse_expr()?;
        self.expect(Token::Semicolon, "after 'throw'")?;
        Ok(Stmt::Throw { value, loc })
    }

    // ── Expressions ─────────────────────────────────────────────────

    pub fn parse_expr(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_and()?;
        while self.check(&Token::OrOr) {
            let loc = self.peek_loc();
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_equality()?;
        while self.check(&Token::AndAnd) {
            let loc = self.peek_loc();
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqualEqual) => BinOp::Eq,
                Some(Token::BangEqual) => BinOp::Ne,
                _ => break,
            };
            let loc = self.peek_loc();
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Less) => BinOp::Lt,
                Some(Token::LessEqual) => BinOp::Le,
                Some(Token::Greater) => BinOp::Gt,
                Some(Token::GreaterEqual) => BinOp::Ge,
                _ => break,
            };
            let loc = self.peek_loc();
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            let loc = self.peek_loc();
            self.advance();
            let rhs = self.parse_factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => break,
            };
            let loc = self.peek_loc();
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Bang) => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let loc = self.peek_loc();
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                loc,
            });
        }
        self.parse_call()
    }

    fn parse_call(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        while self.check(&Token::LeftParen) {
            let loc = self.peek_loc();
            self.advance();
            let mut args = Vec::new();
            if !self.check(&Token::RightParen) {
                loop {
                    args.push(self.parse_expr()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
            }
            self.expect(Token::RightParen, "after arguments")?;
            expr = Expr::Call {
                callee: Box::new(expr),
                args,
                loc,
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let loc = self.peek_loc();
        match self.advance() {
            Some(TokenWithLoc {
                token: Token::Int(n),
                loc,
            }) => Ok(Expr::Literal {
                value: Lit::Int(n),
                loc,
            }),
            Some(TokenWithLoc {
                token: Token::Float(f),
                loc,
            }) => Ok(Expr::Literal {
                value: Lit::Float(f),
                loc,
            }),
            Some(TokenWithLoc {
                token: Token::Str(s),
                loc,
            }) => Ok(Expr::Literal {
                value: Lit::Str(s),
                loc,
            }),
            Some(TokenWithLoc {
                token: Token::True,
                loc,
            }) => Ok(Expr::Literal {
                value: Lit::Bool(true),
                loc,
            }),
            Some(TokenWithLoc {
                token: Token::False,
                loc,
            }) => Ok(Expr::Literal {
                value: Lit::Bool(false),
                loc,
            }),
            Some(TokenWithLoc {
                token: Token::Nil,
                loc,
            }) => Ok(Expr::Literal {
                value: Lit::Nil,
                loc,
            }),
            Some(TokenWithLoc {
                token: Token::Ident(name),
                loc,
            }) => Ok(Expr::Var { name, loc }),
            Some(TokenWithLoc {
                token: Token::LeftParen,
                ..
            }) => {
                let expr = self.parse_expr()?;
                self.expect(Token::RightParen, "after expression")?;
                Ok(expr)
            }
            Some(TokenWithLoc { token, loc }) => Err(Diagnostic::at(
                format!("expected expression, found {}", token.describe()),
                loc,
            )),
            None => Err(Diagnostic::at(
                "expected expression, found end of input",
                loc,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Lexer;

    fn parse(input: &str) -> Result<Vec<Stmt>, Vec<Diagnostic>> {
        Parser::new(Lexer::new(input).tokenize().unwrap()).parse_program()
    }

    #[test]
    fn test_parse_expression_statement() {
        let stmts = parse("1 + 2 * 3").unwrap();
        assert_eq!(stmts.len(), 1);
        let Stmt::Expr(Expr::Binary { op: BinOp::Add, rhs, .. }) = &stmts[0] else {
            panic!("expected addition, got {:?}", stmts[0]);
        };
        assert!(matches!(**rhs, Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn test_parse_let() {
        let stmts = parse("let x = 42;").unwrap();
        assert!(matches!(&stmts[0], Stmt::Let { name, .. } if name == "x"));
    }

    #[test]
    fn test_parse_fn() {
        let stmts = parse("fn add(a, b) { return a + b; }").unwrap();
        let Stmt::Fn { name, params, body, .. } = &stmts[0] else {
            panic!("expected fn");
        };
        assert_eq!(name, "add");
        assert_eq!(params, &["a".to_string(), "b".to_string()]);
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_parse_if_else_chain() {
        let stmts = parse("if (x < 1) { 1; } else if (x < 2) { 2; } else { 3; }").unwrap();
        let Stmt::If { else_body: Some(else_body), .. } = &stmts[0] else {
            panic!("expected if with else");
        };
        assert!(matches!(&else_body[0], Stmt::If { .. }));
    }

    #[test]
    fn test_parse_missing_expression() {
        let diags = parse("let x = ;").unwrap_err();
        assert!(diags[0].message.contains("expected expression"));
    }

    #[test]
    fn test_parse_recovers_and_collects_multiple_diagnostics() {
        let diags = parse("let x = ;\nlet y = ;").unwrap_err();
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_parse_assignment_vs_equality() {
        let stmts = parse("x = 1; x == 1").unwrap();
        assert!(matches!(&stmts[0], Stmt::Assign { .. }));
        assert!(matches!(
            &stmts[1],
            Stmt::Expr(Expr::Binary { op: BinOp::Eq, .. })
        ));
    }

    #[test]
    fn test_parse_call_with_args() {
        let stmts = parse("add(1, 2)").unwrap();
        let Stmt::Expr(Expr::Call { args, .. }) = &stmts[0] else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_parse_throw() {
        let stmts = parse("throw \"boom\";").unwrap();
        assert!(matches!(&stmts[0], Stmt::Throw { .. }));
    }

    #[test]
    fn test_parse_unclosed_block() {
        let diags = parse("while (true) { 1;").unwrap_err();
        assert!(diags[0].message.contains("end of input"));
    }
}
