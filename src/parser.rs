use crate::ast::{AstNode, NodeKind};
use crate::common::{Diagnostic, DiagnosticKind};
use crate::lexer::{Token, TokenKind};

type ParseResult<T> = Result<T, Diagnostic>;

/// Recursive descent over one program's token stream, building the AST
/// directly. The first syntax error aborts the program.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

pub fn parse(tokens: Vec<Token>) -> ParseResult<AstNode> {
    Parser { tokens, current: 0 }.program()
}

impl Parser {
    // ::= Block $
    fn program(&mut self) -> ParseResult<AstNode> {
        let block = self.block()?;
        self.expect(TokenKind::EndOfProgram)?;
        let loc = block.loc;
        Ok(AstNode::new(loc, NodeKind::Program(Box::new(block))))
    }

    // ::= { StatementList }
    fn block(&mut self) -> ParseResult<AstNode> {
        let open = self.expect(TokenKind::LeftBrace)?;
        let statements = self.statement_list()?;
        self.expect(TokenKind::RightBrace)?;
        Ok(AstNode::new(open.loc, NodeKind::Block(statements)))
    }

    // ::= Statement StatementList | epsilon
    // The epsilon case is a lookahead miss, never an error.
    fn statement_list(&mut self) -> ParseResult<Vec<AstNode>> {
        let mut statements = Vec::new();
        while let Some(kind) = self.peek_kind() {
            match kind {
                TokenKind::PrintKey
                | TokenKind::Id
                | TokenKind::VarType
                | TokenKind::WhileKey
                | TokenKind::IfKey
                | TokenKind::LeftBrace => statements.push(self.statement()?),
                _ => break,
            }
        }
        Ok(statements)
    }

    fn statement(&mut self) -> ParseResult<AstNode> {
        match self.peek_kind() {
            Some(TokenKind::PrintKey) => self.print_statement(),
            Some(TokenKind::Id) => self.assign_statement(),
            Some(TokenKind::VarType) => self.var_decl(),
            Some(TokenKind::WhileKey) => self.while_statement(),
            Some(TokenKind::IfKey) => self.if_statement(),
            Some(TokenKind::LeftBrace) => self.block(),
            _ => Err(self.unexpected("a statement")),
        }
    }

    // ::= print ( Expr )
    fn print_statement(&mut self) -> ParseResult<AstNode> {
        let key = self.expect(TokenKind::PrintKey)?;
        self.expect(TokenKind::LeftParen)?;
        let expr = self.expr()?;
        self.expect(TokenKind::RightParen)?;
        Ok(AstNode::new(key.loc, NodeKind::Print(Box::new(expr))))
    }

    // ::= Id = Expr
    fn assign_statement(&mut self) -> ParseResult<AstNode> {
        let target = self.identifier()?;
        self.expect(TokenKind::Assign)?;
        let value = self.expr()?;
        let loc = target.loc;
        Ok(AstNode::new(
            loc,
            NodeKind::Assign(Box::new(target), Box::new(value)),
        ))
    }

    // ::= type Id
    fn var_decl(&mut self) -> ParseResult<AstNode> {
        let keyword = self.expect(TokenKind::VarType)?;
        let target = self.identifier()?;
        Ok(AstNode::new(
            keyword.loc,
            NodeKind::VarDecl {
                keyword: keyword.lexeme,
                target: Box::new(target),
            },
        ))
    }

    // ::= while BooleanExpr Block
    fn while_statement(&mut self) -> ParseResult<AstNode> {
        let key = self.expect(TokenKind::WhileKey)?;
        let condition = self.boolean_expr()?;
        let body = self.block()?;
        Ok(AstNode::new(
            key.loc,
            NodeKind::While(Box::new(condition), Box::new(body)),
        ))
    }

    // ::= if BooleanExpr Block
    fn if_statement(&mut self) -> ParseResult<AstNode> {
        let key = self.expect(TokenKind::IfKey)?;
        let condition = self.boolean_expr()?;
        let body = self.block()?;
        Ok(AstNode::new(
            key.loc,
            NodeKind::If(Box::new(condition), Box::new(body)),
        ))
    }

    // ::= IntExpr | StringExpr | BooleanExpr | Id
    fn expr(&mut self) -> ParseResult<AstNode> {
        match self.peek_kind() {
            Some(TokenKind::Digit) => self.int_expr(),
            Some(TokenKind::Str) => {
                let token = self.expect(TokenKind::Str)?;
                Ok(AstNode::new(token.loc, NodeKind::StrLiteral(token.lexeme)))
            }
            Some(TokenKind::LeftParen) | Some(TokenKind::BoolVal) => self.boolean_expr(),
            Some(TokenKind::Id) => self.identifier(),
            _ => Err(self.unexpected("an expression")),
        }
    }

    // ::= digit + Expr | digit
    fn int_expr(&mut self) -> ParseResult<AstNode> {
        let digit = self.expect(TokenKind::Digit)?;
        let value = digit.lexeme.bytes().next().map(|b| b - b'0').unwrap_or(0);
        let literal = AstNode::new(digit.loc, NodeKind::IntLiteral(value));
        if self.next_if(TokenKind::Plus).is_some() {
            let rhs = self.expr()?;
            Ok(AstNode::new(
                digit.loc,
                NodeKind::Add(Box::new(literal), Box::new(rhs)),
            ))
        } else {
            Ok(literal)
        }
    }

    // ::= ( Expr boolop Expr ) | boolval
    fn boolean_expr(&mut self) -> ParseResult<AstNode> {
        if let Some(token) = self.next_if(TokenKind::BoolVal) {
            return Ok(AstNode::new(
                token.loc,
                NodeKind::BoolLiteral(token.lexeme == "true"),
            ));
        }
        self.expect(TokenKind::LeftParen)?;
        let lhs = self.expr()?;
        let op = self.bool_op()?;
        let rhs = self.expr()?;
        self.expect(TokenKind::RightParen)?;
        let kind = match op.kind {
            TokenKind::EqualEqual => NodeKind::Eq(Box::new(lhs), Box::new(rhs)),
            _ => NodeKind::Neq(Box::new(lhs), Box::new(rhs)),
        };
        Ok(AstNode::new(op.loc, kind))
    }

    fn bool_op(&mut self) -> ParseResult<Token> {
        match self.peek_kind() {
            Some(TokenKind::EqualEqual) => self.expect(TokenKind::EqualEqual),
            Some(TokenKind::BangEqual) => self.expect(TokenKind::BangEqual),
            _ => Err(self.unexpected("'==' or '!='")),
        }
    }

    fn identifier(&mut self) -> ParseResult<AstNode> {
        let token = self.expect(TokenKind::Id)?;
        Ok(AstNode::new(
            token.loc,
            NodeKind::Variable {
                name: token.lexeme,
                scope: None,
            },
        ))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn next_if(&mut self, kind: TokenKind) -> Option<Token> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                let token = token.clone();
                self.current += 1;
                Some(token)
            }
            _ => None,
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        match self.next_if(kind) {
            Some(token) => Ok(token),
            None => Err(self.unexpected(&kind.to_string())),
        }
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        match self.peek() {
            Some(token) => Diagnostic::new(
                DiagnosticKind::UnexpectedToken {
                    expected: expected.to_string(),
                    found: format!("'{}'", token.lexeme),
                },
                token.loc,
            ),
            None => Diagnostic::bare(DiagnosticKind::UnexpectedEndOfProgram {
                expected: expected.to_string(),
            }),
        }
    }
}
