use std::fmt;

use crate::ast::{AstNode, NodeKind};
use crate::common::{DiagnosticKind, Diagnostics};
use crate::scope::ScopeTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int,
    Str,
    Boolean,
    Unknown,
}

impl Type {
    pub fn from_keyword(keyword: &str) -> Type {
        match keyword {
            "int" => Type::Int,
            "string" => Type::Str,
            "boolean" => Type::Boolean,
            _ => Type::Unknown,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Type::Int => "int",
            Type::Str => "string",
            Type::Boolean => "boolean",
            Type::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Walks one program's AST, driving the scope tree as it goes: declarations
/// and assignments flow into the tree, identifier reads flow back out as
/// types and scope ids. Errors accumulate and never stop the walk, so a
/// program always gets its complete diagnostic set.
pub struct SemanticAnalyzer {
    pub scopes: ScopeTree,
    pub diagnostics: Diagnostics,
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        Self {
            scopes: ScopeTree::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Analyzes a whole program, annotating the tree in place: resolved
    /// types on print/declaration/expression nodes, owning scope ids on
    /// identifier occurrences.
    pub fn analyze(&mut self, program: &mut AstNode) {
        if let NodeKind::Program(block) = &mut program.kind {
            self.check_block(block);
        }
        self.scopes.collect_warnings(&mut self.diagnostics);
    }

    fn check_block(&mut self, block: &mut AstNode) {
        self.scopes.enter_scope();
        if let NodeKind::Block(statements) = &mut block.kind {
            for statement in statements.iter_mut() {
                self.check_statement(statement);
            }
        }
        self.scopes.exit_scope();
    }

    fn check_statement(&mut self, statement: &mut AstNode) {
        if let NodeKind::Block(_) = statement.kind {
            self.check_block(statement);
            return;
        }
        let loc = statement.loc;
        match &mut statement.kind {
            NodeKind::Print(expr) => {
                let ty = self.resolve_expr(expr);
                if ty == Type::Unknown {
                    self.diagnostics.report(DiagnosticKind::InvalidPrintType, loc);
                }
                statement.ty = Some(ty);
            }
            NodeKind::Assign(target, value) => {
                let assigned = self.resolve_expr(value);
                let target_loc = target.loc;
                if let NodeKind::Variable { name, scope } = &mut target.kind {
                    *scope = self.scopes.initialize_id(
                        name,
                        assigned,
                        target_loc,
                        &mut self.diagnostics,
                    );
                }
            }
            NodeKind::VarDecl { keyword, target } => {
                let ty = Type::from_keyword(keyword);
                let target_loc = target.loc;
                if let NodeKind::Variable { name, scope } = &mut target.kind {
                    *scope = self
                        .scopes
                        .declare_id(name, ty, target_loc, &mut self.diagnostics);
                }
                statement.ty = Some(ty);
            }
            NodeKind::While(condition, body) | NodeKind::If(condition, body) => {
                let ty = self.resolve_expr(condition);
                if ty != Type::Boolean {
                    self.diagnostics
                        .report(DiagnosticKind::InvalidConditionType(ty), condition.loc);
                }
                self.check_block(body);
            }
            _ => {}
        }
    }

    /// Resolves an expression's type, recovering from every error so the
    /// rest of the tree still gets checked.
    fn resolve_expr(&mut self, expr: &mut AstNode) -> Type {
        let loc = expr.loc;
        let ty = match &mut expr.kind {
            NodeKind::Add(lhs, rhs) => {
                let left = self.resolve_expr(lhs);
                let right = self.resolve_expr(rhs);
                if left != Type::Int || right != Type::Int {
                    self.diagnostics
                        .report(DiagnosticKind::InvalidOperandType { left, right }, loc);
                }
                Type::Int
            }
            NodeKind::Eq(lhs, rhs) | NodeKind::Neq(lhs, rhs) => {
                let left = self.resolve_expr(lhs);
                let right = self.resolve_expr(rhs);
                if left != right {
                    self.diagnostics
                        .report(DiagnosticKind::ComparisonMismatch { left, right }, loc);
                }
                Type::Boolean
            }
            NodeKind::IntLiteral(_) => Type::Int,
            NodeKind::BoolLiteral(_) => Type::Boolean,
            NodeKind::StrLiteral(_) => Type::Str,
            NodeKind::Variable { name, scope } => {
                let (ty, owner) = self.scopes.use_id(name, loc, &mut self.diagnostics);
                *scope = owner;
                ty
            }
            _ => Type::Unknown,
        };
        expr.ty = Some(ty);
        ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser;
    use crate::scope::ScopeId;

    fn analyze(source: &str) -> (AstNode, SemanticAnalyzer) {
        let scanned = Lexer::new(source).next_program().expect("no program");
        assert!(scanned.diagnostics.is_empty(), "lex errors in test input");
        let mut ast = parser::parse(scanned.tokens).expect("parse error in test input");
        let mut analyzer = SemanticAnalyzer::new();
        analyzer.analyze(&mut ast);
        (ast, analyzer)
    }

    fn statements(ast: &AstNode) -> &[AstNode] {
        match &ast.kind {
            NodeKind::Program(block) => match &block.kind {
                NodeKind::Block(statements) => statements,
                _ => panic!("expected block"),
            },
            _ => panic!("expected program"),
        }
    }

    fn variable_scope(node: &AstNode) -> Option<ScopeId> {
        match &node.kind {
            NodeKind::Variable { scope, .. } => *scope,
            other => panic!("expected a variable, got {:?}", other),
        }
    }

    #[test]
    fn propagates_types_through_a_clean_program() {
        let (ast, analyzer) = analyze("{ int a a = 5 print(a) }$");
        assert!(analyzer.diagnostics.is_empty());
        let statements = statements(&ast);
        // declaration annotated with its type
        assert_eq!(statements[0].ty, Some(Type::Int));
        // the print statement picked up the operand type
        assert_eq!(statements[2].ty, Some(Type::Int));
        match &statements[2].kind {
            NodeKind::Print(expr) => {
                assert_eq!(expr.ty, Some(Type::Int));
                assert_eq!(variable_scope(expr), Some(0));
            }
            _ => panic!("expected print"),
        }
    }

    #[test]
    fn assignment_mismatch_is_one_error() {
        let (_, analyzer) = analyze("{ int a a = \"hi\" }$");
        assert_eq!(analyzer.diagnostics.error_count(), 1);
        assert!(analyzer.diagnostics.iter().any(|d| matches!(
            d.kind,
            DiagnosticKind::TypeMismatch { .. }
        )));
    }

    #[test]
    fn addition_requires_int_operands() {
        let (_, analyzer) = analyze("{ int a a = 1 + true }$");
        assert!(analyzer.diagnostics.iter().any(|d| matches!(
            d.kind,
            DiagnosticKind::InvalidOperandType { .. }
        )));
        // error recovery: the addition still counts as int, so the
        // assignment itself does not double-report
        assert_eq!(analyzer.diagnostics.error_count(), 1);
    }

    #[test]
    fn comparison_of_unlike_types_reports_but_stays_boolean() {
        let (ast, analyzer) = analyze("{ if (1 == \"x\") { } }$");
        assert_eq!(analyzer.diagnostics.error_count(), 1);
        assert!(analyzer.diagnostics.iter().any(|d| matches!(
            d.kind,
            DiagnosticKind::ComparisonMismatch { .. }
        )));
        // the condition resolved to boolean, so no condition-type error
        match &statements(&ast)[0].kind {
            NodeKind::If(condition, _) => assert_eq!(condition.ty, Some(Type::Boolean)),
            _ => panic!("expected if"),
        }
    }

    #[test]
    fn non_boolean_condition_is_rejected() {
        // the grammar only admits boolean conditions, so build the bad
        // tree directly
        use crate::common::Location;
        let loc = Location { line: 1, column: 1 };
        let condition = AstNode::new(loc, NodeKind::IntLiteral(1));
        let body = AstNode::new(loc, NodeKind::Block(Vec::new()));
        let statement = AstNode::new(
            loc,
            NodeKind::While(Box::new(condition), Box::new(body)),
        );
        let block = AstNode::new(loc, NodeKind::Block(vec![statement]));
        let mut program = AstNode::new(loc, NodeKind::Program(Box::new(block)));
        let mut analyzer = SemanticAnalyzer::new();
        analyzer.analyze(&mut program);
        assert!(analyzer
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::InvalidConditionType(Type::Int)));
    }

    #[test]
    fn shadowed_ids_resolve_to_the_inner_scope() {
        let (ast, analyzer) = analyze("{ int a a = 1 { int a a = 2 print(a) } print(a) }$");
        assert!(!analyzer.diagnostics.has_errors());
        let statements = statements(&ast);
        let inner = match &statements[2].kind {
            NodeKind::Block(inner) => inner,
            other => panic!("expected block, got {:?}", other),
        };
        match &inner[2].kind {
            NodeKind::Print(expr) => assert_eq!(variable_scope(expr), Some(1)),
            _ => panic!("expected print"),
        }
        match &statements[3].kind {
            NodeKind::Print(expr) => assert_eq!(variable_scope(expr), Some(0)),
            _ => panic!("expected print"),
        }
    }

    #[test]
    fn undeclared_assignment_reports_and_continues() {
        let (_, analyzer) = analyze("{ a = 1 b = 2 }$");
        assert_eq!(analyzer.diagnostics.error_count(), 2);
    }

    #[test]
    fn printing_an_undeclared_id_reports_both_problems() {
        let (_, analyzer) = analyze("{ print(a) }$");
        // undeclared, and the unknown type makes the print invalid too
        assert_eq!(analyzer.diagnostics.error_count(), 2);
        assert!(analyzer
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::InvalidPrintType));
    }

    #[test]
    fn unused_and_uninitialized_warnings_come_out_of_the_sweep() {
        let (_, analyzer) = analyze("{ int a int b b = 1 }$");
        assert_eq!(analyzer.diagnostics.error_count(), 0);
        assert_eq!(analyzer.diagnostics.warning_count(), 2);
        assert!(analyzer
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnusedUninitialized("a".to_string())));
        assert!(analyzer
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnusedSymbol("b".to_string())));
    }

    #[test]
    fn use_before_initialize_is_only_a_warning() {
        let (_, analyzer) = analyze("{ int a print(a) a = 1 }$");
        assert_eq!(analyzer.diagnostics.error_count(), 0);
        assert!(analyzer
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UsedBeforeInitialized("a".to_string())));
    }
}
