use crate::common::Location;
use crate::scope::ScopeId;
use crate::type_check::Type;

/// One node of the abstract syntax tree. `ty` starts out `None` everywhere
/// except literals and is filled in by semantic analysis where code
/// generation needs it (print statements, declarations, expressions).
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    pub loc: Location,
    pub ty: Option<Type>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Program(Box<AstNode>),
    Block(Vec<AstNode>),

    Print(Box<AstNode>),
    Assign(Box<AstNode>, Box<AstNode>),
    VarDecl {
        keyword: String,
        target: Box<AstNode>,
    },
    While(Box<AstNode>, Box<AstNode>),
    If(Box<AstNode>, Box<AstNode>),

    Add(Box<AstNode>, Box<AstNode>),
    Eq(Box<AstNode>, Box<AstNode>),
    Neq(Box<AstNode>, Box<AstNode>),

    IntLiteral(u8),
    BoolLiteral(bool),
    StrLiteral(String),
    /// Identifier occurrence; the owning scope id is resolved by semantic
    /// analysis and read back by code generation.
    Variable {
        name: String,
        scope: Option<ScopeId>,
    },
}

impl AstNode {
    pub fn new(loc: Location, kind: NodeKind) -> Self {
        Self {
            loc,
            ty: match &kind {
                NodeKind::IntLiteral(_) => Some(Type::Int),
                NodeKind::BoolLiteral(_) => Some(Type::Boolean),
                NodeKind::StrLiteral(_) => Some(Type::Str),
                _ => None,
            },
            kind,
        }
    }
}
