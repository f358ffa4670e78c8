use fnv::FnvHashMap;

use crate::ast::{AstNode, NodeKind};
use crate::backpatch::{BackpatchKey, BackpatchTable, Placeholder};
use crate::common::{Diagnostic, DiagnosticKind};
use crate::image::{Executable, IMAGE_SIZE};
use crate::type_check::Type;

/// Opcodes of the 8-bit accumulator machine. Immediate operands are one
/// byte, absolute operands two bytes little-endian, branch operands one
/// signed byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    LdaImm,
    LdaAbs,
    StaAbs,
    AdcAbs,
    LdxImm,
    LdxAbs,
    LdyImm,
    LdyAbs,
    CpxAbs,
    Bne,
    Halt,
    Sys,
}

impl Opcode {
    pub fn byte(self) -> u8 {
        match self {
            Opcode::LdaImm => 0xA9,
            Opcode::LdaAbs => 0xAD,
            Opcode::StaAbs => 0x8D,
            Opcode::AdcAbs => 0x6D,
            Opcode::LdxImm => 0xA2,
            Opcode::LdxAbs => 0xAE,
            Opcode::LdyImm => 0xA0,
            Opcode::LdyAbs => 0xAC,
            Opcode::CpxAbs => 0xEC,
            Opcode::Bne => 0xD0,
            Opcode::Halt => 0x00,
            Opcode::Sys => 0xFF,
        }
    }
}

/// One element of the symbolic stream: a literal byte, or a placeholder
/// that expands to a two-byte absolute address at link time.
#[derive(Debug, Clone, Copy, PartialEq)]
enum CodeUnit {
    Byte(u8),
    Patch(Placeholder),
}

impl CodeUnit {
    fn size(self) -> usize {
        match self {
            CodeUnit::Byte(_) => 1,
            CodeUnit::Patch(_) => 2,
        }
    }
}

fn units_len(units: &[CodeUnit]) -> usize {
    units.iter().map(|unit| unit.size()).sum()
}

/// Shape of a lowered expression; every caller branches on which one came
/// back.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ExprValue {
    /// One-byte literal: a digit, or the heap address of a string/boolean.
    Immediate(u8),
    /// Absolute address of a declared variable.
    Address(Placeholder),
    /// A longer sequence was emitted; its result sits in the scratch slot.
    InTemp,
}

// bytes of the forced backward branch appended after a while body:
// LDX# + LDA# + STA abs + CPX abs + BNE
const WHILE_TAIL_LEN: usize = 12;

type GenResult<T> = Result<T, Diagnostic>;

/// Lowers one annotated program to a 256-byte image. All state is per
/// program; a fresh generator is built for each one.
pub struct Generator {
    code: Vec<CodeUnit>,
    backpatch: BackpatchTable,
    image: Executable,
    heap_cursor: usize,
    heap_overflow: bool,
    heap_strings: FnvHashMap<String, u8>,
    bool_depth: u32,
}

pub fn generate(program: &AstNode) -> GenResult<Executable> {
    let mut generator = Generator::new();
    generator.program(program)?;
    generator.link()
}

impl Generator {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            backpatch: BackpatchTable::new(),
            image: Executable::new(),
            heap_cursor: IMAGE_SIZE,
            heap_overflow: false,
            heap_strings: FnvHashMap::default(),
            bool_depth: 0,
        }
    }

    fn program(&mut self, program: &AstNode) -> GenResult<()> {
        // the scratch slot claims the first row so it resolves to the
        // lowest variable address
        self.backpatch.find_or_create(BackpatchKey::Temp);

        // booleans are represented by these two heap addresses
        self.add_string_to_heap("true");
        self.add_string_to_heap("false");

        match &program.kind {
            NodeKind::Program(block) => self.block(block)?,
            _ => {
                return Err(Diagnostic::new(
                    DiagnosticKind::Internal("expected a program node"),
                    program.loc,
                ))
            }
        }
        self.emit_op(Opcode::Halt);
        Ok(())
    }

    fn block(&mut self, block: &AstNode) -> GenResult<()> {
        match &block.kind {
            NodeKind::Block(statements) => {
                for statement in statements {
                    self.statement(statement)?;
                }
                Ok(())
            }
            _ => Err(Diagnostic::new(
                DiagnosticKind::Internal("expected a block node"),
                block.loc,
            )),
        }
    }

    fn statement(&mut self, statement: &AstNode) -> GenResult<()> {
        match &statement.kind {
            NodeKind::Print(_) => self.print_statement(statement),
            NodeKind::Assign(target, value) => self.assignment(target, value),
            NodeKind::VarDecl { .. } => self.var_decl(statement),
            NodeKind::While(condition, body) => self.while_statement(condition, body),
            NodeKind::If(condition, body) => self.if_statement(condition, body),
            NodeKind::Block(_) => self.block(statement),
            _ => Err(Diagnostic::new(
                DiagnosticKind::Internal("expected a statement node"),
                statement.loc,
            )),
        }
    }

    fn print_statement(&mut self, statement: &AstNode) -> GenResult<()> {
        #[cfg(feature = "debug-logging")]
        eprintln!("code gen: print statement");

        let expr = match &statement.kind {
            NodeKind::Print(expr) => expr,
            _ => {
                return Err(Diagnostic::new(
                    DiagnosticKind::Internal("expected a print node"),
                    statement.loc,
                ))
            }
        };
        let value = self.expression(expr)?;
        let temp = self.temp();
        match value {
            ExprValue::Immediate(byte) => {
                self.emit_op(Opcode::LdyImm);
                self.emit_byte(byte);
            }
            ExprValue::Address(place) => {
                self.emit_op(Opcode::LdyAbs);
                self.emit_patch(place);
            }
            ExprValue::InTemp => {
                self.emit_op(Opcode::LdyAbs);
                self.emit_patch(temp);
            }
        }
        // X selects the call: 1 prints Y as an integer, 2 prints the
        // string at Y (which is how booleans print)
        match statement.ty {
            Some(Type::Int) => {
                self.emit_op(Opcode::LdxImm);
                self.emit_byte(0x01);
            }
            Some(Type::Str) | Some(Type::Boolean) => {
                self.emit_op(Opcode::LdxImm);
                self.emit_byte(0x02);
            }
            _ => {
                return Err(Diagnostic::new(
                    DiagnosticKind::Internal("print statement missing a resolved type"),
                    statement.loc,
                ))
            }
        }
        self.emit_op(Opcode::Sys);
        Ok(())
    }

    fn assignment(&mut self, target: &AstNode, value: &AstNode) -> GenResult<()> {
        #[cfg(feature = "debug-logging")]
        eprintln!("code gen: assignment");

        let target_place = self.variable_placeholder(target)?;
        let value = self.expression(value)?;
        self.load_accumulator(value);
        self.emit_op(Opcode::StaAbs);
        self.emit_patch(target_place);
        Ok(())
    }

    fn var_decl(&mut self, statement: &AstNode) -> GenResult<()> {
        #[cfg(feature = "debug-logging")]
        eprintln!("code gen: variable declaration");

        let target = match &statement.kind {
            NodeKind::VarDecl { target, .. } => target,
            _ => {
                return Err(Diagnostic::new(
                    DiagnosticKind::Internal("expected a declaration node"),
                    statement.loc,
                ))
            }
        };
        let target_place = self.variable_placeholder(target)?;
        match statement.ty {
            Some(Type::Str) => {
                // fresh strings point at the top byte, which always holds
                // the empty string's terminator
                self.emit_op(Opcode::LdaImm);
                self.emit_byte((IMAGE_SIZE - 1) as u8);
            }
            Some(Type::Boolean) => {
                let address = self.add_string_to_heap("false");
                self.emit_op(Opcode::LdaImm);
                self.emit_byte(address);
            }
            _ => {
                self.emit_op(Opcode::LdaImm);
                self.emit_byte(0x00);
            }
        }
        self.emit_op(Opcode::StaAbs);
        self.emit_patch(target_place);
        Ok(())
    }

    fn while_statement(&mut self, condition: &AstNode, body: &AstNode) -> GenResult<()> {
        #[cfg(feature = "debug-logging")]
        eprintln!("code gen: while statement");

        let start = self.code_len();
        self.condition_into_temp(condition)?;
        let truth = self.add_string_to_heap("true");
        let temp = self.temp();
        self.emit_op(Opcode::LdxImm);
        self.emit_byte(truth);
        self.emit_op(Opcode::CpxAbs);
        self.emit_patch(temp);

        let body_units = self.capture(|generator| generator.block(body))?;
        let body_len = units_len(&body_units);

        // skip the body plus the forced backward branch behind it
        self.emit_op(Opcode::Bne);
        self.emit_byte((body_len + WHILE_TAIL_LEN) as u8);
        self.code.extend(body_units);

        // force the branch back: X gets "false", the scratch slot "true",
        // so the comparison below never sets the flag
        let falsity = self.add_string_to_heap("false");
        self.emit_op(Opcode::LdxImm);
        self.emit_byte(falsity);
        self.emit_op(Opcode::LdaImm);
        self.emit_byte(truth);
        self.emit_op(Opcode::StaAbs);
        self.emit_patch(temp);
        self.emit_op(Opcode::CpxAbs);
        self.emit_patch(temp);
        self.emit_op(Opcode::Bne);
        // signed-byte wraparound: jumping back by the loop's whole length,
        // operand byte included, lands on the condition re-check
        let total = self.code_len() - start + 1;
        self.emit_byte(0u8.wrapping_sub(total as u8));
        Ok(())
    }

    fn if_statement(&mut self, condition: &AstNode, body: &AstNode) -> GenResult<()> {
        #[cfg(feature = "debug-logging")]
        eprintln!("code gen: if statement");

        self.condition_into_temp(condition)?;
        let truth = self.add_string_to_heap("true");
        let temp = self.temp();
        self.emit_op(Opcode::LdxImm);
        self.emit_byte(truth);
        self.emit_op(Opcode::CpxAbs);
        self.emit_patch(temp);

        let body_units = self.capture(|generator| generator.block(body))?;
        let body_len = units_len(&body_units);
        self.emit_op(Opcode::Bne);
        self.emit_byte(body_len as u8);
        self.code.extend(body_units);
        Ok(())
    }

    /// Normalizes a condition so its boolean (a heap address) sits in the
    /// scratch slot, whatever shape the expression lowered to.
    fn condition_into_temp(&mut self, condition: &AstNode) -> GenResult<()> {
        let value = self.expression(condition)?;
        let temp = self.temp();
        match value {
            ExprValue::Immediate(byte) => {
                self.emit_op(Opcode::LdaImm);
                self.emit_byte(byte);
                self.emit_op(Opcode::StaAbs);
                self.emit_patch(temp);
            }
            ExprValue::Address(place) => {
                self.emit_op(Opcode::LdaAbs);
                self.emit_patch(place);
                self.emit_op(Opcode::StaAbs);
                self.emit_patch(temp);
            }
            ExprValue::InTemp => {}
        }
        Ok(())
    }

    fn expression(&mut self, expr: &AstNode) -> GenResult<ExprValue> {
        match &expr.kind {
            NodeKind::IntLiteral(digit) => Ok(ExprValue::Immediate(*digit)),
            NodeKind::BoolLiteral(value) => {
                let address = self.add_string_to_heap(if *value { "true" } else { "false" });
                Ok(ExprValue::Immediate(address))
            }
            NodeKind::StrLiteral(value) => {
                let address = self.add_string_to_heap(value);
                Ok(ExprValue::Immediate(address))
            }
            NodeKind::Variable { .. } => {
                Ok(ExprValue::Address(self.variable_placeholder(expr)?))
            }
            NodeKind::Add(lhs, rhs) => self.addition(lhs, rhs),
            NodeKind::Eq(lhs, rhs) => self.comparison(expr, lhs, rhs, true),
            NodeKind::Neq(lhs, rhs) => self.comparison(expr, lhs, rhs, false),
            _ => Err(Diagnostic::new(
                DiagnosticKind::Internal("expected an expression node"),
                expr.loc,
            )),
        }
    }

    /// digit + Expr; the sum always ends up in the scratch slot.
    fn addition(&mut self, lhs: &AstNode, rhs: &AstNode) -> GenResult<ExprValue> {
        let temp = self.temp();
        let left = self.expression(lhs)?;
        let right = self.expression(rhs)?;
        match right {
            ExprValue::Immediate(byte) => {
                // park the literal in the scratch slot, then add it to the
                // left operand
                self.emit_op(Opcode::LdaImm);
                self.emit_byte(byte);
                self.emit_op(Opcode::StaAbs);
                self.emit_patch(temp);
                self.load_accumulator(left);
                self.emit_op(Opcode::AdcAbs);
                self.emit_patch(temp);
            }
            ExprValue::Address(place) => {
                self.load_accumulator(left);
                self.emit_op(Opcode::AdcAbs);
                self.emit_patch(place);
            }
            ExprValue::InTemp => {
                // the right-hand code already ran and left its result in
                // the scratch slot
                self.load_accumulator(left);
                self.emit_op(Opcode::AdcAbs);
                self.emit_patch(temp);
            }
        }
        self.emit_op(Opcode::StaAbs);
        self.emit_patch(temp);
        Ok(ExprValue::InTemp)
    }

    /// Equality/inequality; writes the heap address of "true" or "false"
    /// into the scratch slot. A per-depth slot keeps the left operand safe
    /// while the right one is evaluated.
    fn comparison(
        &mut self,
        node: &AstNode,
        lhs: &AstNode,
        rhs: &AstNode,
        equality: bool,
    ) -> GenResult<ExprValue> {
        if is_comparison(lhs) || is_comparison(rhs) {
            return Err(Diagnostic::new(DiagnosticKind::NestedBoolean, node.loc));
        }

        self.bool_depth += 1;
        let slot = self.backpatch.find_or_create(BackpatchKey::Bool(self.bool_depth));
        let temp = self.temp();

        let left = self.expression(lhs)?;
        self.load_accumulator(left);
        self.emit_op(Opcode::StaAbs);
        self.emit_patch(slot);

        let right = self.expression(rhs)?;
        match right {
            ExprValue::Immediate(byte) => {
                self.emit_op(Opcode::LdaImm);
                self.emit_byte(byte);
                self.emit_op(Opcode::StaAbs);
                self.emit_patch(temp);
            }
            ExprValue::Address(place) => {
                self.emit_op(Opcode::LdaAbs);
                self.emit_patch(place);
                self.emit_op(Opcode::StaAbs);
                self.emit_patch(temp);
            }
            ExprValue::InTemp => {}
        }

        self.emit_op(Opcode::LdxAbs);
        self.emit_patch(slot);
        self.emit_op(Opcode::CpxAbs);
        self.emit_patch(temp);

        let truth = self.add_string_to_heap("true");
        let falsity = self.add_string_to_heap("false");
        let (on_diff, on_equal) = if equality {
            (falsity, truth)
        } else {
            (truth, falsity)
        };
        // start from the branch-taken answer and overwrite it when the
        // comparison falls through
        self.emit_op(Opcode::LdaImm);
        self.emit_byte(on_diff);
        self.emit_op(Opcode::Bne);
        self.emit_byte(0x02);
        self.emit_op(Opcode::LdaImm);
        self.emit_byte(on_equal);
        self.emit_op(Opcode::StaAbs);
        self.emit_patch(temp);

        self.bool_depth -= 1;
        Ok(ExprValue::InTemp)
    }

    /// Loads the accumulator with a lowered expression value.
    fn load_accumulator(&mut self, value: ExprValue) {
        match value {
            ExprValue::Immediate(byte) => {
                self.emit_op(Opcode::LdaImm);
                self.emit_byte(byte);
            }
            ExprValue::Address(place) => {
                self.emit_op(Opcode::LdaAbs);
                self.emit_patch(place);
            }
            ExprValue::InTemp => {
                let temp = self.temp();
                self.emit_op(Opcode::LdaAbs);
                self.emit_patch(temp);
            }
        }
    }

    fn variable_placeholder(&mut self, node: &AstNode) -> GenResult<Placeholder> {
        match &node.kind {
            NodeKind::Variable { name, scope } => {
                let scope = scope.ok_or_else(|| {
                    Diagnostic::new(
                        DiagnosticKind::Internal("identifier missing its scope annotation"),
                        node.loc,
                    )
                })?;
                Ok(self.backpatch.find_or_create(BackpatchKey::Variable {
                    name: name.clone(),
                    scope,
                }))
            }
            _ => Err(Diagnostic::new(
                DiagnosticKind::Internal("expected an identifier"),
                node.loc,
            )),
        }
    }

    /// Interns a string at the top of the image, one entry per distinct
    /// value, and returns its one-byte address.
    fn add_string_to_heap(&mut self, value: &str) -> u8 {
        if let Some(&address) = self.heap_strings.get(value) {
            return address;
        }
        #[cfg(feature = "debug-logging")]
        eprintln!("code gen: adding {:?} to the heap", value);
        // one extra byte for the zero terminator
        match self.heap_cursor.checked_sub(value.len() + 1) {
            Some(cursor) => {
                self.heap_cursor = cursor;
                for (offset, byte) in value.bytes().enumerate() {
                    self.image.set(cursor + offset, byte);
                }
                let address = cursor as u8;
                self.heap_strings.insert(value.to_string(), address);
                address
            }
            None => {
                // flagged here, reported by the collision check at link time
                self.heap_overflow = true;
                self.heap_strings.insert(value.to_string(), 0);
                0
            }
        }
    }

    /// Runs `f` against an empty stream and hands back what it emitted,
    /// restoring the surrounding stream. Control flow needs a nested
    /// block's byte length before the branch over it can be written.
    fn capture<F>(&mut self, f: F) -> GenResult<Vec<CodeUnit>>
    where
        F: FnOnce(&mut Self) -> GenResult<()>,
    {
        let saved = std::mem::replace(&mut self.code, Vec::new());
        let result = f(self);
        let inner = std::mem::replace(&mut self.code, saved);
        result.map(|()| inner)
    }

    fn temp(&mut self) -> Placeholder {
        self.backpatch.find_or_create(BackpatchKey::Temp)
    }

    fn emit_op(&mut self, op: Opcode) {
        self.code.push(CodeUnit::Byte(op.byte()));
    }

    fn emit_byte(&mut self, byte: u8) {
        self.code.push(CodeUnit::Byte(byte));
    }

    fn emit_patch(&mut self, place: Placeholder) {
        self.code.push(CodeUnit::Patch(place));
    }

    fn code_len(&self) -> usize {
        units_len(&self.code)
    }

    /// Assigns variable addresses right above the code, checks the two
    /// regions never meet, and resolves the stream into the image.
    fn link(mut self) -> GenResult<Executable> {
        let code_length = self.code_len();
        if self.heap_overflow || code_length + self.backpatch.len() >= self.heap_cursor {
            return Err(Diagnostic::bare(DiagnosticKind::OutOfMemory));
        }

        #[cfg(feature = "debug-logging")]
        eprintln!(
            "code gen: backpatching {} variable slots at {:#04X}",
            self.backpatch.len(),
            code_length
        );

        self.backpatch.backpatch(code_length as u8);
        let mut cursor = 0;
        for unit in &self.code {
            match unit {
                CodeUnit::Byte(byte) => {
                    self.image.set(cursor, *byte);
                    cursor += 1;
                }
                CodeUnit::Patch(place) => {
                    let address = self.backpatch.address(*place).ok_or_else(|| {
                        Diagnostic::bare(DiagnosticKind::Internal("unresolved placeholder"))
                    })?;
                    self.image.set(cursor, address);
                    self.image.set(cursor + 1, 0x00);
                    cursor += 2;
                }
            }
        }
        Ok(self.image)
    }
}

fn is_comparison(node: &AstNode) -> bool {
    matches!(node.kind, NodeKind::Eq(_, _) | NodeKind::Neq(_, _))
}
