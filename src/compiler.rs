use crate::code_gen;
use crate::common::Diagnostics;
use crate::image::Executable;
use crate::lexer::{Lexer, ScannedProgram};
use crate::parser;
use crate::type_check::SemanticAnalyzer;

/// Everything one program's compilation produced.
pub struct ProgramOutput {
    pub number: usize,
    pub diagnostics: Diagnostics,
    pub image: Option<Executable>,
}

/// Compiles every `$`-terminated program in the source, front to back.
/// Programs are independent: each one gets fresh pass state, and one
/// failing never touches the next.
pub fn compile_source(source: &str) -> Vec<ProgramOutput> {
    let mut lexer = Lexer::new(source);
    let mut outputs = Vec::new();
    let mut number = 1;
    while let Some(scanned) = lexer.next_program() {
        outputs.push(compile_program(scanned, number));
        number += 1;
    }
    outputs
}

/// Runs one program through parse, semantic analysis, and code generation.
/// An error in any stage skips the stages after it; warnings never block
/// anything.
pub fn compile_program(scanned: ScannedProgram, number: usize) -> ProgramOutput {
    let ScannedProgram {
        tokens,
        mut diagnostics,
    } = scanned;

    if diagnostics.has_errors() {
        return ProgramOutput {
            number,
            diagnostics,
            image: None,
        };
    }

    let mut ast = match parser::parse(tokens) {
        Ok(ast) => ast,
        Err(diagnostic) => {
            diagnostics.push(diagnostic);
            return ProgramOutput {
                number,
                diagnostics,
                image: None,
            };
        }
    };

    let mut analyzer = SemanticAnalyzer::new();
    analyzer.analyze(&mut ast);
    diagnostics.extend(analyzer.diagnostics);

    if diagnostics.has_errors() {
        return ProgramOutput {
            number,
            diagnostics,
            image: None,
        };
    }

    match code_gen::generate(&ast) {
        Ok(image) => ProgramOutput {
            number,
            diagnostics,
            image: Some(image),
        },
        Err(diagnostic) => {
            diagnostics.push(diagnostic);
            ProgramOutput {
                number,
                diagnostics,
                image: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::DiagnosticKind;
    use crate::vm::Vm;

    fn run(source: &str) -> String {
        let outputs = compile_source(source);
        assert_eq!(outputs.len(), 1);
        let image = outputs[0].image.as_ref().expect("no image produced");
        Vm::new(image).run().expect("execution failed")
    }

    // =========================================================================
    // End-to-end round trips
    // =========================================================================

    #[test]
    fn empty_program_runs_to_halt() {
        assert_eq!(run("{ }$"), "");
    }

    #[test]
    fn prints_ints_strings_and_booleans() {
        assert_eq!(run("{ print(1) print(\"hi\") print(true) }$"), "1hitrue");
    }

    #[test]
    fn addition_round_trips() {
        assert_eq!(run("{ int a a = 1 + 2 + 3 print(a) }$"), "6");
    }

    #[test]
    fn while_loop_executes_the_implied_number_of_times() {
        assert_eq!(
            run("{ int n n = 0 while (n != 3) { print(n) n = 1 + n } }$"),
            "012"
        );
    }

    #[test]
    fn if_true_runs_the_block_and_if_false_skips_it() {
        assert_eq!(run("{ if true { print(1) } print(2) }$"), "12");
        assert_eq!(run("{ if (1 == 2) { print(1) } print(2) }$"), "2");
    }

    #[test]
    fn equality_on_ids_works_both_ways() {
        assert_eq!(
            run("{ int a int b a = 4 b = 4 if (a == b) { print(\"same\") } }$"),
            "same"
        );
        assert_eq!(
            run("{ int a int b a = 4 b = 5 if (a != b) { print(\"different\") } }$"),
            "different"
        );
    }

    #[test]
    fn shadowed_ids_read_their_own_slots() {
        assert_eq!(
            run("{ int a a = 1 { int a a = 2 print(a) } print(a) }$"),
            "21"
        );
    }

    #[test]
    fn default_values_by_type() {
        assert_eq!(run("{ int a print(a) }$"), "0");
        assert_eq!(run("{ boolean b print(b) }$"), "false");
        assert_eq!(run("{ string s print(s) }$"), "");
    }

    #[test]
    fn boolean_literal_condition_loops_and_breaks() {
        assert_eq!(
            run("{ boolean b b = true while b { print(1) b = false } }$"),
            "1"
        );
    }

    // =========================================================================
    // Stage skipping
    // =========================================================================

    #[test]
    fn type_mismatch_produces_diagnostics_and_no_image() {
        let outputs = compile_source("{ int a a = \"hi\" }$");
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].image.is_none());
        assert_eq!(outputs[0].diagnostics.error_count(), 1);
    }

    #[test]
    fn lex_errors_skip_parsing_entirely() {
        let outputs = compile_source("{ @ }$");
        assert!(outputs[0].image.is_none());
        assert!(outputs[0]
            .diagnostics
            .iter()
            .any(|d| matches!(d.kind, DiagnosticKind::UnexpectedCharacter('@'))));
        // no follow-on parse diagnostics for the same program
        assert_eq!(outputs[0].diagnostics.error_count(), 1);
    }

    #[test]
    fn parse_errors_skip_semantic_analysis() {
        let outputs = compile_source("{ print( }$");
        assert!(outputs[0].image.is_none());
        assert_eq!(outputs[0].diagnostics.error_count(), 1);
    }

    #[test]
    fn warnings_do_not_block_the_image() {
        let outputs = compile_source("{ int a }$");
        assert!(outputs[0].image.is_some());
        assert_eq!(outputs[0].diagnostics.warning_count(), 1);
    }

    #[test]
    fn one_bad_program_does_not_poison_the_next() {
        let outputs = compile_source("{ int a a = \"hi\" }$ { print(2) }$");
        assert_eq!(outputs.len(), 2);
        assert!(outputs[0].image.is_none());
        let image = outputs[1].image.as_ref().expect("second program failed");
        assert_eq!(Vm::new(image).run().unwrap(), "2");
    }

    #[test]
    fn program_numbers_count_up_from_one() {
        let outputs = compile_source("{ }$ { }$ { }$");
        let numbers: Vec<usize> = outputs.iter().map(|o| o.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }
}

