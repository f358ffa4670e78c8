use assert_cmd::Command;

fn compile(file: &str) -> (String, String, Option<i32>) {
    let output = Command::cargo_bin(env!("CARGO_PKG_NAME"))
        .unwrap()
        .arg(format!("test_data/{}", file))
        .output()
        .expect("failed to run the compiler");
    (
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
        output.status.code(),
    )
}

#[test]
fn print_int() {
    let (stdout, _, code) = compile("print_int.opal");
    assert_eq!(code, Some(0));
    assert!(stdout.contains("compiled with 0 error(s)"));
    assert!(stdout.contains("Output: 1"));
}

#[test]
fn addition() {
    let (stdout, _, code) = compile("addition.opal");
    assert_eq!(code, Some(0));
    assert!(stdout.contains("Output: 6"));
}

#[test]
fn while_loop() {
    let (stdout, _, code) = compile("while_loop.opal");
    assert_eq!(code, Some(0));
    assert!(stdout.contains("Output: 012"));
}

#[test]
fn scope_shadowing() {
    let (stdout, _, code) = compile("scope_shadowing.opal");
    assert_eq!(code, Some(0));
    assert!(stdout.contains("Output: 21"));
}

#[test]
fn string_dedup() {
    let (stdout, _, code) = compile("string_dedup.opal");
    assert_eq!(code, Some(0));
    assert!(stdout.contains("Output: hihi"));
}

#[test]
fn booleans() {
    let (stdout, stderr, code) = compile("booleans.opal");
    assert_eq!(code, Some(0));
    assert!(stdout.contains("Output: falsetrue"));
    assert!(stderr.contains("used before it is initialized"));
}

#[test]
fn multiple_programs() {
    let (stdout, _, code) = compile("multiple_programs.opal");
    assert_eq!(code, Some(0));
    assert!(stdout.contains("Program 1 compiled"));
    assert!(stdout.contains("Program 2 compiled"));
    assert!(stdout.contains("Output: 1"));
    assert!(stdout.contains("Output: 2"));
}

#[test]
fn missing_end_marker() {
    let (stdout, stderr, code) = compile("missing_end_marker.opal");
    assert_eq!(code, Some(0));
    assert!(stderr.contains("missing $ at end of program"));
    assert!(stdout.contains("Output: 1"));
}

#[test]
fn unused_warning() {
    let (stdout, stderr, code) = compile("unused_warning.opal");
    assert_eq!(code, Some(0));
    assert!(stderr.contains("never initialized or used"));
    assert!(stdout.contains("compiled with 0 error(s) and 1 warning(s)"));
}

#[test]
fn type_mismatch() {
    let (stdout, stderr, code) = compile("type_mismatch.opal");
    assert_eq!(code, Some(1));
    assert!(stderr.contains("type mismatch"));
    assert!(stdout.contains("no image produced"));
}

#[test]
fn undeclared_id() {
    let (stdout, stderr, code) = compile("undeclared_id.opal");
    assert_eq!(code, Some(1));
    assert!(stderr.contains("is not declared"));
    assert!(stdout.contains("no image produced"));
}

#[test]
fn redeclared_id() {
    let (_, stderr, code) = compile("redeclared_id.opal");
    assert_eq!(code, Some(1));
    assert!(stderr.contains("already declared"));
}

#[test]
fn nested_boolean() {
    let (stdout, stderr, code) = compile("nested_boolean.opal");
    assert_eq!(code, Some(1));
    assert!(stderr.contains("nested boolean expressions are not supported"));
    assert!(stdout.contains("no image produced"));
}

#[test]
fn out_of_memory() {
    let (stdout, stderr, code) = compile("out_of_memory.opal");
    assert_eq!(code, Some(1));
    assert!(stderr.contains("out of memory"));
    assert!(stdout.contains("no image produced"));
}

#[test]
fn bad_program_then_good_program() {
    let (stdout, _, code) = compile("mixed_results.opal");
    // the file as a whole fails, but the second program still runs
    assert_eq!(code, Some(1));
    assert!(stdout.contains("Program 1 failed"));
    assert!(stdout.contains("Program 2 compiled"));
    assert!(stdout.contains("Output: 2"));
}

#[test]
fn missing_file_fails() {
    let (_, _, code) = compile("does_not_exist.opal");
    assert_eq!(code, Some(1));
}
