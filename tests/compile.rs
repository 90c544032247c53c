use pascalc::{
    arch::{Opcode, Operand},
    compile,
    error::{CompileError, ErrorKind},
    parse_source,
    semantic::SemanticError,
    tokenize, TokenTable,
};

const FACTORIAL: &str = include_str!("programs/factorial.pas");

/// Listing lines with runs of whitespace collapsed.
fn listing(source: &str) -> Vec<String> {
    let (_, code) = compile(source.as_bytes(), "test").unwrap();

    code.to_string()
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect()
}

fn contains(lines: &[String], expected: &[&str]) -> bool {
    lines
        .windows(expected.len())
        .any(|window| window.iter().zip(expected).all(|(line, expected)| line == expected))
}

#[test]
fn test_small_program() {
    let lines = listing("program P; var x: integer; begin x := 2 + 3; write(x); end.");

    assert!(contains(
        &lines,
        &[
            "start:",
            "push ebp",
            "mov ebp, esp",
            "mov dword ptr [display], ebp",
            "sub esp, 4",
            "push 5",
            "pop dword ptr [ebp - 4]",
            "printf(\"%d\", dword ptr [ebp - 4])",
            "mov esp, ebp",
            "pop ebp",
            "exit",
            "end start",
        ]
    ));
}

#[test]
fn test_listing_layout() {
    let (_, code) = compile("begin end.".as_bytes(), "test").unwrap();
    let listing = code.to_string();
    let lines: Vec<_> = listing.lines().collect();

    assert_eq!(
        &lines[..5],
        &[
            "include c:\\masm32\\include\\masm32rt.inc",
            ".xmm",
            ".data?",
            "display dd 1 dup(?)",
            ".code",
        ]
    );

    assert!(lines.contains(&"\tmov     ebp, esp"));
    assert_eq!(lines.last(), Some(&"end start"));
}

#[test]
fn test_factorial_functions() {
    let lines = listing(FACTORIAL);

    assert!(lines.contains(&"display dd 2 dup(?)".to_string()));

    // Recursive call inside `fact`
    assert!(contains(
        &lines,
        &[
            "push dword ptr [ebp + 12]",
            "push dword ptr [ebp + 12]",
            "push 1",
            "pop ebx",
            "pop eax",
            "sub eax, ebx",
            "push eax",
            "call fn_fact_1",
            "add esp, 4",
            "push eax",
            "pop ebx",
            "pop eax",
            "imul eax, ebx",
            "push eax",
            "pop dword ptr [ebp - 4]",
        ]
    ));

    // `sum` is passed by reference
    assert!(contains(
        &lines,
        &[
            "fn_accumulate_2:",
            "push dword ptr [display + 4]",
            "push ebp",
            "mov ebp, esp",
            "mov dword ptr [display + 4], ebp",
            "sub esp, 0",
            "mov eax, dword ptr [ebp + 16]",
            "push dword ptr [eax]",
            "push dword ptr [ebp + 12]",
            "pop ebx",
            "pop eax",
            "add eax, ebx",
            "push eax",
            "mov eax, dword ptr [ebp + 16]",
            "pop dword ptr [eax]",
            "mov esp, ebp",
            "pop ebp",
            "pop dword ptr [display + 4]",
            "ret",
        ]
    ));
}

#[test]
fn test_factorial_main() {
    let lines = listing(FACTORIAL);

    // Locals take 16 bytes, the loop bound one more slot
    assert!(contains(&lines, &["mov dword ptr [display], ebp", "sub esp, 20"]));

    assert!(contains(
        &lines,
        &[
            "push 1",
            "pop dword ptr [ebp - 4]",
            "push 5",
            "pop dword ptr [ebp - 20]",
        ]
    ));

    assert!(contains(
        &lines,
        &[
            "lea eax, dword ptr [ebp - 8]",
            "push eax",
            "push dword ptr [ebp - 4]",
            "call fn_fact_1",
            "add esp, 4",
            "push eax",
            "call fn_accumulate_2",
            "add esp, 8",
        ]
    ));

    assert!(contains(
        &lines,
        &[
            "push dword ptr [ebp - 8]",
            "cvtsi2sd xmm0, dword ptr [esp]",
            "sub esp, 4",
            "movsd qword ptr [esp], xmm0",
            "push 1071644672",
            "push 0",
            "movsd xmm1, qword ptr [esp]",
            "add esp, 8",
            "movsd xmm0, qword ptr [esp]",
            "add esp, 8",
            "mulsd xmm0, xmm1",
            "sub esp, 8",
            "movsd qword ptr [esp], xmm0",
            "pop dword ptr [ebp - 16]",
            "pop dword ptr [ebp - 12]",
        ]
    ));

    assert!(lines.contains(
        &"printf(\"total = %d, ratio = %f\\n\", dword ptr [ebp - 8], qword ptr [ebp - 16])"
            .to_string()
    ));
}

#[test]
fn test_factorial_tree() {
    let program = parse_source(FACTORIAL.as_bytes(), "factorial.pas").unwrap();
    let tree = program.to_string();
    let lines: Vec<_> = tree.lines().collect();

    assert_eq!(lines[0], "fact : function(k: integer) : integer");
    assert_eq!(lines[1], "|-- var result : integer");
    assert_eq!(lines[2], "--- begin");

    assert!(lines.contains(&"accumulate : function(var sum: integer; k: integer) : nil"));
    assert!(lines.contains(&"Factorial : function() : nil"));
    assert!(lines.contains(&"|-- var ratio : double"));
}

#[test]
fn test_factorial_tokens() {
    let tokens = tokenize(FACTORIAL.as_bytes(), "factorial.pas").unwrap();
    let table = TokenTable(&tokens).to_string();

    // Comments leave no tokens behind
    assert!(!table.contains("Recursive"));
    assert!(table.lines().nth(1).unwrap().starts_with("1 | 1 | "));
    assert!(table.contains("| 0.5 | "));
}

#[test]
fn test_generated_calls() {
    let (program, code) = compile(FACTORIAL.as_bytes(), "factorial.pas").unwrap();

    let calls: Vec<_> = code
        .instructions()
        .filter(|(opcode, _)| *opcode == Opcode::Call)
        .map(|(_, operands)| operands[0].clone())
        .collect();

    assert_eq!(
        calls,
        vec![
            Operand::Text("fn_fact_1".into()),
            Operand::Text("fn_fact_1".into()),
            Operand::Text("fn_accumulate_2".into()),
        ]
    );

    assert_eq!(program.functions.len(), 2);
}

#[test]
fn test_shadowing() {
    let lines = listing(
        "var x: integer; \
         procedure p; var x: double; begin x := 1; end; \
         begin x := 2; end.",
    );

    // The local double takes both of its dwords
    assert!(contains(
        &lines,
        &["push 1072693248", "push 0", "pop dword ptr [ebp - 8]", "pop dword ptr [ebp - 4]"]
    ));

    assert!(contains(&lines, &["push 2", "pop dword ptr [ebp - 4]"]));
}

#[test]
fn test_semantic_errors() {
    let cases = [
        ("var a: array[5..1] of integer; begin end.", "Illegal range: 5..1"),
        (
            "var a: array[1..3] of integer; begin a[5] := 0; end.",
            "Index 5 out of range 1..3",
        ),
        (
            "type r = record a: integer; b: char; end; const c: r = (b: 'x'; a: 1); begin end.",
            "Illegal initialization order: expected field `a`, found `b`",
        ),
        ("begin break; end.", "`break` outside of a loop"),
    ];

    for (source, message) in cases {
        let error = compile(source.as_bytes(), "test").unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Lexical, "{}", source);
        assert!(error.to_string().ends_with(message), "{}", error);
    }
}

#[test]
fn test_record_initialization() {
    let source = "type r = record a: integer; b: char; end; \
                  var v: r = (a: 1; b: 'x'); \
                  begin end.";
    let lines = listing(source);

    assert!(contains(
        &lines,
        &[
            "push 120",
            "push 1",
            "pop dword ptr [ebp - 8]",
            "pop dword ptr [ebp - 4]",
        ]
    ));
}

#[test]
fn test_error_positions() {
    let error = compile("var x: integer;\nbegin\n  x := y;\nend.".as_bytes(), "test").unwrap_err();

    match &error {
        CompileError::Semantic(error) => {
            assert!(matches!(error.val(), SemanticError::NotFound(_)));
            assert_eq!(error.location().start().line(), 3);
            assert_eq!(error.location().start().column(), 8);
        }

        other => panic!("unexpected error {}", other),
    }

    let error = compile("begin x := 1 end".as_bytes(), "test").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Lexical);

    let error = compile("begin if then; end.".as_bytes(), "test").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Syntax);
    assert_eq!(error.exit_code(), 3);
}
