//! End-to-end tests: BASIC source in, Rust source (or a diagnostic) out.

use indoc::indoc;
use rebasic::error::CompileError;
use rebasic::transpiler::Transpiler;

#[test]
fn test_guessing_game_end_to_end() {
    let rust = Transpiler::transpile(indoc! {"
        REM GUESS THE HIDDEN NUMBER
        GOSUB 200
        LET X=S-S/10*10
        10 INPUT A
        IF A>=0 THEN IF A<=9 THEN GOTO 50
        PRINT \"OUT OF RANGE\"
        50 IF A=X THEN GOTO 90
        PRINT \"MISS\"
        IF A<>X THEN GOTO 10
        90 PRINT \"FOUND IT\"
        END
        200 LET S=(42*S+127)-((42*S+127)/126*126)
        RETURN
    "})
    .unwrap();

    // the generator subroutine and its call
    assert!(rust.contains("fn f_200(state: &mut State) {"));
    assert!(rust.contains("f_200(&mut state);"));
    // the retry loop is a do-while on the miss condition
    assert!(rust.contains("loop {"));
    assert!(rust.contains("if state.a == state.x {\n            break;"));
    // the range check collapses into one disjunction guard
    assert!(rust.contains("if state.a < 0 || state.a > 9 {"));
    // the found-escape travels through a synthetic boolean
    assert!(rust.contains("t1: bool,"));
    assert!(rust.contains("state.t1 = state.a == state.x;"));
    assert!(rust.contains("if state.t1 {"));
    // no jump survives into the output
    assert!(!rust.contains("goto"));
}

#[test]
fn test_lander_loop_nesting() {
    let rust = Transpiler::transpile(indoc! {"
        REM ONE BURN PER PASS
        10 PRINT \"FUEL LEFT \", F
        20 INPUT B
        IF B<0 THEN GOTO 20
        LET F=F-B
        GOTO 10
    "})
    .unwrap();

    let expected = indoc! {"
        use std::io;

        struct State {
            b: i32,
            f: i32,
        }

        fn main() {
            let mut state = State {
                b: 0,
                f: 0,
            };
            loop {
                println!(\"{}{}\", \"FUEL LEFT \", state.f);
                loop {
                    loop {
                        let mut input = String::new();
                        io::stdin().read_line(&mut input).unwrap();
                        match input.trim().parse::<i32>() {
                            Ok(i) => { state.b = i; break }
                            Err(_) => println!(\"invalid number\"),
                        }
                    }
                    if state.b >= 0 {
                        break;
                    }
                }
                state.f = state.f - state.b;
            }
        }
    "};
    assert_eq!(rust, expected);
}

#[test]
fn test_empty_program_is_valid() {
    assert_eq!(Transpiler::transpile("").unwrap(), "fn main() {\n}\n");
}

#[test]
fn test_end_only_program_is_valid() {
    let rust = Transpiler::transpile("10 END\n").unwrap();
    assert_eq!(rust, "fn main() {\n    return;\n}\n");
}

#[test]
fn test_lex_diagnostic() {
    let err = Transpiler::transpile("10 PRINT \"OOPS\n").unwrap_err();
    assert!(matches!(err, CompileError::Lex(_)));
    assert!(err.to_string().starts_with("lex error: line 1:"));
}

#[test]
fn test_parse_diagnostic() {
    let err = Transpiler::transpile("10 PRINT \"A\"\n20 LET A 5\n").unwrap_err();
    assert!(matches!(err, CompileError::Parse(_)));
    let text = err.to_string();
    assert!(text.starts_with("parse error: line 2:"), "got: {}", text);
}

#[test]
fn test_resolve_diagnostic() {
    let err = Transpiler::transpile("10 GOTO 99\n20 END\n").unwrap_err();
    assert!(matches!(err, CompileError::Resolve(_)));
    assert!(err.to_string().contains("unresolved label 99"));
}

#[test]
fn test_structure_diagnostic() {
    let err = Transpiler::transpile(indoc! {"
        IF C>0 THEN GOTO 50
        30 LET X=1
        50 LET Y=2
        GOTO 30
        END
    "})
    .unwrap_err();
    assert!(matches!(err, CompileError::Structure(_)));
    assert!(err.to_string().contains("unstructurable control flow"));
}

#[test]
fn test_remarks_leave_no_trace() {
    let rust = Transpiler::transpile(indoc! {"
        REM setup
        10 LET A=1
        REM print it
        20 PRINT A
        30 END
    "})
    .unwrap();
    assert!(!rust.to_lowercase().contains("rem"));
    assert!(!rust.contains("setup"));
}
