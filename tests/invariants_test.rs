//! Whole-pipeline invariant checks: every accepted program structures into a
//! tree where breaks live inside loops, returns inside subroutines, calls
//! reference defined subroutines, and the state set matches what is assigned.

use indoc::indoc;
use rebasic::ast::{Flag, Stmt, StructuredProgram};
use rebasic::flow;
use rebasic::lexer::Lexer;
use rebasic::parser::Parser;
use rebasic::structure::structure_program;
use std::collections::BTreeSet;

const CORPUS: &[&str] = &[
    // empty and trivial programs
    "",
    "10 END\n",
    "10 PRINT \"HELLO\"\n",
    // fibonacci: backward conditional jump
    indoc! {"
        LET A=0
        LET B=1
        100 PRINT A
        LET B=A+B
        LET A=B-A
        IF B<=1000 THEN GOTO 100
        END
    "},
    // bare backward jump
    "10 PRINT \"HI\"\nGOTO 10\n",
    // forward skips, conditional and bare
    indoc! {"
        10 LET A=1
        20 IF A=1 THEN GOTO 50
        30 LET B=A+2
        40 PRINT B
        50 PRINT A
        60 END
    "},
    indoc! {"
        10 LET A=1
        GOTO 50
        30 PRINT A
        50 END
    "},
    // forward escape out of a loop
    indoc! {"
        10 LET I=0
        20 LET I=I+1
        IF X<0 THEN GOTO 100
        PRINT I
        IF I<10 THEN GOTO 20
        100 END
    "},
    // two escapes sharing a target
    indoc! {"
        10 LET I=I+1
        IF X<0 THEN GOTO 90
        IF Y<0 THEN GOTO 90
        IF I<10 THEN GOTO 10
        90 END
    "},
    // subroutines, including a flag inside one
    indoc! {"
        GOSUB 200
        PRINT R
        END
        200 LET S=(42*S+127)-((42*S+127)/126*126)
        LET R=S
        RETURN
    "},
    indoc! {"
        GOSUB 100
        END
        100 LET I=I+1
        110 IF I>5 THEN GOTO 130
        PRINT I
        GOTO 110
        130 RETURN
    "},
    // nested loops
    indoc! {"
        10 PRINT \"FUEL\"
        20 INPUT F
        IF F<0 THEN GOTO 20
        PRINT F
        GOTO 10
    "},
    // chained conditions
    indoc! {"
        10 IF X>=0 THEN IF X<=9 THEN IF Y>=0 THEN IF Y<=9 THEN GOTO 20
        PRINT \"OUT OF RANGE\"
        20 LET X=0
    "},
];

fn structured(source: &str) -> StructuredProgram {
    let tokens = Lexer::new(source).tokenize().unwrap();
    let program = Parser::new(tokens).parse_program().unwrap();
    structure_program(flow::analyze(program).unwrap()).unwrap()
}

fn check_block(
    stmts: &[Stmt],
    loop_depth: usize,
    in_procedure: bool,
    calls: &mut BTreeSet<u16>,
    ints: &mut BTreeSet<char>,
    flags: &mut BTreeSet<Flag>,
) {
    for stmt in stmts {
        match stmt {
            Stmt::Break | Stmt::BreakIf(_) => {
                assert!(loop_depth > 0, "break outside a loop: {:?}", stmt)
            }
            Stmt::Return => assert!(in_procedure, "return outside a subroutine"),
            Stmt::Call(target) => {
                calls.insert(*target);
            }
            Stmt::Let(var, _) => {
                ints.insert(*var);
            }
            Stmt::Input(vars) => ints.extend(vars.iter().copied()),
            Stmt::Set(flag, _) => {
                flags.insert(*flag);
            }
            Stmt::Loop(block) => {
                check_block(&block.0, loop_depth + 1, in_procedure, calls, ints, flags)
            }
            Stmt::If {
                then_block,
                else_block,
                ..
            } => {
                check_block(&then_block.0, loop_depth, in_procedure, calls, ints, flags);
                if let Some(block) = else_block {
                    check_block(&block.0, loop_depth, in_procedure, calls, ints, flags);
                }
            }
            Stmt::Print(_) | Stmt::End => {}
        }
    }
}

#[test]
fn test_corpus_invariants() {
    for source in CORPUS {
        let program = structured(source);

        let mut calls = BTreeSet::new();
        let mut ints = BTreeSet::new();
        let mut flags = BTreeSet::new();
        check_block(&program.main.0, 0, false, &mut calls, &mut ints, &mut flags);
        for procedure in &program.procedures {
            check_block(
                &procedure.body.0,
                0,
                true,
                &mut calls,
                &mut ints,
                &mut flags,
            );
        }

        // every call names a defined subroutine
        let defined: BTreeSet<u16> = program.procedures.iter().map(|p| p.label).collect();
        for target in &calls {
            assert!(
                defined.contains(target),
                "call to undefined subroutine {} in {:?}",
                target,
                source
            );
        }

        // the program state is exactly what gets assigned
        assert_eq!(ints, program.state.ints, "int state mismatch in {:?}", source);
        assert_eq!(
            flags, program.state.flags,
            "flag state mismatch in {:?}",
            source
        );
    }
}

#[test]
fn test_subroutines_end_on_return_or_end() {
    for source in CORPUS {
        let program = structured(source);
        for procedure in &program.procedures {
            let last = procedure.body.0.last();
            assert!(
                matches!(last, Some(Stmt::Return) | Some(Stmt::End)),
                "subroutine {} does not terminate: {:?}",
                procedure.label,
                last
            );
        }
    }
}

#[test]
fn test_deep_conjunction_structures_to_one_guard() {
    let program = structured(indoc! {"
        10 IF X>=0 THEN IF X<=9 THEN IF Y>=0 THEN IF Y<=9 THEN GOTO 20
        PRINT \"OUT OF RANGE\"
        20 LET X=0
    "});
    // a single guard over the skipped suffix, no nesting
    match &program.main.0[0] {
        Stmt::If { cond, then_block, .. } => {
            match cond {
                rebasic::ast::Condition::Any(terms) => assert_eq!(terms.len(), 4),
                other => panic!("expected a four-way disjunction, got {:?}", other),
            }
            assert_eq!(then_block.0.len(), 1);
        }
        other => panic!("expected a guard, got {:?}", other),
    }
}
