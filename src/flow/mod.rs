use crate::ast::{Label, LabelledGroup, Program, Statement};
use crate::error::ResolveError;
use std::collections::{BTreeSet, HashMap};

/// The numbered program split into its entry sequence and the subroutines
/// extracted from `GOSUB` targets. Each context is structured independently.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramContexts {
    pub main: Vec<LabelledGroup>,
    pub subroutines: Vec<(Label, Vec<LabelledGroup>)>,
}

/// Builds the label index, resolves every jump reference, and carves each
/// `GOSUB` target span out of the main sequence.
pub fn analyze(program: Program) -> Result<ProgramContexts, ResolveError> {
    let groups = program.groups;
    let labels = label_index(&groups)?;
    check_references(&groups, &labels)?;

    let targets = gosub_targets(&groups);
    let mut spans: Vec<(Label, usize, usize)> = Vec::new();
    for &target in &targets {
        let start = labels[&target];
        let end = (start..groups.len())
            .find(|&idx| has_terminator(&groups[idx]))
            .ok_or(ResolveError::SubroutineWithoutReturn { label: target })?;
        spans.push((target, start, end));
    }

    spans.sort_by_key(|&(_, start, _)| start);
    for pair in spans.windows(2) {
        let (first, _, end) = pair[0];
        let (second, start, _) = pair[1];
        if start <= end {
            return Err(ResolveError::OverlappingSubroutines { first, second });
        }
    }

    let mut main = groups;
    let mut subroutines = Vec::new();
    for &(target, start, end) in spans.iter().rev() {
        let body: Vec<LabelledGroup> = main.drain(start..=end).collect();
        subroutines.push((target, body));
    }
    subroutines.reverse();

    for group in &main {
        for statement in &group.statements {
            check_no_return(statement, group.number)?;
        }
    }

    check_containment(&main)?;
    for (_, body) in &subroutines {
        check_containment(body)?;
    }

    Ok(ProgramContexts { main, subroutines })
}

fn label_index(groups: &[LabelledGroup]) -> Result<HashMap<Label, usize>, ResolveError> {
    let mut labels = HashMap::new();
    for (idx, group) in groups.iter().enumerate() {
        if let Some(number) = group.number {
            if labels.insert(number, idx).is_some() {
                return Err(ResolveError::DuplicateLabel { label: number });
            }
        }
    }
    Ok(labels)
}

/// Every line number named by a `GOSUB`, including ones nested in `IF` bodies.
fn gosub_targets(groups: &[LabelledGroup]) -> BTreeSet<Label> {
    fn walk(statement: &Statement, targets: &mut BTreeSet<Label>) {
        match statement {
            Statement::Gosub(target) => {
                targets.insert(*target);
            }
            Statement::If(_, body) => walk(body, targets),
            _ => {}
        }
    }
    let mut targets = BTreeSet::new();
    for group in groups {
        for statement in &group.statements {
            walk(statement, &mut targets);
        }
    }
    targets
}

fn check_references(
    groups: &[LabelledGroup],
    labels: &HashMap<Label, usize>,
) -> Result<(), ResolveError> {
    fn walk(
        statement: &Statement,
        site: Option<Label>,
        labels: &HashMap<Label, usize>,
    ) -> Result<(), ResolveError> {
        match statement {
            Statement::Goto(target) | Statement::Gosub(target) => {
                if !labels.contains_key(target) {
                    return Err(ResolveError::UnresolvedLabel {
                        target: *target,
                        site,
                    });
                }
                Ok(())
            }
            Statement::If(_, body) => walk(body, site, labels),
            _ => Ok(()),
        }
    }
    for group in groups {
        for statement in &group.statements {
            walk(statement, group.number, labels)?;
        }
    }
    Ok(())
}

/// A subroutine span ends at the first group whose own statement list holds a
/// `RETURN` or `END`; one nested inside an `IF` is a conditional early-out
/// and does not terminate the span.
fn has_terminator(group: &LabelledGroup) -> bool {
    group
        .statements
        .iter()
        .any(|s| matches!(s, Statement::Return | Statement::End))
}

fn check_no_return(statement: &Statement, line: Option<Label>) -> Result<(), ResolveError> {
    match statement {
        Statement::Return => Err(ResolveError::ReturnOutsideSubroutine { line }),
        Statement::If(_, body) => check_no_return(body, line),
        _ => Ok(()),
    }
}

/// After extraction every `GOTO` must stay inside its own context; a jump
/// whose target now lives in another context crosses a subroutine boundary.
fn check_containment(groups: &[LabelledGroup]) -> Result<(), ResolveError> {
    fn walk(
        statement: &Statement,
        site: Option<Label>,
        local: &BTreeSet<Label>,
    ) -> Result<(), ResolveError> {
        match statement {
            Statement::Goto(target) => {
                if !local.contains(target) {
                    return Err(ResolveError::CrossBoundaryJump {
                        target: *target,
                        site,
                    });
                }
                Ok(())
            }
            Statement::If(_, body) => walk(body, site, local),
            _ => Ok(()),
        }
    }
    let local: BTreeSet<Label> = groups.iter().filter_map(|g| g.number).collect();
    for group in groups {
        for statement in &group.statements {
            walk(statement, group.number, &local)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use indoc::indoc;

    fn contexts(source: &str) -> ProgramContexts {
        analyze(parse(source)).unwrap()
    }

    fn analyze_err(source: &str) -> ResolveError {
        analyze(parse(source)).unwrap_err()
    }

    fn parse(source: &str) -> crate::ast::Program {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse_program().unwrap()
    }

    #[test]
    fn test_no_gosub_leaves_main_alone() {
        let split = contexts("10 PRINT \"HI\"\nGOTO 10\n");
        assert_eq!(split.main.len(), 1);
        assert!(split.subroutines.is_empty());
    }

    #[test]
    fn test_subroutine_extraction() {
        let split = contexts(indoc! {"
            GOSUB 200
            PRINT R
            END
            200 LET S=(42*S+127)-((42*S+127)/126*126)
            LET R=S
            RETURN
        "});
        assert_eq!(split.main.len(), 1);
        assert_eq!(split.main[0].statements.len(), 3);
        assert_eq!(split.subroutines.len(), 1);
        let (label, body) = &split.subroutines[0];
        assert_eq!(*label, 200);
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].statements.len(), 3);
        assert_eq!(body[0].statements[2], Statement::Return);
    }

    #[test]
    fn test_conditional_return_does_not_end_span() {
        let split = contexts(indoc! {"
            GOSUB 100
            END
            100 IF X = 0 THEN RETURN
            110 LET X = X - 1
            RETURN
        "});
        let (_, body) = &split.subroutines[0];
        assert_eq!(body.len(), 2);
        assert_eq!(body[1].statements.last(), Some(&Statement::Return));
    }

    #[test]
    fn test_unresolved_goto() {
        let err = analyze_err("10 GOTO 50\n20 END\n");
        assert_eq!(
            err,
            ResolveError::UnresolvedLabel {
                target: 50,
                site: Some(10)
            }
        );
    }

    #[test]
    fn test_unresolved_gosub_in_if() {
        let err = analyze_err("10 IF A = 1 THEN GOSUB 300\n20 END\n");
        assert_eq!(
            err,
            ResolveError::UnresolvedLabel {
                target: 300,
                site: Some(10)
            }
        );
    }

    #[test]
    fn test_duplicate_label() {
        let err = analyze_err("10 PRINT A\n10 END\n");
        assert_eq!(err, ResolveError::DuplicateLabel { label: 10 });
    }

    #[test]
    fn test_return_outside_subroutine() {
        let err = analyze_err("10 PRINT A\n20 RETURN\n");
        assert_eq!(err, ResolveError::ReturnOutsideSubroutine { line: Some(20) });
    }

    #[test]
    fn test_subroutine_without_return() {
        let err = analyze_err("10 GOSUB 30\n20 PRINT A\n30 LET A=1\n");
        assert_eq!(err, ResolveError::SubroutineWithoutReturn { label: 30 });
    }

    #[test]
    fn test_goto_into_subroutine_rejected() {
        let err = analyze_err(indoc! {"
            GOSUB 200
            GOTO 210
            END
            200 LET A=1
            210 LET A=2
            RETURN
        "});
        assert_eq!(
            err,
            ResolveError::CrossBoundaryJump {
                target: 210,
                site: None
            }
        );
    }

    #[test]
    fn test_goto_out_of_subroutine_rejected() {
        let err = analyze_err(indoc! {"
            10 GOSUB 200
            20 END
            200 LET A=1
            GOTO 10
            RETURN
        "});
        assert_eq!(
            err,
            ResolveError::CrossBoundaryJump {
                target: 10,
                site: Some(200)
            }
        );
    }

    #[test]
    fn test_overlapping_subroutines() {
        let err = analyze_err(indoc! {"
            GOSUB 200
            GOSUB 210
            END
            200 LET A=1
            210 LET A=2
            RETURN
        "});
        assert_eq!(
            err,
            ResolveError::OverlappingSubroutines {
                first: 200,
                second: 210
            }
        );
    }

    #[test]
    fn test_end_terminates_subroutine_span() {
        let split = contexts(indoc! {"
            GOSUB 100
            200 PRINT A
            GOTO 200
            100 LET A=1
            END
        "});
        let (_, body) = &split.subroutines[0];
        assert_eq!(body[0].statements.last(), Some(&Statement::End));
    }
}
