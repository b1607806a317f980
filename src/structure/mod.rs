//! Rewrites the jump-based numbered program into structured control flow:
//! sequences, conditionals, loops with breaks, and subroutine calls.

use crate::ast::{
    Block, Condition, Expression, Flag, Label, LabelledGroup, PrintItem, Procedure, StateVars,
    Statement, Stmt, StructuredProgram,
};
use crate::error::StructureError;
use crate::flow::ProgramContexts;
use std::collections::{BTreeSet, HashMap};

/// Structures every context of the program and collects the assigned
/// variables into the program state.
pub fn structure_program(contexts: ProgramContexts) -> Result<StructuredProgram, StructureError> {
    let mut flags = FlagAllocator::new();
    let main = structure_context(contexts.main, &mut flags)?;
    let mut procedures = Vec::new();
    for (label, groups) in contexts.subroutines {
        let mut body = structure_context(groups, &mut flags)?;
        reset_flags_at_entry(&mut body);
        procedures.push(Procedure { label, body });
    }

    let mut program = StructuredProgram {
        main,
        procedures,
        state: StateVars::default(),
    };
    program.state = collect_state(&program);
    Ok(program)
}

/// Mints one synthetic boolean per distinct escape target, monotonically.
struct FlagAllocator {
    next: u32,
    by_target: HashMap<Label, Flag>,
}

impl FlagAllocator {
    fn new() -> Self {
        FlagAllocator {
            next: 1,
            by_target: HashMap::new(),
        }
    }

    fn mint(&mut self, target: Label) -> Flag {
        if let Some(&flag) = self.by_target.get(&target) {
            return flag;
        }
        let flag = Flag(self.next);
        self.next += 1;
        self.by_target.insert(target, flag);
        flag
    }
}

/// The working tree the rewrites operate on. Jumps still exist here; the
/// finished tree is converted to the structured AST by `finalize_nodes`,
/// which refuses to let one through.
#[derive(Debug, Clone)]
struct Node {
    label: Option<Label>,
    kind: Kind,
}

#[derive(Debug, Clone)]
enum Kind {
    Leaf(Leaf),
    If(Condition, Vec<Node>),
    /// Do-while: `Some(cond)` keeps iterating while `cond` holds.
    Loop(Option<Condition>, Vec<Node>),
    Jump(Label),
    Break,
}

#[derive(Debug, Clone)]
enum Leaf {
    Print(Vec<PrintItem>),
    Input(Vec<char>),
    Let(char, Expression),
    Set(Flag, Condition),
    Call(Label),
    Return,
    End,
    /// A remark, or a placeholder keeping a jump-target line resolvable.
    Rem,
}

fn structure_context(
    groups: Vec<LabelledGroup>,
    flags: &mut FlagAllocator,
) -> Result<Block, StructureError> {
    let mut nodes = seed(groups);
    loop {
        let mut sites = Vec::new();
        collect_sites(&nodes, &mut Vec::new(), &mut sites);
        if sites.is_empty() {
            break;
        }
        let (site, label_path) = pick_site(&nodes, sites)?;
        apply_rewrite(&mut nodes, site, label_path, flags)?;
    }
    Ok(Block(finalize_nodes(nodes)?))
}

/// Flattens the labelled groups into working nodes. The group's line number
/// lands on its first statement. A bare `GOTO` is normalised into a jump
/// conditional on `true` so every jump site has the same shape.
fn seed(groups: Vec<LabelledGroup>) -> Vec<Node> {
    let mut nodes = Vec::new();
    for group in groups {
        let mut number = group.number;
        for statement in group.statements {
            nodes.push(seed_statement(number.take(), statement));
        }
    }
    nodes
}

fn seed_statement(label: Option<Label>, statement: Statement) -> Node {
    let kind = match statement {
        Statement::Print(items) => Kind::Leaf(Leaf::Print(items)),
        Statement::Input(vars) => Kind::Leaf(Leaf::Input(vars)),
        Statement::Let(var, exp) => Kind::Leaf(Leaf::Let(var, exp)),
        Statement::If(cond, body) => match *body {
            // `IF c THEN GOTO t` is itself the jump site
            Statement::Goto(target) => Kind::If(
                cond,
                vec![Node {
                    label: None,
                    kind: Kind::Jump(target),
                }],
            ),
            other => Kind::If(cond, vec![seed_statement(None, other)]),
        },
        Statement::Goto(target) => Kind::If(
            Condition::Literal(true),
            vec![Node {
                label: None,
                kind: Kind::Jump(target),
            }],
        ),
        Statement::Gosub(target) => Kind::Leaf(Leaf::Call(target)),
        Statement::Return => Kind::Leaf(Leaf::Return),
        Statement::End => Kind::Leaf(Leaf::End),
        Statement::Rem(_) => Kind::Leaf(Leaf::Rem),
    };
    Node { label, kind }
}

/// A jump site: the path to the `If` node whose body is exactly the jump.
#[derive(Debug, Clone)]
struct Site {
    path: Vec<usize>,
    target: Label,
}

fn collect_sites(nodes: &[Node], prefix: &mut Vec<usize>, out: &mut Vec<Site>) {
    for (i, node) in nodes.iter().enumerate() {
        match &node.kind {
            Kind::If(_, body) => {
                if let [inner] = body.as_slice() {
                    if let Kind::Jump(target) = inner.kind {
                        prefix.push(i);
                        out.push(Site {
                            path: prefix.clone(),
                            target,
                        });
                        prefix.pop();
                        continue;
                    }
                }
                prefix.push(i);
                collect_sites(body, prefix, out);
                prefix.pop();
            }
            Kind::Loop(_, body) => {
                prefix.push(i);
                collect_sites(body, prefix, out);
                prefix.pop();
            }
            _ => {}
        }
    }
}

fn find_label(nodes: &[Node], target: Label, prefix: &mut Vec<usize>) -> Option<Vec<usize>> {
    for (i, node) in nodes.iter().enumerate() {
        if node.label == Some(target) {
            let mut path = prefix.clone();
            path.push(i);
            return Some(path);
        }
        match &node.kind {
            Kind::If(_, body) | Kind::Loop(_, body) => {
                prefix.push(i);
                let found = find_label(body, target, prefix);
                prefix.pop();
                if found.is_some() {
                    return found;
                }
            }
            _ => {}
        }
    }
    None
}

fn block_at<'a>(nodes: &'a mut Vec<Node>, path: &[usize]) -> &'a mut Vec<Node> {
    let mut cur = nodes;
    for &idx in path {
        cur = match &mut cur[idx].kind {
            Kind::If(_, body) | Kind::Loop(_, body) => body,
            _ => unreachable!("jump paths descend through block nodes"),
        };
    }
    cur
}

fn block_ref<'a>(nodes: &'a [Node], path: &[usize]) -> &'a [Node] {
    let mut cur = nodes;
    for &idx in path {
        cur = match &cur[idx].kind {
            Kind::If(_, body) | Kind::Loop(_, body) => body,
            _ => unreachable!("jump paths descend through block nodes"),
        };
    }
    cur
}

fn site_node<'a>(nodes: &'a [Node], path: &[usize]) -> &'a Node {
    let block = block_ref(nodes, &path[..path.len() - 1]);
    &block[path[path.len() - 1]]
}

fn site_condition(nodes: &[Node], path: &[usize]) -> Condition {
    match &site_node(nodes, path).kind {
        Kind::If(cond, _) => cond.clone(),
        _ => unreachable!("a jump site is a conditional"),
    }
}

/// Chooses the next jump to rewrite: backward jumps first, then forward
/// unconditional, then forward conditional, each in source order. Outer
/// structure is decided before escapes get lifted through it.
fn pick_site(nodes: &[Node], sites: Vec<Site>) -> Result<(Site, Vec<usize>), StructureError> {
    let mut best: Option<(u8, Site, Vec<usize>)> = None;
    for site in sites {
        let label_path = match find_label(nodes, site.target, &mut Vec::new()) {
            Some(path) => path,
            None => {
                return Err(StructureError {
                    target: site.target,
                    site: site_node(nodes, &site.path).label,
                    message: "jump target vanished during structuring".to_string(),
                })
            }
        };
        let class = if label_path <= site.path {
            0 // backward
        } else if site_condition(nodes, &site.path) == Condition::Literal(true) {
            1 // forward unconditional
        } else {
            2 // forward conditional
        };
        // sites arrive in source order, so strict comparison keeps the first
        if best.as_ref().map_or(true, |(c, _, _)| class < *c) {
            let done = class == 0;
            best = Some((class, site, label_path));
            if done {
                break;
            }
        }
    }
    let (_, site, label_path) = best.expect("pick_site called with at least one site");
    Ok((site, label_path))
}

fn apply_rewrite(
    nodes: &mut Vec<Node>,
    site: Site,
    label_path: Vec<usize>,
    flags: &mut FlagAllocator,
) -> Result<(), StructureError> {
    let site_path = &site.path;
    let same_block = site_path.len() == label_path.len()
        && site_path[..site_path.len() - 1] == label_path[..label_path.len() - 1];
    if same_block {
        if label_path[label_path.len() - 1] <= site_path[site_path.len() - 1] {
            rewrite_backward(nodes, site_path, &label_path);
        } else {
            rewrite_forward(nodes, site_path, &label_path);
        }
        return Ok(());
    }

    // the label's block must be an ancestor of the jump's block; the jump is
    // then moved one level outward until the pair shares a block
    let prefix = label_path.len() - 1;
    let outward = site_path.len() > label_path.len() && site_path[..prefix] == label_path[..prefix];
    if outward {
        rewrite_outward(nodes, site_path, site.target, flags);
        return Ok(());
    }

    Err(StructureError {
        target: site.target,
        site: site_node(nodes, site_path).label,
        message: "unstructurable control flow".to_string(),
    })
}

/// A backward jump closes a loop: the span from the target line through the
/// jump becomes a `Loop`. A real condition makes it a do-while; the
/// normalised `true` condition loops unconditionally.
fn rewrite_backward(nodes: &mut Vec<Node>, site_path: &[usize], label_path: &[usize]) {
    let cond = site_condition(nodes, site_path);
    let block = block_at(nodes, &site_path[..site_path.len() - 1]);
    let si = site_path[site_path.len() - 1];
    let li = label_path[label_path.len() - 1];

    let mut span: Vec<Node> = block.drain(li..=si).collect();
    let jump = span.pop().expect("span ends at the jump site");
    if jump.label.is_some() {
        // the jump's own line stays addressable for other jumps
        span.push(Node {
            label: jump.label,
            kind: Kind::Leaf(Leaf::Rem),
        });
    }

    let continue_cond = if cond == Condition::Literal(true) {
        None
    } else {
        Some(cond)
    };
    block.insert(
        li,
        Node {
            label: None,
            kind: Kind::Loop(continue_cond, span),
        },
    );
}

/// A forward jump within one block skips its suffix: the statements between
/// jump and target run only when the jump does not fire.
fn rewrite_forward(nodes: &mut Vec<Node>, site_path: &[usize], label_path: &[usize]) {
    let cond = site_condition(nodes, site_path);
    let block = block_at(nodes, &site_path[..site_path.len() - 1]);
    let si = site_path[site_path.len() - 1];
    let li = label_path[label_path.len() - 1];

    let between: Vec<Node> = block.drain(si + 1..li).collect();
    let label = block[si].label;
    block[si] = Node {
        label,
        kind: Kind::If(cond.negated(), between),
    };
}

/// Moves a jump one level outward through its enclosing block. The escape
/// intent travels in a synthetic boolean: the site records the condition,
/// the rest of the block is guarded by its negation, a loop boundary gets a
/// conditional break, and the jump reappears just after the enclosing node.
fn rewrite_outward(
    nodes: &mut Vec<Node>,
    site_path: &[usize],
    target: Label,
    flags: &mut FlagAllocator,
) {
    let flag = flags.mint(target);
    let cond = site_condition(nodes, site_path);
    let depth = site_path.len();
    let container_is_loop = matches!(
        site_node(nodes, &site_path[..depth - 1]).kind,
        Kind::Loop(_, _)
    );

    let block = block_at(nodes, &site_path[..depth - 1]);
    let si = site_path[depth - 1];
    let label = block[si].label;

    let mut rest_from = si;
    if cond == Condition::Flag(flag) && label.is_none() {
        // a site minted by an earlier outward step; re-assigning is pointless
        block.remove(si);
    } else {
        block[si] = Node {
            label,
            kind: Kind::Leaf(Leaf::Set(flag, cond)),
        };
        rest_from = si + 1;
    }

    let rest: Vec<Node> = block.drain(rest_from..).collect();
    if !rest.is_empty() {
        block.push(Node {
            label: None,
            kind: Kind::If(Condition::NotFlag(flag), rest),
        });
    }
    if container_is_loop {
        block.push(Node {
            label: None,
            kind: Kind::If(
                Condition::Flag(flag),
                vec![Node {
                    label: None,
                    kind: Kind::Break,
                }],
            ),
        });
    }

    let parent = block_at(nodes, &site_path[..depth - 2]);
    parent.insert(
        site_path[depth - 2] + 1,
        Node {
            label: None,
            kind: Kind::If(
                Condition::Flag(flag),
                vec![Node {
                    label: None,
                    kind: Kind::Jump(target),
                }],
            ),
        },
    );
}

/// Converts the finished working tree into structured statements. Remarks
/// and statically dead guards are dropped, `if c break` collapses into
/// `BreakIf`, do-while loops gain their trailing `BreakIf`, and every loop
/// clears the flags it assigns before each pass.
fn finalize_nodes(nodes: Vec<Node>) -> Result<Vec<Stmt>, StructureError> {
    let mut stmts = Vec::new();
    for node in nodes {
        match node.kind {
            Kind::Leaf(leaf) => match leaf {
                Leaf::Print(items) => stmts.push(Stmt::Print(items)),
                Leaf::Input(vars) => stmts.push(Stmt::Input(vars)),
                Leaf::Let(var, exp) => stmts.push(Stmt::Let(var, exp)),
                Leaf::Set(flag, cond) => stmts.push(Stmt::Set(flag, cond)),
                Leaf::Call(target) => stmts.push(Stmt::Call(target)),
                Leaf::Return => stmts.push(Stmt::Return),
                Leaf::End => stmts.push(Stmt::End),
                Leaf::Rem => {}
            },
            Kind::If(Condition::Literal(false), _) => {}
            Kind::If(Condition::Literal(true), body) => stmts.extend(finalize_nodes(body)?),
            Kind::If(cond, body) => {
                let then_block = finalize_nodes(body)?;
                if then_block.is_empty() {
                    continue;
                }
                if let [Stmt::Break] = then_block.as_slice() {
                    stmts.push(Stmt::BreakIf(cond));
                } else {
                    stmts.push(Stmt::If {
                        cond,
                        then_block: Block(then_block),
                        else_block: None,
                    });
                }
            }
            Kind::Loop(cond, body) => {
                let mut inner = finalize_nodes(body)?;
                match cond {
                    None | Some(Condition::Literal(true)) => {}
                    Some(c) => inner.push(Stmt::BreakIf(c.negated())),
                }
                let mut full: Vec<Stmt> = flags_assigned(&inner)
                    .into_iter()
                    .map(|flag| Stmt::Set(flag, Condition::Literal(false)))
                    .collect();
                full.extend(inner);
                stmts.push(Stmt::Loop(Block(full)));
            }
            Kind::Break => stmts.push(Stmt::Break),
            Kind::Jump(target) => {
                return Err(StructureError {
                    target,
                    site: node.label,
                    message: "jump survived structuring".to_string(),
                })
            }
        }
    }
    Ok(stmts)
}

fn flags_assigned(stmts: &[Stmt]) -> BTreeSet<Flag> {
    let mut flags = BTreeSet::new();
    walk_flags(stmts, &mut flags);
    flags
}

fn walk_flags(stmts: &[Stmt], flags: &mut BTreeSet<Flag>) {
    for stmt in stmts {
        match stmt {
            Stmt::Set(flag, _) => {
                flags.insert(*flag);
            }
            Stmt::If {
                then_block,
                else_block,
                ..
            } => {
                walk_flags(&then_block.0, flags);
                if let Some(block) = else_block {
                    walk_flags(&block.0, flags);
                }
            }
            Stmt::Loop(block) => walk_flags(&block.0, flags),
            _ => {}
        }
    }
}

/// A subroutine can be called more than once; flags it assigns start false
/// on every entry.
fn reset_flags_at_entry(body: &mut Block) {
    let flags = flags_assigned(&body.0);
    let mut stmts: Vec<Stmt> = flags
        .into_iter()
        .map(|flag| Stmt::Set(flag, Condition::Literal(false)))
        .collect();
    stmts.append(&mut body.0);
    body.0 = stmts;
}

/// A final walk gathers every assigned variable into the program state:
/// `LET`/`INPUT` targets and the synthetic booleans.
fn collect_state(program: &StructuredProgram) -> StateVars {
    fn walk(stmts: &[Stmt], state: &mut StateVars) {
        for stmt in stmts {
            match stmt {
                Stmt::Let(var, _) => {
                    state.ints.insert(*var);
                }
                Stmt::Input(vars) => {
                    state.ints.extend(vars.iter().copied());
                }
                Stmt::Set(flag, _) => {
                    state.flags.insert(*flag);
                }
                Stmt::If {
                    then_block,
                    else_block,
                    ..
                } => {
                    walk(&then_block.0, state);
                    if let Some(block) = else_block {
                        walk(&block.0, state);
                    }
                }
                Stmt::Loop(block) => walk(&block.0, state),
                _ => {}
            }
        }
    }
    let mut state = StateVars::default();
    walk(&program.main.0, &mut state);
    for procedure in &program.procedures {
        walk(&procedure.body.0, &mut state);
    }
    state
}
