use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result};

/// A source line number used as a jump label.
pub type Label = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Plus,     // +
    Minus,    // -
    Multiply, // *
    Divide,   // /
}

impl Display for ArithOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let s = match self {
            ArithOp::Plus => "+",
            ArithOp::Minus => "-",
            ArithOp::Multiply => "*",
            ArithOp::Divide => "/",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Less,         // <
    Greater,      // >
    Equal,        // =
    LessEqual,    // <=
    GreaterEqual, // >=
    NotEqual,     // <>
}

impl RelOp {
    /// The operator that holds exactly when this one does not.
    pub fn complement(self) -> RelOp {
        match self {
            RelOp::Less => RelOp::GreaterEqual,
            RelOp::GreaterEqual => RelOp::Less,
            RelOp::Greater => RelOp::LessEqual,
            RelOp::LessEqual => RelOp::Greater,
            RelOp::Equal => RelOp::NotEqual,
            RelOp::NotEqual => RelOp::Equal,
        }
    }
}

impl Display for RelOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let s = match self {
            RelOp::Less => "<",
            RelOp::Greater => ">",
            RelOp::Equal => "=",
            RelOp::LessEqual => "<=",
            RelOp::GreaterEqual => ">=",
            RelOp::NotEqual => "<>",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(i32),
    Var(char),
    Binary(Box<Expression>, ArithOp, Box<Expression>),
    /// Parenthesised subexpression, kept so listings print the source form.
    Paren(Box<Expression>),
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Expression::Number(n) => write!(f, "{}", n),
            Expression::Var(v) => write!(f, "{}", v),
            Expression::Binary(left, op, right) => write!(f, "{} {} {}", left, op, right),
            Expression::Paren(inner) => write!(f, "({})", inner),
        }
    }
}

/// A synthetic boolean minted by the structuring pass; `Flag(1)` is `t1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Flag(pub u32);

impl Display for Flag {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare(Expression, RelOp, Expression),
    /// Conjunction, produced by `IF a THEN IF b THEN ...`.
    All(Vec<Condition>),
    /// Disjunction, produced only by negating a conjunction.
    Any(Vec<Condition>),
    Flag(Flag),
    NotFlag(Flag),
    Literal(bool),
}

impl Condition {
    /// Structural negation: relational complement plus De Morgan.
    /// There is no logical-not node, so negation always stays this shallow.
    pub fn negated(&self) -> Condition {
        match self {
            Condition::Compare(left, op, right) => {
                Condition::Compare(left.clone(), op.complement(), right.clone())
            }
            Condition::All(conds) => Condition::Any(conds.iter().map(|c| c.negated()).collect()),
            Condition::Any(conds) => Condition::All(conds.iter().map(|c| c.negated()).collect()),
            Condition::Flag(flag) => Condition::NotFlag(*flag),
            Condition::NotFlag(flag) => Condition::Flag(*flag),
            Condition::Literal(value) => Condition::Literal(!value),
        }
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Condition::Compare(left, op, right) => write!(f, "{} {} {}", left, op, right),
            Condition::All(conds) => {
                let parts: Vec<String> = conds.iter().map(|c| c.to_string()).collect();
                write!(f, "{}", parts.join(" AND "))
            }
            Condition::Any(conds) => {
                let parts: Vec<String> = conds.iter().map(|c| c.to_string()).collect();
                write!(f, "{}", parts.join(" OR "))
            }
            Condition::Flag(flag) => write!(f, "{}", flag),
            Condition::NotFlag(flag) => write!(f, "NOT {}", flag),
            Condition::Literal(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrintItem {
    Text(String),
    Expr(Expression),
}

impl Display for PrintItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            PrintItem::Text(s) => write!(f, "\"{}\"", s),
            PrintItem::Expr(e) => write!(f, "{}", e),
        }
    }
}

/// A statement of the numbered program, before jumps are eliminated.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Print(Vec<PrintItem>),
    Input(Vec<char>),
    Let(char, Expression),
    If(Condition, Box<Statement>),
    Goto(Label),
    Gosub(Label),
    Return,
    End,
    Rem(String),
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Statement::Print(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "PRINT {}", parts.join(", "))
            }
            Statement::Input(vars) => {
                let parts: Vec<String> = vars.iter().map(|v| v.to_string()).collect();
                write!(f, "INPUT {}", parts.join(", "))
            }
            Statement::Let(var, exp) => write!(f, "LET {} = {}", var, exp),
            Statement::If(cond, body) => {
                // A conjunction prints back as the chained form it came from.
                match cond {
                    Condition::All(conds) => {
                        for c in conds {
                            write!(f, "IF {} THEN ", c)?;
                        }
                        write!(f, "{}", body)
                    }
                    _ => write!(f, "IF {} THEN {}", cond, body),
                }
            }
            Statement::Goto(target) => write!(f, "GOTO {}", target),
            Statement::Gosub(target) => write!(f, "GOSUB {}", target),
            Statement::Return => write!(f, "RETURN"),
            Statement::End => write!(f, "END"),
            Statement::Rem(text) => {
                if text.is_empty() {
                    write!(f, "REM")
                } else {
                    write!(f, "REM {}", text)
                }
            }
        }
    }
}

/// An optional line number and the statements sharing it: the numbered line
/// itself plus any unnumbered lines that follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledGroup {
    pub number: Option<Label>,
    pub statements: Vec<Statement>,
}

impl Display for LabelledGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        for (i, statement) in self.statements.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            match (i, self.number) {
                (0, Some(number)) => write!(f, "{} {}", number, statement)?,
                _ => write!(f, "{}", statement)?,
            }
        }
        Ok(())
    }
}

/// The numbered program as parsed, in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub groups: Vec<LabelledGroup>,
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        for group in &self.groups {
            writeln!(f, "{}", group)?;
        }
        Ok(())
    }
}

/// A statement of the structured program. There is no jump variant; the
/// structuring pass fails rather than produce one.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Print(Vec<PrintItem>),
    Input(Vec<char>),
    Let(char, Expression),
    /// Assignment to a synthetic boolean.
    Set(Flag, Condition),
    If {
        cond: Condition,
        then_block: Block,
        else_block: Option<Block>,
    },
    Loop(Block),
    Break,
    BreakIf(Condition),
    Call(Label),
    Return,
    End,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block(pub Vec<Stmt>);

/// A subroutine extracted from a `GOSUB` target, reachable only via `Call`.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub label: Label,
    pub body: Block,
}

/// Every variable the emitted program assigns: user integers and synthetic
/// booleans. Both start zeroed/false.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateVars {
    pub ints: BTreeSet<char>,
    pub flags: BTreeSet<Flag>,
}

impl StateVars {
    pub fn is_empty(&self) -> bool {
        self.ints.is_empty() && self.flags.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructuredProgram {
    pub main: Block,
    pub procedures: Vec<Procedure>,
    pub state: StateVars,
}
