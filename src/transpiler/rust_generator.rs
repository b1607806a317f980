//! Renders the structured program as a Rust source file: a `State` struct of
//! every assigned variable, one function per subroutine, and `fn main`.

use crate::ast::{
    Block, Condition, Expression, PrintItem, RelOp, Stmt, StructuredProgram,
};
use std::fmt::Write;

pub struct Generator {
    needs_io: bool,
    needs_process: bool,
}

impl Generator {
    pub fn new() -> Self {
        Generator {
            needs_io: false,
            needs_process: false,
        }
    }

    pub fn generate(mut self, program: &StructuredProgram) -> String {
        let has_state = !program.state.is_empty();

        let mut functions = String::new();
        for procedure in &program.procedures {
            let argument = if has_state { "state: &mut State" } else { "" };
            writeln!(functions, "fn f_{}({}) {{", procedure.label, argument).unwrap();
            self.emit_block(&procedure.body, 1, false, has_state, &mut functions);
            functions.push_str("}\n\n");
        }

        let mut body = String::new();
        self.emit_block(&program.main, 1, true, has_state, &mut body);

        let mut out = String::new();
        if self.needs_io {
            out.push_str("use std::io;\n");
        }
        if self.needs_process {
            out.push_str("use std::process;\n");
        }
        if self.needs_io || self.needs_process {
            out.push('\n');
        }

        if has_state {
            out.push_str("struct State {\n");
            for var in &program.state.ints {
                writeln!(out, "    {}: i32,", var.to_ascii_lowercase()).unwrap();
            }
            for flag in &program.state.flags {
                writeln!(out, "    {}: bool,", flag).unwrap();
            }
            out.push_str("}\n\n");
        }

        out.push_str(&functions);

        out.push_str("fn main() {\n");
        if has_state {
            out.push_str("    let mut state = State {\n");
            for var in &program.state.ints {
                writeln!(out, "        {}: 0,", var.to_ascii_lowercase()).unwrap();
            }
            for flag in &program.state.flags {
                writeln!(out, "        {}: false,", flag).unwrap();
            }
            out.push_str("    };\n");
        }
        out.push_str(&body);
        out.push_str("}\n");
        out
    }

    fn emit_block(
        &mut self,
        block: &Block,
        indent: usize,
        in_main: bool,
        has_state: bool,
        out: &mut String,
    ) {
        for stmt in &block.0 {
            self.emit_stmt(stmt, indent, in_main, has_state, out);
        }
    }

    fn emit_stmt(
        &mut self,
        stmt: &Stmt,
        indent: usize,
        in_main: bool,
        has_state: bool,
        out: &mut String,
    ) {
        match stmt {
            Stmt::Print(items) => {
                let placeholders = "{}".repeat(items.len());
                let arguments: Vec<String> = items.iter().map(print_item).collect();
                line(
                    out,
                    indent,
                    &format!("println!(\"{}\", {});", placeholders, arguments.join(", ")),
                );
            }
            Stmt::Input(vars) => {
                self.needs_io = true;
                for var in vars {
                    line(out, indent, "loop {");
                    line(out, indent + 1, "let mut input = String::new();");
                    line(
                        out,
                        indent + 1,
                        "io::stdin().read_line(&mut input).unwrap();",
                    );
                    line(out, indent + 1, "match input.trim().parse::<i32>() {");
                    line(
                        out,
                        indent + 2,
                        &format!("Ok(i) => {{ state.{} = i; break }}", var.to_ascii_lowercase()),
                    );
                    line(
                        out,
                        indent + 2,
                        "Err(_) => println!(\"invalid number\"),",
                    );
                    line(out, indent + 1, "}");
                    line(out, indent, "}");
                }
            }
            Stmt::Let(var, exp) => {
                line(
                    out,
                    indent,
                    &format!("state.{} = {};", var.to_ascii_lowercase(), expression(exp)),
                );
            }
            Stmt::Set(flag, cond) => {
                line(out, indent, &format!("state.{} = {};", flag, condition(cond)));
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                line(out, indent, &format!("if {} {{", condition(cond)));
                self.emit_block(then_block, indent + 1, in_main, has_state, out);
                match else_block {
                    Some(block) => {
                        line(out, indent, "} else {");
                        self.emit_block(block, indent + 1, in_main, has_state, out);
                        line(out, indent, "}");
                    }
                    None => line(out, indent, "}"),
                }
            }
            Stmt::Loop(block) => {
                line(out, indent, "loop {");
                self.emit_block(block, indent + 1, in_main, has_state, out);
                line(out, indent, "}");
            }
            Stmt::Break => line(out, indent, "break;"),
            Stmt::BreakIf(cond) => {
                line(out, indent, &format!("if {} {{", condition(cond)));
                line(out, indent + 1, "break;");
                line(out, indent, "}");
            }
            Stmt::Call(target) => {
                let argument = match (has_state, in_main) {
                    (false, _) => "",
                    (true, true) => "&mut state",
                    (true, false) => "state",
                };
                line(out, indent, &format!("f_{}({});", target, argument));
            }
            Stmt::Return => line(out, indent, "return;"),
            Stmt::End => {
                if in_main {
                    line(out, indent, "return;");
                } else {
                    self.needs_process = true;
                    line(out, indent, "process::exit(0);");
                }
            }
        }
    }
}

impl Default for Generator {
    fn default() -> Self {
        Generator::new()
    }
}

fn line(out: &mut String, indent: usize, code: &str) {
    for _ in 0..indent {
        out.push_str("    ");
    }
    out.push_str(code);
    out.push('\n');
}

fn expression(exp: &Expression) -> String {
    match exp {
        Expression::Number(n) => n.to_string(),
        Expression::Var(var) => format!("state.{}", var.to_ascii_lowercase()),
        Expression::Binary(left, op, right) => {
            format!("{} {} {}", expression(left), op, expression(right))
        }
        Expression::Paren(inner) => format!("({})", expression(inner)),
    }
}

fn condition(cond: &Condition) -> String {
    match cond {
        Condition::Compare(left, op, right) => {
            let relop = match op {
                RelOp::Equal => "==",
                RelOp::NotEqual => "!=",
                RelOp::Less => "<",
                RelOp::Greater => ">",
                RelOp::LessEqual => "<=",
                RelOp::GreaterEqual => ">=",
            };
            format!("{} {} {}", expression(left), relop, expression(right))
        }
        Condition::All(conds) => {
            let parts: Vec<String> = conds.iter().map(condition_term).collect();
            parts.join(" && ")
        }
        Condition::Any(conds) => {
            let parts: Vec<String> = conds.iter().map(condition_term).collect();
            parts.join(" || ")
        }
        Condition::Flag(flag) => format!("state.{}", flag),
        Condition::NotFlag(flag) => format!("!state.{}", flag),
        Condition::Literal(value) => value.to_string(),
    }
}

fn condition_term(cond: &Condition) -> String {
    match cond {
        Condition::All(_) | Condition::Any(_) => format!("({})", condition(cond)),
        _ => condition(cond),
    }
}

fn print_item(item: &PrintItem) -> String {
    match item {
        PrintItem::Text(text) => format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\"")),
        PrintItem::Expr(exp) => expression(exp),
    }
}
