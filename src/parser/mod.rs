use crate::ast::{
    ArithOp, Condition, Expression, Label, LabelledGroup, PrintItem, Program, RelOp, Statement,
};
use crate::error::ParseError;
use crate::lexer::token::{Token, TokenType};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Parser {
        Parser { tokens, pos: 0 }
    }

    fn cur(&self) -> &Token {
        // The lexer terminates every stream with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn cur_is(&self, token_type: TokenType) -> bool {
        self.cur().token_type == token_type
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.cur().line, message)
    }

    fn expect(&mut self, token_type: TokenType, what: &str) -> Result<Token, ParseError> {
        if self.cur_is(token_type) {
            let token = self.cur().clone();
            self.advance();
            Ok(token)
        } else {
            Err(self.error(format!("expected {}, found '{}'", what, self.cur().literal)))
        }
    }

    /// Parses the whole token stream into a sequence of labelled groups.
    /// An unnumbered line attaches to the group of the numbered line above it.
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut groups: Vec<LabelledGroup> = Vec::new();
        loop {
            while self.cur_is(TokenType::Newline) {
                self.advance();
            }
            if self.cur_is(TokenType::Eof) {
                return Ok(Program { groups });
            }

            let number = if self.cur_is(TokenType::Number) {
                Some(self.parse_label()?)
            } else {
                None
            };
            let statement = self.parse_statement()?;
            match self.cur().token_type {
                TokenType::Newline => self.advance(),
                TokenType::Eof => {}
                _ => {
                    return Err(self.error(format!(
                        "expected end of line, found '{}'",
                        self.cur().literal
                    )))
                }
            }

            match number {
                Some(_) => groups.push(LabelledGroup {
                    number,
                    statements: vec![statement],
                }),
                None => match groups.last_mut() {
                    Some(group) => group.statements.push(statement),
                    None => groups.push(LabelledGroup {
                        number: None,
                        statements: vec![statement],
                    }),
                },
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.cur().token_type {
            TokenType::Print => {
                self.advance();
                self.parse_print()
            }
            TokenType::If => {
                self.advance();
                self.parse_if()
            }
            TokenType::Goto => {
                self.advance();
                Ok(Statement::Goto(self.parse_label()?))
            }
            TokenType::Gosub => {
                self.advance();
                Ok(Statement::Gosub(self.parse_label()?))
            }
            TokenType::Return => {
                self.advance();
                Ok(Statement::Return)
            }
            TokenType::Input => {
                self.advance();
                self.parse_input()
            }
            TokenType::Let => {
                self.advance();
                self.parse_let()
            }
            TokenType::End => {
                self.advance();
                Ok(Statement::End)
            }
            TokenType::Rem => {
                let text = self.cur().literal.clone();
                self.advance();
                Ok(Statement::Rem(text))
            }
            _ => Err(self.error(format!("unexpected token '{}'", self.cur().literal))),
        }
    }

    fn parse_label(&mut self) -> Result<Label, ParseError> {
        let token = self.expect(TokenType::Number, "a line number")?;
        token
            .literal
            .parse::<Label>()
            .map_err(|_| ParseError::new(token.line, format!("invalid line number '{}'", token.literal)))
    }

    fn parse_print(&mut self) -> Result<Statement, ParseError> {
        let mut items = Vec::new();
        loop {
            if self.cur_is(TokenType::Str) {
                items.push(PrintItem::Text(self.cur().literal.clone()));
                self.advance();
            } else {
                items.push(PrintItem::Expr(self.parse_expression()?));
            }
            if self.cur_is(TokenType::Comma) {
                self.advance();
            } else {
                return Ok(Statement::Print(items));
            }
        }
    }

    fn parse_input(&mut self) -> Result<Statement, ParseError> {
        let mut vars = vec![self.parse_var()?];
        while self.cur_is(TokenType::Comma) {
            self.advance();
            vars.push(self.parse_var()?);
        }
        Ok(Statement::Input(vars))
    }

    fn parse_let(&mut self) -> Result<Statement, ParseError> {
        let var = self.parse_var()?;
        let eq = self.expect(TokenType::RelOp, "'='")?;
        if eq.literal != "=" {
            return Err(ParseError::new(
                eq.line,
                format!("expected '=', found '{}'", eq.literal),
            ));
        }
        Ok(Statement::Let(var, self.parse_expression()?))
    }

    /// `IF a THEN IF b THEN stmt` folds into one statement guarded by the
    /// conjunction `a AND b`; the chain is never flattened into nested ifs.
    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        let mut comparisons = vec![self.parse_comparison()?];
        self.expect(TokenType::Then, "THEN")?;
        while self.cur_is(TokenType::If) {
            self.advance();
            comparisons.push(self.parse_comparison()?);
            self.expect(TokenType::Then, "THEN")?;
        }
        let body = self.parse_statement()?;
        let cond = if comparisons.len() == 1 {
            comparisons.remove(0)
        } else {
            Condition::All(comparisons)
        };
        Ok(Statement::If(cond, Box::new(body)))
    }

    fn parse_comparison(&mut self) -> Result<Condition, ParseError> {
        let left = self.parse_expression()?;
        let op_token = self.expect(TokenType::RelOp, "a relational operator")?;
        let op = relop_from(&op_token.literal).ok_or_else(|| {
            ParseError::new(op_token.line, format!("bad operator '{}'", op_token.literal))
        })?;
        let right = self.parse_expression()?;
        Ok(Condition::Compare(left, op, right))
    }

    fn parse_var(&mut self) -> Result<char, ParseError> {
        let token = self.expect(TokenType::Var, "a variable")?;
        Ok(token.literal.chars().next().unwrap())
    }

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        let mut node = self.parse_term()?;
        while self.cur_is(TokenType::ArithOp) && matches!(self.cur().literal.as_str(), "+" | "-") {
            let op = if self.cur().literal == "+" {
                ArithOp::Plus
            } else {
                ArithOp::Minus
            };
            self.advance();
            node = Expression::Binary(Box::new(node), op, Box::new(self.parse_term()?));
        }
        Ok(node)
    }

    fn parse_term(&mut self) -> Result<Expression, ParseError> {
        let mut node = self.parse_factor()?;
        while self.cur_is(TokenType::ArithOp) && matches!(self.cur().literal.as_str(), "*" | "/") {
            let op = if self.cur().literal == "*" {
                ArithOp::Multiply
            } else {
                ArithOp::Divide
            };
            self.advance();
            node = Expression::Binary(Box::new(node), op, Box::new(self.parse_factor()?));
        }
        Ok(node)
    }

    fn parse_factor(&mut self) -> Result<Expression, ParseError> {
        match self.cur().token_type {
            TokenType::Var => Ok(Expression::Var(self.parse_var()?)),
            TokenType::Number => {
                let token = self.cur().clone();
                self.advance();
                token.literal.parse::<i32>().map(Expression::Number).map_err(|_| {
                    ParseError::new(token.line, format!("number '{}' out of range", token.literal))
                })
            }
            TokenType::Lparen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenType::Rparen, "')'")?;
                Ok(Expression::Paren(Box::new(inner)))
            }
            _ => Err(self.error(format!(
                "expected a variable, number or '(', found '{}'",
                self.cur().literal
            ))),
        }
    }
}

fn relop_from(literal: &str) -> Option<RelOp> {
    match literal {
        "<" => Some(RelOp::Less),
        ">" => Some(RelOp::Greater),
        "=" => Some(RelOp::Equal),
        "<=" => Some(RelOp::LessEqual),
        ">=" => Some(RelOp::GreaterEqual),
        "<>" => Some(RelOp::NotEqual),
        _ => None,
    }
}
