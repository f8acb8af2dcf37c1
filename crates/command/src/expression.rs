//! Arithmetic right-hand sides for assignments (`I = I + 1`, `x = 2 * Sat.SMA`).
//!
//! Operands are element-wrapper descriptions; they are bound through the
//! owning command like any other wrapper, then evaluated as reals.

use std::collections::HashMap;
use std::fmt;

use mcs_objects::ObjectStore;

use crate::{CommandError, ElementWrapper, WrapperError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinOp {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            '+' => Self::Add,
            '-' => Self::Sub,
            '*' => Self::Mul,
            '/' => Self::Div,
            '^' => Self::Pow,
            _ => return None,
        })
    }

    fn symbol(&self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
            Self::Pow => '^',
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
            Self::Pow => 3,
        }
    }

    fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Pow => a.powf(b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Operand(String),
    Op(BinOp),
    Open,
    Close,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Operand(String),
    Negate(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Group(Box<Node>),
}

/// A parsed arithmetic expression over wrapper operands.
#[derive(Debug, Clone)]
pub struct Expression {
    root: Node,
    wrappers: HashMap<String, ElementWrapper>,
}

impl Expression {
    /// Parse `text`; `Ok(None)` when it is a single operand with no arithmetic.
    pub fn parse(command: &str, text: &str) -> Result<Option<Self>, CommandError> {
        let tokens = tokenize(command, text)?;
        if matches!(tokens.as_slice(), [Token::Operand(_)]) {
            return Ok(None);
        }
        let mut parser = Parser {
            command,
            tokens: &tokens,
            pos: 0,
        };
        let root = parser.expression(0)?;
        if parser.pos != tokens.len() {
            return Err(CommandError::parse(command, format!("unexpected token in `{text}`")));
        }
        Ok(Some(Self {
            root,
            wrappers: HashMap::new(),
        }))
    }

    pub fn operand_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_operands(&self.root, &mut names);
        names
    }

    /// Bind `wrapper` for operand `name`; scalar operands only.
    pub fn set_wrapper(
        &mut self,
        wrapper: ElementWrapper,
        name: &str,
    ) -> Result<Option<Option<ElementWrapper>>, WrapperError> {
        if !self.operand_names().iter().any(|n| n == name) {
            return Ok(None);
        }
        if !wrapper.is_scalar() {
            return Err(WrapperError::TypeMismatch {
                description: name.to_string(),
                expected: "Real",
                found: wrapper.value_type().name(),
            });
        }
        Ok(Some(self.wrappers.insert(name.to_string(), wrapper)))
    }

    pub fn clear_wrappers(&mut self) {
        self.wrappers.clear();
    }

    pub fn evaluate(&self, store: &ObjectStore) -> Result<f64, WrapperError> {
        self.eval_node(&self.root, store)
    }

    fn eval_node(&self, node: &Node, store: &ObjectStore) -> Result<f64, WrapperError> {
        match node {
            Node::Operand(name) => self
                .wrappers
                .get(name)
                .ok_or_else(|| WrapperError::Unbound(name.clone()))?
                .evaluate_real(store),
            Node::Negate(inner) => Ok(-self.eval_node(inner, store)?),
            Node::Group(inner) => self.eval_node(inner, store),
            Node::Binary(op, a, b) => Ok(op.apply(self.eval_node(a, store)?, self.eval_node(b, store)?)),
        }
    }

    pub fn rename_object(&mut self, old: &str, new: &str) -> bool {
        let changed = rename_operands(&mut self.root, old, new);
        if changed {
            self.wrappers.clear();
        }
        changed
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(&self.root, f)
    }
}

fn write_node(node: &Node, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match node {
        Node::Operand(name) => f.write_str(name),
        Node::Negate(inner) => {
            f.write_str("-")?;
            write_node(inner, f)
        }
        Node::Group(inner) => {
            f.write_str("(")?;
            write_node(inner, f)?;
            f.write_str(")")
        }
        Node::Binary(op, a, b) => {
            write_node(a, f)?;
            write!(f, " {} ", op.symbol())?;
            write_node(b, f)
        }
    }
}

fn collect_operands(node: &Node, names: &mut Vec<String>) {
    match node {
        Node::Operand(name) => {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        Node::Negate(inner) | Node::Group(inner) => collect_operands(inner, names),
        Node::Binary(_, a, b) => {
            collect_operands(a, names);
            collect_operands(b, names);
        }
    }
}

fn rename_operands(node: &mut Node, old: &str, new: &str) -> bool {
    match node {
        Node::Operand(name) => match crate::commands::rename_leading(name, old, new) {
            Some(renamed) => {
                *name = renamed;
                true
            }
            None => false,
        },
        Node::Negate(inner) | Node::Group(inner) => rename_operands(inner, old, new),
        Node::Binary(_, a, b) => {
            let left = rename_operands(a, old, new);
            rename_operands(b, old, new) || left
        }
    }
}

fn tokenize(command: &str, text: &str) -> Result<Vec<Token>, CommandError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                i += 1;
                if i < chars.len() && matches!(chars[i], '+' | '-') {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            tokens.push(Token::Operand(chars[start..i].iter().collect()));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            // An index group directly after a name belongs to the operand.
            let mut j = i;
            while j < chars.len() && chars[j] == ' ' {
                j += 1;
            }
            if j < chars.len() && chars[j] == '(' {
                let mut depth = 0;
                while j < chars.len() {
                    match chars[j] {
                        '(' => depth += 1,
                        ')' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                    if depth == 0 {
                        break;
                    }
                }
                if depth != 0 {
                    return Err(CommandError::parse(command, "unbalanced parentheses"));
                }
                i = j;
            }
            tokens.push(Token::Operand(chars[start..i].iter().collect()));
        } else if c == '\'' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                i += 1;
            }
            i += 1;
            tokens.push(Token::Operand(chars[start..i.min(chars.len())].iter().collect()));
        } else if c == '(' {
            tokens.push(Token::Open);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::Close);
            i += 1;
        } else if let Some(op) = BinOp::from_char(c) {
            tokens.push(Token::Op(op));
            i += 1;
        } else {
            return Err(CommandError::parse(command, format!("unexpected `{c}` in `{text}`")));
        }
    }
    if tokens.is_empty() {
        return Err(CommandError::parse(command, "empty expression"));
    }
    Ok(tokens)
}

struct Parser<'t> {
    command: &'t str,
    tokens: &'t [Token],
    pos: usize,
}

impl Parser<'_> {
    fn expression(&mut self, min_precedence: u8) -> Result<Node, CommandError> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op)) = self.tokens.get(self.pos) {
            let op = *op;
            if op.precedence() < min_precedence {
                break;
            }
            self.pos += 1;
            // `^` is right-associative.
            let next = if op == BinOp::Pow {
                op.precedence()
            } else {
                op.precedence() + 1
            };
            let rhs = self.expression(next)?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node, CommandError> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(BinOp::Sub)) => {
                self.pos += 1;
                Ok(Node::Negate(Box::new(self.unary()?)))
            }
            Some(Token::Op(BinOp::Add)) => {
                self.pos += 1;
                self.unary()
            }
            Some(Token::Operand(name)) => {
                self.pos += 1;
                Ok(Node::Operand(name.clone()))
            }
            Some(Token::Open) => {
                self.pos += 1;
                let inner = self.expression(0)?;
                if self.tokens.get(self.pos) != Some(&Token::Close) {
                    return Err(CommandError::parse(self.command, "missing `)`"));
                }
                self.pos += 1;
                Ok(Node::Group(Box::new(inner)))
            }
            _ => Err(CommandError::parse(self.command, "expected an operand")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcs_objects::{MissionObject, Variable};

    fn bound(text: &str, store: &ObjectStore) -> Expression {
        let mut expr = Expression::parse("GMAT", text).unwrap().unwrap();
        for name in expr.operand_names() {
            let wrapper = ElementWrapper::create(&name, store).unwrap();
            expr.set_wrapper(wrapper, &name).unwrap();
        }
        expr
    }

    #[test]
    fn precedence_and_grouping() {
        let mut store = ObjectStore::default();
        store.add(MissionObject::Variable(Variable::new("I", 3.0))).unwrap();
        assert_eq!(bound("I + 1", &store).evaluate(&store).unwrap(), 4.0);
        assert_eq!(bound("2 * (I - 1) ^ 2", &store).evaluate(&store).unwrap(), 8.0);
        assert_eq!(bound("-I + 1e-1 * 10", &store).evaluate(&store).unwrap(), -2.0);
        assert_eq!(bound("2 ^ 3 ^ 2", &store).evaluate(&store).unwrap(), 512.0);
    }

    #[test]
    fn single_operands_are_not_expressions() {
        assert!(Expression::parse("GMAT", "Sat.X").unwrap().is_none());
        assert!(Expression::parse("GMAT", "M(1, 2)").unwrap().is_none());
        assert!(Expression::parse("GMAT", "-5").unwrap().is_some());
    }

    #[test]
    fn display_round_trips() {
        let expr = Expression::parse("GMAT", "(a+b)*-c").unwrap().unwrap();
        assert_eq!(expr.to_string(), "(a + b) * -c");
    }
}
