//! Expression compiler: infix token ranges to annotated postfix.
//!
//! This is the shunting-yard algorithm with one twist: function calls and
//! array accesses never touch the operator stack. They are expanded on the
//! spot into marker-delimited blocks, and each argument or index expression
//! is compiled recursively inside its block.
//!
//! The input range is assumed to have passed the grammar validator, so
//! bracket balance and token legality are not checked again here.

use std::collections::HashSet;
use std::fmt;

use tracing::trace;

use crate::lang::Language;
use crate::tokenizer::{Punct, Token, TokenKind};

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

impl BinaryOp {
  pub fn from_punct(punct: Punct) -> Option<Self> {
    Some(match punct {
      Punct::Plus => Self::Add,
      Punct::Minus => Self::Sub,
      Punct::Star => Self::Mul,
      Punct::Slash => Self::Div,
      Punct::EqEq => Self::Eq,
      Punct::Ne => Self::Ne,
      Punct::Lt => Self::Lt,
      Punct::Le => Self::Le,
      Punct::Gt => Self::Gt,
      Punct::Ge => Self::Ge,
      _ => return None,
    })
  }

  pub fn symbol(self) -> &'static str {
    match self {
      Self::Add => "+",
      Self::Sub => "-",
      Self::Mul => "*",
      Self::Div => "/",
      Self::Eq => "==",
      Self::Ne => "!=",
      Self::Lt => "<",
      Self::Le => "<=",
      Self::Gt => ">",
      Self::Ge => ">=",
    }
  }
}

/// One step of a postfix program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
  Int(i64),
  Var(String),
  Op(BinaryOp),
  /// Start of a call whose result is used as a value.
  CallStart(String),
  /// Zero-based index of the argument whose postfix follows.
  Arg(usize),
  CallEnd,
  ArrayStart(String),
  ArrayEnd,
}

impl fmt::Display for Instr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Int(value) => write!(f, "_IntVal_ {value}"),
      Self::Var(name) => write!(f, "_IntVar_ {name}"),
      Self::Op(op) => write!(f, "_Operator_ {}", op.symbol()),
      Self::CallStart(name) => write!(f, "_StartFunRet_ {name}"),
      Self::Arg(idx) => write!(f, "_FunArgument_ {idx}"),
      Self::CallEnd => write!(f, "_EndFunRet_"),
      Self::ArrayStart(name) => write!(f, "_StartArrayVal_ {name}"),
      Self::ArrayEnd => write!(f, "_EndArrayVal_"),
    }
  }
}

/// Name classification for the scope an expression is compiled in.
pub trait Symbols {
  fn is_variable(&self, name: &str) -> bool;
  fn is_array(&self, name: &str) -> bool;
}

/// Two plain name sets.
#[derive(Debug, Clone, Default)]
pub struct SymbolSets {
  pub variables: HashSet<String>,
  pub arrays: HashSet<String>,
}

impl SymbolSets {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn variable(mut self, name: &str) -> Self {
    self.variables.insert(name.to_string());
    self
  }

  pub fn array(mut self, name: &str) -> Self {
    self.arrays.insert(name.to_string());
    self
  }
}

impl Symbols for SymbolSets {
  fn is_variable(&self, name: &str) -> bool {
    self.variables.contains(name)
  }

  fn is_array(&self, name: &str) -> bool {
    self.arrays.contains(name)
  }
}

enum Pending {
  Group,
  Op(BinaryOp),
}

/// Compile a validated expression range into postfix order.
pub fn compile(tokens: &[Token], symbols: &dyn Symbols, lang: &Language) -> Vec<Instr> {
  let mut output = Vec::new();
  let mut stack: Vec<Pending> = Vec::new();
  let mut expect_operand = true;
  let mut i = 0;

  while i < tokens.len() {
    let token = &tokens[i];
    let next = tokens.get(i + 1).and_then(Token::punct);

    match token.kind {
      TokenKind::Num(value) => {
        output.push(Instr::Int(value));
        expect_operand = false;
      }
      TokenKind::Ident if next == Some(Punct::LParen) => {
        let close = matching_close(tokens, i + 1);
        output.extend(compile_call(tokens, i, close, symbols, lang));
        expect_operand = false;
        i = close;
      }
      TokenKind::Ident if next == Some(Punct::LBracket) && symbols.is_array(&token.text) => {
        let close = matching_close(tokens, i + 1);
        output.push(Instr::ArrayStart(token.text.clone()));
        output.extend(compile(&tokens[i + 2..close], symbols, lang));
        output.push(Instr::ArrayEnd);
        expect_operand = false;
        i = close;
      }
      TokenKind::Ident => {
        if !symbols.is_variable(&token.text) {
          trace!(name = %token.text, line = token.line, "name not declared in scope");
        }
        output.push(Instr::Var(token.text.clone()));
        expect_operand = false;
      }
      TokenKind::Punct(Punct::LParen) => {
        stack.push(Pending::Group);
        expect_operand = true;
      }
      TokenKind::Punct(Punct::RParen) => {
        while let Some(Pending::Op(op)) = stack.last() {
          output.push(Instr::Op(*op));
          stack.pop();
        }
        stack.pop();
        expect_operand = false;
      }
      // Unary sign: `-x` is `0 x -`, `+x` is `x`.
      TokenKind::Punct(Punct::Plus) if expect_operand => {}
      TokenKind::Punct(Punct::Minus) if expect_operand => {
        output.push(Instr::Int(0));
        stack.push(Pending::Op(BinaryOp::Sub));
      }
      TokenKind::Punct(punct) => {
        if let Some(op) = BinaryOp::from_punct(punct) {
          while let Some(Pending::Op(top)) = stack.last()
            && lang.precedence(op) <= lang.precedence(*top)
          {
            output.push(Instr::Op(*top));
            stack.pop();
          }
          stack.push(Pending::Op(op));
          expect_operand = true;
        }
      }
      _ => {}
    }

    i += 1;
  }

  while let Some(pending) = stack.pop() {
    if let Pending::Op(op) = pending {
      output.push(Instr::Op(op));
    }
  }

  output
}

fn compile_call(
  tokens: &[Token],
  name: usize,
  close: usize,
  symbols: &dyn Symbols,
  lang: &Language,
) -> Vec<Instr> {
  let mut output = vec![Instr::CallStart(tokens[name].text.clone())];
  let args = &tokens[name + 2..close];

  if !args.is_empty() {
    for (idx, arg) in split_top_level(args).into_iter().enumerate() {
      output.push(Instr::Arg(idx));
      output.extend(compile(arg, symbols, lang));
    }
  }

  output.push(Instr::CallEnd);
  output
}

/// Split at commas that are not nested inside `()` or `[]`.
pub fn split_top_level(tokens: &[Token]) -> Vec<&[Token]> {
  let mut parts = Vec::new();
  let mut depth = 0usize;
  let mut start = 0;

  for (idx, token) in tokens.iter().enumerate() {
    match token.punct() {
      Some(Punct::LParen | Punct::LBracket) => depth += 1,
      Some(Punct::RParen | Punct::RBracket) => depth = depth.saturating_sub(1),
      Some(Punct::Comma) if depth == 0 => {
        parts.push(&tokens[start..idx]);
        start = idx + 1;
      }
      _ => {}
    }
  }

  parts.push(&tokens[start..]);
  parts
}

/// Index of the bracket closing the one at `open`, or `tokens.len()` if absent.
fn matching_close(tokens: &[Token], open: usize) -> usize {
  let mut depth = 0usize;
  for (idx, token) in tokens.iter().enumerate().skip(open) {
    match token.punct() {
      Some(punct) if punct.is_open() => depth += 1,
      Some(punct) if punct.is_close() => {
        depth = depth.saturating_sub(1);
        if depth == 0 {
          return idx;
        }
      }
      _ => {}
    }
  }
  tokens.len()
}

/// Evaluate a postfix program made only of literals and operators.
///
/// Returns `None` for programs with names, calls or array accesses, for
/// malformed programs, and on overflow or division by zero.
pub fn evaluate(program: &[Instr]) -> Option<i64> {
  let mut stack: Vec<i64> = Vec::new();

  for instr in program {
    match instr {
      Instr::Int(value) => stack.push(*value),
      Instr::Op(op) => {
        let rhs = stack.pop()?;
        let lhs = stack.pop()?;
        let value = match op {
          BinaryOp::Add => lhs.checked_add(rhs)?,
          BinaryOp::Sub => lhs.checked_sub(rhs)?,
          BinaryOp::Mul => lhs.checked_mul(rhs)?,
          BinaryOp::Div => lhs.checked_div(rhs)?,
          BinaryOp::Eq => i64::from(lhs == rhs),
          BinaryOp::Ne => i64::from(lhs != rhs),
          BinaryOp::Lt => i64::from(lhs < rhs),
          BinaryOp::Le => i64::from(lhs <= rhs),
          BinaryOp::Gt => i64::from(lhs > rhs),
          BinaryOp::Ge => i64::from(lhs >= rhs),
        };
        stack.push(value);
      }
      _ => return None,
    }
  }

  match stack.as_slice() {
    [value] => Some(*value),
    _ => None,
  }
}
