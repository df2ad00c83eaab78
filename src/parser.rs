//! Grammar validator for the clc language.
//!
//! Every grammar rule is a method that takes the index of its first token and
//! the exclusive end of the region it may look at, and returns how many
//! tokens it consumed. Callers advance their own cursor by that count, so no
//! rule ever mutates a shared position and each one can be exercised on its
//! own.
//!
//! Each expression found along the way is handed to [`postfix::compile`]
//! with the names visible at that point and recorded as an [`Expression`].

use std::collections::HashMap;
use std::ops::Range;

use tracing::debug;

use crate::directive::Directive;
use crate::error::{CompileError, CompileResult};
use crate::lang::Language;
use crate::postfix::{self, BinaryOp, Instr, Symbols};
use crate::tokenizer::{Keyword, Punct, Token, TokenKind};
use crate::ty::{FunctionSig, ReturnType, VarType};

/// Where an expression appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
  VarInit,
  Assign,
  ArrayIndex,
  ArrayValue,
  Condition,
  Return,
  Call,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
  pub site: Site,
  /// Token range of the infix source.
  pub span: Range<usize>,
  pub postfix: Vec<Instr>,
}

/// A validated token sequence with every expression compiled to postfix.
#[derive(Debug, Clone)]
pub struct Program {
  pub tokens: Vec<Token>,
  pub functions: Vec<FunctionSig>,
  pub expressions: Vec<Expression>,
}

impl Program {
  /// First token of an expression, for locating it in the source.
  pub fn location(&self, expr: &Expression) -> Option<&Token> {
    self.tokens.get(expr.span.start)
  }

  /// The infix text of an expression, tokens joined by spaces.
  pub fn source_text(&self, expr: &Expression) -> String {
    self.tokens[expr.span.clone()]
      .iter()
      .map(|token| token.text.as_str())
      .collect::<Vec<_>>()
      .join(" ")
  }
}

/// Validate the whole token sequence and compile its expressions.
pub fn parse(tokens: Vec<Token>, lang: &Language) -> CompileResult<Program> {
  let (functions, expressions) = {
    let mut validator = Validator::new(&tokens, lang);
    validator.program()?;
    (validator.functions, validator.expressions)
  };

  debug!(
    functions = functions.len(),
    expressions = expressions.len(),
    "validated program"
  );

  Ok(Program {
    tokens,
    functions,
    expressions,
  })
}

/// Check that `{}`, `[]` and `()` pair up and never straddle two files.
pub fn check_balance(tokens: &[Token]) -> CompileResult<()> {
  let mut stack: Vec<&Token> = Vec::new();

  for token in tokens {
    if let Some(open) = stack.last()
      && !open.same_file(token)
    {
      return Err(CompileError::bracket(
        open,
        format!("'{}' was not closed!", open.text),
      ));
    }

    match token.punct() {
      Some(punct) if punct.is_open() => stack.push(token),
      Some(punct) if punct.is_close() => match stack.pop() {
        Some(open) if open.punct().and_then(Punct::closer) == Some(punct) => {}
        _ => {
          return Err(CompileError::bracket(
            token,
            format!("Unexpected: {}", token.text),
          ));
        }
      },
      _ => {}
    }
  }

  match stack.pop() {
    Some(open) => Err(CompileError::bracket(
      open,
      format!("'{}' was not closed!", open.text),
    )),
    None => Ok(()),
  }
}

#[derive(Debug, Default)]
struct Frame {
  variables: HashMap<String, VarType>,
  arrays: HashMap<String, VarType>,
}

/// Names visible at the current point of the walk.
#[derive(Debug, Default)]
struct Scopes {
  frames: Vec<Frame>,
}

impl Scopes {
  fn push(&mut self) {
    self.frames.push(Frame::default());
  }

  fn pop(&mut self) {
    self.frames.pop();
  }

  fn declare_variable(&mut self, name: &str, ty: VarType) {
    if let Some(frame) = self.frames.last_mut() {
      frame.variables.insert(name.to_string(), ty);
    }
  }

  fn declare_array(&mut self, name: &str, ty: VarType) {
    if let Some(frame) = self.frames.last_mut() {
      frame.arrays.insert(name.to_string(), ty);
    }
  }
}

impl Symbols for Scopes {
  fn is_variable(&self, name: &str) -> bool {
    self
      .frames
      .iter()
      .rev()
      .any(|frame| frame.variables.contains_key(name))
  }

  fn is_array(&self, name: &str) -> bool {
    self
      .frames
      .iter()
      .rev()
      .any(|frame| frame.arrays.contains_key(name))
  }
}

/// Call arguments and array indices deeper than this are rejected.
const MAX_NESTING: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExprState {
  Start,
  Value,
  Sign,
}

struct Validator<'a> {
  tokens: &'a [Token],
  lang: &'a Language,
  scopes: Scopes,
  functions: Vec<FunctionSig>,
  expressions: Vec<Expression>,
}

impl<'a> Validator<'a> {
  fn new(tokens: &'a [Token], lang: &'a Language) -> Self {
    Self {
      tokens,
      lang,
      scopes: Scopes::default(),
      functions: Vec::new(),
      expressions: Vec::new(),
    }
  }

  fn program(&mut self) -> CompileResult<()> {
    check_balance(self.tokens)?;
    self.collect_globals();

    let end = self.tokens.len();
    let mut i = 0;
    while i < end {
      i += self.top_level(i, end)?;
    }
    Ok(())
  }

  /// Register global declarations ahead of the walk, so top-level items may
  /// refer to ones defined further down.
  fn collect_globals(&mut self) {
    self.scopes.push();
    let tokens = self.tokens;
    let mut depth = 0usize;

    for (i, token) in tokens.iter().enumerate() {
      match token.punct() {
        Some(Punct::LBrace) => depth += 1,
        Some(Punct::RBrace) => depth = depth.saturating_sub(1),
        _ => {}
      }
      if depth > 0 || !token.is_keyword(Keyword::Int) {
        continue;
      }

      let ahead = |offset: usize| tokens.get(i + offset);
      match (ahead(1), ahead(2), ahead(3)) {
        (Some(name), Some(assign), _) if name.is_ident() && assign.is(Punct::Assign) => {
          self.scopes.declare_variable(&name.text, VarType::Int);
        }
        (Some(open), Some(close), Some(name))
          if open.is(Punct::LBracket)
            && close.is(Punct::RBracket)
            && name.is_ident() =>
        {
          self.scopes.declare_array(&name.text, VarType::Int);
        }
        _ => {}
      }
    }
  }

  fn top_level(&mut self, i: usize, end: usize) -> CompileResult<usize> {
    let tokens = self.tokens;
    let token = &tokens[i];

    match token.kind {
      TokenKind::Directive => {
        self.directive(token)?;
        Ok(1)
      }
      TokenKind::Keyword(Keyword::Void) => self.function_decl(i, end),
      TokenKind::Keyword(Keyword::Int) => {
        if self.at(i + 1, end)?.is(Punct::LBracket) {
          self.array_decl(i, end)
        } else if self.at(i + 2, end)?.is(Punct::LParen) {
          self.function_decl(i, end)
        } else {
          self.var_decl(i, end)
        }
      }
      _ => Err(CompileError::syntax(
        token,
        format!("Unexpected expression: \"{}\"", token.text),
      )),
    }
  }

  fn directive(&self, token: &Token) -> CompileResult<()> {
    let directive = Directive::parse(&token.text, self.lang)
      .map_err(|err| CompileError::directive(token, err.to_string()))?;
    debug!(?directive, line = token.line, "directive");
    Ok(())
  }

  /// `ReturnType Name ( ParamList? ) Block`
  fn function_decl(&mut self, i: usize, end: usize) -> CompileResult<usize> {
    let ty_token = self.at(i, end)?;
    let return_type = ReturnType::from_token(ty_token, self.lang).ok_or_else(|| {
      CompileError::syntax(
        ty_token,
        format!("Unknown type \"{}\" for function.", ty_token.text),
      )
    })?;

    let name = self.at(i + 1, end)?;
    if !self.is_name(name) {
      return Err(CompileError::syntax(
        name,
        format!("Not a valid function name: \"{}\".", name.text),
      ));
    }
    if self.functions.iter().any(|sig| sig.name == name.text) {
      return Err(CompileError::syntax(
        name,
        format!("Function \"{}\" is already defined.", name.text),
      ));
    }

    self.expect(i + 2, end, Punct::LParen, "for function declaration")?;
    let close = self.closing(i + 2, end)?;
    let params = self.params(i + 3, close)?;
    self.expect(close + 1, end, Punct::LBrace, "after function definition")?;

    self.functions.push(FunctionSig {
      name: name.text.clone(),
      return_type,
      params: params.clone(),
    });

    self.scopes.push();
    for (ty, param) in &params {
      self.scopes.declare_variable(param, *ty);
    }
    let block = self.block(close + 1, end);
    self.scopes.pop();

    Ok(close + 1 - i + block?)
  }

  /// `Type Name (, Type Name)*` between `start` and the closing `)`.
  fn params(&self, start: usize, end: usize) -> CompileResult<Vec<(VarType, String)>> {
    let mut params = Vec::new();
    let mut idx = start;

    while idx < end {
      let ty_token = &self.tokens[idx];
      let ty = VarType::from_token(ty_token, self.lang).ok_or_else(|| {
        CompileError::syntax(
          ty_token,
          format!("Expected variable type, got: \"{}\"", ty_token.text),
        )
      })?;

      let name = self.at(idx + 1, end)?;
      if !self.is_name(name) {
        return Err(CompileError::syntax(
          name,
          format!("Expected variable name, got: \"{}\"", name.text),
        ));
      }
      params.push((ty, name.text.clone()));
      idx += 2;

      if idx == end {
        break;
      }
      let separator = &self.tokens[idx];
      if !separator.is(Punct::Comma) {
        return Err(CompileError::syntax(
          separator,
          format!(
            "Expected ')' or ',' after variable name, got: \"{}\"",
            separator.text
          ),
        ));
      }
      idx += 1;
      if idx == end {
        return Err(CompileError::syntax(
          separator,
          "Expected variable type after ','",
        ));
      }
    }

    Ok(params)
  }

  /// `{ Statement* }`
  fn block(&mut self, open: usize, end: usize) -> CompileResult<usize> {
    self.expect(open, end, Punct::LBrace, "to open a code block")?;
    let close = self.closing(open, end)?;

    self.scopes.push();
    let mut j = open + 1;
    let mut result = Ok(());
    while j < close {
      match self.statement(j, close) {
        Ok(consumed) => j += consumed,
        Err(err) => {
          result = Err(err);
          break;
        }
      }
    }
    self.scopes.pop();

    result.map(|()| close - open + 1)
  }

  fn statement(&mut self, j: usize, end: usize) -> CompileResult<usize> {
    let tokens = self.tokens;
    let token = &tokens[j];

    match token.kind {
      TokenKind::Keyword(Keyword::While) => self.while_loop(j, end),
      TokenKind::Keyword(Keyword::Return) => self.return_stmt(j, end),
      TokenKind::Keyword(Keyword::If) => self.if_chain(j, end),
      TokenKind::Keyword(Keyword::Else) => Err(CompileError::syntax(
        token,
        "\"else\" without a matching \"if\"",
      )),
      _ if VarType::from_token(token, self.lang).is_some() => {
        if self.at(j + 1, end)?.is(Punct::LBracket) {
          self.array_decl(j, end)
        } else {
          self.var_decl(j, end)
        }
      }
      TokenKind::Ident => match self.at(j + 1, end)?.punct() {
        Some(Punct::LParen) => self.call_stmt(j, end),
        Some(Punct::Assign) => self.assignment(j, end),
        Some(Punct::LBracket) => self.array_assignment(j, end),
        _ => Err(CompileError::syntax(
          token,
          format!("Cannot parse statement: \"{}\"", token.text),
        )),
      },
      _ => Err(CompileError::syntax(
        token,
        format!("Cannot parse statement: \"{}\"", token.text),
      )),
    }
  }

  /// `Type Name = Expr ;`
  fn var_decl(&mut self, j: usize, end: usize) -> CompileResult<usize> {
    let ty_token = self.at(j, end)?;
    let ty = self.var_type(ty_token)?;

    let name = self.at(j + 1, end)?;
    if !self.is_name(name) {
      return Err(CompileError::syntax(
        name,
        format!("'{}' is not a variable name.", name.text),
      ));
    }
    self.expect(j + 2, end, Punct::Assign, "in variable declaration")?;

    let semi = self.terminator(j + 3, end, j)?;
    if semi == j + 3 {
      return Err(CompileError::syntax(
        &self.tokens[semi],
        format!("Missing value for \"{}\".", name.text),
      ));
    }
    self.expression(j + 3, semi, Site::VarInit)?;
    self.scopes.declare_variable(&name.text, ty);

    Ok(semi - j + 1)
  }

  /// `Type [ ] Name = ( [ Number ] | { Number (, Number)* } ) ;`
  fn array_decl(&mut self, j: usize, end: usize) -> CompileResult<usize> {
    let ty_token = self.at(j, end)?;
    let ty = self.var_type(ty_token)?;

    self.expect(j + 1, end, Punct::LBracket, "in array declaration")?;
    self.expect(j + 2, end, Punct::RBracket, "in array declaration")?;
    let name = self.at(j + 3, end)?;
    if !self.is_name(name) {
      return Err(CompileError::syntax(
        name,
        format!("'{}' is not a variable name.", name.text),
      ));
    }
    self.expect(j + 4, end, Punct::Assign, "in array declaration")?;

    let init = self.at(j + 5, end)?;
    let consumed = match init.punct() {
      Some(Punct::LBracket) => {
        let size = self.at(j + 6, end)?;
        if !matches!(size.kind, TokenKind::Num(_)) {
          return Err(CompileError::syntax(
            size,
            format!("Expected number got: '{}'", size.text),
          ));
        }
        self.expect(j + 7, end, Punct::RBracket, "after array size")?;
        self.expect(j + 8, end, Punct::Semi, "after array declaration")?;
        9
      }
      Some(Punct::LBrace) => {
        let close = self.closing(j + 5, end)?;
        self.array_values(j + 6, close, init)?;
        self.expect(close + 1, end, Punct::Semi, "after array declaration")?;
        close - j + 2
      }
      _ => {
        return Err(CompileError::syntax(
          init,
          "Expected: '{' or '[' after '='.",
        ));
      }
    };

    self.scopes.declare_array(&name.text, ty);
    Ok(consumed)
  }

  /// `Number (, Number)*` with no trailing comma.
  fn array_values(&self, start: usize, close: usize, open: &Token) -> CompileResult<()> {
    if start == close {
      return Err(CompileError::syntax(open, "Array declaration values missing."));
    }

    for (k, token) in self.tokens[start..close].iter().enumerate() {
      let valid = if k % 2 == 0 {
        matches!(token.kind, TokenKind::Num(_))
      } else {
        token.is(Punct::Comma)
      };
      if !valid {
        let expected = if k % 2 == 0 { "number" } else { "','" };
        return Err(CompileError::syntax(
          token,
          format!("Expected {expected} got: '{}'", token.text),
        ));
      }
    }

    if (close - start) % 2 == 0 {
      return Err(CompileError::syntax(
        &self.tokens[close - 1],
        "Array values must not end with ','.",
      ));
    }
    Ok(())
  }

  /// `while ( Expr ) Block`
  fn while_loop(&mut self, j: usize, end: usize) -> CompileResult<usize> {
    self.expect(j + 1, end, Punct::LParen, "for the condition at while loop")?;
    let close = self.closing(j + 1, end)?;
    self.expression(j + 2, close, Site::Condition)?;
    self.expect(close + 1, end, Punct::LBrace, "for the code block after while()")?;
    let block = self.block(close + 1, end)?;
    Ok(close + 1 - j + block)
  }

  /// `if ( Expr ) Block (else if ( Expr ) Block)* (else Block)?`
  fn if_chain(&mut self, j: usize, end: usize) -> CompileResult<usize> {
    let mut consumed = self.conditional(j, end)?;

    loop {
      let k = j + consumed;
      if k >= end || !self.tokens[k].is_keyword(Keyword::Else) {
        break;
      }
      if self.at(k + 1, end)?.is_keyword(Keyword::If) {
        consumed += 1 + self.conditional(k + 1, end)?;
      } else {
        self.expect(k + 1, end, Punct::LBrace, "for the code block after else")?;
        consumed += 1 + self.block(k + 1, end)?;
        break;
      }
    }

    Ok(consumed)
  }

  /// `if ( Expr ) Block`
  fn conditional(&mut self, j: usize, end: usize) -> CompileResult<usize> {
    self.expect(j + 1, end, Punct::LParen, "for the condition of if")?;
    let close = self.closing(j + 1, end)?;
    self.expression(j + 2, close, Site::Condition)?;
    self.expect(close + 1, end, Punct::LBrace, "for the code block after if()")?;
    let block = self.block(close + 1, end)?;
    Ok(close + 1 - j + block)
  }

  /// `return Expr? ;`
  fn return_stmt(&mut self, j: usize, end: usize) -> CompileResult<usize> {
    if self.at(j + 1, end)?.is(Punct::Semi) {
      return Ok(2);
    }
    let semi = self.terminator(j + 1, end, j)?;
    self.expression(j + 1, semi, Site::Return)?;
    Ok(semi - j + 1)
  }

  /// `Name = Expr ;`
  fn assignment(&mut self, j: usize, end: usize) -> CompileResult<usize> {
    self.expect(j + 1, end, Punct::Assign, "for assignment")?;
    let semi = self.terminator(j + 2, end, j)?;
    self.expression(j + 2, semi, Site::Assign)?;
    Ok(semi - j + 1)
  }

  /// `Name [ Expr ] = Expr ;`
  fn array_assignment(&mut self, j: usize, end: usize) -> CompileResult<usize> {
    let tokens = self.tokens;
    let name = &tokens[j];
    if !self.scopes.is_array(&name.text) {
      return Err(CompileError::syntax(
        name,
        format!("\"{}\" is not an array.", name.text),
      ));
    }

    let close = self.closing(j + 1, end)?;
    self.expression(j + 2, close, Site::ArrayIndex)?;
    self.expect(close + 1, end, Punct::Assign, "for array assignment")?;
    let semi = self.terminator(close + 2, end, j)?;
    self.expression(close + 2, semi, Site::ArrayValue)?;
    Ok(semi - j + 1)
  }

  /// `Name ( ArgList? ) ;`
  fn call_stmt(&mut self, j: usize, end: usize) -> CompileResult<usize> {
    let close = self.closing(j + 1, end)?;
    self.expect(close + 1, end, Punct::Semi, "after function call")?;
    self.expression(j, close + 1, Site::Call)?;
    Ok(close - j + 2)
  }

  /// Validate an expression site and compile it.
  fn expression(&mut self, start: usize, end: usize, site: Site) -> CompileResult<()> {
    if start < end {
      check_balance(&self.tokens[start..end])?;
    }
    self.check_expr(start, end, 0)?;

    let postfix = postfix::compile(&self.tokens[start..end], &self.scopes, self.lang);
    debug!(
      ?site,
      line = self.tokens[start].line,
      instrs = postfix.len(),
      "compiled expression"
    );
    self.expressions.push(Expression {
      site,
      span: start..end,
      postfix,
    });
    Ok(())
  }

  /// Scan `Value (Operator Value)*` with an optional leading sign.
  ///
  /// Grouping parentheses are tracked on a local stack; `nesting` counts
  /// the call arguments and array indices this range sits inside.
  fn check_expr(&self, start: usize, end: usize, nesting: usize) -> CompileResult<()> {
    if end <= start {
      return Err(self.syntax_at(start, "No expression found."));
    }
    if nesting > MAX_NESTING {
      return Err(CompileError::syntax(
        &self.tokens[start],
        "Expression nested too deeply.",
      ));
    }

    let mut groups: Vec<&Token> = Vec::new();
    let mut state = ExprState::Start;
    let mut i = start;
    while i < end {
      let token = &self.tokens[i];
      let operator = token.punct().and_then(BinaryOp::from_punct);

      state = match state {
        ExprState::Start | ExprState::Sign if token.is(Punct::LParen) => {
          groups.push(token);
          i += 1;
          ExprState::Start
        }
        ExprState::Start => {
          if token.is(Punct::Plus) || token.is(Punct::Minus) {
            i += 1;
            ExprState::Sign
          } else if token.is(Punct::RParen) {
            return Err(self.syntax_at(i, "No expression found."));
          } else if operator.is_some() || token.is(Punct::LBracket) {
            return Err(CompileError::syntax(
              token,
              format!("Unexpected \"{}\" at start of expression.", token.text),
            ));
          } else {
            i += self.value(i, end, nesting)?;
            ExprState::Value
          }
        }
        ExprState::Value if token.is(Punct::RParen) => {
          if groups.pop().is_none() {
            return Err(CompileError::bracket(
              token,
              format!("Unexpected: {}", token.text),
            ));
          }
          i += 1;
          ExprState::Value
        }
        ExprState::Value => {
          if operator.is_none() {
            return Err(CompileError::syntax(
              token,
              format!("After value got unexpected: \"{}\".", token.text),
            ));
          }
          i += 1;
          ExprState::Sign
        }
        ExprState::Sign if token.is(Punct::RParen) => {
          let sign = &self.tokens[i - 1];
          return Err(CompileError::syntax(
            sign,
            format!("\"{}\" cannot stand alone.", sign.text),
          ));
        }
        ExprState::Sign => {
          i += self.value(i, end, nesting)?;
          ExprState::Value
        }
      };
    }

    if let Some(open) = groups.pop() {
      return Err(CompileError::bracket(
        open,
        format!("'{}' was not closed!", open.text),
      ));
    }
    if state == ExprState::Sign {
      let last = &self.tokens[end - 1];
      return Err(CompileError::syntax(
        last,
        format!("\"{}\" cannot stand alone.", last.text),
      ));
    }
    Ok(())
  }

  /// One operand: number, name, call or array access.
  fn value(&self, i: usize, end: usize, nesting: usize) -> CompileResult<usize> {
    let token = &self.tokens[i];
    let next = self
      .tokens
      .get(i + 1)
      .filter(|_| i + 1 < end)
      .and_then(Token::punct);

    match token.kind {
      TokenKind::Num(_) => Ok(1),
      TokenKind::Ident if next == Some(Punct::LParen) => {
        if !self.is_name(token) {
          return Err(CompileError::syntax(
            token,
            format!("Not a valid function name: \"{}\".", token.text),
          ));
        }
        let close = self.closing(i + 1, end)?;
        if close > i + 2 {
          self.check_args(i + 2, close, nesting + 1)?;
        }
        Ok(close - i + 1)
      }
      TokenKind::Ident if next == Some(Punct::LBracket) => {
        if !self.scopes.is_array(&token.text) {
          return Err(CompileError::syntax(
            token,
            format!("\"{}\" is not an array.", token.text),
          ));
        }
        let close = self.closing(i + 1, end)?;
        self.check_expr(i + 2, close, nesting + 1)?;
        Ok(close - i + 1)
      }
      TokenKind::Ident if self.is_name(token) => Ok(1),
      TokenKind::Invalid => Err(CompileError::syntax(
        token,
        format!("Cannot read \"{}\".", token.text),
      )),
      _ => Err(CompileError::syntax(
        token,
        format!("Expected a value, got: \"{}\".", token.text),
      )),
    }
  }

  /// `Expr (, Expr)*`, split on commas outside nested brackets.
  fn check_args(&self, start: usize, end: usize, nesting: usize) -> CompileResult<()> {
    let mut depth = 0usize;
    let mut arg_start = start;

    for idx in start..end {
      match self.tokens[idx].punct() {
        Some(Punct::LParen | Punct::LBracket) => depth += 1,
        Some(Punct::RParen | Punct::RBracket) => depth = depth.saturating_sub(1),
        Some(Punct::Comma) if depth == 0 => {
          self.check_arg(arg_start, idx, nesting)?;
          arg_start = idx + 1;
        }
        _ => {}
      }
    }

    self.check_arg(arg_start, end, nesting)
  }

  fn check_arg(&self, start: usize, end: usize, nesting: usize) -> CompileResult<()> {
    if start == end {
      return Err(self.syntax_at(start, "Missing argument."));
    }
    self.check_expr(start, end, nesting)
  }

  /// Index of the bracket closing the one at `open`, searching before `end`.
  fn closing(&self, open: usize, end: usize) -> CompileResult<usize> {
    let opener = self.at(open, end)?;
    let mut stack: Vec<Punct> = Vec::new();

    for idx in open..end {
      let token = &self.tokens[idx];
      match token.punct() {
        Some(punct) if punct.is_open() => stack.push(punct),
        Some(punct) if punct.is_close() => {
          if stack.pop().and_then(Punct::closer) != Some(punct) {
            return Err(CompileError::bracket(
              token,
              format!("Unexpected: {}", token.text),
            ));
          }
          if stack.is_empty() {
            if !opener.same_file(token) {
              return Err(CompileError::bracket(
                opener,
                format!("'{}' was not closed!", opener.text),
              ));
            }
            return Ok(idx);
          }
        }
        _ => {}
      }
    }

    Err(CompileError::bracket(
      opener,
      format!("'{}' was not closed!", opener.text),
    ))
  }

  /// First `;` outside brackets, in the file the statement starts in.
  fn terminator(&self, from: usize, end: usize, stmt: usize) -> CompileResult<usize> {
    let start = &self.tokens[stmt];
    let mut depth = 0usize;

    for idx in from..end {
      let token = &self.tokens[idx];
      match token.punct() {
        Some(punct) if punct.is_open() => depth += 1,
        Some(punct) if punct.is_close() => depth = depth.saturating_sub(1),
        Some(Punct::Semi) if depth == 0 => {
          if !start.same_file(token) {
            break;
          }
          return Ok(idx);
        }
        _ => {}
      }
    }

    Err(CompileError::syntax(
      start,
      format!("No closing ';' found for \"{}\".", start.text),
    ))
  }

  fn expect(&self, idx: usize, end: usize, punct: Punct, context: &str) -> CompileResult<()> {
    let token = self.at(idx, end)?;
    if token.is(punct) {
      return Ok(());
    }
    Err(CompileError::syntax(
      token,
      format!(
        "Expected \"{}\" {context}, got: \"{}\".",
        punct_text(punct),
        token.text
      ),
    ))
  }

  /// Token at `idx` if it lies before `end`.
  fn at(&self, idx: usize, end: usize) -> CompileResult<&'a Token> {
    let tokens = self.tokens;
    if idx < end {
      return Ok(&tokens[idx]);
    }
    Err(self.syntax_at(end.saturating_sub(1), "Statement not complete."))
  }

  fn syntax_at(&self, idx: usize, message: &str) -> CompileError {
    match self.tokens.get(idx).or(self.tokens.last()) {
      Some(token) => CompileError::syntax(token, message),
      None => CompileError::source("N.A.", 0, message),
    }
  }

  fn var_type(&self, token: &Token) -> CompileResult<VarType> {
    VarType::from_token(token, self.lang).ok_or_else(|| {
      CompileError::syntax(token, format!("Unknown type \"{}\".", token.text))
    })
  }

  /// Identifier that is not a reserved type name.
  fn is_name(&self, token: &Token) -> bool {
    token.is_ident() && !self.lang.is_var_type(&token.text)
  }
}

fn punct_text(punct: Punct) -> &'static str {
  match punct {
    Punct::LBrace => "{",
    Punct::RBrace => "}",
    Punct::LBracket => "[",
    Punct::RBracket => "]",
    Punct::LParen => "(",
    Punct::RParen => ")",
    Punct::Comma => ",",
    Punct::Semi => ";",
    Punct::Plus => "+",
    Punct::Minus => "-",
    Punct::Star => "*",
    Punct::Slash => "/",
    Punct::Lt => "<",
    Punct::Gt => ">",
    Punct::Le => "<=",
    Punct::Ge => ">=",
    Punct::EqEq => "==",
    Punct::Ne => "!=",
    Punct::Assign => "=",
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;
  use crate::lang::CLC;
  use crate::source::SourceFile;
  use crate::tokenizer::tokenize;

  fn lex(text: &str) -> Vec<Token> {
    let file = SourceFile::from_text("main.clc", text);
    tokenize(&[&file], &CLC)
  }

  fn lex_files(files: &[(&str, &str)]) -> Vec<Token> {
    let files: Vec<SourceFile> = files
      .iter()
      .map(|(name, text)| SourceFile::from_text(*name, text))
      .collect();
    let refs: Vec<&SourceFile> = files.iter().collect();
    tokenize(&refs, &CLC)
  }

  fn parse_err(text: &str) -> CompileError {
    parse(lex(text), &CLC).unwrap_err()
  }

  #[test]
  fn var_decl_consumes_through_the_terminator() {
    let tokens = lex("int x = 5;");
    let mut validator = Validator::new(&tokens, &CLC);
    assert_eq!(validator.var_decl(0, tokens.len()).unwrap(), 5);
    assert_eq!(validator.expressions.len(), 1);
    assert_eq!(validator.expressions[0].site, Site::VarInit);
    assert_eq!(validator.expressions[0].postfix, vec![Instr::Int(5)]);
  }

  #[test]
  fn var_decl_without_value() {
    let tokens = lex("int x = ;");
    let mut validator = Validator::new(&tokens, &CLC);
    let err = validator.var_decl(0, tokens.len()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(err.message(), "Missing value for \"x\".");
  }

  #[test]
  fn expression_cannot_end_on_an_operator() {
    let err = parse_err("int main() {\n  int x = 5 +;\n}");
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(err.line(), 2);
    assert_eq!(err.message(), "\"+\" cannot stand alone.");
  }

  #[test]
  fn expression_cannot_start_on_a_binary_operator() {
    for op in ["*", "/", "<", ">", "<=", ">=", "==", "!="] {
      let err = parse_err(&format!("int main() {{ int x = {op} 5; }}"));
      assert_eq!(err.kind(), ErrorKind::Syntax, "{op}");
      assert_eq!(
        err.message(),
        format!("Unexpected \"{op}\" at start of expression.")
      );
    }
  }

  #[test]
  fn expression_cannot_start_on_a_bracket() {
    let err = parse_err("int main() { int x = [1]; }");
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(err.message(), "Unexpected \"[\" at start of expression.");
  }

  #[test]
  fn deeply_grouped_expression() {
    let depth = 1000;
    let src = format!(
      "int main() {{ int x = {}1{}; }}",
      "(".repeat(depth),
      ")".repeat(depth)
    );
    let program = parse(lex(&src), &CLC).unwrap();
    assert_eq!(program.expressions[0].postfix, vec![Instr::Int(1)]);
  }

  #[test]
  fn grouping_errors() {
    let err = parse_err("int main() { int x = (); }");
    assert_eq!(err.message(), "No expression found.");

    let err = parse_err("int main() { int x = (1 +) * 2; }");
    assert_eq!(err.message(), "\"+\" cannot stand alone.");

    let program = parse(lex("int main() { int x = -(2 * 3) + (-4); }"), &CLC).unwrap();
    assert_eq!(postfix::evaluate(&program.expressions[0].postfix), Some(-10));
  }

  #[test]
  fn call_nesting_is_limited() {
    let depth = MAX_NESTING + 5;
    let src = format!(
      "int main() {{ int x = {}1{}; }}",
      "f(".repeat(depth),
      ")".repeat(depth)
    );
    let err = parse_err(&src);
    assert_eq!(err.message(), "Expression nested too deeply.");
  }

  #[test]
  fn leading_sign_is_allowed_once() {
    let program = parse(lex("int main() { int x = -5; int y = +x; }"), &CLC).unwrap();
    assert_eq!(
      program.expressions[0].postfix,
      vec![Instr::Int(0), Instr::Int(5), Instr::Op(BinaryOp::Sub)]
    );
    let err = parse_err("int main() { int x = - -5; }");
    assert!(err.message().starts_with("Expected a value"));
  }

  #[test]
  fn values_must_be_separated_by_operators() {
    let err = parse_err("int main() { int x = 1 2; }");
    assert_eq!(err.message(), "After value got unexpected: \"2\".");
  }

  #[test]
  fn if_chain_is_one_statement() {
    let tokens = lex("if (a) { } else if (b) { x = 1; } else { } y = 2;");
    let mut validator = Validator::new(&tokens, &CLC);
    validator.scopes.push();
    // if(a){} = 6, else if(b){x=1;} = 11, else{} = 3
    assert_eq!(validator.if_chain(0, tokens.len()).unwrap(), 20);
    assert_eq!(tokens[20].text, "y");
    let sites: Vec<Site> = validator.expressions.iter().map(|e| e.site).collect();
    assert_eq!(sites, vec![Site::Condition, Site::Condition, Site::Assign]);
  }

  #[test]
  fn if_without_else() {
    let tokens = lex("if (a == 1) { return; }");
    let mut validator = Validator::new(&tokens, &CLC);
    validator.scopes.push();
    assert_eq!(validator.if_chain(0, tokens.len()).unwrap(), tokens.len());
  }

  #[test]
  fn else_needs_a_matching_if() {
    let err = parse_err("int main() {\n  else { }\n}");
    assert_eq!(err.message(), "\"else\" without a matching \"if\"");
    assert_eq!(err.line(), 2);

    let err = parse_err("int main() { if (1) { } else { } else { } }");
    assert_eq!(err.message(), "\"else\" without a matching \"if\"");
  }

  #[test]
  fn while_loop() {
    let tokens = lex("while (i < 10) { i = i + 1; }");
    let mut validator = Validator::new(&tokens, &CLC);
    validator.scopes.push();
    assert_eq!(validator.while_loop(0, tokens.len()).unwrap(), tokens.len());

    let err = parse_err("int main() { while () { } }");
    assert_eq!(err.message(), "No expression found.");
  }

  #[test]
  fn return_forms() {
    let tokens = lex("return; return a * 2;");
    let mut validator = Validator::new(&tokens, &CLC);
    assert_eq!(validator.return_stmt(0, tokens.len()).unwrap(), 2);
    assert_eq!(validator.return_stmt(2, tokens.len()).unwrap(), 5);
    assert_eq!(validator.expressions[0].site, Site::Return);
  }

  #[test]
  fn balanced_ranges_are_accepted() {
    assert!(check_balance(&lex("{ ( [ ] ) [ ( ) ] } ( )")).is_ok());
    assert!(check_balance(&[]).is_ok());
  }

  #[test]
  fn injected_brackets_are_rejected_at_the_offender() {
    let tokens = lex("{ (\n ) )\n}");
    let err = check_balance(&tokens).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Bracket);
    assert_eq!(err.message(), "Unexpected: )");
    assert_eq!(err.line(), 2);

    let tokens = lex("{ ( ] }");
    let err = check_balance(&tokens).unwrap_err();
    assert_eq!(err.message(), "Unexpected: ]");

    let tokens = lex("( )\n{ [ ]");
    let err = check_balance(&tokens).unwrap_err();
    assert_eq!(err.message(), "'{' was not closed!");
    assert_eq!(err.line(), 2);
  }

  #[test]
  fn blocks_cannot_span_files() {
    let tokens = lex_files(&[("a.clc", "int main() {"), ("b.clc", "}")]);
    let err = parse(tokens, &CLC).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Bracket);
    assert_eq!(err.file(), "a.clc");
    assert_eq!(err.message(), "'{' was not closed!");
  }

  #[test]
  fn directives() {
    assert!(parse(lex("#include \"lib.clc\"\n#test\nint main() { }"), &CLC).is_ok());

    let err = parse_err("#pragma once");
    assert_eq!(err.kind(), ErrorKind::Directive);
    assert_eq!(err.message(), "Compiler command \"#pragma\" not found");

    let err = parse_err("int main() { }\n#include");
    assert_eq!(err.kind(), ErrorKind::Directive);
    assert_eq!(err.line(), 2);
  }

  #[test]
  fn top_level_items() {
    let err = parse_err("x = 3;");
    assert_eq!(err.message(), "Unexpected expression: \"x\"");

    let program = parse(lex("int g = 4;\nint[] t = [8];\nint main() { return g; }"), &CLC).unwrap();
    assert_eq!(program.functions.len(), 1);
    assert_eq!(program.expressions.len(), 2);
  }

  #[test]
  fn array_declarations() {
    let tokens = lex("int[] a = [3];");
    let mut validator = Validator::new(&tokens, &CLC);
    validator.scopes.push();
    assert_eq!(validator.array_decl(0, tokens.len()).unwrap(), 9);
    assert!(validator.scopes.is_array("a"));

    let tokens = lex("int[] b = {1, 2, 3};");
    let mut validator = Validator::new(&tokens, &CLC);
    validator.scopes.push();
    assert_eq!(validator.array_decl(0, tokens.len()).unwrap(), 14);
  }

  #[test]
  fn malformed_array_values() {
    let err = parse_err("int main() { int[] a = {1, 2,}; }");
    assert_eq!(err.message(), "Array values must not end with ','.");

    let err = parse_err("int main() { int[] a = {}; }");
    assert_eq!(err.message(), "Array declaration values missing.");

    let err = parse_err("int main() { int[] a = {1 2}; }");
    assert_eq!(err.message(), "Expected ',' got: '2'");

    let err = parse_err("int main() { int[] a = [x]; }");
    assert_eq!(err.message(), "Expected number got: 'x'");

    let err = parse_err("int main() { int[] a = 3; }");
    assert_eq!(err.message(), "Expected: '{' or '[' after '='.");
  }

  #[test]
  fn function_headers() {
    let program = parse(
      lex("void f(int a, string s) { }\nint main() { f(1, 2); }"),
      &CLC,
    )
    .unwrap();
    assert_eq!(program.functions[0].name, "f");
    assert_eq!(program.functions[0].return_type, ReturnType::Void);
    assert_eq!(
      program.functions[0].params,
      vec![(VarType::Int, "a".to_string()), (VarType::Str, "s".to_string())]
    );

    let err = parse_err("int f(x a) { }");
    assert_eq!(err.message(), "Expected variable type, got: \"x\"");

    let err = parse_err("int f(int a,) { }");
    assert_eq!(err.message(), "Expected variable type after ','");

    let err = parse_err("int f(int a b) { }");
    assert_eq!(
      err.message(),
      "Expected ')' or ',' after variable name, got: \"b\""
    );

    let err = parse_err("int f() return 1;");
    assert_eq!(
      err.message(),
      "Expected \"{\" after function definition, got: \"return\"."
    );

    let err = parse_err("int f() { }\nint f() { }");
    assert_eq!(err.message(), "Function \"f\" is already defined.");
    assert_eq!(err.line(), 2);
  }

  #[test]
  fn calls_to_names_defined_elsewhere() {
    let program = parse(lex("int main() { ext(1); return 0; }"), &CLC).unwrap();
    assert_eq!(program.expressions[0].site, Site::Call);
    assert_eq!(
      program.expressions[0].postfix,
      vec![
        Instr::CallStart("ext".to_string()),
        Instr::Arg(0),
        Instr::Int(1),
        Instr::CallEnd,
      ]
    );

    let program = parse(lex("int main() { g(1, h(2)); }\nint g(int a, int b) { }\nint h(int c) { }"), &CLC).unwrap();
    assert_eq!(program.expressions.len(), 1);
    assert_eq!(program.expressions[0].postfix[0], Instr::CallStart("g".to_string()));
  }

  #[test]
  fn call_names_must_not_be_type_names() {
    let err = parse_err("int main() { int x = string(1); }");
    assert_eq!(err.message(), "Not a valid function name: \"string\".");
  }

  #[test]
  fn call_arguments() {
    let err = parse_err("int f(int a, int b) { }\nint main() { f(1,); }");
    assert_eq!(err.message(), "Missing argument.");

    let err = parse_err("int f(int a) { }\nint main() { f(1 +); }");
    assert_eq!(err.message(), "\"+\" cannot stand alone.");
  }

  #[test]
  fn indexed_names_must_be_arrays() {
    let err = parse_err("int main() { int x = 1; x[0] = 2; }");
    assert_eq!(err.message(), "\"x\" is not an array.");

    let err = parse_err("int main() { int y = x[0]; }");
    assert_eq!(err.message(), "\"x\" is not an array.");

    let program = parse(lex("int main() { int[] a = [4]; a[1 + 1] = a[0] * 2; }"), &CLC).unwrap();
    let sites: Vec<Site> = program.expressions.iter().map(|e| e.site).collect();
    assert_eq!(sites, vec![Site::ArrayIndex, Site::ArrayValue]);
  }

  #[test]
  fn array_scope_ends_with_its_block() {
    let err = parse_err("int main() { if (1) { int[] a = [2]; } a[0] = 1; }");
    assert_eq!(err.message(), "\"a\" is not an array.");
  }

  #[test]
  fn invalid_tokens_are_reported() {
    let err = parse_err("int main() { int x = 1a; }");
    assert_eq!(err.message(), "Cannot read \"1a\".");
  }

  #[test]
  fn statements_stay_inside_their_block() {
    let err = parse_err("int main() { x = 1 }\nint y = 2;");
    assert_eq!(err.message(), "No closing ';' found for \"x\".");
    assert_eq!(err.line(), 1);
  }

  #[test]
  fn unknown_statement() {
    let err = parse_err("int main() { 5 = x; }");
    assert_eq!(err.message(), "Cannot parse statement: \"5\"");

    let err = parse_err("int main() { x; }");
    assert_eq!(err.message(), "Cannot parse statement: \"x\"");
  }

  #[test]
  fn expressions_are_recorded_in_program_order() {
    let program = parse(
      lex("int sq(int n) { return n * n; }\nint main() { int a = sq(3); while (a > 0) { a = a - 1; } return a; }"),
      &CLC,
    )
    .unwrap();
    let sites: Vec<Site> = program.expressions.iter().map(|e| e.site).collect();
    assert_eq!(
      sites,
      vec![
        Site::Return,
        Site::VarInit,
        Site::Condition,
        Site::Assign,
        Site::Return
      ]
    );
    assert_eq!(program.source_text(&program.expressions[1]), "sq ( 3 )");
    assert_eq!(program.location(&program.expressions[1]).map(|t| t.line), Some(2));
  }
}
