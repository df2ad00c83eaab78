//! The fixed type system: variable and return types.

use crate::lang::Language;
use crate::tokenizer::Token;

/// Type of a variable, parameter or array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
  Int,
  /// Parsed but not backed by any value support yet.
  Str,
}

impl VarType {
  pub fn from_token(token: &Token, lang: &Language) -> Option<Self> {
    if !lang.is_var_type(&token.text) {
      return None;
    }
    match token.text.as_str() {
      "int" => Some(Self::Int),
      "string" => Some(Self::Str),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
  Int,
  Void,
}

impl ReturnType {
  pub fn from_token(token: &Token, lang: &Language) -> Option<Self> {
    if !lang.is_return_type(&token.text) {
      return None;
    }
    match token.text.as_str() {
      "int" => Some(Self::Int),
      "void" => Some(Self::Void),
      _ => None,
    }
  }
}

/// Declared shape of a function, collected before bodies are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
  pub name: String,
  pub return_type: ReturnType,
  pub params: Vec<(VarType, String)>,
}
