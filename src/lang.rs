//! Fixed tables describing the clc language.
//!
//! All stages read from one immutable [`Language`] value instead of global
//! lists, so a caller can hand a different table set to a whole compilation.

use crate::postfix::BinaryOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
  /// Signs in matching order: multi-character signs come first.
  pub signs: &'static [&'static str],
  pub keywords: &'static [&'static str],
  pub var_types: &'static [&'static str],
  pub return_types: &'static [&'static str],
  pub directives: &'static [&'static str],
  /// Substring of a cleaned line that marks the entry file.
  pub entry_marker: &'static str,
}

pub const CLC: Language = Language {
  signs: &[
    "==", "!=", "<=", ">=", "{", "}", "[", "]", "(", ")", ",", ";", "+", "-", "*", "/", "<", ">",
    "=",
  ],
  keywords: &["int", "void", "return", "while", "if", "else"],
  var_types: &["int", "string"],
  return_types: &["int", "void"],
  directives: &["include", "test"],
  entry_marker: "int main()",
};

impl Default for Language {
  fn default() -> Self {
    CLC
  }
}

impl Language {
  /// Binding strength of a binary operator; higher binds tighter.
  pub fn precedence(&self, op: BinaryOp) -> u8 {
    match op {
      BinaryOp::Eq | BinaryOp::Ne => 9,
      BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => 10,
      BinaryOp::Add | BinaryOp::Sub => 11,
      BinaryOp::Mul | BinaryOp::Div => 12,
    }
  }

  pub fn is_var_type(&self, text: &str) -> bool {
    self.var_types.contains(&text)
  }

  pub fn is_return_type(&self, text: &str) -> bool {
    self.return_types.contains(&text)
  }

  pub fn is_directive(&self, command: &str) -> bool {
    self.directives.contains(&command)
  }

  /// First sign that starts `rest`, if any.
  pub fn sign_at(&self, rest: &str) -> Option<&'static str> {
    self.signs.iter().copied().find(|sign| rest.starts_with(sign))
  }

  /// Keyword at the start of `rest` that is not glued to a longer name.
  pub fn keyword_at(&self, rest: &str) -> Option<&'static str> {
    self.keywords.iter().copied().find(|keyword| {
      rest.starts_with(keyword)
        && !rest[keyword.len()..]
          .chars()
          .next()
          .is_some_and(is_ident_char)
    })
  }
}

pub fn is_ident_start(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_' || c == '$'
}

pub fn is_ident_char(c: char) -> bool {
  is_ident_start(c) || c.is_ascii_digit()
}

/// `[A-Za-z_$][A-Za-z_$0-9]*`
pub fn is_identifier(text: &str) -> bool {
  let mut chars = text.chars();
  chars.next().is_some_and(is_ident_start) && chars.all(is_ident_char)
}

/// Nonempty run of decimal digits.
pub fn is_number(text: &str) -> bool {
  !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}
