//! Recursive-descent parser producing a statement list and expression AST.
//!
//! The parser keeps the classic single-pass structure: statement dispatch on
//! the leading token, a precedence-climbing ladder for expressions, and a
//! thin `TokenStream` cursor with one token of lookahead (two for the
//! identifier-led statements). The first error aborts the parse and is
//! reported with the offending source location.

use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{describe_token, token_text, Token, TokenKind};

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  And,
  Or,
}

/// Expression tree produced by the parser. Nodes own their children
/// exclusively; the tree is immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  /// Non-negative decimal integer literal.
  Num(i64),
  /// Reference to an identifier, resolved lexically at code generation.
  Var(String),
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  /// Array literal; evaluates to a heap pointer whose slot 0 holds the
  /// element count.
  Array(Vec<Expr>),
  Index {
    base: Box<Expr>,
    index: Box<Expr>,
  },
  /// `len(expr)` – the first machine word at the array's base address.
  Len(Box<Expr>),
}

impl Expr {
  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn index(base: Expr, index: Expr) -> Self {
    Self::Index {
      base: Box::new(base),
      index: Box::new(index),
    }
  }

  pub fn len(operand: Expr) -> Self {
    Self::Len(Box::new(operand))
  }
}

/// Statements of the language. `If` and `While` branches are always
/// `Block`s; the parser enforces this shape so the code generator can treat
/// every branch as a fresh lexical scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
  Exit(Expr),
  Let { name: String, value: Expr },
  Assign { name: String, value: Expr },
  IndexAssign { name: String, index: Expr, value: Expr },
  Block(Vec<Stmt>),
  If {
    cond: Expr,
    then_branch: Box<Stmt>,
    else_branch: Option<Box<Stmt>>,
  },
  While { cond: Expr, body: Box<Stmt> },
  Print(Expr),
}

/// Ordered list of top-level statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
  pub stmts: Vec<Stmt>,
}

/// Parse a token stream into a program. An empty stream yields an empty
/// program; the code generator supplies the default exit in that case.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens, source);

  let mut stmts = Vec::new();
  while !stream.is_eof() {
    stmts.push(parse_stmt(&mut stream)?);
  }

  Ok(Program { stmts })
}

// ----- Statement parsing -----
fn parse_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  match stream.peek_kind() {
    Some(TokenKind::Exit) => parse_exit_stmt(stream),
    Some(TokenKind::Let) => parse_let_stmt(stream),
    Some(TokenKind::If) => parse_if_stmt(stream),
    Some(TokenKind::While) => parse_while_stmt(stream),
    Some(TokenKind::Print) => parse_print_stmt(stream),
    Some(TokenKind::LBrace) => parse_block(stream),
    Some(TokenKind::Ident) => parse_ident_stmt(stream),
    Some(TokenKind::Else) => Err(CompileError::at(
      stream.source,
      stream.current_loc(),
      "unexpected 'else' without a matching 'if'",
    )),
    _ => Err(CompileError::at(
      stream.source,
      stream.current_loc(),
      format!(
        "expected a statement, but got \"{}\"",
        stream.describe_current()
      ),
    )),
  }
}

fn parse_exit_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  stream.skip(TokenKind::Exit)?;
  stream.skip(TokenKind::LParen)?;
  let expr = parse_expr(stream)?;
  stream.skip(TokenKind::RParen)?;
  stream.skip(TokenKind::Semicolon)?;
  Ok(Stmt::Exit(expr))
}

fn parse_let_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  stream.skip(TokenKind::Let)?;
  let (name, _) = stream.get_ident()?;
  stream.skip(TokenKind::Assign)?;
  let value = parse_expr(stream)?;
  stream.skip(TokenKind::Semicolon)?;
  Ok(Stmt::Let { name, value })
}

fn parse_print_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  stream.skip(TokenKind::Print)?;
  stream.skip(TokenKind::LParen)?;
  let expr = parse_expr(stream)?;
  stream.skip(TokenKind::RParen)?;
  stream.skip(TokenKind::Semicolon)?;
  Ok(Stmt::Print(expr))
}

fn parse_block(stream: &mut TokenStream) -> CompileResult<Stmt> {
  stream.skip(TokenKind::LBrace)?;
  let mut stmts = Vec::new();
  loop {
    if stream.equal(TokenKind::RBrace) {
      break;
    }
    if stream.is_eof() {
      return Err(CompileError::at(
        stream.source,
        stream.source.len(),
        "expected '}'",
      ));
    }
    stmts.push(parse_stmt(stream)?);
  }
  Ok(Stmt::Block(stmts))
}

fn parse_if_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  stream.skip(TokenKind::If)?;
  stream.skip(TokenKind::LParen)?;
  let cond = parse_expr(stream)?;
  stream.skip(TokenKind::RParen)?;
  let then_branch = Box::new(parse_block(stream)?);
  let else_branch = if stream.equal(TokenKind::Else) {
    // `else if` re-enters the if parser; the nested if is wrapped in a
    // one-statement block so both branches have block shape
    if matches!(stream.peek_kind(), Some(TokenKind::If)) {
      let nested = parse_if_stmt(stream)?;
      Some(Box::new(Stmt::Block(vec![nested])))
    } else {
      Some(Box::new(parse_block(stream)?))
    }
  } else {
    None
  };

  Ok(Stmt::If {
    cond,
    then_branch,
    else_branch,
  })
}

fn parse_while_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  stream.skip(TokenKind::While)?;
  stream.skip(TokenKind::LParen)?;
  let cond = parse_expr(stream)?;
  stream.skip(TokenKind::RParen)?;
  let body = Box::new(parse_block(stream)?);

  Ok(Stmt::While { cond, body })
}

/// An identifier opens either an assignment or an index assignment; the
/// token after it decides which.
fn parse_ident_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let (name, _) = stream.get_ident()?;
  match stream.peek_kind() {
    Some(TokenKind::Assign) => {
      stream.skip(TokenKind::Assign)?;
      let value = parse_expr(stream)?;
      stream.skip(TokenKind::Semicolon)?;
      Ok(Stmt::Assign { name, value })
    }
    Some(TokenKind::LBracket) => {
      stream.skip(TokenKind::LBracket)?;
      let index = parse_expr(stream)?;
      stream.skip(TokenKind::RBracket)?;
      stream.skip(TokenKind::Assign)?;
      let value = parse_expr(stream)?;
      stream.skip(TokenKind::Semicolon)?;
      Ok(Stmt::IndexAssign { name, index, value })
    }
    _ => Err(CompileError::at(
      stream.source,
      stream.current_loc(),
      format!("expected '=' or '[' after identifier '{name}'"),
    )),
  }
}

// ----- Expression parsing -----
// The ladder runs lowest to highest precedence: || then && then the
// comparison operators, then + -, then * / %. Every level is a
// left-associative loop over its operator set.
fn parse_expr(stream: &mut TokenStream) -> CompileResult<Expr> {
  parse_logical_or(stream)
}

fn parse_logical_or(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_logical_and(stream)?;

  while stream.equal(TokenKind::Or) {
    let rhs = parse_logical_and(stream)?;
    node = Expr::binary(BinaryOp::Or, node, rhs);
  }

  Ok(node)
}

fn parse_logical_and(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_comparison(stream)?;

  while stream.equal(TokenKind::And) {
    let rhs = parse_comparison(stream)?;
    node = Expr::binary(BinaryOp::And, node, rhs);
  }

  Ok(node)
}

fn parse_comparison(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_additive(stream)?;

  loop {
    let op = match stream.peek_kind() {
      Some(TokenKind::Eq) => BinaryOp::Eq,
      Some(TokenKind::Ne) => BinaryOp::Ne,
      Some(TokenKind::Lt) => BinaryOp::Lt,
      Some(TokenKind::Le) => BinaryOp::Le,
      Some(TokenKind::Gt) => BinaryOp::Gt,
      Some(TokenKind::Ge) => BinaryOp::Ge,
      _ => break,
    };

    stream.advance();
    let rhs = parse_additive(stream)?;
    node = Expr::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_additive(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_multiplicative(stream)?;

  loop {
    let op = match stream.peek_kind() {
      Some(TokenKind::Plus) => BinaryOp::Add,
      Some(TokenKind::Minus) => BinaryOp::Sub,
      _ => break,
    };

    stream.advance();
    let rhs = parse_multiplicative(stream)?;
    node = Expr::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_multiplicative(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_primary(stream)?;

  loop {
    let op = match stream.peek_kind() {
      Some(TokenKind::Star) => BinaryOp::Mul,
      Some(TokenKind::Slash) => BinaryOp::Div,
      Some(TokenKind::Percent) => BinaryOp::Mod,
      _ => break,
    };

    stream.advance();
    let rhs = parse_primary(stream)?;
    node = Expr::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_primary(stream: &mut TokenStream) -> CompileResult<Expr> {
  match stream.peek_kind() {
    Some(TokenKind::Num) => {
      let (value, _) = stream.get_number()?;
      Ok(Expr::Num(value))
    }
    Some(TokenKind::Ident) => {
      let (name, _) = stream.get_ident()?;
      if stream.equal(TokenKind::LBracket) {
        let index = parse_expr(stream)?;
        stream.skip(TokenKind::RBracket)?;
        Ok(Expr::index(Expr::Var(name), index))
      } else {
        Ok(Expr::Var(name))
      }
    }
    Some(TokenKind::Len) => {
      stream.advance();
      stream.skip(TokenKind::LParen)?;
      let operand = parse_expr(stream)?;
      stream.skip(TokenKind::RParen)?;
      Ok(Expr::len(operand))
    }
    Some(TokenKind::LParen) => {
      stream.advance();
      let node = parse_expr(stream)?;
      stream.skip(TokenKind::RParen)?;
      Ok(node)
    }
    Some(TokenKind::LBracket) => parse_array_literal(stream),
    _ => Err(CompileError::at(
      stream.source,
      stream.current_loc(),
      format!(
        "expected an expression, but got \"{}\"",
        stream.describe_current()
      ),
    )),
  }
}

fn parse_array_literal(stream: &mut TokenStream) -> CompileResult<Expr> {
  stream.skip(TokenKind::LBracket)?;
  let mut elements = Vec::new();
  if !stream.equal(TokenKind::RBracket) {
    loop {
      elements.push(parse_expr(stream)?);
      if stream.equal(TokenKind::Comma) {
        continue;
      }
      break;
    }
    stream.skip(TokenKind::RBracket)?;
  }
  Ok(Expr::Array(elements))
}

/// Lightweight cursor over the token vector.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser advances `pos` as it
  /// consumes input.
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn peek_kind(&self) -> Option<TokenKind> {
    self.peek().map(|token| token.kind)
  }

  fn advance(&mut self) {
    self.pos += 1;
  }

  fn current_loc(&self) -> usize {
    self
      .tokens
      .get(self.pos)
      .map(|token| token.loc)
      .unwrap_or(self.source.len())
  }

  fn describe_current(&self) -> String {
    describe_token(self.peek(), self.source)
  }

  /// Consume the current token if it has the given kind.
  fn equal(&mut self, kind: TokenKind) -> bool {
    if self.peek_kind() == Some(kind) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, kind: TokenKind) -> CompileResult<()> {
    if self.equal(kind) {
      Ok(())
    } else {
      Err(CompileError::at(
        self.source,
        self.current_loc(),
        format!(
          "expected '{}', but got \"{}\"",
          kind.spelling(),
          self.describe_current()
        ),
      ))
    }
  }

  /// Parse the current token as an integer literal, returning its value and
  /// location. The lexeme is converted here so an out-of-range literal is a
  /// parse error rather than a lexer failure.
  fn get_number(&mut self) -> CompileResult<(i64, usize)> {
    if let Some(token) = self.tokens.get(self.pos) {
      if token.kind == TokenKind::Num {
        let text = token_text(token, self.source);
        let loc = token.loc;
        let value = text.parse::<i64>().map_err(|err| {
          CompileError::at(self.source, loc, format!("invalid number '{text}': {err}"))
        })?;
        self.pos += 1;
        return Ok((value, loc));
      }
    }

    Err(CompileError::at(
      self.source,
      self.current_loc(),
      format!(
        "expected a number, but got \"{}\"",
        self.describe_current()
      ),
    ))
  }

  /// Parse the current token as an identifier.
  fn get_ident(&mut self) -> CompileResult<(String, usize)> {
    if let Some(token) = self.tokens.get(self.pos) {
      if token.kind == TokenKind::Ident {
        let text = token_text(token, self.source).to_string();
        let loc = token.loc;
        self.pos += 1;
        return Ok((text, loc));
      }
    }

    Err(CompileError::at(
      self.source,
      self.current_loc(),
      format!(
        "expected an identifier, but got \"{}\"",
        self.describe_current()
      ),
    ))
  }

  fn is_eof(&self) -> bool {
    self.pos >= self.tokens.len()
  }
}
