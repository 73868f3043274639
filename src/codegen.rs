//! Code generation: lower the parsed AST into NASM x86-64 assembly.
//!
//! The emitter uses a simple stack machine: `rax` carries every expression
//! result, binary operands travel through the hardware stack, and locals
//! live in 8-byte slots addressed relative to `rbp`. The emitted program is
//! freestanding – it defines `_start`, needs no runtime library, and talks
//! to the kernel through raw syscalls (`write`, `mmap`, `exit`).
//!
//! Generation never fails. Unresolved identifiers are reported as `;`
//! comments in the output with a zero default, and lexer warnings are
//! replayed as leading comment lines.

use crate::parser::{BinaryOp, Expr, Program, Stmt};
use std::collections::HashMap;

const SLOT_SIZE: i64 = 8;

/// Scratch window reserved on the stack by the inline print routine. Large
/// enough for 19 digits, a sign and the trailing newline.
const PRINT_BUF_SIZE: i64 = 32;

/// Emit a complete assembly module for the program.
pub fn generate(program: &Program, warnings: &[String]) -> String {
  let mut gen = Codegen::new();

  for warning in warnings {
    gen.asm.push_str(&format!("; warning: {warning}\n"));
  }
  gen.asm.push_str("global _start\n");
  gen.asm.push_str("section .text\n");
  gen.asm.push_str("_start:\n");
  gen.emit("push rbp");
  gen.emit("mov rbp, rsp");

  gen.scopes.push(HashMap::new());
  let mut saw_exit = false;
  for stmt in &program.stmts {
    if matches!(stmt, Stmt::Exit(_)) {
      saw_exit = true;
    }
    gen.emit_stmt(stmt);
  }
  gen.scopes.pop();

  // a program without a top-level exit still terminates cleanly
  if !saw_exit {
    gen.emit("mov rax, 60");
    gen.emit("mov rdi, 0");
    gen.emit("syscall");
  }

  gen.asm
}

struct Codegen {
  asm: String,
  /// Innermost scope last; lookups walk the stack back to front.
  scopes: Vec<HashMap<String, i64>>,
  /// Total bytes currently allocated below `rbp` for locals.
  stack_offset: i64,
  if_count: usize,
  while_count: usize,
  print_count: usize,
}

impl Codegen {
  fn new() -> Self {
    Self {
      asm: String::new(),
      scopes: Vec::new(),
      stack_offset: 0,
      if_count: 0,
      while_count: 0,
      print_count: 0,
    }
  }

  fn emit(&mut self, line: &str) {
    self.asm.push_str("    ");
    self.asm.push_str(line);
    self.asm.push('\n');
  }

  fn emit_label(&mut self, name: &str) {
    self.asm.push_str(name);
    self.asm.push_str(":\n");
  }

  fn comment(&mut self, text: &str) {
    self.emit(&format!("; {text}"));
  }

  /// Walk the scope stack innermost-to-outermost for a binding.
  fn resolve(&self, name: &str) -> Option<i64> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.get(name).copied())
  }

  fn innermost_binding(&self, name: &str) -> Option<i64> {
    self.scopes.last().and_then(|scope| scope.get(name)).copied()
  }

  fn bind_local(&mut self, name: &str) -> i64 {
    self.stack_offset += SLOT_SIZE;
    if let Some(scope) = self.scopes.last_mut() {
      scope.insert(name.to_string(), self.stack_offset);
    }
    self.stack_offset
  }

  fn emit_stmt(&mut self, stmt: &Stmt) {
    match stmt {
      Stmt::Exit(expr) => {
        self.emit_expr(expr);
        self.emit("mov rdi, rax");
        self.emit("mov rax, 60");
        self.emit("syscall");
      }
      Stmt::Let { name, value } => {
        self.emit_expr(value);
        // re-declaring a name in the same scope rebinds the existing slot
        let offset = match self.innermost_binding(name) {
          Some(offset) => offset,
          None => {
            let offset = self.bind_local(name);
            self.emit("sub rsp, 8");
            offset
          }
        };
        self.emit(&format!("mov [rbp - {offset}], rax"));
      }
      Stmt::Assign { name, value } => {
        self.emit_expr(value);
        match self.resolve(name) {
          Some(offset) => self.emit(&format!("mov [rbp - {offset}], rax")),
          None => self.comment(&format!("unresolved identifier '{name}'")),
        }
      }
      Stmt::IndexAssign { name, index, value } => {
        self.emit_expr(value);
        self.emit("push rax");
        self.emit_var_load(name);
        self.emit("push rax");
        self.emit_expr(index);
        // slot 0 holds the length; elements start at slot 1
        self.emit("add rax, 1");
        self.emit("imul rax, 8");
        self.emit("pop rbx");
        self.emit("add rbx, rax");
        self.emit("pop rax");
        self.emit("mov [rbx], rax");
      }
      Stmt::Block(stmts) => {
        let initial = self.stack_offset;
        self.scopes.push(HashMap::new());
        for stmt in stmts {
          self.emit_stmt(stmt);
        }
        let reclaimed = self.stack_offset - initial;
        if reclaimed > 0 {
          self.emit(&format!("add rsp, {reclaimed}"));
        }
        self.stack_offset = initial;
        self.scopes.pop();
      }
      Stmt::If {
        cond,
        then_branch,
        else_branch,
      } => {
        let n = self.if_count;
        self.if_count += 1;
        self.emit_expr(cond);
        self.emit("cmp rax, 0");
        match else_branch {
          Some(else_branch) => {
            self.emit(&format!("je if_else_{n}"));
            self.emit_stmt(then_branch);
            self.emit(&format!("jmp if_end_{n}"));
            self.emit_label(&format!("if_else_{n}"));
            self.emit_stmt(else_branch);
          }
          None => {
            self.emit(&format!("je if_end_{n}"));
            self.emit_stmt(then_branch);
          }
        }
        self.emit_label(&format!("if_end_{n}"));
      }
      Stmt::While { cond, body } => {
        let n = self.while_count;
        self.while_count += 1;
        self.emit_label(&format!("while_start_{n}"));
        self.emit_expr(cond);
        self.emit("cmp rax, 0");
        self.emit(&format!("je while_end_{n}"));
        self.emit_stmt(body);
        self.emit(&format!("jmp while_start_{n}"));
        self.emit_label(&format!("while_end_{n}"));
      }
      Stmt::Print(expr) => {
        self.emit_expr(expr);
        self.emit_print();
      }
    }
  }

  /// Emit stack-based code for a single expression node. The result always
  /// lands in `rax` and the hardware stack is left balanced.
  fn emit_expr(&mut self, expr: &Expr) {
    match expr {
      Expr::Num(value) => {
        self.emit(&format!("mov rax, {value}"));
      }
      Expr::Var(name) => {
        self.emit_var_load(name);
      }
      Expr::Binary { op, lhs, rhs } => {
        // right operand first, parked on the stack, so the left operand
        // ends up in rax ready for the operation
        self.emit_expr(rhs);
        self.emit("push rax");
        self.emit_expr(lhs);
        self.emit("pop rbx");
        self.emit_binary_op(*op);
      }
      Expr::Array(elements) => {
        self.emit_array(elements);
      }
      Expr::Index { base, index } => {
        self.emit_expr(base);
        self.emit("push rax");
        self.emit_expr(index);
        self.emit("add rax, 1");
        self.emit("imul rax, 8");
        self.emit("pop rbx");
        self.emit("add rbx, rax");
        self.emit("mov rax, [rbx]");
      }
      Expr::Len(operand) => {
        self.emit_expr(operand);
        self.emit("mov rax, [rax]");
      }
    }
  }

  fn emit_var_load(&mut self, name: &str) {
    match self.resolve(name) {
      Some(offset) => self.emit(&format!("mov rax, [rbp - {offset}]")),
      None => {
        self.comment(&format!("unresolved identifier '{name}'"));
        self.emit("mov rax, 0");
      }
    }
  }

  /// Left operand in `rax`, right operand in `rbx`; result in `rax`.
  fn emit_binary_op(&mut self, op: BinaryOp) {
    match op {
      BinaryOp::Add => self.emit("add rax, rbx"),
      BinaryOp::Sub => self.emit("sub rax, rbx"),
      BinaryOp::Mul => self.emit("imul rax, rbx"),
      BinaryOp::Div => {
        // unsigned division; negative operands are outside the language
        self.emit("mov rcx, rbx");
        self.emit("mov rdx, 0");
        self.emit("div rcx");
      }
      BinaryOp::Mod => {
        self.emit("mov rcx, rbx");
        self.emit("mov rdx, 0");
        self.emit("div rcx");
        self.emit("mov rax, rdx");
      }
      BinaryOp::Eq => self.emit_compare("sete"),
      BinaryOp::Ne => self.emit_compare("setne"),
      BinaryOp::Lt => self.emit_compare("setl"),
      BinaryOp::Le => self.emit_compare("setle"),
      BinaryOp::Gt => self.emit_compare("setg"),
      BinaryOp::Ge => self.emit_compare("setge"),
      // bitwise on purpose: neither operator short-circuits
      BinaryOp::And => self.emit("and rax, rbx"),
      BinaryOp::Or => self.emit("or rax, rbx"),
    }
  }

  fn emit_compare(&mut self, setcc: &str) {
    self.emit("cmp rax, rbx");
    self.emit(&format!("{setcc} al"));
    self.emit("movzx rax, al");
  }

  /// Allocate an array on the heap and fill it. Layout: slot 0 holds the
  /// element count, slots 1..n the elements; the base pointer is the
  /// expression result.
  fn emit_array(&mut self, elements: &[Expr]) {
    let count = elements.len() as i64;
    // mmap(NULL, (count + 1) * 8, PROT_READ | PROT_WRITE,
    //      MAP_PRIVATE | MAP_ANONYMOUS, -1, 0)
    self.emit("mov rax, 9");
    self.emit("mov rdi, 0");
    self.emit(&format!("mov rsi, {}", (count + 1) * SLOT_SIZE));
    self.emit("mov rdx, 3");
    self.emit("mov r10, 34");
    self.emit("mov r8, -1");
    self.emit("mov r9, 0");
    self.emit("syscall");
    // the base pointer stays parked on the stack while the elements are
    // filled in; element expressions may clobber any register
    self.emit("push rax");
    self.emit(&format!("mov qword [rax], {count}"));
    for (i, element) in elements.iter().enumerate() {
      self.emit_expr(element);
      self.emit("mov rbx, [rsp]");
      self.emit(&format!("mov [rbx + {}], rax", (i as i64 + 1) * SLOT_SIZE));
    }
    self.emit("pop rax");
  }

  /// Convert the signed value in `rax` to decimal ASCII and write it to
  /// stdout with a trailing newline. Digits are assembled back to front in
  /// a scratch window carved out below `rsp`; the minus sign is written
  /// unconditionally one byte below the digits and the start pointer only
  /// moves onto it when the sign flag in `r9` is set.
  fn emit_print(&mut self) {
    let n = self.print_count;
    self.print_count += 1;
    self.emit(&format!("sub rsp, {PRINT_BUF_SIZE}"));
    self.emit(&format!("lea rsi, [rsp + {}]", PRINT_BUF_SIZE - 1));
    self.emit("mov byte [rsi], 10");
    self.emit("mov rcx, 10");
    self.emit("mov r9, 0");
    self.emit("cmp rax, 0");
    self.emit(&format!("jge print_positive_{n}"));
    self.emit("neg rax");
    self.emit("mov r9, 1");
    self.emit_label(&format!("print_positive_{n}"));
    self.emit_label(&format!("convert_loop_{n}"));
    self.emit("mov rdx, 0");
    self.emit("div rcx");
    self.emit("add rdx, 48");
    self.emit("dec rsi");
    self.emit("mov [rsi], dl");
    self.emit("cmp rax, 0");
    self.emit(&format!("jne convert_loop_{n}"));
    self.emit("mov byte [rsi - 1], 45");
    self.emit("sub rsi, r9");
    self.emit("mov rax, 1");
    self.emit("mov rdi, 1");
    self.emit(&format!("lea rdx, [rsp + {PRINT_BUF_SIZE}]"));
    self.emit("sub rdx, rsi");
    self.emit("syscall");
    self.emit(&format!("add rsp, {PRINT_BUF_SIZE}"));
  }
}
