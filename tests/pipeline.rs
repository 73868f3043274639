//! End-to-end checks: compile YB sources and inspect the emitted assembly.
//!
//! The suite does not assemble or run the output, so each scenario asserts
//! the instruction sequence structurally – the mnemonics must appear in
//! program order and control-flow labels must pair up.

use ybc::generate_assembly;

fn compile(source: &str) -> String {
  generate_assembly(source).unwrap()
}

/// Assert that every needle occurs in the assembly, in the given order.
fn assert_ordered(asm: &str, needles: &[&str]) {
  let mut pos = 0;
  for needle in needles {
    match asm[pos..].find(needle) {
      Some(at) => pos += at + needle.len(),
      None => panic!("missing `{needle}` after byte {pos} in:\n{asm}"),
    }
  }
}

#[test]
fn exit_with_constant_status() {
  let asm = compile("exit(42);");
  assert_ordered(
    &asm,
    &[
      "global _start",
      "section .text",
      "_start:",
      "push rbp",
      "mov rbp, rsp",
      "mov rax, 42",
      "mov rdi, rax",
      "mov rax, 60",
      "syscall",
    ],
  );
}

#[test]
fn exit_with_sum_of_two_locals() {
  let asm = compile("let x = 10; let y = 32; exit(x + y);");
  assert_ordered(
    &asm,
    &[
      "mov rax, 10",
      "sub rsp, 8",
      "mov [rbp - 8], rax",
      "mov rax, 32",
      "sub rsp, 8",
      "mov [rbp - 16], rax",
      // the right operand is evaluated first and parked on the stack
      "mov rax, [rbp - 16]",
      "push rax",
      "mov rax, [rbp - 8]",
      "pop rbx",
      "add rax, rbx",
      "mov rdi, rax",
      "mov rax, 60",
      "syscall",
    ],
  );
}

#[test]
fn while_loop_counts_to_five() {
  let asm = compile("let i = 0; while (i < 5) { i = i + 1; } exit(i);");
  assert_ordered(
    &asm,
    &[
      "while_start_0:",
      "mov rax, 5",
      "push rax",
      "mov rax, [rbp - 8]",
      "pop rbx",
      "cmp rax, rbx",
      "setl al",
      "movzx rax, al",
      "cmp rax, 0",
      "je while_end_0",
      "add rax, rbx",
      "mov [rbp - 8], rax",
      "jmp while_start_0",
      "while_end_0:",
      "mov rax, [rbp - 8]",
      "mov rdi, rax",
    ],
  );
}

#[test]
fn array_element_access() {
  let asm = compile("let a = [10, 20, 30]; exit(a[1]);");
  assert_ordered(
    &asm,
    &[
      "mov rax, 9",
      "mov rsi, 32",
      "mov rdx, 3",
      "mov r10, 34",
      "mov r8, -1",
      "syscall",
      "push rax",
      "mov qword [rax], 3",
      "mov [rbx + 8], rax",
      "mov [rbx + 16], rax",
      "mov [rbx + 24], rax",
      "pop rax",
      "mov [rbp - 8], rax",
      // a[1]: base, then index scaled past the length slot
      "mov rax, [rbp - 8]",
      "push rax",
      "mov rax, 1",
      "add rax, 1",
      "imul rax, 8",
      "pop rbx",
      "add rbx, rax",
      "mov rax, [rbx]",
      "mov rdi, rax",
    ],
  );
}

#[test]
fn len_reads_the_count_slot() {
  let asm = compile("let a = [1, 2, 3]; exit(len(a));");
  assert_ordered(
    &asm,
    &[
      "mov qword [rax], 3",
      "mov [rbp - 8], rax",
      "mov rax, [rbp - 8]",
      "mov rax, [rax]",
      "mov rdi, rax",
    ],
  );
}

#[test]
fn branching_print() {
  let asm = compile("let n = 7; if (n > 5) { print(n); } else { print(0); } exit(0);");
  assert_ordered(
    &asm,
    &[
      "mov rax, 7",
      "mov [rbp - 8], rax",
      "setg al",
      "cmp rax, 0",
      "je if_else_0",
      "print_positive_0:",
      "convert_loop_0:",
      "jmp if_end_0",
      "if_else_0:",
      "print_positive_1:",
      "convert_loop_1:",
      "if_end_0:",
      "mov rax, 0",
      "mov rdi, rax",
      "mov rax, 60",
    ],
  );
  // write(1, buf, len) inside the print routine
  assert_ordered(&asm, &["mov rax, 1", "mov rdi, 1", "syscall"]);
}

#[test]
fn empty_program_is_just_the_default_exit() {
  let asm = compile("");
  assert_ordered(
    &asm,
    &[
      "global _start",
      "_start:",
      "push rbp",
      "mov rbp, rsp",
      "mov rax, 60",
      "mov rdi, 0",
      "syscall",
    ],
  );
  assert_eq!(asm.matches("syscall").count(), 1);
}

#[test]
fn empty_array_length_is_zero() {
  let asm = compile("exit(len([]));");
  assert_ordered(
    &asm,
    &["mov rsi, 8", "mov qword [rax], 0", "pop rax", "mov rax, [rax]", "mov rdi, rax"],
  );
}

#[test]
fn shadowed_variable_wins_in_inner_scope() {
  let asm = compile("let x = 1; { let x = 2; exit(x); }");
  assert_ordered(
    &asm,
    &[
      "mov rax, 1",
      "mov [rbp - 8], rax",
      "mov rax, 2",
      "mov [rbp - 16], rax",
      "mov rax, [rbp - 16]",
      "mov rdi, rax",
    ],
  );
}

#[test]
fn comments_do_not_reach_the_output() {
  let asm = compile("/* a */ let x = 1; // b\n exit(x);");
  assert_ordered(&asm, &["mov rax, 1", "mov [rbp - 8], rax", "mov rax, [rbp - 8]"]);
  assert!(!asm.contains("; warning"));
}

#[test]
fn unterminated_comment_warning_reaches_the_output() {
  let asm = compile("exit(1); /* open");
  assert!(asm.starts_with("; warning: unterminated block comment\n"));
  assert_ordered(&asm, &["mov rax, 1", "mov rdi, rax"]);
}

#[test]
fn parse_errors_abort_compilation() {
  assert!(generate_assembly("exit(;").is_err());
  assert!(generate_assembly("let = 3;").is_err());
  assert!(generate_assembly("while (1) exit(0);").is_err());
}

#[test]
fn parse_error_names_the_missing_token() {
  let err = generate_assembly("exit(1)").unwrap_err();
  assert!(err.to_string().contains("expected ';'"));
}

#[test]
fn every_label_is_defined_exactly_once() {
  let asm = compile(
    "let i = 0;\n\
     while (i < 3) {\n\
       if (i % 2 == 0) { print(i); } else { print(0 - i); }\n\
       i = i + 1;\n\
     }\n\
     exit(0);",
  );
  for (prefix, count) in [
    ("while_start_", 1),
    ("while_end_", 1),
    ("if_else_", 1),
    ("if_end_", 1),
    ("print_positive_", 2),
    ("convert_loop_", 2),
  ] {
    let defined = asm
      .lines()
      .filter(|line| line.starts_with(prefix) && line.ends_with(':'))
      .count();
    assert_eq!(defined, count, "definitions of {prefix}* labels");
  }
}

#[test]
fn nested_blocks_balance_the_stack() {
  let asm = compile("{ let a = 1; { let b = 2; let c = 3; } let d = 4; }");
  // inner block frees two slots, outer block frees its own two
  assert_ordered(&asm, &["add rsp, 16", "add rsp, 16"]);
  assert_eq!(asm.matches("sub rsp, 8").count(), 4);
}
