use clc::{ErrorKind, Instr, Site, SourceSet, compile, listing, token_listing};

fn single(text: &str) -> SourceSet {
  SourceSet::new().with_file("main.clc", text)
}

#[test]
fn return_constant() {
  let program = compile(&single("int main() { return 0; }")).unwrap();
  assert_eq!(program.expressions.len(), 1);
  assert_eq!(program.expressions[0].site, Site::Return);
  assert_eq!(program.expressions[0].postfix, vec![Instr::Int(0)]);
}

#[test]
fn full_listing_format() {
  let program =
    compile(&single("int main() {\n  int x = 5 + ( 3 * 10 - 8 );\n  return x;\n}")).unwrap();
  assert_eq!(
    listing(&program),
    "# main.clc:2: 5 + ( 3 * 10 - 8 )\n\
     _IntVal_ 5\n\
     _IntVal_ 3\n\
     _IntVal_ 10\n\
     _Operator_ *\n\
     _IntVal_ 8\n\
     _Operator_ -\n\
     _Operator_ +\n\
     # = 27\n\
     # main.clc:3: x\n\
     _IntVar_ x\n"
  );
}

#[test]
fn whole_program_with_every_statement() {
  let src = "\
// globals
int limit = 10;
int[] table = {1, 2, 3};

int sum(int a, int b) {
  return a + b;
}

void tick() {
  return;
}

int main() {
  int i = 0;
  int[] buf = [4];
  while (i < limit) {
    if (i == 2) {
      buf[i] = sum(i, table[1]);
    } else if (i > 5) {
      tick();
    } else {
      i = i + 1;
    }
  }
  return -i;
}
";
  let program = compile(&single(src)).unwrap();
  let sites: Vec<Site> = program.expressions.iter().map(|e| e.site).collect();
  assert_eq!(
    sites,
    vec![
      Site::VarInit,
      Site::Return,
      Site::VarInit,
      Site::Condition,
      Site::Condition,
      Site::ArrayIndex,
      Site::ArrayValue,
      Site::Condition,
      Site::Call,
      Site::Assign,
      Site::Return,
    ]
  );
  assert_eq!(program.functions.len(), 3);

  let out = listing(&program);
  assert!(out.contains("_StartFunRet_ sum\n_FunArgument_ 0\n_IntVar_ i\n_FunArgument_ 1\n"));
  assert!(out.contains("_StartArrayVal_ table\n_IntVal_ 1\n_EndArrayVal_\n_EndFunRet_\n"));
  assert!(out.contains("_StartFunRet_ tick\n_EndFunRet_\n"));
}

#[test]
fn included_files_compile_first() {
  let sources = SourceSet::new()
    .with_file(
      "app/main.clc",
      "#include \"math.clc\"\nint main() {\n  return add(2, 3);\n}",
    )
    .with_file("app/math.clc", "int add(int a, int b) {\n  return a + b;\n}")
    .with_file("app/scratch.clc", "this is not code @@");
  let program = compile(&sources).unwrap();

  let headers: Vec<String> = listing(&program)
    .lines()
    .filter(|line| line.starts_with("# ") && !line.starts_with("# ="))
    .map(str::to_string)
    .collect();
  assert_eq!(
    headers,
    vec!["# math.clc:2: a + b", "# main.clc:3: add ( 2 , 3 )"]
  );
}

#[test]
fn token_listing_names_file_line_and_kind() {
  let program = compile(&single("int main() {\n  return 42;\n}")).unwrap();
  let out = token_listing(&program);
  assert!(out.starts_with("main.clc:1 keyword int\nmain.clc:1 ident main\nmain.clc:1 sign (\n"));
  assert!(out.contains("main.clc:2 number 42\n"));
}

#[test]
fn error_missing_semicolon() {
  let err = compile(&single("int main() {\n  return 42\n}")).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Syntax);
  assert_eq!(
    err.to_string(),
    "Syntax: File main.clc: line 2: No closing ';' found for \"return\"."
  );
}

#[test]
fn error_unbalanced_brackets() {
  let err = compile(&single("int main() {\n  int x = (1 + 2;\n}")).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Bracket);
  assert!(err.to_string().starts_with("Brackets: File main.clc: line "));
}

#[test]
fn error_block_split_across_files() {
  let sources = SourceSet::new()
    .with_file("main.clc", "#include \"open.clc\"\n}\nint main() { }")
    .with_file("open.clc", "int f() {");
  let err = compile(&sources).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Bracket);
  assert_eq!(err.file(), "open.clc");
  assert_eq!(err.line(), 1);
}

#[test]
fn only_the_first_error_is_reported() {
  let err = compile(&single("int main() {\n  x = ;\n  y = * 2;\n}")).unwrap_err();
  assert_eq!(err.line(), 2);
}

#[test]
fn error_unknown_directive() {
  let err = compile(&single("#import \"x\"\nint main() { }")).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Directive);
  assert_eq!(
    err.to_string(),
    "Directive: File main.clc: line 1: Compiler command \"#import\" not found"
  );
}

#[test]
fn error_no_entry_point() {
  let err = compile(&single("int f() { return 1; }")).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Source);
  assert_eq!(
    err.to_string(),
    "Source: File N.A.: line 0: No entry point was found."
  );
}

#[test]
fn error_missing_include() {
  let err = compile(&single("#include \"gone.clc\"\nint main() { }")).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Source);
  assert_eq!(err.line(), 1);
}

#[test]
fn error_directive_after_code_on_one_line() {
  let err = compile(&single("int main() { return 0; } #test")).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Syntax);
  assert_eq!(err.message(), "Unexpected expression: \"#test\"");
}
