//! End-to-end exercises of `peggy::generate` against the full pipeline:
//! parse -> analyze -> lower -> run (or emit).
use std::sync::Arc;

use peggy::{GenerateOptions, GenerateOutput, GrammarSourceText, OutputKind};
use peggy_core::diagnostics::PeggyError;
use peggy_rust_runtime::{ActionFailure, ActionHost, BoundArg, NullActionHost, ParseOptions, Value};

fn sources(text: &str) -> Vec<GrammarSourceText> {
  vec![GrammarSourceText::new("test.peggy", text)]
}

fn find<'a>(args: &'a [BoundArg], name: &str) -> Option<&'a Value> {
  args.iter().find(|b| b.label.as_ref() == name).map(|b| &b.value)
}

/// Folds `head:Integer tail:(_ op:("+"/"-") _ v:Integer {(op, v)})*` actions,
/// dispatching purely by which labels are in scope so the same host serves
/// both the inner pair-building action and the outer fold.
struct ArithmeticHost;

impl ActionHost for ArithmeticHost {
  fn call_action(&self, _rule: &str, _action_index: u32, args: &[BoundArg], matched_text: &str) -> Result<Value, ActionFailure> {
    if let (Some(op), Some(v)) = (find(args, "op"), find(args, "v")) {
      return Ok(Value::Tuple(vec![op.clone(), v.clone()]));
    }
    if let (Some(head), Some(tail)) = (find(args, "head"), find(args, "tail")) {
      let mut acc = match head {
        Value::Int(n) => *n,
        _ => return Err(ActionFailure { message: Some("head was not an integer".to_string()) }),
      };
      if let Value::List(items) = tail {
        for item in items {
          if let Value::Tuple(pair) = item {
            if let [Value::Str(op), Value::Int(v)] = pair.as_slice() {
              match op.as_ref() {
                "+" => acc += v,
                "-" => acc -= v,
                _ => return Err(ActionFailure { message: Some(format!("unknown operator {op}")) }),
              }
            }
          }
        }
      }
      return Ok(Value::Int(acc));
    }
    if args.is_empty() {
      return match matched_text.parse::<i64>() {
        Ok(n) => Ok(Value::Int(n)),
        Err(_) => Ok(Value::Str(Arc::from(matched_text))),
      };
    }
    Ok(args[0].value.clone())
  }

  fn call_predicate(&self, _rule: &str, _predicate_index: u32, _args: &[BoundArg], _matched_text: &str) -> bool {
    true
  }
}

const ARITHMETIC_GRAMMAR: &str = r#"
Expression = head:Integer tail:(_ op:("+" / "-") _ v:Integer { (op, v) })* { fold(head, tail) }
Integer "integer" = [0-9]+ { parseInt(text(), 10) }
_ = [ \t\n\r]*
"#;

#[test]
fn arithmetic_grammar_folds_a_left_to_right_sum() {
  let out = generate_parser(ARITHMETIC_GRAMMAR);
  let host = ArithmeticHost;
  let result = out.parse("2 + 3 - 1", &ParseOptions::default(), &host, None).unwrap();
  assert_eq!(result, Value::Int(4));
}

#[test]
fn arithmetic_grammar_reports_furthest_failure_past_a_dangling_operator() {
  let out = generate_parser(ARITHMETIC_GRAMMAR);
  let host = ArithmeticHost;
  let err = out.parse("2 +", &ParseOptions::default(), &host, None).unwrap_err();
  assert_eq!(err.position.offset, 3);
  assert!(err.message.contains("integer"), "message was: {}", err.message);
}

#[test]
fn library_mode_returns_a_partial_result_without_raising() {
  let out = generate_parser("start = 'a'+");
  let host = NullActionHost;
  let mut options = ParseOptions::default();
  options.library_mode = true;
  let lib = out.parse_library("aab", &options, &host, None).unwrap();
  assert!(!lib.success);
  assert_eq!(lib.curr_pos.offset, 2);
  assert_eq!(lib.max_fail_pos.offset, 2);
  assert_eq!(lib.result, Some(Value::List(vec![Value::Str(Arc::from("a")), Value::Str(Arc::from("a"))])));
}

#[test]
fn left_recursion_is_rejected_before_bytecode_generation() {
  let err = peggy::generate(sources("start = start 'a' / 'a'"), GenerateOptions::default()).unwrap_err();
  assert!(matches!(err, PeggyError::Semantic { .. }));
}

#[test]
fn undefined_start_rule_is_a_configuration_error_at_parse_time() {
  let out = generate_parser("a = 'x'\nb = 'y'");
  let host = NullActionHost;
  let mut options = ParseOptions::default();
  options.start_rule = Some("missing".to_string());
  assert!(out.parse("x", &options, &host, None).is_err());
}

#[test]
fn bounded_repetition_stops_at_the_constant_maximum() {
  let out = generate_parser("start = 'a'|2|");
  let host = NullActionHost;
  assert!(out.parse("aa", &ParseOptions::default(), &host, None).is_ok());
  assert!(out.parse("aaa", &ParseOptions::default(), &host, None).is_err());
}

fn generate_parser(grammar: &str) -> peggy_rust_runtime::Parser {
  match peggy::generate(sources(grammar), GenerateOptions::default().output(OutputKind::Parser)).unwrap() {
    GenerateOutput::Parser(parser) => parser,
    _ => panic!("expected Parser output"),
  }
}
