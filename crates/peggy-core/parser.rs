//! The hand-written grammar DSL parser: recursive descent
//! over the precedence chain choice → action → sequence → labeled → prefix →
//! suffix → primary, building the `Grammar` AST of `crate::types` with exact
//! source locations on every node, producing a typed AST with a token/span on
//! every node, but with
//! no separate lexer pass: this parser scans characters directly, the way a
//! small single-purpose DSL parser is written when the token set is this
//! irregular (braces of arbitrary embedded code, `|min..max,delim|` suffix
//! syntax).
use std::sync::Arc;

use peggy_rust_runtime::{GrammarSource, Position, Span};

use crate::diagnostics::PeggyError;
use crate::types::{resolve_unicode_property, ClassPart, CodeBlock, Expr, Grammar, Import, Pick, RepetitionBound, Rule};

/// One named input fragment.
#[derive(Clone, Debug)]
pub struct SourceFragment {
  pub name: String,
  pub text: String,
}

impl SourceFragment {
  pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
    Self { name: name.into(), text: text.into() }
  }
}

/// Words a rule name or label name may not use unescaped.
const RESERVED_WORDS: &[&str] = &[
  "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do", "else", "export", "extends",
  "finally", "for", "function", "if", "import", "in", "instanceof", "new", "return", "super", "switch", "this", "throw", "try",
  "typeof", "var", "void", "while", "with", "yield", "let", "static", "enum", "await", "implements", "interface", "package",
  "private", "protected", "public", "null", "true", "false",
];

pub fn is_reserved_word(name: &str) -> bool {
  RESERVED_WORDS.contains(&name)
}

/// Parses each fragment independently and concatenates the results: rule
/// lists are appended in order, and the *first* fragment's initializers win.
pub fn parse_sources(fragments: &[SourceFragment]) -> Result<Grammar, PeggyError> {
  let mut grammar = Grammar::default();
  let mut have_initializers = false;

  for fragment in fragments {
    let parsed = parse_fragment(fragment)?;
    if !have_initializers {
      grammar.top_level_initializer = parsed.top_level_initializer;
      grammar.per_parse_initializer = parsed.per_parse_initializer;
      have_initializers = true;
    }
    grammar.imports.extend(parsed.imports);
    grammar.rules.extend(parsed.rules);
  }

  Ok(grammar)
}

pub fn parse_fragment(fragment: &SourceFragment) -> Result<Grammar, PeggyError> {
  let source = GrammarSource::new(fragment.name.clone());
  let mut p = Parser::new(source, &fragment.text);

  let mut top_level_initializer = None;
  let mut per_parse_initializer = None;
  loop {
    p.skip_ws();
    if p.peek() == Some('{') && p.peek_at(1) == Some('{') {
      if per_parse_initializer.is_some() {
        break;
      }
      per_parse_initializer = Some(p.parse_double_brace_code_block()?);
    } else if p.peek() == Some('{') {
      if top_level_initializer.is_some() {
        break;
      }
      top_level_initializer = Some(p.parse_code_block()?);
    } else {
      break;
    }
  }

  let mut imports = Vec::new();
  let mut rules = Vec::new();
  loop {
    p.skip_ws();
    if p.peek().is_none() {
      break;
    }
    if p.looking_at_keyword("import") {
      imports.push(p.parse_import()?);
    } else {
      rules.push(p.parse_rule()?);
    }
  }

  Ok(Grammar { rules, top_level_initializer, per_parse_initializer, imports })
}

type Mark = (usize, usize, u32, u32);

struct Parser<'a> {
  source:      GrammarSource,
  text:        &'a str,
  chars:       Vec<char>,
  char_idx:    usize,
  byte_offset: usize,
  line:        u32,
  column:      u32,
  paren_depth: u32,
}

impl<'a> Parser<'a> {
  fn new(source: GrammarSource, text: &'a str) -> Self {
    Self { source, text, chars: text.chars().collect(), char_idx: 0, byte_offset: 0, line: 1, column: 1, paren_depth: 0 }
  }

  fn position(&self) -> Position {
    Position { offset: self.byte_offset, line: self.line, column: self.column }
  }

  fn span(&self, start: Position) -> Span {
    Span::new(self.source.clone(), start, self.position())
  }

  fn peek(&self) -> Option<char> {
    self.chars.get(self.char_idx).copied()
  }

  fn peek_at(&self, n: usize) -> Option<char> {
    self.chars.get(self.char_idx + n).copied()
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.char_idx += 1;
    self.byte_offset += c.len_utf8();
    if c == '\n' {
      self.line += 1;
      self.column = 1;
    } else {
      self.column += 1;
    }
    Some(c)
  }

  fn save(&self) -> Mark {
    (self.char_idx, self.byte_offset, self.line, self.column)
  }

  fn restore(&mut self, mark: Mark) {
    (self.char_idx, self.byte_offset, self.line, self.column) = mark;
  }

  fn syntax_err(&self, message: impl Into<String>, at: Position) -> PeggyError {
    PeggyError::Syntax { message: message.into(), location: Span::point(self.source.clone(), at), expected: Vec::new() }
  }

  fn expected_err(&self, what: impl Into<String>, at: Position) -> PeggyError {
    let what = what.into();
    PeggyError::Syntax { message: format!("expected {what}"), location: Span::point(self.source.clone(), at), expected: vec![what] }
  }

  fn expect_char(&mut self, c: char) -> Result<(), PeggyError> {
    if self.peek() == Some(c) {
      self.bump();
      Ok(())
    } else {
      Err(self.expected_err(format!("'{c}'"), self.position()))
    }
  }

  fn expect_keyword(&mut self, kw: &str) -> Result<(), PeggyError> {
    let at = self.position();
    match self.parse_identifier() {
      Some((name, _, _)) if name == kw => Ok(()),
      _ => Err(self.expected_err(format!("'{kw}'"), at)),
    }
  }

  fn looking_at_keyword(&mut self, kw: &str) -> bool {
    let mark = self.save();
    let hit = matches!(self.parse_identifier(), Some((name, _, _)) if name == kw);
    self.restore(mark);
    hit
  }

  fn skip_ws(&mut self) {
    loop {
      match self.peek() {
        Some(' ') | Some('\t') | Some('\r') | Some('\n') => {
          self.bump();
        }
        Some('/') if self.peek_at(1) == Some('/') => {
          while !matches!(self.peek(), None | Some('\n')) {
            self.bump();
          }
        }
        Some('/') if self.peek_at(1) == Some('*') => {
          self.bump();
          self.bump();
          loop {
            match self.peek() {
              None => break,
              Some('*') if self.peek_at(1) == Some('/') => {
                self.bump();
                self.bump();
                break;
              }
              _ => {
                self.bump();
              }
            }
          }
        }
        _ => break,
      }
    }
  }

  fn ident_char_ok(c: char, is_start: bool) -> bool {
    if is_start {
      c == '_' || c == '$' || c.is_alphabetic()
    } else {
      c == '_' || c == '$' || c.is_alphanumeric()
    }
  }

  fn ident_start(c: char) -> bool {
    Self::ident_char_ok(c, true)
  }

  /// Decodes a `\uXXXX` or `\u{...}` escape; assumes the leading `\u` has
  /// already been consumed.
  fn scan_unicode_escape(&mut self) -> Option<char> {
    if self.peek() == Some('{') {
      self.bump();
      let mut hex = String::new();
      while let Some(c) = self.peek() {
        if c == '}' {
          break;
        }
        hex.push(c);
        self.bump();
      }
      if self.peek() == Some('}') {
        self.bump();
      } else {
        return None;
      }
      u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
    } else {
      let mut hex = String::new();
      for _ in 0..4 {
        let c = self.peek()?;
        if !c.is_ascii_hexdigit() {
          return None;
        }
        hex.push(c);
        self.bump();
      }
      u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
    }
  }

  fn scan_ident_char(&mut self, is_start: bool) -> Option<(char, bool)> {
    match self.peek() {
      Some('\\') if self.peek_at(1) == Some('u') => {
        let mark = self.save();
        self.bump();
        self.bump();
        match self.scan_unicode_escape() {
          Some(c) if Self::ident_char_ok(c, is_start) => Some((c, true)),
          _ => {
            self.restore(mark);
            None
          }
        }
      }
      Some(c) if Self::ident_char_ok(c, is_start) => {
        self.bump();
        Some((c, false))
      }
      _ => None,
    }
  }

  /// Returns the identifier text, whether any character was written via a
  /// `\u` escape, and its span.
  fn parse_identifier(&mut self) -> Option<(String, bool, Span)> {
    let start = self.position();
    let mut s = String::new();
    let mut escaped = false;
    match self.scan_ident_char(true) {
      Some((c, was_escape)) => {
        s.push(c);
        escaped |= was_escape;
      }
      None => return None,
    }
    loop {
      let mark = self.save();
      match self.scan_ident_char(false) {
        Some((c, was_escape)) => {
          s.push(c);
          escaped |= was_escape;
        }
        None => {
          self.restore(mark);
          break;
        }
      }
    }
    Some((s, escaped, self.span(start)))
  }

  /// Assumes the leading backslash was already consumed. `None` marks a
  /// continuation escape (`\` followed by a newline) that yields no
  /// character, rather than an error.
  fn parse_escape(&mut self) -> Result<Option<char>, PeggyError> {
    let at = self.position();
    match self.peek() {
      None => Err(self.syntax_err("unterminated escape sequence", at)),
      Some('\n') => {
        self.bump();
        Ok(None)
      }
      Some('\r') => {
        self.bump();
        if self.peek() == Some('\n') {
          self.bump();
        }
        Ok(None)
      }
      Some('n') => {
        self.bump();
        Ok(Some('\n'))
      }
      Some('r') => {
        self.bump();
        Ok(Some('\r'))
      }
      Some('t') => {
        self.bump();
        Ok(Some('\t'))
      }
      Some('b') => {
        self.bump();
        Ok(Some('\u{8}'))
      }
      Some('f') => {
        self.bump();
        Ok(Some('\u{c}'))
      }
      Some('v') => {
        self.bump();
        Ok(Some('\u{b}'))
      }
      Some('0') if !matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) => {
        self.bump();
        Ok(Some('\0'))
      }
      Some('x') => {
        self.bump();
        let mut hex = String::new();
        for _ in 0..2 {
          match self.peek() {
            Some(c) if c.is_ascii_hexdigit() => {
              hex.push(c);
              self.bump();
            }
            _ => return Err(self.syntax_err("invalid \\x escape", self.position())),
          }
        }
        Ok(char::from_u32(u32::from_str_radix(&hex, 16).unwrap()))
      }
      Some('u') => {
        self.bump();
        self.scan_unicode_escape().map(Some).ok_or_else(|| self.syntax_err("invalid \\u escape", at))
      }
      Some(c) => {
        self.bump();
        Ok(Some(c))
      }
    }
  }

  fn parse_string(&mut self) -> Result<(String, Span), PeggyError> {
    let start = self.position();
    let quote = match self.peek() {
      Some(q @ ('\'' | '"')) => q,
      _ => return Err(self.expected_err("a string literal", start)),
    };
    self.bump();
    let mut s = String::new();
    loop {
      match self.peek() {
        None | Some('\n') => return Err(self.syntax_err("unterminated string literal", start)),
        Some(c) if c == quote => {
          self.bump();
          break;
        }
        Some('\\') => {
          self.bump();
          if let Some(c) = self.parse_escape()? {
            s.push(c);
          }
        }
        Some(c) => {
          self.bump();
          s.push(c);
        }
      }
    }
    Ok((s, self.span(start)))
  }

  fn skip_code_string_literal(&mut self, quote: char) -> Result<(), PeggyError> {
    let start = self.position();
    self.bump();
    loop {
      match self.peek() {
        None => return Err(self.syntax_err("unterminated string literal in embedded code", start)),
        Some('\\') => {
          self.bump();
          if self.peek().is_some() {
            self.bump();
          }
        }
        Some(c) if c == quote => {
          self.bump();
          break;
        }
        _ => {
          self.bump();
        }
      }
    }
    Ok(())
  }

  /// A brace-balanced scan of embedded user code, preserved verbatim
  ///. Tracks
  /// nested `{}` and skips over string/char literals and comments so braces
  /// inside them don't desynchronize the depth count.
  fn parse_code_block(&mut self) -> Result<CodeBlock, PeggyError> {
    let brace_start = self.position();
    self.expect_char('{')?;
    let content_start = self.position();
    let mut depth = 1u32;
    loop {
      match self.peek() {
        None => return Err(self.syntax_err("unterminated code block", brace_start)),
        Some('{') => {
          depth += 1;
          self.bump();
        }
        Some('}') => {
          depth -= 1;
          if depth == 0 {
            break;
          }
          self.bump();
        }
        Some(q @ ('"' | '\'' | '`')) => self.skip_code_string_literal(q)?,
        Some('/') if self.peek_at(1) == Some('/') => {
          while !matches!(self.peek(), None | Some('\n')) {
            self.bump();
          }
        }
        Some('/') if self.peek_at(1) == Some('*') => {
          self.bump();
          self.bump();
          loop {
            match self.peek() {
              None => break,
              Some('*') if self.peek_at(1) == Some('/') => {
                self.bump();
                self.bump();
                break;
              }
              _ => {
                self.bump();
              }
            }
          }
        }
        Some(_) => {
          self.bump();
        }
      }
    }
    let content_end = self.position();
    self.bump();
    let code_location = Span::new(self.source.clone(), content_start, content_end);
    let source: Arc<str> = Arc::from(&self.text[content_start.offset..content_end.offset]);
    Ok(CodeBlock { source, code_location })
  }

  /// The per-parse initializer's `{{ ... }}` wrapper.
  fn parse_double_brace_code_block(&mut self) -> Result<CodeBlock, PeggyError> {
    let outer_start = self.position();
    self.expect_char('{')?;
    self.expect_char('{')?;
    let content_start = self.position();
    let mut depth = 0u32;
    loop {
      match self.peek() {
        None => return Err(self.syntax_err("unterminated per-parse initializer", outer_start)),
        Some('{') => {
          depth += 1;
          self.bump();
        }
        Some('}') if depth > 0 => {
          depth -= 1;
          self.bump();
        }
        Some('}') if self.peek_at(1) == Some('}') => break,
        Some(q @ ('"' | '\'' | '`')) => self.skip_code_string_literal(q)?,
        _ => {
          self.bump();
        }
      }
    }
    let content_end = self.position();
    self.bump();
    self.bump();
    let code_location = Span::new(self.source.clone(), content_start, content_end);
    let source: Arc<str> = Arc::from(&self.text[content_start.offset..content_end.offset]);
    Ok(CodeBlock { source, code_location })
  }

  fn parse_class_char(&mut self) -> Result<char, PeggyError> {
    match self.peek() {
      None => Err(self.expected_err("a character", self.position())),
      Some('\\') => {
        let at = self.position();
        self.bump();
        self.parse_escape()?.ok_or_else(|| self.syntax_err("invalid escape in character class", at))
      }
      Some(c) => {
        self.bump();
        Ok(c)
      }
    }
  }

  fn parse_class(&mut self) -> Result<Expr, PeggyError> {
    let start = self.position();
    self.expect_char('[')?;
    let inverted = if self.peek() == Some('^') {
      self.bump();
      true
    } else {
      false
    };
    let mut parts = Vec::new();
    let mut saw_property = false;
    loop {
      match self.peek() {
        None => return Err(self.syntax_err("unterminated character class", start)),
        Some(']') => {
          self.bump();
          break;
        }
        Some('\\') if matches!(self.peek_at(1), Some('p') | Some('P')) => {
          self.bump();
          let negated = self.peek() == Some('P');
          self.bump();
          self.expect_char('{')?;
          let mut name = String::new();
          while let Some(c) = self.peek() {
            if c == '}' {
              break;
            }
            name.push(c);
            self.bump();
          }
          self.expect_char('}')?;
          let (canon, predicate) = resolve_unicode_property(&name);
          parts.push(ClassPart::Property(canon, predicate, negated));
          saw_property = true;
        }
        _ => {
          let lo = self.parse_class_char()?;
          if self.peek() == Some('-') && !matches!(self.peek_at(1), None | Some(']')) {
            self.bump();
            let range_start = self.position();
            let hi = self.parse_class_char()?;
            if hi < lo {
              return Err(self.syntax_err(format!("invalid character range {lo}-{hi}"), range_start));
            }
            parts.push(ClassPart::Range(lo, hi));
          } else {
            parts.push(ClassPart::Char(lo));
          }
        }
      }
    }
    let mut case_insensitive = false;
    let mut unicode = false;
    loop {
      match self.peek() {
        Some('i') => {
          self.bump();
          case_insensitive = true;
        }
        Some('u') => {
          self.bump();
          unicode = true;
        }
        _ => break,
      }
    }
    if saw_property && !unicode {
      return Err(self.syntax_err("unicode property escapes require the 'u' flag", start));
    }
    Ok(Expr::Class { parts, inverted, case_insensitive, unicode, location: self.span(start) })
  }

  fn parse_literal(&mut self) -> Result<Expr, PeggyError> {
    let start = self.position();
    let (text, _) = self.parse_string()?;
    let case_insensitive = if self.peek() == Some('i') {
      self.bump();
      true
    } else {
      false
    };
    Ok(Expr::Literal { text, case_insensitive, location: self.span(start) })
  }

  fn parse_primary(&mut self) -> Result<Expr, PeggyError> {
    self.skip_ws();
    let start = self.position();
    match self.peek() {
      Some('"') | Some('\'') => self.parse_literal(),
      Some('[') => self.parse_class(),
      Some('.') => {
        self.bump();
        Ok(Expr::Any { unicode: true, location: self.span(start) })
      }
      Some('(') => {
        self.bump();
        self.paren_depth += 1;
        self.skip_ws();
        let inner = self.parse_expression()?;
        self.skip_ws();
        self.paren_depth -= 1;
        self.expect_char(')')?;
        Ok(Expr::Group { inner: Box::new(inner), location: self.span(start) })
      }
      Some(c) if Self::ident_start(c) => {
        let (name, _escaped, _span) = self.parse_identifier().unwrap();
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if Self::ident_start(c)) {
          self.bump();
          let (rule, _, _) = self.parse_identifier().ok_or_else(|| self.expected_err("a rule name", self.position()))?;
          Ok(Expr::LibraryRef { binding: name, rule, location: self.span(start) })
        } else {
          Ok(Expr::RuleRef { name, location: self.span(start) })
        }
      }
      _ => Err(self.expected_err("an expression", start)),
    }
  }

  fn parse_prefixed(&mut self) -> Result<Expr, PeggyError> {
    self.skip_ws();
    let start = self.position();
    match self.peek() {
      Some('&') => {
        self.bump();
        self.skip_ws();
        if self.peek() == Some('{') {
          let code = self.parse_code_block()?;
          Ok(Expr::SemanticAnd { code, location: self.span(start) })
        } else {
          let inner = self.parse_suffixed()?;
          Ok(Expr::SimpleAnd { inner: Box::new(inner), location: self.span(start) })
        }
      }
      Some('!') => {
        self.bump();
        self.skip_ws();
        if self.peek() == Some('{') {
          let code = self.parse_code_block()?;
          Ok(Expr::SemanticNot { code, location: self.span(start) })
        } else {
          let inner = self.parse_suffixed()?;
          Ok(Expr::SimpleNot { inner: Box::new(inner), location: self.span(start) })
        }
      }
      Some('$') => {
        self.bump();
        self.skip_ws();
        let inner = self.parse_suffixed()?;
        Ok(Expr::Text { inner: Box::new(inner), location: self.span(start) })
      }
      _ => self.parse_suffixed(),
    }
  }

  fn parse_suffixed(&mut self) -> Result<Expr, PeggyError> {
    let start = self.position();
    let primary = self.parse_primary()?;
    match self.peek() {
      Some('?') => {
        self.bump();
        Ok(Expr::Optional { inner: Box::new(primary), location: self.span(start) })
      }
      Some('*') => {
        self.bump();
        Ok(Expr::ZeroOrMore { inner: Box::new(primary), location: self.span(start) })
      }
      Some('+') => {
        self.bump();
        Ok(Expr::OneOrMore { inner: Box::new(primary), location: self.span(start) })
      }
      Some('|') => self.parse_repeated(primary, start),
      _ => Ok(primary),
    }
  }

  fn parse_boundary_opt(&mut self) -> Result<Option<RepetitionBound>, PeggyError> {
    self.skip_ws();
    match self.peek() {
      Some(c) if c.is_ascii_digit() => {
        let mut digits = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
          digits.push(self.bump().unwrap());
        }
        let n: u32 = digits.parse().map_err(|_| self.syntax_err("repetition boundary out of range", self.position()))?;
        Ok(Some(RepetitionBound::Constant(n)))
      }
      Some('{') => {
        let code = self.parse_code_block()?;
        Ok(Some(RepetitionBound::Code(code.source.to_string())))
      }
      Some(c) if Self::ident_start(c) => {
        let (name, _, _) = self.parse_identifier().unwrap();
        Ok(Some(RepetitionBound::Variable(name)))
      }
      _ => Ok(None),
    }
  }

  /// `|min..max|` / `|exact|` / `|min..max, delim|`.
  fn parse_repeated(&mut self, inner: Expr, start: Position) -> Result<Expr, PeggyError> {
    self.expect_char('|')?;
    self.skip_ws();
    let first = self.parse_boundary_opt()?;
    self.skip_ws();
    let (min, max) = if self.peek() == Some('.') && self.peek_at(1) == Some('.') {
      self.bump();
      self.bump();
      self.skip_ws();
      let max = self.parse_boundary_opt()?;
      (first, max)
    } else {
      (first.clone(), first)
    };
    self.skip_ws();
    let delimiter = if self.peek() == Some(',') {
      self.bump();
      self.skip_ws();
      Some(Box::new(self.parse_suffixed()?))
    } else {
      None
    };
    self.skip_ws();
    self.expect_char('|')?;
    Ok(Expr::Repeated { inner: Box::new(inner), min, max, delimiter, location: self.span(start) })
  }

  fn parse_labeled(&mut self) -> Result<Expr, PeggyError> {
    self.skip_ws();
    let start = self.position();
    let pick = if self.peek() == Some('@') {
      self.bump();
      true
    } else {
      false
    };
    let mut label = None;
    let mut label_location = None;
    let mark = self.save();
    if let Some((name, escaped, span)) = self.parse_identifier() {
      self.skip_ws();
      if self.peek() == Some(':') && self.peek_at(1) != Some(':') {
        self.bump();
        if is_reserved_word(&name) && !escaped {
          return Err(self.syntax_err(format!("'{name}' is a reserved word and cannot be used as a label"), span.start));
        }
        label = Some(name);
        label_location = Some(span);
      } else {
        self.restore(mark);
      }
    } else {
      self.restore(mark);
    }
    self.skip_ws();
    let inner = self.parse_prefixed()?;
    if pick || label.is_some() {
      Ok(Expr::Labeled {
        label,
        inner: Box::new(inner),
        pick: if pick { Pick::Pick } else { Pick::NoPick },
        label_location,
        location: self.span(start),
      })
    } else {
      Ok(inner)
    }
  }

  /// Lookahead used to decide whether the current position starts a new
  /// rule (`name "display"? =`), so an un-terminated sequence knows where it
  /// ends.
  fn looks_like_rule_header(&mut self) -> bool {
    let mark = self.save();
    let hit = (|| -> Option<()> {
      self.parse_identifier()?;
      self.skip_ws();
      if matches!(self.peek(), Some('"') | Some('\'')) {
        self.parse_string().ok()?;
        self.skip_ws();
      }
      if self.peek() == Some('=') && self.peek_at(1) != Some('=') {
        Some(())
      } else {
        None
      }
    })()
    .is_some();
    self.restore(mark);
    hit
  }

  fn at_sequence_terminator(&mut self) -> bool {
    match self.peek() {
      None => true,
      Some(')') | Some('/') | Some('{') | Some(';') => true,
      _ => self.paren_depth == 0 && self.looks_like_rule_header(),
    }
  }

  fn parse_sequence(&mut self) -> Result<Expr, PeggyError> {
    let start = self.position();
    let mut items = Vec::new();
    loop {
      self.skip_ws();
      if self.at_sequence_terminator() {
        break;
      }
      items.push(self.parse_labeled()?);
    }
    match items.len() {
      0 => Err(self.expected_err("an expression", start)),
      1 => Ok(items.pop().unwrap()),
      _ => Ok(Expr::Sequence { items, location: self.span(start) }),
    }
  }

  fn parse_action(&mut self) -> Result<Expr, PeggyError> {
    let start = self.position();
    let seq = self.parse_sequence()?;
    self.skip_ws();
    if self.peek() == Some('{') {
      let code = self.parse_code_block()?;
      Ok(Expr::Action { inner: Box::new(seq), code, location: self.span(start) })
    } else {
      Ok(seq)
    }
  }

  fn parse_choice(&mut self) -> Result<Expr, PeggyError> {
    let start = self.position();
    let mut alts = vec![self.parse_action()?];
    loop {
      self.skip_ws();
      if self.peek() == Some('/') {
        self.bump();
        self.skip_ws();
        alts.push(self.parse_action()?);
      } else {
        break;
      }
    }
    if alts.len() == 1 {
      Ok(alts.pop().unwrap())
    } else {
      Ok(Expr::Choice { alternatives: alts, location: self.span(start) })
    }
  }

  fn parse_expression(&mut self) -> Result<Expr, PeggyError> {
    self.parse_choice()
  }

  fn parse_rule(&mut self) -> Result<Rule, PeggyError> {
    let start = self.position();
    let (name, escaped, name_location) = self.parse_identifier().ok_or_else(|| self.expected_err("a rule name", start))?;
    if is_reserved_word(&name) && !escaped {
      return Err(self.syntax_err(format!("'{name}' is a reserved word and cannot be used as a rule name"), start));
    }
    self.skip_ws();
    let mut display_name = None;
    if matches!(self.peek(), Some('"') | Some('\'')) {
      let (s, _) = self.parse_string()?;
      display_name = Some(s);
      self.skip_ws();
    }
    self.expect_char('=')?;
    self.skip_ws();
    let expression = self.parse_expression()?;
    self.skip_ws();
    if self.peek() == Some(';') {
      self.bump();
    }
    Ok(Rule { name, display_name, expression, name_location })
  }

  fn parse_import(&mut self) -> Result<Import, PeggyError> {
    let start = self.position();
    self.expect_keyword("import")?;
    self.skip_ws();
    let mut bindings = Vec::new();
    if self.peek() == Some('{') {
      self.bump();
      loop {
        self.skip_ws();
        if self.peek() == Some('}') {
          self.bump();
          break;
        }
        let at = self.position();
        let (name, _, _) = self.parse_identifier().ok_or_else(|| self.expected_err("a binding name", at))?;
        bindings.push(name);
        self.skip_ws();
        if self.peek() == Some(',') {
          self.bump();
          continue;
        }
        self.skip_ws();
        self.expect_char('}')?;
        break;
      }
    } else {
      loop {
        self.skip_ws();
        let at = self.position();
        let (name, _, _) = self.parse_identifier().ok_or_else(|| self.expected_err("a binding name", at))?;
        bindings.push(name);
        self.skip_ws();
        if self.peek() == Some(',') {
          self.bump();
          continue;
        }
        break;
      }
    }
    self.skip_ws();
    self.expect_keyword("from")?;
    self.skip_ws();
    let (module, _) = self.parse_string()?;
    self.skip_ws();
    if self.peek() == Some(';') {
      self.bump();
    }
    Ok(Import { bindings, module, location: self.span(start) })
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn parse_one(text: &str) -> Grammar {
    parse_sources(&[SourceFragment::new("g", text)]).unwrap()
  }

  #[test]
  fn parses_a_single_literal_rule() {
    let g = parse_one(r#"start = "a""#);
    assert_eq!(g.rules.len(), 1);
    assert_eq!(g.rules[0].name, "start");
    assert!(matches!(g.rules[0].expression, Expr::Literal { .. }));
  }

  #[test]
  fn parses_sequence_and_action() {
    let g = parse_one(r#"start = a:"x" b:"y" { a + b }"#);
    let Expr::Action { inner, code, .. } = &g.rules[0].expression else { panic!("expected action") };
    assert_eq!(code.source.as_ref(), " a + b ");
    assert!(matches!(inner.as_ref(), Expr::Sequence { items, .. } if items.len() == 2));
  }

  #[test]
  fn parses_ordered_choice() {
    let g = parse_one(r#"start = "a" / "b" / "c""#);
    assert!(matches!(&g.rules[0].expression, Expr::Choice { alternatives, .. } if alternatives.len() == 3));
  }

  #[test]
  fn parses_pick_and_repetition_boundary() {
    let g = parse_one(r#"start = @x:"a"|2..3|"#);
    let Expr::Labeled { pick, inner, .. } = &g.rules[0].expression else { panic!("expected labeled") };
    assert!(pick.is_pick());
    assert!(matches!(inner.as_ref(), Expr::Repeated { min: Some(RepetitionBound::Constant(2)), max: Some(RepetitionBound::Constant(3)), .. }));
  }

  #[test]
  fn parses_multiple_rules_separated_by_newlines() {
    let g = parse_one("a = \"x\"\nb = \"y\"\n");
    assert_eq!(g.rules.len(), 2);
    assert_eq!(g.rules[1].name, "b");
  }

  #[test]
  fn parses_class_with_flags_and_inversion() {
    let g = parse_one(r#"start = [^a-z]i"#);
    let Expr::Class { inverted, case_insensitive, parts, .. } = &g.rules[0].expression else { panic!("expected class") };
    assert!(*inverted);
    assert!(*case_insensitive);
    assert_eq!(parts.len(), 1);
  }

  #[test]
  fn parses_semantic_predicates_and_lookahead() {
    let g = parse_one(r#"start = &{ true } !"x" $("y"*)"#);
    assert!(matches!(&g.rules[0].expression, Expr::Sequence { items, .. } if items.len() == 3));
  }

  #[test]
  fn parses_import_header() {
    let g = parse_one(r#"import { a, b } from "./other.peggy"; start = a.rule1"#);
    assert_eq!(g.imports.len(), 1);
    assert_eq!(g.imports[0].bindings, vec!["a".to_string(), "b".to_string()]);
    assert!(matches!(&g.rules[0].expression, Expr::LibraryRef { binding, rule, .. } if binding == "a" && rule == "rule1"));
  }

  #[test]
  fn rejects_unescaped_reserved_rule_name() {
    let err = parse_sources(&[SourceFragment::new("g", r#"class = "x""#)]).unwrap_err();
    assert!(matches!(err, PeggyError::Syntax { .. }));
  }

  #[test]
  fn allows_escaped_reserved_rule_name() {
    let g = parse_one("cl\\u0061ss = \"x\"");
    assert_eq!(g.rules[0].name, "class");
  }

  #[test]
  fn reports_unterminated_string() {
    let err = parse_sources(&[SourceFragment::new("g", r#"start = "a"#)]).unwrap_err();
    assert!(matches!(err, PeggyError::Syntax { .. }));
  }

  #[test]
  fn parses_per_parse_and_top_level_initializers() {
    let g = parse_one("{{ let x = 1; }}\n{ let y = 2; }\nstart = \"a\"");
    assert!(g.per_parse_initializer.is_some());
    assert!(g.top_level_initializer.is_some());
    assert_eq!(g.rules.len(), 1);
  }
}
