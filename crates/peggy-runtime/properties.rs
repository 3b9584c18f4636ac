//! Unicode property predicates for `\p{Name}`/`\P{Name}` class escapes.
//! Lives here, not in `peggy_core`, so both the grammar
//! parser (building a `ClassPart::Property` AST node) and any Rust source
//! `peggy_emit` renders (reconstructing the same node as literal code) can
//! resolve a property name to the identical predicate without either
//! depending on the other.
//!
//! A handful of `char::is_*` predicates covers the properties grammars
//! actually use in practice; a full Unicode property database is not
//! implemented. Unrecognized names resolve to a predicate that never
//! matches, rather than a compile error, so an unrecognized `\p{Name}` simply
//! never matches at parse time.
pub fn resolve_unicode_property(name: &str) -> (String, fn(char) -> bool) {
  fn is_l(c: char) -> bool {
    c.is_alphabetic()
  }
  fn is_n(c: char) -> bool {
    c.is_numeric()
  }
  fn is_lu(c: char) -> bool {
    c.is_uppercase()
  }
  fn is_ll(c: char) -> bool {
    c.is_lowercase()
  }
  fn is_white_space(c: char) -> bool {
    c.is_whitespace()
  }
  fn is_alphanumeric(c: char) -> bool {
    c.is_alphanumeric()
  }
  fn unknown(_c: char) -> bool {
    false
  }

  match name {
    "L" | "Letter" => ("L".to_string(), is_l as fn(char) -> bool),
    "N" | "Number" | "Nd" => ("N".to_string(), is_n as fn(char) -> bool),
    "Lu" | "Uppercase" | "Uppercase_Letter" => ("Lu".to_string(), is_lu as fn(char) -> bool),
    "Ll" | "Lowercase" | "Lowercase_Letter" => ("Ll".to_string(), is_ll as fn(char) -> bool),
    "White_Space" | "Space" => ("White_Space".to_string(), is_white_space as fn(char) -> bool),
    "Alphanumeric" => ("Alphanumeric".to_string(), is_alphanumeric as fn(char) -> bool),
    other => (other.to_string(), unknown as fn(char) -> bool),
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn unrecognized_property_names_never_match() {
    let (name, pred) = resolve_unicode_property("NotARealProperty");
    assert_eq!(name, "NotARealProperty");
    assert!(!pred('a'));
    assert!(!pred('1'));
  }

  #[test]
  fn known_aliases_resolve_to_the_same_canonical_name() {
    let (a, _) = resolve_unicode_property("Letter");
    let (b, _) = resolve_unicode_property("L");
    assert_eq!(a, "L");
    assert_eq!(b, "L");
  }
}
