//! Parser for assembly-qualified type names.
//!
//! Accepts both the fully qualified form
//! (``System.Collections.Generic.List`1[[System.Int32, System.Private.CoreLib, Version=9.0.0.0, Culture=neutral, PublicKeyToken=7cec85d7bea7798e]], System.Private.CoreLib, Version=...``)
//! and the reduced form that omits version, culture and public key token.
//! Module metadata is parsed but never required.

use crate::ty::generic_arity;

/// A parsed type name. Purely syntactic: nothing here says whether the type
/// exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QualifiedTypeName {
    /// Definition name including any arity suffix, without arguments.
    pub full_name: String,
    pub type_arguments: Vec<QualifiedTypeName>,
    /// Number of trailing `[]` suffixes.
    pub array_rank: usize,
    pub module: Option<String>,
    /// `Key=Value` pairs following the module name (Version, Culture, ...).
    pub properties: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("malformed type name `{input}` at offset {offset}: {message}")]
pub struct TypeNameError {
    pub input: String,
    pub offset: usize,
    pub message: String,
}

/// Parse a qualified type name.
pub fn parse(input: &str) -> Result<QualifiedTypeName, TypeNameError> {
    let mut parser = Parser { input, pos: 0 };
    let name = parser.qualified()?;
    parser.skip_ws();
    if parser.peek().is_some() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(name)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn error(&self, message: &str) -> TypeNameError {
        TypeNameError {
            input: self.input.to_string(),
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), TypeNameError> {
        self.skip_ws();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected `{}`", byte as char)))
        }
    }

    /// Consume up to (not including) the first stop byte; returns the trimmed text.
    fn read_until(&mut self, stops: &[u8]) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(|b| !stops.contains(&b)) {
            self.pos += 1;
        }
        self.input[start..self.pos].trim()
    }

    fn qualified(&mut self) -> Result<QualifiedTypeName, TypeNameError> {
        self.skip_ws();
        let full_name = self.read_until(b",[]").to_string();
        if full_name.is_empty() {
            return Err(self.error("expected a type name"));
        }

        let mut type_arguments = Vec::new();
        if self.peek() == Some(b'[') && self.peek_at(1) == Some(b'[') {
            self.pos += 1;
            loop {
                self.expect(b'[')?;
                type_arguments.push(self.qualified()?);
                self.expect(b']')?;
                self.skip_ws();
                match self.peek() {
                    Some(b',') => self.pos += 1,
                    Some(b']') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.error("expected `,` or `]` in generic argument list")),
                }
            }
            if generic_arity(&full_name) != type_arguments.len() {
                return Err(self.error("generic argument count does not match the arity suffix"));
            }
        }

        let mut array_rank = 0;
        while self.peek() == Some(b'[') && self.peek_at(1) == Some(b']') {
            self.pos += 2;
            array_rank += 1;
        }

        self.skip_ws();
        let mut module = None;
        let mut properties = Vec::new();
        if self.peek() == Some(b',') {
            self.pos += 1;
            let name = self.read_until(b",]");
            if name.is_empty() {
                return Err(self.error("expected a module name"));
            }
            module = Some(name.to_string());
            while self.peek() == Some(b',') {
                self.pos += 1;
                let property = self.read_until(b",]");
                let (key, value) = property
                    .split_once('=')
                    .ok_or_else(|| self.error("expected `Key=Value` module property"))?;
                properties.push((key.trim().to_string(), value.trim().to_string()));
            }
        }

        Ok(QualifiedTypeName { full_name, type_arguments, array_rank, module, properties })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::{ModuleIdentity, Ty, TypeName};

    #[test]
    fn parses_reduced_generic_name() {
        let name = parse(
            "System.Collections.Generic.IEnumerable`1[[Demo.Model, Demo.Models]], System.Private.CoreLib",
        )
        .unwrap();
        assert_eq!(name.full_name, "System.Collections.Generic.IEnumerable`1");
        assert_eq!(name.module.as_deref(), Some("System.Private.CoreLib"));
        assert_eq!(name.type_arguments.len(), 1);
        assert_eq!(name.type_arguments[0].full_name, "Demo.Model");
        assert_eq!(name.type_arguments[0].module.as_deref(), Some("Demo.Models"));
    }

    #[test]
    fn parses_fully_qualified_name_from_ty() {
        let model = Ty::Con(TypeName::new("Demo.Model", ModuleIdentity::new("Demo.Models")));
        let ty = Ty::func(vec![Ty::array(model)], Ty::int32());
        let name = parse(&ty.assembly_qualified_name()).unwrap();
        assert_eq!(name.full_name, "System.Func`2");
        assert_eq!(name.type_arguments[0].full_name, "Demo.Model");
        assert_eq!(name.type_arguments[0].array_rank, 1);
        assert_eq!(name.type_arguments[1].full_name, "System.Int32");
        assert!(name
            .properties
            .iter()
            .any(|(k, v)| k == "PublicKeyToken" && v == "7cec85d7bea7798e"));
    }

    #[test]
    fn module_is_optional() {
        let name = parse("System.Int32").unwrap();
        assert_eq!(name.module, None);
        assert!(name.type_arguments.is_empty());
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(parse("").is_err());
        assert!(parse("System.Func`2[[System.Int32, System.Private.CoreLib]]").is_err());
        assert!(parse("System.Int32, System.Private.CoreLib, Version").is_err());
        assert!(parse("System.Int32]").is_err());
    }
}
