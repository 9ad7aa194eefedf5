use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Declared type of a pipeline input or graph node.
///
/// Serialized as its display form (`"Int"`, `"List<Int>"`, `"Option<Float>"`)
/// both in persisted images and on the wire, so clients see readable type
/// names in `missingInputs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    Int,
    Float,
    Bool,
    Str,
    List(Box<TypeDescriptor>),
    Optional(Box<TypeDescriptor>),
    Map(Box<TypeDescriptor>),
    Record(BTreeMap<String, TypeDescriptor>),
    Union(Vec<TypeDescriptor>),
}

impl TypeDescriptor {
    pub fn list(item: TypeDescriptor) -> Self {
        TypeDescriptor::List(Box::new(item))
    }

    pub fn optional(item: TypeDescriptor) -> Self {
        TypeDescriptor::Optional(Box::new(item))
    }

    pub fn map(value: TypeDescriptor) -> Self {
        TypeDescriptor::Map(Box::new(value))
    }

    /// True for `Int` and `Float`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeDescriptor::Int | TypeDescriptor::Float)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Int => write!(f, "Int"),
            TypeDescriptor::Float => write!(f, "Float"),
            TypeDescriptor::Bool => write!(f, "Bool"),
            TypeDescriptor::Str => write!(f, "String"),
            TypeDescriptor::List(item) => write!(f, "List<{item}>"),
            TypeDescriptor::Optional(item) => write!(f, "Option<{item}>"),
            TypeDescriptor::Map(value) => write!(f, "Map<{value}>"),
            TypeDescriptor::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
            TypeDescriptor::Union(variants) => {
                for (i, v) in variants.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{v}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for TypeDescriptor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = TypeParser::new(s);
        let ty = parser.parse_union()?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(format!("trailing characters in type `{s}`"));
        }
        Ok(ty)
    }
}

impl Serialize for TypeDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TypeDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Tiny recursive-descent parser over the display form.
struct TypeParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        while self.rest().starts_with(' ') {
            self.pos += 1;
        }
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.rest().starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, prefix: &str) -> Result<(), String> {
        if self.eat(prefix) {
            Ok(())
        } else {
            Err(format!("expected `{prefix}` at position {}", self.pos))
        }
    }

    fn parse_union(&mut self) -> Result<TypeDescriptor, String> {
        let mut variants = vec![self.parse_single()?];
        loop {
            self.skip_ws();
            if self.eat("|") {
                self.skip_ws();
                variants.push(self.parse_single()?);
            } else {
                break;
            }
        }
        if variants.len() == 1 {
            Ok(variants.pop().expect("non-empty"))
        } else {
            Ok(TypeDescriptor::Union(variants))
        }
    }

    fn parse_single(&mut self) -> Result<TypeDescriptor, String> {
        self.skip_ws();
        if self.eat("{") {
            return self.parse_record();
        }
        let ident = self.parse_ident()?;
        match ident.as_str() {
            "Int" => Ok(TypeDescriptor::Int),
            "Float" => Ok(TypeDescriptor::Float),
            "Bool" => Ok(TypeDescriptor::Bool),
            "String" => Ok(TypeDescriptor::Str),
            "List" => {
                self.expect("<")?;
                let item = self.parse_union()?;
                self.expect(">")?;
                Ok(TypeDescriptor::list(item))
            }
            "Option" => {
                self.expect("<")?;
                let item = self.parse_union()?;
                self.expect(">")?;
                Ok(TypeDescriptor::optional(item))
            }
            "Map" => {
                self.expect("<")?;
                let value = self.parse_union()?;
                self.expect(">")?;
                Ok(TypeDescriptor::map(value))
            }
            other => Err(format!("unknown type name `{other}`")),
        }
    }

    fn parse_record(&mut self) -> Result<TypeDescriptor, String> {
        let mut fields = BTreeMap::new();
        self.skip_ws();
        if self.eat("}") {
            return Ok(TypeDescriptor::Record(fields));
        }
        loop {
            self.skip_ws();
            let name = self.parse_ident()?;
            self.skip_ws();
            self.expect(":")?;
            let ty = self.parse_union()?;
            fields.insert(name, ty);
            self.skip_ws();
            if self.eat(",") {
                continue;
            }
            self.expect("}")?;
            return Ok(TypeDescriptor::Record(fields));
        }
    }

    fn parse_ident(&mut self) -> Result<String, String> {
        let start = self.pos;
        for (i, c) in self.rest().char_indices() {
            if c.is_ascii_alphanumeric() || c == '_' {
                continue;
            }
            self.pos = start + i;
            break;
        }
        if self.pos == start {
            // Consumed nothing, or the whole rest is an identifier.
            if self.rest().chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !self.rest().is_empty()
            {
                self.pos = self.src.len();
            } else {
                return Err(format!("expected type name at position {start}"));
            }
        }
        Ok(self.src[start..self.pos].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(s: &str) {
        let ty: TypeDescriptor = s.parse().unwrap();
        assert_eq!(ty.to_string(), s);
    }

    #[test]
    fn test_primitives_roundtrip() {
        roundtrip("Int");
        roundtrip("Float");
        roundtrip("Bool");
        roundtrip("String");
    }

    #[test]
    fn test_containers_roundtrip() {
        roundtrip("List<Int>");
        roundtrip("Option<String>");
        roundtrip("Map<Float>");
        roundtrip("List<List<Int>>");
        roundtrip("Option<List<Map<Bool>>>");
    }

    #[test]
    fn test_union_roundtrip() {
        roundtrip("Int | String");
        roundtrip("Int | Float | Bool");
        roundtrip("List<Int | String>");
    }

    #[test]
    fn test_record_roundtrip() {
        roundtrip("{age: Int, name: String}");
        roundtrip("{items: List<Int>}");
    }

    #[test]
    fn test_reject_malformed() {
        assert!("".parse::<TypeDescriptor>().is_err());
        assert!("Intx".parse::<TypeDescriptor>().is_err());
        assert!("List<".parse::<TypeDescriptor>().is_err());
        assert!("List<Int".parse::<TypeDescriptor>().is_err());
        assert!("Int extra".parse::<TypeDescriptor>().is_err());
        assert!("Whatever".parse::<TypeDescriptor>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let ty = TypeDescriptor::list(TypeDescriptor::Int);
        assert_eq!(serde_json::to_string(&ty).unwrap(), r#""List<Int>""#);
        let back: TypeDescriptor = serde_json::from_str(r#""List<Int>""#).unwrap();
        assert_eq!(back, ty);
    }

    #[test]
    fn test_is_numeric() {
        assert!(TypeDescriptor::Int.is_numeric());
        assert!(TypeDescriptor::Float.is_numeric());
        assert!(!TypeDescriptor::Bool.is_numeric());
        assert!(!TypeDescriptor::list(TypeDescriptor::Int).is_numeric());
    }
}
