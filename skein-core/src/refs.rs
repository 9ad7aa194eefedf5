use crate::error::SkeinError;
use crate::image::STRUCTURAL_HASH_LEN;

/// Maximum accepted length for an alias-form ref.
pub const MAX_ALIAS_LEN: usize = 255;

/// A parsed client-supplied pipeline reference.
///
/// Grammar: `HEX{64} | "sha256:" HEX{64} | ALIAS`, where `ALIAS` is any
/// non-whitespace string of 1..=255 chars that is not hash-shaped. A ref
/// that parses as a hash is looked up as a hash only — it never falls
/// through to alias lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineRef {
    Hash(String),
    Alias(String),
}

impl PipelineRef {
    pub fn parse(raw: &str) -> Result<PipelineRef, SkeinError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SkeinError::InvalidRef("blank ref".into()));
        }

        if let Some(rest) = trimmed.strip_prefix("sha256:") {
            if rest.len() == STRUCTURAL_HASH_LEN && rest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Ok(PipelineRef::Hash(rest.to_ascii_lowercase()));
            }
            return Err(SkeinError::InvalidRef(format!(
                "`sha256:` ref must carry {STRUCTURAL_HASH_LEN} hex chars"
            )));
        }

        if is_hash_shaped(trimmed) {
            if trimmed.chars().all(|c| !c.is_ascii_uppercase()) {
                return Ok(PipelineRef::Hash(trimmed.to_string()));
            }
            // Hash-shaped but mixed case: ambiguous, reject rather than
            // silently treating it as an alias.
            return Err(SkeinError::InvalidRef(
                "hash refs must be lowercase hex".into(),
            ));
        }

        if trimmed.len() > MAX_ALIAS_LEN {
            return Err(SkeinError::InvalidRef(format!(
                "alias longer than {MAX_ALIAS_LEN} chars"
            )));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(SkeinError::InvalidRef(
                "alias must not contain whitespace".into(),
            ));
        }

        Ok(PipelineRef::Alias(trimmed.to_string()))
    }
}

/// True when `s` has the exact shape of a structural hash (any hex case).
/// Alias names with this shape are rejected to keep ref parsing total and
/// unambiguous.
pub fn is_hash_shaped(s: &str) -> bool {
    s.len() == STRUCTURAL_HASH_LEN && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate a name for use as an alias. Returns the trimmed name.
pub fn validate_alias_name(raw: &str) -> Result<String, SkeinError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SkeinError::InvalidInput("alias name is empty".into()));
    }
    if name.len() > MAX_ALIAS_LEN {
        return Err(SkeinError::InvalidInput(format!(
            "alias name longer than {MAX_ALIAS_LEN} chars"
        )));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(SkeinError::InvalidInput(
            "alias name must not contain whitespace".into(),
        ));
    }
    if is_hash_shaped(name) {
        return Err(SkeinError::InvalidInput(
            "alias name must not look like a structural hash".into(),
        ));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex64() -> String {
        "0123456789abcdef".repeat(4)
    }

    #[test]
    fn test_bare_hash() {
        let h = hex64();
        assert_eq!(PipelineRef::parse(&h).unwrap(), PipelineRef::Hash(h));
    }

    #[test]
    fn test_prefixed_hash_lowercased() {
        let h = hex64().to_ascii_uppercase();
        let parsed = PipelineRef::parse(&format!("sha256:{h}")).unwrap();
        assert_eq!(parsed, PipelineRef::Hash(hex64()));
    }

    #[test]
    fn test_prefixed_hash_wrong_length() {
        assert!(PipelineRef::parse("sha256:abcd").is_err());
        assert!(PipelineRef::parse("sha256:").is_err());
    }

    #[test]
    fn test_alias() {
        assert_eq!(
            PipelineRef::parse("  passthrough  ").unwrap(),
            PipelineRef::Alias("passthrough".into())
        );
        assert_eq!(
            PipelineRef::parse("etl/daily-report").unwrap(),
            PipelineRef::Alias("etl/daily-report".into())
        );
    }

    #[test]
    fn test_blank_ref_invalid() {
        assert!(PipelineRef::parse("").is_err());
        assert!(PipelineRef::parse("   ").is_err());
    }

    #[test]
    fn test_hash_shaped_uppercase_rejected() {
        let h = hex64().to_ascii_uppercase();
        assert!(PipelineRef::parse(&h).is_err());
    }

    #[test]
    fn test_oversized_alias_rejected() {
        let long = "a".repeat(256);
        assert!(PipelineRef::parse(&long).is_err());
        let ok = "a".repeat(255);
        assert!(PipelineRef::parse(&ok).is_ok());
    }

    #[test]
    fn test_hash_and_alias_forms_never_collide() {
        // Every 64-char pure-hex string parses as hash-form, never alias.
        let h = hex64();
        match PipelineRef::parse(&h).unwrap() {
            PipelineRef::Hash(_) => {}
            PipelineRef::Alias(_) => panic!("hash-shaped ref parsed as alias"),
        }
        // One char short of hash length is an alias.
        let almost = &h[..63];
        assert_eq!(
            PipelineRef::parse(almost).unwrap(),
            PipelineRef::Alias(almost.to_string())
        );
    }

    #[test]
    fn test_validate_alias_name() {
        assert_eq!(validate_alias_name("  etl  ").unwrap(), "etl");
        assert!(validate_alias_name("").is_err());
        assert!(validate_alias_name("has space").is_err());
        assert!(validate_alias_name(&hex64()).is_err());
    }
}
