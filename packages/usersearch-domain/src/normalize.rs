//! Query canonicalization shared by range-query bounds and local prefix checks.
//!
//! Both call sites must go through [`normalize`]; a bound computed one way and a check computed
//! another way silently drops or admits the wrong entities.

/// Placeholder key written by clients that serialized a missing identifier.
pub const NULL_KEY: &str = "null";
/// Placeholder key written by clients that formatted a nil object.
pub const NIL_DESCRIPTION_KEY: &str = "(null)";

/// Canonical form of a searchable value: every whitespace character removed, then lower-cased.
///
/// Absent, empty and whitespace-only values all map to the empty string. The function is
/// idempotent.
pub fn normalize<'a>(value: impl Into<Option<&'a str>>) -> String {
	let Some(value) = value.into() else {
		return String::new();
	};

	if value.trim().is_empty() {
		return String::new();
	}

	value.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase()
}

/// Whether `candidate`, once normalized, starts with the normalized `query`.
pub fn has_prefix(candidate: Option<&str>, query: &str) -> bool {
	let query = normalize(query);

	if query.is_empty() {
		return false;
	}

	normalize(candidate).starts_with(&query)
}

/// Index keys that can never name a real entity. Dereferencing them stalls the entity fetch, so
/// they are dropped before resolution.
pub fn is_null_like_key(key: &str) -> bool {
	key.trim().is_empty() || key == NULL_KEY || key == NIL_DESCRIPTION_KEY
}
