use usersearch_domain::{EntityKind, User, has_prefix, is_null_like_key, normalize};

#[test]
fn normalize_ignores_case_and_spaces() {
	assert_eq!(normalize("John Smith"), "johnsmith");
	assert_eq!(normalize("  johnSMITH "), "johnsmith");
	assert_eq!(normalize("John Smith"), normalize("  johnSMITH "));
}

#[test]
fn normalize_maps_blank_input_to_empty() {
	assert_eq!(normalize(""), "");
	assert_eq!(normalize("   "), "");
	assert_eq!(normalize("\t\n "), "");
	assert_eq!(normalize(None), "");
}

#[test]
fn normalize_is_idempotent() {
	for value in ["John Smith", "  MiXeD   case\tvalue ", "", "ÀÉÎ Õü", "already"] {
		let once = normalize(value);

		assert_eq!(normalize(once.as_str()), once, "Not idempotent for {value:?}.");
	}
}

#[test]
fn prefix_check_uses_normalized_forms() {
	assert!(has_prefix(Some("John Smith"), "john"));
	assert!(has_prefix(Some("Johnny Appleseed"), " JO HN "));
	assert!(!has_prefix(Some("Janet Doe"), "john"));
	assert!(!has_prefix(None, "john"));
}

#[test]
fn prefix_check_rejects_values_that_only_sort_after_the_bound() {
	// "johnz" sorts after "john" but a range query bounded at "johnsmith" would still return it.
	assert!(!has_prefix(Some("Johnz"), "John Smith"));
}

#[test]
fn null_like_keys_are_detected() {
	for key in ["", "   ", "null", "(null)"] {
		assert!(is_null_like_key(key), "Expected {key:?} to be null-like.");
	}
	for key in ["nullable", "u1", "(nil)", "NULLX"] {
		assert!(!is_null_like_key(key), "Expected {key:?} to be a real key.");
	}
}

#[test]
fn user_meta_round_trips_through_json() {
	let user = User::new("u1").with_meta("name", "John Smith");
	let encoded = serde_json::to_value(&user).expect("Failed to encode user.");

	assert_eq!(encoded["meta"]["name"], "John Smith");

	let decoded: User = serde_json::from_value(encoded).expect("Failed to decode user.");

	assert_eq!(decoded, user);
	assert_eq!(decoded.meta_string("name"), Some("John Smith"));
	assert!(decoded.is_entity("u1"));
}

#[test]
fn entity_kind_serializes_as_snake_case() {
	assert_eq!(serde_json::to_value(EntityKind::User).expect("Failed to encode kind."), "user");
}
