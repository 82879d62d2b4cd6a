use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
	User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	pub entity_id: String,
	#[serde(default)]
	pub meta: BTreeMap<String, String>,
}
impl User {
	pub fn new(entity_id: impl Into<String>) -> Self {
		Self { entity_id: entity_id.into(), meta: BTreeMap::new() }
	}

	pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.meta.insert(key.into(), value.into());

		self
	}

	pub fn meta_string(&self, key: &str) -> Option<&str> {
		self.meta.get(key).map(String::as_str)
	}

	pub fn is_entity(&self, entity_id: &str) -> bool {
		self.entity_id == entity_id
	}
}
