use serde_json::Value;

/// A child-ordered read bounded below by `start_at` and capped at `limit` children.
///
/// Only string order values are admitted, mirroring a store where missing and non-string values
/// sort before every string bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
	pub path: String,
	pub order_by: String,
	pub start_at: String,
	pub limit: usize,
}
impl RangeQuery {
	pub fn new(path: impl Into<String>) -> Self {
		Self { path: path.into(), order_by: String::new(), start_at: String::new(), limit: 0 }
	}

	pub fn order_by_child(mut self, child: impl Into<String>) -> Self {
		self.order_by = child.into();

		self
	}

	pub fn start_at(mut self, bound: impl Into<String>) -> Self {
		self.start_at = bound.into();

		self
	}

	pub fn limit_to_first(mut self, limit: usize) -> Self {
		self.limit = limit;

		self
	}

	/// Order value of a child under this query, if the child takes part in the ordering at all.
	pub fn order_value<'a>(&self, child: &'a Value) -> Option<&'a str> {
		value_at(child, &self.order_by).and_then(Value::as_str)
	}

	pub fn admits(&self, child: &Value) -> bool {
		self.order_value(child).map(|value| value >= self.start_at.as_str()).unwrap_or(false)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
	pub key: String,
	pub value: Value,
}
impl Snapshot {
	pub fn new(key: impl Into<String>, value: Value) -> Self {
		Self { key: key.into(), value }
	}

	pub fn exists(&self) -> bool {
		!self.value.is_null()
	}

	pub fn has_children(&self) -> bool {
		self.value.as_object().map(|map| !map.is_empty()).unwrap_or(false)
	}

	pub fn child_keys(&self) -> impl Iterator<Item = &str> {
		self.value.as_object().into_iter().flat_map(|map| map.keys().map(String::as_str))
	}

	pub fn child(&self, path: &str) -> Option<&Value> {
		value_at(&self.value, path)
	}
}

pub fn segments(path: &str) -> impl Iterator<Item = &str> {
	path.split('/').filter(|segment| !segment.is_empty())
}

pub fn join(base: &str, child: &str) -> String {
	segments(base).chain(segments(child)).collect::<Vec<_>>().join("/")
}

/// Whether `path` is `prefix` itself or lies underneath it.
pub fn covers(prefix: &str, path: &str) -> bool {
	let mut path = segments(path);

	segments(prefix).all(|segment| path.next() == Some(segment))
}

pub fn value_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
	segments(path).try_fold(root, |node, segment| node.get(segment))
}
