use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub remote: Remote,
	pub search: Search,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

/// Locations inside the remote tree.
#[derive(Debug, Clone, Deserialize)]
pub struct Remote {
	/// Secondary index root. Children are keyed by entity ID and hold one normalized value per
	/// index name.
	pub index_path: String,
	/// User collection root.
	pub users_path: String,
	/// Child of each user that holds the metadata map.
	#[serde(default = "default_meta_key")]
	pub meta_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Search {
	/// Upper bound for every range query issued by a search.
	pub max_results: usize,
	/// Buffered matches per stream before the producer waits for the consumer.
	#[serde(default = "default_channel_capacity")]
	pub channel_capacity: usize,
}

fn default_meta_key() -> String {
	"meta".to_string()
}

fn default_channel_capacity() -> usize {
	64
}
