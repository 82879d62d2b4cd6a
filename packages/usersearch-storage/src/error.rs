#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("Permission denied at {path}.")]
	PermissionDenied { path: String },
	#[error("Disconnected: {message}")]
	Disconnected { message: String },
	#[error("Invalid path: {path}")]
	InvalidPath { path: String },
	#[error("Malformed snapshot: {message}")]
	MalformedSnapshot { message: String },
}
impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::MalformedSnapshot { message: err.to_string() }
	}
}
