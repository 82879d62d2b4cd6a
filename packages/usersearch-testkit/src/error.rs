pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Message(String),

	#[error(transparent)]
	Storage(#[from] usersearch_storage::Error),

	#[error(transparent)]
	Search(#[from] usersearch_service::Error),
}
