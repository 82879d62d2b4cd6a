mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Remote, Search, Service};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}

	for (label, value) in [
		("remote.index_path", &cfg.remote.index_path),
		("remote.users_path", &cfg.remote.users_path),
		("remote.meta_key", &cfg.remote.meta_key),
	] {
		if value.is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
		if value.starts_with('/') || value.ends_with('/') {
			return Err(Error::Validation {
				message: format!("{label} must not start or end with '/'."),
			});
		}
	}

	if cfg.remote.meta_key.contains('/') {
		return Err(Error::Validation {
			message: "remote.meta_key must be a single path segment.".to_string(),
		});
	}
	if cfg.remote.index_path == cfg.remote.users_path {
		return Err(Error::Validation {
			message: "remote.index_path must differ from remote.users_path.".to_string(),
		});
	}
	if cfg.search.max_results == 0 {
		return Err(Error::Validation {
			message: "search.max_results must be greater than zero.".to_string(),
		});
	}
	if cfg.search.channel_capacity == 0 {
		return Err(Error::Validation {
			message: "search.channel_capacity must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.service.log_level = cfg.service.log_level.trim().to_string();

	for value in
		[&mut cfg.remote.index_path, &mut cfg.remote.users_path, &mut cfg.remote.meta_key]
	{
		*value = value.trim().to_string();
	}
}
