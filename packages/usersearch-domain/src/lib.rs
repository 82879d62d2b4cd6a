pub mod normalize;
pub mod user;

pub use normalize::{has_prefix, is_null_like_key, normalize};
pub use user::{EntityKind, User};
