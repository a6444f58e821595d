mod bson;
mod collection;
mod errors;

pub use bson::{ApiId, Id};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use errors::is_duplicate_key_error;
