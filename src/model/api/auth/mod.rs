mod credentials;
mod token;

pub use credentials::{Credentials, MAX_USERNAME_LENGTH, MIN_PASSWORD_LENGTH};
pub use token::{AuthToken, IssuedToken};
