use argon2::Config as Argon2Config;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{common::timestamp, db::user::NewUser};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_USERNAME_LENGTH: usize = 64;

/// Raw credentials, received from a user. These are never stored directly,
/// since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl TryFrom<Credentials> for NewUser {
    type Error = Error;

    /// Convert [`Credentials`] to a new user by hashing the password.
    /// This enforces the username length and the minimum password length.
    fn try_from(cred: Credentials) -> Result<Self, Self::Error> {
        let username = cred.username.trim();
        if username.is_empty() {
            return Err(Error::validation("username", "must not be empty"));
        }
        if username.chars().count() > MAX_USERNAME_LENGTH {
            return Err(Error::validation(
                "username",
                format!("must be at most {MAX_USERNAME_LENGTH} characters"),
            ));
        }
        if cred.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(Error::validation(
                "password",
                format!("must be at least {MIN_PASSWORD_LENGTH} characters"),
            ));
        }

        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let password_hash =
            argon2::hash_encoded(cred.password.as_bytes(), &salt, &Argon2Config::default())?;
        Ok(Self {
            username: username.to_string(),
            password_hash,
            created_at: timestamp(Utc::now()),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_acceptable_credentials() {
        let user = NewUser::try_from(Credentials::example1()).unwrap();
        assert_eq!(user.username, "alice112");
        assert_ne!(user.password_hash, "surveys4lyfe");
        assert!(user.verify_password("surveys4lyfe"));
    }

    #[test]
    fn rejects_bad_credentials() {
        let empty_name = Credentials {
            username: "   ".into(),
            password: "longenoughpassword".into(),
        };
        assert!(matches!(
            NewUser::try_from(empty_name),
            Err(Error::Validation {
                field: "username",
                ..
            })
        ));

        let short_password = Credentials {
            username: "carol".into(),
            password: "short".into(),
        };
        assert!(matches!(
            NewUser::try_from(short_password),
            Err(Error::Validation {
                field: "password",
                ..
            })
        ));
    }
}
