//! Types exchanged with clients over the REST surface.

pub mod analysis;
pub mod auth;
pub mod response;
pub mod survey;
