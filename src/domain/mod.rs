/// Domain types shared by the stores and the authentication core

mod token;
mod user;

pub use token::{LedgerEntry, NewRefreshToken, RefreshTokenRecord, TokenPair};
pub use user::{NewUser, Role, User};
