//! Concrete services.

mod account;
mod auth;
mod search;

pub use account::AccountService;
pub use auth::{AuthenticationService, FORM_CONTENT_TYPE, password_signature};
pub use search::{SearchResult, SearchService, SearchUser};
