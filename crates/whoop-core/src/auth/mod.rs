mod error;
mod manual;
mod oauth;
mod orchestrator;
pub(crate) mod token_store;
mod tokens;
mod utils;

pub use error::AuthError;
pub use manual::{parse_callback_input, run_manual_flow, CallbackParams};
pub use oauth::{
    OAuthClient, OAuthConfig, OAuthEndpoints, DEFAULT_EXPIRES_IN_SECS, DEFAULT_SCOPES,
};
pub use orchestrator::{AuthManager, AuthorizationRequest, DEFAULT_REFRESH_WINDOW_MINUTES};
pub use token_store::{FileTokenStore, TokenStore};
pub use tokens::{TokenSet, DEFAULT_TOKEN_TYPE};
pub use utils::{random_state, verify_state};

pub(crate) use oauth::{HTTP_TIMEOUT, USER_AGENT};
