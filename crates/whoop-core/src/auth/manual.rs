use std::collections::HashMap;
use std::future::Future;

use url::{form_urlencoded, Url};

use super::{AuthError, AuthManager, TokenSet, TokenStore};

/// Run the copy/paste authorization flow: show the authorization URL, read back
/// the redirect URL the browser landed on, verify its state and exchange the code.
pub async fn run_manual_flow<S, Notify, Input, Fut>(
    manager: &AuthManager<S>,
    open_browser: bool,
    notify_authorization_url: Notify,
    mut read_input: Input,
) -> Result<TokenSet, AuthError>
where
    S: TokenStore + Send + Sync,
    Notify: Fn(&Url) -> Result<(), AuthError>,
    Input: FnMut() -> Fut,
    Fut: Future<Output = Result<String, AuthError>>,
{
    let request = manager.begin_authorization();

    notify_authorization_url(&request.url)?;

    if open_browser {
        open::that(request.url.as_str())
            .map_err(|err| AuthError::BrowserLaunch(err.to_string()))?;
    }

    let raw = read_input().await?;
    let callback = parse_callback_input(raw.trim())?;

    // A bare code carries no state and cannot pass the CSRF check.
    let returned_state = callback.state.unwrap_or_default();
    manager
        .complete_authorization(&callback.code, &returned_state, &request.state)
        .await
}

/// Parameters carried by the provider redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: Option<String>,
}

/// Extract `code`/`state` from a pasted redirect URL or its query string
/// (`code=..&state=..`). Anything else is taken as a bare code.
pub fn parse_callback_input(input: &str) -> Result<CallbackParams, AuthError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AuthError::InvalidAuthorizationResponse(
            "nothing was pasted".into(),
        ));
    }

    let query = match Url::parse(input) {
        Ok(url) => url.query().unwrap_or_default().to_owned(),
        Err(_) if input.contains('=') => input.trim_start_matches('?').to_owned(),
        Err(_) => {
            return Ok(CallbackParams {
                code: input.to_owned(),
                state: None,
            })
        }
    };

    let pairs: HashMap<String, String> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    if let Some(reason) = pairs.get("error") {
        return Err(AuthError::AccessDenied(reason.clone()));
    }
    let code = pairs
        .get("code")
        .filter(|code| !code.is_empty())
        .cloned()
        .ok_or(AuthError::MissingAuthorizationCode)?;
    Ok(CallbackParams {
        code,
        state: pairs.get("state").cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::sync::{Arc, Mutex};

    use crate::auth::token_store::memory::MemoryTokenStore;
    use crate::auth::{OAuthClient, OAuthConfig, OAuthEndpoints};

    fn manager(server: &MockServer, store: MemoryTokenStore) -> AuthManager<MemoryTokenStore> {
        let config = OAuthConfig::new(
            "client",
            "secret",
            Url::parse("http://localhost:8501").unwrap(),
        );
        let endpoints = OAuthEndpoints {
            authorization_url: Url::parse("https://auth.example.com/oauth2/auth").unwrap(),
            token_url: Url::parse(&server.url("/token")).unwrap(),
            revocation_url: Url::parse(&server.url("/v2/user/access")).unwrap(),
        };
        let oauth = OAuthClient::with_endpoints(config, endpoints).unwrap();
        AuthManager::load(store, oauth).unwrap()
    }

    #[tokio::test]
    async fn manual_flow_with_full_redirect() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/token").body_contains("code=manual-code");
            then.status(200).json_body_obj(&serde_json::json!({
                "access_token": "abc",
                "refresh_token": "ref",
                "token_type": "Bearer",
                "expires_in": 3600,
            }));
        });

        let store = MemoryTokenStore::default();
        let manager = manager(&server, store.clone());
        let state_holder = Arc::new(Mutex::new(String::new()));

        let notify = {
            let state_holder = state_holder.clone();
            move |url: &Url| {
                let state = url
                    .query_pairs()
                    .find(|(k, _)| k == "state")
                    .map(|(_, v)| v.into_owned())
                    .expect("state present");
                *state_holder.lock().unwrap() = state;
                Ok(())
            }
        };

        let read_input = {
            let state_holder = state_holder.clone();
            move || {
                let state = state_holder.lock().unwrap().clone();
                async move {
                    Ok(format!(
                        "http://localhost:8501/?code=manual-code&state={state}"
                    ))
                }
            }
        };

        let tokens = run_manual_flow(&manager, false, notify, read_input)
            .await
            .expect("manual flow succeeded");

        mock.assert();
        assert_eq!(tokens.access_token, "abc");
        assert_eq!(store.snapshot().unwrap().refresh_token.as_deref(), Some("ref"));
    }

    #[tokio::test]
    async fn manual_flow_rejects_forged_state() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200)
                .json_body_obj(&serde_json::json!({ "access_token": "abc" }));
        });

        let manager = manager(&server, MemoryTokenStore::default());
        let err = run_manual_flow(
            &manager,
            false,
            |_| Ok(()),
            || async { Ok("http://localhost:8501/?code=manual&state=bad".to_string()) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AuthError::StateMismatch));
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn manual_flow_rejects_bare_code() {
        let server = MockServer::start();
        let manager = manager(&server, MemoryTokenStore::default());
        let err = run_manual_flow(
            &manager,
            false,
            |_| Ok(()),
            || async { Ok("raw-code".to_string()) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
    }

    #[test]
    fn parse_input_handles_raw_code() {
        let output = parse_callback_input("code123").unwrap();
        assert_eq!(output.code, "code123");
        assert!(output.state.is_none());
    }

    #[test]
    fn parse_input_handles_url() {
        let response =
            parse_callback_input("http://localhost:8501/?code=abc&state=xyz").unwrap();
        assert_eq!(response.code, "abc");
        assert_eq!(response.state.as_deref(), Some("xyz"));
    }

    #[test]
    fn parse_input_handles_query_string() {
        let response = parse_callback_input("?code=a%2Fb&state=s1").unwrap();
        assert_eq!(response.code, "a/b");
        assert_eq!(response.state.as_deref(), Some("s1"));
    }

    #[test]
    fn parse_input_errors() {
        let err = parse_callback_input("http://localhost:8501/?error=access_denied").unwrap_err();
        assert!(matches!(err, AuthError::AccessDenied(_)));

        let err = parse_callback_input("http://localhost:8501/?state=xyz").unwrap_err();
        assert!(matches!(err, AuthError::MissingAuthorizationCode));

        let err = parse_callback_input("").unwrap_err();
        assert!(matches!(err, AuthError::InvalidAuthorizationResponse(_)));
    }
}
