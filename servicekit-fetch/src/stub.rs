//! Deterministic stub transport for tests.
//!
//! A [`StubTransport`] answers requests from an ordered list of
//! [`StubRule`]s. Rule selection is structural only: the first rule whose
//! path is a substring of the outgoing URL and whose parameters (if given)
//! equal the outgoing parameters wins. The rule's auth state does not take
//! part in selection.
//!
//! Once a rule is selected its auth state is applied to the token store
//! (`Authenticated` stores the token, `Unauthenticated` clears it) before
//! the outcome is delivered, so the caller observes the post-mutation state.
//!
//! ```ignore
//! let stub = StubTransport::new(vec![
//!     StubRule::new("/oauth2/token")
//!         .succeed(200, json!({"token_type": "access", "access_token": "KWALI"})),
//! ]);
//! ```

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use servicekit_core::{
    ErrorDetails, HttpMethod, JsonObject, RequestBody, ServiceError, ServiceFailure,
};
use tracing::{debug, error, instrument};

use crate::token::TokenManager;
use crate::transport::{Transport, TransportRequest, TransportResponse};

// ============================================================================
// Rule Types
// ============================================================================

/// Which requests a rule answers.
#[derive(Debug, Clone, PartialEq)]
pub struct StubRequest {
    /// Substring the outgoing URL must contain.
    pub path: String,
    /// Exact parameter set the outgoing request must carry, if any.
    pub parameters: Option<JsonObject>,
}

/// The auth side effect of a rule.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StubAuth {
    /// Store this token response before answering.
    Authenticated {
        /// Token response fields.
        token: JsonObject,
        /// Account the token belongs to.
        identity: Option<String>,
    },
    /// Clear the stored token before answering.
    #[default]
    Unauthenticated,
}

/// What a rule answers with.
#[derive(Debug, Clone, PartialEq)]
pub enum StubOutcome {
    /// A 2xx response.
    Success {
        /// HTTP status.
        code: u16,
        /// JSON body; `Null` sends an empty body.
        body: Value,
    },
    /// A failing response.
    Failure {
        /// HTTP status.
        code: u16,
        /// JSON body, parsed for error details.
        body: Value,
    },
}

/// When a rule answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StubTiming {
    /// Answer right away.
    #[default]
    Immediate,
    /// Answer after a delay.
    Delayed(Duration),
}

/// One stubbed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct StubRule {
    /// Request matcher.
    pub request: StubRequest,
    /// Auth side effect.
    pub auth: StubAuth,
    /// Response.
    pub outcome: StubOutcome,
    /// Delivery timing.
    pub timing: StubTiming,
}

impl StubRule {
    /// Creates a rule for URLs containing `path`, answering `200 {}`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            request: StubRequest {
                path: path.into(),
                parameters: None,
            },
            auth: StubAuth::Unauthenticated,
            outcome: StubOutcome::Success {
                code: 200,
                body: Value::Object(JsonObject::new()),
            },
            timing: StubTiming::Immediate,
        }
    }

    /// Requires an exact parameter set.
    ///
    /// Non-object values are ignored.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.request.parameters = match parameters {
            Value::Object(map) => Some(map),
            _ => None,
        };
        self
    }

    /// Answers with success.
    #[must_use]
    pub fn succeed(mut self, code: u16, body: Value) -> Self {
        self.outcome = StubOutcome::Success { code, body };
        self
    }

    /// Answers with failure.
    #[must_use]
    pub fn fail(mut self, code: u16, body: Value) -> Self {
        self.outcome = StubOutcome::Failure { code, body };
        self
    }

    /// Stores `token` before answering.
    ///
    /// Non-object values store an empty response, which no schema accepts.
    #[must_use]
    pub fn authenticated(mut self, token: Value) -> Self {
        self.auth = StubAuth::Authenticated {
            token: token.as_object().cloned().unwrap_or_default(),
            identity: None,
        };
        self
    }

    /// Stores `token` for `identity` before answering.
    #[must_use]
    pub fn authenticated_as(mut self, identity: impl Into<String>, token: Value) -> Self {
        self.auth = StubAuth::Authenticated {
            token: token.as_object().cloned().unwrap_or_default(),
            identity: Some(identity.into()),
        };
        self
    }

    /// Clears the token before answering.
    #[must_use]
    pub fn unauthenticated(mut self) -> Self {
        self.auth = StubAuth::Unauthenticated;
        self
    }

    /// Answers after `delay`.
    #[must_use]
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.timing = StubTiming::Delayed(delay);
        self
    }

    /// Returns true if this rule structurally matches.
    pub fn matches(&self, path: &str, parameters: Option<&JsonObject>) -> bool {
        if !path.contains(self.request.path.as_str()) {
            return false;
        }
        match &self.request.parameters {
            None => true,
            Some(expected) => parameters.is_some_and(|actual| actual == expected),
        }
    }
}

/// Returns the first rule matching `path` and `body`.
pub fn select_rule<'a>(rules: &'a [StubRule], path: &str, body: &RequestBody) -> Option<&'a StubRule> {
    let parameters = body.parameters();
    rules.iter().find(|rule| rule.matches(path, parameters))
}

// ============================================================================
// Stub Transport
// ============================================================================

/// A request the stub transport received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// URL as sent.
    pub url: String,
    /// Body as sent.
    pub body: RequestBody,
}

/// Rule-driven transport.
#[derive(Debug, Default)]
pub struct StubTransport {
    rules: RwLock<Vec<StubRule>>,
    tokens: RwLock<Option<TokenManager>>,
    recorded: RwLock<Vec<RecordedRequest>>,
    strict: bool,
}

impl StubTransport {
    /// Creates a transport answering from `rules`.
    ///
    /// Unmatched requests fail with [`ServiceError::UnmatchedStub`].
    pub fn new(rules: Vec<StubRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
            ..Self::default()
        }
    }

    /// Creates a transport that panics on unmatched requests.
    pub fn strict(rules: Vec<StubRule>) -> Self {
        Self {
            strict: true,
            ..Self::new(rules)
        }
    }

    /// Replaces the rule list.
    pub fn set_rules(&self, rules: Vec<StubRule>) {
        *self.rules.write().unwrap_or_else(std::sync::PoisonError::into_inner) = rules;
    }

    /// Appends a rule after the existing ones.
    pub fn push_rule(&self, rule: StubRule) {
        self.rules
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(rule);
    }

    /// Binds the token store that auth side effects apply to.
    pub fn bind_token_manager(&self, tokens: TokenManager) {
        *self.tokens.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(tokens);
    }

    /// Returns every request received so far.
    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.recorded
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn select(&self, request: &TransportRequest) -> Option<StubRule> {
        let rules = self.rules.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        select_rule(&rules, &request.url, &request.body).cloned()
    }

    fn token_manager(&self) -> Option<TokenManager> {
        self.tokens
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    async fn apply_auth(&self, auth: &StubAuth) -> Result<(), ServiceFailure> {
        let Some(tokens) = self.token_manager() else {
            return Err(ServiceError::InvalidStub(
                "no token store bound to the stub transport".to_string(),
            )
            .into());
        };

        match auth {
            StubAuth::Authenticated { token, identity } => {
                if tokens.store(token, identity.as_deref()).await.is_none() {
                    return Err(ServiceError::InvalidStub(
                        "stubbed token info does not satisfy the token schema".to_string(),
                    )
                    .into());
                }
            }
            StubAuth::Unauthenticated => tokens.clear().await,
        }
        Ok(())
    }
}

fn outcome(url: &str, outcome: &StubOutcome) -> Result<TransportResponse, ServiceFailure> {
    match outcome {
        StubOutcome::Success { code, body } => {
            let bytes = if body.is_null() {
                Vec::new()
            } else {
                serde_json::to_vec(body).map_err(|e| ServiceError::InvalidStub(e.to_string()))?
            };
            Ok(TransportResponse::new(*code, bytes))
        }
        StubOutcome::Failure { code, body } => {
            let details = body.as_object().and_then(ErrorDetails::from_json).map(|d| {
                d.with_raw_body(body.to_string()).with_path(url)
            });
            Err(ServiceFailure::with_details(
                ServiceError::from_status(*code),
                details,
            ))
        }
    }
}

#[async_trait]
impl Transport for StubTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, ServiceFailure> {
        self.recorded
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(RecordedRequest {
                method: request.method,
                url: request.url.clone(),
                body: request.body.clone(),
            });

        let Some(rule) = self.select(request) else {
            if self.strict {
                panic!(
                    "no stub rule matches {} {} (parameters: {:?})",
                    request.method,
                    request.url,
                    request.body.parameters()
                );
            }
            error!("No stub rule matches request");
            return Err(ServiceError::UnmatchedStub {
                method: request.method.to_string(),
                path: request.url.clone(),
            }
            .into());
        };
        debug!(rule = %rule.request.path, "Stub rule matched");

        self.apply_auth(&rule.auth).await?;

        if let StubTiming::Delayed(delay) = rule.timing {
            tokio::time::sleep(delay).await;
        }

        outcome(&request.url, &rule.outcome)
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

// ============================================================================
// Tests
// ============================================================================
