use serde::{Deserialize, Serialize};

use crate::models::VoteValue;

// -- JWT Claims --

/// Access token payload. `exp` is an absolute Unix timestamp in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub exp: i64,
}

// -- Auth --

/// Register and login share one body shape.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

/// Plain acknowledgement body, e.g. `{"response": "logged out"}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub response: String,
}

impl Ack {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
        }
    }
}

// -- Posts --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostRequest {
    pub title: String,
    pub text: String,
}

// -- Votes --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteRequest {
    pub value: VoteValue,
}
