use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload carried by the session cookie. Roles are looked up per request, not embedded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: Uuid,     // user ID
    pub email: String, // normalized email at login time
    pub iat: usize,    // issued at (unix timestamp)
    pub exp: usize,    // expires at (unix timestamp)
}
