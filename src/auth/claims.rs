use serde::{Deserialize, Serialize};

use crate::store::Role;

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: i64,      // user ID
    pub email: String, // email at issuance
    pub role: Role,    // role at issuance, may be stale
    pub iat: i64,      // issued at (unix timestamp)
    pub exp: i64,      // expires at (unix timestamp)
    pub iss: String,   // issuer
    pub aud: String,   // audience
}
