//! Identity extraction from the login cookie.
//!
//! The cookie holds a JWT issued and verified by the login service upstream.
//! Only the payload is decoded here; the signature is not checked.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::request::Request;
use crate::response::Response;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("cookie `{0}` is missing")]
    MissingCookie(String),

    #[error("token is not a three-part JWT")]
    Malformed,

    #[error("token payload is not base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("token payload is not valid claims JSON: {0}")]
    Claims(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct Claims {
    sub: String,
}

/// Decodes the `sub` claim from a compact-serialised JWT.
pub fn subject_from_token(token: &str) -> Result<String, IdentityError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(IdentityError::Malformed);
    };

    let json = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let claims: Claims = serde_json::from_slice(&json)?;
    Ok(claims.sub)
}

/// Reads cookie `cookie_name` from `req` and returns its subject.
pub fn subject_from_request(req: &Request, cookie_name: &str) -> Result<String, IdentityError> {
    let token = req
        .cookie(cookie_name)
        .ok_or_else(|| IdentityError::MissingCookie(cookie_name.to_owned()))?;
    subject_from_token(token)
}

#[derive(Serialize)]
struct Fodselsnr {
    fodselsnr: String,
}

/// `GET /fodselsnr`
pub async fn fodselsnr(req: Request, cookie_name: &str) -> Result<Response, AppError> {
    let subject = subject_from_request(&req, cookie_name)?;
    Ok(Response::json_value(&Fodselsnr { fodselsnr: subject }))
}

#[cfg(test)]
pub(crate) fn test_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}
