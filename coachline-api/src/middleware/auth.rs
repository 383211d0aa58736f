use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use coachline_core::Traveller;
use coachline_shared::Masked;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;

pub const PASSENGER_ROLE: &str = "PASSENGER";
pub const CARRIER_ROLE: &str = "CARRIER";

// ============================================================================
// JWT Claims
// ============================================================================

/// Claims issued by the login service. `sub` is the passenger id, or the
/// carrier id for carrier tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub email: Masked<String>,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn traveller(&self) -> Traveller {
        Traveller {
            id: self.sub,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

fn authenticate(
    state: &AppState,
    header: Option<TypedHeader<Authorization<Bearer>>>,
    role: &str,
) -> Result<Claims, StatusCode> {
    let TypedHeader(Authorization(bearer)) = header.ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer token");
        StatusCode::UNAUTHORIZED
    })?;

    if token_data.claims.role != role {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(token_data.claims)
}

// ============================================================================
// Passenger Authentication Middleware
// ============================================================================

pub async fn passenger_auth_middleware(
    State(state): State<AppState>,
    header: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims = authenticate(&state, header, PASSENGER_ROLE)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

// ============================================================================
// Carrier Authentication Middleware
// ============================================================================

pub async fn carrier_auth_middleware(
    State(state): State<AppState>,
    header: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims = authenticate(&state, header, CARRIER_ROLE)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
