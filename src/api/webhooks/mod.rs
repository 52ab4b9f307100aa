//! Webhook endpoints for messaging providers

use std::sync::Arc;

use axum::{Router, middleware, routing::post};

use super::{ApiState, rate_limit};

pub mod twilio;

/// Build webhooks router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/whatsapp", post(twilio::handle_message))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .with_state(state)
}
