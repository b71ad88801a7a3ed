use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{CheckOutcome, Publisher};

/// Kick off a throttled publication check without delaying the request
pub async fn auto_publish(
    State(publisher): State<Arc<Publisher>>,
    request: Request,
    next: Next,
) -> Response {
    tokio::spawn(async move {
        match publisher.check(Utc::now()).await {
            Ok(CheckOutcome::Completed(report)) if !report.published.is_empty() => {
                debug!(
                    "Opportunistic check published {} chapter(s)",
                    report.published.len()
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Opportunistic publication check failed: {}", e.log_safe()),
        }
    });

    next.run(request).await
}
