use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use events::{ChannelFrame, ProgressEvent};
use futures::stream::{Stream, StreamExt};
use tracing::debug;

use crate::auth::AuthenticatedUser;
use crate::state::AppState;

/// Comment text of a keep-alive frame
pub const HEARTBEAT_COMMENT: &str = "heartbeat";

fn progress_to_sse_event(event: &ProgressEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().data(data)
}

fn frame_to_sse_event(frame: ChannelFrame) -> Result<Event, Infallible> {
    Ok(match frame {
        ChannelFrame::Event(event) => progress_to_sse_event(&event),
        ChannelFrame::Heartbeat => Event::default().comment(HEARTBEAT_COMMENT),
    })
}

#[utoipa::path(
    get,
    path = "/api/software/install-progress",
    params(
        ("token" = String, Query, description = "Credential; event streams cannot send headers"),
    ),
    responses(
        (status = 200, description = "SSE stream of install progress events"),
        (status = 401, description = "Missing or invalid token"),
    ),
    tag = "events"
)]
pub async fn install_progress_stream(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(owner_id = %user.owner_id, "Opening install progress channel");

    let subscription = state.channels.open(&user.owner_id);
    Sse::new(subscription.into_stream().map(frame_to_sse_event))
}
