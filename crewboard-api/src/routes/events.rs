/// Live change feed endpoint (SSE)
///
/// Streams row-change notifications to the authenticated client over
/// Server-Sent Events.
///
/// # Endpoint
///
/// ```text
/// GET /v1/events/stream
/// ```
///
/// # SSE Event Format
///
/// ```text
/// event: change
/// data: {"entity":"task","op":"created","row_id":"...","team_id":"...","actor_id":"...","occurred_at":"..."}
///
/// event: resync
/// data: {}
/// ```
///
/// # Delivery rules
///
/// Every event is checked against the same predicates as reads before it
/// is forwarded: team-scoped events require the subscriber to be a member
/// or the owner of the team at delivery time, and unscoped (profile)
/// events are delivered only to the actor themselves. A client never
/// observes activity in teams it cannot read.
///
/// A subscriber that falls behind the feed's buffer receives a `resync`
/// event instead of a gap; bursts of lag are coalesced into a single
/// `resync` once the burst goes quiet. On `resync` the client must
/// re-fetch through the regular endpoints.
///
/// # Example
///
/// ```bash
/// curl -N -H "Authorization: Bearer <token>" \
///   "http://localhost:8080/v1/events/stream"
/// ```

use crate::{app::AppState, error::ApiError};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use crewboard_shared::{
    auth::middleware::AuthContext,
    events::{ChangeEvent, Debouncer},
    policy,
};
use futures::stream::Stream;
use sqlx::PgPool;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_stream::{wrappers::ReceiverStream, StreamExt as _};
use uuid::Uuid;

/// Quiet window for coalescing lag-induced resync signals
const RESYNC_DEBOUNCE: Duration = Duration::from_millis(500);

/// Per-subscriber forwarding buffer
const SUBSCRIBER_BUFFER: usize = 64;

/// Change feed stream handler
///
/// Subscribes to the in-process feed at its current tail and forwards
/// policy-visible events until the client disconnects.
pub async fn stream_changes(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    tracing::info!(user_id = %auth.user_id, "Opening change feed subscription");

    let mut feed_rx = state.feed.subscribe();
    let (tx, out_rx) = mpsc::channel::<Event>(SUBSCRIBER_BUFFER);
    let user_id = auth.user_id;
    let db = state.db.clone();

    // Forwarding task: filters by policy, coalesces lag into resync, and
    // stops when the client side of the channel is dropped.
    tokio::spawn(async move {
        let mut resync = Debouncer::new(RESYNC_DEBOUNCE);

        loop {
            tokio::select! {
                received = feed_rx.recv() => match received {
                    Ok(event) => {
                        if !event_visible(&db, user_id, &event).await {
                            continue;
                        }

                        let sse_event = match Event::default().event("change").json_data(&event) {
                            Ok(e) => e,
                            Err(e) => {
                                tracing::warn!(error = %e, "Failed to encode change event");
                                continue;
                            }
                        };
                        if tx.send(sse_event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(user_id = %user_id, missed, "Subscriber lagged, scheduling resync");
                        resync.touch();
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = resync.fired() => {
                    if tx.send(resync_event()).await.is_err() {
                        break;
                    }
                }
                // Prompt teardown on disconnect even while the feed is quiet
                _ = tx.closed() => break,
            }
        }

        tracing::debug!(user_id = %user_id, "Change feed subscription closed");
    });

    let stream = ReceiverStream::new(out_rx).map(Ok::<_, Infallible>);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(25))))
}

/// The stale-state marker sent after lag
fn resync_event() -> Event {
    Event::default().event("resync").data("{}")
}

/// Applies the read policy to a single event at delivery time
///
/// Team-scoped events require the subscriber to be a member or the owner
/// of the team at that moment; a membership revoked after subscribing
/// silences the team immediately. A failed lookup drops the event.
async fn event_visible(db: &PgPool, subscriber: Uuid, event: &ChangeEvent) -> bool {
    match event.team_scope() {
        Some(team_id) => policy::is_member_or_owner(db, team_id, subscriber)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Visibility check failed, dropping event");
                false
            }),
        None => unscoped_event_visible(subscriber, event.actor_id),
    }
}

/// Visibility rule shared with the forwarding task, kept separate for
/// testability: unscoped events are private to their actor.
pub fn unscoped_event_visible(subscriber: Uuid, actor_id: Uuid) -> bool {
    subscriber == actor_id
}
