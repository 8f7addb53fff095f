//! WebSocket event-stream endpoint.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;

use opflow_core::EventType;

use crate::events::EventBroadcaster;
use crate::request::RequestContext;
use crate::response::{bad_request, ApiResponse};

/// `GET /1.0/events` -- upgrades to a WebSocket and streams every broadcast
/// event until the peer goes away.
///
/// The `type` query parameter (comma-separated `logging`, `operation`,
/// default both) is recorded on the listener but not enforced.
pub async fn events_get(mut ctx: RequestContext) -> ApiResponse {
    let filter = ctx.query_param("type").unwrap_or_default();
    let types = EventType::parse_filter(&filter);
    let events = ctx.state().events().clone();

    let (mut parts, _body) = ctx.take_request().into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return bad_request(rejection),
    };

    let response = upgrade.on_upgrade(move |socket| write_loop(socket, events, types));
    ApiResponse::Raw(Box::new(response))
}

/// Per-listener write loop: owns the socket, drains the listener's
/// outbound queue in broadcast order, and disconnects the listener on the
/// first failed write. Returning closes the connection, so the upgrade
/// body blocks exactly until the listener is done.
async fn write_loop(mut socket: WebSocket, events: EventBroadcaster, types: Vec<EventType>) {
    let (listener, mut queue) = events.register(types);
    let mut done = listener.done_receiver();

    loop {
        tokio::select! {
            body = queue.recv() => {
                match body {
                    Some(body) => {
                        if socket.send(Message::Text(body.into())).await.is_err() {
                            events.disconnect(listener.id());
                            break;
                        }
                    }
                    // The broadcaster dropped this listener.
                    None => break,
                }
            }
            changed = done.changed() => {
                if changed.is_err() || *done.borrow() {
                    break;
                }
            }
        }
    }
}
