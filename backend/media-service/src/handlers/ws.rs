/// WebSocket endpoints for live progress and presence
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::db::VideoStore;
use crate::error::AppError;
use crate::middleware::JwtVerifier;
use crate::services::presence::{ConnectionId, PresenceEvent, PresenceRegistry};
use crate::services::progress::{ProgressRelay, SubscriberId, VideoEvent};

#[derive(Message)]
#[rtype(result = "()")]
struct Outbound(String);

/// Forward relay output into the actor mailbox until the sender side is dropped
fn forward<T, A>(mut receiver: UnboundedReceiver<T>, addr: Addr<A>)
where
    T: serde::Serialize + Send + 'static,
    A: Actor + Handler<Outbound>,
    A::Context: actix::dev::ToEnvelope<A, Outbound>,
{
    actix::spawn(async move {
        while let Some(event) = receiver.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => addr.do_send(Outbound(json)),
                Err(e) => tracing::warn!(error = %e, "failed to serialize socket event"),
            }
        }
    });
}

/// WebSocket actor subscribed to one video's progress channel
pub struct ProgressSocket {
    video_id: Uuid,
    subscriber_id: SubscriberId,
    relay: ProgressRelay,
    receiver: Option<UnboundedReceiver<VideoEvent>>,
}

impl Actor for ProgressSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(video_id = %self.video_id, "progress stream started");
        if let Some(receiver) = self.receiver.take() {
            forward(receiver, ctx.address());
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(video_id = %self.video_id, "progress stream stopped");

        let relay = self.relay.clone();
        let video_id = self.video_id;
        let subscriber_id = self.subscriber_id;
        actix::spawn(async move {
            relay.unsubscribe(video_id, subscriber_id).await;
        });
    }
}

impl Handler<Outbound> for ProgressSocket {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ProgressSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        handle_control(msg, ctx);
    }
}

/// WebSocket actor for one presence connection
pub struct PresenceSocket {
    user_id: Uuid,
    connection_id: ConnectionId,
    registry: PresenceRegistry,
    receiver: Option<UnboundedReceiver<PresenceEvent>>,
}

impl Actor for PresenceSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::debug!(user_id = %self.user_id, "presence socket started");
        if let Some(receiver) = self.receiver.take() {
            forward(receiver, ctx.address());
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::debug!(user_id = %self.user_id, "presence socket stopped");

        let registry = self.registry.clone();
        let user_id = self.user_id;
        let connection_id = self.connection_id;
        actix::spawn(async move {
            registry.disconnect(user_id, connection_id).await;
        });
    }
}

impl Handler<Outbound> for PresenceSocket {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for PresenceSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        handle_control(msg, ctx);
    }
}

/// Clients only listen; inbound frames are limited to control traffic
fn handle_control<A>(msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut ws::WebsocketContext<A>)
where
    A: Actor<Context = ws::WebsocketContext<A>>,
{
    match msg {
        Ok(ws::Message::Ping(bytes)) => ctx.pong(&bytes),
        Ok(ws::Message::Close(reason)) => {
            ctx.close(reason);
            ctx.stop();
        }
        Ok(_) => {}
        Err(e) => {
            tracing::debug!(error = %e, "websocket protocol error");
            ctx.stop();
        }
    }
}

/// Live progress for one video
///
/// Usage: `GET /ws/videos/{video_id}/progress`
///
/// Frames are `{"event": "video-progress" | "video-complete" | "video-error",
/// "data": {...}}`. Events emitted before the connection are not replayed;
/// `GET /api/v1/videos/{id}/status` returns the current state.
pub async fn progress_stream_ws(
    req: HttpRequest,
    path: web::Path<String>,
    payload: web::Payload,
    store: web::Data<Arc<dyn VideoStore>>,
    relay: web::Data<ProgressRelay>,
) -> actix_web::Result<HttpResponse> {
    let video_id = Uuid::parse_str(&path)
        .map_err(|_| AppError::BadRequest("Invalid video ID".to_string()))?;

    if store.get(video_id).await?.is_none() {
        return Err(AppError::NotFound("Video not found".to_string()).into());
    }

    let (subscriber_id, receiver) = relay.subscribe(video_id).await;
    let actor = ProgressSocket {
        video_id,
        subscriber_id,
        relay: relay.get_ref().clone(),
        receiver: Some(receiver),
    };

    let response = ws::start(actor, &req, payload);
    if response.is_err() {
        relay.unsubscribe(video_id, subscriber_id).await;
    }
    response
}

#[derive(Debug, Deserialize)]
pub struct PresenceQuery {
    pub token: Option<String>,
}

/// Presence connection
///
/// Usage: `GET /ws/presence?token={jwt}`. Other users receive `user-online`
/// when this user's first connection opens and `user-offline` when the last
/// one closes.
pub async fn presence_ws(
    req: HttpRequest,
    query: web::Query<PresenceQuery>,
    payload: web::Payload,
    verifier: web::Data<JwtVerifier>,
    registry: web::Data<PresenceRegistry>,
) -> actix_web::Result<HttpResponse> {
    let token = query
        .token
        .as_deref()
        .ok_or_else(|| AppError::Unauthorized("Missing token".to_string()))?;
    let user_id = verifier.verify(token)?;

    let (connection_id, receiver) = registry.connect(user_id).await;
    tracing::debug!(
        %user_id,
        connections = registry.connection_count(user_id).await,
        "presence socket opened"
    );
    let actor = PresenceSocket {
        user_id,
        connection_id,
        registry: registry.get_ref().clone(),
        receiver: Some(receiver),
    };

    let response = ws::start(actor, &req, payload);
    if response.is_err() {
        registry.disconnect(user_id, connection_id).await;
    }
    response
}

/// Currently online users
pub async fn online_users(registry: web::Data<PresenceRegistry>) -> HttpResponse {
    let users = registry.online_users().await;
    HttpResponse::Ok().json(serde_json::json!({
        "onlineUsers": users,
        "count": users.len(),
    }))
}
