use axum::{
    extract::{
        Extension, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::{
    AppState,
    live::{LiveEvent, Viewer},
    routes::message::UnreadSummary,
    utils::Claims,
};

#[axum::debug_handler]
pub async fn live_ws(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(state, claims.sub, socket))
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>,
    event: &LiveEvent,
) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => sender.send(WsMessage::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize live event: {}", e);
            true
        }
    }
}

async fn serve_socket(state: AppState, user_id: String, socket: WebSocket) {
    // 先订阅再取快照，避免两者之间的事件丢失
    let mut rx = state.live.subscribe();
    let (mut sender, mut receiver) = socket.split();

    if let Err(e) = state.store.touch_user(&user_id, chrono::Utc::now()).await {
        tracing::warn!("Failed to update last_active for {}: {}", user_id, e);
    }

    // 角色在连接建立时确定，之后的变更需要重新连接
    let is_admin = match state.store.find_user(&user_id).await {
        Ok(user) => user.is_some_and(|u| u.is_admin()),
        Err(e) => {
            tracing::warn!("Failed to load role for {}: {}", user_id, e);
            false
        }
    };
    let viewer = Viewer {
        user_id: user_id.clone(),
        is_admin,
    };

    match UnreadSummary::for_user(state.store.as_ref(), &user_id).await {
        Ok(summary) => {
            if !send_event(&mut sender, &summary.into_event(&user_id, None)).await {
                return;
            }
        }
        Err(e) => tracing::warn!("Failed to build unread snapshot for {}: {}", user_id, e),
    }

    tracing::debug!("Live connection opened for {}", user_id);
    let mut forward_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !event.is_visible_to(&viewer) {
                        continue;
                    }
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Live subscriber {} lagged by {} events",
                        viewer.user_id,
                        skipped
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // 客户端只需要保持连接，收到 Close 或出错即结束
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, WsMessage::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut forward_task => read_task.abort(),
        _ = &mut read_task => forward_task.abort(),
    }
    tracing::debug!("Live connection closed for {}", user_id);
}
