/*
 * Copyright © 2025, United States Government, as represented by the Administrator of
 * the National Aeronautics and Space Administration. All rights reserved.
 *
 * The “ODIN” software is licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License. You may obtain a copy
 * of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */


//! the push channel. Each connection is registered with the broadcast registry for its lifetime and
//! greeted with a `hello` event. Frames from the registry are forwarded as text messages, incoming
//! messages are ignored (except for close).

use std::sync::Arc;
use axum::{
    extract::{State, ws::{Message, WebSocket, WebSocketUpgrade}},
    response::Response
};
use futures::{sink::SinkExt, stream::StreamExt};
use tracing::{debug,info};

use skytrack_telemetry::{broadcast::{Subscription, TelemetryEvent}, TelemetryHub};
use crate::AppState;

pub async fn ws_handler (ws: WebSocketUpgrade, State(state): State<AppState>)->Response {
    ws.on_upgrade( move |socket| handle_socket( socket, state.hub))
}

async fn handle_socket (ws: WebSocket, hub: Arc<TelemetryHub>) {
    let Subscription { id, mut rx } = hub.registry.register();
    info!("ws connection {id} opened");
    hub.registry.send_to( id, &TelemetryEvent::hello());

    let (mut ws_sender, mut ws_receiver) = ws.split();

    // a closed rx means the registry dropped us (e.g. because we could not keep up)
    let mut send_task = tokio::spawn( async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send( Message::text( frame.to_string())).await.is_err() { break }
        }
        let _ = ws_sender.close().await;
    });

    let mut recv_task = tokio::spawn( async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Text(text) => debug!("ignoring ws message from {id}: {}", text.as_str()),
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.registry.unregister( id);
    info!("ws connection {id} closed");
}
