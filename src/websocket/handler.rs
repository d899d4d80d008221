use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::msg_presence_handler::{handle_cursor_message, handle_highlight_message};
use super::msg_text_change_handler::handle_text_change_message;
use super::session::{SessionCtx, SessionError};
use crate::db::store::StoreError;
use crate::models::{CodeFile, ConnectParams, ReceivedMessage, SendMessage, UserRecord};
use crate::services::auth_service::AuthError;
use crate::state::AppState;
use crate::utils::scope_guard::ScopeGuard;
use crate::ws::registry::Channel;

/// How long a closing connection may take to flush its queued messages
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket handler for `/collaboration/ws/{file_id}?token=...`
///
/// The credential and the file access are checked before the session starts.
/// A refused join is closed with a policy-violation frame and never registered.
pub async fn websocket_handler(
    Path(file_id): Path<i64>,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    info!("New collaboration connection attempt for file {}", file_id);

    match admit(&state, file_id, params.token.as_deref()).await {
        Ok((user, file)) => ws.on_upgrade(move |socket| handle_socket(socket, state, user, file)),
        Err(e) => {
            info!("Rejected connection to file {}: {}", file_id, e);
            ws.on_upgrade(move |socket| reject(socket, e))
        }
    }
}

/// Authenticate the credential, then check the user may edit the file
async fn admit(
    state: &AppState,
    file_id: i64,
    token: Option<&str>,
) -> Result<(UserRecord, CodeFile), SessionError> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::MissingToken("token query parameter".to_string()))?;
    let user = state.auth.resolve_user(&state.store, token).await?;

    let file = state
        .store
        .get_file(file_id)
        .await?
        .ok_or(SessionError::NotFound(file_id))?;
    if !file.is_accessible_by(user.id) {
        return Err(SessionError::Authorization { user_id: user.id, file_id });
    }
    Ok((user, file))
}

async fn reject(mut socket: WebSocket, err: SessionError) {
    let frame = CloseFrame {
        code: err.close_code(),
        reason: err.close_reason().into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!("Failed to send close frame to rejected connection: {}", e);
    }
}

/// Handle a joined connection until it disconnects
async fn handle_socket(socket: WebSocket, state: AppState, user: UserRecord, file: CodeFile) {
    let file_id = file.id;
    let user_id = user.id;
    let (sender, mut receiver) = socket.split();

    let (channel, outbound) = Channel::new(state.config.ws_send_buffer);
    let conn_id = channel.conn_id();
    let mut writer = tokio::spawn(write_outbound(sender, outbound));

    state.registry().register(file_id, user_id, channel.clone());
    info!("User {} joined file {} (connection {})", user_id, file_id, conn_id);

    // Deregister, then announce the departure, whichever way the loop below ends.
    let teardown = {
        let broadcaster = state.broadcaster.clone();
        ScopeGuard::new(move || {
            if broadcaster.registry().deregister(file_id, user_id, conn_id) {
                broadcaster.broadcast(file_id, &SendMessage::UserLeft { user_id }, None);
                info!("User {} left file {} (connection {})", user_id, file_id, conn_id);
            } else {
                info!("Connection {} of user {} on file {} closed, no longer registered", conn_id, user_id, file_id);
            }
        })
    };

    // A delete that ran between admission and registration closed a snapshot without us.
    if file_still_exists(&state, file_id, user_id).await {
        state.broadcaster.broadcast(
            file_id,
            &SendMessage::UserJoined { user_id, email: user.email.clone() },
            Some(user_id),
        );
        state
            .broadcaster
            .send_direct(&channel, &SendMessage::InitialContent { content: file.content });
    } else {
        state.registry().deregister(file_id, user_id, conn_id);
        channel.close();
    }

    let ctx = SessionCtx {
        file_id,
        user_id,
        store: state.store.clone(),
        broadcaster: state.broadcaster.clone(),
    };

    let mut writer_done = false;
    loop {
        tokio::select! {
            _ = channel.closed() => {
                debug!("Connection {} asked to close", conn_id);
                break;
            }
            _ = &mut writer => {
                debug!("Writer of connection {} stopped", conn_id);
                writer_done = true;
                break;
            }
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = handle_text_frame(&ctx, &text).await {
                        error!("Closing connection {} of user {} on file {}: {}", conn_id, user_id, file_id, e);
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Receive error on connection {}: {}", conn_id, e);
                    break;
                }
            }
        }
    }

    drop(teardown);
    drop(channel);

    // With every sender gone the writer flushes what is queued and sends a close frame.
    if !writer_done && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
}

async fn file_still_exists(state: &AppState, file_id: i64, user_id: i64) -> bool {
    match state.store.get_file(file_id).await {
        Ok(Some(_)) => true,
        Ok(None) => {
            info!("File {} was deleted while user {} was joining", file_id, user_id);
            false
        }
        Err(e) => {
            error!("Failed to recheck file {} for user {}: {}", file_id, user_id, e);
            false
        }
    }
}

/// Decode one inbound frame and dispatch it. Only store faults are returned.
async fn handle_text_frame(ctx: &SessionCtx, text: &str) -> Result<(), StoreError> {
    let msg: ReceivedMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(
                "Ignoring malformed message from user {} on file {}: {}",
                ctx.user_id, ctx.file_id, e
            );
            return Ok(());
        }
    };

    match msg {
        ReceivedMessage::TextChange(change) => handle_text_change_message(ctx, change).await?,
        ReceivedMessage::CursorPosition(cursor) => handle_cursor_message(ctx, cursor),
        ReceivedMessage::Highlight(highlight) => handle_highlight_message(ctx, highlight),
        ReceivedMessage::Unknown => {
            warn!("Received unknown message type from user {} on file {}", ctx.user_id, ctx.file_id);
        }
    }
    Ok(())
}

async fn write_outbound(mut sender: SplitSink<WebSocket, Message>, mut outbound: mpsc::Receiver<String>) {
    while let Some(text) = outbound.recv().await {
        if let Err(e) = sender.send(Message::Text(text)).await {
            debug!("Send failed, dropping connection: {}", e);
            return;
        }
    }
    let _ = sender
        .send(Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        })))
        .await;
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::db::store::FileStore;
    use crate::models::CodeFileUpdate;
    use crate::routes::create_app;
    use crate::services::auth_service::AuthService;
    use crate::state::AppState;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::{
        connect_async,
        tungstenite::{protocol::frame::coding::CloseCode, Message as WsFrame},
        MaybeTlsStream, WebSocketStream,
    };
    use tower::ServiceExt;

    type ClientSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    struct TestServer {
        state: AppState,
        addr: std::net::SocketAddr,
    }

    struct TestUser {
        id: i64,
        token: String,
    }

    async fn spawn_server() -> TestServer {
        let config = Config { ws_send_buffer: 64, ..Config::default() };
        let state = AppState::new(config, FileStore::in_memory(), AuthService::new("test-secret".into(), 30, 4));
        let app = create_app(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        TestServer { state, addr }
    }

    impl TestServer {
        async fn user(&self, email: &str) -> TestUser {
            let record = self.state.store.create_user(email, "unused").await.unwrap();
            TestUser { id: record.id, token: self.state.auth.issue_token(record.id).unwrap() }
        }

        async fn file_with(&self, owner: &TestUser, content: &str) -> i64 {
            let file = self.state.store.create_file(owner.id, "shared.txt").await.unwrap();
            let update = CodeFileUpdate { content: Some(content.into()), filename: None };
            self.state.store.update_file(file.id, &update).await.unwrap();
            file.id
        }

        async fn connect(&self, file_id: i64, token: &str) -> ClientSocket {
            let url = format!("ws://{}/api/collaboration/ws/{}?token={}", self.addr, file_id, token);
            let (socket, _) = connect_async(url).await.unwrap();
            socket
        }

        /// Connect and consume the `initial_content` handshake
        async fn join(&self, file_id: i64, user: &TestUser) -> (ClientSocket, String) {
            let mut socket = self.connect(file_id, &user.token).await;
            let first = next_json(&mut socket).await;
            assert_eq!(first["type"], "initial_content");
            (socket, first["content"].as_str().unwrap().to_string())
        }

        async fn post_json(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
            let req = Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            let res = create_app(self.state.clone()).oneshot(req).await.unwrap();
            let status = res.status();
            let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
            (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
        }
    }

    async fn next_json(socket: &mut ClientSocket) -> Value {
        loop {
            let frame = timeout(Duration::from_secs(2), socket.next())
                .await
                .expect("timed out waiting for a message")
                .expect("stream ended")
                .expect("websocket error");
            match frame {
                WsFrame::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                WsFrame::Ping(_) | WsFrame::Pong(_) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    async fn expect_silence(socket: &mut ClientSocket) {
        assert!(
            timeout(Duration::from_millis(200), socket.next()).await.is_err(),
            "expected no message"
        );
    }

    async fn expect_policy_close(socket: &mut ClientSocket) {
        let frame = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for close")
            .expect("stream ended")
            .expect("websocket error");
        match frame {
            WsFrame::Close(Some(close)) => assert_eq!(close.code, CloseCode::Policy),
            other => panic!("expected a policy close, got {other:?}"),
        }
    }

    async fn wait_for_connections(server: &TestServer, expected: usize) {
        for _ in 0..100 {
            if server.state.registry().connection_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("registry never reached {expected} connection(s)");
    }

    async fn send(socket: &mut ClientSocket, value: Value) {
        socket.send(WsFrame::text(value.to_string())).await.unwrap();
    }

    #[tokio::test]
    async fn owner_receives_initial_content_on_join() {
        let server = spawn_server().await;
        let owner = server.user("owner@example.com").await;
        let file_id = server.file_with(&owner, "hello world").await;

        let (_socket, content) = server.join(file_id, &owner).await;

        assert_eq!(content, "hello world");
        wait_for_connections(&server, 1).await;
    }

    #[tokio::test]
    async fn stranger_is_closed_with_policy_violation_and_not_registered() {
        let server = spawn_server().await;
        let owner = server.user("owner@example.com").await;
        let stranger = server.user("stranger@example.com").await;
        let file_id = server.file_with(&owner, "secret").await;

        let mut socket = server.connect(file_id, &stranger.token).await;

        expect_policy_close(&mut socket).await;
        assert_eq!(server.state.registry().connection_count(), 0);
        assert_eq!(server.state.registry().file_count(), 0);
    }

    #[tokio::test]
    async fn bad_or_missing_token_is_closed_with_policy_violation() {
        let server = spawn_server().await;
        let owner = server.user("owner@example.com").await;
        let file_id = server.file_with(&owner, "").await;

        let mut socket = server.connect(file_id, "not-a-jwt").await;
        expect_policy_close(&mut socket).await;

        let url = format!("ws://{}/api/collaboration/ws/{}", server.addr, file_id);
        let (mut socket, _) = connect_async(url).await.unwrap();
        expect_policy_close(&mut socket).await;

        assert_eq!(server.state.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn cursor_is_relayed_with_stamped_identity_and_not_echoed() {
        let server = spawn_server().await;
        let owner = server.user("a@example.com").await;
        let peer = server.user("b@example.com").await;
        let file_id = server.file_with(&owner, "abc").await;
        server.state.store.add_collaborator(file_id, peer.id).await.unwrap();

        let (mut a, _) = server.join(file_id, &owner).await;
        let (mut b, _) = server.join(file_id, &peer).await;
        let joined = next_json(&mut a).await;
        assert_eq!(joined, json!({"type": "user_joined", "user_id": peer.id, "email": "b@example.com"}));

        send(&mut a, json!({"type": "cursor_position", "position": 2, "user_id": 999})).await;

        let relayed = next_json(&mut b).await;
        assert_eq!(
            relayed,
            json!({"type": "cursor_position", "position": 2, "user_id": owner.id, "file_id": file_id})
        );
        expect_silence(&mut a).await;
    }

    #[tokio::test]
    async fn text_change_is_persisted_then_relayed() {
        let server = spawn_server().await;
        let owner = server.user("a@example.com").await;
        let peer = server.user("b@example.com").await;
        let file_id = server.file_with(&owner, "hello world").await;
        server.state.store.add_collaborator(file_id, peer.id).await.unwrap();

        let (mut a, _) = server.join(file_id, &owner).await;
        let (mut b, _) = server.join(file_id, &peer).await;
        next_json(&mut a).await; // user_joined

        send(&mut b, json!({"type": "text_change", "start": 6, "delete_count": 5, "insert": "earth"})).await;

        let relayed = next_json(&mut a).await;
        assert_eq!(relayed["type"], "text_change");
        assert_eq!(relayed["user_id"], peer.id);
        assert_eq!(relayed["insert"], "earth");
        let stored = server.state.store.get_file(file_id).await.unwrap().unwrap();
        assert_eq!(stored.content, "hello earth");
        expect_silence(&mut b).await;
    }

    #[tokio::test]
    async fn malformed_and_unknown_messages_keep_the_session_alive() {
        let server = spawn_server().await;
        let owner = server.user("a@example.com").await;
        let peer = server.user("b@example.com").await;
        let file_id = server.file_with(&owner, "").await;
        server.state.store.add_collaborator(file_id, peer.id).await.unwrap();

        let (mut a, _) = server.join(file_id, &owner).await;
        let (mut b, _) = server.join(file_id, &peer).await;
        next_json(&mut a).await; // user_joined

        a.send(WsFrame::text("{not json")).await.unwrap();
        send(&mut a, json!({"type": "telepathy"})).await;
        send(&mut a, json!({"type": "highlight", "start": 1, "end": 3})).await;

        let relayed = next_json(&mut b).await;
        assert_eq!(
            relayed,
            json!({"type": "highlight", "start": 1, "end": 3, "user_id": owner.id, "file_id": file_id})
        );
    }

    #[tokio::test]
    async fn disconnect_deregisters_and_announces_departure() {
        let server = spawn_server().await;
        let owner = server.user("a@example.com").await;
        let peer = server.user("b@example.com").await;
        let file_id = server.file_with(&owner, "").await;
        server.state.store.add_collaborator(file_id, peer.id).await.unwrap();

        let (mut a, _) = server.join(file_id, &owner).await;
        let (mut b, _) = server.join(file_id, &peer).await;
        next_json(&mut a).await; // user_joined
        wait_for_connections(&server, 2).await;

        b.close(None).await.unwrap();

        let left = next_json(&mut a).await;
        assert_eq!(left, json!({"type": "user_left", "user_id": peer.id}));
        wait_for_connections(&server, 1).await;

        a.close(None).await.unwrap();
        wait_for_connections(&server, 0).await;
        assert_eq!(server.state.registry().file_count(), 0);
    }

    #[tokio::test]
    async fn rejoining_supersedes_the_previous_connection_silently() {
        let server = spawn_server().await;
        let owner = server.user("a@example.com").await;
        let peer = server.user("b@example.com").await;
        let file_id = server.file_with(&owner, "").await;
        server.state.store.add_collaborator(file_id, peer.id).await.unwrap();

        let (mut a, _) = server.join(file_id, &owner).await;
        let (_b1, _) = server.join(file_id, &peer).await;
        assert_eq!(next_json(&mut a).await["type"], "user_joined");
        let (mut b2, _) = server.join(file_id, &peer).await;
        assert_eq!(next_json(&mut a).await["type"], "user_joined");

        // The superseded connection must not announce a departure.
        expect_silence(&mut a).await;
        assert_eq!(server.state.registry().connection_count(), 2);

        send(&mut a, json!({"type": "cursor_position", "position": 0})).await;
        assert_eq!(next_json(&mut b2).await["type"], "cursor_position");
    }

    #[tokio::test]
    async fn collaborator_access_follows_the_owner() {
        let server = spawn_server().await;
        let owner = server.user("owner@example.com").await;
        let peer = server.user("peer@example.com").await;
        let file_id = server.file_with(&owner, "draft").await;

        let (status, body) = server
            .post_json(
                &format!("/api/collaboration/{}/add_collaborator", file_id),
                &owner.token,
                json!({"email": "peer@example.com"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["collaborator_ids"], json!([peer.id]));

        let (mut socket, content) = server.join(file_id, &peer).await;
        assert_eq!(content, "draft");
        socket.close(None).await.unwrap();
        wait_for_connections(&server, 0).await;

        let (status, _) = server
            .post_json(
                &format!("/api/collaboration/{}/remove_collaborator", file_id),
                &owner.token,
                json!({"user_id": peer.id}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let mut socket = server.connect(file_id, &peer.token).await;
        expect_policy_close(&mut socket).await;
        assert_eq!(server.state.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn deleting_the_file_closes_live_connections() {
        let server = spawn_server().await;
        let owner = server.user("owner@example.com").await;
        let file_id = server.file_with(&owner, "bye").await;
        let (mut socket, _) = server.join(file_id, &owner).await;
        wait_for_connections(&server, 1).await;

        let req = Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/files/{}", file_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", owner.token))
            .body(Body::empty())
            .unwrap();
        let res = create_app(server.state.clone()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let frame = timeout(Duration::from_secs(2), socket.next()).await.expect("timed out");
        assert!(matches!(frame, Some(Ok(WsFrame::Close(_))) | None | Some(Err(_))));
        wait_for_connections(&server, 0).await;
    }

    #[tokio::test]
    async fn edit_to_a_deleted_file_is_skipped_and_the_session_continues() {
        let server = spawn_server().await;
        let owner = server.user("a@example.com").await;
        let peer = server.user("b@example.com").await;
        let file_id = server.file_with(&owner, "gone soon").await;
        server.state.store.add_collaborator(file_id, peer.id).await.unwrap();

        let (mut a, _) = server.join(file_id, &owner).await;
        let (mut b, _) = server.join(file_id, &peer).await;
        next_json(&mut a).await; // user_joined
        wait_for_connections(&server, 2).await;

        // Removed behind the sessions' back, so nobody is told to close.
        assert!(server.state.store.delete_file(file_id).await.unwrap());

        send(&mut a, json!({"type": "text_change", "start": 0, "delete_count": 4, "insert": "x"})).await;
        send(&mut a, json!({"type": "cursor_position", "position": 1})).await;

        let relayed = next_json(&mut b).await;
        assert_eq!(
            relayed,
            json!({"type": "cursor_position", "position": 1, "user_id": owner.id, "file_id": file_id})
        );
        assert_eq!(server.state.registry().connection_count(), 2);
        let conns = server.state.registry().channels_for(file_id);
        assert!(conns.iter().any(|(user_id, _)| *user_id == owner.id));
    }

    /// Admits against the file, then deletes it before the session registers
    async fn join_after_delete(
        axum::extract::Path(file_id): axum::extract::Path<i64>,
        axum::extract::State(state): axum::extract::State<AppState>,
        ws: axum::extract::WebSocketUpgrade,
    ) -> axum::response::Response {
        let file = state.store.get_file(file_id).await.unwrap().unwrap();
        let user = state.store.get_user(file.owner_id).await.unwrap().unwrap();
        state.store.delete_file(file_id).await.unwrap();
        ws.on_upgrade(move |socket| super::handle_socket(socket, state, user, file))
    }

    #[tokio::test]
    async fn join_racing_a_delete_is_closed_without_content() {
        let server = spawn_server().await;
        let owner = server.user("owner@example.com").await;
        let file_id = server.file_with(&owner, "racy").await;

        let app = axum::Router::new()
            .route("/racy/:file_id", axum::routing::get(join_after_delete))
            .with_state(server.state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let (mut socket, _) = connect_async(format!("ws://{}/racy/{}", addr, file_id)).await.unwrap();

        let frame = timeout(Duration::from_secs(2), socket.next()).await.expect("timed out");
        assert!(
            matches!(frame, Some(Ok(WsFrame::Close(_))) | None | Some(Err(_))),
            "expected the connection to close, got {frame:?}"
        );
        assert!(server.state.registry().channels_for(file_id).is_empty());
        assert_eq!(server.state.registry().connection_count(), 0);
    }
}
