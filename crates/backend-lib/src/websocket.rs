// ==================
// crates/backend-lib/src/websocket.rs
// ==================
//! WebSocket Event Dispatcher
//!
//! This module implements the per-connection event dispatcher for the
//! Codemeet backend server. It provides functionality for:
//! - Room join/leave with single-room membership
//! - Document-tree selection, replacement and live code relay
//! - Chat append + broadcast and chat-file relay
//! - Code execution requests forwarded to the sandbox
//! - WebRTC signaling relay between two named connections
//!
//! A `LiveSession` is instantiated per connection and tracks which room
//! the connection currently belongs to. All room mutations happen while
//! holding that room's lock, and every broadcast is a synchronous send, so
//! each event is processed atomically with respect to every other handler.
//! No failure in one handler terminates the dispatcher or affects other
//! connections.

use crate::room::{Participant, TreeSnapshot};
use crate::validation;
use crate::AppState;
use crate::broadcast::RoomSink;
use codemeet_common::{ChatMessage, ClientEvent, FileEntry, Folder, ServerEvent};
use metrics::counter;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

fn folder_data_event(snapshot: TreeSnapshot) -> ServerEvent {
    ServerEvent::FolderData {
        folders: snapshot.folders,
        files: snapshot.files,
        host_id: snapshot.host_id,
        current_file_id: snapshot.current_file_id,
    }
}

/// Per-connection dispatcher
pub struct LiveSession {
    state: Arc<AppState>,
    conn_id: Uuid,
    current_room: Option<String>,
}

impl LiveSession {
    pub fn new(state: Arc<AppState>, conn_id: Uuid) -> Self {
        Self {
            state,
            conn_id,
            current_room: None,
        }
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Route one inbound event to its handler
    pub async fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Join {
                room_id,
                user_name,
                file_id,
                folder,
                file,
                host_id,
                mic_on,
            } => self.on_join(room_id, user_name, file_id, folder, file, host_id, mic_on),
            ClientEvent::FolderSelected { room_id, folder_id } => {
                self.on_folder_selected(&room_id, &folder_id);
            },
            ClientEvent::FileSelected { room_id, file_id } => {
                self.on_file_selected(room_id, file_id);
            },
            ClientEvent::BroadcastFolderData {
                room_id,
                folders,
                files,
                host_id,
            } => self.on_broadcast_folder_data(&room_id, folders, files, &host_id),
            ClientEvent::CodeChange {
                room_id,
                file_id,
                code,
                cursor,
            } => self.on_code_change(room_id, file_id, code, cursor),
            ClientEvent::SaveCode {
                room_id,
                file_id,
                code,
            } => self.on_save_code(&room_id, file_id, code),
            ClientEvent::ClearOutput { room_id } => {
                if let Some(members) = self.state.rooms.member_ids(&room_id) {
                    self.state.router.broadcast(&members, ServerEvent::ClearOutput);
                }
            },
            ClientEvent::RunCode {
                room_id,
                code,
                language,
            } => self.on_run_code(room_id, &code, &language).await,
            ClientEvent::CodeInput { room_id: _, input } => {
                self.state.sandbox.send_input(self.conn_id, &input).await;
            },
            ClientEvent::SyncInput { room_id, input } => {
                self.relay_to_room_except_self(
                    &room_id,
                    ServerEvent::SyncInput {
                        input,
                        sender: self.conn_id.to_string(),
                    },
                );
            },
            ClientEvent::InputEcho {
                room_id,
                input,
                sender,
            } => {
                self.relay_to_room_except_self(&room_id, ServerEvent::InputEcho { input, sender });
            },
            ClientEvent::ChatMessage {
                room_id,
                user_name,
                message,
                time,
            } => self.on_chat_message(&room_id, user_name, message, time),
            ClientEvent::ChatFile { room_id, payload } => self.on_chat_file(room_id, payload),
            ClientEvent::ToggleMic { room_id, mic_on } => self.on_toggle_mic(&room_id, mic_on),
            ClientEvent::WebrtcOffer { to, sdp } => {
                self.relay_to_connection(&to, |from| ServerEvent::WebrtcOffer { from, sdp });
            },
            ClientEvent::WebrtcAnswer { to, sdp } => {
                self.relay_to_connection(&to, |from| ServerEvent::WebrtcAnswer { from, sdp });
            },
            ClientEvent::WebrtcIceCandidate { to, candidate } => {
                self.relay_to_connection(&to, |from| ServerEvent::WebrtcIceCandidate {
                    from,
                    candidate,
                });
            },
            ClientEvent::EndMeeting { room_id } => self.on_end_meeting(&room_id),
        }
    }

    /// Invoked when the connection drops: remove the participant, notify
    /// the remaining roster, and kill any live execution session.
    pub fn disconnect(&mut self) {
        info!(conn_id = %self.conn_id, "user disconnected");
        if let Some(room_id) = self.current_room.take() {
            self.leave_room(&room_id);
        }
        self.state.sandbox.kill(&self.conn_id);
    }

    fn leave_room(&self, room_id: &str) {
        let Some(outcome) = self.state.rooms.leave(room_id, &self.conn_id) else {
            return;
        };
        if outcome.destroyed {
            self.state.chat.remove(room_id);
        } else {
            self.state.router.broadcast(
                &outcome.members,
                ServerEvent::UserJoined {
                    clients: outcome.roster,
                },
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn on_join(
        &mut self,
        room_id: String,
        user_name: String,
        file_id: Option<String>,
        folder: Option<Folder>,
        file: Option<FileEntry>,
        host_id: String,
        mic_on: bool,
    ) {
        if let Err(e) = validation::validate_room_id(&room_id) {
            warn!(error = %e, "join dropped");
            return;
        }
        if let Err(e) = validation::validate_display_name(&user_name) {
            warn!(error = %e, "join dropped");
            return;
        }

        info!(%room_id, %user_name, "joining room");

        // Leave the previous room, if different. Rejoining the same room
        // causes no roster churn.
        if let Some(prev) = self.current_room.clone() {
            if prev != room_id {
                self.leave_room(&prev);
            }
        }
        self.current_room = Some(room_id.clone());

        let room = self
            .state
            .rooms
            .get_or_create(&room_id, &host_id, self.conn_id);
        let mut room = room.lock();
        room.insert_participant(
            self.conn_id,
            Participant {
                name: user_name,
                host_id,
                mic_on,
            },
        );

        if room.has_documents() {
            // Existing document state goes to the joiner only, followed by
            // the active file's current text.
            self.state
                .router
                .send_to(&self.conn_id, folder_data_event(room.snapshot()));
            if let Some(current) = room.current_file_id().map(str::to_string) {
                let code = room.code_for(&current);
                self.state.router.send_to(
                    &self.conn_id,
                    ServerEvent::CodeUpdate {
                        room_id: room_id.clone(),
                        file_id: current,
                        code,
                        cursor: None,
                    },
                );
            }
        } else if let Some(folder) = folder {
            // The joiner seeds the room; everyone sees the new tree.
            room.seed_tree(folder, file, file_id);
            self.state
                .router
                .broadcast(&room.member_ids(), folder_data_event(room.snapshot()));
        }

        if let Some(history) = self.state.chat.history(&room_id) {
            self.state
                .router
                .send_to(&self.conn_id, ServerEvent::ChatHistory { messages: history });
        }

        self.state.router.broadcast(
            &room.member_ids(),
            ServerEvent::UserJoined {
                clients: room.roster(),
            },
        );
    }

    fn on_folder_selected(&self, room_id: &str, folder_id: &str) {
        let Some(room) = self.state.rooms.get(room_id) else {
            warn!(room_id, "folderSelected for unknown room");
            return;
        };
        let mut room = room.lock();
        if !room.select_folder(folder_id) {
            return;
        }
        let members = room.member_ids();
        self.state.router.broadcast(
            &members,
            ServerEvent::FolderChanged {
                folder_id: folder_id.to_string(),
            },
        );
        self.state
            .router
            .broadcast(&members, folder_data_event(room.snapshot()));
    }

    fn on_file_selected(&self, room_id: String, file_id: String) {
        let Some(room) = self.state.rooms.get(&room_id) else {
            warn!(%room_id, "fileSelected for unknown room");
            return;
        };
        let mut room = room.lock();
        room.select_file(file_id.clone());
        let members = room.member_ids();
        self.state.router.broadcast(
            &members,
            ServerEvent::FileChanged {
                file_id: file_id.clone(),
            },
        );
        let code = room.code_for(&file_id);
        self.state.router.broadcast(
            &members,
            ServerEvent::CodeUpdate {
                room_id,
                file_id,
                code,
                cursor: None,
            },
        );
    }

    fn on_broadcast_folder_data(
        &self,
        room_id: &str,
        folders: Vec<Folder>,
        files: Vec<FileEntry>,
        host_id: &str,
    ) {
        let Some(room) = self.state.rooms.get(room_id) else {
            return;
        };
        let mut room = room.lock();
        if host_id != room.host_id {
            warn!(room_id, "non-host tried to broadcast folder data");
            return;
        }
        if !room.replace_tree(folders, files) {
            return;
        }
        self.state
            .router
            .broadcast(&room.member_ids(), folder_data_event(room.snapshot()));
    }

    fn on_code_change(
        &self,
        room_id: String,
        file_id: String,
        code: String,
        cursor: Option<Value>,
    ) {
        let Some(room) = self.state.rooms.get(&room_id) else {
            return;
        };
        let mut room = room.lock();
        if !room.apply_code_change(&file_id, code.clone()) {
            warn!(
                %file_id,
                active = ?room.current_file_id(),
                "code change rejected for non-active file"
            );
            return;
        }
        self.state.router.broadcast_except(
            &room.member_ids(),
            &self.conn_id,
            ServerEvent::CodeUpdate {
                room_id,
                file_id,
                code,
                cursor,
            },
        );
    }

    fn on_save_code(&self, room_id: &str, file_id: String, code: String) {
        let Some(room) = self.state.rooms.get(room_id) else {
            return;
        };
        let mut room = room.lock();
        info!(%file_id, "saving code");
        room.save_code(&file_id, code.clone());
        self.state.router.broadcast(
            &room.member_ids(),
            ServerEvent::SavedCode { file_id, code },
        );
    }

    async fn on_run_code(&self, room_id: String, code: &str, language: &str) {
        if !self.state.rooms.contains(&room_id) {
            warn!(%room_id, "runCode for unknown room");
            return;
        }
        let sink = RoomSink::new(
            self.state.rooms.clone(),
            self.state.router.clone(),
            room_id,
        );
        self.state.sandbox.run(self.conn_id, code, language, sink).await;
    }

    fn on_chat_message(&self, room_id: &str, user_name: String, message: String, time: String) {
        let msg = ChatMessage {
            user_name,
            message,
            time,
        };
        self.state.chat.append(room_id, msg.clone());
        counter!(crate::metrics::CHAT_MESSAGES).increment(1);
        if let Some(members) = self.state.rooms.member_ids(room_id) {
            self.state.router.broadcast(
                &members,
                ServerEvent::ChatMessage {
                    user_name: msg.user_name,
                    message: msg.message,
                    time: msg.time,
                },
            );
        }
    }

    fn on_chat_file(&self, room_id: String, payload: Map<String, Value>) {
        if let Some(members) = self.state.rooms.member_ids(&room_id) {
            self.state
                .router
                .broadcast(&members, ServerEvent::ChatFile { room_id, payload });
        }
    }

    fn on_toggle_mic(&self, room_id: &str, mic_on: bool) {
        let Some(room) = self.state.rooms.get(room_id) else {
            return;
        };
        let mut room = room.lock();
        if !room.set_mic(&self.conn_id, mic_on) {
            return;
        }
        // Roster delta, not a full roster.
        self.state.router.broadcast(
            &room.member_ids(),
            ServerEvent::MicStatusUpdate {
                socket_id: self.conn_id.to_string(),
                mic_on,
            },
        );
    }

    /// Terminate the room for every member. Not gated on host identity:
    /// any connection naming the room id may end it.
    fn on_end_meeting(&self, room_id: &str) {
        let Some(members) = self.state.rooms.member_ids(room_id) else {
            warn!(room_id, "endMeeting for unknown room");
            return;
        };
        info!(room_id, requested_by = %self.conn_id, "meeting ended");

        self.state.router.broadcast(&members, ServerEvent::EndMeeting);
        for member in &members {
            self.state.router.close(member);
        }
        self.state.rooms.remove(room_id);
        self.state.chat.remove(room_id);
    }

    fn relay_to_room_except_self(&self, room_id: &str, event: ServerEvent) {
        if let Some(members) = self.state.rooms.member_ids(room_id) {
            self.state
                .router
                .broadcast_except(&members, &self.conn_id, event);
        }
    }

    fn relay_to_connection<F>(&self, to: &str, build: F)
    where
        F: FnOnce(String) -> ServerEvent,
    {
        let Ok(target) = Uuid::parse_str(to) else {
            warn!(to, "signaling relay dropped: invalid target connection id");
            return;
        };
        self.state
            .router
            .send_to(&target, build(self.conn_id.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Delivery;
    use crate::config::Settings;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    /// Helper to set up an `AppState` on temp directories
    fn setup() -> (Arc<AppState>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings {
            temp_dir: temp_dir.path().join("temp"),
            logs_dir: temp_dir.path().join("logs"),
            ..Settings::default()
        };
        let state = Arc::new(AppState::new(settings).unwrap());
        (state, temp_dir)
    }

    fn connect(state: &Arc<AppState>) -> (LiveSession, mpsc::UnboundedReceiver<Delivery>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        state.router.register(conn_id, tx);
        (LiveSession::new(state.clone(), conn_id), rx)
    }

    fn join_event(room_id: &str, user_name: &str, host_id: &str) -> ClientEvent {
        ClientEvent::Join {
            room_id: room_id.to_string(),
            user_name: user_name.to_string(),
            file_id: None,
            folder: None,
            file: None,
            host_id: host_id.to_string(),
            mic_on: false,
        }
    }

    fn seed_join_event(room_id: &str, user_name: &str, host_id: &str) -> ClientEvent {
        ClientEvent::Join {
            room_id: room_id.to_string(),
            user_name: user_name.to_string(),
            file_id: Some("c1".to_string()),
            folder: Some(Folder {
                id: "f1".to_string(),
                title: "root".to_string(),
                files: vec![FileEntry {
                    id: "c1".to_string(),
                    name: Some("main.py".to_string()),
                    code: Some("x=1".to_string()),
                }],
            }),
            file: None,
            host_id: host_id.to_string(),
            mic_on: false,
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> ServerEvent {
        match timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
        {
            Delivery::Event(ev) => ev,
            Delivery::Close => panic!("Expected event, got Close"),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Delivery>) {
        while rx.try_recv().is_ok() {}
    }

    #[tokio::test]
    async fn test_seeding_join_then_late_join() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);
        let (mut y, mut rx_y) = connect(&state);

        // X seeds room r1.
        x.handle_event(seed_join_event("r1", "ada", "host-x")).await;
        match next_event(&mut rx_x).await {
            ServerEvent::FolderData {
                folders,
                files,
                host_id,
                current_file_id,
            } => {
                assert_eq!(folders.len(), 1);
                assert_eq!(files.len(), 1);
                assert_eq!(files[0].file.id, "c1");
                assert_eq!(files[0].folder_id.as_deref(), Some("f1"));
                assert_eq!(host_id, "host-x");
                assert_eq!(current_file_id.as_deref(), Some("c1"));
            },
            other => panic!("Expected FolderData, got {other:?}"),
        }
        drain(&mut rx_x);

        // Y joins with no payload: snapshot + active code, then roster.
        y.handle_event(join_event("r1", "bob", "host-y")).await;
        match next_event(&mut rx_y).await {
            ServerEvent::FolderData {
                files,
                host_id,
                current_file_id,
                ..
            } => {
                assert_eq!(files[0].file.id, "c1");
                assert_eq!(files[0].file.code.as_deref(), Some("x=1"));
                assert_eq!(files[0].folder_id.as_deref(), Some("f1"));
                // The room's host is still X's identity.
                assert_eq!(host_id, "host-x");
                assert_eq!(current_file_id.as_deref(), Some("c1"));
            },
            other => panic!("Expected FolderData, got {other:?}"),
        }
        match next_event(&mut rx_y).await {
            ServerEvent::CodeUpdate { file_id, code, .. } => {
                assert_eq!(file_id, "c1");
                assert_eq!(code, "x=1");
            },
            other => panic!("Expected CodeUpdate, got {other:?}"),
        }
        match next_event(&mut rx_y).await {
            ServerEvent::UserJoined { clients } => {
                assert_eq!(clients.len(), 2);
            },
            other => panic!("Expected UserJoined, got {other:?}"),
        }

        // X sees the updated roster too.
        match next_event(&mut rx_x).await {
            ServerEvent::UserJoined { clients } => assert_eq!(clients.len(), 2),
            other => panic!("Expected UserJoined, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_belongs_to_one_room_at_a_time() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);
        let (mut y, mut rx_y) = connect(&state);

        x.handle_event(join_event("r1", "ada", "host-x")).await;
        y.handle_event(join_event("r1", "bob", "host-y")).await;
        drain(&mut rx_x);
        drain(&mut rx_y);

        // X switches to r2: removed from r1, Y notified.
        x.handle_event(join_event("r2", "ada", "host-x")).await;
        match next_event(&mut rx_y).await {
            ServerEvent::UserJoined { clients } => {
                assert_eq!(clients.len(), 1);
                assert_eq!(clients[0].name, "bob");
            },
            other => panic!("Expected UserJoined, got {other:?}"),
        }
        assert!(state.rooms.contains("r2"));
        assert_eq!(state.rooms.member_ids("r2").unwrap(), vec![x.conn_id()]);

        // Y leaves: r1 becomes empty and is destroyed.
        y.disconnect();
        assert!(!state.rooms.contains("r1"));
    }

    #[tokio::test]
    async fn test_empty_room_is_destroyed_on_room_switch() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);

        x.handle_event(seed_join_event("r1", "ada", "host-x")).await;
        drain(&mut rx_x);

        x.handle_event(join_event("r2", "ada", "host-x")).await;
        assert!(!state.rooms.contains("r1"));

        // A fresh join to r1 sees no stale document state.
        let (mut z, mut rx_z) = connect(&state);
        z.handle_event(join_event("r1", "zoe", "host-z")).await;
        match next_event(&mut rx_z).await {
            ServerEvent::UserJoined { clients } => assert_eq!(clients.len(), 1),
            other => panic!("Expected UserJoined (fresh room), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_code_change_only_for_active_file() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);
        let (mut y, mut rx_y) = connect(&state);

        x.handle_event(seed_join_event("r1", "ada", "host-x")).await;
        y.handle_event(join_event("r1", "bob", "host-y")).await;
        drain(&mut rx_x);
        drain(&mut rx_y);

        // Edit addressed to a non-active file: dropped.
        x.handle_event(ClientEvent::CodeChange {
            room_id: "r1".to_string(),
            file_id: "c2".to_string(),
            code: "y=2".to_string(),
            cursor: None,
        })
        .await;
        assert!(rx_y.try_recv().is_err());
        {
            let room = state.rooms.get("r1").unwrap();
            assert_eq!(room.lock().code_for("c2"), "");
        }

        // Edit to the active file: stored and relayed to others only.
        x.handle_event(ClientEvent::CodeChange {
            room_id: "r1".to_string(),
            file_id: "c1".to_string(),
            code: "x=2".to_string(),
            cursor: Some(serde_json::json!({"line": 0})),
        })
        .await;
        match next_event(&mut rx_y).await {
            ServerEvent::CodeUpdate { code, cursor, .. } => {
                assert_eq!(code, "x=2");
                assert!(cursor.is_some());
            },
            other => panic!("Expected CodeUpdate, got {other:?}"),
        }
        assert!(rx_x.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_save_code_reaches_sender_too() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);

        x.handle_event(seed_join_event("r1", "ada", "host-x")).await;
        drain(&mut rx_x);

        x.handle_event(ClientEvent::SaveCode {
            room_id: "r1".to_string(),
            file_id: "c9".to_string(),
            code: "saved".to_string(),
        })
        .await;

        match next_event(&mut rx_x).await {
            ServerEvent::SavedCode { file_id, code } => {
                assert_eq!(file_id, "c9");
                assert_eq!(code, "saved");
            },
            other => panic!("Expected SavedCode, got {other:?}"),
        }
        let room = state.rooms.get("r1").unwrap();
        assert_eq!(room.lock().code_for("c9"), "saved");
    }

    #[tokio::test]
    async fn test_broadcast_folder_data_requires_host_identity() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);
        let (mut y, mut rx_y) = connect(&state);

        x.handle_event(seed_join_event("r1", "ada", "host-x")).await;
        y.handle_event(join_event("r1", "bob", "host-y")).await;
        drain(&mut rx_x);
        drain(&mut rx_y);

        let tree = |title: &str| ClientEvent::BroadcastFolderData {
            room_id: "r1".to_string(),
            folders: vec![Folder {
                id: "f2".to_string(),
                title: title.to_string(),
                files: vec![],
            }],
            files: vec![FileEntry {
                id: "c5".to_string(),
                name: None,
                code: Some("fresh".to_string()),
            }],
            host_id: "host-y".to_string(),
        };

        // Y does not hold the room's host identity: dropped, no events.
        y.handle_event(tree("intrusion")).await;
        assert!(rx_x.try_recv().is_err());
        assert!(rx_y.try_recv().is_err());
        {
            let room = state.rooms.get("r1").unwrap();
            assert_eq!(room.lock().current_file_id(), Some("c1"));
        }

        // The host replaces the tree; everyone gets the snapshot.
        x.handle_event(ClientEvent::BroadcastFolderData {
            room_id: "r1".to_string(),
            folders: vec![Folder {
                id: "f2".to_string(),
                title: "new root".to_string(),
                files: vec![],
            }],
            files: vec![FileEntry {
                id: "c5".to_string(),
                name: None,
                code: Some("fresh".to_string()),
            }],
            host_id: "host-x".to_string(),
        })
        .await;

        for rx in [&mut rx_x, &mut rx_y] {
            match next_event(rx).await {
                ServerEvent::FolderData {
                    folders,
                    current_file_id,
                    ..
                } => {
                    assert_eq!(folders[0].id, "f2");
                    assert_eq!(current_file_id.as_deref(), Some("c5"));
                },
                other => panic!("Expected FolderData, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_folder_selection_flow() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);

        x.handle_event(seed_join_event("r1", "ada", "host-x")).await;
        drain(&mut rx_x);

        // Unknown folder: silent no-op.
        x.handle_event(ClientEvent::FolderSelected {
            room_id: "r1".to_string(),
            folder_id: "nope".to_string(),
        })
        .await;
        assert!(rx_x.try_recv().is_err());

        x.handle_event(ClientEvent::FolderSelected {
            room_id: "r1".to_string(),
            folder_id: "f1".to_string(),
        })
        .await;
        match next_event(&mut rx_x).await {
            ServerEvent::FolderChanged { folder_id } => assert_eq!(folder_id, "f1"),
            other => panic!("Expected FolderChanged, got {other:?}"),
        }
        assert!(matches!(
            next_event(&mut rx_x).await,
            ServerEvent::FolderData { .. }
        ));
    }

    #[tokio::test]
    async fn test_file_selection_broadcasts_code() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);

        x.handle_event(seed_join_event("r1", "ada", "host-x")).await;
        drain(&mut rx_x);

        // No existence check: an untracked file selects with empty code.
        x.handle_event(ClientEvent::FileSelected {
            room_id: "r1".to_string(),
            file_id: "ghost".to_string(),
        })
        .await;
        match next_event(&mut rx_x).await {
            ServerEvent::FileChanged { file_id } => assert_eq!(file_id, "ghost"),
            other => panic!("Expected FileChanged, got {other:?}"),
        }
        match next_event(&mut rx_x).await {
            ServerEvent::CodeUpdate { file_id, code, .. } => {
                assert_eq!(file_id, "ghost");
                assert_eq!(code, "");
            },
            other => panic!("Expected CodeUpdate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chat_message_and_history() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);

        x.handle_event(join_event("r1", "ada", "host-x")).await;
        drain(&mut rx_x);

        x.handle_event(ClientEvent::ChatMessage {
            room_id: "r1".to_string(),
            user_name: "ada".to_string(),
            message: "hello".to_string(),
            time: "10:45 PM".to_string(),
        })
        .await;

        // The sender receives their own message.
        match next_event(&mut rx_x).await {
            ServerEvent::ChatMessage { user_name, message, .. } => {
                assert_eq!(user_name, "ada");
                assert_eq!(message, "hello");
            },
            other => panic!("Expected ChatMessage, got {other:?}"),
        }

        // A later joiner gets the backlog, addressed to them alone.
        let (mut y, mut rx_y) = connect(&state);
        y.handle_event(join_event("r1", "bob", "host-y")).await;
        match next_event(&mut rx_y).await {
            ServerEvent::ChatHistory { messages } => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].message, "hello");
            },
            other => panic!("Expected ChatHistory, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_toggle_mic_emits_roster_delta() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);
        let (mut y, mut rx_y) = connect(&state);

        x.handle_event(join_event("r1", "ada", "host-x")).await;
        y.handle_event(join_event("r1", "bob", "host-y")).await;
        drain(&mut rx_x);
        drain(&mut rx_y);

        x.handle_event(ClientEvent::ToggleMic {
            room_id: "r1".to_string(),
            mic_on: true,
        })
        .await;

        for rx in [&mut rx_x, &mut rx_y] {
            match next_event(rx).await {
                ServerEvent::MicStatusUpdate { socket_id, mic_on } => {
                    assert_eq!(socket_id, x.conn_id().to_string());
                    assert!(mic_on);
                },
                other => panic!("Expected MicStatusUpdate, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_webrtc_relay_targets_named_connection() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);
        let (mut y, mut rx_y) = connect(&state);

        x.handle_event(join_event("r1", "ada", "host-x")).await;
        y.handle_event(join_event("r1", "bob", "host-y")).await;
        drain(&mut rx_x);
        drain(&mut rx_y);

        x.handle_event(ClientEvent::WebrtcOffer {
            to: y.conn_id().to_string(),
            sdp: serde_json::json!({"type": "offer"}),
        })
        .await;

        match next_event(&mut rx_y).await {
            ServerEvent::WebrtcOffer { from, sdp } => {
                assert_eq!(from, x.conn_id().to_string());
                assert_eq!(sdp["type"], "offer");
            },
            other => panic!("Expected WebrtcOffer, got {other:?}"),
        }
        assert!(rx_x.try_recv().is_err());

        // An unparsable target is dropped.
        x.handle_event(ClientEvent::WebrtcAnswer {
            to: "not-a-uuid".to_string(),
            sdp: serde_json::json!({}),
        })
        .await;
        assert!(rx_y.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sync_input_excludes_sender() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);
        let (mut y, mut rx_y) = connect(&state);

        x.handle_event(join_event("r1", "ada", "host-x")).await;
        y.handle_event(join_event("r1", "bob", "host-y")).await;
        drain(&mut rx_x);
        drain(&mut rx_y);

        x.handle_event(ClientEvent::SyncInput {
            room_id: "r1".to_string(),
            input: "4".to_string(),
        })
        .await;

        match next_event(&mut rx_y).await {
            ServerEvent::SyncInput { input, sender } => {
                assert_eq!(input, "4");
                assert_eq!(sender, x.conn_id().to_string());
            },
            other => panic!("Expected SyncInput, got {other:?}"),
        }
        assert!(rx_x.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_clear_output_is_pure_broadcast() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);
        let (mut y, mut rx_y) = connect(&state);

        x.handle_event(join_event("r1", "ada", "host-x")).await;
        y.handle_event(join_event("r1", "bob", "host-y")).await;
        drain(&mut rx_x);
        drain(&mut rx_y);

        x.handle_event(ClientEvent::ClearOutput {
            room_id: "r1".to_string(),
        })
        .await;

        for rx in [&mut rx_x, &mut rx_y] {
            assert!(matches!(next_event(rx).await, ServerEvent::ClearOutput));
        }
    }

    #[tokio::test]
    async fn test_end_meeting_disconnects_everyone_and_destroys_room() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);
        let (mut y, mut rx_y) = connect(&state);

        x.handle_event(join_event("r1", "ada", "host-x")).await;
        y.handle_event(join_event("r1", "bob", "host-y")).await;
        x.handle_event(ClientEvent::ChatMessage {
            room_id: "r1".to_string(),
            user_name: "ada".to_string(),
            message: "bye".to_string(),
            time: "1".to_string(),
        })
        .await;
        drain(&mut rx_x);
        drain(&mut rx_y);

        // Note: Y is not the host; termination is not gated.
        y.handle_event(ClientEvent::EndMeeting {
            room_id: "r1".to_string(),
        })
        .await;

        for rx in [&mut rx_x, &mut rx_y] {
            assert!(matches!(next_event(rx).await, ServerEvent::EndMeeting));
            match timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap() {
                Delivery::Close => {},
                other => panic!("Expected Close, got {other:?}"),
            }
        }

        assert!(!state.rooms.contains("r1"));
        assert!(state.chat.history("r1").is_none());
    }

    #[tokio::test]
    async fn test_invalid_join_payload_is_dropped() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);

        x.handle_event(join_event("bad room id!", "ada", "host-x")).await;
        assert!(rx_x.try_recv().is_err());
        assert!(!state.rooms.contains("bad room id!"));

        x.handle_event(join_event("r1", "   ", "host-x")).await;
        assert!(!state.rooms.contains("r1"));
    }

    #[tokio::test]
    async fn test_run_code_unknown_room_is_dropped() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);

        x.handle_event(ClientEvent::RunCode {
            room_id: "ghost".to_string(),
            code: "print(1)".to_string(),
            language: "python".to_string(),
        })
        .await;

        assert!(rx_x.try_recv().is_err());
        assert!(!state.sandbox.is_live(&x.conn_id()));
    }

    #[tokio::test]
    async fn test_unsupported_language_reported_to_room() {
        let (state, _tmp) = setup();
        let (mut x, mut rx_x) = connect(&state);

        x.handle_event(join_event("r1", "ada", "host-x")).await;
        drain(&mut rx_x);

        x.handle_event(ClientEvent::RunCode {
            room_id: "r1".to_string(),
            code: "puts 1".to_string(),
            language: "ruby".to_string(),
        })
        .await;

        match next_event(&mut rx_x).await {
            ServerEvent::CodeOutput {
                output,
                waiting_for_input,
            } => {
                assert_eq!(output, "Unsupported language.");
                assert!(!waiting_for_input);
            },
            other => panic!("Expected CodeOutput, got {other:?}"),
        }
    }
}
