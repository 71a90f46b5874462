// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between the Codemeet client and server.
//! This module defines the WebSocket protocol events and supporting types.
//!
//! Every frame is a JSON object tagged by an `event` field; payload field
//! names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Events sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Join a room, creating it if it does not exist yet.
    /// # Fields
    /// * `room_id` - Room to join
    /// * `user_name` - Display name for the roster
    /// * `file_id` - Initially selected file, if the joiner seeds the room
    /// * `folder` - Seed folder offered by the joiner
    /// * `file` - Seed file offered alongside `file_id`
    /// * `host_id` - Persistent host identity claimed by this client
    /// * `mic_on` - Initial microphone state
    Join {
        room_id: String,
        user_name: String,
        #[serde(default)]
        file_id: Option<String>,
        #[serde(default)]
        folder: Option<Folder>,
        #[serde(default)]
        file: Option<FileEntry>,
        host_id: String,
        #[serde(default)]
        mic_on: bool,
    },
    /// Select the room's current folder
    FolderSelected { room_id: String, folder_id: String },
    /// Select the room's current file
    FileSelected { room_id: String, file_id: String },
    /// Replace the room's folder/file tree (host only)
    BroadcastFolderData {
        room_id: String,
        #[serde(default)]
        folders: Vec<Folder>,
        #[serde(default)]
        files: Vec<FileEntry>,
        host_id: String,
    },
    /// Live edit of the active file
    CodeChange {
        room_id: String,
        file_id: String,
        code: String,
        #[serde(default)]
        cursor: Option<Value>,
    },
    /// Explicit save of a file's text
    SaveCode {
        room_id: String,
        file_id: String,
        code: String,
    },
    /// Ask every client in the room to clear its terminal
    ClearOutput { room_id: String },
    /// Compile/run source code in a sandboxed subprocess
    RunCode {
        room_id: String,
        code: String,
        language: String,
    },
    /// Forward a line to the running subprocess's stdin
    CodeInput { room_id: String, input: String },
    /// Mirror in-progress terminal input to the other participants
    SyncInput { room_id: String, input: String },
    /// Echo a committed terminal input line to the other participants
    InputEcho {
        room_id: String,
        input: String,
        sender: String,
    },
    /// Post a chat message
    ChatMessage {
        room_id: String,
        user_name: String,
        message: String,
        time: String,
    },
    /// Share an opaque file attachment in chat
    ChatFile {
        room_id: String,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    /// Toggle this participant's microphone flag
    ToggleMic { room_id: String, mic_on: bool },
    /// Voice-call offer, relayed to `to` verbatim
    #[serde(rename = "webrtc-offer")]
    WebrtcOffer { to: String, sdp: Value },
    /// Voice-call answer, relayed to `to` verbatim
    #[serde(rename = "webrtc-answer")]
    WebrtcAnswer { to: String, sdp: Value },
    /// ICE candidate, relayed to `to` verbatim
    #[serde(rename = "webrtc-ice-candidate")]
    WebrtcIceCandidate { to: String, candidate: Value },
    /// Terminate the room for every participant
    EndMeeting { room_id: String },
}

/// Events sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Full folder/file snapshot for a room
    FolderData {
        folders: Vec<Folder>,
        files: Vec<FileWithFolder>,
        host_id: String,
        current_file_id: Option<String>,
    },
    /// New text (and optionally cursor) for a file
    CodeUpdate {
        room_id: String,
        file_id: String,
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursor: Option<Value>,
    },
    /// Confirmation that a file's text was saved
    SavedCode { file_id: String, code: String },
    /// The room's current folder changed
    FolderChanged { folder_id: String },
    /// The room's current file changed
    FileChanged { file_id: String },
    /// Full roster after a join/leave
    UserJoined { clients: Vec<UserSummary> },
    /// Roster delta: one participant's microphone flag changed
    MicStatusUpdate { socket_id: String, mic_on: bool },
    /// Chat backlog, sent to a joining connection only
    ChatHistory { messages: Vec<ChatMessage> },
    /// A chat message, broadcast to the whole room
    ChatMessage {
        user_name: String,
        message: String,
        time: String,
    },
    /// Opaque chat attachment, relayed unmodified
    ChatFile {
        room_id: String,
        #[serde(flatten)]
        payload: Map<String, Value>,
    },
    /// A chunk of subprocess output (or a status line about the run)
    CodeOutput {
        output: String,
        waiting_for_input: bool,
    },
    /// Clear the displayed terminal transcript
    ClearOutput,
    /// Mirrored in-progress terminal input from another participant
    SyncInput { input: String, sender: String },
    /// Echoed committed terminal input from another participant
    InputEcho { input: String, sender: String },
    /// Relayed voice-call offer
    #[serde(rename = "webrtc-offer")]
    WebrtcOffer { from: String, sdp: Value },
    /// Relayed voice-call answer
    #[serde(rename = "webrtc-answer")]
    WebrtcAnswer { from: String, sdp: Value },
    /// Relayed ICE candidate
    #[serde(rename = "webrtc-ice-candidate")]
    WebrtcIceCandidate { from: String, candidate: Value },
    /// The room was terminated; the connection will be closed
    EndMeeting,
}

/// A folder in the room's document tree.
///
/// `id` and `title` default to empty strings so a partially-formed folder
/// deserializes instead of rejecting the whole frame; consumers filter on
/// non-empty values.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Folder {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Files belonging to this folder (wire name `file`)
    #[serde(default, rename = "file")]
    pub files: Vec<FileEntry>,
}

/// A file in the room's document tree. `code` is only the seed snapshot;
/// the live text is tracked separately by the server.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FileEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// A file annotated with its parent folder, as sent in `folderData`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileWithFolder {
    #[serde(flatten)]
    pub file: FileEntry,
    #[serde(rename = "folderId")]
    pub folder_id: Option<String>,
}

/// One roster entry
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    /// Connection identifier, stringified
    pub socket_id: String,
    pub name: String,
    pub host_id: String,
    pub mic_on: bool,
}

/// One chat message. `time` is a client-supplied display string and is
/// never parsed by the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub user_name: String,
    pub message: String,
    pub time: String,
}
