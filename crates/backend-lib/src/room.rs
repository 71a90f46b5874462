// ============================
// crates/backend-lib/src/room.rs
// ============================
//! Room registry, presence tracking and the per-room document store.
//!
//! The registry exclusively owns all per-room state. Each room sits behind
//! its own mutex; handlers mutate a room only while holding that lock, in
//! synchronous code, so every mutation is atomic with respect to every
//! other handler (the single-dispatcher guarantee expressed for a
//! multi-threaded runtime).

use codemeet_common::{FileEntry, FileWithFolder, Folder, UserSummary};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::counter;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// One participant, keyed by connection id in `Room::participants`
#[derive(Debug, Clone)]
pub struct Participant {
    pub name: String,
    /// Persistent identity claimed by the client, not tied to the
    /// connection id
    pub host_id: String,
    pub mic_on: bool,
}

/// Full folder/file snapshot of a room, as sent in `folderData`
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    pub folders: Vec<Folder>,
    pub files: Vec<FileWithFolder>,
    pub host_id: String,
    pub current_file_id: Option<String>,
}

/// A named collaborative session: presence plus the document tree.
///
/// The authoritative live text lives in `code_by_file`; the `code` field
/// on a [`FileEntry`] is only the seed snapshot it arrived with.
pub struct Room {
    /// Persistent identity of whoever created the room
    pub host_id: String,
    /// The connection that first created the room
    pub host_connection_id: Uuid,
    participants: HashMap<Uuid, Participant>,
    folders: Vec<Folder>,
    files: HashMap<String, FileEntry>,
    code_by_file: HashMap<String, String>,
    current_folder_id: Option<String>,
    current_file_id: Option<String>,
}

impl Room {
    pub fn new(host_id: String, host_connection_id: Uuid) -> Self {
        Self {
            host_id,
            host_connection_id,
            participants: HashMap::new(),
            folders: Vec::new(),
            files: HashMap::new(),
            code_by_file: HashMap::new(),
            current_folder_id: None,
            current_file_id: None,
        }
    }

    pub fn insert_participant(&mut self, conn_id: Uuid, participant: Participant) {
        self.participants.insert(conn_id, participant);
    }

    pub fn remove_participant(&mut self, conn_id: &Uuid) -> bool {
        self.participants.remove(conn_id).is_some()
    }

    pub fn contains_participant(&self, conn_id: &Uuid) -> bool {
        self.participants.contains_key(conn_id)
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Set a participant's microphone flag. Returns false if the
    /// connection is not a member.
    pub fn set_mic(&mut self, conn_id: &Uuid, mic_on: bool) -> bool {
        match self.participants.get_mut(conn_id) {
            Some(p) => {
                p.mic_on = mic_on;
                true
            },
            None => false,
        }
    }

    /// Full roster, one entry per member connection
    pub fn roster(&self) -> Vec<UserSummary> {
        self.participants
            .iter()
            .map(|(id, p)| UserSummary {
                socket_id: id.to_string(),
                name: p.name.clone(),
                host_id: p.host_id.clone(),
                mic_on: p.mic_on,
            })
            .collect()
    }

    pub fn member_ids(&self) -> Vec<Uuid> {
        self.participants.keys().copied().collect()
    }

    pub fn has_documents(&self) -> bool {
        !self.folders.is_empty()
    }

    pub fn current_file_id(&self) -> Option<&str> {
        self.current_file_id.as_deref()
    }

    pub fn current_folder_id(&self) -> Option<&str> {
        self.current_folder_id.as_deref()
    }

    /// Live text for a file, empty if untracked
    pub fn code_for(&self, file_id: &str) -> String {
        self.code_by_file.get(file_id).cloned().unwrap_or_default()
    }

    /// Seed the room's document state from a joining connection's payload.
    /// Only meaningful while the room has no folders yet.
    pub fn seed_tree(
        &mut self,
        folder: Folder,
        file: Option<FileEntry>,
        file_id: Option<String>,
    ) {
        for f in &folder.files {
            if f.id.is_empty() {
                continue;
            }
            self.code_by_file
                .insert(f.id.clone(), f.code.clone().unwrap_or_default());
            self.files.insert(f.id.clone(), f.clone());
        }
        self.current_folder_id = Some(folder.id.clone()).filter(|id| !id.is_empty());
        self.folders = vec![folder];
        self.current_file_id = file_id.clone();

        // A separately-supplied file wins the files slot but never
        // overwrites live text that the folder already seeded.
        if let (Some(file), Some(file_id)) = (file, file_id) {
            if let Some(code) = file.code.clone() {
                self.code_by_file.entry(file_id.clone()).or_insert(code);
            }
            self.files.insert(file_id, file);
        }
    }

    /// Set the current folder. Returns false (no-op) if the folder id is
    /// unknown. If the current file does not belong to the new folder it
    /// is reset to that folder's first file, or cleared.
    pub fn select_folder(&mut self, folder_id: &str) -> bool {
        let Some(folder) = self.folders.iter().find(|f| f.id == folder_id) else {
            return false;
        };

        let current_belongs = self
            .current_file_id
            .as_ref()
            .filter(|id| self.files.contains_key(*id))
            .map(|id| folder.files.iter().any(|f| &f.id == id))
            .unwrap_or(false);

        if !current_belongs {
            self.current_file_id = folder
                .files
                .first()
                .map(|f| f.id.clone())
                .filter(|id| !id.is_empty());
        }
        self.current_folder_id = Some(folder_id.to_string());
        true
    }

    /// Set the current file unconditionally (no existence check)
    pub fn select_file(&mut self, file_id: String) {
        self.current_file_id = Some(file_id);
    }

    /// Replace the entire folder list, file map and code map with the
    /// supplied data. Folders without both an id and a title are filtered
    /// out; if none remain the call is a no-op and returns false.
    pub fn replace_tree(&mut self, folders: Vec<Folder>, files: Vec<FileEntry>) -> bool {
        let valid_folders: Vec<Folder> = folders
            .into_iter()
            .filter(|f| !f.id.is_empty() && !f.title.is_empty())
            .collect();
        if valid_folders.is_empty() {
            return false;
        }

        self.current_folder_id = Some(valid_folders[0].id.clone());
        self.folders = valid_folders;
        self.files.clear();
        self.code_by_file.clear();

        for f in &files {
            if f.id.is_empty() {
                continue;
            }
            self.code_by_file
                .insert(f.id.clone(), f.code.clone().unwrap_or_default());
            self.files.insert(f.id.clone(), f.clone());
        }

        // The first supplied file becomes current, even when the filtered
        // map ended up without it.
        self.current_file_id = files
            .first()
            .map(|f| f.id.clone())
            .filter(|id| !id.is_empty());
        true
    }

    /// Overwrite the live text for the active file. Edits addressed to any
    /// other file are rejected, not queued.
    pub fn apply_code_change(&mut self, file_id: &str, code: String) -> bool {
        if self.current_file_id.as_deref() != Some(file_id) {
            return false;
        }
        self.code_by_file.insert(file_id.to_string(), code);
        true
    }

    /// Overwrite the live text for a file, no active-file restriction
    pub fn save_code(&mut self, file_id: &str, code: String) {
        self.code_by_file.insert(file_id.to_string(), code);
    }

    /// Build the full `folderData` snapshot. Each file's parent folder is
    /// derived from folder membership.
    pub fn snapshot(&self) -> TreeSnapshot {
        let files = self
            .files
            .values()
            .map(|f| FileWithFolder {
                folder_id: self
                    .folders
                    .iter()
                    .find(|folder| folder.files.iter().any(|ff| ff.id == f.id))
                    .map(|folder| folder.id.clone()),
                file: f.clone(),
            })
            .collect();

        TreeSnapshot {
            folders: self.folders.clone(),
            files,
            host_id: self.host_id.clone(),
            current_file_id: self.current_file_id.clone(),
        }
    }
}

/// Outcome of removing a connection from a room
pub struct LeaveOutcome {
    /// Whether the connection was actually a member
    pub removed: bool,
    /// Whether the room was destroyed because it became empty
    pub destroyed: bool,
    /// Roster after removal (empty when destroyed)
    pub roster: Vec<UserSummary>,
    /// Remaining member connections to notify
    pub members: Vec<Uuid>,
}

/// Process-wide mapping from room identifier to room state. Owns the
/// creation/destruction lifecycle.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, Arc<Mutex<Room>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, room_id: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.get(room_id).map(|r| Arc::clone(r.value()))
    }

    /// Look up a room, creating it if absent. A created room fixes its
    /// host identity and host connection to the caller's values.
    pub fn get_or_create(
        &self,
        room_id: &str,
        host_id: &str,
        host_connection_id: Uuid,
    ) -> Arc<Mutex<Room>> {
        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(v) => {
                info!(room_id, host_id, "creating room");
                counter!(crate::metrics::ROOM_CREATED).increment(1);
                let room = Arc::new(Mutex::new(Room::new(
                    host_id.to_string(),
                    host_connection_id,
                )));
                v.insert(room.clone());
                room
            },
        }
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Destroy a room outright (used by `endMeeting`)
    pub fn remove(&self, room_id: &str) -> bool {
        let removed = self.rooms.remove(room_id).is_some();
        if removed {
            counter!(crate::metrics::ROOM_DESTROYED).increment(1);
        }
        removed
    }

    /// Current member connections of a room
    pub fn member_ids(&self, room_id: &str) -> Option<Vec<Uuid>> {
        self.get(room_id).map(|room| room.lock().member_ids())
    }

    /// Remove a connection from a room. If the roster becomes empty the
    /// room is destroyed. The caller is responsible for clearing the chat
    /// log when `destroyed` is set.
    pub fn leave(&self, room_id: &str, conn_id: &Uuid) -> Option<LeaveOutcome> {
        let room = self.get(room_id)?;
        let (removed, destroyed, roster, members) = {
            let mut room = room.lock();
            let removed = room.remove_participant(conn_id);
            if room.is_empty() {
                (removed, true, Vec::new(), Vec::new())
            } else {
                (removed, false, room.roster(), room.member_ids())
            }
        };

        if destroyed {
            info!(room_id, "room is empty, deleting");
            self.remove(room_id);
        }

        Some(LeaveOutcome {
            removed,
            destroyed,
            roster,
            members,
        })
    }
}
