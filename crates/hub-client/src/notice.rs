//! User-facing notices: a toast stack plus a bounded notification history.
//!
//! New notices are also published on a broadcast channel so a UI can render
//! them as they arrive.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{ClientError, Result, RotationFailure};

/// Maximum number of notifications kept in history.
pub const MAX_HISTORY: usize = 20;

const CHANNEL_CAPACITY: usize = 32;

/// Language for generated notice text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ko,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// One notice. The same id identifies it in the toast stack and in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub id: Uuid,
    pub message: String,
    pub level: NoticeLevel,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Default)]
struct NoticeState {
    toasts: Vec<Notice>,
    // Newest first.
    history: VecDeque<Notice>,
}

/// Shared notice store. Clones share state.
#[derive(Debug, Clone)]
pub struct NoticeCenter {
    state: Arc<Mutex<NoticeState>>,
    sender: broadcast::Sender<Notice>,
    locale: Locale,
}

impl NoticeCenter {
    pub fn new(locale: Locale) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(NoticeState::default())),
            sender,
            locale,
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Receive every notice shown from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    /// Push a toast and record it in history.
    pub fn show(&self, message: impl Into<String>, level: NoticeLevel) -> Uuid {
        let notice = Notice {
            id: Uuid::new_v4(),
            message: message.into(),
            level,
            timestamp: Utc::now(),
            read: false,
        };
        let id = notice.id;

        {
            let mut state = self.state.lock();
            state.toasts.push(notice.clone());
            state.history.push_front(notice.clone());
            state.history.truncate(MAX_HISTORY);
        }

        // No subscribers is fine.
        let _ = self.sender.send(notice);
        id
    }

    /// Dismiss one toast. History is unaffected.
    pub fn hide(&self, id: Uuid) {
        self.state.lock().toasts.retain(|t| t.id != id);
    }

    pub fn clear_toasts(&self) {
        self.state.lock().toasts.clear();
    }

    pub fn mark_as_read(&self, id: Uuid) {
        if let Some(notice) = self.state.lock().history.iter_mut().find(|n| n.id == id) {
            notice.read = true;
        }
    }

    pub fn mark_all_as_read(&self) {
        for notice in self.state.lock().history.iter_mut() {
            notice.read = true;
        }
    }

    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }

    /// Delete one notification from history.
    pub fn remove(&self, id: Uuid) {
        self.state.lock().history.retain(|n| n.id != id);
    }

    pub fn toasts(&self) -> Vec<Notice> {
        self.state.lock().toasts.clone()
    }

    /// History, newest first.
    pub fn history(&self) -> Vec<Notice> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn unread_count(&self) -> usize {
        self.state.lock().history.iter().filter(|n| !n.read).count()
    }

    /// Replace history with the list stored at `path`. A missing file leaves
    /// history empty.
    pub async fn load_history(&self, path: &Path) -> Result<()> {
        let mut stored: Vec<Notice> = match tokio::fs::read_to_string(path).await {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                ClientError::Storage(format!("Failed to parse notice history: {}", e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(ClientError::Storage(format!(
                    "Failed to read notice history: {}",
                    e
                )));
            }
        };
        stored.truncate(MAX_HISTORY);
        self.state.lock().history = stored.into();
        Ok(())
    }

    /// Write history (not toasts) to `path`.
    pub async fn save_history(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.history())
            .map_err(|e| ClientError::Storage(format!("Failed to serialize notices: {}", e)))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ClientError::Storage(format!("Failed to create notice directory: {}", e))
            })?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|e| ClientError::Storage(format!("Failed to write notice history: {}", e)))
    }

    /// Show the localized message for a refused rotation.
    pub fn notify_rotation_failure(&self, failure: RotationFailure) -> Uuid {
        self.show(rotation_message(self.locale, failure), NoticeLevel::Error)
    }

    /// Show the localized rate-limit message.
    pub fn notify_rate_limited(&self) -> Uuid {
        self.show(rate_limit_message(self.locale), NoticeLevel::Error)
    }
}

impl Default for NoticeCenter {
    fn default() -> Self {
        Self::new(Locale::default())
    }
}

fn rotation_message(locale: Locale, failure: RotationFailure) -> &'static str {
    match (locale, failure) {
        (Locale::En, RotationFailure::AlreadyRotated) => {
            "Your session was renewed elsewhere. Please sign in again."
        }
        (Locale::En, RotationFailure::SessionInvalidated) => {
            "Your session has ended. Please sign in again."
        }
        (Locale::En, RotationFailure::ReuseDetected) => {
            "Suspicious token reuse was detected. You have been signed out for your safety."
        }
        (Locale::En, RotationFailure::Unknown) => {
            "Your session could not be renewed. Please sign in again."
        }
        (Locale::Ko, RotationFailure::AlreadyRotated) => {
            "다른 곳에서 세션이 갱신되었습니다. 다시 로그인해 주세요."
        }
        (Locale::Ko, RotationFailure::SessionInvalidated) => {
            "세션이 만료되었습니다. 다시 로그인해 주세요."
        }
        (Locale::Ko, RotationFailure::ReuseDetected) => {
            "토큰 재사용이 감지되어 안전을 위해 로그아웃되었습니다."
        }
        (Locale::Ko, RotationFailure::Unknown) => {
            "세션을 갱신하지 못했습니다. 다시 로그인해 주세요."
        }
    }
}

fn rate_limit_message(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Too many requests. Please try again shortly.",
        Locale::Ko => "요청이 너무 많습니다. 잠시 후 다시 시도해 주세요.",
    }
}
