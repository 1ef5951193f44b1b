use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::task::JoinHandle;

use crate::alerts::{AlertRequest, AlertSink, DispatchError};
use crate::config::SiteConfig;
use crate::store::{Site, Store};

use super::SiteLocks;

pub(crate) const BASE_EPOCH_SECS: i64 = 1_700_000_000;

pub(crate) fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(BASE_EPOCH_SECS + secs, 0)
        .single()
        .expect("valid timestamp")
}

pub(crate) fn site_config(id: &str) -> SiteConfig {
    SiteConfig {
        id: id.to_string(),
        name: format!("Site {id}"),
        api_key: format!("key-{id}"),
        chat_id: -100,
        heartbeat_period_secs: 60,
        grace_period_secs: 30,
        router_reconnect_enabled: false,
        alerting_enabled: true,
        language: "en".to_string(),
    }
}

pub(crate) fn test_site(id: &str) -> Site {
    Site::from_config(&site_config(id))
}

pub(crate) struct Harness {
    pub store: Store,
    pub locks: SiteLocks,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn with_site(site: Site) -> Self {
        let store = Store::temporary().expect("temporary store");
        store.save_site(&site).expect("save site");
        Self {
            store,
            locks: SiteLocks::new(),
            sink: Arc::new(RecordingSink::default()),
        }
    }

    pub fn site(&self, id: &str) -> Site {
        self.store.load_site(id).expect("load site")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PostedMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub text: String,
    pub pinned: bool,
    pub edits: usize,
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    pub sent: Mutex<Vec<AlertRequest>>,
    pub reports: Mutex<Vec<(i64, String)>>,
    pub posted: Mutex<Vec<PostedMessage>>,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<AlertRequest> {
        self.sent.lock().expect("sink lock").clone()
    }

    pub fn reports(&self) -> Vec<(i64, String)> {
        self.reports.lock().expect("sink lock").clone()
    }

    pub fn posted(&self) -> Vec<PostedMessage> {
        self.posted.lock().expect("sink lock").clone()
    }

    fn check(&self) -> Result<(), DispatchError> {
        if self.fail {
            return Err(DispatchError::Rejected("sink configured to fail".to_string()));
        }
        Ok(())
    }

    fn with_message<T>(
        &self,
        chat_id: i64,
        message_id: i32,
        apply: impl FnOnce(&mut PostedMessage) -> T,
    ) -> Result<T, DispatchError> {
        self.check()?;
        let mut posted = self.posted.lock().expect("sink lock");
        posted
            .iter_mut()
            .find(|message| message.chat_id == chat_id && message.message_id == message_id)
            .map(apply)
            .ok_or_else(|| DispatchError::Rejected(format!("message {message_id} not found")))
    }
}

impl AlertSink for RecordingSink {
    async fn send_alert(&self, request: &AlertRequest) -> Result<(), DispatchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;
        self.sent.lock().expect("sink lock").push(request.clone());
        Ok(())
    }

    async fn send_html(&self, chat_id: i64, text: &str) -> Result<(), DispatchError> {
        self.check()?;
        self.reports
            .lock()
            .expect("sink lock")
            .push((chat_id, text.to_string()));
        Ok(())
    }

    async fn post_pinned(&self, chat_id: i64, text: &str) -> Result<i32, DispatchError> {
        self.check()?;
        let mut posted = self.posted.lock().expect("sink lock");
        let message_id = posted.len() as i32 + 1;
        posted.push(PostedMessage {
            chat_id,
            message_id,
            text: text.to_string(),
            pinned: true,
            edits: 0,
        });
        Ok(message_id)
    }

    async fn edit_html(&self, chat_id: i64, message_id: i32, text: &str) -> Result<(), DispatchError> {
        self.with_message(chat_id, message_id, |message| {
            message.text = text.to_string();
            message.edits += 1;
        })
    }

    async fn unpin(&self, chat_id: i64, message_id: i32) -> Result<(), DispatchError> {
        self.with_message(chat_id, message_id, |message| message.pinned = false)
    }
}

/// Waits for background alert deliveries and returns their results.
pub(crate) async fn settle(handles: Vec<JoinHandle<bool>>) -> Vec<bool> {
    let mut delivered = Vec::with_capacity(handles.len());
    for handle in handles {
        delivered.push(handle.await.expect("dispatch task"));
    }
    delivered
}
