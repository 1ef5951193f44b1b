//! Outbound alert transport: message formatting and the [`AlertSink`]
//! seam that the monitor hands finished transitions to.

mod format;
mod i18n;
mod telegram;

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::store::{EventType, Site};

pub use format::{format_daily_report, format_duration, format_power_alert, format_week_report};
pub use i18n::Language;
pub use telegram::TelegramAlertSink;

/// One committed power transition that should be announced.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRequest {
    pub site_id: String,
    pub site_name: String,
    pub chat_id: i64,
    pub language: Language,
    pub event_type: EventType,
    pub previous_duration_secs: Option<i64>,
    pub event_id: u64,
}

impl AlertRequest {
    pub fn for_event(
        site: &Site,
        event_type: EventType,
        previous_duration_secs: Option<i64>,
        event_id: u64,
    ) -> Self {
        Self {
            site_id: site.id.clone(),
            site_name: site.name.clone(),
            chat_id: site.chat_id,
            language: site.language,
            event_type,
            previous_duration_secs,
            event_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
    #[error("alert rejected: {0}")]
    Rejected(String),
}

pub trait AlertSink: Send + Sync {
    fn send_alert(
        &self,
        request: &AlertRequest,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;

    /// Sends a pre-rendered HTML message, used by the daily report.
    fn send_html(
        &self,
        chat_id: i64,
        text: &str,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;

    /// Sends an HTML message, pins it silently and returns its message id.
    fn post_pinned(
        &self,
        chat_id: i64,
        text: &str,
    ) -> impl Future<Output = Result<i32, DispatchError>> + Send;

    /// Replaces the text of an earlier message. Unchanged text is not an error.
    fn edit_html(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;

    fn unpin(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

impl<T: AlertSink> AlertSink for Arc<T> {
    fn send_alert(
        &self,
        request: &AlertRequest,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send {
        (**self).send_alert(request)
    }

    fn send_html(
        &self,
        chat_id: i64,
        text: &str,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send {
        (**self).send_html(chat_id, text)
    }

    fn post_pinned(
        &self,
        chat_id: i64,
        text: &str,
    ) -> impl Future<Output = Result<i32, DispatchError>> + Send {
        (**self).post_pinned(chat_id, text)
    }

    fn edit_html(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send {
        (**self).edit_html(chat_id, message_id, text)
    }

    fn unpin(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send {
        (**self).unpin(chat_id, message_id)
    }
}
