use std::path::Path;

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use thiserror::Error;

mod model;

pub use model::{
    EventType, NewPowerEvent, PowerEvent, PowerStatus, Site, TimelineMessage, elapsed_secs,
};

use model::StoredHeartbeat;

const SITES_TREE: &str = "sites";
const HEARTBEATS_PREFIX: &str = "heartbeats/";
const EVENTS_PREFIX: &str = "events/";
const TIMELINE_MESSAGES_TREE: &str = "timeline_messages";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Sled(#[from] sled::Error),
    #[error("record codec failure: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("site {0:?} not found")]
    SiteNotFound(String),
    #[error("event {0} not found")]
    EventNotFound(u64),
}

/// Instants are persisted at millisecond resolution.
pub fn normalize_instant(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(3)
}

/// Sled-backed home of sites, their heartbeats and their power events.
///
/// Heartbeats and events live in one tree per site so that deleting a site
/// drops its whole history at once. Keys start with the instant encoded as
/// order-preserving big-endian milliseconds.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    sites: sled::Tree,
    timeline_messages: sled::Tree,
}

/// Result of [`Store::commit_transition`].
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    /// `false` when a heartbeat already existed at the requested instant.
    pub heartbeat_inserted: bool,
    pub event: PowerEvent,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    #[cfg(test)]
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let sites = db.open_tree(SITES_TREE)?;
        let timeline_messages = db.open_tree(TIMELINE_MESSAGES_TREE)?;
        Ok(Self {
            db,
            sites,
            timeline_messages,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    // Sites

    pub fn site(&self, site_id: &str) -> Result<Option<Site>, StoreError> {
        match self.sites.get(site_id.as_bytes())? {
            Some(value) => Ok(Some(decode_site(&value)?)),
            None => Ok(None),
        }
    }

    pub fn load_site(&self, site_id: &str) -> Result<Site, StoreError> {
        self.site(site_id)?
            .ok_or_else(|| StoreError::SiteNotFound(site_id.to_string()))
    }

    pub fn save_site(&self, site: &Site) -> Result<(), StoreError> {
        let value = serde_json::to_vec(site)?;
        self.sites.insert(site.id.as_bytes(), value)?;
        Ok(())
    }

    pub fn list_sites(&self) -> Result<Vec<Site>, StoreError> {
        self.sites
            .iter()
            .values()
            .map(|value| decode_site(&value?))
            .collect()
    }

    pub fn find_site_by_api_key(&self, api_key: &str) -> Result<Option<Site>, StoreError> {
        Ok(self
            .list_sites()?
            .into_iter()
            .find(|site| site.api_key == api_key))
    }

    /// Deletes a site together with its heartbeats and events.
    pub fn remove_site(&self, site_id: &str) -> Result<bool, StoreError> {
        let existed = self.sites.remove(site_id.as_bytes())?.is_some();
        self.db.drop_tree(heartbeats_tree_name(site_id))?;
        self.db.drop_tree(events_tree_name(site_id))?;
        let prefix = format!("{site_id}/");
        for key in self.timeline_messages.scan_prefix(prefix.as_bytes()).keys() {
            self.timeline_messages.remove(key?)?;
        }
        Ok(existed)
    }

    /// Clears all heartbeats and events of a site, keeping the site record.
    pub fn clear_history(&self, site_id: &str) -> Result<(), StoreError> {
        self.heartbeats(site_id)?.clear()?;
        self.events_tree(site_id)?.clear()?;
        Ok(())
    }

    // Heartbeats

    /// Appends a heartbeat. Returns `false` when one already exists at that
    /// instant.
    pub fn append_heartbeat(
        &self,
        site_id: &str,
        at: DateTime<Utc>,
        synthetic: bool,
    ) -> Result<bool, StoreError> {
        let at = normalize_instant(at);
        let value = serde_json::to_vec(&StoredHeartbeat {
            received_at: at,
            synthetic,
        })?;
        let previous = self
            .heartbeats(site_id)?
            .compare_and_swap(instant_key(at), None as Option<&[u8]>, Some(value))?;
        Ok(previous.is_ok())
    }

    pub fn has_heartbeat_at(&self, site_id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self
            .heartbeats(site_id)?
            .contains_key(instant_key(normalize_instant(at)))?)
    }

    pub fn earliest_heartbeat(&self, site_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.heartbeats(site_id)?
            .first()?
            .map(|(_, value)| decode_heartbeat(&value))
            .transpose()
    }

    pub fn latest_heartbeat(&self, site_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.heartbeats(site_id)?
            .last()?
            .map(|(_, value)| decode_heartbeat(&value))
            .transpose()
    }

    /// Latest heartbeat strictly before `at`.
    pub fn heartbeat_before(
        &self,
        site_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.heartbeats(site_id)?
            .range(..instant_key(normalize_instant(at)))
            .next_back()
            .transpose()?
            .map(|(_, value)| decode_heartbeat(&value))
            .transpose()
    }

    /// Earliest heartbeat strictly after `at`.
    pub fn heartbeat_after(
        &self,
        site_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let at = normalize_instant(at);
        for item in self.heartbeats(site_id)?.range(instant_key(at)..) {
            let (_, value) = item?;
            let received_at = decode_heartbeat(&value)?;
            if received_at > at {
                return Ok(Some(received_at));
            }
        }
        Ok(None)
    }

    /// Heartbeats in `[from, to)`, oldest first.
    pub fn heartbeats_between(
        &self,
        site_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        let from = instant_key(normalize_instant(from));
        let to = instant_key(normalize_instant(to));
        if from >= to {
            return Ok(Vec::new());
        }
        self.heartbeats(site_id)?
            .range(from..to)
            .map(|item| decode_heartbeat(&item?.1))
            .collect()
    }

    pub fn heartbeat_count(&self, site_id: &str) -> Result<usize, StoreError> {
        Ok(self.heartbeats(site_id)?.len())
    }

    /// Heartbeats written by the monitor itself rather than received.
    pub fn synthetic_heartbeat_count(&self, site_id: &str) -> Result<usize, StoreError> {
        let mut count = 0;
        for value in self.heartbeats(site_id)?.iter().values() {
            let stored: StoredHeartbeat = serde_json::from_slice(&value?)?;
            if stored.synthetic {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Removes heartbeats in `[from, to)` and returns how many were removed.
    pub fn delete_heartbeats_between(
        &self,
        site_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let from = instant_key(normalize_instant(from));
        let to = instant_key(normalize_instant(to));
        if from >= to {
            return Ok(0);
        }
        let tree = self.heartbeats(site_id)?;
        let keys = tree
            .range(from..to)
            .keys()
            .collect::<Result<Vec<_>, _>>()?;
        for key in &keys {
            tree.remove(key)?;
        }
        Ok(keys.len())
    }

    /// Drops heartbeats older than `cutoff`, always keeping the latest one so
    /// the site's projection stays derivable.
    pub fn prune_heartbeats_before(
        &self,
        site_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let Some(latest) = self.latest_heartbeat(site_id)? else {
            return Ok(0);
        };
        let cutoff = cutoff.min(latest);
        let tree = self.heartbeats(site_id)?;
        let keys = tree
            .range(..instant_key(normalize_instant(cutoff)))
            .keys()
            .collect::<Result<Vec<_>, _>>()?;
        for key in &keys {
            tree.remove(key)?;
        }
        Ok(keys.len())
    }

    // Events

    #[cfg(test)]
    pub fn insert_event(&self, site_id: &str, event: NewPowerEvent) -> Result<PowerEvent, StoreError> {
        let event = self.assign_event_id(site_id, event)?;
        self.write_event(&event)?;
        Ok(event)
    }

    /// Writes a state change as one unit: the optional heartbeat (skipped
    /// when the instant is taken), the event and the site record. Either
    /// everything lands or nothing does.
    pub fn commit_transition(
        &self,
        site: &Site,
        heartbeat: Option<(DateTime<Utc>, bool)>,
        event: NewPowerEvent,
    ) -> Result<Committed, StoreError> {
        let event = self.assign_event_id(&site.id, event)?;
        let record = (event_key(&event).to_vec(), serde_json::to_vec(&event)?);
        let heartbeat_inserted = self.commit(site, heartbeat, Some(record))?;
        Ok(Committed {
            heartbeat_inserted,
            event,
        })
    }

    /// Records a heartbeat and the site's refreshed projection atomically.
    pub fn commit_heartbeat(&self, site: &Site, at: DateTime<Utc>) -> Result<bool, StoreError> {
        self.commit(site, Some((at, false)), None)
    }

    fn commit(
        &self,
        site: &Site,
        heartbeat: Option<(DateTime<Utc>, bool)>,
        event: Option<(Vec<u8>, Vec<u8>)>,
    ) -> Result<bool, StoreError> {
        let heartbeat = heartbeat
            .map(|(at, synthetic)| -> Result<_, StoreError> {
                let at = normalize_instant(at);
                let value = serde_json::to_vec(&StoredHeartbeat {
                    received_at: at,
                    synthetic,
                })?;
                Ok((instant_key(at).to_vec(), value))
            })
            .transpose()?;
        let site_record = serde_json::to_vec(site)?;

        let heartbeats = self.heartbeats(&site.id)?;
        let events = self.events_tree(&site.id)?;
        (&self.sites, &heartbeats, &events)
            .transaction(|(sites, heartbeats, events)| {
                let mut inserted = false;
                if let Some((key, value)) = &heartbeat
                    && heartbeats.get(key)?.is_none()
                {
                    heartbeats.insert(key.clone(), value.clone())?;
                    inserted = true;
                }
                if let Some((key, value)) = &event {
                    events.insert(key.clone(), value.clone())?;
                }
                sites.insert(site.id.as_bytes(), site_record.clone())?;
                Ok::<_, ConflictableTransactionError<StoreError>>(inserted)
            })
            .map_err(|error| match error {
                TransactionError::Abort(error) => error,
                TransactionError::Storage(error) => StoreError::Sled(error),
            })
    }

    // Pinned timelines

    pub fn timeline_message(
        &self,
        site_id: &str,
        day: NaiveDate,
    ) -> Result<Option<TimelineMessage>, StoreError> {
        match self.timeline_messages.get(timeline_message_key(site_id, day))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    pub fn save_timeline_message(&self, message: &TimelineMessage) -> Result<(), StoreError> {
        let value = serde_json::to_vec(message)?;
        self.timeline_messages
            .insert(timeline_message_key(&message.site_id, message.day), value)?;
        Ok(())
    }

    pub fn remove_timeline_message(&self, site_id: &str, day: NaiveDate) -> Result<(), StoreError> {
        self.timeline_messages
            .remove(timeline_message_key(site_id, day))?;
        Ok(())
    }

    fn assign_event_id(&self, site_id: &str, event: NewPowerEvent) -> Result<PowerEvent, StoreError> {
        Ok(PowerEvent {
            id: self.db.generate_id()?,
            site_id: site_id.to_string(),
            event_type: event.event_type,
            occurred_at: normalize_instant(event.occurred_at),
            previous_state_duration_secs: event.previous_state_duration_secs,
            alert_sent: event.alert_sent,
            alert_sent_at: event.alert_sent_at,
        })
    }

    fn write_event(&self, event: &PowerEvent) -> Result<(), StoreError> {
        let value = serde_json::to_vec(event)?;
        self.events_tree(&event.site_id)?
            .insert(event_key(event), value)?;
        Ok(())
    }

    fn heartbeats(&self, site_id: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(heartbeats_tree_name(site_id))?)
    }

    fn events_tree(&self, site_id: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(events_tree_name(site_id))?)
    }
}

fn heartbeats_tree_name(site_id: &str) -> String {
    format!("{HEARTBEATS_PREFIX}{site_id}")
}

fn events_tree_name(site_id: &str) -> String {
    format!("{EVENTS_PREFIX}{site_id}")
}

fn timeline_message_key(site_id: &str, day: NaiveDate) -> String {
    format!("{site_id}/{}", day.format("%Y-%m-%d"))
}

/// Big-endian millis with the sign bit flipped, so byte order matches time
/// order for instants before the epoch too.
fn instant_key(at: DateTime<Utc>) -> [u8; 8] {
    ((at.timestamp_millis() as u64) ^ (1 << 63)).to_be_bytes()
}

fn event_key(event: &PowerEvent) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&instant_key(event.occurred_at));
    key[8..].copy_from_slice(&event.id.to_be_bytes());
    key
}

fn decode_site(value: &[u8]) -> Result<Site, StoreError> {
    Ok(serde_json::from_slice(value)?)
}

fn decode_event(value: &[u8]) -> Result<PowerEvent, StoreError> {
    Ok(serde_json::from_slice(value)?)
}

fn decode_heartbeat(value: &[u8]) -> Result<DateTime<Utc>, StoreError> {
    let stored: StoredHeartbeat = serde_json::from_slice(value)?;
    Ok(stored.received_at)
}
