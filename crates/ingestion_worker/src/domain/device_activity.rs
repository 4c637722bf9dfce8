use chrono::{DateTime, Utc};
use common::domain::DeviceStatus;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// What the collector last observed from one device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceActivity {
    pub device_id: String,
    pub last_seen: DateTime<Utc>,
    /// Last online/offline report, if the device ever sent one
    pub status: Option<DeviceStatus>,
    pub messages: u64,
}

/// Last-seen times per device, updated by every decoded message
#[derive(Default)]
pub struct DeviceActivityTracker {
    devices: RwLock<HashMap<String, DeviceActivity>>,
}

impl DeviceActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn touch(&self, device_id: &str, seen_at: DateTime<Utc>) {
        let mut devices = self.devices.write().await;
        devices
            .entry(device_id.to_string())
            .and_modify(|activity| {
                activity.last_seen = activity.last_seen.max(seen_at);
                activity.messages += 1;
            })
            .or_insert_with(|| DeviceActivity {
                device_id: device_id.to_string(),
                last_seen: seen_at,
                status: None,
                messages: 1,
            });
    }

    /// Remember a status report. Ignored for devices never seen.
    pub async fn record_status(&self, device_id: &str, status: DeviceStatus) {
        let mut devices = self.devices.write().await;
        if let Some(activity) = devices.get_mut(device_id) {
            activity.status = Some(status);
        }
    }

    pub async fn last_seen(&self, device_id: &str) -> Option<DateTime<Utc>> {
        self.devices
            .read()
            .await
            .get(device_id)
            .map(|activity| activity.last_seen)
    }

    pub async fn get(&self, device_id: &str) -> Option<DeviceActivity> {
        self.devices.read().await.get(device_id).cloned()
    }

    /// All devices ordered by id
    pub async fn snapshot(&self) -> Vec<DeviceActivity> {
        let mut devices: Vec<DeviceActivity> =
            self.devices.read().await.values().cloned().collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }
}
