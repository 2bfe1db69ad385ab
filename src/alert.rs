//! data structures for deserializing incoming alerts
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
/// data from prometheus received by the alertmanager webhook receiver
#[allow(clippy::missing_docs_in_private_items)]
pub struct Data {
    version: String,
    group_key: String,

    receiver: String,
    status: String,
    pub alerts: Vec<Alert>,
    group_labels: HashMap<String, String>,
    common_labels: HashMap<String, String>,
    common_annotations: HashMap<String, String>,
    #[serde(rename = "externalURL")]
    external_url: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::missing_docs_in_private_items)]
pub struct Alert {
    status: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    #[serde(rename = "generatorURL")]
    generator_url: String,
    pub fingerprint: String,
}

impl Alert {
    /// display name of the alert, the `alertname` label if present,
    /// else the fingerprint; only used for logging context
    pub fn name(&self) -> &str {
        match self.labels.get("alertname") {
            Some(name) => name.as_str(),
            None => self.fingerprint.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Alert, Data};

    #[test]
    fn deserialize_webhook_payload() {
        let payload = json!({
            "version": "4",
            "groupKey": "{}:{alertname=\"NodeDown\"}",
            "receiver": "command-responder",
            "status": "firing",
            "alerts": [{
                "status": "firing",
                "labels": { "alertname": "NodeDown", "instance": "node1:9100" },
                "annotations": { "command_responder_local_command": "echo hi" },
                "startsAt": "2022-05-10T12:00:00Z",
                "endsAt": "0001-01-01T00:00:00Z",
                "generatorURL": "http://prometheus:9090/graph",
                "fingerprint": "1c2b6b4c5d6e7f80"
            }],
            "groupLabels": { "alertname": "NodeDown" },
            "commonLabels": { "alertname": "NodeDown" },
            "commonAnnotations": {},
            "externalURL": "http://alertmanager:9093"
        });

        let data: Data = serde_json::from_value(payload).unwrap();
        assert_eq!(data.alerts.len(), 1);

        let alert = &data.alerts[0];
        assert_eq!(alert.name(), "NodeDown");
        assert_eq!(
            alert.annotations["command_responder_local_command"],
            "echo hi"
        );
    }

    #[test]
    fn alert_name_falls_back_to_fingerprint() {
        let alert: Alert = serde_json::from_value(json!({
            "status": "firing",
            "labels": {},
            "annotations": {},
            "startsAt": "2022-05-10T12:00:00Z",
            "endsAt": "0001-01-01T00:00:00Z",
            "generatorURL": "",
            "fingerprint": "1c2b6b4c5d6e7f80"
        }))
        .unwrap();

        assert_eq!(alert.name(), "1c2b6b4c5d6e7f80");
    }
}
