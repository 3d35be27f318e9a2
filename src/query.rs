//! Instance resolution
//!
//! Picks Compute Engine instances out of a finished [`Inventory`] by name, id
//! and labels, and renders them one per line for shell use.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::inventory::Inventory;
use crate::resource::fetcher::{extract_short_name, str_field};

const MISSING: &str = "<N/A>";

/// Which instances to keep. Every selector that is set must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceSelector {
    /// Instance name or numeric id
    pub instance: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl InstanceSelector {
    pub fn new(instance: Option<String>, label_pairs: &[String]) -> Result<Self> {
        Ok(Self {
            instance: instance.filter(|i| !i.trim().is_empty()),
            labels: parse_labels(label_pairs)?,
        })
    }

    pub fn matches(&self, record: &Value) -> bool {
        let by_instance = self.instance.as_deref().map_or(true, |wanted| {
            str_field(record, "name") == Some(wanted)
                || instance_id(record).as_deref() == Some(wanted)
        });

        by_instance
            && self.labels.iter().all(|(key, value)| {
                record
                    .get("labels")
                    .and_then(|labels| labels.get(key.as_str()))
                    .and_then(Value::as_str)
                    == Some(value.as_str())
            })
    }
}

/// Parse `key:value` label selectors
pub fn parse_labels(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    for pair in pairs {
        let pair = pair.trim();
        let Some((key, value)) = pair.split_once(':') else {
            bail!("invalid label selector {:?}: missing \":\" separator", pair);
        };
        if key.is_empty() {
            bail!("invalid label selector {:?}: no key", pair);
        }
        if value.is_empty() {
            bail!("invalid label selector {:?}: no value", pair);
        }
        labels.insert(key.to_string(), value.to_string());
    }
    Ok(labels)
}

// The API sends ids as decimal strings, older fixtures as numbers
fn instance_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// The parts of an instance record a resolve line needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstance {
    pub region: String,
    pub zone: Option<String>,
    pub name: Option<String>,
    pub internal_ip: Option<String>,
    pub external_ip: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl ResolvedInstance {
    pub fn from_record(region: &str, record: &Value) -> Self {
        let interface = record.get("networkInterfaces").and_then(|n| n.get(0));
        let external_ip = interface
            .and_then(|i| i.get("accessConfigs"))
            .and_then(|configs| configs.get(0))
            .and_then(|config| str_field(config, "natIP"))
            .map(str::to_string);

        let labels = record
            .get("labels")
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            region: region.to_string(),
            zone: str_field(record, "zone").map(extract_short_name),
            name: str_field(record, "name").map(str::to_string),
            internal_ip: interface
                .and_then(|i| str_field(i, "networkIP"))
                .map(str::to_string),
            external_ip,
            labels,
        }
    }
}

/// Every instance of the tree the selector accepts, ordered by region, zone
/// and name
pub fn resolve_instances(inventory: &Inventory, selector: &InstanceSelector) -> Vec<ResolvedInstance> {
    let mut resolved = Vec::new();
    for (name, region) in &inventory.regions {
        let mut matched: Vec<ResolvedInstance> = region
            .compute
            .instances
            .snapshot()
            .iter()
            .filter(|record| selector.matches(record))
            .map(|record| ResolvedInstance::from_record(name, record))
            .collect();
        // Zones append concurrently, so the field has no stable order
        matched.sort_by(|a, b| (&a.zone, &a.name).cmp(&(&b.zone, &b.name)));
        resolved.extend(matched);
    }
    resolved
}

/// Which address columns a resolve line carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IpColumns {
    #[default]
    Both,
    Internal,
    External,
}

#[derive(Debug, Clone, Default)]
pub struct PrintOptions {
    pub ip: IpColumns,
    /// Label keys printed as an extra column
    pub labels: Vec<String>,
    pub url_encode: bool,
    pub header: bool,
}

impl PrintOptions {
    pub fn new(
        private: bool,
        public: bool,
        labels: Vec<String>,
        url_encode: bool,
        header: bool,
    ) -> Result<Self> {
        let ip = match (private, public) {
            (true, true) => bail!("cannot print only the private and only the public IP at once"),
            (true, false) => IpColumns::Internal,
            (false, true) => IpColumns::External,
            (false, false) => IpColumns::Both,
        };
        Ok(Self {
            ip,
            labels,
            url_encode,
            header,
        })
    }

    pub fn header_line(&self) -> Option<String> {
        if !self.header {
            return None;
        }
        let line = match self.ip {
            IpColumns::Internal => "#internalIp".to_string(),
            IpColumns::External => "#externalIp".to_string(),
            IpColumns::Both if self.labels.is_empty() => {
                "#region #zone #name #internalIp #externalIp".to_string()
            }
            IpColumns::Both => "#region #zone #name #internalIp #externalIp #labels".to_string(),
        };
        Some(line)
    }

    /// One output line, or `None` when an IP-only mode has nothing to print
    pub fn format(&self, instance: &ResolvedInstance) -> Option<String> {
        match self.ip {
            IpColumns::Internal => instance.internal_ip.clone(),
            IpColumns::External => instance.external_ip.clone(),
            IpColumns::Both => {
                let mut columns = vec![
                    instance.region.as_str(),
                    or_missing(&instance.zone),
                    or_missing(&instance.name),
                    or_missing(&instance.internal_ip),
                    or_missing(&instance.external_ip),
                ]
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>();
                if !self.labels.is_empty() {
                    columns.push(self.labels_column(instance));
                }
                Some(columns.join(" "))
            }
        }
    }

    /// Header (when asked for) followed by one line per instance
    pub fn render(&self, instances: &[ResolvedInstance]) -> Vec<String> {
        self.header_line()
            .into_iter()
            .chain(instances.iter().filter_map(|instance| self.format(instance)))
            .collect()
    }

    fn labels_column(&self, instance: &ResolvedInstance) -> String {
        let pairs: Vec<String> = self
            .labels
            .iter()
            .filter_map(|key| {
                instance.labels.get(key).map(|value| {
                    if self.url_encode {
                        format!("{}:{}", key, urlencoding::encode(value))
                    } else {
                        format!("{}:{}", key, value)
                    }
                })
            })
            .collect();
        if pairs.is_empty() {
            MISSING.to_string()
        } else {
            pairs.join(",")
        }
    }
}

fn or_missing(value: &Option<String>) -> &str {
    match value.as_deref() {
        Some(v) if !v.is_empty() => v,
        _ => MISSING,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn web_instance() -> Value {
        json!({
            "id": "4711",
            "name": "web-1",
            "zone": "https://www.googleapis.com/compute/v1/projects/p/zones/us-east1-b",
            "labels": {"env": "prod", "owner": "data team"},
            "networkInterfaces": [{
                "networkIP": "10.0.0.2",
                "accessConfigs": [{"natIP": "34.1.2.3"}]
            }]
        })
    }

    fn batch_instance() -> Value {
        json!({
            "id": 4712,
            "name": "batch-1",
            "zone": "https://www.googleapis.com/compute/v1/projects/p/zones/us-east1-c",
            "labels": {"env": "dev"},
            "networkInterfaces": [{"networkIP": "10.0.0.3"}]
        })
    }

    fn labels(pairs: &[&str]) -> Vec<String> {
        pairs.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_parse_labels() {
        let parsed = parse_labels(&labels(&["env:prod", " owner:a:b "])).unwrap();
        assert_eq!(parsed["env"], "prod");
        assert_eq!(parsed["owner"], "a:b");
    }

    #[test]
    fn test_parse_labels_rejects_bad_pairs() {
        let err = parse_labels(&labels(&["env"])).unwrap_err();
        assert!(err.to_string().contains("missing \":\" separator"));
        assert!(parse_labels(&labels(&[":prod"])).unwrap_err().to_string().contains("no key"));
        assert!(parse_labels(&labels(&["env:"])).unwrap_err().to_string().contains("no value"));
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = InstanceSelector::default();
        assert!(selector.matches(&web_instance()));
        assert!(selector.matches(&json!({})));
    }

    #[test]
    fn test_selector_matches_name_or_id() {
        let by_name = InstanceSelector::new(Some("web-1".into()), &[]).unwrap();
        assert!(by_name.matches(&web_instance()));
        assert!(!by_name.matches(&batch_instance()));

        let by_id = InstanceSelector::new(Some("4712".into()), &[]).unwrap();
        assert!(by_id.matches(&batch_instance()));
        assert!(!by_id.matches(&web_instance()));
    }

    #[test]
    fn test_label_selectors_all_must_match() {
        let selector = InstanceSelector::new(None, &labels(&["env:prod", "owner:data team"])).unwrap();
        assert!(selector.matches(&web_instance()));

        let selector = InstanceSelector::new(None, &labels(&["env:prod", "owner:someone"])).unwrap();
        assert!(!selector.matches(&web_instance()));

        let selector = InstanceSelector::new(Some("batch-1".into()), &labels(&["env:prod"])).unwrap();
        assert!(!selector.matches(&batch_instance()));
    }

    #[test]
    fn test_resolved_instance_from_record() {
        let resolved = ResolvedInstance::from_record("us-east1", &web_instance());
        assert_eq!(resolved.zone.as_deref(), Some("us-east1-b"));
        assert_eq!(resolved.internal_ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(resolved.external_ip.as_deref(), Some("34.1.2.3"));
        assert_eq!(resolved.labels["owner"], "data team");

        let resolved = ResolvedInstance::from_record("us-east1", &batch_instance());
        assert_eq!(resolved.external_ip, None);
    }

    #[test]
    fn test_resolve_instances_orders_and_filters() {
        let inventory = Inventory::new(
            Uuid::new_v4(),
            "p",
            &["us-east1".to_string(), "asia-east1".to_string()],
        );
        let east = &inventory.regions["us-east1"].compute.instances;
        east.extend([batch_instance(), web_instance()]);
        inventory.regions["asia-east1"]
            .compute
            .instances
            .extend([json!({"name": "tokyo-1", "labels": {"env": "prod"}})]);

        let all = resolve_instances(&inventory, &InstanceSelector::default());
        let names: Vec<&str> = all.iter().filter_map(|i| i.name.as_deref()).collect();
        assert_eq!(names, vec!["tokyo-1", "web-1", "batch-1"]);

        let prod = InstanceSelector::new(None, &labels(&["env:prod"])).unwrap();
        let regions: Vec<String> = resolve_instances(&inventory, &prod)
            .into_iter()
            .map(|i| i.region)
            .collect();
        assert_eq!(regions, vec!["asia-east1", "us-east1"]);
    }

    #[test]
    fn test_default_line_and_header() {
        let options = PrintOptions::new(false, false, Vec::new(), true, true).unwrap();
        let batch = ResolvedInstance::from_record("us-east1", &batch_instance());
        assert_eq!(
            options.render(&[batch]),
            vec![
                "#region #zone #name #internalIp #externalIp",
                "us-east1 us-east1-c batch-1 10.0.0.3 <N/A>",
            ]
        );
    }

    #[test]
    fn test_label_column_is_url_encoded() {
        let web = ResolvedInstance::from_record("us-east1", &web_instance());
        let keys = vec!["owner".to_string(), "env".to_string(), "team".to_string()];

        let encoded = PrintOptions::new(false, false, keys.clone(), true, false).unwrap();
        assert_eq!(
            encoded.format(&web).unwrap(),
            "us-east1 us-east1-b web-1 10.0.0.2 34.1.2.3 owner:data%20team,env:prod"
        );

        let raw = PrintOptions::new(false, false, keys, false, true).unwrap();
        assert!(raw.format(&web).unwrap().ends_with("owner:data team,env:prod"));
        assert!(raw.header_line().unwrap().ends_with("#labels"));

        let absent = PrintOptions::new(false, false, vec!["team".to_string()], true, false).unwrap();
        assert!(absent.format(&web).unwrap().ends_with(" <N/A>"));
    }

    #[test]
    fn test_ip_only_modes_skip_missing_addresses() {
        let instances = vec![
            ResolvedInstance::from_record("us-east1", &web_instance()),
            ResolvedInstance::from_record("us-east1", &batch_instance()),
        ];

        let public = PrintOptions::new(false, true, Vec::new(), true, true).unwrap();
        assert_eq!(public.render(&instances), vec!["#externalIp", "34.1.2.3"]);

        let private = PrintOptions::new(true, false, Vec::new(), true, false).unwrap();
        assert_eq!(private.render(&instances), vec!["10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn test_private_and_public_conflict() {
        assert!(PrintOptions::new(true, true, Vec::new(), true, false).is_err());
    }
}
