use serde::Deserialize;
use std::collections::HashMap;

/// Hosts on which submissions are previewed instead of mailed.
const TEST_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// Values posted by the browser, keyed by input name.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct SubmittedData(HashMap<String, String>);

impl SubmittedData {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// True when the value is missing or empty.
    pub fn is_blank(&self, name: &str) -> bool {
        self.get(name).map_or(true, str::is_empty)
    }

    /// The value when present and non-empty.
    pub fn non_blank(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|value| !value.is_empty())
    }
}

impl From<HashMap<String, String>> for SubmittedData {
    fn from(values: HashMap<String, String>) -> Self {
        Self(values)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SubmittedData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Everything the request handler needs to know about one submission.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub host: Option<String>,
    pub data: SubmittedData,
}

impl RequestContext {
    pub fn new(host: Option<String>, data: SubmittedData) -> Self {
        Self { host, data }
    }

    pub fn is_test_environment(&self) -> bool {
        self.host
            .as_deref()
            .map(strip_port)
            .is_some_and(|host| TEST_HOSTS.contains(&host))
    }
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
