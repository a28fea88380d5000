use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct ProbeFile {
    pub setup: Setup,
    pub auth: Option<Auth>,
    #[serde(default)]
    pub suites: Vec<Suite>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Setup {
    pub base_url: String,
    pub timeout_secs: Option<u64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Auth {
    pub token: Option<String>,
    pub token_env: Option<String>,
    pub login: Option<Login>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Login {
    pub path: Option<String>,
    pub email: String,
    pub pass: String,
    pub token_field: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Suite {
    pub name: String,
    #[serde(default)]
    pub probes: Vec<Probe>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Probe {
    pub desc: Option<String>,
    pub method: String,
    pub path: String,
    pub expect: i64,
    pub headers: Option<BTreeMap<String, String>>,
    pub body: Option<serde_json::Value>,
    pub raw_body: Option<String>,
    #[serde(default)]
    pub protected: bool,
}
