//! Core data models for the latency monitor

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineError, ProbeErrorKind};

/// Target classes probed on independent schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetClass {
    Network,
    Storage,
}

impl TargetClass {
    pub const ALL: [TargetClass; 2] = [TargetClass::Network, TargetClass::Storage];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetClass::Network => "network",
            TargetClass::Storage => "storage",
        }
    }
}

impl fmt::Display for TargetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe protocol understood by the executor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

/// Operating mode, selects which endpoint set is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    SessionHost,
    EndUser,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::SessionHost => "sessionhost",
            Mode::EndUser => "enduser",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sessionhost" | "session-host" => Ok(Mode::SessionHost),
            "enduser" | "end-user" => Ok(Mode::EndUser),
            other => Err(EngineError::InvalidConfig(format!("unknown mode: {}", other))),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    443
}

fn default_smb_port() -> u16 {
    445
}

/// A remote service endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkTarget {
    pub id: String,
    pub name: String,
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Monitored but excluded from alerting
    #[serde(default)]
    pub muted: bool,
    /// When false only reachability matters, latency never breaches
    #[serde(default = "default_true")]
    pub latency_critical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl NetworkTarget {
    pub fn new(id: impl Into<String>, hostname: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            hostname: hostname.into(),
            port: default_port(),
            protocol: Protocol::Tcp,
            enabled: true,
            muted: false,
            latency_critical: true,
            category: None,
        }
    }
}

/// User overrides for a catalog target, kept across mode switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

impl TargetOverride {
    pub fn apply(&self, target: &mut NetworkTarget) {
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(muted) = self.muted {
            target.muted = muted;
        }
    }
}

/// Kind of storage container a share path backs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Profile,
    Container,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Profile => write!(f, "profile"),
            StorageKind::Container => write!(f, "container"),
        }
    }
}

/// A storage file-share path reached over SMB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoragePathTarget {
    pub id: String,
    pub kind: StorageKind,
    /// Full UNC path, e.g. `\\account.file.core.windows.net\share`
    #[serde(default)]
    pub path: String,
    pub hostname: String,
    #[serde(default = "default_smb_port")]
    pub port: u16,
    #[serde(default)]
    pub muted: bool,
}

/// Capability shared by every probed target
pub trait Probed {
    fn id(&self) -> &str;
    fn enabled(&self) -> bool;
    fn muted(&self) -> bool;
    fn hostname(&self) -> &str;
    fn port(&self) -> u16;
    fn protocol(&self) -> Protocol;
    fn display_name(&self) -> &str;
    fn class(&self) -> TargetClass;
}

impl Probed for NetworkTarget {
    fn id(&self) -> &str {
        &self.id
    }
    fn enabled(&self) -> bool {
        self.enabled
    }
    fn muted(&self) -> bool {
        self.muted
    }
    fn hostname(&self) -> &str {
        &self.hostname
    }
    fn port(&self) -> u16 {
        self.port
    }
    fn protocol(&self) -> Protocol {
        self.protocol
    }
    fn display_name(&self) -> &str {
        &self.name
    }
    fn class(&self) -> TargetClass {
        TargetClass::Network
    }
}

impl Probed for StoragePathTarget {
    fn id(&self) -> &str {
        &self.id
    }
    fn enabled(&self) -> bool {
        true
    }
    fn muted(&self) -> bool {
        self.muted
    }
    fn hostname(&self) -> &str {
        &self.hostname
    }
    fn port(&self) -> u16 {
        self.port
    }
    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }
    fn display_name(&self) -> &str {
        &self.hostname
    }
    fn class(&self) -> TargetClass {
        TargetClass::Storage
    }
}

/// Any monitored target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "lowercase")]
pub enum Target {
    Network(NetworkTarget),
    Storage(StoragePathTarget),
}

impl Target {
    fn inner(&self) -> &dyn Probed {
        match self {
            Target::Network(t) => t,
            Target::Storage(t) => t,
        }
    }

    /// Whether a latency sample on this target can count as a breach
    pub fn latency_critical(&self) -> bool {
        match self {
            Target::Network(t) => t.latency_critical,
            Target::Storage(_) => false,
        }
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        match self {
            Target::Network(t) => t.muted = muted,
            Target::Storage(t) => t.muted = muted,
        }
    }

    /// Storage targets cannot be disabled individually
    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        if let Target::Network(t) = self {
            t.enabled = enabled;
        }
    }
}

impl Probed for Target {
    fn id(&self) -> &str {
        self.inner().id()
    }
    fn enabled(&self) -> bool {
        self.inner().enabled()
    }
    fn muted(&self) -> bool {
        self.inner().muted()
    }
    fn hostname(&self) -> &str {
        self.inner().hostname()
    }
    fn port(&self) -> u16 {
        self.inner().port()
    }
    fn protocol(&self) -> Protocol {
        self.inner().protocol()
    }
    fn display_name(&self) -> &str {
        self.inner().display_name()
    }
    fn class(&self) -> TargetClass {
        self.inner().class()
    }
}

impl From<NetworkTarget> for Target {
    fn from(t: NetworkTarget) -> Self {
        Target::Network(t)
    }
}

impl From<StoragePathTarget> for Target {
    fn from(t: StoragePathTarget) -> Self {
        Target::Storage(t)
    }
}

/// Result of a single probe attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub target_id: String,
    pub timestamp_ms: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ProbeErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_message: Option<String>,
}

impl ProbeOutcome {
    pub fn success(target_id: impl Into<String>, timestamp_ms: i64, latency_ms: f64) -> Self {
        Self {
            target_id: target_id.into(),
            timestamp_ms,
            success: true,
            latency_ms: Some(latency_ms),
            error_kind: None,
            raw_message: None,
        }
    }

    pub fn failure(target_id: impl Into<String>, timestamp_ms: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            target_id: target_id.into(),
            timestamp_ms,
            success: false,
            latency_ms: None,
            error_kind: Some(ProbeErrorKind::classify(&message)),
            raw_message: Some(message),
        }
    }
}

/// Latency boundaries in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyThresholds {
    pub excellent: f64,
    pub good: f64,
    pub warning: f64,
}

impl Default for LatencyThresholds {
    fn default() -> Self {
        Self {
            excellent: 30.0,
            good: 80.0,
            warning: 150.0,
        }
    }
}

impl LatencyThresholds {
    pub fn new(excellent: f64, good: f64, warning: f64) -> Self {
        Self {
            excellent,
            good,
            warning,
        }
    }

    /// Reject negative, non-finite or unordered thresholds
    pub fn validate(&self) -> Result<(), EngineError> {
        let values = [self.excellent, self.good, self.warning];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(EngineError::InvalidConfig(
                "thresholds must be non-negative numbers".to_string(),
            ));
        }
        if !(self.excellent < self.good && self.good < self.warning) {
            return Err(EngineError::InvalidConfig(format!(
                "thresholds must be in order excellent < good < warning (got {} / {} / {})",
                self.excellent, self.good, self.warning
            )));
        }
        Ok(())
    }
}

/// Classified health level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Excellent,
    Good,
    Warning,
    Critical,
    #[default]
    Unknown,
}

impl Level {
    /// Short label that does not rely on color
    pub fn label(&self) -> &'static str {
        match self {
            Level::Excellent => "OK",
            Level::Good => "GOOD",
            Level::Warning => "WARN",
            Level::Critical => "CRIT",
            Level::Unknown => "-",
        }
    }

    pub fn is_breach(&self) -> bool {
        matches!(self, Level::Warning | Level::Critical)
    }

    /// Ordinal used for severity comparisons; `Unknown` ranks lowest
    pub fn severity(&self) -> u8 {
        match self {
            Level::Unknown => 0,
            Level::Excellent => 1,
            Level::Good => 2,
            Level::Warning => 3,
            Level::Critical => 4,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Excellent => write!(f, "excellent"),
            Level::Good => write!(f, "good"),
            Level::Warning => write!(f, "warning"),
            Level::Critical => write!(f, "critical"),
            Level::Unknown => write!(f, "unknown"),
        }
    }
}

/// A successful latency sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub timestamp_ms: i64,
    pub latency_ms: f64,
}

/// Last probe error recorded on a status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeErrorInfo {
    pub kind: ProbeErrorKind,
    pub message: String,
    pub user_message: String,
    pub timestamp_ms: i64,
}

/// Engine configuration, replaced as a whole
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_test_interval")]
    pub test_interval_sec: u64,
    #[serde(default)]
    pub thresholds: LatencyThresholds,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u32,
    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown_min: u64,
    #[serde(default = "default_true")]
    pub storage_enabled: bool,
    #[serde(default = "default_storage_interval")]
    pub storage_test_interval_sec: u64,
    #[serde(default = "default_alert_threshold")]
    pub storage_alert_threshold: u32,
    #[serde(default = "default_alert_cooldown")]
    pub storage_alert_cooldown_min: u64,
    #[serde(default)]
    pub mode: Mode,
}

/// Longest accepted probe interval (one day)
pub const MAX_INTERVAL_SEC: u64 = 86_400;
/// Longest accepted alert cooldown (one day)
pub const MAX_COOLDOWN_MIN: u64 = 1_440;

fn default_test_interval() -> u64 {
    10
}

fn default_storage_interval() -> u64 {
    60
}

fn default_alert_threshold() -> u32 {
    3
}

fn default_alert_cooldown() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            test_interval_sec: default_test_interval(),
            thresholds: LatencyThresholds::default(),
            notifications_enabled: true,
            alert_threshold: default_alert_threshold(),
            alert_cooldown_min: default_alert_cooldown(),
            storage_enabled: true,
            storage_test_interval_sec: default_storage_interval(),
            storage_alert_threshold: default_alert_threshold(),
            storage_alert_cooldown_min: default_alert_cooldown(),
            mode: Mode::SessionHost,
        }
    }
}

impl Config {
    /// Validate every field the engine depends on
    pub fn validate(&self) -> Result<(), EngineError> {
        self.thresholds.validate()?;
        check_range("testIntervalSec", self.test_interval_sec, 1, MAX_INTERVAL_SEC)?;
        check_range(
            "storageTestIntervalSec",
            self.storage_test_interval_sec,
            1,
            MAX_INTERVAL_SEC,
        )?;
        check_range("alertCooldownMin", self.alert_cooldown_min, 0, MAX_COOLDOWN_MIN)?;
        check_range(
            "storageAlertCooldownMin",
            self.storage_alert_cooldown_min,
            0,
            MAX_COOLDOWN_MIN,
        )?;
        if self.alert_threshold == 0 || self.storage_alert_threshold == 0 {
            return Err(EngineError::InvalidConfig(
                "alert thresholds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Produce a new validated config with the patch applied
    pub fn apply(&self, patch: &ConfigPatch) -> Result<Config, EngineError> {
        let mut next = self.clone();
        if let Some(v) = patch.test_interval_sec {
            next.test_interval_sec = v;
        }
        if let Some(v) = patch.thresholds {
            next.thresholds = v;
        }
        if let Some(v) = patch.notifications_enabled {
            next.notifications_enabled = v;
        }
        if let Some(v) = patch.alert_threshold {
            next.alert_threshold = v;
        }
        if let Some(v) = patch.alert_cooldown_min {
            next.alert_cooldown_min = v;
        }
        if let Some(v) = patch.storage_enabled {
            next.storage_enabled = v;
        }
        if let Some(v) = patch.storage_test_interval_sec {
            next.storage_test_interval_sec = v;
        }
        if let Some(v) = patch.storage_alert_threshold {
            next.storage_alert_threshold = v;
        }
        if let Some(v) = patch.storage_alert_cooldown_min {
            next.storage_alert_cooldown_min = v;
        }
        if let Some(v) = patch.mode {
            next.mode = v;
        }
        next.validate()?;
        Ok(next)
    }

    /// Storage paths are only monitored on session hosts
    pub fn storage_active(&self) -> bool {
        self.storage_enabled && self.mode == Mode::SessionHost
    }

    pub fn interval_for(&self, class: TargetClass) -> std::time::Duration {
        let secs = match class {
            TargetClass::Network => self.test_interval_sec,
            TargetClass::Storage => self.storage_test_interval_sec,
        };
        std::time::Duration::from_secs(secs.clamp(1, MAX_INTERVAL_SEC))
    }
}

fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<(), EngineError> {
    if value < min || value > max {
        return Err(EngineError::InvalidConfig(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        )));
    }
    Ok(())
}

/// Partial configuration update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_interval_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<LatencyThresholds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_cooldown_min: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_test_interval_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_alert_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_alert_cooldown_min: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
}
