//! Bot configuration: profile limits, match preference, admin roles and runtime bounds.
//!
//! Configuration is read once at startup from TOML and is immutable afterwards.
//! `BotConfig::validate` must pass before any engine is constructed.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::time::Duration;

use roomie_types::{ActorId, Gender, GenderFilter, ReasonCategory};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
    #[error("support.fallback_admin must be configured")]
    MissingFallbackAdmin,
    #[error("profile age bounds are inverted: min_age {min} > max_age {max}")]
    InvertedAgeBounds { min: u8, max: u8 },
    #[error("{field} must be greater than 0")]
    ZeroLimit { field: &'static str },
    #[error("admin {0} is configured more than once")]
    DuplicateAdmin(i64),
    #[error("profile.skip_token must not be empty")]
    EmptySkipToken,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotConfig {
    pub profile: ProfileLimits,
    pub matching: MatchingConfig,
    pub support: SupportConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProfileLimits {
    pub min_age: u8,
    pub max_age: u8,
    pub name_max_chars: usize,
    pub affiliation_max_chars: usize,
    pub description_max_chars: usize,
    /// Text accepted in place of a description to leave it empty.
    pub skip_token: String,
}

impl Default for ProfileLimits {
    fn default() -> Self {
        Self {
            min_age: 16,
            max_age: 99,
            name_max_chars: 64,
            affiliation_max_chars: 128,
            description_max_chars: 500,
            skip_token: "skip".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchPreference {
    /// Browse participants whose gender differs from the requester's.
    #[default]
    Opposite,
    Same,
    Any,
}

impl MatchPreference {
    pub fn filter_for(self, requester_gender: Gender) -> GenderFilter {
        match self {
            Self::Opposite => GenderFilter::Except(requester_gender),
            Self::Same => GenderFilter::Only(requester_gender),
            Self::Any => GenderFilter::Any,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MatchingConfig {
    pub preference: MatchPreference,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminEntry {
    pub id: i64,
    #[serde(default)]
    pub reasons: Vec<ReasonCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SupportConfig {
    pub fallback_admin: Option<i64>,
    pub admins: Vec<AdminEntry>,
    pub body_max_chars: usize,
    pub page_size: usize,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            fallback_admin: None,
            admins: Vec::new(),
            body_max_chars: 2_000,
            page_size: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub delivery_timeout_ms: u64,
    pub handle_timeout_ms: u64,
    pub broadcast_interval_ms: u64,
    /// Extra attempts for replies addressed to the acting participant.
    pub immediate_retry_attempts: usize,
    /// An actor's worker retires after its queue has been empty this long.
    pub worker_idle_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: 5_000,
            handle_timeout_ms: 10_000,
            broadcast_interval_ms: 50,
            immediate_retry_attempts: 1,
            worker_idle_timeout_ms: 60_000,
        }
    }
}

impl RuntimeConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn handle_timeout(&self) -> Duration {
        Duration::from_millis(self.handle_timeout_ms)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn worker_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_idle_timeout_ms)
    }
}

impl BotConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: BotConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.support.fallback_admin.is_none() {
            return Err(ConfigError::MissingFallbackAdmin);
        }
        if self.profile.min_age > self.profile.max_age {
            return Err(ConfigError::InvertedAgeBounds {
                min: self.profile.min_age,
                max: self.profile.max_age,
            });
        }
        for (field, value) in [
            ("profile.name_max_chars", self.profile.name_max_chars),
            (
                "profile.affiliation_max_chars",
                self.profile.affiliation_max_chars,
            ),
            (
                "profile.description_max_chars",
                self.profile.description_max_chars,
            ),
            ("support.body_max_chars", self.support.body_max_chars),
            ("support.page_size", self.support.page_size),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroLimit { field });
            }
        }
        if self.runtime.delivery_timeout_ms == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "runtime.delivery_timeout_ms",
            });
        }
        if self.runtime.handle_timeout_ms == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "runtime.handle_timeout_ms",
            });
        }
        if self.runtime.worker_idle_timeout_ms == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "runtime.worker_idle_timeout_ms",
            });
        }
        if self.profile.skip_token.trim().is_empty() {
            return Err(ConfigError::EmptySkipToken);
        }

        let mut seen = HashSet::new();
        for admin in &self.support.admins {
            if !seen.insert(admin.id) {
                return Err(ConfigError::DuplicateAdmin(admin.id));
            }
        }
        Ok(())
    }

    pub fn admin_roles(&self) -> Result<AdminRoleMap, ConfigError> {
        let fallback = self
            .support
            .fallback_admin
            .ok_or(ConfigError::MissingFallbackAdmin)?;
        Ok(AdminRoleMap::new(
            ActorId(fallback),
            self.support
                .admins
                .iter()
                .map(|entry| {
                    (
                        ActorId(entry.id),
                        entry.reasons.iter().copied().collect::<BTreeSet<_>>(),
                    )
                })
                .collect(),
        ))
    }
}

/// Administrator → owned reason categories, plus the designated fallback owner.
///
/// Entry order matters: routing picks the first administrator owning a reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminRoleMap {
    fallback: ActorId,
    admins: Vec<(ActorId, BTreeSet<ReasonCategory>)>,
}

impl AdminRoleMap {
    pub fn new(fallback: ActorId, admins: Vec<(ActorId, BTreeSet<ReasonCategory>)>) -> Self {
        Self { fallback, admins }
    }

    pub fn fallback(&self) -> ActorId {
        self.fallback
    }

    pub fn is_fallback(&self, actor: ActorId) -> bool {
        actor == self.fallback
    }

    pub fn is_admin(&self, actor: ActorId) -> bool {
        self.is_fallback(actor) || self.admins.iter().any(|(id, _)| *id == actor)
    }

    /// First administrator whose owned reasons contain `reason`.
    pub fn owner_of(&self, reason: ReasonCategory) -> Option<ActorId> {
        self.admins
            .iter()
            .find(|(_, reasons)| reasons.contains(&reason))
            .map(|(id, _)| *id)
    }

    pub fn admin_ids(&self) -> Vec<ActorId> {
        let mut ids = vec![self.fallback];
        for (id, _) in &self.admins {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}
