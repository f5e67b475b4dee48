use crate::core::ladder::{BidLadder, LadderTier};
use crate::core::ledger::BudgetLedger;
use crate::core::reconciler::STATE_KEY;
use crate::core::session::AuctionRules;
use crate::utils::error::{AuctionError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_FINAL_PICKS_THRESHOLD: usize = 5;
pub const DEFAULT_PERSISTED_HISTORY: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionConfig {
    pub auction: AuctionSection,
    pub catalog: CatalogConfig,
    pub rules: RulesConfig,
    pub ladder: LadderConfig,
    pub teams: Vec<TeamConfig>,
    pub storage: StorageConfig,
    pub remote: Option<RemoteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionSection {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    pub initial_budget: u32,
    pub max_roster_size: usize,
    pub base_price: u32,
    pub minimum_reserve_price: u32,
    pub final_picks_threshold: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderConfig {
    pub default_increment: u32,
    #[serde(default)]
    pub tiers: Vec<LadderTier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub state_dir: String,
    pub key: Option<String>,
    /// Undo steps kept in the saved document.
    pub history_limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_ms: Option<u64>,
}

impl AuctionConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AuctionError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| AuctionError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${AUCTION_BACKUP_URL})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| AuctionError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("auction.name", &self.auction.name)?;
        validation::validate_path("catalog.path", &self.catalog.path)?;
        validation::validate_file_extensions(
            "catalog.path",
            std::slice::from_ref(&self.catalog.path),
            &["json", "csv"],
        )?;
        validation::validate_path("storage.state_dir", &self.storage.state_dir)?;
        if let Some(key) = &self.storage.key {
            validation::validate_non_empty_string("storage.key", key)?;
        }

        validation::validate_positive_number(
            "rules.max_roster_size",
            self.rules.max_roster_size as u64,
            1,
        )?;
        if self.rules.initial_budget < self.rules.base_price {
            return Err(AuctionError::InvalidConfigValueError {
                field: "rules.initial_budget".to_string(),
                value: self.rules.initial_budget.to_string(),
                reason: format!(
                    "Budget must cover at least the base price {}",
                    self.rules.base_price
                ),
            });
        }

        // Every team must be able to fill its roster at the reserve price,
        // and an opening bid must never eat into that reserve.
        let full_roster_cost =
            self.rules.max_roster_size as u64 * u64::from(self.rules.minimum_reserve_price);
        if u64::from(self.rules.initial_budget) < full_roster_cost {
            return Err(AuctionError::InvalidConfigValueError {
                field: "rules.initial_budget".to_string(),
                value: self.rules.initial_budget.to_string(),
                reason: format!(
                    "Budget cannot fill {} roster slots at the reserve price {} ({} needed)",
                    self.rules.max_roster_size, self.rules.minimum_reserve_price, full_roster_cost
                ),
            });
        }
        if self.rules.base_price > self.rules.minimum_reserve_price {
            return Err(AuctionError::InvalidConfigValueError {
                field: "rules.base_price".to_string(),
                value: self.rules.base_price.to_string(),
                reason: format!(
                    "Base price cannot exceed the minimum reserve price {}",
                    self.rules.minimum_reserve_price
                ),
            });
        }

        // 至少需要一支隊伍
        if self.teams.is_empty() {
            return Err(AuctionError::MissingConfigError {
                field: "teams".to_string(),
            });
        }
        for team in &self.teams {
            validation::validate_non_empty_string("teams.name", &team.name)?;
        }
        validation::validate_unique("teams.name", self.teams.iter().map(|t| t.name.as_str()))?;

        // Ladder shape is checked by BidLadder itself.
        self.rules()?;

        if let Some(remote) = self.remote.as_ref().filter(|r| r.enabled) {
            validation::validate_url("remote.base_url", &remote.base_url)?;
            validation::validate_range("remote.timeout_ms", self.remote_timeout().as_millis() as u64, 50, 30_000)?;
        }

        Ok(())
    }

    pub fn rules(&self) -> Result<AuctionRules> {
        Ok(AuctionRules {
            initial_budget: self.rules.initial_budget,
            final_picks_threshold: self
                .rules
                .final_picks_threshold
                .unwrap_or(DEFAULT_FINAL_PICKS_THRESHOLD),
            ledger: BudgetLedger::new(self.rules.max_roster_size, self.rules.minimum_reserve_price),
            ladder: BidLadder::new(
                self.rules.base_price,
                self.ladder.tiers.clone(),
                self.ladder.default_increment,
            )?,
        })
    }

    pub fn team_names(&self) -> Vec<String> {
        self.teams.iter().map(|team| team.name.trim().to_string()).collect()
    }

    pub fn history_limit(&self) -> usize {
        self.storage.history_limit.unwrap_or(DEFAULT_PERSISTED_HISTORY)
    }

    pub fn state_key(&self) -> &str {
        self.storage.key.as_deref().unwrap_or(STATE_KEY)
    }

    /// Remote backup base URL, when enabled.
    pub fn remote_url(&self) -> Option<&str> {
        self.remote
            .as_ref()
            .filter(|remote| remote.enabled)
            .map(|remote| remote.base_url.as_str())
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(
            self.remote
                .as_ref()
                .and_then(|remote| remote.timeout_ms)
                .unwrap_or(DEFAULT_REMOTE_TIMEOUT_MS),
        )
    }
}

impl Validate for AuctionConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
