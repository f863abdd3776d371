//! Campaign configuration validation errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CampaignConfigError {
    #[error("rates cannot be empty")]
    EmptyRates,

    #[error("rates must be positive, got 0")]
    ZeroRate,

    #[error("team must be between 1 and 26, got {0}")]
    InvalidTeam(u32),

    #[error("mesh profile name cannot be empty")]
    EmptyProfileName,

    #[error("duplicate mesh profile name: {0}")]
    DuplicateProfile(String),

    /// Degree bounds must satisfy min <= target <= max
    #[error("mesh profile '{name}' must satisfy min <= target <= max, got min={min} target={target} max={max}")]
    InvalidMeshBounds {
        name: String,
        target: u32,
        min: u32,
        max: u32,
    },

    #[error("shell cannot be empty")]
    EmptyShell,

    #[error("failed to parse campaign config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read campaign config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CampaignConfigError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            CampaignConfigError::InvalidTeam(0).to_string(),
            "team must be between 1 and 26, got 0"
        );
        assert_eq!(
            CampaignConfigError::DuplicateProfile("low".to_string()).to_string(),
            "duplicate mesh profile name: low"
        );
        let err = CampaignConfigError::InvalidMeshBounds {
            name: "odd".to_string(),
            target: 1,
            min: 2,
            max: 3,
        };
        assert!(err.to_string().contains("min=2 target=1 max=3"));
    }

    #[test]
    fn io_error_carries_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = CampaignConfigError::io("campaign.yaml", io_err);
        assert!(err.to_string().contains("campaign.yaml"));
    }
}
