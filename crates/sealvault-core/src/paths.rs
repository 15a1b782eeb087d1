//! Standard paths used by sealvault

use std::path::PathBuf;

/// Standard sealvault paths
pub struct Paths {
    /// Config directory (~/.config/sealvault)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("sealvault");

        Self { config }
    }

    /// Path of the JSON configuration file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_lives_in_config_dir() {
        let paths = Paths::new();
        assert!(paths.config_file().starts_with(&paths.config));
        assert!(paths.config.ends_with("sealvault"));
    }
}
