use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::webauthn::{UserVerificationPolicy, WebAuthnSettings};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VerifierSettings {
    pub webauthn: WebAuthnSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl VerifierSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Environment initialization fails
    /// - Settings file cannot be read or parsed
    /// - TOML parsing fails
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        // Initialize environment and logging
        Self::initialize_environment()?;

        // Load base settings from TOML or defaults
        let mut settings = Self::load_base_settings()?;

        // Apply environment variable overrides
        Self::apply_env_overrides(&mut settings);

        Ok(settings)
    }

    /// Initialize environment and logging
    ///
    /// # Errors
    ///
    /// Returns an error if logger initialization fails
    fn initialize_environment() -> Result<(), Box<dyn std::error::Error>> {
        Self::load_env_file();
        env_logger::try_init()?;
        Ok(())
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `WEBAUTHN_SETTINGS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read
    /// - TOML parsing fails
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        if let Some(base) = Self::read_settings_file(Path::new("Settings.toml"))? {
            println!("✓ Loaded base settings from Settings.toml");
            settings = base;
        }

        if let Ok(settings_dir) = std::env::var("WEBAUTHN_SETTINGS_DIR") {
            let override_path = Path::new(&settings_dir).join("Settings.toml");
            if let Some(overrides) = Self::read_settings_file(&override_path)? {
                println!("✓ Overriding settings from {}", override_path.display());
                settings = overrides;
            } else {
                println!(
                    "ℹ WEBAUTHN_SETTINGS_DIR set but no Settings.toml found at: {}",
                    override_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse a settings file, `None` if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed
    fn read_settings_file(path: &Path) -> Result<Option<Self>, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(None);
        }
        let toml_content = fs::read_to_string(path)?;
        Ok(Some(basic_toml::from_str(&toml_content)?))
    }

    /// Apply environment variable overrides to settings
    fn apply_env_overrides(settings: &mut Self) {
        Self::apply_webauthn_env_overrides(&mut settings.webauthn);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    /// Apply environment overrides for relying party settings
    fn apply_webauthn_env_overrides(webauthn_settings: &mut WebAuthnSettings) {
        if let Ok(rp_id) = std::env::var("WEBAUTHN_RP_ID") {
            webauthn_settings.rp_id = rp_id;
        }
        if let Ok(rp_origin) = std::env::var("WEBAUTHN_RP_ORIGIN") {
            webauthn_settings.rp_origin = rp_origin;
        }
        if let Ok(policy) = std::env::var("WEBAUTHN_USER_VERIFICATION") {
            match policy.parse::<UserVerificationPolicy>() {
                Ok(policy) => webauthn_settings.user_verification = policy,
                Err(e) => eprintln!("⚠️  WARNING: Ignoring WEBAUTHN_USER_VERIFICATION: {e}"),
            }
        }
    }

    /// Apply environment overrides for logging settings
    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }
}
