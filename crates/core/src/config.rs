//! Viewer configuration: screen geometry, feed endpoint, device traits and
//! the cache settings.

use photoview_cache::{CacheConfig, ConfigError};
use photoview_feed::DEFAULT_FEED_BASE;

/// Keyboard type reported by devices with a single hardware back key.
pub const ONE_KEY_BACK_KEYBOARD: &str = "OnekeyBack";

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub screen_width: u32,
    pub screen_height: u32,
    /// Feed service base URL (`featured` / `all` are appended)
    pub feed_base: String,
    /// Device has a hardware back key, so no soft back icon is drawn
    pub one_key_back: bool,
    /// Platform provides the category bar (Featured / Search tabs)
    pub category_bar: bool,
    pub cache: CacheConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            screen_width: 240,
            screen_height: 320,
            feed_base: DEFAULT_FEED_BASE.to_string(),
            one_key_back: false,
            category_bar: true,
            cache: CacheConfig::default(),
        }
    }
}

impl ViewerConfig {
    /// Defaults overridden by the environment.
    ///
    /// - `PHOTOVIEW_FEED_BASE`: feed service base URL
    /// - `PHOTOVIEW_KEYBOARD_TYPE`: `OnekeyBack` enables the hardware back key
    /// - every `PHOTOVIEW_*` variable understood by [`CacheConfig::apply_env`]
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(base) = std::env::var("PHOTOVIEW_FEED_BASE") {
            config.feed_base = base;
        }
        if let Ok(keyboard) = std::env::var("PHOTOVIEW_KEYBOARD_TYPE") {
            config.one_key_back = keyboard.eq_ignore_ascii_case(ONE_KEY_BACK_KEYBOARD);
        }
        config.cache.apply_env()?;
        Ok(config)
    }

    pub fn with_screen(mut self, width: u32, height: u32) -> Self {
        self.screen_width = width;
        self.screen_height = height;
        self
    }

    pub fn with_feed_base(mut self, base: impl Into<String>) -> Self {
        self.feed_base = base.into();
        self
    }

    pub fn with_one_key_back(mut self, one_key_back: bool) -> Self {
        self.one_key_back = one_key_back;
        self
    }

    pub fn with_category_bar(mut self, category_bar: bool) -> Self {
        self.category_bar = category_bar;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard(&'static [&'static str]);

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for var in self.0 {
                std::env::remove_var(var);
            }
        }
    }

    const VARS: &[&str] = &["PHOTOVIEW_FEED_BASE", "PHOTOVIEW_KEYBOARD_TYPE", "PHOTOVIEW_WORKERS"];

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        let _guard = EnvGuard(VARS);
        for var in VARS {
            std::env::remove_var(var);
        }

        let config = ViewerConfig::from_env().unwrap();
        assert_eq!(config.feed_base, DEFAULT_FEED_BASE);
        assert!(!config.one_key_back);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        let _guard = EnvGuard(VARS);
        std::env::set_var("PHOTOVIEW_FEED_BASE", "file:///srv/feeds");
        std::env::set_var("PHOTOVIEW_KEYBOARD_TYPE", "onekeyback");
        std::env::set_var("PHOTOVIEW_WORKERS", "3");

        let config = ViewerConfig::from_env().unwrap();
        assert_eq!(config.feed_base, "file:///srv/feeds");
        assert!(config.one_key_back);
        assert_eq!(config.cache.num_workers, 3);
    }

    #[test]
    #[serial]
    fn test_invalid_cache_env_is_error() {
        let _guard = EnvGuard(VARS);
        std::env::set_var("PHOTOVIEW_WORKERS", "many");
        assert!(ViewerConfig::from_env().is_err());
    }

    #[test]
    fn test_builders() {
        let config = ViewerConfig::default()
            .with_screen(360, 640)
            .with_one_key_back(true)
            .with_category_bar(false);
        assert_eq!((config.screen_width, config.screen_height), (360, 640));
        assert!(config.one_key_back);
        assert!(!config.category_bar);
    }
}
