//! Browser launch/connect options and fingerprint randomization sources.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Desktop user agents rotated across driver instances.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 Edg/119.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

/// Common desktop viewport sizes, width by height.
pub const VIEWPORTS: &[(u32, u32)] = &[
    (1920, 1080),
    (1680, 1050),
    (1600, 900),
    (1440, 900),
    (1366, 768),
];

/// How driver instances reach a Chromium.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserOptions {
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Explicit Chromium binary. Falls back to chromiumoxide's detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,

    /// Extra command line switches, appended after the built-in set.
    #[serde(default)]
    pub args: Vec<String>,

    /// Attach to an already running browser on this debug port instead of
    /// launching a new one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_port: Option<u16>,

    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// Give each driver a random user agent and viewport at start-up.
    #[serde(default = "default_true")]
    pub randomize_fingerprint: bool,
}

fn default_true() -> bool {
    true
}

fn default_navigation_timeout_ms() -> u64 {
    30_000
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            args: Vec::new(),
            debug_port: None,
            navigation_timeout_ms: default_navigation_timeout_ms(),
            randomize_fingerprint: true,
        }
    }
}

impl BrowserOptions {
    pub fn random_user_agent() -> &'static str {
        USER_AGENTS[rand::rng().random_range(0..USER_AGENTS.len())]
    }

    pub fn random_viewport() -> (u32, u32) {
        VIEWPORTS[rand::rng().random_range(0..VIEWPORTS.len())]
    }

    /// Switches passed to a launched browser. Always includes the stability
    /// flags headless Chromium needs in containers.
    pub fn chrome_args(&self) -> Vec<String> {
        let mut args = vec![
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
        ];
        args.extend(self.args.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_launch_headless_without_port() {
        let options = BrowserOptions::default();
        assert!(options.headless);
        assert!(options.debug_port.is_none());
        assert!(options.randomize_fingerprint);
    }

    #[test]
    fn chrome_args_keep_stability_flags_first() {
        let options = BrowserOptions {
            args: vec!["--lang=en-US".to_string()],
            ..BrowserOptions::default()
        };
        let args = options.chrome_args();
        assert_eq!(args[0], "--disable-gpu");
        assert!(args.contains(&"--lang=en-US".to_string()));
    }

    #[test]
    fn random_fingerprint_comes_from_known_sets() {
        for _ in 0..20 {
            assert!(USER_AGENTS.contains(&BrowserOptions::random_user_agent()));
            assert!(VIEWPORTS.contains(&BrowserOptions::random_viewport()));
        }
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: BrowserOptions = serde_json::from_str(r#"{"debug_port": 9222}"#).unwrap();
        assert_eq!(options.debug_port, Some(9222));
        assert!(options.headless);
        assert_eq!(options.navigation_timeout_ms, 30_000);
    }
}
