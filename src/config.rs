use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Root directory of the on-demand assets served as live
    pub vod_root: PathBuf,
    pub is_dev: bool,
    /// Scheme override for absolute BaseURL generation in converted manifests
    pub scheme: Option<String>,
    /// Host override for absolute BaseURL generation in converted manifests
    pub host: Option<String>,
    /// Default time-shift buffer depth in seconds (overridable per URL)
    pub timeshift_buffer_depth_s: u64,
    /// Default MPD minimum update period in seconds (overridable per URL)
    pub minimum_update_period_s: u64,
    /// Default stream start epoch in seconds when the URL does not set one
    pub default_start_time_s: u64,
}

const DEFAULT_TIMESHIFT_BUFFER_DEPTH_S: u64 = 60;
const DEFAULT_MINIMUM_UPDATE_PERIOD_S: u64 = 6;

impl Config {
    /// Load configuration from environment variables.
    /// In DEV mode, provides sensible defaults. In PROD mode, PORT and
    /// VOD_ROOT are required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        // Port: required in prod, defaults to 3001 in dev
        let port = if is_dev {
            env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        // VoD root: required in prod, defaults to ./vod in dev
        let vod_root: PathBuf = if is_dev {
            env::var("VOD_ROOT")
                .unwrap_or_else(|_| "./vod".to_string())
                .into()
        } else {
            env::var("VOD_ROOT")
                .map_err(|_| "VOD_ROOT is required in production")?
                .into()
        };

        // Scheme/host overrides are optional in both modes; absent, converted
        // manifests use relative URLs only.
        let scheme = env::var("SCHEME").ok();
        let host = env::var("HOST").ok();

        let timeshift_buffer_depth_s = env::var("TIMESHIFT_BUFFER_DEPTH_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMESHIFT_BUFFER_DEPTH_S);

        let minimum_update_period_s = env::var("MINIMUM_UPDATE_PERIOD_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MINIMUM_UPDATE_PERIOD_S);

        // Epoch start default: 1970-01-01, so every asset is deep into its
        // live timeline unless the URL pins an explicit start time.
        let default_start_time_s = env::var("DEFAULT_START_TIME_S")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok(Config {
            port,
            vod_root,
            is_dev,
            scheme,
            host,
            timeshift_buffer_depth_s,
            minimum_update_period_s,
            default_start_time_s,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serialize all env-var tests to prevent races between parallel test threads.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Set env vars, run `f`, then restore original state.
    ///
    /// `set` — vars to set; `unset` — vars to remove before running `f`.
    fn with_env(set: &[(&str, &str)], unset: &[&str], f: impl FnOnce()) {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());

        // Save state for all touched vars
        let save_set: Vec<(&str, Option<String>)> = set
            .iter()
            .map(|(k, _)| (*k, std::env::var(k).ok()))
            .collect();
        let save_unset: Vec<(&str, Option<String>)> =
            unset.iter().map(|k| (*k, std::env::var(k).ok())).collect();

        for (k, v) in set {
            // SAFETY: serialized by ENV_LOCK — no other thread modifies env vars concurrently.
            unsafe { std::env::set_var(k, v) };
        }
        for k in unset {
            unsafe { std::env::remove_var(k) };
        }

        f();

        // Restore
        for (k, old) in save_set.into_iter().chain(save_unset) {
            match old {
                Some(v) => unsafe { std::env::set_var(k, v) },
                None => unsafe { std::env::remove_var(k) },
            }
        }
    }

    #[test]
    fn dev_mode_uses_defaults() {
        with_env(
            &[("DEV_MODE", "true")],
            &[
                "PORT",
                "VOD_ROOT",
                "SCHEME",
                "HOST",
                "TIMESHIFT_BUFFER_DEPTH_SECS",
                "MINIMUM_UPDATE_PERIOD_SECS",
                "DEFAULT_START_TIME_S",
            ],
            || {
                let config = Config::from_env().expect("should succeed in dev mode");
                assert!(config.is_dev);
                assert_eq!(config.port, 3001);
                assert_eq!(config.vod_root, PathBuf::from("./vod"));
                assert_eq!(config.scheme, None);
                assert_eq!(config.host, None);
                assert_eq!(config.timeshift_buffer_depth_s, 60);
                assert_eq!(config.minimum_update_period_s, 6);
                assert_eq!(config.default_start_time_s, 0);
            },
        );
    }

    #[test]
    fn prod_mode_requires_port() {
        with_env(&[], &["DEV_MODE", "PORT", "VOD_ROOT"], || {
            let result = Config::from_env();
            assert!(result.is_err(), "Should fail without PORT in prod mode");
        });
    }

    #[test]
    fn prod_mode_requires_vod_root() {
        with_env(&[("PORT", "8080")], &["DEV_MODE", "VOD_ROOT"], || {
            let result = Config::from_env();
            assert!(result.is_err(), "Should fail without VOD_ROOT in prod mode");
        });
    }

    #[test]
    fn scheme_and_host_overrides() {
        with_env(
            &[
                ("DEV_MODE", "true"),
                ("SCHEME", "https"),
                ("HOST", "live.example.com"),
            ],
            &[],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.scheme.as_deref(), Some("https"));
                assert_eq!(config.host.as_deref(), Some("live.example.com"));
            },
        );
    }

    #[test]
    fn timing_defaults_parsed() {
        with_env(
            &[
                ("DEV_MODE", "true"),
                ("TIMESHIFT_BUFFER_DEPTH_SECS", "120"),
                ("MINIMUM_UPDATE_PERIOD_SECS", "2"),
                ("DEFAULT_START_TIME_S", "1700000000"),
            ],
            &[],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.timeshift_buffer_depth_s, 120);
                assert_eq!(config.minimum_update_period_s, 2);
                assert_eq!(config.default_start_time_s, 1_700_000_000);
            },
        );
    }
}
