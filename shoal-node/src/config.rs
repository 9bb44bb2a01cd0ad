//! Load config from file and environment.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::Deserialize;

/// Node configuration. File: ~/.config/shoal/config.toml or /etc/shoal/config.toml.
/// Env overrides: SHOAL_HOST, SHOAL_PORT, SHOAL_FILES_DIR, SHOAL_SCAN_BASE,
/// SHOAL_SCAN_COUNT, SHOAL_MAX_TRACKED, SHOAL_TEST_MODE.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the listener binds and peers dial (default 127.0.0.1).
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// Listener TCP port (default 9000).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Root for hosted files; this node serves from <files_dir>/<port> (default ./hosted_files).
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,
    /// First port of the discovery scan range (default 9000).
    #[serde(default = "default_scan_base")]
    pub scan_base: u16,
    /// Number of ports scanned starting at scan_base (default 100).
    #[serde(default = "default_scan_count")]
    pub scan_count: u16,
    /// Ceiling on tracked inbound connections (default 4).
    #[serde(default = "default_max_tracked")]
    pub max_tracked: usize,
    /// Wait for TestStart and run the scripted pass instead of the menu.
    #[serde(default)]
    pub test_mode: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}
fn default_port() -> u16 {
    9000
}
fn default_files_dir() -> PathBuf {
    PathBuf::from("./hosted_files")
}
fn default_scan_base() -> u16 {
    9000
}
fn default_scan_count() -> u16 {
    100
}
fn default_max_tracked() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            files_dir: default_files_dir(),
            scan_base: default_scan_base(),
            scan_count: default_scan_count(),
            max_tracked: default_max_tracked(),
            test_mode: false,
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    if let Ok(s) = std::env::var("SHOAL_HOST") {
        if let Ok(h) = s.parse::<IpAddr>() {
            c.host = h;
        }
    }
    if let Ok(s) = std::env::var("SHOAL_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.port = p;
        }
    }
    if let Ok(s) = std::env::var("SHOAL_FILES_DIR") {
        c.files_dir = PathBuf::from(s);
    }
    if let Ok(s) = std::env::var("SHOAL_SCAN_BASE") {
        if let Ok(p) = s.parse::<u16>() {
            c.scan_base = p;
        }
    }
    if let Ok(s) = std::env::var("SHOAL_SCAN_COUNT") {
        if let Ok(n) = s.parse::<u16>() {
            c.scan_count = n;
        }
    }
    if let Ok(s) = std::env::var("SHOAL_MAX_TRACKED") {
        if let Ok(n) = s.parse::<usize>() {
            c.max_tracked = n;
        }
    }
    if let Ok(s) = std::env::var("SHOAL_TEST_MODE") {
        if let Ok(t) = s.parse::<bool>() {
            c.test_mode = t;
        }
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/shoal/config.toml"));
    }
    out.push(PathBuf::from("/etc/shoal/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<Config>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_scan_range() {
        let c = Config::default();
        assert_eq!(c.port, 9000);
        assert_eq!(c.scan_base, 9000);
        assert_eq!(c.scan_count, 100);
        assert_eq!(c.max_tracked, 4);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let c: Config = toml::from_str("port = 9005").unwrap();
        assert_eq!(c.port, 9005);
        assert_eq!(c.scan_base, 9000);
        assert!(!c.test_mode);
    }
}
