//! Server configuration from arguments and environment

use std::path::PathBuf;

use watchparty_core::ids::TownId;

/// Port used when `TCP_PORT` is unset or invalid
pub const DEFAULT_TCP_PORT: u16 = 4100;

/// Map used when no map file is configured: two viewing areas and a spawn
/// point.
pub const BUILTIN_MAP: &str = r#"{
    "width": 64,
    "height": 48,
    "tilewidth": 32,
    "tileheight": 32,
    "layers": [
        {
            "name": "Objects",
            "type": "objectgroup",
            "objects": [
                { "name": "Spawn", "type": "Spawn", "x": 320, "y": 320 },
                { "name": "Cinema", "type": "ViewingArea", "x": 96, "y": 96, "width": 256, "height": 192 },
                { "name": "Lounge", "type": "ViewingArea", "x": 1280, "y": 96, "width": 192, "height": 160 }
            ]
        }
    ]
}"#;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub use_dashboard: bool,
    pub tcp_port: u16,
    pub town_id: String,
    /// Tiled JSON map; the built-in map when `None`
    pub map_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Read `--no-dashboard`, `--map <path>`, `TCP_PORT`, `TOWN_ID` and
    /// `MAP_PATH`
    pub fn from_env() -> Self {
        Self::from_parts(std::env::args().skip(1), |key| std::env::var(key).ok())
    }

    fn from_parts<I, F>(args: I, env: F) -> Self
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let mut use_dashboard = true;
        let mut map_path = env("MAP_PATH").map(PathBuf::from);

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--no-dashboard" => use_dashboard = false,
                "--map" => {
                    if let Some(path) = args.next() {
                        map_path = Some(PathBuf::from(path));
                    }
                }
                _ => {}
            }
        }

        let tcp_port = env("TCP_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_TCP_PORT);
        let town_id = env("TOWN_ID")
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| TownId::random().to_string());

        Self {
            use_dashboard,
            tcp_port,
            town_id,
            map_path,
        }
    }

    /// Contents of the configured map file, or the built-in map
    pub fn load_map_json(&self) -> std::io::Result<String> {
        match &self.map_path {
            Some(path) => std::fs::read_to_string(path),
            None => Ok(BUILTIN_MAP.to_string()),
        }
    }

    /// Short description of the map source, for display
    pub fn map_name(&self) -> String {
        self.map_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use watchparty_core::{Town, TownEmitter};

    fn config(args: &[&str], env: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_parts(args.iter().map(|a| a.to_string()), |key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[], &[]);
        assert!(config.use_dashboard);
        assert_eq!(config.tcp_port, DEFAULT_TCP_PORT);
        assert!(TownId::parse(&config.town_id).is_some());
        assert_eq!(config.map_path, None);
        assert_eq!(config.map_name(), "built-in");
    }

    #[test]
    fn test_args_and_env() {
        let config = config(
            &["--no-dashboard", "--map", "custom.json"],
            &[("TCP_PORT", "5000"), ("TOWN_ID", "lobby"), ("MAP_PATH", "ignored.json")],
        );
        assert!(!config.use_dashboard);
        assert_eq!(config.tcp_port, 5000);
        assert_eq!(config.town_id, "lobby");
        assert_eq!(config.map_path, Some(PathBuf::from("custom.json")));
    }

    #[test]
    fn test_invalid_port_falls_back() {
        let config = config(&[], &[("TCP_PORT", "not-a-port"), ("MAP_PATH", "town.json")]);
        assert_eq!(config.tcp_port, DEFAULT_TCP_PORT);
        assert_eq!(config.map_path, Some(PathBuf::from("town.json")));
    }

    #[test]
    fn test_builtin_map_has_two_viewing_areas() {
        let json = config(&[], &[]).load_map_json().unwrap();
        let town = Town::from_map_json("T", &json, TownEmitter::new(1)).unwrap();
        assert_eq!(town.area_ids(), vec!["Cinema".to_string(), "Lounge".to_string()]);
    }
}
