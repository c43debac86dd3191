use geodata_shared::LatLng;

pub const TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
pub const TILE_ATTRIBUTION: &str = "© OpenStreetMap contributors";
pub const TILE_MAX_ZOOM: u8 = 19;

pub const MAP_MIN_ZOOM: u8 = 3;
pub const MAP_MAX_ZOOM: u8 = 18;
pub const INITIAL_CENTER: LatLng = LatLng::new(40.4168, -3.7038);
pub const INITIAL_ZOOM: u8 = 6;

/// Delay between map construction and the first render.
pub const READY_DELAY_MS: u32 = 300;
pub const RESIZE_DEBOUNCE_MS: u32 = 250;

pub const SETTINGS_STORAGE_KEY: &str = "geodata_settings";

pub const DEFAULT_LOG_LEVEL: log::Level = log::Level::Info;

/// Backend base URL. Empty means same origin.
pub fn api_base() -> String {
    parse_api_base(option_env!("GEODATA_API_BASE"))
}

pub fn log_level() -> log::Level {
    parse_log_level(option_env!("GEODATA_LOG_LEVEL"))
}

fn parse_api_base(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.trim_end_matches('/').to_string())
        .unwrap_or_default()
}

fn parse_log_level(raw: Option<&str>) -> log::Level {
    raw.and_then(|value| value.trim().parse::<log::Level>().ok())
        .unwrap_or(DEFAULT_LOG_LEVEL)
}
