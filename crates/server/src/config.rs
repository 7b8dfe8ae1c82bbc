//! Server configuration.

use protocol::Pose;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub court: CourtConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            court: CourtConfig::default(),
        }
    }
}

/// Networking and general settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum transport connections (admitted or not).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connections per IP limit.
    #[serde(default = "default_ip_limit")]
    pub ip_limit: usize,
    /// Tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Server name shown to clients.
    #[serde(default = "default_name")]
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            ip_limit: default_ip_limit(),
            tick_interval_ms: default_tick_interval(),
            name: default_name(),
        }
    }
}

fn default_port() -> u16 {
    11500
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_connections() -> usize {
    16
}
fn default_ip_limit() -> usize {
    4
}
fn default_tick_interval() -> u64 {
    50
}
fn default_name() -> String {
    "Rally Arena".to_string()
}

/// Session and lobby settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Maximum admitted participants with the player role.
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// Maximum admitted spectators.
    #[serde(default = "default_max_spectators")]
    pub max_spectators: usize,
    /// Seconds every active player has to ready up before the lobby
    /// falls back to waiting.
    #[serde(default = "default_ready_check_timeout")]
    pub ready_check_timeout_secs: f64,
    /// Seconds the Auto strategy waits before deriving a game mode from
    /// the player count.
    #[serde(default = "default_auto_select_delay")]
    pub auto_select_delay_secs: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_players: default_max_players(),
            max_spectators: default_max_spectators(),
            ready_check_timeout_secs: default_ready_check_timeout(),
            auto_select_delay_secs: default_auto_select_delay(),
        }
    }
}

fn default_max_players() -> usize {
    6
}
fn default_max_spectators() -> usize {
    2
}
fn default_ready_check_timeout() -> f64 {
    30.0
}
fn default_auto_select_delay() -> f64 {
    10.0
}

/// A configured spawn pose: a position and a yaw around the vertical axis.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlotPose {
    pub position: [f32; 3],
    pub yaw_degrees: f32,
}

impl SlotPose {
    pub fn new(position: [f32; 3], yaw_degrees: f32) -> Self {
        Self {
            position,
            yaw_degrees,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::from_yaw_degrees(self.position.into(), self.yaw_degrees)
    }
}

/// Physical court layout: the spawn slots available per category.
///
/// Side A plays toward +Z, side B toward -Z. Spectator rows sit beside
/// their team's half; the podium slots are used after a match ends.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CourtConfig {
    #[serde(default = "default_team_a_primary")]
    pub team_a_primary: Vec<SlotPose>,
    #[serde(default = "default_team_a_secondary")]
    pub team_a_secondary: Vec<SlotPose>,
    #[serde(default = "default_team_b_primary")]
    pub team_b_primary: Vec<SlotPose>,
    #[serde(default = "default_team_b_secondary")]
    pub team_b_secondary: Vec<SlotPose>,
    #[serde(default = "default_team_a_spectators")]
    pub team_a_spectators: Vec<SlotPose>,
    #[serde(default = "default_team_b_spectators")]
    pub team_b_spectators: Vec<SlotPose>,
    #[serde(default = "default_winner_podium")]
    pub winner_podium: Vec<SlotPose>,
    #[serde(default = "default_loser_podium")]
    pub loser_podium: Vec<SlotPose>,
}

impl Default for CourtConfig {
    fn default() -> Self {
        Self {
            team_a_primary: default_team_a_primary(),
            team_a_secondary: default_team_a_secondary(),
            team_b_primary: default_team_b_primary(),
            team_b_secondary: default_team_b_secondary(),
            team_a_spectators: default_team_a_spectators(),
            team_b_spectators: default_team_b_spectators(),
            winner_podium: default_winner_podium(),
            loser_podium: default_loser_podium(),
        }
    }
}

fn default_team_a_primary() -> Vec<SlotPose> {
    vec![SlotPose::new([-1.5, 0.0, -6.0], 0.0)]
}
fn default_team_a_secondary() -> Vec<SlotPose> {
    vec![SlotPose::new([1.5, 0.0, -6.0], 0.0)]
}
fn default_team_b_primary() -> Vec<SlotPose> {
    vec![SlotPose::new([1.5, 0.0, 6.0], 180.0)]
}
fn default_team_b_secondary() -> Vec<SlotPose> {
    vec![SlotPose::new([-1.5, 0.0, 6.0], 180.0)]
}
fn default_team_a_spectators() -> Vec<SlotPose> {
    vec![
        SlotPose::new([-7.0, 0.0, -5.0], 90.0),
        SlotPose::new([-7.0, 0.0, -3.0], 90.0),
        SlotPose::new([-7.0, 0.0, -1.0], 90.0),
    ]
}
fn default_team_b_spectators() -> Vec<SlotPose> {
    vec![
        SlotPose::new([7.0, 0.0, 5.0], 270.0),
        SlotPose::new([7.0, 0.0, 3.0], 270.0),
        SlotPose::new([7.0, 0.0, 1.0], 270.0),
    ]
}
fn default_winner_podium() -> Vec<SlotPose> {
    vec![
        SlotPose::new([-1.0, 0.5, 0.0], 90.0),
        SlotPose::new([1.0, 0.5, 0.0], 90.0),
    ]
}
fn default_loser_podium() -> Vec<SlotPose> {
    vec![
        SlotPose::new([-1.0, 0.0, 2.0], 90.0),
        SlotPose::new([1.0, 0.0, 2.0], 90.0),
    ]
}
