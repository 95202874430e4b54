use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SmartcamError};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_opt(key).and_then(|v| v.parse().ok())
}

// ── Top-level config ──────────────────────────────────────────

/// Full runtime configuration.
///
/// Parsed from `smartcam.toml`, then `SMARTCAM_*` environment overrides are
/// applied and `${VAR}` references in credential fields are resolved. The
/// result is immutable for the lifetime of the process and handed out by
/// reference.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub alarm: AlarmConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.resolve_secrets()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load from `path` when it exists, otherwise start from defaults.
    /// Environment overrides and validation apply either way.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading config");
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::from_toml("")
        }
    }

    /// Render the default configuration as TOML, for `init-config`.
    pub fn template() -> Result<String> {
        toml::to_string_pretty(&Self::default())
            .map_err(|e| SmartcamError::Serialize(e.to_string()))
    }

    /// Validate value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(SmartcamError::Config(format!(
                "camera dimensions must be non-zero, got {}x{}",
                self.camera.width, self.camera.height
            )));
        }
        if !(self.motion.learning_rate > 0.0 && self.motion.learning_rate <= 1.0) {
            return Err(SmartcamError::Config(format!(
                "motion.learning_rate must be in (0, 1], got {}",
                self.motion.learning_rate
            )));
        }
        if self.notify.workers == 0 {
            return Err(SmartcamError::Config(
                "notify.workers must be at least 1".to_string(),
            ));
        }
        if self.notify.queue_capacity == 0 {
            return Err(SmartcamError::Config(
                "notify.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.notify.email.enabled && self.notify.email.recipient_email.is_empty() {
            return Err(SmartcamError::Config(
                "notify.email is enabled but recipient_email is empty".to_string(),
            ));
        }
        if self.notify.webhook.enabled && self.notify.webhook.url.is_empty() {
            return Err(SmartcamError::Config(
                "notify.webhook is enabled but url is empty".to_string(),
            ));
        }
        if self.notify.discord.enabled && self.notify.discord.webhook_url.is_empty() {
            return Err(SmartcamError::Config(
                "notify.discord is enabled but webhook_url is empty".to_string(),
            ));
        }
        if self.notify.pushover.enabled
            && (self.notify.pushover.user_key.is_empty() || self.notify.pushover.api_token.is_empty())
        {
            return Err(SmartcamError::Config(
                "notify.pushover is enabled but user_key or api_token is empty".to_string(),
            ));
        }
        Ok(())
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `SMARTCAM_SECTION_KEY` overrides `section.key`.
    /// Examples:
    /// - `SMARTCAM_ACTUATOR_PORT` -> `actuator.port`
    /// - `SMARTCAM_MOTION_TRIGGER_THRESHOLD` -> `motion.trigger_threshold`
    /// - `SMARTCAM_RECOGNITION_ENDPOINT` -> `recognition.endpoint`
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(v) = env_opt("SMARTCAM_CAMERA_SOURCE") {
            self.camera.source = v;
        }
        if let Some(v) = env_parse("SMARTCAM_CAMERA_WIDTH") {
            self.camera.width = v;
        }
        if let Some(v) = env_parse("SMARTCAM_CAMERA_HEIGHT") {
            self.camera.height = v;
        }
        if let Some(v) = env_parse("SMARTCAM_MOTION_TRIGGER_THRESHOLD") {
            self.motion.trigger_threshold = v;
        }
        if let Some(v) = env_opt("SMARTCAM_RECOGNITION_ENDPOINT") {
            self.recognition.endpoint = Some(v);
        }
        if let Some(v) = env_parse("SMARTCAM_RECOGNITION_UNKNOWN_DISTANCE") {
            self.recognition.unknown_distance = v;
        }
        if let Some(v) = env_parse("SMARTCAM_ALARM_PATIENCE") {
            self.alarm.patience = v;
        }
        if let Some(v) = env_opt("SMARTCAM_ACTUATOR_PORT") {
            self.actuator.port = v;
        }
        if let Some(v) = env_parse("SMARTCAM_NOTIFY_COOLDOWN_SECS") {
            self.notify.cooldown_secs = v;
        }
        if let Some(v) = env_opt("SMARTCAM_LOGGING_DIR") {
            self.logging.dir = PathBuf::from(v);
        }
    }

    /// Resolve `${VAR}` references in every credential and endpoint field.
    fn resolve_secrets(&mut self) -> Result<()> {
        let email = &mut self.notify.email;
        email.sender_email = resolve_env_refs(&email.sender_email)?;
        email.sender_password = resolve_env_refs(&email.sender_password)?;
        email.recipient_email = resolve_env_refs(&email.recipient_email)?;

        let webhook = &mut self.notify.webhook;
        webhook.url = resolve_env_refs(&webhook.url)?;
        for value in webhook.headers.values_mut() {
            *value = resolve_env_refs(value)?;
        }

        let discord = &mut self.notify.discord;
        discord.webhook_url = resolve_env_refs(&discord.webhook_url)?;

        let pushover = &mut self.notify.pushover;
        pushover.user_key = resolve_env_refs(&pushover.user_key)?;
        pushover.api_token = resolve_env_refs(&pushover.api_token)?;

        if let Some(endpoint) = self.recognition.endpoint.take() {
            self.recognition.endpoint = Some(resolve_env_refs(&endpoint)?);
        }
        Ok(())
    }

    /// Names of the notification channels whose `enabled` flag is set.
    pub fn enabled_channels(&self) -> Vec<&'static str> {
        let n = &self.notify;
        [
            ("email", n.email.enabled),
            ("webhook", n.webhook.enabled),
            ("discord", n.discord.enabled),
            ("pushover", n.pushover.enabled),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  camera:      {}x{} from {}",
            self.camera.width,
            self.camera.height,
            self.camera.source
        );
        tracing::info!(
            "  motion:      trigger={}, alpha={}, pixel_threshold={}",
            self.motion.trigger_threshold,
            self.motion.learning_rate,
            self.motion.pixel_threshold
        );
        tracing::info!(
            "  recognition: endpoint={}, unknown_distance={}",
            self.recognition.endpoint.as_deref().unwrap_or("(disabled)"),
            self.recognition.unknown_distance
        );
        tracing::info!("  alarm:       patience={}", self.alarm.patience);
        tracing::info!(
            "  actuator:    port={}, line_timeout={}ms, retries={}",
            self.actuator.port,
            self.actuator.line_timeout_ms,
            self.actuator.retries
        );
        let channels = self.enabled_channels();
        tracing::info!(
            "  notify:      channels=[{}], cooldown={}s",
            channels.join(", "),
            self.notify.cooldown_secs
        );
        tracing::info!("  logging:     dir={}", self.logging.dir.display());
    }
}

// ── Camera ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// `-` reads raw frames from stdin; anything else is a file or FIFO path.
    #[serde(default = "default_camera_source")]
    pub source: String,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    /// Upper bound on waiting for the next frame.
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,
}

fn default_camera_source() -> String {
    "-".into()
}

fn default_camera_width() -> u32 {
    640
}

fn default_camera_height() -> u32 {
    480
}

fn default_frame_timeout_ms() -> u64 {
    5_000
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: default_camera_source(),
            width: default_camera_width(),
            height: default_camera_height(),
            frame_timeout_ms: default_frame_timeout_ms(),
        }
    }
}

// ── Motion gate ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Scores at or below this value never reach the classifier.
    #[serde(default = "default_trigger_threshold")]
    pub trigger_threshold: u64,
    /// Background learning rate (alpha).
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    /// Per-pixel intensity delta that counts as changed.
    #[serde(default = "default_pixel_threshold")]
    pub pixel_threshold: u8,
}

fn default_trigger_threshold() -> u64 {
    6_000
}

fn default_learning_rate() -> f32 {
    0.02
}

fn default_pixel_threshold() -> u8 {
    25
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: default_trigger_threshold(),
            learning_rate: default_learning_rate(),
            pixel_threshold: default_pixel_threshold(),
        }
    }
}

// ── Face recognition service ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// HTTP endpoint of the recognition service. `None` disables recognition.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Match distances at or above this are reported as "unknown".
    #[serde(default = "default_unknown_distance")]
    pub unknown_distance: f64,
    #[serde(default = "default_recognition_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_unknown_distance() -> f64 {
    70.0
}

fn default_recognition_timeout_ms() -> u64 {
    2_000
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            unknown_distance: default_unknown_distance(),
            timeout_ms: default_recognition_timeout_ms(),
        }
    }
}

// ── Alarm ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    /// Consecutive non-unknown motion ticks tolerated before the threat clears.
    #[serde(default = "default_patience")]
    pub patience: u32,
}

fn default_patience() -> u32 {
    30
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            patience: default_patience(),
        }
    }
}

// ── Actuator link ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Serial device path (e.g. `/dev/ttyACM0`) or `tcp://host:port`.
    #[serde(default = "default_actuator_port")]
    pub port: String,
    /// Timeout for each reply line.
    #[serde(default = "default_line_timeout_ms")]
    pub line_timeout_ms: u64,
    /// Extra attempts after a failed command.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Delay after opening the port; boards reset when the line opens.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_actuator_port() -> String {
    "/dev/ttyACM0".into()
}

fn default_line_timeout_ms() -> u64 {
    1_000
}

fn default_retries() -> u32 {
    1
}

fn default_settle_ms() -> u64 {
    2_000
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            port: default_actuator_port(),
            line_timeout_ms: default_line_timeout_ms(),
            retries: default_retries(),
            settle_ms: default_settle_ms(),
        }
    }
}

// ── Notifications ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Minimum interval between attempts for the same event type.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Maximum number of queued deliveries.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Delivery worker tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Upper bound on a single channel delivery.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Camera location shown in notifications.
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub pushover: PushoverConfig,
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    64
}

fn default_workers() -> usize {
    4
}

fn default_send_timeout_secs() -> u64 {
    10
}

fn default_location() -> String {
    "Front Camera".into()
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            send_timeout_secs: default_send_timeout_secs(),
            location: default_location(),
            email: EmailConfig::default(),
            webhook: WebhookConfig::default(),
            discord: DiscordConfig::default(),
            pushover: PushoverConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_smtp_server")]
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub sender_email: String,
    #[serde(default)]
    pub sender_password: String,
    #[serde(default)]
    pub recipient_email: String,
}

fn default_smtp_server() -> String {
    "smtp.gmail.com".into()
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: default_smtp_server(),
            smtp_port: default_smtp_port(),
            sender_email: String::new(),
            sender_password: String::new(),
            recipient_email: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiscordConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushoverConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub user_key: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_pushover_api_url")]
    pub api_url: String,
}

fn default_pushover_api_url() -> String {
    "https://api.pushover.net/1/messages.json".into()
}

impl Default for PushoverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            user_key: String::new(),
            api_token: String::new(),
            api_url: default_pushover_api_url(),
        }
    }
}

// ── Logging ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for CSV event logs and session summaries.
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    /// Directory for unknown-person snapshots.
    #[serde(default = "default_snapshots_dir")]
    pub snapshots_dir: PathBuf,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_snapshots_dir() -> PathBuf {
    PathBuf::from("snapshots")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            snapshots_dir: default_snapshots_dir(),
        }
    }
}

// ── Env references ────────────────────────────────────────────

/// Resolve `${VAR_NAME}` patterns in a string using `std::env::var`.
///
/// Returns an error if a referenced variable is not set.
pub fn resolve_env_refs(input: &str) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if !closed {
                return Err(SmartcamError::Config(format!(
                    "unclosed env var reference in: {input}"
                )));
            }
            let value = env::var(&var_name).map_err(|_| SmartcamError::MissingEnv(var_name))?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg.motion.trigger_threshold, 6_000);
        assert_eq!(cfg.alarm.patience, 30);
        assert_eq!(cfg.notify.cooldown_secs, 30);
        assert_eq!(cfg.actuator.line_timeout_ms, 1_000);
        assert!(cfg.enabled_channels().is_empty());
    }

    #[test]
    fn parse_channels_and_thresholds() {
        let toml = r#"
[motion]
trigger_threshold = 8000

[alarm]
patience = 10

[notify.discord]
enabled = true
webhook_url = "https://discord.example/hook"

[notify.webhook]
enabled = true
url = "https://hooks.example/notify"
headers = { "X-Token" = "abc" }
"#;
        let cfg = Config::from_toml(toml).unwrap();
        assert_eq!(cfg.motion.trigger_threshold, 8000);
        assert_eq!(cfg.alarm.patience, 10);
        assert_eq!(cfg.enabled_channels(), vec!["webhook", "discord"]);
        assert_eq!(cfg.notify.webhook.headers["X-Token"], "abc");
    }

    #[test]
    fn enabled_channel_without_endpoint_is_rejected() {
        let toml = r#"
[notify.discord]
enabled = true
"#;
        let err = Config::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("webhook_url"), "got: {err}");
    }

    #[test]
    fn invalid_learning_rate_is_rejected() {
        let err = Config::from_toml("[motion]\nlearning_rate = 0.0\n").unwrap_err();
        assert!(err.to_string().contains("learning_rate"));
    }

    #[test]
    fn secrets_resolve_from_env() {
        std::env::set_var("SMARTCAM_TEST_PUSH_TOKEN", "tok-123");
        let toml = r#"
[notify.pushover]
enabled = true
user_key = "user-1"
api_token = "${SMARTCAM_TEST_PUSH_TOKEN}"
"#;
        let cfg = Config::from_toml(toml).unwrap();
        assert_eq!(cfg.notify.pushover.api_token, "tok-123");
        std::env::remove_var("SMARTCAM_TEST_PUSH_TOKEN");
    }

    #[test]
    fn missing_secret_env_is_an_error() {
        let toml = r#"
[notify.email]
sender_password = "${SMARTCAM_ABSOLUTELY_NOT_SET_98765}"
"#;
        match Config::from_toml(toml).unwrap_err() {
            SmartcamError::MissingEnv(name) => assert_eq!(name, "SMARTCAM_ABSOLUTELY_NOT_SET_98765"),
            other => panic!("expected MissingEnv, got: {other:?}"),
        }
    }

    #[test]
    fn resolve_env_refs_unclosed() {
        let err = resolve_env_refs("https://${UNCLOSED/hook").unwrap_err();
        assert!(err.to_string().contains("unclosed"));
    }

    #[test]
    fn resolve_env_refs_plain_passthrough() {
        assert_eq!(resolve_env_refs("plain").unwrap(), "plain");
    }

    #[test]
    fn template_parses_back() {
        let rendered = Config::template().unwrap();
        let cfg: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(cfg.camera.width, 640);
        assert_eq!(cfg.logging.snapshots_dir, PathBuf::from("snapshots"));
    }
}
