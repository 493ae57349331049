use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

const DEFAULT_RELAY_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_PHONE_URL: &str = "http://127.0.0.1:5000/phone";
const DEFAULT_STALENESS_SECS: f64 = 5.0;
const DEFAULT_STREAM_INTERVAL_MS: u64 = 50;
const DEFAULT_ALERT_CAPACITY: usize = 64;
const DEFAULT_OBJECT_CONFIDENCE: f32 = 0.25;
const DEFAULT_OBJECT_INPUT_SIZE: u32 = 640;
const DEFAULT_ESCALATION_COUNT: u32 = 5;
const DEFAULT_AUDIO_CAPACITY: usize = 4;
const DEFAULT_AUDIO_COOLDOWN_SECS: f64 = 10.0;
const DEFAULT_OBJECT_COOLDOWN_SECS: f64 = 10.0;

/// Label -> display name for every item the side camera treats as prohibited.
const PROHIBITED_ITEMS: [(&str, &str); 8] = [
    ("cell phone", "Mobile Phone"),
    ("book", "Book/Notes"),
    ("laptop", "Laptop"),
    ("keyboard", "External Keyboard"),
    ("mouse", "Mouse"),
    ("remote", "Electronic Device"),
    ("tablet", "Tablet"),
    ("tv", "Monitor/Screen"),
];

/// Subset flagged by the main webcam monitor.
const WEBCAM_PROHIBITED: [&str; 6] = ["cell phone", "book", "laptop", "remote", "tv", "keyboard"];

/// Which monitor the configuration is for. Each profile has its own defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    /// Front webcam: faces, eye gaze, prohibited objects, spoken alerts.
    Webcam,
    /// Side camera: prohibited objects with whitelist, writing motion.
    Side,
    /// Phone relay: faces, face position, movement, edge density, alert queue.
    Relay,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GazeMode {
    /// Eye positions inside the face box.
    Eyes,
    /// Face center offset from the frame center.
    FacePosition,
}

// ----------------------------------------------------------------------------
// File representation (every field optional)
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct ProctorConfigFile {
    relay: Option<RelayConfigFile>,
    face: Option<FaceConfigFile>,
    motion: Option<MotionConfigFile>,
    objects: Option<ObjectConfigFile>,
    whitelist: Option<WhitelistConfigFile>,
    alerts: Option<AlertConfigFile>,
    audio: Option<AudioConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct RelayConfigFile {
    addr: Option<String>,
    phone_url: Option<String>,
    staleness_secs: Option<f64>,
    stream_interval_ms: Option<u64>,
    alert_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct FaceConfigFile {
    backend: Option<String>,
    eye_backend: Option<String>,
    model_path: Option<PathBuf>,
    absence_secs: Option<f64>,
    looking_away_secs: Option<f64>,
    rearm_secs: Option<f64>,
    gaze_mode: Option<GazeMode>,
    eye_side_fraction: Option<f32>,
    off_center_fraction: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionConfigFile {
    pixel_delta: Option<u8>,
    pixel_threshold: Option<u64>,
    edge_density: Option<f32>,
    canny_low: Option<f32>,
    canny_high: Option<f32>,
    writing_flow: Option<f32>,
    writing_confirm: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ObjectConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    interval_secs: Option<f64>,
    confidence: Option<f32>,
    prohibited: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, Default)]
struct WhitelistConfigFile {
    correlation: Option<f32>,
    size_ratio_min: Option<f32>,
    size_ratio_max: Option<f32>,
    min_region: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    escalation_count: Option<u32>,
    no_face_every: Option<u64>,
    multiple_faces_every: Option<u64>,
    movement_every: Option<u64>,
    looking_away_every: Option<u64>,
    object_cooldown_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct AudioConfigFile {
    enabled: Option<bool>,
    command: Option<String>,
    queue_capacity: Option<usize>,
    cooldown_secs: Option<f64>,
}

// ----------------------------------------------------------------------------
// Resolved configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProctorConfig {
    pub profile: Profile,
    pub checks: CheckSettings,
    pub relay: RelaySettings,
    pub face: FaceSettings,
    pub motion: MotionSettings,
    pub objects: ObjectSettings,
    pub whitelist: WhitelistSettings,
    pub alerts: AlertSettings,
    pub audio: AudioSettings,
}

/// Checks a profile runs on each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckSettings {
    pub faces: bool,
    pub gaze: bool,
    pub movement: bool,
    pub edges: bool,
    pub objects: bool,
    pub writing: bool,
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub addr: String,
    pub phone_url: String,
    pub staleness: Duration,
    pub stream_interval: Duration,
    pub alert_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct FaceSettings {
    pub backend: String,
    pub eye_backend: String,
    pub model_path: Option<PathBuf>,
    pub absence: Duration,
    pub looking_away: Duration,
    /// Re-fire interval while a face violation persists. None fires once per crossing.
    pub rearm: Option<Duration>,
    pub gaze_mode: GazeMode,
    pub eye_side_fraction: f32,
    pub off_center_fraction: f32,
}

#[derive(Debug, Clone)]
pub struct MotionSettings {
    pub pixel_delta: u8,
    pub pixel_threshold: u64,
    pub edge_density: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub writing_flow: f32,
    pub writing_confirm: u32,
}

#[derive(Debug, Clone)]
pub struct ObjectSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    pub interval: Duration,
    pub confidence: f32,
    /// Detector label -> display name.
    pub prohibited: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct WhitelistSettings {
    pub correlation: f32,
    pub size_ratio_min: f32,
    pub size_ratio_max: f32,
    pub min_region: u32,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub escalation_count: u32,
    pub no_face_every: u64,
    pub multiple_faces_every: u64,
    pub movement_every: u64,
    pub looking_away_every: u64,
    pub object_cooldown: Duration,
}

#[derive(Debug, Clone)]
pub struct AudioSettings {
    pub enabled: bool,
    pub command: Option<String>,
    pub queue_capacity: usize,
    pub cooldown: Duration,
}

impl ProctorConfig {
    /// Defaults for `profile`, overlaid with `PROCTOR_CONFIG` and environment overrides.
    pub fn load(profile: Profile) -> Result<Self> {
        let config_path = std::env::var("PROCTOR_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(profile, file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Built-in defaults for `profile` without consulting the environment.
    pub fn defaults(profile: Profile) -> Self {
        Self::from_file(profile, ProctorConfigFile::default())
    }

    fn from_file(profile: Profile, file: ProctorConfigFile) -> Self {
        let checks = match profile {
            Profile::Webcam => CheckSettings {
                faces: true,
                gaze: true,
                movement: false,
                edges: false,
                objects: true,
                writing: false,
            },
            Profile::Side => CheckSettings {
                faces: false,
                gaze: false,
                movement: false,
                edges: false,
                objects: true,
                writing: true,
            },
            Profile::Relay => CheckSettings {
                faces: true,
                gaze: true,
                movement: true,
                edges: true,
                objects: false,
                writing: false,
            },
        };

        let relay_file = file.relay.unwrap_or_default();
        let relay = RelaySettings {
            addr: relay_file
                .addr
                .unwrap_or_else(|| DEFAULT_RELAY_ADDR.to_string()),
            phone_url: relay_file
                .phone_url
                .unwrap_or_else(|| DEFAULT_PHONE_URL.to_string()),
            staleness: secs(relay_file.staleness_secs.unwrap_or(DEFAULT_STALENESS_SECS)),
            stream_interval: Duration::from_millis(
                relay_file
                    .stream_interval_ms
                    .unwrap_or(DEFAULT_STREAM_INTERVAL_MS),
            ),
            alert_capacity: relay_file.alert_capacity.unwrap_or(DEFAULT_ALERT_CAPACITY),
        };

        let relay_profile = profile == Profile::Relay;
        let face_file = file.face.unwrap_or_default();
        let face = FaceSettings {
            backend: face_file.backend.unwrap_or_else(|| "skin".to_string()),
            eye_backend: face_file
                .eye_backend
                .unwrap_or_else(|| "projection".to_string()),
            model_path: face_file.model_path,
            absence: secs(
                face_file
                    .absence_secs
                    .unwrap_or(if relay_profile { 0.0 } else { 3.0 }),
            ),
            looking_away: secs(
                face_file
                    .looking_away_secs
                    .unwrap_or(if relay_profile { 0.0 } else { 5.0 }),
            ),
            rearm: match face_file.rearm_secs {
                Some(value) if value < 0.0 => None,
                Some(value) => Some(secs(value)),
                None if relay_profile => Some(Duration::ZERO),
                None => None,
            },
            gaze_mode: face_file.gaze_mode.unwrap_or(if relay_profile {
                GazeMode::FacePosition
            } else {
                GazeMode::Eyes
            }),
            eye_side_fraction: face_file.eye_side_fraction.unwrap_or(0.2),
            off_center_fraction: face_file.off_center_fraction.unwrap_or(0.3),
        };

        let motion_file = file.motion.unwrap_or_default();
        let motion = MotionSettings {
            pixel_delta: motion_file.pixel_delta.unwrap_or(30),
            pixel_threshold: motion_file.pixel_threshold.unwrap_or(150_000),
            edge_density: motion_file.edge_density.unwrap_or(0.15),
            canny_low: motion_file.canny_low.unwrap_or(50.0),
            canny_high: motion_file.canny_high.unwrap_or(150.0),
            writing_flow: motion_file.writing_flow.unwrap_or(2.5),
            writing_confirm: motion_file.writing_confirm.unwrap_or(3),
        };

        let object_file = file.objects.unwrap_or_default();
        let prohibited = object_file.prohibited.unwrap_or_else(|| {
            PROHIBITED_ITEMS
                .iter()
                .filter(|(label, _)| profile != Profile::Webcam || WEBCAM_PROHIBITED.contains(label))
                .map(|(label, name)| (label.to_string(), name.to_string()))
                .collect()
        });
        let objects = ObjectSettings {
            backend: object_file.backend.unwrap_or_else(|| "none".to_string()),
            model_path: object_file.model_path,
            input_size: object_file.input_size.unwrap_or(DEFAULT_OBJECT_INPUT_SIZE),
            interval: secs(object_file.interval_secs.unwrap_or(match profile {
                Profile::Side => 3.0,
                _ => 4.0,
            })),
            confidence: object_file
                .confidence
                .unwrap_or(DEFAULT_OBJECT_CONFIDENCE),
            prohibited,
        };

        let whitelist_file = file.whitelist.unwrap_or_default();
        let whitelist = WhitelistSettings {
            correlation: whitelist_file.correlation.unwrap_or(0.5),
            size_ratio_min: whitelist_file.size_ratio_min.unwrap_or(0.3),
            size_ratio_max: whitelist_file.size_ratio_max.unwrap_or(3.0),
            min_region: whitelist_file.min_region.unwrap_or(20),
        };

        let alert_file = file.alerts.unwrap_or_default();
        let alerts = AlertSettings {
            escalation_count: alert_file
                .escalation_count
                .unwrap_or(DEFAULT_ESCALATION_COUNT),
            no_face_every: alert_file.no_face_every.unwrap_or(3),
            multiple_faces_every: alert_file.multiple_faces_every.unwrap_or(1),
            movement_every: alert_file.movement_every.unwrap_or(5),
            looking_away_every: alert_file.looking_away_every.unwrap_or(4),
            object_cooldown: secs(
                alert_file
                    .object_cooldown_secs
                    .unwrap_or(DEFAULT_OBJECT_COOLDOWN_SECS),
            ),
        };

        let audio_file = file.audio.unwrap_or_default();
        let audio = AudioSettings {
            enabled: audio_file.enabled.unwrap_or(profile == Profile::Webcam),
            command: audio_file.command,
            queue_capacity: audio_file.queue_capacity.unwrap_or(DEFAULT_AUDIO_CAPACITY),
            cooldown: secs(
                audio_file
                    .cooldown_secs
                    .unwrap_or(DEFAULT_AUDIO_COOLDOWN_SECS),
            ),
        };

        Self {
            profile,
            checks,
            relay,
            face,
            motion,
            objects,
            whitelist,
            alerts,
            audio,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("PROCTOR_RELAY_ADDR") {
            if !addr.trim().is_empty() {
                self.relay.addr = addr;
            }
        }
        if let Ok(url) = std::env::var("PROCTOR_PHONE_URL") {
            if !url.trim().is_empty() {
                self.relay.phone_url = url;
            }
        }
        if let Ok(value) = std::env::var("PROCTOR_STALENESS_SECS") {
            let seconds: f64 = value
                .parse()
                .map_err(|_| anyhow!("PROCTOR_STALENESS_SECS must be a number of seconds"))?;
            self.relay.staleness = parse_secs("PROCTOR_STALENESS_SECS", seconds)?;
        }
        if let Ok(value) = std::env::var("PROCTOR_OBJECT_INTERVAL_SECS") {
            let seconds: f64 = value.parse().map_err(|_| {
                anyhow!("PROCTOR_OBJECT_INTERVAL_SECS must be a number of seconds")
            })?;
            self.objects.interval = parse_secs("PROCTOR_OBJECT_INTERVAL_SECS", seconds)?;
        }
        if let Ok(labels) = std::env::var("PROCTOR_PROHIBITED") {
            let parsed = split_csv(&labels);
            if !parsed.is_empty() {
                self.objects.prohibited = parsed
                    .into_iter()
                    .map(|label| {
                        let label = label.to_lowercase();
                        let name = display_name_for(&label).unwrap_or(&label).to_string();
                        (label, name)
                    })
                    .collect();
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.relay.staleness.is_zero() {
            return Err(anyhow!("relay staleness window must be greater than zero"));
        }
        if self.relay.alert_capacity == 0 {
            return Err(anyhow!("relay alert capacity must be greater than zero"));
        }
        for (name, value) in [
            ("face.eye_side_fraction", self.face.eye_side_fraction),
            ("face.off_center_fraction", self.face.off_center_fraction),
            ("motion.edge_density", self.motion.edge_density),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(anyhow!("{} must be within (0, 1), got {}", name, value));
            }
        }
        if self.face.eye_side_fraction >= 0.5 {
            return Err(anyhow!("face.eye_side_fraction must be below 0.5"));
        }
        if self.motion.canny_low > self.motion.canny_high {
            return Err(anyhow!("motion.canny_low must not exceed motion.canny_high"));
        }
        if !(0.0..=1.0).contains(&self.objects.confidence) {
            return Err(anyhow!("objects.confidence must be within [0, 1]"));
        }
        if self.objects.interval.is_zero() {
            return Err(anyhow!("objects.interval must be greater than zero"));
        }
        for label in self.objects.prohibited.keys() {
            validate_label(label)?;
        }
        if self.whitelist.size_ratio_min <= 0.0
            || self.whitelist.size_ratio_min >= self.whitelist.size_ratio_max
        {
            return Err(anyhow!(
                "whitelist size band must satisfy 0 < min < max (got {}..{})",
                self.whitelist.size_ratio_min,
                self.whitelist.size_ratio_max
            ));
        }
        if self.alerts.escalation_count == 0 {
            return Err(anyhow!("alerts.escalation_count must be greater than zero"));
        }
        for (name, every) in [
            ("alerts.no_face_every", self.alerts.no_face_every),
            ("alerts.multiple_faces_every", self.alerts.multiple_faces_every),
            ("alerts.movement_every", self.alerts.movement_every),
            ("alerts.looking_away_every", self.alerts.looking_away_every),
        ] {
            if every == 0 {
                return Err(anyhow!("{} must be greater than zero", name));
            }
        }
        if self.audio.queue_capacity == 0 {
            return Err(anyhow!("audio.queue_capacity must be greater than zero"));
        }
        Ok(())
    }
}

/// Detector labels are lowercase words separated by single spaces.
pub fn validate_label(label: &str) -> Result<()> {
    static LABEL_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = LABEL_RE.get_or_init(|| {
        regex::Regex::new(r"^[a-z0-9]+( [a-z0-9]+)*$").expect("label pattern is valid")
    });
    if label.len() > 48 || !re.is_match(label) {
        return Err(anyhow!("invalid object label '{}'", label));
    }
    Ok(())
}

fn display_name_for(label: &str) -> Option<&'static str> {
    PROHIBITED_ITEMS
        .iter()
        .find(|(l, _)| *l == label)
        .map(|(_, name)| *name)
}

/// Negative values clamp to zero. Out-of-range values never reach here:
/// file and environment inputs go through `parse_secs` first.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

fn parse_secs(field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value.max(0.0))
        .map_err(|e| anyhow!("{} is not a usable number of seconds ({}): {}", field, value, e))
}

impl ProctorConfigFile {
    fn check_durations(&self) -> Result<()> {
        let relay = self.relay.as_ref();
        let face = self.face.as_ref();
        let fields = [
            ("relay.staleness_secs", relay.and_then(|r| r.staleness_secs)),
            ("face.absence_secs", face.and_then(|f| f.absence_secs)),
            ("face.looking_away_secs", face.and_then(|f| f.looking_away_secs)),
            ("face.rearm_secs", face.and_then(|f| f.rearm_secs)),
            (
                "objects.interval_secs",
                self.objects.as_ref().and_then(|o| o.interval_secs),
            ),
            (
                "alerts.object_cooldown_secs",
                self.alerts.as_ref().and_then(|a| a.object_cooldown_secs),
            ),
            (
                "audio.cooldown_secs",
                self.audio.as_ref().and_then(|a| a.cooldown_secs),
            ),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                parse_secs(field, value)?;
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ProctorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: ProctorConfigFile = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    cfg.check_durations()
        .map_err(|e| anyhow!("invalid config file {}: {:#}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_defaults_differ_where_monitors_differ() {
        let webcam = ProctorConfig::defaults(Profile::Webcam);
        assert_eq!(webcam.face.gaze_mode, GazeMode::Eyes);
        assert_eq!(webcam.face.absence, Duration::from_secs(3));
        assert_eq!(webcam.face.rearm, None);
        assert_eq!(webcam.objects.prohibited.len(), 6);
        assert!(webcam.audio.enabled);
        assert!(webcam.checks.faces && webcam.checks.gaze);
        assert!(!webcam.checks.movement && !webcam.checks.edges);
        assert!(webcam.validate().is_ok());

        let side = ProctorConfig::defaults(Profile::Side);
        assert_eq!(side.objects.interval, Duration::from_secs(3));
        assert_eq!(side.objects.prohibited["cell phone"], "Mobile Phone");
        assert_eq!(side.objects.prohibited.len(), 8);
        assert!(side.checks.writing);

        let relay = ProctorConfig::defaults(Profile::Relay);
        assert_eq!(relay.face.gaze_mode, GazeMode::FacePosition);
        assert_eq!(relay.face.rearm, Some(Duration::ZERO));
        assert!(relay.checks.movement && relay.checks.edges);
        assert!(!relay.checks.objects);
    }

    #[test]
    fn validation_rejects_inverted_whitelist_band() {
        let mut cfg = ProctorConfig::defaults(Profile::Side);
        cfg.whitelist.size_ratio_min = 3.0;
        cfg.whitelist.size_ratio_max = 0.3;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn labels_are_validated() {
        assert!(validate_label("cell phone").is_ok());
        assert!(validate_label("Cell Phone").is_err());
        assert!(validate_label("book;drop").is_err());
        assert!(validate_label("").is_err());
    }
}
