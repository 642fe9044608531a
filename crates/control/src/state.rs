//! Axes and their closed state enums
//!
//! Status strings from the machine are free text ("active (running)",
//! "enabled-runtime", "online"). Parsing matches a case-insensitive prefix
//! against the known states; anything else maps to the axis' off state and
//! the reading is flagged `defaulted` so callers can see the fallback.

use serde::Serialize;
use tracing::warn;

/// An independently togglable dimension of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Axis {
    /// Service or app running state
    Run,
    /// Service enabled on boot
    Boot,
    /// Companion timer running state
    TimerRun,
    /// Companion timer enabled on boot
    TimerBoot,
    /// Checked-out git branch
    Branch,
    /// npm install runner
    Install,
    /// npm build runner
    Build,
}

impl Axis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Run => "run",
            Axis::Boot => "boot",
            Axis::TimerRun => "timer-run",
            Axis::TimerBoot => "timer-boot",
            Axis::Branch => "branch",
            Axis::Install => "install",
            Axis::Build => "build",
        }
    }

    pub fn is_timer(&self) -> bool {
        matches!(self, Axis::TimerRun | Axis::TimerBoot)
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "run" => Ok(Axis::Run),
            "boot" => Ok(Axis::Boot),
            "timer-run" => Ok(Axis::TimerRun),
            "timer-boot" => Ok(Axis::TimerBoot),
            "branch" => Ok(Axis::Branch),
            "install" => Ok(Axis::Install),
            "build" => Ok(Axis::Build),
            other => Err(format!("unknown axis: {}", other)),
        }
    }
}

/// Running state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Active,
    Inactive,
    Failed,
}

impl RunState {
    pub fn is_on(&self) -> bool {
        matches!(self, RunState::Active)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Active => write!(f, "active"),
            RunState::Inactive => write!(f, "inactive"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Boot enablement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootState {
    Enabled,
    Disabled,
}

impl BootState {
    pub fn is_on(&self) -> bool {
        matches!(self, BootState::Enabled)
    }
}

impl std::fmt::Display for BootState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootState::Enabled => write!(f, "enabled"),
            BootState::Disabled => write!(f, "disabled"),
        }
    }
}

/// State of one axis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AxisState {
    Run(RunState),
    Boot(BootState),
    Branch(String),
}

impl AxisState {
    /// On/off view used by toggles; `None` for non-binary axes
    pub fn is_on(&self) -> Option<bool> {
        match self {
            AxisState::Run(s) => Some(s.is_on()),
            AxisState::Boot(s) => Some(s.is_on()),
            AxisState::Branch(_) => None,
        }
    }
}

impl std::fmt::Display for AxisState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AxisState::Run(s) => write!(f, "{}", s),
            AxisState::Boot(s) => write!(f, "{}", s),
            AxisState::Branch(b) => write!(f, "{}", b),
        }
    }
}

/// A parsed axis value together with the text it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AxisReading {
    pub state: AxisState,
    pub raw: String,
    /// The raw text matched no known state and `state` is the fallback
    pub defaulted: bool,
}

impl AxisReading {
    pub fn exact(state: AxisState, raw: impl Into<String>) -> Self {
        Self {
            state,
            raw: raw.into(),
            defaulted: false,
        }
    }

    /// Nothing to parse at all; toggles on this axis are rejected
    pub fn is_malformed(&self) -> bool {
        self.raw.trim().is_empty()
    }
}

fn starts_with_ci(raw: &str, prefix: &str) -> bool {
    raw.get(..prefix.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(prefix))
}

fn fallback(state: AxisState, raw: &str) -> AxisReading {
    if !raw.trim().is_empty() {
        warn!("Unrecognized status '{}', treating as '{}'", raw, state);
    }
    AxisReading {
        state,
        raw: raw.to_string(),
        defaulted: true,
    }
}

/// systemd run state: `inactive`, `failed`, `active` prefixes
pub fn parse_run_state(raw: &str) -> AxisReading {
    let trimmed = raw.trim();
    let known = [
        ("inactive", RunState::Inactive),
        ("failed", RunState::Failed),
        ("active", RunState::Active),
    ];

    known
        .iter()
        .find(|(prefix, _)| starts_with_ci(trimmed, prefix))
        .map(|(_, state)| AxisReading::exact(AxisState::Run(*state), raw))
        .unwrap_or_else(|| fallback(AxisState::Run(RunState::Inactive), raw))
}

/// systemd boot state: `enabled`, `disabled` prefixes
pub fn parse_boot_state(raw: &str) -> AxisReading {
    let trimmed = raw.trim();
    if starts_with_ci(trimmed, "enabled") {
        AxisReading::exact(AxisState::Boot(BootState::Enabled), raw)
    } else if starts_with_ci(trimmed, "disabled") {
        AxisReading::exact(AxisState::Boot(BootState::Disabled), raw)
    } else {
        fallback(AxisState::Boot(BootState::Disabled), raw)
    }
}

/// PM2 process status mapped onto [`RunState`]
pub fn parse_process_state(raw: &str) -> AxisReading {
    let trimmed = raw.trim();
    let known = [
        ("online", RunState::Active),
        ("errored", RunState::Failed),
        ("stopped", RunState::Inactive),
    ];

    known
        .iter()
        .find(|(prefix, _)| starts_with_ci(trimmed, prefix))
        .map(|(_, state)| AxisReading::exact(AxisState::Run(*state), raw))
        .unwrap_or_else(|| fallback(AxisState::Run(RunState::Inactive), raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_prefixes() {
        let reading = parse_run_state("active (running)");
        assert_eq!(reading.state, AxisState::Run(RunState::Active));
        assert!(!reading.defaulted);

        assert_eq!(parse_run_state("Inactive (dead)").state, AxisState::Run(RunState::Inactive));
        assert_eq!(parse_run_state("failed (Result: exit-code)").state, AxisState::Run(RunState::Failed));
        assert_eq!(parse_run_state("ACTIVE").state, AxisState::Run(RunState::Active));
    }

    #[test]
    fn test_unknown_run_state_defaults_off() {
        for raw in ["activating (start)", "deactivating", "reloading"] {
            let reading = parse_run_state(raw);
            assert_eq!(reading.state, AxisState::Run(RunState::Inactive), "{}", raw);
            assert!(reading.defaulted, "{}", raw);
            assert!(!reading.is_malformed());
        }
    }

    #[test]
    fn test_empty_state_is_malformed() {
        let reading = parse_run_state("   ");
        assert!(reading.defaulted);
        assert!(reading.is_malformed());
    }

    #[test]
    fn test_boot_state() {
        assert_eq!(parse_boot_state("enabled").state, AxisState::Boot(BootState::Enabled));
        assert_eq!(parse_boot_state("enabled-runtime").state, AxisState::Boot(BootState::Enabled));
        assert_eq!(parse_boot_state("disabled").state, AxisState::Boot(BootState::Disabled));

        let masked = parse_boot_state("masked");
        assert_eq!(masked.state, AxisState::Boot(BootState::Disabled));
        assert!(masked.defaulted);
    }

    #[test]
    fn test_process_state() {
        assert_eq!(parse_process_state("online").state, AxisState::Run(RunState::Active));
        assert_eq!(parse_process_state("errored").state, AxisState::Run(RunState::Failed));
        assert!(!parse_process_state("stopped").defaulted);

        let launching = parse_process_state("launching");
        assert_eq!(launching.state, AxisState::Run(RunState::Inactive));
        assert!(launching.defaulted);
    }

    #[test]
    fn test_axis_round_trips_through_str() {
        for axis in [Axis::Run, Axis::Boot, Axis::TimerRun, Axis::TimerBoot, Axis::Branch] {
            assert_eq!(axis.as_str().parse::<Axis>().unwrap(), axis);
        }
        assert!("sideways".parse::<Axis>().is_err());
    }
}
