//! The gateway's built-in security system exposed as an alarm control panel.
//!
//! The arming state lives in two persistent properties on the gateway: a guard flag saying
//! whether the system is armed at all, and the code of the arming profile. `basis_cli` then
//! makes the gateway pick the change up.

use crate::shell::{Shell, ShellError};

pub const ARMING_STATE: &str = "persist.app.arming_state";
pub const ARMING_GUARD: &str = "persist.app.arming_guard";

pub const SUPPORT_ARM_HOME: u32 = 1;
pub const SUPPORT_ARM_AWAY: u32 = 2;
pub const SUPPORT_ARM_NIGHT: u32 = 4;

pub const ICON: &str = "mdi:shield-home";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::FromRepr,
    strum::IntoStaticStr,
    strum::Display,
    serde::Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AlarmState {
    ArmedHome = 0,
    ArmedAway = 1,
    ArmedNight = 2,
    Disarmed = 3,
}

impl AlarmState {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Interpret the value of the arming state property.
    pub fn from_property(value: &str) -> Option<Self> {
        value.trim().parse::<u8>().ok().and_then(Self::from_repr)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AlarmError {
    #[error("could not {1} through the gateway shell")]
    Shell(#[source] ShellError, &'static str),
}

/// Static facts about the panel the platform asks for.
#[derive(serde::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AlarmAttributes {
    pub supported_features: u32,
    pub code_arm_required: bool,
    pub should_poll: bool,
    pub icon: &'static str,
}

pub const ATTRIBUTES: AlarmAttributes = AlarmAttributes {
    supported_features: SUPPORT_ARM_HOME | SUPPORT_ARM_AWAY | SUPPORT_ARM_NIGHT,
    code_arm_required: false,
    should_poll: true,
    icon: ICON,
};

pub struct AlarmPanel<S> {
    shell: S,
    state: AlarmState,
}

impl<S: Shell> AlarmPanel<S> {
    /// A panel that has not looked at the gateway yet and therefore reports `disarmed`.
    pub fn new(shell: S) -> Self {
        Self { shell, state: AlarmState::Disarmed }
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub async fn arm_home(&mut self) -> Result<(), AlarmError> {
        self.set_state(AlarmState::ArmedHome).await
    }

    pub async fn arm_away(&mut self) -> Result<(), AlarmError> {
        self.set_state(AlarmState::ArmedAway).await
    }

    pub async fn arm_night(&mut self) -> Result<(), AlarmError> {
        self.set_state(AlarmState::ArmedNight).await
    }

    pub async fn disarm(&mut self) -> Result<(), AlarmError> {
        self.set_state(AlarmState::Disarmed).await
    }

    async fn set_state(&mut self, state: AlarmState) -> Result<(), AlarmError> {
        const WHAT: &str = "change the arming state";
        let shell = &mut self.shell;
        if state == AlarmState::Disarmed {
            shell.set_prop(ARMING_GUARD, "false").await.map_err(|e| AlarmError::Shell(e, WHAT))?;
            shell.run_basis_cli("-arm -u").await.map_err(|e| AlarmError::Shell(e, WHAT))?;
        } else {
            let code = state.code().to_string();
            shell.set_prop(ARMING_STATE, &code).await.map_err(|e| AlarmError::Shell(e, WHAT))?;
            shell.set_prop(ARMING_GUARD, "true").await.map_err(|e| AlarmError::Shell(e, WHAT))?;
            shell.run_basis_cli("-arm -g").await.map_err(|e| AlarmError::Shell(e, WHAT))?;
        }
        tracing::info!(%state, "alarm state changed");
        self.state = state;
        Ok(())
    }

    /// Read the current state back from the gateway.
    pub async fn refresh(&mut self) -> Result<AlarmState, AlarmError> {
        const WHAT: &str = "read the arming state";
        let guard =
            self.shell.get_prop(ARMING_GUARD).await.map_err(|e| AlarmError::Shell(e, WHAT))?;
        let state = if guard.trim() == "true" {
            let raw =
                self.shell.get_prop(ARMING_STATE).await.map_err(|e| AlarmError::Shell(e, WHAT))?;
            AlarmState::from_property(&raw).unwrap_or_else(|| {
                tracing::warn!(%raw, "unexpected arming state, treating the panel as disarmed");
                AlarmState::Disarmed
            })
        } else {
            AlarmState::Disarmed
        };
        tracing::debug!(%state, "refreshed alarm state");
        self.state = state;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct FakeShell {
        props: BTreeMap<String, String>,
        log: Vec<String>,
        broken: bool,
    }

    impl FakeShell {
        fn with(props: &[(&str, &str)]) -> Self {
            Self {
                props: props.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                ..Self::default()
            }
        }

        fn check(&self) -> Result<(), ShellError> {
            if self.broken {
                let status = std::process::ExitStatus::default();
                return Err(ShellError::Failed("setprop".into(), status));
            }
            Ok(())
        }
    }

    impl Shell for FakeShell {
        async fn get_prop(&mut self, name: &str) -> Result<String, ShellError> {
            self.check()?;
            Ok(self.props.get(name).cloned().unwrap_or_default())
        }

        async fn set_prop(&mut self, name: &str, value: &str) -> Result<(), ShellError> {
            self.check()?;
            self.log.push(format!("setprop {name} {value}"));
            self.props.insert(name.into(), value.into());
            Ok(())
        }

        async fn run_basis_cli(&mut self, arguments: &str) -> Result<(), ShellError> {
            self.check()?;
            self.log.push(format!("basis_cli {arguments}"));
            Ok(())
        }
    }

    #[test]
    fn test_state_codes() {
        assert_eq!(AlarmState::from_property("0"), Some(AlarmState::ArmedHome));
        assert_eq!(AlarmState::from_property("2\n"), Some(AlarmState::ArmedNight));
        assert_eq!(AlarmState::from_property("3"), Some(AlarmState::Disarmed));
        assert_eq!(AlarmState::from_property("4"), None);
        assert_eq!(AlarmState::from_property("home"), None);
        assert_eq!(AlarmState::ArmedAway.to_string(), "armed_away");
        assert_eq!(ATTRIBUTES.supported_features, 7);
    }

    #[tokio::test]
    async fn test_arm_and_disarm() {
        let mut panel = AlarmPanel::new(FakeShell::default());
        panel.arm_night().await.unwrap();
        assert_eq!(panel.state(), AlarmState::ArmedNight);
        panel.disarm().await.unwrap();
        assert_eq!(panel.state(), AlarmState::Disarmed);
        assert_eq!(
            panel.shell().log,
            [
                "setprop persist.app.arming_state 2",
                "setprop persist.app.arming_guard true",
                "basis_cli -arm -g",
                "setprop persist.app.arming_guard false",
                "basis_cli -arm -u",
            ]
        );
    }

    #[tokio::test]
    async fn test_refresh() {
        let shell = FakeShell::with(&[(ARMING_GUARD, "true"), (ARMING_STATE, "1")]);
        let mut panel = AlarmPanel::new(shell);
        assert_eq!(panel.refresh().await.unwrap(), AlarmState::ArmedAway);

        let shell = FakeShell::with(&[(ARMING_GUARD, "false"), (ARMING_STATE, "1")]);
        let mut panel = AlarmPanel::new(shell);
        assert_eq!(panel.refresh().await.unwrap(), AlarmState::Disarmed);

        let mut panel = AlarmPanel::new(FakeShell::default());
        assert_eq!(panel.refresh().await.unwrap(), AlarmState::Disarmed);
    }

    #[tokio::test]
    async fn test_refresh_garbage_is_disarmed() {
        for raw in ["7", "", "armed"] {
            let shell = FakeShell::with(&[(ARMING_GUARD, "true"), (ARMING_STATE, raw)]);
            let mut panel = AlarmPanel::new(shell);
            panel.arm_home().await.unwrap();
            panel.shell.props.insert(ARMING_STATE.into(), raw.into());
            assert_eq!(panel.refresh().await.unwrap(), AlarmState::Disarmed);
        }
    }

    #[tokio::test]
    async fn test_shell_failure_keeps_state() {
        let mut panel = AlarmPanel::new(FakeShell::default());
        panel.arm_away().await.unwrap();
        panel.shell.broken = true;
        let err = panel.disarm().await.unwrap_err();
        assert_eq!(err.to_string(), "could not change the arming state through the gateway shell");
        assert_eq!(panel.state(), AlarmState::ArmedAway);
        assert!(panel.refresh().await.is_err());
        assert_eq!(panel.state(), AlarmState::ArmedAway);
    }
}
