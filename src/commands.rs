use crate::output::{self, Record};

/// Parse a packed state given either in decimal or as `0x`-prefixed hexadecimal.
fn parse_packed(value: &str) -> Result<u32, std::num::ParseIntError> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub mod modes {
    use super::*;
    use crate::modes::TableEntry;

    /// List the mode code tables of every supported device model.
    #[derive(clap::Parser)]
    pub struct Args {
        /// Only list entries whose model, kind, name or code matches.
        filter: Option<String>,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error(transparent)]
        Output(#[from] output::Error),
    }

    impl Record for TableEntry {
        fn headers() -> &'static [&'static str] {
            &["Model", "Kind", "Name", "Code"]
        }

        fn row(&self) -> Vec<String> {
            vec![
                self.model.to_string(),
                self.kind.to_string(),
                self.name.to_string(),
                self.code.to_string(),
            ]
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let mut output = args.output.to_output()?;
        for entry in TableEntry::all() {
            if let Some(pattern) = &args.filter {
                if !entry.is_match(pattern) {
                    continue;
                }
            }
            output.record(&entry)?;
        }
        output.commit()?;
        Ok(())
    }
}

pub mod decode {
    use super::*;
    use crate::modes::{FanMode, HvacMode};
    use crate::packed::PackedClimateState;

    /// Decode a packed AC partner state into its fields.
    #[derive(clap::Parser)]
    pub struct Args {
        /// The packed state, in decimal or `0x`-prefixed hexadecimal.
        #[arg(value_parser = parse_packed)]
        value: u32,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error(transparent)]
        Output(#[from] output::Error),
    }

    #[derive(serde::Serialize)]
    pub struct Decoded {
        pub value: u32,
        #[serde(flatten)]
        pub state: PackedClimateState,
        pub hvac_mode: Option<HvacMode>,
        pub fan_mode: Option<FanMode>,
    }

    impl Decoded {
        pub fn new(value: u32) -> Self {
            let state = PackedClimateState::decode(value);
            Self { value, state, hvac_mode: state.hvac_mode(), fan_mode: state.fan_mode() }
        }
    }

    impl Record for Decoded {
        fn headers() -> &'static [&'static str] {
            &["Value", "Hvac code", "Fan code", "Target °C", "Reserved", "Hvac mode", "Fan mode"]
        }

        fn row(&self) -> Vec<String> {
            vec![
                format!("{:#010x}", self.value),
                format!("{:#04x}", self.state.hvac_code),
                format!("{:#04x}", self.state.fan_code),
                self.state.target_temperature.to_string(),
                format!("{:#04x}", self.state.reserved),
                optional(self.hvac_mode),
                optional(self.fan_mode),
            ]
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let mut output = args.output.to_output()?;
        output.record(&Decoded::new(args.value))?;
        output.commit()?;
        Ok(())
    }
}

pub mod control {
    use super::*;
    use crate::climate::{self, Climate, ControlError};
    use crate::gateway::WriteCommand;
    use crate::telemetry::{Telemetry, TelemetryError};

    /// Apply a control operation to a known device state and print the resulting write.
    ///
    /// For Yuba heaters the state only marks the device as observed, as they do not have a
    /// packed state.
    #[derive(clap::Parser)]
    pub struct Args {
        /// The last state reported by the device, in decimal or `0x`-prefixed hexadecimal.
        #[arg(long, value_parser = parse_packed)]
        state: u32,
        #[clap(flatten)]
        change: Change,
        #[clap(flatten)]
        climate: climate::Args,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(clap::Parser)]
    #[group(required = true, multiple = false)]
    pub struct Change {
        #[arg(long)]
        hvac_mode: Option<String>,
        #[arg(long)]
        fan_mode: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        temperature: Option<f64>,
        #[arg(long)]
        swing_mode: Option<String>,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not use the given state as the device state")]
        Baseline(#[source] TelemetryError),
        #[error("could not apply the requested change")]
        Control(#[source] ControlError),
        #[error(transparent)]
        Output(#[from] output::Error),
    }

    impl Record for WriteCommand {
        fn headers() -> &'static [&'static str] {
            &["Device", "Attribute", "Value", "Hex"]
        }

        fn row(&self) -> Vec<String> {
            vec![
                self.did.clone(),
                self.message.attribute.clone(),
                self.message.value.to_string(),
                format!("{:#010x}", self.message.value),
            ]
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let config = args.climate.to_config();
        let mut baseline = serde_json::Map::new();
        baseline.insert(config.attribute.clone(), args.state.into());
        let mut climate = Climate::new(args.climate.did(), config, Vec::new());
        climate.try_update(&Telemetry::from(baseline)).map_err(Error::Baseline)?;

        let Change { hvac_mode, fan_mode, temperature, swing_mode } = args.change;
        let result = if let Some(mode) = hvac_mode {
            climate.set_hvac_mode(&mode)
        } else if let Some(mode) = fan_mode {
            climate.set_fan_mode(&mode)
        } else if let Some(degrees) = temperature {
            climate.set_temperature(degrees)
        } else if let Some(mode) = swing_mode {
            climate.set_swing_mode(&mode)
        } else {
            Ok(())
        };
        result.map_err(Error::Control)?;

        let mut output = args.output.to_output()?;
        for command in climate.gateway() {
            output.record(command)?;
        }
        output.commit()?;
        Ok(())
    }
}

pub mod replay {
    use std::io::BufRead as _;
    use std::path::PathBuf;

    use super::*;
    use crate::climate::{self, Climate, ClimateState};
    use crate::telemetry::Telemetry;

    /// Feed JSON-lines telemetry into a climate entity and print its state after every line.
    #[derive(clap::Parser)]
    pub struct Args {
        /// Read telemetry from this file instead of the standard input.
        #[arg(long, short = 'i')]
        input: Option<PathBuf>,
        #[clap(flatten)]
        climate: climate::Args,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not open the telemetry file at {1:?}")]
        OpenInput(#[source] std::io::Error, PathBuf),
        #[error("could not read telemetry line {1}")]
        ReadInput(#[source] std::io::Error, usize),
        #[error(transparent)]
        Output(#[from] output::Error),
    }

    #[derive(serde::Serialize)]
    pub struct Snapshot {
        pub line: usize,
        #[serde(flatten)]
        pub state: ClimateState,
    }

    impl Record for Snapshot {
        fn headers() -> &'static [&'static str] {
            &["Line", "On", "Hvac", "Fan", "Swing", "Target °C", "Current °C", "Packed"]
        }

        fn row(&self) -> Vec<String> {
            let state = &self.state;
            vec![
                self.line.to_string(),
                optional(state.is_on),
                optional(state.hvac_mode),
                optional(state.fan_mode),
                optional(state.swing_mode),
                state.target_temperature.to_string(),
                optional(state.current_temperature),
                optional(state.packed_state.map(|p| format!("{p:#010x}"))),
            ]
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let input: Box<dyn std::io::BufRead> = match &args.input {
            None => Box::new(std::io::stdin().lock()),
            Some(path) => Box::new(std::io::BufReader::new(
                std::fs::File::open(path).map_err(|e| Error::OpenInput(e, path.clone()))?,
            )),
        };
        let mut climate = Climate::new(args.climate.did(), args.climate.to_config(), Vec::new());
        let mut output = args.output.to_output()?;
        for (index, line) in input.lines().enumerate() {
            let line_number = index + 1;
            let line = line.map_err(|e| Error::ReadInput(e, line_number))?;
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Telemetry>() {
                Ok(telemetry) => climate.update(&telemetry),
                Err(error) => {
                    tracing::error!(
                        line = line_number,
                        error = &error as &dyn std::error::Error,
                        "skipping unreadable telemetry"
                    );
                    continue;
                }
            }
            output.record(&Snapshot { line: line_number, state: climate.state() })?;
        }
        output.commit()?;
        Ok(())
    }
}

pub mod alarm {
    use super::*;
    use crate::alarm::{ATTRIBUTES, AlarmAttributes, AlarmError, AlarmPanel, AlarmState};
    use crate::shell;

    /// Operate the gateway's alarm panel through its local shell.
    #[derive(clap::Parser)]
    pub struct Args {
        #[command(subcommand)]
        action: Action,
        #[clap(flatten)]
        shell: shell::Args,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(clap::Subcommand, Clone, Copy, Debug)]
    pub enum Action {
        /// Read the current arming state.
        Status,
        ArmHome,
        ArmAway,
        ArmNight,
        Disarm,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not start the async runtime")]
        Runtime(#[source] std::io::Error),
        #[error(transparent)]
        Alarm(#[from] AlarmError),
        #[error(transparent)]
        Output(#[from] output::Error),
    }

    #[derive(serde::Serialize)]
    pub struct Status {
        pub state: AlarmState,
        #[serde(flatten)]
        pub attributes: AlarmAttributes,
    }

    impl Record for Status {
        fn headers() -> &'static [&'static str] {
            &["State", "Features", "Code required", "Polled", "Icon"]
        }

        fn row(&self) -> Vec<String> {
            vec![
                self.state.to_string(),
                self.attributes.supported_features.to_string(),
                self.attributes.code_arm_required.to_string(),
                self.attributes.should_poll.to_string(),
                self.attributes.icon.to_string(),
            ]
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;
        let mut panel = AlarmPanel::new(args.shell.to_shell());
        let state = runtime.block_on(async {
            match args.action {
                Action::Status => return panel.refresh().await,
                Action::ArmHome => panel.arm_home().await?,
                Action::ArmAway => panel.arm_away().await?,
                Action::ArmNight => panel.arm_night().await?,
                Action::Disarm => panel.disarm().await?,
            }
            Ok::<_, AlarmError>(panel.state())
        })?;
        let mut output = args.output.to_output()?;
        output.record(&Status { state, attributes: ATTRIBUTES })?;
        output.commit()?;
        Ok(())
    }
}
