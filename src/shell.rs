//! Access to the property store and the `basis_cli` tool on the gateway itself.
//!
//! Session handling (telnet login and so on) is somebody else's concern; this module only
//! knows which commands to run and how to read their answers. [`LocalShell`] runs them as child
//! processes, which is what you get when this tool runs on the gateway.

use std::time::Duration;
use tokio::process::Command;

/// Gateway firmware families differ in the names of their property tools.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFlavor {
    Standard,
    E1,
    M2Poe,
}

impl ShellFlavor {
    /// Pick the flavor from a human readable gateway model name such as "Aqara Hub M2 2022".
    pub fn for_device_name(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.contains("e1") {
            return ShellFlavor::E1;
        }
        const M2_POE: [&str; 5] = ["m2 2022", "m1s 2022", "m3", "m1s gen2", "v1"];
        if M2_POE.iter().any(|m| name.contains(m)) {
            return ShellFlavor::M2Poe;
        }
        ShellFlavor::Standard
    }

    fn getprop(self) -> &'static str {
        match self {
            ShellFlavor::Standard => "getprop",
            ShellFlavor::E1 | ShellFlavor::M2Poe => "agetprop",
        }
    }

    fn setprop(self) -> &'static str {
        match self {
            ShellFlavor::Standard => "setprop",
            ShellFlavor::E1 | ShellFlavor::M2Poe => "asetprop",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ShellError {
    #[error("could not start `{1}`")]
    Spawn(#[source] std::io::Error, String),
    #[error("`{0}` did not finish within {1:?}")]
    Timeout(String, Duration),
    #[error("`{0}` exited with {1}")]
    Failed(String, std::process::ExitStatus),
    #[error("`{0}` printed something that is not UTF-8")]
    NotUtf8(String),
}

#[allow(async_fn_in_trait)]
pub trait Shell {
    async fn get_prop(&mut self, name: &str) -> Result<String, ShellError>;
    async fn set_prop(&mut self, name: &str, value: &str) -> Result<(), ShellError>;
    async fn run_basis_cli(&mut self, arguments: &str) -> Result<(), ShellError>;
}

#[derive(clap::Parser, Clone, Debug)]
#[group(id = "shell::Args")]
pub struct Args {
    /// The gateway model name, used to pick the right property tools.
    #[arg(long, default_value = "")]
    model: String,

    /// Use this shell flavor regardless of the model name.
    #[arg(long, value_enum)]
    flavor: Option<ShellFlavor>,

    /// Consider a shell command failed if it does not finish in this amount of time.
    #[arg(long, default_value = "5s")]
    command_timeout: humantime::Duration,
}

impl Args {
    pub fn flavor(&self) -> ShellFlavor {
        self.flavor.unwrap_or_else(|| ShellFlavor::for_device_name(&self.model))
    }

    pub fn to_shell(&self) -> LocalShell {
        LocalShell::new(self.flavor(), *self.command_timeout)
    }
}

/// Runs the gateway tools as local child processes.
pub struct LocalShell {
    flavor: ShellFlavor,
    timeout: Duration,
}

impl LocalShell {
    pub fn new(flavor: ShellFlavor, timeout: Duration) -> Self {
        Self { flavor, timeout }
    }

    pub fn flavor(&self) -> ShellFlavor {
        self.flavor
    }

    fn command_line<'a>(&self, request: &Request<'a>) -> (&'static str, Vec<&'a str>) {
        match *request {
            Request::GetProp(name) => (self.flavor.getprop(), vec![name]),
            Request::SetProp(name, value) => (self.flavor.setprop(), vec![name, value]),
            Request::BasisCli(arguments) => ("basis_cli", arguments.split_whitespace().collect()),
        }
    }

    async fn run(&self, request: Request<'_>) -> Result<String, ShellError> {
        let (program, arguments) = self.command_line(&request);
        let command_text = std::iter::once(program)
            .chain(arguments.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        tracing::debug!(command = %command_text, "running gateway shell command");
        let output = Command::new(program).args(&arguments).kill_on_drop(true).output();
        let output = match tokio::time::timeout(self.timeout, output).await {
            Err(_elapsed) => return Err(ShellError::Timeout(command_text, self.timeout)),
            Ok(result) => result.map_err(|e| ShellError::Spawn(e, command_text.clone()))?,
        };
        if !output.status.success() {
            return Err(ShellError::Failed(command_text, output.status));
        }
        let stdout = String::from_utf8(output.stdout).map_err(|_| ShellError::NotUtf8(command_text))?;
        tracing::trace!(%stdout, "gateway shell command finished");
        Ok(stdout.trim().to_string())
    }
}

enum Request<'a> {
    GetProp(&'a str),
    SetProp(&'a str, &'a str),
    BasisCli(&'a str),
}

impl Shell for LocalShell {
    async fn get_prop(&mut self, name: &str) -> Result<String, ShellError> {
        self.run(Request::GetProp(name)).await
    }

    async fn set_prop(&mut self, name: &str, value: &str) -> Result<(), ShellError> {
        self.run(Request::SetProp(name, value)).await.map(drop)
    }

    async fn run_basis_cli(&mut self, arguments: &str) -> Result<(), ShellError> {
        self.run(Request::BasisCli(arguments)).await.map(drop)
    }
}
