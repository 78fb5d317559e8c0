//! Scheduler process launching.

use patchbridge_core::{BridgeConfig, BridgeError, IpcNames, Result};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

pub const SCHEDULER_LIBRARY: &str = "patchbridge-scheduler";

/// Command line for one scheduler process, as an argument vector (no shell).
#[derive(Debug, Clone)]
pub struct SchedulerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl SchedulerCommand {
    pub fn new(
        config: &BridgeConfig,
        names: &IpcNames,
        channels_in: usize,
        channels_out: usize,
        sample_rate: u32,
    ) -> Self {
        let mut args: Vec<OsString> = Vec::new();
        if !config.debug {
            args.push("-nogui".into());
        }
        args.extend(config.engine_flags.split_whitespace().map(OsString::from));

        args.push("-schedlib".into());
        args.push(config.scheduler_dir.join(SCHEDULER_LIBRARY).into_os_string());

        args.push("-extraflags".into());
        args.push(ipc_flags(names).into());

        args.push("-outchannels".into());
        args.push(channels_out.to_string().into());
        args.push("-inchannels".into());
        args.push(channels_in.to_string().into());
        args.push("-r".into());
        args.push(sample_rate.to_string().into());

        if !config.content_file.is_empty() {
            args.push("-open".into());
            args.push(config.bundle_dir.join(&config.content_file).into_os_string());
        }
        args.push("-path".into());
        args.push(config.bundle_dir.clone().into_os_string());

        for lib in &config.libraries {
            args.push("-lib".into());
            args.push(lib.into());
        }

        Self {
            program: config.engine_executable(),
            args,
        }
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null());
        command
    }

    /// Probe the executable, then spawn it.
    pub fn spawn(&self) -> Result<SchedulerProcess> {
        if !self.program.is_file() {
            return Err(BridgeError::LaunchFailed(format!(
                "scheduler executable not found at {}; check engine-path in the setup file",
                self.program.display()
            )));
        }

        tracing::debug!(program = %self.program.display(), args = ?self.args, "Launching scheduler");
        let child = self
            .to_command()
            .spawn()
            .map_err(|e| BridgeError::LaunchFailed(format!("{}: {}", self.program.display(), e)))?;
        Ok(SchedulerProcess { child })
    }
}

/// The `-extraflags` payload naming the IPC objects and the host process.
pub fn ipc_flags(names: &IpcNames) -> String {
    format!(
        "-vstproceventname {} -pdproceventname {} -vsthostid {} -mutexname {} -filemapname {}",
        names.host_ready, names.scheduler_ready, names.host_pid, names.mutex, names.region
    )
}

pub struct SchedulerProcess {
    child: Child,
}

impl SchedulerProcess {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait up to `grace` for a voluntary exit, then kill.
    pub fn shutdown(mut self, grace: Duration) {
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(%status, "Scheduler exited");
                    return;
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(10)),
                Err(_) => break,
            }
        }
        tracing::warn!(pid = self.child.id(), "Scheduler did not exit, killing it");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config() -> BridgeConfig {
        let mut config = BridgeConfig::for_bundle(Path::new("/plugins/Demo.vst3"));
        config.content_file = "main.pd".to_string();
        config.engine_flags = "-noprefs -alsa".to_string();
        config.libraries = vec!["zexy".to_string(), "cyclone".to_string()];
        config
    }

    fn args_of(command: &SchedulerCommand) -> Vec<String> {
        command
            .args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_command_line() {
        let names = IpcNames::for_instance(77, 3);
        let command = SchedulerCommand::new(&config(), &names, 2, 4, 44100);
        let args = args_of(&command);

        assert_eq!(args[0], "-nogui");
        assert_eq!(&args[1..3], &["-noprefs", "-alsa"]);
        assert_eq!(args[3], "-schedlib");
        assert!(args[4].ends_with(SCHEDULER_LIBRARY));
        assert_eq!(args[5], "-extraflags");
        assert!(args[6].contains("-vsthostid 77"));
        assert!(args[6].contains(&format!("-mutexname {}", names.mutex)));
        assert!(args[6].contains(&format!("-filemapname {}", names.region)));

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-outchannels") + 1], "4");
        assert_eq!(args[pos("-inchannels") + 1], "2");
        assert_eq!(args[pos("-r") + 1], "44100");
        assert!(args[pos("-open") + 1].ends_with("main.pd"));
        assert_eq!(args.iter().filter(|a| *a == "-lib").count(), 2);
        assert!(command.program().ends_with(patchbridge_core::config::ENGINE_BINARY));
    }

    #[test]
    fn test_debug_keeps_gui() {
        let mut config = config();
        config.debug = true;
        let command = SchedulerCommand::new(&config, &IpcNames::for_instance(1, 1), 2, 2, 48000);
        assert!(!args_of(&command).contains(&"-nogui".to_string()));
    }

    #[test]
    fn test_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.engine_dir = dir.path().to_path_buf();

        let command = SchedulerCommand::new(&config, &IpcNames::for_instance(1, 2), 2, 2, 48000);
        match command.spawn() {
            Err(BridgeError::LaunchFailed(message)) => assert!(message.contains("not found")),
            _ => panic!("expected a launch failure"),
        }
    }
}
