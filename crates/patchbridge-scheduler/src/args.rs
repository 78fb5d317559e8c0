//! Scheduler command line.
//!
//! The host passes the IPC object names inside one `-extraflags` string;
//! everything else arrives as ordinary arguments. Unknown flags are kept
//! for the engine.

use patchbridge_core::{BridgeError, IpcNames, Result, DEFAULT_SAMPLE_RATE};
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerArgs {
    pub names: IpcNames,
    pub channels_in: usize,
    pub channels_out: usize,
    pub sample_rate: u32,
    pub nogui: bool,
    pub scheduler_lib: Option<PathBuf>,
    pub open: Option<PathBuf>,
    pub search_path: Option<PathBuf>,
    pub libraries: Vec<String>,
    /// Flags not consumed by the bridge, in order.
    pub engine_flags: Vec<String>,
}

#[derive(Default)]
struct PartialNames {
    host_pid: Option<u32>,
    region: Option<String>,
    mutex: Option<String>,
    host_ready: Option<String>,
    scheduler_ready: Option<String>,
}

impl PartialNames {
    fn finish(self) -> Result<IpcNames> {
        let missing = |flag: &str| BridgeError::InvalidArgument(format!("missing {}", flag));
        Ok(IpcNames {
            host_pid: self.host_pid.ok_or_else(|| missing("-vsthostid"))?,
            region: self.region.ok_or_else(|| missing("-filemapname"))?,
            mutex: self.mutex.ok_or_else(|| missing("-mutexname"))?,
            host_ready: self.host_ready.ok_or_else(|| missing("-vstproceventname"))?,
            scheduler_ready: self.scheduler_ready.ok_or_else(|| missing("-pdproceventname"))?,
        })
    }
}

impl SchedulerArgs {
    pub fn from_env() -> Result<Self> {
        Self::parse(std::env::args_os().skip(1))
    }

    /// Parse an argument vector, program name excluded.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.into().to_string_lossy().into_owned())
            .collect();

        let mut names = PartialNames::default();
        let mut parsed = Self {
            names: IpcNames::for_instance(0, 0),
            channels_in: 2,
            channels_out: 2,
            sample_rate: DEFAULT_SAMPLE_RATE,
            nogui: false,
            scheduler_lib: None,
            open: None,
            search_path: None,
            libraries: Vec::new(),
            engine_flags: Vec::new(),
        };
        parsed.apply(&args, &mut names)?;
        parsed.names = names.finish()?;
        Ok(parsed)
    }

    fn apply(&mut self, args: &[String], names: &mut PartialNames) -> Result<()> {
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            let mut value = || {
                iter.next().cloned().ok_or_else(|| {
                    BridgeError::InvalidArgument(format!("{} needs a value", flag))
                })
            };
            match flag.as_str() {
                "-extraflags" => {
                    let extra = tokenize(&value()?);
                    self.apply(&extra, names)?;
                }
                "-vsthostid" => names.host_pid = Some(number(flag, &value()?)?),
                "-filemapname" | "-sharedmapname" => names.region = Some(value()?),
                "-mutexname" => names.mutex = Some(value()?),
                "-vstproceventname" => names.host_ready = Some(value()?),
                "-pdproceventname" => names.scheduler_ready = Some(value()?),
                "-inchannels" => self.channels_in = number(flag, &value()?)?,
                "-outchannels" => self.channels_out = number(flag, &value()?)?,
                "-r" => self.sample_rate = number(flag, &value()?)?,
                "-schedlib" => self.scheduler_lib = Some(PathBuf::from(value()?)),
                "-open" => self.open = Some(PathBuf::from(value()?)),
                "-path" => self.search_path = Some(PathBuf::from(value()?)),
                "-lib" => self.libraries.push(value()?),
                "-nogui" => self.nogui = true,
                other => self.engine_flags.push(other.to_string()),
            }
        }
        Ok(())
    }
}

fn number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| BridgeError::InvalidArgument(format!("{}: not a number: {}", flag, value)))
}

/// Split a flags string on whitespace. Double quotes group words and are removed.
pub fn tokenize(flags: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut started = false;

    for c in flags.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                started = true;
            }
            c if c.is_whitespace() && !quoted => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if started {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_args() -> Vec<String> {
        let extra = "-vstproceventname pbh9x1 -pdproceventname pbs9x1 -vsthostid 9 -mutexname pbm9x1 -filemapname pbr9x1";
        [
            "-nogui",
            "-noprefs",
            "-schedlib",
            "/b/Contents/Resources/patchbridge-scheduler",
            "-extraflags",
            extra,
            "-outchannels",
            "4",
            "-inchannels",
            "2",
            "-r",
            "44100",
            "-open",
            "/b/main.pd",
            "-path",
            "/b",
            "-lib",
            "zexy",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn test_parse_host_command_line() {
        let args = SchedulerArgs::parse(host_args()).unwrap();
        assert_eq!(args.names, IpcNames::for_instance(9, 1));
        assert_eq!(args.channels_in, 2);
        assert_eq!(args.channels_out, 4);
        assert_eq!(args.sample_rate, 44100);
        assert!(args.nogui);
        assert_eq!(args.open, Some(PathBuf::from("/b/main.pd")));
        assert_eq!(args.libraries, vec!["zexy".to_string()]);
        assert_eq!(args.engine_flags, vec!["-noprefs".to_string()]);
    }

    #[test]
    fn test_missing_names_rejected() {
        let err = SchedulerArgs::parse(["-r", "48000"]).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[test]
    fn test_bad_number_rejected() {
        let mut args = host_args();
        let pos = args.iter().position(|a| a == "44100").unwrap();
        args[pos] = "fast".to_string();
        assert!(SchedulerArgs::parse(args).is_err());
    }

    #[test]
    fn test_tokenize_quotes() {
        assert_eq!(
            tokenize(r#"-open "/My Plugins/a b.pd"  -lib x"#),
            vec!["-open", "/My Plugins/a b.pd", "-lib", "x"]
        );
        assert_eq!(tokenize(r#"-flag """#), vec!["-flag", ""]);
        assert!(tokenize("   ").is_empty());
    }
}
