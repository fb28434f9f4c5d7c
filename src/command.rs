use crate::config::RunConfig;
use crate::{Result, TallyError};
use std::fs;
use std::path::Path;

pub const SET_SAVE_NAME: &str = "/tally/setSaveName";

/// A command accepted while no run is active.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set output file name
    SetSaveName(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.trim().splitn(2, char::is_whitespace);
        let path = parts.next().unwrap_or_default();
        let argument = parts.next().map(str::trim).filter(|a| !a.is_empty());

        match path {
            SET_SAVE_NAME => argument
                .map(|a| Command::SetSaveName(a.to_string()))
                .ok_or_else(|| TallyError::Command(format!("{} requires a filename", SET_SAVE_NAME))),
            other => Err(TallyError::Command(format!("unknown command '{}'", other))),
        }
    }
}

/// Applies commands to the configuration of the next run.
pub struct CommandInterpreter<'a> {
    config: &'a mut RunConfig,
}

impl<'a> CommandInterpreter<'a> {
    pub fn new(config: &'a mut RunConfig) -> Self {
        Self { config }
    }

    pub fn apply(&mut self, line: &str) -> Result<()> {
        match Command::parse(line)? {
            Command::SetSaveName(name) => self.config.set_save_name(&name),
        }
    }

    /// Apply every command in a macro file. Blank lines and `#` comments are skipped.
    pub fn apply_macro(&mut self, path: &Path) -> Result<usize> {
        let text = fs::read_to_string(path)
            .map_err(|e| TallyError::Command(format!("cannot read macro {}: {}", path.display(), e)))?;
        let mut applied = 0;
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.apply(line).map_err(|e| {
                TallyError::Command(format!("{}:{}: {}", path.display(), idx + 1, e))
            })?;
            applied += 1;
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_save_name() {
        assert_eq!(
            Command::parse("/tally/setSaveName out.csv").unwrap(),
            Command::SetSaveName("out.csv".to_string())
        );
    }

    #[test]
    fn test_parameter_is_mandatory() {
        assert!(matches!(Command::parse("/tally/setSaveName"), Err(TallyError::Command(_))));
        assert!(matches!(Command::parse("/tally/setSaveName   "), Err(TallyError::Command(_))));
    }

    #[test]
    fn test_unknown_command() {
        assert!(Command::parse("/run/beamOn 10").is_err());
    }

    #[test]
    fn test_apply_updates_config() {
        let mut config = RunConfig::default();
        CommandInterpreter::new(&mut config).apply("/tally/setSaveName proton.csv").unwrap();
        assert_eq!(config.save_name, "proton.csv");
    }

    #[test]
    fn test_macro_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.mac");
        fs::write(&path, "# output\n\n/tally/setSaveName first.csv\n/tally/setSaveName second.csv\n").unwrap();
        let mut config = RunConfig::default();
        let applied = CommandInterpreter::new(&mut config).apply_macro(&path).unwrap();
        assert_eq!(applied, 2);
        assert_eq!(config.save_name, "second.csv");
    }

    #[test]
    fn test_macro_error_names_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.mac");
        fs::write(&path, "/tally/setSaveName ok.csv\n/tally/bogus\n").unwrap();
        let mut config = RunConfig::default();
        let err = CommandInterpreter::new(&mut config).apply_macro(&path).unwrap_err();
        assert!(err.to_string().contains(":2:"));
    }
}
