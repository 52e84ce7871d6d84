use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
	Start,
	Stop,
	Restart,
	Status,
	Help,
}

impl Command {
	pub fn parse(word: &str) -> Option<Self> {
		match word {
			"start" | "run" => Some(Command::Start),
			"stop" | "exit" | "close" => Some(Command::Stop),
			"restart" | "re" => Some(Command::Restart),
			"status" | "stat" => Some(Command::Status),
			"help" | "-h" | "--help" => Some(Command::Help),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
	pub command: Command,
	pub config: Option<PathBuf>,
	/// Stay attached to the terminal instead of detaching.
	pub foreground: bool,
}

/// Parse arguments (without the program name). The last positional word is
/// the command; with none given the command is `status`.
pub fn parse_args(args: &[String]) -> Result<Args, String> {
	let mut config = None;
	let mut foreground = false;
	let mut command = None;

	let mut iter = args.iter();
	while let Some(arg) = iter.next() {
		match arg.as_str() {
			"-c" | "--config" => match iter.next() {
				Some(path) => config = Some(PathBuf::from(path)),
				None => return Err(format!("'{}' requires a path", arg)),
			},
			"-f" | "--foreground" => foreground = true,
			word => match Command::parse(word) {
				Some(parsed) => command = Some(parsed),
				None => return Err(format!("Unknown command '{}'", word)),
			},
		}
	}

	Ok(Args {
		command: command.unwrap_or(Command::Status),
		config,
		foreground,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn args(words: &[&str]) -> Vec<String> {
		words.iter().map(|w| w.to_string()).collect()
	}

	#[test]
	fn aliases() {
		assert_eq!(Command::parse("run"), Some(Command::Start));
		assert_eq!(Command::parse("close"), Some(Command::Stop));
		assert_eq!(Command::parse("exit"), Some(Command::Stop));
		assert_eq!(Command::parse("re"), Some(Command::Restart));
		assert_eq!(Command::parse("stat"), Some(Command::Status));
		assert_eq!(Command::parse("--help"), Some(Command::Help));
		assert_eq!(Command::parse("launch"), None);
	}

	#[test]
	fn defaults_to_status() {
		let parsed = parse_args(&[]).unwrap();
		assert_eq!(parsed.command, Command::Status);
		assert_eq!(parsed.config, None);
		assert!(!parsed.foreground);
	}

	#[test]
	fn last_command_wins() {
		let parsed = parse_args(&args(&["stop", "start"])).unwrap();
		assert_eq!(parsed.command, Command::Start);
	}

	#[test]
	fn config_and_foreground_flags() {
		let parsed = parse_args(&args(&["-c", "/etc/wd.cfg", "--foreground", "run"])).unwrap();
		assert_eq!(parsed.command, Command::Start);
		assert_eq!(parsed.config, Some(PathBuf::from("/etc/wd.cfg")));
		assert!(parsed.foreground);
	}

	#[test]
	fn config_flag_without_path_is_an_error() {
		assert!(parse_args(&args(&["start", "--config"])).is_err());
	}

	#[test]
	fn unknown_command_is_reported() {
		assert_eq!(parse_args(&args(&["launch"])).unwrap_err(), "Unknown command 'launch'");
	}
}
