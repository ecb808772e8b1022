//! Programmer registration and dispatch
//!
//! A programmer is selected with a `name:key=value,...` spec string; the
//! option pairs are handed to the backend crate's `parse_options`.

/// Information about a programmer
pub struct ProgrammerInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

/// Get information about all available programmers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        description: "Emulated FPGA for testing (size=<bytes>,stuck-cdone=<0|1>)",
    });

    #[cfg(feature = "linux")]
    programmers.push(ProgrammerInfo {
        name: "linux",
        description:
            "Linux spidev + GPIO cdev (dev=/dev/spidevX.Y,gpiochip=N,creset=N,cdone=N,cs=N)",
    });

    programmers
}

/// Generate help text listing all available programmers
pub fn programmer_help() -> String {
    let programmers = available_programmers();

    if programmers.is_empty() {
        return "No programmers available (recompile with programmer features enabled)".to_string();
    }

    let mut help = String::from("Available programmers:\n");
    for p in &programmers {
        help.push_str(&format!("  {:8} - {}\n", p.name, p.description));
    }
    help
}

/// Generate a short list of programmer names for CLI help
pub fn programmer_names_short() -> String {
    let names: Vec<&str> = available_programmers().iter().map(|p| p.name).collect();
    names.join(", ")
}

/// Split a `name:key=value,...` spec into the name and its option pairs
pub fn parse_spec(spec: &str) -> Result<(&str, Vec<(&str, &str)>), String> {
    let (name, rest) = match spec.split_once(':') {
        Some((name, rest)) => (name, rest),
        None => (spec, ""),
    };

    let mut options = Vec::new();
    for pair in rest.split(',').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Malformed option '{}' (expected key=value)", pair))?;
        options.push((key, value));
    }

    Ok((name, options))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_without_options() {
        let (name, options) = parse_spec("dummy").unwrap();
        assert_eq!(name, "dummy");
        assert!(options.is_empty());
    }

    #[test]
    fn spec_with_options() {
        let (name, options) = parse_spec("linux:dev=/dev/spidev0.0,creset=5").unwrap();
        assert_eq!(name, "linux");
        assert_eq!(options, vec![("dev", "/dev/spidev0.0"), ("creset", "5")]);
    }

    #[test]
    fn malformed_option_is_rejected() {
        assert!(parse_spec("linux:dev").is_err());
    }
}
