//! Argument validators wired into clap, so raw strings are rejected before
//! any core code sees them.

use std::path::Path;

pub fn positive_integer(value: String) -> Result<(), String> {
    match value.parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(()),
        _ => Err(format!("Expected a positive integer, but got '{}'", value)),
    }
}

pub fn existing_path(value: String) -> Result<(), String> {
    if Path::new(&value).is_file() {
        Ok(())
    } else {
        Err(format!("Invalid path: '{}'", value))
    }
}

pub fn fraction(value: String) -> Result<(), String> {
    match value.parse::<f64>() {
        Ok(parsed) if parsed > 0.0 && parsed <= 1.0 => Ok(()),
        _ => Err(format!("Expected a fraction in (0, 1], but got '{}'", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::{fraction, positive_integer};

    #[test]
    fn positive_integer_bounds() {
        assert!(positive_integer("3".to_owned()).is_ok());
        assert!(positive_integer("0".to_owned()).is_err());
        assert!(positive_integer("-2".to_owned()).is_err());
        assert!(positive_integer("four".to_owned()).is_err());
    }

    #[test]
    fn fraction_bounds() {
        assert!(fraction("0.5".to_owned()).is_ok());
        assert!(fraction("1".to_owned()).is_ok());
        assert!(fraction("0".to_owned()).is_err());
        assert!(fraction("1.5".to_owned()).is_err());
    }
}
