//! Challenge command implementation.

use anyhow::{bail, Result};
use keyward_core::challenge::MIN_CHALLENGE_BYTES;
use keyward_core::{Challenge, OsRandom};
use tracing::debug;

/// Execute the challenge command.
pub fn execute(bytes: usize, count: usize) -> Result<()> {
    if bytes < MIN_CHALLENGE_BYTES {
        bail!("Invalid argument: challenges must be at least {MIN_CHALLENGE_BYTES} bytes");
    }
    if count == 0 {
        bail!("Invalid argument: count must be positive");
    }

    for _ in 0..count {
        let challenge = Challenge::generate(&OsRandom, bytes)?;
        println!("{}", challenge.to_base64url());
    }
    debug!(bytes, count, "Generated challenges");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_short_challenges() {
        let err = execute(8, 1).unwrap_err();
        assert!(err.to_string().contains("at least 16 bytes"));
    }

    #[test]
    fn test_rejects_zero_count() {
        assert!(execute(32, 0).is_err());
    }
}
