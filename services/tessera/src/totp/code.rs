//! TOTP code computation and anti-replay window math.
//!
//! A code is valid if it matches the current window or one adjacent window
//! (clock drift) AND its window is strictly newer than the stored
//! `last_used_step` marker. Advancing the marker is the caller's job and
//! must be a conditional update, so two concurrent presentations of the
//! same code cannot both win.

use anyhow::{Result, anyhow};
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, TOTP};

pub const STEP_SECONDS: i64 = 30;
pub const DIGITS: usize = 6;
/// Accepted drift in steps on either side of "now".
pub const SKEW_STEPS: i64 = 1;

/// The time window a unix timestamp falls into.
#[must_use]
pub fn step_for(now_unix: i64) -> i64 {
    now_unix.div_euclid(STEP_SECONDS)
}

fn totp_for_seed(seed: &[u8]) -> Result<TOTP> {
    // Issuer/account only matter for provisioning URLs, not for checking.
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        1,
        STEP_SECONDS.unsigned_abs(),
        seed.to_vec(),
        Some("tessera".to_string()),
        "principal".to_string(),
    )
    .map_err(|e| anyhow!("TOTP init error: {e}"))
}

/// Generate the code for an arbitrary window (used by enrollment QR
/// verification tests and by `check_code`).
///
/// # Errors
/// Returns an error if the seed is rejected by the TOTP implementation.
pub fn code_at_step(seed: &[u8], step: i64) -> Result<String> {
    let totp = totp_for_seed(seed)?;
    let at = u64::try_from(step.max(0) * STEP_SECONDS).unwrap_or(0);
    Ok(totp.generate(at))
}

/// Check a presented code against the tolerated windows.
///
/// Returns the matched window when the code is valid and strictly newer
/// than `last_used_step`, otherwise `None`. Comparison is constant-time
/// per candidate window.
///
/// # Errors
/// Returns an error if the seed is rejected by the TOTP implementation.
pub fn check_code(
    seed: &[u8],
    code: &str,
    now_unix: i64,
    last_used_step: i64,
) -> Result<Option<i64>> {
    let presented = code.trim();
    if presented.len() != DIGITS || !presented.bytes().all(|byte| byte.is_ascii_digit()) {
        return Ok(None);
    }

    let now_step = step_for(now_unix);
    let totp = totp_for_seed(seed)?;

    let mut matched = None;
    for delta in -SKEW_STEPS..=SKEW_STEPS {
        let step = now_step + delta;
        if step <= last_used_step {
            // Window already consumed (or older): replay, not drift.
            continue;
        }
        let at = u64::try_from(step.max(0) * STEP_SECONDS).unwrap_or(0);
        let expected = totp.generate(at);
        if bool::from(expected.as_bytes().ct_eq(presented.as_bytes())) && matched.is_none() {
            matched = Some(step);
        }
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &[u8] = b"0123456789abcdef0123"; // 20 bytes, SHA-1 sized
    const NOW: i64 = 1_700_000_015; // mid-window

    #[test]
    fn accepts_current_window_code() -> Result<()> {
        let code = code_at_step(SEED, step_for(NOW))?;
        let matched = check_code(SEED, &code, NOW, 0)?;
        assert_eq!(matched, Some(step_for(NOW)));
        Ok(())
    }

    #[test]
    fn accepts_adjacent_windows_for_drift() -> Result<()> {
        let behind = code_at_step(SEED, step_for(NOW) - 1)?;
        assert_eq!(check_code(SEED, &behind, NOW, 0)?, Some(step_for(NOW) - 1));

        let ahead = code_at_step(SEED, step_for(NOW) + 1)?;
        assert_eq!(check_code(SEED, &ahead, NOW, 0)?, Some(step_for(NOW) + 1));
        Ok(())
    }

    #[test]
    fn rejects_windows_outside_tolerance() -> Result<()> {
        let stale = code_at_step(SEED, step_for(NOW) - 2)?;
        assert_eq!(check_code(SEED, &stale, NOW, 0)?, None);
        Ok(())
    }

    #[test]
    fn same_code_twice_fails_the_second_time() -> Result<()> {
        let code = code_at_step(SEED, step_for(NOW))?;

        let first = check_code(SEED, &code, NOW, 0)?;
        let step = first.ok_or_else(|| anyhow!("first use should match"))?;

        // Marker advanced to the consumed window: replay is rejected.
        assert_eq!(check_code(SEED, &code, NOW, step)?, None);
        Ok(())
    }

    #[test]
    fn marker_blocks_older_windows_after_drift_acceptance() -> Result<()> {
        // Accept a +1 drifted code, advancing the marker past "now"...
        let ahead = code_at_step(SEED, step_for(NOW) + 1)?;
        let step = check_code(SEED, &ahead, NOW, 0)?
            .ok_or_else(|| anyhow!("drifted code should match"))?;

        // ...then the current-window code must be refused too.
        let current = code_at_step(SEED, step_for(NOW))?;
        assert_eq!(check_code(SEED, &current, NOW, step)?, None);
        Ok(())
    }

    #[test]
    fn rejects_malformed_codes_without_work() -> Result<()> {
        assert_eq!(check_code(SEED, "12345", NOW, 0)?, None);
        assert_eq!(check_code(SEED, "1234567", NOW, 0)?, None);
        assert_eq!(check_code(SEED, "12a456", NOW, 0)?, None);
        Ok(())
    }
}
