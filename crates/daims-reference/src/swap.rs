#![deny(unsafe_code)]

//! Shadow rebuild for full-replacement dimensions.
//!
//! Some feeds (the USPS ZIP family, the SAM unregistered-entity dump) are
//! not diffable: each artifact is the whole truth. For those, the
//! replacement is built completely off to the side and only then swapped
//! into the store in one move, so a reader holding the store never sees a
//! half-updated crosswalk, and a failed build leaves the previous tables
//! untouched.

use crate::error::Result;

/// Builds a full replacement via `build`, then swaps it into `slot`.
/// Returns the retired value.
pub fn rebuild_and_swap<T>(slot: &mut T, build: impl FnOnce() -> Result<T>) -> Result<T> {
    let replacement = build()?;
    Ok(std::mem::replace(slot, replacement))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReferenceError;

    #[test]
    fn failed_build_leaves_the_slot_untouched() {
        let mut tables = vec!["old"];
        let result = rebuild_and_swap(&mut tables, || {
            Err(ReferenceError::UpstreamUnavailable { message: "boom".into() })
        });
        assert!(result.is_err());
        assert_eq!(tables, vec!["old"]);
    }

    #[test]
    fn successful_build_replaces_wholesale() {
        let mut tables = vec!["old"];
        let retired = rebuild_and_swap(&mut tables, || Ok(vec!["new", "tables"])).unwrap();
        assert_eq!(retired, vec!["old"]);
        assert_eq!(tables, vec!["new", "tables"]);
    }
}
