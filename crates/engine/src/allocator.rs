use crate::error::{EngineError, Result};
use serial_protocol::Suffix;
use std::collections::BTreeSet;

/// Returns the smallest positive suffix not present in `used`, together with
/// `used` extended by that suffix.
pub fn allocate_suffix(used: &BTreeSet<Suffix>) -> Result<(Suffix, BTreeSet<Suffix>)> {
    let mut updated = used.clone();
    let suffix = allocate_into(&mut updated)?;
    Ok((suffix, updated))
}

pub(crate) fn allocate_into(used: &mut BTreeSet<Suffix>) -> Result<Suffix> {
    let suffix = smallest_free(used)?;
    used.insert(suffix);
    Ok(suffix)
}

fn smallest_free(used: &BTreeSet<Suffix>) -> Result<Suffix> {
    smallest_free_from(1, used)
}

fn smallest_free_from(start: Suffix, used: &BTreeSet<Suffix>) -> Result<Suffix> {
    let mut candidate = start;
    for &taken in used.range(start..) {
        if taken > candidate {
            break;
        }
        candidate = taken
            .checked_add(1)
            .ok_or(EngineError::SuffixSpaceExhausted { last: taken })?;
    }
    Ok(candidate)
}
