use crate::{MAX_PART_SIZE, MIB, MIN_PART_SIZE, TransferError};

/// Validates a part size in bytes.
///
/// Accepts powers of two between 1 MiB and 4096 MiB inclusive. Anything else
/// would break the alignment between part boundaries and tree hash leaves.
pub fn validate_part_size(bytes: u64) -> Result<u64, TransferError> {
    if !bytes.is_power_of_two() {
        return Err(TransferError::InvalidPartSize(format!(
            "{bytes} bytes is not a power of two"
        )));
    }
    if !(MIN_PART_SIZE..=MAX_PART_SIZE).contains(&bytes) {
        return Err(TransferError::InvalidPartSize(format!(
            "{bytes} bytes is outside 1 MiB..=4096 MiB"
        )));
    }
    Ok(bytes)
}

/// Converts a part size given in MiB to bytes, validating it on the way.
pub fn part_size_from_mib(mib: u64) -> Result<u64, TransferError> {
    if !mib.is_power_of_two() || mib > MAX_PART_SIZE / MIB {
        return Err(TransferError::InvalidPartSize(format!(
            "{mib} MiB: must be a power of two between 1 and 4096"
        )));
    }
    validate_part_size(mib * MIB)
}
