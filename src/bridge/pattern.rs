//! Replacement patterns: byte masks over calldata.
//!
//! A set bit in the mask marks a calldata bit the counter-order is allowed to
//! overwrite. Patching an order's calldata with its counter-order's calldata
//! is
//!
//! ```text
//! patched[i] = (calldata[i] & !mask[i]) | (counter[i] & mask[i])
//! ```
//!
//! so unmasked bytes always keep the maker's value. Two orders match only if
//! both patched calldatas are identical.
//!
//! ## Example
//!
//! ```
//! use block_parties::bridge::pattern::guarded_replace;
//!
//! let mut mine = vec![0xaa, 0x00];
//! guarded_replace(&mut mine, &[0xff, 0x11], &[0x00, 0xff]).unwrap();
//! assert_eq!(mine, vec![0xaa, 0x11]);
//! ```

use crate::bridge::MatchError;

/// Length of an ABI function selector
pub const SELECTOR_LEN: usize = 4;

/// Length of an ABI argument word
pub const WORD_LEN: usize = 32;

/// Overwrite the masked bits of `array` with the corresponding bits of
/// `desired`.
///
/// An empty mask means "nothing may be replaced" and leaves `array` as is.
pub fn guarded_replace(array: &mut [u8], desired: &[u8], mask: &[u8]) -> Result<(), MatchError> {
    if mask.is_empty() {
        return Ok(());
    }
    if array.len() != desired.len() || array.len() != mask.len() {
        return Err(MatchError::PatternLength {
            calldata: array.len(),
            counter: desired.len(),
            mask: mask.len(),
        });
    }

    for ((byte, want), m) in array.iter_mut().zip(desired).zip(mask) {
        *byte = (*byte & !m) | (want & m);
    }
    Ok(())
}

/// Return a patched copy of `calldata`
pub fn patched(calldata: &[u8], counter: &[u8], mask: &[u8]) -> Result<Vec<u8>, MatchError> {
    let mut out = calldata.to_vec();
    guarded_replace(&mut out, counter, mask)?;
    Ok(out)
}

/// Mask that opens exactly one ABI argument word of a call.
///
/// Word `n` covers bytes `4 + 32n .. 4 + 32(n + 1)`. Words beyond
/// `calldata_len` are clipped.
///
/// ```
/// use block_parties::bridge::pattern::abi_word_mask;
///
/// let mask = abi_word_mask(100, 1);
/// assert_eq!(mask.len(), 100);
/// assert!(mask[..36].iter().all(|b| *b == 0));
/// assert!(mask[36..68].iter().all(|b| *b == 0xff));
/// assert!(mask[68..].iter().all(|b| *b == 0));
/// ```
pub fn abi_word_mask(calldata_len: usize, word: usize) -> Vec<u8> {
    let mut mask = vec![0u8; calldata_len];
    let start = (SELECTOR_LEN + WORD_LEN * word).min(calldata_len);
    let end = (start + WORD_LEN).min(calldata_len);
    mask[start..end].fill(0xff);
    mask
}
