use core::fmt;

/// Why [`crate::Heap::release`] refused to free a pointer.
///
/// Both variants are detected by the same cheap check the spec mandates
/// (header/footer equality, then sign) and both leave the arena untouched;
/// this type exists so a caller that wants to escalate corruption (e.g. via
/// a panic or a logged diagnostic) can, while the default behavior at the
/// `GlobalAlloc` front door stays silent as required there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseError {
    /// The chunk's header and footer disagree, or the footer would fall
    /// outside the arena. The tag pair is no longer trustworthy.
    Corrupted,
    /// The header is not negative, so the pointer names a chunk that is
    /// already free (or never was a valid taken chunk).
    DoubleFree,
}

impl fmt::Display for ReleaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseError::Corrupted => f.write_str("chunk header/footer mismatch"),
            ReleaseError::DoubleFree => f.write_str("double free or invalid pointer"),
        }
    }
}
