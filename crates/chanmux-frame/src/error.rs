/// Errors that can occur while decoding frame headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// A header byte does not hold a single nibble (0-15).
    #[error("invalid frame header byte {value:#04x} at offset {index} (expected a nibble 0-15)")]
    InvalidNibble { index: usize, value: u8 },
}

pub type Result<T> = std::result::Result<T, FrameError>;
