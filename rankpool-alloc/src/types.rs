//! Shared type aliases

/// Stable key for one pool image, relative to the pool root.
/// Example: `portraits/monet_042.jpg`
pub type ResourceId = String;

/// Label shown above an image within its batch.
/// Examples: `A`, `B`, `E`
pub type BatchLabel = String;

/// Rank given to one image (1 = best).
pub type Rank = u8;
